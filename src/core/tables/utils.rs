use std::{fs, path::Path};

use saphyr::{LoadableYamlNode, ScalarOwned, YamlOwned};

use crate::core::tables::TablesError;

/// Helper macro to create WrongType TablesError
macro_rules! wrong_type_err {
  ($value:expr, $expected:expr) => {
    TablesError::WrongType(format!("{:?}", $value), $expected.to_string())
  };
}

pub fn value_from_str(s: &str) -> YamlOwned {
  YamlOwned::Value(ScalarOwned::String(s.to_string()))
}

pub fn yaml_lookup<'a>(node: &'a YamlOwned, key: &str) -> Option<&'a YamlOwned> {
  if let YamlOwned::Mapping(map) = node {
    return map.get(&value_from_str(key));
  }
  None
}

pub fn is_null(yaml: &YamlOwned) -> bool {
  matches!(yaml, YamlOwned::Value(ScalarOwned::Null))
}

pub fn to_string(yaml: &YamlOwned) -> Result<String, TablesError> {
  match yaml {
    YamlOwned::Value(ScalarOwned::String(s)) => Ok(s.to_string()),
    _ => Err(wrong_type_err!(yaml, "string")),
  }
}

/// Strictly positive integer, as every count in the tables must be.
pub fn to_count(yaml: &YamlOwned) -> Result<u32, TablesError> {
  match yaml {
    YamlOwned::Value(ScalarOwned::Integer(i)) if *i > 0 => {
      u32::try_from(*i).map_err(|_| wrong_type_err!(yaml, "positive 32-bit integer"))
    }
    _ => Err(wrong_type_err!(yaml, "positive integer")),
  }
}

pub fn to_optional_count(yaml: &YamlOwned) -> Result<Option<u32>, TablesError> {
  if is_null(yaml) {
    return Ok(None);
  }
  to_count(yaml).map(Some)
}

pub fn to_sequence(yaml: &YamlOwned) -> Result<&Vec<YamlOwned>, TablesError> {
  match yaml {
    YamlOwned::Sequence(seq) => Ok(seq),
    _ => Err(wrong_type_err!(yaml, "sequence")),
  }
}

/// Key/value pairs of a mapping node, in document order.
pub fn to_entries(yaml: &YamlOwned) -> Result<Vec<(&YamlOwned, &YamlOwned)>, TablesError> {
  match yaml {
    YamlOwned::Mapping(map) => Ok(map.iter().collect()),
    _ => Err(wrong_type_err!(yaml, "mapping")),
  }
}

fn lookup<'a>(yaml: &'a YamlOwned, key: &str) -> Result<&'a YamlOwned, TablesError> {
  yaml_lookup(yaml, key).ok_or(TablesError::MissingKey(key.to_string()))
}

pub fn lookup_str(yaml: &YamlOwned, key: &str) -> Result<String, TablesError> {
  to_string(lookup(yaml, key)?)
}

pub fn lookup_count(yaml: &YamlOwned, key: &str) -> Result<u32, TablesError> {
  to_count(lookup(yaml, key)?)
}

pub fn lookup_sequence<'a>(
  yaml: &'a YamlOwned,
  key: &str,
) -> Result<&'a Vec<YamlOwned>, TablesError> {
  to_sequence(lookup(yaml, key)?)
}

pub fn lookup_entries<'a>(
  yaml: &'a YamlOwned,
  key: &str,
) -> Result<Vec<(&'a YamlOwned, &'a YamlOwned)>, TablesError> {
  to_entries(lookup(yaml, key)?)
}

/// Load YAML from a string. Returns the first document.
pub fn load_yaml_from_str(text: &str) -> Result<YamlOwned, TablesError> {
  let yaml = YamlOwned::load_from_str(text)
    .map_err(TablesError::YamlParseFailed)?
    .into_iter() // Take the first document
    .next()
    .ok_or(TablesError::YamlEmpty)?;
  Ok(yaml)
}

/// Load YAML from a file. Returns the first document in the file.
pub fn load_yaml_from_file(path: &Path) -> Result<YamlOwned, TablesError> {
  let text = fs::read_to_string(path)?;
  load_yaml_from_str(&text)
}
