mod utils;


use std::path::Path;

use hashlink::LinkedHashMap;
use log::debug;
use saphyr::YamlOwned;
use thiserror::Error;

use crate::core::tables::utils::{
  load_yaml_from_file, load_yaml_from_str, lookup_count, lookup_entries, lookup_sequence,
  lookup_str, to_count, to_optional_count, to_sequence, to_string, yaml_lookup,
};
use crate::core::templates::Templates;

const BUILTIN_TABLES: &str = include_str!("../../config/tables.yaml");

#[derive(Error, Debug)]
pub enum TablesError {
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("YAML parsing failed: {0}")]
  YamlParseFailed(#[from] saphyr::ScanError),
  #[error("YAML file is empty!")]
  YamlEmpty,
  #[error("Missing Key: {0}")]
  MissingKey(String),
  #[error("Wrong type for value \"{0}\", expected type {1}")]
  WrongType(String, String),
  #[error("Cluster '{0}' refers to unknown software group '{1}'")]
  UnknownSoftwareGroup(String, String),
  #[error("Benchmark '{0}' refers to unknown template '{1}'")]
  UnknownTemplate(String, String),
  #[error("Invalid entry '{0}': {1}")]
  InvalidEntry(String, String),
  #[error("couldn't find the following tests: {}", .0.join(", "))]
  UnknownTests(Vec<String>),
  #[error("couldn't find the following clusters: {}", .0.join(", "))]
  UnknownClusters(Vec<String>),
}

/// Capabilities of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
  pub name: String,
  pub target: Option<String>,
  /// Cores per node
  pub ncores: u32,
  /// Memory tiers of the nodes, in GiB
  pub mem: Vec<u32>,
  /// Name of the software group listing the valid (compiler, MPI) pairs
  pub softwares: String,
}

impl ClusterSpec {
  pub fn min_memory_gib(&self) -> Option<u32> {
    self.mem.iter().copied().min()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareStack {
  pub compiler: String,
  pub mpi: String,
}

/// One (node count, task count) pair. A missing task count means "use every core".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfiguration {
  pub nnodes: u32,
  pub ntasks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSpec {
  pub name: String,
  pub template: String,
  pub subdir: String,
  pub command: String,
  pub configurations: Vec<RunConfiguration>,
  pub extra_directives: Vec<String>,
}

/// Static lookup tables driving the job matrix. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Tables {
  clusters: LinkedHashMap<String, ClusterSpec>,
  stacks: LinkedHashMap<String, Vec<SoftwareStack>>,
  benchmarks: LinkedHashMap<String, BenchmarkSpec>,
}

impl Tables {
  /// Tables shipped with the binary.
  pub fn builtin() -> Result<Self, TablesError> {
    Self::from_yaml_str(BUILTIN_TABLES)
  }

  pub fn from_file(path: &Path) -> Result<Self, TablesError> {
    debug!("Loading benchmark tables from {:?}", path);
    Self::from_yaml(&load_yaml_from_file(path)?)
  }

  pub fn from_yaml_str(text: &str) -> Result<Self, TablesError> {
    Self::from_yaml(&load_yaml_from_str(text)?)
  }

  fn from_yaml(yaml: &YamlOwned) -> Result<Self, TablesError> {
    let mut tables = Tables::default();

    for (group, pairs) in lookup_entries(yaml, "software_stacks")? {
      let group = to_string(group)?;
      let stacks = to_sequence(pairs)?
        .iter()
        .map(|pair| {
          Ok(SoftwareStack {
            compiler: lookup_str(pair, "compiler")?,
            mpi: lookup_str(pair, "mpi")?,
          })
        })
        .collect::<Result<Vec<_>, TablesError>>()?;
      tables.stacks.insert(group, stacks);
    }

    for (name, info) in lookup_entries(yaml, "clusters")? {
      let name = to_string(name)?;
      let target = yaml_lookup(info, "target").map(to_string).transpose()?;
      let mem = lookup_sequence(info, "mem")?
        .iter()
        .map(to_count)
        .collect::<Result<Vec<_>, _>>()?;
      let cluster = ClusterSpec {
        name: name.clone(),
        target,
        ncores: lookup_count(info, "ncores")?,
        mem,
        softwares: lookup_str(info, "softwares")?,
      };
      tables.clusters.insert(name, cluster);
    }

    for (name, info) in lookup_entries(yaml, "benchmarks")? {
      let name = to_string(name)?;
      let configurations = lookup_sequence(info, "configurations")?
        .iter()
        .map(|item| parse_configuration(&name, item))
        .collect::<Result<Vec<_>, _>>()?;
      let extra_directives = match yaml_lookup(info, "extra_directives") {
        Some(node) => to_sequence(node)?
          .iter()
          .map(to_string)
          .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
      };
      let benchmark = BenchmarkSpec {
        name: name.clone(),
        template: lookup_str(info, "template")?,
        subdir: lookup_str(info, "subdir")?,
        command: lookup_str(info, "command")?,
        configurations,
        extra_directives,
      };
      tables.benchmarks.insert(name, benchmark);
    }

    debug!(
      "Loaded {} clusters, {} software groups, {} benchmarks",
      tables.clusters.len(),
      tables.stacks.len(),
      tables.benchmarks.len()
    );
    Ok(tables)
  }

  /// Check referential integrity once, before anything is generated.
  pub fn validate(&self, templates: &Templates) -> Result<(), TablesError> {
    for cluster in self.clusters.values() {
      match self.stacks.get(&cluster.softwares) {
        Some(stacks) if !stacks.is_empty() => {}
        _ => {
          return Err(TablesError::UnknownSoftwareGroup(
            cluster.name.clone(),
            cluster.softwares.clone(),
          ));
        }
      }
      if cluster.mem.is_empty() {
        return Err(TablesError::InvalidEntry(
          cluster.name.clone(),
          "no memory tier defined".to_string(),
        ));
      }
    }
    for benchmark in self.benchmarks.values() {
      if !templates.contains(&benchmark.template) {
        return Err(TablesError::UnknownTemplate(
          benchmark.name.clone(),
          benchmark.template.clone(),
        ));
      }
      if benchmark.configurations.is_empty() {
        return Err(TablesError::InvalidEntry(
          benchmark.name.clone(),
          "no configuration defined".to_string(),
        ));
      }
    }
    Ok(())
  }

  pub fn cluster(&self, name: &str) -> Option<&ClusterSpec> {
    self.clusters.get(name)
  }

  pub fn benchmark(&self, name: &str) -> Option<&BenchmarkSpec> {
    self.benchmarks.get(name)
  }

  pub fn stacks_for(&self, cluster: &ClusterSpec) -> &[SoftwareStack] {
    self
      .stacks
      .get(&cluster.softwares)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Resolve the requested benchmarks, all of them when `names` is `None`.
  /// Every unknown name is reported at once.
  pub fn select_benchmarks(
    &self,
    names: Option<&[String]>,
  ) -> Result<Vec<&BenchmarkSpec>, TablesError> {
    select(&self.benchmarks, names).map_err(TablesError::UnknownTests)
  }

  pub fn select_clusters(&self, names: Option<&[String]>) -> Result<Vec<&ClusterSpec>, TablesError> {
    select(&self.clusters, names).map_err(TablesError::UnknownClusters)
  }
}

fn select<'a, T>(
  table: &'a LinkedHashMap<String, T>,
  names: Option<&[String]>,
) -> Result<Vec<&'a T>, Vec<String>> {
  let Some(names) = names else {
    return Ok(table.values().collect());
  };

  let missing: Vec<String> = names
    .iter()
    .filter(|name| !table.contains_key(name.as_str()))
    .cloned()
    .collect();
  if !missing.is_empty() {
    return Err(missing);
  }

  let mut selected: Vec<&String> = Vec::with_capacity(names.len());
  for name in names {
    if !selected.contains(&name) {
      selected.push(name);
    }
  }
  Ok(
    selected
      .into_iter()
      .filter_map(|name| table.get(name.as_str()))
      .collect(),
  )
}

fn parse_configuration(benchmark: &str, item: &YamlOwned) -> Result<RunConfiguration, TablesError> {
  let pair = to_sequence(item)?;
  match pair.as_slice() {
    [nnodes, ntasks] => Ok(RunConfiguration {
      nnodes: to_count(nnodes)?,
      ntasks: to_optional_count(ntasks)?,
    }),
    _ => Err(TablesError::InvalidEntry(
      benchmark.to_string(),
      format!("configuration {:?} is not a [nnodes, ntasks] pair", item),
    )),
  }
}
