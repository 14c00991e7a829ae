pub mod models;
pub mod schema;


use std::{
  fs, io,
  path::{Path, PathBuf},
};

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::debug;
use thiserror::Error;

use crate::core::database::{
  models::Job,
  schema::{hpl, jobs, osu_allreduce, osu_alltoall, osu_bandwidth, osu_bibandwidth, osu_latency},
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("IO Error: {0}")]
  IoError(#[from] io::Error),
  #[error("Could not connect to database: {0}")]
  ConnectionError(#[from] diesel::ConnectionError),
  #[error("Database migration error: {0}")]
  MigrationError(#[from] Box<dyn std::error::Error + Send + Sync>),
  #[error("Database operation error: {0}")]
  OperationError(#[from] diesel::result::Error),
  #[error("Database path {0:?} is not valid UTF-8")]
  InvalidPath(PathBuf),
}

pub struct Database {
  conn: SqliteConnection,
}

impl Database {
  /// Open (creating if needed) the database file at `path`, creating parent directories.
  pub fn open_path(path: &Path) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent)?;
    }
    let url = path
      .to_str()
      .ok_or_else(|| StorageError::InvalidPath(path.to_path_buf()))?;
    Self::open(url)
  }

  /// Connect to `url` (a file path or `:memory:`), enable foreign keys and migrate.
  pub fn open(url: &str) -> Result<Self, StorageError> {
    let mut conn = SqliteConnection::establish(url)?;
    diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
    conn
      .run_pending_migrations(MIGRATIONS)
      .map_err(StorageError::MigrationError)?;

    debug!("Connected to database at {}.", url);
    Ok(Database { conn })
  }

  /// Run `f` in a transaction: committed on `Ok`, rolled back on `Err`.
  pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
  where
    F: FnOnce(&mut SqliteConnection) -> Result<T, E>,
    E: From<diesel::result::Error>,
  {
    self.conn.transaction(f)
  }

  /// Row count of every table, in a fixed order.
  pub fn table_counts(&mut self) -> Result<Vec<(&'static str, i64)>, StorageError> {
    let conn = &mut self.conn;
    Ok(vec![
      ("jobs", jobs::table.count().get_result::<i64>(conn)?),
      ("osu_latency", osu_latency::table.count().get_result::<i64>(conn)?),
      ("osu_bandwidth", osu_bandwidth::table.count().get_result::<i64>(conn)?),
      ("osu_bibandwidth", osu_bibandwidth::table.count().get_result::<i64>(conn)?),
      ("osu_alltoall", osu_alltoall::table.count().get_result::<i64>(conn)?),
      ("osu_allreduce", osu_allreduce::table.count().get_result::<i64>(conn)?),
      ("hpl", hpl::table.count().get_result::<i64>(conn)?),
    ])
  }

  pub fn jobs(&mut self) -> Result<Vec<Job>, StorageError> {
    let jobs = jobs::table
      .select(Job::as_select())
      .order((jobs::cluster, jobs::id))
      .load(&mut self.conn)?;
    Ok(jobs)
  }
}

pub fn find_job(conn: &mut SqliteConnection, cluster: &str, id: i64) -> QueryResult<Option<Job>> {
  jobs::table
    .find((cluster, id))
    .select(Job::as_select())
    .first(conn)
    .optional()
}

pub fn insert_job(conn: &mut SqliteConnection, job: &Job) -> QueryResult<()> {
  diesel::insert_into(jobs::table).values(job).execute(conn)?;
  Ok(())
}
