use chrono::NaiveDateTime;
use diesel::{dsl::exists, prelude::*};

use super::schema::{hpl, jobs, osu_allreduce, osu_alltoall, osu_bandwidth, osu_bibandwidth, osu_latency};

/// One scheduler job, identified by (cluster, id). Timestamps are UTC.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = jobs)]
pub struct Job {
  pub cluster: String,
  pub id: i64,
  pub start: NaiveDateTime,
  pub finish: NaiveDateTime,
  pub nnodes: i32,
  pub ntasks: i32,
  pub target: String,
  pub compiler: String,
  pub lapack: Option<String>,
  pub python: Option<String>,
  pub mpi: String,
  pub nodelist: String,
  pub root: String,
}

/// Row of a table keyed by message size, holding a single measurement.
pub trait SizedMetric {
  const TABLE: &'static str;

  fn exists(conn: &mut SqliteConnection, cluster: &str, jobid: i64, size: i64)
  -> QueryResult<bool>;

  fn insert(
    conn: &mut SqliteConnection,
    cluster: &str,
    jobid: i64,
    size: i64,
    value: f64,
  ) -> QueryResult<usize>;
}

macro_rules! sized_metric {
  ($row:ident, $table:ident, $value:ident) => {
    #[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
    #[diesel(check_for_backend(diesel::sqlite::Sqlite))]
    #[diesel(table_name = $table)]
    pub struct $row {
      pub cluster: String,
      pub jobid: i64,
      pub size: i64,
      pub $value: f64,
    }

    impl SizedMetric for $row {
      const TABLE: &'static str = stringify!($table);

      fn exists(
        conn: &mut SqliteConnection,
        cluster: &str,
        jobid: i64,
        size: i64,
      ) -> QueryResult<bool> {
        diesel::select(exists(
          $table::table
            .filter($table::cluster.eq(cluster))
            .filter($table::jobid.eq(jobid))
            .filter($table::size.eq(size)),
        ))
        .get_result(conn)
      }

      fn insert(
        conn: &mut SqliteConnection,
        cluster: &str,
        jobid: i64,
        size: i64,
        value: f64,
      ) -> QueryResult<usize> {
        let row = $row {
          cluster: cluster.to_string(),
          jobid,
          size,
          $value: value,
        };
        diesel::insert_into($table::table).values(&row).execute(conn)
      }
    }
  };
}

sized_metric!(OsuLatency, osu_latency, latency);
sized_metric!(OsuBandwidth, osu_bandwidth, bandwidth);
sized_metric!(OsuBiBandwidth, osu_bibandwidth, bandwidth);
sized_metric!(OsuAlltoall, osu_alltoall, latency);
sized_metric!(OsuAllreduce, osu_allreduce, latency);

/// One HPL result line.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = hpl)]
pub struct HplRow {
  pub cluster: String,
  pub jobid: i64,
  pub variant: String,
  pub n: i64,
  pub nb: i32,
  pub p: i32,
  #[diesel(column_name = q_)]
  pub q: i32,
  pub time: f64,
  pub gflops: f64,
}

impl HplRow {
  pub fn exists(&self, conn: &mut SqliteConnection) -> QueryResult<bool> {
    diesel::select(exists(
      hpl::table
        .filter(hpl::cluster.eq(&self.cluster))
        .filter(hpl::jobid.eq(self.jobid))
        .filter(hpl::variant.eq(&self.variant))
        .filter(hpl::n.eq(self.n))
        .filter(hpl::nb.eq(self.nb))
        .filter(hpl::p.eq(self.p))
        .filter(hpl::q_.eq(self.q)),
    ))
    .get_result(conn)
  }

  pub fn insert(&self, conn: &mut SqliteConnection) -> QueryResult<usize> {
    diesel::insert_into(hpl::table).values(self).execute(conn)
  }
}
