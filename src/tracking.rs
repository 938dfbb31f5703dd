//! File-backed run tracking.
//!
//! A tracking store is a directory laid out as
//! `<uri>/<experiment_id>/<run_id>/meta.yaml`, with every run owning an
//! `artifacts` directory next to its metadata.

use std::{ fs, path::{ Path, PathBuf } };

use serde::{ Serialize, Deserialize };
use uuid::Uuid;

use crate::{
  model_dir::data_path,
  error::{ Error, Result },
};


pub const TRACKING_URI_ENV: &str = "MICROFLOW_TRACKING_URI";
pub const DEFAULT_TRACKING_URI: &str = "mlruns";
pub const DEFAULT_EXPERIMENT_ID: &str = "0";

const META_FILE: &str = "meta.yaml";
const ARTIFACTS_DIR: &str = "artifacts";
const RUNS_SCHEME: &str = "runs:/";


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
  Running,
  Finished,
  Failed,
}


/// Metadata persisted for every run.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
  pub run_uuid: String,
  pub experiment_id: String,
  pub status: RunStatus,
  /// Milliseconds since the Unix epoch.
  pub start_time: i64,
  pub end_time: Option<i64>,
  pub artifact_uri: PathBuf,
}


#[derive(Debug, Clone, PartialEq)]
pub struct Run {
  pub info: RunInfo,
}

impl Run {
  pub fn id(&self) -> &str {
    &self.info.run_uuid
  }

  fn dir(&self) -> &Path {
    self.info.artifact_uri.parent().unwrap_or(&self.info.artifact_uri)
  }

  fn save(&self) -> Result<()> {
    fs::write(self.dir().join(META_FILE), serde_yaml::to_string(&self.info)?)?;
    Ok(())
  }

  fn load(dir: &Path) -> Result<Self> {
    let info = serde_yaml::from_str(&fs::read_to_string(dir.join(META_FILE))?)?;
    Ok(Self { info })
  }
}


/// Handle on a tracking store and the run currently active in it.
///
/// At most one run is active per handle. Dropping the handle ends the
/// active run, marking it finished.

#[derive(Debug)]
pub struct Tracking {
  uri: PathBuf,
  experiment_id: String,
  active: Option<Run>,
}

impl Tracking {
  pub fn new(uri: impl Into<PathBuf>) -> Self {
    Self {
      uri: uri.into(),
      experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
      active: None,
    }
  }

  /// Store named by `MICROFLOW_TRACKING_URI`, falling back to `./mlruns`.

  pub fn from_env() -> Self {
    let uri = std::env::var(TRACKING_URI_ENV).unwrap_or_else(|_| DEFAULT_TRACKING_URI.to_string() );
    Self::new(uri)
  }

  pub fn with_experiment(mut self, experiment_id: impl Into<String>) -> Self {
    self.experiment_id = experiment_id.into();
    self
  }

  pub fn tracking_uri(&self) -> &Path {
    &self.uri
  }

  /// Point subsequent runs at another store. An active run keeps its
  /// artifact location.

  pub fn set_tracking_uri(&mut self, uri: impl Into<PathBuf>) {
    self.uri = uri.into();
  }

  pub fn experiment_id(&self) -> &str {
    &self.experiment_id
  }

  pub fn start_run(&mut self) -> Result<&Run> {
    if let Some(run) = &self.active {
      return Err(Error::RunActive(run.id().to_string()))
    }
    let run_uuid = Uuid::new_v4().simple().to_string();
    let dir = self.uri.join(&self.experiment_id).join(&run_uuid);
    let artifact_uri = dir.join(ARTIFACTS_DIR);
    fs::create_dir_all(&artifact_uri)?;

    let run = Run {
      info: RunInfo {
        run_uuid,
        experiment_id: self.experiment_id.clone(),
        status: RunStatus::Running,
        start_time: now(),
        end_time: None,
        artifact_uri,
      },
    };
    run.save()?;
    log::info!("Started run {} in {}", run.id(), self.uri.display());
    Ok(&*self.active.insert(run))
  }

  pub fn active_run(&self) -> Option<&Run> {
    self.active.as_ref()
  }

  /// Finish the active run. Does nothing when no run is active.

  pub fn end_run(&mut self) -> Result<()> {
    self.end_run_with_status(RunStatus::Finished)
  }

  pub fn end_run_with_status(&mut self, status: RunStatus) -> Result<()> {
    let Some(mut run) = self.active.take() else { return Ok(()) };
    run.info.status = status;
    run.info.end_time = Some(now());
    run.save()?;
    log::info!("Ended run {} as {:?}", run.id(), status);
    Ok(())
  }

  /// Read a run's metadata from any experiment of this store.

  pub fn get_run(&self, run_id: &str) -> Result<Run> {
    if let Some(run) = self.active.as_ref().filter(|run| run.id() == run_id ) {
      return Ok(run.clone())
    }
    if run_id.is_empty() || run_id.contains(['/', '\\', '.']) {
      return Err(Error::RunNotFound(run_id.to_string()))
    }
    let experiments = match fs::read_dir(&self.uri) {
      Ok(entries) => entries,
      Err(_) => return Err(Error::RunNotFound(run_id.to_string())),
    };
    for entry in experiments {
      let dir = entry?.path().join(run_id);
      if dir.join(META_FILE).is_file() {
        return Run::load(&dir)
      }
    }
    Err(Error::RunNotFound(run_id.to_string()))
  }

  pub fn artifact_dir(&self, run_id: &str) -> Result<PathBuf> {
    Ok(self.get_run(run_id)?.info.artifact_uri)
  }

  /// Turn an artifact URI into a local path.
  ///
  /// `runs:/<run_id>/<path>` names a path below a run's artifact directory.
  /// Plain paths and `file://` URIs are returned as they are.

  pub fn resolve(&self, uri: &str) -> Result<PathBuf> {
    if let Some(rest) = uri.strip_prefix(RUNS_SCHEME) {
      let (run_id, path) = rest.split_once('/').unwrap_or((rest, ""));
      if run_id.is_empty() {
        return Err(Error::InvalidUri(uri.to_string()))
      }
      let dir = self.artifact_dir(run_id)?;
      return if path.is_empty() { Ok(dir) } else { data_path(&dir, path) }
    }
    if let Some(path) = uri.strip_prefix("file://") {
      return Ok(PathBuf::from(path))
    }
    if uri.contains("://") {
      return Err(Error::InvalidUri(uri.to_string()))
    }
    Ok(PathBuf::from(uri))
  }
}

impl Drop for Tracking {
  fn drop(&mut self) {
    if let Err(err) = self.end_run() {
      log::warn!("Could not end run on drop: {err}");
    }
  }
}

fn now() -> i64 {
  chrono::Utc::now().timestamp_millis()
}
