//! Native persistence of [Sequential] models.
//!
//! A saved model is a directory holding the postcard encoded layers in
//! `model.bin` and an `MLmodel` descriptor that lists both the native
//! flavor and the generic [pyfunc](crate::pyfunc) flavor.

use std::{ fs, path::Path };

use crate::{
  tensor::Tensor,
  layer::Sequential,
  predict::predict_proba,
  tracking::Tracking,
  model_dir::{ ModelDescriptor, data_path },
  pyfunc::{ self, PredictFn },
  error::{ Error, Result },
};


pub const FLAVOR_NAME: &str = "microflow";
pub const MODEL_DATA: &str = "model.bin";

const MODEL_DATA_KEY: &str = "model_data";
const VERSION_KEY: &str = "microflow_version";


/// Save `model` into a new directory at `path`.

pub fn save_model(model: &Sequential<f32>, path: impl AsRef<Path>) -> Result<()> {
  save_with(model, path.as_ref(), ModelDescriptor::new())
}

fn save_with(model: &Sequential<f32>, dir: &Path, mut descriptor: ModelDescriptor) -> Result<()> {
  if dir.exists() {
    return Err(Error::AlreadyExists(dir.to_path_buf()))
  }
  let bytes = model.to_bytes()?;
  descriptor.add_flavor(FLAVOR_NAME, [
    (MODEL_DATA_KEY, MODEL_DATA),
    (VERSION_KEY, env!("CARGO_PKG_VERSION")),
  ]);
  pyfunc::add_to_model(&mut descriptor, FLAVOR_NAME, MODEL_DATA);

  if let Err(err) = write_model_dir(dir, &bytes, &descriptor) {
    // Leave nothing behind that would block the next attempt
    if let Err(cleanup) = fs::remove_dir_all(dir) {
      log::warn!("Could not remove partial model at {}: {cleanup}", dir.display());
    }
    return Err(err)
  }

  log::info!("Saved model with {} parameters to {}", model.num_parameters(), dir.display());
  Ok(())
}


fn write_model_dir(dir: &Path, bytes: &[u8], descriptor: &ModelDescriptor) -> Result<()> {
  fs::create_dir_all(dir)?;
  fs::write(dir.join(MODEL_DATA), bytes)?;
  descriptor.save(dir)
}


pub fn load_model(path: impl AsRef<Path>) -> Result<Sequential<f32>> {
  let dir = path.as_ref();
  let descriptor = ModelDescriptor::load(dir)?;
  let file = descriptor.setting(dir, FLAVOR_NAME, MODEL_DATA_KEY)?;
  if let Ok(version) = descriptor.setting(dir, FLAVOR_NAME, VERSION_KEY) {
    log::debug!("Model at {} written by version {version}", dir.display());
  }
  let model = read_model(&data_path(dir, file)?)?;
  log::info!("Loaded model from {}", dir.display());
  Ok(model)
}

fn read_model(file: &Path) -> Result<Sequential<f32>> {
  Sequential::from_bytes(&fs::read(file)?)
}


/// Save `model` as an artifact of the active run, starting a run if
/// none is active. Returns the id of the run.

pub fn log_model(tracking: &mut Tracking, model: &Sequential<f32>, artifact_path: &str) -> Result<String> {
  let run = match tracking.active_run().cloned() {
    Some(run) => run,
    None => tracking.start_run()?.clone(),
  };
  let dir = data_path(&run.info.artifact_uri, artifact_path)?;
  log::debug!("Logging model to {}", dir.display());

  let mut descriptor = ModelDescriptor::new();
  descriptor.run_id = Some(run.id().to_string());
  descriptor.artifact_path = Some(artifact_path.to_string());
  save_with(model, &dir, descriptor)?;
  Ok(run.info.run_uuid)
}

pub fn load_model_from_run(tracking: &Tracking, artifact_path: &str, run_id: &str) -> Result<Sequential<f32>> {
  load_model(tracking.resolve(&format!("runs:/{run_id}/{artifact_path}"))?)
}


/// [PredictFn] backed by a native model.
///
/// Outputs class probabilities. A single sample yields a vector, a batch
/// yields one row per sample.

#[derive(Debug, Clone)]
pub struct ModelPredictor {
  model: Sequential<f32>,
}

impl ModelPredictor {
  pub fn new(model: Sequential<f32>) -> Self {
    Self { model }
  }

  pub fn model(&self) -> &Sequential<f32> {
    &self.model
  }
}

impl PredictFn for ModelPredictor {
  fn predict(&self, input: &Tensor<f32>) -> Result<Tensor<f32>> {
    let single = self.model.sample_rank() == Some(input.rank());
    let batch = if single { input.unsqueeze(0) } else { input.clone() };
    self.model.check_input(&batch)?;
    let proba = predict_proba(&self.model, &batch);
    Ok(if single { proba.at(0) } else { proba })
  }
}

pub(crate) fn load_predictor(file: &Path) -> Result<ModelPredictor> {
  Ok(ModelPredictor::new(read_model(file)?))
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ Layer, internal::manual_seed };

  fn tiny() -> Sequential<f32> {
    Sequential::new(vec![
      Layer::conv2d(3, 2, [3, 3]),
      Layer::ReLU,
      Layer::MaxPool2d { size: 2 },
      Layer::Flatten,
      Layer::dense(2, 4),
    ])
  }

  #[test]
  fn directory_layout() {
    manual_seed(31);
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("model");
    save_model(&tiny(), &dir).unwrap();
    assert!(dir.join(MODEL_DATA).is_file());

    let descriptor = ModelDescriptor::load(&dir).unwrap();
    assert_eq!(descriptor.setting(&dir, FLAVOR_NAME, VERSION_KEY).unwrap(), env!("CARGO_PKG_VERSION"));
    assert_eq!(descriptor.setting(&dir, pyfunc::FLAVOR_NAME, pyfunc::LOADER_MODULE).unwrap(), FLAVOR_NAME);
    assert!(descriptor.run_id.is_none());

    assert!(matches!(save_model(&tiny(), &dir), Err(Error::AlreadyExists(_))));
  }

  #[test]
  fn predictor_shapes() {
    manual_seed(32);
    let predictor = ModelPredictor::new(tiny());
    let single = predictor.predict(&Tensor::rand(&[3, 4, 4])).unwrap();
    assert_eq!(single.shape().dims, vec![4]);
    let batch = predictor.predict(&Tensor::rand(&[5, 3, 4, 4])).unwrap();
    assert_eq!(batch.shape().dims, vec![5, 4]);
    assert!(matches!(predictor.predict(&Tensor::rand(&[2, 4, 4])), Err(Error::ShapeMismatch { .. })));
    assert!(matches!(predictor.predict(&Tensor::rand(&[3, 6, 6])), Err(Error::ShapeMismatch { .. })));
  }

  #[test]
  fn corrupt_model_data() {
    manual_seed(33);
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("model");
    save_model(&tiny(), &dir).unwrap();
    fs::write(dir.join(MODEL_DATA), [1u8, 2, 3]).unwrap();
    assert!(matches!(load_model(&dir), Err(Error::Encode(_) | Error::UnsupportedVersion(_))));
    fs::remove_file(dir.join(MODEL_DATA)).unwrap();
    assert!(matches!(load_model(&dir), Err(Error::Io(_))));
  }

  #[test]
  fn log_into_active_run() {
    manual_seed(34);
    let store = tempfile::tempdir().unwrap();
    let mut tracking = Tracking::new(store.path());
    let started = tracking.start_run().unwrap().id().to_string();
    let run_id = log_model(&mut tracking, &tiny(), "model").unwrap();
    assert_eq!(run_id, started);

    let dir = tracking.resolve(&format!("runs:/{run_id}/model")).unwrap();
    let descriptor = ModelDescriptor::load(&dir).unwrap();
    assert_eq!(descriptor.run_id.as_deref(), Some(run_id.as_str()));
    assert_eq!(descriptor.artifact_path.as_deref(), Some("model"));
    assert!(matches!(log_model(&mut tracking, &tiny(), "../escape"), Err(Error::InvalidUri(_))));
    assert!(load_model_from_run(&tracking, "model", &run_id).is_ok());
    assert!(matches!(load_model_from_run(&tracking, "../artifacts/model", &run_id), Err(Error::InvalidUri(_))));
    assert!(matches!(pyfunc::load_pyfunc_from_run(&tracking, "model/../..", &run_id), Err(Error::InvalidUri(_))));
  }

  #[test]
  fn failed_save_leaves_nothing() {
    manual_seed(35);
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let dir = blocker.join("model");
    assert!(matches!(save_model(&tiny(), &dir), Err(Error::Io(_))));
    assert!(!dir.exists());

    fs::remove_file(&blocker).unwrap();
    save_model(&tiny(), &dir).unwrap();
    assert!(load_model(&dir).is_ok());
  }
}
