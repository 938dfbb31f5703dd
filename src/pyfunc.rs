//! Framework independent model loading.
//!
//! A model directory that lists the `python_function` flavor names the
//! module able to load it, along with the data that module needs. Loading
//! through this flavor yields a [PredictFn] regardless of how the model
//! is represented natively.

use std::{ fmt::Debug, path::Path };

use crate::{
  tensor::Tensor,
  tracking::Tracking,
  model_dir::{ ModelDescriptor, data_path },
  flavor,
  error::{ Error, Result },
};


pub const FLAVOR_NAME: &str = "python_function";
pub const LOADER_MODULE: &str = "loader_module";
pub const DATA: &str = "data";


/// Uniform prediction interface over any loaded model.

pub trait PredictFn: Debug {
  /// Predict a single sample or a batch of samples.
  fn predict(&self, input: &Tensor<f32>) -> Result<Tensor<f32>>;
}


/// Register the generic flavor, loadable through `loader_module` from `data`.

pub fn add_to_model(descriptor: &mut ModelDescriptor, loader_module: &str, data: &str) {
  descriptor.add_flavor(FLAVOR_NAME, [(LOADER_MODULE, loader_module), (DATA, data)]);
}


pub fn load_pyfunc(path: impl AsRef<Path>) -> Result<Box<dyn PredictFn>> {
  let dir = path.as_ref();
  let descriptor = ModelDescriptor::load(dir)?;
  let module = descriptor.setting(dir, FLAVOR_NAME, LOADER_MODULE)?;
  let data = data_path(dir, descriptor.setting(dir, FLAVOR_NAME, DATA)?)?;
  log::info!("Loading {} via {module}", dir.display());
  match module {
    flavor::FLAVOR_NAME => Ok(Box::new(flavor::load_predictor(&data)?)),
    _ => Err(Error::UnknownLoader(module.to_string())),
  }
}

pub fn load_pyfunc_from_run(tracking: &Tracking, artifact_path: &str, run_id: &str) -> Result<Box<dyn PredictFn>> {
  load_pyfunc(tracking.resolve(&format!("runs:/{run_id}/{artifact_path}"))?)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_loader() {
    let dir = tempfile::tempdir().unwrap();
    let mut descriptor = ModelDescriptor::new();
    add_to_model(&mut descriptor, "elsewhere", "model.bin");
    descriptor.save(dir.path()).unwrap();
    assert!(matches!(load_pyfunc(dir.path()), Err(Error::UnknownLoader(module)) if module == "elsewhere"));
  }

  #[test]
  fn missing_flavor() {
    let dir = tempfile::tempdir().unwrap();
    ModelDescriptor::new().save(dir.path()).unwrap();
    assert!(matches!(load_pyfunc(dir.path()), Err(Error::MissingFlavor { flavor, .. }) if flavor == FLAVOR_NAME));
  }
}
