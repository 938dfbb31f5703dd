//! Descriptor of a saved model directory.
//!
//! Every model directory carries an `MLmodel` YAML file listing the
//! flavors the model can be loaded as. Each flavor maps to a flat table
//! of string settings, such as the file holding the model data.

use std::{ fs, collections::BTreeMap, path::{ Path, PathBuf } };

use serde::{ Serialize, Deserialize };

use crate::error::{ Error, Result };


pub const MLMODEL_FILE: &str = "MLmodel";

/// Settings of a single flavor.
pub type FlavorConfig = BTreeMap<String, String>;


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact_path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_id: Option<String>,
  pub utc_time_created: String,
  pub flavors: BTreeMap<String, FlavorConfig>,
}

impl ModelDescriptor {
  pub fn new() -> Self {
    Self {
      artifact_path: None,
      run_id: None,
      utc_time_created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
      flavors: BTreeMap::new(),
    }
  }

  pub fn add_flavor<K, V>(&mut self, name: &str, settings: impl IntoIterator<Item = (K, V)>) -> &mut Self
  where
    K: Into<String>,
    V: Into<String>,
  {
    let config = settings
      .into_iter()
      .map(|(key, value)| (key.into(), value.into()) )
      .collect();
    self.flavors.insert(name.to_string(), config);
    self
  }

  pub fn flavor(&self, name: &str) -> Option<&FlavorConfig> {
    self.flavors.get(name)
  }

  /// Look up a flavor setting, failing if either the flavor or the key is absent.

  pub fn setting(&self, dir: &Path, flavor: &str, key: &str) -> Result<&str> {
    let config = self.flavor(flavor).ok_or_else(|| Error::MissingFlavor {
      path: dir.to_path_buf(),
      flavor: flavor.to_string(),
    })?;
    config.get(key)
      .map(String::as_str)
      .ok_or_else(|| Error::MissingFlavorKey { flavor: flavor.to_string(), key: key.to_string() })
  }

  pub fn save(&self, dir: &Path) -> Result<()> {
    fs::write(dir.join(MLMODEL_FILE), serde_yaml::to_string(self)?)?;
    Ok(())
  }

  pub fn load(dir: &Path) -> Result<Self> {
    if !dir.is_dir() {
      return Err(Error::NotADirectory(dir.to_path_buf()))
    }
    Ok(serde_yaml::from_str(&fs::read_to_string(dir.join(MLMODEL_FILE))?)?)
  }
}

impl Default for ModelDescriptor {
  fn default() -> Self {
    Self::new()
  }
}


/// Resolve a file named by a flavor setting inside the model directory.
/// Absolute or escaping paths are rejected.

pub(crate) fn data_path(dir: &Path, file: &str) -> Result<PathBuf> {
  let relative = Path::new(file);
  if file.is_empty() || relative.is_absolute() || relative.components().any(|c| matches!(c, std::path::Component::ParentDir) ) {
    return Err(Error::InvalidUri(file.to_string()))
  }
  Ok(dir.join(relative))
}
