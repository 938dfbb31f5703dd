use std::path::Path;

use serde::{ Serialize, Deserialize, de::DeserializeOwned };

use crate::{
  scalar::{ Real, lit },
  layer::Sequential,
  data::{ Dataset, DataLoader },
  optimize::{ Optimizer, Strategy, SGD, Momentum },
  error::{ Error, Result },
};


/// Hyper parameters for [fit].
///
/// Missing fields fall back to their [default](TrainConfig::default) values
/// when deserializing, so a YAML file only needs to name what it changes.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
  pub epochs: usize,
  pub learning_rate: f32,
  pub batch_size: usize,
  pub shuffle: bool,
  pub drop_last: bool,
  /// Plain SGD when zero.
  pub momentum: f32,
}

impl Default for TrainConfig {
  fn default() -> Self {
    Self {
      epochs: 5,
      learning_rate: 0.01,
      batch_size: 16,
      shuffle: true,
      drop_last: true,
      momentum: 0.0,
    }
  }
}

impl TrainConfig {
  pub fn from_yaml(yaml: &str) -> Result<Self> {
    let config: Self = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    Self::from_yaml(&std::fs::read_to_string(path)?)
  }

  pub fn validate(&self) -> Result<()> {
    if self.batch_size == 0 {
      return Err(Error::InvalidConfig("batch_size must be positive".to_string()))
    }
    if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
      return Err(Error::InvalidConfig(format!("learning_rate {} must be positive", self.learning_rate)))
    }
    if !(0.0..1.0).contains(&self.momentum) {
      return Err(Error::InvalidConfig(format!("momentum {} must lie in [0, 1)", self.momentum)))
    }
    Ok(())
  }
}


/// Train `model` in place on `dataset`, minimizing cross-entropy.
///
/// Returns the mean batch loss of every epoch.
/// Panics if the batch size is zero. Configs read through
/// [TrainConfig::from_yaml] are already [validated](TrainConfig::validate).

pub fn fit<T>(model: &Sequential<T>, dataset: &Dataset<T>, config: &TrainConfig) -> Vec<T>
where
  T: Real + Serialize + DeserializeOwned,
{
  let rate = lit::<T>(config.learning_rate);
  if config.momentum == 0.0 {
    run(model, dataset, config, Optimizer::new(rate, SGD))
  } else {
    run(model, dataset, config, Optimizer::new(rate, Momentum::new(lit::<T>(config.momentum))))
  }
}

fn run<T, S>(model: &Sequential<T>, dataset: &Dataset<T>, config: &TrainConfig, mut optimizer: Optimizer<T, S>) -> Vec<T>
where
  T: Real + Serialize + DeserializeOwned,
  S: Strategy<T>,
{
  let params = model.parameters();
  log::info!("Training {} parameters on {} samples for {} epochs",
    model.num_parameters(), dataset.len(), config.epochs);

  (1..=config.epochs).map(|epoch| {
    let loader = DataLoader::new(dataset, config.batch_size)
      .shuffle(config.shuffle)
      .drop_last(config.drop_last);

    let mut total = T::zero();
    let mut count = 0;
    for (i, batch) in loader.batches().enumerate() {
      let logits = model.forward(&batch.inputs.tracked());
      let loss = logits.cross_entropy(&batch.labels);
      let value = loss.item();
      optimizer.minimize(&loss, &params);
      log::debug!("Epoch {epoch} batch {i}: loss {value:?}");
      total += value;
      count += 1;
    }

    let mean = if count == 0 {
      log::warn!("Epoch {epoch} saw no complete batch");
      T::zero()
    } else {
      total / lit(count as f32)
    };
    log::info!("Epoch {epoch}/{}: mean loss {mean:?}", config.epochs);
    mean
  }).collect()
}
