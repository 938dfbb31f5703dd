use serde::{ Serialize, de::DeserializeOwned };

use crate::{
  scalar::Real,
  tensor::Tensor,
  layer::Sequential,
  data::DataLoader,
};


/// Class probabilities for a batch of inputs, without recording a graph.

pub fn predict_proba<T>(model: &Sequential<T>, inputs: &Tensor<T>) -> Tensor<T>
where
  T: Real + Serialize + DeserializeOwned,
{
  model.run(inputs).softmax()
}


/// Most likely class of every sample drawn from `loader`.
///
/// Predictions of batch `i` land at offset `i * batch_size`, so the result
/// lines up with the dataset order of an unshuffled loader. Slots of
/// samples dropped by the loader stay zero.

pub fn predict<T>(model: &Sequential<T>, loader: &DataLoader<T>) -> Vec<usize>
where
  T: Real + Serialize + DeserializeOwned,
{
  let mut predictions = vec![0; loader.sampler_len()];
  for (i, batch) in loader.batches().enumerate() {
    let start = i * loader.batch_size();
    let classes = predict_proba(model, &batch.inputs).argmax();
    predictions[start..start + classes.size()].copy_from_slice(classes.raw());
  }
  log::debug!("Predicted {} samples in {} batches", predictions.len(), loader.len());
  predictions
}
