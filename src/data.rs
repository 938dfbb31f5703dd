use rand::{ Rng, seq::SliceRandom };

use crate::{
  internal::with_rng,
  scalar::{ Inner, Real },
  tensor::Tensor,
};


/// In-memory list of `(input, label)` samples.

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<T: Inner> {
  samples: Vec<(Tensor<T>, usize)>,
}

impl<T: Inner> Dataset<T> {
  pub fn new(samples: Vec<(Tensor<T>, usize)>) -> Self {
    Self { samples }
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&(Tensor<T>, usize)> {
    self.samples.get(index)
  }

  pub fn iter(&self) -> impl Iterator<Item = &(Tensor<T>, usize)> {
    self.samples.iter()
  }
}

impl<T: Real> Dataset<T> {
  /// Random inputs drawn uniformly from [0, 1), each paired with a
  /// uniformly drawn label below `num_classes`.
  ///
  /// Panics if `num_classes` is zero.

  pub fn synthetic(num_samples: usize, dims: &[usize], num_classes: usize) -> Self {
    assert!(num_classes > 0, "Cannot draw labels from zero classes");
    let samples = (0..num_samples)
      .map(|_| {
        let input = Tensor::rand(dims);
        let label = with_rng(|rng| rng.gen_range(0, num_classes) );
        (input, label)
      })
      .collect();
    Self { samples }
  }
}


/// A stacked group of samples.

#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T: Inner> {
  pub inputs: Tensor<T>,
  pub labels: Vec<usize>,
}


/// Splits a [Dataset] into [batches](Batch), optionally shuffled.

#[derive(Debug, Clone)]
pub struct DataLoader<'a, T: Inner> {
  dataset: &'a Dataset<T>,
  batch_size: usize,
  shuffle: bool,
  drop_last: bool,
}

impl<'a, T: Inner> DataLoader<'a, T> {
  pub fn new(dataset: &'a Dataset<T>, batch_size: usize) -> Self {
    assert!(batch_size > 0, "Batch size must be positive");
    Self { dataset, batch_size, shuffle: false, drop_last: false }
  }

  pub fn shuffle(mut self, shuffle: bool) -> Self {
    self.shuffle = shuffle;
    self
  }

  /// Skip the final batch if it would be smaller than the batch size.

  pub fn drop_last(mut self, drop_last: bool) -> Self {
    self.drop_last = drop_last;
    self
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub fn dataset(&self) -> &'a Dataset<T> {
    self.dataset
  }

  /// Number of samples the loader draws from.

  pub fn sampler_len(&self) -> usize {
    self.dataset.len()
  }

  /// Number of batches per pass.

  pub fn len(&self) -> usize {
    let n = self.dataset.len();
    if self.drop_last { n / self.batch_size } else { (n + self.batch_size - 1) / self.batch_size }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// One pass over the dataset. Shuffled loaders draw a new order on every call.

  pub fn batches(&self) -> impl Iterator<Item = Batch<T>> + 'a {
    let mut order: Vec<usize> = (0..self.dataset.len()).collect();
    if self.shuffle {
      with_rng(|rng| order.shuffle(rng) );
    }
    let dataset = self.dataset;
    let batch_size = self.batch_size;
    let num_batches = self.len();
    (0..num_batches).map(move |b| {
      let indices = &order[b * batch_size..((b + 1) * batch_size).min(order.len())];
      let inputs: Vec<Tensor<T>> = indices.iter().map(|&i| dataset.samples[i].0.clone() ).collect();
      Batch {
        inputs: Tensor::rows(&inputs),
        labels: indices.iter().map(|&i| dataset.samples[i].1 ).collect(),
      }
    })
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::internal::manual_seed;

  #[test]
  fn synthetic_is_seeded() {
    manual_seed(12345);
    let a = Dataset::<f32>::synthetic(4, &[3, 2, 2], 10);
    manual_seed(12345);
    let b = Dataset::<f32>::synthetic(4, &[3, 2, 2], 10);
    assert_eq!(a, b);
    assert!(a.iter().all(|(input, label)| input.shape().dims == vec![3, 2, 2] && *label < 10 ));
  }

  #[test]
  #[should_panic(expected = "zero classes")]
  fn synthetic_needs_classes() {
    Dataset::<f32>::synthetic(4, &[2], 0);
  }

  #[test]
  fn batching() {
    manual_seed(5);
    let dataset = Dataset::<f32>::synthetic(30, &[2], 10);
    let loader = DataLoader::new(&dataset, 16);
    let batches: Vec<_> = loader.batches().collect();
    assert_eq!(loader.len(), 2);
    assert_eq!(batches[0].inputs.shape().dims, vec![16, 2]);
    assert_eq!(batches[1].labels.len(), 14);
    assert_eq!(batches[1].inputs.at(0), dataset.get(16).unwrap().0);

    let dropping = DataLoader::new(&dataset, 16).drop_last(true);
    assert_eq!(dropping.batches().count(), 1);
    assert_eq!(dropping.sampler_len(), 30);
  }

  #[test]
  fn shuffling_keeps_samples() {
    manual_seed(6);
    let dataset = Dataset::<f32>::synthetic(10, &[1], 3);
    let loader = DataLoader::new(&dataset, 4).shuffle(true);
    let mut seen: Vec<f32> = loader.batches()
      .flat_map(|batch| batch.inputs.into_raw() )
      .collect();
    let mut all: Vec<f32> = dataset.iter().map(|(input, _)| input.item() ).collect();
    seen.sort_by(|a, b| a.partial_cmp(b).unwrap() );
    all.sort_by(|a, b| a.partial_cmp(b).unwrap() );
    assert_eq!(seen, all);
  }
}
