use serde::{ Serialize, Deserialize };

use crate::internal::*;


/// The shape of a [Tensor](crate::Tensor).
///
/// Tensors are always stored contiguously in row-major order,
/// so a shape is fully described by its dimensions.

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<usize>,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self { dims: dims.to_vec() }
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn strides(&self) -> Vec<usize> {
    let mut strides = vec![1; self.rank()];
    for i in (1..self.rank()).rev() {
      strides[i - 1] = strides[i] * self.dims[i];
    }
    strides
  }

  pub(crate) fn index(&self, indices: &[usize]) -> usize {
    debug_assert!(indices.len() <= self.rank(), "Too many indices for {self}");
    indices.iter()
      .zip(self.strides())
      .map(|(i, s)| i * s )
      .sum()
  }

  pub fn unsqueeze(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.rank(), true);
    let mut dims = self.dims.clone();
    dims.insert(dim, 1);
    Self { dims }
  }

  pub fn squeeze(&self) -> Self {
    Self { dims: self.dims.iter().copied().filter(|&d| d != 1 ).collect() }
  }

  /// Shape of the trailing `n` dimensions.

  pub fn tail(&self, n: usize) -> Self {
    Self::new(&self.dims[self.rank() - n..])
  }
}

impl std::ops::Index<isize> for Shape {
  type Output = usize;

  fn index(&self, i: isize) -> &usize {
    &self.dims[negative_index(i, self.rank(), false)]
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape{:?}", self.dims)
  }
}
