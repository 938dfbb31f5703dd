use std::fmt::Debug;

use rand::Rng;
use itertools::Itertools;
use serde::{ Serialize, Deserialize };

mod cops;
mod lops;
pub(crate) mod spatial;

use crate::{
  internal::*,
  shape::Shape,
  variable::Variable,
  scalar::{ Inner, Numeric, Real },
};


/// Multidimensional array, stored contiguously in row-major order.
///
/// Tensors may contain any type that satisfies [Inner], but
/// additional methods are available for [Numeric] and [Real]
/// inner types.
///
/// [Real] tensor types can be wrapped in a [Variable] by
/// calling [tracked](Tensor::tracked) or [trained](Tensor::trained).

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorData<T>")]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Vec<T>,
}

// Unchecked wire form of a tensor

#[derive(Deserialize)]
struct TensorData<T> {
  shape: Shape,
  data: Vec<T>,
}

impl<T: Inner> TryFrom<TensorData<T>> for Tensor<T> {
  type Error = String;

  fn try_from(raw: TensorData<T>) -> Result<Self, Self::Error> {
    if raw.shape.size() != raw.data.len() {
      return Err(format!("{} doesn't match data length {}", raw.shape, raw.data.len()))
    }
    Ok(Self { shape: raw.shape, data: raw.data })
  }
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Self {
    assert_eq!(shape.size(), data.len(),
      "{} doesn't match data length {}", shape, data.len());
    Self { shape, data }
  }

  pub fn new(shape: &[usize], data: Vec<T>) -> Self {
    Self::from_shape(Shape::new(shape), data)
  }

  pub fn vec(vec: &[T]) -> Self {
    Self::new(&[vec.len()], vec.to_vec())
  }

  pub fn scalar(item: T) -> Self {
    Self::new(&[], vec![item])
  }

  pub fn fill(shape: &[usize], filler: T) -> Self {
    Self::new(shape, vec![filler; shape.iter().product()])
  }

  /// Stack equally shaped tensors along a new leading dimension.

  pub fn rows(rows: &[Tensor<T>]) -> Self {
    assert!(!rows.is_empty(), "Cannot stack an empty list of tensors");
    let mut dims = rows[0].shape.dims.clone();
    assert!(rows.iter().all(|row| row.shape.dims == dims ),
      "Only tensors of equal shape can be stacked");
    dims.insert(0, rows.len());
    let data = rows.iter()
      .flat_map(|row| row.data.iter().copied() )
      .collect();
    Self::new(&dims, data)
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn dim(&self, dim: isize) -> usize {
    self.shape[dim]
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  pub fn raw(&self) -> &[T] {
    &self.data
  }

  pub(crate) fn raw_mut(&mut self) -> &mut [T] {
    &mut self.data
  }

  pub fn into_raw(self) -> Vec<T> {
    self.data
  }

  pub fn item(&self) -> T {
    assert!(self.size() == 1,
      "Can't extract item from non-scalar {}", self.shape);
    self.data[0]
  }

  /// Copy of the slice at `index` along the first dimension.

  pub fn at(&self, index: usize) -> Self {
    assert!(self.rank() > 0 && index < self.shape.dims[0],
      "Index {index} out of bounds for {}", self.shape);
    let len = self.size() / self.shape.dims[0];
    let start = index * len;
    Self::new(&self.shape.dims[1..], self.data[start..start + len].to_vec())
  }

  pub fn iter(&self) -> impl Iterator<Item = Self> + '_ {
    let len = if self.rank() == 0 { 0 } else { self.shape.dims[0] };
    (0..len).map(move |i| self.at(i) )
  }

  pub fn unsqueeze(&self, dim: isize) -> Self {
    Self::from_shape(self.shape.unsqueeze(dim), self.data.clone())
  }

  pub fn squeeze(&self) -> Self {
    Self::from_shape(self.shape.squeeze(), self.data.clone())
  }

  /// Swap the two dimensions of a matrix.

  pub fn transpose(&self) -> Self {
    assert_eq!(self.rank(), 2, "Only matrices can be transposed, got {}", self.shape);
    let (rows, cols) = (self.shape.dims[0], self.shape.dims[1]);
    let data = (0..cols)
      .cartesian_product(0..rows)
      .map(|(j, i)| self.data[i * cols + j] )
      .collect();
    Self::new(&[cols, rows], data)
  }

  pub fn vectorize<O, F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T) -> O,
  {
    let data = self.data.iter().copied().map(cb).collect();
    Tensor::from_shape(self.shape.clone(), data)
  }

  pub fn zip<O, F>(&self, rhs: &Self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: Fn((T, T)) -> O,
  {
    assert_eq!(self.shape.dims, rhs.shape.dims,
      "Cannot combine {} and {} tensors", self.shape, rhs.shape);
    let data = self.data.iter().copied()
      .zip(rhs.data.iter().copied())
      .map(cb)
      .collect();
    Tensor::from_shape(self.shape.clone(), data)
  }

  /// Collapse the last dimension into a single value per row.

  pub fn collapse<O, F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: Fn(&[T]) -> O,
  {
    let len = self.shape[-1];
    let data = self.data.chunks(len.max(1)).map(cb).collect();
    Tensor::new(&self.shape.dims[..self.rank() - 1], data)
  }

  /// Map every row along the last dimension to a row of equal length.

  pub fn map_rows<F>(&self, cb: F) -> Self
  where
    F: Fn(&[T]) -> Vec<T>,
  {
    let len = self.shape[-1];
    let data = self.data.chunks(len.max(1)).flat_map(cb).collect();
    Self::from_shape(self.shape.clone(), data)
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn zeros(shape: &[usize]) -> Self {
    Self::fill(shape, T::zero())
  }

  pub fn ones(shape: &[usize]) -> Self {
    Self::fill(shape, T::one())
  }

  pub fn arrange(shape: &[usize], start: T, step: T) -> Self {
    let size: usize = shape.iter().product();
    Self::new(shape, (0..size)
      .map(|i| T::from(i).unwrap_or_else(T::zero) * step + start )
      .collect())
  }

  pub fn sum(&self) -> T {
    self.data.iter().copied().sum()
  }

  /// Sum over all leading dimensions, leaving a tensor of the given
  /// trailing shape. Reverses broadcasting of a bias.

  pub fn sum_to(&self, dims: &[usize]) -> Self {
    assert!(self.shape.dims.ends_with(dims),
      "Cannot sum {} down to {:?}", self.shape, dims);
    let len: usize = dims.iter().product();
    let mut out = vec![T::zero(); len];
    for chunk in self.data.chunks(len.max(1)) {
      for (o, &value) in out.iter_mut().zip(chunk) {
        *o += value;
      }
    }
    Self::new(dims, out)
  }

  /// Index of the greatest value along the last dimension.
  /// Ties resolve to the first occurrence.

  pub fn argmax(&self) -> Tensor<usize> {
    self.collapse(|row| {
      row.iter()
        .enumerate()
        .fold((0, None), |(index, max), (i, &value)| match max {
          Some(max) if value <= max => (index, Some(max)),
          _ => (i, Some(value)),
        })
        .0
    })
  }
}

impl<T: Real> Tensor<T> {
  pub fn uniform(shape: &[usize], low: T, high: T) -> Self {
    let size: usize = shape.iter().product();
    let data: Vec<T> = with_rng(|rng| (0..size).map(|_| rng.gen_range(low, high) ).collect() );
    Self::new(shape, data)
  }

  pub fn rand(shape: &[usize]) -> Self {
    Self::uniform(shape, T::zero(), T::one())
  }

  pub fn exp(&self) -> Self {
    self.vectorize(|a| a.exp() )
  }

  pub fn log(&self) -> Self {
    self.vectorize(|a| a.ln() )
  }

  /// Softmax over the last dimension.

  pub fn softmax(&self) -> Self {
    self.map_rows(|row| {
      let max = row.iter().copied().fold(T::neg_infinity(), T::max);
      let exp: Vec<T> = row.iter().map(|&a| (a - max).exp() ).collect();
      let sum: T = exp.iter().copied().sum();
      exp.into_iter().map(|a| a / sum ).collect()
    })
  }

  /// Numerically stable logarithm of the softmax over the last dimension.

  pub fn log_softmax(&self) -> Self {
    self.map_rows(|row| {
      let max = row.iter().copied().fold(T::neg_infinity(), T::max);
      let log_sum = row.iter().map(|&a| (a - max).exp() ).sum::<T>().ln();
      row.iter().map(|&a| a - max - log_sum ).collect()
    })
  }

  pub fn trained(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), true)
  }

  pub fn tracked(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), false)
  }
}

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.shape.dims)?;
    print_chunks(0, &self.shape, &self.data, f)?;
    Ok(())
  }
}

fn print_chunks<T: Debug>(idx: usize, shape: &Shape, vec: &[T], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = (0..idx * 2).map(|_| " ").collect::<String>();
  if shape.rank() == 0 {
    write!(f, "{indent}{:?}", vec[0])?;
  } else if idx == shape.rank() - 1 {
    writeln!(f, "{indent}{:?}", vec)?;
  } else {
    let chunks = vec.chunks((vec.len() / shape.dims[idx]).max(1));
    writeln!(f, "{indent}[")?;
    for chunk in chunks {
      print_chunks(idx + 1, shape, chunk, f)?;
    }
    writeln!(f, "{indent}]")?;
  }
  Ok(())
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index() {
    let x = Tensor::new(&[2,2,2], vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(x.at(0), Tensor::new(&[2,2], vec![1, 2, 3, 4]));
    assert_eq!(x.at(1).at(1), Tensor::vec(&[7, 8]));
    assert_eq!(x.iter().count(), 2);
  }

  #[test]
  fn rows() {
    let a = Tensor::vec(&[1, 2]);
    let b = Tensor::vec(&[3, 4]);
    let stacked = Tensor::rows(&[a.clone(), b]);
    assert_eq!(stacked.shape().dims, vec![2, 2]);
    assert_eq!(stacked.at(0), a);
  }

  #[test]
  fn transpose() {
    let a = Tensor::arrange(&[2,3], 0, 1).transpose();
    assert_eq!(a, Tensor::new(&[3,2], vec![0, 3, 1, 4, 2, 5]));
  }

  #[test]
  fn sum_to() {
    let a = Tensor::arrange(&[3,2], 0, 1).sum_to(&[2]);
    assert_eq!(a, Tensor::vec(&[6, 9]));
  }

  #[test]
  fn argmax() {
    let a = Tensor::new(&[2,3], vec![-3.0, -1.0, -2.0, 0.5, 0.5, 0.1]);
    assert_eq!(a.argmax(), Tensor::vec(&[1, 0]));
  }

  #[test]
  fn softmax() {
    let a = Tensor::arrange(&[3,2], 1.0, 1.0).softmax();
    for row in a.iter() {
      assert!((row.sum() - 1.0f32).abs() < 1e-6);
    }
    let log = Tensor::arrange(&[3,2], 1.0f32, 1.0).log_softmax().exp();
    for (a, b) in log.raw().iter().zip(a.raw()) {
      assert!((a - b).abs() < 1e-6);
    }
  }

  #[test]
  fn uniform_bounds() {
    let a = Tensor::<f32>::uniform(&[64], -0.5, 0.5);
    assert!(a.raw().iter().all(|&x| (-0.5..0.5).contains(&x) ));
  }
}
