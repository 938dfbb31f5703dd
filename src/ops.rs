use crate::{
  shape::Shape,
  scalar::Real,
};


/// Operations shared by [Tensor](crate::Tensor) and [Variable](crate::Variable).
///
/// Layers are written against this trait, so the same model code runs
/// eagerly on plain tensors for inference and traced on variables
/// for training.

pub trait Ops<I: Real>: Clone {
  fn shape(&self) -> Shape;
  fn reshape(&self, dims: &[usize]) -> Self;
  fn mm(&self, rhs: &Self) -> Self;

  /// Add a bias whose shape matches the trailing dimensions of `self`.
  fn add_bias(&self, bias: &Self) -> Self;

  fn relu(&self) -> Self;

  /// Valid 2D convolution with stride 1.
  ///
  /// Input is `[N, C, H, W]`, kernels are `[O, C, KH, KW]`
  /// and bias is `[O]`.
  fn conv2d(&self, kernels: &Self, bias: &Self) -> Self;

  /// Non-overlapping max pooling over the two innermost dimensions.
  fn max_pool2d(&self, size: usize) -> Self;

  fn flatten(&self) -> Self {
    let dims = self.shape().dims;
    self.reshape(&[dims[0], dims[1..].iter().product()])
  }

  fn dim(&self, dim: isize) -> usize {
    self.shape()[dim]
  }
}
