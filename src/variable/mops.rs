use num_traits::NumCast;

use crate::{
  shape::Shape,
  tensor::{ Tensor, spatial },
  variable::{ Variable, UnaryOp, BinaryOp, MultiOp },
  scalar::Real,
  ops::Ops,
};


impl<T: Real> Ops<T> for Variable<T> {
  fn shape(&self) -> Shape {
    self.data().shape().clone()
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    self.unary_op(Reshape { dims: dims.to_vec() })
  }

  fn mm(&self, rhs: &Self) -> Self {
    self.binary_op(MatMul, rhs)
  }

  fn add_bias(&self, bias: &Self) -> Self {
    self.binary_op(AddBias, bias)
  }

  fn relu(&self) -> Self {
    self.unary_op(ReLU)
  }

  fn conv2d(&self, kernels: &Self, bias: &Self) -> Self {
    Self::multi_op(Conv2d, &[self, kernels, bias])
  }

  fn max_pool2d(&self, size: usize) -> Self {
    self.unary_op(MaxPool2d { size })
  }
}

impl<T: Real> Variable<T> {
  /// Mean negative log likelihood of `labels` under the
  /// softmax of this Variable's `[N, K]` logits.

  pub fn cross_entropy(&self, labels: &[usize]) -> Self {
    self.unary_op(CrossEntropy { labels: labels.to_vec() })
  }
}


#[derive(Debug, Clone)]
pub struct Reshape {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Reshape {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.reshape(&self.dims)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.reshape(&lhs.shape().dims)
  }
}


#[derive(Debug, Clone)]
pub struct MatMul;

impl<T: Real> BinaryOp<T> for MatMul {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs.mm(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad.mm(&rhs.transpose()),
    lhs.transpose().mm(grad),
  )}
}


#[derive(Debug, Clone)]
pub struct AddBias;

impl<T: Real> BinaryOp<T> for AddBias {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs.add_bias(rhs)
  }

  fn derive(&self, _lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad.clone(),
    grad.sum_to(&rhs.shape().dims),
  )}
}


#[derive(Debug, Clone)]
pub struct ReLU;

impl<T: Real> UnaryOp<T> for ReLU {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.relu()
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.zip(lhs, |(g, a)| if a > T::zero() { g } else { T::zero() })
  }
}


#[derive(Debug, Clone)]
pub struct Conv2d;

impl<T: Real> MultiOp<T> for Conv2d {
  fn run(&self, inputs: &[&Tensor<T>]) -> Tensor<T> {
    inputs[0].conv2d(inputs[1], inputs[2])
  }

  fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Vec<Tensor<T>> {
    let (input, kernels, bias) = spatial::conv2d_backward(inputs[0], inputs[1], grad);
    vec![input, kernels, bias]
  }
}


#[derive(Debug, Clone)]
pub struct MaxPool2d {
  size: usize,
}

impl<T: Real> UnaryOp<T> for MaxPool2d {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.max_pool2d(self.size)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    spatial::max_pool2d_backward(lhs, self.size, grad)
  }
}


#[derive(Debug, Clone)]
pub struct CrossEntropy {
  labels: Vec<usize>,
}

impl CrossEntropy {
  fn check<T: Real>(&self, logits: &Tensor<T>) {
    assert!(logits.rank() == 2 && logits.dim(0) == self.labels.len(),
      "Expected logits for {} samples, got {}", self.labels.len(), logits.shape());
    assert!(self.labels.iter().all(|&label| label < logits.dim(1) ),
      "Labels exceed {} classes", logits.dim(1));
  }
}

impl<T: Real> UnaryOp<T> for CrossEntropy {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    self.check(lhs);
    let classes = lhs.dim(1);
    let log_probs = lhs.log_softmax();
    let nll: T = self.labels.iter()
      .enumerate()
      .map(|(i, &label)| -log_probs.raw()[i * classes + label] )
      .sum();
    Tensor::scalar(nll / <T as NumCast>::from(self.labels.len()).unwrap_or_else(T::one))
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let classes = lhs.dim(1);
    let scale = grad.item() / <T as NumCast>::from(self.labels.len()).unwrap_or_else(T::one);
    let mut probs = lhs.softmax();
    let raw = probs.raw_mut();
    for (i, &label) in self.labels.iter().enumerate() {
      raw[i * classes + label] -= T::one();
    }
    probs * scale
  }
}
