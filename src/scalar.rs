use rand::distributions::uniform::SampleUniform;
use num_traits::{ Num, NumAssignOps, NumCast, Float };


/// All types that may be used in a [Tensor](crate::Tensor).
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Inner: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug {}
impl<T: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug> Inner for T {}


/// All numeric types.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Numeric: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum {}
impl<T: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum> Numeric for T {}


/// All continuous numeric types that can be differentiated.
///
/// Implemented for `f32` and `f64`, each of which supplies the
/// matrix multiplication kernel backing [Tensor::mm](crate::Tensor).

pub trait Real: Numeric + Float + SampleUniform + From<f32> {
  /// Row-major `out = lhs * rhs` for an `m x k` and a `k x n` matrix.
  fn gemm(m: usize, k: usize, n: usize, lhs: &[Self], rhs: &[Self], out: &mut [Self]);
}


/// Convert a literal into any [Real] type.

#[inline]
pub fn lit<T: Real>(value: f32) -> T {
  <T as From<f32>>::from(value)
}
