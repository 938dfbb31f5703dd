use crate::scalar::{ Numeric, Real };


#[cfg_attr(feature = "unsafe", allow(dead_code))]
pub(crate) fn matmul<T: Numeric>(m: usize, k: usize, n: usize, lhs: &[T], rhs: &[T], out: &mut [T]) {
  for i in 0..m {
    for j in 0..n {
      let mut acc = T::zero();
      for p in 0..k {
        acc += lhs[i * k + p] * rhs[p * n + j];
      }
      out[i * n + j] = acc;
    }
  }
}

macro_rules! impl_real {
  ($type:ty, $gemm:ident) => {
    impl Real for $type {
      #[cfg(feature = "unsafe")]
      fn gemm(m: usize, k: usize, n: usize, lhs: &[Self], rhs: &[Self], out: &mut [Self]) {
        assert!(lhs.len() >= m * k && rhs.len() >= k * n && out.len() >= m * n,
          "Matrix buffers too small for {m}x{k} * {k}x{n}");
        unsafe {
          matrixmultiply::$gemm(
            m,
            k,
            n,
            1.0,
            lhs.as_ptr(),
            k as isize,
            1,
            rhs.as_ptr(),
            n as isize,
            1,
            0.0,
            out.as_mut_ptr(),
            n as isize,
            1,
          );
        }
      }

      #[cfg(not(feature = "unsafe"))]
      fn gemm(m: usize, k: usize, n: usize, lhs: &[Self], rhs: &[Self], out: &mut [Self]) {
        matmul(m, k, n, lhs, rhs, out)
      }
    }
  };
}

impl_real!(f32, sgemm);
impl_real!(f64, dgemm);


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gemm() {
    let lhs = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let rhs = [1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
    let mut out = [0.0f32; 4];
    f32::gemm(2, 3, 2, &lhs, &rhs, &mut out);
    assert_eq!(out, [4.0, 5.0, 10.0, 11.0]);
  }

  #[test]
  fn naive_matches_gemm() {
    let lhs: Vec<f64> = (0..12).map(|i| i as f64 * 0.5 ).collect();
    let rhs: Vec<f64> = (0..8).map(|i| 1.0 - i as f64 ).collect();
    let mut a = vec![0.0; 6];
    let mut b = vec![0.0; 6];
    f64::gemm(3, 4, 2, &lhs, &rhs, &mut a);
    matmul(3, 4, 2, &lhs, &rhs, &mut b);
    assert_eq!(a, b);
  }
}
