use crate::{
  shape::Shape,
  tensor::{ Tensor, spatial },
  scalar::{ Numeric, Real },
  ops::Ops,
};


impl<T: Real> Ops<T> for Tensor<T> {
  fn shape(&self) -> Shape {
    self.shape.clone()
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    let shape = Shape::new(dims);
    assert_eq!(shape.size(), self.size(),
      "Cannot reshape {} into {}", self.shape, shape);
    Self { shape, data: self.data.clone() }
  }

  fn mm(&self, rhs: &Self) -> Self {
    assert!(self.rank() == 2 && rhs.rank() == 2 && self.shape.dims[1] == rhs.shape.dims[0],
      "Cannot multiply {} with {}", self.shape, rhs.shape);
    let (m, k, n) = (self.shape.dims[0], self.shape.dims[1], rhs.shape.dims[1]);
    let mut data = vec![T::zero(); m * n];
    T::gemm(m, k, n, &self.data, &rhs.data, &mut data);
    Self::new(&[m, n], data)
  }

  fn add_bias(&self, bias: &Self) -> Self {
    assert!(self.shape.dims.ends_with(&bias.shape.dims),
      "Cannot add {} bias to {} tensor", bias.shape, self.shape);
    let len = bias.size().max(1);
    let data = self.data
      .chunks(len)
      .flat_map(|chunk| chunk.iter().zip(&bias.data).map(|(&a, &b)| a + b ) )
      .collect();
    Self::from_shape(self.shape.clone(), data)
  }

  fn relu(&self) -> Self {
    self.vectorize(|a| if a > T::zero() { a } else { T::zero() })
  }

  fn conv2d(&self, kernels: &Self, bias: &Self) -> Self {
    spatial::conv2d(self, kernels, bias)
  }

  fn max_pool2d(&self, size: usize) -> Self {
    spatial::max_pool2d(self, size)
  }
}

impl<T: Numeric> std::ops::Neg for &Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    self.vectorize(|a| T::zero() - a )
  }
}

macro_rules! add_operator {
  ($op:ident, $meth:ident, $symbol:tt) => {
    impl<T: Numeric> std::ops::$op for &Tensor<T> { // &tensor * &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        self.zip(rhs, |(a, b)| a $symbol b )
      }
    }

    impl<T: Numeric> std::ops::$op for Tensor<T> { // tensor * other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        &self $symbol &rhs
      }
    }

    impl<T: Numeric> std::ops::$op<Tensor<T>> for &Tensor<T> { // &tensor * other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Tensor<T>) -> Tensor<T> {
        self $symbol &rhs
      }
    }

    impl<T: Numeric> std::ops::$op<&Tensor<T>> for Tensor<T> { // tensor * &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: &Tensor<T>) -> Tensor<T> {
        &self $symbol rhs
      }
    }

    impl<T: Numeric> std::ops::$op<T> for &Tensor<T> { // &tensor * T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        self.vectorize(|a| a $symbol rhs )
      }
    }

    impl<T: Numeric> std::ops::$op<T> for Tensor<T> { // tensor * T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        &self $symbol rhs
      }
    }
  };
}

add_operator!(Add, add, +);
add_operator!(Sub, sub, -);
add_operator!(Mul, mul, *);
add_operator!(Div, div, /);

impl<T: Numeric> std::ops::AddAssign<&Tensor<T>> for Tensor<T> {
  fn add_assign(&mut self, rhs: &Tensor<T>) {
    assert_eq!(self.shape.dims, rhs.shape.dims,
      "Cannot accumulate {} into {}", rhs.shape, self.shape);
    self.data.iter_mut().zip(&rhs.data).for_each(|(a, &b)| *a += b );
  }
}
