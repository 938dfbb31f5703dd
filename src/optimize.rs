use std::collections::HashMap;

use crate::{
  scalar::Real,
  tensor::Tensor,
  variable::Variable,
};


/// An optimization strategy to be used with [Optimizer].

pub trait Strategy<R: Real> {
  fn update(&mut self, param: &Variable<R>, grad: &Tensor<R>, rate: R, step: usize) -> Tensor<R>;
}


/// Generic optimizer that allows for several optimization [strategies](Strategy) to be used.

#[derive(Debug)]
pub struct Optimizer<R: Real, S: Strategy<R>> {
  strategy: S,
  pub learning_rate: R,
  step: usize,
}

impl<R: Real, S: Strategy<R>> Optimizer<R, S> {
  pub fn new(learning_rate: R, strategy: S) -> Self {
    Self { strategy, learning_rate, step: 1 }
  }

  pub fn step(&self) -> usize {
    self.step
  }

  /// Back-propagate `loss`, update `params` and reset all gradients.

  pub fn minimize(&mut self, loss: &Variable<R>, params: &[Variable<R>]) {
    // Compute gradients
    loss.backward();

    // Optimize individual parameters
    for param in params {
      let Some(grad) = param.grad() else {
        panic!("Non-trainable parameters cannot be optimized")
      };

      // Execute strategy
      let change = self.strategy.update(param, &grad, self.learning_rate, self.step);

      // Apply change
      let weights = param.detach() + change;
      param.assign(&weights);
    }

    // Reset gradients
    loss.reset();

    self.step += 1;
  }
}


/// Stochastic Gradient Descent strategy

#[derive(Debug, Clone, Default)]
pub struct SGD;

impl<R: Real> Strategy<R> for SGD {
  fn update(&mut self, _param: &Variable<R>, grad: &Tensor<R>, rate: R, _step: usize) -> Tensor<R> {
    grad * -rate
  }
}


/// Stochastic Gradient Descent with momentum

#[derive(Debug, Clone)]
pub struct Momentum<R: Real> {
  pub momentum: R,
  v: HashMap<usize, Tensor<R>>,
}

impl<R: Real> Momentum<R> {
  pub fn new(momentum: R) -> Self {
    Self {
      momentum,
      v: HashMap::new(),
    }
  }
}

impl<R: Real> Default for Momentum<R> {
  fn default() -> Self {
    Self::new(crate::scalar::lit(0.9))
  }
}

impl<R: Real> Strategy<R> for Momentum<R> {
  fn update(&mut self, param: &Variable<R>, grad: &Tensor<R>, rate: R, _step: usize) -> Tensor<R> {
    let v = self.v
      .entry(param.id())
      .or_insert_with(|| Tensor::zeros(&grad.shape().dims) );
    *v = &*v * self.momentum - grad * rate;
    v.clone()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::Ops;

  fn quadratic<S: Strategy<f64>>(strategy: S, steps: usize) -> f64 {
    // Minimize (w - 3)^2 by expressing it as a tiny linear model
    let w = Tensor::vec(&[0.0]).trained();
    let mut optimizer = Optimizer::new(0.1, strategy);
    for _ in 0..steps {
      let x = Tensor::new(&[1, 1], vec![1.0]).tracked();
      let y = x.mm(&w.reshape(&[1, 1]));
      let residual = y.add_bias(&Tensor::vec(&[-3.0]).tracked());
      let loss = residual.mm(&residual.reshape(&[1, 1]));
      optimizer.minimize(&loss, &loss.parameters());
    }
    w.item()
  }

  #[test]
  fn sgd_converges() {
    assert!((quadratic(SGD, 100) - 3.0).abs() < 1e-3);
  }

  #[test]
  fn momentum_converges() {
    assert!((quadratic(Momentum::default(), 200) - 3.0).abs() < 1e-3);
  }

  #[test]
  fn step_counter() {
    let w = Tensor::new(&[1, 1], vec![1.0]).trained();
    let mut optimizer = Optimizer::new(0.5, SGD);
    let loss = Tensor::new(&[1, 1], vec![2.0]).tracked().mm(&w);
    optimizer.minimize(&loss, &[w.clone()]);
    assert_eq!(optimizer.step(), 2);
    assert_eq!(w.item(), 0.0);
    assert_eq!(w.grad(), Some(Tensor::zeros(&[1, 1])));
  }
}
