use std::rc::Rc;
use std::cell::{ Ref, RefCell };
use std::collections::HashSet;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::fmt::Debug;

mod mops;

use crate::{
  tensor::Tensor,
  scalar::Real,
};


pub fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


/// Unary computational operation that can also compute its derivative.

pub trait UnaryOp<T: Real>: Debug {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T>;
}


/// Binary computational operation that can also compute its derivative.

pub trait BinaryOp<T: Real>: Debug {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>);
}


/// Computational operation over any number of inputs that can also compute its derivative.

pub trait MultiOp<T: Real>: Debug {
  fn run(&self, inputs: &[&Tensor<T>]) -> Tensor<T>;
  fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Vec<Tensor<T>>;
}


#[derive(Debug)]
enum Op<T: Real> {
  Unary(Box<dyn UnaryOp<T>>),
  Binary(Box<dyn BinaryOp<T>>),
  Multi(Box<dyn MultiOp<T>>),
}


/// Node in a computation graph, containing a [Variable]'s data and gradient,
/// as well as the operation used to create it.

#[derive(Debug)]
struct Node<T: Real> {
  id: usize,
  cell: RefCell<NodeCell<T>>,
  op: Option<Op<T>>,
  previous: Vec<Rc<Self>>,
  trainable: bool,
}

#[derive(Debug)]
struct NodeCell<T: Real> {
  data: Tensor<T>,
  grad: Option<Tensor<T>>,
}

impl<T: Real> Node<T> {
  fn reset_gradient(&self, filler: T) {
    if let Some(grad) = self.cell.borrow_mut().grad.as_mut() {
      grad.raw_mut().iter_mut().for_each(|a| *a = filler );
    }
  }

  fn backward(&self) {
    let Some(op) = &self.op else { return };
    let changes = {
      let cell = self.cell.borrow();
      let Some(grad) = &cell.grad else { return };
      let inputs: Vec<Ref<NodeCell<T>>> = self.previous.iter().map(|prev| prev.cell.borrow() ).collect();
      let data: Vec<&Tensor<T>> = inputs.iter().map(|input| &input.data ).collect();
      let changes = match op {
        Op::Unary(op) => vec![op.derive(data[0], grad)],
        Op::Binary(op) => {
          let (lhs, rhs) = op.derive(data[0], data[1], grad);
          vec![lhs, rhs]
        },
        Op::Multi(op) => op.derive(&data, grad),
      };
      changes
    };
    for (change, prev) in changes.iter().zip(&self.previous) {
      if let Some(grad) = prev.cell.borrow_mut().grad.as_mut() {
        *grad += change;
      }
    }
  }
}


/// Variables track the computational operations used to create them and allow
/// for computing their gradient with respect to all input variables involved.
///
/// They get created by calling [tracked](Tensor::tracked) or
/// [trained](Tensor::trained) on any differentiable [Tensor] type.

#[derive(Debug, Clone)]
pub struct Variable<T: Real> {
  node: Rc<Node<T>>,
}

impl<T: Real> Variable<T> {
  pub(crate) fn from_tensor(tensor: Tensor<T>, trainable: bool) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        cell: RefCell::new(NodeCell {
          grad: trainable.then(|| Tensor::zeros(&tensor.shape().dims) ),
          data: tensor,
        }),
        op: None,
        previous: vec![],
        trainable,
      }),
    }
  }

  fn operation(op: Op<T>, data: Tensor<T>, grad: bool, previous: Vec<Rc<Node<T>>>) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        cell: RefCell::new(NodeCell {
          grad: grad.then(|| Tensor::zeros(&data.shape().dims) ),
          data,
        }),
        op: Some(op),
        previous,
        trainable: false,
      }),
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn requires_grad(&self) -> bool {
    self.node.cell.borrow().grad.is_some()
  }

  pub fn data(&self) -> Ref<'_, Tensor<T>> {
    Ref::map(self.node.cell.borrow(), |cell| &cell.data )
  }

  /// Copy of the current value, disconnected from the graph.

  pub fn detach(&self) -> Tensor<T> {
    self.data().clone()
  }

  pub fn grad(&self) -> Option<Tensor<T>> {
    self.node.cell.borrow().grad.clone()
  }

  pub fn item(&self) -> T {
    self.data().item()
  }

  /// Overwrite this Variable's value in place.

  pub fn assign(&self, tensor: &Tensor<T>) {
    let mut cell = self.node.cell.borrow_mut();
    assert_eq!(cell.data.shape(), tensor.shape(),
      "Could not assign {} tensor to {} variable", tensor.shape(), cell.data.shape());
    cell.data = tensor.clone();
  }

  pub fn unary_op(&self, op: impl UnaryOp<T> + 'static) -> Self {
    let data = op.run(&self.data());
    Self::operation(
      Op::Unary(Box::new(op)),
      data,
      self.requires_grad(),
      vec![self.node.clone()],
    )
  }

  pub fn binary_op(&self, op: impl BinaryOp<T> + 'static, rhs: &Self) -> Self {
    let data = op.run(&self.data(), &rhs.data());
    Self::operation(
      Op::Binary(Box::new(op)),
      data,
      self.requires_grad() || rhs.requires_grad(),
      vec![self.node.clone(), rhs.node.clone()],
    )
  }

  pub fn multi_op(op: impl MultiOp<T> + 'static, inputs: &[&Self]) -> Self {
    let data = {
      let cells: Vec<Ref<Tensor<T>>> = inputs.iter().map(|input| input.data() ).collect();
      let tensors: Vec<&Tensor<T>> = cells.iter().map(|cell| &**cell ).collect();
      op.run(&tensors)
    };
    Self::operation(
      Op::Multi(Box::new(op)),
      data,
      inputs.iter().any(|input| input.requires_grad() ),
      inputs.iter().map(|input| input.node.clone() ).collect(),
    )
  }

  /// Compute gradients across this Variable's entire graph.

  pub fn backward(&self) {
    if !self.requires_grad() { panic!("Cannot compute gradients for constant {self}") }
    self.node.reset_gradient(T::one());
    for node in self.history().iter().rev() {
      node.backward();
    }
  }

  /// List all trainable parameters in this Variable's graph.

  pub fn parameters(&self) -> Vec<Self> {
    self.history()
      .into_iter()
      .filter(|node| node.trainable )
      .map(|node| Self { node } )
      .collect()
  }

  /// Set gradients to zero for this Variable's entire graph.

  pub fn reset(&self) {
    for node in self.history() {
      node.reset_gradient(T::zero());
    }
  }

  fn history(&self) -> Vec<Rc<Node<T>>> {
    let mut history = vec![];
    Self::history_recurse(&self.node, &mut history, &mut HashSet::new());
    history
  }

  fn history_recurse(node: &Rc<Node<T>>, history: &mut Vec<Rc<Node<T>>>, visited: &mut HashSet<usize>) {
    if !visited.insert(node.id) { return }
    for prev in &node.previous {
      Self::history_recurse(prev, history, visited);
    }
    history.push(node.clone());
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = if self.node.trainable { "Trainable" } else {
      if self.requires_grad() { "Computed" } else { "Tracked" }
    };
    write!(f, "{title} {}", self.data())
  }
}
