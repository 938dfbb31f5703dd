use serde::{ Serialize, de::DeserializeOwned };

use crate::{
  scalar::Real,
  layer::{ Layer, Sequential },
};


/// Number of classes predicted by [conv_classifier].
pub const NUM_CLASSES: usize = 10;

/// Shape of a single input sample accepted by [conv_classifier].
pub const INPUT_DIMS: [usize; 3] = [3, 32, 32];


/// Small convolutional classifier for 3x32x32 inputs.
///
/// Three blocks of 3x3 convolution, ReLU and 2x2 max pooling shrink the
/// input to 16 feature maps of 2x2, which a dense layer maps to
/// [NUM_CLASSES] logits.

pub fn conv_classifier<T: Real + Serialize + DeserializeOwned>() -> Sequential<T> {
  Sequential::new(vec![
    Layer::conv2d(3, 32, [3, 3]),
    Layer::ReLU,
    Layer::MaxPool2d { size: 2 },
    Layer::conv2d(32, 16, [3, 3]),
    Layer::ReLU,
    Layer::MaxPool2d { size: 2 },
    Layer::conv2d(16, 16, [3, 3]),
    Layer::ReLU,
    Layer::MaxPool2d { size: 2 },
    Layer::Flatten,
    Layer::dense(64, NUM_CLASSES),
  ])
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ Tensor, internal::manual_seed };

  #[test]
  fn output_shape() {
    manual_seed(4);
    let model = conv_classifier::<f32>();
    let input = Tensor::rand(&[2, 3, 32, 32]);
    assert_eq!(model.run(&input).shape().dims, vec![2, NUM_CLASSES]);
    assert_eq!(model.parameters().len(), 8);
    assert_eq!(model.sample_rank(), Some(INPUT_DIMS.len()));
  }
}
