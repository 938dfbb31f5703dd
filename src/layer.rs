use serde::{ Serialize, Deserialize, de::DeserializeOwned };

use crate::{
  ops::Ops,
  scalar::{ Real, lit },
  tensor::Tensor,
  variable::Variable,
  error::{ Error, Result },
};


/// Version tag written into every serialized [Sequential].
pub const FORMAT_VERSION: u32 = 1;


/// A single stage of a [Sequential] model.
///
/// Parametric layers own their parameters as trainable [Variable]s.

#[derive(Debug, Clone)]
pub enum Layer<T: Real> {
  Conv2d { kernels: Variable<T>, bias: Variable<T> },
  ReLU,
  MaxPool2d { size: usize },
  Flatten,
  Dense { weights: Variable<T>, bias: Variable<T> },
}

impl<T: Real> Layer<T> {
  /// Convolution with uniformly initialized kernels in ±1/sqrt(fan_in).

  pub fn conv2d(in_channels: usize, out_channels: usize, kernel_shape: [usize; 2]) -> Self {
    let fan_in = in_channels * kernel_shape[0] * kernel_shape[1];
    let bound = Self::bound(fan_in);
    Self::Conv2d {
      kernels: Tensor::uniform(&[out_channels, in_channels, kernel_shape[0], kernel_shape[1]], -bound, bound).trained(),
      bias: Tensor::uniform(&[out_channels], -bound, bound).trained(),
    }
  }

  /// Fully connected layer with uniformly initialized weights in ±1/sqrt(fan_in).

  pub fn dense(inputs: usize, outputs: usize) -> Self {
    let bound = Self::bound(inputs);
    Self::Dense {
      weights: Tensor::uniform(&[inputs, outputs], -bound, bound).trained(),
      bias: Tensor::uniform(&[outputs], -bound, bound).trained(),
    }
  }

  fn bound(fan_in: usize) -> T {
    lit::<T>(1.0) / lit::<T>(fan_in.max(1) as f32).sqrt()
  }

  pub fn parameters(&self) -> Vec<Variable<T>> {
    match self {
      Self::Conv2d { kernels, bias } => vec![kernels.clone(), bias.clone()],
      Self::Dense { weights, bias } => vec![weights.clone(), bias.clone()],
      _ => vec![],
    }
  }

  /// Run this layer on either a [Tensor] or a [Variable]. `param` maps
  /// the layer's own parameters into the input's representation.

  pub fn forward<X: Ops<T>>(&self, input: &X, param: &impl Fn(&Variable<T>) -> X) -> X {
    match self {
      Self::Conv2d { kernels, bias } => input.conv2d(&param(kernels), &param(bias)),
      Self::ReLU => input.relu(),
      Self::MaxPool2d { size } => input.max_pool2d(*size),
      Self::Flatten => input.flatten(),
      Self::Dense { weights, bias } => input.mm(&param(weights)).add_bias(&param(bias)),
    }
  }

  /// Shape of this layer's output for an input of shape `dims`.

  pub fn output_dims(&self, dims: &[usize]) -> Result<Vec<usize>> {
    self.validate()?;
    let mismatch = |expected: Vec<usize>| Error::ShapeMismatch { expected, got: dims.to_vec() };
    let batch = dims.first().copied().unwrap_or(1);
    match self {
      Self::Conv2d { kernels, .. } => {
        let k = kernels.data().shape().dims.clone();
        if dims.len() != 4 || dims[1] != k[1] || dims[2] < k[2] || dims[3] < k[3] {
          let height = dims.get(2).map_or(k[2], |&h| h.max(k[2]) );
          let width = dims.get(3).map_or(k[3], |&w| w.max(k[3]) );
          return Err(mismatch(vec![batch, k[1], height, width]))
        }
        Ok(vec![batch, k[0], dims[2] - k[2] + 1, dims[3] - k[3] + 1])
      },
      Self::ReLU => Ok(dims.to_vec()),
      Self::MaxPool2d { size } => {
        if dims.len() != 4 || dims[2] < *size || dims[3] < *size {
          let channels = dims.get(1).copied().unwrap_or(1);
          return Err(mismatch(vec![batch, channels, *size, *size]))
        }
        Ok(vec![batch, dims[1], dims[2] / size, dims[3] / size])
      },
      Self::Flatten => {
        if dims.is_empty() { return Err(mismatch(vec![1])) }
        Ok(vec![batch, dims[1..].iter().product()])
      },
      Self::Dense { weights, .. } => {
        let (inputs, outputs) = (weights.data().dim(0), weights.data().dim(1));
        if dims.len() != 2 || dims[1] != inputs {
          return Err(mismatch(vec![batch, inputs]))
        }
        Ok(vec![batch, outputs])
      },
    }
  }

  fn dump(&self) -> LayerDump<T> {
    match self {
      Self::Conv2d { kernels, bias } => LayerDump::Conv2d { kernels: kernels.detach(), bias: bias.detach() },
      Self::ReLU => LayerDump::ReLU,
      Self::MaxPool2d { size } => LayerDump::MaxPool2d { size: *size },
      Self::Flatten => LayerDump::Flatten,
      Self::Dense { weights, bias } => LayerDump::Dense { weights: weights.detach(), bias: bias.detach() },
    }
  }

  /// Check that the layer's own parameters are usable.

  pub fn validate(&self) -> Result<()> {
    match self {
      Self::Conv2d { kernels, bias } => check_params(&kernels.data(), &bias.data(), 4, 0),
      Self::MaxPool2d { size: 0 } => Err(Error::InvalidLayer("max pooling window of size 0".to_string())),
      Self::Dense { weights, bias } => check_params(&weights.data(), &bias.data(), 2, 1),
      _ => Ok(()),
    }
  }

  fn restore(dump: LayerDump<T>) -> Result<Self> {
    let layer = match dump {
      LayerDump::Conv2d { kernels, bias } => Self::Conv2d { kernels: kernels.trained(), bias: bias.trained() },
      LayerDump::ReLU => Self::ReLU,
      LayerDump::MaxPool2d { size } => Self::MaxPool2d { size },
      LayerDump::Flatten => Self::Flatten,
      LayerDump::Dense { weights, bias } => Self::Dense { weights: weights.trained(), bias: bias.trained() },
    };
    layer.validate()?;
    Ok(layer)
  }
}

// Parameters need exactly `rank` non-empty dimensions and a bias
// matching dimension `outputs`

fn check_params<T: Real>(params: &Tensor<T>, bias: &Tensor<T>, rank: usize, outputs: usize) -> Result<()> {
  let dims = &params.shape().dims;
  if dims.len() != rank || dims.contains(&0) {
    let mut expected: Vec<usize> = dims.iter().map(|&d| d.max(1) ).collect();
    expected.resize(rank, 1);
    return Err(Error::ShapeMismatch { expected, got: dims.clone() })
  }
  if bias.shape().dims != [dims[outputs]] {
    return Err(Error::ShapeMismatch { expected: vec![dims[outputs]], got: bias.shape().dims.clone() })
  }
  Ok(())
}


/// Feed-forward model that applies its [layers](Layer) in order.

#[derive(Debug, Clone)]
pub struct Sequential<T: Real> {
  layers: Vec<Layer<T>>,
}

impl<T: Real + Serialize + DeserializeOwned> Sequential<T> {
  pub fn new(layers: Vec<Layer<T>>) -> Self {
    Self { layers }
  }

  pub fn layers(&self) -> &[Layer<T>] {
    &self.layers
  }

  pub fn parameters(&self) -> Vec<Variable<T>> {
    self.layers.iter().flat_map(|layer| layer.parameters() ).collect()
  }

  pub fn num_parameters(&self) -> usize {
    self.parameters().iter().map(|param| param.data().size() ).sum()
  }

  /// Traced forward pass whose output can be back-propagated into the parameters.

  pub fn forward(&self, input: &Variable<T>) -> Variable<T> {
    self.layers.iter().fold(input.clone(), |x, layer| layer.forward(&x, &|param| param.clone() ))
  }

  /// Eager forward pass on plain tensors, recording no graph.

  pub fn run(&self, input: &Tensor<T>) -> Tensor<T> {
    self.layers.iter().fold(input.clone(), |x, layer| layer.forward(&x, &|param| param.detach() ))
  }

  /// Rank of a single input sample, derived from the first parametric layer.

  pub fn sample_rank(&self) -> Option<usize> {
    self.layers.iter().find_map(|layer| match layer {
      Layer::Conv2d { .. } => Some(3),
      Layer::Dense { .. } => Some(1),
      _ => None,
    })
  }

  /// Check that a batch of inputs makes it through every layer.

  pub fn check_input(&self, input: &Tensor<T>) -> Result<()> {
    self.layers
      .iter()
      .try_fold(input.shape().dims.clone(), |dims, layer| layer.output_dims(&dims) )?;
    Ok(())
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let dump = SequentialDump {
      version: FORMAT_VERSION,
      layers: self.layers.iter().map(|layer| layer.dump() ).collect(),
    };
    Ok(postcard::to_allocvec(&dump)?)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let dump: SequentialDump<T> = postcard::from_bytes(bytes)?;
    if dump.version != FORMAT_VERSION {
      return Err(Error::UnsupportedVersion(dump.version))
    }
    let layers = dump.layers
      .into_iter()
      .map(Layer::restore)
      .collect::<Result<_>>()?;
    Ok(Self { layers })
  }
}

#[derive(Serialize, Deserialize)]
enum LayerDump<T: Real> {
  Conv2d { kernels: Tensor<T>, bias: Tensor<T> },
  ReLU,
  MaxPool2d { size: usize },
  Flatten,
  Dense { weights: Tensor<T>, bias: Tensor<T> },
}

#[derive(Serialize, Deserialize)]
struct SequentialDump<T: Real> {
  version: u32,
  layers: Vec<LayerDump<T>>,
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::internal::manual_seed;

  fn tiny() -> Sequential<f32> {
    Sequential::new(vec![
      Layer::conv2d(2, 4, [3, 3]),
      Layer::ReLU,
      Layer::MaxPool2d { size: 2 },
      Layer::Flatten,
      Layer::dense(4, 3),
    ])
  }

  #[test]
  fn traced_matches_eager() {
    manual_seed(1);
    let model = tiny();
    let input = Tensor::rand(&[5, 2, 4, 4]);
    let eager = model.run(&input);
    let traced = model.forward(&input.tracked());
    assert_eq!(eager.shape().dims, vec![5, 3]);
    assert_eq!(&*traced.data(), &eager);
    assert_eq!(traced.parameters().len(), 4);
    assert_eq!(model.num_parameters(), 4 * 2 * 9 + 4 + 4 * 3 + 3);
  }

  #[test]
  fn bytes_round_trip() {
    manual_seed(2);
    let model = tiny();
    let loaded = Sequential::<f32>::from_bytes(&model.to_bytes().unwrap()).unwrap();
    let input = Tensor::rand(&[3, 2, 4, 4]);
    assert_eq!(loaded.run(&input), model.run(&input));
    assert_eq!(loaded.layers().len(), 5);
  }

  #[test]
  fn corrupt_bytes() {
    let err = Sequential::<f32>::from_bytes(&[0xff, 0xff, 0xff]).unwrap_err();
    assert!(matches!(err, Error::Encode(_) | Error::UnsupportedVersion(_)));
  }

  // Wire-compatible stand-ins for the dump types that skip all checks

  #[derive(Serialize)]
  struct RawTensor {
    shape: crate::Shape,
    data: Vec<f32>,
  }

  #[derive(Serialize)]
  #[allow(dead_code)]
  enum RawLayer {
    Conv2d { kernels: RawTensor, bias: RawTensor },
    ReLU,
    MaxPool2d { size: usize },
    Flatten,
    Dense { weights: RawTensor, bias: RawTensor },
  }

  fn raw(dims: &[usize], data: Vec<f32>) -> RawTensor {
    RawTensor { shape: crate::Shape::new(dims), data }
  }

  fn decode(layers: Vec<RawLayer>) -> Result<Sequential<f32>> {
    #[derive(Serialize)]
    struct RawModel {
      version: u32,
      layers: Vec<RawLayer>,
    }
    let bytes = postcard::to_allocvec(&RawModel { version: FORMAT_VERSION, layers }).unwrap();
    Sequential::from_bytes(&bytes)
  }

  #[test]
  fn decodes_raw_layers() {
    let model = decode(vec![
      RawLayer::Flatten,
      RawLayer::Dense { weights: raw(&[2, 3], vec![0.5; 6]), bias: raw(&[3], vec![0.0; 3]) },
    ]).unwrap();
    assert_eq!(model.run(&Tensor::ones(&[1, 2])), Tensor::fill(&[1, 3], 1.0));
  }

  #[test]
  fn rejects_empty_pool() {
    let err = decode(vec![RawLayer::MaxPool2d { size: 0 }]).unwrap_err();
    assert!(matches!(err, Error::InvalidLayer(_)));

    let model = Sequential::<f32>::new(vec![Layer::MaxPool2d { size: 0 }]);
    assert!(matches!(model.check_input(&Tensor::zeros(&[1, 1, 2, 2])), Err(Error::InvalidLayer(_))));
  }

  #[test]
  fn rejects_parameter_ranks() {
    let err = decode(vec![
      RawLayer::Dense { weights: raw(&[], vec![1.0]), bias: raw(&[1], vec![0.0]) },
    ]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected, got } if expected == vec![1, 1] && got.is_empty()));

    let err = decode(vec![
      RawLayer::Conv2d { kernels: raw(&[2, 3], vec![0.0; 6]), bias: raw(&[2], vec![0.0; 2]) },
    ]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));

    let err = decode(vec![
      RawLayer::Dense { weights: raw(&[2, 3], vec![0.0; 6]), bias: raw(&[2], vec![0.0; 2]) },
    ]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected, .. } if expected == vec![3]));

    let err = decode(vec![
      RawLayer::Dense { weights: raw(&[0, 3], vec![]), bias: raw(&[3], vec![0.0; 3]) },
    ]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
  }

  #[test]
  fn rejects_truncated_tensor() {
    let err = decode(vec![
      RawLayer::Dense { weights: raw(&[2, 3], vec![0.0; 5]), bias: raw(&[3], vec![0.0; 3]) },
    ]).unwrap_err();
    assert!(matches!(err, Error::Encode(_)));
  }

  #[test]
  fn input_validation() {
    manual_seed(3);
    let model = tiny();
    assert_eq!(model.sample_rank(), Some(3));
    assert!(model.check_input(&Tensor::zeros(&[1, 2, 4, 4])).is_ok());
    assert!(matches!(
      model.check_input(&Tensor::zeros(&[1, 3, 4, 4])),
      Err(Error::ShapeMismatch { .. })
    ));
    assert!(model.check_input(&Tensor::zeros(&[2, 4, 4])).is_err());
    // Convolves fine but flattens to the wrong width
    assert!(matches!(
      model.check_input(&Tensor::zeros(&[1, 2, 6, 6])),
      Err(Error::ShapeMismatch { expected, .. }) if expected == vec![1, 4]
    ));
  }
}
