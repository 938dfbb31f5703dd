//! Train, persist and reload small convolutional classifiers.
//! CPU only. Few dependencies.
//!
//! # Features
//!
//! - **Auto-grad**: [Variable]s record the operations applied to them and
//! back-propagate gradients into trainable parameters.
//!
//! - **One model, two modes**: [layers](layer::Layer) are written against
//! [ops::Ops], so a [Sequential](layer::Sequential) runs traced for training and
//! eagerly for inference, with identical results.
//!
//! - **Model directories**: [flavor::save_model] writes the model alongside an
//! `MLmodel` descriptor. It loads back natively through [flavor::load_model] or
//! as a framework independent [pyfunc::PredictFn] through [pyfunc::load_pyfunc].
//!
//! - **Run tracking**: [Tracking] keeps runs and their artifacts in a
//! local store, so models can be logged to and loaded from a run.
//!
//! # Examples
//!
//! Training a classifier and reloading it from disk:
//! ```
//! use microflow::{
//!   Tensor, Layer, Sequential, Dataset, DataLoader, TrainConfig,
//!   train::fit, predict::predict, flavor, pyfunc, manual_seed,
//! };
//!
//! manual_seed(42);
//! let train = Dataset::<f32>::synthetic(32, &[8], 4);
//! let model = Sequential::new(vec![Layer::dense(8, 16), Layer::ReLU, Layer::dense(16, 4)]);
//! fit(&model, &train, &TrainConfig { epochs: 2, ..Default::default() });
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("model");
//! flavor::save_model(&model, &path).unwrap();
//!
//! let loaded = flavor::load_model(&path).unwrap();
//! let loader = DataLoader::new(&train, 16);
//! assert_eq!(predict(&loaded, &loader), predict(&model, &loader));
//!
//! let predictor = pyfunc::load_pyfunc(&path).unwrap();
//! let proba = predictor.predict(&Tensor::rand(&[8])).unwrap();
//! assert_eq!(proba.shape().dims, vec![4]);
//! ```
//!
//! # Optional features
//!
//! Some features can be toggled in your `Cargo.toml`.
//!
//! - `unsafe` *(default)*: Accelerated matrix math using [matrixmultiply] crate.
//! - `rayon`: Convolutions run in parallel over the batch dimension.

mod internal;
mod shape;
mod tensor;
mod variable;

pub mod ops;
pub mod scalar;
pub mod optimize;
pub mod layer;
pub mod models;
pub mod data;
pub mod train;
pub mod predict;
pub mod tracking;
pub mod model_dir;
pub mod flavor;
pub mod pyfunc;
pub mod error;

pub use internal::manual_seed;
pub use shape::Shape;
pub use tensor::Tensor;
pub use variable::{ Variable, UnaryOp, BinaryOp, MultiOp };
pub use layer::{ Layer, Sequential };
pub use data::{ Dataset, DataLoader, Batch };
pub use train::TrainConfig;
pub use tracking::Tracking;
pub use error::{ Error, Result };
