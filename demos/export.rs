// This example trains the convolutional classifier on random data,
// logs it to a run of the local tracking store and loads it back,
// both natively and as a generic predict function.

// Set MICROFLOW_TRACKING_URI to choose where runs are stored.

use microflow::{
  Dataset, DataLoader, TrainConfig, Tracking, manual_seed,
  models::{ conv_classifier, INPUT_DIMS, NUM_CLASSES },
  train::fit,
  predict::predict,
  flavor::{ log_model, load_model_from_run },
  pyfunc::load_pyfunc_from_run,
};

fn main() -> microflow::Result<()> {
  manual_seed(12345);

  // Have some data
  let train = Dataset::synthetic(100, &INPUT_DIMS, NUM_CLASSES);
  let test = Dataset::synthetic(30, &INPUT_DIMS, NUM_CLASSES);

  // Train with the default settings
  let model = conv_classifier::<f32>();
  let losses = fit(&model, &train, &TrainConfig::default());
  println!("Epoch losses: {losses:?}");

  let loader = DataLoader::new(&test, 16);
  let predictions = predict(&model, &loader);

  // Log the model, which starts a run as none is active yet
  let mut tracking = Tracking::from_env();
  let run_id = log_model(&mut tracking, &model, "model")?;
  println!("Logged to run {run_id} in {}", tracking.tracking_uri().display());

  // Load it elsewhere
  let reloaded = load_model_from_run(&tracking, "model", &run_id)?;
  assert_eq!(predict(&reloaded, &loader), predictions);

  // Or without knowing what kind of model it is
  let predictor = load_pyfunc_from_run(&tracking, "model", &run_id)?;
  let (sample, label) = test.get(0).expect("test set is not empty");
  let proba = predictor.predict(sample)?;
  println!("Sample 0 (label {label}): class {} with p = {:.3}",
    proba.argmax().item(), proba.raw()[proba.argmax().item()]);

  // Dropping the handle would end the run as well
  tracking.end_run()
}
