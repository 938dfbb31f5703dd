use std::{ fs, sync::OnceLock };

use microflow::{
  Tensor, Sequential, Dataset, DataLoader, TrainConfig, Tracking, Error, manual_seed,
  models::{ conv_classifier, INPUT_DIMS, NUM_CLASSES },
  tracking::RunStatus,
  train::fit,
  predict::predict,
  flavor::{ self, save_model, load_model, log_model, load_model_from_run },
  pyfunc::{ self, load_pyfunc },
};


/// A model trained once and shared by all tests.
///
/// Variables are not thread safe, so the trained model is kept in its
/// serialized form and rebuilt per test.

struct Fixture {
  model: Vec<u8>,
  test: Dataset<f32>,
  predictions: Vec<usize>,
}

fn fixture() -> &'static Fixture {
  static FIXTURE: OnceLock<Fixture> = OnceLock::new();
  FIXTURE.get_or_init(|| {
    manual_seed(12345);
    let train = Dataset::synthetic(100, &INPUT_DIMS, NUM_CLASSES);
    let test = Dataset::synthetic(30, &INPUT_DIMS, NUM_CLASSES);

    let model = conv_classifier::<f32>();
    let losses = fit(&model, &train, &TrainConfig::default());
    assert_eq!(losses.len(), 5);
    assert!(losses.iter().all(|loss| loss.is_finite() ));

    let predictions = predict(&model, &test_loader(&test));
    Fixture { model: model.to_bytes().unwrap(), test, predictions }
  })
}

fn test_loader(dataset: &Dataset<f32>) -> DataLoader<'_, f32> {
  DataLoader::new(dataset, 16).shuffle(false).drop_last(false)
}

fn trained() -> (Sequential<f32>, &'static Fixture) {
  let fixture = fixture();
  (Sequential::from_bytes(&fixture.model).unwrap(), fixture)
}


#[test]
fn predictions_cover_test_set() {
  let (model, fixture) = trained();
  assert_eq!(fixture.predictions.len(), 30);
  assert!(fixture.predictions.iter().all(|&class| class < NUM_CLASSES ));
  assert_eq!(predict(&model, &test_loader(&fixture.test)), fixture.predictions);
}

#[test]
fn save_and_load_model() {
  let (model, fixture) = trained();
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("model");
  save_model(&model, &path).unwrap();

  let reloaded = load_model(&path).unwrap();
  assert_eq!(predict(&reloaded, &test_loader(&fixture.test)), fixture.predictions);

  let predictor = load_pyfunc(&path).unwrap();
  for (i, (input, _)) in fixture.test.iter().enumerate() {
    let proba = predictor.predict(input).unwrap();
    assert_eq!(proba.shape().dims, vec![NUM_CLASSES]);
    assert_eq!(proba.argmax().item(), fixture.predictions[i], "sample {i}");
  }

  let inputs: Vec<Tensor<f32>> = fixture.test.iter().map(|(input, _)| input.clone() ).collect();
  let batch = predictor.predict(&Tensor::rows(&inputs)).unwrap();
  assert_eq!(batch.argmax().into_raw(), fixture.predictions);
}

#[test]
fn log_model_with_and_without_run() {
  let (model, fixture) = trained();
  for should_start_run in [false, true] {
    let store = tempfile::tempdir().unwrap();
    let mut tracking = Tracking::new(store.path());
    if should_start_run {
      tracking.start_run().unwrap();
    }

    let run_id = log_model(&mut tracking, &model, "microflow").unwrap();
    assert_eq!(tracking.active_run().map(|run| run.id() ), Some(run_id.as_str()));

    let reloaded = load_model_from_run(&tracking, "microflow", &run_id).unwrap();
    assert_eq!(predict(&reloaded, &test_loader(&fixture.test)), fixture.predictions);

    let predictor = pyfunc::load_pyfunc_from_run(&tracking, "microflow", &run_id).unwrap();
    let (input, _) = fixture.test.get(0).unwrap();
    assert_eq!(predictor.predict(input).unwrap().argmax().item(), fixture.predictions[0]);

    tracking.end_run().unwrap();
    assert_eq!(tracking.get_run(&run_id).unwrap().info.status, RunStatus::Finished);
  }
}

#[test]
fn repeated_round_trips() {
  let (model, fixture) = trained();
  let dir = tempfile::tempdir().unwrap();
  let original = model.to_bytes().unwrap();

  let mut current = model;
  for cycle in 0..3 {
    let path = dir.path().join(format!("model-{cycle}"));
    save_model(&current, &path).unwrap();
    assert_eq!(fs::read(path.join(flavor::MODEL_DATA)).unwrap(), original);
    current = load_model(&path).unwrap();
    assert_eq!(predict(&current, &test_loader(&fixture.test)), fixture.predictions);
  }
}

#[test]
fn invalid_destinations() {
  let (model, _) = trained();
  let dir = tempfile::tempdir().unwrap();

  assert!(matches!(load_model(dir.path().join("missing")), Err(Error::NotADirectory(_))));
  assert!(matches!(load_pyfunc(dir.path()), Err(Error::Io(_))));

  let file = dir.path().join("file");
  fs::write(&file, "not a model").unwrap();
  assert!(matches!(load_model(&file), Err(Error::NotADirectory(_))));
  assert!(matches!(save_model(&model, &file), Err(Error::AlreadyExists(_))));

  let tracking = Tracking::new(dir.path().join("store"));
  assert!(matches!(load_model_from_run(&tracking, "microflow", "0123abcd"), Err(Error::RunNotFound(_))));
}
