//! The estimator factory driving real DeepFM training.

use std::path::Path;

use deepfm_models::{
    batches, model_estimator, read_examples, DeepFmParams, Example, FeatureBatch,
};
use deepfm_optimizer::OptimizerConfig;
use tempfile::tempdir;

/// Clicks happen exactly for categorical ids below 5 in the first field.
fn toy_examples() -> Vec<Example> {
    (0..10)
        .map(|id| Example {
            cont_feats: vec![0.1 * id as f32, 1.0],
            cate_feats: vec![id, (id * 3) % 10],
            vector_feats: Vec::new(),
            label: Some(if id < 5 { 1.0 } else { 0.0 }),
        })
        .collect()
}

fn toy_batch() -> FeatureBatch {
    FeatureBatch::from_examples(&toy_examples()).unwrap()
}

fn params(dir: &Path) -> DeepFmParams {
    DeepFmParams::new(2, 2, 10, 4, vec![8, 4])
        .with_model_dir(dir)
        .with_optimizer(OptimizerConfig::Adam {
            learning_rate: 0.02,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        })
}

#[test]
fn training_reduces_loss_on_separable_data() {
    let dir = tempdir().unwrap();
    let mut estimator = model_estimator(&params(dir.path())).unwrap();

    let before = estimator.evaluate(vec![toy_batch()]).unwrap();
    let result = estimator
        .train(std::iter::repeat_with(toy_batch), Some(300))
        .unwrap();
    assert_eq!(result.global_step, 300);

    let after = estimator.evaluate(vec![toy_batch()]).unwrap();
    assert!(
        after.metrics.loss < before.metrics.loss,
        "loss {} did not drop below {}",
        after.metrics.loss,
        before.metrics.loss
    );
    assert!(after.metrics.auc.unwrap() > 0.9);
    assert!(dir.path().join("checkpoint-300.json").exists());
}

#[test]
fn checkpoint_round_trip_restores_predictions() {
    let dir = tempdir().unwrap();
    let p = params(dir.path());

    let mut first = model_estimator(&p).unwrap();
    first.train(vec![toy_batch(); 20], None).unwrap();
    let expected = first.predict(vec![toy_batch()]).unwrap();

    let mut second = model_estimator(&p.clone().with_random_seed(99)).unwrap();
    let restored = second.predict(vec![toy_batch()]).unwrap();
    assert_eq!(second.global_step(), 20);
    assert_eq!(restored.predictions, expected.predictions);

    second.train(vec![toy_batch(); 5], None).unwrap();
    assert_eq!(second.global_step(), 25);
}

#[test]
fn keep_checkpoint_max_rotates_model_checkpoints() {
    let dir = tempdir().unwrap();
    let mut p = params(dir.path());
    p.save_checkpoints_steps = 2;
    p.keep_checkpoint_max = 2;

    let mut estimator = model_estimator(&p).unwrap();
    estimator.train(vec![toy_batch(); 10], None).unwrap();

    let mut steps: Vec<u64> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| deepfm_checkpoint::parse_step(&e.unwrap().file_name().to_string_lossy()))
        .collect();
    steps.sort_unstable();
    assert_eq!(steps, vec![8, 10]);
}

#[test]
fn same_params_build_identical_estimators() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let mut a = model_estimator(&params(dir_a.path())).unwrap();
    let mut b = model_estimator(&params(dir_b.path())).unwrap();
    assert_eq!(
        a.predict(vec![toy_batch()]).unwrap().predictions,
        b.predict(vec![toy_batch()]).unwrap().predictions
    );
}

#[test]
fn unlabelled_training_batch_is_an_error() {
    let dir = tempdir().unwrap();
    let mut estimator = model_estimator(&params(dir.path())).unwrap();
    let batch = FeatureBatch::new(1, vec![1.0, 2.0], vec![3, 7], Vec::new()).unwrap();
    assert!(estimator.train(vec![batch.clone()], None).is_err());
    assert_eq!(estimator.predict(vec![batch]).unwrap().num_examples, 1);
}

#[test]
fn params_file_drives_the_estimator() {
    let dir = tempdir().unwrap();
    let model_dir = dir.path().join("model");
    let config_path = dir.path().join("params.json");
    let json = serde_json::json!({
        "cont_field_size": 2,
        "cate_field_size": 2,
        "cate_feats_size": 10,
        "embedding_size": 4,
        "hidden_units": [8, 4],
        "dropout_keep_fm": [0.9, 0.9],
        "is_GPU": 1,
        "save_summary_steps": 2,
        "model_dir": model_dir,
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let p = DeepFmParams::from_json_file(&config_path).unwrap();
    assert_eq!(p.is_gpu, 1);
    let mut estimator = model_estimator(&p).unwrap();
    assert_eq!(estimator.config().gpu_device_count, 1);

    let data_path = dir.path().join("train.jsonl");
    let lines: Vec<String> = toy_examples()
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    std::fs::write(&data_path, lines.join("\n")).unwrap();

    let examples = read_examples(&data_path).unwrap();
    assert_eq!(examples, toy_examples());
    let input = batches(&examples, 4).unwrap();
    assert_eq!(input.len(), 3);

    estimator.train(input, None).unwrap();
    assert_eq!(estimator.global_step(), 3);
    assert!(model_dir.join("summaries.jsonl").exists());
    assert!(model_dir.join("checkpoint-3.json").exists());
}
