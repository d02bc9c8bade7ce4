//! Hand-derived gradients against central finite differences.

use std::collections::BTreeMap;

use deepfm_checkpoint::ModelState;
use deepfm_layers::Tensor;
use deepfm_models::{
    log_loss, DeepFm, DeepFmParams, FeatureBatch, Gradients, ModelVariant, FEATS_TABLE,
    FIRST_ORDER_TABLE,
};
use deepfm_training::BuildContext;

const EPS: f32 = 1e-3;

fn batch() -> FeatureBatch {
    FeatureBatch::new(
        3,
        vec![0.5, -1.0, 1.5, 0.25, -0.75, 2.0],
        vec![1, 4, 4, 0, 2, 1],
        vec![0.3, -0.2, 0.1],
    )
    .unwrap()
    .with_labels(vec![1.0, 0.0, 1.0])
    .unwrap()
}

fn state_of(values: &BTreeMap<String, Vec<f32>>) -> ModelState {
    let mut state = ModelState::new(0);
    for (name, v) in values {
        state.add_dense_param(name.clone(), v.clone());
    }
    state
}

fn loss(model: &DeepFm, batch: &FeatureBatch) -> f64 {
    let scores = model.predict(batch).unwrap();
    log_loss(scores.data(), batch.labels().unwrap()) + f64::from(model.regularization_loss())
}

fn analytic(model: &mut DeepFm, batch: &FeatureBatch) -> Gradients {
    let scores = model.forward_train(batch).unwrap();
    let n = batch.batch_size() as f32;
    let d: Vec<f32> = scores
        .data()
        .iter()
        .zip(batch.labels().unwrap())
        .map(|(p, y)| (p - y) / n)
        .collect();
    model
        .backward(&Tensor::from_data(&[batch.batch_size(), 1], d).unwrap())
        .unwrap()
}

fn numeric(model: &mut DeepFm, batch: &FeatureBatch, name: &str, index: usize) -> f64 {
    let base = model.export_params();
    let mut plus = base.clone();
    plus.get_mut(name).unwrap()[index] += EPS;
    let mut minus = base.clone();
    minus.get_mut(name).unwrap()[index] -= EPS;

    model.load_params(&state_of(&plus)).unwrap();
    let up = loss(model, batch);
    model.load_params(&state_of(&minus)).unwrap();
    let down = loss(model, batch);
    model.load_params(&state_of(&base)).unwrap();
    (up - down) / (2.0 * f64::from(EPS))
}

fn assert_close(name: &str, index: usize, analytic: f32, numeric: f64) {
    let analytic = f64::from(analytic);
    let tolerance = 2e-3 + 0.05 * analytic.abs().max(numeric.abs());
    assert!(
        (analytic - numeric).abs() <= tolerance,
        "{name}[{index}]: analytic {analytic} vs numeric {numeric}"
    );
}

fn check(params: DeepFmParams) {
    let batch = batch();
    let mut model = DeepFm::build(&params, &mut BuildContext::new(3)).unwrap();
    let grads = analytic(&mut model, &batch);

    for (name, grad) in &grads.dense {
        for (i, &g) in grad.iter().enumerate() {
            let num = numeric(&mut model, &batch, name, i);
            assert_close(name, i, g, num);
        }
    }

    let dims = [(FIRST_ORDER_TABLE, 1), (FEATS_TABLE, params.embedding_size)];
    for (table, dim) in dims {
        for (row, grad) in &grads.embeddings[table] {
            for (j, &g) in grad.iter().enumerate() {
                let index = row * dim + j;
                let num = numeric(&mut model, &batch, table, index);
                assert_close(table, index, g, num);
            }
        }
    }

    // Rows no example touches have no gradient and do not move the loss.
    let untouched = 3 * params.embedding_size;
    assert!(grads.embeddings[FEATS_TABLE].iter().all(|(row, _)| *row != 3));
    assert!(numeric(&mut model, &batch, FEATS_TABLE, untouched).abs() < 1e-6);
}

fn params() -> DeepFmParams {
    DeepFmParams::new(2, 2, 5, 3, vec![4, 3]).with_vector_feats_size(1)
}

#[test]
fn combined_gradients_match_finite_differences() {
    check(params());
}

#[test]
fn fm_only_gradients_match_finite_differences() {
    check(params().with_variant(ModelVariant::FmOnly));
}

#[test]
fn deep_only_gradients_match_finite_differences() {
    check(params().with_variant(ModelVariant::DeepOnly));
}

#[test]
fn l2_penalty_gradients_match_finite_differences() {
    check(params().with_l2_reg(0.05));
}
