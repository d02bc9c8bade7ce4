//! The DeepFM model.
//!
//! ```text
//!  cont_feats  cate_feats  vector_feats
//!      │           │            │
//!      ├──────┬────┤            │
//!      ▼      ▼    ▼            │
//!  fm_first_order_emb (k=1)     │
//!  feats_emb (k) ───────────────┼──────┐
//!      │                        │      ▼
//!  first order ─ dropout[0]     └─► [cont | vector | cate_emb] ─► MLP (ReLU)
//!  second order ─ dropout[1]                                        │
//!      │                                                            │
//!      └──────────────────► concat ◄────────────────────────────────┘
//!                             │
//!                        Dense(fan_in, 1) ─► sigmoid ─► score
//! ```
//!
//! Both embedding tables hold `cate_feats_size + cont_field_size` rows.
//! Categorical id `j` reads row `j`; continuous field `i` reads row
//! `cate_feats_size + i` and its lookup is multiplied by the field value.

use std::collections::BTreeMap;

use deepfm_checkpoint::{CheckpointError, ModelState};
use deepfm_layers::{
    scale_by_field_values, sigmoid, ActivationType, Dense, Dropout, EmbeddingTable,
    FmSecondOrder, Initializer, Layer, LayerError, MLPConfig, Tensor, MLP,
};
use deepfm_optimizer::SlotOptimizers;
use deepfm_training::BuildContext;

use crate::error::{ModelError, ModelResult};
use crate::features::FeatureBatch;
use crate::params::DeepFmParams;

/// Name of the width-1 first-order table.
pub const FIRST_ORDER_TABLE: &str = "fm_first_order_emb";
/// Name of the width-`k` table shared by the FM second-order term and the
/// deep branch.
pub const FEATS_TABLE: &str = "feats_emb";

const OUTPUT_PARAMS: [&str; 2] = ["output/kernel", "output/bias"];

fn deep_param_name(index: usize) -> String {
    let kind = if index % 2 == 0 { "kernel" } else { "bias" };
    format!("deep/dense_{}/{kind}", index / 2)
}

/// Gradients of one training step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradients {
    /// Dense parameter gradients by parameter name.
    pub dense: BTreeMap<String, Vec<f32>>,
    /// Touched embedding rows by table name, in ascending row order.
    pub embeddings: BTreeMap<String, Vec<(usize, Vec<f32>)>>,
}

/// Lookup indices of one batch.
#[derive(Debug, Clone)]
struct Inputs {
    batch_size: usize,
    cont_ids: Vec<usize>,
    cont_values: Tensor,
    cate_ids: Vec<usize>,
}

/// DeepFM click-through-rate model.
#[derive(Debug, Clone)]
pub struct DeepFm {
    params: DeepFmParams,
    first_order: EmbeddingTable,
    feats: EmbeddingTable,
    first_order_dropout: Dropout,
    second_order_dropout: Dropout,
    second_order: FmSecondOrder,
    deep: Option<MLP>,
    output: Dense,
    cache: Option<Inputs>,
}

impl DeepFm {
    /// Builds the model, drawing all initial values from `ctx`.
    pub fn build(params: &DeepFmParams, ctx: &mut BuildContext) -> ModelResult<Self> {
        params.validate()?;
        let rows = params.embedding_rows();
        let k = params.embedding_size;

        let first_order =
            EmbeddingTable::new(FIRST_ORDER_TABLE, rows, 1, Initializer::GlorotNormal, ctx.rng())?;
        let feats =
            EmbeddingTable::new(FEATS_TABLE, rows, k, Initializer::GlorotNormal, ctx.rng())?;

        let deep = if params.variant.uses_deep() {
            let config = params
                .hidden_units
                .iter()
                .fold(MLPConfig::new(params.deep_input_width()), |config, &units| {
                    config.add_layer(units, ActivationType::ReLU)
                })
                .with_l2(params.l2_reg);
            Some(config.build(ctx.rng())?)
        } else {
            None
        };

        let fan_in = params.fan_in();
        let stddev = (2.0 / (fan_in as f32 + 1.0)).sqrt();
        let output = Dense::new_with_initializer(
            fan_in,
            1,
            Initializer::Normal { mean: 0.0, stddev },
            Initializer::Normal {
                mean: 0.0,
                stddev: 1.0,
            },
            ctx.rng(),
        )?
        .with_l2(params.l2_reg);

        let first_order_dropout = Dropout::new(params.dropout_keep_fm[0], ctx.next_seed())?;
        let second_order_dropout = Dropout::new(params.dropout_keep_fm[1], ctx.next_seed())?;

        tracing::info!(
            variant = ?params.variant,
            embedding_rows = rows,
            embedding_size = k,
            hidden_units = ?params.hidden_units,
            fan_in,
            seed = ctx.seed(),
            "Built DeepFM model"
        );

        Ok(Self {
            params: params.clone(),
            first_order,
            feats,
            first_order_dropout,
            second_order_dropout,
            second_order: FmSecondOrder::new(),
            deep,
            output,
            cache: None,
        })
    }

    /// Parameters the model was built from.
    pub fn params(&self) -> &DeepFmParams {
        &self.params
    }

    /// Table row read by continuous field `field`.
    pub fn continuous_index(&self, field: usize) -> usize {
        self.params.cate_feats_size + field
    }

    /// The width-1 first-order table.
    pub fn first_order_table(&self) -> &EmbeddingTable {
        &self.first_order
    }

    /// The width-`k` feature table.
    pub fn feats_table(&self) -> &EmbeddingTable {
        &self.feats
    }

    /// The deep branch, absent for [`ModelVariant::FmOnly`](crate::ModelVariant::FmOnly).
    pub fn deep(&self) -> Option<&MLP> {
        self.deep.as_ref()
    }

    /// Output width of the deep branch, 0 when it is not built.
    pub fn deep_output_width(&self) -> usize {
        self.deep.as_ref().map_or(0, MLP::output_dim)
    }

    /// Input width of the scoring layer.
    pub fn fan_in(&self) -> usize {
        self.output.in_features()
    }

    fn inputs(&self, batch: &FeatureBatch) -> ModelResult<Inputs> {
        batch.validate(&self.params)?;
        let batch_size = batch.batch_size();
        let cont_ids = (0..batch_size)
            .flat_map(|_| (0..self.params.cont_field_size).map(|i| self.continuous_index(i)))
            .collect();
        Ok(Inputs {
            batch_size,
            cont_ids,
            cont_values: batch.cont_tensor()?,
            cate_ids: batch.cate_feats().to_vec(),
        })
    }

    /// `[batch, cont + cate]` first-order weights, continuous ones scaled by value.
    fn first_order_raw(&self, inputs: &Inputs) -> ModelResult<Tensor> {
        let (b, c, d) = (
            inputs.batch_size,
            self.params.cont_field_size,
            self.params.cate_field_size,
        );
        let cont = self
            .first_order
            .lookup(&inputs.cont_ids, &[b, c])?
            .reshape(&[b, c])?
            .mul(&inputs.cont_values)?;
        let cate = self
            .first_order
            .lookup(&inputs.cate_ids, &[b, d])?
            .reshape(&[b, d])?;
        Ok(Tensor::concat(1, &[&cont, &cate])?)
    }

    /// `[batch, cont + cate, k]` field embeddings, continuous ones scaled by value.
    fn field_embeddings(&self, inputs: &Inputs) -> ModelResult<Tensor> {
        let (b, c, d) = (
            inputs.batch_size,
            self.params.cont_field_size,
            self.params.cate_field_size,
        );
        let cont = scale_by_field_values(
            &self.feats.lookup(&inputs.cont_ids, &[b, c])?,
            &inputs.cont_values,
        )?;
        let cate = self.feats.lookup(&inputs.cate_ids, &[b, d])?;
        Ok(Tensor::concat(1, &[&cont, &cate])?)
    }

    fn deep_input(&self, batch: &FeatureBatch, inputs: &Inputs) -> ModelResult<Tensor> {
        let (b, d, k) = (
            inputs.batch_size,
            self.params.cate_field_size,
            self.params.embedding_size,
        );
        let cate = self
            .feats
            .lookup(&inputs.cate_ids, &[b, d])?
            .reshape(&[b, d * k])?;
        let vector = batch.vector_tensor()?;
        Ok(Tensor::concat(1, &[&inputs.cont_values, &vector, &cate])?)
    }

    /// FM first-order term, `[batch, cont + cate]`, as seen outside training.
    pub fn fm_first_order(&self, batch: &FeatureBatch) -> ModelResult<Tensor> {
        let inputs = self.inputs(batch)?;
        Ok(self
            .first_order_dropout
            .forward(&self.first_order_raw(&inputs)?)?)
    }

    /// FM second-order term, `[batch, k]`, as seen outside training.
    pub fn fm_second_order(&self, batch: &FeatureBatch) -> ModelResult<Tensor> {
        let inputs = self.inputs(batch)?;
        let pooled = self.second_order.forward(&self.field_embeddings(&inputs)?)?;
        Ok(self.second_order_dropout.forward(&pooled)?)
    }

    /// Deep branch output, `[batch, hidden_units.last()]`.
    pub fn deep_output(&self, batch: &FeatureBatch) -> ModelResult<Tensor> {
        let deep = self.deep.as_ref().ok_or_else(|| {
            ModelError::InvalidParams(format!(
                "{:?} model has no deep branch",
                self.params.variant
            ))
        })?;
        let inputs = self.inputs(batch)?;
        Ok(deep.forward(&self.deep_input(batch, &inputs)?)?)
    }

    /// Click probabilities `[batch, 1]` with dropout disabled.
    pub fn predict(&self, batch: &FeatureBatch) -> ModelResult<Tensor> {
        let inputs = self.inputs(batch)?;
        let mut parts = Vec::with_capacity(3);
        if self.params.variant.uses_fm() {
            parts.push(
                self.first_order_dropout
                    .forward(&self.first_order_raw(&inputs)?)?,
            );
            let pooled = self.second_order.forward(&self.field_embeddings(&inputs)?)?;
            parts.push(self.second_order_dropout.forward(&pooled)?);
        }
        if let Some(deep) = &self.deep {
            parts.push(deep.forward(&self.deep_input(batch, &inputs)?)?);
        }
        let fused = Tensor::concat(1, &parts.iter().collect::<Vec<_>>())?;
        Ok(self.output.forward(&fused)?.map(sigmoid))
    }

    /// Click probabilities `[batch, 1]` with dropout active. Caches what
    /// [`DeepFm::backward`] needs.
    pub fn forward_train(&mut self, batch: &FeatureBatch) -> ModelResult<Tensor> {
        let inputs = self.inputs(batch)?;
        let mut parts = Vec::with_capacity(3);
        if self.params.variant.uses_fm() {
            let first = self.first_order_raw(&inputs)?;
            parts.push(self.first_order_dropout.forward_train(&first)?);
            let stacked = self.field_embeddings(&inputs)?;
            let pooled = self.second_order.forward_train(&stacked)?;
            parts.push(self.second_order_dropout.forward_train(&pooled)?);
        }
        if self.deep.is_some() {
            let input = self.deep_input(batch, &inputs)?;
            if let Some(deep) = self.deep.as_mut() {
                parts.push(deep.forward_train(&input)?);
            }
        }
        let fused = Tensor::concat(1, &parts.iter().collect::<Vec<_>>())?;
        let scores = self.output.forward_train(&fused)?.map(sigmoid);
        self.cache = Some(inputs);
        Ok(scores)
    }

    /// Backpropagates `d_logits` (`[batch, 1]`, the loss gradient with
    /// respect to the pre-sigmoid logit) through the last
    /// [`DeepFm::forward_train`].
    pub fn backward(&mut self, d_logits: &Tensor) -> ModelResult<Gradients> {
        let inputs = self.cache.take().ok_or(LayerError::NotInitialized)?;
        let (c, d, k) = (
            self.params.cont_field_size,
            self.params.cate_field_size,
            self.params.embedding_size,
        );
        let d_fused = self.output.backward(d_logits)?;

        let mut offset = 0;
        if self.params.variant.uses_fm() {
            let d_first = self
                .first_order_dropout
                .backward(&d_fused.narrow(1, 0, c + d)?)?;
            let d_first_cont = d_first.narrow(1, 0, c)?.mul(&inputs.cont_values)?;
            self.first_order
                .accumulate_grad(&inputs.cont_ids, &d_first_cont)?;
            self.first_order
                .accumulate_grad(&inputs.cate_ids, &d_first.narrow(1, c, d)?)?;

            let d_pooled = self
                .second_order_dropout
                .backward(&d_fused.narrow(1, c + d, k)?)?;
            let d_stacked = self.second_order.backward(&d_pooled)?;
            let d_cont = scale_by_field_values(&d_stacked.narrow(1, 0, c)?, &inputs.cont_values)?;
            self.feats.accumulate_grad(&inputs.cont_ids, &d_cont)?;
            self.feats
                .accumulate_grad(&inputs.cate_ids, &d_stacked.narrow(1, c, d)?)?;
            offset = c + d + k;
        }
        if let Some(deep) = self.deep.as_mut() {
            let width = deep.output_dim();
            let d_input = deep.backward(&d_fused.narrow(1, offset, width)?)?;
            let d_cate = d_input.narrow(1, c + self.params.vector_feats_size, d * k)?;
            self.feats.accumulate_grad(&inputs.cate_ids, &d_cate)?;
        }

        let mut grads = Gradients::default();
        for (name, grad) in self.dense_param_names().into_iter().zip(self.dense_gradients()) {
            let grad = grad.ok_or(LayerError::NotInitialized)?;
            grads.dense.insert(name, grad.data().to_vec());
        }
        grads
            .embeddings
            .insert(FIRST_ORDER_TABLE.to_string(), self.first_order.take_gradients());
        grads
            .embeddings
            .insert(FEATS_TABLE.to_string(), self.feats.take_gradients());
        Ok(grads)
    }

    /// Applies `grads` through one optimizer slot per dense parameter and
    /// per embedding row.
    pub fn apply_gradients(
        &mut self,
        grads: &Gradients,
        optimizers: &mut SlotOptimizers,
    ) -> ModelResult<()> {
        let names = self.dense_param_names();
        for (name, param) in names.iter().zip(self.dense_params_mut()) {
            if let Some(grad) = grads.dense.get(name) {
                optimizers.apply(name, param.data_mut(), grad)?;
            }
        }
        for table in [&mut self.first_order, &mut self.feats] {
            let Some(rows) = grads.embeddings.get(table.name()) else {
                continue;
            };
            for (row, grad) in rows {
                let key = format!("{}/{row}", table.name());
                optimizers.apply(&key, table.row_mut(*row)?, grad)?;
            }
        }
        Ok(())
    }

    /// L2 penalty of the dense kernels.
    pub fn regularization_loss(&self) -> f32 {
        self.output.regularization_loss()
            + self
                .deep
                .as_ref()
                .map_or(0.0, |deep| deep.regularization_loss())
    }

    /// Names of the dense parameters, in [`DeepFm::dense_params_mut`] order.
    pub fn dense_param_names(&self) -> Vec<String> {
        let deep_count = self.deep.as_ref().map_or(0, |deep| deep.parameters().len());
        OUTPUT_PARAMS
            .iter()
            .map(|name| name.to_string())
            .chain((0..deep_count).map(deep_param_name))
            .collect()
    }

    fn dense_params(&self) -> Vec<&Tensor> {
        let mut params = self.output.parameters();
        if let Some(deep) = &self.deep {
            params.extend(deep.parameters());
        }
        params
    }

    /// Mutable dense parameters: the scoring layer, then each deep layer's
    /// kernel and bias.
    pub fn dense_params_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.output.parameters_mut();
        if let Some(deep) = self.deep.as_mut() {
            params.extend(deep.parameters_mut());
        }
        params
    }

    fn dense_gradients(&self) -> Vec<Option<&Tensor>> {
        let mut grads = self.output.gradients();
        if let Some(deep) = &self.deep {
            grads.extend(deep.gradients());
        }
        grads
    }

    /// Every trainable value by name: dense parameters plus both embedding
    /// tables.
    pub fn export_params(&self) -> BTreeMap<String, Vec<f32>> {
        let mut out: BTreeMap<String, Vec<f32>> = self
            .dense_param_names()
            .into_iter()
            .zip(self.dense_params())
            .map(|(name, tensor)| (name, tensor.data().to_vec()))
            .collect();
        for table in [&self.first_order, &self.feats] {
            out.insert(table.name().to_string(), table.weights().data().to_vec());
        }
        out
    }

    /// Replaces every trainable value with the one stored in `state`.
    ///
    /// All entries are checked before anything is overwritten, so a
    /// mismatched checkpoint leaves the model untouched.
    pub fn load_params(&mut self, state: &ModelState) -> deepfm_checkpoint::Result<()> {
        let names = self.dense_param_names();
        let dense: Vec<Vec<f32>> = names
            .iter()
            .zip(self.dense_params())
            .map(|(name, tensor)| state.param(name, tensor.numel()).map(<[f32]>::to_vec))
            .collect::<deepfm_checkpoint::Result<_>>()?;
        let first_order = state
            .param(FIRST_ORDER_TABLE, self.first_order.weights().numel())?
            .to_vec();
        let feats = state
            .param(FEATS_TABLE, self.feats.weights().numel())?
            .to_vec();

        for (param, values) in self.dense_params_mut().into_iter().zip(dense) {
            param.data_mut().copy_from_slice(&values);
        }
        let corrupted = |e: LayerError| CheckpointError::Corrupted(e.to_string());
        self.first_order.load_weights(first_order).map_err(corrupted)?;
        self.feats.load_weights(feats).map_err(corrupted)?;
        self.cache = None;
        Ok(())
    }
}
