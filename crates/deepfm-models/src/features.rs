//! Feature batches and the JSON-lines example reader.

use std::io::{BufRead, BufReader};
use std::path::Path;

use deepfm_layers::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::params::DeepFmParams;

/// One input example, as stored on a line of a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Continuous field values.
    pub cont_feats: Vec<f32>,
    /// Categorical ids, one per field.
    pub cate_feats: Vec<usize>,
    /// Dense side features.
    #[serde(default)]
    pub vector_feats: Vec<f32>,
    /// Click label, 0 or 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<f32>,
}

/// A batch of examples in row-major field order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    batch_size: usize,
    cont_feats: Vec<f32>,
    cate_feats: Vec<usize>,
    vector_feats: Vec<f32>,
    labels: Option<Vec<f32>>,
}

impl FeatureBatch {
    /// Creates a batch of `batch_size` rows without labels.
    ///
    /// Per-field widths are inferred from the buffer lengths, which must
    /// divide evenly by `batch_size`.
    pub fn new(
        batch_size: usize,
        cont_feats: Vec<f32>,
        cate_feats: Vec<usize>,
        vector_feats: Vec<f32>,
    ) -> ModelResult<Self> {
        if batch_size == 0 {
            return Err(ModelError::InvalidInput("batch must not be empty".to_string()));
        }
        for (name, len) in [
            ("cont_feats", cont_feats.len()),
            ("cate_feats", cate_feats.len()),
            ("vector_feats", vector_feats.len()),
        ] {
            if len % batch_size != 0 {
                return Err(ModelError::InvalidInput(format!(
                    "{name} has {len} values, not a multiple of batch size {batch_size}"
                )));
            }
        }
        Ok(Self {
            batch_size,
            cont_feats,
            cate_feats,
            vector_feats,
            labels: None,
        })
    }

    /// Attaches one label per row. Labels must be exactly 0 or 1.
    pub fn with_labels(mut self, labels: Vec<f32>) -> ModelResult<Self> {
        if labels.len() != self.batch_size {
            return Err(ModelError::FeatureShape {
                name: "labels",
                expected: self.batch_size,
                actual: labels.len(),
            });
        }
        if let Some((row, label)) = labels
            .iter()
            .enumerate()
            .find(|&(_, &y)| y != 0.0 && y != 1.0)
        {
            return Err(ModelError::InvalidInput(format!(
                "label {label} at row {row} is not 0 or 1"
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Stacks examples into a batch. Either every example has a label or
    /// none does.
    pub fn from_examples(examples: &[Example]) -> ModelResult<Self> {
        let first = examples
            .first()
            .ok_or_else(|| ModelError::InvalidInput("batch must not be empty".to_string()))?;
        let widths = (
            first.cont_feats.len(),
            first.cate_feats.len(),
            first.vector_feats.len(),
        );
        let labelled = first.label.is_some();

        let mut cont = Vec::with_capacity(examples.len() * widths.0);
        let mut cate = Vec::with_capacity(examples.len() * widths.1);
        let mut vector = Vec::with_capacity(examples.len() * widths.2);
        let mut labels = Vec::with_capacity(examples.len());
        for (row, example) in examples.iter().enumerate() {
            let row_widths = (
                example.cont_feats.len(),
                example.cate_feats.len(),
                example.vector_feats.len(),
            );
            if row_widths != widths {
                return Err(ModelError::InvalidInput(format!(
                    "example {row} has field widths {row_widths:?}, batch has {widths:?}"
                )));
            }
            match (labelled, example.label) {
                (true, Some(label)) => labels.push(label),
                (false, None) => {}
                _ => {
                    return Err(ModelError::InvalidInput(format!(
                        "example {row} disagrees with the batch on having a label"
                    )))
                }
            }
            cont.extend_from_slice(&example.cont_feats);
            cate.extend_from_slice(&example.cate_feats);
            vector.extend_from_slice(&example.vector_feats);
        }

        let batch = Self::new(examples.len(), cont, cate, vector)?;
        if labelled {
            batch.with_labels(labels)
        } else {
            Ok(batch)
        }
    }

    /// Number of rows.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Continuous values, `batch × cont_field_size`.
    pub fn cont_feats(&self) -> &[f32] {
        &self.cont_feats
    }

    /// Categorical ids, `batch × cate_field_size`.
    pub fn cate_feats(&self) -> &[usize] {
        &self.cate_feats
    }

    /// Side features, `batch × vector_feats_size`.
    pub fn vector_feats(&self) -> &[f32] {
        &self.vector_feats
    }

    /// Labels, if present.
    pub fn labels(&self) -> Option<&[f32]> {
        self.labels.as_deref()
    }

    /// Checks every buffer against the field layout of `params`.
    pub fn validate(&self, params: &DeepFmParams) -> ModelResult<()> {
        let b = self.batch_size;
        let checks = [
            ("cont_feats", b * params.cont_field_size, self.cont_feats.len()),
            ("cate_feats", b * params.cate_field_size, self.cate_feats.len()),
            ("vector_feats", b * params.vector_feats_size, self.vector_feats.len()),
        ];
        for (name, expected, actual) in checks {
            if expected != actual {
                return Err(ModelError::FeatureShape {
                    name,
                    expected,
                    actual,
                });
            }
        }
        if let Some(&id) = self.cate_feats.iter().find(|&&id| id >= params.cate_feats_size) {
            return Err(ModelError::CategoryOutOfRange {
                id,
                cate_feats_size: params.cate_feats_size,
            });
        }
        Ok(())
    }

    /// `[batch, cont_field_size]` tensor of continuous values.
    pub fn cont_tensor(&self) -> ModelResult<Tensor> {
        let width = self.cont_feats.len() / self.batch_size;
        Ok(Tensor::from_data(&[self.batch_size, width], self.cont_feats.clone())?)
    }

    /// `[batch, vector_feats_size]` tensor of side features.
    pub fn vector_tensor(&self) -> ModelResult<Tensor> {
        let width = self.vector_feats.len() / self.batch_size;
        Ok(Tensor::from_data(&[self.batch_size, width], self.vector_feats.clone())?)
    }
}

/// Reads one [`Example`] per non-blank line of a JSON-lines file.
pub fn read_examples(path: impl AsRef<Path>) -> ModelResult<Vec<Example>> {
    let path = path.as_ref();
    let io_err = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut examples = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let example = serde_json::from_str(&line).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        examples.push(example);
    }
    tracing::debug!(path = %path.display(), examples = examples.len(), "Read examples");
    Ok(examples)
}

/// Splits examples into batches of at most `batch_size` rows.
pub fn batches(examples: &[Example], batch_size: usize) -> ModelResult<Vec<FeatureBatch>> {
    if batch_size == 0 {
        return Err(ModelError::InvalidInput("batch_size must be positive".to_string()));
    }
    examples
        .chunks(batch_size)
        .map(FeatureBatch::from_examples)
        .collect()
}
