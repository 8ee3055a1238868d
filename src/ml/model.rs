// ============================================================
// Layer 5 — ATEPC Model Contract
// ============================================================
// Every model variant (base, lcf, slide window) reads the same
// AtepcBatch and produces the same two heads:
//
//   tag_logits       [batch, seq, num_labels]  word-level BIO
//   polarity_logits  [batch, polarities_dim]   one per example
//
// The joint loss is the sum of two masked cross-entropies:
//   - tags, ignoring label id 0 (padding / ignored positions)
//   - polarity, ignoring SENTIMENT_PADDING (extraction rows)
//
// The helpers at the bottom are the pieces all variants share:
// compressing subword output to words and scaling word
// features by a fusion vector.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::log_softmax,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::batcher::AtepcBatch;
use crate::data::feature::LABEL_IGNORE;
use crate::data::srd::LcfMode;
use crate::domain::error::AbsaResult;
use crate::domain::example::SENTIMENT_PADDING;
use crate::ml::attention::Pooler;
use crate::ml::encoder::{ContextEncoder, ContextEncoderConfig};
use crate::ml::registry::ModelKind;

// ─── Configuration ────────────────────────────────────────────────────────────
/// Whether the local branch owns its own encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderSharing {
    /// Both branches run the same encoder instance.
    Shared,
    /// The local branch gets a separately constructed encoder.
    Independent,
}

impl EncoderSharing {
    pub fn from_dual_flag(use_dual_bert: bool) -> Self {
        if use_dual_bert {
            EncoderSharing::Independent
        } else {
            EncoderSharing::Shared
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtepcModelConfig {
    pub encoder: ContextEncoderConfig,
    pub num_labels: usize,
    pub polarities_dim: usize,
    pub dropout: f64,
    pub use_bert_spc: bool,
    pub sharing: EncoderSharing,
    /// Fusion vector(s) the local branch is weighted by.
    pub lcf: LcfMode,
}

impl AtepcModelConfig {
    pub fn hidden(&self) -> usize {
        self.encoder.hidden_dim
    }

    pub fn heads(&self) -> usize {
        self.encoder.num_heads
    }
}

// ─── Output ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AtepcOutput<B: Backend> {
    pub tag_logits: Tensor<B, 3>,
    pub polarity_logits: Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct JointLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub ate: Tensor<B, 1>,
    pub apc: Tensor<B, 1>,
}

// ─── AtepcModel ───────────────────────────────────────────────────────────────
pub trait AtepcModel<B: Backend>: Module<B> {
    fn init(config: &AtepcModelConfig, device: &B::Device) -> Self
    where
        Self: Sized;

    /// Whether this type implements the registry variant `kind`.
    fn implements(kind: ModelKind) -> bool
    where
        Self: Sized;

    /// Raw logits of both heads. Labels in the batch are not read.
    fn forward(&self, batch: &AtepcBatch<B>) -> AtepcOutput<B>;

    /// Restore encoder weights from a pretrained record directory.
    fn load_pretrained_encoder(self, dir: &Path, device: &B::Device) -> AbsaResult<Self>
    where
        Self: Sized;

    fn forward_loss(&self, batch: &AtepcBatch<B>) -> (JointLoss<B>, AtepcOutput<B>) {
        let output = self.forward(batch);
        (joint_loss(&output, batch), output)
    }
}

pub fn joint_loss<B: Backend>(output: &AtepcOutput<B>, batch: &AtepcBatch<B>) -> JointLoss<B> {
    let [b, l, c] = output.tag_logits.dims();
    let ate = masked_cross_entropy(
        output.tag_logits.clone().reshape([b * l, c]),
        batch.label_ids.clone().reshape([b * l]),
        LABEL_IGNORE,
    );
    let apc = masked_cross_entropy(
        output.polarity_logits.clone(),
        batch.polarity.clone(),
        SENTIMENT_PADDING,
    );
    JointLoss { total: ate.clone() + apc.clone(), ate, apc }
}

/// Mean cross-entropy over the rows whose target is not `ignore`.
/// A batch where every row is ignored contributes zero.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    ignore: i64,
) -> Tensor<B, 1> {
    let [n, _] = logits.dims();
    let ignored = targets.clone().equal_elem(ignore);
    let keep = ignored.clone().bool_not().float();
    let safe = targets.mask_fill(ignored, 0);

    let picked = log_softmax(logits, 1)
        .gather(1, safe.reshape([n, 1]))
        .reshape([n]);
    let count = keep.clone().sum().clamp_min(1.0);
    (picked * keep).sum().neg() / count
}

// ─── Shared pieces ────────────────────────────────────────────────────────────
/// Keep the first subword vector of every word, packed to the front.
/// hidden: [b, l, h], word_index: [b, l], word_mask: [b, l]
pub fn compress_to_words<B: Backend>(
    hidden: Tensor<B, 3>,
    word_index: Tensor<B, 2, Int>,
    word_mask: Tensor<B, 2>,
) -> Tensor<B, 3> {
    let [b, l, h] = hidden.dims();
    let index = word_index.reshape([b, l, 1]).expand([b, l, h]);
    hidden.gather(1, index) * word_mask.reshape([b, l, 1])
}

/// Scale every word vector by its fusion weight. weights: [b, l]
pub fn weight_by<B: Backend>(words: Tensor<B, 3>, weights: Tensor<B, 2>) -> Tensor<B, 3> {
    let [b, l] = weights.dims();
    words * weights.reshape([b, l, 1])
}

/// Encoder pair plus the heads every variant has.
#[derive(Module, Debug)]
pub struct DualEncoder<B: Backend> {
    pub global: ContextEncoder<B>,
    /// `None` when the local branch shares the global encoder.
    pub local: Option<ContextEncoder<B>>,
    pub use_bert_spc: bool,
}

impl<B: Backend> DualEncoder<B> {
    pub fn new(config: &AtepcModelConfig, device: &B::Device) -> Self {
        let local = match config.sharing {
            EncoderSharing::Shared => None,
            EncoderSharing::Independent => Some(config.encoder.init(device)),
        };
        Self { global: config.encoder.init(device), local, use_bert_spc: config.use_bert_spc }
    }

    /// Subword output of the global branch: SPC form or context only.
    pub fn encode_global(&self, batch: &AtepcBatch<B>) -> Tensor<B, 3> {
        if self.use_bert_spc {
            self.global.forward(
                batch.input_ids_spc.clone(),
                batch.segment_ids.clone(),
                batch.pad_mask_spc.clone(),
            )
        } else {
            self.global.forward(
                batch.input_ids_local.clone(),
                batch.segment_ids.clone().zeros_like(),
                batch.pad_mask_local.clone(),
            )
        }
    }

    /// Subword output of the local branch over the context-only ids.
    pub fn encode_local(&self, batch: &AtepcBatch<B>) -> Tensor<B, 3> {
        let encoder = self.local.as_ref().unwrap_or(&self.global);
        encoder.forward(
            batch.input_ids_local.clone(),
            batch.segment_ids.clone().zeros_like(),
            batch.pad_mask_local.clone(),
        )
    }

    pub fn load_pretrained(self, dir: &Path, device: &B::Device) -> AbsaResult<Self> {
        let global = self.global.load_pretrained(dir, device)?;
        let local = match self.local {
            Some(local) => Some(local.load_pretrained(dir, device)?),
            None => None,
        };
        Ok(Self { global, local, use_bert_spc: self.use_bert_spc })
    }
}

/// Dropout, tag head, pooler and polarity head.
#[derive(Module, Debug)]
pub struct Heads<B: Backend> {
    pub dropout: Dropout,
    pub tagger: Linear<B>,
    pub pooler: Pooler<B>,
    pub classifier: Linear<B>,
}

impl<B: Backend> Heads<B> {
    pub fn new(config: &AtepcModelConfig, device: &B::Device) -> Self {
        let h = config.hidden();
        Self {
            dropout: DropoutConfig::new(config.dropout).init(),
            tagger: LinearConfig::new(h, config.num_labels).init(device),
            pooler: Pooler::new(h, device),
            classifier: LinearConfig::new(h, config.polarities_dim).init(device),
        }
    }

    pub fn tags(&self, global_words: Tensor<B, 3>) -> Tensor<B, 3> {
        self.tagger.forward(self.dropout.forward(global_words))
    }

    pub fn polarity(&self, fused: Tensor<B, 3>) -> Tensor<B, 2> {
        let pooled = self.pooler.forward(fused);
        self.classifier.forward(self.dropout.forward(pooled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_masked_cross_entropy_skips_ignored_rows() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [10.0, -10.0]], &device);

        // only the first row counts: uniform logits → ln 2
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, -999], &device);
        let loss: f32 = masked_cross_entropy(logits.clone(), targets, -999).into_scalar();
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);

        let all_ignored = Tensor::<TestBackend, 1, Int>::from_ints([-999, -999], &device);
        let loss: f32 = masked_cross_entropy(logits, all_ignored, -999).into_scalar();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_compress_packs_first_subwords() {
        let device = Default::default();
        // one sentence, 4 subwords, hidden 1: values 10 20 30 40
        let hidden = Tensor::<TestBackend, 3>::from_floats([[[10.0], [20.0], [30.0], [40.0]]], &device);
        let index = Tensor::<TestBackend, 2, Int>::from_ints([[0, 2, 3, 0]], &device);
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 1.0, 0.0]], &device);
        let words: Vec<f32> = compress_to_words(hidden, index, mask).into_data().iter::<f32>().collect();
        assert_eq!(words, vec![10.0, 30.0, 40.0, 0.0]);
    }

    #[test]
    fn test_weight_by_scales_rows() {
        let device = Default::default();
        let words = Tensor::<TestBackend, 3>::ones([1, 3, 2], &device);
        let weights = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.5, 0.0]], &device);
        let out: Vec<f32> = weight_by(words, weights).into_data().iter::<f32>().collect();
        assert_eq!(out, vec![1.0, 1.0, 0.5, 0.5, 0.0, 0.0]);
    }
}
