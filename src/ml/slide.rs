// ============================================================
// Layer 5 — Slide-window LCF-ATEPC
// ============================================================
// Sentences often hold several aspects whose contexts overlap.
// This variant lets each example look at its neighbours' focus
// windows too:
//
//   local × own ─┐
//   local × left ┼─ cat → Linear(3H, H) → SA ─┐
//   local × right┘                            ├─ cat → Linear(2H, H) → dropout → SA
//   global ───────────────────────────────────┘                                 │
//                                                              pooler → polarity head
//
// The window uses CDM vectors in `cdm` mode and CDW vectors
// otherwise.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};
use std::path::Path;

use crate::data::batcher::AtepcBatch;
use crate::data::srd::LcfMode;
use crate::domain::error::AbsaResult;
use crate::ml::attention::SelfAttentionBlock;
use crate::ml::model::{
    compress_to_words, weight_by, AtepcModel, AtepcModelConfig, AtepcOutput, DualEncoder, Heads,
};
use crate::ml::registry::ModelKind;

#[derive(Module, Debug)]
pub struct SlideLcfAtepc<B: Backend> {
    pub encoders: DualEncoder<B>,
    pub heads: Heads<B>,
    pub window: Linear<B>,
    pub local_attention: SelfAttentionBlock<B>,
    pub fusion: Linear<B>,
    pub fused_attention: SelfAttentionBlock<B>,
    pub use_cdm: bool,
}

impl<B: Backend> AtepcModel<B> for SlideLcfAtepc<B> {
    fn init(config: &AtepcModelConfig, device: &B::Device) -> Self {
        let (h, heads) = (config.hidden(), config.heads());
        Self {
            encoders: DualEncoder::new(config, device),
            heads: Heads::new(config, device),
            window: LinearConfig::new(3 * h, h).init(device),
            local_attention: SelfAttentionBlock::new(h, heads, config.dropout, device),
            fusion: LinearConfig::new(2 * h, h).init(device),
            fused_attention: SelfAttentionBlock::new(h, heads, config.dropout, device),
            use_cdm: config.lcf == LcfMode::Cdm,
        }
    }

    fn implements(kind: ModelKind) -> bool {
        kind == ModelKind::SlideWindow
    }

    fn forward(&self, batch: &AtepcBatch<B>) -> AtepcOutput<B> {
        let pad = batch.word_pad_mask();
        let global = compress_to_words(
            self.encoders.encode_global(batch),
            batch.word_index.clone(),
            batch.word_mask.clone(),
        );
        let tag_logits = self.heads.tags(global.clone());

        let local = compress_to_words(
            self.encoders.encode_local(batch),
            batch.word_index.clone(),
            batch.word_mask.clone(),
        );
        let local = self.heads.dropout.forward(local);

        let (own, left, right) = if self.use_cdm {
            (&batch.cdm, &batch.left_cdm, &batch.right_cdm)
        } else {
            (&batch.cdw, &batch.left_cdw, &batch.right_cdw)
        };
        let windowed = Tensor::cat(
            vec![
                weight_by(local.clone(), own.clone()),
                weight_by(local.clone(), left.clone()),
                weight_by(local, right.clone()),
            ],
            2,
        );
        let local = self.local_attention.forward(self.window.forward(windowed), pad.clone());

        let fused = self.fusion.forward(Tensor::cat(vec![global, local], 2));
        let fused = self.heads.dropout.forward(fused);
        let fused = self.fused_attention.forward(fused, pad);

        AtepcOutput { tag_logits, polarity_logits: self.heads.polarity(fused) }
    }

    fn load_pretrained_encoder(self, dir: &Path, device: &B::Device) -> AbsaResult<Self> {
        Ok(Self { encoders: self.encoders.load_pretrained(dir, device)?, ..self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feature::NUM_LABELS;
    use crate::ml::model::EncoderSharing;
    use crate::ml::testing::{tiny_batch, tiny_config, TestBackend};

    #[test]
    fn test_window_forward_shapes() {
        let device = Default::default();
        let model =
            SlideLcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdw, EncoderSharing::Shared), &device);
        let out = model.forward(&tiny_batch());
        assert_eq!(out.tag_logits.dims(), [2, 8, NUM_LABELS]);
        assert_eq!(out.polarity_logits.dims(), [2, 3]);
    }

    #[test]
    fn test_cdm_mode_selects_mask_vectors() {
        let device = Default::default();
        let cdm = SlideLcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdm, EncoderSharing::Shared), &device);
        let fusion =
            SlideLcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Fusion, EncoderSharing::Shared), &device);
        assert!(cdm.use_cdm);
        assert!(!fusion.use_cdm);
    }
}
