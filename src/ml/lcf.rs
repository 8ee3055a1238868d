// ============================================================
// Layer 5 — LCF-ATEPC
// ============================================================
// Local Context Focus on top of the dual encoder:
//
//   global words ───────────────────────────────┐
//                                               │
//   local words × CDM ─ SA ─┐                   ├─ cat → Linear → dropout
//   local words × CDW ─ SA ─┴─ (per lcf mode) ──┘          │
//                                                          SA
//                                                          │
//                                              pooler → polarity head
//
//   cdm / cdw : cat(global, weighted)              → Linear(2H, H)
//   fusion    : cat(global, cdw_local, cdm_local)  → Linear(3H, H)
//
// The tag head only ever reads the global branch.

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
pub struct LcfAtepc<B: Backend> {
    pub encoders: DualEncoder<B>,
    pub heads: Heads<B>,
    pub local_attention: SelfAttentionBlock<B>,
    pub fusion: Linear<B>,
    pub fused_attention: SelfAttentionBlock<B>,
    pub use_cdm: bool,
    pub use_cdw: bool,
}

impl<B: Backend> LcfAtepc<B> {
    pub fn mode(&self) -> LcfMode {
        match (self.use_cdm, self.use_cdw) {
            (true, true) => LcfMode::Fusion,
            (true, false) => LcfMode::Cdm,
            _ => LcfMode::Cdw,
        }
    }
}

impl<B: Backend> AtepcModel<B> for LcfAtepc<B> {
    fn init(config: &AtepcModelConfig, device: &B::Device) -> Self {
        let (h, heads) = (config.hidden(), config.heads());
        let (use_cdm, use_cdw) = match config.lcf {
            LcfMode::Cdm => (true, false),
            LcfMode::Cdw => (false, true),
            LcfMode::Fusion => (true, true),
        };
        let branches = if use_cdm && use_cdw { 3 } else { 2 };

        Self {
            encoders: DualEncoder::new(config, device),
            heads: Heads::new(config, device),
            local_attention: SelfAttentionBlock::new(h, heads, config.dropout, device),
            fusion: LinearConfig::new(branches * h, h).init(device),
            fused_attention: SelfAttentionBlock::new(h, heads, config.dropout, device),
            use_cdm,
            use_cdw,
        }
    }

    fn implements(kind: ModelKind) -> bool {
        matches!(kind, ModelKind::LcfCdm | ModelKind::LcfCdw | ModelKind::LcfFusion)
    }

    fn forward(&self, batch: &AtepcBatch<B>) -> AtepcOutput<B> {
        let compress = |hidden: Tensor<B, 3>| {
            compress_to_words(hidden, batch.word_index.clone(), batch.word_mask.clone())
        };
        let pad = batch.word_pad_mask();

        let global = compress(self.encoders.encode_global(batch));
        let tag_logits = self.heads.tags(global.clone());

        let local = self.heads.dropout.forward(compress(self.encoders.encode_local(batch)));
        let focus = |weights: &Tensor<B, 2>| {
            self.local_attention.forward(weight_by(local.clone(), weights.clone()), pad.clone())
        };

        // Every focus branch passes through local_attention, fusion mode
        // included: the cdw and cdm features are refined separately and
        // never concatenated as raw weighted vectors.
        let mut branches = vec![global];
        if self.use_cdw {
            branches.push(focus(&batch.cdw));
        }
        if self.use_cdm {
            branches.push(focus(&batch.cdm));
        }

        let fused = self.fusion.forward(Tensor::cat(branches, 2));
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
    fn test_every_mode_produces_both_heads() {
        let device = Default::default();
        let batch = tiny_batch();
        for mode in [LcfMode::Cdm, LcfMode::Cdw, LcfMode::Fusion] {
            let model = LcfAtepc::<TestBackend>::init(&tiny_config(mode, EncoderSharing::Shared), &device);
            assert_eq!(model.mode(), mode);
            let out = model.forward(&batch);
            assert_eq!(out.tag_logits.dims(), [2, 8, NUM_LABELS]);
            assert_eq!(out.polarity_logits.dims(), [2, 3]);
        }
    }

    #[test]
    fn test_fusion_concatenates_global_and_both_focus_branches() {
        let device = Default::default();
        let fusion = LcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Fusion, EncoderSharing::Shared), &device);
        let cdw = LcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdw, EncoderSharing::Shared), &device);
        // hidden 8: global + cdw + cdm vs global + cdw
        assert_eq!(fusion.fusion.weight.val().dims(), [24, 8]);
        assert_eq!(cdw.fusion.weight.val().dims(), [16, 8]);
    }

    #[test]
    fn test_implements_only_lcf_variants() {
        assert!(LcfAtepc::<TestBackend>::implements(ModelKind::LcfFusion));
        assert!(LcfAtepc::<TestBackend>::implements(ModelKind::LcfCdm));
        assert!(!LcfAtepc::<TestBackend>::implements(ModelKind::Base));
        assert!(!LcfAtepc::<TestBackend>::implements(ModelKind::SlideWindow));
    }

    #[test]
    fn test_independent_encoder_is_separate() {
        let device = Default::default();
        let shared = LcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdw, EncoderSharing::Shared), &device);
        let dual =
            LcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdw, EncoderSharing::Independent), &device);
        assert!(shared.encoders.local.is_none());
        assert!(dual.encoders.local.is_some());
        assert!(dual.num_params() > shared.num_params());
    }

    #[test]
    fn test_joint_loss_is_finite() {
        let device = Default::default();
        let model = LcfAtepc::<TestBackend>::init(&tiny_config(LcfMode::Fusion, EncoderSharing::Shared), &device);
        let (loss, _) = model.forward_loss(&tiny_batch());
        let total: f32 = loss.total.into_scalar();
        assert!(total.is_finite() && total > 0.0);
    }
}
