use burn::prelude::*;
use std::path::Path;

use crate::data::batcher::AtepcBatch;
use crate::domain::error::AbsaResult;
use crate::ml::model::{
    compress_to_words, AtepcModel, AtepcModelConfig, AtepcOutput, DualEncoder, Heads,
};
use crate::ml::registry::ModelKind;

/// Plain dual-branch model without local context focus: the polarity head
/// reads the pooled local encoder output directly.
#[derive(Module, Debug)]
pub struct BaseAtepc<B: Backend> {
    pub encoders: DualEncoder<B>,
    pub heads: Heads<B>,
}

impl<B: Backend> AtepcModel<B> for BaseAtepc<B> {
    fn init(config: &AtepcModelConfig, device: &B::Device) -> Self {
        Self {
            encoders: DualEncoder::new(config, device),
            heads: Heads::new(config, device),
        }
    }

    fn implements(kind: ModelKind) -> bool {
        kind == ModelKind::Base
    }

    fn forward(&self, batch: &AtepcBatch<B>) -> AtepcOutput<B> {
        let global = compress_to_words(
            self.encoders.encode_global(batch),
            batch.word_index.clone(),
            batch.word_mask.clone(),
        );
        let tag_logits = self.heads.tags(global);
        let polarity_logits = self.heads.polarity(self.encoders.encode_local(batch));
        AtepcOutput { tag_logits, polarity_logits }
    }

    fn load_pretrained_encoder(self, dir: &Path, device: &B::Device) -> AbsaResult<Self> {
        Ok(Self { encoders: self.encoders.load_pretrained(dir, device)?, heads: self.heads })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::srd::LcfMode;
    use crate::ml::model::EncoderSharing;
    use crate::ml::testing::{tiny_batch, tiny_config, TestBackend};

    #[test]
    fn test_base_model_heads() {
        let device = Default::default();
        let model = BaseAtepc::<TestBackend>::init(&tiny_config(LcfMode::Cdw, EncoderSharing::Independent), &device);
        let out = model.forward(&tiny_batch());
        assert_eq!(out.tag_logits.dims()[1], 8);
        assert_eq!(out.polarity_logits.dims(), [2, 3]);
    }
}
