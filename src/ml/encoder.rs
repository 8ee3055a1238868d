// ============================================================
// Layer 5 — Context Encoder
// ============================================================
// The pretrained-encoder slot of the model: token ids in,
// one H-dimensional vector per subword out.
//
//   token embedding + position embedding + segment embedding
//       → dropout
//       → N × TransformerBlock (padding masked)
//       → final LayerNorm
//
// The encoder starts from random weights unless a burn record
// named `encoder` is found next to the tokenizer, in
// which case it is restored from there.

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig},
    prelude::*,
    record::CompactRecorder,
};
use std::path::Path;

use crate::domain::error::{AbsaError, AbsaResult};
use crate::infra::checkpoint::record_file;
use crate::ml::attention::TransformerBlock;

/// File stem of a pretrained encoder record inside a tokenizer directory.
pub const ENCODER_RECORD: &str = "encoder";

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ContextEncoderConfig {
    pub vocab_size: usize,
    pub max_position: usize,
    pub hidden_dim: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub d_ff: usize,
    pub dropout: f64,
}

impl ContextEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ContextEncoder<B> {
        let layers = (0..self.num_layers)
            .map(|_| {
                TransformerBlock::new(self.hidden_dim, self.num_heads, self.d_ff, self.dropout, device)
            })
            .collect();
        ContextEncoder {
            token_embedding: EmbeddingConfig::new(self.vocab_size, self.hidden_dim).init(device),
            position_embedding: EmbeddingConfig::new(self.max_position, self.hidden_dim).init(device),
            segment_embedding: EmbeddingConfig::new(2, self.hidden_dim).init(device),
            layers,
            final_norm: LayerNormConfig::new(self.hidden_dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ContextEncoder<B: Backend> {
    pub token_embedding: Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding: Embedding<B>,
    pub layers: Vec<TransformerBlock<B>>,
    pub final_norm: LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> ContextEncoder<B> {
    /// input_ids, segment_ids: [batch, seq]; pad_mask true at padding.
    /// Returns [batch, seq, H].
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch, seq] = input_ids.dims();
        let device = input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq as i64, &device)
            .unsqueeze::<2>()
            .expand([batch, seq]);

        let x = self.token_embedding.forward(input_ids)
            + self.position_embedding.forward(positions)
            + self.segment_embedding.forward(segment_ids);

        let mut x = self.dropout.forward(x);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        self.final_norm.forward(x)
    }

    /// Restore weights from the `encoder` record in `dir` when it exists.
    pub fn load_pretrained(self, dir: &Path, device: &B::Device) -> AbsaResult<Self> {
        let base = dir.join(ENCODER_RECORD);
        if !record_file::<B>(&base).exists() {
            return Ok(self);
        }
        let encoder = self.load_file(base.clone(), &CompactRecorder::new(), device).map_err(|e| {
            AbsaError::checkpoint(format!("cannot load encoder '{}': {e}", base.display()))
        })?;
        tracing::info!("Restored pretrained encoder from '{}'", dir.display());
        Ok(encoder)
    }
}
