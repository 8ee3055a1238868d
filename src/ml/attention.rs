// ============================================================
// Layer 5 — Attention Building Blocks
// ============================================================
// Three small modules shared by the encoder and every model
// variant:
//
//   TransformerBlock   MHA + residual + LayerNorm, then a GELU
//                      feed-forward + residual + LayerNorm.
//                      Stacked N times inside ContextEncoder.
//
//   SelfAttentionBlock MHA + residual + LayerNorm only. Refines
//                      word-level features after the local
//                      branch has been weighted by CDM / CDW.
//
//   Pooler             first position → Linear(H, H) → tanh,
//                      the sentence vector the polarity head
//                      reads.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

// ─── TransformerBlock ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    pub self_attn: MultiHeadAttention<B>,
    pub ffn_in: Linear<B>,
    pub ffn_out: Linear<B>,
    pub norm_attn: LayerNorm<B>,
    pub norm_ffn: LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> TransformerBlock<B> {
    pub fn new(hidden: usize, heads: usize, d_ff: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            self_attn: MultiHeadAttentionConfig::new(hidden, heads)
                .with_dropout(dropout)
                .init(device),
            ffn_in: LinearConfig::new(hidden, d_ff).init(device),
            ffn_out: LinearConfig::new(d_ff, hidden).init(device),
            norm_attn: LayerNormConfig::new(hidden).init(device),
            norm_ffn: LayerNormConfig::new(hidden).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// x: [batch, seq, H], pad_mask: [batch, seq] true at padding
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm_attn.forward(x + self.dropout.forward(attn));
        let ffn = self.ffn_out.forward(gelu(self.ffn_in.forward(x.clone())));
        self.norm_ffn.forward(x + self.dropout.forward(ffn))
    }
}

// ─── SelfAttentionBlock ───────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SelfAttentionBlock<B: Backend> {
    pub attn: MultiHeadAttention<B>,
    pub norm: LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> SelfAttentionBlock<B> {
    pub fn new(hidden: usize, heads: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            attn: MultiHeadAttentionConfig::new(hidden, heads)
                .with_dropout(dropout)
                .init(device),
            norm: LayerNormConfig::new(hidden).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        self.norm.forward(x + self.dropout.forward(attn))
    }
}

// ─── Pooler ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Pooler<B: Backend> {
    pub dense: Linear<B>,
}

impl<B: Backend> Pooler<B> {
    pub fn new(hidden: usize, device: &B::Device) -> Self {
        Self { dense: LinearConfig::new(hidden, hidden).init(device) }
    }

    /// [batch, seq, H] → [batch, H]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, hidden] = x.dims();
        let first = x.slice([0..batch, 0..1, 0..hidden]).reshape([batch, hidden]);
        self.dense.forward(first).tanh()
    }
}
