// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model math lives here.
//
//   encoder.rs, attention.rs — the transformer context encoder
//                  and the self-attention / pooler blocks
//
//   model.rs     — the AtepcModel contract every variant
//                  implements, the joint loss, and the shared
//                  dual-encoder + heads pieces
//
//   base.rs, lcf.rs, slide.rs — the model variants
//   registry.rs  — config names → variant
//
//   optim.rs     — optimizer names and L2 weight decay
//   scoring.rs   — APC accuracy / macro-F1, ATE span F1
//   trainer.rs   — the Instructor: train / evaluate / checkpoint
//   inferencer.rs — extraction + classification over raw text
//
// Backends: training wraps one of the two below in Autodiff;
// evaluation and inference run on the plain backend.

use burn::backend::{NdArray, Wgpu};

pub type CpuBackend = NdArray;
pub type GpuBackend = Wgpu;

pub mod encoder;

pub mod attention;

/// Model contract, joint loss and shared building blocks
pub mod model;

/// Plain dual-branch model
pub mod base;

/// Local Context Focus (cdm / cdw / fusion)
pub mod lcf;

/// LCF with neighbouring aspects' focus windows
pub mod slide;

pub mod registry;

pub mod optim;

pub mod scoring;

/// Instructor: training loop with evaluation and checkpointing
pub mod trainer;

/// Aspect extraction and polarity inference
pub mod inferencer;

#[cfg(test)]
pub(crate) mod testing;
