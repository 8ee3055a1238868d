// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal at a time
// (training a model, or extracting aspects with one).
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Errors leave this layer as anyhow errors with context

/// TrainConfig and the training workflow
pub mod train_use_case;

/// Batch inference over texts and files
pub mod extract_use_case;
