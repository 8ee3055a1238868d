// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concerns shared by training and inference that belong to
// no single business layer:
//
//   checkpoint.rs      — checkpoint directories (weights, config,
//                        tokenizer) and the best-metric policy
//                        that decides when to write one
//
//   tokenizer_store.rs — resolves a tokenizer from a local file,
//                        a local directory, the HF hub, or the
//                        training corpus
//
//   retry.rs           — retries Transient failures (hub
//                        downloads) with a fixed delay
//
//   metrics.rs         — one CSV row per evaluation event

pub mod checkpoint;

pub mod tokenizer_store;

pub mod retry;

/// Evaluation metrics CSV logger
pub mod metrics;
