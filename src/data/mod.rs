// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a dataset file and a tensor batch:
//
//   3-line dataset file
//       │
//       ▼
//   loader          → Examples (left / aspect / right + label)
//       │
//       ▼
//   feature         → FeatureRecords (subword ids, masks,
//       │             valid_ids, word labels, CDM / CDW)
//       │   ▲
//       │   └── srd, syntax  (distance to the aspect)
//       ▼
//   dataset         → burn Dataset
//       │
//       ▼
//   batcher         → AtepcBatch tensors

/// 3-line dataset records and inference markup
pub mod loader;

/// Line-level text cleaning
pub mod preprocessor;

/// SRD distances and the CDM / CDW vectors
pub mod srd;

/// Dependency-tree distances and the CoNLL-U reader
pub mod syntax;

/// Example → FeatureRecord
pub mod feature;

pub mod dataset;

pub mod batcher;
