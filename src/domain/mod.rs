// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the problem: examples, BIO
// tags, the polarity label space, the error taxonomy and the
// collaborator traits.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O or network calls
//   - NO tokenizer code

/// Example triples, BIO tags and aspect span grouping
pub mod example;

/// Polarity class inference from training labels
pub mod label_space;

/// AbsaError and AbsaResult
pub mod error;

pub mod traits;

pub use error::{AbsaError, AbsaResult};
pub use example::{aspect_spans, BioTag, Example, ASPECT_MARK, SENTIMENT_PADDING};
pub use label_space::LabelSpace;
