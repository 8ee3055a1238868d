// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The feature pipeline talks to its collaborators through
// these traits only:
//
//   ExampleSource    → something that yields parsed Examples
//                      (the 3-line dataset file, an in-memory list)
//   DependencyParser → something that returns dependency heads
//                      for a sentence (a CoNLL-U file today)
//
// Neither trait mentions burn or tokenizers, so the data layer
// can be tested without either.

use crate::domain::error::AbsaResult;
use crate::domain::example::Example;

// ─── ExampleSource ────────────────────────────────────────────────────────────
pub trait ExampleSource {
    /// Load every example, failing on the first malformed record.
    fn load_examples(&self) -> AbsaResult<Vec<Example>>;
}

impl ExampleSource for Vec<Example> {
    fn load_examples(&self) -> AbsaResult<Vec<Example>> {
        Ok(self.clone())
    }
}

// ─── DependencyParser ─────────────────────────────────────────────────────────
/// Provides the dependency tree of a tokenised sentence.
pub trait DependencyParser {
    /// `heads[i]` is the index of word `i`'s head, `None` for the root.
    /// The returned vector has exactly `words.len()` entries.
    fn heads(&self, words: &[String]) -> AbsaResult<Vec<Option<usize>>>;
}
