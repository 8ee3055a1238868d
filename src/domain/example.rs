// ============================================================
// Layer 3 — Example and BIO Tags
// ============================================================
// An Example is one (sentence, aspect, polarity) triple read
// from a dataset file, already split into three word lists:
//
//   left   = words before the aspect
//   aspect = the aspect term itself (one or more words)
//   right  = words after the aspect
//
// The BIO tags are derived from that split: the first aspect
// word is B-ASP, the remaining aspect words are I-ASP, every
// other word is O.
//
// An *extraction* example has no aspect at all. It is what the
// inference pipeline feeds the model when it does not know yet
// where the aspects are.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Polarity label used for "no polarity here" (padding, non-aspect tokens).
pub const SENTIMENT_PADDING: i64 = -999;

/// Polarity mask value marking the aspect tokens of an extraction result.
pub const ASPECT_MARK: i64 = 999;

// ─── BioTag ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BioTag {
    #[serde(rename = "O")]
    O,
    #[serde(rename = "B-ASP")]
    BAsp,
    #[serde(rename = "I-ASP")]
    IAsp,
}

impl BioTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BioTag::O => "O",
            BioTag::BAsp => "B-ASP",
            BioTag::IAsp => "I-ASP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "O" => Some(BioTag::O),
            "B-ASP" => Some(BioTag::BAsp),
            "I-ASP" => Some(BioTag::IAsp),
            _ => None,
        }
    }

    pub fn is_aspect(&self) -> bool {
        !matches!(self, BioTag::O)
    }
}

impl fmt::Display for BioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Span extraction ──────────────────────────────────────────────────────────
/// Group a tag sequence into aspect spans.
///
/// A span opens at `B-ASP`, or at an `I-ASP` that is not already
/// inside a span, and extends over the following `I-ASP` tags.
/// A `B-ASP` directly after a span closes it and opens a new one.
pub fn aspect_spans(tags: &[BioTag]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;

    for (i, tag) in tags.iter().enumerate() {
        match tag {
            BioTag::BAsp => {
                if let Some(start) = open.take() {
                    spans.push(start..i);
                }
                open = Some(i);
            }
            BioTag::IAsp => {
                if open.is_none() {
                    open = Some(i);
                }
            }
            BioTag::O => {
                if let Some(start) = open.take() {
                    spans.push(start..i);
                }
            }
        }
    }
    if let Some(start) = open {
        spans.push(start..tags.len());
    }
    spans
}

// ─── Example ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub left: Vec<String>,
    pub aspect: Vec<String>,
    pub right: Vec<String>,

    /// Class index in `[0, N-1]`; `None` for extraction examples.
    pub polarity: Option<usize>,
}

impl Example {
    pub fn new(left: Vec<String>, aspect: Vec<String>, right: Vec<String>, polarity: usize) -> Self {
        Self { left, aspect, right, polarity: Some(polarity) }
    }

    /// An aspect-free example over the whole sentence.
    pub fn for_extraction(words: Vec<String>) -> Self {
        Self { left: words, aspect: Vec::new(), right: Vec::new(), polarity: None }
    }

    /// Split a word list around `span` to get a classification example
    /// with an unknown polarity.
    pub fn from_span(words: &[String], span: Range<usize>) -> Self {
        Self {
            left: words[..span.start].to_vec(),
            aspect: words[span.clone()].to_vec(),
            right: words[span.end..].to_vec(),
            polarity: None,
        }
    }

    pub fn is_extraction(&self) -> bool {
        self.aspect.is_empty()
    }

    pub fn len(&self) -> usize {
        self.left.len() + self.aspect.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All sentence words in order.
    pub fn words(&self) -> Vec<String> {
        self.left
            .iter()
            .chain(&self.aspect)
            .chain(&self.right)
            .cloned()
            .collect()
    }

    /// Word positions of the aspect inside `words()`.
    pub fn aspect_range(&self) -> Range<usize> {
        self.left.len()..self.left.len() + self.aspect.len()
    }

    pub fn tags(&self) -> Vec<BioTag> {
        let aspect = self.aspect_range();
        (0..self.len())
            .map(|i| {
                if i == aspect.start && !aspect.is_empty() {
                    BioTag::BAsp
                } else if aspect.contains(&i) {
                    BioTag::IAsp
                } else {
                    BioTag::O
                }
            })
            .collect()
    }

    pub fn sentence(&self) -> String {
        self.words().join(" ")
    }

    pub fn aspect_text(&self) -> String {
        self.aspect.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_tags_follow_aspect_split() {
        let ex = Example::new(words("the"), words("battery life"), words("is great"), 2);
        assert_eq!(
            ex.tags(),
            vec![BioTag::O, BioTag::BAsp, BioTag::IAsp, BioTag::O, BioTag::O]
        );
        assert_eq!(ex.aspect_range(), 1..3);
        assert_eq!(ex.sentence(), "the battery life is great");
    }

    #[test]
    fn test_extraction_example_is_all_outside() {
        let ex = Example::for_extraction(words("good food"));
        assert!(ex.is_extraction());
        assert!(ex.tags().iter().all(|t| *t == BioTag::O));
        assert_eq!(ex.polarity, None);
    }

    #[test]
    fn test_from_span_round_trips_words() {
        let w = words("great battery but poor screen");
        let ex = Example::from_span(&w, 4..5);
        assert_eq!(ex.aspect, words("screen"));
        assert_eq!(ex.words(), w);
    }

    #[test]
    fn test_spans_open_on_stray_inside_tag() {
        use BioTag::*;
        let tags = [O, IAsp, IAsp, O, BAsp, BAsp, IAsp];
        assert_eq!(aspect_spans(&tags), vec![1..3, 4..5, 5..7]);
    }

    #[test]
    fn test_no_spans_for_all_outside() {
        assert!(aspect_spans(&[BioTag::O, BioTag::O]).is_empty());
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(BioTag::parse("B-ASP"), Some(BioTag::BAsp));
        assert_eq!(BioTag::IAsp.to_string(), "I-ASP");
        assert_eq!(BioTag::parse("B-PER"), None);
    }
}
