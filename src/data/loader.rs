// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads the 3-line ATEPC dataset format:
//
//   the $T$ is great but the screen is dim      ← context
//   battery life                                ← aspect (lowercased)
//   2                                           ← polarity label
//
// The context marks the aspect either with the `$T$`
// placeholder or by wrapping it in `[ASP]` markers:
//
//   the [ASP]battery life[ASP] is great ...
//
// Blank lines between records are ignored. Any malformed record
// fails the whole load: no partial dataset is ever returned.
//
// The same module parses inference markup, where `[ASP]` markers
// and a trailing `!sent!` annotation are stripped before the
// sentence is split into words.

use std::fs;
use std::path::{Path, PathBuf};

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::{AbsaError, AbsaResult};
use crate::domain::example::Example;
use crate::domain::traits::ExampleSource;

pub const ASPECT_PLACEHOLDER: &str = "$T$";
pub const ASPECT_MARKER: &str = "[ASP]";
pub const ANNOTATION_MARKER: &str = "!sent!";

// ─── DatasetFile ──────────────────────────────────────────────────────────────
/// A dataset file in the 3-line record format.
pub struct DatasetFile {
    path: PathBuf,
}

impl DatasetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExampleSource for DatasetFile {
    fn load_examples(&self) -> AbsaResult<Vec<Example>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            AbsaError::config(format!("cannot read dataset '{}': {e}", self.path.display()))
        })?;
        let examples = parse_records(&text).map_err(|e| match e {
            AbsaError::Data(msg) => AbsaError::data(format!("{}: {msg}", self.path.display())),
            other => other,
        })?;
        tracing::info!("Loaded {} examples from '{}'", examples.len(), self.path.display());
        Ok(examples)
    }
}

/// Parse the full text of a dataset file.
pub fn parse_records(text: &str) -> AbsaResult<Vec<Example>> {
    let cleaner = Preprocessor::new();
    let lines: Vec<String> = text
        .lines()
        .map(|l| cleaner.clean_line(l))
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() % 3 != 0 {
        return Err(AbsaError::data(format!(
            "incomplete record: {} non-blank lines is not a multiple of 3",
            lines.len()
        )));
    }

    lines
        .chunks(3)
        .enumerate()
        .map(|(n, rec)| parse_record(&rec[0], &rec[1], &rec[2]).map_err(|e| match e {
            AbsaError::Data(msg) => AbsaError::data(format!("record {}: {msg}", n + 1)),
            other => other,
        }))
        .collect()
}

fn parse_record(context: &str, aspect: &str, polarity: &str) -> AbsaResult<Example> {
    let label: i64 = polarity
        .trim()
        .parse()
        .map_err(|_| AbsaError::data(format!("polarity '{polarity}' is not an integer")))?;
    if label < 0 {
        return Err(AbsaError::data(format!("polarity {label} is negative")));
    }

    let aspect = aspect.trim().to_lowercase();
    let aspect_words: Vec<String> = aspect.split_whitespace().map(String::from).collect();
    if aspect_words.is_empty() {
        return Err(AbsaError::data("empty aspect line"));
    }

    let (left, right) = split_context(context, &aspect)?;
    Ok(Example::new(words_of(left), aspect_words, words_of(right), label as usize))
}

/// Split a context line into the text left and right of the aspect.
fn split_context<'a>(context: &'a str, aspect: &str) -> AbsaResult<(&'a str, &'a str)> {
    if let Some((left, right)) = context.split_once(ASPECT_PLACEHOLDER) {
        return Ok((left, right));
    }

    if let Some((left, rest)) = context.split_once(ASPECT_MARKER) {
        let (marked, right) = rest.split_once(ASPECT_MARKER).ok_or_else(|| {
            AbsaError::data(format!("unclosed {ASPECT_MARKER} marker in '{context}'"))
        })?;
        let marked = marked.split_whitespace().collect::<Vec<_>>().join(" ");
        if marked.to_lowercase() != aspect {
            return Err(AbsaError::data(format!(
                "aspect '{aspect}' not found in context, marked text is '{marked}'"
            )));
        }
        return Ok((left, right));
    }

    Err(AbsaError::data(format!("aspect '{aspect}' not found in context '{context}'")))
}

fn words_of(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

// ─── Inference markup ─────────────────────────────────────────────────────────
/// Words of an inference sentence with markers and annotations removed.
pub fn parse_inference_text(text: &str) -> Vec<String> {
    let body = match text.split_once(ANNOTATION_MARKER) {
        Some((body, _)) => body,
        None => text,
    };
    let cleaned = Preprocessor::new().clean_line(&body.replace(ASPECT_MARKER, " "));
    words_of(&cleaned)
}

/// One inference text per non-empty line.
pub fn read_inference_file(path: &Path) -> AbsaResult<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| AbsaError::config(format!("cannot read '{}': {e}", path.display())))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_record() {
        let examples = parse_records("great $T$ life\nbattery\n2\n").unwrap();
        assert_eq!(examples.len(), 1);
        let ex = &examples[0];
        assert_eq!(ex.left, vec!["great"]);
        assert_eq!(ex.aspect, vec!["battery"]);
        assert_eq!(ex.right, vec!["life"]);
        assert_eq!(ex.polarity, Some(2));
    }

    #[test]
    fn test_marker_record_matches_placeholder() {
        let a = parse_records("great $T$ life\nbattery\n2").unwrap();
        let b = parse_records("great [ASP]battery[ASP] life\nbattery\n2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let text = "\n$T$ is cold\nfood\n0\n\n\nnice $T$\nstaff\n2\n\n";
        let examples = parse_records(text).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].aspect, vec!["staff"]);
    }

    #[test]
    fn test_aspect_line_is_lowercased() {
        let ex = &parse_records("the $T$ rocks\nBattery Life\n1").unwrap()[0];
        assert_eq!(ex.aspect, vec!["battery", "life"]);
    }

    #[test]
    fn test_incomplete_record_fails() {
        let err = parse_records("great $T$ life\nbattery\n2\nbad $T$\nscreen\n").unwrap_err();
        assert!(matches!(err, AbsaError::Data(_)));
    }

    #[test]
    fn test_non_integer_label_fails() {
        let err = parse_records("great $T$ life\nbattery\npositive").unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_missing_aspect_fails() {
        assert!(parse_records("great battery life\nbattery\n2").is_err());
        assert!(parse_records("great [ASP]screen[ASP]\nbattery\n2").is_err());
    }

    #[test]
    fn test_inference_markup_is_stripped() {
        let words = parse_inference_text("great [ASP]battery[ASP] life !sent! Positive");
        assert_eq!(words, vec!["great", "battery", "life"]);
    }
}
