// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalises one line of dataset or inference text before it
// is split into words.
//
// Review corpora are scraped text and carry the usual noise:
//   - non-breaking and zero-width spaces
//   - byte order marks at the start of a file
//   - tabs and stray control characters
//   - runs of spaces
//
// Word boundaries decide everything downstream (BIO tags,
// valid_ids, SRD distances), so every one of these collapses
// into a single ASCII space.

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a single line. Newlines inside the input are treated
    /// as spaces; the result never contains one.
    pub fn clean_line(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last_space = true;

        for c in line.chars() {
            let c = match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_whitespace() || c.is_control() => ' ',
                c => c,
            };
            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        if out.ends_with(' ') {
            out.pop();
        }
        out
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean_line("great   battery \t life"), "great battery life");
    }

    #[test]
    fn test_trims_edges() {
        assert_eq!(Preprocessor::new().clean_line("  the $T$ is fine  "), "the $T$ is fine");
    }

    #[test]
    fn test_unicode_spaces_become_ascii() {
        let p = Preprocessor::new();
        assert_eq!(p.clean_line("\u{FEFF}good\u{00A0}food\u{200B}here"), "good food here");
    }

    #[test]
    fn test_control_chars_split_words() {
        assert_eq!(Preprocessor::new().clean_line("hello\x01world\r"), "hello world");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(Preprocessor::new().clean_line(""), "");
    }
}
