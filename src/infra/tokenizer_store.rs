// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Resolves the configured `pretrained_bert_name` to a tokenizer:
//
//   "" or "corpus"           build a word-level vocabulary from the
//                            training sentences (in memory)
//   path to a .json file     load it directly
//   path to a directory      load <dir>/tokenizer.json; the directory
//                            may also hold a pretrained encoder record
//   anything else            fetch tokenizer.json from the HF hub
//
// Hub download failures are reported as Transient so the caller's
// RetryPolicy can try again; everything else is fatal.
//
// The corpus-built tokenizer is written as HF tokenizer JSON and
// parsed back, which sidesteps the trainer/ModelWrapper type
// mismatch in tokenizers 0.15.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokenizers::{
    NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer,
    Tokenizer,
};

use crate::domain::error::{AbsaError, AbsaResult};

/// Reserved ids, dense from 0 so a tiny encoder vocabulary still fits them.
const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];

pub const CORPUS_TOKENIZER: &str = "corpus";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSource {
    Corpus,
    File(PathBuf),
    Directory(PathBuf),
    Hub(String),
}

impl TokenizerSource {
    pub fn resolve(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(CORPUS_TOKENIZER) {
            return TokenizerSource::Corpus;
        }
        let path = Path::new(trimmed);
        if path.is_dir() {
            TokenizerSource::Directory(path.to_path_buf())
        } else if path.is_file() {
            TokenizerSource::File(path.to_path_buf())
        } else {
            TokenizerSource::Hub(trimmed.to_string())
        }
    }

    /// Directory that may contain a pretrained `encoder` record.
    pub fn encoder_dir(&self) -> Option<&Path> {
        match self {
            TokenizerSource::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// `corpus` is only consulted for `TokenizerSource::Corpus`.
    pub fn load(&self, corpus: &[String], vocab_size: usize) -> AbsaResult<Tokenizer> {
        match self {
            TokenizerSource::Corpus => {
                tracing::info!("Building corpus tokenizer (vocab_size={})", vocab_size);
                build_vocabulary_tokenizer(corpus, vocab_size)
            }
            TokenizerSource::File(path) => load_file(path),
            TokenizerSource::Directory(dir) => load_file(&dir.join("tokenizer.json")),
            TokenizerSource::Hub(name) => fetch_from_hub(name),
        }
    }
}

pub fn load_file(path: &Path) -> AbsaResult<Tokenizer> {
    tracing::info!("Loading tokenizer from '{}'", path.display());
    Tokenizer::from_file(path).map_err(|e| {
        AbsaError::tokenizer(format!("cannot load tokenizer from '{}': {e}", path.display()))
    })
}

fn fetch_from_hub(name: &str) -> AbsaResult<Tokenizer> {
    use hf_hub::api::sync::Api;

    let api = Api::new()
        .map_err(|e| AbsaError::config(format!("cannot initialise the HuggingFace hub client: {e}")))?;
    tracing::info!("Fetching tokenizer.json for '{}' from the hub", name);
    let path = api
        .model(name.to_string())
        .get("tokenizer.json")
        .map_err(|e| AbsaError::transient(format!("download of '{name}/tokenizer.json' failed: {e}")))?;
    load_file(&path)
}

// ─── Corpus vocabulary ────────────────────────────────────────────────────────
/// HF tokenizer JSON: BERT normalizer, whitespace pre-tokenizer,
/// word-level model over `vocab`.
fn word_level_json(vocab: serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    })
}

fn from_json(value: &serde_json::Value) -> AbsaResult<Tokenizer> {
    Tokenizer::from_str(&value.to_string())
        .map_err(|e| AbsaError::tokenizer(format!("cannot build corpus tokenizer: {e}")))
}

fn special_vocab() -> serde_json::Map<String, serde_json::Value> {
    SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), serde_json::json!(id)))
        .collect()
}

/// The pieces `tokenizer` would look up for `text`, after its own
/// normalizer and pre-tokenizer.
fn pipeline_pieces(tokenizer: &Tokenizer, text: &str) -> AbsaResult<Vec<String>> {
    let mut normalized = NormalizedString::from(text);
    if let Some(normalizer) = tokenizer.get_normalizer() {
        normalizer.normalize(&mut normalized).map_err(AbsaError::tokenizer)?;
    }
    let mut pretokenized = PreTokenizedString::from(normalized);
    if let Some(pre_tokenizer) = tokenizer.get_pre_tokenizer() {
        pre_tokenizer.pre_tokenize(&mut pretokenized).map_err(AbsaError::tokenizer)?;
    }
    Ok(pretokenized
        .get_splits(OffsetReferential::Normalized, OffsetType::Byte)
        .into_iter()
        .map(|(piece, _, _)| piece.to_string())
        .collect())
}

/// Word-level tokenizer over the most frequent pieces of `texts`.
/// `vocab_size` counts the five special tokens.
pub fn build_vocabulary_tokenizer(texts: &[String], vocab_size: usize) -> AbsaResult<Tokenizer> {
    // specials only: used to split the corpus exactly as encoding will
    let pipeline = from_json(&word_level_json(special_vocab()))?;

    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for piece in pipeline_pieces(&pipeline, text)? {
            *freq.entry(piece).or_insert(0) += 1;
        }
    }

    // frequency first, then alphabetical so ids are reproducible
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

    let mut vocab = special_vocab();
    for (word, _) in &words {
        if !vocab.contains_key(word) {
            let id = vocab.len();
            vocab.insert(word.clone(), serde_json::json!(id));
        }
    }
    let size = vocab.len();

    let tokenizer = from_json(&word_level_json(vocab))?;
    tracing::debug!("Corpus tokenizer holds {} entries", size);
    Ok(tokenizer)
}

/// Persist a tokenizer as HF JSON.
pub fn save(tokenizer: &Tokenizer, path: &Path) -> AbsaResult<()> {
    tokenizer
        .save(path, false)
        .map_err(|e| AbsaError::tokenizer(format!("cannot write tokenizer to '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec!["Great battery life".to_string(), "battery don't last".to_string()]
    }

    #[test]
    fn test_special_ids_are_dense() {
        let tok = build_vocabulary_tokenizer(&corpus(), 100).unwrap();
        assert_eq!(tok.token_to_id("[PAD]"), Some(0));
        assert_eq!(tok.token_to_id("[UNK]"), Some(1));
        assert_eq!(tok.token_to_id("[CLS]"), Some(2));
        assert_eq!(tok.token_to_id("[SEP]"), Some(3));
        // most frequent word right after the specials
        assert_eq!(tok.token_to_id("battery"), Some(5));
    }

    #[test]
    fn test_whitespace_pre_tokenization() {
        let tok = build_vocabulary_tokenizer(&corpus(), 100).unwrap();
        assert_eq!(pipeline_pieces(&tok, "Don't stop").unwrap(), vec!["don", "'", "t", "stop"]);
        let tok = build_vocabulary_tokenizer(&corpus(), 100).unwrap();
        let enc = tok.encode("don't", false).unwrap();
        assert_eq!(enc.get_ids().len(), 3);
    }

    #[test]
    fn test_accented_and_cjk_words_get_vocabulary_ids() {
        let corpus = vec!["great Café food".to_string(), "电池 很好".to_string()];
        let tok = build_vocabulary_tokenizer(&corpus, 100).unwrap();
        let unk = tok.token_to_id("[UNK]").unwrap();

        let cafe = tok.encode("café", false).unwrap();
        assert_eq!(cafe.get_ids().len(), 1);
        assert_ne!(cafe.get_ids()[0], unk);
        assert_eq!(tok.token_to_id("cafe"), Some(cafe.get_ids()[0]));

        let battery = tok.encode("电池", false).unwrap();
        assert_eq!(battery.get_ids().len(), 2);
        assert!(battery.get_ids().iter().all(|id| *id != unk));
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = build_vocabulary_tokenizer(&corpus(), 100).unwrap();
        let enc = tok.encode("screen", false).unwrap();
        assert_eq!(enc.get_ids(), &[1]);
    }

    #[test]
    fn test_vocab_size_caps_words() {
        let tok = build_vocabulary_tokenizer(&corpus(), 6).unwrap();
        assert_eq!(tok.get_vocab_size(true), 6);
    }

    #[test]
    fn test_source_resolution() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TokenizerSource::resolve(""), TokenizerSource::Corpus);
        assert_eq!(TokenizerSource::resolve("Corpus"), TokenizerSource::Corpus);
        assert_eq!(
            TokenizerSource::resolve(dir.path().to_str().unwrap()),
            TokenizerSource::Directory(dir.path().to_path_buf())
        );
        assert_eq!(
            TokenizerSource::resolve("bert-base-uncased"),
            TokenizerSource::Hub("bert-base-uncased".into())
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tok.json");
        let tok = build_vocabulary_tokenizer(&corpus(), 100).unwrap();
        save(&tok, &path).unwrap();
        let back = TokenizerSource::resolve(path.to_str().unwrap()).load(&[], 0).unwrap();
        assert_eq!(back.token_to_id("battery"), tok.token_to_id("battery"));
    }
}
