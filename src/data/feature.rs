// ============================================================
// Layer 4 — Feature Encoder
// ============================================================
// Turns one Example into the fixed-length FeatureRecord the
// model consumes. Two word lists are built:
//
//   context form   [CLS] w1 w2 ... wn [SEP]
//   SPC form       [CLS] w1 w2 ... wn [SEP] a1 ... ak [SEP]
//
// Every word is tokenised on its own, so a word may map to
// several subwords. `valid_ids` marks the first subword of
// each word; the model later keeps only those positions and
// packs them into a dense word-level prefix, which is why
// `label_ids`, CDM and CDW are all indexed by word (0 = [CLS]).
//
// Truncation drops whole words from the end. Losing part of the
// aspect would make the example meaningless, so that is an
// error rather than a silent cut.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tokenizers::Tokenizer;

use crate::data::srd::{cdm_vec, cdw_vec, positional_distances, LcfMode, UNREACHABLE};
use crate::data::syntax::tree_distances;
use crate::domain::error::{AbsaError, AbsaResult};
use crate::domain::example::{BioTag, Example, SENTIMENT_PADDING};
use crate::domain::traits::DependencyParser;

// ─── Tag label ids ────────────────────────────────────────────────────────────
pub const LABEL_IGNORE: i64 = 0;
pub const LABEL_O: i64 = 1;
pub const LABEL_B_ASP: i64 = 2;
pub const LABEL_I_ASP: i64 = 3;
pub const LABEL_CLS: i64 = 4;
pub const LABEL_SEP: i64 = 5;

/// Width of the tag head: the five labels plus the ignore id.
pub const NUM_LABELS: usize = 6;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

pub fn tag_label(tag: BioTag) -> i64 {
    match tag {
        BioTag::O => LABEL_O,
        BioTag::BAsp => LABEL_B_ASP,
        BioTag::IAsp => LABEL_I_ASP,
    }
}

/// Map a predicted label id back to a tag. Markers and the ignore id read as `O`.
pub fn label_tag(id: i64) -> BioTag {
    match id {
        LABEL_B_ASP => BioTag::BAsp,
        LABEL_I_ASP => BioTag::IAsp,
        _ => BioTag::O,
    }
}

// ─── FeatureConfig ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub max_seq_len: usize,
    pub srd: usize,
    pub lcf: LcfMode,
    pub use_syntax_based_srd: bool,
    pub use_bert_spc: bool,
    /// CDW decay scale; the sentence length when unset.
    pub cdw_scale: Option<f32>,
}

// ─── FeatureRecord ────────────────────────────────────────────────────────────
/// CDM/CDW vectors of the neighbouring aspects in the same sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourVectors {
    pub left_cdm: Vec<f32>,
    pub left_cdw: Vec<f32>,
    pub right_cdm: Vec<f32>,
    pub right_cdw: Vec<f32>,
}

/// Every sequence below has length `max_seq_len`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub words: Vec<String>,
    pub aspect_positions: Vec<usize>,

    pub input_ids_spc: Vec<u32>,
    pub input_ids_local: Vec<u32>,
    pub input_mask: Vec<u32>,
    pub local_mask: Vec<u32>,
    pub segment_ids: Vec<u32>,
    pub valid_ids: Vec<u32>,

    /// Word-level tag ids, `LABEL_IGNORE` past the last word.
    pub label_ids: Vec<i64>,
    /// Class index, or `SENTIMENT_PADDING` in extraction mode.
    pub polarity: i64,

    pub cdm_vec: Vec<f32>,
    pub cdw_vec: Vec<f32>,
    pub neighbours: Option<NeighbourVectors>,
}

impl FeatureRecord {
    pub fn seq_len(&self) -> usize {
        self.input_ids_spc.len()
    }

    /// Number of word-level positions, markers included.
    pub fn word_count(&self) -> usize {
        self.valid_ids.iter().filter(|v| **v == 1).count()
    }
}

/// Gather indices and mask that pack the first subword of every word
/// into a dense prefix: word `j` reads subword position `index[j]`.
pub fn word_alignment(valid_ids: &[u32]) -> (Vec<i32>, Vec<f32>) {
    let len = valid_ids.len();
    let mut index = vec![0i32; len];
    let mut mask = vec![0.0f32; len];
    let firsts = valid_ids.iter().enumerate().filter(|(_, v)| **v == 1).map(|(p, _)| p);
    for (j, pos) in firsts.enumerate() {
        index[j] = pos as i32;
        mask[j] = 1.0;
    }
    (index, mask)
}

// ─── FeatureEncoder ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
struct SpecialIds {
    cls: u32,
    sep: u32,
    pad: u32,
    unk: u32,
}

pub struct FeatureEncoder<'a> {
    tokenizer: &'a Tokenizer,
    config: FeatureConfig,
    parser: Option<&'a dyn DependencyParser>,
    special: SpecialIds,
}

impl<'a> FeatureEncoder<'a> {
    pub fn new(tokenizer: &'a Tokenizer, config: FeatureConfig) -> AbsaResult<Self> {
        let id = |token: &str| tokenizer.token_to_id(token);
        let cls = id(CLS_TOKEN)
            .ok_or_else(|| AbsaError::config(format!("tokenizer has no {CLS_TOKEN} token")))?;
        let sep = id(SEP_TOKEN)
            .ok_or_else(|| AbsaError::config(format!("tokenizer has no {SEP_TOKEN} token")))?;
        let pad = id(PAD_TOKEN).unwrap_or(0);
        let unk = id(UNK_TOKEN).unwrap_or(pad);

        if config.max_seq_len < 4 {
            return Err(AbsaError::config(format!(
                "max_seq_len must be at least 4, got {}",
                config.max_seq_len
            )));
        }

        Ok(Self {
            tokenizer,
            config,
            parser: None,
            special: SpecialIds { cls, sep, pad, unk },
        })
    }

    pub fn with_parser(mut self, parser: &'a dyn DependencyParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn pad_id(&self) -> u32 {
        self.special.pad
    }

    /// Subword ids of one word. A word the tokenizer maps to nothing
    /// still occupies one `[UNK]` position so word alignment holds.
    fn subwords(&self, word: &str) -> AbsaResult<Vec<u32>> {
        let encoding = self.tokenizer.encode(word, false).map_err(AbsaError::tokenizer)?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            Ok(vec![self.special.unk])
        } else {
            Ok(ids.to_vec())
        }
    }

    /// Encode every example; the first failure aborts the batch.
    pub fn encode_all(&self, examples: &[Example]) -> AbsaResult<Vec<FeatureRecord>> {
        examples.iter().map(|e| self.encode(e)).collect()
    }

    pub fn encode(&self, example: &Example) -> AbsaResult<FeatureRecord> {
        let max_len = self.config.max_seq_len;
        let words = example.words();
        let tags = example.tags();
        let aspect = example.aspect_range();
        let extraction = example.is_extraction();

        // ── Step 1: word-level entries ────────────────────────────────────────
        let mut word_entries: Vec<(Vec<u32>, i64)> = Vec::with_capacity(words.len());
        for (word, tag) in words.iter().zip(&tags) {
            word_entries.push((self.subwords(word)?, tag_label(*tag)));
        }
        let cls = (vec![self.special.cls], LABEL_CLS);
        let sep = (vec![self.special.sep], LABEL_SEP);

        // duplicated `aspect [SEP]` segment of the SPC form
        let mut tail: Vec<(Vec<u32>, i64)> = Vec::new();
        if !extraction {
            for (k, word) in example.aspect.iter().enumerate() {
                let tag = if k == 0 { BioTag::BAsp } else { BioTag::IAsp };
                tail.push((self.subwords(word)?, tag_label(tag)));
            }
            tail.push(sep.clone());
        }

        // ── Step 2: whole-word truncation ─────────────────────────────────────
        // Extraction rows fill greedily. Classification rows always keep
        // `[CLS] .. [SEP]` and the whole aspect segment, dropping context
        // words from the end; cutting an aspect word is an error.
        let (entries, context_kept, kept_words) = if extraction {
            let mut all = Vec::with_capacity(word_entries.len() + 2);
            all.push(cls);
            all.extend(word_entries);
            all.push(sep);
            let mut kept = 0usize;
            let mut used = 0usize;
            for (pieces, _) in &all {
                if used + pieces.len() > max_len {
                    break;
                }
                used += pieces.len();
                kept += 1;
            }
            all.truncate(kept);
            (all, kept, kept.saturating_sub(1).min(words.len()))
        } else {
            let tail_len: usize = tail.iter().map(|(pieces, _)| pieces.len()).sum();
            let budget = max_len.saturating_sub(tail_len + 2);
            let mut kept_words = 0usize;
            let mut used = 0usize;
            for (pieces, _) in &word_entries {
                if used + pieces.len() > budget {
                    break;
                }
                used += pieces.len();
                kept_words += 1;
            }
            if tail_len + 2 > max_len || kept_words < aspect.end {
                return Err(AbsaError::data(format!(
                    "aspect '{}' truncated: sentence does not fit max_seq_len = {max_len}",
                    example.aspect_text()
                )));
            }
            let mut all = Vec::with_capacity(kept_words + tail.len() + 2);
            all.push(cls);
            all.extend(word_entries.into_iter().take(kept_words));
            all.push(sep);
            all.extend(tail);
            (all, kept_words + 2, kept_words)
        };
        if kept_words < words.len() {
            tracing::debug!(
                "Truncated '{}' to {} of {} words",
                example.sentence(),
                kept_words,
                words.len()
            );
        }

        // ── Step 3: subword sequences ─────────────────────────────────────────
        let mut input_ids_spc = Vec::with_capacity(max_len);
        let mut input_ids_local = Vec::with_capacity(max_len);
        let mut input_mask = Vec::with_capacity(max_len);
        let mut local_mask = Vec::with_capacity(max_len);
        let mut segment_ids = Vec::with_capacity(max_len);
        let mut valid_ids = Vec::with_capacity(max_len);

        for (k, (pieces, _)) in entries.iter().enumerate() {
            let in_context = k < context_kept;
            for (m, &id) in pieces.iter().enumerate() {
                input_ids_spc.push(id);
                input_ids_local.push(if in_context { id } else { self.special.pad });
                input_mask.push(1);
                local_mask.push(u32::from(in_context));
                segment_ids.push(u32::from(!in_context));
                valid_ids.push(u32::from(m == 0));
            }
        }
        input_ids_spc.resize(max_len, self.special.pad);
        input_ids_local.resize(max_len, self.special.pad);
        input_mask.resize(max_len, 0);
        local_mask.resize(max_len, 0);
        segment_ids.resize(max_len, 0);
        valid_ids.resize(max_len, 0);

        // without the SPC form the global branch never sees the aspect segment
        let mut label_ids: Vec<i64> = entries
            .iter()
            .enumerate()
            .map(|(k, (_, label))| {
                if k >= context_kept && !self.config.use_bert_spc {
                    LABEL_IGNORE
                } else {
                    *label
                }
            })
            .collect();
        label_ids.resize(max_len, LABEL_IGNORE);

        // ── Step 4: fusion vectors over the context form ──────────────────────
        let (cdm, cdw) = if extraction {
            (vec![0.0; max_len], vec![0.0; max_len])
        } else {
            // [CLS] and the kept words; [SEP] sits right after them
            let mut distances = self.context_distances(&words, &aspect)?;
            distances.truncate(kept_words + 1);
            let shifted = aspect.start + 1..aspect.end + 1;
            distances.push(positional_distances(kept_words + 2, &shifted)[kept_words + 1]);
            let scale = self.config.cdw_scale.unwrap_or(words.len().max(1) as f32);
            (
                cdm_vec(&distances, self.config.srd, max_len),
                cdw_vec(&distances, self.config.srd, scale, max_len),
            )
        };

        Ok(FeatureRecord {
            words,
            aspect_positions: aspect.collect(),
            input_ids_spc,
            input_ids_local,
            input_mask,
            local_mask,
            segment_ids,
            valid_ids,
            label_ids,
            polarity: example.polarity.map_or(SENTIMENT_PADDING, |p| p as i64),
            cdm_vec: cdm,
            cdw_vec: cdw,
            neighbours: None,
        })
    }

    /// SRD of every context-form position (index 0 is `[CLS]`).
    fn context_distances(&self, words: &[String], aspect: &Range<usize>) -> AbsaResult<Vec<usize>> {
        let shifted = aspect.start + 1..aspect.end + 1;
        let mut distances = positional_distances(words.len() + 2, &shifted);
        if !self.config.use_syntax_based_srd {
            return Ok(distances);
        }

        let parser = self.parser.ok_or_else(|| {
            AbsaError::config("use_syntax_based_SRD is set but no dependency parser is available")
        })?;
        let heads = parser.heads(words)?;
        if heads.len() != words.len() {
            return Err(AbsaError::data(format!(
                "dependency parse has {} words, sentence has {}",
                heads.len(),
                words.len()
            )));
        }
        // markers and detached words keep their positional distance
        for (i, d) in tree_distances(&heads, aspect).into_iter().enumerate() {
            if d != UNREACHABLE {
                distances[i + 1] = d;
            }
        }
        Ok(distances)
    }
}

// ─── Slide window neighbours ──────────────────────────────────────────────────
/// Give every feature the fusion vectors of the previous and next aspect of
/// the same sentence. Examples of one sentence must be consecutive; a feature
/// without a neighbour on one side reuses its own vectors there.
pub fn attach_neighbours(features: &mut [FeatureRecord]) {
    let mut start = 0;
    while start < features.len() {
        let mut end = start + 1;
        while end < features.len() && features[end].words == features[start].words {
            end += 1;
        }

        let own: Vec<(Vec<f32>, Vec<f32>)> = features[start..end]
            .iter()
            .map(|f| (f.cdm_vec.clone(), f.cdw_vec.clone()))
            .collect();
        for k in 0..own.len() {
            let left = if k > 0 { &own[k - 1] } else { &own[k] };
            let right = own.get(k + 1).unwrap_or(&own[k]);
            features[start + k].neighbours = Some(NeighbourVectors {
                left_cdm: left.0.clone(),
                left_cdw: left.1.clone(),
                right_cdm: right.0.clone(),
                right_cdw: right.1.clone(),
            });
        }
        start = end;
    }
}
