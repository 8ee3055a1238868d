// ============================================================
// Layer 5 — Aspect Extractor (inference)
// ============================================================
// Runs a trained model over raw sentences in two passes:
//
//   text ──parse markup──► words
//        ──extraction────► word tags (tag head, no aspect)
//        ──span grouping─► one ExtractionResult per aspect
//        ──classification► one PolarityResult per aspect
//                          (polarity head, aspect = the span)
//
// The extraction pass encodes the sentence without an aspect,
// so only the tag head output is meaningful there. The second
// pass builds one classification example per span and batches
// them together.

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::AtepcBatcher,
    feature::{attach_neighbours, label_tag, FeatureEncoder, FeatureRecord},
    loader::parse_inference_text,
};
use crate::domain::{
    error::{AbsaError, AbsaResult},
    example::{aspect_spans, BioTag, Example, ASPECT_MARK, SENTIMENT_PADDING},
    traits::DependencyParser,
};
use crate::ml::{model::AtepcModel, trainer::TrainedModel};

// ─── Results ──────────────────────────────────────────────────────────────────
/// One detected aspect with every other span reset to `O`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub tokens: Vec<String>,
    pub tags: Vec<BioTag>,
    /// `ASPECT_MARK` on this aspect's words, `SENTIMENT_PADDING` elsewhere.
    pub polarity_mask: Vec<i64>,
}

impl ExtractionResult {
    pub fn span(&self) -> Range<usize> {
        let start = self.polarity_mask.iter().position(|m| *m == ASPECT_MARK).unwrap_or(0);
        let end = self.polarity_mask.iter().rposition(|m| *m == ASPECT_MARK).map_or(start, |p| p + 1);
        start..end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolarityResult {
    pub aspect: String,
    pub position: Vec<usize>,
    pub sentiment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectAnalysis {
    pub sentence: String,
    pub tokens: Vec<String>,
    pub extraction: Vec<ExtractionResult>,
    /// Empty when sentiment prediction is off.
    pub polarity: Vec<PolarityResult>,
}

/// Per-span extraction results: tags and polarity mask of `span`
/// only, everything else `O` / `SENTIMENT_PADDING`.
pub fn split_by_span(words: &[String], tags: &[BioTag]) -> Vec<ExtractionResult> {
    aspect_spans(tags)
        .into_iter()
        .map(|span| {
            let mut own_tags = vec![BioTag::O; tags.len()];
            let mut polarity_mask = vec![SENTIMENT_PADDING; tags.len()];
            for i in span {
                own_tags[i] = tags[i];
                polarity_mask[i] = ASPECT_MARK;
            }
            ExtractionResult { tokens: words.to_vec(), tags: own_tags, polarity_mask }
        })
        .collect()
}

// ─── Sentiment names ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentMap(BTreeMap<i64, String>);

impl SentimentMap {
    /// Negative / Neutral / Positive for three classes, the class index otherwise.
    pub fn default_for(polarities_dim: usize) -> Self {
        let mut names = BTreeMap::new();
        if polarities_dim == 3 {
            names.insert(0, "Negative".to_string());
            names.insert(1, "Neutral".to_string());
            names.insert(2, "Positive".to_string());
        } else {
            for i in 0..polarities_dim as i64 {
                names.insert(i, i.to_string());
            }
        }
        Self::from_map(names)
    }

    /// The padding entry is always present.
    pub fn from_map(mut names: BTreeMap<i64, String>) -> Self {
        names.insert(SENTIMENT_PADDING, String::new());
        Self(names)
    }

    pub fn name(&self, class: i64) -> String {
        self.0.get(&class).cloned().unwrap_or_else(|| class.to_string())
    }
}

// ─── AspectPipeline ───────────────────────────────────────────────────────────
/// Backend-free view of a loaded model, so callers can hold any variant.
pub trait AspectPipeline {
    fn analyse(&self, text: &str) -> AbsaResult<AspectAnalysis>;
}

// ─── AspectExtractor ──────────────────────────────────────────────────────────
pub struct AspectExtractor<B: Backend, M> {
    model: M,
    config: TrainConfig,
    tokenizer: Tokenizer,
    sentiments: SentimentMap,
    parser: Option<Box<dyn DependencyParser>>,
    predict_sentiment: bool,
    needs_neighbours: bool,
    device: B::Device,
}

impl<B: Backend, M: AtepcModel<B>> AspectExtractor<B, M> {
    pub fn new(model: M, config: TrainConfig, tokenizer: Tokenizer, device: B::Device) -> AbsaResult<Self> {
        let polarities_dim = config
            .polarities_dim
            .ok_or_else(|| AbsaError::config("inference needs a config with polarities_dim"))?;
        let needs_neighbours = config.model_kind()?.needs_neighbours();
        // fails early on a tokenizer without [CLS] / [SEP]
        FeatureEncoder::new(&tokenizer, config.feature_config())?;

        Ok(Self {
            model,
            config,
            tokenizer,
            sentiments: SentimentMap::default_for(polarities_dim),
            parser: None,
            predict_sentiment: true,
            needs_neighbours,
            device,
        })
    }

    pub fn with_sentiment_map(mut self, sentiments: SentimentMap) -> Self {
        self.sentiments = sentiments;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn DependencyParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_sentiment_prediction(mut self, enabled: bool) -> Self {
        self.predict_sentiment = enabled;
        self
    }

    fn encoder(&self) -> AbsaResult<FeatureEncoder<'_>> {
        let encoder = FeatureEncoder::new(&self.tokenizer, self.config.feature_config())?;
        Ok(match &self.parser {
            Some(parser) => encoder.with_parser(parser.as_ref()),
            None => encoder,
        })
    }

    fn batch(&self, records: Vec<FeatureRecord>) -> crate::data::batcher::AtepcBatch<B> {
        AtepcBatcher::<B>::new(self.device.clone()).batch(records)
    }

    /// Word tags of `words`, then one result per detected span.
    pub fn extract(&self, words: &[String]) -> AbsaResult<Vec<ExtractionResult>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let record = self.encoder()?.encode(&Example::for_extraction(words.to_vec()))?;
        // words cut by truncation are never tagged
        let tagged = record.word_count().saturating_sub(1).min(words.len());

        let output = self.model.forward(&self.batch(vec![record]));
        let [_, l, _] = output.tag_logits.dims();
        let predicted: Vec<i64> =
            output.tag_logits.argmax(2).reshape([l]).into_data().iter::<i64>().collect();

        let tags: Vec<BioTag> = (0..words.len())
            .map(|i| if i < tagged { label_tag(predicted[i + 1]) } else { BioTag::O })
            .collect();
        tracing::debug!("Extraction tags: {:?}", tags);
        Ok(split_by_span(words, &tags))
    }

    /// Polarity of each span, batched.
    pub fn classify(&self, words: &[String], spans: &[Range<usize>]) -> AbsaResult<Vec<PolarityResult>> {
        if spans.is_empty() {
            return Ok(Vec::new());
        }
        let encoder = self.encoder()?;
        let examples: Vec<Example> = spans.iter().map(|s| Example::from_span(words, s.clone())).collect();
        let mut records = encoder.encode_all(&examples)?;
        if self.needs_neighbours {
            attach_neighbours(&mut records);
        }

        let output = self.model.forward(&self.batch(records));
        let classes: Vec<i64> = output.polarity_logits.argmax(1).into_data().iter::<i64>().collect();

        Ok(examples
            .iter()
            .zip(spans)
            .zip(classes)
            .map(|((example, span), class)| PolarityResult {
                aspect: example.aspect_text(),
                position: span.clone().collect(),
                sentiment: self.sentiments.name(class),
            })
            .collect())
    }

    pub fn analyse_words(&self, words: &[String]) -> AbsaResult<AspectAnalysis> {
        let extraction = self.extract(words)?;
        let polarity = if self.predict_sentiment {
            let spans: Vec<Range<usize>> = extraction.iter().map(ExtractionResult::span).collect();
            self.classify(words, &spans)?
        } else {
            Vec::new()
        };
        Ok(AspectAnalysis { sentence: words.join(" "), tokens: words.to_vec(), extraction, polarity })
    }
}

impl<B: Backend, M: AtepcModel<B>> AspectPipeline for AspectExtractor<B, M> {
    fn analyse(&self, text: &str) -> AbsaResult<AspectAnalysis> {
        self.analyse_words(&parse_inference_text(text))
    }
}

impl<B: Backend, M: AtepcModel<B>> TrainedModel<B, M> {
    pub fn into_extractor(self) -> AbsaResult<AspectExtractor<B, M>> {
        AspectExtractor::new(self.model, self.config, self.tokenizer, self.device)
    }
}
