// ============================================================
// Layer 2 — Extract Use Case
// ============================================================
// Loads a checkpoint directory into an AspectPipeline and runs
// it over many texts (or inference files, one text per line).
//
// Error policy per item:
//   ignore_error = true   the failure is reported as an
//                         ItemOutcome::Failed and the batch goes on
//   ignore_error = false  the first failure aborts the batch

use anyhow::{Context, Result};
use burn::prelude::Backend;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::data::{loader::read_inference_file, syntax::ConlluParser};
use crate::domain::error::AbsaResult;
use crate::infra::checkpoint::ModelArtifacts;
use crate::ml::{
    base::BaseAtepc,
    inferencer::{AspectAnalysis, AspectExtractor, AspectPipeline, SentimentMap},
    lcf::LcfAtepc,
    model::AtepcModel,
    registry::ModelKind,
    slide::SlideLcfAtepc,
};
use crate::application::train_use_case::TrainConfig;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub predict_sentiment: bool,
    /// Sentiment names by class index; the config's default otherwise.
    pub labels: Option<Vec<String>>,
}

/// Rebuild the model stored in `dir` on backend `B`.
pub fn load_pipeline<B: Backend>(
    dir: &Path,
    device: B::Device,
    options: &PipelineOptions,
) -> Result<Box<dyn AspectPipeline>> {
    let artifacts = ModelArtifacts::discover::<B>(dir)?;
    let config = artifacts.load_config()?;
    let tokenizer = artifacts.load_tokenizer()?;
    let kind = config.model_kind()?;
    tracing::info!("Loading {} ({}) from '{}'", config.model_name, kind, dir.display());

    let pipeline = match kind {
        ModelKind::Base => build::<B, BaseAtepc<B>>(&artifacts, config, tokenizer, device, options)?,
        ModelKind::LcfCdm | ModelKind::LcfCdw | ModelKind::LcfFusion => {
            build::<B, LcfAtepc<B>>(&artifacts, config, tokenizer, device, options)?
        }
        ModelKind::SlideWindow => build::<B, SlideLcfAtepc<B>>(&artifacts, config, tokenizer, device, options)?,
    };
    Ok(pipeline)
}

fn build<B: Backend, M: AtepcModel<B> + 'static>(
    artifacts: &ModelArtifacts,
    config: TrainConfig,
    tokenizer: tokenizers::Tokenizer,
    device: B::Device,
    options: &PipelineOptions,
) -> AbsaResult<Box<dyn AspectPipeline>> {
    let model = artifacts.restore::<B, M>(&config, &device)?;
    let parser = match (&config.dependency_file, config.use_syntax_based_srd) {
        (Some(path), true) => Some(ConlluParser::from_file(path)?),
        _ => None,
    };

    let mut extractor = AspectExtractor::new(model, config, tokenizer, device)?
        .with_sentiment_prediction(options.predict_sentiment);
    if let Some(labels) = &options.labels {
        let names: BTreeMap<i64, String> =
            labels.iter().enumerate().map(|(i, name)| (i as i64, name.clone())).collect();
        extractor = extractor.with_sentiment_map(SentimentMap::from_map(names));
    }
    if let Some(parser) = parser {
        extractor = extractor.with_parser(Box::new(parser));
    }
    Ok(Box::new(extractor))
}

// ─── ExtractUseCase ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Done(AspectAnalysis),
    Failed { input: String, error: String },
}

pub struct ExtractUseCase {
    pipeline: Box<dyn AspectPipeline>,
    ignore_error: bool,
}

impl ExtractUseCase {
    pub fn new(pipeline: Box<dyn AspectPipeline>, ignore_error: bool) -> Self {
        Self { pipeline, ignore_error }
    }

    pub fn run_texts(&self, texts: &[String]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(texts.len());
        for text in texts {
            match self.pipeline.analyse(text) {
                Ok(analysis) => outcomes.push(ItemOutcome::Done(analysis)),
                Err(e) if self.ignore_error => {
                    tracing::warn!("Skipping '{}': {}", text, e);
                    outcomes.push(ItemOutcome::Failed { input: text.clone(), error: e.to_string() });
                }
                Err(e) => return Err(e).with_context(|| format!("Inference failed on '{text}'")),
            }
        }
        Ok(outcomes)
    }

    /// Every non-empty line of every file, in order.
    pub fn run_files(&self, files: &[PathBuf]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::new();
        for file in files {
            match read_inference_file(file) {
                Ok(texts) => outcomes.extend(self.run_texts(&texts)?),
                Err(e) if self.ignore_error => {
                    tracing::warn!("Skipping '{}': {}", file.display(), e);
                    outcomes.push(ItemOutcome::Failed {
                        input: file.display().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e).with_context(|| format!("Cannot read '{}'", file.display())),
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainReport, TrainUseCase};
    use crate::data::loader::parse_inference_text;
    use crate::domain::error::AbsaError;
    use crate::domain::example::BioTag;
    use crate::ml::inferencer::{split_by_span, PolarityResult};
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    /// Tags every word that follows "the" as an aspect, fails on "boom".
    struct ArticlePipeline;

    impl AspectPipeline for ArticlePipeline {
        fn analyse(&self, text: &str) -> AbsaResult<AspectAnalysis> {
            if text.contains("boom") {
                return Err(AbsaError::data("cannot analyse boom"));
            }
            let words = parse_inference_text(text);
            let tags: Vec<BioTag> = (0..words.len())
                .map(|i| if i > 0 && words[i - 1] == "the" { BioTag::BAsp } else { BioTag::O })
                .collect();
            let extraction = split_by_span(&words, &tags);
            let polarity = extraction
                .iter()
                .map(|r| PolarityResult {
                    aspect: words[r.span()].join(" "),
                    position: r.span().collect(),
                    sentiment: "Neutral".into(),
                })
                .collect();
            Ok(AspectAnalysis { sentence: words.join(" "), tokens: words, extraction, polarity })
        }
    }

    fn texts(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_two_aspects_two_results() {
        let use_case = ExtractUseCase::new(Box::new(ArticlePipeline), false);
        let out = use_case.run_texts(&texts(&["the battery and the screen"])).unwrap();
        let ItemOutcome::Done(analysis) = &out[0] else { panic!("expected a result") };
        assert_eq!(analysis.extraction.len(), 2);
        assert_eq!(analysis.extraction[0].tags[4], BioTag::O);
        assert_eq!(analysis.extraction[1].tags[1], BioTag::O);
        assert_eq!(analysis.polarity[1].aspect, "screen");
    }

    #[test]
    fn test_ignore_error_reports_failures() {
        let use_case = ExtractUseCase::new(Box::new(ArticlePipeline), true);
        let out = use_case.run_texts(&texts(&["the battery", "boom", "the screen"])).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[1], ItemOutcome::Failed { input, .. } if input == "boom"));
    }

    #[test]
    fn test_first_error_aborts_without_ignore() {
        let use_case = ExtractUseCase::new(Box::new(ArticlePipeline), false);
        assert!(use_case.run_texts(&texts(&["the battery", "boom"])).is_err());
    }

    #[test]
    fn test_files_are_read_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.txt");
        fs::write(&file, "the battery\n\nthe [ASP]screen[ASP] !sent! Negative\n").unwrap();
        let use_case = ExtractUseCase::new(Box::new(ArticlePipeline), true);
        let out = use_case.run_files(&[file, dir.path().join("missing.txt")]).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[2], ItemOutcome::Failed { .. }));
    }

    #[test]
    fn test_saved_checkpoint_loads_as_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train.txt");
        fs::write(&train, "great $T$ life\nbattery\n1\nthe $T$ is dim\nscreen\n0\n").unwrap();
        let config = TrainConfig {
            model_name: "bert_base_atepc".into(),
            train_file: train,
            model_path_to_save: Some(dir.path().join("out")),
            num_epoch: 1,
            max_seq_len: 12,
            hidden_dim: 8,
            num_heads: 2,
            num_layers: 1,
            d_ff: 16,
            vocab_size: 24,
            ..TrainConfig::default()
        };
        let report = TrainUseCase::new(config).execute::<Autodiff<NdArray>>(Default::default()).unwrap();
        let TrainReport::Saved { path, .. } = report else { panic!("a save directory was configured") };
        assert!(path.ends_with("bert_base_atepc_cdw"));

        let options = PipelineOptions {
            predict_sentiment: true,
            labels: Some(vec!["bad".into(), "good".into()]),
        };
        let pipeline = load_pipeline::<NdArray>(&path, Default::default(), &options).unwrap();
        let out = ExtractUseCase::new(pipeline, false).run_texts(&texts(&["great battery life"])).unwrap();
        let ItemOutcome::Done(analysis) = &out[0] else { panic!("expected a result") };
        for p in &analysis.polarity {
            assert!(p.sentiment == "bad" || p.sentiment == "good");
        }
    }
}
