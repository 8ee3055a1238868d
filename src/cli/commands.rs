// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `extract`, and
// their flags.
//
// Training flags mirror the TrainConfig keys. They are all
// optional: a value given on the command line overrides the
// JSON config file (--config), which overrides the defaults.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{DeviceKind, TrainConfig};
use crate::data::srd::LcfMode;
use crate::ml::optim::OptimizerKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an ATEPC model on a 3-line dataset file
    Train(TrainArgs),

    /// Extract aspects and their polarity with a saved checkpoint
    Extract(ExtractArgs),
}

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON file with TrainConfig keys; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// bert_base_atepc, lcf_atepc or slide_lcf_atepc
    #[arg(long)]
    pub model_name: Option<String>,

    #[arg(long)]
    pub train_file: Option<PathBuf>,

    /// Evaluated every --log-step batches when given
    #[arg(long)]
    pub test_file: Option<PathBuf>,

    /// Checkpoints and metrics.csv go here; nothing is saved without it
    #[arg(long)]
    pub model_path_to_save: Option<PathBuf>,

    #[arg(long)]
    pub device: Option<DeviceKind>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub num_epoch: Option<usize>,

    /// adam, adamw, sgd, adagrad or rmsprop
    #[arg(long)]
    pub optimizer: Option<OptimizerKind>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// "corpus", a tokenizer.json path or directory, or a hub model id
    #[arg(long)]
    pub pretrained_bert_name: Option<String>,

    #[arg(long)]
    pub use_dual_bert: Option<bool>,

    #[arg(long)]
    pub use_bert_spc: Option<bool>,

    #[arg(long)]
    pub max_seq_len: Option<usize>,

    #[arg(long)]
    pub log_step: Option<usize>,

    /// Semantic-relative distance threshold
    #[arg(long)]
    pub srd: Option<usize>,

    #[arg(long)]
    pub use_syntax_based_srd: Option<bool>,

    /// CoNLL-U file with the dependency heads of every sentence
    #[arg(long)]
    pub dependency_file: Option<PathBuf>,

    /// cdm, cdw or fusion
    #[arg(long)]
    pub lcf: Option<LcfMode>,

    #[arg(long)]
    pub cdw_scale: Option<f32>,

    #[arg(long)]
    pub dropout: Option<f64>,

    #[arg(long)]
    pub l2reg: Option<f64>,

    #[arg(long)]
    pub evaluate_begin: Option<usize>,

    #[arg(long)]
    pub gradient_accumulation_steps: Option<usize>,

    /// Pin the number of polarity classes instead of inferring it
    #[arg(long)]
    pub polarities_dim: Option<usize>,

    #[arg(long)]
    pub hidden_dim: Option<usize>,

    #[arg(long)]
    pub num_heads: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    #[arg(long)]
    pub d_ff: Option<usize>,

    #[arg(long)]
    pub vocab_size: Option<usize>,

    #[arg(long)]
    pub retry_delay_secs: Option<u64>,

    #[arg(long)]
    pub retry_max_attempts: Option<usize>,
}

macro_rules! override_fields {
    ($args:expr, $config:expr, [$($field:ident),* $(,)?], [$($optional:ident),* $(,)?]) => {
        $(if let Some(v) = $args.$field.clone() { $config.$field = v; })*
        $(if let Some(v) = $args.$optional.clone() { $config.$optional = Some(v); })*
    };
}

impl TrainArgs {
    fn apply_to(&self, config: &mut TrainConfig) {
        override_fields!(
            self,
            config,
            [
                model_name, train_file, device, batch_size, seed, num_epoch, optimizer,
                learning_rate, pretrained_bert_name, use_dual_bert, use_bert_spc, max_seq_len,
                log_step, srd, use_syntax_based_srd, lcf, dropout, l2reg, evaluate_begin,
                gradient_accumulation_steps, hidden_dim, num_heads, num_layers, d_ff, vocab_size,
                retry_delay_secs,
            ],
            [
                test_file, model_path_to_save, dependency_file, cdw_scale, polarities_dim,
                retry_max_attempts,
            ]
        );
    }

    /// Config file (or defaults), then command-line overrides.
    pub fn resolve(self) -> Result<TrainConfig> {
        match &self.config {
            Some(path) => {
                let mut config = TrainConfig::from_json_file(path)?;
                self.apply_to(&mut config);
                Ok(config)
            }
            None => Ok(self.into()),
        }
    }
}

/// Flags over the defaults, no config file.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let mut config = TrainConfig::default();
        a.apply_to(&mut config);
        config
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Checkpoint directory written by `train`
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Text to analyse; [ASP]..[ASP] markers and a trailing !sent! part are ignored
    #[arg(long = "text")]
    pub texts: Vec<String>,

    /// File with one text per line
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    /// Report failing inputs and keep going
    #[arg(long)]
    pub ignore_error: bool,

    /// Only extract aspects, skip polarity classification
    #[arg(long)]
    pub no_sentiment: bool,

    /// Sentiment names by class index, e.g. Negative,Neutral,Positive
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    #[arg(long, default_value = "cpu")]
    pub device: DeviceKind,

    /// Write the results as JSON here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "lcf-atepc", "train", "--train-file", "data/laptop.txt", "--lcf", "fusion", "--srd", "5",
            "--optimizer", "adamw", "--test-file", "data/test.txt",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let config = args.resolve().unwrap();
        assert_eq!(config.train_file, PathBuf::from("data/laptop.txt"));
        assert_eq!(config.lcf, LcfMode::Fusion);
        assert_eq!(config.srd, 5);
        assert_eq!(config.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.test_file, Some(PathBuf::from("data/test.txt")));
        assert_eq!(config.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "batch_size": 4, "num_epoch": 9 }"#).unwrap();
        let args = TrainArgs { config: Some(path), num_epoch: Some(2), ..TrainArgs::default() };
        let config = args.resolve().unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.num_epoch, 2);
    }

    #[test]
    fn test_extract_labels_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "lcf-atepc", "extract", "--checkpoint", "out/run", "--text", "great battery",
            "--labels", "bad,ok,good",
        ])
        .unwrap();
        let Commands::Extract(args) = cli.command else { panic!("expected extract") };
        assert_eq!(args.labels, Some(vec!["bad".to_string(), "ok".to_string(), "good".to_string()]));
        assert_eq!(args.device, DeviceKind::Cpu);
    }
}
