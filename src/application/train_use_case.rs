// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run:
//
//   Step 1: Resolve the model variant   (Layer 5 - registry)
//   Step 2: Build the Instructor         (Layer 5 - ml)
//           wrapped in the RetryPolicy   (Layer 6 - infra)
//           so hub downloads may fail transiently
//   Step 3: Train / evaluate / save      (Layer 5 - ml)
//   Step 4: Report the checkpoint, or hand back an in-memory
//           pipeline when nothing is saved
//
// TrainConfig is the single configuration object of the crate.
// It is saved next to every checkpoint so inference can rebuild
// the exact architecture, with polarities_dim pinned.

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::data::{feature::FeatureConfig, feature::NUM_LABELS, srd::LcfMode};
use crate::domain::error::{AbsaError, AbsaResult};
use crate::infra::{checkpoint::BestMetrics, retry::RetryPolicy};
use crate::ml::{
    base::BaseAtepc,
    encoder::ContextEncoderConfig,
    inferencer::AspectPipeline,
    lcf::LcfAtepc,
    model::{AtepcModel, AtepcModelConfig, EncoderSharing},
    optim::OptimizerKind,
    registry::ModelKind,
    slide::SlideLcfAtepc,
    trainer::{Instructor, TrainOutcome},
};

// ─── Device ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
        })
    }
}

impl FromStr for DeviceKind {
    type Err = AbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "gpu" | "cuda" | "wgpu" => Ok(DeviceKind::Gpu),
            other => Err(AbsaError::config(format!("unknown device '{other}', expected cpu or gpu"))),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Every field has a
// default, so a JSON config file only needs the ones it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model_name: String,
    pub batch_size: usize,
    pub seed: u64,
    pub num_epoch: usize,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    /// `corpus`, a tokenizer file or directory, or a hub model id.
    pub pretrained_bert_name: String,
    pub use_dual_bert: bool,
    pub use_bert_spc: bool,
    pub max_seq_len: usize,
    pub log_step: usize,
    #[serde(rename = "SRD")]
    pub srd: usize,
    #[serde(rename = "use_syntax_based_SRD")]
    pub use_syntax_based_srd: bool,
    pub lcf: LcfMode,
    pub dropout: f64,
    pub l2reg: f64,
    /// First (zero-based) epoch that runs evaluations.
    pub evaluate_begin: usize,
    pub gradient_accumulation_steps: usize,

    pub train_file: PathBuf,
    pub test_file: Option<PathBuf>,
    pub model_path_to_save: Option<PathBuf>,
    pub device: DeviceKind,
    /// Pins the polarity class count instead of inferring it.
    pub polarities_dim: Option<usize>,
    pub cdw_scale: Option<f32>,
    /// CoNLL-U heads for syntax-based SRD.
    pub dependency_file: Option<PathBuf>,

    pub hidden_dim: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub d_ff: usize,
    pub vocab_size: usize,

    pub retry_delay_secs: u64,
    pub retry_max_attempts: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_name: "lcf_atepc".to_string(),
            batch_size: 16,
            seed: 1,
            num_epoch: 5,
            optimizer: OptimizerKind::Adam,
            learning_rate: 3e-5,
            pretrained_bert_name: "corpus".to_string(),
            use_dual_bert: false,
            use_bert_spc: false,
            max_seq_len: 80,
            log_step: 5,
            srd: 3,
            use_syntax_based_srd: false,
            lcf: LcfMode::Cdw,
            dropout: 0.0,
            l2reg: 1e-5,
            evaluate_begin: 4,
            gradient_accumulation_steps: 1,
            train_file: PathBuf::from("data/train.txt"),
            test_file: None,
            model_path_to_save: None,
            device: DeviceKind::Cpu,
            polarities_dim: None,
            cdw_scale: None,
            dependency_file: None,
            hidden_dim: 256,
            num_heads: 4,
            num_layers: 2,
            d_ff: 1024,
            vocab_size: 30522,
            retry_delay_secs: 60,
            retry_max_attempts: None,
        }
    }
}

impl TrainConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed config file '{}'", path.display()))
    }

    /// Checks that need no file access.
    pub fn validate(&self) -> AbsaResult<()> {
        let fail = |msg: String| Err(AbsaError::config(msg));
        if self.gradient_accumulation_steps < 1 {
            return fail(format!(
                "gradient_accumulation_steps must be >= 1, got {}",
                self.gradient_accumulation_steps
            ));
        }
        if self.log_step < 1 {
            return fail(format!("log_step must be >= 1, got {}", self.log_step));
        }
        if self.max_seq_len < 4 {
            return fail(format!("max_seq_len must be >= 4, got {}", self.max_seq_len));
        }
        if self.batch_size < 1 {
            return fail("batch_size must be >= 1".to_string());
        }
        if self.num_heads == 0 || self.hidden_dim % self.num_heads != 0 {
            return fail(format!(
                "hidden_dim ({}) must be a multiple of num_heads ({})",
                self.hidden_dim, self.num_heads
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.use_syntax_based_srd && self.dependency_file.is_none() {
            return fail("use_syntax_based_SRD requires dependency_file".to_string());
        }
        if self.polarities_dim == Some(0) {
            return fail("polarities_dim must be positive".to_string());
        }
        self.model_kind().map(|_| ())
    }

    pub fn model_kind(&self) -> AbsaResult<ModelKind> {
        ModelKind::resolve(&self.model_name, self.lcf)
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            max_seq_len: self.max_seq_len,
            srd: self.srd,
            lcf: self.lcf,
            use_syntax_based_srd: self.use_syntax_based_srd,
            use_bert_spc: self.use_bert_spc,
            cdw_scale: self.cdw_scale,
        }
    }

    pub fn model_config(&self, polarities_dim: usize) -> AtepcModelConfig {
        AtepcModelConfig {
            encoder: ContextEncoderConfig::new(
                self.vocab_size,
                self.max_seq_len,
                self.hidden_dim,
                self.num_heads,
                self.num_layers,
                self.d_ff,
                self.dropout,
            ),
            num_labels: NUM_LABELS,
            polarities_dim,
            dropout: self.dropout,
            use_bert_spc: self.use_bert_spc,
            sharing: EncoderSharing::from_dual_flag(self.use_dual_bert),
            lcf: self.lcf,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub enum TrainReport {
    Saved { path: PathBuf, best: BestMetrics },
    /// Nothing was written; the trained model is ready for inference.
    InMemory { pipeline: Box<dyn AspectPipeline>, best: BestMetrics },
}

impl TrainReport {
    pub fn best(&self) -> BestMetrics {
        match self {
            TrainReport::Saved { best, .. } | TrainReport::InMemory { best, .. } => *best,
        }
    }
}

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on backend `B`; the variant is picked from the config.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainReport> {
        let kind = self.config.model_kind()?;
        tracing::info!(
            "Training {} ({}) on '{}', device {}",
            self.config.model_name,
            kind,
            self.config.train_file.display(),
            self.config.device
        );
        match kind {
            ModelKind::Base => self.run::<B, BaseAtepc<B>>(device),
            ModelKind::LcfCdm | ModelKind::LcfCdw | ModelKind::LcfFusion => {
                self.run::<B, LcfAtepc<B>>(device)
            }
            ModelKind::SlideWindow => self.run::<B, SlideLcfAtepc<B>>(device),
        }
    }

    fn run<B, M>(&self, device: B::Device) -> Result<TrainReport>
    where
        B: AutodiffBackend,
        M: AtepcModel<B> + burn::module::AutodiffModule<B>,
        M::InnerModule: AtepcModel<B::InnerBackend> + 'static,
    {
        let instructor = self
            .config
            .retry_policy()
            .run(|| Instructor::<B, M>::new(self.config.clone(), device.clone()))
            .context("Failed to prepare training")?;

        let outcome = instructor.train().context("Training failed")?;
        Ok(match outcome {
            TrainOutcome::Saved { path, best } => TrainReport::Saved { path, best },
            TrainOutcome::InMemory(trained) => {
                let best = trained.best;
                TrainReport::InMemory { pipeline: Box::new(trained.into_extractor()?), best }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    type TrainBackend = Autodiff<NdArray>;

    #[test]
    fn test_zero_accumulation_steps_is_config_error() {
        let config = TrainConfig { gradient_accumulation_steps: 0, ..TrainConfig::default() };
        let err = TrainUseCase::new(config).execute::<TrainBackend>(Default::default()).err().unwrap();
        assert!(matches!(err.downcast_ref::<AbsaError>(), Some(AbsaError::Config(_))));
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let config = TrainConfig { model_name: "lcfs".into(), ..TrainConfig::default() };
        assert!(matches!(config.validate(), Err(AbsaError::Config(_))));
    }

    #[test]
    fn test_json_uses_original_key_names() {
        let json = r#"{ "model_name": "slide_lcf_atepc", "SRD": 5, "use_syntax_based_SRD": false,
                        "lcf": "fusion", "optimizer": "adamw", "device": "gpu" }"#;
        let config: TrainConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.srd, 5);
        assert_eq!(config.lcf, LcfMode::Fusion);
        assert_eq!(config.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.device, DeviceKind::Gpu);
        // untouched keys keep their defaults
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.model_kind().unwrap(), ModelKind::SlideWindow);
    }

    #[test]
    fn test_syntax_srd_needs_heads_file() {
        let config = TrainConfig { use_syntax_based_srd: true, ..TrainConfig::default() };
        assert!(matches!(config.validate(), Err(AbsaError::Config(_))));
    }

    #[test]
    fn test_overfit_battery_is_positive() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train.txt");
        fs::write(
            &train,
            "great $T$ life\nbattery\n2\n\
             awful [ASP]screen[ASP] quality\nscreen\n0\n\
             average $T$ speed\nkeyboard\n1\n",
        )
        .unwrap();
        let config = TrainConfig {
            train_file: train,
            polarities_dim: Some(3),
            batch_size: 3,
            num_epoch: 80,
            learning_rate: 1e-2,
            max_seq_len: 12,
            hidden_dim: 16,
            num_heads: 2,
            num_layers: 1,
            d_ff: 32,
            vocab_size: 32,
            ..TrainConfig::default()
        };

        let report = TrainUseCase::new(config).execute::<TrainBackend>(Default::default()).unwrap();
        let TrainReport::InMemory { pipeline, .. } = report else {
            panic!("no save directory was configured");
        };
        let analysis = pipeline.analyse("great battery life").unwrap();
        assert_eq!(analysis.polarity.len(), 1);
        assert_eq!(analysis.polarity[0].aspect, "battery");
        assert_eq!(analysis.polarity[0].sentiment, "Positive");
    }
}
