// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores trained models using Burn's CompactRecorder.
//
// One checkpoint is one directory holding three files, each
// named after the model and found again by suffix:
//
//   <save_dir>/lcf_atepc_cdw_apcacc_80.12_apcf1_77.30_atef1_81.02/
//     lcf_atepc.<ext>         ← model weights (CompactRecorder)
//     lcf_atepc.config        ← TrainConfig JSON, polarities_dim pinned
//     lcf_atepc.tokenizer     ← HF tokenizer JSON
//
// The config is needed to rebuild the exact architecture before
// the weights can be loaded into it; the tokenizer keeps the
// token ids the weights were trained on.
//
// BestMetrics holds the running maxima that decide when a new
// checkpoint is written: a save happens when any of the three
// current values strictly beats its maximum.

use burn::{
    prelude::*,
    record::{CompactRecorder, FileRecorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::domain::error::{AbsaError, AbsaResult};
use crate::infra::tokenizer_store;
use crate::ml::model::AtepcModel;
use crate::ml::scoring::EvalMetrics;

pub const CONFIG_SUFFIX: &str = ".config";
pub const TOKENIZER_SUFFIX: &str = ".tokenizer";

/// Where the recorder writes (or reads) the record for `base`.
pub fn record_file<B: Backend>(base: &Path) -> PathBuf {
    base.with_extension(<CompactRecorder as FileRecorder<B>>::file_extension())
}

// ─── Best-metric policy ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BestMetrics {
    pub max_apc_acc: f64,
    pub max_apc_f1: f64,
    pub max_ate_f1: f64,
}

impl BestMetrics {
    pub fn improves(&self, m: &EvalMetrics) -> bool {
        m.apc_acc > self.max_apc_acc || m.apc_f1 > self.max_apc_f1 || m.ate_f1 > self.max_ate_f1
    }

    /// Fold one evaluation into the maxima; true when a save is due.
    pub fn observe(&mut self, m: &EvalMetrics) -> bool {
        let improved = self.improves(m);
        self.max_apc_acc = self.max_apc_acc.max(m.apc_acc);
        self.max_apc_f1 = self.max_apc_f1.max(m.apc_f1);
        self.max_ate_f1 = self.max_ate_f1.max(m.ate_f1);
        improved
    }
}

pub fn checkpoint_name(model_name: &str, lcf: &str, m: &EvalMetrics) -> String {
    format!(
        "{model_name}_{lcf}_apcacc_{:.2}_apcf1_{:.2}_atef1_{:.2}",
        m.apc_acc, m.apc_f1, m.ate_f1
    )
}

pub fn final_name(model_name: &str, lcf: &str) -> String {
    format!("{model_name}_{lcf}")
}

// ─── CheckpointManager ────────────────────────────────────────────────────────
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> AbsaResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write weights, config and tokenizer into `<dir>/<name>/`.
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        name: &str,
        model: &M,
        config: &TrainConfig,
        tokenizer: &Tokenizer,
    ) -> AbsaResult<PathBuf> {
        let target = self.dir.join(name);
        fs::create_dir_all(&target)?;
        let base = target.join(&config.model_name);

        model
            .clone()
            .save_file(base.clone(), &CompactRecorder::new())
            .map_err(|e| AbsaError::checkpoint(format!("cannot save weights to '{}': {e}", base.display())))?;

        let json = serde_json::to_string_pretty(config)
            .map_err(|e| AbsaError::checkpoint(format!("cannot serialise config: {e}")))?;
        fs::write(target.join(format!("{}{CONFIG_SUFFIX}", config.model_name)), json)?;

        tokenizer_store::save(tokenizer, &target.join(format!("{}{TOKENIZER_SUFFIX}", config.model_name)))?;

        tracing::info!("Saved checkpoint to '{}'", target.display());
        Ok(target)
    }
}

// ─── ModelArtifacts ───────────────────────────────────────────────────────────
/// The three files of one checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    /// Record path without the recorder's extension.
    pub weights: PathBuf,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelArtifacts {
    pub fn discover<B: Backend>(dir: &Path) -> AbsaResult<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            AbsaError::checkpoint(format!("cannot open checkpoint directory '{}': {e}", dir.display()))
        })?;
        let record_suffix = format!(".{}", <CompactRecorder as FileRecorder<B>>::file_extension());

        let (mut weights, mut config, mut tokenizer) = (None, None, None);
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(record_suffix.as_str()) {
                weights = Some(dir.join(stem));
            } else if name.ends_with(CONFIG_SUFFIX) {
                config = Some(path.clone());
            } else if name.ends_with(TOKENIZER_SUFFIX) {
                tokenizer = Some(path.clone());
            }
        }

        let missing = |what: &str| {
            AbsaError::checkpoint(format!("no {what} file found in '{}'", dir.display()))
        };
        Ok(Self {
            weights: weights.ok_or_else(|| missing(&format!("*{record_suffix}")))?,
            config: config.ok_or_else(|| missing(&format!("*{CONFIG_SUFFIX}")))?,
            tokenizer: tokenizer.ok_or_else(|| missing(&format!("*{TOKENIZER_SUFFIX}")))?,
        })
    }

    pub fn load_config(&self) -> AbsaResult<TrainConfig> {
        let json = fs::read_to_string(&self.config)?;
        serde_json::from_str(&json).map_err(|e| {
            AbsaError::checkpoint(format!("malformed config '{}': {e}", self.config.display()))
        })
    }

    pub fn load_tokenizer(&self) -> AbsaResult<Tokenizer> {
        tokenizer_store::load_file(&self.tokenizer)
    }

    /// Rebuild the architecture described by `config` and load the weights into it.
    pub fn restore<B: Backend, M: AtepcModel<B>>(
        &self,
        config: &TrainConfig,
        device: &B::Device,
    ) -> AbsaResult<M> {
        let polarities_dim = config.polarities_dim.ok_or_else(|| {
            AbsaError::checkpoint(format!("'{}' does not pin polarities_dim", self.config.display()))
        })?;
        let model = M::init(&config.model_config(polarities_dim), device);
        let model = model
            .load_file(self.weights.clone(), &CompactRecorder::new(), device)
            .map_err(|e| {
                AbsaError::checkpoint(format!("cannot load weights '{}': {e}", self.weights.display()))
            })?;
        tracing::info!("Restored {} from '{}'", config.model_name, self.weights.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::build_vocabulary_tokenizer;
    use crate::ml::base::BaseAtepc;
    use crate::ml::testing::TestBackend;
    use proptest::prelude::*;

    fn metrics(apc_acc: f64, apc_f1: f64, ate_f1: f64) -> EvalMetrics {
        EvalMetrics { apc_acc, apc_f1, ate_f1 }
    }

    #[test]
    fn test_save_on_any_strict_improvement() {
        let mut best = BestMetrics::default();
        assert!(best.observe(&metrics(50.0, 40.0, 30.0)));
        assert!(!best.observe(&metrics(50.0, 40.0, 30.0)));
        assert!(best.observe(&metrics(10.0, 10.0, 31.0)));
        assert_eq!(best, BestMetrics { max_apc_acc: 50.0, max_apc_f1: 40.0, max_ate_f1: 31.0 });
    }

    #[test]
    fn test_checkpoint_names() {
        assert_eq!(
            checkpoint_name("lcf_atepc", "cdw", &metrics(80.0, 77.333, 81.0)),
            "lcf_atepc_cdw_apcacc_80.00_apcf1_77.33_atef1_81.00"
        );
        assert_eq!(final_name("lcf_atepc", "fusion"), "lcf_atepc_fusion");
    }

    #[test]
    fn test_save_discover_restore() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let tokenizer = build_vocabulary_tokenizer(&["great battery life".to_string()], 20).unwrap();
        let config = TrainConfig {
            model_name: "bert_base_atepc".into(),
            polarities_dim: Some(3),
            vocab_size: 20,
            max_seq_len: 8,
            hidden_dim: 8,
            num_heads: 2,
            num_layers: 1,
            d_ff: 16,
            ..TrainConfig::default()
        };
        let model = BaseAtepc::<TestBackend>::init(&config.model_config(3), &device);

        let manager = CheckpointManager::new(dir.path()).unwrap();
        let saved = manager.save::<TestBackend, _>("run", &model, &config, &tokenizer).unwrap();

        let artifacts = ModelArtifacts::discover::<TestBackend>(&saved).unwrap();
        assert_eq!(artifacts.weights, saved.join("bert_base_atepc"));
        let back = artifacts.load_config().unwrap();
        assert_eq!(back.polarities_dim, Some(3));
        assert!(artifacts.restore::<TestBackend, BaseAtepc<TestBackend>>(&back, &device).is_ok());
        assert_eq!(artifacts.load_tokenizer().unwrap().token_to_id("battery"), tokenizer.token_to_id("battery"));
    }

    #[test]
    fn test_discover_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.config"), "{}").unwrap();
        let err = ModelArtifacts::discover::<TestBackend>(dir.path()).unwrap_err();
        assert!(matches!(err, AbsaError::Checkpoint(_)));
    }

    proptest! {
        #[test]
        fn prop_maxima_never_decrease(
            evals in proptest::collection::vec((0.0f64..100.0, 0.0f64..100.0, 0.0f64..100.0), 1..20)
        ) {
            let mut best = BestMetrics::default();
            for (a, f, t) in evals {
                let before = best;
                let m = metrics(a, f, t);
                let saved = best.observe(&m);
                prop_assert!(best.max_apc_acc >= before.max_apc_acc);
                prop_assert!(best.max_apc_f1 >= before.max_apc_f1);
                prop_assert!(best.max_ate_f1 >= before.max_ate_f1);
                prop_assert_eq!(saved, best != before);
            }
        }
    }
}
