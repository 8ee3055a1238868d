// ============================================================
// Layer 5 — Instructor (training / evaluation loop)
// ============================================================
// Owns one training run from raw files to a saved checkpoint.
//
//   Init        validate config → seed → load examples → infer
//               label space → tokenizer → features → model
//   Training    per batch: forward → joint loss → backward,
//               one optimizer step every gradient_accumulation_steps
//   Evaluating  every log_step batches (once epoch >= evaluate_begin
//               and a test file exists) on the inner model
//   Done        last checkpoint path, a final save, or the model
//               kept in memory when no save directory is set
//
// Key Burn insight:
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the same model on B::InnerBackend,
//     with dropout off; the test loader batches on that backend
//   - B::InnerBackend shares B's device, so one device value
//     serves both loaders

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{
        AdaGradConfig, AdamConfig, AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer,
        RmsPropConfig, SgdConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{AtepcBatch, AtepcBatcher},
    dataset::AtepcDataset,
    feature::{attach_neighbours, FeatureEncoder, FeatureRecord},
    loader::DatasetFile,
    syntax::ConlluParser,
};
use crate::domain::{
    error::{AbsaError, AbsaResult},
    example::Example,
    label_space::LabelSpace,
    traits::{DependencyParser, ExampleSource},
};
use crate::infra::{
    checkpoint::{checkpoint_name, final_name, BestMetrics, CheckpointManager},
    metrics::{EvalRecord, MetricsLogger},
    tokenizer_store::TokenizerSource,
};
use crate::ml::{
    model::AtepcModel,
    optim::{apply_weight_decay, OptimizerKind},
    scoring::{EvalAccumulator, EvalMetrics},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Training,
    Evaluating,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Training => "training",
            Phase::Evaluating => "evaluating",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    tracing::info!("Instructor: {} → {}", phase, next);
    *phase = next;
}

// ─── Outcome ──────────────────────────────────────────────────────────────────
/// A trained model kept in memory, on the inference backend.
pub struct TrainedModel<B: Backend, M> {
    pub model: M,
    /// Resolved config: `polarities_dim` and `vocab_size` are pinned.
    pub config: TrainConfig,
    pub tokenizer: Tokenizer,
    pub best: BestMetrics,
    pub device: B::Device,
}

pub enum TrainOutcome<B: Backend, M> {
    Saved { path: PathBuf, best: BestMetrics },
    InMemory(TrainedModel<B, M>),
}

impl<B: Backend, M> TrainOutcome<B, M> {
    pub fn best(&self) -> BestMetrics {
        match self {
            TrainOutcome::Saved { best, .. } => *best,
            TrainOutcome::InMemory(trained) => trained.best,
        }
    }

    pub fn saved_path(&self) -> Option<&PathBuf> {
        match self {
            TrainOutcome::Saved { path, .. } => Some(path),
            TrainOutcome::InMemory(_) => None,
        }
    }
}

// ─── Instructor ───────────────────────────────────────────────────────────────
pub struct Instructor<B: AutodiffBackend, M> {
    config: TrainConfig,
    model: M,
    tokenizer: Tokenizer,
    train_set: AtepcDataset,
    test_set: Option<AtepcDataset>,
    label_space: LabelSpace,
    device: B::Device,
    phase: Phase,
    _backend: PhantomData<B>,
}

impl<B, M> Instructor<B, M>
where
    B: AutodiffBackend,
    M: AtepcModel<B> + AutodiffModule<B>,
    M::InnerModule: AtepcModel<B::InnerBackend>,
{
    /// Everything up to the first batch. Configuration errors surface
    /// before any file is opened.
    pub fn new(config: TrainConfig, device: B::Device) -> AbsaResult<Self> {
        let phase = Phase::Init;
        tracing::info!("Instructor: {}", phase);

        // ── Step 1: Validate ─────────────────────────────────────────────────
        config.validate()?;
        let kind = config.model_kind()?;
        if !M::implements(kind) {
            return Err(AbsaError::config(format!(
                "model '{}' ({kind}) cannot be trained as {}",
                config.model_name,
                std::any::type_name::<M>()
            )));
        }
        B::seed(config.seed);

        // ── Step 2: Examples and label space ──────────────────────────────────
        let train_examples = DatasetFile::new(&config.train_file).load_examples()?;
        let test_examples = match &config.test_file {
            Some(path) => Some(DatasetFile::new(path).load_examples()?),
            None => None,
        };
        let label_space = LabelSpace::infer(
            train_examples.iter().filter_map(|e| e.polarity),
            config.polarities_dim,
        )?;
        if let Some(test) = &test_examples {
            check_test_labels(test, &label_space)?;
        }
        tracing::info!(
            "Loaded {} training / {} test examples, {} polarity classes",
            train_examples.len(),
            test_examples.as_ref().map_or(0, Vec::len),
            label_space.dim()
        );

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let source = TokenizerSource::resolve(&config.pretrained_bert_name);
        let corpus: Vec<String> = train_examples.iter().map(Example::sentence).collect();
        let tokenizer = source.load(&corpus, config.vocab_size)?;

        let mut config = config;
        config.polarities_dim = Some(label_space.dim());
        config.vocab_size = config.vocab_size.max(tokenizer.get_vocab_size(true));

        // ── Step 4: Features ──────────────────────────────────────────────────
        let parser = if config.use_syntax_based_srd {
            let path = config.dependency_file.as_ref().ok_or_else(|| {
                AbsaError::config("use_syntax_based_SRD requires dependency_file")
            })?;
            Some(ConlluParser::from_file(path)?)
        } else {
            None
        };
        let mut encoder = FeatureEncoder::new(&tokenizer, config.feature_config())?;
        if let Some(parser) = &parser {
            encoder = encoder.with_parser(parser as &dyn DependencyParser);
        }
        let build = |examples: &[Example]| -> AbsaResult<AtepcDataset> {
            let mut features: Vec<FeatureRecord> = encoder.encode_all(examples)?;
            if kind.needs_neighbours() {
                attach_neighbours(&mut features);
            }
            Ok(AtepcDataset::new(features))
        };
        let train_set = build(&train_examples[..])?;
        let test_set = test_examples.as_deref().map(build).transpose()?;

        // ── Step 5: Model ─────────────────────────────────────────────────────
        let mut model = M::init(&config.model_config(label_space.dim()), &device);
        if let Some(dir) = source.encoder_dir() {
            model = model.load_pretrained_encoder(dir, &device)?;
        }
        tracing::info!(
            "Model ready: {} ({} layers, hidden={}, vocab={})",
            kind,
            config.num_layers,
            config.hidden_dim,
            config.vocab_size
        );
        Ok(Self {
            config,
            model,
            tokenizer,
            train_set,
            test_set,
            label_space,
            device,
            phase,
            _backend: PhantomData,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn label_space(&self) -> LabelSpace {
        self.label_space
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run every epoch with the configured optimizer.
    pub fn train(self) -> AbsaResult<TrainOutcome<B::InnerBackend, M::InnerModule>> {
        match self.config.optimizer {
            OptimizerKind::Adam => self.run(AdamConfig::new().init::<B, M>()),
            // decay comes from `l2reg` only
            OptimizerKind::AdamW => self.run(AdamWConfig::new().with_weight_decay(0.0).init::<B, M>()),
            OptimizerKind::Sgd => self.run(SgdConfig::new().init::<B, M>()),
            OptimizerKind::AdaGrad => self.run(AdaGradConfig::new().init::<B, M>()),
            OptimizerKind::RmsProp => self.run(RmsPropConfig::new().init::<B, M>()),
        }
    }

    fn run<O: Optimizer<M, B>>(
        self,
        mut optim: O,
    ) -> AbsaResult<TrainOutcome<B::InnerBackend, M::InnerModule>> {
        let Instructor { config, mut model, tokenizer, train_set, test_set, label_space, device, mut phase, .. } =
            self;
        let gas = config.gradient_accumulation_steps;
        let micro_batch = (config.batch_size / gas).max(1);
        let lcf = config.lcf.as_str();

        // ── Data loaders ──────────────────────────────────────────────────────
        let train_loader = DataLoaderBuilder::new(AtepcBatcher::<B>::new(device.clone()))
            .batch_size(micro_batch)
            .shuffle(config.seed)
            .num_workers(1)
            .build(train_set);
        let test_loader = test_set.map(|set| {
            DataLoaderBuilder::new(AtepcBatcher::<B::InnerBackend>::new(device.clone()))
                .batch_size(micro_batch)
                .num_workers(1)
                .build(set)
        });

        let checkpoints = config.model_path_to_save.as_ref().map(CheckpointManager::new).transpose()?;
        let metrics_log = checkpoints.as_ref().map(|c| MetricsLogger::new(c.dir())).transpose()?;

        let mut best = BestMetrics::default();
        let mut last_saved: Option<PathBuf> = None;
        let mut global_step = 0usize;

        transition(&mut phase, Phase::Training);
        for epoch in 0..config.num_epoch {
            let mut accumulator = GradientsAccumulator::new();
            let mut pending = 0usize;
            let mut loss_sum = 0.0f64;
            let mut loss_batches = 0usize;

            for batch in train_loader.iter() {
                let (loss, _) = model.forward_loss(&batch);
                loss_sum += loss.total.clone().into_scalar().elem::<f64>();
                loss_batches += 1;

                let grads = loss.total.div_scalar(gas as f64).backward();
                accumulator.accumulate(&model, GradientsParams::from_grads(grads, &model));
                pending += 1;
                global_step += 1;

                if pending == gas {
                    let mut grads = accumulator.grads();
                    apply_weight_decay::<B, M>(&model, &mut grads, config.l2reg);
                    model = optim.step(config.learning_rate, model, grads);
                    pending = 0;
                }

                let Some(loader) = &test_loader else { continue };
                if global_step % config.log_step != 0 || epoch < config.evaluate_begin {
                    continue;
                }

                transition(&mut phase, Phase::Evaluating);
                let inner = model.valid();
                let metrics = evaluate(&inner, loader, label_space.dim());
                let mean_loss = loss_sum / loss_batches.max(1) as f64;
                tracing::info!(
                    "Epoch {:>3}/{} | step {} | loss={:.4} | apc_acc={:.2} | apc_f1={:.2} | ate_f1={:.2}",
                    epoch + 1,
                    config.num_epoch,
                    global_step,
                    mean_loss,
                    metrics.apc_acc,
                    metrics.apc_f1,
                    metrics.ate_f1,
                );
                if let Some(log) = &metrics_log {
                    log.log(&EvalRecord { epoch: epoch + 1, step: global_step, loss: mean_loss, metrics })?;
                }
                if best.observe(&metrics) {
                    if let Some(manager) = &checkpoints {
                        let name = checkpoint_name(&config.model_name, lcf, &metrics);
                        last_saved =
                            Some(manager.save::<B::InnerBackend, _>(&name, &inner, &config, &tokenizer)?);
                    }
                }
                loss_sum = 0.0;
                loss_batches = 0;
                transition(&mut phase, Phase::Training);
            }

            // a trailing partial accumulation still updates the weights
            if pending > 0 {
                let mut grads = accumulator.grads();
                apply_weight_decay::<B, M>(&model, &mut grads, config.l2reg);
                model = optim.step(config.learning_rate, model, grads);
            }
            if loss_batches > 0 {
                tracing::info!(
                    "Epoch {:>3}/{} done | step {} | loss={:.4}",
                    epoch + 1,
                    config.num_epoch,
                    global_step,
                    loss_sum / loss_batches as f64
                );
            }
        }

        transition(&mut phase, Phase::Done);
        tracing::info!(
            "Best apc_acc={:.2} apc_f1={:.2} ate_f1={:.2}",
            best.max_apc_acc,
            best.max_apc_f1,
            best.max_ate_f1
        );

        let inner = model.valid();
        match (last_saved, checkpoints) {
            (Some(path), _) => Ok(TrainOutcome::Saved { path, best }),
            (None, Some(manager)) => {
                let name = final_name(&config.model_name, lcf);
                let path = manager.save::<B::InnerBackend, _>(&name, &inner, &config, &tokenizer)?;
                Ok(TrainOutcome::Saved { path, best })
            }
            (None, None) => Ok(TrainOutcome::InMemory(TrainedModel {
                model: inner,
                config,
                tokenizer,
                best,
                device,
            })),
        }
    }
}

fn check_test_labels(test: &[Example], space: &LabelSpace) -> AbsaResult<()> {
    match test.iter().filter_map(|e| e.polarity).find(|p| *p >= space.dim()) {
        Some(label) => Err(AbsaError::data(format!(
            "test label {label} is outside the {} training classes",
            space.dim()
        ))),
        None => Ok(()),
    }
}

/// Score a model over every batch of `loader`.
pub fn evaluate<B: Backend, M: AtepcModel<B>>(
    model: &M,
    loader: &Arc<dyn DataLoader<AtepcBatch<B>>>,
    polarities_dim: usize,
) -> EvalMetrics {
    let mut acc = EvalAccumulator::new();
    for batch in loader.iter() {
        let output = model.forward(&batch);
        let [b, l, _] = output.tag_logits.dims();

        let predicted: Vec<i64> = output.polarity_logits.argmax(1).into_data().iter::<i64>().collect();
        let labels: Vec<i64> = batch.polarity.into_data().iter::<i64>().collect();
        for (p, t) in predicted.into_iter().zip(labels) {
            acc.push_polarity(p, t);
        }

        let tags: Vec<i64> = output.tag_logits.argmax(2).reshape([b, l]).into_data().iter::<i64>().collect();
        let gold: Vec<i64> = batch.label_ids.into_data().iter::<i64>().collect();
        for row in 0..b {
            let span = row * l..(row + 1) * l;
            acc.push_tag_row(&gold[span.clone()], &tags[span]);
        }
    }
    acc.finish(polarities_dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::srd::LcfMode;
    use crate::ml::base::BaseAtepc;
    use crate::ml::lcf::LcfAtepc;
    use crate::ml::slide::SlideLcfAtepc;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;
    use std::path::Path;

    type TrainBackend = Autodiff<NdArray>;

    const DATA: &str = "great $T$ life\nbattery\n2\n\
                        the $T$ is dim\nscreen\n0\n\
                        the screen is ok , the $T$ too\nkeyboard\n1\n";

    fn tiny_config(dir: &Path) -> TrainConfig {
        let train = dir.join("train.txt");
        fs::write(&train, DATA).unwrap();
        TrainConfig {
            train_file: train.clone(),
            test_file: Some(train),
            batch_size: 2,
            num_epoch: 2,
            log_step: 1,
            evaluate_begin: 0,
            max_seq_len: 24,
            hidden_dim: 8,
            num_heads: 2,
            num_layers: 1,
            d_ff: 16,
            vocab_size: 40,
            learning_rate: 1e-3,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_zero_accumulation_steps_fails_before_io() {
        let config = TrainConfig {
            gradient_accumulation_steps: 0,
            train_file: PathBuf::from("/definitely/not/here.txt"),
            ..TrainConfig::default()
        };
        let err = Instructor::<TrainBackend, LcfAtepc<TrainBackend>>::new(config, Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, AbsaError::Config(_)));
    }

    #[test]
    fn test_model_type_must_match_configured_variant() {
        let dir = tempfile::tempdir().unwrap();
        // default config names lcf_atepc
        let err =
            Instructor::<TrainBackend, BaseAtepc<TrainBackend>>::new(tiny_config(dir.path()), Default::default())
                .err()
                .unwrap();
        assert!(matches!(err, AbsaError::Config(_)));
    }

    #[test]
    fn test_label_space_pins_config() {
        let dir = tempfile::tempdir().unwrap();
        let instructor =
            Instructor::<TrainBackend, LcfAtepc<TrainBackend>>::new(tiny_config(dir.path()), Default::default())
                .unwrap();
        assert_eq!(instructor.label_space().dim(), 3);
        assert_eq!(instructor.config().polarities_dim, Some(3));
        assert_eq!(instructor.phase(), Phase::Init);
    }

    #[test]
    fn test_non_contiguous_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path());
        fs::write(&config.train_file, "a $T$\nb\n0\nc $T$\nd\n2\n").unwrap();
        config.test_file = None;
        let err = Instructor::<TrainBackend, LcfAtepc<TrainBackend>>::new(config, Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, AbsaError::Data(_)));
    }

    #[test]
    fn test_training_saves_checkpoint_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path());
        config.model_path_to_save = Some(dir.path().join("state"));
        config.lcf = LcfMode::Fusion;

        let outcome =
            Instructor::<TrainBackend, LcfAtepc<TrainBackend>>::new(config, Default::default())
                .unwrap()
                .train()
                .unwrap();
        let path = outcome.saved_path().unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("lcf_atepc_fusion"));

        let csv = fs::read_to_string(dir.path().join("state").join("metrics.csv")).unwrap();
        // header + one row per batch (2 batches × 2 epochs)
        assert_eq!(csv.lines().count(), 5);
    }

    #[test]
    fn test_without_save_dir_model_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path());
        config.model_name = "slide_lcf_atepc".into();
        config.gradient_accumulation_steps = 2;
        config.optimizer = OptimizerKind::Sgd;

        let outcome =
            Instructor::<TrainBackend, SlideLcfAtepc<TrainBackend>>::new(config, Default::default())
                .unwrap()
                .train()
                .unwrap();
        match outcome {
            TrainOutcome::InMemory(trained) => assert_eq!(trained.config.polarities_dim, Some(3)),
            TrainOutcome::Saved { .. } => panic!("nothing should be written without a save directory"),
        }
    }
}
