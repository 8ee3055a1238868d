// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with `clap` and routes to Layer 2.
// The only decision made here is which Burn backend to run on.
//
//   1. `train`   — trains a model from a 3-line dataset file
//   2. `extract` — loads a checkpoint and prints aspect/polarity
//                  results as JSON

pub mod commands;

use anyhow::{Context, Result};
use burn::backend::{wgpu::WgpuDevice, Autodiff};
use clap::Parser;
use commands::{Commands, ExtractArgs, TrainArgs};
use std::fs;

use crate::application::extract_use_case::{load_pipeline, ExtractUseCase, PipelineOptions};
use crate::application::train_use_case::{DeviceKind, TrainReport, TrainUseCase};
use crate::ml::{CpuBackend, GpuBackend};

#[derive(Parser, Debug)]
#[command(
    name = "lcf-atepc",
    version,
    about = "Aspect term extraction and polarity classification with Local Context Focus."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Extract(args) => run_extract(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::info!(
        "Training {} ({}) on '{}' [{}]",
        config.model_name,
        config.lcf,
        config.train_file.display(),
        config.device
    );

    let device = config.device;
    let use_case = TrainUseCase::new(config);
    let report = match device {
        DeviceKind::Cpu => use_case.execute::<Autodiff<CpuBackend>>(Default::default())?,
        DeviceKind::Gpu => use_case.execute::<Autodiff<GpuBackend>>(WgpuDevice::default())?,
    };

    let best = report.best();
    println!(
        "Training complete. Best APC acc {:.2} | APC F1 {:.2} | ATE F1 {:.2}",
        best.max_apc_acc, best.max_apc_f1, best.max_ate_f1
    );
    match report {
        TrainReport::Saved { path, .. } => println!("Checkpoint saved to {}", path.display()),
        TrainReport::InMemory { .. } => {
            println!("No --model-path-to-save given; the trained model was not written to disk.")
        }
    }
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    if args.texts.is_empty() && args.files.is_empty() {
        anyhow::bail!("Nothing to analyse: pass --text and/or --file");
    }

    let options = PipelineOptions {
        predict_sentiment: !args.no_sentiment,
        labels: args.labels.clone(),
    };
    let pipeline = match args.device {
        DeviceKind::Cpu => load_pipeline::<CpuBackend>(&args.checkpoint, Default::default(), &options)?,
        DeviceKind::Gpu => load_pipeline::<GpuBackend>(&args.checkpoint, WgpuDevice::default(), &options)?,
    };

    let use_case = ExtractUseCase::new(pipeline, args.ignore_error);
    let mut outcomes = use_case.run_texts(&args.texts)?;
    outcomes.extend(use_case.run_files(&args.files)?);

    let json = serde_json::to_string_pretty(&outcomes)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
            tracing::info!("Wrote {} results to '{}'", outcomes.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
