// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per evaluation event so learning curves
// can be plotted after (or during) a run.
//
// Output file: <model_path_to_save>/metrics.csv
//
//   epoch,step,loss,apc_acc,apc_f1,ate_f1
//   4,120,0.913420,71.25,66.02,74.10
//   ...
//
// The header is written only when the file is new, so several
// runs into the same directory keep a single log.

use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::error::AbsaResult;
use crate::ml::scoring::EvalMetrics;

pub const METRICS_FILE: &str = "metrics.csv";
const HEADER: &str = "epoch,step,loss,apc_acc,apc_f1,ate_f1";

/// One evaluation event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub epoch: usize,
    pub step: usize,
    /// Mean joint training loss since the previous evaluation.
    pub loss: f64,
    pub metrics: EvalMetrics,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: &Path) -> AbsaResult<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(METRICS_FILE);

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &EvalRecord) -> AbsaResult<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{},{:.6},{:.2},{:.2},{:.2}",
            r.epoch, r.step, r.loss, r.metrics.apc_acc, r.metrics.apc_f1, r.metrics.ate_f1,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: usize) -> EvalRecord {
        EvalRecord {
            epoch: 1,
            step,
            loss: 0.5,
            metrics: EvalMetrics { apc_acc: 80.0, apc_f1: 75.5, ate_f1: 60.25 },
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path()).unwrap().log(&record(5)).unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&record(10)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[2], "1,10,0.500000,80.00,75.50,60.25");
    }
}
