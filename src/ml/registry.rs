// ============================================================
// Layer 5 — Model Registry
// ============================================================
// Maps the configured `model_name` + `lcf` pair to one concrete
// variant. Every variant is a real type implementing AtepcModel,
// so an unknown name fails here, at configuration time, and
// never inside a forward pass.
//
//   bert_base_atepc           → Base
//   lcf_atepc + cdm           → LcfCdm
//   lcf_atepc + cdw           → LcfCdw
//   lcf_atepc + fusion        → LcfFusion
//   slide_lcf_atepc           → SlideWindow

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::srd::LcfMode;
use crate::domain::error::{AbsaError, AbsaResult};

pub const KNOWN_MODELS: [&str; 3] = ["bert_base_atepc", "lcf_atepc", "slide_lcf_atepc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Base,
    LcfCdm,
    LcfCdw,
    LcfFusion,
    SlideWindow,
}

impl ModelKind {
    pub fn resolve(model_name: &str, lcf: LcfMode) -> AbsaResult<Self> {
        match model_name.to_lowercase().as_str() {
            "bert_base_atepc" => Ok(ModelKind::Base),
            "lcf_atepc" | "lcf_atepc_large" => Ok(match lcf {
                LcfMode::Cdm => ModelKind::LcfCdm,
                LcfMode::Cdw => ModelKind::LcfCdw,
                LcfMode::Fusion => ModelKind::LcfFusion,
            }),
            "slide_lcf_atepc" => Ok(ModelKind::SlideWindow),
            other => Err(AbsaError::config(format!(
                "unknown model '{other}', expected one of {}",
                KNOWN_MODELS.join(", ")
            ))),
        }
    }

    /// Slide-window features need their neighbours' fusion vectors.
    pub fn needs_neighbours(&self) -> bool {
        matches!(self, ModelKind::SlideWindow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Base => "base",
            ModelKind::LcfCdm => "lcf_cdm",
            ModelKind::LcfCdw => "lcf_cdw",
            ModelKind::LcfFusion => "lcf_fusion",
            ModelKind::SlideWindow => "slide_window",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_every_variant() {
        assert_eq!(ModelKind::resolve("bert_base_atepc", LcfMode::Cdw).unwrap(), ModelKind::Base);
        assert_eq!(ModelKind::resolve("lcf_atepc", LcfMode::Cdm).unwrap(), ModelKind::LcfCdm);
        assert_eq!(ModelKind::resolve("LCF_ATEPC", LcfMode::Cdw).unwrap(), ModelKind::LcfCdw);
        assert_eq!(ModelKind::resolve("lcf_atepc", LcfMode::Fusion).unwrap(), ModelKind::LcfFusion);
        assert_eq!(
            ModelKind::resolve("slide_lcf_atepc", LcfMode::Cdm).unwrap(),
            ModelKind::SlideWindow
        );
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let err = ModelKind::resolve("lcfs_atepc", LcfMode::Cdw).unwrap_err();
        assert!(matches!(err, AbsaError::Config(_)));
    }

    #[test]
    fn test_only_slide_window_needs_neighbours() {
        assert!(ModelKind::SlideWindow.needs_neighbours());
        assert!(!ModelKind::LcfFusion.needs_neighbours());
    }
}
