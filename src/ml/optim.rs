// ============================================================
// Layer 5 — Optimizer Selection and Weight Decay
// ============================================================
// The optimizer is chosen by name from the config. Weight decay
// (`l2reg`) is not handed to the optimizer: it is added to the
// gradients before every step, as an L2 term on matrices only.
//
//   rank ≥ 2  (Linear / Embedding weights)   g ← g + l2reg · θ
//   rank 1    (biases, LayerNorm γ and β)    untouched
//
// This keeps the decay identical across all five optimizers.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::AbsaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
    AdaGrad,
    RmsProp,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::AdaGrad => "adagrad",
            OptimizerKind::RmsProp => "rmsprop",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = AbsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            "adagrad" => Ok(OptimizerKind::AdaGrad),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            other => Err(AbsaError::config(format!(
                "unknown optimizer '{other}', expected adam, adamw, sgd, adagrad or rmsprop"
            ))),
        }
    }
}

// ─── Weight decay ─────────────────────────────────────────────────────────────
struct WeightDecay<'a> {
    grads: &'a mut GradientsParams,
    l2reg: f64,
    decayed: usize,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for WeightDecay<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        if D < 2 {
            return;
        }
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            let decay = tensor.clone().inner().mul_scalar(self.l2reg);
            self.grads.register::<B::InnerBackend, D>(id, grad + decay);
            self.decayed += 1;
        }
    }
}

/// Add `l2reg · θ` to the gradient of every rank ≥ 2 parameter.
/// Returns how many parameters were decayed.
pub fn apply_weight_decay<B, M>(model: &M, grads: &mut GradientsParams, l2reg: f64) -> usize
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    if l2reg == 0.0 {
        return 0;
    }
    let mut visitor = WeightDecay { grads, l2reg, decayed: 0 };
    model.visit(&mut visitor);
    visitor.decayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    fn grads_of(linear: &Linear<TestBackend>) -> GradientsParams {
        let x = Tensor::<TestBackend, 2>::ones([1, 3], &Default::default());
        let loss = linear.forward(x).sum();
        GradientsParams::from_grads(loss.backward(), linear)
    }

    #[test]
    fn test_decay_touches_matrices_only() {
        let linear: Linear<TestBackend> = LinearConfig::new(3, 2).init(&Default::default());
        let weight_id = linear.weight.id;
        let bias_id = linear.bias.as_ref().unwrap().id;

        let plain = grads_of(&linear);
        let mut decayed = grads_of(&linear);
        assert_eq!(apply_weight_decay(&linear, &mut decayed, 0.5), 1);

        let w_plain = plain.get::<NdArray, 2>(weight_id).unwrap();
        let w_decayed = decayed.get::<NdArray, 2>(weight_id).unwrap();
        let expected = w_plain + linear.weight.val().inner().mul_scalar(0.5);
        let diff: f32 = (w_decayed - expected).abs().max().into_scalar();
        assert!(diff < 1e-6);

        let b_plain: Vec<f32> = plain.get::<NdArray, 1>(bias_id).unwrap().into_data().iter::<f32>().collect();
        let b_decayed: Vec<f32> =
            decayed.get::<NdArray, 1>(bias_id).unwrap().into_data().iter::<f32>().collect();
        assert_eq!(b_plain, b_decayed);
    }

    #[test]
    fn test_zero_decay_is_a_no_op() {
        let linear: Linear<TestBackend> = LinearConfig::new(3, 2).init(&Default::default());
        let mut grads = grads_of(&linear);
        assert_eq!(apply_weight_decay(&linear, &mut grads, 0.0), 0);
    }

    #[test]
    fn test_optimizer_names() {
        assert_eq!("AdamW".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdamW);
        assert_eq!(OptimizerKind::RmsProp.to_string(), "rmsprop");
        assert!("lbfgs".parse::<OptimizerKind>().is_err());
    }
}
