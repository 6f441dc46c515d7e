//! Entropy coefficient of SAC.
use crate::{
    opt::{Optimizer, OptimizerConfig},
    util::{export_vars, finite_loss, import_vars, named_vars},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),

    /// Automatic tuning of `log(alpha)`, starting from `alpha = init`.
    ///
    /// Without `target_entropy`, `-prod(action_sizes)` is used.
    Auto {
        /// Initial value of alpha.
        init: f64,

        /// Target entropy of the policy.
        target_entropy: Option<f64>,
    },
}

enum Repr {
    Fix(f64),
    Auto {
        varmap: VarMap,
        log_ent_coef: Tensor,
        target_entropy: f64,
        opt: Optimizer,
    },
}

/// The entropy coefficient of SAC.
///
/// The representation, fixed or learned, does not change after
/// construction.
pub struct EntCoef {
    repr: Repr,
    device: Device,
}

/// Default target entropy of a policy over actions of the given shape.
pub fn default_target_entropy(action_sizes: &[usize]) -> f64 {
    -(action_sizes.iter().product::<usize>() as f64)
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    ///
    /// `action_sizes` determines the target entropy when it is not given in
    /// `mode`.
    pub fn build(
        mode: EntCoefMode,
        opt_config: &OptimizerConfig,
        action_sizes: &[usize],
        device: &Device,
    ) -> Result<Self> {
        let repr = match mode {
            EntCoefMode::Fix(alpha) => Repr::Fix(alpha),
            EntCoefMode::Auto {
                init,
                target_entropy,
            } => {
                let varmap = VarMap::new();
                let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
                let log_ent_coef = vb.get_with_hints(1, "log_ent_coef", Init::Const(init.ln()))?;
                let opt = opt_config.build(named_vars(&varmap)?)?;
                let target_entropy =
                    target_entropy.unwrap_or_else(|| default_target_entropy(action_sizes));
                Repr::Auto {
                    varmap,
                    log_ent_coef,
                    target_entropy,
                    opt,
                }
            }
        };

        Ok(Self {
            repr,
            device: device.clone(),
        })
    }

    /// Returns `true` if the coefficient is tuned automatically.
    pub fn is_auto(&self) -> bool {
        matches!(self.repr, Repr::Auto { .. })
    }

    /// Returns the target entropy, `None` in the fixed mode.
    pub fn target_entropy(&self) -> Option<f64> {
        match &self.repr {
            Repr::Fix(_) => None,
            Repr::Auto { target_entropy, .. } => Some(*target_entropy),
        }
    }

    /// Sets the target entropy. Ignored in the fixed mode.
    pub fn set_target_entropy(&mut self, v: f64) {
        if let Repr::Auto { target_entropy, .. } = &mut self.repr {
            *target_entropy = v;
        }
    }

    /// Returns the entropy coefficient as a tensor of shape `[1]`,
    /// detached from the computation graph.
    pub fn alpha(&self) -> Result<Tensor> {
        match &self.repr {
            Repr::Fix(alpha) => Ok(Tensor::new(&[*alpha as f32], &self.device)?),
            Repr::Auto { log_ent_coef, .. } => Ok(log_ent_coef.detach().exp()?),
        }
    }

    /// Returns the entropy coefficient.
    pub fn value(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Update the parameter given log probabilities of sampled actions.
    ///
    /// Returns the loss of the coefficient, `None` in the fixed mode.
    pub fn update(&mut self, log_p: &Tensor) -> Result<Option<f32>> {
        match &mut self.repr {
            Repr::Fix(_) => Ok(None),
            Repr::Auto {
                log_ent_coef,
                target_entropy,
                opt,
                ..
            } => {
                let target = (log_p + *target_entropy)?.detach();
                let loss = log_ent_coef.broadcast_mul(&target)?.mean_all()?.neg()?;
                let v = finite_loss("ent_coef_loss", &loss)?;
                opt.backward_step(&loss)?;
                Ok(Some(v))
            }
        }
    }

    /// Returns the optimizer of the coefficient, `None` in the fixed mode.
    pub fn optimizer(&self) -> Option<&Optimizer> {
        match &self.repr {
            Repr::Fix(_) => None,
            Repr::Auto { opt, .. } => Some(opt),
        }
    }

    /// Mutable counterpart of [`EntCoef::optimizer`].
    pub fn optimizer_mut(&mut self) -> Option<&mut Optimizer> {
        match &mut self.repr {
            Repr::Fix(_) => None,
            Repr::Auto { opt, .. } => Some(opt),
        }
    }

    /// Exports the coefficient, `log_ent_coef` in the automatic mode and
    /// `ent_coef_value` in the fixed mode.
    pub fn state(&self) -> Result<Vec<(String, Tensor)>> {
        match &self.repr {
            Repr::Fix(alpha) => Ok(vec![(
                "ent_coef_value".to_string(),
                Tensor::new(*alpha, &Device::Cpu)?,
            )]),
            Repr::Auto { varmap, .. } => export_vars(varmap),
        }
    }

    /// Restores the coefficient exported by [`EntCoef::state`].
    ///
    /// A value stored in the other mode is ignored with a warning.
    pub fn load_state(&mut self, state: &HashMap<String, Tensor>) -> Result<()> {
        match &mut self.repr {
            Repr::Fix(alpha) => {
                if let Some(t) = state.get("ent_coef_value") {
                    *alpha = t.to_dtype(DType::F64)?.to_scalar::<f64>()?;
                } else if state.contains_key("log_ent_coef") {
                    warn!("Ignored log_ent_coef, the entropy coefficient is fixed");
                }
            }
            Repr::Auto { varmap, .. } => {
                if state.contains_key("log_ent_coef") {
                    let mut tensors = state.clone();
                    tensors.retain(|k, _| k == "log_ent_coef");
                    import_vars(varmap, &tensors)?;
                } else if state.contains_key("ent_coef_value") {
                    warn!("Ignored ent_coef_value, the entropy coefficient is tuned automatically");
                }
            }
        }
        Ok(())
    }
}
