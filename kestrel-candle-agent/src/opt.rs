//! Optimizers.
//!
//! [`Optimizer`] implements Adam with optional decoupled weight decay
//! (AdamW). Unlike the optimizers shipped with `candle-nn`, its moment
//! estimates and step counter can be exported and restored, so that a
//! checkpoint resumes training exactly where it stopped.
use anyhow::{bail, Result};
use candle_core::{backprop::GradStore, DType, Device, Tensor, Var};
use candle_nn::ParamsAdamW;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration of optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Decay rate of the first moment.
        #[serde(default = "default_beta1")]
        beta1: f64,
        /// Decay rate of the second moment.
        #[serde(default = "default_beta2")]
        beta2: f64,
        /// Term added to the denominator for numerical stability.
        #[serde(default = "default_eps")]
        eps: f64,
        /// Decoupled weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer of the given named variables.
    pub fn build(&self, vars: Vec<(String, Var)>) -> Result<Optimizer> {
        let params = match self {
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => ParamsAdamW {
                lr: *lr,
                beta1: *beta1,
                beta2: *beta2,
                eps: *eps,
                weight_decay: *weight_decay,
            },
            Self::Adam { lr } => ParamsAdamW {
                lr: *lr,
                weight_decay: 0.0,
                ..ParamsAdamW::default()
            },
        };
        Optimizer::new(vars, params)
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 3e-4 }
    }
}

struct Moments {
    name: String,
    var: Var,
    m: Tensor,
    v: Tensor,
}

/// Adam optimizer whose state can be exported.
pub struct Optimizer {
    moments: Vec<Moments>,
    params: ParamsAdamW,
    step: usize,
}

impl Optimizer {
    fn new(vars: Vec<(String, Var)>, params: ParamsAdamW) -> Result<Self> {
        let moments = vars
            .into_iter()
            .filter(|(_, var)| var.dtype().is_float())
            .map(|(name, var)| {
                let m = var.zeros_like()?;
                let v = var.zeros_like()?;
                Ok(Moments { name, var, m, v })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            moments,
            params,
            step: 0,
        })
    }

    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Updates the variables with the given gradients.
    ///
    /// Variables without a gradient are left unchanged.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step += 1;
        let ParamsAdamW {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.params;
        let scale_m = 1f64 / (1f64 - beta1.powi(self.step as i32));
        let scale_v = 1f64 / (1f64 - beta2.powi(self.step as i32));

        for moments in self.moments.iter_mut() {
            let theta = &moments.var;
            if let Some(g) = grads.get(theta.as_tensor()) {
                let next_m = ((&moments.m * beta1)? + (g * (1.0 - beta1))?)?;
                let next_v = ((&moments.v * beta2)? + (g.sqr()? * (1.0 - beta2))?)?;
                let m_hat = (&next_m * scale_m)?;
                let v_hat = (&next_v * scale_v)?;
                let next_theta = (theta.as_tensor() * (1f64 - lr * weight_decay))?;
                let adjusted_grad = (m_hat / (v_hat.sqrt()? + eps)?)?;
                let next_theta = (next_theta - (adjusted_grad * lr)?)?;
                theta.set(&next_theta)?;
                moments.m = next_m;
                moments.v = next_v;
            }
        }
        Ok(())
    }

    /// Learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    /// Sets the learning rate of subsequent steps.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    /// Number of steps taken so far.
    pub fn num_steps(&self) -> usize {
        self.step
    }

    /// Exports the step counter as `step` and the moment estimates of each
    /// variable as `m.{name}` and `v.{name}`.
    pub fn state(&self) -> Result<Vec<(String, Tensor)>> {
        let mut state = vec![("step".to_string(), Tensor::new(self.step as i64, &Device::Cpu)?)];
        for moments in self.moments.iter() {
            state.push((format!("m.{}", moments.name), moments.m.clone()));
            state.push((format!("v.{}", moments.name), moments.v.clone()));
        }
        Ok(state)
    }

    /// Restores the state exported by [`Optimizer::state`].
    ///
    /// Entries missing in `state` are left unchanged.
    pub fn load_state(&mut self, state: &HashMap<String, Tensor>) -> Result<()> {
        if let Some(step) = state.get("step") {
            self.step = step.to_dtype(DType::I64)?.to_scalar::<i64>()? as usize;
        }
        for moments in self.moments.iter_mut() {
            let device = moments.var.device();
            for (key, dest) in [("m", &mut moments.m), ("v", &mut moments.v)] {
                if let Some(t) = state.get(&format!("{}.{}", key, moments.name)) {
                    if t.dims() != dest.dims() {
                        bail!(
                            "Shape mismatch of optimizer state {}.{}: {:?} != {:?}",
                            key,
                            moments.name,
                            t.dims(),
                            dest.dims()
                        );
                    }
                    *dest = t.to_device(device)?.to_dtype(dest.dtype())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_minimizes_quadratic() -> Result<()> {
        let x = Var::new(&[3f32, -2.0], &Device::Cpu)?;
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(vec![("x".to_string(), x.clone())])?;
        for _ in 0..300 {
            let loss = x.as_tensor().sqr()?.sum_all()?;
            opt.backward_step(&loss)?;
        }
        let x = x.as_tensor().to_vec1::<f32>()?;
        assert!(x.iter().all(|v| v.abs() < 0.05));
        assert_eq!(opt.num_steps(), 300);
        Ok(())
    }

    #[test]
    fn test_state_restores_updates() -> Result<()> {
        let build = |init: &[f32]| -> Result<(Var, Optimizer)> {
            let x = Var::new(init, &Device::Cpu)?;
            let opt = OptimizerConfig::Adam { lr: 0.05 }.build(vec![("x".to_string(), x.clone())])?;
            Ok((x, opt))
        };
        let step = |x: &Var, opt: &mut Optimizer| -> Result<()> {
            let loss = (x.as_tensor() - 1.0)?.sqr()?.sum_all()?;
            opt.backward_step(&loss)
        };

        let (x1, mut opt1) = build(&[0.5, 2.0])?;
        for _ in 0..5 {
            step(&x1, &mut opt1)?;
        }

        // A second optimizer resumes from the exported state.
        let (x2, mut opt2) = build(&x1.as_tensor().to_vec1::<f32>()?)?;
        let state = opt1.state()?.into_iter().collect::<HashMap<_, _>>();
        opt2.load_state(&state)?;
        assert_eq!(opt2.num_steps(), 5);

        step(&x1, &mut opt1)?;
        step(&x2, &mut opt2)?;
        assert_eq!(
            x1.as_tensor().to_vec1::<f32>()?,
            x2.as_tensor().to_vec1::<f32>()?
        );
        Ok(())
    }
}
