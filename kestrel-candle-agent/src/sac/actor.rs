//! Actor of SAC agent.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{export_vars, import_vars, named_vars, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Actor`].
pub struct ActorConfig<P> {
    pi_config: Option<P>,
    opt_config: OptimizerConfig,
    min_lstd: f64,
    max_lstd: f64,
    epsilon: f64,
}

impl<P> Default for ActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::default(),
            min_lstd: -20.0,
            max_lstd: 2.0,
            epsilon: 1e-6,
        }
    }
}

impl<P> ActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations for the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the range of the log standard deviation.
    pub fn lstd_range(mut self, min_lstd: f64, max_lstd: f64) -> Self {
        self.min_lstd = min_lstd;
        self.max_lstd = max_lstd;
        self
    }

    /// Sets the constant added inside the log-determinant of the squashing
    /// function.
    pub fn epsilon(mut self, v: f64) -> Self {
        self.epsilon = v;
        self
    }

    /// Constructs [`ActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Stochastic policy for SAC agents.
///
/// A Gaussian in the pre-squashing space whose samples are squashed by
/// `tanh` into `(-1, 1)`.
pub struct Actor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
{
    device: Device,
    varmap: VarMap,
    pi: P,
    opt: Optimizer,
    min_lstd: f64,
    max_lstd: f64,
    epsilon: f64,
}

impl<P> Actor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`Actor`].
    ///
    /// The learning rate of the optimizer is overridden by `lr`.
    pub fn build(config: ActorConfig<P::Config>, lr: f64, device: &Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let varmap = VarMap::new();
        let pi = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            P::build(vb, pi_config)?
        };
        let opt = config
            .opt_config
            .learning_rate(lr)
            .build(named_vars(&varmap)?)?;

        Ok(Self {
            device: device.clone(),
            varmap,
            pi,
            opt,
            min_lstd: config.min_lstd,
            max_lstd: config.max_lstd,
            epsilon: config.epsilon,
        })
    }
}

impl<P> Actor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
{
    /// Outputs the mean and the clamped log standard deviation of the
    /// Gaussian given an observation.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let obs = obs.to_device(&self.device)?;
        let (mean, lstd) = self.pi.forward(&obs)?;
        let lstd = lstd.clamp(self.min_lstd, self.max_lstd)?;
        Ok((mean, lstd))
    }

    /// Samples squashed actions with the reparameterization trick and
    /// returns them with their log probabilities.
    ///
    /// The log probability, of shape `[batch]`, accounts for the change of
    /// variables by `tanh`.
    pub fn predict_action_log_prob(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, lstd) = self.forward(obs)?;
        let z = mean.randn_like(0.0, 1.0)?;
        let a = ((lstd.exp()? * &z)? + &mean)?.tanh()?;
        let log_p = ((z.sqr()? * -0.5)? - 0.5 * (2.0 * std::f64::consts::PI).ln())?;
        let log_p = (log_p - &lstd)?;
        let log_det = ((1.0 - a.sqr()?)? + self.epsilon)?.log()?;
        let log_p = (log_p - log_det)?.sum(D::Minus1)?;
        Ok((a, log_p))
    }

    /// Samples squashed actions.
    pub fn predict_action(&self, obs: &Tensor) -> Result<Tensor> {
        Ok(self.predict_action_log_prob(obs)?.0)
    }

    /// Returns `tanh(mean)` if `deterministic`, a sampled action otherwise.
    pub fn predict(&self, obs: &Tensor, deterministic: bool) -> Result<Tensor> {
        match deterministic {
            true => Ok(self.forward(obs)?.0.tanh()?),
            false => self.predict_action(obs),
        }
    }

    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Optimizer of the policy.
    pub fn optimizer(&self) -> &Optimizer {
        &self.opt
    }

    /// Mutable counterpart of [`Actor::optimizer`].
    pub fn optimizer_mut(&mut self) -> &mut Optimizer {
        &mut self.opt
    }

    /// Copies the parameters of the policy.
    pub fn export(&self) -> Result<Vec<(String, Tensor)>> {
        export_vars(&self.varmap)
    }

    /// Sets the parameters of the policy.
    pub fn import(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        import_vars(&self.varmap, tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp2, MlpConfig};

    fn actor() -> Result<Actor<Mlp2>> {
        let config = ActorConfig::default().pi_config(MlpConfig::new(3, vec![16], 2, false));
        Actor::build(config, 3e-4, &Device::Cpu)
    }

    #[test]
    fn test_actions_are_squashed() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::randn(0f32, 10f32, (64, 3), &Device::Cpu)?;
        let (a, log_p) = actor.predict_action_log_prob(&obs)?;
        assert_eq!(a.dims(), &[64, 2]);
        assert_eq!(log_p.dims(), &[64]);
        let a = a.flatten_all()?.to_vec1::<f32>()?;
        assert!(a.iter().all(|v| v.abs() <= 1.0));
        let log_p = log_p.to_vec1::<f32>()?;
        assert!(log_p.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_deterministic_prediction() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        let a1 = actor.predict(&obs, true)?.flatten_all()?.to_vec1::<f32>()?;
        let a2 = actor.predict(&obs, true)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a1, a2);
        Ok(())
    }

    #[test]
    fn test_export_import() -> Result<()> {
        let src = actor()?;
        let dest = actor()?;
        let obs = Tensor::randn(0f32, 1f32, (4, 3), &Device::Cpu)?;
        dest.import(&src.export()?.into_iter().collect())?;
        assert_eq!(
            src.predict(&obs, true)?.flatten_all()?.to_vec1::<f32>()?,
            dest.predict(&obs, true)?.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }
}
