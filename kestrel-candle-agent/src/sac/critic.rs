//! Critic of SAC agent.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::{export_vars, import_vars, no_grad, polyak_update, track, trainable_vars},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::trace;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// The number of action-value functions in a [`CriticPair`].
pub const N_CRITICS: usize = 2;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`CriticPair`].
pub struct CriticConfig<Q> {
    q_config: Option<Q>,
    opt_config: OptimizerConfig,
}

impl<Q> Default for CriticConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<Q> CriticConfig<Q>
where
    Q: DeserializeOwned + Serialize,
{
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [CriticConfig] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [CriticConfig].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Two soft action-value functions and their target networks.
///
/// Online networks live in one [`VarMap`] under `q0` and `q1`, trained by a
/// single optimizer. The target networks live in a separate [`VarMap`] that
/// no optimizer sees; it starts as an exact copy and then only follows the
/// online networks through [`CriticPair::polyak_update`].
pub struct CriticPair<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    varmap: VarMap,
    varmap_tgt: VarMap,
    qs: Vec<Q>,
    qs_tgt: Vec<Q>,
    opt: Optimizer,
}

fn build_qs<Q: SubModel2>(varmap: &VarMap, q_config: &Q::Config, device: &Device) -> Result<Vec<Q>>
where
    Q::Config: Clone,
{
    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
    let mut qs = vec![];
    for i in 0..N_CRITICS {
        qs.push(Q::build(vb.pp(format!("q{}", i)), q_config.clone())?);
    }
    Ok(qs)
}

impl<Q> CriticPair<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`CriticPair`].
    ///
    /// The learning rate of the optimizer is overridden by `lr`.
    pub fn build(config: CriticConfig<Q::Config>, lr: f64, device: &Device) -> Result<Self> {
        let q_config = config.q_config.context("q_config is not set.")?;
        let varmap = VarMap::new();
        let qs = build_qs(&varmap, &q_config, device)?;
        let varmap_tgt = VarMap::new();
        let qs_tgt = build_qs(&varmap_tgt, &q_config, device)?;
        track(&varmap_tgt, &varmap, 1.0)?;
        let opt = config
            .opt_config
            .learning_rate(lr)
            .build(trainable_vars(&varmap)?)?;

        Ok(Self {
            varmap,
            varmap_tgt,
            qs,
            qs_tgt,
            opt,
        })
    }
}

impl<Q> CriticPair<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    fn forward_(qs: &[Q], obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        qs.iter()
            .map(|q| -> Result<Tensor> { Ok(q.forward(obs, act)?.squeeze(D::Minus1)?) })
            .collect()
    }

    /// Outputs the action values of the online networks, each of shape
    /// `[batch]`.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        Self::forward_(&self.qs, obs, act)
    }

    /// Outputs the action values of the target networks, detached from the
    /// computation graph.
    pub fn forward_target(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        no_grad(|| Self::forward_(&self.qs_tgt, obs, act))
    }

    /// Moves the target networks towards the online networks.
    pub fn polyak_update(&self, tau: f64) -> Result<()> {
        trace!("polyak_update");
        polyak_update(&self.varmap_tgt, &self.varmap, tau)
    }

    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Optimizer of the online networks.
    pub fn optimizer(&self) -> &Optimizer {
        &self.opt
    }

    /// Mutable counterpart of [`CriticPair::optimizer`].
    pub fn optimizer_mut(&mut self) -> &mut Optimizer {
        &mut self.opt
    }

    /// Copies the parameters of the online networks.
    pub fn export(&self) -> Result<Vec<(String, Tensor)>> {
        export_vars(&self.varmap)
    }

    /// Copies the parameters of the target networks.
    pub fn export_target(&self) -> Result<Vec<(String, Tensor)>> {
        export_vars(&self.varmap_tgt)
    }

    /// Sets the parameters of the online networks.
    pub fn import(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        import_vars(&self.varmap, tensors)
    }

    /// Sets the parameters of the target networks.
    pub fn import_target(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        import_vars(&self.varmap_tgt, tensors)
    }
}

/// Element-wise minimum over action values.
pub fn min_q(qs: &[Tensor]) -> Result<Tensor> {
    Ok(Tensor::stack(qs, 0)?.min(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};

    fn critic() -> Result<CriticPair<Mlp>> {
        let config = CriticConfig::default().q_config(MlpConfig::new(4, vec![16], 1, false));
        CriticPair::build(config, 1e-2, &Device::Cpu)
    }

    fn inputs() -> Result<(Tensor, Tensor)> {
        let obs = Tensor::randn(0f32, 1f32, (8, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1f32, (8, 1), &Device::Cpu)?;
        Ok((obs, act))
    }

    fn values(qs: Vec<Tensor>) -> Result<Vec<Vec<f32>>> {
        qs.iter()
            .map(|q| -> Result<Vec<f32>> { Ok(q.to_vec1::<f32>()?) })
            .collect()
    }

    #[test]
    fn test_target_starts_as_copy() -> Result<()> {
        let critic = critic()?;
        let (obs, act) = inputs()?;
        let qs = critic.forward(&obs, &act)?;
        assert_eq!(qs.len(), N_CRITICS);
        assert_eq!(qs[0].dims(), &[8]);
        assert_eq!(values(qs)?, values(critic.forward_target(&obs, &act)?)?);
        Ok(())
    }

    #[test]
    fn test_target_is_not_trained() -> Result<()> {
        let mut critic = critic()?;
        let (obs, act) = inputs()?;
        let before = values(critic.forward_target(&obs, &act)?)?;

        let loss = critic.forward(&obs, &act)?[0].sqr()?.mean_all()?;
        critic.backward_step(&loss)?;
        assert_eq!(before, values(critic.forward_target(&obs, &act)?)?);
        assert_ne!(before, values(critic.forward(&obs, &act)?)?);

        // tau = 1 makes the target an exact copy again.
        critic.polyak_update(1.0)?;
        assert_eq!(
            values(critic.forward(&obs, &act)?)?,
            values(critic.forward_target(&obs, &act)?)?
        );
        Ok(())
    }

    #[test]
    fn test_min_q() -> Result<()> {
        let q1 = Tensor::new(&[1f32, 5.0, -2.0], &Device::Cpu)?;
        let q2 = Tensor::new(&[3f32, 4.0, -3.0], &Device::Cpu)?;
        assert_eq!(min_q(&[q1, q2])?.to_vec1::<f32>()?, vec![1.0, 4.0, -3.0]);
        Ok(())
    }
}
