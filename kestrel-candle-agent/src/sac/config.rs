//! Configuration of SAC agent.
use super::{ActorConfig, CriticConfig, EntCoefMode};
use crate::Device;
use anyhow::Result;
use kestrel_core::{error::RlError, generic_replay_buffer::SimpleReplayBufferConfig};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Constructs [Sac](super::Sac).
///
/// `QC` and `PC` are the configurations of the action-value function and
/// the policy network.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacConfig<QC, PC> {
    /// Number of transitions collected with exploratory actions before the
    /// first update.
    pub learning_starts: usize,

    /// Number of transitions in a batch.
    pub batch_size: usize,

    /// Learning rate of all optimizers.
    pub lr: f64,

    /// Coefficient of the Polyak update of the target critics.
    pub tau: f64,

    /// Discount factor.
    pub gamma: f64,

    /// Initial value of the entropy coefficient, or its value if
    /// `auto_ent_coef` is `false`.
    pub ent_coef: f64,

    /// Tunes the entropy coefficient automatically.
    pub auto_ent_coef: bool,

    /// Target entropy. `-prod(action_sizes)` if `None`.
    pub target_entropy: Option<f64>,

    /// Number of environment steps per iteration.
    pub train_freq: usize,

    /// Number of gradient steps per iteration.
    pub gradient_steps: usize,

    /// Interval of the Polyak update in gradient steps.
    pub target_update_interval: usize,

    /// Configuration of the actor.
    pub actor_config: ActorConfig<PC>,

    /// Configuration of the critics.
    pub critic_config: CriticConfig<QC>,

    /// Configuration of the replay buffer.
    pub replay_buffer_config: SimpleReplayBufferConfig,

    /// Device of the networks.
    pub device: Device,
}

impl<QC, PC> Default for SacConfig<QC, PC> {
    fn default() -> Self {
        Self {
            learning_starts: 100,
            batch_size: 100,
            lr: 3e-4,
            tau: 0.005,
            gamma: 0.99,
            ent_coef: 1.0,
            auto_ent_coef: true,
            target_entropy: None,
            train_freq: 1,
            gradient_steps: 1,
            target_update_interval: 1,
            actor_config: Default::default(),
            critic_config: Default::default(),
            replay_buffer_config: Default::default(),
            device: Device::Cpu,
        }
    }
}

impl<QC, PC> SacConfig<QC, PC> {
    /// Sets the number of warm-up transitions.
    pub fn learning_starts(mut self, v: usize) -> Self {
        self.learning_starts = v;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Learning rate.
    pub fn lr(mut self, v: f64) -> Self {
        self.lr = v;
        self
    }

    /// Sets soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Initial or fixed entropy coefficient.
    pub fn ent_coef(mut self, v: f64) -> Self {
        self.ent_coef = v;
        self
    }

    /// Tunes the entropy coefficient automatically.
    pub fn auto_ent_coef(mut self, v: bool) -> Self {
        self.auto_ent_coef = v;
        self
    }

    /// Target entropy.
    pub fn target_entropy(mut self, v: f64) -> Self {
        self.target_entropy = Some(v);
        self
    }

    /// Environment steps per iteration.
    pub fn train_freq(mut self, v: usize) -> Self {
        self.train_freq = v;
        self
    }

    /// Gradient steps per iteration.
    pub fn gradient_steps(mut self, v: usize) -> Self {
        self.gradient_steps = v;
        self
    }

    /// Interval of the Polyak update.
    pub fn target_update_interval(mut self, v: usize) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Configuration of actor.
    pub fn actor_config(mut self, v: ActorConfig<PC>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<QC>) -> Self {
        self.critic_config = v;
        self
    }

    /// Configuration of the replay buffer.
    pub fn replay_buffer_config(mut self, v: SimpleReplayBufferConfig) -> Self {
        self.replay_buffer_config = v;
        self
    }

    /// Device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Checks the consistency of the hyper-parameters.
    pub fn validate(&self) -> Result<()> {
        if self.learning_starts < self.batch_size {
            return Err(RlError::Config(format!(
                "learning_starts ({}) must not be smaller than batch_size ({})",
                self.learning_starts, self.batch_size
            ))
            .into());
        }
        if !self.auto_ent_coef && self.target_entropy.is_some() {
            return Err(RlError::Config(
                "target_entropy is given while the entropy coefficient is fixed".to_string(),
            )
            .into());
        }
        if self.replay_buffer_config.capacity < self.batch_size {
            return Err(RlError::Config(format!(
                "replay buffer capacity ({}) must not be smaller than batch_size ({})",
                self.replay_buffer_config.capacity, self.batch_size
            ))
            .into());
        }
        if self.train_freq == 0 {
            return Err(RlError::Config("train_freq must be positive".to_string()).into());
        }
        if self.target_update_interval == 0 {
            return Err(RlError::Config("target_update_interval must be positive".to_string()).into());
        }
        // log(ent_coef) is learned in the automatic mode.
        if self.auto_ent_coef && (self.ent_coef.is_nan() || self.ent_coef <= 0.0) {
            return Err(RlError::Config(format!(
                "ent_coef ({}) must be positive when tuned automatically",
                self.ent_coef
            ))
            .into());
        }
        if !self.auto_ent_coef && (self.ent_coef.is_nan() || self.ent_coef < 0.0) {
            return Err(RlError::Config(format!(
                "ent_coef ({}) must not be negative",
                self.ent_coef
            ))
            .into());
        }
        Ok(())
    }

    /// Mode of the entropy coefficient.
    pub fn ent_coef_mode(&self) -> EntCoefMode {
        match self.auto_ent_coef {
            true => EntCoefMode::Auto {
                init: self.ent_coef,
                target_entropy: self.target_entropy,
            },
            false => EntCoefMode::Fix(self.ent_coef),
        }
    }
}

impl<QC, PC> SacConfig<QC, PC>
where
    QC: Serialize + serde::de::DeserializeOwned,
    PC: Serialize + serde::de::DeserializeOwned,
{
    /// Constructs [SacConfig] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of SAC agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [SacConfig].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of SAC agent into {:?}", path_);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    type Config = SacConfig<MlpConfig, MlpConfig>;

    fn is_config_error(config: &Config) -> bool {
        match config.validate() {
            Ok(()) => false,
            Err(e) => matches!(e.downcast_ref::<RlError>(), Some(RlError::Config(_))),
        }
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        assert!(is_config_error(&Config::default().learning_starts(10).batch_size(32)));
        assert!(is_config_error(
            &Config::default().auto_ent_coef(false).target_entropy(-1.0)
        ));
        assert!(Config::default().target_entropy(-1.0).validate().is_ok());
        assert!(is_config_error(&Config::default().replay_buffer_config(
            SimpleReplayBufferConfig::default().capacity(50)
        )));
        assert!(is_config_error(&Config::default().train_freq(0)));
        assert!(is_config_error(&Config::default().ent_coef(0.0)));
        assert!(is_config_error(&Config::default().ent_coef(f64::NAN)));
        assert!(Config::default().auto_ent_coef(false).ent_coef(0.0).validate().is_ok());
        assert!(is_config_error(&Config::default().auto_ent_coef(false).ent_coef(-0.1)));
    }

    #[test]
    fn test_ent_coef_mode() {
        let config = Config::default().ent_coef(0.1);
        assert_eq!(
            config.ent_coef_mode(),
            EntCoefMode::Auto {
                init: 0.1,
                target_entropy: None
            }
        );
        assert_eq!(
            config.auto_ent_coef(false).ent_coef_mode(),
            EntCoefMode::Fix(0.1)
        );
    }

    #[test]
    fn test_serde_sac_config() -> Result<()> {
        let config = Config::default()
            .learning_starts(1000)
            .gamma(0.98)
            .target_entropy(-2.0)
            .actor_config(ActorConfig::default().pi_config(MlpConfig::new(3, vec![64, 64], 1, false)))
            .critic_config(CriticConfig::default().q_config(MlpConfig::new(4, vec![64, 64], 1, false)));

        let dir = TempDir::new("sac_config")?;
        let path = dir.path().join("sac_config.yaml");
        config.save(&path)?;
        let config_ = Config::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
