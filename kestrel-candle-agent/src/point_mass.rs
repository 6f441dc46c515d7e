//! A point mass on a line, pushed towards the origin.
//!
//! Small enough to train [`Sac`](crate::sac::Sac) in seconds, it is used
//! by the tests and the demo of this crate.
use anyhow::Result;
use candle_core::{Device, Tensor};
use kestrel_core::{Env, Step};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Dimension of an observation: position, velocity and elapsed fraction of
/// the episode.
pub const OBS_DIM: usize = 3;

/// Dimension of an action: the force applied to the mass.
pub const ACT_DIM: usize = 1;

const DT: f32 = 0.1;
const MAX_POS: f32 = 2.0;

/// Configuration of [`PointMass`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PointMassConfig {
    /// Number of parallel environments.
    pub num_envs: usize,

    /// Number of steps of an episode.
    pub episode_len: usize,
}

impl Default for PointMassConfig {
    fn default() -> Self {
        Self {
            num_envs: 1,
            episode_len: 50,
        }
    }
}

impl PointMassConfig {
    /// Sets the number of parallel environments.
    pub fn num_envs(mut self, v: usize) -> Self {
        self.num_envs = v;
        self
    }

    /// Sets the length of an episode.
    pub fn episode_len(mut self, v: usize) -> Self {
        self.episode_len = v;
        self
    }
}

/// Observation of [`PointMass`], of shape `[num_envs, OBS_DIM]`.
#[derive(Clone, Debug)]
pub struct PointMassObs(pub Tensor);

impl From<PointMassObs> for Tensor {
    fn from(obs: PointMassObs) -> Self {
        obs.0
    }
}

/// Action of [`PointMass`], of shape `[num_envs, ACT_DIM]`.
#[derive(Clone, Debug)]
pub struct PointMassAct(pub Tensor);

impl From<PointMassAct> for Tensor {
    fn from(act: PointMassAct) -> Self {
        act.0
    }
}

impl From<Tensor> for PointMassAct {
    fn from(t: Tensor) -> Self {
        Self(t)
    }
}

/// Point masses on a line.
///
/// The reward is `-(pos^2 + 0.1 * force^2)`. Episodes end after
/// `episode_len` steps, when the environment restarts from a random
/// position.
pub struct PointMass {
    config: PointMassConfig,
    rng: StdRng,
    pos: Vec<f32>,
    vel: Vec<f32>,
    t: Vec<usize>,
}

impl PointMass {
    fn reset_one(&mut self, i: usize) {
        self.pos[i] = self.rng.gen_range(-1.0..1.0);
        self.vel[i] = 0.0;
        self.t[i] = 0;
    }

    fn obs(&self) -> Result<PointMassObs> {
        let n = self.config.num_envs;
        let len = self.config.episode_len.max(1) as f32;
        let data = (0..n)
            .flat_map(|i| vec![self.pos[i], self.vel[i], self.t[i] as f32 / len])
            .collect::<Vec<_>>();
        Ok(PointMassObs(Tensor::from_vec(data, (n, OBS_DIM), &Device::Cpu)?))
    }
}

impl Env for PointMass {
    type Config = PointMassConfig;
    type Obs = PointMassObs;
    type Act = PointMassAct;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let n = config.num_envs;
        Ok(Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed as u64),
            pos: vec![0.0; n],
            vel: vec![0.0; n],
            t: vec![0; n],
        })
    }

    fn num_envs(&self) -> usize {
        self.config.num_envs
    }

    fn reset(&mut self) -> Result<PointMassObs> {
        for i in 0..self.config.num_envs {
            self.reset_one(i);
        }
        self.obs()
    }

    fn step(&mut self, act: &PointMassAct) -> Result<Step<Self>> {
        let n = self.config.num_envs;
        let force = act.0.to_device(&Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?;
        anyhow::ensure!(
            force.len() == n * ACT_DIM,
            "Expected {} actions, got {}",
            n * ACT_DIM,
            force.len()
        );

        let mut reward = Vec::with_capacity(n);
        let mut is_done = Vec::with_capacity(n);
        for (i, f) in force.iter().enumerate() {
            let f = f.max(-1.0).min(1.0);
            self.vel[i] += DT * f;
            self.pos[i] = (self.pos[i] + DT * self.vel[i]).max(-MAX_POS).min(MAX_POS);
            self.t[i] += 1;
            reward.push(-(self.pos[i] * self.pos[i] + 0.1 * f * f));
            is_done.push((self.t[i] >= self.config.episode_len) as i8);
        }
        let obs = self.obs()?;

        let init_obs = if is_done.iter().any(|&d| d == 1) {
            for i in 0..n {
                if is_done[i] == 1 {
                    self.reset_one(i);
                }
            }
            Some(self.obs()?)
        } else {
            None
        };

        Ok(Step::new(obs, act.clone(), reward, is_done, init_obs))
    }

    fn sample_action(&mut self) -> Result<PointMassAct> {
        let n = self.config.num_envs;
        let data = (0..n * ACT_DIM)
            .map(|_| self.rng.gen_range(-1.0f32..1.0))
            .collect::<Vec<_>>();
        Ok(PointMassAct(Tensor::from_vec(data, (n, ACT_DIM), &Device::Cpu)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episodes_restart() -> Result<()> {
        let config = PointMassConfig::default().num_envs(2).episode_len(3);
        let mut env = PointMass::build(&config, 42)?;
        let obs = env.reset()?;
        assert_eq!(obs.0.dims(), &[2, OBS_DIM]);

        for k in 1..=3 {
            let act = env.sample_action()?;
            assert_eq!(act.0.dims(), &[2, ACT_DIM]);
            let step = env.step(&act)?;
            assert_eq!(step.reward.len(), 2);
            assert!(step.reward.iter().all(|r| *r <= 0.0));
            if k < 3 {
                assert!(!step.is_done_any());
                assert!(step.init_obs.is_none());
            } else {
                assert_eq!(step.is_done, vec![1, 1]);
                // The continuing observation starts a new episode.
                let init_obs = step.next_obs().0.to_vec2::<f32>()?;
                assert!(init_obs.iter().all(|o| o[1] == 0.0 && o[2] == 0.0));
            }
        }
        Ok(())
    }

    #[test]
    fn test_wrong_number_of_actions() -> Result<()> {
        let mut env = PointMass::build(&PointMassConfig::default().num_envs(2), 0)?;
        env.reset()?;
        let act = PointMassAct(Tensor::zeros((3, 1), candle_core::DType::F32, &Device::Cpu)?);
        assert!(env.step(&act).is_err());
        Ok(())
    }
}
