//! Environment.
use super::Step;
use anyhow::Result;

/// Represents an environment, possibly a set of parallel environments
/// advanced in lockstep.
///
/// The first dimension of observations, actions, rewards and flags is the
/// number of parallel environments, see [`Env::num_envs`].
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Clone;

    /// Action of the environment.
    type Act: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// The number of environments advanced by a single call of [`Env::step`].
    fn num_envs(&self) -> usize;

    /// Resets all environments and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performs an environment step.
    ///
    /// Environments whose episode ends are expected to reset themselves and
    /// report the observation to continue from in [`Step::init_obs`].
    fn step(&mut self, act: &Self::Act) -> Result<Step<Self>>
    where
        Self: Sized;

    /// Samples an exploratory action, not related to any trained policy.
    fn sample_action(&mut self) -> Result<Self::Act>;
}
