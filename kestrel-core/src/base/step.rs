//! Environment step.
use super::Env;

/// Represents an action, observation and reward tuple `(a_t, o_t+1, r_t)`.
///
/// An environment emits a [`Step`] object at every interaction step.
/// Together with the observation the action was taken at, it forms a
/// transition `(o_t, a_t, o_t+1, r_t, is_done_t)`.
pub struct Step<E: Env> {
    /// Action.
    pub act: E::Act,

    /// Observation following the action.
    pub obs: E::Obs,

    /// Reward, one per environment.
    pub reward: Vec<f32>,

    /// Flag denoting the end of an episode, one per environment.
    pub is_done: Vec<i8>,

    /// Observation to continue from when some episodes ended and the
    /// corresponding environments were reset. `None` means `obs`.
    pub init_obs: Option<E::Obs>,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: Vec<f32>,
        is_done: Vec<i8>,
        init_obs: Option<E::Obs>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_done,
            init_obs,
        }
    }

    #[inline]
    /// Returns `true` if the episode of any environment ended.
    pub fn is_done_any(&self) -> bool {
        self.is_done.iter().any(|&d| d == 1)
    }

    /// Observation the next action should be taken at.
    pub fn next_obs(&self) -> E::Obs {
        self.init_obs.as_ref().unwrap_or(&self.obs).clone()
    }
}
