//! Training algorithm driven by [`TrainingLoop`](crate::TrainingLoop).
use crate::{record::Record, GroupSelection, TrainingState};
use anyhow::Result;
use std::path::Path;

/// The algorithm-specific phases of an off-policy training loop.
///
/// [`TrainingLoop`](crate::TrainingLoop) owns an implementation of this
/// trait and calls [`Algorithm::collect_rollouts`] and [`Algorithm::train`]
/// once per iteration. Both phases receive the [`TrainingState`] of the run
/// and are the only places, besides the loop itself, where it changes.
pub trait Algorithm {
    /// Observation given to [`Algorithm::predict`].
    type Obs;

    /// Action returned by [`Algorithm::predict`].
    type Act;

    /// Hidden state of recurrent policies.
    type HiddenState;

    /// (Re)builds all components of the algorithm.
    fn reset(&mut self) -> Result<()>;

    /// Checks the configuration before a run.
    ///
    /// Errors returned here abort [`TrainingLoop::learn`] before the first
    /// iteration.
    ///
    /// [`TrainingLoop::learn`]: crate::TrainingLoop::learn
    fn validate(&self) -> Result<()>;

    /// Registers the keys of the diagnostics published by
    /// [`Algorithm::train`], in the order they should appear in logs.
    fn register_log_items(&self, log_items: &mut Record);

    /// Interacts with the environment and stores experience.
    ///
    /// Advances `state.time_steps` by the number of environment steps taken.
    fn collect_rollouts(&mut self, state: &mut TrainingState) -> Result<()>;

    /// Updates the model parameters and publishes diagnostics.
    ///
    /// Advances `state.num_updates` by the number of gradient updates.
    fn train(&mut self, state: &mut TrainingState, log_items: &mut Record) -> Result<()>;

    /// Returns an action for the given observation along with the next
    /// hidden state, `None` for non-recurrent policies.
    fn predict(
        &mut self,
        obs: &Self::Obs,
        deterministic: bool,
        state: Option<&Self::HiddenState>,
        episode_start: Option<&[bool]>,
    ) -> Result<(Self::Act, Option<Self::HiddenState>)>;

    /// Saves the selected groups of the algorithm's state to a file.
    fn save(&self, path: &Path, groups: &GroupSelection) -> Result<()>;

    /// Loads the selected groups present in a file. Groups absent in the
    /// file are left unchanged.
    fn load(&mut self, path: &Path, groups: &GroupSelection) -> Result<()>;

    /// File extension of checkpoints written by [`Algorithm::save`].
    fn checkpoint_extension(&self) -> &'static str;
}
