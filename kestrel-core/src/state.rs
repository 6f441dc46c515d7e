//! Progress counters of a training run.

/// Counters of a training run.
///
/// A single value is owned by [`TrainingLoop`](crate::TrainingLoop) and
/// passed by mutable reference to every phase. All counters are
/// non-decreasing within a run and are zeroed only by
/// [`TrainingLoop::reset`](crate::TrainingLoop::reset).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrainingState {
    /// Number of completed iterations of the training loop.
    pub iteration: usize,

    /// Number of environment steps, summed over parallel environments.
    pub time_steps: usize,

    /// Number of gradient updates.
    pub num_updates: usize,
}
