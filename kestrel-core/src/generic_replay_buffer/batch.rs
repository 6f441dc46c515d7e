//! Generic batches of transitions.
use crate::TransitionBatch;
use anyhow::Result;

/// Storage of observations or actions, indexed along the first dimension.
pub trait BatchBase {
    /// Creates an empty storage for `capacity` items.
    fn new(capacity: usize) -> Self;

    /// Writes `data` starting at index `ix`, wrapping around at the end of
    /// the storage.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Gathers the items at the given indices.
    fn sample(&self, ixs: &[usize]) -> Result<Self>
    where
        Self: Sized;

    /// Number of items in `self` along the first dimension.
    fn len(&self) -> usize;
}

/// A batch of transitions `(o_t, a_t, o_t+1, r_t, is_done_t)`.
///
/// Also used as the item pushed into a
/// [`SimpleReplayBuffer`](super::SimpleReplayBuffer), in which case its
/// length is the number of parallel environments.
pub struct GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: A,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Episode end flags.
    pub is_done: Vec<i8>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(self) -> (Self::ObsBatch, Self::ActBatch, Self::ObsBatch, Vec<f32>, Vec<i8>) {
        (self.obs, self.act, self.next_obs, self.reward, self.is_done)
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Self::ActBatch {
        &self.act
    }

    fn next_obs(&self) -> &Self::ObsBatch {
        &self.next_obs
    }

    fn reward(&self) -> &Vec<f32> {
        &self.reward
    }

    fn is_done(&self) -> &Vec<i8> {
        &self.is_done
    }
}
