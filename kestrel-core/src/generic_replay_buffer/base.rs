//! FIFO ring buffer of transitions.
use super::{BatchBase, GenericTransitionBatch, SimpleReplayBufferConfig};
use crate::{error::RlError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A replay buffer holding at most `capacity` transitions.
///
/// Pushing into a full buffer overwrites the oldest transitions. Batches
/// are sampled uniformly with replacement.
pub struct SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,

    /// Current insertion index.
    i: usize,

    /// Current number of stored transitions.
    size: usize,

    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    action_sizes: Vec<usize>,
    rng: StdRng,
}

impl<O, A> SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    #[inline]
    fn push_slice<T: Copy>(buf: &mut [T], i: usize, b: &[T]) {
        let capacity = buf.len();
        for (k, v) in b.iter().enumerate() {
            buf[(i + k) % capacity] = *v;
        }
    }

    fn sample_slice<T: Copy>(buf: &[T], ixs: &[usize]) -> Vec<T> {
        ixs.iter().map(|ix| buf[*ix]).collect()
    }

    /// Capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the sum of all rewards in the buffer.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }
}

impl<O, A> ExperienceBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    /// Adds transitions of all parallel environments.
    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let len = tr.len();
        let (obs, act, next_obs, reward, is_done) = tr.unpack();
        self.obs.push(self.i, obs)?;
        self.act.push(self.i, act)?;
        self.next_obs.push(self.i, next_obs)?;
        Self::push_slice(&mut self.reward, self.i, &reward);
        Self::push_slice(&mut self.is_done, self.i, &is_done);

        self.i = (self.i + len) % self.capacity;
        self.size = (self.size + len).min(self.capacity);
        Ok(())
    }
}

impl<O, A> ReplayBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = SimpleReplayBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity;
        Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            action_sizes: config.action_sizes.clone(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if self.size < size || self.size == 0 {
            return Err(RlError::InsufficientTransitions {
                requested: size,
                available: self.size,
            }
            .into());
        }

        let ixs = (0..size)
            .map(|_| self.rng.gen_range(0..self.size))
            .collect::<Vec<_>>();

        Ok(Self::Batch {
            obs: self.obs.sample(&ixs)?,
            act: self.act.sample(&ixs)?,
            next_obs: self.next_obs.sample(&ixs)?,
            reward: Self::sample_slice(&self.reward, &ixs),
            is_done: Self::sample_slice(&self.is_done, &ixs),
        })
    }

    fn action_sizes(&self) -> Vec<usize> {
        self.action_sizes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scalar items kept in a vector.
    struct VecBatch(Vec<f32>);

    impl BatchBase for VecBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.; capacity])
        }

        fn push(&mut self, ix: usize, data: Self) -> Result<()> {
            let capacity = self.0.len();
            for (k, v) in data.0.into_iter().enumerate() {
                self.0[(ix + k) % capacity] = v;
            }
            Ok(())
        }

        fn sample(&self, ixs: &[usize]) -> Result<Self> {
            Ok(Self(ixs.iter().map(|ix| self.0[*ix]).collect()))
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn transition(v: &[f32]) -> GenericTransitionBatch<VecBatch, VecBatch> {
        GenericTransitionBatch {
            obs: VecBatch(v.to_vec()),
            act: VecBatch(v.iter().map(|x| -x).collect()),
            next_obs: VecBatch(v.iter().map(|x| x + 1.0).collect()),
            reward: v.to_vec(),
            is_done: v.iter().map(|x| (*x as i64 % 2) as i8).collect(),
        }
    }

    fn build(capacity: usize) -> SimpleReplayBuffer<VecBatch, VecBatch> {
        let config = SimpleReplayBufferConfig::default()
            .capacity(capacity)
            .action_sizes(vec![2, 3]);
        SimpleReplayBuffer::build(&config)
    }

    #[test]
    fn test_fifo_eviction() -> Result<()> {
        let mut buffer = build(4);
        buffer.push(transition(&[1.0, 2.0]))?;
        buffer.push(transition(&[3.0, 4.0]))?;
        assert_eq!(buffer.len(), 4);
        buffer.push(transition(&[5.0, 6.0, 7.0]))?;
        assert_eq!(buffer.len(), 4);

        // 1, 2 and 3 were overwritten.
        assert_eq!(buffer.sum_rewards(), 4.0 + 5.0 + 6.0 + 7.0);
        Ok(())
    }

    #[test]
    fn test_batch_is_consistent() -> Result<()> {
        let mut buffer = build(8);
        buffer.push(transition(&[1.0, 2.0, 3.0]))?;
        let err = buffer.batch(16).map(|b| b.len()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RlError>(),
            Some(RlError::InsufficientTransitions { requested: 16, available: 3 })
        ));

        let (obs, act, next_obs, reward, is_done) = buffer.batch(3)?.unpack();
        for k in 0..3 {
            assert!([1.0, 2.0, 3.0].contains(&obs.0[k]));
            assert_eq!(act.0[k], -obs.0[k]);
            assert_eq!(next_obs.0[k], obs.0[k] + 1.0);
            assert_eq!(reward[k], obs.0[k]);
            assert_eq!(is_done[k], (obs.0[k] as i64 % 2) as i8);
        }
        assert_eq!(buffer.action_sizes(), vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = build(8);
        assert!(buffer.is_empty());
        assert!(buffer.batch(0).is_err());
    }
}
