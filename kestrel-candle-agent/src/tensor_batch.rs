use anyhow::Result;
use candle_core::{Device, IndexOp, Tensor};
use kestrel_core::generic_replay_buffer::{BatchBase, SimpleReplayBuffer};

/// Replay buffer of tensor observations and actions.
pub type TensorReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;

/// A buffer consisting of a [`Tensor`], indexed along its first dimension.
///
/// The storage is allocated on the CPU at the first push, with the shape
/// `[capacity, data.dims()[1..]]`.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Wraps a tensor whose first dimension indexes items.
    pub fn from_tensor(t: Tensor) -> Self {
        let capacity = t.dims().first().copied().unwrap_or(0);
        Self {
            buf: Some(t),
            capacity,
        }
    }

    /// Returns the inner tensor.
    pub fn into_tensor(self) -> Result<Tensor> {
        match self.buf {
            Some(buf) => Ok(buf),
            None => anyhow::bail!("The batch holds no data"),
        }
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    fn push(&mut self, index: usize, data: Self) -> Result<()> {
        let data = match data.buf {
            Some(data) => data.to_device(&Device::Cpu)?,
            None => return Ok(()),
        };
        let batch_size = data.dims()[0];
        if batch_size == 0 {
            return Ok(());
        }

        let buf = match self.buf.take() {
            Some(buf) => buf,
            None => {
                let mut shape = data.dims().to_vec();
                shape[0] = self.capacity;
                Tensor::zeros(shape, data.dtype(), &Device::Cpu)?
            }
        };
        let buf = self.buf.insert(buf);

        if index + batch_size > self.capacity {
            let n = self.capacity - index;
            buf.slice_set(&data.i((..n,))?, 0, index)?;
            buf.slice_set(&data.i((n..,))?, 0, 0)?;
        } else {
            buf.slice_set(&data, 0, index)?;
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        let buf = match &self.buf {
            Some(buf) => buf,
            None => anyhow::bail!("Sampling from an empty buffer"),
        };
        let capacity = ixs.len();
        let ixs = ixs.iter().map(|x| *x as u32).collect::<Vec<_>>();
        let ixs = Tensor::from_vec(ixs, &[capacity], buf.device())?;
        Ok(Self {
            buf: Some(buf.index_select(&ixs, 0)?),
            capacity,
        })
    }

    fn len(&self) -> usize {
        match &self.buf {
            Some(buf) => buf.dims()[0],
            None => 0,
        }
    }
}
