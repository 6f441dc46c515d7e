//! Soft Actor-Critic trainer implemented with [candle](https://crates.io/crates/candle-core).
//!
//! [`sac::Sac`] implements [`kestrel_core::Algorithm`] and is driven by
//! [`kestrel_core::TrainingLoop`].
pub mod mlp;
pub mod model;
pub mod opt;
pub mod point_mass;
pub mod sac;
mod tensor_batch;
pub mod util;
use anyhow::Result;
use serde::{Deserialize, Serialize};
pub use tensor_batch::{TensorBatch, TensorReplayBuffer};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    /// Returns the corresponding [`candle_core::Device`].
    ///
    /// Fails if a CUDA device is requested and not available.
    pub fn build(&self) -> Result<candle_core::Device> {
        Ok(match self {
            Self::Cpu => candle_core::Device::Cpu,
            Self::Cuda(n) => candle_core::Device::new_cuda(*n)?,
        })
    }
}
