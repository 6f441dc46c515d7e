//! Generic replay buffer for arbitrary observation and action types.
//!
//! [`SimpleReplayBuffer`] is a FIFO ring buffer. Observations and actions
//! are stored in types implementing [`BatchBase`], for example a tensor
//! whose first dimension indexes transitions.
//!
//! ```ignore
//! let config = SimpleReplayBufferConfig::default()
//!     .capacity(10000)
//!     .seed(42)
//!     .action_sizes(vec![1]);
//! let mut buffer = SimpleReplayBuffer::<TensorBatch, TensorBatch>::build(&config);
//! buffer.push(transition)?;
//! let batch = buffer.batch(256)?;
//! ```
mod base;
mod batch;
mod config;
pub use base::SimpleReplayBuffer;
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::SimpleReplayBufferConfig;
