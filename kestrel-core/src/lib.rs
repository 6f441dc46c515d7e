#![warn(missing_docs)]
//! Backend-independent off-policy training loop.
//!
//! [`TrainingLoop`] drives an [`Algorithm`] through iterations of
//! experience collection and parameter updates, monitoring the
//! algorithm's diagnostics and checkpointing its state on iteration
//! cadences. The crate does not depend on any tensor library; see
//! `kestrel-candle-agent` for a Soft Actor-Critic implementation.
pub mod checkpoint;
pub mod dummy;
pub mod error;
pub mod generic_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Algorithm, Env, ExperienceBufferBase, ReplayBufferBase, Step, TransitionBatch,
};
pub use checkpoint::GroupSelection;

mod state;
pub use state::TrainingState;

mod training_loop;
pub use training_loop::{TrainingLoop, TrainingLoopConfig};
