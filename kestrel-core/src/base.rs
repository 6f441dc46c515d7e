//! Core interfaces: environments, replay buffers and training algorithms.
mod algorithm;
mod batch;
mod env;
mod replay_buffer;
mod step;
pub use algorithm::Algorithm;
pub use batch::TransitionBatch;
pub use env::Env;
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
pub use step::Step;
