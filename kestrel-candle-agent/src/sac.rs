//! Soft actor-critic (SAC) agent.
//!
//! Each gradient step of [`Sac`] updates, in this order, the entropy
//! coefficient, the critics towards the soft Q target and the actor, then
//! moves the target critics with a Polyak update every
//! `target_update_interval` steps.
mod actor;
pub mod archive;
mod base;
mod config;
mod critic;
mod ent_coef;
pub use actor::{Actor, ActorConfig};
pub use base::{soft_q_target, Sac};
pub use config::SacConfig;
pub use critic::{min_q, CriticConfig, CriticPair, N_CRITICS};
pub use ent_coef::{default_target_entropy, EntCoef, EntCoefMode};
