//! A minimal [`Algorithm`] used for tests of the training loop.
use crate::{
    error::RlError,
    record::{Record, RecordValue},
    Algorithm, GroupSelection, TrainingState,
};
use anyhow::Result;
use std::{cell::RefCell, fs, path::{Path, PathBuf}};

/// Counts calls and takes a fixed number of environment steps per
/// collection.
///
/// Publishes `loss = 0.5^num_updates` and `is_warm = num_updates > 1`.
#[derive(Debug, Default)]
pub struct DummyAlgorithm {
    /// Environment steps per call of [`Algorithm::collect_rollouts`].
    pub steps_per_collect: usize,

    /// Makes [`Algorithm::validate`] fail.
    pub invalid: bool,

    /// Number of calls of [`Algorithm::reset`].
    pub num_resets: usize,

    /// Number of calls of [`Algorithm::collect_rollouts`].
    pub num_collects: usize,

    /// Number of calls of [`Algorithm::train`].
    pub num_trains: usize,

    /// Contents of the last loaded file.
    pub loaded: Option<String>,

    saved: RefCell<Vec<PathBuf>>,
}

impl DummyAlgorithm {
    /// Creates an algorithm taking `steps_per_collect` steps per collection.
    pub fn new(steps_per_collect: usize) -> Self {
        Self {
            steps_per_collect,
            ..Default::default()
        }
    }

    /// Paths passed to [`Algorithm::save`].
    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.saved.borrow().clone()
    }
}

impl Algorithm for DummyAlgorithm {
    type Obs = f32;
    type Act = f32;
    type HiddenState = ();

    fn reset(&mut self) -> Result<()> {
        self.num_resets += 1;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.invalid {
            return Err(RlError::Config("invalid dummy algorithm".to_string()).into());
        }
        Ok(())
    }

    fn register_log_items(&self, log_items: &mut Record) {
        log_items.register("loss");
        log_items.register("is_warm");
    }

    fn collect_rollouts(&mut self, state: &mut TrainingState) -> Result<()> {
        self.num_collects += 1;
        state.time_steps += self.steps_per_collect;
        Ok(())
    }

    fn train(&mut self, state: &mut TrainingState, log_items: &mut Record) -> Result<()> {
        self.num_trains += 1;
        state.num_updates += 1;
        let loss = 0.5f32.powi(state.num_updates as i32);
        log_items.insert("loss", RecordValue::Scalar(loss));
        log_items.insert("is_warm", RecordValue::Bool(state.num_updates > 1));
        Ok(())
    }

    fn predict(
        &mut self,
        obs: &f32,
        _deterministic: bool,
        _state: Option<&()>,
        _episode_start: Option<&[bool]>,
    ) -> Result<(f32, Option<()>)> {
        Ok((2.0 * obs, None))
    }

    fn save(&self, path: &Path, groups: &GroupSelection) -> Result<()> {
        fs::write(path, format!("{:?}", groups))?;
        self.saved.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn load(&mut self, path: &Path, _groups: &GroupSelection) -> Result<()> {
        self.loaded = Some(fs::read_to_string(path)?);
        Ok(())
    }

    fn checkpoint_extension(&self) -> &'static str {
        "dummy"
    }
}
