//! Naming of checkpoint files and selection of the parts they contain.
use chrono::Local;
use std::{collections::BTreeSet, path::PathBuf};

/// Selects the named groups of an algorithm's state to save or load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    /// Every group.
    All,

    /// Only the listed groups.
    Only(BTreeSet<String>),
}

impl GroupSelection {
    /// Selects the given groups.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if the group is selected.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(name),
        }
    }
}

impl Default for GroupSelection {
    fn default() -> Self {
        Self::All
    }
}

/// Local wall clock formatted as `%Y%m%d_%H%M%S`.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Returns `{output_path}_{timestamp}_{time_steps}.{ext}`.
pub fn checkpoint_path(output_path: &str, timestamp: &str, time_steps: usize, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}_{}_{}.{}", output_path, timestamp, time_steps, ext))
}

/// Returns `{output_path}_log.txt`.
pub fn log_path(output_path: &str) -> PathBuf {
    PathBuf::from(format!("{}_log.txt", output_path))
}
