//! Configuration of [`TrainingLoop`](super::TrainingLoop).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`TrainingLoop`](super::TrainingLoop).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainingLoopConfig {
    /// Prefix of the log file and checkpoint files.
    ///
    /// `None` or an empty string disables both.
    pub output_path: Option<String>,

    /// Print a table of the log items to the standard output when monitoring.
    pub console: bool,
}

impl Default for TrainingLoopConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            console: true,
        }
    }
}

impl TrainingLoopConfig {
    /// Sets the prefix of output files.
    pub fn output_path(mut self, v: impl Into<String>) -> Self {
        self.output_path = Some(v.into());
        self
    }

    /// Enables or disables the console table.
    pub fn console(mut self, v: bool) -> Self {
        self.console = v;
        self
    }

    /// Constructs [`TrainingLoopConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainingLoopConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
