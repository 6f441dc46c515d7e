use super::{Record, Recorder};
use anyhow::Result;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Appends records as rows of a tab separated text file.
///
/// [`Recorder::reset`] truncates the file and writes the header line.
/// Every [`Recorder::write`] appends one line with the values in the order
/// of the record, formatted with [`RecordValue`](super::RecordValue)'s
/// `Display`.
pub struct TsvRecorder {
    path: PathBuf,
    file: Option<File>,
}

impl TsvRecorder {
    /// Creates a recorder for the given file. Nothing is written until
    /// [`Recorder::reset`] is called.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        Ok(self.file.insert(file))
    }
}

impl Recorder for TsvRecorder {
    fn reset(&mut self, keys: &[String]) -> Result<()> {
        let mut file = File::create(&self.path)?;
        writeln!(file, "{}", keys.join("\t"))?;
        file.flush()?;
        self.file = None;
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        let line = record
            .iter()
            .map(|(_, v)| v.to_string())
            .collect::<Vec<_>>()
            .join("\t");
        let file = self.file()?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordValue;
    use tempdir::TempDir;

    #[test]
    fn test_header_and_rows() -> Result<()> {
        let dir = TempDir::new("tsv_recorder")?;
        let path = dir.path().join("run_log.txt");
        let mut recorder = TsvRecorder::new(&path);
        let keys = vec!["time_steps".to_string(), "loss".to_string(), "auto".to_string()];
        recorder.reset(&keys)?;

        recorder.write(&Record::from_slice(&[
            ("time_steps", RecordValue::Int(10)),
            ("loss", RecordValue::Null),
            ("auto", RecordValue::Bool(false)),
        ]))?;
        recorder.write(&Record::from_slice(&[
            ("time_steps", RecordValue::Int(20)),
            ("loss", RecordValue::Scalar(0.25)),
            ("auto", RecordValue::Bool(true)),
        ]))?;

        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text, "time_steps\tloss\tauto\n10\t\t0\n20\t0.25\t1\n");

        // A second reset starts a fresh file.
        recorder.reset(&keys)?;
        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text, "time_steps\tloss\tauto\n");
        Ok(())
    }
}
