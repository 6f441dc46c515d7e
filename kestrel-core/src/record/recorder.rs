use super::Record;
use anyhow::Result;

/// Writes a record to an output destination with [`Recorder::write`].
pub trait Recorder {
    /// Prepares the output for rows with the given column keys.
    ///
    /// Called when the set of keys is (re)registered. The default
    /// implementation does nothing.
    #[allow(unused_variables)]
    fn reset(&mut self, keys: &[String]) -> Result<()> {
        Ok(())
    }

    /// Writes a record as a row.
    fn write(&mut self, record: &Record) -> Result<()>;
}
