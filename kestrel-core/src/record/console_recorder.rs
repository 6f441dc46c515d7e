use super::{Record, Recorder};
use anyhow::Result;
use std::io::{self, Stdout, Write};

/// Width of a table cell.
const CELL_WIDTH: usize = 12;

/// Prints each record as a small table, a header line and a value line.
///
/// Cells are right-aligned with width 12.
pub struct ConsoleRecorder<W: Write = Stdout> {
    out: W,
}

impl ConsoleRecorder<Stdout> {
    /// Creates a recorder printing to the standard output.
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for ConsoleRecorder<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleRecorder<W> {
    /// Creates a recorder printing to the given writer.
    pub fn from_writer(out: W) -> Self {
        Self { out }
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Recorder for ConsoleRecorder<W> {
    fn write(&mut self, record: &Record) -> Result<()> {
        let header = record
            .keys()
            .map(|k| format!("{:>width$}", k, width = CELL_WIDTH))
            .collect::<Vec<_>>()
            .join(" ");
        let row = record
            .iter()
            .map(|(_, v)| v.to_cell(CELL_WIDTH))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{}", header)?;
        writeln!(self.out, "{}", row)?;
        self.out.flush()?;
        Ok(())
    }
}
