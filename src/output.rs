use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::HostRecord;

/// Writes host records as JSON, one document per line unless pretty-printed
pub struct JsonLinesWriter<W: Write> {
    out: W,
    pretty: bool,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self { out, pretty }
    }

    pub fn write(&mut self, host: &HostRecord) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, host)?;
        } else {
            serde_json::to_writer(&mut self.out, host)?;
        }
        self.out
            .write_all(b"\n")
            .context("Failed to write host record")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush().context("Failed to flush output")?;
        Ok(self.out)
    }
}

/// Open `output_path` for writing host records
pub fn create_json_output(output_path: &Path, pretty: bool) -> Result<JsonLinesWriter<BufWriter<File>>> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {:?}", output_path))?;
    Ok(JsonLinesWriter::new(BufWriter::new(file), pretty))
}
