use mfs_core::models::Datum;
use mfs_core::ports::Backend;
use std::io::Write;
use std::path::PathBuf;

/// Where the datum stream goes.
#[derive(clap::Args)]
pub struct IoArgs {
    /// Output file for the datum stream; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl IoArgs {
    pub fn write(&self) -> anyhow::Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
            None => Box::new(std::io::stdout().lock()),
        })
    }
}

/// A backend serializing each datum as one JSON line.
pub struct JsonBackend<W: Write> {
    writer: W,
}

impl<W: Write> JsonBackend<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> Backend for JsonBackend<W> {
    fn notify(&mut self, batch: &[Datum]) -> mfs_core::Result<()> {
        for datum in batch {
            serde_json::to_writer(&mut self.writer, datum)
                .map_err(|err| std::io::Error::other(err.to_string()))?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines"
    }

    fn close(&mut self) -> mfs_core::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
