use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use super::RecordWriter;

/// Writes the newest record of each batch as a standalone JSON document,
/// replacing the previous file. Earlier records in the batch are superseded
/// snapshots of the same page.
pub struct JsonDocumentWriter<R> {
    path: PathBuf,
    _record: PhantomData<fn(&R)>,
}

impl<R> JsonDocumentWriter<R> {
    pub fn new(folder: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: folder.as_ref().join(file_name),
            _record: PhantomData,
        }
    }
}

impl<R: Serialize> RecordWriter<R> for JsonDocumentWriter<R> {
    fn write(&mut self, batch: &[R]) -> Result<()> {
        let Some(latest) = batch.last() else {
            return Ok(());
        };

        if let Some(folder) = self.path.parent() {
            fs::create_dir_all(folder)
                .with_context(|| format!("Failed to create folder {}", folder.display()))?;
        }

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut out = BufWriter::new(file);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        latest
            .serialize(&mut serializer)
            .context("Failed to serialize snapshot")?;
        out.flush()?;
        Ok(())
    }

    fn target(&self) -> &Path {
        &self.path
    }
}
