use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use super::RecordWriter;

/// Appends batches to a CSV file by reading back the rows already on disk,
/// concatenating the new ones and rewriting the whole file.
pub struct CsvAppendWriter<R> {
    path: PathBuf,
    _record: PhantomData<fn(&R)>,
}

impl<R> Clone for CsvAppendWriter<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _record: PhantomData,
        }
    }
}

impl<R> CsvAppendWriter<R> {
    pub fn new(folder: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: folder.as_ref().join(file_name),
            _record: PhantomData,
        }
    }
}

impl<R: Serialize + DeserializeOwned> CsvAppendWriter<R> {
    fn read_existing(&self) -> Result<Vec<R>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        reader
            .deserialize()
            .collect::<Result<Vec<R>, _>>()
            .with_context(|| format!("Failed to read rows from {}", self.path.display()))
    }
}

impl<R: Serialize + DeserializeOwned> RecordWriter<R> for CsvAppendWriter<R> {
    fn write(&mut self, batch: &[R]) -> Result<()> {
        if let Some(folder) = self.path.parent() {
            fs::create_dir_all(folder)
                .with_context(|| format!("Failed to create folder {}", folder.display()))?;
        }

        let existed = self.path.is_file();
        let existing = if existed { self.read_existing()? } else { Vec::new() };

        let staging = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&staging)
                .with_context(|| format!("Failed to create {}", staging.display()))?;
            for row in existing.iter().chain(batch) {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        if existed {
            info!(
                "Data appended to existing CSV file {} ({} + {} rows)",
                self.path.display(),
                existing.len(),
                batch.len()
            );
        } else {
            info!("CSV file created and data saved to {}", self.path.display());
        }
        Ok(())
    }

    fn target(&self) -> &Path {
        &self.path
    }
}
