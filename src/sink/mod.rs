//! In-memory session buffer with threshold and final flushes to disk
//!
//! A sink owns the records a loop has produced but not yet written. The loop
//! calls [`IncrementalSink::maybe_flush`] after each append; once the buffer
//! grows past its threshold it is handed to the [`RecordWriter`] and cleared.
//! [`IncrementalSink::flush_final`] runs once when the session ends.
//!
//! A failed write leaves the buffer untouched so nothing is dropped silently;
//! the next flush retries with everything accumulated so far.

mod document;
mod table;

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

pub use document::JsonDocumentWriter;
pub use table::CsvAppendWriter;

/// Persists a batch of records somewhere.
pub trait RecordWriter<R>: Send {
    fn write(&mut self, batch: &[R]) -> Result<()>;

    /// Where the records end up, for log lines
    fn target(&self) -> &Path;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Nothing needed writing
    Idle,
    /// This many records were written and dropped from memory
    Flushed(usize),
    /// The writer failed; the buffer was kept
    Failed,
    /// `flush_final` already ran
    AlreadyFinal,
}

pub struct IncrementalSink<R, W> {
    buffer: Vec<R>,
    threshold: usize,
    writer: W,
    flushes: usize,
    written: usize,
    finalized: bool,
}

impl<R, W: RecordWriter<R>> IncrementalSink<R, W> {
    /// `threshold` is the largest buffer the sink keeps without flushing (at least 1)
    pub fn new(writer: W, threshold: usize) -> Self {
        Self {
            buffer: Vec::new(),
            threshold: threshold.max(1),
            writer,
            flushes: 0,
            written: 0,
            finalized: false,
        }
    }

    pub fn append(&mut self, record: R) {
        self.buffer.push(record);
    }

    /// Flushes when the buffer has grown past the threshold, otherwise does nothing.
    pub fn maybe_flush(&mut self) -> FlushStatus {
        if self.buffer.len() <= self.threshold {
            return FlushStatus::Idle;
        }
        info!(
            buffered = self.buffer.len(),
            threshold = self.threshold,
            "buffer exceeded threshold, saving data"
        );
        self.flush()
    }

    /// Writes whatever is left. Only the first call does anything.
    pub fn flush_final(&mut self) -> FlushStatus {
        if self.finalized {
            warn!(file = %self.writer.target().display(), "final flush requested twice, ignoring");
            return FlushStatus::AlreadyFinal;
        }
        self.finalized = true;

        if self.buffer.is_empty() {
            info!(file = %self.writer.target().display(), "nothing left to save");
            return FlushStatus::Idle;
        }
        self.flush()
    }

    fn flush(&mut self) -> FlushStatus {
        let result = self.writer.write(&self.buffer);
        self.record(result)
    }

    fn record(&mut self, result: Result<()>) -> FlushStatus {
        match result {
            Ok(()) => {
                let count = self.buffer.len();
                self.buffer.clear();
                self.flushes += 1;
                self.written += count;
                info!(file = %self.writer.target().display(), records = count, "data saved");
                FlushStatus::Flushed(count)
            }
            Err(e) => {
                error!(
                    file = %self.writer.target().display(),
                    retained = self.buffer.len(),
                    "failed to save data: {e:#}"
                );
                FlushStatus::Failed
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffered(&self) -> &[R] {
        &self.buffer
    }

    /// Successful flushes so far
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Records written so far
    pub fn written(&self) -> usize {
        self.written
    }
}

impl<R, W> IncrementalSink<R, W>
where
    R: Clone + Send + 'static,
    W: RecordWriter<R> + Clone + 'static,
{
    /// [`maybe_flush`](Self::maybe_flush) with the write done on a blocking
    /// thread, for writers that rewrite whole files.
    pub async fn maybe_flush_blocking(&mut self) -> FlushStatus {
        if self.buffer.len() <= self.threshold {
            return FlushStatus::Idle;
        }
        info!(
            buffered = self.buffer.len(),
            threshold = self.threshold,
            "buffer exceeded threshold, saving data"
        );

        let batch = self.buffer.clone();
        let mut writer = self.writer.clone();
        let result = match tokio::task::spawn_blocking(move || writer.write(&batch)).await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("writer thread failed: {e}")),
        };
        self.record(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::anyhow;

    use super::*;

    /// Keeps every batch in memory; can be told to fail.
    struct MemoryWriter {
        batches: Vec<Vec<u32>>,
        failing: bool,
        path: PathBuf,
    }

    impl MemoryWriter {
        fn new() -> Self {
            Self {
                batches: Vec::new(),
                failing: false,
                path: PathBuf::from("memory"),
            }
        }
    }

    impl RecordWriter<u32> for MemoryWriter {
        fn write(&mut self, batch: &[u32]) -> Result<()> {
            if self.failing {
                return Err(anyhow!("disk full"));
            }
            self.batches.push(batch.to_vec());
            Ok(())
        }

        fn target(&self) -> &Path {
            &self.path
        }
    }

    #[test]
    fn flush_count_is_bounded_by_threshold() {
        for threshold in 1..=7usize {
            for n in 0..=40usize {
                let mut sink = IncrementalSink::new(MemoryWriter::new(), threshold);
                for i in 0..n {
                    sink.append(i as u32);
                    sink.maybe_flush();
                    assert!(sink.len() <= threshold);
                }
                assert!(
                    sink.flushes() <= n.div_ceil(threshold),
                    "threshold {threshold}, n {n}: {} flushes",
                    sink.flushes()
                );
            }
        }
    }

    #[test]
    fn flush_final_empties_buffer_and_runs_once() {
        let mut sink = IncrementalSink::new(MemoryWriter::new(), 1000);
        for i in 0..5 {
            sink.append(i);
        }
        assert_eq!(sink.maybe_flush(), FlushStatus::Idle);
        assert_eq!(sink.flush_final(), FlushStatus::Flushed(5));
        assert!(sink.is_empty());
        assert_eq!(sink.written(), 5);

        sink.append(99);
        assert_eq!(sink.flush_final(), FlushStatus::AlreadyFinal);
        assert_eq!(sink.writer.batches, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn flush_final_on_empty_buffer_writes_nothing() {
        let mut sink: IncrementalSink<u32, _> = IncrementalSink::new(MemoryWriter::new(), 10);
        assert_eq!(sink.flush_final(), FlushStatus::Idle);
        assert!(sink.writer.batches.is_empty());
    }

    #[test]
    fn failed_flush_keeps_buffer_for_retry() {
        let mut writer = MemoryWriter::new();
        writer.failing = true;
        let mut sink = IncrementalSink::new(writer, 2);

        for i in 0..3 {
            sink.append(i);
        }
        assert_eq!(sink.maybe_flush(), FlushStatus::Failed);
        assert_eq!(sink.buffered(), &[0, 1, 2]);

        sink.writer.failing = false;
        sink.append(3);
        assert_eq!(sink.maybe_flush(), FlushStatus::Flushed(4));
        assert_eq!(sink.writer.batches, vec![vec![0, 1, 2, 3]]);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn buffer_order_is_preserved_across_flushes() {
        let mut sink = IncrementalSink::new(MemoryWriter::new(), 2);
        for i in 0..7 {
            sink.append(i);
            sink.maybe_flush();
        }
        sink.flush_final();
        let flat: Vec<u32> = sink.writer.batches.concat();
        assert_eq!(flat, (0..7).collect::<Vec<_>>());
    }
}
