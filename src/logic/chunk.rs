use std::future::Future;

use crate::error::{DebiaiError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Receives the running count of submitted rows
pub trait ProgressReporter: Send {
    fn update(&mut self, done: usize, total: usize);
}

/// Reports progress through the `log` facade
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressReporter for LogProgress {
    fn update(&mut self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        log::info!(
            "{}: {}/{} ({}%)",
            self.label,
            done,
            total,
            done * 100 / total
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&mut self, _done: usize, _total: usize) {}
}

/// Contiguous `(start, end)` ranges of at most `chunk_size` rows covering `total`
pub fn chunk_bounds(total: usize, chunk_size: usize) -> Result<Vec<(usize, usize)>> {
    if chunk_size == 0 {
        return Err(DebiaiError::validation("The chunk size must be at least 1"));
    }
    Ok((0..total)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(total)))
        .collect())
}

/// A chunk converted ahead of submission, covering rows `start..end`
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChunk<C> {
    pub start: usize,
    pub end: usize,
    pub payload: C,
}

/// Convert every chunk of `rows` before anything is submitted.
///
/// `prepare` gets the chunk and the batch position of its first row. The first
/// conversion error is returned as is, so a bad row anywhere in the batch
/// leaves the backend untouched.
pub fn prepare_chunks<'a, T, C, F>(
    rows: &'a [T],
    chunk_size: usize,
    mut prepare: F,
) -> Result<Vec<PreparedChunk<C>>>
where
    F: FnMut(&'a [T], usize) -> Result<C>,
{
    chunk_bounds(rows.len(), chunk_size)?
        .into_iter()
        .map(|(start, end)| {
            Ok(PreparedChunk {
                start,
                end,
                payload: prepare(&rows[start..end], start)?,
            })
        })
        .collect()
}

/// Submit prepared chunks in order, one at a time.
///
/// Progress starts at zero and grows after every accepted chunk. The first
/// failing submission stops the loop; chunks already submitted stay applied.
/// Returns the number of rows submitted.
pub async fn chunk_and_submit<'a, C, F, Fut>(
    chunks: &'a [PreparedChunk<C>],
    progress: &mut dyn ProgressReporter,
    mut submit: F,
) -> Result<usize>
where
    F: FnMut(&'a C) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let total = chunks.last().map_or(0, |chunk| chunk.end);
    progress.update(0, total);

    for (chunk_number, chunk) in chunks.iter().enumerate() {
        log::debug!(
            "Submitting chunk {}/{} (rows {}..{})",
            chunk_number + 1,
            chunks.len(),
            chunk.start,
            chunk.end
        );
        submit(&chunk.payload).await?;
        progress.update(chunk.end, total);
    }
    Ok(total)
}
