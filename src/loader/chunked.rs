//! Chunked, concurrent loading of a source/destination pair.
//!
//! # Architecture
//!
//! ```text
//!  source records ──▶ [worker: build + order check] ──┐ bounded
//!                                                     ├─ channels ─▶ coordinator ─▶ reconcile ─▶ on_chunk
//!  dest records   ──▶ [worker: build + order check] ──┘
//! ```
//!
//! - Each stream is built into elements on its own scoped thread. The
//!   channels hold at most `chunk_size` elements, so a fast producer blocks
//!   instead of buffering its whole input.
//! - The coordinator merges the two streams by key and cuts a chunk every
//!   `chunk_size` elements. A key present on both sides always lands in one
//!   chunk, so reconciling chunk by chunk gives the same result as
//!   reconciling everything at once.
//! - A chunk is reconciled only after both workers delivered every element up
//!   to its last key. On the first error the coordinator raises the cancel
//!   flag and drops its receivers, which stops both workers.
//! - A worker that reads its input to the end says so with an explicit end
//!   message. A channel that disconnects without one (cancelled or panicked
//!   worker) fails the run; the partial chunk is never reconciled.

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::dataset::{Dataset, DiffDataset, MemoryDataset};
use crate::error::{Error, Result};
use crate::model::{Element, Key};
use crate::sync::{LoadSummary, Strategy};

/// Records per chunk when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

/// Shared flag a caller can raise to stop a running load between records.
pub type CancelToken = Arc<AtomicBool>;

/// Loader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Merged elements per chunk before reconciling.
    pub chunk_size: usize,
    /// Reconciler applied to every chunk.
    pub strategy: Strategy,
    /// Require both streams to be strictly ascending by key.
    ///
    /// When false, ordering is not checked and everything is reconciled as a
    /// single chunk held in memory.
    pub sorted: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: Strategy::Full,
            sorted: true,
        }
    }
}

impl LoaderConfig {
    /// Validated config for sorted inputs.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `chunk_size` is zero.
    pub fn new(chunk_size: usize, strategy: Strategy) -> Result<Self> {
        let config = Self {
            chunk_size,
            strategy,
            sorted: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Switch to single-pass loading of unsorted inputs.
    #[must_use]
    pub fn unsorted(mut self) -> Self {
        self.sorted = false;
        self
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `chunk_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidArgument(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One reconciled batch.
///
/// `destination` holds the destination elements of the chunk after the
/// strategy ran; its diff is what changed.
#[derive(Debug)]
pub struct Chunk<E> {
    /// 0-based position of the chunk in the run.
    pub index: usize,
    pub source: MemoryDataset<E>,
    pub destination: DiffDataset<E>,
}

/// Drives the population and reconciliation of dataset pairs in chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkedLoader {
    config: LoaderConfig,
    cancel: Option<CancelToken>,
}

impl ChunkedLoader {
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the config is invalid.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Observe `token`; raising it stops the run with `Error::Cancelled`.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load both streams, reconciling chunk by chunk.
    ///
    /// `source` and `destination` yield raw records; `build_source` and
    /// `build_destination` turn them into elements. Every reconciled chunk is
    /// handed to `on_chunk` before the next one is assembled.
    ///
    /// Chunks handed out before a failure stay handed out: nothing is rolled
    /// back.
    ///
    /// # Errors
    ///
    /// Returns the first error from a record stream, a builder, the ordering
    /// check, the strategy or `on_chunk`. The chunk being assembled at that
    /// point is never reconciled.
    ///
    /// Returns `Error::Cancelled` when the cancel token is raised, including
    /// while a chunk is half collected.
    pub fn run<E, SI, SR, SB, DI, DR, DB, F>(
        &self,
        source: SI,
        destination: DI,
        build_source: SB,
        build_destination: DB,
        mut on_chunk: F,
    ) -> Result<LoadSummary>
    where
        E: Element + Clone + Send,
        SI: IntoIterator<Item = Result<SR>> + Send,
        SB: Fn(SR) -> Result<E> + Send,
        DI: IntoIterator<Item = Result<DR>> + Send,
        DB: Fn(DR) -> Result<E> + Send,
        F: FnMut(Chunk<E>) -> Result<()>,
    {
        let config = self.config;
        config.validate()?;

        let local_cancel = AtomicBool::new(false);
        let cancel = self.cancel.as_deref().unwrap_or(&local_cancel);
        let capacity = config.chunk_size;

        let result = thread::scope(|scope| {
            let (source_tx, source_rx) = mpsc::sync_channel(capacity);
            let (destination_tx, destination_rx) = mpsc::sync_channel(capacity);

            thread::Builder::new()
                .name("importsync-source".into())
                .spawn_scoped(scope, move || {
                    pipeline("source", source, build_source, config.sorted, &source_tx, cancel);
                })?;
            thread::Builder::new()
                .name("importsync-destination".into())
                .spawn_scoped(scope, move || {
                    pipeline(
                        "destination",
                        destination,
                        build_destination,
                        config.sorted,
                        &destination_tx,
                        cancel,
                    );
                })?;

            let result = coordinate(
                &config,
                Stream::new("source", source_rx),
                Stream::new("destination", destination_rx),
                cancel,
                &mut on_chunk,
            );
            if result.is_err() {
                cancel.store(true, Ordering::Relaxed);
            }
            result
        });

        match &result {
            Ok(summary) => info!(
                run_id = %summary.run_id,
                chunks = summary.chunks,
                added = summary.added,
                removed = summary.removed,
                changed = summary.changed,
                "Load complete"
            ),
            Err(e) => warn!(error = %e, "Load aborted"),
        }
        result
    }
}

/// What a pipeline hands to the coordinator.
enum Message<E> {
    Element(E),
    /// The record stream is exhausted.
    End,
}

/// Build every record of one stream and send it to the coordinator.
///
/// Stops at the first error (after sending it), when the coordinator hangs
/// up, or when the cancel flag is raised. `Message::End` is sent only after
/// the last record.
fn pipeline<I, R, E, B>(
    stream: &'static str,
    records: I,
    build: B,
    sorted: bool,
    tx: &SyncSender<Result<Message<E>>>,
    cancel: &AtomicBool,
) where
    I: IntoIterator<Item = Result<R>>,
    B: Fn(R) -> Result<E>,
    E: Element,
{
    let mut previous: Option<Key> = None;
    for item in records {
        if cancel.load(Ordering::Relaxed) {
            debug!(stream, "Pipeline cancelled");
            return;
        }
        let built = item.and_then(&build).and_then(|element| {
            if sorted {
                check_order(stream, previous.as_ref(), element.key())?;
                previous = Some(element.key().clone());
            }
            Ok(element)
        });
        let failed = built.is_err();
        if tx.send(built.map(Message::Element)).is_err() || failed {
            return;
        }
    }
    // The coordinator may already be gone.
    tx.send(Ok(Message::End)).ok();
}

fn check_order(stream: &str, previous: Option<&Key>, key: &Key) -> Result<()> {
    let Some(previous) = previous else {
        return Ok(());
    };
    match previous.cmp(key) {
        cmp::Ordering::Less => Ok(()),
        cmp::Ordering::Equal => Err(Error::DuplicateKey { key: key.clone() }),
        cmp::Ordering::Greater => Err(Error::UnorderedStream {
            stream: stream.to_string(),
            previous: previous.clone(),
            key: key.clone(),
        }),
    }
}

/// Receiving end of one pipeline with a one-element lookahead.
struct Stream<E> {
    name: &'static str,
    rx: Receiver<Result<Message<E>>>,
    head: Option<E>,
    done: bool,
    received: usize,
}

impl<E: Element> Stream<E> {
    fn new(name: &'static str, rx: Receiver<Result<Message<E>>>) -> Self {
        Self {
            name,
            rx,
            head: None,
            done: false,
            received: 0,
        }
    }

    /// Key of the next element, blocking until the worker delivers it.
    ///
    /// `None` once the worker sent `Message::End`. A worker that hung up
    /// without it was cancelled (`Error::Cancelled`) or died (`Error::Other`).
    fn peek(&mut self, cancel: &AtomicBool) -> Result<Option<&Key>> {
        if self.head.is_none() && !self.done {
            match self.rx.recv() {
                Ok(Ok(Message::Element(element))) => {
                    self.received += 1;
                    self.head = Some(element);
                }
                Ok(Ok(Message::End)) => self.done = true,
                Ok(Err(e)) => return Err(e),
                Err(_) if cancel.load(Ordering::Relaxed) => {
                    return Err(Error::Cancelled { chunks: 0 });
                }
                Err(_) => {
                    return Err(Error::Other(format!(
                        "{} pipeline stopped before the end of its input",
                        self.name
                    )));
                }
            }
        }
        Ok(self.head.as_ref().map(Element::key))
    }
}

/// Report a cancellation seen by a stream with the chunks completed so far.
fn cancelled_at(error: Error, chunks: usize) -> Error {
    match error {
        Error::Cancelled { .. } => Error::Cancelled { chunks },
        other => other,
    }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Destination,
}

fn coordinate<E, F>(
    config: &LoaderConfig,
    mut source: Stream<E>,
    mut destination: Stream<E>,
    cancel: &AtomicBool,
    on_chunk: &mut F,
) -> Result<LoadSummary>
where
    E: Element + Clone,
    F: FnMut(Chunk<E>) -> Result<()>,
{
    let limit = if config.sorted {
        config.chunk_size
    } else {
        usize::MAX
    };
    let mut summary = LoadSummary::new(config.strategy, config.chunk_size);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled {
                chunks: summary.chunks,
            });
        }

        let mut source_elements = Vec::new();
        let mut destination_elements = Vec::new();
        let mut taken = 0usize;
        let mut last: Option<Key> = None;
        let done = summary.chunks;

        loop {
            let next = match (
                source
                    .peek(cancel)
                    .map_err(|e| cancelled_at(e, done))?
                    .cloned(),
                destination.peek(cancel).map_err(|e| cancelled_at(e, done))?,
            ) {
                (None, None) => None,
                (Some(key), None) => Some((Side::Source, key)),
                (None, Some(key)) => Some((Side::Destination, key.clone())),
                (Some(a), Some(b)) if a <= *b => Some((Side::Source, a)),
                (Some(_), Some(b)) => Some((Side::Destination, b.clone())),
            };
            let Some((side, key)) = next else {
                break;
            };
            if taken >= limit && last.as_ref() != Some(&key) {
                break;
            }
            let element = match side {
                Side::Source => source.head.take(),
                Side::Destination => destination.head.take(),
            };
            let Some(element) = element else {
                break;
            };
            match side {
                Side::Source => source_elements.push(element),
                Side::Destination => destination_elements.push(element),
            }
            taken += 1;
            last = Some(key);
        }

        if taken == 0 {
            break;
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled {
                chunks: summary.chunks,
            });
        }

        let chunk_source = MemoryDataset::from_elements(source_elements)?;
        let mut chunk_destination = DiffDataset::from_elements(destination_elements)?;
        config.strategy.apply(&chunk_source, &mut chunk_destination)?;

        let diff = chunk_destination.diff();
        debug!(
            chunk = summary.chunks,
            source = chunk_source.len(),
            destination = chunk_destination.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "Chunk reconciled"
        );
        summary.added += diff.added.len();
        summary.removed += diff.removed.len();
        summary.changed += diff.changed.len();

        on_chunk(Chunk {
            index: summary.chunks,
            source: chunk_source,
            destination: chunk_destination,
        })?;
        summary.chunks += 1;
    }

    summary.source_records = source.received;
    summary.destination_records = destination.received;
    Ok(summary)
}
