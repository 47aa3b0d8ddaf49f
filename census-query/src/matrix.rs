//! Chunked matrix streams with optional one-chunk-ahead prefetch.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};
use census_storage::BatchStream;
use crossbeam_channel as xchan;
use rayon::{ThreadPool, Yield};

/// Outcome of pulling one step from a lazy sequence.
///
/// Exhaustion is its own variant so that no produced value, however empty,
/// can be mistaken for end-of-sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled<T> {
    Value(T),
    Exhausted,
}

impl<T> Pulled<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Pulled::Exhausted)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Pulled::Value(v) => Some(v),
            Pulled::Exhausted => None,
        }
    }
}

/// Advance `iter` by one step.
pub fn pull_next<I: Iterator + ?Sized>(iter: &mut I) -> Pulled<I::Item> {
    match iter.next() {
        Some(v) => Pulled::Value(v),
        None => Pulled::Exhausted,
    }
}

type Reply = Pulled<Result<RecordBatch>>;

/// How long a pool worker blocks on a pending fetch before looking for
/// queued pool work again.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Owned, `'static` chunk source behind both the blocking iterator and the
/// async stream.
pub(crate) struct ChunkSource {
    schema: SchemaRef,
    state: State,
}

enum State {
    Done,
    Direct(BatchStream),
    Prefetch(Prefetcher),
}

struct Prefetcher {
    source: Arc<Mutex<BatchStream>>,
    pool: Arc<ThreadPool>,
    pending: Option<xchan::Receiver<Reply>>,
}

impl Prefetcher {
    fn start(stream: BatchStream, pool: Arc<ThreadPool>) -> Self {
        let mut prefetcher = Self {
            source: Arc::new(Mutex::new(stream)),
            pool,
            pending: None,
        };
        prefetcher.dispatch();
        prefetcher
    }

    /// Queue a fetch of the next chunk on the pool. At most one is in flight.
    fn dispatch(&mut self) {
        debug_assert!(self.pending.is_none());
        let (tx, rx) = xchan::bounded(1);
        let source = Arc::clone(&self.source);
        self.pool.spawn(move || {
            let pulled = {
                let mut stream = source.lock().expect("matrix stream lock poisoned");
                pull_next(&mut *stream)
            };
            // The consumer may have abandoned the stream; the chunk is discarded.
            let _ = tx.send(pulled);
        });
        self.pending = Some(rx);
    }

    fn pull(&mut self) -> (Reply, bool) {
        let Some(rx) = self.pending.take() else {
            return (Pulled::Exhausted, true);
        };
        match self.wait(&rx) {
            Ok(Pulled::Value(Ok(batch))) => {
                self.dispatch();
                tracing::trace!(rows = batch.num_rows(), "prefetched matrix chunk");
                (Pulled::Value(Ok(batch)), false)
            }
            Ok(Pulled::Value(Err(err))) => (Pulled::Value(Err(err)), true),
            Ok(Pulled::Exhausted) => (Pulled::Exhausted, true),
            Err(_) => {
                tracing::warn!("prefetch task ended without a reply");
                (
                    Pulled::Value(Err(Error::Internal(
                        "matrix prefetch task was lost".into(),
                    ))),
                    true,
                )
            }
        }
    }
}

impl Prefetcher {
    /// Block until the pending fetch replies.
    ///
    /// On a worker of this pool, queued pool tasks (the fetch among them) are
    /// run while waiting, so any number of concurrent consumers on the pool
    /// keeps making progress.
    fn wait(&self, rx: &xchan::Receiver<Reply>) -> std::result::Result<Reply, xchan::RecvError> {
        if self.pool.current_thread_index().is_none() {
            return rx.recv();
        }
        loop {
            match rx.try_recv() {
                Ok(reply) => return Ok(reply),
                Err(xchan::TryRecvError::Disconnected) => return Err(xchan::RecvError),
                Err(xchan::TryRecvError::Empty) => {}
            }
            if matches!(self.pool.yield_now(), Some(Yield::Executed)) {
                continue;
            }
            match rx.recv_timeout(IDLE_WAIT) {
                Ok(reply) => return Ok(reply),
                Err(xchan::RecvTimeoutError::Disconnected) => return Err(xchan::RecvError),
                Err(xchan::RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        if self.pending.is_some() {
            tracing::trace!("matrix stream abandoned with a prefetch in flight");
        }
    }
}

impl ChunkSource {
    pub(crate) fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            state: State::Done,
        }
    }

    pub(crate) fn direct(stream: BatchStream) -> Self {
        Self {
            schema: Arc::clone(stream.schema()),
            state: State::Direct(stream),
        }
    }

    pub(crate) fn prefetch(stream: BatchStream, pool: Arc<ThreadPool>) -> Self {
        Self {
            schema: Arc::clone(stream.schema()),
            state: State::Prefetch(Prefetcher::start(stream, pool)),
        }
    }

    pub(crate) fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Next chunk. After an error or exhaustion every further pull reports
    /// [`Pulled::Exhausted`].
    pub(crate) fn pull(&mut self) -> Reply {
        let (reply, finished) = match &mut self.state {
            State::Done => return Pulled::Exhausted,
            State::Direct(stream) => match pull_next(stream) {
                Pulled::Value(Ok(batch)) => (Pulled::Value(Ok(batch)), false),
                other => (other, true),
            },
            State::Prefetch(prefetcher) => prefetcher.pull(),
        };
        if finished {
            self.state = State::Done;
        }
        reply
    }
}

/// Lazy, finite, non-restartable sequence of matrix chunks.
///
/// Each item is one storage batch of `(soma_dim_0, soma_dim_1, soma_data)`.
/// The stream borrows the query it came from, so it cannot outlive
/// [`ExperimentQuery::close`](crate::ExperimentQuery::close). Dropping it
/// early is fine: an in-flight prefetch finishes on the pool and is discarded.
pub struct MatrixStream<'q> {
    source: ChunkSource,
    _query: PhantomData<&'q ()>,
}

impl MatrixStream<'_> {
    pub(crate) fn new(source: ChunkSource) -> Self {
        Self {
            source,
            _query: PhantomData,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        self.source.schema()
    }

    /// Drain into a single batch. No chunks gives an empty batch with the
    /// matrix schema.
    pub fn concat(self) -> Result<RecordBatch> {
        let schema = Arc::clone(self.schema());
        let batches = self.collect::<Result<Vec<_>>>()?;
        Ok(arrow::compute::concat_batches(&schema, &batches)?)
    }
}

impl Iterator for MatrixStream<'_> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.pull().into_option()
    }
}
