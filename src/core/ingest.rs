//! Bounded ingestion queue and its single consumer thread.
//!
//! Producers push [`NewMessage`]s through an [`Ingestor`]. One consumer
//! thread drains the queue in arrival order, allocates the pk and makes the
//! message visible before taking the next one, so pk order always equals
//! queue order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::{BackpressurePolicy, DrainPolicy};
use crate::core::cache::CacheState;
use crate::core::message::NewMessage;
use crate::{Error, Result};

const CONSUMER_THREAD_NAME: &str = "msgcache-ingest";
const SYNC_POLL_INTERVAL: Duration = Duration::from_micros(100);

pub(crate) enum Command {
    Append(NewMessage),
    /// Answered once everything queued ahead of it has been handled.
    Sync(SyncSender<()>),
    Stop,
}

/// Marks a producer between its closed check and the end of its send. The
/// consumer does not exit its final drain while any are active.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(producers: &'a AtomicUsize) -> Self {
        producers.fetch_add(1, Ordering::SeqCst);
        Self(producers)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Producer handle for the ingestion queue. Cheap to clone; every clone
/// feeds the same consumer.
#[derive(Clone)]
pub struct Ingestor {
    tx: SyncSender<Command>,
    policy: BackpressurePolicy,
    state: Arc<CacheState>,
}

impl Ingestor {
    /// Queues `message` for ingestion.
    ///
    /// # Errors
    /// - [`Error::QueueFull`] if the queue stayed full for as long as the
    ///   backpressure policy allows.
    /// - [`Error::Closed`] once shutdown has started.
    pub fn enqueue(&self, message: NewMessage) -> Result<()> {
        let _in_flight = InFlight::enter(&self.state.producers);
        if self.state.is_closed() {
            return Err(Error::Closed);
        }

        let deadline = match self.policy {
            BackpressurePolicy::FailFast => None,
            BackpressurePolicy::Block { timeout, .. } => timeout.map(|t| Instant::now() + t),
        };

        let mut command = Command::Append(message);
        loop {
            match self.tx.try_send(command) {
                Ok(()) => {
                    self.state.counters.accepted.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::Closed),
                Err(TrySendError::Full(returned)) => command = returned,
            }

            match self.policy {
                BackpressurePolicy::FailFast => return Err(self.reject()),
                BackpressurePolicy::Block { poll_interval, .. } => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(self.reject());
                        }
                    }
                    if self.state.is_closed() {
                        return Err(Error::Closed);
                    }
                    thread::sleep(poll_interval);
                }
            }
        }
    }

    /// Waits until every message this or any other producer queued before
    /// the call has been handled. Returns false if `timeout` elapsed first.
    ///
    /// A marker goes through the same FIFO queue as the messages, so its
    /// reply means everything ahead of it is visible.
    pub fn sync(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let mut command = Command::Sync(reply_tx);
        loop {
            match self.tx.try_send(command) {
                Ok(()) => break,
                // Consumer exited after draining everything accepted.
                Err(TrySendError::Disconnected(_)) => return true,
                Err(TrySendError::Full(returned)) => command = returned,
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(SYNC_POLL_INTERVAL);
        }

        match reply_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => true,
            // The marker was discarded with the queue after the final drain.
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    fn reject(&self) -> Error {
        let rejected = self.state.counters.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("ingest queue full, rejected {rejected} messages so far");
        Error::QueueFull
    }

    pub(crate) fn stop(&self) {
        // Blocking send: the consumer keeps draining, so space frees up.
        if self.tx.send(Command::Stop).is_err() {
            debug!("ingest consumer already gone");
        }
    }
}

/// Messages the consumer handled after shutdown was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub flushed: u64,
    pub dropped: u64,
}

pub(crate) struct Consumer {
    pub(crate) ingestor: Ingestor,
    pub(crate) handle: JoinHandle<ShutdownReport>,
}

pub(crate) fn spawn(
    state: Arc<CacheState>,
    capacity: usize,
    policy: BackpressurePolicy,
    drain: DrainPolicy,
    core: Option<usize>,
) -> Result<Consumer> {
    let core_id = match core {
        Some(core) => {
            let core_ids = core_affinity::get_core_ids().ok_or_else(|| {
                Error::InvalidConfig("failed to enumerate cpu cores".to_string())
            })?;
            let id = core_ids.get(core).copied().ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "consumer_core {core} out of range ({} cores available)",
                    core_ids.len()
                ))
            })?;
            Some(id)
        }
        None => None,
    };

    let (tx, rx) = mpsc::sync_channel(capacity);
    let consumer_state = Arc::clone(&state);
    let handle = thread::Builder::new()
        .name(CONSUMER_THREAD_NAME.to_string())
        .spawn(move || {
            if let Some(core_id) = core_id {
                if !core_affinity::set_for_current(core_id) {
                    warn!("failed to pin ingest consumer to core {}", core_id.id);
                }
            }
            debug!("ingest consumer started");
            let report = run(&consumer_state, rx, drain);
            debug!("ingest consumer stopped: {report:?}");
            report
        })
        .map_err(Error::Spawn)?;

    Ok(Consumer {
        ingestor: Ingestor { tx, policy, state },
        handle,
    })
}

fn run(state: &CacheState, rx: Receiver<Command>, drain: DrainPolicy) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    while let Ok(command) = rx.recv() {
        match command {
            Command::Append(message) => handle(state, message, drain, &mut report),
            Command::Sync(reply) => {
                let _ = reply.try_send(());
            }
            Command::Stop => break,
        }
    }

    // Producers that passed the closed check before shutdown may still be
    // sending. Exit only once none are active and the queue is empty.
    loop {
        let idle = state.producers.load(Ordering::SeqCst) == 0;
        match rx.try_recv() {
            Ok(Command::Append(message)) => handle(state, message, drain, &mut report),
            Ok(Command::Sync(reply)) => {
                let _ = reply.try_send(());
            }
            Ok(Command::Stop) => {}
            Err(TryRecvError::Empty) if idle => break,
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => break,
        }
    }
    report
}

fn handle(
    state: &CacheState,
    message: NewMessage,
    drain: DrainPolicy,
    report: &mut ShutdownReport,
) {
    let closing = state.is_closed();
    if closing && drain == DrainPolicy::Drop {
        report.dropped += 1;
        state.counters.dropped.fetch_add(1, Ordering::Relaxed);
    } else {
        state.apply(message);
        if closing {
            report.flushed += 1;
        }
    }
    state.counters.processed.fetch_add(1, Ordering::SeqCst);
}
