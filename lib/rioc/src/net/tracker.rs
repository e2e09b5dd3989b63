use crate::net::batch::Batch;
use crate::net::support::{ClientError, ClientResult, Status};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Decoded payload of one completed operation. The variant is dictated by
/// the originating command, never by inspection of the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Insert, Delete, or any failed operation.
    None,
    /// Opaque value returned by Get.
    Bytes(Vec<u8>),
    /// Post-adjustment counter value returned by AtomicIncDec.
    Counter(i64),
    /// Key/value pairs returned by RangeQuery, in key order.
    Range(Vec<RangeEntry>),
}

/// One entry of a range query result. Both buffers are independently owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug)]
struct Slot {
    status: Status,
    payload: Payload,
}

#[derive(Debug)]
struct State {
    done: bool,
    error: Option<ClientError>,
}

/// Synchronization core shared between the submitter and the background
/// receiver. Slots are published once each; the high-water mark and the
/// completion flag are released by the receiver and acquired by readers.
#[derive(Debug)]
pub(crate) struct TrackerShared {
    slots: Vec<OnceLock<Slot>>,
    received: AtomicUsize,
    complete: AtomicBool,
    state: Mutex<State>,
    cond: Condvar,
}

impl TrackerShared {
    pub fn new(count: usize) -> TrackerShared {
        TrackerShared {
            slots: (0..count).map(|_| OnceLock::new()).collect(),
            received: AtomicUsize::new(0),
            complete: AtomicBool::new(false),
            state: Mutex::new(State {
                done: false,
                error: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Publishes the result for `index` and advances the responses-received
    /// high-water mark.
    pub fn fill_slot(&self, index: usize, status: Status, payload: Payload) {
        let filled = self.slots[index].set(Slot { status, payload }).is_ok();
        debug_assert!(filled, "Result slot filled twice");

        self.received.store(index + 1, Ordering::Release);
    }

    /// Records the aggregate outcome, raises the completion flag and wakes
    /// every waiter. Called exactly once, by the receiver.
    pub fn finish(&self, result: ClientResult<()>) {
        let mut state = self.state.lock().expect("Tracker state lock poisoned");
        state.error = result.err();
        state.done = true;
        self.complete.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    /// True once the receiver has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Blocks until completion. `None` waits indefinitely; a lapsed
    /// deadline surfaces as an I/O timeout without cancelling the receiver.
    pub fn wait(&self, timeout: Option<Duration>) -> ClientResult<()> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut state = self.state.lock().expect("Tracker state lock poisoned");

        while !state.done {
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ClientError::Io(io::ErrorKind::TimedOut));
                    }
                    self.cond
                        .wait_timeout(state, deadline - now)
                        .expect("Tracker state lock poisoned")
                        .0
                }
                None => self
                    .cond
                    .wait(state)
                    .expect("Tracker state lock poisoned"),
            };
        }

        match state.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn slot(&self, index: usize) -> ClientResult<&Slot> {
        if index >= self.slots.len() {
            return Err(ClientError::Param);
        }
        // Results are only visible up to the published high-water mark.
        if index >= self.received.load(Ordering::Acquire) {
            return Err(ClientError::Io(io::ErrorKind::WouldBlock));
        }

        Ok(self.slots[index]
            .get()
            .expect("Slot below the high-water mark must be populated"))
    }

    #[cfg(test)]
    pub(crate) fn slot_for_tests(&self, index: usize) -> ClientResult<(Status, Payload)> {
        self.slot(index)
            .map(|slot| (slot.status, slot.payload.clone()))
    }
}

/// Handle for an in-flight or completed batch. Owns the submitted batch and
/// every buffer the receiver allocates for server payloads; retiring (or
/// dropping) the tracker joins the receiver before anything is released, so
/// a premature free is not representable.
#[derive(Debug)]
pub struct Tracker {
    shared: Arc<TrackerShared>,
    batch: Arc<Batch>,
    receiver: Option<JoinHandle<()>>,
}

impl Tracker {
    pub(crate) fn new(
        batch: Arc<Batch>,
        shared: Arc<TrackerShared>,
        receiver: JoinHandle<()>,
    ) -> Tracker {
        Tracker {
            shared,
            batch,
            receiver: Some(receiver),
        }
    }

    /// Number of operations in the underlying batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// True once every response has been consumed or the receiver failed.
    pub fn is_complete(&self) -> bool {
        self.shared.is_complete()
    }

    /// Blocks until the batch completes and returns the aggregate outcome.
    /// `timeout_ms == 0` waits indefinitely; otherwise a lapsed deadline
    /// returns an I/O timeout while the receiver keeps draining.
    pub fn wait(&self, timeout_ms: u32) -> ClientResult<()> {
        let timeout = match timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        };
        self.shared.wait(timeout)
    }

    /// Status and payload of operation `index`. Fails with an I/O error
    /// while the response is still outstanding.
    pub fn result(&self, index: usize) -> ClientResult<(Status, &Payload)> {
        let slot = self.shared.slot(index)?;
        Ok((slot.status, &slot.payload))
    }

    /// Consumes the tracker and moves the result of operation `index` out,
    /// joining the receiver first.
    pub fn into_result(mut self, index: usize) -> ClientResult<(Status, Payload)> {
        self.join_receiver();

        // The receiver has exited and session bookkeeping only holds weak
        // references, so this tracker owns the sole remaining handle.
        let shared = Arc::get_mut(&mut self.shared).ok_or(ClientError::Busy)?;

        if index >= shared.slots.len() {
            return Err(ClientError::Param);
        }
        if index >= *shared.received.get_mut() {
            return Err(ClientError::Io(io::ErrorKind::WouldBlock));
        }

        let slot = shared.slots[index]
            .take()
            .expect("Slot below the high-water mark must be populated");
        Ok((slot.status, slot.payload))
    }

    /// Joins the background receiver and releases all owned buffers,
    /// including any range result entries.
    pub fn retire(mut self) {
        self.join_receiver();
    }

    fn join_receiver(&mut self) {
        if let Some(handle) = self.receiver.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.join_receiver();
    }
}
