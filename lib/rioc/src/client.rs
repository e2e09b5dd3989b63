use crate::config::ClientConfig;
use crate::net::batch::Batch;
use crate::net::pipeline;
use crate::net::receiver;
use crate::net::support::{ClientError, ClientResult};
use crate::net::tls::TlsTransport;
use crate::net::tracker::{Payload, RangeEntry, Tracker, TrackerShared};
use crate::net::transport::{open_stream, TcpTransport, Transport};
use lumen::logging;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// Session state shared with the background receivers spawned for each
/// submitted batch.
struct SessionShared {
    /// Locked by the submitter for the duration of a transmission and by
    /// the receiver for the duration of a drain.
    transport: Mutex<Box<dyn Transport>>,
    /// Cleared on the first unrecoverable transport error. Submits are
    /// rejected afterwards without touching the socket.
    valid: AtomicBool,
    /// Completion handle of the most recently submitted batch. The wire
    /// protocol forbids interleaved batches on one session, so a new submit
    /// first waits for this one to drain.
    in_flight: Mutex<Option<Weak<TrackerShared>>>,
    log: logging::Logger,
}

/// A connection to one store endpoint, over TCP or TLS 1.3.
///
/// All synchronous operations are batches of one under the hood; the wire
/// form is identical either way. The session is meant for a single
/// submitter at a time, as the protocol processes batches strictly in
/// order.
pub struct Client {
    shared: Arc<SessionShared>,
    timeout_ms: u32,
}

impl Client {
    /// Establishes a session using the supplied configuration.
    pub fn connect(config: &ClientConfig) -> ClientResult<Client> {
        Self::connect_logged(config, None)
    }

    /// Establishes a session, attaching a parent logger.
    pub fn connect_logged<'a, L: Into<Option<&'a logging::Logger>>>(
        config: &ClientConfig,
        log: L,
    ) -> ClientResult<Client> {
        config.validate()?;

        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::null(),
        };

        let timeout = match config.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        };

        let stream = open_stream(&config.host, config.port, timeout)?;

        let transport: Box<dyn Transport> = match &config.tls {
            Some(tls) => Box::new(TlsTransport::establish(stream, &config.host, tls)?),
            None => Box::new(TcpTransport::new(stream)),
        };

        logging::debug!(log, "session established";
                        "context" => "connect",
                        "host" => config.host.as_str(),
                        "port" => config.port,
                        "tls" => config.tls.is_some(),
                        "timeout_ms" => config.timeout_ms);

        Ok(Client {
            shared: Arc::new(SessionShared {
                transport: Mutex::new(transport),
                valid: AtomicBool::new(true),
                in_flight: Mutex::new(None),
                log,
            }),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Closes the session. Equivalent to dropping the client.
    pub fn disconnect(self) {}

    /// Creates an empty batch for pipelined submission.
    pub fn batch(&self) -> Batch {
        Batch::new()
    }

    /// Transmits the batch and returns a tracker observing its completion.
    ///
    /// Blocks until the previous batch on this session has fully drained:
    /// the server answers strictly in submission order and responses carry
    /// no tags, so interleaving would desynchronize the decode schema. A
    /// failed transmission invalidates the session and produces no tracker.
    pub fn submit(&self, batch: Batch) -> ClientResult<Tracker> {
        if batch.is_empty() {
            return Err(ClientError::Param);
        }

        let mut in_flight = self
            .shared
            .in_flight
            .lock()
            .expect("Session submit lock poisoned");

        if let Some(previous) = in_flight.take() {
            if let Some(previous) = previous.upgrade() {
                // Outcome irrelevant here; a receiver failure marks the
                // session invalid and the check below picks that up.
                let _ = previous.wait(None);
            }
        }

        if !self.shared.valid.load(Ordering::Acquire) {
            return Err(ClientError::Io(io::ErrorKind::NotConnected));
        }

        let batch = Arc::new(batch);
        let tracker = Arc::new(TrackerShared::new(batch.len()));

        {
            let mut transport = self
                .shared
                .transport
                .lock()
                .expect("Session transport lock poisoned");

            if let Err(err) = pipeline::transmit(transport.as_mut(), &batch) {
                self.shared.valid.store(false, Ordering::Release);
                logging::debug!(self.shared.log, "submit failed";
                                "context" => "submit",
                                "ops" => batch.len(),
                                "error" => ?err);
                return Err(err);
            }
        }

        logging::trace!(self.shared.log, "batch submitted";
                        "context" => "submit",
                        "ops" => batch.len());

        let session = Arc::clone(&self.shared);
        let receiver_batch = Arc::clone(&batch);
        let receiver_tracker = Arc::clone(&tracker);

        let spawned = thread::Builder::new()
            .name("rioc-receiver".to_string())
            .spawn(move || {
                let mut transport = session
                    .transport
                    .lock()
                    .expect("Session transport lock poisoned");

                let outcome = receiver::run(
                    transport.as_mut(),
                    &receiver_batch,
                    &receiver_tracker,
                    &session.log,
                );

                if let Err(err) = outcome {
                    if err.is_fatal() {
                        session.valid.store(false, Ordering::Release);
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(_) => {
                // The batch is on the wire with nobody to drain it.
                self.shared.valid.store(false, Ordering::Release);
                return Err(ClientError::Memory);
            }
        };

        *in_flight = Some(Arc::downgrade(&tracker));

        Ok(Tracker::new(batch, tracker, handle))
    }

    /// Looks up `key` and returns its value.
    pub fn get(&self, key: &[u8]) -> ClientResult<Vec<u8>> {
        let mut batch = self.batch();
        batch.add_get(key)?;

        match self.run_single(batch)? {
            Payload::Bytes(data) => Ok(data),
            _ => Err(ClientError::Protocol),
        }
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn insert(&self, key: &[u8], value: &[u8], timestamp: u64) -> ClientResult<()> {
        let mut batch = self.batch();
        batch.add_insert(key, value, timestamp)?;

        self.run_single(batch).map(|_| ())
    }

    /// Deletes `key`.
    pub fn delete(&self, key: &[u8], timestamp: u64) -> ClientResult<()> {
        let mut batch = self.batch();
        batch.add_delete(key, timestamp)?;

        self.run_single(batch).map(|_| ())
    }

    /// Returns all entries with keys in `start_key..=end_key`, in key
    /// order.
    pub fn range_query(&self, start_key: &[u8], end_key: &[u8]) -> ClientResult<Vec<RangeEntry>> {
        let mut batch = self.batch();
        batch.add_range_query(start_key, end_key)?;

        match self.run_single(batch)? {
            Payload::Range(entries) => Ok(entries),
            _ => Err(ClientError::Protocol),
        }
    }

    /// Adjusts the atomic counter at `key` by `delta` and returns the
    /// post-adjustment value.
    pub fn atomic_inc_dec(&self, key: &[u8], delta: i64, timestamp: u64) -> ClientResult<i64> {
        let mut batch = self.batch();
        batch.add_atomic_inc_dec(key, delta, timestamp)?;

        match self.run_single(batch)? {
            Payload::Counter(value) => Ok(value),
            _ => Err(ClientError::Protocol),
        }
    }

    /// Submit, wait, extract slot 0, retire. The slot status surfaces
    /// directly, so a missing key reports `NotFound` rather than an empty
    /// payload.
    fn run_single(&self, batch: Batch) -> ClientResult<Payload> {
        let tracker = self.submit(batch)?;
        tracker.wait(self.timeout_ms)?;

        let (status, payload) = tracker.into_result(0)?;
        status.to_error()?;

        Ok(payload)
    }

    #[cfg(test)]
    fn with_transport(transport: Box<dyn Transport>, timeout_ms: u32) -> Client {
        Client {
            shared: Arc::new(SessionShared {
                transport: Mutex::new(transport),
                valid: AtomicBool::new(true),
                in_flight: Mutex::new(None),
                log: logging::null(),
            }),
            timeout_ms,
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.valid.store(false, Ordering::Release);

        // A receiver still draining holds the transport lock; in that case
        // the stream is torn down when the last tracker releases the
        // session state.
        if let Ok(mut transport) = self.shared.transport.try_lock() {
            transport.close();
        }

        logging::debug!(self.shared.log, "session closed"; "context" => "disconnect");
    }
}
