//! Request multiplexer over one duplex connection.
//!
//! Callers register a pending entry under a correlation id, hand the encoded
//! frame to the writer task, and wait on their own completion slot. The
//! reader task resolves slots by correlation id in whatever order replies
//! arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::constant::Action;
use crate::error::{Error, Result};
use crate::protocol::frame::{Command, Response, decode_response};
use crate::reqid::ReqIdGenerator;

use super::framed::{encode_frame, read_frame};

/// Frames queued for the writer before `send` waits
const OUTGOING_CAPACITY: usize = 64;

type Slot = oneshot::Sender<Result<Response>>;

struct PendingRequest {
    action: Action,
    /// Distinguishes registrations that reuse a correlation id
    token: u64,
    slot: Slot,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
    next_token: u64,
    closed: bool,
}

struct Shared {
    pending: Mutex<PendingTable>,
    req_ids: Arc<ReqIdGenerator>,
    /// One permit per request allowed in flight
    in_flight_limit: Semaphore,
    /// Default timeout in nanoseconds, 0 waits forever
    timeout_nanos: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a pending entry and return its correlation id and token
    fn register(&self, action: Action, req_id: Option<u64>, slot: Slot) -> Result<(u64, u64)> {
        let mut table = self.lock();
        if table.closed {
            return Err(Error::TransportClosed);
        }

        let req_id = match req_id {
            Some(id) if table.entries.contains_key(&id) => {
                return Err(Error::BadUsageError(format!(
                    "request id 0x{id:x} is already in flight"
                )));
            }
            Some(id) => id,
            None => {
                let entries = &table.entries;
                self.req_ids
                    .allocate(entries.len() + 1, |id| entries.contains_key(&id))?
            }
        };
        table.next_token += 1;
        let token = table.next_token;
        table.entries.insert(
            req_id,
            PendingRequest {
                action,
                token,
                slot,
            },
        );
        Ok((req_id, token))
    }

    /// Remove the entry under `req_id` if it is still registration `token`
    fn forget(&self, req_id: u64, token: u64) {
        let mut table = self.lock();
        if table.entries.get(&req_id).is_some_and(|p| p.token == token) {
            table.entries.remove(&req_id);
        }
    }

    /// Resolve the entry under `req_id`
    ///
    /// A reply whose action differs from its request's is a desync; the
    /// waiter and the reader both get `MalformedFrame`.
    fn dispatch(&self, action: Action, req_id: u64, result: Result<Response>) -> Result<()> {
        let entry = self.lock().entries.remove(&req_id);
        let Some(pending) = entry else {
            debug!(req_id = format_args!("0x{req_id:x}"), "dropping unmatched reply");
            return Ok(());
        };

        if pending.action != action {
            let message = format!(
                "reply 0x{req_id:x} carries {:?}, request was {:?}",
                action, pending.action
            );
            let _ = pending.slot.send(Err(Error::MalformedFrame(message.clone())));
            return Err(Error::MalformedFrame(message));
        }

        debug!(req_id = format_args!("0x{req_id:x}"), ?action, "reply dispatched");
        if pending.slot.send(result).is_err() {
            debug!(req_id = format_args!("0x{req_id:x}"), "waiter gone before its reply");
        }
        Ok(())
    }

    /// Close the table and fail every pending entry
    fn fail_all(&self) {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.closed = true;
            table.entries.drain().collect()
        };
        self.in_flight_limit.close();
        if !drained.is_empty() {
            debug!(pending = drained.len(), "failing pending requests");
        }
        for (_, pending) in drained {
            let _ = pending.slot.send(Err(Error::TransportClosed));
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn in_flight(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Removes the pending entry when a waiter stops waiting for any reason
struct PendingGuard<'a> {
    shared: &'a Shared,
    req_id: u64,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.forget(self.req_id, self.token);
    }
}

fn timeout_to_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Correlates requests and replies sharing one connection
pub struct Multiplexer {
    shared: Arc<Shared>,
    outgoing: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Multiplexer {
    /// Start the reader and writer tasks over `stream`
    ///
    /// Must be called within a tokio runtime. `timeout` is the default per
    /// request; zero waits forever. Once `max_in_flight` requests are
    /// outstanding, further `send` calls wait for one of them to finish.
    pub fn new<S>(
        stream: S,
        timeout: Duration,
        max_in_flight: usize,
        req_ids: Arc<ReqIdGenerator>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingTable::default()),
            req_ids,
            in_flight_limit: Semaphore::new(max_in_flight.clamp(1, Semaphore::MAX_PERMITS)),
            timeout_nanos: AtomicU64::new(timeout_to_nanos(timeout)),
        });
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);

        let reader = tokio::spawn(read_loop(BufReader::new(read_half), Arc::clone(&shared)));
        let writer = tokio::spawn(write_loop(write_half, outgoing_rx, Arc::clone(&shared)));

        Self {
            shared,
            outgoing,
            reader,
            writer,
        }
    }

    /// Send `command` and wait for its reply
    ///
    /// `req_id` overrides the generated correlation id and must not be in
    /// flight. `timeout` overrides the default; zero waits forever. A reply
    /// with a non-success status resolves as `ServerError`. Waits for a
    /// free slot while `max_in_flight` requests are outstanding.
    pub async fn send(
        &self,
        command: &Command,
        req_id: Option<u64>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let _permit = self
            .shared
            .in_flight_limit
            .acquire()
            .await
            .map_err(|_| Error::TransportClosed)?;
        let (slot, completion) = oneshot::channel();
        let (req_id, token) = self.shared.register(command.action, req_id, slot)?;
        let _guard = PendingGuard {
            shared: &self.shared,
            req_id,
            token,
        };
        let frame = encode_frame(command, req_id)?;
        debug!(req_id = format_args!("0x{req_id:x}"), action = ?command.action, "request sent");

        let exchange = async {
            self.outgoing
                .send(frame)
                .await
                .map_err(|_| Error::TransportClosed)?;
            completion.await.map_err(|_| Error::TransportClosed)?
        };

        let timeout = timeout.unwrap_or_else(|| self.timeout());
        if timeout.is_zero() {
            return exchange.await;
        }
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(req_id = format_args!("0x{req_id:x}"), ?timeout, "request timed out");
                Err(Error::RequestTimeout { req_id, timeout })
            }
        }
    }

    /// Next correlation id from the injected generator
    pub fn next_req_id(&self) -> u64 {
        self.shared.req_ids.next_candidate()
    }

    /// Default timeout of requests sent without their own
    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.shared.timeout_nanos.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.shared
            .timeout_nanos
            .store(timeout_to_nanos(timeout), Ordering::Relaxed);
    }

    /// Number of requests waiting for a reply
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stop both tasks and fail every pending and future request with
    /// `TransportClosed`
    #[instrument(skip_all)]
    pub fn close(&self) {
        self.shared.fail_all();
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, shared: Arc<Shared>) {
    let mut buffer = Vec::new();
    let reason = loop {
        if let Err(e) = read_frame(&mut reader, &mut buffer).await {
            break e;
        }
        match decode_response(&buffer) {
            Ok(frame) => {
                let (action, req_id) = (frame.action, frame.req_id);
                let result = frame.into_result().map_err(Error::from);
                if let Err(e) = shared.dispatch(action, req_id, result) {
                    break e;
                }
            }
            Err(e) => break e,
        }
    };

    match &reason {
        Error::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("connection closed by peer");
        }
        other => warn!(error = %other, "reader stopped"),
    }
    shared.fail_all();
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outgoing: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
) {
    while let Some(frame) = outgoing.recv().await {
        // `frame` already carries its length prefix
        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "writer stopped");
            shared.fail_all();
            return;
        }
    }
}
