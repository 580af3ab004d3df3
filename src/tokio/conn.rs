use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, instrument, warn};

use crate::constant::Precision;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::connect::connect;
use crate::protocol::frame::{Command, Response};
use crate::protocol::schemaless::insert_lines;
use crate::protocol::stmt::read_affected_rows;

use super::mux::Multiplexer;
use super::session::Statement;

/// State shared by a connection and every statement and cursor it created
pub(crate) struct ConnShared {
    pub(crate) mux: Multiplexer,
    current_database: Mutex<Option<String>>,
    schemaless_precision: Precision,
}

impl ConnShared {
    pub(crate) fn current_database(&self) -> Option<String> {
        self.current_database
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_current_database(&self, db: String) {
        *self
            .current_database
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(db);
    }

    /// Send `command` and decode its reply
    ///
    /// A reply that fails to decode closes the connection.
    pub(crate) async fn call<T>(
        &self,
        command: &Command,
        req_id: Option<u64>,
        timeout: Option<Duration>,
        decode: impl FnOnce(&Response) -> Result<T>,
    ) -> Result<T> {
        let response = self.mux.send(command, req_id, timeout).await?;
        decode(&response).inspect_err(|e| {
            if e.is_fatal() {
                warn!(req_id = format_args!("0x{:x}", response.req_id), error = %e, "closing connection");
                self.mux.close();
            }
        })
    }
}

/// One authenticated connection
///
/// Statements created from the same `Conn` share its connection; their
/// requests are multiplexed and may complete in any order.
pub struct Conn {
    shared: Arc<ConnShared>,
}

impl Conn {
    /// Connect over TCP or a unix socket and authenticate
    #[instrument(skip_all)]
    pub async fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;

        if let Some(socket_path) = &opts.socket {
            let stream = UnixStream::connect(socket_path).await?;
            Self::new_with_stream(stream, &opts).await
        } else {
            let addr = format!("{}:{}", opts.host_or_default(), opts.port);
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(opts.tcp_nodelay)?;
            Self::new_with_stream(stream, &opts).await
        }
    }

    /// Authenticate over an already connected stream
    pub async fn new_with_stream<S>(stream: S, opts: &Opts) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mux = Multiplexer::new(
            stream,
            opts.timeout,
            opts.max_in_flight,
            Arc::clone(&opts.req_ids),
        );

        let handshake = connect(
            &opts.user,
            opts.password.as_deref().unwrap_or_default(),
            opts.db.as_deref(),
        )?;
        if let Err(e) = mux.send(&handshake, None, None).await {
            mux.close();
            return Err(e);
        }
        debug!(user = %opts.user, db = ?opts.db, "connected");

        Ok(Self {
            shared: Arc::new(ConnShared {
                mux,
                current_database: Mutex::new(opts.db.clone()),
                schemaless_precision: opts.schemaless_precision,
            }),
        })
    }

    /// Create a statement on this connection
    pub fn statement(&self) -> Statement {
        Statement::new(Arc::clone(&self.shared))
    }

    /// Insert line protocol rows, returning the affected row count
    ///
    /// `precision` overrides `Opts::schemaless_precision`.
    #[instrument(skip_all)]
    pub async fn insert_lines<S: AsRef<str>>(
        &self,
        lines: &[S],
        precision: Option<Precision>,
    ) -> Result<u64> {
        let precision = precision.unwrap_or(self.shared.schemaless_precision);
        let command = insert_lines(lines, precision)?;
        self.shared
            .call(&command, None, None, |r| read_affected_rows(&r.body))
            .await
    }

    /// Default database, as last set by connect or a database switch
    pub fn current_database(&self) -> Option<String> {
        self.shared.current_database()
    }

    /// Default timeout of requests sent without their own; zero waits forever
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.mux.set_timeout(timeout);
    }

    pub fn timeout(&self) -> Duration {
        self.shared.mux.timeout()
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.shared.mux
    }

    pub fn is_closed(&self) -> bool {
        self.shared.mux.is_closed()
    }

    /// Close the connection; pending and later requests fail with
    /// `TransportClosed`
    pub fn close(&self) {
        self.shared.mux.close();
    }
}
