//! In-process server double speaking the wire protocol over a duplex pipe.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use zero_taos::Opts;
use zero_taos::col::ColumnMeta;
use zero_taos::constant::{Action, CODE_SUCCESS, Precision};
use zero_taos::protocol::block::decode_block;
use zero_taos::protocol::connect::read_connect;
use zero_taos::protocol::frame::{decode_request, encode_response};
use zero_taos::protocol::query::{
    read_binary_query, read_result_id, write_fetch_reply, write_result_set_reply,
    write_update_reply,
};
use zero_taos::protocol::schemaless::read_insert_lines;
use zero_taos::protocol::stmt::{
    PrepareReply, read_bind, read_prepare, read_set_tags, read_stmt_id, write_affected_rows,
    write_prepare_reply,
};
use zero_taos::tokio::Conn;
use zero_taos::tokio::framed::{read_frame, write_frame};

/// A request as the server saw it
#[derive(Debug, Clone)]
pub struct Request {
    pub action: Action,
    pub req_id: u64,
    pub meta: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Server side of a duplex pipe
pub struct ServerEnd {
    stream: DuplexStream,
    buffer: Vec<u8>,
}

/// Route client logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn pair() -> (DuplexStream, ServerEnd) {
    init_tracing();
    let (client, server) = tokio::io::duplex(1 << 16);
    (
        client,
        ServerEnd {
            stream: server,
            buffer: Vec::new(),
        },
    )
}

impl ServerEnd {
    /// Next request, `None` once the client hung up
    pub async fn recv(&mut self) -> Option<Request> {
        read_frame(&mut self.stream, &mut self.buffer).await.ok()?;
        let frame = decode_request(&self.buffer).unwrap();
        Some(Request {
            action: frame.action,
            req_id: frame.req_id,
            meta: frame.meta.to_vec(),
            payload: frame.payload.to_vec(),
        })
    }

    /// Next raw request frame, without its length prefix
    pub async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        read_frame(&mut self.stream, &mut self.buffer).await.ok()?;
        Some(self.buffer.clone())
    }

    pub async fn reply(&mut self, request: &Request, body: &[u8]) {
        self.reply_raw(request.action, request.req_id, CODE_SUCCESS, "", body)
            .await;
    }

    pub async fn reply_error(&mut self, request: &Request, code: u32, message: &str) {
        self.reply_raw(request.action, request.req_id, code, message, &[])
            .await;
    }

    pub async fn reply_raw(&mut self, action: Action, req_id: u64, code: u32, message: &str, body: &[u8]) {
        let frame = encode_response(action, req_id, code, message, body).unwrap();
        write_frame(&mut self.stream, &frame).await.unwrap();
    }

    /// Write bytes that are not a valid response frame
    pub async fn send_garbage(&mut self, bytes: &[u8]) {
        write_frame(&mut self.stream, bytes).await.unwrap();
    }

    /// Accept the connect handshake
    pub async fn accept_connect(&mut self) -> Request {
        let request = self.recv().await.unwrap();
        assert_eq!(request.action, Action::Connect);
        read_connect(&request.meta, &request.payload).unwrap();
        self.reply(&request, &[]).await;
        request
    }
}

pub fn test_opts() -> Opts {
    Opts {
        db: Some("power".to_string()),
        password: Some("taosdata".to_string()),
        ..Default::default()
    }
}

/// Connect a `Conn` to a fresh server end
pub async fn connect_pair(opts: &Opts) -> (Conn, ServerEnd) {
    let (client, mut server) = pair();
    let accept = async move {
        server.accept_connect().await;
        server
    };
    let (conn, server) = tokio::join!(Conn::new_with_stream(client, opts), accept);
    (conn.unwrap(), server)
}

/// Canned answer to one SQL text
#[derive(Clone)]
pub enum Canned {
    Update(u64),
    Rows {
        precision: Precision,
        schema: Vec<ColumnMeta>,
        /// Encoded blocks, in the order they are handed out
        blocks: Vec<Vec<u8>>,
        /// Ship the first block inside the query reply
        inline_first: bool,
    },
    Error(u32, String),
}

struct OpenResult {
    blocks: std::vec::IntoIter<Vec<u8>>,
}

#[derive(Default)]
struct PreparedOnServer {
    rows_since_exec: u64,
}

/// What the scripted server observed
#[derive(Default)]
pub struct Observed {
    pub requests: Vec<Request>,
    /// Table names set per statement, in order
    pub tables: Vec<String>,
    pub freed_results: Vec<u64>,
    pub closed_statements: Vec<u64>,
    pub lines: Vec<String>,
}

/// Scripted server answering queries, fetches and prepared batches
pub struct ScriptedServer {
    pub canned: HashMap<String, Canned>,
    pub observed: Arc<Mutex<Observed>>,
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self {
            canned: HashMap::new(),
            observed: Arc::new(Mutex::new(Observed::default())),
        }
    }

    pub fn with(mut self, sql: &str, canned: Canned) -> Self {
        self.canned.insert(sql.to_string(), canned);
        self
    }

    /// Serve `server` until the client hangs up
    pub fn spawn(self, mut server: ServerEnd) -> (Arc<Mutex<Observed>>, JoinHandle<()>) {
        let observed = Arc::clone(&self.observed);
        let handle = tokio::spawn(async move {
            let mut results: HashMap<u64, OpenResult> = HashMap::new();
            let mut statements: HashMap<u64, PreparedOnServer> = HashMap::new();
            let mut next_id = 100u64;

            while let Some(request) = server.recv().await {
                self.observed.lock().unwrap().requests.push(request.clone());
                match request.action {
                    Action::BinaryQuery => {
                        let sql = read_binary_query(&request.meta, &request.payload)
                            .unwrap()
                            .to_string();
                        match self.canned.get(&sql).cloned() {
                            Some(Canned::Update(affected)) => {
                                server.reply(&request, &write_update_reply(affected)).await;
                            }
                            Some(Canned::Rows {
                                precision,
                                schema,
                                blocks,
                                inline_first,
                            }) => {
                                next_id += 1;
                                let mut blocks = blocks.into_iter();
                                let first = if inline_first { blocks.next() } else { None };
                                let body = write_result_set_reply(
                                    next_id,
                                    precision,
                                    &schema,
                                    first.as_deref(),
                                )
                                .unwrap();
                                results.insert(next_id, OpenResult { blocks });
                                server.reply(&request, &body).await;
                            }
                            Some(Canned::Error(code, message)) => {
                                server.reply_error(&request, code, &message).await;
                            }
                            None => {
                                server
                                    .reply_error(&request, 0x2600, "syntax error near sql")
                                    .await;
                            }
                        }
                    }
                    Action::Fetch => {
                        let result_id = read_result_id(&request.meta).unwrap();
                        let Some(open) = results.get_mut(&result_id) else {
                            server.reply_error(&request, 0x0118, "invalid result id").await;
                            continue;
                        };
                        match open.blocks.next() {
                            Some(block) => {
                                server.reply(&request, &write_fetch_reply(Some(&block))).await;
                            }
                            None => {
                                results.remove(&result_id);
                                server.reply(&request, &write_fetch_reply(None)).await;
                            }
                        }
                    }
                    Action::FreeResult => {
                        let result_id = read_result_id(&request.meta).unwrap();
                        results.remove(&result_id);
                        self.observed.lock().unwrap().freed_results.push(result_id);
                        server.reply(&request, &[]).await;
                    }
                    Action::StmtPrepare => {
                        read_prepare(&request.meta, &request.payload).unwrap();
                        next_id += 1;
                        statements.insert(next_id, PreparedOnServer::default());
                        let reply = PrepareReply {
                            stmt_id: next_id,
                            is_insert: true,
                        };
                        server.reply(&request, &write_prepare_reply(reply)).await;
                    }
                    Action::StmtSetTags => {
                        let set = read_set_tags(&request.meta, &request.payload).unwrap();
                        if !set.descriptors.is_empty() {
                            let schema: Vec<_> = set
                                .descriptors
                                .iter()
                                .map(|d| d.column_meta(Precision::Millisecond))
                                .collect();
                            assert_eq!(decode_block(&schema, set.block).unwrap().rows(), 1);
                        }
                        self.observed
                            .lock()
                            .unwrap()
                            .tables
                            .push(set.table_name.to_string());
                        server.reply(&request, &[]).await;
                    }
                    Action::StmtBind => {
                        let bind = read_bind(&request.meta, &request.payload).unwrap();
                        let schema: Vec<_> = bind
                            .descriptors
                            .iter()
                            .map(|d| d.column_meta(Precision::Millisecond))
                            .collect();
                        let rows = decode_block(&schema, bind.block).unwrap().rows();
                        let Some(prepared) = statements.get_mut(&bind.stmt_id) else {
                            server.reply_error(&request, 0x021A, "invalid stmt").await;
                            continue;
                        };
                        prepared.rows_since_exec += rows as u64;
                        server.reply(&request, &[]).await;
                    }
                    Action::StmtExec => {
                        let stmt_id = read_stmt_id(&request.meta).unwrap();
                        let affected = statements
                            .get_mut(&stmt_id)
                            .map(|p| std::mem::take(&mut p.rows_since_exec))
                            .unwrap_or_default();
                        server.reply(&request, &write_affected_rows(affected)).await;
                    }
                    Action::StmtClose => {
                        let stmt_id = read_stmt_id(&request.meta).unwrap();
                        statements.remove(&stmt_id);
                        self.observed.lock().unwrap().closed_statements.push(stmt_id);
                        server.reply(&request, &[]).await;
                    }
                    Action::InsertLines => {
                        let insert = read_insert_lines(&request.meta, &request.payload).unwrap();
                        let count = insert.lines.len() as u64;
                        self.observed
                            .lock()
                            .unwrap()
                            .lines
                            .extend(insert.lines.iter().map(|l| l.to_string()));
                        server.reply(&request, &write_affected_rows(count)).await;
                    }
                    Action::Connect => {
                        server.reply(&request, &[]).await;
                    }
                }
            }
        });
        (observed, handle)
    }
}

/// Connect a `Conn` to a scripted server
pub async fn scripted(script: ScriptedServer) -> (Conn, Arc<Mutex<Observed>>) {
    let (conn, server) = connect_pair(&test_opts()).await;
    let (observed, _handle) = script.spawn(server);
    (conn, observed)
}
