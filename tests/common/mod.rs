//! In-process Bolt stub server for integration tests.
//!
//! Each connection gets its own `tokio::io::duplex` pair and a task that
//! answers requests with canned results:
//!
//! - `UNWIND range(a, b) ...` streams integers `a..=b` in column `x`
//! - `RETURN $n ...` returns the `n` parameter in column `n`
//! - `CREATE ...` returns no records and a write summary
//! - statements containing `SYNTAX` fail on RUN
//! - statements containing `1/0` fail on the first PULL
//! - statements containing `SLOW` answer RUN, PULL and DISCARD only after
//!   [`SLOW_REPLY`]
//!
//! After a FAILURE every request but RESET is IGNORED, like a real server.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use boltwire::bolt::message::{
    BoltRequest, BoltResponse, FailureMessage, SuccessMessage, ALL_RECORDS,
};
use boltwire::bolt::packstream::{decode, encode};
use boltwire::bolt::{BoltErrorCode, ChunkFramer, ChunkReader, PackStreamValue, StreamTransport};
use boltwire::driver::{AuthToken, Connector, Driver, DriverConfig, ServerAddress};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Reply delay for `SLOW` statements.
pub const SLOW_REPLY: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct StubLog {
    requests: Vec<String>,
    connections: usize,
    bookmarks: u64,
}

/// Shared handle to the stub server's request log.
#[derive(Debug, Clone, Default)]
pub struct StubServer {
    log: Arc<Mutex<StubLog>>,
}

impl StubServer {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Every request received, in order. RUN entries carry the statement text.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().requests.clone()
    }

    /// Number of requests whose entry starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    /// Index of the last request starting with `prefix`.
    pub fn last_index_of(&self, prefix: &str) -> Option<usize> {
        self.log.lock().requests.iter().rposition(|r| r.starts_with(prefix))
    }

    pub fn connections(&self) -> usize {
        self.log.lock().connections
    }

    /// Driver wired to this stub.
    pub fn driver(&self, fetch_size: usize) -> Driver {
        let config = DriverConfig::builder("bolt://stub:7687", AuthToken::basic("neo4j", "secret"))
            .expect("valid uri")
            .with_fetch_size(fetch_size)
            .build();
        Driver::with_connector(config, Arc::new(self.clone())).expect("valid config")
    }

    fn record(&self, entry: String) {
        self.log.lock().requests.push(entry);
    }

    fn next_bookmark(&self) -> String {
        let mut log = self.log.lock();
        log.bookmarks += 1;
        format!("stub:bm:{}", log.bookmarks)
    }
}

impl Connector for StubServer {
    fn connect<'a>(&'a self, _: &'a ServerAddress) -> BoxFuture<'a, io::Result<boltwire::bolt::BoxedStream>> {
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let id = {
                let mut log = self.log.lock();
                log.connections += 1;
                log.connections
            };
            tokio::spawn(serve(self.clone(), server, id));
            Ok(Box::new(client) as boltwire::bolt::BoxedStream)
        })
    }
}

// ============================================================================
// Server loop
// ============================================================================

struct PendingResult {
    rows: VecDeque<Vec<PackStreamValue>>,
    fail_on_pull: bool,
    slow: bool,
    tail: SuccessMessage,
}

struct StubConnection {
    stub: StubServer,
    failed: bool,
    in_tx: bool,
    pending: Option<PendingResult>,
}

async fn serve(stub: StubServer, mut stream: DuplexStream, id: usize) {
    let mut preamble = [0u8; 20];
    if stream.read_exact(&mut preamble).await.is_err() {
        return;
    }
    // Agree on the client's first proposal.
    let mut version = [0u8; 4];
    version.copy_from_slice(&preamble[4..8]);
    if stream.write_all(&version).await.is_err() {
        return;
    }

    let mut transport = StreamTransport::new(stream);
    let mut reader = ChunkReader::new();
    let mut framer = ChunkFramer::default();
    let mut conn = StubConnection {
        stub,
        failed: false,
        in_tx: false,
        pending: None,
    };

    loop {
        let Ok(body) = reader.read_message(&mut transport).await else {
            return;
        };
        let Ok(PackStreamValue::Structure(s)) = decode(&body) else {
            return;
        };
        let Ok(request) = BoltRequest::from_structure(&s) else {
            return;
        };

        let entry = match &request {
            BoltRequest::Run(run) => format!("RUN {}", run.query),
            other => other.name().to_string(),
        };
        conn.stub.record(entry);

        if matches!(request, BoltRequest::Goodbye) {
            return;
        }
        let slow = match &request {
            BoltRequest::Run(run) => run.query.contains("SLOW"),
            BoltRequest::Pull(_) | BoltRequest::Discard(_) => {
                conn.pending.as_ref().is_some_and(|p| p.slow)
            }
            _ => false,
        };
        if slow {
            tokio::time::sleep(SLOW_REPLY).await;
        }
        for response in conn.handle(request, id) {
            let Ok(bytes) = encode(&PackStreamValue::Structure(response.to_structure())) else {
                return;
            };
            if framer.write(&mut transport, &bytes).await.is_err()
                || framer.write_message_tail(&mut transport).await.is_err()
            {
                return;
            }
        }
    }
}

impl StubConnection {
    fn handle(&mut self, request: BoltRequest, id: usize) -> Vec<BoltResponse> {
        if self.failed && !matches!(request, BoltRequest::Reset) {
            return vec![BoltResponse::Ignored];
        }

        match request {
            BoltRequest::Hello(_) => vec![BoltResponse::Success(
                SuccessMessage::new()
                    .with("server", "Stub/1.0")
                    .with("connection_id", format!("bolt-{}", id)),
            )],
            BoltRequest::Reset => {
                self.failed = false;
                self.in_tx = false;
                self.pending = None;
                vec![success()]
            }
            BoltRequest::Run(run) => self.run(&run.query, &run.parameters),
            BoltRequest::Pull(ctl) => self.pull(ctl.n),
            BoltRequest::Discard(_) => match self.pending.take() {
                Some(result) => vec![BoltResponse::Success(result.tail)],
                None => self.fail("Neo.ClientError.Request.Invalid", "Nothing to discard"),
            },
            BoltRequest::Begin(_) => {
                self.in_tx = true;
                vec![success()]
            }
            BoltRequest::Commit => {
                self.in_tx = false;
                vec![BoltResponse::Success(
                    SuccessMessage::new().with("bookmark", self.stub.next_bookmark()),
                )]
            }
            BoltRequest::Rollback => {
                self.in_tx = false;
                vec![success()]
            }
            BoltRequest::Goodbye => vec![],
        }
    }

    fn run(&mut self, query: &str, params: &HashMap<String, PackStreamValue>) -> Vec<BoltResponse> {
        if query.contains("SYNTAX") {
            return self.fail(BoltErrorCode::SYNTAX_ERROR, "Invalid input 'SYNTAX'");
        }

        let mut tail = SuccessMessage::new()
            .with("type", "r")
            .with("t_last", 3i64)
            .with("db", "neo4j");
        let mut fields: Vec<&str> = Vec::new();
        let mut rows = VecDeque::new();

        if let Some((from, to)) = parse_range(query) {
            fields.push("x");
            rows.extend((from..=to).map(|x| vec![PackStreamValue::Integer(x)]));
        } else if query.starts_with("RETURN $n") {
            fields.push("n");
            rows.push_back(vec![params.get("n").cloned().unwrap_or(PackStreamValue::Null)]);
        } else if query.starts_with("CREATE") {
            let mut stats = HashMap::new();
            stats.insert("nodes-created".to_string(), PackStreamValue::Integer(1));
            stats.insert(
                "properties-set".to_string(),
                PackStreamValue::Integer(params.len() as i64),
            );
            tail = tail.with("type", "w").with("stats", PackStreamValue::Map(stats));
        } else if query.contains("1/0") {
            fields.push("x");
        }

        if !self.in_tx {
            tail = tail.with("bookmark", self.stub.next_bookmark());
        }
        self.pending = Some(PendingResult {
            rows,
            fail_on_pull: query.contains("1/0"),
            slow: query.contains("SLOW"),
            tail,
        });

        vec![BoltResponse::Success(
            SuccessMessage::new()
                .with("fields", fields)
                .with("t_first", 2i64),
        )]
    }

    fn pull(&mut self, n: i64) -> Vec<BoltResponse> {
        let Some(result) = self.pending.as_mut() else {
            return self.fail("Neo.ClientError.Request.Invalid", "Nothing to pull");
        };
        if result.fail_on_pull {
            self.pending = None;
            return self.fail("Neo.ClientError.Statement.ArithmeticError", "/ by zero");
        }

        let take = if n == ALL_RECORDS {
            result.rows.len()
        } else {
            (n.max(0) as usize).min(result.rows.len())
        };
        let mut responses: Vec<BoltResponse> = result
            .rows
            .drain(..take)
            .map(BoltResponse::Record)
            .collect();

        if result.rows.is_empty() {
            if let Some(done) = self.pending.take() {
                responses.push(BoltResponse::Success(done.tail));
            }
        } else {
            responses.push(BoltResponse::Success(SuccessMessage::new().with("has_more", true)));
        }
        responses
    }

    fn fail(&mut self, code: &str, message: &str) -> Vec<BoltResponse> {
        self.failed = true;
        self.pending = None;
        vec![BoltResponse::Failure(FailureMessage::new(code, message))]
    }
}

/// Route driver logs to the test harness (`RUST_LOG=boltwire=trace`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn success() -> BoltResponse {
    BoltResponse::Success(SuccessMessage::new())
}

/// `range(a, b)` bounds in a statement.
fn parse_range(query: &str) -> Option<(i64, i64)> {
    let start = query.find("range(")? + "range(".len();
    let end = start + query[start..].find(')')?;
    let (from, to) = query[start..end].split_once(',')?;
    Some((from.trim().parse().ok()?, to.trim().parse().ok()?))
}
