//! Session Management
//!
//! 세션 관리
//!
//! 세션은 처음 사용할 때 풀에서 연결 하나를 빌려 닫힐 때까지 독점합니다. 모든 요청은
//! 보내기 전에 다음을 거칩니다.
//!
//! 1. live 커서 버퍼링 (이전 쿼리의 남은 레코드를 메모리로, 드롭된 커서면 DISCARD)
//! 2. 취소된 요청의 응답이 남아 있으면 RESET
//! 3. 버려진 트랜잭션 롤백
//! 4. 실패 상태면 RESET
//!
//! 요청 도중 future가 취소되어도 연결은 일관된 상태로 남습니다.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::bolt::message::{BoltRequest, BoltResponse, RequestExtra, RunMessage, ALL_RECORDS};
use crate::bolt::BoltError;

use super::cursor::{CursorBuffer, ResultCursor};
use super::error::{DriverError, DriverResult};
use super::pool::{ConnectionPool, PooledConnection};
use super::record::Record;
use super::summary::Query;
use super::transaction::{Transaction, TransactionConfig};
use super::types::{to_packstream_map, Value};

/// 세션 상태 공유 핸들
pub(crate) type SharedCore = Arc<tokio::sync::Mutex<SessionCore>>;

// ============================================================================
// AccessMode - 접근 모드
// ============================================================================

/// 접근 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// 읽기
    Read,
    /// 쓰기
    #[default]
    Write,
}

// ============================================================================
// Bookmark - 북마크
// ============================================================================

/// 인과적 일관성 북마크
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    /// 북마크 값
    value: String,
}

impl Bookmark {
    /// 새 북마크 생성
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// 북마크 값
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 빈 북마크 여부
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 데이터베이스 이름
    pub database: Option<String>,
    /// Fetch Size (None이면 드라이버 설정, 0이면 한 번에 전부)
    pub fetch_size: Option<usize>,
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
    /// 북마크
    pub bookmarks: Vec<Bookmark>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: usize) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.default_access_mode = mode;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.bookmarks = bookmarks;
        self
    }
}

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: usize) -> Self {
        self.config.fetch_size = Some(size);
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Write;
        self
    }

    /// 북마크 추가
    pub fn with_bookmark(mut self, bookmark: impl Into<Bookmark>) -> Self {
        self.config.bookmarks.push(bookmark.into());
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// SessionCore - 세션 내부 상태
// ============================================================================

/// 세션과 그 커서, 트랜잭션이 공유하는 상태
pub(crate) struct SessionCore {
    pool: Arc<ConnectionPool>,
    database: Option<String>,
    access_mode: AccessMode,
    fetch_size: i64,
    connection: Option<PooledConnection>,
    /// 연결에서 직접 레코드를 읽는 커서 (드롭된 커서는 버퍼링하지 않음)
    live: Option<Weak<Mutex<CursorBuffer>>>,
    /// 열린 트랜잭션 (핸들이 드롭되면 Weak가 끊어짐)
    tx: Option<Weak<()>>,
    tx_failed: bool,
    bookmarks: Vec<Bookmark>,
    last_bookmark: Option<Bookmark>,
    closed: bool,
}

impl SessionCore {
    fn new(pool: Arc<ConnectionPool>, config: SessionConfig, default_fetch_size: usize) -> Self {
        let fetch_size = match config.fetch_size.unwrap_or(default_fetch_size) {
            0 => ALL_RECORDS,
            n => i64::try_from(n).unwrap_or(ALL_RECORDS),
        };
        Self {
            pool,
            database: config.database,
            access_mode: config.default_access_mode,
            fetch_size,
            connection: None,
            live: None,
            tx: None,
            tx_failed: false,
            bookmarks: config.bookmarks,
            last_bookmark: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::session("Session is closed"))
        } else {
            Ok(())
        }
    }

    /// 트랜잭션 핸들이 살아 있는지 여부
    fn has_open_transaction(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.strong_count() > 0)
    }

    pub(crate) fn owns_transaction(&self, token: &Arc<()>) -> bool {
        self.tx
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|current| Arc::ptr_eq(&current, token))
    }

    pub(crate) fn transaction_failed(&self) -> bool {
        self.tx_failed
    }

    pub(crate) fn end_transaction(&mut self) {
        self.tx = None;
        self.tx_failed = false;
    }

    pub(crate) fn is_live(&self, buffer: &Arc<Mutex<CursorBuffer>>) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| std::ptr::eq(live.as_ptr(), Arc::as_ptr(buffer)))
    }

    fn current_bookmarks(&self) -> Vec<String> {
        match &self.last_bookmark {
            Some(bookmark) => vec![bookmark.value().to_string()],
            None => self.bookmarks.iter().map(|b| b.value().to_string()).collect(),
        }
    }

    pub(crate) fn update_bookmark(&mut self, bookmark: Option<&str>) {
        if let Some(value) = bookmark {
            self.last_bookmark = Some(Bookmark::new(value));
        }
    }

    /// BEGIN / auto-commit RUN 메타데이터
    pub(crate) fn request_extra(&self) -> RequestExtra {
        let mut extra = RequestExtra::default()
            .with_bookmarks(self.current_bookmarks())
            .with_read_only(self.access_mode == AccessMode::Read);
        if let Some(db) = &self.database {
            extra = extra.with_database(db.clone());
        }
        extra
    }

    fn note_failure(&mut self, err: &DriverError) {
        if self.tx.is_some() && matches!(err, DriverError::Query { .. }) {
            self.tx_failed = true;
        }
    }

    pub(crate) fn connection_mut(&mut self) -> DriverResult<&mut PooledConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| DriverError::session("Session has no connection"))
    }

    // ------------------------------------------------------------------------
    // 요청 준비
    // ------------------------------------------------------------------------

    /// 다음 요청 전에 연결을 깨끗한 상태로 만듦
    pub(crate) async fn prepare(&mut self, for_transaction: bool) -> DriverResult<()> {
        self.buffer_live().await;
        if let Err(e) = self.resync_connection().await {
            tracing::warn!("Reset after cancelled request failed: {}", e);
        }
        if for_transaction && self.tx_failed {
            return Err(DriverError::transaction(
                "Transaction has failed and must be rolled back",
            ));
        }
        if !for_transaction {
            self.rollback_abandoned().await;
        }
        self.ensure_connection().await?;

        let conn = self.connection_mut()?;
        conn.connection_mut().reset_if_failed().await?;
        Ok(())
    }

    async fn ensure_connection(&mut self) -> DriverResult<()> {
        let usable = self
            .connection
            .as_ref()
            .is_some_and(|c| c.connection().is_ready());

        if !usable {
            if let Some(broken) = self.connection.take() {
                if self.tx.is_some() {
                    self.tx_failed = true;
                }
                self.pool.release(broken).await;
            }
            self.connection = Some(self.pool.acquire().await?);
        }
        Ok(())
    }

    /// 취소된 요청의 응답이 남아 있으면 RESET으로 맞춤
    ///
    /// 열린 트랜잭션은 RESET으로 끝나므로 실패로 표시됩니다.
    pub(crate) async fn resync_connection(&mut self) -> DriverResult<()> {
        let Some(conn) = self.connection.as_mut() else {
            return Ok(());
        };
        let conn = conn.connection_mut();
        if !conn.is_ready() || conn.pending_replies() == 0 {
            return Ok(());
        }
        tracing::debug!(pending = conn.pending_replies(), "unread replies left by a cancelled request");
        let result = conn.reset().await;
        if self.tx.is_some() {
            self.tx_failed = true;
        }
        result.map_err(DriverError::from)
    }

    /// 핸들 없이 남은 트랜잭션 롤백
    async fn rollback_abandoned(&mut self) {
        if self.tx.is_none() || self.has_open_transaction() {
            return;
        }
        tracing::debug!("rolling back abandoned transaction");
        if let Err(e) = self.rollback_on_connection().await {
            tracing::warn!("Rollback of abandoned transaction failed: {}", e);
        }
        self.end_transaction();
    }

    /// 현재 연결에서 ROLLBACK (실패 상태면 RESET이 트랜잭션을 끝냄)
    pub(crate) async fn rollback_on_connection(&mut self) -> DriverResult<()> {
        let Some(conn) = self.connection.as_mut() else {
            return Ok(());
        };
        let conn = conn.connection_mut();
        if !conn.is_ready() {
            return Ok(());
        }
        if conn.is_failed() || conn.pending_replies() > 0 {
            conn.reset().await?;
            return Ok(());
        }
        if self.tx_failed {
            // Already ended by an earlier RESET or lost with its connection.
            return Ok(());
        }
        conn.request(&BoltRequest::Rollback).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 쿼리 실행
    // ------------------------------------------------------------------------

    /// RUN + PULL을 보내고 새 live 커서 생성
    pub(crate) async fn run_statement(
        &mut self,
        shared: &SharedCore,
        query: Query,
        in_transaction: bool,
    ) -> DriverResult<ResultCursor> {
        self.prepare(in_transaction).await?;

        let extra = if in_transaction {
            RequestExtra::default()
        } else {
            self.request_extra()
        };
        let run = BoltRequest::Run(
            RunMessage::new(query.text.clone())
                .with_parameters(to_packstream_map(query.parameters.clone()))
                .with_extra(extra),
        );
        let fetch_size = self.fetch_size;

        let conn = self.connection_mut()?.connection_mut();
        conn.send_message(&run).await?;
        conn.send_message(&BoltRequest::pull(fetch_size)).await?;

        let run_metadata = match conn.receive_message().await {
            Ok(BoltResponse::Success(meta)) => meta,
            Ok(other) => {
                return Err(DriverError::protocol(format!(
                    "Unexpected {} in reply to RUN",
                    other.name()
                )))
            }
            Err(BoltError::Server { code, message }) => {
                // The pipelined PULL is answered with IGNORED.
                if let Err(e) = conn.receive_message().await {
                    tracing::debug!(error = %e, "reply to PULL after failed RUN");
                }
                let err = DriverError::query(code, message);
                self.note_failure(&err);
                return Err(err);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::trace!(query = %query.text, "statement started");
        let buffer = Arc::new(Mutex::new(CursorBuffer::new(query, run_metadata, fetch_size)));
        self.live = Some(Arc::downgrade(&buffer));
        Ok(ResultCursor::new(buffer, shared.clone()))
    }

    /// PULL 한 배치 읽기 (필요하면 PULL 전송)
    ///
    /// 오류는 커서에 기록되고 함께 반환됩니다.
    pub(crate) async fn fetch_batch(&mut self, buffer: &Arc<Mutex<CursorBuffer>>) -> DriverResult<()> {
        let result = self.read_batch(buffer).await;
        if let Err(e) = &result {
            buffer.lock().fail(e);
            self.note_failure(e);
            if self.is_live(buffer) {
                self.live = None;
            }
        }
        result
    }

    async fn read_batch(&mut self, buffer: &Arc<Mutex<CursorBuffer>>) -> DriverResult<()> {
        let (fetch_size, keys) = {
            let buf = buffer.lock();
            (buf.fetch_size, buf.keys.clone())
        };

        // The live result owns every outstanding reply; none means the last
        // PULL has been answered in full.
        let conn = self.connection_mut()?.connection_mut();
        if conn.pending_replies() == 0 {
            conn.send_message(&BoltRequest::pull(fetch_size)).await?;
        }

        loop {
            match conn.receive_message().await? {
                BoltResponse::Record(fields) => {
                    let values: Vec<Value> = fields.into_iter().map(Value::from).collect();
                    buffer.lock().records.push(Record::new(keys.clone(), values));
                }
                BoltResponse::Success(meta) => {
                    if !meta.has_more() {
                        buffer.lock().finish(&meta);
                        self.update_bookmark(meta.bookmark());
                        if self.is_live(buffer) {
                            self.live = None;
                        }
                    }
                    return Ok(());
                }
                BoltResponse::Ignored => {
                    return Err(DriverError::protocol("PULL ignored by server"));
                }
                BoltResponse::Failure(f) => return Err(DriverError::query(f.code, f.message)),
            }
        }
    }

    /// live 커서의 남은 레코드를 모두 메모리로 읽음
    pub(crate) async fn buffer_live(&mut self) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let Some(buffer) = live.upgrade() else {
            // Nobody can read it any more.
            self.discard_live().await;
            return;
        };
        tracing::debug!("buffering live result");

        while !buffer.lock().done {
            if self.fetch_batch(&buffer).await.is_err() {
                break;
            }
        }
        buffer.lock().mark_buffered();
        self.live = None;
    }

    /// live 커서를 폐기: 진행 중인 PULL 응답을 비우고 DISCARD로 요약을 받음
    ///
    /// 커서가 이미 드롭되었으면 응답만 정리합니다.
    pub(crate) async fn discard_live(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        let buffer = live.upgrade();
        tracing::debug!(dropped = buffer.is_none(), "discarding live result");

        let result = self.drain_and_discard(buffer.as_ref()).await;
        if let Err(e) = &result {
            self.note_failure(e);
        }
        if let Some(buffer) = buffer {
            let mut buf = buffer.lock();
            if let Err(e) = &result {
                buf.fail(e);
            }
            buf.drop_records();
        }
    }

    async fn drain_and_discard(&mut self, buffer: Option<&Arc<Mutex<CursorBuffer>>>) -> DriverResult<()> {
        let conn = self.connection_mut()?.connection_mut();

        while conn.pending_replies() > 0 {
            match conn.receive_message().await? {
                BoltResponse::Record(_) => continue,
                BoltResponse::Success(meta) if meta.has_more() => continue,
                BoltResponse::Success(meta) => {
                    if let Some(buffer) = buffer {
                        buffer.lock().finish(&meta);
                    }
                    self.update_bookmark(meta.bookmark());
                    return Ok(());
                }
                other => {
                    return Err(DriverError::protocol(format!(
                        "Unexpected {} while draining PULL",
                        other.name()
                    )))
                }
            }
        }

        let meta = conn.request(&BoltRequest::discard_all()).await?;
        if let Some(buffer) = buffer {
            buffer.lock().finish(&meta);
        }
        self.update_bookmark(meta.bookmark());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 종료
    // ------------------------------------------------------------------------

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let live = self.live.as_ref().and_then(Weak::upgrade);
        self.discard_live().await;
        if let Some(live) = live {
            live.lock().discarded = true;
        }
        if self.tx.is_some() {
            if let Err(e) = self.rollback_on_connection().await {
                tracing::warn!("Rollback on session close failed: {}", e);
            }
            self.end_transaction();
        }
        if let Err(e) = self.resync_connection().await {
            tracing::warn!("Reset on session close failed: {}", e);
        }

        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.connection_mut().reset_if_failed().await {
                tracing::warn!("Reset on session close failed: {}", e);
            }
            self.pool.release(conn).await;
        }
        tracing::debug!("session closed");
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
///
/// 쿼리와 트랜잭션을 하나의 연결 위에서 순서대로 실행합니다.
pub struct Session {
    core: SharedCore,
    config: SessionConfig,
}

impl Session {
    /// 새 세션 생성 (연결은 첫 요청 때 획득)
    pub(crate) fn new(pool: Arc<ConnectionPool>, config: SessionConfig, default_fetch_size: usize) -> Self {
        let core = SessionCore::new(pool, config.clone(), default_fetch_size);
        Self {
            core: Arc::new(tokio::sync::Mutex::new(core)),
            config,
        }
    }

    /// 쿼리 실행 (auto-commit)
    ///
    /// 이전 결과가 아직 스트리밍 중이면 먼저 버퍼링합니다.
    pub async fn run(&self, query: impl Into<Query>) -> DriverResult<ResultCursor> {
        let mut core = self.core.lock().await;
        core.ensure_open()?;
        if core.has_open_transaction() {
            return Err(DriverError::transaction(
                "Cannot run a query in a session with an open transaction",
            ));
        }
        core.run_statement(&self.core, query.into(), false).await
    }

    /// 트랜잭션 시작
    pub async fn begin_transaction(&self, config: Option<TransactionConfig>) -> DriverResult<Transaction> {
        let mut core = self.core.lock().await;
        core.ensure_open()?;
        if core.has_open_transaction() {
            return Err(DriverError::transaction("A transaction is already open in this session"));
        }
        core.prepare(false).await?;

        let config = config.unwrap_or_default();
        let mut extra = core.request_extra();
        if let Some(timeout) = config.timeout {
            extra = extra.with_timeout(timeout);
        }
        if !config.metadata.is_empty() {
            extra = extra.with_metadata(to_packstream_map(config.metadata.clone()));
        }

        let conn = core.connection_mut()?.connection_mut();
        conn.request(&BoltRequest::Begin(extra)).await?;

        let token = Arc::new(());
        core.tx = Some(Arc::downgrade(&token));
        core.tx_failed = false;
        tracing::debug!("transaction started");
        Ok(Transaction::new(self.core.clone(), token))
    }

    /// 마지막 북마크
    pub async fn last_bookmark(&self) -> Option<Bookmark> {
        self.core.lock().await.last_bookmark.clone()
    }

    /// 세션 닫기
    ///
    /// 스트리밍 중인 결과는 폐기(요약은 유지)하고, 열린 트랜잭션은 롤백한 뒤 연결을 반환합니다.
    /// 여러 번 호출해도 안전합니다.
    pub async fn close(&self) {
        self.core.lock().await.close().await;
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("access_mode", &self.config.default_access_mode)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
