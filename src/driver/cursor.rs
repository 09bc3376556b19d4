//! ResultCursor
//!
//! 한 쿼리의 레코드 시퀀스
//!
//! 커서 상태는 `Streaming → Buffered → Exhausted` 또는 `Discarded`로 진행합니다.
//! 세션마다 연결에서 레코드를 직접 읽는(live) 커서는 최대 하나이며, 세션이 다음 요청을
//! 보내기 전에 그 커서를 버퍼링합니다. 세션은 커서를 약하게 참조하므로 드롭된 커서의
//! 남은 결과는 버퍼링 대신 폐기됩니다. 커서 버퍼 잠금은 `.await` 동안 유지하지 않습니다.

use std::sync::Arc;

use futures::stream::{self, Stream};
use parking_lot::Mutex;

use crate::bolt::message::SuccessMessage;

use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::session::SharedCore;
use super::summary::{Query, ResultSummary};

// ============================================================================
// CursorState - 커서 상태
// ============================================================================

/// 커서 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// 연결에서 지연 로딩 중
    Streaming,
    /// 남은 레코드를 메모리에 보관 (재시작 가능)
    Buffered,
    /// 더 이상 레코드 없음
    Exhausted,
    /// 세션 종료로 레코드 폐기 (요약은 유지)
    Discarded,
}

// ============================================================================
// CursorBuffer - 커서 공유 상태
// ============================================================================

/// 스트림 중단 원인
#[derive(Debug, Clone)]
pub(crate) enum StreamError {
    Query { code: String, message: String },
    Connection(String),
}

impl StreamError {
    pub(crate) fn to_driver_error(&self) -> DriverError {
        match self {
            Self::Query { code, message } => DriverError::query(code.clone(), message.clone()),
            Self::Connection(msg) => DriverError::connection(msg.clone()),
        }
    }
}

impl From<&DriverError> for StreamError {
    fn from(err: &DriverError) -> Self {
        match err {
            DriverError::Query { code, message } => Self::Query {
                code: code.clone(),
                message: message.clone(),
            },
            other => Self::Connection(other.to_string()),
        }
    }
}

/// 커서와 세션이 공유하는 상태
#[derive(Debug)]
pub(crate) struct CursorBuffer {
    pub(crate) query: Query,
    pub(crate) keys: Arc<[String]>,
    pub(crate) run_metadata: SuccessMessage,
    pub(crate) fetch_size: i64,
    /// 받았지만 아직 내보내지 않은 레코드 (버퍼링 후에는 재생용 전체)
    pub(crate) records: Vec<Record>,
    pub(crate) position: usize,
    /// 서버가 마지막 SUCCESS를 보냈거나 스트림이 중단됨
    pub(crate) done: bool,
    pub(crate) buffered: bool,
    pub(crate) discarded: bool,
    pub(crate) summary: Option<ResultSummary>,
    pub(crate) error: Option<StreamError>,
}

impl CursorBuffer {
    /// RUN 성공 직후 생성 (첫 PULL은 이미 전송됨)
    pub(crate) fn new(query: Query, run_metadata: SuccessMessage, fetch_size: i64) -> Self {
        Self {
            query,
            keys: run_metadata.fields().into(),
            run_metadata,
            fetch_size,
            records: Vec::new(),
            position: 0,
            done: false,
            buffered: false,
            discarded: false,
            summary: None,
            error: None,
        }
    }

    pub(crate) fn unread(&self) -> usize {
        self.records.len() - self.position
    }

    pub(crate) fn state(&self) -> CursorState {
        if self.discarded {
            CursorState::Discarded
        } else if self.buffered {
            if self.unread() > 0 {
                CursorState::Buffered
            } else {
                CursorState::Exhausted
            }
        } else if !self.done || self.unread() > 0 {
            CursorState::Streaming
        } else {
            CursorState::Exhausted
        }
    }

    fn take_next(&mut self) -> Option<Record> {
        let record = self.records.get(self.position).cloned()?;
        self.position += 1;
        if !self.buffered && self.position == self.records.len() {
            // Streaming records are yielded once.
            self.records.clear();
            self.position = 0;
        }
        Some(record)
    }

    /// 이미 내보낸 레코드를 버리고 버퍼링 상태로 전환
    pub(crate) fn mark_buffered(&mut self) {
        if !self.buffered {
            self.records.drain(..self.position);
            self.position = 0;
            self.buffered = true;
        }
    }

    /// 레코드를 모두 버림
    pub(crate) fn drop_records(&mut self) {
        self.records.clear();
        self.position = 0;
        self.buffered = false;
    }

    /// 마지막 SUCCESS 처리
    pub(crate) fn finish(&mut self, tail: &SuccessMessage) {
        self.done = true;
        self.summary = Some(ResultSummary::from_metadata(
            self.query.clone(),
            &self.run_metadata,
            tail,
        ));
    }

    /// 스트림 중단 처리
    pub(crate) fn fail(&mut self, err: &DriverError) {
        self.done = true;
        self.error = Some(StreamError::from(err));
    }
}

// ============================================================================
// ResultCursor - 결과 커서
// ============================================================================

/// 쿼리 결과 커서
///
/// 세션이나 트랜잭션의 `run`이 반환합니다. 레코드는 `fetch_size` 단위로 필요할 때 가져옵니다.
pub struct ResultCursor {
    buffer: Arc<Mutex<CursorBuffer>>,
    session: SharedCore,
}

impl ResultCursor {
    pub(crate) fn new(buffer: Arc<Mutex<CursorBuffer>>, session: SharedCore) -> Self {
        Self { buffer, session }
    }

    /// 컬럼 키
    pub fn keys(&self) -> Vec<String> {
        self.buffer.lock().keys.to_vec()
    }

    /// 현재 상태
    pub fn state(&self) -> CursorState {
        self.buffer.lock().state()
    }

    /// 다음 레코드
    ///
    /// 스트림이 서버 오류로 중단되면 그 오류를 한 번 반환하고, 이후에는 `None`입니다.
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        loop {
            {
                let mut buf = self.buffer.lock();
                if let Some(record) = buf.take_next() {
                    return Ok(Some(record));
                }
                if let Some(err) = buf.error.take() {
                    return Err(err.to_driver_error());
                }
                if buf.done {
                    return Ok(None);
                }
            }

            let mut core = self.session.lock().await;
            {
                // Buffered or discarded while waiting for the session.
                let buf = self.buffer.lock();
                if buf.done || buf.unread() > 0 {
                    continue;
                }
            }
            if !core.is_live(&self.buffer) {
                return Err(DriverError::session("Result is no longer attached to its session"));
            }
            // Errors are recorded in the buffer and surface on the next pass.
            let _ = core.fetch_batch(&self.buffer).await;
        }
    }

    /// 버퍼링된 결과를 처음부터 다시 읽기
    pub fn rewind(&mut self) -> DriverResult<()> {
        let mut buf = self.buffer.lock();
        if !buf.buffered {
            return Err(DriverError::result_consumed(
                "Only buffered results can be replayed",
            ));
        }
        buf.position = 0;
        Ok(())
    }

    /// 결과 요약
    ///
    /// 남은 레코드는 버퍼링되어 계속 읽을 수 있습니다.
    pub async fn summary(&mut self) -> DriverResult<ResultSummary> {
        if !self.buffer.lock().done {
            let mut core = self.session.lock().await;
            if core.is_live(&self.buffer) {
                core.buffer_live().await;
            }
        }
        self.finished_summary()
    }

    /// 남은 레코드를 버리고 (DISCARD) 요약 반환
    pub async fn consume(&mut self) -> DriverResult<ResultSummary> {
        if !self.buffer.lock().done {
            let mut core = self.session.lock().await;
            if core.is_live(&self.buffer) {
                core.discard_live().await;
            }
        }
        self.buffer.lock().drop_records();
        self.finished_summary()
    }

    fn finished_summary(&self) -> DriverResult<ResultSummary> {
        let buf = self.buffer.lock();
        if let Some(summary) = &buf.summary {
            return Ok(summary.clone());
        }
        match &buf.error {
            Some(err) => Err(err.to_driver_error()),
            None => Err(DriverError::result_consumed("Result summary is not available")),
        }
    }

    /// 남은 레코드 모두 수집
    pub async fn collect(&mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// 레코드가 정확히 하나일 때 반환
    pub async fn single(&mut self) -> DriverResult<Record> {
        let mut records = self.collect().await?;
        if records.len() != 1 {
            return Err(DriverError::type_conversion(format!(
                "Expected single record, got {}",
                records.len()
            )));
        }
        Ok(records.remove(0))
    }

    /// 레코드 스트림으로 변환
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> + Send {
        stream::unfold(self, |mut cursor| async move {
            match cursor.next().await {
                Ok(Some(record)) => Some((Ok(record), cursor)),
                Ok(None) => None,
                Err(e) => Some((Err(e), cursor)),
            }
        })
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buf = self.buffer.lock();
        f.debug_struct("ResultCursor")
            .field("query", &buf.query.text)
            .field("state", &buf.state())
            .field("unread", &buf.unread())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
