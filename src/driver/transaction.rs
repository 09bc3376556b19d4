//! Transaction API
//!
//! 트랜잭션 관리

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bolt::message::BoltRequest;

use super::cursor::ResultCursor;
use super::error::{DriverError, DriverResult};
use super::session::{SessionCore, SharedCore};
use super::summary::Query;
use super::types::Value;

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// 타임아웃
    pub timeout: Option<Duration>,
    /// 메타데이터
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// 활성 상태
    Active,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
    /// 실패
    Failed,
}

impl TransactionState {
    /// 완료 상태 여부
    pub fn is_terminated(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
///
/// 세션의 연결 위에서 BEGIN과 COMMIT/ROLLBACK 사이의 쿼리를 실행합니다.
/// 활성 상태로 드롭되면 세션의 다음 요청 전에 롤백됩니다.
pub struct Transaction {
    core: SharedCore,
    /// 세션이 이 트랜잭션을 식별하는 토큰
    token: Arc<()>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(core: SharedCore, token: Arc<()>) -> Self {
        Self {
            core,
            token,
            state: TransactionState::Active,
        }
    }

    /// 쿼리 실행
    pub async fn run(&mut self, query: impl Into<Query>) -> DriverResult<ResultCursor> {
        self.ensure_active()?;
        let mut core = self.core.lock().await;
        self.ensure_attached(&core)?;
        if core.transaction_failed() {
            return Err(DriverError::transaction(
                "Transaction has failed and must be rolled back",
            ));
        }
        core.run_statement(&self.core, query.into(), true).await
    }

    /// 커밋
    ///
    /// 스트리밍 중인 결과는 먼저 버퍼링됩니다.
    pub async fn commit(&mut self) -> DriverResult<()> {
        self.ensure_active()?;
        let mut core = self.core.lock().await;
        if let Err(e) = self.ensure_attached(&core) {
            self.state = TransactionState::RolledBack;
            return Err(e);
        }

        core.buffer_live().await;
        if let Err(e) = core.resync_connection().await {
            tracing::warn!("Reset after cancelled request failed: {}", e);
        }
        if core.transaction_failed() {
            if let Err(e) = core.rollback_on_connection().await {
                tracing::warn!("Reset of failed transaction failed: {}", e);
            }
            core.end_transaction();
            self.state = TransactionState::Failed;
            return Err(DriverError::transaction(
                "Transaction has failed and cannot be committed",
            ));
        }

        let result = match core.connection_mut() {
            Ok(conn) => conn
                .connection_mut()
                .request(&BoltRequest::Commit)
                .await
                .map_err(DriverError::from),
            Err(e) => Err(e),
        };
        core.end_transaction();

        match result {
            Ok(meta) => {
                core.update_bookmark(meta.bookmark());
                self.state = TransactionState::Committed;
                tracing::debug!("transaction committed");
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                Err(e)
            }
        }
    }

    /// 롤백
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.ensure_active()?;
        let mut core = self.core.lock().await;
        if self.ensure_attached(&core).is_err() {
            // The session already rolled it back on close.
            self.state = TransactionState::RolledBack;
            return Ok(());
        }

        core.buffer_live().await;
        let result = core.rollback_on_connection().await;
        core.end_transaction();

        match result {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                tracing::debug!("transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                Err(e)
            }
        }
    }

    /// 트랜잭션 닫기
    ///
    /// 활성 상태면 롤백합니다. 여러 번 호출해도 안전합니다.
    pub async fn close(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        if let Err(e) = self.rollback().await {
            tracing::warn!("Rollback on transaction close failed: {}", e);
        }
    }

    fn ensure_active(&self) -> DriverResult<()> {
        if self.state.is_terminated() {
            return Err(DriverError::transaction(format!(
                "Transaction is already {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn ensure_attached(&self, core: &SessionCore) -> DriverResult<()> {
        if core.owns_transaction(&self.token) {
            Ok(())
        } else {
            Err(DriverError::transaction("Session of this transaction is closed"))
        }
    }

    /// 상태
    pub fn state(&self) -> TransactionState {
        self.state
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_config() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_metadata("app", "billing")
            .with_metadata("attempt", 2i64);

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.metadata.len(), 2);
        assert_eq!(config.metadata.get("attempt"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_transaction_state_terminated() {
        assert!(!TransactionState::Active.is_terminated());
        assert!(TransactionState::Committed.is_terminated());
        assert!(TransactionState::RolledBack.is_terminated());
        assert!(TransactionState::Failed.is_terminated());
    }
}
