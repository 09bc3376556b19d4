//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;
use thiserror::Error;

use crate::bolt::{BoltError, BoltErrorCode};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러
    #[error("Connection error: {0}")]
    Connection(String),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 청크 프레이밍 에러 (연결 폐기)
    #[error("Framing error: {0}")]
    Framing(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 트랜잭션 에러
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// 쿼리 에러 (서버 FAILURE)
    #[error("Query error: {code} - {message}")]
    Query { code: String, message: String },

    /// 이미 소비된 결과
    #[error("Result consumed: {0}")]
    ResultConsumed(String),

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 서비스 불가
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 인증 에러 생성
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 트랜잭션 에러 생성
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// 쿼리 에러 생성
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 소비된 결과 에러 생성
    pub fn result_consumed(msg: impl Into<String>) -> Self {
        Self::ResultConsumed(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 서버 에러 코드 (쿼리 에러만)
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => Some(code),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::ServiceUnavailable(_) => true,
            Self::Query { code, .. } => is_retryable_code(code),
            _ => false,
        }
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Authentication(_)
            | Self::Configuration(_)
            | Self::TypeConversion(_)
            | Self::ResultConsumed(_) => true,
            Self::Query { code, .. } => code.starts_with(BoltErrorCode::CLIENT_ERROR_PREFIX),
            _ => false,
        }
    }
}

/// 재시도 가능한 에러 코드 확인
fn is_retryable_code(code: &str) -> bool {
    code.starts_with(BoltErrorCode::TRANSIENT_PREFIX)
        || code == BoltErrorCode::NOT_A_LEADER
        || code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY_DATABASE
}

/// 인증 관련 서버 코드 확인
fn is_security_code(code: &str) -> bool {
    code.starts_with(BoltErrorCode::SECURITY_PREFIX)
}

// ============================================================================
// BoltError 변환
// ============================================================================

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Server { code, message } if is_security_code(&code) => {
                DriverError::Authentication(format!("{}: {}", code, message))
            }
            BoltError::Server { code, message } => DriverError::Query { code, message },
            BoltError::Io(e) => DriverError::Io(e),
            BoltError::ConnectionClosed => DriverError::connection("Connection closed by server"),
            BoltError::Framing(msg) => DriverError::Framing(msg),
            BoltError::MessageTooLarge { size, max } => DriverError::Framing(format!(
                "Message too large: {} bytes (max: {})",
                size, max
            )),
            e @ BoltError::ChunkCapacity { .. } => DriverError::configuration(e.to_string()),
            BoltError::PackStream(e) => DriverError::protocol(format!("PackStream: {}", e)),
            BoltError::Protocol(msg) => DriverError::Protocol(msg),
            BoltError::Handshake(msg) => DriverError::protocol(format!("Handshake: {}", msg)),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
