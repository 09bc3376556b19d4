//! Driver
//!
//! 드라이버 인스턴스 및 설정

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::bolt::packstream::PackStreamValue;
use crate::bolt::{
    ChunkFramer, DEFAULT_CHUNK_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE,
};

use super::error::{DriverError, DriverResult};
use super::pool::{ConnectionPool, ConnectionSettings, Connector, PoolConfig, TcpConnector};
use super::session::{Session, SessionConfig};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
///
/// 해석하지 않고 HELLO 메시지에 그대로 실어 보냅니다.
#[derive(Debug, Clone, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        /// 사용자명
        username: String,
        /// 비밀번호
        password: String,
        /// Realm
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer {
        /// 토큰
        token: String,
    },
    /// Kerberos 인증
    Kerberos {
        /// Base64 티켓
        ticket: String,
    },
    /// 커스텀 인증
    Custom {
        /// Principal
        principal: String,
        /// Credentials
        credentials: String,
        /// Realm
        realm: String,
        /// 스킴
        scheme: String,
        /// 추가 파라미터
        parameters: Option<HashMap<String, String>>,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Kerberos 토큰 생성
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::Kerberos {
            ticket: ticket.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Kerberos { .. } => "kerberos",
            Self::Custom { scheme, .. } => scheme,
        }
    }

    /// HELLO 메시지용 인증 맵
    pub fn to_bolt_auth(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("scheme".to_string(), PackStreamValue::from(self.scheme()));

        let mut put = |key: &str, value: &str| {
            map.insert(key.to_string(), PackStreamValue::from(value));
        };
        match self {
            Self::None => {}
            Self::Basic {
                username,
                password,
                realm,
            } => {
                put("principal", username);
                put("credentials", password);
                if let Some(realm) = realm {
                    put("realm", realm);
                }
            }
            Self::Bearer { token } => put("credentials", token),
            Self::Kerberos { ticket } => {
                put("principal", "");
                put("credentials", ticket);
            }
            Self::Custom {
                principal,
                credentials,
                realm,
                parameters,
                ..
            } => {
                put("principal", principal);
                put("credentials", credentials);
                if !realm.is_empty() {
                    put("realm", realm);
                }
                if let Some(params) = parameters {
                    let params = params
                        .iter()
                        .map(|(k, v)| (k.clone(), PackStreamValue::from(v.as_str())))
                        .collect();
                    map.insert("parameters".to_string(), PackStreamValue::Map(params));
                }
            }
        }
        map
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// URI에서 파싱 (`bolt://host[:port]`)
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        let rest = match uri.split_once("://") {
            Some(("bolt", rest)) => rest,
            Some((scheme, _)) => {
                return Err(DriverError::configuration(format!(
                    "Unsupported URI scheme: {}",
                    scheme
                )))
            }
            None => uri,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| DriverError::configuration(format!("Invalid port: {}", port)))?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };
        if host.is_empty() || host.contains(':') {
            return Err(DriverError::configuration(format!(
                "Invalid server address: {}",
                uri
            )));
        }
        Ok(Self::new(host, port))
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 서버 주소
    pub address: ServerAddress,
    /// 인증 토큰
    pub auth: AuthToken,
    /// User Agent
    pub user_agent: String,
    /// 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// Fetch Size (0이면 한 번에 전부)
    pub fetch_size: usize,
    /// 청크 크기 (헤더 포함)
    pub chunk_capacity: usize,
    /// 최대 수신 메시지 크기
    pub max_message_size: usize,
}

impl DriverConfig {
    /// 새 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        Ok(Self {
            address: ServerAddress::from_uri(uri)?,
            auth,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::builder()
            .max_size(self.max_connection_pool_size)
            .acquisition_timeout(self.connection_acquisition_timeout)
            .connection_timeout(self.connection_timeout)
            .build()
    }

    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            user_agent: self.user_agent.clone(),
            auth: self.auth.clone(),
            chunk_capacity: self.chunk_capacity,
            max_message_size: self.max_message_size,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: ServerAddress::default(),
            auth: AuthToken::default(),
            user_agent: format!("boltwire/{}", env!("CARGO_PKG_VERSION")),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            fetch_size: 1000,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
#[derive(Debug)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: usize) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 청크 크기 설정
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.config.chunk_capacity = capacity;
        self
    }

    /// 최대 메시지 크기 설정
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 그래프 데이터베이스 드라이버
///
/// 설정과 연결 풀을 보유하고 세션을 생성합니다.
pub struct Driver {
    /// 설정
    config: DriverConfig,
    /// 연결 풀
    pool: Arc<ConnectionPool>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl Driver {
    /// 새 드라이버 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let config = DriverConfig::new(uri, auth)?;
        Self::with_config(config)
    }

    /// 설정으로 드라이버 생성 (TCP)
    pub fn with_config(config: DriverConfig) -> DriverResult<Self> {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// 지정한 커넥터로 드라이버 생성
    pub fn with_connector(config: DriverConfig, connector: Arc<dyn Connector>) -> DriverResult<Self> {
        // Reject a bad chunk capacity before any connection is opened.
        ChunkFramer::new(config.chunk_capacity)?;
        if config.max_connection_pool_size == 0 {
            return Err(DriverError::configuration("Pool size must be at least 1"));
        }

        let pool = ConnectionPool::with_connector(
            config.address.clone(),
            config.pool_config(),
            config.connection_settings(),
            connector,
        );
        tracing::debug!(address = %config.address, "driver created");

        Ok(Self {
            config,
            pool: Arc::new(pool),
            open: RwLock::new(true),
        })
    }

    /// 세션 생성
    ///
    /// 연결은 세션의 첫 요청 때 획득합니다.
    pub fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        Ok(Session::new(self.pool.clone(), config, self.config.fetch_size))
    }

    /// 기본 설정으로 세션 생성
    pub fn default_session(&self) -> DriverResult<Session> {
        self.session(SessionConfig::default())
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 드라이버 종료
    ///
    /// 유휴 연결을 닫습니다. 세션이 아직 빌려 간 연결은 반환될 때 닫힙니다.
    /// 여러 번 호출해도 안전합니다.
    pub async fn close(&self) {
        let was_open = std::mem::replace(&mut *self.open.write(), false);
        if !was_open {
            return;
        }
        self.pool.close().await;
        tracing::debug!(address = %self.config.address, "driver closed");
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// 연결 테스트
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.ensure_open()?;
        self.pool.verify_connectivity().await
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::service_unavailable("Driver is closed"))
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> DriverMetrics {
        let pool_metrics = self.pool.metrics();
        DriverMetrics {
            pool_size: pool_metrics.size,
            idle_connections: pool_metrics.idle,
            in_use_connections: pool_metrics.in_use,
            total_acquisitions: pool_metrics.total_acquisitions,
            total_connections_created: pool_metrics.total_created,
            total_connections_closed: pool_metrics.total_closed,
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.address)
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// DriverMetrics - 드라이버 메트릭
// ============================================================================

/// 드라이버 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverMetrics {
    /// 현재 풀 크기
    pub pool_size: usize,
    /// 유휴 연결 수
    pub idle_connections: usize,
    /// 사용 중인 연결 수
    pub in_use_connections: usize,
    /// 총 연결 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성된 연결 수
    pub total_connections_created: u64,
    /// 총 닫힌 연결 수
    pub total_connections_closed: u64,
}

// ============================================================================
// Tests
// ============================================================================
