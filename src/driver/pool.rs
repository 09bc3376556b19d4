//! Connection Pool
//!
//! 연결 풀링
//!
//! 세마포어 허가(permit)는 사용 중인 연결마다 하나씩 잡혀 있으므로 유휴 연결과 사용 중인
//! 연결의 합이 `max_size`를 넘지 않습니다. 유휴 연결은 반환될 때 허가를 내려놓습니다.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::bolt::{
    BoxedStream, Connection, PackStreamCodec, StreamTransport, DEFAULT_CHUNK_CAPACITY,
    DEFAULT_MAX_MESSAGE_SIZE,
};

use super::driver::{AuthToken, ServerAddress};
use super::error::{DriverError, DriverResult};

/// 풀이 관리하는 Bolt 연결 타입
pub type BoltConnection = Connection<StreamTransport<BoxedStream>>;

// ============================================================================
// Connector - 스트림 생성
// ============================================================================

/// 서버 주소로 바이트 스트림을 여는 커넥터
pub trait Connector: Send + Sync + 'static {
    /// 스트림 열기
    fn connect<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, io::Result<BoxedStream>>;
}

/// TCP 커넥터
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(address.to_socket_addr()).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 최대 연결 수 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 |
/// | `idle_timeout` | 5분 | 유휴 타임아웃 |
/// | `acquisition_timeout` | 60초 | 연결 획득 대기 시간 |
/// | `connection_timeout` | 30초 | 연결 + 핸드셰이크 타임아웃 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 연결 획득 타임아웃
    pub acquisition_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.config.idle_timeout = duration;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, duration: Duration) -> Self {
        self.config.acquisition_timeout = duration;
        self
    }

    /// 연결 타임아웃 설정
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// ConnectionSettings - 연결 설정
// ============================================================================

/// 새 연결을 열 때 사용하는 설정
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// HELLO에 보낼 User Agent
    pub user_agent: String,
    /// 인증 토큰
    pub auth: AuthToken,
    /// 청크 크기 (헤더 포함)
    pub chunk_capacity: usize,
    /// 최대 메시지 크기
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("boltwire/{}", env!("CARGO_PKG_VERSION")),
            auth: AuthToken::None,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

#[derive(Debug, Default)]
struct PoolCounters {
    size: AtomicUsize,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_closed: AtomicU64,
    total_timeouts: AtomicU64,
}

/// 풀링된 연결
///
/// 드롭되면 풀 크기에서 빠집니다. 재사용하려면 [`ConnectionPool::release`]로 반환해야 합니다.
pub struct PooledConnection {
    /// 연결 ID
    id: u64,
    /// 생성 시간
    created_at: Instant,
    /// 마지막 사용 시간
    last_used: Instant,
    /// Bolt 연결
    connection: BoltConnection,
    /// 사용 중일 때만 보유
    permit: Option<OwnedSemaphorePermit>,
    counters: Arc<PoolCounters>,
}

impl PooledConnection {
    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 생성 시간
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 마지막 사용 시간
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Bolt 연결
    pub fn connection(&self) -> &BoltConnection {
        &self.connection
    }

    /// Bolt 연결 (가변)
    pub fn connection_mut(&mut self) -> &mut BoltConnection {
        &mut self.connection
    }

    /// 재사용 가능 여부
    fn is_reusable(&self, config: &PoolConfig) -> bool {
        self.connection.is_ready()
            && !self.connection.is_failed()
            && self.connection.pending_replies() == 0
            && self.created_at.elapsed() <= config.max_lifetime
    }

    /// 유휴 상태로 계속 둘 수 있는지 여부
    fn is_valid_idle(&self, config: &PoolConfig) -> bool {
        self.is_reusable(config) && self.last_used.elapsed() <= config.idle_timeout
    }

    async fn close(mut self) {
        self.connection.close().await;
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.connection.state())
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.counters.size.fetch_sub(1, Ordering::Relaxed);
        self.counters.total_closed.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
pub struct ConnectionPool {
    /// 서버 주소
    address: ServerAddress,
    /// 풀 설정
    config: PoolConfig,
    /// 연결 설정
    settings: ConnectionSettings,
    /// 커넥터
    connector: Arc<dyn Connector>,
    /// 유휴 연결들
    idle_connections: Mutex<VecDeque<PooledConnection>>,
    /// 세마포어 (사용 중인 연결 수 제한)
    semaphore: Arc<Semaphore>,
    /// 카운터
    counters: Arc<PoolCounters>,
    /// 다음 연결 ID
    next_id: AtomicU64,
    /// 열린 상태
    open: AtomicBool,
}

impl ConnectionPool {
    /// TCP 커넥터로 연결 풀 생성
    pub fn new(address: ServerAddress, config: PoolConfig, settings: ConnectionSettings) -> Self {
        Self::with_connector(address, config, settings, Arc::new(TcpConnector))
    }

    /// 지정한 커넥터로 연결 풀 생성
    pub fn with_connector(
        address: ServerAddress,
        config: PoolConfig,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size));

        Self {
            address,
            config,
            settings,
            connector,
            idle_connections: Mutex::new(VecDeque::new()),
            semaphore,
            counters: Arc::new(PoolCounters::default()),
            next_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
        }
    }

    /// 연결 획득
    ///
    /// 유효한 유휴 연결을 우선 재사용하고, 없으면 새로 연결합니다.
    pub async fn acquire(&self) -> DriverResult<PooledConnection> {
        if !self.is_open() {
            return Err(DriverError::pool("Pool is closed"));
        }

        let permit = match tokio::time::timeout(
            self.config.acquisition_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DriverError::pool("Pool is closed")),
            Err(_) => {
                self.counters.total_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(DriverError::timeout(format!(
                    "Connection acquisition timed out after {:?}",
                    self.config.acquisition_timeout
                )));
            }
        };

        let mut conn = match self.take_idle_connection().await {
            Some(conn) => conn,
            None => self.create_connection().await?,
        };
        conn.permit = Some(permit);
        conn.last_used = Instant::now();
        self.counters.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// 유휴 연결 가져오기 (만료된 연결은 닫음)
    async fn take_idle_connection(&self) -> Option<PooledConnection> {
        let mut expired = Vec::new();
        let found = {
            let mut idle = self.idle_connections.lock();
            loop {
                match idle.pop_front() {
                    Some(conn) if conn.is_valid_idle(&self.config) => break Some(conn),
                    Some(conn) => expired.push(conn),
                    None => break None,
                }
            }
        };

        for conn in expired {
            tracing::debug!(id = conn.id, "closing expired idle connection");
            conn.close().await;
        }
        found
    }

    /// 새 연결 생성 (TCP + 핸드셰이크 + HELLO)
    async fn create_connection(&self) -> DriverResult<PooledConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settings = &self.settings;

        let open = async {
            let stream = self.connector.connect(&self.address).await.map_err(|e| {
                DriverError::connection(format!("Failed to connect to {}: {}", self.address, e))
            })?;
            let mut connection = Connection::with_options(
                StreamTransport::new(stream),
                settings.chunk_capacity,
                settings.max_message_size,
                Box::new(PackStreamCodec),
            )?;
            connection.handshake().await?;
            connection
                .hello(&settings.user_agent, settings.auth.to_bolt_auth())
                .await?;
            Ok::<_, DriverError>(connection)
        };

        let connection = tokio::time::timeout(self.config.connection_timeout, open)
            .await
            .map_err(|_| {
                DriverError::timeout(format!(
                    "Connection to {} timed out after {:?}",
                    self.address, self.config.connection_timeout
                ))
            })??;

        tracing::debug!(
            id,
            address = %self.address,
            version = ?connection.protocol_version(),
            "connection created"
        );

        self.counters.size.fetch_add(1, Ordering::Relaxed);
        self.counters.total_created.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        Ok(PooledConnection {
            id,
            created_at: now,
            last_used: now,
            connection,
            permit: None,
            counters: self.counters.clone(),
        })
    }

    /// 연결 반환
    ///
    /// 실패 상태, 손상, 수명 초과인 연결이나 풀이 닫힌 뒤 반환된 연결은 닫습니다.
    pub async fn release(&self, mut conn: PooledConnection) {
        conn.permit = None;

        if !self.is_open() || !conn.is_reusable(&self.config) {
            tracing::debug!(
                id = conn.id,
                state = ?conn.connection.state(),
                failed = conn.connection.is_failed(),
                "discarding connection"
            );
            conn.close().await;
            return;
        }

        conn.last_used = Instant::now();
        self.idle_connections.lock().push_back(conn);
    }

    /// 풀 닫기 (여러 번 호출해도 안전)
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();

        let idle: Vec<PooledConnection> = self.idle_connections.lock().drain(..).collect();
        tracing::debug!(idle = idle.len(), "closing pool");
        for conn in idle {
            conn.close().await;
        }
    }

    /// 연결 확인 (RESET 왕복)
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        let mut conn = self.acquire().await?;
        let result = conn.connection_mut().reset().await;
        self.release(conn).await;
        result.map_err(|e| DriverError::connection(format!("Connection verification failed: {}", e)))
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            size: self.size(),
            idle: self.idle_count(),
            in_use: self.in_use_count(),
            total_acquisitions: self.counters.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.counters.total_created.load(Ordering::Relaxed),
            total_closed: self.counters.total_closed.load(Ordering::Relaxed),
            total_timeouts: self.counters.total_timeouts.load(Ordering::Relaxed),
        }
    }

    /// 풀 크기
    pub fn size(&self) -> usize {
        self.counters.size.load(Ordering::Relaxed)
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    /// 사용 중인 연결 수
    pub fn in_use_count(&self) -> usize {
        if self.is_open() {
            self.config.max_size - self.semaphore.available_permits()
        } else {
            self.size().saturating_sub(self.idle_count())
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
