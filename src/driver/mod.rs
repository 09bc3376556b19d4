//! Driver Module
//!
//! 세션, 트랜잭션, 결과 커서와 연결 풀
//!
//! # Example
//!
//! ```ignore
//! use boltwire::driver::{AuthToken, Driver, Query, SessionConfig};
//!
//! let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//! let session = driver.session(SessionConfig::default())?;
//!
//! // 두 결과를 읽기 전에 실행해도 각자의 레코드를 순서대로 받음
//! let mut first = session.run("UNWIND range(1, 3) AS x RETURN x").await?;
//! let mut second = session.run(Query::new("RETURN $n AS n").with_param("n", 42)).await?;
//! let n = second.single().await?;
//! let xs = first.collect().await?;
//!
//! // 트랜잭션
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run(Query::new("CREATE (n:Person {name: $name})").with_params(params! {"name" => "Alice"})).await?;
//! tx.commit().await?;
//!
//! session.close().await;
//! driver.close().await;
//! ```

mod cursor;
mod driver;
mod error;
mod pool;
mod record;
mod session;
mod summary;
mod transaction;
mod types;

// Re-exports
pub use cursor::{CursorState, ResultCursor};
pub use driver::{
    AuthToken, Driver, DriverConfig, DriverConfigBuilder, DriverMetrics, ServerAddress, DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult};
pub use pool::{
    BoltConnection, ConnectionPool, ConnectionSettings, Connector, PoolConfig, PoolConfigBuilder,
    PoolMetrics, PooledConnection, TcpConnector,
};
pub use record::Record;
pub use session::{AccessMode, Bookmark, Session, SessionConfig, SessionConfigBuilder};
pub use summary::{Counters, Query, QueryType, ResultSummary};
pub use transaction::{Transaction, TransactionConfig, TransactionState};
pub use types::{Structure, Value};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::<String, $crate::driver::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::<String, $crate::driver::Value>::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro() {
        let empty = params!();
        assert!(empty.is_empty());

        let params = params! {"name" => "Alice", "age" => 30i64};
        assert_eq!(params.get("name"), Some(&Value::from("Alice")));
        assert_eq!(params.get("age"), Some(&Value::Integer(30)));

        let query = Query::new("RETURN $name").with_params(params);
        assert_eq!(query.parameters.len(), 2);
    }
}
