//! # boltwire
//!
//! Client-side core of a Bolt wire-protocol graph database driver.
//!
//! ## Features
//!
//! - **Chunk framing** - length-prefixed chunks with a `00 00` end marker, bounded
//!   chunk capacity, and a [`tokio_util::codec::Decoder`] for the read path
//! - **Failure discipline** - a connection that received FAILURE is reset before
//!   it sends anything else
//! - **Lazy results** - records are pulled in `fetch_size` batches; a running
//!   result is buffered in memory before the session sends its next request
//! - **Connection pooling** - bounded pool with idle reuse and metrics
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use boltwire::{AuthToken, Driver, Query, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//!     let session = driver.session(SessionConfig::builder().with_database("neo4j").build())?;
//!
//!     let mut cursor = session
//!         .run(Query::new("UNWIND range(1, $n) AS x RETURN x").with_param("n", 10i64))
//!         .await?;
//!     while let Some(record) = cursor.next().await? {
//!         println!("{}", record);
//!     }
//!     let summary = cursor.summary().await?;
//!     println!("{:?}", summary.query_type);
//!
//!     session.close().await;
//!     driver.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Transactions
//!
//! ```rust,no_run
//! # use boltwire::{AuthToken, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7687", AuthToken::none())?;
//! # let session = driver.session(SessionConfig::default())?;
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Node {id: 1})").await?;
//! tx.run("CREATE (n:Node {id: 2})").await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - driver, session, transaction, and result types
//! - [`bolt`] - framing, messages, and the connection state machine

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, Bookmark, CursorState, Driver, DriverConfig, DriverConfigBuilder,
    DriverError, DriverMetrics, DriverResult, Query, Record, ResultCursor, ResultSummary,
    ServerAddress, Session, SessionConfig, SessionConfigBuilder, Transaction, TransactionConfig,
    Value,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
