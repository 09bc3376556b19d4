//! Session, transaction and result cursor behavior against the stub server.

mod common;

use std::time::Duration;

use boltwire::bolt::BoltErrorCode;
use boltwire::driver::{
    CursorState, DriverError, Query, QueryType, SessionConfig, TransactionState, Value,
};
use common::StubServer;

fn ints(records: &[boltwire::Record], key: &str) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get_as::<i64>(key).unwrap())
        .collect()
}

#[tokio::test]
async fn test_sequential_results_read_in_any_order() {
    let stub = StubServer::new();
    let driver = stub.driver(2);
    let session = driver.default_session().unwrap();

    let mut first = session.run("UNWIND range(1, 5) AS x RETURN x").await.unwrap();
    let mut second = session.run("UNWIND range(10, 12) AS x RETURN x").await.unwrap();
    assert_eq!(first.state(), CursorState::Buffered);
    assert_eq!(second.state(), CursorState::Streaming);

    let second_records = second.collect().await.unwrap();
    let first_records = first.collect().await.unwrap();
    assert_eq!(ints(&second_records, "x"), vec![10, 11, 12]);
    assert_eq!(ints(&first_records, "x"), vec![1, 2, 3, 4, 5]);

    // Only buffered results replay.
    first.rewind().unwrap();
    assert_eq!(first.next().await.unwrap().unwrap().get("x"), Some(&Value::Integer(1)));
    assert!(matches!(second.rewind(), Err(DriverError::ResultConsumed(_))));

    session.close().await;
    driver.close().await;
}

#[tokio::test]
async fn test_partially_read_result_keeps_order_after_buffering() {
    let stub = StubServer::new();
    let driver = stub.driver(2);
    let session = driver.default_session().unwrap();

    let mut first = session.run("UNWIND range(1, 6) AS x RETURN x").await.unwrap();
    assert_eq!(first.next().await.unwrap().unwrap().get_as::<i64>("x").unwrap(), 1);

    let mut second = session.run("RETURN $n AS n").await.unwrap();
    assert_eq!(second.single().await.unwrap().get("n"), Some(&Value::Null));

    let rest = first.collect().await.unwrap();
    assert_eq!(ints(&rest, "x"), vec![2, 3, 4, 5, 6]);

    session.close().await;
}

#[tokio::test]
async fn test_close_session_before_reading() {
    let stub = StubServer::new();
    let driver = stub.driver(10);
    let session = driver.default_session().unwrap();

    let mut cursor = session.run("UNWIND range(1, 100) AS x RETURN x").await.unwrap();
    session.close().await;

    assert_eq!(cursor.state(), CursorState::Discarded);
    assert!(cursor.next().await.unwrap().is_none());

    let summary = cursor.summary().await.unwrap();
    assert_eq!(summary.query.text, "UNWIND range(1, 100) AS x RETURN x");
    assert_eq!(summary.query_type, QueryType::ReadOnly);
    assert_eq!(summary.database.as_deref(), Some("neo4j"));
    assert_eq!(stub.count("DISCARD"), 1);

    // All replies were consumed before the connection went back to the pool.
    assert_eq!(driver.metrics().idle_connections, 1);
    assert_eq!(driver.metrics().in_use_connections, 0);
}

#[tokio::test]
async fn test_syntax_error_then_recovery() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let err = session.run("SYNTAX ERROR HERE").await.unwrap_err();
    match &err {
        DriverError::Query { code, message } => {
            assert_eq!(code, BoltErrorCode::SYNTAX_ERROR);
            assert!(message.contains("SYNTAX"));
        }
        other => panic!("expected query error, got {:?}", other),
    }
    assert!(err.is_client_error());

    let mut cursor = session
        .run(Query::new("RETURN $n AS n").with_param("n", 7i64))
        .await
        .unwrap();
    assert_eq!(cursor.single().await.unwrap().get_as::<i64>("n").unwrap(), 7);
    assert_eq!(stub.count("RESET"), 1);

    let fresh = driver.default_session().unwrap();
    let mut cursor = fresh.run("UNWIND range(1, 2) AS x RETURN x").await.unwrap();
    assert_eq!(cursor.collect().await.unwrap().len(), 2);
    assert_eq!(stub.count("RESET"), 1);

    fresh.close().await;
    session.close().await;
}

#[tokio::test]
async fn test_failure_while_streaming() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let mut cursor = session.run("RETURN 1/0 AS x").await.unwrap();
    let err = cursor.next().await.unwrap_err();
    assert_eq!(err.code(), Some("Neo.ClientError.Statement.ArithmeticError"));
    assert!(cursor.next().await.unwrap().is_none());

    let mut cursor = session.run("UNWIND range(1, 3) AS x RETURN x").await.unwrap();
    assert_eq!(cursor.collect().await.unwrap().len(), 3);

    session.close().await;
}

#[tokio::test]
async fn test_disposal_in_any_order() {
    let stub = StubServer::new();
    let driver = stub.driver(5);
    let session = driver.default_session().unwrap();
    let mut tx = session.begin_transaction(None).await.unwrap();
    let mut cursor = tx.run("UNWIND range(1, 20) AS x RETURN x").await.unwrap();

    driver.close().await;
    session.close().await;
    tx.close().await;
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert!(cursor.consume().await.is_ok());

    driver.close().await;
    session.close().await;
    tx.close().await;

    assert_eq!(stub.count("ROLLBACK"), 1);
    assert_eq!(driver.metrics().pool_size, 0);
}

#[tokio::test]
async fn test_summary_buffers_and_consume_discards() {
    let stub = StubServer::new();
    let driver = stub.driver(3);
    let session = driver.default_session().unwrap();

    let mut cursor = session.run("UNWIND range(1, 10) AS x RETURN x").await.unwrap();
    assert_eq!(cursor.keys(), vec!["x".to_string()]);
    cursor.next().await.unwrap();

    let summary = cursor.summary().await.unwrap();
    assert_eq!(summary.result_available_after, Some(std::time::Duration::from_millis(2)));
    assert_eq!(cursor.state(), CursorState::Buffered);
    assert_eq!(cursor.collect().await.unwrap().len(), 9);

    let mut cursor = session.run("UNWIND range(1, 10) AS x RETURN x").await.unwrap();
    let summary = cursor.consume().await.unwrap();
    assert_eq!(summary.query.text, "UNWIND range(1, 10) AS x RETURN x");
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(stub.count("DISCARD"), 1);

    let mut cursor = session
        .run(Query::new("CREATE (n {name: $name})").with_param("name", "Alice"))
        .await
        .unwrap();
    let summary = cursor.consume().await.unwrap();
    assert_eq!(summary.query_type, QueryType::WriteOnly);
    assert_eq!(summary.counters.nodes_created, 1);
    assert_eq!(summary.counters.properties_set, 1);
    assert!(summary.counters.contains_updates());
    assert_eq!(session.last_bookmark().await.map(|b| b.value().to_string()), summary.bookmark);

    session.close().await;
}

#[tokio::test]
async fn test_commit_buffers_live_result() {
    let stub = StubServer::new();
    let driver = stub.driver(2);
    let session = driver.session(SessionConfig::builder().with_database("neo4j").build()).unwrap();

    let mut tx = session.begin_transaction(None).await.unwrap();
    let mut cursor = tx.run("UNWIND range(1, 4) AS x RETURN x").await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(tx.state(), TransactionState::Committed);
    assert_eq!(cursor.state(), CursorState::Buffered);
    assert_eq!(ints(&cursor.collect().await.unwrap(), "x"), vec![1, 2, 3, 4]);
    assert!(session.last_bookmark().await.is_some());

    assert!(matches!(tx.commit().await, Err(DriverError::Transaction(_))));
    tx.close().await;

    session.close().await;
}

#[tokio::test]
async fn test_run_rejected_while_transaction_open() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let mut tx = session.begin_transaction(None).await.unwrap();
    assert!(matches!(
        session.run("RETURN $n AS n").await,
        Err(DriverError::Transaction(_))
    ));
    tx.rollback().await.unwrap();

    assert!(session.run("RETURN $n AS n").await.is_ok());
    session.close().await;
}

#[tokio::test]
async fn test_dropped_transaction_is_rolled_back() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let mut tx = session.begin_transaction(None).await.unwrap();
    tx.run("CREATE (n)").await.unwrap();
    drop(tx);

    let mut cursor = session.run("RETURN $n AS n").await.unwrap();
    cursor.consume().await.unwrap();

    let rollback = stub.last_index_of("ROLLBACK").unwrap();
    let run = stub.last_index_of("RUN RETURN").unwrap();
    assert!(rollback < run);

    session.close().await;
}

#[tokio::test]
async fn test_failed_transaction_cannot_commit() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let mut tx = session.begin_transaction(None).await.unwrap();
    assert!(matches!(
        tx.run("SYNTAX ERROR").await,
        Err(DriverError::Query { .. })
    ));
    assert!(matches!(
        tx.run("RETURN $n AS n").await,
        Err(DriverError::Transaction(_))
    ));
    assert!(tx.commit().await.is_err());
    assert_eq!(tx.state(), TransactionState::Failed);
    assert_eq!(stub.count("COMMIT"), 0);

    let mut cursor = session.run("UNWIND range(1, 2) AS x RETURN x").await.unwrap();
    assert_eq!(cursor.collect().await.unwrap().len(), 2);
    session.close().await;
}

#[tokio::test]
async fn test_into_stream() {
    use futures::TryStreamExt;

    let stub = StubServer::new();
    let driver = stub.driver(4);
    let session = driver.default_session().unwrap();

    let cursor = session.run("UNWIND range(1, 10) AS x RETURN x").await.unwrap();
    let records: Vec<_> = cursor.into_stream().try_collect().await.unwrap();
    assert_eq!(records.len(), 10);

    session.close().await;
}

#[tokio::test]
async fn test_verify_connectivity_and_pool_reuse() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    driver.verify_connectivity().await.unwrap();

    for _ in 0..3 {
        let session = driver.default_session().unwrap();
        session.run("RETURN $n AS n").await.unwrap().consume().await.unwrap();
        session.close().await;
    }

    assert_eq!(stub.connections(), 1);
    assert_eq!(stub.count("HELLO"), 1);
    let metrics = driver.metrics();
    assert_eq!(metrics.total_connections_created, 1);
    assert_eq!(metrics.total_acquisitions, 4);

    driver.close().await;
    assert_eq!(driver.metrics().pool_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_read_leaves_session_usable() {
    let stub = StubServer::new();
    let driver = stub.driver(2);
    let session = driver.default_session().unwrap();

    let mut first = session.run("UNWIND range(1, 6) AS x RETURN x SLOW").await.unwrap();
    let cancelled = tokio::time::timeout(Duration::from_millis(50), first.next()).await;
    assert!(cancelled.is_err());

    // The reply to the first PULL is still there to read.
    assert_eq!(first.next().await.unwrap().unwrap().get_as::<i64>("x").unwrap(), 1);
    assert_eq!(first.next().await.unwrap().unwrap().get_as::<i64>("x").unwrap(), 2);

    // Cancelled with the second PULL already sent.
    let cancelled = tokio::time::timeout(Duration::from_millis(50), first.next()).await;
    assert!(cancelled.is_err());

    let mut second = session
        .run(Query::new("RETURN $n AS n").with_param("n", 5i64))
        .await
        .unwrap();
    assert_eq!(second.single().await.unwrap().get_as::<i64>("n").unwrap(), 5);
    assert_eq!(ints(&first.collect().await.unwrap(), "x"), vec![3, 4, 5, 6]);

    // One PULL per batch, none repeated, no recovery needed.
    assert_eq!(stub.count("PULL"), 4);
    assert_eq!(stub.count("RESET"), 0);

    session.close().await;
    assert_eq!(driver.metrics().idle_connections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_is_reset_before_next_statement() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();
    session.run("RETURN $n AS n").await.unwrap().consume().await.unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        session.run("UNWIND range(1, 3) AS x RETURN x SLOW"),
    )
    .await;
    assert!(cancelled.is_err());

    let mut cursor = session
        .run(Query::new("RETURN $n AS n").with_param("n", 9i64))
        .await
        .unwrap();
    assert_eq!(cursor.single().await.unwrap().get_as::<i64>("n").unwrap(), 9);
    assert_eq!(stub.count("RESET"), 1);

    session.close().await;
    assert_eq!(driver.metrics().idle_connections, 1);
    assert_eq!(stub.connections(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_transaction_statement_fails_transaction() {
    let stub = StubServer::new();
    let driver = stub.driver(100);
    let session = driver.default_session().unwrap();

    let mut tx = session.begin_transaction(None).await.unwrap();
    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), tx.run("CREATE (n) SLOW")).await;
    assert!(cancelled.is_err());

    assert!(matches!(
        tx.run("RETURN $n AS n").await,
        Err(DriverError::Transaction(_))
    ));
    assert!(tx.commit().await.is_err());
    assert_eq!(tx.state(), TransactionState::Failed);
    assert_eq!(stub.count("COMMIT"), 0);
    assert_eq!(stub.count("RESET"), 1);

    let mut cursor = session.run("UNWIND range(1, 2) AS x RETURN x").await.unwrap();
    assert_eq!(cursor.collect().await.unwrap().len(), 2);
    session.close().await;
}

#[tokio::test]
async fn test_dropped_result_is_discarded_not_buffered() {
    let stub = StubServer::new();
    let driver = stub.driver(2);
    let session = driver.default_session().unwrap();

    let cursor = session.run("UNWIND range(1, 100) AS x RETURN x").await.unwrap();
    drop(cursor);

    let mut next = session.run("RETURN $n AS n").await.unwrap();
    next.consume().await.unwrap();

    assert_eq!(stub.count("PULL"), 2);
    assert_eq!(stub.count("DISCARD"), 1);
    assert!(session.last_bookmark().await.is_some());

    session.close().await;
    assert_eq!(driver.metrics().idle_connections, 1);
}
