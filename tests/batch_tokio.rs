//! Batch execution against a scripted server, tokio API.

mod common;

use std::thread::JoinHandle;
use std::time::Duration;

use common::{Backend, INT4, TEXT, opts, serve};
use pg_batch::tokio::{Conn, Stream};
use pg_batch::{Batch, Error, TransactionStatus};

async fn connect(exchanges: Vec<Vec<u8>>) -> (Conn, JoinHandle<Vec<Vec<u8>>>) {
    let (client, handle) = serve(exchanges);
    client.set_nonblocking(true).unwrap();
    let stream = tokio::net::UnixStream::from_std(client).unwrap();
    let conn = Conn::new_with_stream(Stream::unix(stream), opts())
        .await
        .unwrap();
    (conn, handle)
}

fn server_code(e: &Error) -> Option<&str> {
    match e {
        Error::Server(e) => e.code(),
        _ => None,
    }
}

#[tokio::test]
async fn results_come_back_in_queue_order() {
    let reply = Backend::new()
        .exec("INSERT 0 2")
        .query(
            &[("id", INT4), ("name", TEXT)],
            &[&[Some("1"), Some("a")], &[Some("2"), Some("b")]],
            "SELECT 2",
        )
        .ready(b'I')
        .build();
    let (mut conn, handle) = connect(vec![reply]).await;

    let mut batch = Batch::new();
    batch.queue("INSERT INTO t (name) VALUES ($1), ($2)", ("a", "b"));
    batch.queue("SELECT id, name FROM t ORDER BY id", ());

    let mut results = conn.send_batch(&batch).await.unwrap();
    assert_eq!(results.exec_results().await.unwrap().rows_affected(), 2);

    let mut rows = results.query_results().await.unwrap();
    let mut seen = Vec::new();
    while rows.advance().await {
        let (id, name): (i32, String) = rows.scan().unwrap();
        seen.push((id, name));
    }
    rows.close().await.unwrap();
    assert_eq!(seen, [(1, "a".to_string()), (2, "b".to_string())]);

    assert!(matches!(
        results.query_results().await.err(),
        Some(Error::InvalidUsage(_))
    ));
    results.close().await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(handle.join().unwrap()[0], b"PBDEPBDES");
}

#[tokio::test]
async fn dropped_results_are_read_by_next_operation() {
    let reply = Backend::new()
        .exec("INSERT 0 1")
        .query(&[("n", INT4)], &[&[Some("1")]], "SELECT 1")
        .ready(b'I')
        .build();
    let next = Backend::new()
        .query(&[("n", INT4)], &[&[Some("5")]], "SELECT 1")
        .ready(b'I')
        .build();
    let (mut conn, handle) = connect(vec![reply, next]).await;

    let mut batch = Batch::new();
    batch.queue("INSERT INTO t VALUES (1)", ());
    batch.queue("SELECT 1", ());
    {
        let mut results = conn.send_batch(&batch).await.unwrap();
        results.exec_results().await.unwrap();
    }
    assert!(!conn.is_broken());

    let mut batch = Batch::new();
    batch.queue("SELECT 5", ());
    let mut results = conn.send_batch(&batch).await.unwrap();
    let (n,): (i32,) = results.query_row_results().await.scan().await.unwrap();
    assert_eq!(n, 5);
    results.close().await.unwrap();
    conn.close().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn dropped_row_stream_is_skipped() {
    let reply = Backend::new()
        .query(&[("n", INT4)], &[&[Some("1")], &[Some("2")]], "SELECT 2")
        .exec("UPDATE 1")
        .ready(b'I')
        .build();
    let (mut conn, handle) = connect(vec![reply]).await;

    let mut batch = Batch::new();
    batch.queue("SELECT 1 UNION ALL SELECT 2", ());
    batch.queue("UPDATE t SET n = 1", ());

    let mut results = conn.send_batch(&batch).await.unwrap();
    {
        let mut rows = results.query_results().await.unwrap();
        assert!(rows.advance().await);
    }
    assert_eq!(results.exec_results().await.unwrap().rows_affected(), 1);
    results.close().await.unwrap();
    conn.close().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn error_aborts_rest_of_batch() {
    let reply = Backend::new()
        .parse_complete()
        .bind_complete()
        .error("22012", "division by zero")
        .ready(b'I')
        .build();
    let (mut conn, handle) = connect(vec![reply]).await;

    let mut batch = Batch::new();
    batch.queue("SELECT 1 / 0", ());
    batch.queue("SELECT 1", ());

    let mut results = conn.send_batch(&batch).await.unwrap();
    let err = results.query_results().await.err().unwrap();
    assert_eq!(server_code(&err), Some("22012"));
    let err = results.query_row_results().await.scan::<(i32,)>().await.unwrap_err();
    assert_eq!(server_code(&err), Some("22012"));
    let err = results.close().await.unwrap_err();
    assert_eq!(server_code(&err), Some("22012"));
    assert!(!conn.is_broken());
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);
    conn.close().await.unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn transaction_commit() {
    let begin = Backend::new()
        .command_complete("BEGIN")
        .ready(b'T')
        .build();
    let batch_reply = Backend::new().exec("INSERT 0 1").ready(b'T').build();
    let commit = Backend::new()
        .command_complete("COMMIT")
        .ready(b'I')
        .build();
    let (mut conn, handle) = connect(vec![begin, batch_reply, commit]).await;

    let tx = conn.begin().await.unwrap();
    let mut batch = Batch::new();
    batch.queue("INSERT INTO t VALUES (1)", ());
    let mut results = tx.send_batch(&mut conn, &batch).await.unwrap();
    results.exec_results().await.unwrap();
    results.close().await.unwrap();
    assert!(conn.in_transaction());
    tx.commit(&mut conn).await.unwrap();
    assert!(!conn.in_transaction());
    conn.close().await.unwrap();

    let captured = handle.join().unwrap();
    assert_eq!(captured, [b"Q".to_vec(), b"PBDES".to_vec(), b"Q".to_vec()]);
}

#[tokio::test]
async fn read_timeout_breaks_connection() {
    let stall = Backend::new().parse_complete().bind_complete().build();
    let (mut conn, handle) = connect(vec![stall]).await;
    conn.set_read_timeout(Some(Duration::from_millis(50)));

    let mut batch = Batch::new();
    batch.queue("SELECT pg_sleep(10)", ());
    {
        let mut results = conn.send_batch(&batch).await.unwrap();
        assert!(matches!(
            results.exec_results().await,
            Err(Error::Timeout)
        ));
    }
    assert!(conn.is_broken());
    assert!(matches!(
        conn.send_batch(&batch).await.err(),
        Some(Error::ConnectionBroken)
    ));
    drop(conn);
    handle.join().unwrap();
}
