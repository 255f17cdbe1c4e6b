//! Integration tests for the log server and client.

use driftlog_core::{CommitLog, Config, Log, Record};
use driftlog_rpc::{
    AclAuthorizer, AllowAll, Authorizer, LogClient, LogServer, ServerConfig, ServerHandle,
    APPEND_ACTION, READ_ACTION,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    log: Arc<Log>,
    handle: ServerHandle,
}

async fn start(authorizer: Arc<dyn Authorizer>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Log::open(dir.path(), Config::default()).unwrap());
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_read_stream_poll_interval(Duration::from_millis(5));

    let server = LogServer::bind(config, Arc::clone(&log) as Arc<dyn CommitLog>, authorizer)
        .await
        .unwrap();
    Fixture {
        _dir: dir,
        log,
        handle: server.spawn(),
    }
}

#[tokio::test]
async fn produce_consume() {
    let fixture = start(Arc::new(AllowAll)).await;
    let mut client = LogClient::connect(fixture.handle.local_addr()).await.unwrap();

    let offset = client
        .append(Record::new(b"hello world".to_vec()))
        .await
        .unwrap();
    assert_eq!(offset, 0);

    let record = client.read(offset).await.unwrap();
    assert_eq!(record.value, b"hello world");
    assert_eq!(record.offset, offset);

    fixture.handle.shutdown().await;
}

#[tokio::test]
async fn consume_past_boundary() {
    let fixture = start(Arc::new(AllowAll)).await;
    let mut client = LogClient::connect(fixture.handle.local_addr()).await.unwrap();

    let offset = client
        .append(Record::new(b"hello world".to_vec()))
        .await
        .unwrap();

    let err = client.read(offset + 1).await.unwrap_err();
    assert!(err.is_out_of_range());
    let status = err.status().unwrap();
    assert_eq!(status.out_of_range_offset(), Some(offset + 1));
    assert_eq!(
        status.localized_message("en-US"),
        Some("The requested offset is outside the log's range: 1")
    );

    fixture.handle.shutdown().await;
}

#[tokio::test]
async fn append_stream_then_read_stream() {
    let fixture = start(Arc::new(AllowAll)).await;
    let addr = fixture.handle.local_addr();

    let values: Vec<&[u8]> = vec![b"first message", b"second message", b"third message"];

    let mut producer = LogClient::connect(addr).await.unwrap();
    let mut appends = producer.append_stream();
    for value in &values {
        appends.send(Record::new(value.to_vec())).await.unwrap();
    }
    assert_eq!(appends.in_flight(), values.len());
    for expected in 0..values.len() as u64 {
        assert_eq!(appends.recv().await.unwrap(), expected);
    }

    let consumer = LogClient::connect(addr).await.unwrap();
    let mut stream = consumer.read_stream(0).await.unwrap();
    for (i, value) in values.iter().enumerate() {
        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.offset, i as u64);
        assert_eq!(record.value, *value);
    }

    // The stream follows records written after it started.
    fixture
        .log
        .append(Record::new(b"late message".to_vec()))
        .unwrap();
    let record = stream.next().await.unwrap().unwrap();
    assert_eq!(record.offset, 3);

    fixture.handle.shutdown().await;
    assert!(stream.next().await.unwrap().is_none());
}

#[tokio::test]
async fn unauthorized_subject_is_denied() {
    let acl = AclAuthorizer::new()
        .with_grant("root", "*", APPEND_ACTION)
        .with_grant("root", "*", READ_ACTION);
    let fixture = start(Arc::new(acl)).await;
    let addr = fixture.handle.local_addr();

    let mut nobody = LogClient::connect(addr).await.unwrap();
    nobody.authenticate("nobody").await.unwrap();
    let err = nobody
        .append(Record::new(b"hello world".to_vec()))
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(nobody.read(0).await.unwrap_err().is_permission_denied());

    let denied = LogClient::connect(addr).await.unwrap();
    let mut stream = denied.read_stream(0).await.unwrap();
    assert!(stream.next().await.unwrap_err().is_permission_denied());

    let mut root = LogClient::connect(addr).await.unwrap();
    root.authenticate("root").await.unwrap();
    assert_eq!(
        root.append(Record::new(b"hello world".to_vec()))
            .await
            .unwrap(),
        0
    );

    fixture.handle.shutdown().await;
}

#[tokio::test]
async fn stop_accepting_keeps_open_connections() {
    let fixture = start(Arc::new(AllowAll)).await;
    let addr = fixture.handle.local_addr();
    let mut client = LogClient::connect(addr).await.unwrap();

    fixture.handle.stop_accepting();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(client.append(Record::new(b"x".to_vec())).await.unwrap(), 0);
    assert!(LogClient::connect(addr).await.is_err());

    fixture.handle.shutdown().await;
    fixture.handle.shutdown().await;
}
