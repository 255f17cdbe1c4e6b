//! Three nodes join through the first one; the last one leaves.

use driftlog_cluster::{ClusterResult, Handler, MemberStatus, Membership, MembershipConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingHandler {
    joins: Mutex<Vec<(String, String)>>,
    leaves: Mutex<Vec<String>>,
}

impl Handler for RecordingHandler {
    fn join(&self, name: &str, rpc_addr: &str) -> ClusterResult<()> {
        self.joins.lock().push((name.to_string(), rpc_addr.to_string()));
        Ok(())
    }

    fn leave(&self, name: &str) -> ClusterResult<()> {
        self.leaves.lock().push(name.to_string());
        Ok(())
    }
}

async fn setup_member(
    members: &mut Vec<Membership>,
    handler: Arc<RecordingHandler>,
) -> ClusterResult<()> {
    let id = members.len();
    let mut config = MembershipConfig::new(id.to_string(), "127.0.0.1:0".parse().unwrap())
        .with_tag("rpc_addr", format!("127.0.0.1:{}", 9400 + id))
        .with_gossip_interval(Duration::from_millis(50))
        .with_probe_timeout(Duration::from_millis(250));
    if let Some(first) = members.first() {
        config = config.with_start_join_addrs(vec![first.local_addr()]);
    }

    members.push(Membership::start(handler, config).await?);
    Ok(())
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..60 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn membership() {
    let handler = Arc::new(RecordingHandler::default());
    let mut members = Vec::new();
    setup_member(&mut members, Arc::clone(&handler)).await.unwrap();
    setup_member(&mut members, Arc::new(RecordingHandler::default()))
        .await
        .unwrap();
    setup_member(&mut members, Arc::new(RecordingHandler::default()))
        .await
        .unwrap();

    assert!(
        eventually(|| {
            handler.joins.lock().len() == 2
                && members[0].members().len() == 3
                && handler.leaves.lock().is_empty()
        })
        .await
    );

    members[2].leave().await.unwrap();

    assert!(
        eventually(|| {
            let view = members[0].members();
            handler.joins.lock().len() == 2
                && view.len() == 3
                && view[2].status == MemberStatus::Left
                && handler.leaves.lock().len() == 1
        })
        .await
    );

    assert_eq!(handler.leaves.lock()[0], "2");
    let joins = handler.joins.lock().clone();
    assert!(joins.contains(&("1".to_string(), "127.0.0.1:9401".to_string())));
    assert!(joins.contains(&("2".to_string(), "127.0.0.1:9402".to_string())));
}

#[tokio::test]
async fn leave_is_idempotent_and_silent_locally() {
    let handler = Arc::new(RecordingHandler::default());
    let mut members = Vec::new();
    setup_member(&mut members, Arc::clone(&handler)).await.unwrap();

    members[0].leave().await.unwrap();
    members[0].leave().await.unwrap();

    assert!(handler.leaves.lock().is_empty());
    assert_eq!(members[0].members()[0].status, MemberStatus::Left);
}

#[tokio::test]
async fn unreachable_seeds_fail_join() {
    // Bind and drop a listener to get an address nobody answers on.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = MembershipConfig::new("lonely", "127.0.0.1:0".parse().unwrap())
        .with_start_join_addrs(vec![closed])
        .with_probe_timeout(Duration::from_millis(100));

    let err = Membership::start(Arc::new(RecordingHandler::default()), config)
        .await
        .unwrap_err();
    assert!(err.is_network());
}
