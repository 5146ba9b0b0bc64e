//! Parallel deliveries against one receiver and parallel saves on one sender.

mod common;

use std::sync::Arc;
use std::thread;

use bridge::guard::GuardConfig;
use bridge::ingest::{
    InboundRequest, IngestPipeline, MemoryAuthorDirectory, MemoryContentStore, MemoryMediaStore,
    ReceiverConfig,
};
use bridge::protocol::{IngestResponse, TransportEnvelope};
use bridge::sender::DeliveryResult;
use chrono::{DateTime, Utc};
use common::{minimal_body, receiver_config, record, Bridge, SECRET};

fn deliver(
    pipeline: &IngestPipeline,
    body: &[u8],
    envelope: TransportEnvelope,
    now: DateTime<Utc>,
) -> (u16, IngestResponse) {
    let request = InboundRequest {
        body,
        envelope,
        remote_addr: Some("198.51.100.4".into()),
        secure: true,
    };
    pipeline.respond(&request, now)
}

fn seal_at(body: &[u8], now: DateTime<Utc>) -> TransportEnvelope {
    TransportEnvelope::seal(SECRET.as_bytes(), body, Some("origin.example"), now.timestamp())
}

fn pipeline_over(store: Arc<MemoryContentStore>, config: ReceiverConfig) -> Arc<IngestPipeline> {
    Arc::new(IngestPipeline::with_stores(
        config,
        store,
        Arc::new(MemoryMediaStore::new()),
        Arc::new(MemoryAuthorDirectory::default()),
    ))
}

#[test]
fn a_replayed_envelope_is_accepted_exactly_once() {
    let pipeline = Arc::new(IngestPipeline::in_memory(receiver_config()));
    let body = Arc::new(minimal_body("https://origin.example/race", "race"));
    let now = Utc::now();
    let envelope = seal_at(&body, now);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let body = Arc::clone(&body);
            let envelope = envelope.clone();
            thread::spawn(move || deliver(&pipeline, &body, envelope, now).0)
        })
        .collect();
    let statuses: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1, "{statuses:?}");
    assert!(statuses.iter().filter(|s| **s != 200).all(|s| *s == 401));
}

#[test]
fn distinct_deliveries_all_land() {
    let store = Arc::new(MemoryContentStore::new());
    let pipeline = pipeline_over(store.clone(), receiver_config());
    let now = Utc::now();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let body = minimal_body(&format!("https://origin.example/p/{i}"), &format!("t{i}"));
                deliver(&pipeline, &body, seal_at(&body, now), now)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let (status, response) = handle.join().unwrap();
        assert_eq!(status, 200);
        assert_eq!(response.action.as_deref(), Some("created"));
        ids.push(response.post_id.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(store.len(), 16);
}

#[test]
fn versions_of_one_source_url_converge_on_one_item() {
    let store = Arc::new(MemoryContentStore::new());
    let pipeline = pipeline_over(store.clone(), receiver_config());
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let body = minimal_body("https://origin.example/shared", &format!("v{i}"));
                deliver(&pipeline, &body, seal_at(&body, now), now)
            })
        })
        .collect();

    let mut actions = Vec::new();
    let mut ids = Vec::new();
    for handle in handles {
        let (status, response) = handle.join().unwrap();
        assert_eq!(status, 200);
        actions.push(response.action.unwrap());
        ids.push(response.post_id.unwrap());
    }
    assert_eq!(actions.iter().filter(|a| *a == "created").count(), 1);
    assert_eq!(actions.iter().filter(|a| *a == "updated").count(), 7);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len(), 1);
}

#[test]
fn rate_limit_holds_under_contention() {
    let config = ReceiverConfig {
        guard: GuardConfig {
            rate_limit_per_minute: 5,
            ..GuardConfig::default()
        },
        ..receiver_config()
    };
    let pipeline = Arc::new(IngestPipeline::in_memory(config));
    let now = Utc::now();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let body = minimal_body(&format!("https://origin.example/rl/{i}"), &format!("rl{i}"));
                deliver(&pipeline, &body, seal_at(&body, now), now).0
            })
        })
        .collect();
    let statuses: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 5);
    assert_eq!(statuses.iter().filter(|s| **s == 429).count(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_saves_send_once() {
    let bridge = Bridge::standard();
    let post = record(11, "Hot story", "<p>breaking</p>");

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let dispatcher = Arc::clone(&bridge.dispatcher);
            let post = post.clone();
            tokio::spawn(async move { dispatcher.on_save(&post).await })
        })
        .collect();

    let mut sent = 0;
    for task in tasks {
        match task.await.unwrap() {
            Some(DeliveryResult::Sent { .. }) => sent += 1,
            None | Some(DeliveryResult::SkippedSameHash) => {}
            Some(other) => panic!("unexpected result {other:?}"),
        }
    }
    assert_eq!(sent, 1);
    assert_eq!(bridge.transport.calls(), 1);
    assert_eq!(bridge.store.len(), 1);
}
