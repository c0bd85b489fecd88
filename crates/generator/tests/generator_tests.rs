//! Engine tests against scripted collaborators.

mod common;

use common::*;
use fleetload_generator::loads::FixedLoad;
use fleetload_generator::{
    EndpointPool, FileRecordStore, FileTemplateStore, GeneratorConfig, GeneratorError,
    LoadGenerator, LocalRecordStore, LocalTemplateStore, Network, RecordStore, RotationPolicy,
    SendConfig, TemplateStore, WaitConfig,
};
use fleetload_types::{Identity, InclusionStatus, NetworkError, StatusClass, SubmissionHandle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn generator(network: &Arc<MockNetwork>, pool: EndpointPool, config: GeneratorConfig) -> LoadGenerator {
    LoadGenerator::new(network.clone(), Arc::new(MockAuthor::new()), pool, config)
}

fn single_node(network: &Arc<MockNetwork>) -> LoadGenerator {
    generator(
        network,
        EndpointPool::new(endpoints(1), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default(),
    )
}

async fn store_with(identities: &[&str]) -> LocalTemplateStore {
    let mut store = LocalTemplateStore::new();
    for identity in identities {
        store
            .set_transaction(template_for(&Identity::from(*identity)))
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_send_all_count_records_every_submission() {
    let alice = Identity::from("alice");
    let network = Arc::new(MockNetwork::new().with_account(account_of(&alice), 7));
    let mut generator = single_node(&network);
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    let report = generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(records.len(), 5);
    let nonces: Vec<u64> = network.submitted().iter().map(|s| s.nonce).collect();
    assert_eq!(nonces, [7, 8, 9, 10, 11]);
    assert_eq!(generator.tracked_nonce(&account_of(&alice)), Some(12));
    assert_eq!(network.account_lookups(), 1);
}

#[tokio::test]
async fn test_pack_never_overshoots_count() {
    let network = Arc::new(MockNetwork::new());
    let mut generator = single_node(&network);
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    let report = generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(5).with_pack_size(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn test_duration_with_interval_paces_ticks() {
    let network = Arc::new(MockNetwork::new());
    let mut generator = single_node(&network);
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    let config = SendConfig::duration(Duration::from_secs(2))
        .with_interval(Duration::from_millis(500));
    let report = generator
        .send_all(&mut templates, &mut records, &config, &CancellationToken::new())
        .await
        .unwrap();

    assert!((3..=5).contains(&report.sent), "sent {}", report.sent);
    assert_eq!(records.len() as u64, report.sent);
    assert!(report.elapsed >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_single_sequence_conflict_is_recovered() {
    let alice = Identity::from("alice");
    let network = Arc::new(MockNetwork::new().with_account(account_of(&alice), 3));
    network.fail_next_submit(conflict());
    let mut generator = single_node(&network);

    let (handle, next) = generator
        .send(&template_for(&alice), None, None)
        .await
        .unwrap();

    assert_eq!(next, 4);
    assert_eq!(network.submitted()[0].hash, handle.hash);
    // Initial fetch plus the refresh after the conflict.
    assert_eq!(network.account_lookups(), 2);
}

#[tokio::test]
async fn test_second_sequence_conflict_is_fatal() {
    let alice = Identity::from("alice");
    let network = Arc::new(MockNetwork::new().with_account(account_of(&alice), 3));
    network.fail_next_submit(conflict());
    network.fail_next_submit(conflict());
    let mut generator = single_node(&network);

    let err = generator
        .send(&template_for(&alice), None, None)
        .await
        .unwrap_err();

    match err {
        GeneratorError::SequenceConflict {
            fee_payer, nonce, ..
        } => {
            assert_eq!(fee_payer, account_of(&alice));
            assert_eq!(nonce, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(network.submitted().is_empty());
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let network = Arc::new(MockNetwork::new());
    network.fail_next_submit(NetworkError::from_status(400, "bad signature"));
    let mut generator = single_node(&network);

    let err = generator
        .submit_with_retry(&template_for(&Identity::from("alice")), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GeneratorError::Network(NetworkError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_submit_with_retry_moves_to_next_endpoint() {
    let network = Arc::new(MockNetwork::new());
    network.fail_next_submit(unavailable());
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(2), RotationPolicy::Exhaust).unwrap(),
        GeneratorConfig::default(),
    );

    generator
        .submit_with_retry(&template_for(&Identity::from("alice")), None)
        .await
        .unwrap();
    assert_eq!(network.submitted()[0].endpoint.as_str(), "http://node1");
}

#[tokio::test]
async fn test_submit_with_retry_wraps_last_cause() {
    let network = Arc::new(MockNetwork::new());
    for _ in 0..3 {
        network.fail_next_submit(unavailable());
    }
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(3), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default().with_submit_retries(2),
    );

    let err = generator
        .submit_with_retry(&template_for(&Identity::from("alice")), None)
        .await
        .unwrap_err();
    match err {
        GeneratorError::RetriesExhausted { attempts, cause } => {
            assert_eq!(attempts, 3);
            assert!(cause.is_retryable());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_failure_is_skipped_and_endpoint_advanced() {
    let network = Arc::new(MockNetwork::new());
    network.fail_next_submit(unavailable());
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(2), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default(),
    );
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    let report = generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 1);
    let submitted = network.submitted();
    assert!(submitted.iter().all(|s| s.endpoint.as_str() == "http://node1"));
    // The failed attempt did not consume a nonce.
    let nonces: Vec<u64> = submitted.iter().map(|s| s.nonce).collect();
    assert_eq!(nonces, [0, 1, 2]);
}

#[tokio::test]
async fn test_consecutive_failure_budget_is_fatal() {
    let network = Arc::new(MockNetwork::new());
    for _ in 0..3 {
        network.fail_next_submit(unavailable());
    }
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(2), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default().with_max_consecutive_failures(2),
    );
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    let err = generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GeneratorError::RetriesExhausted { attempts: 3, .. }));
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_rotate_nodes_once_per_tick() {
    let network = Arc::new(MockNetwork::new());
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(3), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default(),
    );
    let mut templates = store_with(&["alice"]).await;
    let mut records = LocalRecordStore::new();

    generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(6)
                .with_pack_size(2)
                .with_rotate_nodes(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let visited: Vec<String> = network
        .submitted()
        .iter()
        .map(|s| s.endpoint.to_string())
        .collect();
    assert_eq!(
        visited,
        [
            "http://node0",
            "http://node0",
            "http://node1",
            "http://node1",
            "http://node2",
            "http://node2"
        ]
    );
}

#[tokio::test]
async fn test_rotate_senders_tracks_nonces_per_fee_payer() {
    let alice = Identity::from("alice");
    let bob = Identity::from("bob");
    let network = Arc::new(
        MockNetwork::new()
            .with_account(account_of(&alice), 10)
            .with_account(account_of(&bob), 20),
    );
    let mut generator = single_node(&network);
    let mut templates = store_with(&["alice", "bob"]).await;
    let mut records = LocalRecordStore::new();

    generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::count(4).with_rotate_senders(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let sent: Vec<(String, u64)> = network
        .submitted()
        .iter()
        .map(|s| (s.fee_payer.clone(), s.nonce))
        .collect();
    assert_eq!(
        sent,
        [
            ("B62alice".to_string(), 10),
            ("B62bob".to_string(), 20),
            ("B62alice".to_string(), 11),
            ("B62bob".to_string(), 21),
        ]
    );
    assert_eq!(network.account_lookups(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_infinite_send_and_commits() {
    let network = Arc::new(MockNetwork::new());
    let mut generator = single_node(&network);
    let mut templates = store_with(&["alice"]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run-ids.json");
    let mut records = FileRecordStore::open(&path).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        trigger.cancel();
    });

    let report = generator
        .send_all(
            &mut templates,
            &mut records,
            &SendConfig::infinite().with_interval(Duration::from_secs(1)),
            &cancel,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.sent, 4);
    let reopened = FileRecordStore::open(&path).await.unwrap();
    assert_eq!(reopened.get_records().await.unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_wait_reports_timeout_with_last_cause() {
    let network = Arc::new(MockNetwork::new());
    // Two full rounds of pending checks, then a round of timed-out checks.
    for _ in 0..4 {
        network.script_inclusion(Ok(InclusionStatus::Pending));
    }
    for _ in 0..2 {
        network.script_inclusion(Err(NetworkError::timeout("check timed out")));
    }
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(3), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default(),
    );
    let mut records = LocalRecordStore::new();
    records.add_record(SubmissionHandle::new("h1")).await.unwrap();

    let wait = WaitConfig::default()
        .with_max_retries(2)
        .with_attempts_per_retry(2)
        .with_poll_interval(Duration::from_secs(1));
    let err = generator.wait_all(&records, &wait).await.unwrap_err();

    match err {
        GeneratorError::InclusionTimeout {
            hash,
            retries,
            cause,
        } => {
            assert_eq!(hash, "h1");
            assert_eq!(retries, 2);
            assert!(matches!(
                *cause,
                GeneratorError::Network(NetworkError::Transport {
                    status_class: StatusClass::Timeout,
                    ..
                })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let rounds: Vec<String> = network
        .inclusion_checks()
        .iter()
        .map(|(_, endpoint)| endpoint.to_string())
        .collect();
    assert_eq!(
        rounds,
        [
            "http://node0",
            "http://node0",
            "http://node1",
            "http://node1",
            "http://node2",
            "http://node2"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_check_failure_stays_in_the_round() {
    let network = Arc::new(MockNetwork::new());
    network.script_inclusion(Err(NetworkError::connection("connection refused")));
    network.script_inclusion(Err(NetworkError::connection("connection refused")));
    network.script_inclusion(Ok(InclusionStatus::Included));
    let mut generator = generator(
        &network,
        EndpointPool::new(endpoints(2), RotationPolicy::Wrap).unwrap(),
        GeneratorConfig::default(),
    );

    let start = tokio::time::Instant::now();
    generator
        .wait(&SubmissionHandle::new("h1"), &WaitConfig::default())
        .await
        .unwrap();

    assert_eq!(start.elapsed(), WaitConfig::default().poll_interval * 2);
    let checked: Vec<String> = network
        .inclusion_checks()
        .iter()
        .map(|(_, endpoint)| endpoint.to_string())
        .collect();
    assert_eq!(checked, ["http://node0", "http://node0", "http://node0"]);
}

#[tokio::test]
async fn test_wait_all_processes_every_record() {
    let network = Arc::new(MockNetwork::new());
    network.script_inclusion(Ok(InclusionStatus::Failed {
        reason: "insufficient fee".to_string(),
    }));
    let mut generator = single_node(&network);
    let mut records = LocalRecordStore::new();
    for hash in ["h1", "h2", "h3"] {
        records.add_record(SubmissionHandle::new(hash)).await.unwrap();
    }

    let err = generator
        .wait_all(&records, &WaitConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GeneratorError::TransactionFailed { ref hash, .. } if hash == "h1"
    ));
    let checked: Vec<String> = network
        .inclusion_checks()
        .into_iter()
        .map(|(hash, _)| hash)
        .collect();
    assert_eq!(checked, ["h1", "h2", "h3"]);
}

#[tokio::test]
async fn test_generate_submits_and_awaits_setup() {
    let alice = Identity::from("alice");
    let network = Arc::new(MockNetwork::new().with_account(account_of(&alice), 0));
    let author = Arc::new(MockAuthor::new());
    let mut generator = LoadGenerator::new(
        network.clone(),
        author.clone(),
        EndpointPool::single(endpoints(1).remove(0)),
        GeneratorConfig::default(),
    );
    let load = FixedLoad::new(json!({"call": "ping", "from": "$account"}))
        .with_setup(json!({"call": "deploy"}));
    let mut templates = LocalTemplateStore::new();

    let template = generator
        .generate(&load, &mut templates, &alice)
        .await
        .unwrap();

    assert_eq!(template.fee_payer(), &account_of(&alice));
    assert_eq!(template.tx()["body"]["from"], "B62alice");
    assert_eq!(network.submitted().len(), 1);
    assert_eq!(network.inclusion_checks().len(), 1);
    assert_eq!(author.authored().len(), 2);
    assert_eq!(templates.len(), 1);

    // The template continues after the setup transaction's nonce.
    let (_, next) = generator.send(&template, None, None).await.unwrap();
    assert_eq!(next, 2);
}

#[tokio::test]
async fn test_stored_template_signs_identically() {
    let network = MockNetwork::new();
    let author = MockAuthor::new();
    let endpoint = endpoints(1).remove(0);
    let alice = Identity::from("alice");
    let original = fleetload_generator::TransactionAuthor::create_template(
        &author,
        &endpoint,
        &alice,
        fleetload_generator::TransactionData::new(json!({"call": "ping"})),
    )
    .await
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut store = FileTemplateStore::new(dir.path().join("run-template.json"));
    store.set_transaction(original.clone()).await.unwrap();
    let loaded = store.get_transaction(None).await.unwrap();

    for nonce in [0, 5] {
        let a = network.sign(&endpoint, &original, nonce, None).await.unwrap();
        let b = network.sign(&endpoint, &loaded, nonce, None).await.unwrap();
        assert_eq!(a, b);
    }
    assert_eq!(
        loaded.tx()["feePayer"]["lazyAuthorization"],
        json!({"kind": "lazy-signature"})
    );
}
