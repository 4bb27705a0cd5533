//! End-to-end scenarios driving the node state machine through the full
//! produce/accumulate/settle pipeline, with the test loop standing in for
//! the runner.

use aegen_core::{Action, ClientResponse, Event, StateMachine};
use aegen_ledger::GenesisConfig;
use aegen_node::{NodeConfig, NodeStateMachine};
use aegen_types::test_utils::test_transfer;
use aegen_types::{
    Address, Batch, BatchId, BatchStatus, BlockHeight, SettlementOutcome, SubmissionResult,
    TokenId, TokenSpec,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

fn dev_config() -> NodeConfig {
    NodeConfig {
        genesis: GenesisConfig::empty()
            .with_account("alice", 100_000)
            .with_account("bob", 100_000),
        validators: vec![Address::from("v0")],
        local_address: Address::from("v0"),
        ..Default::default()
    }
}

fn dev_node() -> NodeStateMachine {
    NodeStateMachine::new(dev_config(), None).unwrap()
}

/// Process one event the way the runner would: internal enqueues feed
/// back into the machine at the same timestamp, everything else is
/// collected for assertions.
fn drive(node: &mut NodeStateMachine, event: Event) -> Vec<Action> {
    let mut queue = VecDeque::from([event]);
    let mut out = Vec::new();
    while let Some(event) = queue.pop_front() {
        for action in node.handle(event) {
            match action {
                Action::EnqueueInternal { event } => queue.push_back(event),
                other => out.push(other),
            }
        }
    }
    out
}

fn submit(node: &mut NodeStateMachine, tx: Arc<aegen_types::Transaction>) {
    let actions = drive(node, Event::SubmitTransaction { tx });
    assert!(
        actions
            .iter()
            .any(|a| matches!(a, Action::EmitTransactionAdmitted { .. })),
        "expected admission, got {actions:?}"
    );
}

fn tick(node: &mut NodeStateMachine, at: Duration) -> Vec<Action> {
    node.set_time(at);
    drive(node, Event::ProductionTick)
}

fn submitted_batch(actions: &[Action]) -> Option<Batch> {
    actions.iter().find_map(|a| match a {
        Action::SubmitBatch { batch, .. } => Some(batch.clone()),
        _ => None,
    })
}

#[test]
fn default_genesis_has_dev_accounts_and_token() {
    let node = NodeStateMachine::new(NodeConfig::default(), None).unwrap();
    assert_eq!(node.balance_of(&Address::from("alice")), 10_000_000);
    assert_eq!(node.balance_of(&Address::from("bob")), 10_000_000);

    let token = node.tokens().next().unwrap();
    assert_eq!(token.symbol, "AE");
    assert_eq!(token.total_supply, 1_000_000_000);
    assert_eq!(
        node.token_balance_of(&token.id, &Address::from("k:genesis")),
        1_000_000_000
    );
}

#[test]
fn empty_mempool_produces_no_block() {
    let mut node = dev_node();
    let actions = tick(&mut node, Duration::from_secs(5));
    assert!(!actions.iter().any(|a| matches!(a, Action::EmitBlockSealed { .. })));
    assert_eq!(node.head_height(), BlockHeight(0));
}

#[test]
fn transfer_flows_through_a_produced_block() {
    let mut node = dev_node();
    submit(&mut node, test_transfer("alice", "bob", 500, 0));

    let actions = tick(&mut node, Duration::from_secs(5));
    assert!(actions.iter().any(|a| matches!(a, Action::EmitBlockSealed { .. })));
    assert!(actions.iter().any(|a| matches!(a, Action::PersistBlock { .. })));

    assert_eq!(node.head_height(), BlockHeight(1));
    assert_eq!(node.balance_of(&Address::from("alice")), 99_500);
    assert_eq!(node.balance_of(&Address::from("bob")), 100_500);
    assert_eq!(node.nonce_of(&Address::from("alice")), 1);
    assert_eq!(node.mempool_size(), 0);
}

#[test]
fn duplicate_nonce_is_rejected_at_admission() {
    let mut node = dev_node();
    submit(&mut node, test_transfer("alice", "bob", 500, 0));
    let actions = drive(
        &mut node,
        Event::SubmitTransaction {
            tx: test_transfer("alice", "carol", 700, 0),
        },
    );
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::EmitTransactionRejected { .. })));
}

#[test]
fn two_blocks_close_a_batch_and_settle() {
    let mut node = dev_node();

    submit(&mut node, test_transfer("alice", "bob", 100, 0));
    let first = tick(&mut node, Duration::from_secs(5));
    assert!(submitted_batch(&first).is_none());

    submit(&mut node, test_transfer("alice", "bob", 100, 1));
    let second = tick(&mut node, Duration::from_secs(10));
    let batch = submitted_batch(&second).expect("threshold reached");
    assert_eq!(batch.id, BatchId(1));
    assert_eq!(batch.start_height, BlockHeight(1));
    assert_eq!(batch.end_height, BlockHeight(2));
    assert_eq!(batch.state_root, node.state_root());

    // Acceptance starts the poll loop.
    let accepted = drive(
        &mut node,
        Event::SubmissionCompleted {
            batch_id: batch.id,
            attempt: 1,
            result: SubmissionResult::Accepted {
                request_key: "rk-1".into(),
            },
        },
    );
    assert!(accepted.iter().any(|a| matches!(
        a,
        Action::EmitBatchStatus {
            status: BatchStatus::Submitted,
            ..
        }
    )));

    let polls = drive(&mut node, Event::SettlementPollTimer { batch_id: batch.id });
    assert!(polls
        .iter()
        .any(|a| matches!(a, Action::PollSettlement { attempt: 1, .. })));

    drive(
        &mut node,
        Event::PollCompleted {
            batch_id: batch.id,
            attempt: 1,
            outcome: SettlementOutcome::Confirmed,
        },
    );
    assert_eq!(node.batch(batch.id).unwrap().status, BatchStatus::Confirmed);

    // The next two blocks open the consecutive range.
    submit(&mut node, test_transfer("alice", "bob", 100, 2));
    tick(&mut node, Duration::from_secs(15));
    submit(&mut node, test_transfer("alice", "bob", 100, 3));
    let fourth = tick(&mut node, Duration::from_secs(20));
    let next = submitted_batch(&fourth).expect("second batch");
    assert_eq!(next.id, BatchId(2));
    assert_eq!(next.start_height, BlockHeight(3));
    assert_eq!(next.end_height, BlockHeight(4));
}

#[test]
fn failed_batch_can_be_resubmitted_once() {
    let mut node = dev_node();
    submit(&mut node, test_transfer("alice", "bob", 100, 0));
    tick(&mut node, Duration::from_secs(5));
    submit(&mut node, test_transfer("alice", "bob", 100, 1));
    let actions = tick(&mut node, Duration::from_secs(10));
    let batch = submitted_batch(&actions).unwrap();

    drive(
        &mut node,
        Event::SubmissionCompleted {
            batch_id: batch.id,
            attempt: 1,
            result: SubmissionResult::Rejected {
                reason: "unknown signer".into(),
            },
        },
    );
    assert_eq!(node.batch(batch.id).unwrap().status, BatchStatus::Failed);

    // Operator resubmission reopens the same id.
    let resubmit = drive(&mut node, Event::ResubmitBatch { batch_id: batch.id });
    assert!(resubmit
        .iter()
        .any(|a| matches!(a, Action::SubmitBatch { attempt: 1, .. })));
    assert_eq!(node.batch(batch.id).unwrap().status, BatchStatus::Pending);

    // Resubmitting a batch that is not Failed is refused.
    let refused = drive(&mut node, Event::ResubmitBatch { batch_id: batch.id });
    assert!(refused.is_empty());
    // So is an id the bridge has never seen.
    let unknown = drive(&mut node, Event::ResubmitBatch { batch_id: BatchId(99) });
    assert!(unknown.is_empty());
}

#[test]
fn token_create_and_transfer_round_trip() {
    let mut node = dev_node();
    let spec = TokenSpec {
        name: "Test Token".into(),
        symbol: "TST".into(),
        precision: 12,
        initial_supply: 1_000_000,
        creator: Address::from("alice"),
    };
    let actions = drive(
        &mut node,
        Event::CreateToken {
            request_id: 7,
            spec: spec.clone(),
        },
    );
    let token: TokenId = actions
        .iter()
        .find_map(|a| match a {
            Action::EmitClientResponse {
                request_id: 7,
                response: ClientResponse::TokenCreated(Ok(id)),
            } => Some(id.clone()),
            _ => None,
        })
        .expect("token created");
    assert_eq!(
        node.token_balance_of(&token, &Address::from("alice")),
        1_000_000
    );

    let actions = drive(
        &mut node,
        Event::TransferToken {
            request_id: 8,
            token: token.clone(),
            sender: Address::from("alice"),
            receiver: Address::from("bob"),
            amount: 100,
        },
    );
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::EmitClientResponse {
            request_id: 8,
            response: ClientResponse::TokenTransferred(Ok(_)),
        }
    )));
    assert_eq!(node.token_balance_of(&token, &Address::from("alice")), 999_900);
    assert_eq!(node.token_balance_of(&token, &Address::from("bob")), 100);
    assert_eq!(node.token_info(&token).unwrap().total_supply, 1_000_000);

    // Same creator and symbol collide.
    let actions = drive(&mut node, Event::CreateToken { request_id: 9, spec });
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::EmitClientResponse {
            request_id: 9,
            response: ClientResponse::TokenCreated(Err(_)),
        }
    )));
}

#[test]
fn identical_event_sequences_reach_identical_roots() {
    let mut a = dev_node();
    let mut b = dev_node();

    for node in [&mut a, &mut b] {
        submit(node, test_transfer("alice", "bob", 250, 0));
        submit(node, test_transfer("bob", "alice", 40, 0));
        tick(node, Duration::from_secs(5));
        submit(node, test_transfer("alice", "bob", 10, 1));
        tick(node, Duration::from_secs(10));
    }

    assert_eq!(a.head_height(), b.head_height());
    assert_eq!(a.head_hash(), b.head_hash());
    assert_eq!(a.state_root(), b.state_root());
}

#[test]
fn native_supply_is_conserved_across_blocks() {
    let mut node = dev_node();
    let accounts = ["alice", "bob", "v0"];
    let before: u64 = accounts
        .iter()
        .map(|a| node.balance_of(&Address::from(*a)))
        .sum();

    submit(&mut node, test_transfer("alice", "bob", 12_345, 0));
    submit(&mut node, test_transfer("bob", "alice", 777, 0));
    tick(&mut node, Duration::from_secs(5));
    submit(&mut node, test_transfer("alice", "bob", 99, 1));
    tick(&mut node, Duration::from_secs(10));

    let after: u64 = accounts
        .iter()
        .map(|a| node.balance_of(&Address::from(*a)))
        .sum();
    assert_eq!(before, after);
    assert_eq!(node.head_height(), BlockHeight(2));
}

#[test]
fn recovery_resumes_heights_and_batch_ids() {
    let mut node = dev_node();
    submit(&mut node, test_transfer("alice", "bob", 100, 0));
    tick(&mut node, Duration::from_secs(5));
    submit(&mut node, test_transfer("alice", "bob", 100, 1));
    let actions = tick(&mut node, Duration::from_secs(10));
    let batch = submitted_batch(&actions).unwrap();
    drive(
        &mut node,
        Event::SubmissionCompleted {
            batch_id: batch.id,
            attempt: 1,
            result: SubmissionResult::Accepted {
                request_key: "rk-1".into(),
            },
        },
    );

    // Restart from the persisted artifacts.
    let snapshot = node.ledger_snapshot();
    let batches: Vec<Batch> = node.batches().cloned().collect();
    let (mut restored, boot_actions) = NodeStateMachine::recover(
        dev_config(),
        None,
        snapshot,
        node.head_height(),
        node.head_hash(),
        batches,
    );

    // The in-flight batch resumes polling.
    assert!(boot_actions
        .iter()
        .any(|a| matches!(a, Action::SetTimer { .. })));
    assert_eq!(restored.state_root(), node.state_root());
    assert_eq!(restored.head_height(), BlockHeight(2));

    // New production continues at height 3 and batch ids never repeat.
    submit(&mut restored, test_transfer("alice", "bob", 100, 2));
    restored.set_time(Duration::from_secs(15));
    drive(&mut restored, Event::ProductionTick);
    submit(&mut restored, test_transfer("alice", "bob", 100, 3));
    restored.set_time(Duration::from_secs(20));
    let actions = drive(&mut restored, Event::ProductionTick);
    let next = submitted_batch(&actions).unwrap();
    assert_eq!(next.id, BatchId(2));
    assert_eq!(next.start_height, BlockHeight(3));
}
