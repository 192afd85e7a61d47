//! ConnectionManager: reconnect schedule, failure, reload and delivery
//!
//! All tests run on paused tokio time so backoff delays are exact.

mod helpers;

use helpers::{entry, queue_update, RecordingNotifier, ScriptedConnector};
use qcall_announcer::connection::{ConnectionExit, ConnectionManager, ConnectionState, ReconnectPolicy};
use qcall_announcer::notify::Notice;
use qcall_announcer::playback::{dispatch_channel, DispatchInput, DispatchReceiver};
use qcall_common::EntityId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const T0: &str = "2024-05-01T08:00:00Z";

struct Setup {
    connector: Arc<ScriptedConnector>,
    notifier: Arc<RecordingNotifier>,
    inputs: DispatchReceiver,
    manager: ConnectionManager,
}

fn setup() -> Setup {
    let connector = Arc::new(ScriptedConnector::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let (tx, inputs) = dispatch_channel();
    let manager = ConnectionManager::new(
        connector.clone(),
        ReconnectPolicy::default(),
        tx,
        notifier.clone(),
    );
    Setup {
        connector,
        notifier,
        inputs,
        manager,
    }
}

/// Longer than any backoff chain used below, on the same paused clock
const INPUT_WAIT: Duration = Duration::from_secs(30);

async fn next_input(inputs: &mut DispatchReceiver) -> DispatchInput {
    timeout(INPUT_WAIT, inputs.recv())
        .await
        .expect("dispatcher input arrives")
        .expect("channel open")
}

fn gaps(connector: &ScriptedConnector) -> Vec<Duration> {
    connector
        .attempts()
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_once_and_request_reload() {
    let s = setup();
    let state = s.manager.subscribe_state();
    let started = tokio::time::Instant::now();

    let exit = s.manager.run(CancellationToken::new()).await;

    assert_eq!(exit, ConnectionExit::ReloadRequested);
    assert_eq!(*state.borrow(), ConnectionState::Failed);

    // Initial connect plus five retries
    assert_eq!(s.connector.attempts().len(), 6);
    let secs: Vec<u64> = gaps(&s.connector).iter().map(|d| d.as_secs()).collect();
    assert_eq!(secs, vec![1, 2, 4, 8, 10]);

    let retries: Vec<u32> = s.notifier.retries().iter().map(|(attempt, _)| *attempt).collect();
    assert_eq!(retries, vec![1, 2, 3, 4, 5]);

    let notices = s.notifier.notices();
    let failed: Vec<_> = notices
        .iter()
        .filter(|n| matches!(n, Notice::ConnectionFailed { .. }))
        .collect();
    assert_eq!(failed, vec![&Notice::ConnectionFailed { attempts: 5 }]);
    assert_eq!(
        notices.last(),
        Some(&Notice::ReloadScheduled {
            grace: Duration::from_secs(5)
        })
    );

    // 25s of backoff then the 5s grace
    assert_eq!(started.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_reconnected_only_after_a_loss() {
    let mut s = setup();
    let mut first = s.connector.open_next();
    let _second = s.connector.open_next();

    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::SessionReset));
    assert!(s.notifier.notices().is_empty());

    first.drop_connection();
    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::SessionReset));

    assert_eq!(
        s.notifier.notices(),
        vec![
            Notice::Retrying {
                attempt: 1,
                max_attempts: 5,
                delay: Duration::from_secs(1),
            },
            Notice::Reconnected,
        ]
    );
    assert_eq!(gaps(&s.connector), vec![Duration::from_secs(1)]);

    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_retry_count() {
    let mut s = setup();
    let mut first = s.connector.open_next();
    s.connector.fail_next(2);
    let mut second = s.connector.open_next();
    let _third = s.connector.open_next();

    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    next_input(&mut s.inputs).await;
    first.drop_connection();
    // Retries 1 and 2 fail, retry 3 opens
    next_input(&mut s.inputs).await;
    second.drop_connection();
    next_input(&mut s.inputs).await;

    let retries: Vec<(u32, u64)> = s
        .notifier
        .retries()
        .iter()
        .map(|(attempt, delay)| (*attempt, delay.as_secs()))
        .collect();
    assert_eq!(retries, vec![(1, 1), (2, 2), (3, 4), (1, 1)]);

    let reconnects = s
        .notifier
        .notices()
        .iter()
        .filter(|n| **n == Notice::Reconnected)
        .count();
    assert_eq!(reconnects, 2);

    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_queue_update_delivered_as_board_then_call() {
    let mut s = setup();
    let channel = s.connector.open_next();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::SessionReset));

    channel.send(queue_update(
        Some(entry(1, T0, &["/static/audio/a.mp3"])),
        vec![entry(1, T0, &[]), entry(2, T0, &[])],
    ));

    match next_input(&mut s.inputs).await {
        DispatchInput::Board(board) => assert_eq!(board.len(), 2),
        other => panic!("expected board, got {:?}", other),
    }
    match next_input(&mut s.inputs).await {
        DispatchInput::Call(call) => {
            assert_eq!(call.ticket_id, EntityId::from(1));
            assert_eq!(call.clip_keys, vec!["/static/audio/a.mp3".to_string()]);
        }
        other => panic!("expected call, got {:?}", other),
    }

    channel.send(queue_update(None, vec![]));
    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::Board(b) if b.is_empty()));
    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::ClearDisplay));

    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_ignored_and_malformed_messages_keep_channel_open() {
    let mut s = setup();
    let channel = s.connector.open_next();
    let state = s.manager.subscribe_state();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    next_input(&mut s.inputs).await;

    channel.send(r#"{"type":"service_stats","data":{"waiting":4}}"#);
    channel.send("not json at all");
    channel.send(r#"{"type":"queue_update","data":"oops"}"#);
    channel.send(queue_update(None, vec![entry(5, T0, &[])]));

    match next_input(&mut s.inputs).await {
        DispatchInput::Board(board) => assert_eq!(board[0].ticket_id, EntityId::from(5)),
        other => panic!("expected board, got {:?}", other),
    }
    assert!(matches!(next_input(&mut s.inputs).await, DispatchInput::ClearDisplay));

    assert_eq!(*state.borrow(), ConnectionState::Open);
    assert_eq!(s.connector.attempts().len(), 1);
    assert!(s.notifier.notices().is_empty());

    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_closes_channel_without_reconnecting() {
    let mut s = setup();
    let channel = s.connector.open_next();
    let state = s.manager.subscribe_state();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    next_input(&mut s.inputs).await;
    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);

    assert!(channel.was_closed());
    assert_eq!(*state.borrow(), ConnectionState::Idle);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(s.connector.attempts().len(), 1);
    assert!(s.notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_backoff_stops_retrying() {
    let s = setup();
    let state = s.manager.subscribe_state();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    // Connects at 0s and 1s fail; the 2s backoff is in progress
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(*state.borrow(), ConnectionState::Reconnecting);
    cancel.cancel();
    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(s.connector.attempts().len(), 2);
    assert_eq!(*state.borrow(), ConnectionState::Idle);
    assert!(!s
        .notifier
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::ConnectionFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_reload_grace_skips_reload() {
    let s = setup();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(s.manager.run(cancel.clone()));

    // Retries are exhausted at 25s; grace would end at 30s
    sleep(Duration::from_secs(27)).await;
    cancel.cancel();

    assert_eq!(run.await.unwrap(), ConnectionExit::Stopped);
    assert_eq!(s.connector.attempts().len(), 6);
}
