//! Whole-engine tests: push channel in, view state and audio schedule out
//!
//! The virtual engine is advanced by hand so clip ends happen exactly when
//! the test says.

mod helpers;

use helpers::{entry, queue_update, MemoryClipSource, RecordingNotifier, ScriptedConnector, TEST_RATE};
use qcall_announcer::audio::VirtualEngine;
use qcall_announcer::connection::{ConnectionExit, ConnectionState, ReconnectPolicy};
use qcall_announcer::engine::{AnnouncementEngine, EngineParts, EngineSettings};
use qcall_announcer::notify::Notice;
use qcall_announcer::playback::DispatcherSettings;
use qcall_announcer::SharedState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const T0: &str = "2024-05-01T08:00:00Z";

fn settings() -> EngineSettings {
    EngineSettings {
        lead_time: Duration::from_millis(50),
        dispatcher: DispatcherSettings {
            display_hold: Duration::from_millis(200),
            unit_filter: None,
        },
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            max_attempts: 2,
            reload_grace: Duration::from_millis(50),
        },
        static_prefix: "/static/".to_string(),
    }
}

struct Rig {
    audio: Arc<VirtualEngine>,
    connector: Arc<ScriptedConnector>,
    notifier: Arc<RecordingNotifier>,
    state: Arc<SharedState>,
    engine: AnnouncementEngine,
}

/// `connector` must be scripted before the engine makes its first connect
fn start(clips: MemoryClipSource, connector: Arc<ScriptedConnector>) -> Rig {
    let audio = Arc::new(VirtualEngine::new(TEST_RATE));
    let notifier = Arc::new(RecordingNotifier::new());
    let state = Arc::new(SharedState::new());
    Rig {
        engine: AnnouncementEngine::start(
            settings(),
            EngineParts {
                audio: audio.clone(),
                clips: Arc::new(clips),
                connector: connector.clone(),
                notifier: notifier.clone(),
            },
            Arc::clone(&state),
            CancellationToken::new(),
        ),
        audio,
        connector,
        notifier,
        state,
    }
}

/// Poll `check` until it holds or two seconds pass
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_pushed_call_is_announced_and_displayed() {
    let clips = MemoryClipSource::new()
        .with_clip("audio/nomor.wav", 0.5)
        .with_clip("audio/a-012.wav", 0.5);
    let connector = Arc::new(ScriptedConnector::new());
    let channel = connector.open_next();
    let rig = start(clips, connector);

    eventually("channel open", || async {
        rig.state.get_connection().await == ConnectionState::Open
    })
    .await;

    channel.send(queue_update(
        Some(entry(12, T0, &["/static/audio/nomor.wav", "/static/audio/a-012.wav"])),
        vec![entry(12, T0, &[]), entry(13, T0, &[])],
    ));

    eventually("display", || async { rig.state.get_display().await.is_some() }).await;
    eventually("board", || async { rig.state.get_board().await.len() == 2 }).await;
    eventually("schedule", || async { rig.audio.history().len() == 2 }).await;

    let history = rig.audio.history();
    assert_eq!(history[0].key, "audio/nomor.wav");
    assert_eq!(history[1].key, "audio/a-012.wav");
    assert!((history[1].start_at - history[0].end_at).abs() < 1e-9);

    let shown = rig.state.get_display().await.unwrap();
    assert!(shown.audible);
    assert_eq!(shown.call.ticket_code, "A-012");

    // Same update again (the server repeats currently_playing)
    channel.send(queue_update(Some(entry(12, T0, &["/static/audio/nomor.wav"])), vec![]));
    eventually("board refresh", || async { rig.state.get_board().await.is_empty() }).await;
    assert_eq!(rig.audio.history().len(), 2);

    // Finish playback; the display clears after the hold
    rig.audio.advance(Duration::from_secs(2));
    eventually("hold expiry", || async { rig.state.get_display().await.is_none() }).await;

    rig.engine.shutdown();
    assert_eq!(rig.engine.run().await, ConnectionExit::Stopped);
    assert!(channel.was_closed());
    assert_eq!(rig.state.get_connection().await, ConnectionState::Idle);
}

#[tokio::test]
async fn test_lost_channel_exhausts_retries_and_requests_reload() {
    let connector = Arc::new(ScriptedConnector::new());
    let mut channel = connector.open_next();
    let rig = start(MemoryClipSource::new(), connector);

    eventually("channel open", || async {
        rig.state.get_connection().await == ConnectionState::Open
    })
    .await;
    channel.drop_connection();

    let exit = tokio::time::timeout(Duration::from_secs(5), rig.engine.run())
        .await
        .expect("engine exits");
    assert_eq!(exit, ConnectionExit::ReloadRequested);

    assert_eq!(rig.state.get_connection().await, ConnectionState::Failed);
    assert_eq!(rig.connector.attempts().len(), 3);
    let notices = rig.notifier.notices();
    assert!(notices.contains(&Notice::ConnectionFailed { attempts: 2 }));
    assert_eq!(
        notices
            .iter()
            .filter(|n| matches!(n, Notice::ReloadScheduled { .. }))
            .count(),
        1
    );
}
