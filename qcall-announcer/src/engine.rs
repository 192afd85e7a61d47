//! Announcement engine lifetime
//!
//! Builds every component for one engine generation, runs them, and tears
//! them all down together. A reload after terminal connection failure is a
//! new generation with a fresh clip cache, dispatcher and connection.

use crate::audio::{AudioClipCache, AudioEngine, ClipSource};
use crate::connection::{ConnectionExit, ConnectionManager, ConnectionState, PushConnector, ReconnectPolicy};
use crate::notify::Notifier;
use crate::playback::{
    dispatch_channel, AnnouncementDispatcher, DispatchSender, DispatcherSettings, DisplayProjection,
    DisplayedCall, PlaybackScheduler,
};
use crate::state::SharedState;
use qcall_common::CallEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub lead_time: Duration,
    pub dispatcher: DispatcherSettings,
    pub reconnect: ReconnectPolicy,
    pub static_prefix: String,
}

/// External collaborators, kept across reloads
#[derive(Clone)]
pub struct EngineParts {
    pub audio: Arc<dyn AudioEngine>,
    pub clips: Arc<dyn ClipSource>,
    pub connector: Arc<dyn PushConnector>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct AnnouncementEngine {
    cancel: CancellationToken,
    // Stopped only after the connection has settled its final state
    view_cancel: CancellationToken,
    cache: Arc<AudioClipCache>,
    projection: Arc<DisplayProjection>,
    dispatch: DispatchSender,
    dispatcher_task: JoinHandle<()>,
    connection_task: JoinHandle<ConnectionExit>,
    forwarder_task: JoinHandle<()>,
}

impl AnnouncementEngine {
    /// Construct and spawn all components. `cancel` tears them down.
    pub fn start(
        settings: EngineSettings,
        parts: EngineParts,
        state: Arc<SharedState>,
        cancel: CancellationToken,
    ) -> Self {
        let cache = Arc::new(AudioClipCache::new(
            Arc::clone(&parts.clips),
            parts.audio.sample_rate(),
            settings.static_prefix.clone(),
        ));
        let projection = Arc::new(DisplayProjection::new());
        let (dispatch, inputs) = dispatch_channel();

        let scheduler = PlaybackScheduler::new(Arc::clone(&cache), Arc::clone(&parts.audio), settings.lead_time);
        let dispatcher = AnnouncementDispatcher::new(
            scheduler,
            Arc::clone(&projection),
            dispatch.clone(),
            settings.dispatcher.clone(),
        );

        let connection = ConnectionManager::new(
            Arc::clone(&parts.connector),
            settings.reconnect.clone(),
            dispatch.clone(),
            Arc::clone(&parts.notifier),
        );

        let view_cancel = CancellationToken::new();
        let forwarder_task = tokio::spawn(forward_view(
            Arc::clone(&state),
            projection.subscribe(),
            projection.subscribe_board(),
            connection.subscribe_state(),
            view_cancel.clone(),
        ));
        let dispatcher_task = tokio::spawn(dispatcher.run(inputs, cancel.clone()));
        let connection_task = tokio::spawn(connection.run(cancel.clone()));

        info!("Announcement engine started");

        Self {
            cancel,
            view_cancel,
            cache,
            projection,
            dispatch,
            dispatcher_task,
            connection_task,
            forwarder_task,
        }
    }

    /// Wait for the connection to end, then tear everything down.
    pub async fn run(self) -> ConnectionExit {
        let exit = match self.connection_task.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "Connection task failed");
                ConnectionExit::ReloadRequested
            }
        };

        self.cancel.cancel();
        if let Err(e) = self.dispatcher_task.await {
            warn!(error = %e, "Dispatcher task failed");
        }
        self.view_cancel.cancel();
        if let Err(e) = self.forwarder_task.await {
            warn!(error = %e, "View forwarder task failed");
        }

        info!(?exit, "Announcement engine stopped");
        exit
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cache(&self) -> &Arc<AudioClipCache> {
        &self.cache
    }

    pub fn projection(&self) -> &Arc<DisplayProjection> {
        &self.projection
    }

    /// Sender into the dispatcher, alongside the connection
    pub fn dispatch(&self) -> &DispatchSender {
        &self.dispatch
    }
}

/// Mirror the engine's watch channels into the shared view state
async fn forward_view(
    state: Arc<SharedState>,
    mut display: watch::Receiver<Option<DisplayedCall>>,
    mut board: watch::Receiver<Vec<CallEvent>>,
    mut connection: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    // A new generation starts from an empty view
    let initial_display = display.borrow_and_update().clone();
    let initial_board = board.borrow_and_update().clone();
    state.set_display(initial_display).await;
    state.set_board(initial_board).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = display.borrow_and_update().clone();
                state.set_display(current).await;
            }
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = board.borrow_and_update().clone();
                state.set_board(current).await;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *connection.borrow_and_update();
                state.set_connection(current).await;
            }
        }
    }

    let last = *connection.borrow();
    if state.get_connection().await != last {
        state.set_connection(last).await;
    }
}
