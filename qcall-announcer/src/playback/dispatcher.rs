//! Announcement dispatcher
//!
//! Owns the processed set, the backlog and the single active playback
//! session. Runs as one task; the connection, the scheduler's completion
//! callback and display-hold timers all reach it through one channel, so
//! none of this state is shared.

use super::display::DisplayProjection;
use super::events::{DispatchInput, DispatchReceiver, DispatchSender, SessionId};
use super::scheduler::{PlaybackOutcome, PlaybackScheduler};
use qcall_common::{AnnouncementKey, CallEvent, EntityId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// How long a call stays displayed after its announcement
    pub display_hold: Duration,
    /// Only calls for this unit are announced
    pub unit_filter: Option<EntityId>,
}

pub struct AnnouncementDispatcher {
    scheduler: PlaybackScheduler,
    projection: Arc<DisplayProjection>,
    inputs: DispatchSender,
    settings: DispatcherSettings,

    processed: HashSet<AnnouncementKey>,
    backlog: VecDeque<CallEvent>,
    active_session: Option<SessionId>,
    /// The backlog waits for the current display hold to run out
    backlog_held: bool,
    next_session: u64,

    hold_generation: u64,
    hold_timer: Option<JoinHandle<()>>,
}

impl AnnouncementDispatcher {
    /// `inputs` must feed the receiver later passed to [`run`](Self::run);
    /// completions and hold expiries are posted back through it.
    pub fn new(
        scheduler: PlaybackScheduler,
        projection: Arc<DisplayProjection>,
        inputs: DispatchSender,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            scheduler,
            projection,
            inputs,
            settings,
            processed: HashSet::new(),
            backlog: VecDeque::new(),
            active_session: None,
            backlog_held: false,
            next_session: 1,
            hold_generation: 0,
            hold_timer: None,
        }
    }

    /// Process inputs until `cancel` fires, then tear down.
    pub async fn run(mut self, mut inputs: DispatchReceiver, cancel: CancellationToken) {
        info!("Announcement dispatcher started");

        loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => break,
                input = inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.handle(input) => {}
            }
        }

        self.shutdown();
        info!("Announcement dispatcher stopped");
    }

    /// Single entry point for every input
    pub async fn handle(&mut self, input: DispatchInput) {
        match input {
            DispatchInput::Call(call) => self.on_call(call).await,
            DispatchInput::Board(board) => {
                debug!(entries = board.len(), "Board updated");
                self.projection.set_board(board);
            }
            DispatchInput::ClearDisplay => {
                self.cancel_hold();
                if self.projection.clear() {
                    debug!("Display cleared by server");
                }
                self.release_backlog().await;
            }
            DispatchInput::SessionReset => {
                self.reset_session();
                self.release_backlog().await;
            }
            DispatchInput::PlaybackFinished { session, outcome } => {
                self.on_playback_finished(session, outcome)
            }
            DispatchInput::DisplayHoldExpired { generation } => {
                if generation == self.hold_generation {
                    self.hold_timer = None;
                    self.projection.clear();
                    debug!(generation, "Display hold expired");
                    self.release_backlog().await;
                }
            }
        }
    }

    async fn on_call(&mut self, call: CallEvent) {
        if let Some(unit) = &self.settings.unit_filter {
            if call.unit_id.as_ref() != Some(unit) {
                debug!(ticket = %call.ticket_code, unit = ?call.unit_id, "Call for another unit ignored");
                return;
            }
        }

        let key = call.announcement_key();
        if !self.processed.insert(key) {
            debug!(ticket = %call.ticket_code, "Duplicate call discarded");
            return;
        }

        self.route(call).await;
    }

    /// Steps after dedup: silent display, backlog, or announce
    async fn route(&mut self, call: CallEvent) {
        if !call.should_play_audio {
            info!(ticket = %call.ticket_code, counter = %call.counter_label, "Silent call displayed");
            self.show(call, false);
            self.arm_hold();
            return;
        }

        if self.active_session.is_some() || self.backlog_held {
            debug!(ticket = %call.ticket_code, backlog = self.backlog.len() + 1, "Call queued");
            self.backlog.push_back(call);
            return;
        }

        self.start_announcement(call).await;
    }

    async fn start_announcement(&mut self, call: CallEvent) {
        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.active_session = Some(session);

        info!(
            ticket = %call.ticket_code,
            counter = %call.counter_label,
            clips = call.clip_keys.len(),
            %session,
            "Announcing call"
        );

        let keys = call.clip_keys.clone();
        self.show(call, true);

        let inputs = self.inputs.clone();
        self.scheduler
            .play(&keys, move |outcome| {
                let _ = inputs.send(DispatchInput::PlaybackFinished { session, outcome });
            })
            .await;
    }

    fn on_playback_finished(&mut self, session: SessionId, outcome: PlaybackOutcome) {
        if self.active_session != Some(session) {
            debug!(%session, "Stale playback completion ignored");
            return;
        }
        self.active_session = None;

        match &outcome {
            PlaybackOutcome::Completed { clips } => info!(%session, clips, "Announcement finished"),
            PlaybackOutcome::Empty => info!(%session, "Announcement had no playable clips"),
            PlaybackOutcome::Failed { reason } => warn!(%session, %reason, "Announcement failed"),
        }

        // The next queued call waits until this one has been on screen for
        // the full hold
        self.arm_hold();
        if !self.backlog.is_empty() {
            debug!(backlog = self.backlog.len(), "Backlog waiting for display hold");
            self.backlog_held = true;
        }
    }

    /// Hold ended (or the display was cleared): continue with the backlog
    async fn release_backlog(&mut self) {
        if self.backlog_held {
            self.backlog_held = false;
            self.drain_backlog().await;
        }
    }

    async fn drain_backlog(&mut self) {
        while self.active_session.is_none() {
            let Some(next) = self.backlog.pop_front() else {
                break;
            };
            self.route(next).await;
        }
    }

    fn show(&mut self, call: CallEvent, audible: bool) {
        // A new projection invalidates any pending hold
        self.cancel_hold();
        self.projection.show(call, audible);
    }

    fn arm_hold(&mut self) {
        self.cancel_hold();

        let generation = self.hold_generation;
        let hold = self.settings.display_hold;
        let inputs = self.inputs.clone();
        self.hold_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            let _ = inputs.send(DispatchInput::DisplayHoldExpired { generation });
        }));
    }

    fn cancel_hold(&mut self) {
        self.hold_generation += 1;
        if let Some(timer) = self.hold_timer.take() {
            timer.abort();
        }
    }

    /// A fresh connection session: forget what was announced and clear the
    /// display. The backlog and any sounding session are left alone.
    fn reset_session(&mut self) {
        info!(
            processed = self.processed.len(),
            backlog = self.backlog.len(),
            "Connection session reset"
        );
        self.processed.clear();
        self.cancel_hold();
        self.projection.clear();
    }

    /// Hard stop: timers aborted, playback stopped, all state discarded
    pub fn shutdown(&mut self) {
        self.cancel_hold();
        self.scheduler.stop();
        self.active_session = None;
        self.backlog_held = false;
        if !self.backlog.is_empty() {
            debug!(discarded = self.backlog.len(), "Discarding backlog");
        }
        self.backlog.clear();
        self.processed.clear();
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    /// Whether queued calls are waiting for the display hold
    pub fn backlog_held(&self) -> bool {
        self.backlog_held
    }

    pub fn projection(&self) -> &Arc<DisplayProjection> {
        &self.projection
    }
}
