//! The reservation lifecycle controller.
//!
//! One actor per terminal. It owns the local cache and the presence roster
//! exclusively, drains a single command mailbox, and runs the
//! duplicate-prevention create protocol:
//!
//! 1. optimistic local check (instant, advisory only)
//! 2. authoritative insert at the store (the only step that decides)
//! 3. on conflict, resolve and display the winning officer
//! 4. on success, idempotent cache merge + idle presence broadcast
//!
//! The claim request runs as a spawned task so the officer can keep typing
//! while it is in flight; a submission abandoned before its response lands
//! is discarded by sequence number. Timers (typing debounce, presence
//! sweep) are owned tasks, started on `run` and stopped by the controller's
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cardesk_core::presence::{
    PresenceRoster, PRESENCE_SWEEP_INTERVAL_SECS, TYPING_DEBOUNCE_MS, TYPING_REFRESH_SECS,
};
use cardesk_core::reservation::{can_unlock, receipt_blockers, validate_appointment_no};
use cardesk_core::types::{DbId, LockDate};
use cardesk_db::models::reservation::CreateReservation;
use cardesk_events::WireMessage;

use crate::cache::TodayCache;
use crate::commands::{Command, RemoteEvent};
use crate::store::{CreateResult, ReservationStore, StoreError};
use crate::ui::UiEvent;

// ---------------------------------------------------------------------------
// Identity and handle
// ---------------------------------------------------------------------------

/// The signed-in officer this terminal acts as.
#[derive(Debug, Clone)]
pub struct OfficerIdentity {
    pub id: DbId,
    pub name: String,
    pub role: String,
    pub branch_id: Option<DbId>,
}

/// Cloneable sender half of the controller mailbox.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Enqueue a command. Sends after shutdown are silently dropped.
    pub fn send(&self, command: Command) {
        let _ = self.tx.send(command);
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Per-terminal state machine driving the reservation set.
pub struct ReservationController<S: ReservationStore> {
    store: Arc<S>,
    officer: OfficerIdentity,
    cache: TodayCache,
    roster: PresenceRoster,

    /// Current content of the appointment input field.
    input: String,
    last_input_change: Option<Instant>,
    last_typing_broadcast: Option<Instant>,

    /// A claim is in flight; the submit control is disabled.
    create_in_flight: bool,
    /// Sequence of the latest submission; stale responses are discarded.
    submit_seq: u64,
    /// Appointment number of the in-flight submission.
    pending_appointment: String,

    commands: mpsc::UnboundedReceiver<Command>,
    handle: ControllerHandle,
    outbound: mpsc::UnboundedSender<WireMessage>,
    ui: mpsc::UnboundedSender<UiEvent>,
    cancel: CancellationToken,
}

impl<S: ReservationStore> ReservationController<S> {
    /// Build a controller and its mailbox handle.
    ///
    /// `outbound` carries presence frames to the feed connection; `ui`
    /// carries notifications to the rendering layer. `today` fixes the
    /// cache's date partition for the session.
    pub fn new(
        store: Arc<S>,
        officer: OfficerIdentity,
        today: LockDate,
        outbound: mpsc::UnboundedSender<WireMessage>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ControllerHandle { tx };
        let controller = Self {
            store,
            officer,
            cache: TodayCache::new(today),
            roster: PresenceRoster::new(),
            input: String::new(),
            last_input_change: None,
            last_typing_broadcast: None,
            create_in_flight: false,
            submit_seq: 0,
            pending_appointment: String::new(),
            commands: rx,
            handle: handle.clone(),
            outbound,
            ui,
            cancel: CancellationToken::new(),
        };
        (controller, handle)
    }

    /// Token that stops the loop and every timer it owns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the mailbox until shutdown.
    pub async fn run(mut self) {
        let timers = [
            spawn_ticker(
                self.handle.clone(),
                self.cancel.clone(),
                Duration::from_millis(TYPING_DEBOUNCE_MS / 2),
                || Command::FlushTyping,
            ),
            spawn_ticker(
                self.handle.clone(),
                self.cancel.clone(),
                Duration::from_secs(PRESENCE_SWEEP_INTERVAL_SECS),
                || Command::SweepPresence,
            ),
        ];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // Teardown: stop timers, leave other rosters clean.
        self.cancel.cancel();
        self.send_idle();
        for timer in timers {
            let _ = timer.await;
        }
        tracing::info!(officer_id = self.officer.id, "Controller stopped");
    }

    /// Process one command. Returns `false` to stop the loop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::InputChanged { value } => self.on_input_changed(value),
            Command::InputCleared => self.on_input_cleared(),
            Command::SubmitCreate { input } => self.on_submit(input),
            Command::CreateFinished { seq, result } => self.on_create_finished(seq, result),
            Command::AttachSerials { id, input } => {
                let result = self.store.update_serials(id, &input).await;
                self.on_row_mutation("record serials", result);
            }
            Command::EditDetails { id, input } => {
                let result = self.store.update_details(id, &input).await;
                self.on_row_mutation("edit details", result);
            }
            Command::AttachImage { id, url } => {
                let result = self.store.update_image(id, &url).await;
                self.on_row_mutation("attach card photo", result);
            }
            Command::GenerateReceipt { id } => self.on_generate_receipt(id).await,
            Command::Unlock { id } => self.on_unlock(id).await,
            Command::Refresh => self.refresh().await,
            Command::Remote(event) => self.on_remote(event).await,
            Command::FlushTyping => self.on_flush_typing(),
            Command::SweepPresence => self.on_sweep_presence(),
            Command::Shutdown => return false,
        }
        true
    }

    // -- Input and presence -------------------------------------------------

    fn on_input_changed(&mut self, value: String) {
        self.input = value;
        self.last_input_change = Some(Instant::now());
        if self.input.trim().is_empty() {
            self.send_idle();
        }
        self.reassess_presence();
    }

    fn on_input_cleared(&mut self) {
        self.input.clear();
        self.last_input_change = None;
        self.send_idle();
        if self.create_in_flight {
            // The officer moved on; the in-flight response will be stale.
            self.submit_seq += 1;
            tracing::debug!("In-flight claim abandoned");
        }
        self.reassess_presence();
    }

    /// Debounce tick: broadcast `typing` once the input has been stable for
    /// the debounce window, then keep refreshing it so receivers' sweeps do
    /// not expire a signal whose officer is still on the field.
    fn on_flush_typing(&mut self) {
        let trimmed = self.input.trim();
        if trimmed.is_empty() {
            return;
        }
        let stable = self
            .last_input_change
            .is_some_and(|at| at.elapsed() >= Duration::from_millis(TYPING_DEBOUNCE_MS));
        let due = self
            .last_typing_broadcast
            .is_none_or(|at| at.elapsed() >= Duration::from_secs(TYPING_REFRESH_SECS));
        if stable && due {
            let _ = self.outbound.send(WireMessage::PresenceTyping {
                appointment_no: trimmed.to_string(),
            });
            self.last_typing_broadcast = Some(Instant::now());
        }
    }

    fn on_sweep_presence(&mut self) {
        if self.roster.purge_stale(chrono::Utc::now()) > 0 {
            self.reassess_presence();
        }
    }

    fn send_idle(&mut self) {
        let _ = self.outbound.send(WireMessage::PresenceIdle);
        self.last_typing_broadcast = None;
    }

    fn reassess_presence(&self) {
        self.notify(UiEvent::Presence(self.roster.assess(&self.input)));
    }

    // -- The create protocol ------------------------------------------------

    fn on_submit(&mut self, input: CreateReservation) {
        if self.create_in_flight {
            self.notify(UiEvent::ActionFailed {
                action: "claim",
                message: "a claim is already in flight".into(),
                retryable: false,
            });
            return;
        }

        if let Err(message) = validate_appointment_no(&input.appointment_no) {
            self.notify(UiEvent::ActionFailed {
                action: "claim",
                message,
                retryable: false,
            });
            return;
        }

        // Step 1: optimistic local check. A hit is a certain conflict and
        // costs no round trip; a miss proves nothing.
        if let Some(existing) = self.cache.find_by_appointment(&input.appointment_no) {
            self.notify(UiEvent::ClaimLost {
                appointment_no: input.appointment_no.clone(),
                winner: Some(existing.clone()),
            });
            return;
        }

        // Step 2: authoritative insert, off-mailbox so the officer can keep
        // working. Step 3 (conflict resolution) happens in the same task.
        self.create_in_flight = true;
        self.submit_seq += 1;
        self.pending_appointment = input.appointment_no.trim().to_string();
        self.notify(UiEvent::SubmitEnabled(false));

        let seq = self.submit_seq;
        let store = Arc::clone(&self.store);
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let result = match store.create(&input).await {
                // The store reported a duplicate without the winner's
                // identity; fetch the winning row to display it.
                Ok(CreateResult::Conflict { winner: None }) => {
                    match store.get_by_appointment(&input.appointment_no).await {
                        Ok(winner) => Ok(CreateResult::Conflict { winner }),
                        Err(e) => {
                            tracing::debug!(error = %e, "Conflict winner lookup failed");
                            Ok(CreateResult::Conflict { winner: None })
                        }
                    }
                }
                other => other,
            };
            handle.send(Command::CreateFinished { seq, result });
        });
    }

    fn on_create_finished(&mut self, seq: u64, result: Result<CreateResult, StoreError>) {
        self.create_in_flight = false;
        // Whatever happened, the submit control comes back.
        self.notify(UiEvent::SubmitEnabled(true));

        if seq != self.submit_seq {
            tracing::debug!("Discarding response of an abandoned claim");
            return;
        }

        match result {
            Ok(CreateResult::Created(reservation)) => {
                // Step 4: idempotent merge; the feed echo of this insert
                // will be ignored by id.
                self.cache.upsert(reservation.clone());
                self.input.clear();
                self.last_input_change = None;
                self.send_idle();
                self.notify(UiEvent::ClaimWon { reservation });
                self.notify_cache();
                self.reassess_presence();
            }
            Ok(CreateResult::Conflict { winner }) => {
                self.notify(UiEvent::ClaimLost {
                    appointment_no: self.pending_appointment.clone(),
                    winner,
                });
            }
            Err(e) => self.notify_store_failure("claim", e),
        }
    }

    // -- Row mutations -------------------------------------------------------

    fn on_row_mutation(
        &mut self,
        action: &'static str,
        result: Result<cardesk_db::models::reservation::Reservation, StoreError>,
    ) {
        match result {
            Ok(reservation) => {
                self.cache.upsert(reservation);
                self.notify_cache();
            }
            Err(e) => self.notify_store_failure(action, e),
        }
    }

    async fn on_generate_receipt(&mut self, id: DbId) {
        // Client-side precheck: report every missing item before spending a
        // round trip. The store re-validates authoritatively.
        if let Some(row) = self.cache.get(id) {
            let blockers = receipt_blockers(
                row.lifecycle_status(),
                row.sn_good.as_deref(),
                row.card_image_url.as_deref(),
                row.foreigner_name.as_deref(),
                false,
            );
            if !blockers.is_empty() {
                self.notify(UiEvent::ReceiptBlocked { blockers });
                return;
            }
        }

        match self.store.complete(id).await {
            Ok(completion) => {
                self.cache.upsert(completion.reservation.clone());
                self.notify(UiEvent::ReceiptIssued {
                    reservation: completion.reservation,
                    receipt: completion.receipt,
                });
                self.notify_cache();
            }
            Err(StoreError::ReceiptBlocked(blockers)) => {
                self.notify(UiEvent::ReceiptBlocked { blockers });
            }
            Err(e) => self.notify_store_failure("generate receipt", e),
        }
    }

    async fn on_unlock(&mut self, id: DbId) {
        if !can_unlock(&self.officer.role) {
            self.notify(UiEvent::ActionFailed {
                action: "unlock",
                message: "only an admin may unlock a reservation".into(),
                retryable: false,
            });
            return;
        }
        match self.store.delete(id).await {
            Ok(()) => {
                // The feed's delete event is the authoritative echo; remove
                // locally for instant feedback (idempotent either way).
                if self.cache.remove(id) {
                    self.notify_cache();
                }
            }
            Err(e) => self.notify_store_failure("unlock", e),
        }
    }

    async fn refresh(&mut self) {
        match self.store.list_today().await {
            Ok(rows) => {
                self.cache.replace_all(rows);
                self.notify_cache();
            }
            Err(e) => self.notify_store_failure("refresh", e),
        }
    }

    // -- Remote events -------------------------------------------------------

    async fn on_remote(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Change(change) => {
                if self.cache.apply(&change) {
                    self.notify_cache();
                }
            }
            RemoteEvent::Presence(signal) => {
                self.roster.apply(signal, self.officer.id);
                self.reassess_presence();
            }
            RemoteEvent::Connected => {
                // At-least-once delivery means a gap may have opened while
                // offline; re-sync from the authoritative listing.
                self.refresh().await;
                self.notify(UiEvent::FeedOnline(true));
            }
            RemoteEvent::Disconnected => {
                self.notify(UiEvent::FeedOnline(false));
            }
        }
    }

    // -- Helpers ------------------------------------------------------------

    fn notify(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }

    /// Emit a fresh ordered snapshot for the rendering layer.
    fn notify_cache(&self) {
        let rows = self.cache.ordered().into_iter().cloned().collect();
        self.notify(UiEvent::CacheUpdated { rows });
    }

    fn notify_store_failure(&self, action: &'static str, error: StoreError) {
        let retryable = matches!(error, StoreError::Timeout | StoreError::Transport(_));
        tracing::warn!(action, error = %error, "Store call failed");
        self.notify(UiEvent::ActionFailed {
            action,
            message: error.to_string(),
            retryable,
        });
    }
}

/// Spawn a timer task that enqueues `make()` every `period` until `cancel`
/// fires. Owned by the controller's lifecycle, not the runtime's.
fn spawn_ticker(
    handle: ControllerHandle,
    cancel: CancellationToken,
    period: Duration,
    make: fn() -> Command,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; skip it so a fresh controller
        // does not broadcast before any input exists.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => handle.send(make()),
            }
        }
    })
}
