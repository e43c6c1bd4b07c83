//! Integration tests for the lifecycle controller.
//!
//! Two or more controllers share an [`InMemoryLedger`] (store + change
//! feed) and a relay that plays the server's presence fan-out, so the whole
//! duplicate-prevention protocol runs exactly as it does against the real
//! API: optimistic check, atomic claim, conflict resolution, feed
//! reconciliation, presence warnings, and receipt preconditions.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use tokio::sync::mpsc;

use cardesk_client::commands::{Command, RemoteEvent};
use cardesk_client::controller::{ControllerHandle, OfficerIdentity, ReservationController};
use cardesk_client::memory::InMemoryLedger;
use cardesk_client::ui::UiEvent;
use cardesk_core::presence::{PresenceAssessment, PresenceSignal};
use cardesk_core::reservation::{
    ReceiptBlocker, ROLE_ADMIN, ROLE_OFFICER, STATUS_LOCKED,
};
use cardesk_core::types::LockDate;
use cardesk_db::models::reservation::{CreateReservation, Reservation, UpdateDetails, UpdateSerials};
use cardesk_events::{ChangeEvent, PresenceBus};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn today() -> LockDate {
    NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
}

fn officer(id: i64, name: &str) -> OfficerIdentity {
    OfficerIdentity {
        id,
        name: name.to_string(),
        role: ROLE_OFFICER.to_string(),
        branch_id: None,
    }
}

fn admin(id: i64, name: &str) -> OfficerIdentity {
    OfficerIdentity {
        role: ROLE_ADMIN.to_string(),
        ..officer(id, name)
    }
}

fn claim(appointment_no: &str) -> CreateReservation {
    CreateReservation {
        appointment_no: appointment_no.to_string(),
        request_no: None,
        passport_no: None,
        foreigner_name: None,
    }
}

struct Terminal {
    handle: ControllerHandle,
    ui: mpsc::UnboundedReceiver<UiEvent>,
}

/// Wire up one terminal: controller + feed forwarder + presence relay, the
/// same topology the real server provides over WebSocket.
fn spawn_terminal(
    ledger: &Arc<InMemoryLedger>,
    presence: &Arc<PresenceBus>,
    identity: OfficerIdentity,
    latency: Option<Duration>,
) -> Terminal {
    let mut store = ledger.handle_for(
        identity.id,
        identity.name.clone(),
        identity.role.clone(),
        identity.branch_id,
    );
    if let Some(latency) = latency {
        store = store.with_latency(latency);
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let (controller, handle) =
        ReservationController::new(Arc::new(store), identity.clone(), today(), outbound_tx, ui_tx);
    tokio::spawn(controller.run());

    // Change feed: ledger events onto the mailbox.
    let feed_handle = handle.clone();
    let mut feed_rx = ledger.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = feed_rx.recv().await {
            feed_handle.send(Command::Remote(RemoteEvent::Change(event)));
        }
    });

    // Presence uplink: stamp outbound frames with the sender's identity,
    // as the server does.
    let bus = Arc::clone(presence);
    tokio::spawn(async move {
        use cardesk_events::WireMessage;
        while let Some(frame) = outbound_rx.recv().await {
            let signal = match frame {
                WireMessage::PresenceTyping { appointment_no } => PresenceSignal::typing(
                    identity.id,
                    identity.name.clone(),
                    appointment_no,
                    identity.branch_id,
                    chrono::Utc::now(),
                ),
                WireMessage::PresenceIdle => PresenceSignal::idle(
                    identity.id,
                    identity.name.clone(),
                    identity.branch_id,
                    chrono::Utc::now(),
                ),
                _ => continue,
            };
            bus.publish(signal);
        }
    });

    // Presence downlink: relayed signals onto the mailbox.
    let presence_handle = handle.clone();
    let mut presence_rx = presence.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = presence_rx.recv().await {
            presence_handle.send(Command::Remote(RemoteEvent::Presence(signal)));
        }
    });

    Terminal { handle, ui: ui_rx }
}

/// Receive UI events until one matches, failing after a timeout.
async fn wait_for<F>(ui: &mut mpsc::UnboundedReceiver<UiEvent>, mut matches: F) -> UiEvent
where
    F: FnMut(&UiEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = ui.recv().await.expect("ui channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected ui event within timeout")
}

/// Assert that no matching UI event arrives within a short window.
async fn assert_no_event<F>(ui: &mut mpsc::UnboundedReceiver<UiEvent>, mut matches: F)
where
    F: FnMut(&UiEvent) -> bool,
{
    let result = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            let event = ui.recv().await.expect("ui channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await;
    assert!(result.is_err(), "unexpected event: {:?}", result.unwrap());
}

fn is_claim_outcome(event: &UiEvent) -> bool {
    matches!(event, UiEvent::ClaimWon { .. } | UiEvent::ClaimLost { .. })
}

// ---------------------------------------------------------------------------
// Test: uniqueness under concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_claims_exactly_one_wins() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);
    let mut b = spawn_terminal(&ledger, &presence, officer(2, "Officer B"), None);

    // Same appointment, different case, effectively simultaneous.
    a.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    b.handle.send(Command::SubmitCreate {
        input: claim("apt-100"),
    });

    let a_outcome = wait_for(&mut a.ui, is_claim_outcome).await;
    let b_outcome = wait_for(&mut b.ui, is_claim_outcome).await;

    let (winner_name, loser_outcome) = match (&a_outcome, &b_outcome) {
        (UiEvent::ClaimWon { .. }, UiEvent::ClaimLost { .. }) => ("Officer A", &b_outcome),
        (UiEvent::ClaimLost { .. }, UiEvent::ClaimWon { .. }) => ("Officer B", &a_outcome),
        other => panic!("expected exactly one winner, got {other:?}"),
    };

    // The loser is told who holds the appointment.
    match loser_outcome {
        UiEvent::ClaimLost { winner, .. } => {
            let winner = winner.as_ref().expect("conflict resolves the winner");
            assert_eq!(winner.officer_name, winner_name);
            assert_eq!(winner.appointment_no.to_lowercase(), "apt-100");
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Test: the optimistic local check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn known_conflict_short_circuits_without_a_network_call() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);
    let mut b = spawn_terminal(&ledger, &presence, officer(2, "Officer B"), None);

    a.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    wait_for(&mut a.ui, |e| matches!(e, UiEvent::ClaimWon { .. })).await;

    // Wait until the feed delivered the insert into B's cache.
    wait_for(&mut b.ui, |e| {
        matches!(e, UiEvent::CacheUpdated { rows } if !rows.is_empty())
    })
    .await;

    let calls_before = ledger.create_calls();
    b.handle.send(Command::SubmitCreate {
        input: claim("  apt-100 "),
    });
    let outcome = wait_for(&mut b.ui, is_claim_outcome).await;

    assert_matches!(
        outcome,
        UiEvent::ClaimLost { winner: Some(w), .. } if w.officer_name == "Officer A"
    );
    assert_eq!(
        ledger.create_calls(),
        calls_before,
        "local hit must not reach the store"
    );
}

#[tokio::test]
async fn empty_appointment_no_is_rejected_before_any_call() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);

    a.handle.send(Command::SubmitCreate { input: claim("  ") });
    let event = wait_for(&mut a.ui, |e| matches!(e, UiEvent::ActionFailed { .. })).await;

    assert_matches!(
        event,
        UiEvent::ActionFailed { action: "claim", retryable: false, .. }
    );
    assert_eq!(ledger.create_calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn own_create_echo_never_duplicates_the_row() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);

    a.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    wait_for(&mut a.ui, |e| matches!(e, UiEvent::ClaimWon { .. })).await;

    // Every snapshot after the win (including the feed echo window) holds
    // exactly one row.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, a.ui.recv()).await {
            Ok(Some(UiEvent::CacheUpdated { rows })) => assert_eq!(rows.len(), 1),
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
}

#[tokio::test]
async fn events_for_other_date_partitions_are_dropped() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);

    let yesterday_row = Reservation {
        id: 999,
        appointment_no: "APT-OLD".to_string(),
        request_no: None,
        passport_no: None,
        foreigner_name: None,
        officer_id: 2,
        officer_name: "Officer B".to_string(),
        status: STATUS_LOCKED.to_string(),
        sn_good: None,
        sn_spoiled: None,
        card_image_url: None,
        lock_date: today() - chrono::Duration::days(1),
        branch_id: None,
        created_at: chrono::Utc::now(),
    };
    a.handle
        .send(Command::Remote(RemoteEvent::Change(ChangeEvent::Insert {
            reservation: yesterday_row.clone(),
        })));
    assert_no_event(&mut a.ui, |e| matches!(e, UiEvent::CacheUpdated { .. })).await;

    // The same row dated today is merged.
    let today_row = Reservation {
        lock_date: today(),
        ..yesterday_row
    };
    a.handle
        .send(Command::Remote(RemoteEvent::Change(ChangeEvent::Insert {
            reservation: today_row,
        })));
    let event = wait_for(&mut a.ui, |e| matches!(e, UiEvent::CacheUpdated { .. })).await;
    assert_matches!(event, UiEvent::CacheUpdated { rows } if rows.len() == 1);
}

// ---------------------------------------------------------------------------
// Test: presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matching_input_is_an_imminent_collision_not_a_notice() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut d = spawn_terminal(&ledger, &presence, officer(4, "Officer D"), None);

    // Officer C is typing APT-200 somewhere else.
    d.handle
        .send(Command::Remote(RemoteEvent::Presence(PresenceSignal::typing(
            3,
            "Officer C",
            "APT-200",
            None,
            chrono::Utc::now(),
        ))));

    // D's own field holds the same number (different case).
    d.handle.send(Command::InputChanged {
        value: "apt-200".to_string(),
    });
    let event = wait_for(&mut d.ui, |e| {
        matches!(e, UiEvent::Presence(PresenceAssessment::ImminentCollision { .. }))
    })
    .await;
    assert_matches!(
        event,
        UiEvent::Presence(PresenceAssessment::ImminentCollision { officer_name, appointment_no })
            if officer_name == "Officer C" && appointment_no == "APT-200"
    );

    // A different number downgrades to the plain notice.
    d.handle.send(Command::InputChanged {
        value: "APT-300".to_string(),
    });
    let event = wait_for(&mut d.ui, |e| {
        matches!(e, UiEvent::Presence(PresenceAssessment::OthersActive { .. }))
    })
    .await;
    assert_matches!(
        event,
        UiEvent::Presence(PresenceAssessment::OthersActive { count: 1 })
    );
}

#[tokio::test]
async fn unrefreshed_presence_expires_on_sweep() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);

    // A stale signal, older than the timeout window.
    a.handle
        .send(Command::Remote(RemoteEvent::Presence(PresenceSignal::typing(
            3,
            "Officer C",
            "APT-200",
            None,
            chrono::Utc::now() - chrono::Duration::seconds(30),
        ))));
    a.handle.send(Command::InputChanged {
        value: "APT-1".to_string(),
    });
    wait_for(&mut a.ui, |e| {
        matches!(e, UiEvent::Presence(PresenceAssessment::OthersActive { .. }))
    })
    .await;

    // The next sweep purges it and the view clears.
    a.handle.send(Command::SweepPresence);
    wait_for(&mut a.ui, |e| {
        matches!(e, UiEvent::Presence(PresenceAssessment::Clear))
    })
    .await;
}

#[tokio::test]
async fn stable_input_broadcasts_typing_then_idle_on_clear() {
    // Built by hand to keep the outbound channel observable.
    let ledger = InMemoryLedger::new(today());
    let store = ledger.handle_for(1, "Officer A", ROLE_OFFICER, None);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
    let (controller, handle) = ReservationController::new(
        Arc::new(store),
        officer(1, "Officer A"),
        today(),
        outbound_tx,
        ui_tx,
    );
    tokio::spawn(controller.run());

    handle.send(Command::InputChanged {
        value: "APT-200".to_string(),
    });

    // After the debounce window a typing frame goes out.
    let frame = tokio::time::timeout(Duration::from_secs(3), outbound_rx.recv())
        .await
        .expect("typing frame within timeout")
        .expect("outbound channel open");
    assert_matches!(
        frame,
        cardesk_events::WireMessage::PresenceTyping { appointment_no } if appointment_no == "APT-200"
    );

    // Clearing the field goes idle immediately.
    handle.send(Command::InputCleared);
    let frame = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
        .await
        .expect("idle frame within timeout")
        .expect("outbound channel open");
    assert_matches!(frame, cardesk_events::WireMessage::PresenceIdle);
}

// ---------------------------------------------------------------------------
// Test: in-flight claims
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn abandoned_claim_response_is_discarded_but_submit_recovers() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(
        &ledger,
        &presence,
        officer(1, "Officer A"),
        Some(Duration::from_millis(500)),
    );

    a.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    wait_for(&mut a.ui, |e| matches!(e, UiEvent::SubmitEnabled(false))).await;

    // The officer clears the field while the request is in flight.
    a.handle.send(Command::InputCleared);

    // When the response lands: the submit control recovers, the feed
    // reconciles the server-side row into the cache, and the stale claim
    // outcome itself is never surfaced. The three arrive in no fixed order.
    let mut submit_recovered = false;
    let mut reconciled_rows: Option<Vec<Reservation>> = None;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !(submit_recovered && reconciled_rows.is_some()) {
            match a.ui.recv().await.expect("ui channel closed") {
                UiEvent::SubmitEnabled(true) => submit_recovered = true,
                UiEvent::CacheUpdated { rows } if !rows.is_empty() => {
                    reconciled_rows = Some(rows);
                }
                event if is_claim_outcome(&event) => {
                    panic!("abandoned claim surfaced an outcome: {event:?}")
                }
                _ => {}
            }
        }
    })
    .await
    .expect("submit recovery and reconciliation within timeout");

    let rows = reconciled_rows.unwrap();
    assert_eq!(rows[0].appointment_no, "APT-100");
}

// ---------------------------------------------------------------------------
// Test: receipt flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receipt_preconditions_then_issue_then_terminal() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut a = spawn_terminal(&ledger, &presence, officer(1, "Officer A"), None);

    a.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    let won = wait_for(&mut a.ui, |e| matches!(e, UiEvent::ClaimWon { .. })).await;
    let id = match won {
        UiEvent::ClaimWon { reservation } => reservation.id,
        _ => unreachable!(),
    };

    a.handle.send(Command::AttachSerials {
        id,
        input: UpdateSerials {
            sn_good: "SN001".to_string(),
            sn_spoiled: None,
        },
    });
    wait_for(&mut a.ui, |e| {
        matches!(e, UiEvent::CacheUpdated { rows } if rows[0].status == "printed")
    })
    .await;

    // Image and name still missing: blocked with both items, no call made.
    a.handle.send(Command::GenerateReceipt { id });
    let event = wait_for(&mut a.ui, |e| matches!(e, UiEvent::ReceiptBlocked { .. })).await;
    assert_matches!(
        event,
        UiEvent::ReceiptBlocked { blockers }
            if blockers == vec![ReceiptBlocker::MissingCardImage, ReceiptBlocker::MissingForeignerName]
    );

    a.handle.send(Command::AttachImage {
        id,
        url: "https://files.local/cards/1.jpg".to_string(),
    });
    a.handle.send(Command::EditDetails {
        id,
        input: UpdateDetails {
            foreigner_name: Some("Nguyen Van A".to_string()),
            ..Default::default()
        },
    });
    wait_for(&mut a.ui, |e| {
        matches!(e, UiEvent::CacheUpdated { rows } if rows[0].foreigner_name.is_some())
    })
    .await;

    a.handle.send(Command::GenerateReceipt { id });
    let event = wait_for(&mut a.ui, |e| matches!(e, UiEvent::ReceiptIssued { .. })).await;
    assert_matches!(
        event,
        UiEvent::ReceiptIssued { reservation, receipt }
            if reservation.status == "completed" && receipt.appointment_no == "APT-100"
    );

    // Completed is terminal: a second attempt is blocked locally.
    a.handle.send(Command::GenerateReceipt { id });
    let event = wait_for(&mut a.ui, |e| matches!(e, UiEvent::ReceiptBlocked { .. })).await;
    assert_matches!(
        event,
        UiEvent::ReceiptBlocked { blockers } if blockers.contains(&ReceiptBlocker::NotPrinted)
    );
}

// ---------------------------------------------------------------------------
// Test: unlock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unlock_propagates_to_every_terminal_and_frees_the_key() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut boss = spawn_terminal(&ledger, &presence, admin(99, "Admin"), None);
    let mut b = spawn_terminal(&ledger, &presence, officer(2, "Officer B"), None);

    boss.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    let won = wait_for(&mut boss.ui, |e| matches!(e, UiEvent::ClaimWon { .. })).await;
    let id = match won {
        UiEvent::ClaimWon { reservation } => reservation.id,
        _ => unreachable!(),
    };

    // B sees the row arrive, then disappear.
    wait_for(&mut b.ui, |e| {
        matches!(e, UiEvent::CacheUpdated { rows } if !rows.is_empty())
    })
    .await;

    boss.handle.send(Command::Unlock { id });
    wait_for(&mut b.ui, |e| {
        matches!(e, UiEvent::CacheUpdated { rows } if rows.is_empty())
    })
    .await;

    // The uniqueness constraint no longer applies: B can claim it now.
    b.handle.send(Command::SubmitCreate {
        input: claim("APT-100"),
    });
    wait_for(&mut b.ui, |e| matches!(e, UiEvent::ClaimWon { .. })).await;
}

#[tokio::test]
async fn non_admin_unlock_is_rejected_locally() {
    let ledger = InMemoryLedger::new(today());
    let presence = Arc::new(PresenceBus::default());
    let mut b = spawn_terminal(&ledger, &presence, officer(2, "Officer B"), None);

    b.handle.send(Command::Unlock { id: 1 });
    let event = wait_for(&mut b.ui, |e| matches!(e, UiEvent::ActionFailed { .. })).await;
    assert_matches!(
        event,
        UiEvent::ActionFailed { action: "unlock", retryable: false, .. }
    );
}
