//! In-process reservation ledger with the same semantics as the real store.
//!
//! Backs the controller test suite (and offline demos): one shared
//! [`InMemoryLedger`] plays the role of the database plus its change feed,
//! and each officer gets an [`InMemoryStore`] handle bound to their
//! identity. Uniqueness, status gating, receipt preconditions, and branch
//! scoping all behave like the server so tests exercise the real protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use cardesk_core::reservation::{
    can_edit, is_cross_branch, normalize_appointment_no, receipt_blockers, ReservationStatus,
    STATUS_COMPLETED, STATUS_LOCKED, STATUS_PRINTED,
};
use cardesk_core::types::{DbId, LockDate};
use cardesk_db::models::receipt::PickupReceipt;
use cardesk_db::models::reservation::{
    CreateReservation, Reservation, UpdateDetails, UpdateSerials,
};
use cardesk_events::{ChangeEvent, ChangeFeed};

use crate::store::{Completion, CreateResult, ReservationStore, StoreError};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

struct LedgerState {
    next_row_id: DbId,
    next_receipt_id: DbId,
    rows: HashMap<DbId, Reservation>,
    /// Receipts keyed by normalized appointment number; survive unlocks.
    receipts: HashMap<String, PickupReceipt>,
    create_calls: u64,
}

/// Shared single-process stand-in for the reservation store + change feed.
pub struct InMemoryLedger {
    today: LockDate,
    state: Mutex<LedgerState>,
    feed: ChangeFeed,
}

impl InMemoryLedger {
    pub fn new(today: LockDate) -> Arc<Self> {
        Arc::new(Self {
            today,
            state: Mutex::new(LedgerState {
                next_row_id: 1,
                next_receipt_id: 1,
                rows: HashMap::new(),
                receipts: HashMap::new(),
                create_calls: 0,
            }),
            feed: ChangeFeed::default(),
        })
    }

    /// Subscribe to the ledger's change feed (what the server would push
    /// over WebSocket).
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// How many create calls reached the store. The optimistic local check
    /// is a latency optimization; this counter proves when it short-circuits.
    pub fn create_calls(&self) -> u64 {
        self.state.lock().expect("ledger poisoned").create_calls
    }

    /// A store handle bound to one officer's identity.
    pub fn handle_for(
        self: &Arc<Self>,
        officer_id: DbId,
        officer_name: impl Into<String>,
        role: impl Into<String>,
        branch_id: Option<DbId>,
    ) -> InMemoryStore {
        InMemoryStore {
            ledger: Arc::clone(self),
            officer_id,
            officer_name: officer_name.into(),
            role: role.into(),
            branch_id,
            latency: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

/// One officer's connection to the [`InMemoryLedger`].
pub struct InMemoryStore {
    ledger: Arc<InMemoryLedger>,
    officer_id: DbId,
    officer_name: String,
    role: String,
    branch_id: Option<DbId>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    /// Add artificial latency before every call (exercises in-flight and
    /// abandonment behaviour under paused test time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn edit_row<F>(&self, id: DbId, mutate: F) -> Result<Reservation, StoreError>
    where
        F: FnOnce(&mut Reservation),
    {
        let mut state = self.ledger.state.lock().expect("ledger poisoned");
        let row = state.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !can_edit(&self.role, self.officer_id, row.officer_id) {
            return Err(StoreError::Forbidden(
                "only the reserving officer or an admin may modify this reservation".into(),
            ));
        }
        if row.status == STATUS_COMPLETED {
            return Err(StoreError::Conflict(format!(
                "reservation {id} is completed and can no longer be modified"
            )));
        }
        mutate(row);
        let updated = row.clone();
        drop(state);

        self.ledger.feed.publish(ChangeEvent::Update {
            reservation: updated.clone(),
        });
        Ok(updated)
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn create(&self, input: &CreateReservation) -> Result<CreateResult, StoreError> {
        self.simulate_latency().await;

        let needle = normalize_appointment_no(&input.appointment_no);
        let mut state = self.ledger.state.lock().expect("ledger poisoned");
        state.create_calls += 1;

        let winner = state
            .rows
            .values()
            .find(|r| {
                normalize_appointment_no(&r.appointment_no) == needle
                    && r.branch_id == self.branch_id
            })
            .cloned();
        if let Some(winner) = winner {
            return Ok(CreateResult::Conflict {
                winner: Some(winner),
            });
        }

        let id = state.next_row_id;
        state.next_row_id += 1;
        let reservation = Reservation {
            id,
            appointment_no: input.appointment_no.trim().to_string(),
            request_no: input.request_no.clone(),
            passport_no: input.passport_no.clone(),
            foreigner_name: input.foreigner_name.clone(),
            officer_id: self.officer_id,
            officer_name: self.officer_name.clone(),
            status: STATUS_LOCKED.to_string(),
            sn_good: None,
            sn_spoiled: None,
            card_image_url: None,
            lock_date: self.ledger.today,
            branch_id: self.branch_id,
            created_at: chrono::Utc::now(),
        };
        state.rows.insert(id, reservation.clone());
        drop(state);

        self.ledger.feed.publish(ChangeEvent::Insert {
            reservation: reservation.clone(),
        });
        Ok(CreateResult::Created(reservation))
    }

    async fn get_by_appointment(
        &self,
        appointment_no: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        self.simulate_latency().await;
        let needle = normalize_appointment_no(appointment_no);
        let state = self.ledger.state.lock().expect("ledger poisoned");
        Ok(state
            .rows
            .values()
            .find(|r| {
                normalize_appointment_no(&r.appointment_no) == needle
                    && r.branch_id == self.branch_id
            })
            .cloned())
    }

    async fn update_serials(
        &self,
        id: DbId,
        input: &UpdateSerials,
    ) -> Result<Reservation, StoreError> {
        self.simulate_latency().await;
        self.edit_row(id, |row| {
            row.sn_good = Some(input.sn_good.trim().to_string());
            row.sn_spoiled = input.sn_spoiled.clone();
            row.status = STATUS_PRINTED.to_string();
        })
    }

    async fn update_details(
        &self,
        id: DbId,
        input: &UpdateDetails,
    ) -> Result<Reservation, StoreError> {
        self.simulate_latency().await;
        self.edit_row(id, |row| {
            if let Some(v) = &input.request_no {
                row.request_no = Some(v.clone());
            }
            if let Some(v) = &input.passport_no {
                row.passport_no = Some(v.clone());
            }
            if let Some(v) = &input.foreigner_name {
                row.foreigner_name = Some(v.clone());
            }
        })
    }

    async fn update_image(&self, id: DbId, url: &str) -> Result<Reservation, StoreError> {
        self.simulate_latency().await;
        self.edit_row(id, |row| {
            row.card_image_url = Some(url.to_string());
        })
    }

    async fn complete(&self, id: DbId) -> Result<Completion, StoreError> {
        self.simulate_latency().await;
        let mut state = self.ledger.state.lock().expect("ledger poisoned");

        let row = state.rows.get(&id).cloned().ok_or(StoreError::NotFound)?;
        if !can_edit(&self.role, self.officer_id, row.officer_id) {
            return Err(StoreError::Forbidden(
                "only the reserving officer or an admin may modify this reservation".into(),
            ));
        }

        let key = normalize_appointment_no(&row.appointment_no);
        let blockers = receipt_blockers(
            ReservationStatus::parse(&row.status).unwrap_or(ReservationStatus::Locked),
            row.sn_good.as_deref(),
            row.card_image_url.as_deref(),
            row.foreigner_name.as_deref(),
            state.receipts.contains_key(&key),
        );
        if !blockers.is_empty() {
            return Err(StoreError::ReceiptBlocked(blockers));
        }

        let receipt = PickupReceipt {
            id: state.next_receipt_id,
            appointment_no: row.appointment_no.clone(),
            reservation_id: Some(row.id),
            issued_by: self.officer_id,
            issued_at: chrono::Utc::now(),
        };
        state.next_receipt_id += 1;
        state.receipts.insert(key, receipt.clone());

        let row = state.rows.get_mut(&id).expect("row checked above");
        row.status = STATUS_COMPLETED.to_string();
        let reservation = row.clone();
        drop(state);

        self.ledger.feed.publish(ChangeEvent::Update {
            reservation: reservation.clone(),
        });
        Ok(Completion {
            reservation,
            receipt,
        })
    }

    async fn delete(&self, id: DbId) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut state = self.ledger.state.lock().expect("ledger poisoned");
        let row = state.rows.remove(&id).ok_or(StoreError::NotFound)?;
        // Receipts are archival; they stay behind, detached.
        if let Some(receipt) = state
            .receipts
            .get_mut(&normalize_appointment_no(&row.appointment_no))
        {
            receipt.reservation_id = None;
        }
        drop(state);

        self.ledger.feed.publish(ChangeEvent::Delete {
            id: row.id,
            appointment_no: row.appointment_no,
            lock_date: row.lock_date,
            branch_id: row.branch_id,
        });
        Ok(())
    }

    async fn list_today(&self) -> Result<Vec<Reservation>, StoreError> {
        self.simulate_latency().await;
        let state = self.ledger.state.lock().expect("ledger poisoned");
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|r| is_cross_branch(&self.role) || r.branch_id == self.branch_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }
}
