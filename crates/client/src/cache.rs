//! Optimistic local mirror of today's reservations.
//!
//! The cache exists for instant feedback only; the store remains the source
//! of truth. Merges are idempotent by record id so duplicate feed delivery
//! (or the echo of our own create) cannot corrupt the view.

use std::collections::HashMap;

use cardesk_core::reservation::normalize_appointment_no;
use cardesk_core::types::{DbId, LockDate};
use cardesk_db::models::reservation::Reservation;
use cardesk_events::ChangeEvent;

/// In-memory view of one day's reservation ledger, keyed by row id.
#[derive(Debug)]
pub struct TodayCache {
    today: LockDate,
    rows: HashMap<DbId, Reservation>,
}

impl TodayCache {
    /// Create an empty cache for the given date partition.
    pub fn new(today: LockDate) -> Self {
        Self {
            today,
            rows: HashMap::new(),
        }
    }

    pub fn today(&self) -> LockDate {
        self.today
    }

    /// Replace the whole cache from an authoritative listing. Rows outside
    /// today's partition are dropped.
    pub fn replace_all(&mut self, rows: Vec<Reservation>) {
        self.rows = rows
            .into_iter()
            .filter(|r| r.lock_date == self.today)
            .map(|r| (r.id, r))
            .collect();
    }

    /// Insert or replace a single row. Returns `false` (and changes
    /// nothing) for rows outside today's partition.
    pub fn upsert(&mut self, reservation: Reservation) -> bool {
        if reservation.lock_date != self.today {
            return false;
        }
        self.rows.insert(reservation.id, reservation);
        true
    }

    /// Merge one change-feed event. Returns `true` if the view changed.
    ///
    /// - Inserts for an id already present are the echo of a create we
    ///   applied locally; they are ignored.
    /// - Updates replace the full row (also covers an update arriving
    ///   before its insert, since replace-by-id is an upsert).
    /// - Deletes remove by id.
    /// - Events for other date partitions are dropped.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.lock_date() != self.today {
            return false;
        }
        match event {
            ChangeEvent::Insert { reservation } => {
                if self.rows.contains_key(&reservation.id) {
                    return false;
                }
                self.rows.insert(reservation.id, reservation.clone());
                true
            }
            ChangeEvent::Update { reservation } => {
                let replaced = self.rows.insert(reservation.id, reservation.clone());
                replaced.as_ref() != Some(reservation)
            }
            ChangeEvent::Delete { id, .. } => self.rows.remove(id).is_some(),
        }
    }

    /// Remove a row by id (local echo of our own unlock).
    pub fn remove(&mut self, id: DbId) -> bool {
        self.rows.remove(&id).is_some()
    }

    pub fn get(&self, id: DbId) -> Option<&Reservation> {
        self.rows.get(&id)
    }

    /// Case-insensitive scan for an appointment number. This is the
    /// optimistic pre-check of the create protocol: a hit means a certain
    /// conflict, a miss proves nothing.
    pub fn find_by_appointment(&self, raw: &str) -> Option<&Reservation> {
        let needle = normalize_appointment_no(raw);
        if needle.is_empty() {
            return None;
        }
        self.rows
            .values()
            .find(|r| normalize_appointment_no(&r.appointment_no) == needle)
    }

    /// All rows in creation order (ties broken by id, matching the store's
    /// listing order).
    pub fn ordered(&self) -> Vec<&Reservation> {
        let mut rows: Vec<_> = self.rows.values().collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
