//! Ephemeral typing-presence signals and the receiver-side roster.
//!
//! Presence is advisory only: it lowers the odds of two officers submitting
//! the same appointment number, but the store's unique constraint is the
//! only thing that actually decides a winner. Signals are never persisted
//! and carry no delivery guarantee.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::reservation::normalize_appointment_no;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Input must be stable this long before a `typing` signal is broadcast.
pub const TYPING_DEBOUNCE_MS: u64 = 400;

/// While the input stays non-empty, the `typing` signal is refreshed at
/// this interval so receivers' sweeps do not expire a live officer.
/// Must be comfortably below [`PRESENCE_STALE_TIMEOUT_SECS`].
pub const TYPING_REFRESH_SECS: u64 = 3;

/// A signal not refreshed within this window is considered stale.
pub const PRESENCE_STALE_TIMEOUT_SECS: i64 = 8;

/// How often each receiver sweeps stale entries out of its roster.
pub const PRESENCE_SWEEP_INTERVAL_SECS: u64 = 2;

// ---------------------------------------------------------------------------
// PresenceSignal
// ---------------------------------------------------------------------------

/// What the sending officer's input field is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    /// Input is non-empty and stable; `appointment_no` carries the value.
    Typing,
    /// Input was cleared, blurred, or a create just succeeded.
    Idle,
}

/// One ephemeral presence signal from an officer's terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSignal {
    pub kind: PresenceKind,
    pub officer_id: DbId,
    pub officer_name: String,
    /// The value currently being typed. `None` for `Idle`.
    pub appointment_no: Option<String>,
    pub branch_id: Option<DbId>,
    pub sent_at: Timestamp,
}

impl PresenceSignal {
    pub fn typing(
        officer_id: DbId,
        officer_name: impl Into<String>,
        appointment_no: impl Into<String>,
        branch_id: Option<DbId>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            kind: PresenceKind::Typing,
            officer_id,
            officer_name: officer_name.into(),
            appointment_no: Some(appointment_no.into()),
            branch_id,
            sent_at,
        }
    }

    pub fn idle(
        officer_id: DbId,
        officer_name: impl Into<String>,
        branch_id: Option<DbId>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            kind: PresenceKind::Idle,
            officer_id,
            officer_name: officer_name.into(),
            appointment_no: None,
            branch_id,
            sent_at,
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceRoster
// ---------------------------------------------------------------------------

/// What the local officer should be shown about everyone else's activity.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceAssessment {
    /// Nobody else is typing anything.
    Clear,
    /// Other officers are active, but on different appointment numbers.
    OthersActive { count: usize },
    /// Another officer is typing the same appointment number right now.
    ImminentCollision {
        officer_name: String,
        appointment_no: String,
    },
}

/// Receiver-side map of `officer_id` to the officer's last live signal.
///
/// Each terminal owns exactly one roster. Entries are superseded by newer
/// signals from the same officer and purged by a periodic sweep; the sender
/// never removes its own entry remotely.
#[derive(Debug, Default)]
pub struct PresenceRoster {
    entries: HashMap<DbId, PresenceSignal>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an incoming signal from another officer.
    ///
    /// `Typing` upserts the entry; `Idle` removes it. Signals from
    /// `own_officer_id` (the echo of our own broadcast) are ignored.
    pub fn apply(&mut self, signal: PresenceSignal, own_officer_id: DbId) {
        if signal.officer_id == own_officer_id {
            return;
        }
        match signal.kind {
            PresenceKind::Typing => {
                self.entries.insert(signal.officer_id, signal);
            }
            PresenceKind::Idle => {
                self.entries.remove(&signal.officer_id);
            }
        }
    }

    /// Remove entries whose signal is older than the stale timeout.
    ///
    /// Returns how many entries were purged.
    pub fn purge_stale(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| {
            (now - s.sent_at).num_seconds() < PRESENCE_STALE_TIMEOUT_SECS
        });
        before - self.entries.len()
    }

    /// Compare the local input against every live signal.
    ///
    /// An exact case-insensitive match is an imminent collision; any other
    /// live typing activity is only a notice. An empty local input can never
    /// collide.
    pub fn assess(&self, local_input: &str) -> PresenceAssessment {
        let active = self.entries.len();
        if active == 0 {
            return PresenceAssessment::Clear;
        }

        let normalized = normalize_appointment_no(local_input);
        if !normalized.is_empty() {
            for signal in self.entries.values() {
                let matches = signal
                    .appointment_no
                    .as_deref()
                    .is_some_and(|v| normalize_appointment_no(v) == normalized);
                if matches {
                    return PresenceAssessment::ImminentCollision {
                        officer_name: signal.officer_name.clone(),
                        appointment_no: signal.appointment_no.clone().unwrap_or_default(),
                    };
                }
            }
        }

        PresenceAssessment::OthersActive { count: active }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn typing_upserts_and_idle_removes() {
        let mut roster = PresenceRoster::new();

        roster.apply(PresenceSignal::typing(2, "Officer B", "APT-1", None, at(0)), 1);
        assert_eq!(roster.len(), 1);

        // A newer signal from the same officer supersedes the old one.
        roster.apply(PresenceSignal::typing(2, "Officer B", "APT-2", None, at(1)), 1);
        assert_eq!(roster.len(), 1);

        roster.apply(PresenceSignal::idle(2, "Officer B", None, at(2)), 1);
        assert!(roster.is_empty());
    }

    #[test]
    fn own_echo_is_ignored() {
        let mut roster = PresenceRoster::new();
        roster.apply(PresenceSignal::typing(1, "Me", "APT-1", None, at(0)), 1);
        assert!(roster.is_empty());
    }

    #[test]
    fn stale_entries_are_purged_after_timeout() {
        let mut roster = PresenceRoster::new();
        roster.apply(PresenceSignal::typing(2, "B", "APT-1", None, at(0)), 1);
        roster.apply(PresenceSignal::typing(3, "C", "APT-2", None, at(5)), 1);

        // At t=5 nothing is stale yet.
        assert_eq!(roster.purge_stale(at(5)), 0);

        // At t=9 the first signal is past the 8s window, the second is not.
        assert_eq!(roster.purge_stale(at(9)), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn exact_match_is_imminent_collision_case_insensitive() {
        let mut roster = PresenceRoster::new();
        roster.apply(PresenceSignal::typing(2, "Officer B", "APT-200", None, at(0)), 1);

        let assessment = roster.assess("apt-200");
        assert_eq!(
            assessment,
            PresenceAssessment::ImminentCollision {
                officer_name: "Officer B".to_string(),
                appointment_no: "APT-200".to_string(),
            }
        );
    }

    #[test]
    fn different_value_is_only_a_notice() {
        let mut roster = PresenceRoster::new();
        roster.apply(PresenceSignal::typing(2, "B", "APT-200", None, at(0)), 1);
        roster.apply(PresenceSignal::typing(3, "C", "APT-300", None, at(0)), 1);

        assert_eq!(
            roster.assess("APT-999"),
            PresenceAssessment::OthersActive { count: 2 }
        );
    }

    #[test]
    fn empty_input_never_collides() {
        let mut roster = PresenceRoster::new();
        roster.apply(PresenceSignal::typing(2, "B", "APT-200", None, at(0)), 1);

        assert_eq!(
            roster.assess("   "),
            PresenceAssessment::OthersActive { count: 1 }
        );
    }

    #[test]
    fn quiet_roster_is_clear() {
        let roster = PresenceRoster::new();
        assert_eq!(roster.assess("APT-1"), PresenceAssessment::Clear);
    }
}
