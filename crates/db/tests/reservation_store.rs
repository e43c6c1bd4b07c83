//! Integration tests for the reservation store.
//!
//! Exercises the repository layer against a real database:
//! - atomic claim with case-insensitive uniqueness
//! - conflict resolution (fetching the winning row)
//! - status transitions and completed-row immutability
//! - completion preconditions and receipt issuance
//! - branch partitioning and admin unlock

use assert_matches::assert_matches;
use sqlx::PgPool;

use cardesk_core::reservation::{ReceiptBlocker, ReservationStatus};
use cardesk_db::models::reservation::{CreateReservation, UpdateDetails, UpdateImage, UpdateSerials};
use cardesk_db::repositories::{CompleteOutcome, CreateOutcome, ReceiptRepo, ReservationRepo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn claim(appointment_no: &str) -> CreateReservation {
    CreateReservation {
        appointment_no: appointment_no.to_string(),
        request_no: None,
        passport_no: None,
        foreigner_name: None,
    }
}

fn serials(good: &str) -> UpdateSerials {
    UpdateSerials {
        sn_good: good.to_string(),
        sn_spoiled: None,
    }
}

async fn claim_ok(pool: &PgPool, officer_id: i64, officer_name: &str, appointment: &str) -> i64 {
    match ReservationRepo::create(pool, officer_id, officer_name, None, &claim(appointment))
        .await
        .unwrap()
    {
        CreateOutcome::Created(r) => r.id,
        CreateOutcome::Duplicate => panic!("expected {appointment} to be free"),
    }
}

// ---------------------------------------------------------------------------
// Test: uniqueness
// ---------------------------------------------------------------------------

#[sqlx::test]
async fn second_claim_with_different_case_is_a_duplicate(pool: PgPool) {
    claim_ok(&pool, 1, "Officer A", "APT-100").await;

    let outcome = ReservationRepo::create(&pool, 2, "Officer B", None, &claim("apt-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Duplicate);

    // Surrounding whitespace is trimmed before the insert, so it collides too.
    let outcome = ReservationRepo::create(&pool, 2, "Officer B", None, &claim("  APT-100  "))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Duplicate);
}

#[sqlx::test]
async fn duplicate_resolves_to_the_winning_officer(pool: PgPool) {
    claim_ok(&pool, 1, "Officer A", "APT-100").await;

    let outcome = ReservationRepo::create(&pool, 2, "Officer B", None, &claim("apt-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Duplicate);

    // The duplicate outcome carries no owner details; the lookup does.
    let winner = ReservationRepo::get_by_appointment(&pool, "apt-100", None)
        .await
        .unwrap()
        .expect("winner row must exist");
    assert_eq!(winner.officer_name, "Officer A");
    assert_eq!(winner.appointment_no, "APT-100");
}

#[sqlx::test]
async fn concurrent_claims_exactly_one_wins(pool: PgPool) {
    let claim_a = claim("APT-100");
    let claim_b = claim("apt-100");
    let (a, b) = tokio::join!(
        ReservationRepo::create(&pool, 1, "Officer A", None, &claim_a),
        ReservationRepo::create(&pool, 2, "Officer B", None, &claim_b),
    );

    let created = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| matches!(o, CreateOutcome::Created(_)))
        .count();
    assert_eq!(created, 1, "exactly one of two concurrent claims must win");
}

#[sqlx::test]
async fn same_appointment_in_another_branch_is_independent(pool: PgPool) {
    let outcome = ReservationRepo::create(&pool, 1, "Officer A", Some(10), &claim("APT-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Created(_));

    let outcome = ReservationRepo::create(&pool, 2, "Officer B", Some(20), &claim("APT-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Created(_));

    // Within branch 10 it is still taken.
    let outcome = ReservationRepo::create(&pool, 3, "Officer C", Some(10), &claim("APT-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Duplicate);
}

// ---------------------------------------------------------------------------
// Test: status transitions
// ---------------------------------------------------------------------------

#[sqlx::test]
async fn recording_serials_transitions_to_printed(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;

    let row = ReservationRepo::update_serials(&pool, id, &serials("SN001"))
        .await
        .unwrap()
        .expect("row is not completed");
    assert_eq!(row.lifecycle_status(), ReservationStatus::Printed);
    assert_eq!(row.sn_good.as_deref(), Some("SN001"));

    // Re-recording is a correction, status stays printed.
    let row = ReservationRepo::update_serials(&pool, id, &serials("SN002"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.lifecycle_status(), ReservationStatus::Printed);
    assert_eq!(row.sn_good.as_deref(), Some("SN002"));
}

#[sqlx::test]
async fn details_patch_preserves_absent_fields(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;

    ReservationRepo::update_details(
        &pool,
        id,
        &UpdateDetails {
            foreigner_name: Some("Nguyen Van A".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    let row = ReservationRepo::update_details(
        &pool,
        id,
        &UpdateDetails {
            passport_no: Some("C1234567".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(row.foreigner_name.as_deref(), Some("Nguyen Van A"));
    assert_eq!(row.passport_no.as_deref(), Some("C1234567"));
    assert_eq!(row.lifecycle_status(), ReservationStatus::Locked);
}

// ---------------------------------------------------------------------------
// Test: completion
// ---------------------------------------------------------------------------

async fn make_printable(pool: &PgPool, id: i64) {
    ReservationRepo::update_serials(pool, id, &serials("SN001"))
        .await
        .unwrap()
        .unwrap();
    ReservationRepo::update_image(pool, id, "https://files.local/cards/1.jpg")
        .await
        .unwrap()
        .unwrap();
    ReservationRepo::update_details(
        pool,
        id,
        &UpdateDetails {
            foreigner_name: Some("Nguyen Van A".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
}

#[sqlx::test]
async fn complete_without_image_is_blocked_and_stays_printed(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;
    ReservationRepo::update_serials(&pool, id, &serials("SN001"))
        .await
        .unwrap()
        .unwrap();
    ReservationRepo::update_details(
        &pool,
        id,
        &UpdateDetails {
            foreigner_name: Some("Nguyen Van A".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    let outcome = ReservationRepo::complete(&pool, id, 1).await.unwrap();
    assert_matches!(
        outcome,
        CompleteOutcome::Blocked(blockers) if blockers == vec![ReceiptBlocker::MissingCardImage]
    );

    let row = ReservationRepo::get(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.lifecycle_status(), ReservationStatus::Printed);
}

#[sqlx::test]
async fn complete_issues_receipt_and_row_becomes_immutable(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;
    make_printable(&pool, id).await;

    let outcome = ReservationRepo::complete(&pool, id, 1).await.unwrap();
    let reservation = match outcome {
        CompleteOutcome::Completed { reservation, receipt } => {
            assert_eq!(receipt.appointment_no, "APT-100");
            assert_eq!(receipt.reservation_id, Some(id));
            reservation
        }
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(reservation.lifecycle_status(), ReservationStatus::Completed);

    assert!(ReceiptRepo::exists_for_appointment(&pool, "apt-100")
        .await
        .unwrap());

    // Completed rows accept no further mutation.
    assert!(ReservationRepo::update_serials(&pool, id, &serials("SN999"))
        .await
        .unwrap()
        .is_none());
    assert!(ReservationRepo::update_image(&pool, id, "https://x/y.jpg")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test]
async fn receipt_survives_unlock_and_blocks_a_second_completion(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;
    make_printable(&pool, id).await;
    assert_matches!(
        ReservationRepo::complete(&pool, id, 1).await.unwrap(),
        CompleteOutcome::Completed { .. }
    );

    // Admin unlock removes the reservation; the receipt stays, detached.
    assert!(ReservationRepo::delete(&pool, id).await.unwrap());
    let receipt = ReceiptRepo::get_by_appointment(&pool, "APT-100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.reservation_id, None);

    // The key is free again...
    let id2 = claim_ok(&pool, 2, "Officer B", "apt-100").await;
    make_printable(&pool, id2).await;

    // ...but the archival receipt still blocks a second issuance.
    let outcome = ReservationRepo::complete(&pool, id2, 2).await.unwrap();
    assert_matches!(
        outcome,
        CompleteOutcome::Blocked(blockers)
            if blockers.contains(&ReceiptBlocker::ReceiptAlreadyIssued)
    );
}

// ---------------------------------------------------------------------------
// Test: unlock and listing
// ---------------------------------------------------------------------------

#[sqlx::test]
async fn unlock_frees_the_appointment_key(pool: PgPool) {
    let id = claim_ok(&pool, 1, "Officer A", "APT-100").await;
    assert!(ReservationRepo::delete(&pool, id).await.unwrap());
    assert!(!ReservationRepo::delete(&pool, id).await.unwrap());

    let outcome = ReservationRepo::create(&pool, 2, "Officer B", None, &claim("APT-100"))
        .await
        .unwrap();
    assert_matches!(outcome, CreateOutcome::Created(_));
}

#[sqlx::test]
async fn list_today_is_branch_scoped_and_creation_ordered(pool: PgPool) {
    ReservationRepo::create(&pool, 1, "Officer A", Some(10), &claim("APT-1"))
        .await
        .unwrap();
    ReservationRepo::create(&pool, 1, "Officer A", Some(10), &claim("APT-2"))
        .await
        .unwrap();
    ReservationRepo::create(&pool, 2, "Officer B", Some(20), &claim("APT-3"))
        .await
        .unwrap();

    let branch_10 = ReservationRepo::list_today(&pool, Some(10), false).await.unwrap();
    let numbers: Vec<_> = branch_10.iter().map(|r| r.appointment_no.as_str()).collect();
    assert_eq!(numbers, vec!["APT-1", "APT-2"]);

    let all = ReservationRepo::list_today(&pool, None, true).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn validation_rules_are_derived_on_dtos() {
    use validator::Validate;

    // Empty appointment numbers never reach the store.
    assert!(claim("").validate().is_err());
    assert!(claim("APT-100").validate().is_ok());
    assert!(UpdateImage {
        card_image_url: "not a url".to_string(),
    }
    .validate()
    .is_err());
}
