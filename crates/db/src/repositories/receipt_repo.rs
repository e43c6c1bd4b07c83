//! Repository for the `pickup_receipts` table.

use sqlx::PgPool;

use crate::models::receipt::PickupReceipt;

/// Column list for `pickup_receipts` queries.
const RECEIPT_COLUMNS: &str = "id, appointment_no, reservation_id, issued_by, issued_at";

/// Read operations over issued receipts. Insertion happens inside
/// [`ReservationRepo::complete`](crate::repositories::ReservationRepo::complete)
/// so it shares the completion transaction.
pub struct ReceiptRepo;

impl ReceiptRepo {
    /// Whether a receipt was ever issued for this appointment
    /// (case-insensitive). This is the client-visible precondition check;
    /// the completion transaction re-verifies it authoritatively.
    pub async fn exists_for_appointment(
        pool: &PgPool,
        appointment_no: &str,
    ) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pickup_receipts WHERE lower(appointment_no) = lower($1))",
        )
        .bind(appointment_no.trim())
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Fetch the receipt for an appointment, if one was issued.
    pub async fn get_by_appointment(
        pool: &PgPool,
        appointment_no: &str,
    ) -> Result<Option<PickupReceipt>, sqlx::Error> {
        let query = format!(
            "SELECT {RECEIPT_COLUMNS} FROM pickup_receipts \
             WHERE lower(appointment_no) = lower($1)"
        );
        sqlx::query_as::<_, PickupReceipt>(&query)
            .bind(appointment_no.trim())
            .fetch_optional(pool)
            .await
    }
}
