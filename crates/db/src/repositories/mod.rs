pub mod receipt_repo;
pub mod reservation_repo;

pub use receipt_repo::ReceiptRepo;
pub use reservation_repo::{CompleteOutcome, CreateOutcome, ReservationRepo};
