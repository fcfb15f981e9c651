//! Store implementations behind the domain persistence traits.

pub mod memory;
pub mod postgres;

pub use postgres::{PgUserStore, PgVerificationCodeStore};
