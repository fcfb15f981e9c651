//! Domain types and ports: users, verification codes, token payloads, the
//! shared error enum, and the persistence traits the orchestrator consumes.

mod code;
mod error;
mod store;
mod token;
mod user;

pub use code::{VerificationCode, VerificationCodeKind};
pub use error::Error;
pub use store::{UserStore, VerificationCodeStore};
pub use token::{Claims, LoginOutcome, MfaTicket, TokenPair};
pub use user::User;
