//! # sigilo
//!
//! Identity provider with fail-over token signing.
//!
//! The signing engine keeps one logical signing identity behind two
//! backends: a remote Vault transit key and a local in-process RSA key
//! pair. Remote failures demote the backend transparently; a periodic
//! probe (or an operator) promotes it back. On top of that sit the
//! credential services (issuance, validation, revocation, JWKS export)
//! and the authentication orchestrator driving registration, email
//! verification, login with optional MFA, and password reset.

pub mod api;
pub mod auth;
pub mod cli;
pub mod domain;
pub mod jwt;
pub mod store;
pub mod vault;

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
