//! Foundation types for IDCAS, the content-addressable identity store.
//!
//! This crate provides the addressing, identity, and session types shared by
//! every other IDCAS crate. It performs no I/O and no hashing.
//!
//! # Key Types
//!
//! - [`ContentAddress`] — URL-safe, unpadded base64 encoding of a digest
//! - [`PublicKey`] — Validated 32-byte public key with base64 text forms
//! - [`UserTrackingInfo`] — Derived first/last-seen aggregate for a key
//! - [`LoginState`] / [`LoginPhase`] — Authoritative session state
//! - [`LoginStateChange`] / [`ChangeReason`] — Transition event records
//! - [`LoginResult`] — Outcome of a login attempt

pub mod address;
pub mod error;
pub mod identity;
pub mod session;
pub mod tracking;

pub use address::ContentAddress;
pub use error::TypeError;
pub use identity::PublicKey;
pub use session::{ChangeReason, LoginPhase, LoginResult, LoginState, LoginStateChange};
pub use tracking::UserTrackingInfo;
