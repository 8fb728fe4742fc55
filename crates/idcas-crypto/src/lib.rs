//! Cryptographic primitives for IDCAS.
//!
//! Provides interchangeable hash algorithms (BLAKE3, SHA-256, and aliasing
//! placeholders), a statically typed serializer registry, the [`HashService`]
//! that turns payloads into [`ContentAddress`]es, and Ed25519 signing used to
//! authenticate logins.
//!
//! Hashing and signing delegate to the `blake3`, `sha2` and `ed25519-dalek` crates.
//!
//! [`ContentAddress`]: idcas_types::ContentAddress

pub mod algorithm;
pub mod digest;
pub mod error;
pub mod serializer;
pub mod service;
pub mod signer;

pub use algorithm::{AliasAlgorithm, AlgorithmId, Blake3, HashAlgorithm, Sha256};
pub use digest::Digest;
pub use error::{HashError, HashResult, SignatureError};
pub use serializer::{Encoding, SerializerRegistry, Tagged};
pub use service::HashService;
pub use signer::{Signature, SigningKey, VerifyingKey};
