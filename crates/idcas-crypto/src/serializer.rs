//! Statically typed serializer registry.
//!
//! Payload types opt in by implementing [`Tagged`], which gives them a stable
//! type tag. The registry maps tags to an [`Encoding`]; hashing or storing a
//! payload whose tag is not registered is a configuration error, never a
//! silent fallback. Call [`SerializerRegistry::require`] at startup to surface
//! missing registrations before the first request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{HashError, HashResult};

/// A payload type with a stable registry tag.
///
/// The tag must never change once content has been stored, since it selects
/// the byte encoding that the content address is computed over.
pub trait Tagged: Serialize {
    const TAG: &'static str;
}

/// Byte encoding strategy for typed payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Compact JSON via `serde_json`.
    Json,
    /// Bincode 1 with its default (fixed-int, little-endian) configuration.
    Bincode,
}

impl Encoding {
    /// Serialize `value` with this encoding.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> HashResult<Vec<u8>> {
        match self {
            Self::Json => {
                serde_json::to_vec(value).map_err(|e| HashError::Serialization(e.to_string()))
            }
            Self::Bincode => {
                bincode::serialize(value).map_err(|e| HashError::Serialization(e.to_string()))
            }
        }
    }
}

/// Maps payload type tags to encodings.
#[derive(Clone, Debug, Default)]
pub struct SerializerRegistry {
    encodings: HashMap<&'static str, Encoding>,
}

impl SerializerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the encoding for `T`.
    ///
    /// Re-registering the same encoding is a no-op; a different encoding for
    /// an already registered tag is a configuration error.
    pub fn register<T: Tagged>(&mut self, encoding: Encoding) -> HashResult<()> {
        match self.encodings.get(T::TAG) {
            Some(existing) if *existing != encoding => Err(HashError::Configuration(format!(
                "type tag {:?} already registered with {existing:?}, refusing {encoding:?}",
                T::TAG
            ))),
            _ => {
                self.encodings.insert(T::TAG, encoding);
                Ok(())
            }
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Tagged>(mut self, encoding: Encoding) -> HashResult<Self> {
        self.register::<T>(encoding)?;
        Ok(self)
    }

    /// The encoding registered for `T`.
    pub fn encoding_for<T: Tagged>(&self) -> HashResult<Encoding> {
        self.encodings.get(T::TAG).copied().ok_or_else(|| {
            HashError::Configuration(format!("no serializer registered for type tag {:?}", T::TAG))
        })
    }

    /// Fail unless `T` is registered. Intended for startup validation.
    pub fn require<T: Tagged>(&self) -> HashResult<()> {
        self.encoding_for::<T>().map(|_| ())
    }

    /// Serialize `value` with the encoding registered for its type.
    pub fn serialize<T: Tagged>(&self, value: &T) -> HashResult<Vec<u8>> {
        self.encoding_for::<T>()?.encode(value)
    }

    /// Returns `true` if `tag` has a registered encoding.
    pub fn contains(&self, tag: &str) -> bool {
        self.encodings.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }
}
