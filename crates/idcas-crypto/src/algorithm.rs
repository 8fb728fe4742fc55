use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{HashError, HashResult};

/// A named, stateless digest primitive.
///
/// Implementations must be pure: the same input always yields the same
/// output of exactly `output_len()` bytes. Several algorithms may coexist in a
/// process, but addresses do not name their algorithm, so one store must only
/// ever use one.
pub trait HashAlgorithm: Send + Sync {
    /// Algorithm identifier (e.g. `"blake3"`).
    fn name(&self) -> &str;

    /// Digest length in bytes.
    fn output_len(&self) -> usize;

    /// Raw primitive output for `data`.
    fn compute(&self, data: &[u8]) -> Vec<u8>;

    /// Digest `data`, checking the output length.
    fn digest(&self, data: &[u8]) -> HashResult<Digest> {
        let out = self.compute(data);
        if out.len() != self.output_len() {
            return Err(HashError::DigestLength {
                algorithm: self.name().to_string(),
                expected: self.output_len(),
                actual: out.len(),
            });
        }
        Ok(Digest::new(out))
    }
}

/// BLAKE3, 32-byte output. The default algorithm.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3;

impl HashAlgorithm for Blake3 {
    fn name(&self) -> &str {
        "blake3"
    }

    fn output_len(&self) -> usize {
        32
    }

    fn compute(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }
}

/// SHA-256, 32-byte output.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256;

impl HashAlgorithm for Sha256 {
    fn name(&self) -> &str {
        "sha256"
    }

    fn output_len(&self) -> usize {
        32
    }

    fn compute(&self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest as _;
        sha2::Sha256::digest(data).to_vec()
    }
}

/// Placeholder algorithm that reports its own name but delegates to another.
///
/// Lets configuration name an algorithm that is not wired up yet.
#[derive(Clone)]
pub struct AliasAlgorithm {
    name: String,
    target: Arc<dyn HashAlgorithm>,
}

impl AliasAlgorithm {
    pub fn new(name: impl Into<String>, target: Arc<dyn HashAlgorithm>) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    /// Name of the algorithm actually computing digests.
    pub fn target_name(&self) -> &str {
        self.target.name()
    }
}

impl HashAlgorithm for AliasAlgorithm {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_len(&self) -> usize {
        self.target.output_len()
    }

    fn compute(&self, data: &[u8]) -> Vec<u8> {
        self.target.compute(data)
    }
}

impl fmt::Debug for AliasAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasAlgorithm")
            .field("name", &self.name)
            .field("target", &self.target.name())
            .finish()
    }
}

/// Configuration handle naming a built-in algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmId {
    #[default]
    #[serde(rename = "blake3")]
    Blake3,
    #[serde(rename = "sha256")]
    Sha256,
    /// Reserved name, currently computed with BLAKE3.
    #[serde(rename = "sha3-256")]
    Sha3Placeholder,
}

impl AlgorithmId {
    /// The name the built algorithm reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Sha3Placeholder => "sha3-256",
        }
    }

    /// Instantiate the algorithm.
    pub fn build(&self) -> Arc<dyn HashAlgorithm> {
        match self {
            Self::Blake3 => Arc::new(Blake3),
            Self::Sha256 => Arc::new(Sha256),
            Self::Sha3Placeholder => Arc::new(AliasAlgorithm::new(self.name(), Arc::new(Blake3))),
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            "sha3-256" => Ok(Self::Sha3Placeholder),
            other => Err(HashError::Configuration(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}
