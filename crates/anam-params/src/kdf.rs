//! Password KDF policy
//!
//! The app password verifier is derived with scrypt. The parameter triple is
//! persisted next to every verifier, so changing [`KdfParams::DEFAULT`] only
//! affects passwords set afterwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Length of every derived verifier in bytes
pub const DERIVED_KEY_LEN: usize = 32;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Work exponent, `N = 2^cost`
    pub cost: u8,
    /// Block size `r`
    pub block_size: u32,
    /// Parallelism `p`
    pub parallelism: u32,
}

impl KdfParams {
    /// Deployed default: N = 8192, r = 8, p = 1
    pub const DEFAULT: Self = Self {
        cost: 13,
        block_size: 8,
        parallelism: 1,
    };

    /// Upper bound on the work exponent (N = 2^20, 1 GiB at r = 8)
    pub const MAX_COST: u8 = 20;

    /// Upper bound on the memory of one derivation
    pub const MAX_MEMORY_BYTES: u64 = 1 << 30;

    /// Create a parameter set, validating it first
    pub fn new(cost: u8, block_size: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            cost,
            block_size,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Iteration count `N`
    pub fn n(&self) -> u64 {
        1u64.checked_shl(u32::from(self.cost)).unwrap_or(u64::MAX)
    }

    /// Approximate memory needed for one derivation in bytes
    pub fn memory_bytes(&self) -> u64 {
        (128 * u64::from(self.block_size)).saturating_mul(self.n())
    }

    /// Reject triples scrypt cannot run or that would exhaust memory
    pub fn validate(&self) -> Result<()> {
        if self.cost == 0 || self.cost > Self::MAX_COST {
            return Err(Error::InvalidKdfParams(format!(
                "cost must be in 1..={}, got {}",
                Self::MAX_COST,
                self.cost
            )));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidKdfParams("block size must be positive".to_string()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidKdfParams("parallelism must be positive".to_string()));
        }
        if (self.block_size as u64) * (self.parallelism as u64) >= 1 << 30 {
            return Err(Error::InvalidKdfParams(
                "block size * parallelism must be below 2^30".to_string(),
            ));
        }
        if self.memory_bytes() > Self::MAX_MEMORY_BYTES {
            return Err(Error::InvalidKdfParams(format!(
                "derivation needs {} bytes, limit is {}",
                self.memory_bytes(),
                Self::MAX_MEMORY_BYTES
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}
