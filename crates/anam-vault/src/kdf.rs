//! Password verifier derivation
//!
//! scrypt turns the app password and a per-record salt into a 32-byte
//! verifier. Comparison goes through `subtle` so the running time does not
//! depend on where two verifiers first differ.

use crate::{Error, Result};
use anam_params::{KdfParams, DERIVED_KEY_LEN};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Minimum accepted salt length
pub const MIN_SALT_LEN: usize = 16;

/// Derive a verifier from `password` and `salt`
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>> {
    if salt.len() < MIN_SALT_LEN {
        return Err(Error::Kdf("Salt too short".to_string()));
    }
    params.validate()?;

    let scrypt_params = scrypt::Params::new(
        params.cost,
        params.block_size,
        params.parallelism,
        DERIVED_KEY_LEN,
    )
    .map_err(|e| Error::Kdf(e.to_string()))?;

    let mut out = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    scrypt::scrypt(password, salt, &scrypt_params, out.as_mut_slice())
        .map_err(|e| Error::Kdf(e.to_string()))?;
    Ok(out)
}

/// Constant-time equality; slices of different length are unequal
pub fn compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
