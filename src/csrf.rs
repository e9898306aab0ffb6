//! Anti-forgery state for the OAuth redirect flow.
//!
//! The state is generated at authorize time, stored in a short-lived cookie and
//! echoed back by the provider. Nothing is kept server side; the caller clears
//! the cookie after one comparison.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

const STATE_BYTES: usize = 32;

/// Generate a URL-safe random state value.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate() -> Result<String> {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate oauth state")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Compare the cookie copy with the echoed copy in constant time.
#[must_use]
pub fn is_valid(expected: Option<&str>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (Some(expected), Some(actual))
            if !expected.trim().is_empty() && !actual.trim().is_empty() =>
        {
            expected.as_bytes().ct_eq(actual.as_bytes()).into()
        }
        _ => false,
    }
}
