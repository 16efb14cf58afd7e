//! Derivation of session key material from handshake nonces.
//!
//! Expansion uses the P_SHA pseudo-random function: an HMAC chain over the
//! secret/seed pair, truncated to the suite's signing-key, encryption-key,
//! and IV lengths. Each direction of a channel derives its own key set by
//! swapping the secret and seed roles of the two nonces.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::policy::{KeyDerivationDigest, SecurityPolicy};

/// One direction's derived key material: signing key, encryption key, and
/// initialization vector, in suite-specific lengths.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    signing_key: Vec<u8>,
    encryption_key: Vec<u8>,
    initialization_vector: Vec<u8>,
}

impl DerivedKeys {
    /// The derived signing (MAC) key.
    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    /// The derived encryption key.
    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    /// The derived initialization vector.
    pub fn initialization_vector(&self) -> &[u8] {
        &self.initialization_vector
    }

    /// Empty key set for the `None` policy.
    pub fn empty() -> Self {
        Self {
            signing_key: Vec::new(),
            encryption_key: Vec::new(),
            initialization_vector: Vec::new(),
        }
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DerivedKeys([REDACTED])")
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <Hmac<Sha1>>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <Hmac<Sha256>>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn p_hash(
    hmac: impl Fn(&[u8], &[u8]) -> Vec<u8>,
    secret: &[u8],
    seed: &[u8],
    length: usize,
) -> Vec<u8> {
    let mut output = Vec::with_capacity(length);
    // A(1) = HMAC(secret, seed); A(i) = HMAC(secret, A(i-1))
    let mut a = hmac(secret, seed);
    while output.len() < length {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        output.extend_from_slice(&hmac(secret, &input));
        a = hmac(secret, &a);
    }
    output.truncate(length);
    output
}

/// P_SHA pseudo-random function: expand `secret`/`seed` to `length` bytes.
pub fn prf(digest: KeyDerivationDigest, secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    match digest {
        KeyDerivationDigest::Sha1 => p_hash(hmac_sha1, secret, seed, length),
        KeyDerivationDigest::Sha256 => p_hash(hmac_sha256, secret, seed, length),
    }
}

/// Derive one direction's key set for `policy` from a secret/seed nonce pair.
///
/// The expansion is laid out as signing key, then encryption key, then IV.
/// For the `None` policy all members are empty.
///
/// # Errors
///
/// Currently infallible for all known policies; the `Result` keeps the
/// signature stable if a policy with fallible derivation is added.
pub fn derive_keys(policy: SecurityPolicy, secret: &[u8], seed: &[u8]) -> Result<DerivedKeys> {
    if policy.is_none() {
        return Ok(DerivedKeys::empty());
    }

    let signing_len = policy.signing_key_size();
    let encryption_len = policy.encryption_key_size();
    let iv_len = policy.encryption_block_size();
    let total = signing_len + encryption_len + iv_len;

    let mut expanded = prf(policy.key_derivation_digest(), secret, seed, total);

    let keys = DerivedKeys {
        signing_key: expanded[..signing_len].to_vec(),
        encryption_key: expanded[signing_len..signing_len + encryption_len].to_vec(),
        initialization_vector: expanded[signing_len + encryption_len..].to_vec(),
    };
    expanded.zeroize();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_deterministic() {
        let a = prf(KeyDerivationDigest::Sha256, b"secret", b"seed", 64);
        let b = prf(KeyDerivationDigest::Sha256, b"secret", b"seed", 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_prf_differs_by_inputs() {
        let base = prf(KeyDerivationDigest::Sha256, b"secret", b"seed", 32);
        assert_ne!(base, prf(KeyDerivationDigest::Sha256, b"other", b"seed", 32));
        assert_ne!(base, prf(KeyDerivationDigest::Sha256, b"secret", b"raw", 32));
        assert_ne!(base, prf(KeyDerivationDigest::Sha1, b"secret", b"seed", 32));
    }

    #[test]
    fn test_prf_prefix_property() {
        // Shorter expansions are prefixes of longer ones.
        let long = prf(KeyDerivationDigest::Sha1, b"secret", b"seed", 100);
        let short = prf(KeyDerivationDigest::Sha1, b"secret", b"seed", 40);
        assert_eq!(&long[..40], short.as_slice());
    }

    #[test]
    fn test_derive_keys_lengths() {
        for policy in SecurityPolicy::ALL {
            let keys = derive_keys(policy, b"client nonce", b"server nonce").unwrap();
            assert_eq!(keys.signing_key().len(), policy.signing_key_size(), "{policy}");
            assert_eq!(
                keys.encryption_key().len(),
                policy.encryption_key_size(),
                "{policy}"
            );
            if policy.is_none() {
                assert!(keys.initialization_vector().is_empty());
            } else {
                assert_eq!(
                    keys.initialization_vector().len(),
                    policy.encryption_block_size(),
                    "{policy}"
                );
            }
        }
    }

    #[test]
    fn test_directional_keys_differ() {
        let policy = SecurityPolicy::Basic256Sha256;
        let client = derive_keys(policy, b"server nonce", b"client nonce").unwrap();
        let server = derive_keys(policy, b"client nonce", b"server nonce").unwrap();
        assert_ne!(client.signing_key(), server.signing_key());
        assert_ne!(client.encryption_key(), server.encryption_key());
    }

    #[test]
    fn test_debug_redacted() {
        let keys = derive_keys(SecurityPolicy::Basic256, b"a", b"b").unwrap();
        assert_eq!(format!("{keys:?}"), "DerivedKeys([REDACTED])");
    }
}
