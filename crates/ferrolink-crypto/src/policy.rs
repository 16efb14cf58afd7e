//! Security policies and the policy registry.
//!
//! A [`SecurityPolicy`] names a complete crypto suite: the asymmetric
//! algorithms used during the handshake phase, the symmetric algorithms used
//! during the session phase, and the sizes that drive chunk layout (signature
//! length, cipher block size, derived key lengths). The `None` policy is the
//! identity transform: zero-length signatures, no padding, no encryption.
//!
//! Policies are a closed set; the registry is a plain value constructed at
//! startup and passed by reference, never a process-global.

use crate::error::{CryptoError, Result};

/// Digest used by asymmetric signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricSignature {
    /// No signature (policy `None`).
    None,
    /// RSA PKCS#1 v1.5 over SHA-1.
    RsaSha1,
    /// RSA PKCS#1 v1.5 over SHA-256.
    RsaSha256,
    /// RSA-PSS over SHA-256.
    RsaPssSha256,
}

/// Asymmetric encryption scheme for the handshake phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricEncryption {
    /// No encryption (policy `None`).
    None,
    /// RSA PKCS#1 v1.5.
    RsaPkcs15,
    /// RSA-OAEP with SHA-1.
    RsaOaepSha1,
    /// RSA-OAEP with SHA-256.
    RsaOaepSha256,
}

impl AsymmetricEncryption {
    /// Per-block overhead of the scheme in bytes: the difference between the
    /// ciphertext block (the RSA modulus length) and the plaintext block.
    pub fn block_overhead(self) -> usize {
        match self {
            AsymmetricEncryption::None => 0,
            AsymmetricEncryption::RsaPkcs15 => 11,
            AsymmetricEncryption::RsaOaepSha1 => 42,
            AsymmetricEncryption::RsaOaepSha256 => 66,
        }
    }
}

/// Symmetric signature (MAC) algorithm for the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricSignature {
    /// No MAC (policy `None`).
    None,
    /// HMAC-SHA1.
    HmacSha1,
    /// HMAC-SHA256.
    HmacSha256,
}

/// Symmetric encryption algorithm for the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricEncryption {
    /// No encryption (policy `None`).
    None,
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
}

/// Digest driving the key-derivation PRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationDigest {
    /// P_SHA1.
    Sha1,
    /// P_SHA256.
    Sha256,
}

/// A negotiable security policy: a named, immutable crypto suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// Identity transform: no signing, no encryption, zero-length fields.
    None,
    /// RSA-1.5 key transport, AES-128-CBC, HMAC-SHA1.
    Basic128Rsa15,
    /// RSA-OAEP key transport, AES-256-CBC, HMAC-SHA1.
    Basic256,
    /// RSA-OAEP key transport, AES-256-CBC, HMAC-SHA256.
    Basic256Sha256,
    /// RSA-OAEP key transport, AES-128-CBC, HMAC-SHA256.
    Aes128Sha256RsaOaep,
    /// RSA-OAEP-SHA256 key transport with PSS signatures, AES-256-CBC,
    /// HMAC-SHA256.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// All known policies, in preference order (weakest to strongest).
    pub const ALL: [SecurityPolicy; 6] = [
        SecurityPolicy::None,
        SecurityPolicy::Basic128Rsa15,
        SecurityPolicy::Basic256,
        SecurityPolicy::Basic256Sha256,
        SecurityPolicy::Aes128Sha256RsaOaep,
        SecurityPolicy::Aes256Sha256RsaPss,
    ];

    /// The policy's URI identifier as carried in asymmetric security headers.
    pub fn uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => "https://ferrolink.rs/securitypolicy#None",
            SecurityPolicy::Basic128Rsa15 => "https://ferrolink.rs/securitypolicy#Basic128Rsa15",
            SecurityPolicy::Basic256 => "https://ferrolink.rs/securitypolicy#Basic256",
            SecurityPolicy::Basic256Sha256 => "https://ferrolink.rs/securitypolicy#Basic256Sha256",
            SecurityPolicy::Aes128Sha256RsaOaep => {
                "https://ferrolink.rs/securitypolicy#Aes128_Sha256_RsaOaep"
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                "https://ferrolink.rs/securitypolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Whether this is the identity (`None`) policy.
    pub fn is_none(self) -> bool {
        self == SecurityPolicy::None
    }

    /// Asymmetric signature algorithm for the handshake phase.
    pub fn asymmetric_signature(self) -> AsymmetricSignature {
        match self {
            SecurityPolicy::None => AsymmetricSignature::None,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                AsymmetricSignature::RsaSha1
            }
            SecurityPolicy::Basic256Sha256 | SecurityPolicy::Aes128Sha256RsaOaep => {
                AsymmetricSignature::RsaSha256
            }
            SecurityPolicy::Aes256Sha256RsaPss => AsymmetricSignature::RsaPssSha256,
        }
    }

    /// Asymmetric encryption scheme for the handshake phase.
    pub fn asymmetric_encryption(self) -> AsymmetricEncryption {
        match self {
            SecurityPolicy::None => AsymmetricEncryption::None,
            SecurityPolicy::Basic128Rsa15 => AsymmetricEncryption::RsaPkcs15,
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep => AsymmetricEncryption::RsaOaepSha1,
            SecurityPolicy::Aes256Sha256RsaPss => AsymmetricEncryption::RsaOaepSha256,
        }
    }

    /// Symmetric signature algorithm for the session phase.
    pub fn symmetric_signature(self) -> SymmetricSignature {
        match self {
            SecurityPolicy::None => SymmetricSignature::None,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => {
                SymmetricSignature::HmacSha1
            }
            _ => SymmetricSignature::HmacSha256,
        }
    }

    /// Length of symmetric signatures in bytes.
    pub fn symmetric_signature_size(self) -> usize {
        match self.symmetric_signature() {
            SymmetricSignature::None => 0,
            SymmetricSignature::HmacSha1 => 20,
            SymmetricSignature::HmacSha256 => 32,
        }
    }

    /// Symmetric encryption algorithm for the session phase.
    pub fn symmetric_encryption(self) -> SymmetricEncryption {
        match self {
            SecurityPolicy::None => SymmetricEncryption::None,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => {
                SymmetricEncryption::Aes128Cbc
            }
            _ => SymmetricEncryption::Aes256Cbc,
        }
    }

    /// Length of the derived signing key in bytes.
    pub fn signing_key_size(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic128Rsa15 => 16,
            SecurityPolicy::Basic256 => 24,
            _ => 32,
        }
    }

    /// Length of the derived encryption key in bytes.
    pub fn encryption_key_size(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => 16,
            _ => 32,
        }
    }

    /// Block size of the symmetric cipher in bytes.
    ///
    /// `None` reports 1 so size arithmetic degenerates correctly.
    pub fn encryption_block_size(self) -> usize {
        match self {
            SecurityPolicy::None => 1,
            _ => 16,
        }
    }

    /// Digest used by the key-derivation PRF.
    pub fn key_derivation_digest(self) -> KeyDerivationDigest {
        match self {
            SecurityPolicy::None
            | SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256 => KeyDerivationDigest::Sha1,
            _ => KeyDerivationDigest::Sha256,
        }
    }

    /// Minimum permitted asymmetric key size in bits.
    pub fn min_asymmetric_key_bits(self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => 1024,
            _ => 2048,
        }
    }

    /// Maximum permitted asymmetric key size in bits.
    pub fn max_asymmetric_key_bits(self) -> usize {
        match self {
            SecurityPolicy::None => usize::MAX,
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Basic256 => 2048,
            _ => 4096,
        }
    }

    /// Whether a ciphertext block of `cipher_block_size` bytes requires the
    /// extra (high-order) padding-size byte.
    ///
    /// With keys above 2048 bits the padding count can exceed 255, so a
    /// single padding-size byte is ambiguous. The threshold is a property of
    /// the suite: `None` never pads at all.
    pub fn uses_extra_padding_byte(self, cipher_block_size: usize) -> bool {
        !self.is_none() && cipher_block_size > 256
    }
}

impl std::fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SecurityPolicy::None => "None",
            SecurityPolicy::Basic128Rsa15 => "Basic128Rsa15",
            SecurityPolicy::Basic256 => "Basic256",
            SecurityPolicy::Basic256Sha256 => "Basic256Sha256",
            SecurityPolicy::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            SecurityPolicy::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        };
        f.write_str(name)
    }
}

/// Lookup from policy URI to [`SecurityPolicy`].
///
/// Built once at startup and passed by reference into the encoder, decoder,
/// and channel construction. Immutable after construction.
#[derive(Debug, Clone)]
pub struct SecurityPolicyRegistry {
    policies: Vec<SecurityPolicy>,
}

impl SecurityPolicyRegistry {
    /// Create a registry containing the given policies.
    pub fn new(policies: &[SecurityPolicy]) -> Self {
        Self {
            policies: policies.to_vec(),
        }
    }

    /// Look up a policy by its URI identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownPolicy`] if no registered policy carries
    /// the given URI.
    pub fn lookup(&self, uri: &str) -> Result<SecurityPolicy> {
        self.policies
            .iter()
            .copied()
            .find(|policy| policy.uri() == uri)
            .ok_or_else(|| CryptoError::UnknownPolicy(uri.to_string()))
    }

    /// All registered policies, in registration order.
    pub fn policies(&self) -> &[SecurityPolicy] {
        &self.policies
    }
}

impl Default for SecurityPolicyRegistry {
    fn default() -> Self {
        Self::new(&SecurityPolicy::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_policy_degenerates() {
        let policy = SecurityPolicy::None;
        assert_eq!(policy.symmetric_signature_size(), 0);
        assert_eq!(policy.signing_key_size(), 0);
        assert_eq!(policy.encryption_key_size(), 0);
        assert_eq!(policy.encryption_block_size(), 1);
        assert_eq!(policy.asymmetric_signature(), AsymmetricSignature::None);
        assert_eq!(policy.asymmetric_encryption(), AsymmetricEncryption::None);
        assert!(!policy.uses_extra_padding_byte(512));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SecurityPolicyRegistry::default();

        for policy in SecurityPolicy::ALL {
            assert_eq!(registry.lookup(policy.uri()).unwrap(), policy);
        }
    }

    #[test]
    fn test_registry_unknown_uri() {
        let registry = SecurityPolicyRegistry::default();
        let result = registry.lookup("https://ferrolink.rs/securitypolicy#Nope");
        assert!(matches!(result, Err(CryptoError::UnknownPolicy(_))));
    }

    #[test]
    fn test_registry_restricted_set() {
        let registry = SecurityPolicyRegistry::new(&[SecurityPolicy::Basic256Sha256]);
        assert!(registry.lookup(SecurityPolicy::Basic256Sha256.uri()).is_ok());
        assert!(registry.lookup(SecurityPolicy::None.uri()).is_err());
    }

    #[test]
    fn test_extra_padding_byte_threshold() {
        let policy = SecurityPolicy::Basic256Sha256;
        // 2048-bit key: 256-byte blocks, single padding byte suffices.
        assert!(!policy.uses_extra_padding_byte(256));
        // 4096-bit key: 512-byte blocks need the high-order byte.
        assert!(policy.uses_extra_padding_byte(512));
    }

    #[test]
    fn test_suite_sizes_consistent() {
        // Derived encryption key length must match the symmetric cipher.
        for policy in SecurityPolicy::ALL {
            let expected = match policy.symmetric_encryption() {
                SymmetricEncryption::None => 0,
                SymmetricEncryption::Aes128Cbc => 16,
                SymmetricEncryption::Aes256Cbc => 32,
            };
            assert_eq!(policy.encryption_key_size(), expected, "{policy}");
        }
    }

    #[test]
    fn test_block_overhead() {
        assert_eq!(AsymmetricEncryption::RsaPkcs15.block_overhead(), 11);
        assert_eq!(AsymmetricEncryption::RsaOaepSha1.block_overhead(), 42);
        assert_eq!(AsymmetricEncryption::RsaOaepSha256.block_overhead(), 66);
    }
}
