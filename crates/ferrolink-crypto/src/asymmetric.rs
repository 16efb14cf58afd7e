//! RSA primitives for the asymmetric (handshake) security phase.
//!
//! Certificates here are the DER encoding of an RSA public key plus its
//! SHA-1 thumbprint; parsing and validity checking of full certificate
//! chains belongs to the handshake layer, which hands this crate
//! already-resolved material.
//!
//! Asymmetric encryption is block-wise: plaintext is processed in blocks of
//! `key_size - scheme_overhead` bytes, each producing a ciphertext block of
//! exactly `key_size` bytes. The chunk layer aligns its padded region to the
//! plaintext block size so every block is full.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::policy::{AsymmetricEncryption, AsymmetricSignature, SecurityPolicy};

/// Size of a certificate thumbprint in bytes (SHA-1).
pub const THUMBPRINT_SIZE: usize = 20;

/// SHA-1 digest of a certificate's DER bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Thumbprint([u8; THUMBPRINT_SIZE]);

impl Thumbprint {
    /// Compute the thumbprint of the given DER bytes.
    pub fn of(der: &[u8]) -> Self {
        let digest = Sha1::digest(der);
        let mut bytes = [0u8; THUMBPRINT_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Create a thumbprint from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != THUMBPRINT_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: THUMBPRINT_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; THUMBPRINT_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The thumbprint bytes.
    pub fn as_bytes(&self) -> &[u8; THUMBPRINT_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Thumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Thumbprint({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// An RSA public key with its DER encoding and thumbprint.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: RsaPublicKey,
    thumbprint: Thumbprint,
}

impl Certificate {
    /// Parse a certificate from DER bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidCertificate`] if the bytes are not a
    /// valid PKCS#1 RSA public key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let public_key = RsaPublicKey::from_pkcs1_der(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Ok(Self {
            der: der.to_vec(),
            public_key,
            thumbprint: Thumbprint::of(der),
        })
    }

    /// Build a certificate from an RSA public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be DER-encoded.
    pub fn from_public_key(public_key: RsaPublicKey) -> Result<Self> {
        let der = public_key
            .to_pkcs1_der()
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?
            .as_bytes()
            .to_vec();
        let thumbprint = Thumbprint::of(&der);
        Ok(Self {
            der,
            public_key,
            thumbprint,
        })
    }

    /// The DER bytes of the certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The certificate's thumbprint.
    pub fn thumbprint(&self) -> &Thumbprint {
        &self.thumbprint
    }

    /// RSA modulus length in bytes. Equals the ciphertext block size and the
    /// signature size for this key.
    pub fn key_size(&self) -> usize {
        self.public_key.size()
    }

    /// RSA modulus length in bits.
    pub fn key_bits(&self) -> usize {
        self.public_key.n().bits()
    }

    /// Plaintext block size for the given encryption scheme.
    pub fn plain_block_size(&self, encryption: AsymmetricEncryption) -> usize {
        self.key_size().saturating_sub(encryption.block_overhead())
    }

    /// Check this key's size against the policy's permitted range.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeySizeOutOfRange`] if the modulus is outside
    /// the policy's min/max bit length.
    pub fn validate_key_size(&self, policy: SecurityPolicy) -> Result<()> {
        if policy.is_none() {
            return Ok(());
        }
        let bits = self.key_bits();
        let (min, max) = (
            policy.min_asymmetric_key_bits(),
            policy.max_asymmetric_key_bits(),
        );
        if bits < min || bits > max {
            return Err(CryptoError::KeySizeOutOfRange { bits, min, max });
        }
        Ok(())
    }

    /// Verify `signature` over `data` with this certificate's public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerification`] on mismatch, or
    /// [`CryptoError::UnsupportedByPolicy`] for the `None` algorithm.
    pub fn verify(
        &self,
        algorithm: AsymmetricSignature,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let result = match algorithm {
            AsymmetricSignature::None => {
                return Err(CryptoError::UnsupportedByPolicy("asymmetric verify"))
            }
            AsymmetricSignature::RsaSha1 => self.public_key.verify(
                Pkcs1v15Sign::new::<Sha1>(),
                &Sha1::digest(data),
                signature,
            ),
            AsymmetricSignature::RsaSha256 => self.public_key.verify(
                Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(data),
                signature,
            ),
            AsymmetricSignature::RsaPssSha256 => {
                self.public_key
                    .verify(Pss::new::<Sha256>(), &Sha256::digest(data), signature)
            }
        };
        result.map_err(|_| CryptoError::SignatureVerification)
    }

    /// Encrypt `plaintext` block-wise with this certificate's public key.
    ///
    /// `plaintext.len()` must be a multiple of the scheme's plaintext block
    /// size; each block yields `key_size` ciphertext bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on misaligned input or if the underlying RSA
    /// operation fails.
    pub fn encrypt(&self, encryption: AsymmetricEncryption, plaintext: &[u8]) -> Result<Vec<u8>> {
        if encryption == AsymmetricEncryption::None {
            return Err(CryptoError::UnsupportedByPolicy("asymmetric encrypt"));
        }
        let plain_block = self.plain_block_size(encryption);
        if plain_block == 0 || plaintext.len() % plain_block != 0 {
            return Err(CryptoError::BlockAlignment {
                length: plaintext.len(),
                block_size: plain_block,
            });
        }

        let mut ciphertext = Vec::with_capacity((plaintext.len() / plain_block) * self.key_size());
        for block in plaintext.chunks(plain_block) {
            let encrypted = match encryption {
                AsymmetricEncryption::None => unreachable!(),
                AsymmetricEncryption::RsaPkcs15 => {
                    self.public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, block)
                }
                AsymmetricEncryption::RsaOaepSha1 => {
                    self.public_key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), block)
                }
                AsymmetricEncryption::RsaOaepSha256 => {
                    self.public_key
                        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), block)
                }
            }
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            ciphertext.extend_from_slice(&encrypted);
        }
        Ok(ciphertext)
    }
}

/// An RSA private key paired with its own certificate.
#[derive(Clone)]
pub struct AsymmetricKeyPair {
    private_key: RsaPrivateKey,
    certificate: Certificate,
}

impl AsymmetricKeyPair {
    /// Generate a fresh keypair with the given modulus size.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if RSA key generation fails.
    pub fn generate(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Wrap an existing RSA private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public half cannot be DER-encoded.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let certificate = Certificate::from_public_key(private_key.to_public_key())?;
        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// The certificate for the public half of this keypair.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// RSA modulus length in bytes.
    pub fn key_size(&self) -> usize {
        self.certificate.key_size()
    }

    /// Sign `data` with this keypair's private key.
    ///
    /// The signature length equals the key size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or the algorithm is `None`.
    pub fn sign(&self, algorithm: AsymmetricSignature, data: &[u8]) -> Result<Vec<u8>> {
        let result = match algorithm {
            AsymmetricSignature::None => {
                return Err(CryptoError::UnsupportedByPolicy("asymmetric sign"))
            }
            AsymmetricSignature::RsaSha1 => self
                .private_key
                .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(data)),
            AsymmetricSignature::RsaSha256 => self
                .private_key
                .sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(data)),
            AsymmetricSignature::RsaPssSha256 => self.private_key.sign_with_rng(
                &mut OsRng,
                Pss::new::<Sha256>(),
                &Sha256::digest(data),
            ),
        };
        result.map_err(|e| CryptoError::Signing(e.to_string()))
    }

    /// Decrypt block-wise ciphertext produced by [`Certificate::encrypt`].
    ///
    /// `ciphertext.len()` must be a multiple of the key size.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if any block fails to decrypt,
    /// or a block-alignment error on misaligned input.
    pub fn decrypt(
        &self,
        encryption: AsymmetricEncryption,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if encryption == AsymmetricEncryption::None {
            return Err(CryptoError::UnsupportedByPolicy("asymmetric decrypt"));
        }
        let cipher_block = self.key_size();
        if cipher_block == 0 || ciphertext.len() % cipher_block != 0 {
            return Err(CryptoError::BlockAlignment {
                length: ciphertext.len(),
                block_size: cipher_block,
            });
        }

        let plain_block = self.certificate.plain_block_size(encryption);
        let mut plaintext = Vec::with_capacity((ciphertext.len() / cipher_block) * plain_block);
        for block in ciphertext.chunks(cipher_block) {
            let decrypted = match encryption {
                AsymmetricEncryption::None => unreachable!(),
                AsymmetricEncryption::RsaPkcs15 => {
                    self.private_key.decrypt(Pkcs1v15Encrypt, block)
                }
                AsymmetricEncryption::RsaOaepSha1 => {
                    self.private_key.decrypt(Oaep::new::<Sha1>(), block)
                }
                AsymmetricEncryption::RsaOaepSha256 => {
                    self.private_key.decrypt(Oaep::new::<Sha256>(), block)
                }
            }
            .map_err(|_| CryptoError::Decryption)?;
            plaintext.extend_from_slice(&decrypted);
        }
        Ok(plaintext)
    }
}

impl std::fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("certificate", &self.certificate)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
