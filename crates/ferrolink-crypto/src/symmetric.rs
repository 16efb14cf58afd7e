//! AES-CBC and HMAC primitives for the symmetric (session) security phase.
//!
//! The cipher runs without its own padding scheme: the chunk layer aligns
//! the region it encrypts to the cipher block size, so ciphertext length
//! always equals plaintext length. HMAC verification is constant-time.

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, Result};
use crate::policy::{SymmetricEncryption, SymmetricSignature};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

fn check_key(expected: usize, key: &[u8]) -> Result<()> {
    if key.len() != expected {
        return Err(CryptoError::InvalidKeyLength {
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}

fn check_alignment(data: &[u8]) -> Result<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BlockAlignment {
            length: data.len(),
            block_size: AES_BLOCK_SIZE,
        });
    }
    Ok(())
}

/// Compute a MAC over `data` with the given derived signing key.
///
/// # Errors
///
/// Returns an error for a wrong-length key or the `None` algorithm.
pub fn sign(algorithm: SymmetricSignature, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        SymmetricSignature::None => Err(CryptoError::UnsupportedByPolicy("symmetric sign")),
        SymmetricSignature::HmacSha1 => {
            let mut mac = <Hmac<Sha1>>::new_from_slice(key)
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 20,
                    actual: key.len(),
                })?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        SymmetricSignature::HmacSha256 => {
            let mut mac = <Hmac<Sha256>>::new_from_slice(key)
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: key.len(),
                })?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Verify a MAC over `data` in constant time.
///
/// # Errors
///
/// Returns [`CryptoError::SignatureVerification`] on mismatch.
pub fn verify(
    algorithm: SymmetricSignature,
    key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    let expected = sign(algorithm, key, data)?;
    if expected.ct_eq(signature).into() {
        Ok(())
    } else {
        Err(CryptoError::SignatureVerification)
    }
}

/// Encrypt block-aligned `plaintext` with AES-CBC.
///
/// # Errors
///
/// Returns an error for a wrong-length key or IV, misaligned input, or the
/// `None` algorithm.
pub fn encrypt(
    algorithm: SymmetricEncryption,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    check_alignment(plaintext)?;
    match algorithm {
        SymmetricEncryption::None => Err(CryptoError::UnsupportedByPolicy("symmetric encrypt")),
        SymmetricEncryption::Aes128Cbc => {
            check_key(16, key)?;
            let cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(plaintext))
        }
        SymmetricEncryption::Aes256Cbc => {
            check_key(32, key)?;
            let cipher = cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(plaintext))
        }
    }
}

/// Decrypt block-aligned `ciphertext` with AES-CBC.
///
/// # Errors
///
/// Returns an error for a wrong-length key or IV, misaligned input, or the
/// `None` algorithm.
pub fn decrypt(
    algorithm: SymmetricEncryption,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    check_alignment(ciphertext)?;
    match algorithm {
        SymmetricEncryption::None => Err(CryptoError::UnsupportedByPolicy("symmetric decrypt")),
        SymmetricEncryption::Aes128Cbc => {
            check_key(16, key)?;
            let cipher = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| CryptoError::Decryption)?;
            cipher
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| CryptoError::Decryption)
        }
        SymmetricEncryption::Aes256Cbc => {
            check_key(32, key)?;
            let cipher = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| CryptoError::Decryption)?;
            cipher
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| CryptoError::Decryption)
        }
    }
}
