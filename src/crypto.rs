//! Passphrase sealing for the on-disk store document.
//!
//! Layout: `MAGIC || salt (32) || nonce (12) || ciphertext`. The whole header is
//! bound as associated data, so a tampered header fails authentication just
//! like a wrong passphrase does.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

const MAGIC: &[u8] = b"CYCLESENSE\x01";
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

// Argon2id cost: 64 MiB, 3 passes, single lane.
const KDF_MEMORY_KIB: u32 = 65536;
const KDF_PASSES: u32 = 3;
const KDF_LANES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("wrong passphrase or corrupted data")]
    Decryption,
    #[error("not a cyclesense document")]
    InvalidFormat,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_PASSES, KDF_LANES, Some(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

fn cipher_for(passphrase: &str, salt: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    let key = derive_key(passphrase, salt)?;
    Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::KeyDerivation)
}

/// Encrypt `plaintext` under a key derived from `passphrase` with a fresh salt and nonce.
pub fn seal(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.resize(HEADER_LEN, 0);
    rand::thread_rng().fill_bytes(&mut header[MAGIC.len()..]);

    let salt = &header[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce = Nonce::from_slice(&header[MAGIC.len() + SALT_LEN..]);

    let ciphertext = cipher_for(passphrase, salt)?
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = header;
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Reverse of [`seal`]. The returned buffer is wiped when dropped.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < HEADER_LEN || !sealed.starts_with(MAGIC) {
        return Err(CryptoError::InvalidFormat);
    }
    let (header, ciphertext) = sealed.split_at(HEADER_LEN);
    let salt = &header[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce = Nonce::from_slice(&header[MAGIC.len() + SALT_LEN..]);

    cipher_for(passphrase, salt)?
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption)
}
