//! password based secret encryption
//!
//! Secrets are encrypted with AES-256-GCM. The key is derived from the password with PBKDF2-HMAC-SHA256 and a
//! random salt. The result is a single base64 token:
//!
//! ```text
//! MAGIC ("CRYPT", 5 bytes) || salt (16 bytes) || nonce (12 bytes) || ciphertext + tag
//! ```
//!
//! `MAGIC` lets [decrypt] tell "not one of our values" ([CipherError::NotEncrypted]) apart from "wrong password"
//! ([CipherError::Authentication]) without knowing the password. [encrypt_if_plaintext] relies on that to be
//! idempotent.
//!
//! All functions share the signature `fn(&str, &str) -> Result<String, CipherError>` and can be passed to
//! [crate::crypt::transform] directly.
pub mod legacy;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const MAGIC: &[u8; 5] = b"CRYPT";
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;
pub const ITERATIONS: u32 = 10_000;

/// Derive the AES key from a password and salt
pub fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ITERATIONS, &mut key[..]);
    key
}

/// Encrypt `plaintext` with a fresh salt and nonce
pub fn encrypt(plaintext: &str, password: &str) -> Result<String, CipherError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CipherError::Encryption)?;

    let mut envelope =
        Vec::with_capacity(MAGIC.len() + SALT_LEN + NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(MAGIC);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(envelope))
}

/// Decrypt a value produced by [encrypt]
pub fn decrypt(envelope: &str, password: &str) -> Result<String, CipherError> {
    let envelope = Envelope::parse(envelope)?;

    let key = derive_key(password, envelope.salt());
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(envelope.nonce()), envelope.ciphertext())
        .map_err(|_| CipherError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)
}

/// Encrypt `value` unless it already is encrypted with `password`
///
/// A value encrypted with another password is an error, it is never encrypted a second time.
pub fn encrypt_if_plaintext(value: &str, password: &str) -> Result<String, CipherError> {
    match decrypt(value, password) {
        Ok(_) => Ok(value.to_string()),
        Err(CipherError::NotEncrypted) => encrypt(value, password),
        Err(err) => Err(err),
    }
}

/// Decrypt a value of the legacy format ([legacy]) and encrypt it again with [encrypt]
///
/// Surrounding whitespace of the recovered plaintext is removed.
pub fn re_encrypt(legacy_envelope: &str, password: &str) -> Result<String, CipherError> {
    let plaintext = legacy::decrypt(legacy_envelope, password)?;
    encrypt(plaintext.trim(), password)
}

/// A decoded value that starts with [MAGIC] and is long enough to hold salt, nonce and tag
struct Envelope {
    bytes: Vec<u8>,
}

impl Envelope {
    fn parse(envelope: &str) -> Result<Self, CipherError> {
        let Ok(bytes) = STANDARD.decode(envelope.trim()) else {
            return Err(CipherError::NotEncrypted);
        };

        if !bytes.starts_with(MAGIC) {
            return Err(CipherError::NotEncrypted);
        }

        let minimum = MAGIC.len() + SALT_LEN + NONCE_LEN + TAG_LEN;
        if bytes.len() < minimum {
            return Err(CipherError::Malformed {
                length: bytes.len(),
                minimum,
            });
        }

        Ok(Self { bytes })
    }

    fn salt(&self) -> &[u8] {
        &self.bytes[MAGIC.len()..MAGIC.len() + SALT_LEN]
    }

    fn nonce(&self) -> &[u8] {
        let start = MAGIC.len() + SALT_LEN;
        &self.bytes[start..start + NONCE_LEN]
    }

    fn ciphertext(&self) -> &[u8] {
        &self.bytes[MAGIC.len() + SALT_LEN + NONCE_LEN..]
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CipherError {
    #[error("not an encrypted value")]
    NotEncrypted,
    #[error("malformed encrypted value: {length} bytes, expected at least {minimum}")]
    Malformed { length: usize, minimum: usize },
    #[error("message authentication failed (wrong password or corrupted value)")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
    #[error("decrypted value is not valid utf-8")]
    Utf8,
    #[error("unable to decrypt legacy value")]
    Legacy(#[from] legacy::LegacyError),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const PASSWORD: &str = "secure";

    #[test]
    fn round_trip() {
        for plaintext in ["plaintext", "", "ünïcödé\nmultiline\n", "  padded  "] {
            let ciphertext = encrypt(plaintext, PASSWORD).unwrap();
            assert_eq!(decrypt(&ciphertext, PASSWORD).unwrap(), plaintext);
        }
    }

    #[test]
    fn envelope_layout() {
        let ciphertext = encrypt("plaintext", PASSWORD).unwrap();
        let bytes = STANDARD.decode(&ciphertext).unwrap();
        assert_eq!(&bytes[..5], b"CRYPT");
        assert_eq!(
            bytes.len(),
            MAGIC.len() + SALT_LEN + NONCE_LEN + "plaintext".len() + TAG_LEN
        );
    }

    #[test]
    fn decrypts_a_known_value() {
        // salt 0..16, nonce 100..112
        let known = "Q1JZUFQAAQIDBAUGBwgJCgsMDQ4PZGVmZ2hpamtsbW5vvYSxRyJCt6w5PRfJO3sgNbQdGOVWFZYqJw==";
        assert_eq!(decrypt(known, PASSWORD).unwrap(), "plaintext");
    }

    #[test]
    fn salt_and_nonce_are_fresh() {
        let one = STANDARD.decode(encrypt("same", PASSWORD).unwrap()).unwrap();
        let two = STANDARD.decode(encrypt("same", PASSWORD).unwrap()).unwrap();
        assert_ne!(one[5..21], two[5..21]);
        assert_ne!(one[21..33], two[21..33]);
    }

    #[test]
    fn wrong_password() {
        let ciphertext = encrypt("plaintext", PASSWORD).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, "moresecure"),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn tampered_value() {
        let mut bytes = STANDARD.decode(encrypt("plaintext", PASSWORD).unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(matches!(
            decrypt(&STANDARD.encode(bytes), PASSWORD),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn plaintext_is_not_encrypted() {
        for plaintext in ["plaintext", "hello world", "", "YWJjZGVmZ2g="] {
            assert!(
                matches!(decrypt(plaintext, PASSWORD), Err(CipherError::NotEncrypted)),
                "{plaintext}"
            );
        }
    }

    #[test]
    fn truncated_value_is_malformed() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            decrypt(&STANDARD.encode(bytes), PASSWORD),
            Err(CipherError::Malformed {
                length: 25,
                minimum: 49
            })
        ));
    }

    #[test]
    fn encrypt_if_plaintext_is_idempotent() {
        let once = encrypt_if_plaintext("plaintext", PASSWORD).unwrap();
        let twice = encrypt_if_plaintext(&once, PASSWORD).unwrap();
        assert_eq!(once, twice);
        assert_eq!(decrypt(&twice, PASSWORD).unwrap(), "plaintext");
    }

    #[test]
    fn encrypt_if_plaintext_with_wrong_password() {
        let ciphertext = encrypt_if_plaintext("plaintext", PASSWORD).unwrap();
        assert!(matches!(
            encrypt_if_plaintext(&ciphertext, "moresecure"),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn encrypt_if_plaintext_with_garbage() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(b"132146584684516984565146654968475168465846854651356546584");
        let err = encrypt_if_plaintext(&STANDARD.encode(bytes), PASSWORD).unwrap_err();
        assert!(matches!(err, CipherError::Authentication));
    }

    #[test]
    fn re_encrypt_from_legacy() {
        let legacy = "U2FsdGVkX18PZHru8bo1RiudK9t/LKgPqEwXyqug6HM=";
        let ciphertext = re_encrypt(legacy, PASSWORD).unwrap();
        assert_eq!(decrypt(&ciphertext, PASSWORD).unwrap(), "hunter2");

        // the output is not a legacy value anymore
        assert!(matches!(
            re_encrypt(&ciphertext, PASSWORD),
            Err(CipherError::Legacy(_))
        ));
    }

    #[test]
    fn functions_are_interchangeable() {
        let functions: [&dyn crate::crypt::Crypt; 4] =
            [&encrypt, &decrypt, &encrypt_if_plaintext, &re_encrypt];
        assert_eq!(functions.len(), 4);
    }
}
