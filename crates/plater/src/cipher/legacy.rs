//! legacy secret format
//!
//! Older variable files hold secrets produced by `openssl enc -aes-256-cbc -a -A -k <password>` (OpenSSL before
//! 1.1.0, MD5 digest):
//!
//! ```text
//! base64("Salted__" || salt (8 bytes) || AES-256-CBC(PKCS#7 padded plaintext))
//! ```
//!
//! Key and IV come from `EVP_BytesToKey` with MD5 and a single round. There is no authentication tag: a wrong
//! password is only noticed when the padding does not check out, and even that is not guaranteed. Only use this
//! to migrate values ([super::re_encrypt]).
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_HEADER: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Decrypt a legacy value, salted or not
pub fn decrypt(ciphertext: &str, password: &str) -> Result<String, LegacyError> {
    let bytes = STANDARD.decode(ciphertext.trim())?;

    let (salt, data) = match bytes.strip_prefix(SALT_HEADER) {
        Some(rest) if rest.len() >= SALT_LEN => {
            let (salt, data) = rest.split_at(SALT_LEN);
            (Some(salt), data)
        }
        Some(_) => return Err(LegacyError::TooShort(bytes.len())),
        None => (None, bytes.as_slice()),
    };

    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(LegacyError::TooShort(bytes.len()));
    }

    let material = bytes_to_key(password.as_bytes(), salt);
    let (key, iv) = material.split_at(KEY_LEN);

    let plaintext = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| LegacyError::BadDecrypt)?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| LegacyError::BadDecrypt)?;

    String::from_utf8(plaintext).map_err(|_| LegacyError::Utf8)
}

/// `EVP_BytesToKey` with MD5 and one round: `D_i = MD5(D_(i-1) || password || salt)`
fn bytes_to_key(password: &[u8], salt: Option<&[u8]>) -> Zeroizing<Vec<u8>> {
    let mut material = Zeroizing::new(Vec::with_capacity(KEY_LEN + IV_LEN + 16));
    let mut previous: Vec<u8> = vec![];

    while material.len() < KEY_LEN + IV_LEN {
        let mut input = Zeroizing::new(previous.clone());
        input.extend_from_slice(password);
        input.extend_from_slice(salt.unwrap_or_default());

        previous = md5::compute(&input[..]).0.to_vec();
        material.extend_from_slice(&previous);
    }

    material.truncate(KEY_LEN + IV_LEN);
    material
}

#[derive(thiserror::Error, Debug)]
pub enum LegacyError {
    #[error("invalid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("legacy value too short or not block aligned ({0} bytes)")]
    TooShort(usize),
    #[error("bad decrypt (wrong password or not a legacy value)")]
    BadDecrypt,
    #[error("decrypted legacy value is not valid utf-8")]
    Utf8,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decrypts_openssl_output() {
        // echo -n plaintext | openssl enc -aes-256-cbc -a -A -k secure -md md5
        let ciphertext = "U2FsdGVkX19JGpnp/eKAP1tK0hUr+8jHtPeiw7rKFng=";
        assert_eq!(decrypt(ciphertext, "secure").unwrap(), "plaintext");
    }

    #[test]
    fn keeps_trailing_newline() {
        // echo hunter2 | openssl enc -aes-256-cbc -a -A -k secure -md md5
        let ciphertext = "U2FsdGVkX18PZHru8bo1RiudK9t/LKgPqEwXyqug6HM=";
        assert_eq!(decrypt(ciphertext, "secure").unwrap(), "hunter2\n");
    }

    #[test]
    fn wrong_password() {
        let ciphertext = "U2FsdGVkX19JGpnp/eKAP1tK0hUr+8jHtPeiw7rKFng=";
        assert!(matches!(
            decrypt(ciphertext, "notsecure"),
            Err(LegacyError::BadDecrypt)
        ));
    }

    #[test]
    fn not_a_legacy_value() {
        assert!(matches!(
            decrypt("not base64!", "secure"),
            Err(LegacyError::Base64(_))
        ));
        assert!(matches!(
            decrypt("U2FsdGVkX18=", "secure"),
            Err(LegacyError::TooShort(_))
        ));
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let salt = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let one = bytes_to_key(b"secure", Some(&salt));
        let two = bytes_to_key(b"secure", Some(&salt));
        assert_eq!(one.len(), KEY_LEN + IV_LEN);
        assert_eq!(*one, *two);
        assert_ne!(*one, *bytes_to_key(b"secure", None));
    }
}
