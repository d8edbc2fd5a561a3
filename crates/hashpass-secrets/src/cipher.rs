//! Authenticated encryption of settings blobs.
//!
//! Current scheme: two PBKDF2-HMAC-SHA256 derivations over a fixed salt
//! (`work` and `2 × work` iterations) give an encryption key and a MAC key.
//! Blobs are `base64(IV ‖ AES-256-CBC(plaintext) ‖ HMAC-SHA256(IV ‖ ct))`.
//!
//! Retired schemes differ only in their parameters, so they are expressed as
//! [`Scheme`] values too (see [`crate::legacy`]).

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hashpass_types::{HashpassError, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Fixed salt shared by both key derivations.
pub const CIPHER_SALT: &str = "35af6ebe-3347-4d98-a527-b9a0e9ae37b9";

/// Length of the random IV prepended to every blob.
pub const IV_LEN: usize = 16;

const KEY_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

/// Hash function used by PBKDF2 or HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-1 (legacy only)
    Sha1,
    /// SHA-256
    Sha256,
}

impl HashAlg {
    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
        }
    }
}

/// Which bytes the MAC is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacInput {
    /// `IV ‖ ct` as raw bytes
    Raw,
    /// Lowercase hex text of `IV ‖ ct`
    Hex,
    /// Standard base64 text of `IV ‖ ct`
    Base64,
}

/// The parameters of one encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheme {
    /// PRF of the key derivation
    pub kdf: HashAlg,
    /// Iterations for the encryption key; the MAC key uses twice as many
    pub work: u32,
    /// HMAC hash; its output length is the MAC length
    pub mac: HashAlg,
    /// MAC input encoding
    pub mac_input: MacInput,
}

impl Scheme {
    /// The current scheme with the given work factor.
    pub fn current(work: u32) -> Self {
        Self {
            kdf: HashAlg::Sha256,
            work,
            mac: HashAlg::Sha256,
            mac_input: MacInput::Raw,
        }
    }

    fn mac_message(&self, message: &[u8]) -> Vec<u8> {
        match self.mac_input {
            MacInput::Raw => message.to_vec(),
            MacInput::Hex => hex::encode(message).into_bytes(),
            MacInput::Base64 => STANDARD.encode(message).into_bytes(),
        }
    }
}

struct Keys {
    enc: Zeroizing<[u8; KEY_LEN]>,
    mac: Zeroizing<[u8; KEY_LEN]>,
}

fn derive(alg: HashAlg, passphrase: &[u8], rounds: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    let salt = CIPHER_SALT.as_bytes();
    match alg {
        HashAlg::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(passphrase, salt, rounds, &mut out[..]),
        HashAlg::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, rounds, &mut out[..]),
    }
    out
}

fn hmac(alg: HashAlg, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let tag = match alg {
        HashAlg::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key)
                .map_err(|e| HashpassError::Bug(format!("HMAC key rejected: {}", e)))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlg::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|e| HashpassError::Bug(format!("HMAC key rejected: {}", e)))?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(tag)
}

/// A passphrase-keyed cipher for one scheme.
///
/// Keys are derived once at construction, the two derivations in parallel,
/// and wiped on drop.
///
/// ```
/// use hashpass_secrets::Cipher;
///
/// let cipher = Cipher::new("correct horse", 10).unwrap();
/// let blob = cipher.encrypt(b"{\"global\":{}}").unwrap();
/// assert_eq!(cipher.decrypt(&blob).unwrap(), b"{\"global\":{}}");
/// ```
pub struct Cipher {
    scheme: Scheme,
    keys: Keys,
}

impl Cipher {
    /// A cipher for the current scheme.
    pub fn new(passphrase: &str, work: u32) -> Result<Self> {
        Self::with_scheme(Scheme::current(work), passphrase.as_bytes())
    }

    /// A cipher for an arbitrary scheme.
    pub fn with_scheme(scheme: Scheme, passphrase: &[u8]) -> Result<Self> {
        if scheme.work == 0 {
            return Err(HashpassError::Config("Cipher work factor must be at least 1".to_string()));
        }
        let mac_rounds = scheme.work.checked_mul(2).ok_or_else(|| {
            HashpassError::Config(format!("Cipher work factor {} is too large", scheme.work))
        })?;

        let (enc, mac) = std::thread::scope(|s| {
            let mac = s.spawn(|| derive(scheme.kdf, passphrase, mac_rounds));
            let enc = derive(scheme.kdf, passphrase, scheme.work);
            (enc, mac.join())
        });
        let mac = mac.map_err(|_| HashpassError::Bug("Key derivation thread panicked".to_string()))?;

        Ok(Self {
            scheme,
            keys: Keys { enc, mac },
        })
    }

    /// The scheme this cipher speaks.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Encrypt and authenticate `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ct = Aes256CbcEnc::new_from_slices(&self.keys.enc[..], &iv)
            .map_err(|e| HashpassError::Bug(format!("Cipher init failed: {}", e)))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut blob = Vec::with_capacity(IV_LEN + ct.len() + self.scheme.mac.output_len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ct);
        let tag = hmac(self.scheme.mac, &self.keys.mac[..], &self.scheme.mac_message(&blob))?;
        blob.extend_from_slice(&tag);

        Ok(STANDARD.encode(blob))
    }

    /// Verify and decrypt a blob.
    ///
    /// # Errors
    ///
    /// Every failure, whether bad encoding, a short blob, a MAC mismatch, or
    /// bad padding, is the same `Decrypt("unreadable")`.
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|_| HashpassError::unreadable())?;

        let mac_len = self.scheme.mac.output_len();
        if raw.len() < IV_LEN + BLOCK_LEN + mac_len {
            return Err(HashpassError::unreadable());
        }
        let (message, tag) = raw.split_at(raw.len() - mac_len);

        let expected = hmac(self.scheme.mac, &self.keys.mac[..], &self.scheme.mac_message(message))?;
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(HashpassError::unreadable());
        }

        let (iv, ct) = message.split_at(IV_LEN);
        Aes256CbcDec::new_from_slices(&self.keys.enc[..], iv)
            .map_err(|_| HashpassError::unreadable())?
            .decrypt_padded_vec_mut::<Pkcs7>(ct)
            .map_err(|_| HashpassError::unreadable())
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WORK: u32 = 10;

    fn cipher() -> Cipher {
        Cipher::new("the settings passphrase", WORK).unwrap()
    }

    fn is_unreadable(result: Result<Vec<u8>>) -> bool {
        matches!(result, Err(HashpassError::Decrypt(ref msg)) if msg == "unreadable")
    }

    #[test]
    fn test_round_trip_and_layout() {
        let cipher = cipher();
        let blob = cipher.encrypt(b"hello").unwrap();
        let raw = STANDARD.decode(&blob).unwrap();

        // IV + one padded block + SHA-256 MAC
        assert_eq!(raw.len(), IV_LEN + 16 + 32);
        assert_eq!(cipher.decrypt(&blob).unwrap(), b"hello");
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_passphrase_is_unreadable() {
        let blob = cipher().encrypt(b"secret notes").unwrap();
        let other = Cipher::new("a different passphrase", WORK).unwrap();
        assert!(is_unreadable(other.decrypt(&blob)));
    }

    #[test]
    fn test_work_factor_changes_keys() {
        let blob = cipher().encrypt(b"x").unwrap();
        let other = Cipher::new("the settings passphrase", WORK + 1).unwrap();
        assert!(is_unreadable(other.decrypt(&blob)));
    }

    #[test]
    fn test_malformed_input_is_unreadable() {
        let cipher = cipher();
        assert!(is_unreadable(cipher.decrypt("not base64 !!")));
        assert!(is_unreadable(cipher.decrypt("")));
        assert!(is_unreadable(cipher.decrypt(&STANDARD.encode([0u8; 40]))));
    }

    #[test]
    fn test_zero_work_rejected() {
        assert!(matches!(Cipher::new("p", 0), Err(HashpassError::Config(_))));
    }

    #[test]
    fn test_hex_mac_scheme_round_trip() {
        let scheme = Scheme {
            kdf: HashAlg::Sha1,
            work: 5,
            mac: HashAlg::Sha1,
            mac_input: MacInput::Hex,
        };
        let cipher = Cipher::with_scheme(scheme, b"p").unwrap();
        let blob = cipher.encrypt(b"legacy").unwrap();
        assert_eq!(STANDARD.decode(&blob).unwrap().len(), IV_LEN + 16 + 20);
        assert_eq!(cipher.decrypt(&blob).unwrap(), b"legacy");

        let raw_mac = Cipher::with_scheme(Scheme { mac_input: MacInput::Raw, ..scheme }, b"p").unwrap();
        assert!(is_unreadable(raw_mac.decrypt(&blob)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let cipher = cipher();
            let blob = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_flipped_bit_is_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..64),
            position in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let cipher = cipher();
            let mut raw = STANDARD.decode(cipher.encrypt(&plaintext).unwrap()).unwrap();
            let i = position.index(raw.len());
            raw[i] ^= 1 << bit;
            prop_assert!(is_unreadable(cipher.decrypt(&STANDARD.encode(&raw))));
        }

        #[test]
        fn prop_truncation_is_detected(cut in 1usize..48) {
            let cipher = cipher();
            let raw = STANDARD.decode(cipher.encrypt(b"{\"global\":{}}").unwrap()).unwrap();
            let truncated = &raw[..raw.len() - cut];
            prop_assert!(is_unreadable(cipher.decrypt(&STANDARD.encode(truncated))));
        }
    }
}
