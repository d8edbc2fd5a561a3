//! Deterministic hash-to-alphabet password generation.
//!
//! The output for a given master secret, service name, and policy must never
//! change. Everything in this module is bit-exact: the canonical character
//! order, the domain constant, and the selector consumption rule.

use hashpass_types::{CharClass, HashpassError, Result, ServiceName, CANONICAL_CHARS};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::master::MasterSecret;
use crate::policy::GenerationPolicy;

/// Domain separator hashed between the master secret and the service name.
pub const DOMAIN_CONSTANT: &str = "e87eb0f4-34cb-46b9-93ad-766c5ab063e7";

const STREAM_BITS: usize = 256;

/// The ordered characters a secret is drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    /// The canonical union minus every excluded class, order preserved.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if nothing is left.
    pub fn new(excluded: &BTreeSet<CharClass>) -> Result<Self> {
        let chars: Vec<char> = CANONICAL_CHARS
            .chars()
            .filter(|c| !excluded.iter().any(|class| class.contains(*c)))
            .collect();

        if chars.is_empty() {
            let names: Vec<&str> = excluded.iter().map(CharClass::as_str).collect();
            return Err(HashpassError::Config(format!(
                "Excluding {} leaves no characters to generate from",
                names.join(", ")
            )));
        }
        Ok(Self { chars })
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false; construction rejects empty alphabets.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The characters in generation order.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Bits needed to address every character: `ceil(log2(len))`.
    pub fn selector_width(&self) -> usize {
        let n = self.chars.len();
        if n <= 1 {
            0
        } else {
            (usize::BITS - (n - 1).leading_zeros()) as usize
        }
    }
}

/// The 256 bits of SHA-256(master ‖ domain ‖ service), read MSB first.
///
/// Each stream is consumed once, front to back.
pub struct EntropyStream {
    digest: [u8; 32],
    cursor: usize,
}

impl EntropyStream {
    /// Hash the inputs into a fresh stream.
    pub fn new(master: &[u8], service: &ServiceName) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(master);
        hasher.update(DOMAIN_CONSTANT.as_bytes());
        hasher.update(service.as_bytes());
        Self {
            digest: hasher.finalize().into(),
            cursor: 0,
        }
    }

    /// Bits not yet consumed.
    pub fn remaining(&self) -> usize {
        STREAM_BITS - self.cursor
    }

    fn bit(&self, index: usize) -> u64 {
        u64::from((self.digest[index / 8] >> (7 - index % 8)) & 1)
    }

    /// Draw the next index below `n` using a `width`-bit selector.
    ///
    /// A chunk whose leading bit is set and whose value is out of range gives
    /// back its last bit. Returns `None` once fewer than `width` bits remain.
    pub fn next_index(&mut self, width: usize, n: usize) -> Option<usize> {
        if width == 0 {
            return Some(0);
        }
        if self.remaining() < width {
            return None;
        }

        let value = (0..width).fold(0u64, |acc, i| (acc << 1) | self.bit(self.cursor + i));
        let leading = self.bit(self.cursor) == 1;

        if leading && value >= n as u64 {
            self.cursor += width - 1;
            Some((value >> 1) as usize)
        } else {
            self.cursor += width;
            Some(value as usize)
        }
    }
}

/// Generate the secret for `service` under `policy`.
///
/// # Errors
///
/// - `Config` if the policy leaves no characters
/// - `EntropyExhausted` if 256 bits cannot supply `policy.length()` characters
pub fn generate(policy: &GenerationPolicy, master: &MasterSecret, service: &ServiceName) -> Result<String> {
    let alphabet = policy.alphabet()?;
    let width = alphabet.selector_width();
    let mut stream = EntropyStream::new(master.as_bytes(), service);

    let mut out = String::with_capacity(policy.length());
    for produced in 0..policy.length() {
        let index = stream
            .next_index(width, alphabet.len())
            .ok_or(HashpassError::EntropyExhausted {
                requested: policy.length(),
                produced,
                alphabet: alphabet.len(),
            })?;
        out.push(alphabet.chars()[index]);
    }
    Ok(out)
}
