//! Homomorphic payload hash
//!
//! Tillich-Zémor style hash over SL(2, GF(2^127)). Every input bit selects one
//! of two generator matrices and the digest is the ordered product of those
//! matrices. Matrix multiplication is associative, so the digest of `a || b`
//! is `concat(sum(a), sum(b))`, which lets the client hash a payload chunk by
//! chunk and lets the storage side answer range-hash queries without
//! re-reading whole objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Serialized digest length in bytes (four field elements).
pub const HASH_SIZE: usize = 64;

const ELEMENT_SIZE: usize = 16;

/// Reduction polynomial x^127 + x^63 + 1 without the leading term.
const REDUCTION: u128 = (1 << 63) | 1;
const TOP_BIT: u128 = 1 << 127;

/// Element of GF(2^127), kept reduced below 2^127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Gf127(u128);

impl Gf127 {
    const ZERO: Self = Self(0);
    const ONE: Self = Self(1);

    fn mul_x(self) -> Self {
        let shifted = self.0 << 1;
        if shifted & TOP_BIT != 0 {
            Self((shifted ^ TOP_BIT) ^ REDUCTION)
        } else {
            Self(shifted)
        }
    }

    fn add(self, other: Self) -> Self {
        Self(self.0 ^ other.0)
    }

    fn mul(self, other: Self) -> Self {
        let mut acc = Self::ZERO;
        for bit in (0..127).rev() {
            acc = acc.mul_x();
            if (other.0 >> bit) & 1 == 1 {
                acc = acc.add(self);
            }
        }
        acc
    }
}

/// Homomorphic digest of a byte sequence.
///
/// Stored as the 2x2 matrix `[[a, b], [c, d]]`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Hash {
    m: [Gf127; 4],
}

impl Hash {
    /// Digest of the empty input (the identity matrix).
    pub const fn empty() -> Self {
        Self {
            m: [Gf127::ONE, Gf127::ZERO, Gf127::ZERO, Gf127::ONE],
        }
    }

    /// Hash `data` from scratch.
    pub fn sum(data: &[u8]) -> Self {
        let mut hash = Self::empty();
        hash.absorb(data);
        hash
    }

    /// Combine digests of two adjacent ranges into the digest of their union.
    ///
    /// Order matters: `left` must cover the bytes that come first.
    pub fn concat(left: &Self, right: &Self) -> Self {
        let [a, b, c, d] = left.m;
        let [e, f, g, h] = right.m;
        Self {
            m: [
                a.mul(e).add(b.mul(g)),
                a.mul(f).add(b.mul(h)),
                c.mul(e).add(d.mul(g)),
                c.mul(f).add(d.mul(h)),
            ],
        }
    }

    /// Fold `concat` over a sequence of adjacent-range digests.
    pub fn concat_all<'a>(hashes: impl IntoIterator<Item = &'a Hash>) -> Self {
        hashes
            .into_iter()
            .fold(Self::empty(), |acc, h| Self::concat(&acc, h))
    }

    /// Whether this is the digest of zero bytes.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Serialize to the 64-byte big-endian wire form.
    pub fn to_bytes(&self) -> [u8; HASH_SIZE] {
        let mut out = [0u8; HASH_SIZE];
        for (i, element) in self.m.iter().enumerate() {
            out[i * ELEMENT_SIZE..(i + 1) * ELEMENT_SIZE].copy_from_slice(&element.0.to_be_bytes());
        }
        out
    }

    /// Parse the 64-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(Error::InvalidInput(format!(
                "hash must be {HASH_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut m = [Gf127::ZERO; 4];
        for (i, element) in m.iter_mut().enumerate() {
            let mut raw = [0u8; ELEMENT_SIZE];
            raw.copy_from_slice(&bytes[i * ELEMENT_SIZE..(i + 1) * ELEMENT_SIZE]);
            let value = u128::from_be_bytes(raw);
            if value & TOP_BIT != 0 {
                return Err(Error::InvalidInput("hash element out of field range".into()));
            }
            *element = Gf127(value);
        }
        Ok(Self { m })
    }

    // Right-multiplies by A = [[x, 1], [1, 0]] for a zero bit and by
    // B = [[x, x+1], [1, 1]] for a one bit.
    fn absorb(&mut self, data: &[u8]) {
        let [mut a, mut b, mut c, mut d] = self.m;
        for byte in data {
            for shift in (0..8).rev() {
                let ax = a.mul_x();
                let cx = c.mul_x();
                if (byte >> shift) & 1 == 0 {
                    (a, b) = (ax.add(b), a);
                    (c, d) = (cx.add(d), c);
                } else {
                    (a, b) = (ax.add(b), ax.add(a).add(b));
                    (c, d) = (cx.add(d), cx.add(c).add(d));
                }
            }
        }
        self.m = [a, b, c, d];
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| Error::InvalidInput(format!("invalid hash hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Upload-time accumulation step: `concat(running, sum(chunk))`.
pub fn accumulate(running: &Hash, chunk: &[u8]) -> Hash {
    Hash::concat(running, &Hash::sum(chunk))
}

/// XOR `data` with `salt` repeated cyclically.
///
/// An empty salt leaves the data unchanged.
pub fn salt_xor(data: &[u8], salt: &[u8]) -> Vec<u8> {
    salt_xor_at(data, salt, 0)
}

/// Like [`salt_xor`] for a window that starts `offset` bytes into the salted
/// range, so a range can be salted piecewise.
pub fn salt_xor_at(data: &[u8], salt: &[u8], offset: u64) -> Vec<u8> {
    if salt.is_empty() {
        return data.to_vec();
    }

    let len = salt.len() as u64;
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ salt[((offset + i as u64) % len) as usize])
        .collect()
}

/// Running digest fed chunk by chunk.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    state: Hash,
    bytes: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.state = accumulate(&self.state, chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes absorbed so far.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn digest(&self) -> Hash {
        self.state
    }
}
