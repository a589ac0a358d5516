//! Identifiers: owners, containers, objects and addresses
//!
//! All identifiers are fixed-width byte strings. Containers and owners use hex
//! text form, objects use the canonical UUID form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Container identifier length in bytes
pub const CONTAINER_ID_SIZE: usize = 32;

/// Owner identifier length in bytes
pub const OWNER_ID_SIZE: usize = 25;

const OWNER_VERSION: u8 = 0x35;
const OWNER_HASH_SIZE: usize = 20;

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fn decode_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| Error::InvalidInput(format!("can't parse {what} '{s}': {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        Error::InvalidInput(format!(
            "can't parse {what} '{s}': expected {N} bytes, got {}",
            b.len()
        ))
    })
}

/// Identity of a key holder, derived from its public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId([u8; OWNER_ID_SIZE]);

impl OwnerId {
    /// Derive the owner identifier of a public key.
    ///
    /// Layout: version byte, 20 bytes of SHA-256(public key), 4 checksum
    /// bytes taken from a double SHA-256 of the first 21 bytes.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);

        let mut out = [0u8; OWNER_ID_SIZE];
        out[0] = OWNER_VERSION;
        out[1..=OWNER_HASH_SIZE].copy_from_slice(&digest[..OWNER_HASH_SIZE]);

        let checksum = Sha256::digest(Sha256::digest(&out[..=OWNER_HASH_SIZE]));
        out[OWNER_HASH_SIZE + 1..].copy_from_slice(&checksum[..4]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({self})")
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed(s, "owner ID").map(Self)
    }
}

hex_serde!(OwnerId);

/// Container identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContainerId([u8; CONTAINER_ID_SIZE]);

impl ContainerId {
    pub const fn new(bytes: [u8; CONTAINER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({self})")
    }
}

impl FromStr for ContainerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed(s, "CID").map(Self)
    }
}

hex_serde!(ContainerId);

/// Object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh random identifier for a new object
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl From<Uuid> for ObjectId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("can't parse object id '{s}': {e}")))
    }
}

/// Location of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub container: ContainerId,
    pub object: ObjectId,
}

impl Address {
    pub fn new(container: ContainerId, object: ObjectId) -> Self {
        Self { container, object }
    }

    /// Parse a container/object pair supplied as separate strings
    pub fn parse(container: &str, object: &str) -> Result<Self> {
        Ok(Self {
            container: container.parse()?,
            object: object.parse()?,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse the `container/object` form produced by `Display`
    fn from_str(s: &str) -> Result<Self> {
        let (container, object) = s.split_once('/').ok_or_else(|| {
            Error::InvalidInput(format!("invalid address '{s}'. Expected: <cid>/<oid>"))
        })?;
        Self::parse(container, object)
    }
}
