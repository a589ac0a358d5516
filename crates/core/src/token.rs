//! Session tokens
//!
//! A token is requested unsigned, echoed by the peer, signed by the client
//! over the echoed body and finally countersigned by the peer. Once
//! negotiated it is immutable and attached to every request it authorizes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, TransferError};
use crate::ids::{ObjectId, OwnerId};

/// Operation a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Get,
    Put,
    Head,
    Delete,
    Search,
    Range,
    RangeHash,
}

impl Verb {
    const fn code(self) -> u8 {
        match self {
            Verb::Get => 0,
            Verb::Put => 1,
            Verb::Head => 2,
            Verb::Delete => 3,
            Verb::Search => 4,
            Verb::Range => 5,
            Verb::RangeHash => 6,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "Get",
            Verb::Put => "Put",
            Verb::Head => "Head",
            Verb::Delete => "Delete",
            Verb::Search => "Search",
            Verb::Range => "Range",
            Verb::RangeHash => "RangeHash",
        };
        f.write_str(name)
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Verb::Get),
            "put" => Ok(Verb::Put),
            "head" => Ok(Verb::Head),
            "delete" => Ok(Verb::Delete),
            "search" => Ok(Verb::Search),
            "range" => Ok(Verb::Range),
            "rangehash" | "range-hash" => Ok(Verb::RangeHash),
            _ => Err(Error::InvalidInput(format!("unknown verb '{s}'"))),
        }
    }
}

/// Inclusive epoch interval during which a token is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub first_epoch: u64,
    pub last_epoch: u64,
}

impl ValidityWindow {
    pub const fn new(first_epoch: u64, last_epoch: u64) -> Self {
        Self {
            first_epoch,
            last_epoch,
        }
    }

    /// Window starting at epoch 0 with no upper bound
    pub const fn unbounded() -> Self {
        Self::new(0, u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.first_epoch > self.last_epoch
    }

    pub fn contains_epoch(&self, epoch: u64) -> bool {
        self.first_epoch <= epoch && epoch <= self.last_epoch
    }

    /// Whether `other` is a non-empty sub-interval of `self`
    pub fn covers(&self, other: &ValidityWindow) -> bool {
        !other.is_empty()
            && self.first_epoch <= other.first_epoch
            && other.last_epoch <= self.last_epoch
    }
}

impl Default for ValidityWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Token fields covered by the client signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBody {
    pub owner: OwnerId,
    /// Objects the token is limited to; empty means container-wide
    pub scope: Vec<ObjectId>,
    pub window: ValidityWindow,
    pub verb: Verb,
    #[serde(with = "hex_bytes")]
    pub session_key: Vec<u8>,
}

impl TokenBody {
    /// Scope as an order-independent set
    pub fn scope_set(&self) -> BTreeSet<ObjectId> {
        self.scope.iter().copied().collect()
    }

    /// Canonical byte encoding that signatures are computed over
    pub fn signed_data(&self) -> Vec<u8> {
        let mut scope: Vec<&ObjectId> = self.scope.iter().collect();
        scope.sort();
        scope.dedup();

        let mut out = Vec::with_capacity(64 + scope.len() * 16 + self.session_key.len());
        out.extend_from_slice(self.owner.as_bytes());
        out.extend_from_slice(&(scope.len() as u32).to_be_bytes());
        for id in scope {
            out.extend_from_slice(id.as_bytes());
        }
        out.extend_from_slice(&self.window.first_epoch.to_be_bytes());
        out.extend_from_slice(&self.window.last_epoch.to_be_bytes());
        out.push(self.verb.code());
        out.extend_from_slice(&(self.session_key.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.session_key);
        out
    }
}

/// Negotiated session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub body: TokenBody,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Token {
    pub fn owner(&self) -> &OwnerId {
        &self.body.owner
    }

    pub fn verb(&self) -> Verb {
        self.body.verb
    }

    pub fn window(&self) -> ValidityWindow {
        self.body.window
    }

    /// Whether the token covers `object` (container-wide tokens cover all)
    pub fn covers(&self, object: &ObjectId) -> bool {
        self.body.scope.is_empty() || self.body.scope.contains(object)
    }

    /// Refuse to attach the token to a request outside its verb or scope
    pub fn authorize(&self, verb: Verb, object: &ObjectId) -> Result<(), TransferError> {
        if self.body.verb == verb && self.covers(object) {
            Ok(())
        } else {
            Err(TransferError::OutOfScope {
                verb,
                object: *object,
            })
        }
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
