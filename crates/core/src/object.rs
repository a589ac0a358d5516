//! Object model: headers, payload ranges and search queries

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::identity::{Identity, verify_signature};
use crate::ids::{Address, ContainerId, ObjectId, OwnerId};
use crate::token::Token;

/// Object format version written by this client
pub const OBJECT_VERSION: u64 = 1;

/// Search key matching objects that are not children of a split object
pub const ROOT_OBJECT_KEY: &str = "ROOT_OBJECT";

/// Search key matching storage group objects
pub const STORAGE_GROUP_KEY: &str = "STORAGE_GROUP";

/// Moment an object was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreationPoint {
    pub unix_time: i64,
    pub epoch: u64,
}

/// Fixed header every object carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHeader {
    pub id: ObjectId,
    pub owner: OwnerId,
    pub container: ContainerId,
    pub payload_length: u64,
    pub version: u64,
    #[serde(default)]
    pub created_at: CreationPoint,
}

/// Relation a [`Header::Link`] expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Linked object is a member of this storage group
    StorageGroup,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::StorageGroup => f.write_str("StorageGroup"),
        }
    }
}

/// Extended header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Header {
    /// Free-form user attribute
    User { key: String, value: String },
    /// Deletion marker
    Tombstone,
    /// Session token the object was stored under
    Token(Token),
    /// Homomorphic hash of the payload
    HomoHash(Hash),
    /// Plain payload checksum
    PayloadChecksum(#[serde(with = "crate::token::hex_bytes")] Vec<u8>),
    /// Signed checksum over all other headers
    Integrity {
        #[serde(with = "crate::token::hex_bytes")]
        headers_checksum: Vec<u8>,
        #[serde(with = "crate::token::hex_bytes")]
        signature: Vec<u8>,
    },
    /// Key that produced the integrity signature
    PublicKey(#[serde(with = "crate::token::hex_bytes")] Vec<u8>),
    /// Reference to another object in the same container
    Link { kind: LinkKind, id: ObjectId },
    /// Marks the object as a storage group
    StorageGroup,
}

impl Header {
    fn is_integrity(&self) -> bool {
        matches!(self, Header::Integrity { .. })
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Header::User { key, value } => write!(f, "UserHeader {{Key={key} Val={value}}}"),
            Header::Tombstone => f.write_str("Tombstone MARKED"),
            Header::Token(token) => write!(f, "Token {{Verb={}}}", token.verb()),
            Header::HomoHash(hash) => write!(f, "HomoHash {hash}"),
            Header::PayloadChecksum(sum) => write!(f, "PayloadChecksum {}", hex::encode(sum)),
            Header::Integrity {
                headers_checksum,
                signature,
            } => write!(
                f,
                "Integrity {{Checksum={} Signature={}}}",
                hex::encode(headers_checksum),
                hex::encode(signature)
            ),
            Header::PublicKey(key) => write!(f, "PublicKey {}", hex::encode(key)),
            Header::Link { kind, id } => write!(f, "Link {{Type={kind} ID={id}}}"),
            Header::StorageGroup => f.write_str("StorageGroup MARKED"),
        }
    }
}

/// Object metadata sent ahead of the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub system: SystemHeader,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl ObjectHeader {
    /// Header for a new object about to be uploaded
    pub fn new(id: ObjectId, owner: OwnerId, container: ContainerId, payload_length: u64) -> Self {
        Self {
            system: SystemHeader {
                id,
                owner,
                container,
                payload_length,
                version: OBJECT_VERSION,
                created_at: CreationPoint::default(),
            },
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = Header>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn address(&self) -> Address {
        Address::new(self.system.container, self.system.id)
    }

    pub fn is_tombstone(&self) -> bool {
        self.headers.iter().any(|h| matches!(h, Header::Tombstone))
    }

    pub fn is_storage_group(&self) -> bool {
        self.headers.iter().any(|h| matches!(h, Header::StorageGroup))
    }

    /// Objects linked as storage group members, in declaration order
    pub fn storage_group_members(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.headers.iter().filter_map(|h| match h {
            Header::Link {
                kind: LinkKind::StorageGroup,
                id,
            } => Some(*id),
            _ => None,
        })
    }

    /// User attributes in declaration order
    pub fn user_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().filter_map(|h| match h {
            Header::User { key, value } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
    }

    /// SHA-256 over the system header and every non-integrity header
    pub fn headers_checksum(&self) -> Result<Vec<u8>> {
        let covered: Vec<&Header> = self.headers.iter().filter(|h| !h.is_integrity()).collect();
        let encoded = serde_json::to_vec(&(&self.system, covered))?;
        Ok(Sha256::digest(encoded).to_vec())
    }

    /// Attach the public key and a signed integrity header
    pub fn seal(&mut self, identity: &dyn Identity) -> Result<()> {
        self.headers
            .retain(|h| !h.is_integrity() && !matches!(h, Header::PublicKey(_)));
        self.headers.push(Header::PublicKey(identity.public_key()));

        let headers_checksum = self.headers_checksum()?;
        let signature = identity.sign(&headers_checksum);
        self.headers.push(Header::Integrity {
            headers_checksum,
            signature,
        });
        Ok(())
    }

    /// Check the integrity header against the header contents and the
    /// embedded public key.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let public_key = self
            .headers
            .iter()
            .rev()
            .find_map(|h| match h {
                Header::PublicKey(key) => Some(key),
                _ => None,
            })
            .ok_or("missing public key header")?;

        let (checksum, signature) = self
            .headers
            .iter()
            .rev()
            .find_map(|h| match h {
                Header::Integrity {
                    headers_checksum,
                    signature,
                } => Some((headers_checksum, signature)),
                _ => None,
            })
            .ok_or("missing integrity header")?;

        let expected = self.headers_checksum().map_err(|e| e.to_string())?;
        if *checksum != expected {
            return Err("headers checksum mismatch".into());
        }
        if !verify_signature(public_key, checksum, signature) {
            return Err("invalid integrity signature".into());
        }
        Ok(())
    }
}

/// Full object: header plus (possibly partial) payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub header: ObjectHeader,
    #[serde(with = "crate::token::hex_bytes")]
    pub payload: Vec<u8>,
}

/// Headers of a storage group over `members`: one link per member, then the
/// group marker.
pub fn storage_group_headers(members: &[ObjectId]) -> Result<Vec<Header>> {
    if members.is_empty() {
        return Err(Error::InvalidInput(
            "storage group needs at least one member".into(),
        ));
    }
    Ok(members
        .iter()
        .map(|&id| Header::Link {
            kind: LinkKind::StorageGroup,
            id,
        })
        .chain(std::iter::once(Header::StorageGroup))
        .collect())
}

/// Parse `key=value` user header arguments; the value may be omitted.
pub fn parse_user_headers<S: AsRef<str>>(args: &[S]) -> Vec<Header> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg.as_ref().split_once('=').unwrap_or((arg.as_ref(), ""));
            Header::User {
                key: key.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}

/// Byte range within an object payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub offset: u64,
    pub length: u64,
}

impl Range {
    /// Non-empty range whose end does not overflow
    pub fn new(offset: u64, length: u64) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidInput("range length must be positive".into()));
        }
        if offset.checked_add(length).is_none() {
            return Err(Error::InvalidInput(format!(
                "range {offset}:{length} overflows"
            )));
        }
        Ok(Self { offset, length })
    }

    /// Range covering a whole payload, `None` for an empty payload
    pub fn whole(payload_length: u64) -> Option<Self> {
        Self::new(0, payload_length).ok()
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.offset, self.length)
    }
}

impl std::str::FromStr for Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (offset, length) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput("range must have form 'offset:length'".into()))?;
        let offset = offset
            .parse::<u64>()
            .map_err(|e| Error::InvalidInput(format!("can't parse offset '{offset}': {e}")))?;
        let length = length
            .parse::<u64>()
            .map_err(|e| Error::InvalidInput(format!("can't parse length '{length}': {e}")))?;
        Self::new(offset, length)
    }
}

/// Parse a list of `offset:length` arguments
pub fn parse_ranges<S: AsRef<str>>(args: &[S]) -> Result<Vec<Range>> {
    args.iter().map(|a| a.as_ref().parse()).collect()
}

/// How a search filter value is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Exact,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    pub name: String,
    pub value: String,
}

/// Header-based object search query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub filters: Vec<Filter>,
}

impl SearchQuery {
    /// Build regex filters from alternating `key value` arguments
    pub fn from_pairs<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.len() % 2 != 0 {
            return Err(Error::InvalidInput(
                "number of positional arguments must be even".into(),
            ));
        }

        let filters = args
            .chunks(2)
            .map(|pair| Filter {
                kind: FilterKind::Regex,
                name: pair[0].as_ref().to_string(),
                value: pair[1].as_ref().to_string(),
            })
            .collect();
        Ok(Self { filters })
    }

    /// Add an exact-match filter with an empty value
    pub fn with_flag(mut self, name: &str) -> Self {
        self.filters.push(Filter {
            kind: FilterKind::Exact,
            name: name.to_string(),
            value: String::new(),
        });
        self
    }
}
