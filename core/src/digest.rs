use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest as _, Sha1};
use std::fmt;
use std::str::FromStr;

/// Number of hex characters used for the shard directory prefix. Splitting
/// the digest at two characters bounds fan-out to 256 shard directories.
pub const SHARD_PREFIX_LEN: usize = 2;

/// SHA-1 identity of a blob's exact byte content.
///
/// Two files with identical bytes share one digest; the digest doubles as
/// the blob's storage address inside a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 20]);

impl Digest {
    pub fn of_bytes(data: &[u8]) -> Self {
        let hash = Sha1::digest(data);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_string(&self) -> String {
        self.to_hex().chars().take(8).collect()
    }

    /// Splits the hex form into the shard directory name and the file name
    /// inside that shard.
    pub fn shard(&self) -> (String, String) {
        let hex = self.to_hex();
        let (prefix, suffix) = hex.split_at(SHARD_PREFIX_LEN);
        (prefix.to_string(), suffix.to_string())
    }

    pub fn shard_prefix(&self) -> String {
        self.shard().0
    }

    pub fn shard_suffix(&self) -> String {
        self.shard().1
    }

    /// Rebuilds a digest from its shard components, the inverse of `shard`.
    pub fn from_shard(prefix: &str, suffix: &str) -> Result<Self, Error> {
        format!("{}{}", prefix, suffix).parse()
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidDigest(s.to_string()))?;
        if bytes.len() != 20 {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        let mut array = [0u8; 20];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
