//! Utilities shared by the DirectMQ crates
//!
//! ## Core Features:
//! - **Byte Size Handling**: Human-readable byte size parsing/formatting with [`Bytesize`]
//! - **Duration Conversion**: String-to-Duration parsing supporting multiple time units
//! - **Random Ordering**: Uniform in-place shuffling used for participant selection
//! - **Node Identifiers**: Random host id generation for nodes configured without one
//!
//! ## Usage Examples:
//! ```rust
//! use directmq_utils::{Bytesize, to_duration};
//!
//! let size = Bytesize::from("2M512K");
//! assert_eq!(size.as_u64(), 2_621_440);
//!
//! let duration = to_duration("1m30s");
//! assert_eq!(duration.as_secs(), 90);
//! ```

#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{
    de::{self, Deserializer},
    ser::Serializer,
    Deserialize, Serialize,
};

/// Node identifier, carried verbatim in every frame's `traversed` path
pub type NodeId = String;

const BYTESIZE_K: u64 = 1024;
const BYTESIZE_M: u64 = 1048576;
const BYTESIZE_G: u64 = 1073741824;

/// Human-readable byte size, `0` meaning "unlimited" where used as a limit
///
/// # Example:
/// ```
/// use directmq_utils::Bytesize;
///
/// let size = Bytesize::from("1G512M");
/// assert_eq!(size.as_u64(), 1_610_612_736);
///
/// let size = Bytesize::from(1024u64);
/// assert_eq!(size.to_string(), "1K");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bytesize(pub u64);

impl Bytesize {
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.0 == 0
    }
}

impl Deref for Bytesize {
    type Target = u64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for Bytesize {
    fn from(v: u64) -> Self {
        Bytesize(v)
    }
}

impl From<&str> for Bytesize {
    fn from(v: &str) -> Self {
        Bytesize(to_bytesize(v))
    }
}

impl fmt::Display for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut v = self.0;
        if v == 0 {
            return f.write_str("0");
        }
        for (unit, size) in [('G', BYTESIZE_G), ('M', BYTESIZE_M), ('K', BYTESIZE_K)] {
            let n = v / size;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                v %= size;
            }
        }
        if v > 0 {
            write!(f, "{v}B")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Bytesize {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytesize {
    #[inline]
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Bytesize(n),
            Raw::Text(s) => Bytesize(to_bytesize(&s)),
        })
    }
}

/// Parse human-readable byte size string, a trailing bare number counts as bytes
///
/// # Example:
/// ```
/// assert_eq!(directmq_utils::to_bytesize("2G512K"), 2148007936);
/// assert_eq!(directmq_utils::to_bytesize("1KB24"), 1048);
/// assert_eq!(directmq_utils::to_bytesize("0"), 0);
/// ```
#[inline]
pub fn to_bytesize(text: &str) -> u64 {
    let text = text.trim().to_uppercase().replace("GB", "G").replace("MB", "M").replace("KB", "K");
    text.split_inclusive(['G', 'M', 'K', 'B'])
        .map(|x| {
            let (digits, unit) = match x.chars().last() {
                Some(u @ ('G' | 'M' | 'K' | 'B')) => (&x[..x.len() - 1], u),
                Some(_) => (x, 'B'),
                None => return 0,
            };
            let v = match digits.trim().parse::<u64>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match unit {
                'K' => v.saturating_mul(BYTESIZE_K),
                'M' => v.saturating_mul(BYTESIZE_M),
                'G' => v.saturating_mul(BYTESIZE_G),
                _ => v,
            }
        })
        .fold(0u64, |acc, v| acc.saturating_add(v))
}

/// Deserialize Duration from human-readable string format
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    Ok(to_duration(&v))
}

/// Convert human-readable duration string to Duration
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`.
///
/// # Example:
/// ```
/// let duration = directmq_utils::to_duration("1h30m15s");
/// assert_eq!(duration.as_secs(), 5415);
///
/// let short = directmq_utils::to_duration("1s500ms");
/// assert_eq!(short.as_millis(), 1500);
/// ```
#[inline]
pub fn to_duration(text: &str) -> Duration {
    let text = text.to_lowercase().replace("ms", "Y");
    let ms: u64 = text
        .split_inclusive(['s', 'm', 'h', 'd', 'Y'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().parse::<u64>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'Y' => v,
                's' => v * 1000,
                'm' => v * 60000,
                'h' => v * 3600000,
                'd' => v * 86400000,
                _ => 0,
            }
        })
        .sum();
    Duration::from_millis(ms)
}

/// Deserialize a node id, empty strings are rejected
#[inline]
pub fn deserialize_node_id<'de, D>(deserializer: D) -> std::result::Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    let id = String::deserialize(deserializer)?;
    if id.trim().is_empty() {
        return Err(de::Error::custom("node id must not be empty"));
    }
    Ok(id)
}

/// Shuffles `items` in place with a uniform Fisher–Yates permutation.
#[inline]
pub fn random_order<T>(items: &mut [T]) {
    items.shuffle(&mut rand::rng());
}

/// Generates a random host id of the form `node-xxxxxxxx`.
pub fn generate_node_id() -> NodeId {
    let n: u32 = rand::rng().random();
    format!("node-{n:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytesize() {
        assert_eq!(to_bytesize("1K"), 1024);
        assert_eq!(to_bytesize("1KB"), 1024);
        assert_eq!(to_bytesize("2m"), 2 * 1024 * 1024);
        assert_eq!(to_bytesize("512"), 512);
        assert_eq!(to_bytesize(""), 0);
        assert_eq!(to_bytesize("abc"), 0);
        assert_eq!(Bytesize::from("1M1K").to_string(), "1M1K");
        assert_eq!(Bytesize(0).to_string(), "0");
        assert!(Bytesize::from("0").is_unlimited());
    }

    #[test]
    fn test_bytesize_deserialize() {
        let v: Bytesize = serde_json::from_str("\"4K\"").unwrap();
        assert_eq!(v.as_u64(), 4096);
        let v: Bytesize = serde_json::from_str("100").unwrap();
        assert_eq!(v.as_u64(), 100);
    }

    #[test]
    fn test_duration() {
        assert_eq!(to_duration("5s"), Duration::from_secs(5));
        assert_eq!(to_duration("2m"), Duration::from_secs(120));
        assert_eq!(to_duration("100ms"), Duration::from_millis(100));
        assert_eq!(to_duration("0s"), Duration::ZERO);
    }

    #[test]
    fn test_random_order() {
        let mut items: Vec<u32> = (0..32).collect();
        random_order(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());

        let mut empty: Vec<u32> = vec![];
        random_order(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_random_order_is_uniform_enough() {
        let mut first = [0usize; 4];
        for _ in 0..4000 {
            let mut items = [0usize, 1, 2, 3];
            random_order(&mut items);
            first[items[0]] += 1;
        }
        for count in first {
            assert!(count > 700, "{first:?}");
        }
    }

    #[test]
    fn test_generate_node_id() {
        let id = generate_node_id();
        assert!(id.starts_with("node-"));
        assert_eq!(id.len(), 13);
    }
}
