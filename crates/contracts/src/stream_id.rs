//! StreamId - cheap-to-clone stream identifier
//!
//! Stream ids are cloned into every buffer, history map and alignment result,
//! so they are backed by `Arc<str>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Identifier of one logical data stream (e.g. `"front_camera"`, `"mic_0"`, `"gaze"`).
///
/// # Examples
/// ```
/// use contracts::StreamId;
///
/// let id: StreamId = "gaze".into();
/// let copy = id.clone();
/// assert_eq!(id, copy);
/// assert_eq!(id.as_str(), "gaze");
/// assert!(!id.is_blank());
/// ```
#[derive(Clone, Default)]
pub struct StreamId(Arc<str>);

impl StreamId {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace only. Such ids are rejected at ingestion.
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Deref for StreamId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StreamId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for StreamId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({:?})", self.0)
    }
}

impl PartialEq for StreamId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for StreamId {}

impl PartialEq<str> for StreamId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for StreamId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialOrd for StreamId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// Must hash like `str` so maps keyed by StreamId can be queried with `&str`.
impl Hash for StreamId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for StreamId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_blank_detection() {
        assert!(StreamId::from("").is_blank());
        assert!(StreamId::from("   ").is_blank());
        assert!(!StreamId::from("audio").is_blank());
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map: HashMap<StreamId, u32> = HashMap::new();
        map.insert("video".into(), 30);
        map.insert("audio".into(), 50);

        assert_eq!(map.get("video"), Some(&30));
        assert_eq!(map.get("gaze"), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id: StreamId = "telemetry".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"telemetry\"");

        let parsed: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
