use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::{MediaError, MediaResult};

/// Stream of bytes for chunk bodies and object content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

const MAX_ID_LEN: usize = 200;

/// Identifiers double as file and key names, so only a conservative
/// character set is accepted.
fn validate_key(kind: &str, raw: &str) -> MediaResult<()> {
    if raw.is_empty() {
        return Err(MediaError::invalid(format!("{} must not be empty", kind)));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(MediaError::invalid(format!(
            "{} exceeds {} characters",
            kind, MAX_ID_LEN
        )));
    }
    if raw.starts_with('.') || raw.contains("..") {
        return Err(MediaError::invalid(format!("{} contains a path traversal sequence", kind)));
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(MediaError::invalid(format!(
            "{} contains forbidden character {:?}",
            kind, bad
        )));
    }
    Ok(())
}

/// Caller-supplied identifier of a chunked upload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadId(String);

impl UploadId {
    /// Validate and wrap an identifier
    pub fn parse<S: Into<String>>(raw: S) -> MediaResult<Self> {
        let raw = raw.into();
        validate_key("upload id", &raw)?;
        Ok(Self(raw))
    }

    /// Generate a fresh identifier for callers that have no filename
    pub fn generate() -> Self {
        Self(format!("upl_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UploadId {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UploadId> for String {
    fn from(id: UploadId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a published object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Validate and wrap an object key
    pub fn parse<S: Into<String>>(raw: S) -> MediaResult<Self> {
        let raw = raw.into();
        validate_key("object id", &raw)?;
        Ok(Self(raw))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An assembled upload is published under its own identifier.
impl From<&UploadId> for ObjectId {
    fn from(id: &UploadId) -> Self {
        Self(id.0.clone())
    }
}

impl TryFrom<String> for ObjectId {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a chunk index received as text
pub fn parse_chunk_index(raw: &str) -> MediaResult<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::invalid("chunk index is required"));
    }
    raw.parse::<u32>()
        .map_err(|_| MediaError::invalid(format!("chunk index {:?} is not a non-negative integer", raw)))
}

/// Descriptive fields forwarded untouched to the metadata store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl MediaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_owner<S: Into<String>>(mut self, owner: S) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_attribute<K: Into<String>, V: Serialize>(mut self, key: K, value: V) -> Self {
        if self.attributes.is_null() {
            self.attributes = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(obj) = self.attributes.as_object_mut() {
            obj.insert(key.into(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
        }
        self
    }
}

/// Acknowledgement for a stored chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub upload_id: UploadId,
    pub chunk_index: u32,
    pub size_bytes: u64,
    pub chunks_received: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_filename_like_ids() {
        assert!(UploadId::parse("holiday-video_01.mp4").is_ok());
        assert!(UploadId::parse("3f2a9c").is_ok());
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for raw in ["", "../etc/passwd", "a/b", "a\\b", ".hidden", "x..y", "a b", "nul\0"] {
            let err = UploadId::parse(raw).unwrap_err();
            assert!(matches!(err, MediaError::InvalidRequest { .. }), "{raw:?}");
        }
    }

    #[test]
    fn rejects_overlong_ids() {
        let raw = "a".repeat(MAX_ID_LEN + 1);
        assert!(UploadId::parse(raw).is_err());
    }

    #[test]
    fn generated_ids_are_valid() {
        let id = UploadId::generate();
        assert!(UploadId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn chunk_index_parsing() {
        assert_eq!(parse_chunk_index("7").unwrap(), 7);
        assert!(parse_chunk_index("").is_err());
        assert!(parse_chunk_index("-1").is_err());
        assert!(parse_chunk_index("abc").is_err());
    }

    #[test]
    fn upload_id_deserialization_validates() {
        let ok: UploadId = serde_json::from_str("\"clip.webm\"").unwrap();
        assert_eq!(ok.as_str(), "clip.webm");
        assert!(serde_json::from_str::<UploadId>("\"../x\"").is_err());
    }
}
