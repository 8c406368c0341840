//! Encoded chunks and the finalized export artifact.
//!
//! Chunks are fragments of one encoder bitstream. They only decode when
//! concatenated in the order the encoder produced them, so the sequence
//! number recorded at append time is the only ordering that matters.

use serde::{Deserialize, Serialize};

use crate::frame::Dimensions;

/// One ordered fragment of an encoded bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    sequence: u64,
    data: Vec<u8>,
}

impl EncodedChunk {
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self { sequence, data }
    }

    /// Position of this chunk in emission order, starting at zero.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Why a capture session stopped accumulating chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured capture window elapsed.
    WindowElapsed,
    /// The caller asked the session to stop.
    Requested,
    /// The render surface went away.
    SurfaceClosed,
    /// The encoder reported an error.
    EncoderFailed,
}

/// The single deliverable produced by a capture session.
///
/// Immutable once built; attaching the transport text yields a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    fragment_count: usize,
    complete: bool,
    transport_text: Option<String>,
}

impl ExportArtifact {
    /// Concatenate chunks in the order given.
    pub fn from_chunks(chunks: &[EncodedChunk], mime_type: impl Into<String>, complete: bool) -> Self {
        let total: usize = chunks.iter().map(EncodedChunk::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(chunk.data());
        }
        Self {
            bytes,
            mime_type: mime_type.into(),
            fragment_count: chunks.len(),
            complete,
            transport_text: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// False when the encoder failed before confirming completion.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn transport_text(&self) -> Option<&str> {
        self.transport_text.as_deref()
    }

    pub fn with_transport_text(self, text: String) -> Self {
        Self {
            transport_text: Some(text),
            ..self
        }
    }

    /// File extension matching the MIME type.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "video/webm" => "webm",
            "video/x-matroska" => "mkv",
            "video/x-chromacast-raw" => "ckrv",
            _ => "bin",
        }
    }
}

/// Sidecar description of an artifact, written next to it on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub mime_type: String,
    pub byte_len: usize,
    pub fragment_count: usize,
    pub complete: bool,

    /// Wall-clock capture start (RFC 3339).
    pub started_at: String,
    pub duration_secs: f64,
    pub stop_reason: StopReason,
    pub dimensions: Dimensions,
    pub encoder: String,

    /// Reference returned by the uploader, if the artifact was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ArtifactManifest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<EncodedChunk> {
        vec![
            EncodedChunk::new(0, b"head".to_vec()),
            EncodedChunk::new(1, b"-mid-".to_vec()),
            EncodedChunk::new(2, b"tail".to_vec()),
        ]
    }

    #[test]
    fn test_artifact_concatenates_in_order() {
        let artifact = ExportArtifact::from_chunks(&chunks(), "video/webm", true);
        assert_eq!(artifact.bytes(), b"head-mid-tail");
        assert_eq!(artifact.len(), 13);
        assert_eq!(artifact.fragment_count(), 3);
        assert!(artifact.is_complete());
        assert_eq!(artifact.file_extension(), "webm");
    }

    #[test]
    fn test_empty_artifact() {
        let artifact = ExportArtifact::from_chunks(&[], "application/octet-stream", false);
        assert!(artifact.is_empty());
        assert!(!artifact.is_complete());
        assert_eq!(artifact.file_extension(), "bin");
    }

    #[test]
    fn test_transport_text_is_attached_without_touching_bytes() {
        let artifact = ExportArtifact::from_chunks(&chunks(), "video/webm", true);
        let bytes = artifact.bytes().to_vec();
        let artifact = artifact.with_transport_text("data:video/webm;base64,AAAA".to_string());
        assert_eq!(artifact.bytes(), bytes.as_slice());
        assert_eq!(artifact.transport_text(), Some("data:video/webm;base64,AAAA"));
    }

    #[test]
    fn test_manifest_serializes_stop_reason_snake_case() {
        let manifest = ArtifactManifest {
            mime_type: "video/webm".to_string(),
            byte_len: 13,
            fragment_count: 3,
            complete: true,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            duration_secs: 16.0,
            stop_reason: StopReason::WindowElapsed,
            dimensions: Dimensions::new(800, 450),
            encoder: "raw".to_string(),
            reference: None,
        };
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"window_elapsed\""));
        assert!(!json.contains("reference"));
        let back: ArtifactManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
