//! Export boundary: transport encoding and upload handoff.
//!
//! A finished artifact is turned into an RFC 2397 data URL and handed to an
//! [`Uploader`] exactly once. Network transports live outside this crate;
//! the only uploader shipped here drops the payload into a local file.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::ExportArtifact;

/// Encode an artifact as `data:<mime>;base64,<payload>`.
pub fn encode_for_transport(artifact: &ExportArtifact) -> String {
    format!(
        "data:{};base64,{}",
        artifact.mime_type(),
        STANDARD.encode(artifact.bytes())
    )
}

/// Parse a data URL produced by [`encode_for_transport`].
///
/// Returns the MIME type and the decoded bytes.
pub fn decode_transport(text: &str) -> ChromacastResult<(String, Vec<u8>)> {
    let rest = text
        .strip_prefix("data:")
        .ok_or_else(|| ChromacastError::export("Transport text is not a data URL"))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| ChromacastError::export("Data URL is not base64 encoded"))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ChromacastError::export(format!("Invalid base64 payload: {e}")))?;
    Ok((mime_type.to_string(), bytes))
}

/// What an uploader hands back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Retrievable reference (URL or path) for display.
    pub reference: String,
}

/// Trait for the external upload collaborator.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Submit the transport text once.
    async fn submit(&self, payload: &str) -> ChromacastResult<UploadReceipt>;

    /// Uploader name for logging.
    fn name(&self) -> &str;
}

/// Writes the transport text to a local file and returns a `file://`
/// reference.
pub struct FileDropUploader {
    path: PathBuf,
}

impl FileDropUploader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Uploader for FileDropUploader {
    async fn submit(&self, payload: &str) -> ChromacastResult<UploadReceipt> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, payload).await?;
        let absolute = tokio::fs::canonicalize(&self.path).await?;
        Ok(UploadReceipt {
            reference: format!("file://{}", absolute.display()),
        })
    }

    fn name(&self) -> &str {
        "file-drop"
    }
}

/// Encodes artifacts and hands them to an uploader.
pub struct ExportPipeline {
    uploader: Box<dyn Uploader>,
    last_reference: Option<String>,
}

impl ExportPipeline {
    pub fn new(uploader: Box<dyn Uploader>) -> Self {
        Self {
            uploader,
            last_reference: None,
        }
    }

    /// Encode and submit an artifact. No retry on failure.
    ///
    /// Returns the artifact with its transport text attached, plus the
    /// uploader's receipt.
    pub async fn publish(
        &mut self,
        artifact: ExportArtifact,
    ) -> ChromacastResult<(ExportArtifact, UploadReceipt)> {
        if !artifact.is_complete() {
            tracing::warn!("Publishing a partial artifact");
        }

        let text = encode_for_transport(&artifact);
        tracing::info!(
            uploader = self.uploader.name(),
            bytes = artifact.len(),
            encoded_len = text.len(),
            "Submitting artifact"
        );

        let receipt = self.uploader.submit(&text).await.map_err(|e| match e {
            ChromacastError::TransportFailure { .. } => e,
            other => ChromacastError::transport(other.to_string()),
        })?;

        tracing::info!(reference = %receipt.reference, "Artifact uploaded");
        self.last_reference = Some(receipt.reference.clone());
        Ok((artifact.with_transport_text(text), receipt))
    }

    /// Reference from the most recent successful upload.
    pub fn last_reference(&self) -> Option<&str> {
        self.last_reference.as_deref()
    }
}
