use thiserror::Error;

/// Why a single message failed to reach the group archive.
///
/// Both variants are counted the same way by the uploader; neither aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response code: {0}")]
    UnexpectedResponse(String),
}
