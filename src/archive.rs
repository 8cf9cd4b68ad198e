use log::debug;

use crate::error::UploadError;

pub const MESSAGE_MIME_TYPE: &str = "message/rfc822";

/// Structured result of an archive insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveResponse {
    pub response_code: Option<String>,
}

impl ArchiveResponse {
    pub fn with_code(code: &str) -> Self {
        ArchiveResponse {
            response_code: Some(code.to_string()),
        }
    }

    /// Accept only a "success" response code, whatever its case.
    pub fn check(self) -> Result<(), UploadError> {
        match self.response_code {
            Some(code) if code.eq_ignore_ascii_case("success") => Ok(()),
            Some(code) => Err(UploadError::UnexpectedResponse(code)),
            None => Err(UploadError::UnexpectedResponse("<missing>".to_string())),
        }
    }
}

/// Remote operation that appends one RFC822 message to a group's archive.
#[allow(async_fn_in_trait)]
pub trait ArchiveService {
    async fn insert(&self, group_id: &str, message: &[u8]) -> Result<ArchiveResponse, UploadError>;
}

/// Terminal state of one message in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Index below the resume offset; never sent
    Skipped,
    /// Serialized form larger than the configured limit; never sent
    Rejected { length: usize, limit: usize },
    Failed(UploadError),
    Succeeded,
}

/// Stand-in used by `--dry_run`: accepts everything without network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunArchive;

impl ArchiveService for DryRunArchive {
    async fn insert(&self, group_id: &str, message: &[u8]) -> Result<ArchiveResponse, UploadError> {
        debug!("Dry-run: would insert {} bytes into {}", message.len(), group_id);
        Ok(ArchiveResponse::with_code("SUCCESS"))
    }
}
