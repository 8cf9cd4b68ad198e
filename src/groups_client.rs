use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use google_groupsmigration1::{hyper, hyper_rustls, oauth2, GroupsMigration};
use log::{debug, info, warn};

use crate::archive::{ArchiveResponse, ArchiveService, MESSAGE_MIME_TYPE};
use crate::config::{AuthConfig, ConsentMode};
use crate::error::UploadError;

/// Write access to group archives; requested on every call
pub const GROUPS_MIGRATION_SCOPE: &str = "https://www.googleapis.com/auth/apps.groups.migration";

type Connector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

pub struct GroupsClient {
    hub: GroupsMigration<Connector>,
}

impl GroupsClient {
    /// Authorize against the Groups Migration API (groupsmigration v1).
    ///
    /// A token cached in the credential file is reused while it is valid or
    /// refreshable; otherwise the installed-app consent flow runs and the new
    /// token is written back to the same file.
    pub async fn new(config: &AuthConfig) -> Result<Self> {
        info!("Connecting to Groups Migration API via OAuth2");

        // Make sure the token cache can be written and is in a format we can load
        prepare_credential_cache(&config.credential_file)?;

        // Read OAuth2 client credentials from file
        let secret = oauth2::read_application_secret(&config.client_id_file)
            .await
            .with_context(|| {
                format!(
                    "Unable to read OAuth2 client credentials file {}",
                    config.client_id_file.display()
                )
            })?;

        // Create authenticator with token persistence
        let auth = match oauth2::InstalledFlowAuthenticator::builder(
            secret.clone(),
            return_method(&config.consent),
        )
        .persist_tokens_to_disk(&config.credential_file)
        .build()
        .await
        {
            Ok(auth) => auth,
            Err(e) => {
                // The cache parsed as JSON but not as tokens: start over with consent
                warn!("⚠️  Unable to load token cache ({}), a new authorization is needed", e);
                move_aside(&config.credential_file)?;
                oauth2::InstalledFlowAuthenticator::builder(secret, return_method(&config.consent))
                    .persist_tokens_to_disk(&config.credential_file)
                    .build()
                    .await
                    .context("Unable to create OAuth2 authenticator")?
            }
        };

        // Run consent now rather than in the middle of the first upload
        auth.token(&[GROUPS_MIGRATION_SCOPE])
            .await
            .context("OAuth2 authorization failed")?;

        // Create HTTP client
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);

        // Bind the hub to the groupsmigration v1 service
        let hub = GroupsMigration::new(client, auth);

        info!("✅ Groups Migration API connection established successfully");

        Ok(GroupsClient { hub })
    }
}

fn return_method(consent: &ConsentMode) -> oauth2::InstalledFlowReturnMethod {
    match consent {
        ConsentMode::LocalServer => oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        ConsentMode::LocalServerPort(port) => oauth2::InstalledFlowReturnMethod::HTTPPortRedirect(*port),
        ConsentMode::Console => oauth2::InstalledFlowReturnMethod::Interactive,
    }
}

/// Create the cache's parent directory and set aside any cache file that is
/// not a token list (for instance one written by another OAuth2 library).
///
/// Returns the backup path when a file was moved.
pub fn prepare_credential_cache(path: &Path) -> Result<Option<PathBuf>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            debug!("Creating credential directory {}", parent.display());
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Unable to create credential directory {}", parent.display())
            })?;
        }
    }

    if !path.exists() {
        return Ok(None);
    }

    // The token store is a JSON array; anything else fails to load
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    let is_token_list = matches!(
        serde_json::from_str::<serde_json::Value>(&contents),
        Ok(serde_json::Value::Array(_))
    );
    if is_token_list {
        return Ok(None);
    }

    warn!(
        "⚠️  Token cache {} is not in a supported format, a new authorization is needed",
        path.display()
    );
    move_aside(path).map(Some)
}

fn move_aside(path: &Path) -> Result<PathBuf> {
    let mut backup = OsString::from(path.as_os_str());
    backup.push(".bak");
    let backup = PathBuf::from(backup);

    std::fs::rename(path, &backup).with_context(|| {
        format!("Unable to move token cache {} aside", path.display())
    })?;
    info!("Previous token cache kept as {}", backup.display());

    Ok(backup)
}

impl ArchiveService for GroupsClient {
    async fn insert(&self, group_id: &str, message: &[u8]) -> Result<ArchiveResponse, UploadError> {
        debug!("Inserting {} bytes into the archive of {}", message.len(), group_id);

        let mime_type = MESSAGE_MIME_TYPE
            .parse()
            .map_err(|_| UploadError::Transport(format!("invalid MIME type {}", MESSAGE_MIME_TYPE)))?;

        // Media upload of the raw RFC822 message
        let (_, groups) = self
            .hub
            .archive()
            .insert(group_id)
            .add_scope(GROUPS_MIGRATION_SCOPE)
            .upload(Cursor::new(message.to_vec()), mime_type)
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(ArchiveResponse {
            response_code: groups.response_code,
        })
    }
}
