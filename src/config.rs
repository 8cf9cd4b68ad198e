use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LOG_EVERY_N: usize = 100;
pub const DEFAULT_MESSAGE_LENGTH_LIMIT: usize = 15 * (1 << 20);
pub const DEFAULT_QPS: u32 = 9;
pub const DEFAULT_CLIENT_ID_FILE: &str = "client_id.json";
pub const DEFAULT_CREDENTIAL_FILE: &str = "~/.google/mailmanmigration.json";

const CLIENT_ID_FILE_ENV: &str = "GROUPSMIGRATE_CLIENT_ID_FILE";
const CREDENTIAL_FILE_ENV: &str = "GROUPSMIGRATE_CREDENTIAL_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mbox file {0} does not exist or is not a regular file")]
    MboxNotFound(PathBuf),

    #[error("--{name} must be at least 1 (got {value})")]
    NotPositive { name: &'static str, value: u64 },
}

/// Command line surface of the migration tool.
#[derive(Parser, Debug)]
#[command(name = "groupsmigrate")]
#[command(about = "Migrate an mbox archive to Google Groups")]
#[command(version)]
pub struct CliArgs {
    /// Path of the .mbox archive file
    pub mbox_file: String,

    /// Email address of the Google Group
    pub group_id: String,

    /// Print a progress line every N messages
    #[arg(long = "log_every_n", default_value_t = DEFAULT_LOG_EVERY_N)]
    pub log_every_n: usize,

    /// Largest serialized message (in bytes) that will be uploaded
    #[arg(long = "message_length_limit", default_value_t = DEFAULT_MESSAGE_LENGTH_LIMIT)]
    pub message_length_limit: usize,

    /// Upload calls per second (a fixed 1/qps pause precedes every call)
    #[arg(long = "qps", default_value_t = DEFAULT_QPS)]
    pub qps: u32,

    /// Number of leading messages to skip (resume point of a previous run)
    #[arg(long = "starting_from", default_value_t = 0)]
    pub starting_from: usize,

    /// OAuth2 client secret file [env: GROUPSMIGRATE_CLIENT_ID_FILE, default: client_id.json]
    #[arg(long = "client_id_file")]
    pub client_id_file: Option<String>,

    /// OAuth2 token cache [env: GROUPSMIGRATE_CREDENTIAL_FILE, default: ~/.google/mailmanmigration.json]
    #[arg(long = "credential_file")]
    pub credential_file: Option<String>,

    /// Do not run a local web server for consent; paste the code on the console instead
    #[arg(long = "noauth_local_webserver")]
    pub noauth_local_webserver: bool,

    /// Port of the local consent redirect server (random when omitted)
    #[arg(long = "auth_host_port")]
    pub auth_host_port: Option<u16>,

    /// Walk the archive and apply every policy without authenticating or uploading
    #[arg(long = "dry_run")]
    pub dry_run: bool,

    /// Print the resolved configuration and exit
    #[arg(long = "check_config")]
    pub check_config: bool,
}

/// How the OAuth2 consent is collected when no cached token is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentMode {
    /// Local redirect server on an OS-chosen port
    LocalServer,
    /// Local redirect server on a fixed port
    LocalServerPort(u16),
    /// Console copy/paste of the authorization code
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mbox_file: PathBuf,
    pub group_id: String,
    pub log_every_n: usize,
    pub message_length_limit: usize,
    pub qps: u32,
    pub starting_from: usize,
    pub auth: AuthConfig,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id_file: PathBuf,
    pub credential_file: PathBuf,
    pub consent: ConsentMode,
}

impl Config {
    /// Resolve and validate the run parameters. Nothing is mutated after this.
    /// The mbox itself is checked separately by `check_mbox`.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let client_id_file = resolve_path(
            args.client_id_file.as_deref(),
            CLIENT_ID_FILE_ENV,
            DEFAULT_CLIENT_ID_FILE,
        );
        let credential_file = resolve_path(
            args.credential_file.as_deref(),
            CREDENTIAL_FILE_ENV,
            DEFAULT_CREDENTIAL_FILE,
        );

        // Console consent wins over a redirect port
        let consent = match (args.noauth_local_webserver, args.auth_host_port) {
            (true, _) => ConsentMode::Console,
            (false, Some(port)) => ConsentMode::LocalServerPort(port),
            (false, None) => ConsentMode::LocalServer,
        };

        let config = Config {
            mbox_file: expand_tilde(&args.mbox_file),
            group_id: args.group_id.clone(),
            log_every_n: args.log_every_n,
            message_length_limit: args.message_length_limit,
            qps: args.qps,
            starting_from: args.starting_from,
            auth: AuthConfig {
                client_id_file,
                credential_file,
                consent,
            },
            dry_run: args.dry_run,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positives = [
            ("log_every_n", self.log_every_n as u64),
            ("message_length_limit", self.message_length_limit as u64),
            ("qps", u64::from(self.qps)),
        ];
        for (name, value) in positives {
            if value == 0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        Ok(())
    }

    /// The archive must exist before authentication or upload starts.
    pub fn check_mbox(&self) -> Result<(), ConfigError> {
        if !self.mbox_file.is_file() {
            return Err(ConfigError::MboxNotFound(self.mbox_file.clone()));
        }
        Ok(())
    }
}

/// Flag value, then environment variable, then built-in default.
fn resolve_path(flag: Option<&str>, env_var: &str, default: &str) -> PathBuf {
    match flag {
        Some(value) => expand_tilde(value),
        None => match std::env::var(env_var) {
            Ok(value) if !value.is_empty() => expand_tilde(&value),
            _ => expand_tilde(default),
        },
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(path).to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn parse(extra: &[&str], mbox: &str) -> CliArgs {
        let mut argv = vec!["groupsmigrate", mbox, "team@example.com"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_defaults_match_original_tool() {
        let args = parse(&[], "archive.mbox");
        assert_eq!(args.log_every_n, 100);
        assert_eq!(args.message_length_limit, 15 * 1024 * 1024);
        assert_eq!(args.qps, 9);
        assert_eq!(args.starting_from, 0);
        assert!(args.client_id_file.is_none());
        assert!(!args.noauth_local_webserver);
    }

    #[test]
    fn test_snake_case_flags() {
        let args = parse(
            &[
                "--log_every_n", "5",
                "--message_length_limit", "2048",
                "--qps", "3",
                "--starting_from", "42",
                "--client_id_file", "/tmp/secret.json",
                "--noauth_local_webserver",
            ],
            "archive.mbox",
        );
        assert_eq!(args.log_every_n, 5);
        assert_eq!(args.message_length_limit, 2048);
        assert_eq!(args.qps, 3);
        assert_eq!(args.starting_from, 42);
        assert_eq!(args.client_id_file.as_deref(), Some("/tmp/secret.json"));
        assert!(args.noauth_local_webserver);
    }

    #[test]
    fn test_from_args_resolves_consent_and_paths() {
        let mbox = NamedTempFile::new().unwrap();
        let mbox_path = mbox.path().to_str().unwrap();

        let args = parse(
            &["--auth_host_port", "8085", "--credential_file", "/tmp/creds/token.json"],
            mbox_path,
        );
        let config = Config::from_args(&args).unwrap();
        config.check_mbox().unwrap();

        assert_eq!(config.auth.consent, ConsentMode::LocalServerPort(8085));
        assert_eq!(config.auth.credential_file, PathBuf::from("/tmp/creds/token.json"));
        assert_eq!(config.mbox_file, mbox.path());

        let args = parse(&["--noauth_local_webserver", "--auth_host_port", "8085"], mbox_path);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.auth.consent, ConsentMode::Console);
    }

    #[test]
    fn test_missing_mbox_is_rejected() {
        let args = parse(&[], "/definitely/not/here.mbox");
        // Resolving alone does not look at the archive
        let config = Config::from_args(&args).unwrap();
        let err = config.check_mbox().unwrap_err();
        assert!(matches!(err, ConfigError::MboxNotFound(_)));
    }

    #[test]
    fn test_existing_mbox_passes_check() {
        let mbox = NamedTempFile::new().unwrap();
        let args = parse(&[], mbox.path().to_str().unwrap());
        assert!(Config::from_args(&args).unwrap().check_mbox().is_ok());
    }

    #[test]
    fn test_zero_qps_is_rejected() {
        let mbox = NamedTempFile::new().unwrap();
        let args = parse(&["--qps", "0"], mbox.path().to_str().unwrap());
        let err = Config::from_args(&args).unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive { name: "qps", value: 0 }));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("relative"), PathBuf::from("relative"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.google/x.json"), home.join(".google/x.json"));
            assert_eq!(expand_tilde("~"), home);
        }
    }
}
