use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use crate::archive::{ArchiveService, UploadOutcome};
use crate::config::Config;
use crate::mailbox::{Mailbox, MailboxMessage};

/// Counters of one run. Successes are whatever is neither skipped nor failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        RunSummary {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Skipped => self.skipped += 1,
            UploadOutcome::Rejected { .. } | UploadOutcome::Failed(_) => self.failed += 1,
            UploadOutcome::Succeeded => {}
        }
    }

    pub fn succeeded(&self) -> usize {
        self.total - self.failed - self.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully uploaded {} of {} messages!",
            self.succeeded(),
            self.total
        )
    }
}

/// Fixed pause before every remote call.
///
/// The pause does not account for how long the previous call took, so `qps`
/// is an upper bound on call starts rather than a measured rate.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval: Option<Duration>,
}

impl Throttle {
    pub fn per_second(qps: u32) -> Self {
        let interval = (qps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(qps)));
        Throttle { interval }
    }

    pub fn disabled() -> Self {
        Throttle { interval: None }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub async fn wait(&self) {
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }
    }
}

/// Drives a single sequential pass over a mailbox.
pub struct Uploader<'a, S: ArchiveService> {
    service: &'a S,
    config: &'a Config,
    throttle: Throttle,
}

impl<'a, S: ArchiveService> Uploader<'a, S> {
    pub fn new(service: &'a S, config: &'a Config) -> Self {
        let throttle = if config.dry_run {
            Throttle::disabled()
        } else {
            Throttle::per_second(config.qps)
        };

        Uploader {
            service,
            config,
            throttle,
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Upload every message once, in order. Per-message failures are counted
    /// and reported on stderr; they never stop the run.
    pub async fn run(&self, mailbox: &Mailbox) -> RunSummary {
        let started = chrono::Utc::now();
        let mut summary = RunSummary::new(mailbox.len());

        info!(
            "Starting upload of {} message(s) to {} (starting from {})",
            summary.total, self.config.group_id, self.config.starting_from
        );

        for message in mailbox.iter() {
            // Leading messages were uploaded by a previous run
            if message.index < self.config.starting_from {
                summary.record(&UploadOutcome::Skipped);
                continue;
            }

            if let Some((progress, headers)) = self.progress_lines(message, summary.total) {
                println!("{}", progress);
                println!("{}", headers);
            }

            let outcome = self.upload_message(message).await;

            // Failures go to stderr, apart from the progress output
            if let Some(line) = failure_line(message, &outcome) {
                eprintln!("{}", line);
            }
            summary.record(&outcome);
        }

        let elapsed = chrono::Utc::now() - started;
        info!(
            "Upload finished in {}s: {} succeeded, {} failed, {} skipped",
            elapsed.num_seconds(),
            summary.succeeded(),
            summary.failed,
            summary.skipped
        );

        summary
    }

    /// Progress line and header sub-line, printed every `log_every_n`
    /// messages by absolute archive index. Skipped messages never print.
    pub fn progress_lines(&self, message: &MailboxMessage, total: usize) -> Option<(String, String)> {
        if message.index < self.config.starting_from
            || message.index % self.config.log_every_n.max(1) != 0
        {
            return None;
        }

        Some((
            format!("Uploading message {} of {}", message.index, total),
            format!(
                "    Subject: {}   Date: {}",
                display_subject(message),
                message.date().unwrap_or("<no date>")
            ),
        ))
    }

    /// Size check, throttle, submit. Skipping is decided by the caller.
    pub async fn upload_message(&self, message: &MailboxMessage) -> UploadOutcome {
        let limit = self.config.message_length_limit;
        if message.len() > limit {
            warn!("Message {} rejected: {} bytes > {}", message.index, message.len(), limit);
            return UploadOutcome::Rejected {
                length: message.len(),
                limit,
            };
        }

        // Fixed pause before every call, whatever the previous call took
        self.throttle.wait().await;

        let result = self
            .service
            .insert(&self.config.group_id, message.as_bytes())
            .await
            .and_then(|response| response.check());

        match result {
            Ok(()) => {
                debug!("Message {} uploaded", message.index);
                UploadOutcome::Succeeded
            }
            Err(e) => {
                warn!("Message {} failed: {}", message.index, e);
                UploadOutcome::Failed(e)
            }
        }
    }
}

/// Error-stream line for a rejected or failed message.
pub fn failure_line(message: &MailboxMessage, outcome: &UploadOutcome) -> Option<String> {
    match outcome {
        UploadOutcome::Rejected { length, limit } => Some(format!(
            "Length of {} ({} bytes) exceeds maximum message length of {}",
            display_subject(message),
            length,
            limit
        )),
        UploadOutcome::Failed(e) => Some(format!(
            "Error when uploading message {} ({}): {}",
            message.index,
            display_subject(message),
            e
        )),
        UploadOutcome::Succeeded | UploadOutcome::Skipped => None,
    }
}

fn display_subject(message: &MailboxMessage) -> &str {
    message.subject().unwrap_or("<no subject>")
}
