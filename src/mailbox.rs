use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use mail_parser::mailbox::mbox::MessageIterator;
use mail_parser::{HeaderName, MessageParser};

/// One message of the archive, in archive order.
#[derive(Debug, Clone)]
pub struct MailboxMessage {
    pub index: usize,
    subject: Option<String>,
    date: Option<String>,
    contents: Vec<u8>,
}

impl MailboxMessage {
    pub fn new(index: usize, contents: Vec<u8>) -> Self {
        // Headers are parsed once up front; the raw bytes are what gets uploaded
        let (subject, date) = match MessageParser::default().parse(&contents) {
            Some(parsed) => (
                parsed.subject().map(str::to_string),
                // Shown as written in the archive, even when it does not parse as a date
                parsed.header_raw(HeaderName::Date).map(|date| date.trim().to_string()),
            ),
            None => (None, None),
        };

        MailboxMessage {
            index,
            subject,
            date,
            contents,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    /// Serialized RFC822 form, without the mbox "From " separator line.
    /// Body lines quoted as ">From " by the mbox writer come back unquoted.
    pub fn as_bytes(&self) -> &[u8] {
        &self.contents
    }

    /// Serialized length in bytes
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// An mbox archive loaded in memory so the total is known before uploading.
#[derive(Debug, Default)]
pub struct Mailbox {
    messages: Vec<MailboxMessage>,
}

impl Mailbox {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Reading mbox archive {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Unable to open mbox file {}", path.display()))?;

        // Split on "From " separator lines, keeping archive order
        let mut messages = Vec::new();
        for (index, raw_message) in MessageIterator::new(BufReader::new(file)).enumerate() {
            let raw_message = raw_message.map_err(|_| {
                anyhow::anyhow!(
                    "Malformed mbox data in {} at message {}",
                    path.display(),
                    index
                )
            })?;
            debug!(
                "Message {}: envelope sender '{}', {} bytes",
                index,
                raw_message.from(),
                raw_message.contents().len()
            );
            messages.push(MailboxMessage::new(index, raw_message.unwrap_contents()));
        }

        info!("✅ {} message(s) found in {}", messages.len(), path.display());

        Ok(Mailbox { messages })
    }

    pub fn from_messages(raw_messages: Vec<Vec<u8>>) -> Self {
        let messages = raw_messages
            .into_iter()
            .enumerate()
            .map(|(index, contents)| MailboxMessage::new(index, contents))
            .collect();

        Mailbox { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MailboxMessage> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MailboxMessage> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TWO_MESSAGES: &str = "From alice@example.com Mon Jan  1 10:00:00 2024\n\
Subject: First post\n\
Date: Mon, 1 Jan 2024 10:00:00 +0000\n\
From: alice@example.com\n\
\n\
Hello list.\n\
\n\
From bob@example.com Tue Jan  2 11:00:00 2024\n\
Subject: Re: First post\n\
Date: Tue, 2 Jan 2024 11:00:00 +0000\n\
From: bob@example.com\n\
\n\
Hi Alice.\n";

    #[test]
    fn test_open_reads_messages_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TWO_MESSAGES.as_bytes()).unwrap();

        let mailbox = Mailbox::open(file.path()).unwrap();
        assert_eq!(mailbox.len(), 2);

        let first = mailbox.get(0).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.subject(), Some("First post"));
        assert_eq!(first.date(), Some("Mon, 1 Jan 2024 10:00:00 +0000"));

        let second = mailbox.get(1).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.subject(), Some("Re: First post"));
        // The separator line belongs to the mbox framing, not to the message
        assert!(!String::from_utf8_lossy(second.as_bytes()).starts_with("From bob"));
    }

    #[test]
    fn test_date_header_is_kept_verbatim() {
        let mailbox = Mailbox::from_messages(vec![
            b"Subject: old\nDate: 12 Mar 1998 10:00 EST-ish garbage\n\nbody\n".to_vec(),
            b"Subject: offset\nDate: Mon, 1 Jan 2024 10:00:00 -0500\n\nbody\n".to_vec(),
        ]);

        assert_eq!(mailbox.get(0).unwrap().date(), Some("12 Mar 1998 10:00 EST-ish garbage"));
        assert_eq!(mailbox.get(1).unwrap().date(), Some("Mon, 1 Jan 2024 10:00:00 -0500"));
    }

    #[test]
    fn test_quoted_from_lines_are_unquoted() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"From carol@example.com Wed Jan  3 12:00:00 2024\n\
Subject: Quoting\n\
\n\
>From quoted line\n",
        )
        .unwrap();

        let mailbox = Mailbox::open(file.path()).unwrap();
        assert_eq!(mailbox.len(), 1);

        let body = String::from_utf8_lossy(mailbox.get(0).unwrap().as_bytes()).to_string();
        assert!(body.contains("\nFrom quoted line"));
        assert!(!body.contains(">From"));
        // The length limit applies to these unquoted bytes
        assert_eq!(mailbox.get(0).unwrap().len(), body.len());
    }

    #[test]
    fn test_open_missing_file_fails() {
        assert!(Mailbox::open(Path::new("/no/such/archive.mbox")).is_err());
    }

    #[test]
    fn test_message_without_headers() {
        let mailbox = Mailbox::from_messages(vec![b"\njust a body\n".to_vec()]);
        let message = mailbox.get(0).unwrap();
        assert_eq!(message.subject(), None);
        assert_eq!(message.date(), None);
        assert_eq!(message.len(), 13);
    }
}
