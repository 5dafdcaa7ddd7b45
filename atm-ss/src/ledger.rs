//! Export/Append Sink
//!
//! The results ledger is an append-only CSV file holding one row per recorded
//! judgment across all participants. Each progress save appends only the
//! responses beyond the count stored before the save, so replaying a save
//! never duplicates rows.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use atm_common::time::to_iso;
use atm_common::ResponseRecord;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Ledger columns, in order
pub const LEDGER_COLUMNS: [&str; 8] = [
    "participant_id",
    "timestamp",
    "index",
    "manifest_index",
    "audio",
    "label",
    "filename",
    "response",
];

/// Quote a field containing a comma, double quote or line break, doubling
/// embedded quotes.
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Header line including the trailing newline
pub fn header_line() -> String {
    let mut line = LEDGER_COLUMNS.join(",");
    line.push('\n');
    line
}

/// One ledger line for `record`, including the trailing newline
pub fn format_row(record: &ResponseRecord) -> String {
    let fields = [
        record.participant_id.to_string(),
        to_iso(&record.timestamp),
        record.index.to_string(),
        record.manifest_index.to_string(),
        record.audio.clone(),
        record.label.clone(),
        record.filename.clone(),
        record.response.to_string(),
    ];
    let mut line = fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Responses not yet written, given the count stored before this save
pub fn new_rows(previous_len: usize, responses: &[ResponseRecord]) -> &[ResponseRecord] {
    responses.get(previous_len..).unwrap_or(&[])
}

/// Durable append-only CSV ledger
#[derive(Debug)]
pub struct LedgerSink {
    path: PathBuf,
    // Serializes writers within this process so rows never interleave
    write_lock: Mutex<()>,
}

impl LedgerSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the ledger with its header unless it already exists
    pub async fn ensure_header(&self) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_header_if_missing().await
    }

    async fn write_header_if_missing(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(mut file) => {
                file.write_all(header_line().as_bytes()).await?;
                file.flush().await?;
                debug!("Created results ledger {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Append `responses[previous_len..]`. Returns the number of rows written.
    pub async fn append_new(
        &self,
        previous_len: usize,
        responses: &[ResponseRecord],
    ) -> std::io::Result<usize> {
        let _guard = self.write_lock.lock().await;
        self.write_header_if_missing().await?;

        let rows = new_rows(previous_len, responses);
        if rows.is_empty() {
            return Ok(0);
        }

        let chunk: String = rows.iter().map(format_row).collect();
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(chunk.as_bytes()).await?;
        file.flush().await?;

        Ok(rows.len())
    }

    /// Full ledger contents, header included
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        self.ensure_header().await?;
        fs::read(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atm_common::{Judgment, ParticipantId};
    use chrono::{TimeZone, Utc};

    fn record(position: usize, label: &str) -> ResponseRecord {
        ResponseRecord {
            participant_id: ParticipantId::parse("k7m2p9x4q").unwrap(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, position as u32).unwrap(),
            index: position,
            manifest_index: position,
            audio: format!("alpha_data/{position}.wav"),
            label: label.to_string(),
            filename: format!("{position}.wav"),
            response: Judgment::Yes,
        }
    }

    /// Minimal RFC 4180 reader used to check that written rows parse back
    fn parse_csv(input: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                ('"', true) => in_quotes = false,
                ('"', false) if field.is_empty() => in_quotes = true,
                (',', false) => row.push(std::mem::take(&mut field)),
                ('\n', false) => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                (c, _) => field.push(c),
            }
        }
        rows
    }

    #[test]
    fn test_escape_plain_field_unchanged() {
        assert_eq!(escape_field("plain text"), "plain text");
        assert!(matches!(escape_field("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_quotes_and_separators() {
        assert_eq!(escape_field("Hello, \"World\"\n"), "\"Hello, \"\"World\"\"\n\"");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("line\r\nbreak"), "\"line\r\nbreak\"");
    }

    #[test]
    fn test_escaped_row_parses_back() {
        let label = "Hello, \"World\"\n";
        let line = format_row(&record(0, label));
        let parsed = parse_csv(&line);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), LEDGER_COLUMNS.len());
        assert_eq!(parsed[0][5], label);
        assert_eq!(parsed[0][1], "2024-05-01T12:00:00.000Z");
        assert_eq!(parsed[0][7], "Yes");
    }

    #[test]
    fn test_new_rows_suffix() {
        let responses = vec![record(0, "a"), record(1, "b"), record(2, "c")];
        assert_eq!(new_rows(0, &responses).len(), 3);
        assert_eq!(new_rows(2, &responses)[0].label, "c");
        assert!(new_rows(3, &responses).is_empty());
        assert!(new_rows(10, &responses).is_empty());
    }

    #[tokio::test]
    async fn test_append_initializes_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LedgerSink::new(dir.path().join("results.csv"));

        let written = sink.append_new(0, &[record(0, "a")]).await.unwrap();
        assert_eq!(written, 1);

        let content = String::from_utf8(sink.read_all().await.unwrap()).unwrap();
        let rows = parse_csv(&content);
        assert_eq!(rows[0], LEDGER_COLUMNS.map(String::from).to_vec());
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_append_with_tracked_length_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LedgerSink::new(dir.path().join("results.csv"));
        let responses = vec![record(0, "a"), record(1, "b")];

        // The caller tracks the stored response count between saves
        let mut stored_len = 0;
        for _ in 0..2 {
            sink.append_new(stored_len, &responses).await.unwrap();
            stored_len = responses.len();
        }

        let mut longer = responses.clone();
        longer.push(record(2, "c"));
        assert_eq!(sink.append_new(stored_len, &longer).await.unwrap(), 1);
        assert_eq!(sink.append_new(longer.len(), &longer).await.unwrap(), 0);

        let content = String::from_utf8(sink.read_all().await.unwrap()).unwrap();
        let rows = parse_csv(&content);
        assert_eq!(rows.len(), 4); // header + 3 rows
        let labels: Vec<&str> = rows[1..].iter().map(|r| r[5].as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_read_all_creates_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LedgerSink::new(dir.path().join("data").join("results.csv"));
        let content = sink.read_all().await.unwrap();
        assert_eq!(content, header_line().into_bytes());
    }
}
