//! Append-only search history, one JSON document per line.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Provenance, RankedAggregation, RankedOffer, SearchQuery};

const HISTORY_DIR: &str = "freight-offer-scanner";
const HISTORY_FILENAME: &str = "history.jsonl";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// One ranked search as shown to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// RFC 3339, UTC.
    pub recorded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub query: SearchQuery,
    pub provenance: Provenance,
    #[serde(default)]
    pub errors: Vec<String>,
    pub offers: Vec<RankedOffer>,
}

impl HistoryEntry {
    pub fn new(
        agent_id: Option<String>,
        query: SearchQuery,
        ranked: &RankedAggregation,
    ) -> Result<Self, HistoryError> {
        Ok(Self {
            id: Uuid::new_v4(),
            recorded_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            agent_id,
            query,
            provenance: ranked.provenance,
            errors: ranked.errors.clone(),
            offers: ranked.offers.clone(),
        })
    }

    pub fn recorded_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.recorded_at, &Rfc3339).ok()
    }
}

#[derive(Clone, Debug)]
pub struct SearchHistory {
    path: PathBuf,
}

impl SearchHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_DIR)
            .join(HISTORY_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// All readable entries, oldest first. Corrupt lines are skipped.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = index + 1, "skipping corrupt history entry: {e}"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{aggregate, AgentConfig, Offer, SourceResult};

    fn temp_history() -> SearchHistory {
        SearchHistory::new(
            std::env::temp_dir()
                .join(format!("history-{}", Uuid::new_v4()))
                .join(HISTORY_FILENAME),
        )
    }

    fn ranked() -> RankedAggregation {
        let offer = Offer {
            id: Some("h-1".into()),
            ..Offer::default()
        };
        aggregate(
            vec![
                SourceResult::ok("transeu", vec![offer]),
                SourceResult::err("timocom", "502 bad gateway".to_string()),
            ],
            Vec::new,
        )
        .rank(&AgentConfig::default())
    }

    #[test]
    fn missing_history_reads_empty() {
        assert!(temp_history().read_all().unwrap().is_empty());
    }

    #[test]
    fn entries_round_trip_in_order() {
        let history = temp_history();
        let query = SearchQuery {
            origin: Some("Wrocław".into()),
            ..SearchQuery::default()
        };

        let first = HistoryEntry::new(Some("agent-7".into()), query.clone(), &ranked()).unwrap();
        let second = HistoryEntry::new(None, SearchQuery::default(), &ranked()).unwrap();
        history.append(&first).unwrap();
        history.append(&second).unwrap();

        let entries = history.read_all().unwrap();
        assert_eq!(entries, vec![first.clone(), second]);
        assert_eq!(entries[0].provenance, Provenance::Partial);
        assert_eq!(entries[0].errors, vec!["timocom: 502 bad gateway".to_string()]);
        assert!(first.recorded_at().is_some());

        if let Some(dir) = history.path().parent() {
            fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let history = temp_history();
        let entry = HistoryEntry::new(None, SearchQuery::default(), &ranked()).unwrap();
        history.append(&entry).unwrap();
        let mut file = OpenOptions::new().append(true).open(history.path()).unwrap();
        writeln!(file, "{{ broken").unwrap();
        history.append(&entry).unwrap();

        assert_eq!(history.read_all().unwrap().len(), 2);

        if let Some(dir) = history.path().parent() {
            fs::remove_dir_all(dir).ok();
        }
    }
}
