use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::Result;

use super::ledger::{FeedHistory, Ledger, SchemaVersion, HISTORY_SLOTS, SCHEMA_VERSION};

/// Loads and saves the [`Ledger`] as a CSV table packaged in a zip archive.
///
/// Columns: `feed_url`, `saved_item_link_latest_0` .. `_9`, `updated_time`,
/// `rss_database_version`. On save, the raw `.csv` is written next to the
/// archive as well; on load, only the archive is consulted (or the plain
/// file, when the configured path does not end in `.zip`).
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the persisted table. A missing file is the normal first-ever
    /// run and yields an empty ledger, as does a table that fails the
    /// schema compatibility check. Corrupt files are an error.
    pub fn load(&self) -> Result<Ledger> {
        if !self.path.exists() {
            tracing::info!("No database at {}, starting fresh", self.path.display());
            return Ok(Ledger::new());
        }

        let raw = self.read_table()?;
        let mut reader = csv::Reader::from_reader(raw.as_slice());
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let feed_url_col = column("feed_url");
        let version_col = column("rss_database_version");
        let updated_col = column("updated_time");
        let link_cols: Vec<Option<usize>> = (0..HISTORY_SLOTS)
            .map(|slot| column(&format!("saved_item_link_latest_{slot}")))
            .collect();

        let mut ledger = Ledger::new();
        let mut stored_version: Option<String> = None;

        for record in reader.records() {
            let record = record?;
            let cell = |col: Option<usize>| {
                col.and_then(|i| record.get(i))
                    .filter(|value| !value.is_empty())
            };

            let Some(feed_url) = cell(feed_url_col) else {
                continue;
            };
            if stored_version.is_none() {
                stored_version = Some(cell(version_col).unwrap_or_default().to_string());
            }

            let mut recent_links: [Option<String>; HISTORY_SLOTS] = Default::default();
            for (slot, col) in link_cols.iter().enumerate() {
                recent_links[slot] = cell(*col).map(str::to_string);
            }

            ledger.insert_row(
                feed_url.to_string(),
                FeedHistory {
                    recent_links,
                    updated_time: cell(updated_col).and_then(parse_timestamp),
                    schema_version: cell(version_col).unwrap_or(SCHEMA_VERSION).to_string(),
                },
            );
        }

        // Absent version column means the legacy layout; any major other
        // than the current one invalidates the whole table.
        let version = match (version_col, stored_version) {
            (None, _) => SchemaVersion::V1,
            (Some(_), stored) => SchemaVersion::parse(stored.as_deref()),
        };
        if ledger.is_empty() || !version.is_compatible() {
            if !ledger.is_empty() {
                tracing::warn!(
                    "Database at {} has an incompatible schema, starting fresh",
                    self.path.display()
                );
            }
            return Ok(Ledger::new());
        }

        tracing::debug!("Loaded {} feeds from {}", ledger.len(), self.path.display());
        Ok(ledger)
    }

    /// Writes the full table back, sorted by feed URL, overwriting both the
    /// raw CSV and the archive.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["feed_url".to_string()];
        header.extend((0..HISTORY_SLOTS).map(|slot| format!("saved_item_link_latest_{slot}")));
        header.push("updated_time".to_string());
        header.push("rss_database_version".to_string());
        writer.write_record(&header)?;

        for (feed_url, row) in ledger.rows() {
            let mut record = vec![feed_url.clone()];
            record.extend(
                row.recent_links
                    .iter()
                    .map(|link| link.clone().unwrap_or_default()),
            );
            record.push(
                row.updated_time
                    .map(|time| time.to_rfc3339())
                    .unwrap_or_default(),
            );
            record.push(row.schema_version.clone());
            writer.write_record(&record)?;
        }

        let table = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush database csv: {e}"))?;

        let csv_path = self.path.with_extension("csv");
        std::fs::write(&csv_path, &table)?;

        if self.path.extension().is_some_and(|ext| ext == "zip") {
            let csv_name = csv_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "rss_database.csv".to_string());

            let mut archive = ZipWriter::new(File::create(&self.path)?);
            archive.start_file(csv_name, SimpleFileOptions::default())?;
            archive.write_all(&table)?;
            archive.finish()?;
        }

        tracing::debug!("Saved {} feeds to {}", ledger.len(), self.path.display());
        Ok(())
    }

    fn read_table(&self) -> Result<Vec<u8>> {
        if self.path.extension().is_some_and(|ext| ext == "zip") {
            let mut archive = ZipArchive::new(File::open(&self.path)?)?;
            let entry_name = archive
                .file_names()
                .find(|name| name.ends_with(".csv"))
                .map(str::to_string)
                .ok_or_else(|| {
                    anyhow::anyhow!("No csv entry in archive {}", self.path.display())
                })?;

            let mut table = Vec::new();
            archive.by_name(&entry_name)?.read_to_end(&mut table)?;
            Ok(table)
        } else {
            Ok(std::fs::read(&self.path)?)
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .ok()
}
