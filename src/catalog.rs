//! src/catalog.rs
//!
//! Durable per-source JSON artifacts under the data directory. Every write
//! goes through a temp file + rename so readers never observe a partial
//! snapshot.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::common::errors::ScrapeError;
use crate::markets::types::{Listing, NameIdEntry, Snapshot, SourceTag};
use crate::net::metrics::MetricsSummary;

pub const NAME_IDS_FILE: &str = "item_nameids.json";
pub const OPPORTUNITIES_FILE: &str = "profitability_data.json";

/// Steam artifacts whose union forms the reference price table. The third
/// file is accepted when some external process drops it.
const REFERENCE_FILES: &[&str] = &[
    "steammarket_data.json",
    "steamlisting_data.json",
    "steamprice_data.json",
];

/// Catalog file as written: snapshot items wrapped with metadata.
#[derive(Debug, Serialize, Deserialize)]
struct WrappedSnapshot {
    platform: SourceTag,
    timestamp: String,
    total_items: usize,
    items: Vec<Listing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<Value>,
}

/// Accept both the wrapped object and a bare listing array on read.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped(WrappedSnapshot),
    Plain(Vec<Listing>),
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub source: SourceTag,
    pub captured_at: Option<String>,
    pub total_items: usize,
}

impl CatalogStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, ScrapeError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| ScrapeError::Config(format!("creating {}: {e}", data_dir.display())))?;
        Ok(CatalogStore { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_path(&self, source: SourceTag) -> PathBuf {
        self.data_dir.join(source.data_file())
    }

    /// Persist one adapter run. Returns the number of items written.
    pub fn save_snapshot(
        &self,
        snapshot: &Snapshot,
        metrics: Option<&MetricsSummary>,
    ) -> Result<usize, ScrapeError> {
        let wrapped = WrappedSnapshot {
            platform: snapshot.source,
            timestamp: snapshot.captured_at.to_rfc3339(),
            total_items: snapshot.items.len(),
            items: snapshot.items.clone(),
            metrics: metrics.and_then(|m| serde_json::to_value(m).ok()),
        };
        let path = self.snapshot_path(snapshot.source);
        self.write_atomic(&path, &wrapped)?;
        info!(
            "saved {} items for {} to {}",
            wrapped.total_items,
            snapshot.source,
            path.display()
        );
        Ok(wrapped.total_items)
    }

    /// Load one source's latest snapshot items; a missing file is an empty
    /// snapshot, a malformed one is logged and treated the same.
    pub fn load_items(&self, source: SourceTag) -> Vec<Listing> {
        let path = self.snapshot_path(source);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str::<CatalogFile>(&raw) {
            Ok(CatalogFile::Wrapped(w)) => w.items,
            Ok(CatalogFile::Plain(items)) => items,
            Err(e) => {
                warn!("unreadable catalog file {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    /// Freshness summary for one source's artifact, without materializing
    /// the listings.
    pub fn snapshot_info(&self, source: SourceTag) -> Option<SnapshotInfo> {
        let path = self.snapshot_path(source);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CatalogFile>(&raw) {
            Ok(CatalogFile::Wrapped(w)) => Some(SnapshotInfo {
                source,
                captured_at: Some(w.timestamp),
                total_items: w.total_items,
            }),
            Ok(CatalogFile::Plain(items)) => Some(SnapshotInfo {
                source,
                captured_at: None,
                total_items: items.len(),
            }),
            Err(_) => None,
        }
    }

    /// Reference price table: union of the Steam artifacts, keeping the
    /// highest price seen for each name.
    pub fn load_reference_table(&self) -> HashMap<String, f64> {
        let mut table: HashMap<String, f64> = HashMap::new();
        for file in REFERENCE_FILES {
            let path = self.data_dir.join(file);
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let items = match serde_json::from_str::<CatalogFile>(&raw) {
                Ok(CatalogFile::Wrapped(w)) => w.items,
                Ok(CatalogFile::Plain(items)) => items,
                Err(e) => {
                    warn!("skipping reference file {}: {e}", path.display());
                    continue;
                }
            };
            let mut loaded = 0usize;
            for item in items {
                if item.name.is_empty() || !(item.price.is_finite() && item.price > 0.0) {
                    continue;
                }
                let slot = table.entry(item.name).or_insert(0.0);
                if item.price > *slot {
                    *slot = item.price;
                    loaded += 1;
                }
            }
            debug!("loaded {loaded} reference prices from {file}");
        }
        info!("reference table holds {} unique items", table.len());
        table
    }

    pub fn load_name_ids(&self) -> Vec<NameIdEntry> {
        let path = self.data_dir.join(NAME_IDS_FILE);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("unreadable {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    /// Merge newly resolved name-ids over the existing artifact; fresh
    /// entries win on name collision.
    pub fn save_name_ids(&self, new_entries: &[NameIdEntry]) -> Result<usize, ScrapeError> {
        let mut by_name: HashMap<String, NameIdEntry> = self
            .load_name_ids()
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        for entry in new_entries {
            by_name.insert(entry.name.clone(), entry.clone());
        }
        let mut merged: Vec<NameIdEntry> = by_name.into_values().collect();
        merged.sort_by(|a, b| a.name.cmp(&b.name));
        let count = merged.len();
        self.write_atomic(&self.data_dir.join(NAME_IDS_FILE), &merged)?;
        Ok(count)
    }

    pub fn opportunities_path(&self) -> PathBuf {
        self.data_dir.join(OPPORTUNITIES_FILE)
    }

    pub fn read_json(&self, file_name: &str) -> Option<Value> {
        let path = self.data_dir.join(file_name);
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn write_json(&self, file_name: &str, value: &Value) -> Result<(), ScrapeError> {
        self.write_atomic(&self.data_dir.join(file_name), value)
    }

    /// Temp file in the same directory, then rename; rename within one
    /// directory is atomic on the platforms we care about.
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ScrapeError> {
        let tmp_path = path.with_extension(format!(
            "tmp.{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let write = || -> std::io::Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.flush()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ScrapeError::Cache(format!(
                "writing {}: {e}",
                path.display()
            )));
        }
        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            ScrapeError::Cache(format!("renaming into {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::types::Listing;

    fn store() -> (tempfile::TempDir, CatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn snapshot_round_trip() {
        let (_dir, store) = store();
        let items = vec![
            Listing::new(SourceTag::Waxpeer, "AK-47 | Redline", 12.5),
            Listing::new(SourceTag::Waxpeer, "AWP | Asiimov", 80.0).with_quantity(3),
        ];
        let snapshot = Snapshot::new(SourceTag::Waxpeer, items);
        assert_eq!(store.save_snapshot(&snapshot, None).unwrap(), 2);

        let loaded = store.load_items(SourceTag::Waxpeer);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "AK-47 | Redline");
        assert_eq!(loaded[1].quantity, Some(3));
    }

    #[test]
    fn bare_array_files_are_accepted() {
        let (dir, store) = store();
        let listing = Listing::new(SourceTag::Skinport, "M4A4 | Howl", 900.0);
        std::fs::write(
            dir.path().join("skinport_data.json"),
            serde_json::to_string(&vec![listing]).unwrap(),
        )
        .unwrap();
        assert_eq!(store.load_items(SourceTag::Skinport).len(), 1);
    }

    #[test]
    fn missing_and_malformed_files_load_empty() {
        let (dir, store) = store();
        assert!(store.load_items(SourceTag::Tradeit).is_empty());
        std::fs::write(dir.path().join("tradeit_data.json"), "{not json").unwrap();
        assert!(store.load_items(SourceTag::Tradeit).is_empty());
    }

    #[test]
    fn reference_table_unions_files_keeping_max() {
        let (_dir, store) = store();
        let market = Snapshot::new(
            SourceTag::SteamMarket,
            vec![
                Listing::new(SourceTag::SteamMarket, "A", 1.0),
                Listing::new(SourceTag::SteamMarket, "B", 2.0),
            ],
        );
        let listing = Snapshot::new(
            SourceTag::SteamListing,
            vec![
                Listing::new(SourceTag::SteamListing, "A", 1.5),
                Listing::new(SourceTag::SteamListing, "C", 0.5),
            ],
        );
        store.save_snapshot(&market, None).unwrap();
        store.save_snapshot(&listing, None).unwrap();

        let table = store.load_reference_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table["A"], 1.5); // max across files wins
        assert_eq!(table["B"], 2.0);
        assert_eq!(table["C"], 0.5);
    }

    #[test]
    fn snapshot_info_reports_freshness() {
        let (_dir, store) = store();
        assert!(store.snapshot_info(SourceTag::Empire).is_none());
        let snapshot = Snapshot::new(
            SourceTag::Empire,
            vec![Listing::new(SourceTag::Empire, "AWP | Asiimov", 80.0)],
        );
        store.save_snapshot(&snapshot, None).unwrap();
        let info = store.snapshot_info(SourceTag::Empire).unwrap();
        assert_eq!(info.total_items, 1);
        assert!(info.captured_at.is_some());
    }

    #[test]
    fn name_ids_merge_prefers_new_entries() {
        let (_dir, store) = store();
        store
            .save_name_ids(&[NameIdEntry {
                name: "A".into(),
                id: "1".into(),
                last_updated: 100.0,
            }])
            .unwrap();
        let count = store
            .save_name_ids(&[
                NameIdEntry {
                    name: "A".into(),
                    id: "9".into(),
                    last_updated: 200.0,
                },
                NameIdEntry {
                    name: "B".into(),
                    id: "2".into(),
                    last_updated: 200.0,
                },
            ])
            .unwrap();
        assert_eq!(count, 2);
        let loaded = store.load_name_ids();
        let a = loaded.iter().find(|e| e.name == "A").unwrap();
        assert_eq!(a.id, "9");
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let (dir, store) = store();
        let snapshot = Snapshot::new(
            SourceTag::White,
            vec![Listing::new(SourceTag::White, "X", 1.0)],
        );
        store.save_snapshot(&snapshot, None).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x != "json"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
