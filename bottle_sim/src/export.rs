//! CSV export of the persisted drink log.

use std::path::Path;

use bottle_core::storage::DrinkLog;
use bottle_hardware::FileStore;
use eyre::WrapErr;
use serde::Serialize;

use crate::run::kind_name;

#[derive(Debug, Serialize)]
struct Row {
    record_id: u32,
    timestamp: u32,
    amount_ml: i16,
    bottle_level_ml: u16,
    kind: &'static str,
    synced: bool,
    deleted: bool,
}

/// Write every record, oldest first. Returns how many rows were written.
pub fn export_csv(state_dir: &Path, capacity: u32, out: &Path) -> eyre::Result<usize> {
    let store = FileStore::open(state_dir)
        .wrap_err_with(|| format!("open store at {}", state_dir.display()))?;
    let log = DrinkLog::open(&store, capacity)?;
    let records = log.read_all(&store)?;

    let mut w = csv::Writer::from_path(out)
        .wrap_err_with(|| format!("create {}", out.display()))?;
    for (_, r) in &records {
        w.serialize(Row {
            record_id: r.record_id,
            timestamp: r.timestamp,
            amount_ml: r.amount_ml,
            bottle_level_ml: r.bottle_level_ml,
            kind: kind_name(r.kind),
            synced: r.synced,
            deleted: r.deleted,
        })?;
    }
    w.flush()?;
    tracing::info!(rows = records.len(), path = %out.display(), "drink log exported");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_core::{DrinkKind, DrinkRecord};

    #[test]
    fn exports_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let mut store = FileStore::open(&state).unwrap();
        let mut log = DrinkLog::open(&store, 8).unwrap();
        for (i, ml) in [45i16, 120].into_iter().enumerate() {
            log.append(
                &mut store,
                DrinkRecord {
                    record_id: 0,
                    timestamp: 1_710_064_800 + i as u32 * 60,
                    amount_ml: ml,
                    bottle_level_ml: 500,
                    kind: if ml < 100 { DrinkKind::Gulp } else { DrinkKind::Pour },
                    synced: false,
                    deleted: false,
                },
            )
            .unwrap();
        }

        let csv_path = dir.path().join("drinks.csv");
        assert_eq!(export_csv(&state, 8, &csv_path).unwrap(), 2);
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("record_id,timestamp,amount_ml,bottle_level_ml,kind,synced,deleted")
        );
        assert_eq!(lines.next(), Some("1,1710064800,45,500,gulp,false,false"));
        assert_eq!(lines.next(), Some("2,1710064860,120,500,pour,false,false"));
    }
}
