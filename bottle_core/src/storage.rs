//! Typed access to the persistent store.
//!
//! Named records (calibration, daily state, drink-log metadata) and the drink
//! log slots are serde structs encoded with postcard. Decoding failures are
//! treated like missing records: stale or corrupt bytes never become state.

use bottle_traits::Store;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationData;
use crate::drinks::{DailyState, DrinkRecord};
use crate::error::{BottleError, Result};
use crate::hw_error::map_store_error;

pub const KEY_CALIBRATION: &str = "calibration";
pub const KEY_DAILY_STATE: &str = "daily_state";
pub const KEY_DRINK_LOG_META: &str = "drink_log_meta";
pub const AREA_DRINKS: &str = "drinks";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value)
        .map_err(|e| BottleError::PersistenceFailure(format!("encode: {e}")))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match postcard::from_bytes(bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding undecodable record");
            None
        }
    }
}

fn get_record<S: Store + ?Sized, T: DeserializeOwned>(store: &S, key: &str) -> Result<Option<T>> {
    let bytes = store.get(key).map_err(|e| map_store_error(&*e))?;
    Ok(bytes.and_then(|b| decode(key, &b)))
}

fn put_record<S: Store + ?Sized, T: Serialize>(store: &mut S, key: &str, value: &T) -> Result<()> {
    let bytes = encode(value)?;
    store.put(key, &bytes).map_err(|e| map_store_error(&*e))
}

pub fn load_calibration<S: Store + ?Sized>(store: &S) -> Result<Option<CalibrationData>> {
    get_record(store, KEY_CALIBRATION)
}

pub fn save_calibration<S: Store + ?Sized>(store: &mut S, cal: &CalibrationData) -> Result<()> {
    put_record(store, KEY_CALIBRATION, cal)
}

pub fn load_daily_state<S: Store + ?Sized>(store: &S) -> Result<Option<DailyState>> {
    get_record(store, KEY_DAILY_STATE)
}

pub fn save_daily_state<S: Store + ?Sized>(store: &mut S, state: &DailyState) -> Result<()> {
    put_record(store, KEY_DAILY_STATE, state)
}

/// Bookkeeping of the circular drink log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkLogMeta {
    /// Slot the next record is written to; always `< capacity`.
    pub write_index: u32,
    /// Records stored, saturating at capacity.
    pub count: u32,
    /// Id assigned to the next record.
    pub next_id: u32,
}

/// Fixed-capacity circular log of drink records in the store's slot area.
///
/// Appends overwrite the oldest slot once full. Ids increase monotonically
/// across wraparound.
#[derive(Debug, Clone)]
pub struct DrinkLog {
    capacity: u32,
    meta: DrinkLogMeta,
}

impl DrinkLog {
    /// Load metadata; a missing or corrupt record starts an empty log.
    pub fn open<S: Store + ?Sized>(store: &S, capacity: u32) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut meta: DrinkLogMeta = get_record(store, KEY_DRINK_LOG_META)?.unwrap_or_default();
        if meta.write_index >= capacity || meta.count > capacity {
            tracing::warn!(?meta, capacity, "drink log metadata out of range; resetting");
            meta = DrinkLogMeta::default();
        }
        if meta.next_id == 0 {
            meta.next_id = 1;
        }
        Ok(Self { capacity, meta })
    }

    pub fn meta(&self) -> DrinkLogMeta {
        self.meta
    }

    pub fn len(&self) -> u32 {
        self.meta.count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.count == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slot index of the oldest record.
    fn oldest_slot(&self) -> u32 {
        if self.meta.count < self.capacity {
            0
        } else {
            self.meta.write_index
        }
    }

    /// Append a record, assigning the next id. The metadata is only advanced
    /// after the slot write succeeds.
    pub fn append<S: Store + ?Sized>(&mut self, store: &mut S, mut record: DrinkRecord) -> Result<u32> {
        record.record_id = self.meta.next_id;
        let bytes = encode(&record)?;
        store
            .put_slot(AREA_DRINKS, self.meta.write_index, &bytes)
            .map_err(|e| map_store_error(&*e))?;

        let next = DrinkLogMeta {
            write_index: (self.meta.write_index + 1) % self.capacity,
            count: (self.meta.count + 1).min(self.capacity),
            next_id: self.meta.next_id.wrapping_add(1).max(1),
        };
        put_record(store, KEY_DRINK_LOG_META, &next)?;
        self.meta = next;
        Ok(record.record_id)
    }

    /// All records, oldest first. Undecodable slots are skipped.
    ///
    /// Ordered by `record_id`: an append whose slot write landed but whose
    /// metadata write failed leaves the newest record in the oldest slot.
    pub fn read_all<S: Store + ?Sized>(&self, store: &S) -> Result<Vec<(u32, DrinkRecord)>> {
        let mut out = Vec::with_capacity(self.meta.count as usize);
        let start = self.oldest_slot();
        for i in 0..self.meta.count {
            let slot = (start + i) % self.capacity;
            let bytes = store
                .get_slot(AREA_DRINKS, slot)
                .map_err(|e| map_store_error(&*e))?;
            if let Some(rec) = bytes.and_then(|b| decode::<DrinkRecord>(AREA_DRINKS, &b)) {
                out.push((slot, rec));
            }
        }
        out.sort_by_key(|(_, r)| r.record_id);
        Ok(out)
    }

    /// Rewrite a record in place (flag changes only).
    pub fn rewrite<S: Store + ?Sized>(&self, store: &mut S, slot: u32, record: &DrinkRecord) -> Result<()> {
        let bytes = encode(record)?;
        store
            .put_slot(AREA_DRINKS, slot, &bytes)
            .map_err(|e| map_store_error(&*e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drinks::DrinkKind;
    use crate::mocks::MemStore;

    fn rec(ts: u32, ml: i16) -> DrinkRecord {
        DrinkRecord {
            record_id: 0,
            timestamp: ts,
            amount_ml: ml,
            bottle_level_ml: 500,
            kind: DrinkKind::Gulp,
            synced: false,
            deleted: false,
        }
    }

    #[test]
    fn calibration_round_trips_through_store() {
        let mut store = MemStore::default();
        assert_eq!(load_calibration(&store).unwrap(), None);
        let cal = CalibrationData {
            scale_factor: 201.5,
            empty_adc: -3_000,
            full_adc: 164_000,
            timestamp: 1_700_000_000,
            valid: true,
        };
        save_calibration(&mut store, &cal).unwrap();
        assert_eq!(load_calibration(&store).unwrap(), Some(cal));
    }

    #[test]
    fn corrupt_record_reads_as_missing() {
        let mut store = MemStore::default();
        bottle_traits::Store::put(&mut store, KEY_CALIBRATION, &[0xff; 3]).unwrap();
        assert_eq!(load_calibration(&store).unwrap(), None);
    }

    #[test]
    fn log_wraps_and_keeps_ids_monotonic() {
        let mut store = MemStore::default();
        let mut log = DrinkLog::open(&store, 3).unwrap();
        for i in 0..5u32 {
            let id = log.append(&mut store, rec(100 + i, 40)).unwrap();
            assert_eq!(id, i + 1);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.meta().write_index, 2);
        let ids: Vec<u32> = log
            .read_all(&store)
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.record_id)
            .collect();
        assert_eq!(ids, vec![3, 4, 5]);

        let reopened = DrinkLog::open(&store, 3).unwrap();
        assert_eq!(reopened.meta(), log.meta());
    }

    #[test]
    fn failed_append_leaves_metadata_untouched() {
        let mut store = MemStore::default();
        let mut log = DrinkLog::open(&store, 10).unwrap();
        log.append(&mut store, rec(1, 40)).unwrap();
        store.fail_writes(true);
        assert!(matches!(
            log.append(&mut store, rec(2, 40)),
            Err(BottleError::PersistenceFailure(_))
        ));
        assert_eq!(log.len(), 1);
        assert_eq!(log.meta().next_id, 2);
    }

    /// Slot writes go through, named record writes fail.
    struct MetaWritesFail(MemStore);

    impl Store for MetaWritesFail {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, bottle_traits::BoxError> {
            self.0.get(key)
        }
        fn put(&mut self, _key: &str, _bytes: &[u8]) -> Result<(), bottle_traits::BoxError> {
            Err(std::io::Error::other("metadata sector bad").into())
        }
        fn get_slot(&self, area: &str, index: u32) -> Result<Option<Vec<u8>>, bottle_traits::BoxError> {
            self.0.get_slot(area, index)
        }
        fn put_slot(&mut self, area: &str, index: u32, bytes: &[u8]) -> Result<(), bottle_traits::BoxError> {
            self.0.put_slot(area, index, bytes)
        }
    }

    #[test]
    fn half_written_append_on_full_log_reads_in_id_order() {
        let mut store = MemStore::default();
        let mut log = DrinkLog::open(&store, 3).unwrap();
        for t in 0..3 {
            log.append(&mut store, rec(t, 40)).unwrap();
        }

        let mut flaky = MetaWritesFail(store.clone());
        assert!(log.append(&mut flaky, rec(10, 40)).is_err());
        assert_eq!(log.meta().write_index, 0);

        let ids: Vec<u32> = log
            .read_all(&store)
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.record_id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn out_of_range_metadata_resets() {
        let mut store = MemStore::default();
        let bad = DrinkLogMeta {
            write_index: 50,
            count: 2,
            next_id: 9,
        };
        put_record(&mut store, KEY_DRINK_LOG_META, &bad).unwrap();
        let log = DrinkLog::open(&store, 10).unwrap();
        assert_eq!(log.len(), 0);
        assert_eq!(log.meta().next_id, 1);
    }
}
