//! In-memory sensors, store and retained memory for tests and simulation.
//!
//! Handles are cheap clones sharing one state, so a test can keep a handle
//! and steer a device that owns the other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use bottle_traits::{Accelerometer, BoxError, LoadCell, RetainedMemory, Store};

use crate::measurement::{Measure, WeightMeasurement};

fn with<T, R>(m: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut g = m.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut g)
}

#[derive(Debug, Default)]
struct CellScript {
    values: Vec<i32>,
    next: usize,
    ready: bool,
    failing: bool,
}

/// Load cell replaying a value sequence in a loop.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCell {
    inner: Arc<Mutex<CellScript>>,
}

impl ScriptedCell {
    pub fn cycle(values: Vec<i32>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellScript {
                values,
                next: 0,
                ready: true,
                failing: false,
            })),
        }
    }

    pub fn constant(v: i32) -> Self {
        Self::cycle(vec![v])
    }

    /// Always ready, every read fails.
    pub fn failing() -> Self {
        let c = Self::cycle(Vec::new());
        c.set_failing(true);
        c
    }

    pub fn set_ready(&self, ready: bool) {
        with(&self.inner, |s| s.ready = ready);
    }

    pub fn set_failing(&self, failing: bool) {
        with(&self.inner, |s| s.failing = failing);
    }

    /// Replace the script with a constant value.
    pub fn set_value(&self, v: i32) {
        with(&self.inner, |s| {
            s.values = vec![v];
            s.next = 0;
        });
    }
}

impl LoadCell for ScriptedCell {
    fn is_ready(&mut self) -> bool {
        with(&self.inner, |s| s.ready)
    }

    fn read(&mut self) -> Result<i32, BoxError> {
        with(&self.inner, |s| {
            if s.failing || s.values.is_empty() {
                return Err(std::io::Error::other("scripted load-cell failure").into());
            }
            let v = s.values[s.next % s.values.len()];
            s.next = s.next.wrapping_add(1);
            Ok(v)
        })
    }
}

/// Accelerometer returning a settable raw reading.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAccel {
    inner: Arc<Mutex<Option<[i16; 3]>>>,
}

impl ScriptedAccel {
    pub fn new(raw: [i16; 3]) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(raw))),
        }
    }

    /// Raw counts for upright at 1 g = 16384.
    pub fn upright() -> Self {
        Self::new([0, 0, 16_384])
    }

    pub fn set(&self, raw: [i16; 3]) {
        with(&self.inner, |s| *s = Some(raw));
    }

    /// Make subsequent reads fail.
    pub fn disconnect(&self) {
        with(&self.inner, |s| *s = None);
    }
}

impl Accelerometer for ScriptedAccel {
    fn read_raw(&mut self) -> Result<[i16; 3], BoxError> {
        with(&self.inner, |s| {
            s.ok_or_else(|| std::io::Error::other("accelerometer disconnected").into())
        })
    }
}

#[derive(Debug, Default)]
struct MemInner {
    records: HashMap<String, Vec<u8>>,
    slots: HashMap<(String, u32), Vec<u8>>,
    fail_writes: bool,
    fail_reads: bool,
    writes: usize,
}

/// Store backed by hash maps with switchable failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemStore {
    pub fn fail_writes(&self, on: bool) {
        with(&self.inner, |s| s.fail_writes = on);
    }

    pub fn fail_reads(&self, on: bool) {
        with(&self.inner, |s| s.fail_reads = on);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        with(&self.inner, |s| s.writes)
    }
}

impl Store for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        with(&self.inner, |s| {
            if s.fail_reads {
                return Err(std::io::Error::other("injected read failure").into());
            }
            Ok(s.records.get(key).cloned())
        })
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), BoxError> {
        with(&self.inner, |s| {
            if s.fail_writes {
                return Err(std::io::Error::other("injected write failure").into());
            }
            s.records.insert(key.to_string(), bytes.to_vec());
            s.writes += 1;
            Ok(())
        })
    }

    fn get_slot(&self, area: &str, index: u32) -> Result<Option<Vec<u8>>, BoxError> {
        with(&self.inner, |s| {
            if s.fail_reads {
                return Err(std::io::Error::other("injected read failure").into());
            }
            Ok(s.slots.get(&(area.to_string(), index)).cloned())
        })
    }

    fn put_slot(&mut self, area: &str, index: u32, bytes: &[u8]) -> Result<(), BoxError> {
        with(&self.inner, |s| {
            if s.fail_writes {
                return Err(std::io::Error::other("injected write failure").into());
            }
            s.slots.insert((area.to_string(), index), bytes.to_vec());
            s.writes += 1;
            Ok(())
        })
    }
}

/// `Measure` that replays queued measurements and a settable raw value.
/// An empty queue yields an invalid measurement.
#[derive(Debug, Clone, Default)]
pub struct FakeMeasure {
    queue: VecDeque<WeightMeasurement>,
    raw: Option<i32>,
}

impl FakeMeasure {
    pub fn push_measurement(&mut self, m: WeightMeasurement) {
        self.queue.push_back(m);
    }

    pub fn set_raw(&mut self, raw: Option<i32>) {
        self.raw = raw;
    }
}

impl Measure for FakeMeasure {
    fn measure(&mut self) -> WeightMeasurement {
        self.queue.pop_front().unwrap_or_else(WeightMeasurement::invalid)
    }

    fn read_raw(&mut self) -> Option<i32> {
        self.raw
    }
}

/// Retained memory as plain heap buffers. Fresh regions hold a junk
/// pattern, as real RAM does after power-up.
#[derive(Debug, Default)]
pub struct RetainedBuf {
    regions: HashMap<&'static str, Vec<u8>>,
}

impl RetainedMemory for RetainedBuf {
    fn region(&mut self, name: &'static str, len: usize) -> &mut [u8] {
        let r = self.regions.entry(name).or_default();
        if r.len() != len {
            r.resize(len, 0xA5);
        }
        r.as_mut_slice()
    }
}
