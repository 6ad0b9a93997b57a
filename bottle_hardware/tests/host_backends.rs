use std::cell::Cell;
use std::time::Duration;

use bottle_hardware::error::HwError;
use bottle_hardware::util::wait_until_low_with_timeout;
use bottle_hardware::{FileStore, RetainedRam};
use bottle_traits::{RetainedMemory, Store};

#[test]
fn data_ready_wait_returns_once_line_drops() {
    // line reads high three times, then low
    let polls = Cell::new(0);
    let res = wait_until_low_with_timeout(
        || {
            polls.set(polls.get() + 1);
            polls.get() <= 3
        },
        Duration::from_millis(100),
        Duration::from_micros(100),
    );
    assert!(res.is_ok(), "{res:?}");
    assert_eq!(polls.get(), 4);
}

#[test]
fn data_ready_wait_times_out_on_stuck_line() {
    let err = wait_until_low_with_timeout(|| true, Duration::from_millis(3), Duration::from_micros(200))
        .unwrap_err();
    assert!(matches!(err, HwError::DataReadyTimeout), "{err:?}");
}

#[test]
fn file_store_overwrites_leave_no_temp_files() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = FileStore::open(tmp.path().join("nvs")).unwrap();
    for i in 0u8..5 {
        s.put("daily_state", &[i; 8]).unwrap();
        s.put_slot("drinks", u32::from(i), &[i]).unwrap();
    }
    assert_eq!(s.get("daily_state").unwrap(), Some(vec![4; 8]));

    let leftovers: Vec<_> = std::fs::read_dir(s.dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "new"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn retained_region_resize_refills_with_garbage() {
    let mut ram = RetainedRam::new();
    ram.region("activity", 2).copy_from_slice(&[7, 7]);
    let grown = ram.region("activity", 4).to_vec();
    assert_eq!(&grown[..2], &[7, 7]);
    assert_eq!(&grown[2..], &[bottle_hardware::retained::POWER_ON_FILL; 2]);
}
