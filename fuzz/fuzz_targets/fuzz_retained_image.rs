#![no_main]
use bottle_core::{ActivityCfg, ActivityRecorder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Retained RAM holds arbitrary bytes after power-up; restoring must
    // either accept a well-formed image or start empty.
    let cfg = ActivityCfg {
        motion_log_capacity: 8,
        session_log_capacity: 4,
    };
    let mut region = vec![0u8; ActivityRecorder::encoded_len(cfg)];
    let n = region.len().min(data.len());
    region[..n].copy_from_slice(&data[..n]);

    let rec = ActivityRecorder::restore(&region, cfg);
    assert!(rec.motion_events().len() <= cfg.motion_log_capacity);
    assert!(rec.sessions().len() <= cfg.session_log_capacity);

    let mut again = vec![0u8; region.len()];
    rec.persist(&mut again);
    let back = ActivityRecorder::restore(&again, cfg);
    assert_eq!(back.motion_page(0, 100), rec.motion_page(0, 100));
});
