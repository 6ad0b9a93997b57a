#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not. Whatever
    // validates must also map into the runtime config.
    if let Ok(cfg) = bottle_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _ = bottle_core::BottleCfg::from(&cfg);
        }
    }
});
