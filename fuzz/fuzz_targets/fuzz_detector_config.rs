//! Fuzz target for detector configuration parsing (TOML and JSON).

#![no_main]

use dc_config::{validate_detector, DetectorConfig};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    for name in ["detector.toml", "detector.json"] {
        if let Ok(config) = DetectorConfig::parse(Path::new(name), content) {
            let _ = validate_detector(&config);
        }
    }
});
