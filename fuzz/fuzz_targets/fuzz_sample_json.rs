//! Fuzz target for sample line parsing.
//!
//! Series files are read line by line; a malformed line must surface as an
//! error, never a panic.

#![no_main]

use dc_common::Sample;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(sample) = serde_json::from_slice::<Sample>(data) {
        let _ = sample.f64("speed");
        let _ = sample.require_f64("soc");
    }
});
