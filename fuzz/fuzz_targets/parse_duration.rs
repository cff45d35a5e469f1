#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Restart delays in the health section go through humantime; any
    // invalid string must come back as an error, not a panic.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = humantime::parse_duration(s);
    }
});
