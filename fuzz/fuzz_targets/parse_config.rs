#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parse as TOML config - only attempt if valid UTF-8. Resolution over
    // defaults runs too, covering mode and duration parsing.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(file) = toml::from_str::<botgate_types::ConfigFile>(s) {
            let _ = file.resolve();
        }
    }
});
