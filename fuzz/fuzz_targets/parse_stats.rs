#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The statistics artifact comes from an external game server; the
    // parser has to survive whatever that process wrote.
    let _ = serde_json::from_slice::<botgate_types::GameStats>(data);
});
