#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(report) = serde_json::from_slice::<botgate_types::TestReport>(data) {
        let _ = botgate_app::render_markdown(&report);
    }
});
