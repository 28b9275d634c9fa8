#![no_main]

use libfuzzer_sys::fuzz_target;
use ledger_oauth::ledger::{CodeRecord, TokenRecord};

fuzz_target!(|data: &[u8]| {
    // Gateway responses are untrusted. Parsing must never panic, and a
    // record without a stored hash must never match.
    if let Ok(record) = serde_json::from_slice::<CodeRecord>(data) {
        if record.code_hash.is_empty() {
            assert!(!record.matches_code(""));
        }
    }
    if let Ok(record) = serde_json::from_slice::<TokenRecord>(data) {
        if record.token_hash.is_empty() {
            assert!(!record.matches_token(""));
        }
        let _ = record.is_expired_at(record.issued_at);
    }
});
