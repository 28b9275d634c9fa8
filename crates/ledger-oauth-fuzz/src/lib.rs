//! Fuzzing library for ledger-oauth.
//!
//! This crate provides fuzzing targets for the ledger record wire format and
//! redirect construction.
//!
//! # Usage
//!
//! ```bash
//! cd crates/ledger-oauth-fuzz
//! cargo +nightly fuzz run fuzz_record_parse -- -max_total_time=60
//! ```

pub use ledger_oauth::ledger::record;
