//! Integration tests for runnr
//!
//! These tests drive the real bootstraps and need `node` and `python3` on
//! `PATH`. Run with: cargo test -p runnr --features integration-tests
//!
//! Toolchain tests need a compiler and are marked `#[ignore]`. To include them:
//!    cargo test -p runnr --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::sync::{Arc, Weak};

use runnr::{ExecutionRequest, ExecutionResult, Runnr};

mod facade;
mod javascript;
mod python;
mod toolchain;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Answer input requests from a fixed list, in order
pub(crate) fn answer_with(runnr: &Arc<Runnr>, answers: &[&str]) {
    let answers = std::sync::Mutex::new(
        answers
            .iter()
            .map(|a| a.to_string())
            .collect::<std::collections::VecDeque<_>>(),
    );
    let weak: Weak<Runnr> = Arc::downgrade(runnr);
    runnr.on_input_request(move |_request| {
        let answer = answers.lock().unwrap().pop_front().unwrap_or_default();
        if let Some(runnr) = weak.upgrade() {
            runnr.provide_input(answer);
        }
    });
}

pub(crate) async fn run(runnr: &Runnr, code: &str, language: &str) -> ExecutionResult {
    runnr
        .execute(&ExecutionRequest::new(code, language))
        .await
        .expect("run rejected")
}
