// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode flags shared by every subcommand.
//!
//! `main` records `--json` and `--quiet` in `XUPOPTER_JSON` / `XUPOPTER_QUIET`
//! so commands can check them without threading flags through.

use serde::Serialize;

pub fn is_json() -> bool {
    std::env::var("XUPOPTER_JSON").is_ok_and(|v| v == "1")
}

pub fn is_quiet() -> bool {
    std::env::var("XUPOPTER_QUIET").is_ok_and(|v| v == "1")
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// One-line status prefix: `[OK]` or `[!!]`.
pub fn mark(ok: bool) -> &'static str {
    if ok {
        "[OK]"
    } else {
        "[!!]"
    }
}
