// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run ledger.

pub mod logger;

pub use logger::{AuditEvent, AuditLogger};
