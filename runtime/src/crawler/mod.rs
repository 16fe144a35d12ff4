// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recipe execution: the interpreter, its record buffer and artifact layout.

pub mod artifacts;
pub mod buffer;
pub mod engine;

pub use engine::{Engine, EngineError, EngineSettings, RunReport, RunStatus};
