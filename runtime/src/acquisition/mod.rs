// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP acquisition: the shared client and the on-disk retrieval cache.

pub mod cache;
pub mod http_client;
