// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Xupopter runtime library: recipe-driven web extraction.
//!
//! Recipes enter through the HTTP API or a broker queue, wait in the
//! [`sequencer`], and run one at a time in the [`crawler`] engine against a
//! lazily launched, idle-reaped browser ([`renderer::lifecycle`]). Batch
//! results of file-origin recipes are uploaded and announced downstream
//! through [`dispatch`].

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod audit;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod dispatch;
pub mod events;
pub mod intake;
pub mod recipe;
pub mod renderer;
pub mod rest;
pub mod sequencer;
pub mod storage;
