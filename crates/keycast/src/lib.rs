// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keycast: issues time-limited access keys to a broadcast channel and
//! reclaims them once they expire.

pub mod channel;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod provision;
pub mod retry;
pub mod run;
pub mod store;
pub mod test_support;
