// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Durable state: file stores and their in-memory managers.

/// In-memory mirrors with freshness-driven reloads.
pub mod managers;
/// Lock + stamp file store base.
pub mod storage;
/// One typed store per state file.
pub mod stores;
