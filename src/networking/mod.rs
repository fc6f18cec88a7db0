// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: the peer API surface and the outbound RPC client.

pub mod api;
pub mod client;
pub mod dumper;
pub mod scenario;
