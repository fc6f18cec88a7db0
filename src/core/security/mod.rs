// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Security: node identity and signature verification.

/// File-backed Ed25519 identity.
pub mod keystore;
