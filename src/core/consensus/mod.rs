// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! The Proof-of-Trust protocols and their worker loops.

/// Committee re-election loop.
pub mod agreement;
/// Periodic block sealing loop.
pub mod block_maker;
/// The orchestrating engine.
pub mod engine;
/// Statistical plausibility loop.
pub mod verifier;
