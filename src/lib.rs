// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Potchain - permissioned ledger with trust-weighted validator rotation.
//!
//! This repository provides:
//! - Deterministic binary codecs for transactions, blocks, and chains
//! - Cross-validator statistical voting over sensor transactions
//! - Periodic block sealing and hash-linked chain acceptance
//! - Trust-score propagation with idempotent event delivery
//! - Committee re-election ranked by accumulated trust
//! - Shared-file state with advisory locking for sibling worker processes

/// Core protocol primitives (types, codecs, state, security, consensus).
pub mod core;
/// Observability (metrics).
pub mod monitoring;
/// Networking stack (peer API, outbound RPC, simulation drivers).
pub mod networking;
