// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the store and the components that consume it.

pub mod storage;

pub use storage::BridgeStorage;
