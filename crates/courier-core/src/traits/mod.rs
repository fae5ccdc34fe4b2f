// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts for the external collaborators the core consumes.
//!
//! Every trait uses `#[async_trait]` so implementations can be shared as
//! `Arc<dyn Trait>` across tasks.

pub mod cache_store;
pub mod connectivity;
pub mod generation;
pub mod kv;
pub mod remote;
pub mod vector;

pub use cache_store::CacheStore;
pub use connectivity::ConnectivitySignal;
pub use generation::GenerationService;
pub use kv::KeyValueStore;
pub use remote::{ReceiptStream, RemoteStore};
pub use vector::VectorSearch;
