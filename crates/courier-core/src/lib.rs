// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier delivery and caching core.
//!
//! This crate provides the data model, the workspace error type, and the
//! trait contracts for every external collaborator (remote document store,
//! local key-value store, connectivity signal, generation service, vector
//! search, cache store). Implementations live in the other workspace crates.

pub mod clock;
pub mod error;
pub mod ids;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::CourierError;
pub use ids::LocalIdGenerator;
pub use types::{
    CacheEntry, CacheType, CachedMessage, ConversationId, ConversationPreview, GenerationRequest,
    LocalId, MessageId, MessageReceipts, MessageStatus, Neighbor, Priority, QueuedMessage,
    ReceiptChange, RemoteAck, SearchFilter, UserId,
};

pub use traits::{
    CacheStore, ConnectivitySignal, GenerationService, KeyValueStore, ReceiptStream, RemoteStore,
    VectorSearch,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courier_error_has_all_variants() {
        let _config = CourierError::Config("test".into());
        let _storage = CourierError::storage(std::io::Error::other("test"));
        let _remote = CourierError::remote("503");
        let _generation = CourierError::generation("model overloaded");
        let _not_found = CourierError::NotFound {
            kind: "message",
            id: "m1".into(),
        };
        let _corrupted = CourierError::Corrupted {
            store: "outbox".into(),
            detail: "bad json".into(),
        };
        let _offline = CourierError::Offline;
        let _timeout = CourierError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = CourierError::Internal("test".into());
    }

    #[test]
    fn retryability_follows_error_kind() {
        assert!(CourierError::remote("503").is_retryable());
        assert!(
            !CourierError::Remote {
                message: "permission denied".into(),
                retryable: false,
            }
            .is_retryable()
        );
        assert!(CourierError::Offline.is_retryable());
        assert!(!CourierError::generation("bad").is_retryable());
    }

    #[test]
    fn ids_display_their_inner_value() {
        let conversation = ConversationId::from("conv-1");
        assert_eq!(conversation.to_string(), "conv-1");
        assert_eq!(UserId::from("alice").as_str(), "alice");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_remote<T: RemoteStore>() {}
        fn _assert_kv<T: KeyValueStore>() {}
        fn _assert_connectivity<T: ConnectivitySignal>() {}
        fn _assert_generation<T: GenerationService>() {}
        fn _assert_vector<T: VectorSearch>() {}
        fn _assert_cache_store<T: CacheStore>() {}
        fn _assert_clock<T: Clock>() {}
    }
}
