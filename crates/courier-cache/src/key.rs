// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request fingerprints used as cache keys.
//!
//! Keys have the shape `conversation:{id}:{kind}:{digest}` so that deleting
//! the prefix `conversation:{id}:` drops every artifact of a conversation.
//! The digest covers the named request parameters after normalization, so
//! requests differing only in case or whitespace share an entry.

use courier_core::{CacheType, ConversationId};
use sha2::{Digest, Sha256};

/// Hex characters of the digest kept in a key.
const DIGEST_LEN: usize = 16;

/// Prefix shared by every key of `conversation`.
pub fn conversation_prefix(conversation: &ConversationId) -> String {
    format!("conversation:{conversation}:")
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for a conversation-scoped cache key.
#[derive(Debug, Clone)]
pub struct CacheKey {
    conversation: ConversationId,
    kind: CacheType,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(conversation: &ConversationId, kind: CacheType) -> Self {
        Self {
            conversation: conversation.clone(),
            kind,
            params: Vec::new(),
        }
    }

    /// Add a named parameter. Parameter order does not affect the key.
    pub fn param(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.params
            .push((name.to_string(), normalize(value.as_ref())));
        self
    }

    pub fn kind(&self) -> CacheType {
        self.kind
    }

    pub fn build(&self) -> String {
        let mut params: Vec<&(String, String)> = self.params.iter().collect();
        params.sort();

        let mut hasher = Sha256::new();
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hex::encode(hasher.finalize());
        format!(
            "{}{}:{}",
            conversation_prefix(&self.conversation),
            self.kind,
            &digest[..DIGEST_LEN]
        )
    }
}
