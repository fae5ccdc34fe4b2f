// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation service contract (LLM text completion and embeddings).

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::GenerationRequest;

/// Billed-per-call text and embedding generation. Calls may fail or time out.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produces text for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, CourierError>;

    /// Produces an embedding vector for `input`.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, CourierError>;
}
