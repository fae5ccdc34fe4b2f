// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector similarity search contract.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{Neighbor, SearchFilter};

/// Approximate nearest-neighbour search over stored message embeddings.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Returns up to `limit` neighbours of `vector` matching `filter`, best first.
    async fn nearest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>, CourierError>;
}
