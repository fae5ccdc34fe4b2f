// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::{ConversationId, CourierError, Neighbor, SearchFilter, VectorSearch};

struct Indexed {
    id: String,
    conversation_id: ConversationId,
    vector: Vec<f32>,
    metadata: serde_json::Value,
}

/// Brute-force cosine-similarity index.
#[derive(Clone, Default)]
pub struct InMemoryVectorIndex {
    items: Arc<Mutex<Vec<Indexed>>>,
    queries: Arc<Mutex<usize>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        id: impl Into<String>,
        conversation_id: impl Into<ConversationId>,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Indexed {
                id: id.into(),
                conversation_id: conversation_id.into(),
                vector,
                metadata,
            });
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[async_trait]
impl VectorSearch for InMemoryVectorIndex {
    async fn nearest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>, CourierError> {
        *self.queries.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<Neighbor> = items
            .iter()
            .filter(|item| {
                filter
                    .conversation_id
                    .as_ref()
                    .is_none_or(|c| *c == item.conversation_id)
            })
            .map(|item| Neighbor {
                id: item.id.clone(),
                score: cosine(vector, &item.vector),
                metadata: item.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_closest_first_within_filter() {
        let index = InMemoryVectorIndex::new();
        index.insert("a", "c1", vec![1.0, 0.0], json!({}));
        index.insert("b", "c1", vec![0.7, 0.7], json!({}));
        index.insert("c", "c2", vec![1.0, 0.0], json!({}));

        let filter = SearchFilter {
            conversation_id: Some("c1".into()),
        };
        let hits = index.nearest(&[1.0, 0.0], &filter, 5).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(index.query_count(), 1);
    }
}
