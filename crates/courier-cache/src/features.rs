// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generated conversation artifacts served through the response cache.
//!
//! Every helper fingerprints its inputs into a conversation-scoped key, so
//! [`CachedFeatures::invalidate_conversation`] drops all of them when the
//! conversation's messages change.

use std::sync::Arc;

use courier_core::{
    CacheType, ConversationId, CourierError, GenerationRequest, GenerationService, Neighbor,
    Priority, SearchFilter, VectorSearch,
};

use crate::cache::ResponseCache;
use crate::key::{CacheKey, conversation_prefix};

/// Cached wrappers around the generation and vector search services.
#[derive(Clone)]
pub struct CachedFeatures {
    cache: Arc<ResponseCache>,
    generator: Arc<dyn GenerationService>,
    vectors: Arc<dyn VectorSearch>,
}

impl CachedFeatures {
    pub fn new(
        cache: Arc<ResponseCache>,
        generator: Arc<dyn GenerationService>,
        vectors: Arc<dyn VectorSearch>,
    ) -> Self {
        Self {
            cache,
            generator,
            vectors,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    async fn generate(&self, feature: &str, input: &str) -> Result<String, CourierError> {
        self.generator
            .generate(GenerationRequest {
                feature: feature.to_string(),
                input: input.to_string(),
            })
            .await
    }

    pub async fn summarize(
        &self,
        conversation: &ConversationId,
        transcript: &str,
    ) -> Result<String, CourierError> {
        let key = CacheKey::new(conversation, CacheType::Summary)
            .param("transcript", transcript)
            .build();
        self.cache
            .get(&key, CacheType::Summary, || self.generate("summary", transcript), None)
            .await
    }

    pub async fn extract_decisions(
        &self,
        conversation: &ConversationId,
        transcript: &str,
    ) -> Result<Vec<String>, CourierError> {
        let key = CacheKey::new(conversation, CacheType::Decisions)
            .param("transcript", transcript)
            .build();
        self.cache
            .get(
                &key,
                CacheType::Decisions,
                || async {
                    let text = self.generate("decisions", transcript).await?;
                    Ok::<_, CourierError>(parse_list(&text))
                },
                None,
            )
            .await
    }

    pub async fn action_items(
        &self,
        conversation: &ConversationId,
        transcript: &str,
    ) -> Result<Vec<String>, CourierError> {
        let key = CacheKey::new(conversation, CacheType::ActionItems)
            .param("transcript", transcript)
            .build();
        self.cache
            .get(
                &key,
                CacheType::ActionItems,
                || async {
                    let text = self.generate("action_items", transcript).await?;
                    Ok::<_, CourierError>(parse_list(&text))
                },
                None,
            )
            .await
    }

    /// Suggested reply to the latest messages.
    pub async fn suggest_reply(
        &self,
        conversation: &ConversationId,
        recent_messages: &str,
    ) -> Result<String, CourierError> {
        let key = CacheKey::new(conversation, CacheType::AiReply)
            .param("recent", recent_messages)
            .build();
        self.cache
            .get(
                &key,
                CacheType::AiReply,
                || self.generate("suggest_reply", recent_messages),
                None,
            )
            .await
    }

    /// Urgency of one message, from the generated label.
    pub async fn classify_priority(
        &self,
        conversation: &ConversationId,
        message_text: &str,
    ) -> Result<Priority, CourierError> {
        let key = CacheKey::new(conversation, CacheType::Priority)
            .param("message", message_text)
            .build();
        self.cache
            .get(
                &key,
                CacheType::Priority,
                || async {
                    let label = self.generate("priority", message_text).await?;
                    Ok::<_, CourierError>(parse_priority(&label))
                },
                None,
            )
            .await
    }

    /// Semantic search within one conversation: embed the query, then look up neighbours.
    pub async fn smart_search(
        &self,
        conversation: &ConversationId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Neighbor>, CourierError> {
        let key = CacheKey::new(conversation, CacheType::SearchResults)
            .param("query", query)
            .param("limit", limit.to_string())
            .build();
        self.cache
            .get(
                &key,
                CacheType::SearchResults,
                || async {
                    let vector = self.generator.embed(query).await?;
                    let filter = SearchFilter {
                        conversation_id: Some(conversation.clone()),
                    };
                    self.vectors.nearest(&vector, &filter, limit).await
                },
                None,
            )
            .await
    }

    /// Drop every cached artifact of the conversation.
    pub async fn invalidate_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<usize, CourierError> {
        self.cache
            .invalidate_pattern(&conversation_prefix(conversation))
            .await
    }
}

/// One item per non-empty line, with bullet or number markers stripped.
fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_marker(line.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn strip_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0
        && let Some(rest) = line[digits..].strip_prefix(['.', ')'])
    {
        return rest.trim_start();
    }
    line
}

/// Defaults to medium when the label is not recognized.
fn parse_priority(text: &str) -> Priority {
    let label = text.trim().to_lowercase();
    if label.starts_with("high") || label.contains("urgent") {
        Priority::High
    } else if label.starts_with("low") {
        Priority::Low
    } else {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_strips_markers() {
        let text = "- Ship on Friday\n* Use Postgres\n\n3. Hire a designer\n2) Cut scope\n";
        assert_eq!(
            parse_list(text),
            ["Ship on Friday", "Use Postgres", "Hire a designer", "Cut scope"]
        );
        assert_eq!(parse_list("2025 budget approved"), ["2025 budget approved"]);
    }

    #[test]
    fn priority_labels() {
        assert_eq!(parse_priority("High"), Priority::High);
        assert_eq!(parse_priority("this is URGENT"), Priority::High);
        assert_eq!(parse_priority(" low\n"), Priority::Low);
        assert_eq!(parse_priority("unsure"), Priority::Medium);
    }
}
