// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation service fake that counts calls and tracks concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{CourierError, GenerationRequest, GenerationService};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<String, String>>,
    calls: Vec<GenerationRequest>,
    embeds: Vec<String>,
    failing_embeds: bool,
}

/// Generator returning canned text and recording every request.
///
/// Without scripted responses, `generate` answers `"{feature}: {input}"`.
/// `embed` hashes bytes into a small deterministic vector.
#[derive(Clone, Default)]
pub struct CountingGenerator {
    script: Arc<Mutex<Script>>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside each call (pair with a paused tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn respond_with(&self, text: impl Into<String>) {
        self.script().responses.push_back(Ok(text.into()));
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        self.script().responses.push_back(Err(message.into()));
    }

    pub fn set_failing_embeds(&self, failing: bool) {
        self.script().failing_embeds = failing;
    }

    pub fn generate_calls(&self) -> usize {
        self.script().calls.len()
    }

    pub fn calls_by_feature(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for call in &self.script().calls {
            *counts.entry(call.feature.clone()).or_default() += 1;
        }
        counts
    }

    /// Inputs seen by `generate`, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.script().calls.iter().map(|c| c.input.clone()).collect()
    }

    pub fn embed_calls(&self) -> usize {
        self.script().embeds.len()
    }

    /// Highest number of simultaneously running calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic 8-dimensional embedding of `input`.
pub fn fake_embedding(input: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in input.to_lowercase().bytes().enumerate() {
        v[(i + b as usize) % 8] += f32::from(b) / 255.0;
    }
    v
}

#[async_trait]
impl GenerationService for CountingGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CourierError> {
        let _in_flight = self.enter().await;
        let mut script = self.script();
        let answer = script
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(format!("{}: {}", request.feature, request.input)));
        script.calls.push(request);
        answer.map_err(CourierError::generation)
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, CourierError> {
        let _in_flight = self.enter().await;
        let mut script = self.script();
        script.embeds.push(input.to_string());
        if script.failing_embeds {
            return Err(CourierError::generation("embedding model unavailable"));
        }
        Ok(fake_embedding(input))
    }
}
