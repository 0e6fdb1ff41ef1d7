//! Deterministic providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, GenerationRequest, GenerativeModel, InMemoryTextStore, InMemoryVectorStore,
    RagConfig, RagError, RagPipeline, Result, RetryPolicy,
};

/// Words the keyword embedder knows about, one axis each.
pub const VOCABULARY: [&str; 10] =
    ["gst", "threshold", "registration", "bas", "lodge", "fbt", "car", "payroll", "super", "rate"];

/// Embeds text as normalised counts of [`VOCABULARY`] words. Text without
/// any known word maps to the zero vector, which is similar to nothing.
pub struct KeywordEmbedder {
    model: String,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::with_model("keyword-v1")
    }

    pub fn with_model(model: &str) -> Self {
        Self { model: model.to_string(), calls: AtomicUsize::new(0) }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; VOCABULARY.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if let Some(axis) = VOCABULARY.iter().position(|w| *w == word) {
                v[axis] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Returns the same vector for every input.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

/// Rate-limits the first `failures` calls, then behaves like [`KeywordEmbedder`].
pub struct FlakyEmbedder {
    failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self { failures, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(RagError::RateLimited { provider: "flaky".into(), retry_after_ms: Some(1) });
        }
        Ok(KeywordEmbedder::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn model(&self) -> &str {
        "keyword-v1"
    }
}

/// Fails on any text containing `poison`, embeds everything else.
pub struct PoisonEmbedder;

#[async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("poison") {
            return Err(RagError::EmbeddingError {
                provider: "poison".into(),
                message: "input rejected".into(),
            });
        }
        Ok(KeywordEmbedder::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn model(&self) -> &str {
        "keyword-v1"
    }
}

/// Rejects every request the way an API rejects an oversized input.
pub struct RejectingEmbedder {
    pub calls: AtomicUsize,
}

impl RejectingEmbedder {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for RejectingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::ProviderRejected {
            provider: "rejecting".into(),
            status: 400,
            message: "maximum context length exceeded".into(),
        })
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn model(&self) -> &str {
        "keyword-v1"
    }
}

/// Keyword embedder that holds each call open briefly and records the
/// highest number of calls in flight at once.
pub struct ConcurrencyTracker {
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for ConcurrencyTracker {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(KeywordEmbedder::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn model(&self) -> &str {
        "keyword-v1"
    }
}

/// Records every request and replies with a scripted answer.
pub struct SpyModel {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl SpyModel {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.to_string()), delay: None, requests: Mutex::new(Vec::new()) }
    }

    pub fn failing(message: &str) -> Self {
        Self { reply: Err(message.to_string()), delay: None, requests: Mutex::new(Vec::new()) }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::replying(reply) }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for SpyModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|message| RagError::GenerationError {
            provider: "spy".into(),
            message,
        })
    }

    fn name(&self) -> &str {
        "spy"
    }
}

/// Millisecond backoff so retries do not slow the suite down.
pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff_ms: 1, max_backoff_ms: 5, multiplier: 2.0 }
}

pub fn test_config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(500)
        .chunk_overlap(50)
        .top_k(8)
        .similarity_threshold(0.5)
        .retry(fast_retry(3))
        .build()
        .unwrap()
}

/// The stores and providers behind a test pipeline, kept for inspection.
pub struct Harness {
    pub pipeline: RagPipeline,
    pub vectors: Arc<InMemoryVectorStore>,
    pub texts: Arc<InMemoryTextStore>,
    pub model: Arc<SpyModel>,
}

pub fn harness(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<SpyModel>,
) -> Harness {
    let vectors = Arc::new(InMemoryVectorStore::new());
    let texts = Arc::new(InMemoryTextStore::new());
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(vectors.clone())
        .text_store(texts.clone())
        .generative_model(model.clone())
        .build()
        .unwrap();
    Harness { pipeline, vectors, texts, model }
}

/// `len` characters of filler text without any vocabulary word.
pub fn filler(len: usize) -> String {
    "lorem ipsum dolor sit amet ".chars().cycle().take(len).collect()
}
