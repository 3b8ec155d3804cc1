//! Injectable ports: the seams command handlers and infrastructure code
//! depend on instead of talking to the outside world directly.
//!
//! Following the teacher's preference for small `async-trait` seams over
//! ambient globals, each port is a trait with a production implementation
//! and a deterministic test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Source of wall-clock time, injected so tests can control timestamps.
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of new identifiers, injected so tests can assert on ids.
pub trait IdGen: Send + Sync {
    /// Generate a new unique id
    fn new_id(&self) -> Uuid;
}

/// Real random UUIDv4 generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGen;

impl IdGen for UuidGen {
    fn new_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic sequential id generator for tests: produces UUIDs built
/// from an incrementing counter so assertions can name expected ids.
#[derive(Debug, Default)]
pub struct SequentialIdGen {
    counter: AtomicU64,
}

impl IdGen for SequentialIdGen {
    fn new_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }
}

/// Result of a content-generation request to the external AI provider this
/// crate's aggregates track but do not themselves call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneratedContent {
    /// Provider-assigned identifier for this generation, for audit/replay
    pub provider_request_id: String,
    /// Generated body text
    pub body: String,
}

/// Abstraction over the external AI content provider. Command handlers for
/// `RequestContentGeneration` and `RequestAiDetection` depend on this trait,
/// never on a concrete HTTP client, keeping the aggregate store testable
/// without network access. Calling and wiring a real provider is outside
/// this crate's scope; this port only defines the seam.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Request generation of content for the given topic/prompt
    async fn generate(&self, prompt: &str) -> Result<GeneratedContent, String>;

    /// Request an AI-authorship detection score (0.0-1.0) for the given text
    async fn detect_ai_authorship(&self, text: &str) -> Result<f64, String>;
}

/// No-op provider for tests: returns a deterministic canned response.
#[derive(Debug, Clone, Default)]
pub struct NoopContentProvider;

#[async_trait]
impl ContentProvider for NoopContentProvider {
    async fn generate(&self, prompt: &str) -> Result<GeneratedContent, String> {
        Ok(GeneratedContent {
            provider_request_id: format!("noop-{prompt}"),
            body: format!("generated: {prompt}"),
        })
    }

    async fn detect_ai_authorship(&self, _text: &str) -> Result<f64, String> {
        Ok(0.0)
    }
}

/// Bundle of ports an aggregate repository and command handlers need,
/// grouped so wiring code passes one value instead of three.
#[derive(Clone)]
pub struct Ports {
    /// Clock port
    pub clock: Arc<dyn Clock>,
    /// Id generator port
    pub id_gen: Arc<dyn IdGen>,
    /// Content provider port
    pub content_provider: Arc<dyn ContentProvider>,
}

impl Ports {
    /// Production bundle: real clock, real random ids, no-op content
    /// provider (callers embedding this crate supply their own provider).
    pub fn production(content_provider: Arc<dyn ContentProvider>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            id_gen: Arc::new(UuidGen),
            content_provider,
        }
    }

    /// Deterministic bundle for tests.
    pub fn test_fixture(now: DateTime<Utc>) -> Self {
        Self {
            clock: Arc::new(FixedClock(now)),
            id_gen: Arc::new(SequentialIdGen::default()),
            content_provider: Arc::new(NoopContentProvider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_returns_same_instant() {
        let now = Utc::now();
        let clock = FixedClock(now);
        assert_eq!(clock.now(), now);
        assert_eq!(clock.now(), now);
    }

    #[test]
    fn sequential_id_gen_is_monotonic_and_unique() {
        let gen = SequentialIdGen::default();
        let a = gen.new_id();
        let b = gen.new_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn noop_content_provider_is_deterministic() {
        let provider = NoopContentProvider;
        let a = provider.generate("fractions").await.unwrap();
        let b = provider.generate("fractions").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_fixture_ports_are_wired() {
        let now = Utc::now();
        let ports = Ports::test_fixture(now);
        assert_eq!(ports.clock.now(), now);
        let id1 = ports.id_gen.new_id();
        let id2 = ports.id_gen.new_id();
        assert_ne!(id1, id2);
    }
}
