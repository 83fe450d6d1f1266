//! Render orchestration: change detection, circuit breaking, fallback.

pub mod adapter;

use crate::error::{FolioError, Result};
use crate::reliability::CircuitBreaker;
use adapter::{RendererAdapter, RenderedOutput};
use std::sync::Mutex;
use std::time::Duration;

/// Coordinates rendering for one session: skips redundant re-renders of
/// unchanged content, trips a [`CircuitBreaker`] around the primary
/// renderer, and falls back to a degraded plain-text preview while the
/// circuit is open rather than failing the whole command.
pub struct RenderOrchestrator {
    primary: Box<dyn RendererAdapter>,
    fallback: Box<dyn RendererAdapter>,
    breaker: Mutex<CircuitBreaker>,
    cache: Mutex<Option<(String, RenderedOutput)>>,
}

impl RenderOrchestrator {
    pub fn new(
        primary: Box<dyn RendererAdapter>,
        fallback: Box<dyn RendererAdapter>,
        circuit_threshold: u32,
        circuit_cooldown: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            breaker: Mutex::new(CircuitBreaker::new(circuit_threshold, circuit_cooldown)),
            cache: Mutex::new(None),
        }
    }

    fn content_hash(body: &str) -> String {
        blake3::hash(body.as_bytes()).to_hex().to_string()
    }

    /// Render `body`, reusing the cached output when `body` matches the last
    /// rendered content exactly — the "skip if unchanged" heuristic from
    /// the render component's contract.
    ///
    /// While the circuit is open this fails fast with `FolioError::busy`
    /// instead of falling back — the fallback path is only for an
    /// individual renderer failure that hasn't (yet) tripped the circuit.
    pub async fn render(&self, body: &str) -> Result<RenderedOutput> {
        let hash = Self::content_hash(body);
        if let Some((cached_hash, output)) = self.cache.lock().unwrap().clone() {
            if cached_hash == hash {
                return Ok(output);
            }
        }

        let was_recovering = {
            let mut breaker = self.breaker.lock().unwrap();
            if !breaker.allow() {
                let retry_after_ms = breaker.retry_after_ms();
                return Err(FolioError::busy(retry_after_ms, true));
            }
            breaker.is_half_open()
        };

        match self.primary.render(body).await {
            Ok(html) => {
                self.breaker.lock().unwrap().record_success();
                let output = RenderedOutput {
                    html,
                    degraded: false,
                    circuit_transition: was_recovering.then_some("degraded_mode_recovered"),
                };
                *self.cache.lock().unwrap() = Some((hash, output.clone()));
                Ok(output)
            }
            Err(_err) => {
                let just_opened = {
                    let mut breaker = self.breaker.lock().unwrap();
                    let was_open = breaker.is_open();
                    breaker.record_failure();
                    !was_open && breaker.is_open()
                };
                let html = self.fallback.render(body).await?;
                let output = RenderedOutput {
                    html,
                    degraded: true,
                    circuit_transition: just_opened.then_some("degraded_mode"),
                };
                *self.cache.lock().unwrap() = Some((hash, output.clone()));
                Ok(output)
            }
        }
    }

    pub fn circuit_open(&self) -> bool {
        self.breaker.lock().unwrap().is_open()
    }

    pub fn retry_after_ms(&self) -> u64 {
        self.breaker.lock().unwrap().retry_after_ms()
    }
}
