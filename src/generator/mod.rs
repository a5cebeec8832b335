//! Generator abstraction (ambient): the LLM boundary, modeled as a plain
//! `prompt -> Result<String>` trait so any HTTP or local backend can be
//! plugged in. Grounded on `original_source/rag/llm/gemini.py`'s
//! `make_generate_fn()` adapter shape (a prompt-in, text-out closure) and
//! `SPEC_FULL.md` ??4.13/?7's retry policy (3 attempts, `0.5s * 2^i`
//! backoff).

use crate::error::{Error, GeneratorError, Result};
use std::thread;
use std::time::Duration;

/// A pure synchronous text generator: `prompt -> answer text`.
pub trait Generator: Send + Sync {
    /// Produces a completion for `prompt`.
    ///
    /// # Errors
    /// Returns `Error::Generator` on transient backend failure.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Deterministic offline generator for tests and the `--offline` CLI path.
/// Echoes a fixed, evidence-free refusal-shaped stub; real deployments
/// supply an HTTP-backed `Generator`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

impl Generator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

/// Wraps `inner` with retry-with-exponential-backoff: up to `attempts`
/// tries, sleeping `base_delay * 2^i` between tries `i` (0-indexed).
/// Surfaces `Error::Generator(RetriesExhausted)` once attempts are spent.
pub struct RetryingGenerator<G> {
    inner: G,
    attempts: u32,
    base_delay: Duration,
}

impl<G: Generator> RetryingGenerator<G> {
    /// Builds a retrying wrapper around `inner` using the spec's default
    /// policy: 3 attempts, 0.5s base delay.
    #[must_use]
    pub const fn new(inner: G) -> Self {
        Self { inner, attempts: 3, base_delay: Duration::from_millis(500) }
    }

    /// Builds a retrying wrapper with an explicit attempt count and base
    /// delay, for tests that should not sleep for seconds.
    #[must_use]
    pub const fn with_policy(inner: G, attempts: u32, base_delay: Duration) -> Self {
        Self { inner, attempts, base_delay }
    }
}

impl<G: Generator> Generator for RetryingGenerator<G> {
    fn generate(&self, prompt: &str) -> Result<String> {
        let mut last_reason = String::new();
        for i in 0..self.attempts {
            match self.inner.generate(prompt) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    last_reason = e.to_string();
                    if i + 1 < self.attempts {
                        thread::sleep(self.base_delay * 2u32.pow(i));
                    }
                }
            }
        }
        Err(Error::Generator(GeneratorError::RetriesExhausted { attempts: self.attempts, reason: last_reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn echo_generator_returns_prompt_verbatim() {
        let gen = EchoGenerator;
        assert_eq!(gen.generate("hello").expect("ok"), "hello");
    }

    struct FlakyGenerator {
        failures_remaining: AtomicU32,
    }

    impl Generator for FlakyGenerator {
        fn generate(&self, _prompt: &str) -> Result<String> {
            if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(Error::Generator(GeneratorError::RetriesExhausted { attempts: 1, reason: "transient".to_string() }));
            }
            Ok("recovered".to_string())
        }
    }

    #[test]
    fn retrying_generator_succeeds_after_transient_failures() {
        let flaky = FlakyGenerator { failures_remaining: AtomicU32::new(2) };
        let retrying = RetryingGenerator::with_policy(flaky, 3, Duration::from_millis(1));
        assert_eq!(retrying.generate("q").expect("eventually ok"), "recovered");
    }

    #[test]
    fn retrying_generator_exhausts_and_surfaces_error() {
        let flaky = FlakyGenerator { failures_remaining: AtomicU32::new(10) };
        let retrying = RetryingGenerator::with_policy(flaky, 3, Duration::from_millis(1));
        let err = retrying.generate("q").expect_err("should exhaust retries");
        assert!(matches!(err, Error::Generator(GeneratorError::RetriesExhausted { attempts: 3, .. })));
    }
}
