//! Usage counters for the running service

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::models::UsageStats;

/// Tracks requests, attempts and token throughput since start-up
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    stats: Arc<RwLock<UsageStats>>,
}

impl UsageTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted translation request
    pub async fn record_request(&self) {
        let mut stats = self.stats.write().await;
        stats.requests += 1;
    }

    /// Count one generation pass over all prompts of a request
    pub async fn record_attempt(&self, attempt: u32, prompt_tokens: usize, generated_tokens: usize) {
        {
            let mut stats = self.stats.write().await;
            stats.attempts += 1;
            if attempt > 1 {
                stats.retries += 1;
            }
            stats.prompt_tokens += prompt_tokens as u64;
            stats.generated_tokens += generated_tokens as u64;
        }

        debug!(
            "Attempt {} used {} prompt and {} generated tokens",
            attempt, prompt_tokens, generated_tokens
        );
    }

    /// Count a request that ran out of attempts
    pub async fn record_mismatch(&self) {
        let mut stats = self.stats.write().await;
        stats.line_mismatches += 1;
    }

    /// Get current usage statistics
    pub async fn get_stats(&self) -> UsageStats {
        let stats = self.stats.read().await;
        stats.clone()
    }

    /// Reset counters (for testing or manual reset)
    pub async fn reset(&self) {
        let mut stats = self.stats.write().await;
        *stats = UsageStats::new();
        info!("Usage counters reset");
    }
}
