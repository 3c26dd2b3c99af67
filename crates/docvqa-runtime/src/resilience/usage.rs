//! Per-request token accounting.
//!
//! A [`UsageTracker`] lives for exactly one request. It accumulates token
//! counts and an estimated cost, and answers whether the request has
//! crossed its optional token ceiling.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated LLM usage for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Number of LLM calls made
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Estimate cost for a usage entry.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens (input, output)
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("deepseek") => (0.27, 1.1),
            _ => (0.15, 0.6),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;

        input_cost + output_cost
    }
}

/// Usage for one request.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call.
    pub fn record(&self, usage: &TokenUsage, model: &str) {
        self.usage.write().add(usage, model);
    }

    /// Snapshot of accumulated usage.
    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn total_tokens(&self) -> u32 {
        self.usage.read().total_tokens
    }

    /// Whether usage is above `ceiling`, if one is set.
    pub fn exceeds(&self, ceiling: Option<u32>) -> bool {
        ceiling.is_some_and(|max| self.total_tokens() > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    #[test]
    fn test_usage_accumulates() {
        let tracker = UsageTracker::new();
        tracker.record(&usage(100, 20), "gpt-4o-mini");
        tracker.record(&usage(50, 10), "gpt-4o-mini");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_tokens, 180);
        assert_eq!(snapshot.prompt_tokens, 150);
        assert_eq!(snapshot.completion_tokens, 30);
        assert_eq!(snapshot.llm_calls, 2);
        assert!(snapshot.estimated_cost > 0.0);
    }

    #[test]
    fn test_ceiling() {
        let tracker = UsageTracker::new();
        tracker.record(&usage(90, 20), "gpt-4o-mini");
        assert!(!tracker.exceeds(None));
        assert!(!tracker.exceeds(Some(110)));
        assert!(tracker.exceeds(Some(100)));
    }

    #[test]
    fn test_cost_depends_on_model() {
        let mut mini = LlmUsage::default();
        mini.add(&usage(1_000_000, 0), "gpt-4o-mini");
        let mut full = LlmUsage::default();
        full.add(&usage(1_000_000, 0), "gpt-4o");
        assert!(full.estimated_cost > mini.estimated_cost);
        assert!((mini.estimated_cost - 0.15).abs() < 1e-9);
    }
}
