//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Lookup is a case-insensitive
//! prefix match against the model name, longest key first, so dated model
//! names (`gpt-4o-mini-2024-07-18`) resolve to their family. A global
//! override from config or the environment beats the table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use steward_config::PricingConfig;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_m: f64,
    pub completion_per_m: f64,
}

impl ModelPricing {
    pub fn new(prompt_per_m: f64, completion_per_m: f64) -> Self {
        Self {
            prompt_per_m,
            completion_per_m,
        }
    }

    pub const FREE: Self = Self {
        prompt_per_m: 0.0,
        completion_per_m: 0.0,
    };

    fn is_free(&self) -> bool {
        self.prompt_per_m <= 0.0 && self.completion_per_m <= 0.0
    }

    /// Cost in USD, rounded to 8 decimal places.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        if self.is_free() {
            return 0.0;
        }
        let raw = (prompt_tokens as f64 / 1_000_000.0) * self.prompt_per_m
            + (completion_tokens as f64 / 1_000_000.0) * self.completion_per_m;
        (raw * 1e8).round() / 1e8
    }
}

/// Rates that would apply to a model, for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub model: String,
    pub prompt_usd_per_1m: f64,
    pub completion_usd_per_1m: f64,
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    global_override: Option<ModelPricing>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let prices = HashMap::from([
            // OpenAI
            ("gpt-4.1-mini".to_string(), ModelPricing::new(0.8, 3.2)),
            ("gpt-4o-mini".to_string(), ModelPricing::new(0.15, 0.6)),
            ("gpt-4.1".to_string(), ModelPricing::new(2.0, 8.0)),
            // Moonshot
            ("moonshot-v1-8k".to_string(), ModelPricing::new(0.25, 0.25)),
            ("moonshot-v1-32k".to_string(), ModelPricing::new(0.5, 0.5)),
            ("moonshot-v1-128k".to_string(), ModelPricing::new(1.0, 1.0)),
            // DeepSeek
            ("deepseek-chat".to_string(), ModelPricing::new(0.27, 1.1)),
            // Google
            ("gemini-2.0-flash".to_string(), ModelPricing::new(0.1, 0.4)),
        ]);

        Self {
            prices: RwLock::new(prices),
            global_override: None,
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            global_override: None,
        }
    }

    /// Defaults plus `[pricing.models]` entries plus the global override.
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::with_defaults();
        for (model, p) in &config.models {
            table.set(model.clone(), ModelPricing::new(p.prompt_per_m, p.completion_per_m));
        }
        let global = ModelPricing::new(config.prompt_usd_per_1m, config.completion_usd_per_1m);
        if !global.is_free() {
            table.global_override = Some(global);
        }
        table
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(model.into().to_lowercase(), pricing);
    }

    /// Rates for `model`; free when unknown.
    pub fn rates(&self, model: &str) -> ModelPricing {
        if let Some(global) = self.global_override {
            return global;
        }
        let model = model.trim().to_lowercase();
        if model.is_empty() {
            return ModelPricing::FREE;
        }
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
            .unwrap_or(ModelPricing::FREE)
    }

    /// Cost of a call in USD, 0.0 when the model is not priced.
    pub fn compute_cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        self.rates(model).cost(prompt_tokens, completion_tokens)
    }

    pub fn snapshot(&self, model: &str) -> PricingSnapshot {
        let rates = self.rates(model);
        PricingSnapshot {
            model: model.to_string(),
            prompt_usd_per_1m: rates.prompt_per_m,
            completion_usd_per_1m: rates.completion_per_m,
        }
    }

    /// List all known model names.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.prices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
