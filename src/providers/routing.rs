//! Routing configuration and multi-objective provider selection.
//!
//! This module provides:
//! - [`RouterConfig`] — scoring weights and the provider preference sequence
//! - [`RouterWeights`] — relative importance of cost, latency, reliability, energy
//! - [`ModelRouter`] — picks the best-scoring provider for a model
//!
//! # Scoring
//!
//! Each eligible provider gets a multiplicative score:
//!
//! ```text
//! score = cost^-w_cost * latency^-w_latency * reliability^w_reliability * (1/energy)^w_energy
//! ```
//!
//! with the inputs clamped to keep the score finite (`cost >= 0.01`,
//! `latency >= 0.1`, `reliability` in `[0.5, 0.999]`, `energy >= 0.1`).
//! The highest score wins; on ties the provider listed first wins.
//!
//! ```toml
//! [router]
//! provider_sequence = ["anthropic", "openai"]
//!
//! [router.weights]
//! cost = 0.5
//! energy = 0.5
//! ```

use serde::Deserialize;

use super::profile::ProviderProfile;
use crate::{GatewayError, Result};

/// Router configuration.
///
/// Used by both the builder (programmatic) and the config file (TOML).
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub weights: RouterWeights,
    /// Preferred provider order. Unlisted providers keep their relative
    /// order after the listed ones.
    #[serde(default = "default_provider_sequence")]
    pub provider_sequence: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            weights: RouterWeights::default(),
            provider_sequence: default_provider_sequence(),
        }
    }
}

fn default_provider_sequence() -> Vec<String> {
    ["openai", "anthropic", "cohere", "azure-openai"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Relative importance of each routing objective.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RouterWeights {
    #[serde(default = "default_cost_weight")]
    pub cost: f64,
    #[serde(default = "default_latency_weight")]
    pub latency: f64,
    #[serde(default = "default_reliability_weight")]
    pub reliability: f64,
    #[serde(default = "default_energy_weight")]
    pub energy: f64,
}

fn default_cost_weight() -> f64 {
    0.35
}

fn default_latency_weight() -> f64 {
    0.2
}

fn default_reliability_weight() -> f64 {
    0.3
}

fn default_energy_weight() -> f64 {
    0.15
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            cost: default_cost_weight(),
            latency: default_latency_weight(),
            reliability: default_reliability_weight(),
            energy: default_energy_weight(),
        }
    }
}

impl RouterWeights {
    pub fn new(cost: f64, latency: f64, reliability: f64, energy: f64) -> Self {
        Self {
            cost,
            latency,
            reliability,
            energy,
        }
    }

    /// Clamp negatives to zero and scale so the weights sum to 1.
    ///
    /// All-zero weights stay zero (every provider then scores 1.0).
    pub fn normalized(&self) -> Self {
        let clamp = |w: f64| if w.is_finite() { w.max(0.0) } else { 0.0 };
        let (c, l, r, e) = (
            clamp(self.cost),
            clamp(self.latency),
            clamp(self.reliability),
            clamp(self.energy),
        );
        let total = c + l + r + e;
        let total = if total > 0.0 { total } else { 1.0 };
        Self::new(c / total, l / total, r / total, e / total)
    }
}

/// Stable reorder so providers named in `sequence` come first, in that order.
pub(crate) fn order_by_preference<T: AsRef<ProviderProfile>>(providers: &mut [T], sequence: &[String]) {
    providers.sort_by_key(|p| {
        let name = &p.as_ref().name;
        sequence
            .iter()
            .position(|s| s == name)
            .unwrap_or(sequence.len())
    });
}

/// Selects the best provider for a model.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    weights: RouterWeights,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(RouterWeights::default())
    }
}

impl ModelRouter {
    /// Create a router; `weights` are normalized here.
    pub fn new(weights: RouterWeights) -> Self {
        Self {
            weights: weights.normalized(),
        }
    }

    pub fn weights(&self) -> RouterWeights {
        self.weights
    }

    /// Score one provider. Higher is better.
    pub fn score(&self, profile: &ProviderProfile) -> f64 {
        let w = &self.weights;
        let cost = profile.cost_per_1k_tokens.max(0.01);
        let latency = profile.latency_ms.max(0.1);
        let reliability = profile.reliability.clamp(0.5, 0.999);
        let energy = profile.energy_modifier.max(0.1);

        cost.powf(-w.cost)
            * latency.powf(-w.latency)
            * reliability.powf(w.reliability)
            * (1.0 / energy).powf(w.energy)
    }

    /// Pick the highest-scoring provider that supports `model`.
    pub fn select<'a, T: AsRef<ProviderProfile>>(
        &self,
        providers: &'a [T],
        model: &str,
    ) -> Result<&'a T> {
        let mut best: Option<(&'a T, f64)> = None;
        for candidate in providers
            .iter()
            .filter(|p| p.as_ref().supports_model(model))
        {
            let score = self.score(candidate.as_ref());
            // Strict comparison keeps the first provider on ties.
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }
        best.map(|(provider, _)| provider)
            .ok_or_else(|| GatewayError::NoProviderAvailable {
                model: model.to_string(),
            })
    }
}

impl AsRef<ProviderProfile> for ProviderProfile {
    fn as_ref(&self) -> &ProviderProfile {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    fn profile(name: &str, cost: f64, latency: f64, energy: f64) -> ProviderProfile {
        ProviderProfile::new(ProviderKind::OpenAi, "http://localhost")
            .name(name)
            .cost_per_1k_tokens(cost)
            .latency_ms(latency)
            .energy_modifier(energy)
            .reliability(0.99)
    }

    #[test]
    fn weights_normalize_to_one() {
        let w = RouterWeights::new(2.0, 1.0, 1.0, -5.0).normalized();
        assert!((w.cost - 0.5).abs() < 1e-12);
        assert!((w.latency - 0.25).abs() < 1e-12);
        assert_eq!(w.energy, 0.0);
    }

    #[test]
    fn zero_weights_score_everything_equally() {
        let router = ModelRouter::new(RouterWeights::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(router.score(&profile("a", 100.0, 1000.0, 2.0)), 1.0);
    }

    #[test]
    fn cheaper_faster_greener_wins() {
        let providers = vec![
            profile("expensive", 60.0, 900.0, 1.2),
            profile("efficient", 10.0, 400.0, 0.7),
        ];
        let router = ModelRouter::default();
        let chosen = router.select(&providers, "gpt-4").unwrap();
        assert_eq!(chosen.name, "efficient");
    }

    #[test]
    fn equal_weights_prefer_efficient_provider() {
        let providers = vec![
            profile("expensive", 50.0, 800.0, 1.2).reliability(0.99),
            profile("efficient", 20.0, 600.0, 0.8).reliability(0.97),
        ];
        let router = ModelRouter::new(RouterWeights::new(0.25, 0.25, 0.25, 0.25));
        assert!(router.score(&providers[1]) > router.score(&providers[0]));
        let chosen = router.select(&providers, "gpt-4").unwrap();
        assert_eq!(chosen.name, "efficient");
    }

    #[test]
    fn ties_go_to_first_provider() {
        let providers = vec![profile("first", 10.0, 400.0, 1.0), profile("second", 10.0, 400.0, 1.0)];
        let chosen = ModelRouter::default().select(&providers, "m").unwrap();
        assert_eq!(chosen.name, "first");
    }

    #[test]
    fn unsupported_model_is_unavailable() {
        let providers = vec![profile("only", 10.0, 400.0, 1.0).models(["gpt-4"])];
        let err = ModelRouter::default()
            .select(&providers, "claude-3-opus")
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoProviderAvailable { ref model } if model == "claude-3-opus"));
    }

    #[test]
    fn degenerate_inputs_are_clamped() {
        let router = ModelRouter::default();
        let zero = profile("zero", 0.0, 0.0, 0.0).reliability(0.0);
        let score = router.score(&zero);
        assert!(score.is_finite());
        assert!(score > 0.0);
    }

    #[test]
    fn preference_order_is_stable() {
        let mut providers = vec![
            profile("cohere", 1.0, 1.0, 1.0),
            profile("custom", 1.0, 1.0, 1.0),
            profile("openai", 1.0, 1.0, 1.0),
            profile("other", 1.0, 1.0, 1.0),
        ];
        order_by_preference(&mut providers, &default_provider_sequence());
        let names: Vec<_> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["openai", "cohere", "custom", "other"]);
    }
}
