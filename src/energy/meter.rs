//! Per-model energy intensities and the energy formula.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{GatewayError, Result};

/// Intensity key used for models without a registered value.
pub const DEFAULT_INTENSITY_KEY: &str = "default";

/// Joules per token for well-known models.
const BUILTIN_INTENSITIES: &[(&str, f64)] = &[
    ("gpt-4", 0.03),
    ("gpt-4o", 0.024),
    ("gpt-4o-mini", 0.012),
    ("gpt-3.5-turbo", 0.004),
    ("llama-3-70b", 0.01),
    ("claude-3-opus", 0.022),
    ("claude-3-sonnet", 0.015),
    ("claude-3-haiku", 0.008),
    ("mistral-large", 0.013),
    ("phi-4", 0.007),
    (DEFAULT_INTENSITY_KEY, 0.01),
];

const MIN_MODIFIER: f64 = 0.1;

/// Estimates the energy cost of a completion.
///
/// ```text
/// energy = round((prompt + completion) * intensity(model) * max(modifier, 0.1), 6)
/// ```
#[derive(Debug)]
pub struct EnergyMeter {
    intensities: RwLock<HashMap<String, f64>>,
}

impl Default for EnergyMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyMeter {
    /// A meter seeded with the built-in intensity table.
    pub fn new() -> Self {
        Self {
            intensities: RwLock::new(
                BUILTIN_INTENSITIES
                    .iter()
                    .map(|(model, j)| (model.to_string(), *j))
                    .collect(),
            ),
        }
    }

    /// Register (or replace) the intensity for `model`, in joules per token.
    pub fn register_model(&self, model: impl Into<String>, joules_per_token: f64) -> Result<()> {
        if !(joules_per_token > 0.0) || !joules_per_token.is_finite() {
            return Err(GatewayError::Validation(
                "joules_per_token must be positive".into(),
            ));
        }
        let mut intensities = self
            .intensities
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        intensities.insert(model.into(), joules_per_token);
        Ok(())
    }

    /// Joules per token for `model`, falling back to the default intensity.
    pub fn intensity(&self, model: &str) -> f64 {
        let intensities = self
            .intensities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        intensities
            .get(model)
            .or_else(|| intensities.get(DEFAULT_INTENSITY_KEY))
            .copied()
            .unwrap_or(0.01)
    }

    /// Energy in joules, rounded to six decimals.
    pub fn calculate(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        modifier: f64,
    ) -> f64 {
        let tokens = f64::from(prompt_tokens) + f64::from(completion_tokens);
        let modifier = if modifier.is_nan() {
            MIN_MODIFIER
        } else {
            modifier.max(MIN_MODIFIER)
        };
        round6(tokens * self.intensity(model) * modifier)
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
