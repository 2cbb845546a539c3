use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use catalog::{Catalog, ModelCategory, ModelDescriptor, ModelFilter};
use config::CredentialConfig;
use rate_limit::{CircuitBreaker, RateTracker};

use crate::messages::Optimization;

/// Longest fallback sequence handed to the orchestrator.
const MAX_SEQUENCE: usize = 5;

/// Hard requirements plus ranking inputs for one selection.
#[derive(Debug, Clone, Default)]
pub(crate) struct SelectionRequirements {
    pub optimization: Optimization,
    pub requires_tools: bool,
    pub requires_vision: bool,
    pub requires_json_mode: bool,
    pub requires_streaming: bool,
    pub required_category: Option<ModelCategory>,
    pub context_window_needed: u32,
    /// Prompt estimate plus the completion budget, projected against the
    /// rate windows.
    pub projected_tokens: u64,
}

/// Picks a ranked fallback sequence of candidate models.
///
/// Stateless apart from reading the three shared stores; deterministic
/// given the same world state and the same per-request seed.
pub(crate) struct ModelSelector {
    catalog: Arc<Catalog>,
    breaker: Arc<CircuitBreaker>,
    tracker: Arc<RateTracker>,
}

impl ModelSelector {
    pub(crate) fn new(catalog: Arc<Catalog>, breaker: Arc<CircuitBreaker>, tracker: Arc<RateTracker>) -> Self {
        Self {
            catalog,
            breaker,
            tracker,
        }
    }

    /// The ordered candidate sequence for this request. Empty means no
    /// model is available right now.
    pub(crate) fn select_sequence(
        &self,
        requirements: &SelectionRequirements,
        extra_credentials: &[CredentialConfig],
        seed: &str,
    ) -> Vec<ModelDescriptor> {
        let filter = ModelFilter {
            requires_tools: requirements.requires_tools,
            requires_streaming: requirements.requires_streaming,
            requires_json_mode: requirements.requires_json_mode,
            requires_vision: requirements.requires_vision,
            required_category: requirements.required_category,
            context_window_needed: requirements.context_window_needed,
            provider_type: None,
        };

        let mut candidates: Vec<(&ModelDescriptor, f64)> = self
            .catalog
            .models(&filter, extra_credentials)
            .into_iter()
            .filter(|model| {
                let key = model.key();

                if !self.breaker.is_callable(&key) {
                    log::debug!("Skipping {key}: circuit breaker open");
                    return false;
                }

                if self
                    .tracker
                    .would_exceed(&key, &model.rate_limits, requirements.projected_tokens)
                {
                    log::debug!("Skipping {key}: projected usage exceeds a rate window");
                    return false;
                }

                true
            })
            .map(|model| {
                let score = score(model, requirements, seed);
                (model, score)
            })
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        candidates
            .into_iter()
            .take(MAX_SEQUENCE)
            .map(|(model, _)| model.clone())
            .collect()
    }
}

fn category_rank(category: ModelCategory) -> f64 {
    match category {
        ModelCategory::Small => 0.0,
        ModelCategory::Medium => 1.0,
        ModelCategory::Large => 2.0,
        ModelCategory::Reasoning => 3.0,
    }
}

fn score(model: &ModelDescriptor, requirements: &SelectionRequirements, seed: &str) -> f64 {
    let rank = category_rank(model.category);
    let price = model.pricing.blended();

    let objective = match requirements.optimization {
        Optimization::Cheap => -price,
        Optimization::Quality => rank * 100.0,
        Optimization::Free => {
            if model.pricing.is_free() {
                1_000.0 - price
            } else {
                -price
            }
        }
        Optimization::Balanced => rank * 10.0 - price,
    };

    // Exact category match beats overshooting the floor.
    let category_fit = match requirements.required_category {
        Some(floor) if model.category == floor => 1.0,
        Some(floor) => -(rank - category_rank(floor)) * 0.25,
        None => 0.0,
    };

    objective + category_fit + jitter(seed, model)
}

/// Deterministic per-request tie breaker in `[0, 0.001)`.
fn jitter(seed: &str, model: &ModelDescriptor) -> f64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    model.provider_type.hash(&mut hasher);
    model.model_id.hash(&mut hasher);

    (hasher.finish() % 1_000) as f64 / 1_000_000.0
}
