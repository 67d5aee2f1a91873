//! Named routing strategies and their mapping onto registry scoring passes.

use crate::config::registry::{Candidate, ProviderRegistry, SelectionCriteria};

/// Which scoring pass `ProviderRouter::select_provider` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Lowest combined input+output price.
    Cheapest,
    /// `selectBestModel` biased toward low-latency backends.
    Fastest,
    /// Prefers reasoning-capable models from high-quality providers.
    Smartest,
    #[default]
    Balanced,
}

impl Strategy {
    pub fn apply(self, registry: &ProviderRegistry, criteria: &SelectionCriteria) -> Option<Candidate> {
        match self {
            Strategy::Cheapest => registry.cheapest(criteria),
            Strategy::Fastest => registry.fastest(criteria),
            Strategy::Smartest => registry.smartest(criteria),
            Strategy::Balanced => registry.balanced(criteria),
        }
    }
}
