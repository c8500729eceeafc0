//! Suggestion ranking
//!
//! One composite key orders vehicles: `eta_minutes * 100 + occupancy * 10 + distance_km`.
//! With ETAs in whole minutes this behaves like a lexicographic sort on
//! (ETA, occupancy, distance). ETA dominates, occupancy breaks ties within a minute and
//! distance only matters below that.
//!
//! A ranking already computed by the backend goes through [`rank_suggestions`] as an
//! override list, so there is one ranking path whether or not the server ranked first.

use crate::{ServerSuggestion, VehicleId};
use std::collections::{HashMap, HashSet};

/// Coarse passenger-load category
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum OccupancyLevel {
    #[default]
    Low,
    Medium,
    High,
    Full,
}

impl OccupancyLevel {
    /// Ranking weight (LOW=0 .. FULL=3)
    #[inline]
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Medium => 1.0,
            Self::High => 2.0,
            Self::Full => 3.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Full => "FULL",
        }
    }
}

/// A vehicle as seen by the ranker
#[derive(Clone, Debug, PartialEq)]
pub struct SuggestionCandidate {
    pub vehicle_id: VehicleId,
    /// `None` (or NaN/negative) means the ETA is unknown
    pub eta_minutes: Option<f64>,
    pub occupancy: OccupancyLevel,
    pub distance_km: f64,
}

/// Composite score; lower ranks better
///
/// Unknown ETAs score `+inf` and sort last. An invalid distance contributes nothing.
pub fn suggestion_score(candidate: &SuggestionCandidate) -> f64 {
    let eta = match candidate.eta_minutes {
        Some(eta) if eta.is_finite() && eta >= 0.0 => eta,
        _ => return f64::INFINITY,
    };
    let distance = if candidate.distance_km.is_finite() && candidate.distance_km >= 0.0 {
        candidate.distance_km
    } else {
        0.0
    };
    eta * 100.0 + candidate.occupancy.weight() * 10.0 + distance
}

/// Stable ascending sort by [`suggestion_score`]
pub fn sort_by_suggestion(candidates: &mut [SuggestionCandidate]) {
    // Cache keys so the score is computed once per candidate
    candidates.sort_by_cached_key(|candidate| OrderedScore(suggestion_score(candidate)));
}

/// Top `count` candidates after excluding FULL vehicles
pub fn smart_suggestions(
    candidates: &[SuggestionCandidate],
    count: usize,
) -> Vec<SuggestionCandidate> {
    let mut eligible: Vec<SuggestionCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.occupancy != OccupancyLevel::Full)
        .cloned()
        .collect();
    sort_by_suggestion(&mut eligible);
    eligible.truncate(count);
    eligible
}

/// Ranked vehicle ids, honouring a server ranking when one is supplied
///
/// With `overrides`, the server order is kept but restricted to vehicles known locally and
/// not FULL. Without it, the local score decides.
pub fn rank_suggestions(
    candidates: &[SuggestionCandidate],
    overrides: Option<&[ServerSuggestion]>,
    count: usize,
) -> Vec<VehicleId> {
    match overrides {
        Some(ranked) => {
            let known: HashMap<&str, &SuggestionCandidate> = candidates
                .iter()
                .map(|candidate| (candidate.vehicle_id.as_str(), candidate))
                .collect();
            let mut seen = HashSet::new();
            ranked
                .iter()
                .filter(|suggestion| {
                    known
                        .get(suggestion.vehicle_id.as_str())
                        .is_some_and(|candidate| candidate.occupancy != OccupancyLevel::Full)
                })
                .filter(|suggestion| seen.insert(suggestion.vehicle_id.as_str()))
                .take(count)
                .map(|suggestion| suggestion.vehicle_id.clone())
                .collect()
        }
        None => smart_suggestions(candidates, count)
            .into_iter()
            .map(|candidate| candidate.vehicle_id)
            .collect(),
    }
}

/// Total order over scores (`f64::total_cmp`) usable as a sort key
#[derive(Clone, Copy, Debug, PartialEq)]
struct OrderedScore(f64);

impl Eq for OrderedScore {}

impl PartialOrd for OrderedScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
