//! Position Store - authoritative raw samples
//!
//! Keeps exactly the latest and the previous raw sample per vehicle. Bursts coalesce: a new
//! update simply overwrites the slot, nothing is queued.

use crate::{VehicleId, VehiclePosition};
use std::collections::{HashMap, HashSet};

/// Result of applying a raw update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First sample for this vehicle
    Inserted,
    /// Replaced the latest sample; the old one became `previous`
    Updated,
    /// Ignored: timestamp not newer than the last applied one
    OutOfOrder,
    /// Ignored: coordinates not finite or outside WGS84 bounds
    Malformed,
}

impl ApplyOutcome {
    /// Whether the sample was stored
    #[inline]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

#[derive(Clone, Debug)]
struct Samples {
    latest: VehiclePosition,
    previous: Option<VehiclePosition>,
}

/// Latest + previous raw sample per vehicle
#[derive(Clone, Debug, Default)]
pub struct PositionStore {
    samples: HashMap<VehicleId, Samples>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one raw update
    ///
    /// Updates whose timestamp is not strictly newer than the stored one are dropped, so
    /// duplicates and late arrivals never rewind a vehicle.
    pub fn apply(&mut self, update: VehiclePosition) -> ApplyOutcome {
        if !update.is_valid() {
            tracing::warn!(
                "Dropping malformed position for {}: ({}, {})",
                update.id,
                update.lat,
                update.lng
            );
            return ApplyOutcome::Malformed;
        }

        match self.samples.get_mut(&update.id) {
            Some(samples) => {
                if update.timestamp <= samples.latest.timestamp {
                    tracing::debug!(
                        "Dropping out-of-order update for {}: {} <= {}",
                        update.id,
                        update.timestamp,
                        samples.latest.timestamp
                    );
                    return ApplyOutcome::OutOfOrder;
                }
                let previous = std::mem::replace(&mut samples.latest, update);
                samples.previous = Some(previous);
                ApplyOutcome::Updated
            }
            None => {
                self.samples.insert(
                    update.id.clone(),
                    Samples {
                        latest: update,
                        previous: None,
                    },
                );
                ApplyOutcome::Inserted
            }
        }
    }

    /// Apply a full snapshot; returns the ids that were dropped because they are absent
    ///
    /// Per-vehicle outcomes are returned alongside, in snapshot order.
    pub fn apply_snapshot(
        &mut self,
        vehicles: Vec<VehiclePosition>,
    ) -> (Vec<(VehicleId, ApplyOutcome)>, Vec<VehicleId>) {
        let present: HashSet<VehicleId> = vehicles.iter().map(|v| v.id.clone()).collect();
        let mut removed: Vec<VehicleId> = self
            .samples
            .keys()
            .filter(|id| !present.contains(*id))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            self.samples.remove(id);
        }

        let outcomes = vehicles
            .into_iter()
            .map(|vehicle| {
                let id = vehicle.id.clone();
                (id, self.apply(vehicle))
            })
            .collect();
        (outcomes, removed)
    }

    /// Remove a vehicle; idempotent
    pub fn remove(&mut self, vehicle_id: &str) -> bool {
        self.samples.remove(vehicle_id).is_some()
    }

    /// Latest raw sample
    #[inline]
    pub fn latest(&self, vehicle_id: &str) -> Option<&VehiclePosition> {
        self.samples.get(vehicle_id).map(|s| &s.latest)
    }

    /// Sample before the latest one
    #[inline]
    pub fn previous(&self, vehicle_id: &str) -> Option<&VehiclePosition> {
        self.samples.get(vehicle_id).and_then(|s| s.previous.as_ref())
    }

    /// Iterate over latest samples in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &VehiclePosition> {
        self.samples.values().map(|s| &s.latest)
    }

    #[inline]
    pub fn contains(&self, vehicle_id: &str) -> bool {
        self.samples.contains_key(vehicle_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: &str, lat: f64, timestamp: i64) -> VehiclePosition {
        VehiclePosition::new(id, lat, 78.4, timestamp)
    }

    #[test]
    fn test_insert_then_update_keeps_previous() {
        let mut store = PositionStore::new();
        assert_eq!(store.apply(at("a", 17.40, 1_000)), ApplyOutcome::Inserted);
        assert!(store.previous("a").is_none());

        assert_eq!(store.apply(at("a", 17.41, 2_000)), ApplyOutcome::Updated);
        assert_eq!(store.latest("a").unwrap().lat, 17.41);
        assert_eq!(store.previous("a").unwrap().lat, 17.40);

        store.apply(at("a", 17.42, 3_000));
        assert_eq!(store.previous("a").unwrap().lat, 17.41);
    }

    #[test]
    fn test_out_of_order_and_duplicate_dropped() {
        let mut store = PositionStore::new();
        store.apply(at("a", 17.40, 2_000));
        assert_eq!(store.apply(at("a", 17.50, 1_000)), ApplyOutcome::OutOfOrder);
        assert_eq!(store.apply(at("a", 17.50, 2_000)), ApplyOutcome::OutOfOrder);
        assert_eq!(store.latest("a").unwrap().lat, 17.40);
        assert!(!ApplyOutcome::OutOfOrder.is_applied());
    }

    #[test]
    fn test_malformed_dropped() {
        let mut store = PositionStore::new();
        assert_eq!(
            store.apply(at("a", f64::NAN, 1_000)),
            ApplyOutcome::Malformed
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_removes_absent() {
        let mut store = PositionStore::new();
        store.apply(at("a", 17.40, 1_000));
        store.apply(at("b", 17.40, 1_000));
        store.apply(at("c", 17.40, 1_000));

        let (outcomes, removed) = store.apply_snapshot(vec![at("b", 17.41, 2_000)]);
        assert_eq!(removed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(outcomes, vec![("b".to_string(), ApplyOutcome::Updated)]);
        assert_eq!(store.len(), 1);
        assert!(store.contains("b"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = PositionStore::new();
        store.apply(at("a", 17.40, 1_000));
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.latest("a").is_none());
    }
}
