//! Interpolator / frame scheduler
//!
//! Raw updates and rendering run on two independent clocks. An update only rewrites the
//! animation window of its vehicle (`prev`, `target`, `start`); every render tick samples
//! all windows at the current time. A burst of updates therefore just restarts the window
//! from wherever the marker currently is, and rendering stays smooth regardless of how
//! irregular the network is.
//!
//! When a vehicle's route geometry is known the window runs along the road (by path
//! fraction) instead of cutting straight across corners.

use crate::utils::{self, clamp_unit, smoothstep};
use crate::{RouteGeometry, TimestampMs, VehicleId, VehiclePosition};
use geo::Coord;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration for the interpolator
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterpolationConfig {
    /// Window length when no inter-update gap is known yet
    pub default_duration_ms: i64,
    /// Lower bound of the adaptive window
    pub min_duration_ms: i64,
    /// Upper bound of the adaptive window
    pub max_duration_ms: i64,
    /// Size the window from the observed gap between feed timestamps.
    /// When false, `default_duration_ms` is always used.
    pub adaptive_duration: bool,
    /// Below this displacement the reported heading is used instead of the bearing
    pub min_heading_displacement_m: f64,
    /// Farthest a raw sample may be from its route and still be animated along it
    pub max_snap_distance_m: f64,
    /// Time without updates after which a vehicle is stale
    pub stale_after_ms: i64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 4_000,
            min_duration_ms: 1_000,
            max_duration_ms: 10_000,
            adaptive_duration: true,
            min_heading_displacement_m: 3.0,
            max_snap_distance_m: 75.0,
            stale_after_ms: 60_000,
        }
    }
}

impl InterpolationConfig {
    /// Longest window any update can open under this configuration
    pub fn longest_window_ms(&self) -> i64 {
        if self.adaptive_duration {
            self.max_duration_ms.max(self.default_duration_ms)
        } else {
            self.default_duration_ms
        }
    }
}

/// Road-following part of an animation window
#[derive(Clone, Debug)]
struct RoadTrack {
    route: Arc<RouteGeometry>,
    from_fraction: f64,
    to_fraction: f64,
}

/// Animation window of one vehicle
#[derive(Clone, Debug)]
pub struct VehicleDisplayState {
    pub id: VehicleId,
    pub prev_position: Coord<f64>,
    pub target_position: Coord<f64>,
    /// Render-clock time the current window started (the receive time of the update)
    pub interpolation_start: TimestampMs,
    pub duration_ms: i64,
    /// Heading shown for the whole window, degrees in [0, 360)
    pub heading: f64,
    /// Feed timestamp of the update that opened the window
    pub last_feed_timestamp: TimestampMs,
    road: Option<RoadTrack>,
}

impl VehicleDisplayState {
    /// Linear progress through the window, clamped to [0, 1]
    #[inline]
    pub fn progress(&self, now: TimestampMs) -> f64 {
        if self.duration_ms <= 0 {
            return 1.0;
        }
        clamp_unit((now - self.interpolation_start) as f64 / self.duration_ms as f64)
    }

    /// Displayed position at `now`; never beyond the target
    pub fn position_at(&self, now: TimestampMs) -> Coord<f64> {
        let eased = smoothstep(self.progress(now));
        self.road
            .as_ref()
            .and_then(|road| road.route.walk(road.from_fraction, road.to_fraction, eased))
            .unwrap_or_else(|| utils::lerp_coord(self.prev_position, self.target_position, eased))
    }

    /// Path fraction at `now` when the window follows a road
    fn road_fraction_at(&self, now: TimestampMs) -> Option<(&Arc<RouteGeometry>, f64)> {
        let road = self.road.as_ref()?;
        let eased = smoothstep(self.progress(now));
        let fraction = road.from_fraction + (road.to_fraction - road.from_fraction) * eased;
        Some((&road.route, clamp_unit(fraction)))
    }

    /// Id of the route being followed, if any
    pub fn route_id(&self) -> Option<&str> {
        self.road.as_ref().map(|road| road.route.id())
    }
}

/// Displayed state of one vehicle for one frame
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayPosition {
    pub vehicle_id: VehicleId,
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: f64,
    /// No update within the staleness window; the position is frozen
    pub stale: bool,
}

impl DisplayPosition {
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        utils::lat_lng(self.lat, self.lng)
    }
}

/// Owner of every vehicle's animation window
#[derive(Clone, Debug, Default)]
pub struct Interpolator {
    config: InterpolationConfig,
    states: BTreeMap<VehicleId, VehicleDisplayState>,
    /// Render-clock time of the last update per vehicle
    last_received: BTreeMap<VehicleId, TimestampMs>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Interpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            last_received: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    /// Start a new animation window for an applied raw update received at `now`
    ///
    /// `route` is the vehicle's route geometry, when known; the window then follows the road
    /// if both ends snap onto it within `max_snap_distance_m`.
    pub fn apply_update(
        &mut self,
        update: &VehiclePosition,
        route: Option<Arc<RouteGeometry>>,
        now: TimestampMs,
    ) {
        #[cfg(feature = "profiling")]
        profiling::scope!("interpolator::apply_update");

        let target = update.coord();
        let existing = self.states.get(&update.id);

        let prev = existing.map_or(target, |state| state.position_at(self.clock_for(state, now)));
        let duration_ms = self.window_duration(existing, update.timestamp);
        let road = route.and_then(|route| self.road_track(existing, route, prev, target, now));
        let heading = self.heading_for(prev, target, update.heading);

        tracing::trace!(
            "Window for {}: {:?} -> {:?} over {}ms (road: {})",
            update.id,
            prev,
            target,
            duration_ms,
            road.is_some()
        );

        self.states.insert(
            update.id.clone(),
            VehicleDisplayState {
                id: update.id.clone(),
                prev_position: prev,
                target_position: target,
                interpolation_start: now,
                duration_ms,
                heading,
                last_feed_timestamp: update.timestamp,
                road,
            },
        );
        self.last_received.insert(update.id.clone(), now);
    }

    /// Bounded-adaptive window length
    fn window_duration(
        &self,
        existing: Option<&VehicleDisplayState>,
        feed_timestamp: TimestampMs,
    ) -> i64 {
        let config = &self.config;
        match existing {
            Some(state) if config.adaptive_duration => {
                let gap = feed_timestamp - state.last_feed_timestamp;
                if gap > 0 {
                    gap.clamp(config.min_duration_ms, config.max_duration_ms)
                } else {
                    config.default_duration_ms
                }
            }
            _ => config.default_duration_ms,
        }
    }

    /// Road-following window, or `None` to fall back to a straight blend
    fn road_track(
        &self,
        existing: Option<&VehicleDisplayState>,
        route: Arc<RouteGeometry>,
        prev: Coord<f64>,
        target: Coord<f64>,
        now: TimestampMs,
    ) -> Option<RoadTrack> {
        let max_distance = self.config.max_snap_distance_m;

        let to = route.snap(target)?;
        if utils::haversine_distance(target, to.coord()) > max_distance {
            tracing::debug!(
                "Sample {:?} is off route {}, using straight interpolation",
                target,
                route.id()
            );
            return None;
        }

        // Continue from the current fraction when already animating along this route
        let continued = existing
            .and_then(|state| state.road_fraction_at(self.clock_for(state, now)))
            .filter(|(current, _)| current.id() == route.id())
            .map(|(_, fraction)| fraction);

        let from_fraction = match continued {
            Some(fraction) => fraction,
            None => {
                let from = route.snap(prev)?;
                if utils::haversine_distance(prev, from.coord()) > max_distance {
                    return None;
                }
                from.path_fraction
            }
        };

        Some(RoadTrack {
            route,
            from_fraction,
            to_fraction: to.path_fraction,
        })
    }

    /// Bearing of travel, or the reported heading when the vehicle barely moved
    fn heading_for(&self, prev: Coord<f64>, target: Coord<f64>, reported: f64) -> f64 {
        if utils::haversine_distance(prev, target) >= self.config.min_heading_displacement_m {
            utils::bearing_degrees(prev, target)
        } else {
            utils::normalize_heading(reported)
        }
    }

    /// Display position of one vehicle at `now`
    pub fn sample(&self, vehicle_id: &str, now: TimestampMs) -> Option<DisplayPosition> {
        let state = self.states.get(vehicle_id)?;
        Some(self.display(state, now))
    }

    fn display(&self, state: &VehicleDisplayState, now: TimestampMs) -> DisplayPosition {
        let position = state.position_at(self.clock_for(state, now));
        DisplayPosition {
            vehicle_id: state.id.clone(),
            lat: position.y,
            lng: position.x,
            heading_deg: state.heading,
            stale: self.is_stale(&state.id, now),
        }
    }

    /// Display positions of every tracked vehicle at `now`, ordered by id
    pub fn frame(&self, now: TimestampMs) -> Vec<DisplayPosition> {
        #[cfg(feature = "profiling")]
        profiling::scope!("interpolator::frame");

        self.states
            .values()
            .map(|state| self.display(state, now))
            .collect()
    }

    /// Time at which `state` is sampled: `now`, or the moment it went stale
    ///
    /// A stale window stops where it was, even when it had not reached its target.
    #[inline]
    fn clock_for(&self, state: &VehicleDisplayState, now: TimestampMs) -> TimestampMs {
        now.min(
            state
                .interpolation_start
                .saturating_add(self.config.stale_after_ms.max(0)),
        )
    }

    /// Whether a vehicle has gone without updates for longer than `stale_after_ms`
    pub fn is_stale(&self, vehicle_id: &str, now: TimestampMs) -> bool {
        self.last_received
            .get(vehicle_id)
            .is_some_and(|&received| now - received > self.config.stale_after_ms)
    }

    /// Vehicles eligible for cleanup at `now`
    pub fn stale_vehicles(&self, now: TimestampMs) -> Vec<VehicleId> {
        self.last_received
            .iter()
            .filter(|&(_, &received)| now - received > self.config.stale_after_ms)
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[inline]
    pub fn state(&self, vehicle_id: &str) -> Option<&VehicleDisplayState> {
        self.states.get(vehicle_id)
    }

    /// Drop a vehicle's display state; idempotent
    pub fn remove(&mut self, vehicle_id: &str) -> bool {
        self.last_received.remove(vehicle_id);
        self.states.remove(vehicle_id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.last_received.clear();
    }
}
