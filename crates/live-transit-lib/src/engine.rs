//! Live engine
//!
//! Ties the components together behind one owner: raw samples land in the
//! [`PositionStore`], applied updates open animation windows in the [`Interpolator`], each
//! rendered frame is reconciled against the viewport by the [`MarkerLifecycle`], and ETAs
//! and rankings are kept per vehicle regardless of visibility.

use crate::{
    DisplayPosition, EtaSmoother, FeedMessage, InterpolationConfig, Interpolator, MarkerCommand,
    MarkerLifecycle, PositionStore, RouteCollection, RouteGeometry, ServerSuggestion,
    SmoothedEta, StopCache, SuggestionCandidate, TimestampMs, VehicleId, VehiclePosition,
    ViewportBounds, ViewportConfig, format_eta, ranking, utils,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Engine-wide configuration
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub interpolation: InterpolationConfig,
    pub viewport: ViewportConfig,
    /// Remove vehicles that went stale when [`LiveEngine::sweep_stale`] runs
    pub evict_stale: bool,
}

/// Output of one render tick
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    pub timestamp: TimestampMs,
    /// Every tracked vehicle, ordered by id, visible or not
    pub positions: Vec<DisplayPosition>,
    /// Marker changes for the renderer, in application order
    pub commands: Vec<MarkerCommand>,
}

/// ETA ready for display
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EtaDisplay {
    pub minutes: f64,
    pub formatted: String,
    pub is_smoothed: bool,
}

/// Single-threaded owner of all live vehicle state
#[derive(Debug, Default)]
pub struct LiveEngine {
    config: EngineConfig,
    store: PositionStore,
    interpolator: Interpolator,
    markers: MarkerLifecycle,
    smoother: EtaSmoother,
    etas: HashMap<VehicleId, SmoothedEta>,
    routes: RouteCollection,
    stops: StopCache,
    server_ranking: Option<Vec<ServerSuggestion>>,
    /// Destroy commands produced between frames, flushed by the next frame
    pending: Vec<MarkerCommand>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LiveEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            interpolator: Interpolator::new(config.interpolation.clone()),
            markers: MarkerLifecycle::new(config.viewport.clone()),
            config,
            ..Default::default()
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle one transport message received at render-clock time `now`
    pub fn ingest(&mut self, message: FeedMessage, now: TimestampMs) {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::ingest");

        match message {
            FeedMessage::Update(position) => self.ingest_position(position, now),
            FeedMessage::Snapshot { vehicles } => self.ingest_snapshot(vehicles, now),
            FeedMessage::Remove { vehicle_id } => {
                if let Some(command) = self.remove_vehicle(&vehicle_id) {
                    self.pending.push(command);
                }
            }
            FeedMessage::Eta {
                vehicle_id,
                raw_eta_minutes,
            } => self.ingest_eta(&vehicle_id, raw_eta_minutes),
            FeedMessage::Suggestions { ranked } => {
                for suggestion in &ranked {
                    if suggestion.raw_eta_minutes.is_some() {
                        self.ingest_eta(&suggestion.vehicle_id, suggestion.raw_eta_minutes);
                    }
                }
                tracing::debug!("Server ranking replaced ({} entries)", ranked.len());
                self.server_ranking = Some(ranked);
            }
        }
    }

    fn ingest_position(&mut self, position: VehiclePosition, now: TimestampMs) {
        let outcome = self.store.apply(position.clone());
        if outcome.is_applied() {
            let route = self.route_for(&position);
            self.interpolator.apply_update(&position, route, now);
        }
    }

    fn ingest_snapshot(&mut self, vehicles: Vec<VehiclePosition>, now: TimestampMs) {
        let (outcomes, removed) = self.store.apply_snapshot(vehicles);
        for id in &removed {
            if let Some(command) = self.remove_vehicle(id) {
                self.pending.push(command);
            }
        }

        let mut applied = 0;
        for (id, outcome) in outcomes {
            if !outcome.is_applied() {
                continue;
            }
            if let Some(position) = self.store.latest(&id) {
                let route = position
                    .route_id
                    .as_deref()
                    .and_then(|route_id| self.routes.get(route_id))
                    .cloned();
                self.interpolator.apply_update(position, route, now);
                applied += 1;
            }
        }
        tracing::info!(
            "Snapshot applied: {} updated, {} removed, {} tracked",
            applied,
            removed.len(),
            self.store.len()
        );
    }

    fn ingest_eta(&mut self, vehicle_id: &str, raw_minutes: Option<f64>) {
        // ETA state only exists for tracked vehicles so removal clears it for good
        if !self.store.contains(vehicle_id) {
            tracing::debug!("Ignoring ETA for untracked vehicle {}", vehicle_id);
            return;
        }
        match self.smoother.smooth(vehicle_id, raw_minutes) {
            Some(eta) => {
                self.etas.insert(vehicle_id.to_string(), eta);
            }
            None => {
                self.etas.remove(vehicle_id);
            }
        }
    }

    fn route_for(&self, position: &VehiclePosition) -> Option<Arc<RouteGeometry>> {
        position
            .route_id
            .as_deref()
            .and_then(|route_id| self.routes.get(route_id))
            .cloned()
    }

    /// Forget a vehicle everywhere; returns the marker Destroy if it had one
    ///
    /// Idempotent: removing an unknown or already removed vehicle is a no-op.
    pub fn remove_vehicle(&mut self, vehicle_id: &str) -> Option<MarkerCommand> {
        let known = self.store.remove(vehicle_id);
        let animated = self.interpolator.remove(vehicle_id);
        self.smoother.reset(vehicle_id);
        self.etas.remove(vehicle_id);
        if known || animated {
            tracing::debug!("Removed vehicle {}", vehicle_id);
        }
        self.markers.remove(vehicle_id)
    }

    /// Display positions at `now` plus the marker commands to apply
    pub fn render_frame(&mut self, now: TimestampMs) -> Frame {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::render_frame");

        let positions = self.interpolator.frame(now);
        let mut commands = std::mem::take(&mut self.pending);
        commands.extend(self.markers.sync(&positions));
        Frame {
            timestamp: now,
            positions,
            commands,
        }
    }

    /// Replace the viewport after a pan/zoom settles; returns the resulting marker changes
    pub fn set_viewport(&mut self, bounds: ViewportBounds, now: TimestampMs) -> Vec<MarkerCommand> {
        self.markers.set_viewport(bounds);
        let positions = self.interpolator.frame(now);
        let mut commands = std::mem::take(&mut self.pending);
        commands.extend(self.markers.sync(&positions));
        commands
    }

    /// Smoothed ETA for a vehicle, if the backend provided one
    pub fn eta(&self, vehicle_id: &str) -> Option<EtaDisplay> {
        self.etas.get(vehicle_id).map(|eta| EtaDisplay {
            minutes: eta.display_minutes,
            formatted: format_eta(eta.display_minutes),
            is_smoothed: eta.is_smoothed,
        })
    }

    /// Best `count` vehicles for a rider at `(origin_lat, origin_lng)`
    ///
    /// Uses the latest server ranking when one was received, the local score otherwise.
    pub fn suggestions(&self, origin_lat: f64, origin_lng: f64, count: usize) -> Vec<VehicleId> {
        let candidates = self.candidates(origin_lat, origin_lng);
        ranking::rank_suggestions(&candidates, self.server_ranking.as_deref(), count)
    }

    /// Ranking input for every tracked vehicle, ordered by id
    pub fn candidates(&self, origin_lat: f64, origin_lng: f64) -> Vec<SuggestionCandidate> {
        let origin = utils::lat_lng(origin_lat, origin_lng);
        let origin_valid = utils::is_valid_coord(origin);
        let mut candidates: Vec<SuggestionCandidate> = self
            .store
            .iter()
            .map(|vehicle| SuggestionCandidate {
                vehicle_id: vehicle.id.clone(),
                eta_minutes: self.etas.get(&vehicle.id).map(|eta| eta.display_minutes),
                occupancy: vehicle.occupancy.unwrap_or_default(),
                distance_km: if origin_valid {
                    utils::haversine_distance(origin, vehicle.coord()) / 1000.0
                } else {
                    f64::NAN
                },
            })
            .collect();
        candidates.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        candidates
    }

    /// Drop the server ranking so the local score decides again
    pub fn clear_server_ranking(&mut self) {
        self.server_ranking = None;
    }

    /// Remove vehicles that stopped reporting, when `evict_stale` is enabled
    ///
    /// Their Destroy commands are delivered with the next frame.
    pub fn sweep_stale(&mut self, now: TimestampMs) -> Vec<VehicleId> {
        if !self.config.evict_stale {
            return Vec::new();
        }
        let stale = self.interpolator.stale_vehicles(now);
        for id in &stale {
            if let Some(command) = self.remove_vehicle(id) {
                self.pending.push(command);
            }
        }
        if !stale.is_empty() {
            tracing::info!("Evicted {} stale vehicles", stale.len());
        }
        stale
    }

    /// Routes whose bounding box overlaps the padded viewport, ordered by id
    pub fn visible_routes(&self) -> Vec<&Arc<RouteGeometry>> {
        let Some(bounds) = self.markers.bounds() else {
            return Vec::new();
        };
        let mut visible: Vec<&Arc<RouteGeometry>> = self
            .routes
            .routes()
            .filter(|route| bounds.intersects(route.bounding_box()))
            .collect();
        visible.sort_by(|a, b| a.id().cmp(b.id()));
        visible
    }

    #[inline]
    pub fn routes(&self) -> &RouteCollection {
        &self.routes
    }

    /// Route geometry registry; routes added here are used by later updates
    #[inline]
    pub fn routes_mut(&mut self) -> &mut RouteCollection {
        &mut self.routes
    }

    #[inline]
    pub fn stops(&self) -> &StopCache {
        &self.stops
    }

    #[inline]
    pub fn stops_mut(&mut self) -> &mut StopCache {
        &mut self.stops
    }

    #[inline]
    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    #[inline]
    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    #[inline]
    pub fn markers(&self) -> &MarkerLifecycle {
        &self.markers
    }

    #[inline]
    pub fn vehicle_count(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OccupancyLevel, Stop};

    fn engine() -> LiveEngine {
        let mut engine = LiveEngine::new(EngineConfig::default());
        engine.set_viewport(ViewportBounds::new(17.0, 78.0, 18.0, 79.0), 0);
        engine
    }

    fn update(id: &str, lat: f64, lng: f64, timestamp: i64) -> FeedMessage {
        FeedMessage::Update(VehiclePosition::new(id, lat, lng, timestamp))
    }

    fn eta(id: &str, minutes: f64) -> FeedMessage {
        FeedMessage::Eta {
            vehicle_id: id.to_string(),
            raw_eta_minutes: Some(minutes),
        }
    }

    #[test]
    fn test_first_update_creates_marker_at_target() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);

        let frame = engine.render_frame(0);
        assert_eq!(frame.positions.len(), 1);
        assert_eq!(frame.positions[0].lat, 17.4);
        assert!(matches!(
            frame.commands.as_slice(),
            [MarkerCommand::Create { .. }]
        ));

        let frame = engine.render_frame(16);
        assert!(matches!(
            frame.commands.as_slice(),
            [MarkerCommand::Update { .. }]
        ));
    }

    #[test]
    fn test_update_animates_between_samples() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.40, 78.40, 1_000), 0);
        engine.ingest(update("bus", 17.41, 78.40, 5_000), 1_000);

        let start = engine.render_frame(1_000);
        assert!((start.positions[0].lat - 17.40).abs() < 1e-9);

        let end = engine.render_frame(1_000 + 4_000);
        assert!((end.positions[0].lat - 17.41).abs() < 1e-9);

        let mid = engine.render_frame(3_000);
        assert!(mid.positions[0].lat > 17.40 && mid.positions[0].lat < 17.41);
    }

    #[test]
    fn test_out_of_order_update_ignored() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.40, 78.40, 2_000), 0);
        engine.ingest(update("bus", 17.90, 78.40, 1_000), 100);

        let frame = engine.render_frame(10_000);
        assert!((frame.positions[0].lat - 17.40).abs() < 1e-9);
    }

    #[test]
    fn test_road_following_uses_route() {
        let mut engine = engine();
        let route = RouteGeometry::from_lng_lat_pairs(
            "r1",
            &[[78.40, 17.40], [78.41, 17.40], [78.41, 17.41]],
        )
        .unwrap();
        engine.routes_mut().add_route(route);

        let first = VehiclePosition::new("bus", 17.40, 78.40, 1_000).with_route("r1");
        let second = VehiclePosition::new("bus", 17.41, 78.41, 5_000).with_route("r1");
        engine.ingest(FeedMessage::Update(first), 0);
        engine.ingest(FeedMessage::Update(second), 0);

        // Halfway along the path is the corner, not the straight-line midpoint
        let mid = engine.render_frame(2_000);
        let position = &mid.positions[0];
        assert!((position.lng - 78.41).abs() < 1e-6);
        assert!((position.lat - 17.40).abs() < 1e-6);
    }

    #[test]
    fn test_remove_vehicle_clears_everything() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.ingest(eta("bus", 10.0), 0);
        engine.render_frame(0);
        assert!(engine.eta("bus").is_some());

        let command = engine.remove_vehicle("bus");
        assert_eq!(
            command,
            Some(MarkerCommand::Destroy {
                vehicle_id: "bus".to_string()
            })
        );
        assert!(engine.eta("bus").is_none());
        assert!(engine.interpolator().state("bus").is_none());
        assert!(!engine.store().contains("bus"));
        assert!(!engine.markers().is_realized("bus"));

        assert_eq!(engine.remove_vehicle("bus"), None);
        assert!(engine.render_frame(10).commands.is_empty());
    }

    #[test]
    fn test_remove_message_destroys_on_next_frame() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.render_frame(0);

        engine.ingest(
            FeedMessage::Remove {
                vehicle_id: "bus".to_string(),
            },
            10,
        );
        let frame = engine.render_frame(16);
        assert!(frame.positions.is_empty());
        assert_eq!(
            frame.commands,
            vec![MarkerCommand::Destroy {
                vehicle_id: "bus".to_string()
            }]
        );
    }

    #[test]
    fn test_snapshot_drops_absent_vehicles() {
        let mut engine = engine();
        engine.ingest(update("a", 17.4, 78.4, 1_000), 0);
        engine.ingest(update("b", 17.5, 78.5, 1_000), 0);
        engine.render_frame(0);

        engine.ingest(
            FeedMessage::Snapshot {
                vehicles: vec![VehiclePosition::new("b", 17.6, 78.5, 2_000)],
            },
            100,
        );
        assert_eq!(engine.vehicle_count(), 1);

        let frame = engine.render_frame(100);
        assert_eq!(frame.positions.len(), 1);
        assert!(frame.commands.contains(&MarkerCommand::Destroy {
            vehicle_id: "a".to_string()
        }));
    }

    #[test]
    fn test_viewport_change_destroys_and_keeps_eta() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.ingest(eta("bus", 7.0), 0);
        engine.render_frame(0);

        let commands = engine.set_viewport(ViewportBounds::new(10.0, 70.0, 11.0, 71.0), 10);
        assert_eq!(
            commands,
            vec![MarkerCommand::Destroy {
                vehicle_id: "bus".to_string()
            }]
        );
        // Off-screen vehicles keep animating, ranking and ETA state
        assert_eq!(engine.render_frame(20).positions.len(), 1);
        assert_eq!(engine.eta("bus").unwrap().formatted, "7 min");
        assert_eq!(engine.suggestions(17.4, 78.4, 3), vec!["bus"]);
    }

    #[test]
    fn test_eta_smoothing_through_engine() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.ingest(eta("bus", 20.0), 0);
        engine.ingest(eta("bus", 10.0), 0);
        let display = engine.eta("bus").unwrap();
        assert_eq!(display.minutes, 18.0);
        assert!(display.is_smoothed);
        assert_eq!(display.formatted, "18 min");

        engine.ingest(
            FeedMessage::Eta {
                vehicle_id: "bus".to_string(),
                raw_eta_minutes: None,
            },
            0,
        );
        assert!(engine.eta("bus").is_none());
    }

    #[test]
    fn test_eta_ignored_once_vehicle_is_gone() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.ingest(
            FeedMessage::Remove {
                vehicle_id: "bus".to_string(),
            },
            10,
        );
        engine.ingest(eta("bus", 5.0), 20);
        engine.ingest(eta("never-seen", 3.0), 20);
        engine.ingest(FeedMessage::Snapshot { vehicles: vec![] }, 30);

        assert_eq!(engine.vehicle_count(), 0);
        assert!(engine.eta("bus").is_none());
        assert!(engine.eta("never-seen").is_none());

        // A vehicle that reappears starts with a fresh first observation
        engine.ingest(update("bus", 17.4, 78.4, 2_000), 40);
        engine.ingest(eta("bus", 9.0), 40);
        let display = engine.eta("bus").unwrap();
        assert_eq!(display.minutes, 9.0);
        assert!(!display.is_smoothed);
    }

    #[test]
    fn test_local_suggestions() {
        let mut engine = engine();
        let vehicles = [
            ("full", OccupancyLevel::Full, 1.0),
            ("high", OccupancyLevel::High, 3.0),
            ("low", OccupancyLevel::Low, 3.0),
            ("late", OccupancyLevel::Low, 9.0),
        ];
        for (id, occupancy, minutes) in vehicles {
            let position = VehiclePosition::new(id, 17.4, 78.4, 1_000).with_occupancy(occupancy);
            engine.ingest(FeedMessage::Update(position), 0);
            engine.ingest(eta(id, minutes), 0);
        }
        engine.ingest(update("unknown-eta", 17.4, 78.4, 1_000), 0);

        assert_eq!(
            engine.suggestions(17.4, 78.4, 10),
            vec!["low", "high", "late", "unknown-eta"]
        );
        assert_eq!(engine.suggestions(17.4, 78.4, 2), vec!["low", "high"]);
    }

    #[test]
    fn test_server_ranking_overrides_local() {
        let mut engine = engine();
        engine.ingest(update("a", 17.4, 78.4, 1_000), 0);
        engine.ingest(update("b", 17.4, 78.4, 1_000), 0);
        engine.ingest(eta("a", 2.0), 0);

        let server = |id: &str, minutes: Option<f64>| ServerSuggestion {
            vehicle_id: id.to_string(),
            raw_eta_minutes: minutes,
            reason: "closest".to_string(),
            score: 1.0,
        };
        engine.ingest(
            FeedMessage::Suggestions {
                ranked: vec![server("b", Some(4.0)), server("gone", None), server("a", None)],
            },
            0,
        );
        assert_eq!(engine.suggestions(17.4, 78.4, 5), vec!["b", "a"]);
        assert_eq!(engine.eta("b").unwrap().minutes, 4.0);

        engine.clear_server_ranking();
        assert_eq!(engine.suggestions(17.4, 78.4, 5), vec!["a", "b"]);
    }

    #[test]
    fn test_sweep_stale_respects_config() {
        let mut engine = engine();
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.render_frame(0);
        assert!(engine.sweep_stale(120_000).is_empty());
        assert!(engine.render_frame(120_000).positions[0].stale);

        let mut engine = LiveEngine::new(EngineConfig {
            evict_stale: true,
            ..Default::default()
        });
        engine.set_viewport(ViewportBounds::new(17.0, 78.0, 18.0, 79.0), 0);
        engine.ingest(update("bus", 17.4, 78.4, 1_000), 0);
        engine.render_frame(0);

        assert!(engine.sweep_stale(1_000).is_empty());
        assert_eq!(engine.sweep_stale(120_000), vec!["bus"]);
        let frame = engine.render_frame(120_000);
        assert!(frame.positions.is_empty());
        assert_eq!(
            frame.commands,
            vec![MarkerCommand::Destroy {
                vehicle_id: "bus".to_string()
            }]
        );
    }

    #[test]
    fn test_visible_routes() {
        let mut engine = engine();
        let near = RouteGeometry::from_lng_lat_pairs("near", &[[78.4, 17.4], [78.5, 17.5]]).unwrap();
        let far = RouteGeometry::from_lng_lat_pairs("far", &[[10.0, 10.0], [10.1, 10.1]]).unwrap();
        engine.routes_mut().add_route(near);
        engine.routes_mut().add_route(far);

        let ids: Vec<&str> = engine.visible_routes().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["near"]);
    }

    #[test]
    fn test_owned_stop_cache() {
        let mut engine = engine();
        let stops = engine
            .stops_mut()
            .get_or_try_load(|| Ok(vec![Stop::new("s1", "Ameerpet", 17.4375, 78.4483)]))
            .unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(engine.stops().nearest(17.44, 78.45).unwrap().0.id, "s1");
    }
}
