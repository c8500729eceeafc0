//! Viewport filtering and marker lifecycle
//!
//! The core never touches rendering objects. It decides which vehicles should have a
//! marker and emits abstract [`MarkerCommand`]s; a renderer-specific adapter owns the real
//! handles. Markers are updated in place while visible and only destroyed when the vehicle
//! leaves the padded viewport or the feed.

use crate::{DisplayPosition, VehicleId, utils};
use geo::{Coord, Rect};
use std::collections::{BTreeSet, HashSet};

/// Padding added around the viewport, in degrees
pub const DEFAULT_PADDING_DEGREES: f64 = 0.005;

/// Configuration for the marker lifecycle
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewportConfig {
    /// Margin kept around the visible rectangle so markers exist slightly before they
    /// scroll into view
    pub padding_degrees: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            padding_degrees: DEFAULT_PADDING_DEGREES,
        }
    }
}

/// Geographic rectangle currently visible to the user
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewportBounds {
    /// `(longitude, latitude)` of the south-west corner
    pub southwest: Coord<f64>,
    /// `(longitude, latitude)` of the north-east corner
    pub northeast: Coord<f64>,
}

impl ViewportBounds {
    /// Build bounds from corner latitudes/longitudes; corners are normalized
    pub fn new(sw_lat: f64, sw_lng: f64, ne_lat: f64, ne_lng: f64) -> Self {
        Self {
            southwest: utils::lat_lng(sw_lat.min(ne_lat), sw_lng.min(ne_lng)),
            northeast: utils::lat_lng(sw_lat.max(ne_lat), sw_lng.max(ne_lng)),
        }
    }

    /// Bounds grown by `padding` degrees on every side
    pub fn padded(&self, padding: f64) -> Self {
        let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
        Self {
            southwest: Coord {
                x: self.southwest.x - padding,
                y: self.southwest.y - padding,
            },
            northeast: Coord {
                x: self.northeast.x + padding,
                y: self.northeast.y + padding,
            },
        }
    }

    /// Inclusive containment: points on the edge are inside
    #[inline]
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.southwest.x
            && coord.x <= self.northeast.x
            && coord.y >= self.southwest.y
            && coord.y <= self.northeast.y
    }

    /// Whether a rectangle (e.g. a route bounding box) overlaps these bounds
    #[inline]
    pub fn intersects(&self, rect: Rect<f64>) -> bool {
        let min = rect.min();
        let max = rect.max();
        !(max.x < self.southwest.x
            || min.x > self.northeast.x
            || max.y < self.southwest.y
            || min.y > self.northeast.y)
    }

    /// As a `geo::Rect` in `(longitude, latitude)`
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(self.southwest, self.northeast)
    }
}

/// Abstract instruction for the rendering adapter
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "op", rename_all = "snake_case"))]
pub enum MarkerCommand {
    Create {
        vehicle_id: VehicleId,
        lat: f64,
        lng: f64,
        heading_deg: f64,
    },
    Update {
        vehicle_id: VehicleId,
        lat: f64,
        lng: f64,
        heading_deg: f64,
    },
    Destroy {
        vehicle_id: VehicleId,
    },
}

impl MarkerCommand {
    pub fn vehicle_id(&self) -> &str {
        match self {
            Self::Create { vehicle_id, .. }
            | Self::Update { vehicle_id, .. }
            | Self::Destroy { vehicle_id } => vehicle_id,
        }
    }
}

/// Tracks which vehicles currently have a realized marker
#[derive(Clone, Debug, Default)]
pub struct MarkerLifecycle {
    config: ViewportConfig,
    /// Padded bounds of the last settled viewport
    bounds: Option<ViewportBounds>,
    realized: BTreeSet<VehicleId>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MarkerLifecycle {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            bounds: None,
            realized: BTreeSet::new(),
        }
    }

    /// Replace the viewport wholesale (call on pan/zoom settle, not per pixel)
    pub fn set_viewport(&mut self, bounds: ViewportBounds) {
        self.bounds = Some(bounds.padded(self.config.padding_degrees));
    }

    /// Padded bounds in effect, if a viewport was set
    #[inline]
    pub fn bounds(&self) -> Option<ViewportBounds> {
        self.bounds
    }

    /// Whether a position would get a marker under the current viewport
    #[inline]
    pub fn is_visible(&self, coord: Coord<f64>) -> bool {
        self.bounds.is_some_and(|bounds| bounds.contains(coord))
    }

    /// Reconcile markers with the current display positions
    ///
    /// `positions` must hold every tracked vehicle; realized markers of vehicles missing
    /// from it are destroyed. O(tracked vehicles).
    pub fn sync(&mut self, positions: &[DisplayPosition]) -> Vec<MarkerCommand> {
        #[cfg(feature = "profiling")]
        profiling::scope!("viewport::sync");

        let mut commands = Vec::new();
        let mut tracked: HashSet<&str> = HashSet::with_capacity(positions.len());

        for position in positions {
            tracked.insert(position.vehicle_id.as_str());

            if self.is_visible(position.coord()) {
                let vehicle_id = position.vehicle_id.clone();
                if self.realized.insert(position.vehicle_id.clone()) {
                    commands.push(MarkerCommand::Create {
                        vehicle_id,
                        lat: position.lat,
                        lng: position.lng,
                        heading_deg: position.heading_deg,
                    });
                } else {
                    commands.push(MarkerCommand::Update {
                        vehicle_id,
                        lat: position.lat,
                        lng: position.lng,
                        heading_deg: position.heading_deg,
                    });
                }
            } else if self.realized.remove(&position.vehicle_id) {
                commands.push(MarkerCommand::Destroy {
                    vehicle_id: position.vehicle_id.clone(),
                });
            }
        }

        let orphaned: Vec<VehicleId> = self
            .realized
            .iter()
            .filter(|id| !tracked.contains(id.as_str()))
            .cloned()
            .collect();
        for vehicle_id in orphaned {
            self.realized.remove(&vehicle_id);
            commands.push(MarkerCommand::Destroy { vehicle_id });
        }

        commands
    }

    /// Destroy a vehicle's marker if it has one; idempotent
    pub fn remove(&mut self, vehicle_id: &str) -> Option<MarkerCommand> {
        self.realized
            .remove(vehicle_id)
            .then(|| MarkerCommand::Destroy {
                vehicle_id: vehicle_id.to_string(),
            })
    }

    #[inline]
    pub fn is_realized(&self, vehicle_id: &str) -> bool {
        self.realized.contains(vehicle_id)
    }

    #[inline]
    pub fn realized_count(&self) -> usize {
        self.realized.len()
    }
}
