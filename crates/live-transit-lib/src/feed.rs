//! Messages delivered by the transport layer
//!
//! The transport itself (socket, polling) is not part of this crate. These are the values
//! it hands over, in the shape the live feed uses on the wire when the `serde` feature is on.

use crate::{OccupancyLevel, RouteId, TimestampMs, VehicleId, utils};
use geo::Coord;

/// A raw vehicle position sample
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VehiclePosition {
    #[cfg_attr(feature = "serde", serde(rename = "vehicleId"))]
    pub id: VehicleId,
    pub lat: f64,
    pub lng: f64,
    /// Reported heading in degrees; noisy, used only when the vehicle barely moved
    #[cfg_attr(feature = "serde", serde(default))]
    pub heading: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub speed_kph: f64,
    /// Feed timestamp in milliseconds
    pub timestamp: TimestampMs,
    #[cfg_attr(feature = "serde", serde(default))]
    pub route_id: Option<RouteId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub occupancy: Option<OccupancyLevel>,
}

impl VehiclePosition {
    /// Minimal sample without route or occupancy information
    pub fn new(id: impl Into<VehicleId>, lat: f64, lng: f64, timestamp: TimestampMs) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            heading: 0.0,
            speed_kph: 0.0,
            timestamp,
            route_id: None,
            occupancy: None,
        }
    }

    /// Attach a route id
    pub fn with_route(mut self, route_id: impl Into<RouteId>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    /// Attach a reported heading
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    /// Attach an occupancy level
    pub fn with_occupancy(mut self, occupancy: OccupancyLevel) -> Self {
        self.occupancy = Some(occupancy);
        self
    }

    /// Position as a `(longitude, latitude)` coordinate
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        utils::lat_lng(self.lat, self.lng)
    }

    /// Whether the coordinates are finite and within WGS84 bounds
    #[inline]
    pub fn is_valid(&self) -> bool {
        utils::is_valid_coord(self.coord())
    }
}

/// A pre-ranked suggestion from the backend
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ServerSuggestion {
    pub vehicle_id: VehicleId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub raw_eta_minutes: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub reason: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub score: f64,
}

/// One message from the transport layer
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")
)]
pub enum FeedMessage {
    /// Single vehicle position update
    Update(VehiclePosition),
    /// Full refresh; vehicles absent from the list are gone
    Snapshot { vehicles: Vec<VehiclePosition> },
    /// Vehicle explicitly removed from the feed
    Remove { vehicle_id: VehicleId },
    /// Raw backend ETA for a vehicle; `None` or negative means unknown
    Eta {
        vehicle_id: VehicleId,
        raw_eta_minutes: Option<f64>,
    },
    /// Server-side ranking, replacing any previous one
    Suggestions { ranked: Vec<ServerSuggestion> },
}

impl FeedMessage {
    /// Vehicle the message is about, if it targets a single vehicle
    pub fn vehicle_id(&self) -> Option<&str> {
        match self {
            Self::Update(position) => Some(&position.id),
            Self::Remove { vehicle_id } | Self::Eta { vehicle_id, .. } => Some(vehicle_id),
            Self::Snapshot { .. } | Self::Suggestions { .. } => None,
        }
    }
}
