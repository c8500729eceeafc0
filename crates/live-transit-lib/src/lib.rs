//! Live Transit Library - Position Interpolation & Suggestion Engine
//!
//! This library turns sparse, jittery vehicle-position broadcasts into something a live map
//! can render at frame rate: road-accurate display positions, calm ETA values and a stable
//! "best vehicle" ranking.
//!
//! # Architecture
//!
//! - **[`snap`]**: projects raw coordinates onto route polylines and walks along them
//! - **[`RouteGeometry`]** / **[`RouteCollection`]**: immutable route shapes with cached lengths
//! - **[`PositionStore`]**: authoritative latest + previous raw sample per vehicle
//! - **[`Interpolator`]**: per-frame display positions on a render clock decoupled from the feed
//! - **[`MarkerLifecycle`]**: viewport culling emitting abstract marker commands
//! - **[`EtaSmoother`]**: low-pass filter for per-vehicle ETA values
//! - **[`ranking`]**: single composite-key suggestion ordering
//! - **[`LiveEngine`]**: owns all of the above and routes feed messages through them
//!
//! # Performance Characteristics
//!
//! - **Snapping**: O(S) per call, S = segments in the route
//! - **Frame**: O(V) per render tick, V = tracked vehicles
//! - **Viewport settle**: O(V), independent of route and suggestion-list size

mod collection;
mod engine;
mod eta;
mod feed;
mod interpolation;
pub mod polyline;
pub mod ranking;
mod route;
pub mod snap;
mod stops;
mod store;
pub mod utils;
mod viewport;

// Public API exports
pub use collection::{CollectionInfo, RouteCollection};
pub use engine::{EngineConfig, EtaDisplay, Frame, LiveEngine};
pub use eta::{EtaSmoother, SmoothedEta, format_eta};
pub use feed::{FeedMessage, ServerSuggestion, VehiclePosition};
pub use interpolation::{DisplayPosition, InterpolationConfig, Interpolator, VehicleDisplayState};
pub use ranking::{OccupancyLevel, SuggestionCandidate};
pub use route::RouteGeometry;
pub use snap::ProjectedPosition;
pub use stops::{Stop, StopCache};
pub use store::{ApplyOutcome, PositionStore};
pub use viewport::{MarkerCommand, MarkerLifecycle, ViewportBounds, ViewportConfig};

/// Identifier of a vehicle as delivered by the transport layer
pub type VehicleId = String;

/// Identifier of a route geometry
pub type RouteId = String;

/// Milliseconds on either the feed clock or the render clock
pub type TimestampMs = i64;

/// Error types for geometry and data ingestion
///
/// Nothing on the render path returns these: snapping, interpolation, smoothing and ranking
/// degrade to a "no result" value instead. Only loading route shapes, stops and files can fail.
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Polyline decode error at byte {position}: {reason}")]
    PolylineDecode { position: usize, reason: String },

    #[error("Stop loading failed: {0}")]
    StopLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty route")]
    EmptyRoute,
}

pub type Result<T> = std::result::Result<T, TransitError>;
