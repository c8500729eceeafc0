//! Feed loading and the simulated render loop

use crate::error::{ReplayError, Result};
use crate::settings::Settings;
use live_transit_lib::{
    EtaDisplay, FeedMessage, Frame, LiveEngine, RouteCollection, RouteGeometry, Stop,
    TimestampMs, TransitError, VehicleId, ViewportBounds,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// One line of a feed recording
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    /// Arrival time on the client clock
    pub received_at: TimestampMs,
    #[serde(flatten)]
    pub message: FeedMessage,
}

/// Route shape inside a `.json` route file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RouteShape {
    Encoded(String),
    Coordinates(Vec<[f64; 2]>),
}

/// Periodic status line
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub timestamp: TimestampMs,
    pub tracked: usize,
    pub visible: usize,
    pub stale: usize,
    pub etas: BTreeMap<VehicleId, EtaDisplay>,
    pub suggestions: Vec<VehicleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_stop: Option<String>,
}

/// Totals logged when the replay ends
#[derive(Debug, Default)]
pub struct Summary {
    pub messages: usize,
    pub frames: usize,
    pub marker_commands: usize,
    pub evicted: usize,
}

/// Read a JSON-lines feed, sorted by arrival time (stable for equal times)
pub fn load_feed(path: &Path) -> Result<Vec<FeedRecord>> {
    let file = std::fs::File::open(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut records = parse_feed(std::io::BufReader::new(file), path)?;
    records.sort_by_key(|record| record.received_at);
    tracing::info!("Loaded {} feed messages from {}", records.len(), path.display());
    Ok(records)
}

fn parse_feed<R: BufRead>(reader: R, path: &Path) -> Result<Vec<FeedRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| ReplayError::Json {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Load every route file into the collection
pub fn load_routes(collection: &mut RouteCollection, paths: &[PathBuf]) -> Result<()> {
    let (gpx, other): (Vec<&PathBuf>, Vec<&PathBuf>) =
        paths.iter().partition(|path| has_extension(path, "gpx"));

    if !gpx.is_empty() {
        collection.load_gpx_files(gpx)?;
    }
    for path in other {
        if !has_extension(path, "json") {
            return Err(ReplayError::UnsupportedRouteFile(path.clone()));
        }
        load_json_routes(collection, path)?;
    }

    let info = collection.get_info();
    tracing::info!(
        "Routes ready: {} routes, {} vertices, {:.1} km",
        info.route_count,
        info.total_vertices,
        info.total_length_meters / 1000.0
    );
    Ok(())
}

fn load_json_routes(collection: &mut RouteCollection, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let shapes: BTreeMap<String, RouteShape> =
        serde_json::from_str(&text).map_err(|source| ReplayError::Json {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })?;

    let mut encoded = Vec::new();
    for (id, shape) in shapes {
        match shape {
            RouteShape::Encoded(polyline) => encoded.push((id, polyline)),
            RouteShape::Coordinates(pairs) => {
                collection.add_route(RouteGeometry::from_lng_lat_pairs(id, &pairs)?);
            }
        }
    }
    if !encoded.is_empty() {
        collection.add_encoded_routes_parallel(encoded)?;
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Read a JSON array of stops
pub fn load_stops(path: &Path) -> live_transit_lib::Result<Vec<Stop>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| TransitError::StopLoad(format!("{}: {}", path.display(), e)))
}

/// Run the whole replay, writing JSON lines to `out`
pub fn run<W: Write>(settings: &Settings, out: &mut W) -> Result<Summary> {
    let mut engine = LiveEngine::new(settings.engine_config());
    load_routes(engine.routes_mut(), &settings.routes)?;

    if let Some(path) = &settings.stops {
        let stops = engine.stops_mut().get_or_try_load(|| load_stops(path))?;
        tracing::info!("{} stops available", stops.len());
    }

    let records = load_feed(&settings.feed)?;
    tracing::debug!(
        "Feed covers {} vehicles",
        messages_per_vehicle(&records).len()
    );
    replay(&mut engine, records, settings, out)
}

/// Drive the engine over a recorded feed on a simulated render clock
pub fn replay<W: Write>(
    engine: &mut LiveEngine,
    records: Vec<FeedRecord>,
    settings: &Settings,
    out: &mut W,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        tracing::warn!("Feed is empty, nothing to replay");
        return Ok(summary);
    };
    let start = first.received_at;
    // Keep rendering long enough for the last window to finish
    let end = last.received_at + engine.config().interpolation.longest_window_ms();

    let viewport = settings
        .viewport
        .or_else(|| routes_extent(engine.routes()))
        .or_else(|| feed_extent(&records));
    if let Some(bounds) = viewport {
        tracing::info!("Viewport: {:?}", bounds);
        summary.marker_commands += engine.set_viewport(bounds, start).len();
    }

    let interval = settings.frame_interval_ms();
    let report_every = settings.report_every_ms.max(interval);
    let mut next_report = start;
    let mut pending = records.into_iter().peekable();
    let mut now = start;

    while now <= end {
        while let Some(record) = pending.next_if(|record| record.received_at <= now) {
            engine.ingest(record.message, now);
            summary.messages += 1;
        }

        summary.evicted += engine.sweep_stale(now).len();
        let frame = engine.render_frame(now);
        summary.frames += 1;
        summary.marker_commands += frame.commands.len();

        if settings.print_frames {
            write_line(out, &frame)?;
        }
        if now >= next_report {
            write_line(out, &report(engine, &frame, settings))?;
            next_report += report_every;
        }
        now += interval;
    }

    tracing::info!(
        "Replay finished: {} messages, {} frames, {} marker commands",
        summary.messages,
        summary.frames,
        summary.marker_commands
    );
    Ok(summary)
}

fn report(engine: &LiveEngine, frame: &Frame, settings: &Settings) -> Report {
    let visible = frame
        .positions
        .iter()
        .filter(|position| engine.markers().is_realized(&position.vehicle_id))
        .count();
    let etas = frame
        .positions
        .iter()
        .filter_map(|position| {
            engine
                .eta(&position.vehicle_id)
                .map(|eta| (position.vehicle_id.clone(), eta))
        })
        .collect();
    let (suggestions, nearest_stop) = match settings.origin {
        Some(origin) => (
            engine.suggestions(origin.lat, origin.lng, settings.suggestions),
            engine
                .stops()
                .nearest(origin.lat, origin.lng)
                .map(|(stop, _)| stop.name.clone()),
        ),
        None => (Vec::new(), None),
    };

    Report {
        timestamp: frame.timestamp,
        tracked: frame.positions.len(),
        visible,
        stale: frame.positions.iter().filter(|p| p.stale).count(),
        etas,
        suggestions,
        nearest_stop,
    }
}

fn write_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

fn routes_extent(routes: &RouteCollection) -> Option<ViewportBounds> {
    let rect = routes.bounding_box()?;
    Some(ViewportBounds::new(
        rect.min().y,
        rect.min().x,
        rect.max().y,
        rect.max().x,
    ))
}

fn feed_extent(records: &[FeedRecord]) -> Option<ViewportBounds> {
    let mut positions = records
        .iter()
        .flat_map(|record| match &record.message {
            FeedMessage::Update(position) => std::slice::from_ref(position),
            FeedMessage::Snapshot { vehicles } => vehicles.as_slice(),
            _ => &[],
        })
        .filter(|position| position.is_valid());
    let first = positions.next()?;
    let (mut min_lat, mut min_lng, mut max_lat, mut max_lng) =
        (first.lat, first.lng, first.lat, first.lng);
    for position in positions {
        min_lat = min_lat.min(position.lat);
        min_lng = min_lng.min(position.lng);
        max_lat = max_lat.max(position.lat);
        max_lng = max_lng.max(position.lng);
    }
    Some(ViewportBounds::new(min_lat, min_lng, max_lat, max_lng))
}

/// Number of messages per vehicle, for the startup log
pub fn messages_per_vehicle(records: &[FeedRecord]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for record in records {
        if let Some(id) = record.message.vehicle_id() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}
