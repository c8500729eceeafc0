//! Performance benchmarks for live-transit-lib
//!
//! Run with: cargo bench --package live-transit-lib
//!
//! Covers the hot paths: snapping, the per-frame tick and ranking.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Coord, Point};
use gpx::{Gpx, Track, TrackSegment, Waypoint};
use live_transit_lib::{
    EngineConfig, FeedMessage, LiveEngine, OccupancyLevel, RouteGeometry, SuggestionCandidate,
    VehiclePosition, ViewportBounds, ranking,
};

/// Generate a wiggly GPX track with the specified number of points.
fn generate_gpx_track(num_points: usize, base_lat: f64, base_lon: f64) -> Gpx {
    let mut gpx = Gpx::default();
    let mut track = Track::default();
    let mut segment = TrackSegment::default();

    for i in 0..num_points {
        let t = i as f64 / num_points as f64;
        let lat = base_lat + t * 0.1 + (t * 50.0).sin() * 0.001;
        let lon = base_lon + t * 0.1 + (t * 30.0).cos() * 0.001;
        segment.points.push(Waypoint::new(Point::new(lon, lat)));
    }

    track.segments.push(segment);
    gpx.tracks.push(track);
    gpx
}

/// Engine with `vehicles` buses spread over one route, each mid-animation
fn engine_with_vehicles(vehicles: usize) -> LiveEngine {
    let mut engine = LiveEngine::new(EngineConfig::default());
    let route = RouteGeometry::from_gpx("r1", &generate_gpx_track(2_000, 17.4, 78.4)).unwrap();
    engine.routes_mut().add_route(route);
    engine.set_viewport(ViewportBounds::new(17.40, 78.40, 17.45, 78.45), 0);

    for i in 0..vehicles {
        let t = i as f64 / vehicles as f64;
        let id = format!("bus-{i}");
        for (step, now) in [(0.0, 0), (0.0005, 1_000)] {
            let position =
                VehiclePosition::new(id.clone(), 17.4 + t * 0.1 + step, 78.4 + t * 0.1, now + 1)
                    .with_route("r1");
            engine.ingest(FeedMessage::Update(position), now);
        }
    }
    engine
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_snap(c: &mut Criterion) {
    let mut group = c.benchmark_group("snap");

    for &vertices in &[100usize, 5_000, 50_000] {
        let route =
            RouteGeometry::from_gpx("bench", &generate_gpx_track(vertices, 51.5, -0.1)).unwrap();
        let point = Coord {
            x: -0.05,
            y: 51.55,
        };
        group.throughput(Throughput::Elements(vertices as u64));
        group.bench_with_input(BenchmarkId::new("route", vertices), &route, |b, route| {
            b.iter(|| route.snap(point));
        });
    }

    let route = RouteGeometry::from_gpx("bench", &generate_gpx_track(5_000, 51.5, -0.1)).unwrap();
    group.bench_function("walk_5k", |b| {
        b.iter(|| route.walk(0.2, 0.8, 0.5));
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    group.sample_size(30);

    for &vehicles in &[100usize, 1_000] {
        let mut engine = engine_with_vehicles(vehicles);
        group.throughput(Throughput::Elements(vehicles as u64));
        group.bench_function(BenchmarkId::new("render", vehicles), |b| {
            let mut now = 1_000;
            b.iter(|| {
                now += 16;
                engine.render_frame(now)
            });
        });
    }

    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");

    let occupancy = [
        OccupancyLevel::Low,
        OccupancyLevel::Medium,
        OccupancyLevel::High,
        OccupancyLevel::Full,
    ];
    let candidates: Vec<SuggestionCandidate> = (0..1_000)
        .map(|i| SuggestionCandidate {
            vehicle_id: format!("bus-{i}"),
            eta_minutes: Some((i % 30) as f64),
            occupancy: occupancy[i % occupancy.len()],
            distance_km: (i % 17) as f64 * 0.3,
        })
        .collect();

    group.throughput(Throughput::Elements(candidates.len() as u64));
    group.bench_function("smart_suggestions_1k", |b| {
        b.iter(|| ranking::smart_suggestions(&candidates, 5));
    });

    group.finish();
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    group.sample_size(20);

    let gpx = generate_gpx_track(50_000, 51.5, -0.1);
    group.throughput(Throughput::Elements(50_000));
    group.bench_function("from_gpx_50k", |b| {
        b.iter(|| RouteGeometry::from_gpx("bench", &gpx).unwrap());
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_snap,
    bench_frame,
    bench_ranking,
    bench_construction,
);

criterion_main!(benches);
