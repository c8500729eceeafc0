use clap::Parser;
use live_transit_lib::{EngineConfig, InterpolationConfig, ViewportBounds, ViewportConfig};
use std::path::PathBuf;

/// Rider location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Origin {
    pub lat: f64,
    pub lng: f64,
}

/// Parse exactly `N` comma-separated finite numbers
fn parse_numbers<const N: usize>(value: &str) -> Result<[f64; N], String> {
    let numbers = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .ok_or_else(|| format!("'{}' is not a finite number", part.trim()))
        })
        .collect::<Result<Vec<f64>, String>>()?;
    numbers
        .try_into()
        .map_err(|numbers: Vec<f64>| format!("expected {N} values, got {}", numbers.len()))
}

fn parse_viewport(value: &str) -> Result<ViewportBounds, String> {
    let [sw_lat, sw_lng, ne_lat, ne_lng] = parse_numbers::<4>(value)?;
    Ok(ViewportBounds::new(sw_lat, sw_lng, ne_lat, ne_lng))
}

fn parse_origin(value: &str) -> Result<Origin, String> {
    let [lat, lng] = parse_numbers::<2>(value)?;
    Ok(Origin { lat, lng })
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Live Transit Replay - feeds a recorded vehicle stream through the live engine
pub struct Settings {
    /// JSON-lines feed recording (one `{"receivedAt": ms, "type": ...}` message per line)
    #[clap(short, long, value_name = "FILE")]
    pub feed: PathBuf,

    /// Route shapes: `.gpx` files, or `.json` maps of route id to `[[lng, lat], ...]` or an
    /// encoded polyline
    #[clap(short, long, value_name = "FILE")]
    pub routes: Vec<PathBuf>,

    /// JSON array of stops `{id, name, lat, lng}`
    #[clap(long, value_name = "FILE")]
    pub stops: Option<PathBuf>,

    /// Render frames per second of the simulated clock
    #[clap(long, default_value = "30")]
    pub fps: u32,

    /// Print a status report every this many milliseconds of render time
    #[clap(long, default_value = "1000")]
    pub report_every_ms: i64,

    /// Print every rendered frame as JSON instead of periodic reports only
    #[clap(long, default_value = "false")]
    pub print_frames: bool,

    /// Visible area as `sw_lat,sw_lng,ne_lat,ne_lng` (defaults to the routes' extent)
    #[clap(long, value_parser = parse_viewport, allow_hyphen_values = true)]
    pub viewport: Option<ViewportBounds>,

    /// Viewport padding in degrees
    #[clap(long, default_value = "0.005")]
    pub padding: f64,

    /// Rider location as `lat,lng` used for suggestions and the nearest stop
    #[clap(long, value_parser = parse_origin, allow_hyphen_values = true)]
    pub origin: Option<Origin>,

    /// Number of suggestions in each report
    #[clap(long, default_value = "3")]
    pub suggestions: usize,

    /// Fixed interpolation window in milliseconds (disables adaptive sizing)
    #[clap(long)]
    pub fixed_duration_ms: Option<i64>,

    /// Milliseconds without updates before a vehicle is stale
    #[clap(long, default_value = "60000")]
    pub stale_after_ms: i64,

    /// Remove stale vehicles instead of freezing them
    #[clap(long, default_value = "false")]
    pub evict_stale: bool,
}

impl Settings {
    /// Parse from the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Engine configuration derived from the flags
    pub fn engine_config(&self) -> EngineConfig {
        let mut interpolation = InterpolationConfig {
            stale_after_ms: self.stale_after_ms,
            ..Default::default()
        };
        if let Some(duration) = self.fixed_duration_ms {
            interpolation.adaptive_duration = false;
            interpolation.default_duration_ms = duration.max(1);
        }
        EngineConfig {
            interpolation,
            viewport: ViewportConfig {
                padding_degrees: self.padding,
            },
            evict_stale: self.evict_stale,
        }
    }

    /// Render tick length in milliseconds
    pub fn frame_interval_ms(&self) -> i64 {
        (1000 / i64::from(self.fps.max(1))).max(1)
    }
}
