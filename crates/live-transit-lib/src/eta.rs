//! ETA smoothing
//!
//! Backend ETAs are recomputed on every update and jump around. Small changes pass
//! straight through; larger ones are blended with the previous display value, and the
//! largest are damped hardest since single big jumps are usually recomputation noise.

use crate::VehicleId;
use std::collections::HashMap;

/// Relative change above which the heavy blend applies
const HEAVY_DAMPING_THRESHOLD: f64 = 0.40;

/// Relative change above which the normal blend applies
const NORMAL_DAMPING_THRESHOLD: f64 = 0.18;

/// Weight of the raw value under heavy damping
const HEAVY_RAW_WEIGHT: f64 = 0.2;

/// Weight of the raw value under normal damping
const NORMAL_RAW_WEIGHT: f64 = 0.3;

/// Output of [`EtaSmoother::smooth`]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothedEta {
    pub display_minutes: f64,
    /// Whether damping altered the raw value
    pub is_smoothed: bool,
}

/// Per-vehicle ETA low-pass filter; one scalar of state per vehicle
#[derive(Clone, Debug, Default)]
pub struct EtaSmoother {
    previous_display: HashMap<VehicleId, f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl EtaSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw ETA and get the value to display
    ///
    /// `None`, negative and NaN inputs clear the vehicle's state and yield `None`.
    pub fn smooth(&mut self, vehicle_id: &str, raw_minutes: Option<f64>) -> Option<SmoothedEta> {
        let raw = match raw_minutes {
            Some(raw) if raw.is_finite() && raw >= 0.0 => raw,
            _ => {
                self.previous_display.remove(vehicle_id);
                return None;
            }
        };

        let Some(previous) = self.previous(vehicle_id) else {
            self.previous_display.insert(vehicle_id.to_string(), raw);
            return Some(SmoothedEta {
                display_minutes: raw,
                is_smoothed: false,
            });
        };

        let delta = (raw - previous).abs() / previous.max(1.0);
        let raw_weight = if delta > HEAVY_DAMPING_THRESHOLD {
            Some(HEAVY_RAW_WEIGHT)
        } else if delta > NORMAL_DAMPING_THRESHOLD {
            Some(NORMAL_RAW_WEIGHT)
        } else {
            None
        };

        let result = match raw_weight {
            Some(weight) => {
                let blended = ((1.0 - weight) * previous + weight * raw).round();
                tracing::trace!(
                    "ETA for {} damped: previous={} raw={} display={}",
                    vehicle_id,
                    previous,
                    raw,
                    blended
                );
                SmoothedEta {
                    display_minutes: blended,
                    is_smoothed: true,
                }
            }
            None => SmoothedEta {
                display_minutes: raw,
                is_smoothed: false,
            },
        };

        if let Some(slot) = self.previous_display.get_mut(vehicle_id) {
            *slot = result.display_minutes;
        }
        Some(result)
    }

    /// Last displayed value for a vehicle, if any
    #[inline]
    pub fn previous(&self, vehicle_id: &str) -> Option<f64> {
        self.previous_display.get(vehicle_id).copied()
    }

    /// Forget one vehicle
    pub fn reset(&mut self, vehicle_id: &str) {
        self.previous_display.remove(vehicle_id);
    }

    /// Forget every vehicle
    pub fn reset_all(&mut self) {
        self.previous_display.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.previous_display.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.previous_display.is_empty()
    }
}

/// Human-readable ETA: "arriving now", "n min" or "Hh Mm"
pub fn format_eta(minutes: f64) -> String {
    if minutes.is_nan() || minutes < 1.0 {
        return "arriving now".to_string();
    }
    let total = minutes.round() as i64;
    if total < 60 {
        format!("{total} min")
    } else {
        format!("{}h {}m", total / 60, total % 60)
    }
}
