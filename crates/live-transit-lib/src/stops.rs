//! Stop Cache
//!
//! Stops are loaded once through a caller-supplied loader and kept for as long as the owner
//! lives. There is no global: whoever needs stops owns a [`StopCache`].

use crate::{Result, utils};

/// A transit stop
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Stop {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lng,
        }
    }
}

/// Lazily filled, owner-scoped stop list
#[derive(Clone, Debug, Default)]
pub struct StopCache {
    stops: Option<Vec<Stop>>,
}

impl StopCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached stops, running `loader` on first use
    ///
    /// A failing loader leaves the cache empty so the next call retries.
    pub fn get_or_try_load<F>(&mut self, loader: F) -> Result<&[Stop]>
    where
        F: FnOnce() -> Result<Vec<Stop>>,
    {
        if self.stops.is_none() {
            let loaded = loader()?;
            let before = loaded.len();
            let stops: Vec<Stop> = loaded
                .into_iter()
                .filter(|stop| utils::is_valid_coord(utils::lat_lng(stop.lat, stop.lng)))
                .collect();
            if stops.len() != before {
                tracing::warn!("Skipped {} stops with invalid coordinates", before - stops.len());
            }
            tracing::info!("Loaded {} stops", stops.len());
            self.stops = Some(stops);
        }
        Ok(self.stops.as_deref().unwrap_or_default())
    }

    /// Cached stops without loading
    #[inline]
    pub fn get(&self) -> Option<&[Stop]> {
        self.stops.as_deref()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.stops.is_some()
    }

    /// Closest cached stop and its distance in meters
    pub fn nearest(&self, lat: f64, lng: f64) -> Option<(&Stop, f64)> {
        let origin = utils::lat_lng(lat, lng);
        if !utils::is_valid_coord(origin) {
            return None;
        }
        self.stops
            .as_deref()?
            .iter()
            .map(|stop| {
                let distance = utils::haversine_distance(origin, utils::lat_lng(stop.lat, stop.lng));
                (stop, distance)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Drop the cached stops; the next access reloads
    pub fn clear(&mut self) {
        self.stops = None;
    }
}
