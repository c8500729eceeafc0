//! RouteCollection - owner of all known route geometries
//!
//! Geometry is immutable once loaded and shared as `Arc<RouteGeometry>` with the
//! interpolator, so a route can be replaced or removed without touching vehicles that
//! are already animating along the old shape.

use crate::{Result, RouteGeometry, RouteId, utils};

use geo::{Coord, Rect};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Information about the route collection
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of routes loaded
    pub route_count: usize,
    /// Total number of vertices
    pub total_vertices: usize,
    /// Total length in meters
    pub total_length_meters: f64,
}

/// Top-level manager for route geometries
#[derive(Clone, Debug, Default)]
pub struct RouteCollection {
    /// All loaded routes by id
    routes: HashMap<RouteId, Arc<RouteGeometry>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a route
    pub fn add_route(&mut self, route: Arc<RouteGeometry>) {
        let id = route.id().to_string();
        if self.routes.insert(id.clone(), route).is_some() {
            tracing::debug!("Replaced geometry for route {}", id);
        }
    }

    /// Decode multiple encoded polylines in parallel and add them
    ///
    /// Either every route is added or, on the first failure, none are.
    pub fn add_encoded_routes_parallel(&mut self, encoded: Vec<(RouteId, String)>) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::add_encoded_routes_parallel");

        let routes: Result<Vec<Arc<RouteGeometry>>> = encoded
            .into_par_iter()
            .map(|(id, polyline)| RouteGeometry::from_encoded(id, &polyline))
            .collect();

        for route in routes? {
            self.add_route(route);
        }
        Ok(())
    }

    /// Load routes from GPX files in parallel; each route id is the file stem
    pub fn load_gpx_files<P: AsRef<Path> + Send + Sync>(&mut self, paths: Vec<P>) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::load_gpx_files");

        let routes: Result<Vec<Arc<RouteGeometry>>> = paths
            .into_par_iter()
            .map(|path| {
                let path = path.as_ref();
                let id = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                let gpx_data = gpx::read(reader)?;
                RouteGeometry::from_gpx(id, &gpx_data)
            })
            .collect();

        let routes = routes?;
        tracing::info!("Loaded {} GPX route(s)", routes.len());
        for route in routes {
            self.add_route(route);
        }
        Ok(())
    }

    /// Get a route by id
    #[inline]
    pub fn get(&self, id: &str) -> Option<&Arc<RouteGeometry>> {
        self.routes.get(id)
    }

    /// Remove a route, returning it if present
    pub fn remove(&mut self, id: &str) -> Option<Arc<RouteGeometry>> {
        self.routes.remove(id)
    }

    /// Get total number of routes
    #[inline]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Check if the collection is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over all routes in unspecified order
    pub fn routes(&self) -> impl Iterator<Item = &Arc<RouteGeometry>> {
        self.routes.values()
    }

    /// Clear all routes from the collection
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Get collection information
    pub fn get_info(&self) -> CollectionInfo {
        CollectionInfo {
            route_count: self.routes.len(),
            total_vertices: self.routes.values().map(|r| r.vertex_count()).sum(),
            total_length_meters: self.routes.values().map(|r| r.length_meters()).sum(),
        }
    }

    /// Combined bounding box of all routes in degrees, `None` when empty
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.routes
            .values()
            .map(|route| route.bounding_box())
            .reduce(|acc, bbox| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(bbox.min().x),
                        y: acc.min().y.min(bbox.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(bbox.max().x),
                        y: acc.max().y.max(bbox.max().y),
                    },
                )
            })
    }

    /// Center of all routes as `(lat, lng)`, `None` when empty
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bounding_box().map(|bbox| {
            let center = utils::lerp_coord(bbox.min(), bbox.max(), 0.5);
            (center.y, center.x)
        })
    }
}
