mod disasters;
mod help_requests;
mod resources;
mod users;

pub use help_requests::HelpRequestFilter;
pub use resources::ResourceFilter;

use relief_types::geo::{self, BoundingBox};

/// A nearby search: centre `[lon, lat]` plus radius in metres.
#[derive(Debug, Clone, Copy)]
pub struct Near {
    pub center: [f64; 2],
    pub radius_m: f64,
}

impl Near {
    pub fn new(center: [f64; 2], radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    pub(crate) fn bbox(&self) -> BoundingBox {
        BoundingBox::around(self.center, self.radius_m)
    }

    /// Drops candidates outside the radius and orders the rest nearest first.
    pub(crate) fn rank<T>(&self, candidates: Vec<(T, [f64; 2])>) -> Vec<T> {
        let mut scored: Vec<(f64, T)> = candidates
            .into_iter()
            .map(|(item, point)| (geo::haversine_m(self.center, point), item))
            .filter(|(d, _)| *d <= self.radius_m)
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.into_iter().map(|(_, item)| item).collect()
    }
}
