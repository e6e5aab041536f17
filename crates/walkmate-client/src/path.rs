//! Turns the ordered sample list into what the map draws.

use tokio::sync::watch;
use tracing::debug;

use walkmate_shared::{Coordinate, LocationSample};

/// Smallest rectangle covering every point of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

impl Bounds {
    /// `None` for an empty path.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Bounds {
            south_west: *first,
            north_east: *first,
        };
        for p in &points[1..] {
            bounds.south_west.latitude = bounds.south_west.latitude.min(p.latitude);
            bounds.south_west.longitude = bounds.south_west.longitude.min(p.longitude);
            bounds.north_east.latitude = bounds.north_east.latitude.max(p.latitude);
            bounds.north_east.longitude = bounds.north_east.longitude.max(p.longitude);
        }
        Some(bounds)
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        (self.south_west.latitude..=self.north_east.latitude).contains(&point.latitude)
            && (self.south_west.longitude..=self.north_east.longitude).contains(&point.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedPath {
    /// Samples in creation order, joined end to end.
    pub polyline: Vec<Coordinate>,
    pub bounds: Option<Bounds>,
}

impl RenderedPath {
    pub fn from_samples(samples: &[LocationSample]) -> Self {
        let polyline: Vec<Coordinate> = samples.iter().map(LocationSample::coordinate).collect();
        let bounds = Bounds::from_points(&polyline);
        Self { polyline, bounds }
    }

    pub fn is_empty(&self) -> bool {
        self.polyline.is_empty()
    }
}

/// The external map widget.
pub trait MapSurface: Send + 'static {
    fn clear_path(&mut self);
    fn draw_polyline(&mut self, points: &[Coordinate]);
    fn fit_bounds(&mut self, bounds: Bounds);
}

pub struct PathRenderer {
    surface: Box<dyn MapSurface>,
    last: RenderedPath,
}

impl PathRenderer {
    pub fn new(surface: Box<dyn MapSurface>) -> Self {
        Self {
            surface,
            last: RenderedPath::default(),
        }
    }

    /// Redraw the whole path. The previous line is always discarded first.
    pub fn render(&mut self, samples: &[LocationSample]) -> &RenderedPath {
        let path = RenderedPath::from_samples(samples);

        self.surface.clear_path();
        if !path.is_empty() {
            self.surface.draw_polyline(&path.polyline);
        }
        if let Some(bounds) = path.bounds {
            self.surface.fit_bounds(bounds);
        }

        debug!(points = path.polyline.len(), "Path rendered");
        self.last = path;
        &self.last
    }
}

/// A surface that publishes every redraw; for hosts that render elsewhere.
pub struct WatchSurface {
    tx: watch::Sender<RenderedPath>,
    pending: RenderedPath,
}

impl WatchSurface {
    pub fn new() -> (Self, watch::Receiver<RenderedPath>) {
        let (tx, rx) = watch::channel(RenderedPath::default());
        (
            Self {
                tx,
                pending: RenderedPath::default(),
            },
            rx,
        )
    }

    fn publish(&self) {
        self.tx.send_replace(self.pending.clone());
    }
}

impl MapSurface for WatchSurface {
    fn clear_path(&mut self) {
        self.pending = RenderedPath::default();
        self.publish();
    }

    fn draw_polyline(&mut self, points: &[Coordinate]) {
        self.pending.polyline = points.to_vec();
        self.publish();
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        self.pending.bounds = Some(bounds);
        self.publish();
    }
}
