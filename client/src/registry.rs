//! Flat set of live markers kept in painter's-algorithm draw order

use crate::marker::{Marker, MarkerId, MarkerType};
use shared::Dimension;

/// Types later in the list are drawn on top of earlier ones.
pub const DEFAULT_DRAW_ORDER: [MarkerType; 4] = [
    MarkerType::Dimension,
    MarkerType::Trace,
    MarkerType::Dbscan,
    MarkerType::DbscanTrace,
];

/// Position of `marker_type` in `draw_order`, or `usize::MAX` when absent.
fn rank_of(draw_order: &[MarkerType], marker_type: MarkerType) -> usize {
    draw_order
        .iter()
        .position(|t| *t == marker_type)
        .unwrap_or(usize::MAX)
}

pub struct MarkerRegistry {
    markers: Vec<Marker>,
    draw_order: Vec<MarkerType>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::with_draw_order(&DEFAULT_DRAW_ORDER)
    }

    /// Registry with a custom layering; types missing from `draw_order` are drawn last.
    pub fn with_draw_order(draw_order: &[MarkerType]) -> Self {
        Self {
            markers: Vec::new(),
            draw_order: draw_order.to_vec(),
        }
    }

    /// Inserts a marker and restores draw order.
    ///
    /// The sort is stable, so markers of one type keep their insertion order.
    pub fn add(&mut self, marker: Marker) -> MarkerId {
        let id = marker.id();
        self.markers.push(marker);

        let order = &self.draw_order;
        self.markers.sort_by_key(|m| rank_of(order, m.marker_type()));
        id
    }

    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.id() == id)?;
        Some(self.markers.remove(index))
    }

    /// Drops every marker of `marker_type`, returning how many were removed.
    pub fn remove_by_type(&mut self, marker_type: MarkerType) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| m.marker_type() != marker_type);
        before - self.markers.len()
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id() == id)
    }

    pub fn get_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.markers.iter_mut().find(|m| m.id() == id)
    }

    pub fn by_type(&self, marker_type: MarkerType) -> impl Iterator<Item = &Marker> {
        self.markers
            .iter()
            .filter(move |m| m.marker_type() == marker_type)
    }

    pub fn by_type_mut(&mut self, marker_type: MarkerType) -> impl Iterator<Item = &mut Marker> {
        self.markers
            .iter_mut()
            .filter(move |m| m.marker_type() == marker_type)
    }

    pub fn find(&self, marker_type: MarkerType, dimension: Dimension) -> Option<&Marker> {
        self.markers
            .iter()
            .find(|m| m.marker_type() == marker_type && m.dimension() == Some(dimension))
    }

    pub fn find_mut(&mut self, marker_type: MarkerType, dimension: Dimension) -> Option<&mut Marker> {
        self.markers
            .iter_mut()
            .find(|m| m.marker_type() == marker_type && m.dimension() == Some(dimension))
    }

    pub fn dimension_marker(&self, dimension: Dimension) -> Option<&Marker> {
        self.find(MarkerType::Dimension, dimension)
    }

    pub fn dimension_marker_mut(&mut self, dimension: Dimension) -> Option<&mut Marker> {
        self.find_mut(MarkerType::Dimension, dimension)
    }

    /// The latest trace segment of `track_id`, if its history is shown.
    pub fn trace_for_track_mut(&mut self, track_id: u32) -> Option<&mut Marker> {
        self.markers
            .iter_mut()
            .rev()
            .find(|m| m.marker_type() == MarkerType::Trace && m.track_id() == Some(track_id))
    }

    /// Markers in draw order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.markers.iter().map(Marker::len).sum()
    }

    pub fn draw_rank(&self, marker_type: MarkerType) -> usize {
        rank_of(&self.draw_order, marker_type)
    }
}

impl Default for MarkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
