//! Identity-tracked point collections rendered as one layer of the map
//!
//! A [`Marker`] keeps the renderer's parallel `x`/`y`/`text` arrays and the
//! source point behind every rendered index in lockstep. Dimension markers
//! are keyed by track id so that a live snapshot stream can be reconciled
//! with [`Marker::mark_all_unseen`], [`Marker::put`] and
//! [`Marker::sweep_unseen`] instead of being rebuilt every cycle.

use crate::viewport::Bounds;
use shared::{resolve_dimension, Cluster, ClusterLeaf, Dimension, Hit, Track};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(1);

/// Semantic group a marker renders; fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerType {
    /// Live positions of one dimension
    Dimension,
    /// History of one track
    Trace,
    /// Root clusters of the latest poll
    Dbscan,
    /// Leafs of the drilled cluster
    DbscanTrace,
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerType::Dimension => "DIMENSION",
            MarkerType::Trace => "TRACE",
            MarkerType::Dbscan => "DBSCAN",
            MarkerType::DbscanTrace => "DBSCAN_TRACE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(u64);

impl MarkerId {
    fn next() -> Self {
        MarkerId(NEXT_MARKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a stored point; kept when the point is overwritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(u64);

/// Domain object behind a rendered index.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerPoint {
    Track(Hit),
    Cluster(Cluster),
    Leaf(ClusterLeaf),
}

impl MarkerPoint {
    pub fn x(&self) -> f64 {
        match self {
            MarkerPoint::Track(hit) => hit.x,
            MarkerPoint::Cluster(cluster) => cluster.x,
            MarkerPoint::Leaf(leaf) => leaf.x,
        }
    }

    pub fn z(&self) -> f64 {
        match self {
            MarkerPoint::Track(hit) => hit.z,
            MarkerPoint::Cluster(cluster) => cluster.z,
            MarkerPoint::Leaf(leaf) => leaf.z,
        }
    }

    /// Dimension carried by the point itself; leafs inherit their marker's.
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            MarkerPoint::Track(hit) => hit.dimension,
            MarkerPoint::Cluster(cluster) => Some(cluster.dimension),
            MarkerPoint::Leaf(_) => None,
        }
    }

    pub fn track_id(&self) -> Option<u32> {
        match self {
            MarkerPoint::Track(hit) => hit.track_id,
            _ => None,
        }
    }
}

impl From<Hit> for MarkerPoint {
    fn from(hit: Hit) -> Self {
        MarkerPoint::Track(hit)
    }
}

impl From<Track> for MarkerPoint {
    fn from(track: Track) -> Self {
        MarkerPoint::Track(track.hit)
    }
}

impl From<Cluster> for MarkerPoint {
    fn from(cluster: Cluster) -> Self {
        MarkerPoint::Cluster(cluster)
    }
}

impl From<ClusterLeaf> for MarkerPoint {
    fn from(leaf: ClusterLeaf) -> Self {
        MarkerPoint::Leaf(leaf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
    pub const DBSCAN: Rgb = Rgb(255, 0, 255);
    pub const DBSCAN_TIMING: Rgb = Rgb(100, 100, 255);
    pub const DBSCAN_TRACE: Rgb = Rgb(255, 100, 200);

    pub fn for_dimension(dimension: Dimension) -> Rgb {
        match dimension {
            Dimension::Nether => Rgb::RED,
            Dimension::Overworld => Rgb::GREEN,
            Dimension::End => Rgb::BLUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Markers,
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Diamond,
    Circle,
    Square,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub mode: DrawMode,
    pub symbol: Symbol,
    pub color: Rgb,
    pub size: f32,
    pub opacity: f32,
    pub hover: bool,
    pub outline: bool,
}

impl MarkerStyle {
    pub fn for_type(marker_type: MarkerType) -> Self {
        let base = MarkerStyle {
            mode: DrawMode::Markers,
            symbol: Symbol::Circle,
            color: Rgb::GREEN,
            size: 7.0,
            opacity: 1.0,
            hover: true,
            outline: true,
        };

        match marker_type {
            MarkerType::Dimension => MarkerStyle {
                symbol: Symbol::Diamond,
                ..base
            },
            MarkerType::Trace => MarkerStyle {
                mode: DrawMode::Lines,
                outline: false,
                ..base
            },
            MarkerType::Dbscan => MarkerStyle {
                size: 5.0,
                opacity: 0.5,
                outline: false,
                ..base
            },
            MarkerType::DbscanTrace => MarkerStyle {
                symbol: Symbol::Square,
                size: 4.0,
                hover: false,
                outline: false,
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkerOptions {
    pub dimension: Option<Dimension>,
    pub track_id: Option<u32>,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone)]
struct Slot {
    id: PointId,
    point: MarkerPoint,
    seen: bool,
}

#[derive(Debug, Clone)]
pub struct Marker {
    id: MarkerId,
    marker_type: MarkerType,
    dimension: Option<Dimension>,
    track_id: Option<u32>,
    pub style: MarkerStyle,

    slots: Vec<Slot>,
    x: Vec<f64>,
    y: Vec<f64>,
    text: Vec<Option<String>>,

    // track id -> index, maintained for dimension markers only
    track_index: HashMap<u32, usize>,
    next_point_id: u64,
    revision: u64,
}

impl Marker {
    pub fn new(marker_type: MarkerType, options: MarkerOptions) -> Self {
        let mut style = MarkerStyle::for_type(marker_type);
        if let Some(color) = options.color {
            style.color = color;
        }

        Self {
            id: MarkerId::next(),
            marker_type,
            dimension: options.dimension,
            track_id: options.track_id,
            style,
            slots: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            text: Vec::new(),
            track_index: HashMap::new(),
            next_point_id: 0,
            revision: 0,
        }
    }

    /// Live-position marker for one dimension, colored by dimension.
    pub fn for_dimension(dimension: Dimension) -> Self {
        Self::new(
            MarkerType::Dimension,
            MarkerOptions {
                dimension: Some(dimension),
                track_id: None,
                color: Some(Rgb::for_dimension(dimension)),
            },
        )
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn marker_type(&self) -> MarkerType {
        self.marker_type
    }

    pub fn dimension(&self) -> Option<Dimension> {
        self.dimension
    }

    pub fn track_id(&self) -> Option<u32> {
        self.track_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn text(&self) -> &[Option<String>] {
        &self.text
    }

    /// Normalized `(x, y)` pairs in render order.
    pub fn coords(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.coords())
    }

    pub fn set_color(&mut self, color: Rgb) {
        self.style.color = color;
        self.revision += 1;
    }

    /// Index of the point owned by `track_id`.
    ///
    /// Only dimension markers are keyed by track; traces legitimately hold
    /// many points of one track, so every other type yields `None`.
    pub fn index_of(&self, track_id: u32) -> Option<usize> {
        if self.marker_type != MarkerType::Dimension {
            return None;
        }
        self.track_index.get(&track_id).copied()
    }

    pub fn get(&self, track_id: u32) -> Option<&MarkerPoint> {
        self.index_of(track_id).and_then(|index| self.point_at(index))
    }

    pub fn point_at(&self, index: usize) -> Option<&MarkerPoint> {
        self.slots.get(index).map(|slot| &slot.point)
    }

    pub fn point_id_at(&self, index: usize) -> Option<PointId> {
        self.slots.get(index).map(|slot| slot.id)
    }

    /// Upserts a point and returns its index.
    ///
    /// A dimension marker overwrites the point sharing the same track id in
    /// place. Otherwise the point is appended, or prepended when `at_front`
    /// is set. Coordinates are normalized here and the hover text of the
    /// index is reset.
    pub fn put(&mut self, point: impl Into<MarkerPoint>, at_front: bool) -> usize {
        let point = point.into();
        let (x, y) = self.overworld_coord(&point);
        let track_id = point.track_id();

        if let Some(index) = track_id.and_then(|id| self.index_of(id)) {
            let slot = &mut self.slots[index];
            slot.point = point;
            slot.seen = true;
            self.x[index] = x;
            self.y[index] = y;
            self.text[index] = None;
            self.revision += 1;
            return index;
        }

        let slot = Slot {
            id: self.next_point_id(),
            point,
            seen: true,
        };

        let index = if at_front {
            self.slots.insert(0, slot);
            self.x.insert(0, x);
            self.y.insert(0, y);
            self.text.insert(0, None);
            self.rebuild_track_index();
            0
        } else {
            self.slots.push(slot);
            self.x.push(x);
            self.y.push(y);
            self.text.push(None);
            let index = self.slots.len() - 1;
            if let (MarkerType::Dimension, Some(id)) = (self.marker_type, track_id) {
                self.track_index.insert(id, index);
            }
            index
        };

        self.revision += 1;
        index
    }

    pub fn set_text(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.text.get_mut(index) {
            Some(slot) => {
                *slot = Some(text.into());
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// First half of a mark-and-sweep pass.
    pub fn mark_all_unseen(&mut self) {
        for slot in &mut self.slots {
            slot.seen = false;
        }
    }

    /// Second half of a mark-and-sweep pass: drops every point not refreshed
    /// since [`Marker::mark_all_unseen`]. Returns how many were removed.
    ///
    /// Survivors keep their relative order; all parallel arrays are compacted
    /// in a single pass.
    pub fn sweep_unseen(&mut self) -> usize {
        let len = self.slots.len();
        let mut write = 0;

        for read in 0..len {
            if self.slots[read].seen {
                if write != read {
                    self.slots.swap(write, read);
                    self.x.swap(write, read);
                    self.y.swap(write, read);
                    self.text.swap(write, read);
                }
                write += 1;
            }
        }

        let removed = len - write;
        if removed > 0 {
            self.slots.truncate(write);
            self.x.truncate(write);
            self.y.truncate(write);
            self.text.truncate(write);
            self.rebuild_track_index();
            self.revision += 1;
        }
        removed
    }

    pub fn remove(&mut self, index: usize) -> Option<MarkerPoint> {
        if index >= self.slots.len() {
            return None;
        }

        let slot = self.slots.remove(index);
        self.x.remove(index);
        self.y.remove(index);
        self.text.remove(index);
        self.rebuild_track_index();
        self.revision += 1;
        Some(slot.point)
    }

    pub fn remove_by_track_id(&mut self, track_id: u32) -> Option<MarkerPoint> {
        let index = self.index_of(track_id)?;
        self.remove(index)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.x.clear();
        self.y.clear();
        self.text.clear();
        self.track_index.clear();
        self.revision += 1;
    }

    fn next_point_id(&mut self) -> PointId {
        let id = PointId(self.next_point_id);
        self.next_point_id += 1;
        id
    }

    fn rebuild_track_index(&mut self) {
        self.track_index.clear();
        if self.marker_type != MarkerType::Dimension {
            return;
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(track_id) = slot.point.track_id() {
                self.track_index.insert(track_id, index);
            }
        }
    }

    fn overworld_coord(&self, point: &MarkerPoint) -> (f64, f64) {
        let dimension = resolve_dimension(point.dimension(), self.dimension);
        shared::normalize(dimension, point.x(), point.z())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn hit(track_id: u32, x: f64, z: f64) -> Hit {
        Hit::new(x, z).with_track(track_id)
    }

    fn assert_aligned(marker: &Marker) {
        assert_eq!(marker.x().len(), marker.len());
        assert_eq!(marker.y().len(), marker.len());
        assert_eq!(marker.text().len(), marker.len());
    }

    #[test]
    fn test_put_refresh_and_sweep_scenario() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);

        let index = marker.put(hit(1, 10.0, 20.0).with_dimension(Dimension::Overworld), false);
        assert_eq!(index, 0);
        assert_eq!(marker.x(), &[10.0]);
        assert_eq!(marker.y(), &[20.0]);

        marker.mark_all_unseen();
        let index = marker.put(hit(1, 15.0, 25.0), false);
        assert_eq!(index, 0);
        assert_eq!(marker.sweep_unseen(), 0);
        assert_eq!(marker.len(), 1);
        assert_eq!(marker.x(), &[15.0]);
        assert_eq!(marker.y(), &[25.0]);

        marker.mark_all_unseen();
        assert_eq!(marker.sweep_unseen(), 1);
        assert!(marker.is_empty());
        assert_aligned(&marker);
    }

    #[test]
    fn test_dimension_marker_never_duplicates_track_ids() {
        let mut marker = Marker::for_dimension(Dimension::End);

        for round in 0..5 {
            for track_id in 0..10 {
                marker.put(hit(track_id, round as f64, track_id as f64), round % 2 == 0);
            }
        }

        assert_eq!(marker.len(), 10);
        let mut ids: Vec<u32> = (0..marker.len())
            .filter_map(|i| marker.point_at(i).and_then(|p| p.track_id()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_aligned(&marker);
    }

    #[test]
    fn test_matching_snapshot_keeps_point_identity() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        for track_id in 0..4 {
            marker.put(hit(track_id, 1.0, 1.0), false);
        }
        let before: Vec<PointId> = (0..4).filter_map(|i| marker.point_id_at(i)).collect();

        marker.mark_all_unseen();
        for track_id in (0..4).rev() {
            marker.put(hit(track_id, 2.0, 2.0), false);
        }
        marker.sweep_unseen();

        let after: Vec<PointId> = (0..4).filter_map(|i| marker.point_id_at(i)).collect();
        assert_eq!(before, after);
        assert_eq!(marker.len(), 4);
    }

    #[test]
    fn test_sweep_keeps_order_of_survivors() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        for track_id in 0..6 {
            marker.put(hit(track_id, track_id as f64, 0.0), false);
        }

        marker.mark_all_unseen();
        marker.put(hit(1, 1.0, 0.0), false);
        marker.put(hit(4, 4.0, 0.0), false);
        marker.put(hit(5, 5.0, 0.0), false);
        assert_eq!(marker.sweep_unseen(), 3);

        assert_eq!(marker.x(), &[1.0, 4.0, 5.0]);
        assert_eq!(marker.index_of(4), Some(1));
        assert_eq!(marker.index_of(0), None);
        assert_aligned(&marker);
    }

    #[test]
    fn test_nether_points_are_stored_in_overworld_scale() {
        let mut nether = Marker::for_dimension(Dimension::Nether);
        nether.put(hit(1, 10.0, -5.0), false);
        assert_approx_eq!(nether.x()[0], 80.0);
        assert_approx_eq!(nether.y()[0], -40.0);

        // the point's own dimension wins over the marker's
        let mut marker = Marker::for_dimension(Dimension::Nether);
        marker.put(hit(2, 10.0, -5.0).with_dimension(Dimension::End), false);
        assert_approx_eq!(marker.x()[0], 10.0);

        // no dimension anywhere falls back to overworld
        let mut plain = Marker::new(MarkerType::Trace, MarkerOptions::default());
        plain.put(Hit::new(3.0, 4.0), false);
        assert_eq!(plain.x(), &[3.0]);
        assert_eq!(plain.y(), &[4.0]);
    }

    #[test]
    fn test_index_of_only_for_dimension_markers() {
        let mut trace = Marker::new(
            MarkerType::Trace,
            MarkerOptions {
                track_id: Some(9),
                ..Default::default()
            },
        );
        trace.put(hit(9, 0.0, 0.0), false);
        trace.put(hit(9, 1.0, 1.0), false);

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.index_of(9), None);
        assert_eq!(trace.remove_by_track_id(9), None);
    }

    #[test]
    fn test_put_at_front_prepends_and_reindexes() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        marker.put(hit(1, 1.0, 1.0), false);
        marker.put(hit(2, 2.0, 2.0), false);

        let index = marker.put(hit(3, 3.0, 3.0), true);
        assert_eq!(index, 0);
        assert_eq!(marker.x(), &[3.0, 1.0, 2.0]);
        assert_eq!(marker.index_of(1), Some(1));
        assert_eq!(marker.index_of(2), Some(2));
    }

    #[test]
    fn test_remove_splices_all_arrays() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        marker.put(hit(1, 1.0, 10.0), false);
        marker.put(hit(2, 2.0, 20.0), false);
        marker.put(hit(3, 3.0, 30.0), false);
        marker.set_text(1, "second");

        let removed = marker.remove_by_track_id(2).unwrap();
        assert_eq!(removed.track_id(), Some(2));
        assert_eq!(marker.x(), &[1.0, 3.0]);
        assert_eq!(marker.y(), &[10.0, 30.0]);
        assert_eq!(marker.text(), &[None, None]);
        assert_eq!(marker.index_of(3), Some(1));

        assert!(marker.remove(5).is_none());
        assert_aligned(&marker);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        marker.put(hit(1, 1.0, 1.0), false);
        marker.clear();

        assert!(marker.is_empty());
        assert_eq!(marker.index_of(1), None);
        assert_aligned(&marker);
    }

    #[test]
    fn test_overwrite_resets_text() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        marker.put(hit(1, 1.0, 1.0), false);
        assert!(marker.set_text(0, "label"));
        marker.put(hit(1, 2.0, 2.0), false);
        assert_eq!(marker.text()[0], None);
        assert!(!marker.set_text(4, "missing"));
    }

    #[test]
    fn test_revision_increments_on_mutation() {
        let mut marker = Marker::for_dimension(Dimension::Overworld);
        let start = marker.revision();
        marker.put(hit(1, 1.0, 1.0), false);
        assert!(marker.revision() > start);

        let after_put = marker.revision();
        marker.mark_all_unseen();
        marker.put(hit(1, 1.0, 1.0), false);
        marker.sweep_unseen();
        assert!(marker.revision() > after_put);
    }

    #[test]
    fn test_cluster_and_leaf_points_resolve_back() {
        let cluster = Cluster {
            id: 42,
            x: 5.0,
            z: 6.0,
            dimension: Dimension::Nether,
            server: None,
            count: 3,
            core: false,
            parent: None,
            disjoint_rank: 0,
            disjoint_size: 3,
            leafs: None,
            updated_at: None,
        };

        let mut dbscan = Marker::new(MarkerType::Dbscan, MarkerOptions::default());
        dbscan.put(cluster.clone(), false);
        assert_eq!(dbscan.point_at(0), Some(&MarkerPoint::Cluster(cluster)));
        assert_approx_eq!(dbscan.x()[0], 40.0);

        let mut leafs = Marker::new(
            MarkerType::DbscanTrace,
            MarkerOptions {
                dimension: Some(Dimension::Nether),
                ..Default::default()
            },
        );
        leafs.put(ClusterLeaf { id: 1, x: 1.0, z: 2.0 }, false);
        assert_approx_eq!(leafs.y()[0], 16.0);
        assert!(matches!(leafs.point_at(0), Some(MarkerPoint::Leaf(_))));
    }

    #[test]
    fn test_bounds_cover_normalized_points() {
        let mut marker = Marker::for_dimension(Dimension::Nether);
        assert!(marker.bounds().is_none());

        marker.put(hit(1, -1.0, 2.0), false);
        marker.put(hit(2, 3.0, -4.0), false);
        let bounds = marker.bounds().unwrap();
        assert_approx_eq!(bounds.min_x, -8.0);
        assert_approx_eq!(bounds.max_x, 24.0);
        assert_approx_eq!(bounds.min_y, -32.0);
        assert_approx_eq!(bounds.max_y, 16.0);
    }

    #[test]
    fn test_styles_per_type() {
        assert_eq!(
            MarkerStyle::for_type(MarkerType::Trace).mode,
            DrawMode::Lines
        );
        assert_eq!(
            MarkerStyle::for_type(MarkerType::Dimension).symbol,
            Symbol::Diamond
        );
        assert!(!MarkerStyle::for_type(MarkerType::DbscanTrace).hover);
        assert_eq!(Marker::for_dimension(Dimension::Nether).style.color, Rgb::RED);
    }
}
