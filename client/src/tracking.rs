//! Live position reconciliation
//!
//! Each batch from the position channel is a full snapshot without removal
//! events. The session marks every dimension marker unseen, upserts the
//! batch, then sweeps whatever did not report.

use crate::marker::MarkerType;
use crate::registry::MarkerRegistry;
use log::{debug, warn};
use shared::{normalize, resolve_dimension, Dimension, Hit, Request, Track};
use std::collections::HashMap;

/// Drops points farther than `max_radius` from the origin, in overworld scale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadiusFilter {
    max_radius: f64,
}

impl RadiusFilter {
    /// A radius of zero or less disables filtering.
    pub fn new(max_radius: f64) -> Self {
        Self { max_radius }
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    pub fn is_enabled(&self) -> bool {
        self.max_radius > 0.0
    }

    /// Boundary inclusive: a point exactly at the radius is kept.
    pub fn is_outside(&self, x: f64, z: f64, dimension: Option<Dimension>) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let (x, z) = normalize(resolve_dimension(dimension, None), x, z);
        (x * x + z * z).sqrt() > self.max_radius
    }

    pub fn is_hit_outside(&self, hit: &Hit) -> bool {
        self.is_outside(hit.x, hit.z, hit.dimension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub applied: usize,
    pub filtered: usize,
    pub removed: usize,
}

pub struct TrackingSession {
    counts: HashMap<Dimension, usize>,
    data_revision: u64,
    batches: u64,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self {
            counts: Dimension::ALL.iter().map(|d| (*d, 0)).collect(),
            data_revision: 0,
            batches: 0,
        }
    }

    /// Position request for one polling cycle.
    pub fn request(&self, server: &str, now: u64, window_ms: u64) -> Request {
        Request::Tracker {
            server: server.to_string(),
            since: now,
            duration: window_ms,
        }
    }

    /// Reconciles one snapshot batch into the dimension markers.
    ///
    /// Tracks whose history is open in a trace marker also extend that
    /// trace. Only the data revision changes; the viewport is left alone.
    pub fn apply_batch(
        &mut self,
        registry: &mut MarkerRegistry,
        filter: &RadiusFilter,
        tracks: Vec<Track>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for marker in registry.by_type_mut(MarkerType::Dimension) {
            marker.mark_all_unseen();
        }
        for count in self.counts.values_mut() {
            *count = 0;
        }

        for track in tracks {
            if filter.is_hit_outside(&track.hit) {
                summary.filtered += 1;
                continue;
            }

            let dimension = track.dimension();
            let hit = track.hit;

            match registry.dimension_marker_mut(dimension) {
                Some(marker) => {
                    marker.put(hit.clone(), false);
                }
                None => {
                    warn!("No marker for dimension {}, dropping track", dimension);
                    continue;
                }
            }
            *self.counts.entry(dimension).or_insert(0) += 1;
            summary.applied += 1;

            if let Some(track_id) = hit.track_id {
                if let Some(trace) = registry.trace_for_track_mut(track_id) {
                    trace.put(hit, false);
                }
            }
        }

        for marker in registry.by_type_mut(MarkerType::Dimension) {
            summary.removed += marker.sweep_unseen();
        }

        self.batches += 1;
        self.data_revision += 1;

        debug!(
            "Tracking batch {}: {} applied, {} outside radius, {} gone",
            self.batches, summary.applied, summary.filtered, summary.removed
        );
        summary
    }

    pub fn count(&self, dimension: Dimension) -> usize {
        self.counts.get(&dimension).copied().unwrap_or(0)
    }

    pub fn total_tracked(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn data_revision(&self) -> u64 {
        self.data_revision
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{Marker, MarkerOptions};

    fn registry() -> MarkerRegistry {
        let mut registry = MarkerRegistry::new();
        for dimension in Dimension::ALL {
            registry.add(Marker::for_dimension(dimension));
        }
        registry
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let filter = RadiusFilter::new(100.0);
        assert!(!filter.is_outside(60.0, 80.0, Some(Dimension::Overworld)));
        assert!(filter.is_outside(60.0, 80.01, Some(Dimension::Overworld)));
    }

    #[test]
    fn test_radius_uses_overworld_scale_for_nether() {
        let filter = RadiusFilter::new(100.0);
        assert!(!filter.is_outside(7.5, 10.0, Some(Dimension::Nether)));
        assert!(filter.is_outside(7.6, 10.0, Some(Dimension::Nether)));
        assert!(!filter.is_outside(60.0, 80.0, Some(Dimension::End)));
    }

    #[test]
    fn test_zero_radius_disables_filter() {
        let filter = RadiusFilter::new(0.0);
        assert!(!filter.is_enabled());
        assert!(!filter.is_outside(30_000_000.0, 30_000_000.0, Some(Dimension::Nether)));
        assert!(!RadiusFilter::default().is_outside(1e9, 1e9, None));
    }

    #[test]
    fn test_batch_counts_and_sweeps() {
        let mut registry = registry();
        let mut session = TrackingSession::new();
        let filter = RadiusFilter::default();

        let summary = session.apply_batch(
            &mut registry,
            &filter,
            vec![
                Track::new(1, Dimension::Overworld, 0.0, 0.0),
                Track::new(2, Dimension::Nether, 1.0, 1.0),
                Track::new(3, Dimension::Nether, 2.0, 2.0),
            ],
        );
        assert_eq!(summary.applied, 3);
        assert_eq!(session.count(Dimension::Nether), 2);
        assert_eq!(session.count(Dimension::Overworld), 1);
        assert_eq!(session.count(Dimension::End), 0);
        assert_eq!(session.total_tracked(), 3);

        let summary = session.apply_batch(
            &mut registry,
            &filter,
            vec![Track::new(3, Dimension::Nether, 3.0, 3.0)],
        );
        assert_eq!(summary.removed, 2);
        assert_eq!(session.count(Dimension::Nether), 1);
        assert_eq!(session.count(Dimension::Overworld), 0);
        assert!(registry.dimension_marker(Dimension::Overworld).unwrap().is_empty());

        let nether = registry.dimension_marker(Dimension::Nether).unwrap();
        assert_eq!(nether.x(), &[24.0]);
        assert_eq!(session.data_revision(), 2);
    }

    #[test]
    fn test_batch_drops_tracks_outside_radius() {
        let mut registry = registry();
        let mut session = TrackingSession::new();

        let summary = session.apply_batch(
            &mut registry,
            &RadiusFilter::new(1_000.0),
            vec![
                Track::new(1, Dimension::Overworld, 999.0, 0.0),
                Track::new(2, Dimension::Nether, 200.0, 0.0),
            ],
        );

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.filtered, 1);
        assert!(registry.dimension_marker(Dimension::Nether).unwrap().is_empty());
    }

    #[test]
    fn test_batch_extends_open_trace() {
        let mut registry = registry();
        registry.add(Marker::new(
            MarkerType::Trace,
            MarkerOptions {
                track_id: Some(5),
                dimension: Some(Dimension::Overworld),
                color: None,
            },
        ));
        let mut session = TrackingSession::new();
        let filter = RadiusFilter::default();

        session.apply_batch(
            &mut registry,
            &filter,
            vec![Track::new(5, Dimension::Overworld, 1.0, 1.0)],
        );
        session.apply_batch(
            &mut registry,
            &filter,
            vec![Track::new(5, Dimension::Overworld, 2.0, 2.0)],
        );

        let trace = registry.trace_for_track_mut(5).unwrap();
        assert_eq!(trace.x(), &[1.0, 2.0]);
    }

    #[test]
    fn test_request_carries_window() {
        let session = TrackingSession::new();
        match session.request("2b2t.org", 1_000, 15_000) {
            Request::Tracker {
                server,
                since,
                duration,
            } => {
                assert_eq!(server, "2b2t.org");
                assert_eq!(since, 1_000);
                assert_eq!(duration, 15_000);
            }
            other => panic!("Unexpected request {:?}", other),
        }
    }
}
