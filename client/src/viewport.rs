//! Visible range, guide overlay and framing of the map view


pub const FINE_TICK: f64 = 100_000.0;
pub const COARSE_TICK: f64 = 1_000_000.0;
/// Visible span above which ticks switch to the coarse spacing.
pub const COARSE_SPAN_THRESHOLD: f64 = 5_000_000.0;
pub const WORLD_BORDER: f64 = 30_000_000.0;
pub const HISTORY_MARGIN: f64 = 512.0;
pub const DRILL_MARGIN: f64 = 1024.0;
pub const INITIAL_EXTENT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    fn largest_abs(&self) -> f64 {
        self.min.abs().max(self.max.abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Line {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

/// Axis-aligned bounding box of normalized points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Bounds {
                    min_x: x,
                    max_x: x,
                    min_y: y,
                    max_y: y,
                },
                Some(b) => Bounds {
                    min_x: b.min_x.min(x),
                    max_x: b.max_x.max(x),
                    min_y: b.min_y.min(y),
                    max_y: b.max_y.max(y),
                },
            })
        })
    }

    pub fn expand(&self, margin: f64) -> (Range, Range) {
        (
            Range::new(self.min_x - margin, self.max_x + margin),
            Range::new(self.min_y - margin, self.max_y + margin),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickGranularity {
    Fine,
    Coarse,
}

impl TickGranularity {
    pub fn spacing(self) -> f64 {
        match self {
            TickGranularity::Fine => FINE_TICK,
            TickGranularity::Coarse => COARSE_TICK,
        }
    }
}

pub struct Viewport {
    width: f32,
    height: f32,
    x_range: Range,
    y_range: Range,
    reported: Option<(Range, Range)>,
    diagonals: [Line; 2],
    borders: [Line; 4],
    ticks: TickGranularity,
    layout_revision: u64,
    revision: u64,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        let initial = Range::new(-INITIAL_EXTENT, INITIAL_EXTENT);
        let b = WORLD_BORDER;

        let mut viewport = Self {
            width,
            height,
            x_range: initial,
            y_range: initial,
            reported: None,
            diagonals: [Line::new(0.0, 0.0, 0.0, 0.0); 2],
            borders: [
                Line::new(b, b, b, -b),
                Line::new(-b, -b, b, -b),
                Line::new(-b, -b, -b, b),
                Line::new(-b, b, b, b),
            ],
            ticks: TickGranularity::Fine,
            layout_revision: 0,
            revision: 0,
        };
        viewport.rebound_diagonals(initial, initial);
        viewport
    }

    /// Recomputes the two guide diagonals and the tick spacing for the
    /// visible ranges.
    ///
    /// Both diagonals cross the origin and span `[-m, m]` on each axis where
    /// `m` is the largest absolute bound of either range, so the overlay
    /// frames a square. Tick spacing follows the diagonal of the visible box,
    /// which does not depend on where the view sits.
    pub fn rebound_diagonals(&mut self, x_range: Range, y_range: Range) -> TickGranularity {
        let max = x_range.largest_abs().max(y_range.largest_abs());

        self.diagonals = [
            Line::new(-max, -max, max, max),
            Line::new(-max, max, max, -max),
        ];

        let span = x_range.span().hypot(y_range.span());
        self.ticks = if span > COARSE_SPAN_THRESHOLD {
            TickGranularity::Coarse
        } else {
            TickGranularity::Fine
        };

        self.layout_revision += 1;
        self.ticks
    }

    /// Frames the view on the bounding box of `points` plus `margin` on each
    /// side. Returns false, leaving the view untouched, when there are no points.
    pub fn rebound_to_bounds(
        &mut self,
        points: impl IntoIterator<Item = (f64, f64)>,
        margin: f64,
    ) -> bool {
        let Some(bounds) = Bounds::from_points(points) else {
            return false;
        };

        let (x_range, y_range) = bounds.expand(margin);
        self.x_range = x_range;
        self.y_range = y_range;
        self.reported = None;
        self.rebound_diagonals(x_range, y_range);
        self.revision += 1;
        true
    }

    /// Rebounds from the range the renderer last reported, which is
    /// authoritative after load or resize.
    pub fn rebound_current(&mut self) -> TickGranularity {
        let (x_range, y_range) = self.reported.unwrap_or((self.x_range, self.y_range));
        let ticks = self.rebound_diagonals(x_range, y_range);
        self.revision += 1;
        ticks
    }

    /// Back to the initial view around the origin.
    pub fn reset(&mut self) {
        let initial = Range::new(-INITIAL_EXTENT, INITIAL_EXTENT);
        self.x_range = initial;
        self.y_range = initial;
        self.reported = None;
        self.rebound_diagonals(initial, initial);
        self.revision += 1;
    }

    /// Range actually shown after a pan or zoom.
    pub fn report_range(&mut self, x_range: Range, y_range: Range) {
        self.x_range = x_range;
        self.y_range = y_range;
        self.reported = Some((x_range, y_range));
        self.rebound_diagonals(x_range, y_range);
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.layout_revision += 1;
        }
    }

    pub fn x_range(&self) -> Range {
        self.x_range
    }

    pub fn y_range(&self) -> Range {
        self.y_range
    }

    pub fn diagonals(&self) -> &[Line; 2] {
        &self.diagonals
    }

    pub fn borders(&self) -> &[Line; 4] {
        &self.borders
    }

    pub fn ticks(&self) -> TickGranularity {
        self.ticks
    }

    pub fn layout_revision(&self) -> u64 {
        self.layout_revision
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// World units per pixel, equal on both axes.
    fn scale(&self) -> f64 {
        let sx = self.x_range.span() / self.width.max(1.0) as f64;
        let sy = self.y_range.span() / self.height.max(1.0) as f64;
        sx.max(sy).max(f64::MIN_POSITIVE)
    }

    pub fn to_screen(&self, x: f64, y: f64) -> (f32, f32) {
        let scale = self.scale();
        let sx = (x - self.x_range.center()) / scale + self.width as f64 / 2.0;
        let sy = self.height as f64 / 2.0 - (y - self.y_range.center()) / scale;
        (sx as f32, sy as f32)
    }

    pub fn to_world(&self, px: f32, py: f32) -> (f64, f64) {
        let scale = self.scale();
        let x = (px as f64 - self.width as f64 / 2.0) * scale + self.x_range.center();
        let y = (self.height as f64 / 2.0 - py as f64) * scale + self.y_range.center();
        (x, y)
    }

    /// Ranges after dragging the map by a pixel delta.
    pub fn panned(&self, dx_px: f32, dy_px: f32) -> (Range, Range) {
        let scale = self.scale();
        let dx = -(dx_px as f64) * scale;
        let dy = dy_px as f64 * scale;
        (
            Range::new(self.x_range.min + dx, self.x_range.max + dx),
            Range::new(self.y_range.min + dy, self.y_range.max + dy),
        )
    }

    /// Ranges after zooming by `factor` around a pixel; factors below one zoom in.
    pub fn zoomed(&self, factor: f64, px: f32, py: f32) -> (Range, Range) {
        let (wx, wy) = self.to_world(px, py);
        let zoom = |range: Range, pivot: f64| {
            Range::new(
                pivot + (range.min - pivot) * factor,
                pivot + (range.max - pivot) * factor,
            )
        };
        (zoom(self.x_range, wx), zoom(self.y_range, wy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_coarse_ticks_for_wide_range() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let range = Range::new(-2_000_000.0, 2_000_000.0);
        assert_eq!(viewport.rebound_diagonals(range, range), TickGranularity::Coarse);
        assert_eq!(viewport.ticks().spacing(), COARSE_TICK);
    }

    #[test]
    fn test_fine_ticks_for_narrow_range() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let range = Range::new(-1_000_000.0, 1_000_000.0);
        assert_eq!(viewport.rebound_diagonals(range, range), TickGranularity::Fine);
        assert_eq!(viewport.ticks().spacing(), FINE_TICK);
    }

    #[test]
    fn test_ticks_follow_visible_span_not_position() {
        let mut viewport = Viewport::new(800.0, 600.0);

        // a small window far from the origin stays fine
        let far_x = Range::new(3_000_000.0, 3_100_000.0);
        let near_y = Range::new(-50_000.0, 50_000.0);
        assert_eq!(viewport.rebound_diagonals(far_x, near_y), TickGranularity::Fine);

        // the same width shifted back to the origin agrees
        let centred = Range::new(-50_000.0, 50_000.0);
        assert_eq!(viewport.rebound_diagonals(centred, near_y), TickGranularity::Fine);

        // a wide window is coarse wherever it sits
        let wide = Range::new(10_000_000.0, 16_000_000.0);
        assert_eq!(viewport.rebound_diagonals(wide, near_y), TickGranularity::Coarse);
    }

    #[test]
    fn test_diagonals_span_largest_half_extent() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.rebound_diagonals(Range::new(-10.0, 300.0), Range::new(-450.0, 20.0));

        let [a, b] = *viewport.diagonals();
        assert_eq!(a, Line::new(-450.0, -450.0, 450.0, 450.0));
        assert_eq!(b, Line::new(-450.0, 450.0, 450.0, -450.0));
    }

    #[test]
    fn test_rebound_to_bounds_adds_margin() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let framed = viewport.rebound_to_bounds(
            vec![(100.0, -20.0), (-50.0, 40.0), (10.0, 10.0)],
            HISTORY_MARGIN,
        );

        assert!(framed);
        assert_eq!(viewport.x_range(), Range::new(-562.0, 612.0));
        assert_eq!(viewport.y_range(), Range::new(-532.0, 552.0));
        assert_eq!(viewport.ticks(), TickGranularity::Fine);
    }

    #[test]
    fn test_rebound_to_empty_bounds_keeps_view() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let before = viewport.x_range();
        assert!(!viewport.rebound_to_bounds(Vec::new(), DRILL_MARGIN));
        assert_eq!(viewport.x_range(), before);
    }

    #[test]
    fn test_rebound_current_prefers_reported_range() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let wide = Range::new(-4_000_000.0, 4_000_000.0);
        viewport.report_range(wide, wide);

        let revision = viewport.revision();
        assert_eq!(viewport.rebound_current(), TickGranularity::Coarse);
        assert_eq!(viewport.revision(), revision + 1);
        assert_eq!(viewport.diagonals()[0].x1, 4_000_000.0);
    }

    #[test]
    fn test_screen_world_roundtrip() {
        let viewport = Viewport::new(800.0, 800.0);
        let (px, py) = viewport.to_screen(250_000.0, -500_000.0);
        let (x, y) = viewport.to_world(px, py);
        assert_approx_eq!(x, 250_000.0, 1.0);
        assert_approx_eq!(y, -500_000.0, 1.0);

        // origin sits in the middle, positive z is up
        let (cx, cy) = viewport.to_screen(0.0, 0.0);
        assert_approx_eq!(cx, 400.0, 0.01);
        assert_approx_eq!(cy, 400.0, 0.01);
        assert!(viewport.to_screen(0.0, 10_000.0).1 < cy);
    }

    #[test]
    fn test_zoom_and_pan() {
        let viewport = Viewport::new(800.0, 800.0);
        let (x, y) = viewport.zoomed(0.5, 400.0, 400.0);
        assert_approx_eq!(x.span(), 1_000_000.0, 1.0);
        assert_approx_eq!(y.center(), 0.0, 1.0);

        let (x, _) = viewport.panned(80.0, 0.0);
        assert!(x.center() < 0.0);
    }

    #[test]
    fn test_reset_restores_initial_range() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.rebound_to_bounds(vec![(5.0, 5.0)], DRILL_MARGIN);
        viewport.reset();
        assert_eq!(viewport.x_range(), Range::new(-INITIAL_EXTENT, INITIAL_EXTENT));
        assert_eq!(viewport.ticks(), TickGranularity::Fine);
    }

    #[test]
    fn test_resize_bumps_layout_revision_once() {
        let mut viewport = Viewport::new(800.0, 600.0);
        let revision = viewport.layout_revision();
        viewport.resize(1024.0, 768.0);
        viewport.resize(1024.0, 768.0);
        assert_eq!(viewport.layout_revision(), revision + 1);
        assert_eq!(viewport.size(), (1024.0, 768.0));
    }
}
