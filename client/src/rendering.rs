use crate::drilldown::{format_player_session, AssociationStrength};
use crate::marker::{DrawMode, Marker, MarkerId, Rgb, Symbol};
use crate::notify::Severity;
use crate::registry::MarkerRegistry;
use crate::session::MapSession;
use crate::viewport::{Line, Viewport};
use macroquad::prelude::*;
use shared::{now_millis, Dimension};

/// Pointer distance, in pixels, within which a point counts as hovered.
pub const PICK_RADIUS: f32 = 8.0;
/// Grid lines are skipped when more than this many would be visible.
const MAX_GRID_LINES: f64 = 120.0;

/// Nearest hoverable point to a pixel, as `(marker, index)`.
///
/// Later markers in draw order are drawn on top, so they win ties.
pub fn pick(
    registry: &MarkerRegistry,
    viewport: &Viewport,
    px: f32,
    py: f32,
    max_distance: f32,
) -> Option<(MarkerId, usize)> {
    let mut best: Option<(MarkerId, usize, f32)> = None;

    for marker in registry.iter().filter(|m| m.style.hover) {
        for (index, (x, y)) in marker.coords().enumerate() {
            let (sx, sy) = viewport.to_screen(x, y);
            let distance = ((sx - px).powi(2) + (sy - py).powi(2)).sqrt();
            if distance > max_distance {
                continue;
            }
            if best.map_or(true, |(_, _, d)| distance <= d) {
                best = Some((marker.id(), index, distance));
            }
        }
    }

    best.map(|(id, index, _)| (id, index))
}

fn color(rgb: Rgb, opacity: f32) -> Color {
    Color::from_rgba(rgb.0, rgb.1, rgb.2, (opacity.clamp(0.0, 1.0) * 255.0) as u8)
}

pub struct Renderer {
    background: Color,
    guide: Color,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            background: Color::from_rgba(26, 26, 26, 255),
            guide: Color::from_rgba(68, 68, 68, 255),
        }
    }

    pub fn render(&self, session: &MapSession, mouse: (f32, f32)) {
        clear_background(self.background);

        let viewport = session.viewport();
        self.draw_grid(viewport);
        for line in viewport.borders() {
            self.draw_world_line(viewport, line, 2.0, RED);
        }
        for line in viewport.diagonals() {
            self.draw_world_line(viewport, line, 1.0, self.guide);
        }

        for marker in session.registry().iter() {
            self.draw_marker(marker, viewport);
        }

        self.draw_hover(session, mouse);
        self.draw_hud(session);
        self.draw_notes(session);
        self.draw_associations(session);
    }

    fn draw_world_line(&self, viewport: &Viewport, line: &Line, thickness: f32, color: Color) {
        let (x0, y0) = viewport.to_screen(line.x0, line.y0);
        let (x1, y1) = viewport.to_screen(line.x1, line.y1);
        draw_line(x0, y0, x1, y1, thickness, color);
    }

    fn draw_grid(&self, viewport: &Viewport) {
        let spacing = viewport.ticks().spacing();
        let x = viewport.x_range();
        let y = viewport.y_range();
        if x.span() / spacing > MAX_GRID_LINES || y.span() / spacing > MAX_GRID_LINES {
            return;
        }

        let faint = Color::from_rgba(40, 40, 40, 255);
        let mut gx = (x.min / spacing).floor() * spacing;
        while gx <= x.max {
            let (sx, _) = viewport.to_screen(gx, 0.0);
            draw_line(sx, 0.0, sx, screen_height(), 1.0, faint);
            gx += spacing;
        }
        let mut gy = (y.min / spacing).floor() * spacing;
        while gy <= y.max {
            let (_, sy) = viewport.to_screen(0.0, gy);
            draw_line(0.0, sy, screen_width(), sy, 1.0, faint);
            gy += spacing;
        }
    }

    fn draw_marker(&self, marker: &Marker, viewport: &Viewport) {
        let style = &marker.style;
        let fill = color(style.color, style.opacity);
        let points: Vec<(f32, f32)> = marker
            .coords()
            .map(|(x, y)| viewport.to_screen(x, y))
            .collect();

        if style.mode == DrawMode::Lines {
            for pair in points.windows(2) {
                draw_line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, 2.0, fill);
            }
            for (x, y) in &points {
                draw_circle(*x, *y, 2.5, fill);
            }
            return;
        }

        let radius = style.size / 2.0 + 1.0;
        for (x, y) in points {
            match style.symbol {
                Symbol::Circle => draw_circle(x, y, radius, fill),
                Symbol::Diamond => draw_poly(x, y, 4, radius + 1.0, 0.0, fill),
                Symbol::Square => draw_poly(x, y, 4, radius, 45.0, fill),
            }
            if style.outline {
                draw_circle_lines(x, y, radius + 1.0, 1.0, WHITE);
            }
        }
    }

    fn draw_hover(&self, session: &MapSession, mouse: (f32, f32)) {
        let registry = session.registry();
        let Some((marker_id, index)) = pick(registry, session.viewport(), mouse.0, mouse.1, PICK_RADIUS)
        else {
            return;
        };
        let Some(marker) = registry.get(marker_id) else {
            return;
        };
        let Some(point) = marker.point_at(index) else {
            return;
        };

        let mut label = format!("x: {:.0}  z: {:.0}", point.x(), point.z());
        if let Some(text) = marker.text().get(index).and_then(|t| t.as_deref()) {
            label = format!("{}  {}", text, label);
        }
        if let Some(track_id) = point.track_id() {
            label = format!("#{}  {}", track_id, label);
        }

        let width = measure_text(&label, None, 16, 1.0).width;
        draw_rectangle(mouse.0 + 10.0, mouse.1 - 22.0, width + 8.0, 20.0, Color::from_rgba(0, 0, 0, 200));
        draw_text(&label, mouse.0 + 14.0, mouse.1 - 7.0, 16.0, WHITE);
    }

    fn draw_hud(&self, session: &MapSession) {
        let tracking = session.tracking();
        let mut y = 20.0;

        let connection = if session.is_connected() { GREEN } else { RED };
        draw_rectangle(10.0, y - 8.0, 8.0, 8.0, connection);
        draw_text(&session.config().server, 24.0, y, 16.0, WHITE);
        y += 18.0;

        for dimension in Dimension::ALL {
            let text = format!("{}: {}", dimension.pretty_name(), tracking.count(dimension));
            draw_text(&text, 10.0, y, 16.0, color(Rgb::for_dimension(dimension), 1.0));
            y += 16.0;
        }
        draw_text(
            &format!("Tracked: {}", tracking.total_tracked()),
            10.0,
            y,
            16.0,
            WHITE,
        );
        y += 16.0;

        let filter = session.filter();
        let radius = if filter.is_enabled() {
            format!("Max radius: {:.0}", filter.max_radius())
        } else {
            "Max radius: off".to_string()
        };
        draw_text(&radius, 10.0, y, 16.0, WHITE);
        y += 16.0;

        draw_text(&format!("{:?}", session.drill().state()), 10.0, y, 16.0, GRAY);
        y += 16.0;

        if let Some(selection) = session.drill().selection() {
            let units = if selection.nether { "nether" } else { "overworld" };
            draw_text(
                &format!("Selected: {} ({})", selection.text(), units),
                10.0,
                y,
                16.0,
                YELLOW,
            );
        }
    }

    fn draw_notes(&self, session: &MapSession) {
        let mut y = screen_height() - 12.0;
        for note in session.notes().notes().iter().rev().take(5) {
            let tint = match note.severity {
                Severity::Success => GREEN,
                Severity::Error => RED,
                Severity::Info => SKYBLUE,
                Severity::Warning => ORANGE,
            };
            draw_text(&note.message, 10.0, y, 18.0, tint);
            y -= 20.0;
        }
    }

    fn draw_associations(&self, session: &MapSession) {
        let players = session.drill().associations();
        if players.is_empty() {
            return;
        }

        let now = now_millis();
        let x = screen_width() - 420.0;
        let mut y = 20.0;
        draw_text("Associations", x, y, 18.0, WHITE);
        y += 20.0;

        for player in players.iter().take(20) {
            let strength = player.strength.unwrap_or(0.0);
            let tint = match AssociationStrength::classify(strength) {
                AssociationStrength::Strong => GREEN,
                AssociationStrength::Moderate => SKYBLUE,
                AssociationStrength::Weak => YELLOW,
                AssociationStrength::Unlikely => RED,
            };
            draw_text(
                &format!("{} ({:.1})", player.username, strength),
                x,
                y,
                16.0,
                tint,
            );
            y += 14.0;
            draw_text(&format_player_session(player, now), x + 8.0, y, 14.0, GRAY);
            y += 18.0;
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
