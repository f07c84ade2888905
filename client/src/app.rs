use crate::input::{InputAction, InputManager};
use crate::network::Transport;
use crate::notify::NotificationSink;
use crate::rendering::{pick, Renderer, PICK_RADIUS};
use crate::session::{MapSession, SessionEvent};
use log::{error, info};
use ::rand::thread_rng;
use macroquad::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

/// Window-side half of the client: owns the session and feeds it every frame.
pub struct App {
    session: MapSession,
    transport: Transport,
    events: UnboundedReceiver<SessionEvent>,
    input: InputManager,
    renderer: Renderer,
    size: (f32, f32),
}

impl App {
    pub fn new(
        session: MapSession,
        transport: Transport,
        events: UnboundedReceiver<SessionEvent>,
    ) -> Self {
        let radius = session.filter().max_radius();
        let size = session.viewport().size();

        Self {
            session,
            transport,
            events,
            input: InputManager::new(radius),
            renderer: Renderer::new(),
            size,
        }
    }

    /// Runs until the user quits. The transport is handed back so the
    /// caller can keep it alive while the goodbye is sent.
    pub async fn run(mut self) -> Transport {
        loop {
            while let Ok(event) = self.events.try_recv() {
                self.session.handle_event(event);
            }
            while let Some(packet) = self.transport.try_recv() {
                self.session.handle_packet(packet);
            }
            if self.session.is_connected() && !self.transport.is_connected() {
                self.session.set_connected(false);
            }

            let size = (screen_width(), screen_height());
            if size != self.size {
                self.size = size;
                self.session.resize(size.0, size.1);
            }

            let mut quit = false;
            for action in self.input.update() {
                if action == InputAction::Quit {
                    quit = true;
                } else {
                    self.apply(action);
                }
            }

            for packet in self.session.drain_packets() {
                if !self.transport.send(packet) {
                    error!("Transport closed, dropping outgoing packet");
                }
            }
            self.session.notes_mut().prune();

            self.renderer.render(&self.session, mouse_position());

            if quit {
                break;
            }
            next_frame().await;
        }

        info!("Closing map");
        self.session.teardown();
        self.transport.close();
        self.transport
    }

    fn apply(&mut self, action: InputAction) {
        match action {
            InputAction::Click { x, y } => {
                let hit = pick(self.session.registry(), self.session.viewport(), x, y, PICK_RADIUS);
                if let Some((marker_id, index)) = hit {
                    // Rejections already surface as notes
                    let _ = self.session.click(marker_id, index);
                }
            }
            InputAction::Pan { dx, dy } => {
                let (x_range, y_range) = self.session.viewport().panned(dx, dy);
                self.session.report_range(x_range, y_range);
            }
            InputAction::Zoom { factor, x, y } => {
                let (x_range, y_range) = self.session.viewport().zoomed(factor, x, y);
                self.session.report_range(x_range, y_range);
            }
            InputAction::Recenter => self.session.recenter(),
            InputAction::Radius(radius) => self.session.set_radius(radius),
            InputAction::ScaleSelection(scale) => self.session.drill_mut().scale_selection(scale),
            InputAction::ShareSelection => {
                if let Some(selection) = self.session.drill().selection() {
                    let (x, z) = selection.with_offset(&mut thread_rng());
                    let message = format!("Share coords: {} {}", x, z);
                    info!("{}", message);
                    self.session.notes_mut().info(&message, false);
                }
            }
            InputAction::Quit => {}
        }
    }
}
