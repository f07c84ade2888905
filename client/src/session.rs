//! The map session: single owner of every marker and controller
//!
//! Everything that changes the map enters through [`MapSession`]: timer
//! events from the [`Scheduler`], packets from the transport, and clicks,
//! pans and resizes from the window. Requests leave through the session's
//! [`Outbox`], which the frame loop drains into the transport.

use crate::config::SessionConfig;
use crate::drilldown::{ClickError, DrillContext, DrillDownController, RequestError};
use crate::marker::{Marker, MarkerId, MarkerType};
use crate::notify::{NoteHandle, NotificationCenter, NotificationSink};
use crate::outbox::Outbox;
use crate::registry::MarkerRegistry;
use crate::scheduler::Scheduler;
use crate::tracking::{RadiusFilter, TrackingSession};
use crate::viewport::{Range, Viewport, DRILL_MARGIN};
use log::{debug, info, warn};
use shared::{now_millis, Dimension, Packet};
use std::collections::HashMap;

/// Timer driven work, delivered back into the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PositionTick,
    PositionRetry,
    ClusterTick,
    ClusterRetry,
    RadiusSettled(f64),
    /// Deadline of the drill request with this id.
    DrillTimeout(u64),
}

#[derive(Debug, Default)]
struct Retries {
    position: bool,
    cluster: bool,
}

pub struct MapSession {
    config: SessionConfig,
    registry: MarkerRegistry,
    tracking: TrackingSession,
    viewport: Viewport,
    drill: DrillDownController,
    filter: RadiusFilter,
    notes: NotificationCenter,
    outbox: Outbox,
    scheduler: Option<Scheduler<SessionEvent>>,

    connected: bool,
    client_id: Option<u32>,
    retries: Retries,
    progress_notes: HashMap<u64, NoteHandle>,
}

impl MapSession {
    pub fn new(config: SessionConfig, width: f32, height: f32) -> Self {
        let mut registry = MarkerRegistry::new();
        for dimension in Dimension::ALL {
            registry.add(Marker::for_dimension(dimension));
        }

        let drill = DrillDownController::new(
            config.history_max,
            config.history_aggregation.as_millis() as u64,
        );

        Self {
            filter: RadiusFilter::new(config.max_radius),
            registry,
            tracking: TrackingSession::new(),
            viewport: Viewport::new(width, height),
            drill,
            notes: NotificationCenter::new(),
            outbox: Outbox::new(),
            scheduler: None,
            connected: false,
            client_id: None,
            retries: Retries::default(),
            progress_notes: HashMap::new(),
            config,
        }
    }

    /// Starts the polling timers and runs the first cycle right away.
    pub fn start(&mut self, mut scheduler: Scheduler<SessionEvent>) {
        scheduler.repeating(self.config.tracking_interval, SessionEvent::PositionTick);
        scheduler.repeating(self.config.cluster_interval, SessionEvent::ClusterTick);
        self.scheduler = Some(scheduler);

        info!(
            "Session started for {} (positions every {:?}, clusters every {:?})",
            self.config.server, self.config.tracking_interval, self.config.cluster_interval
        );

        self.poll_positions();
        self.viewport.rebound_current();
        self.poll_clusters();
    }

    /// Cancels every timer. The map itself is left as it is.
    pub fn teardown(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.clear_all();
        }
        self.retries = Retries::default();
        info!("Session stopped");
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PositionTick => self.poll_positions(),
            SessionEvent::PositionRetry => {
                self.retries.position = false;
                self.poll_positions();
            }
            SessionEvent::ClusterTick => self.poll_clusters(),
            SessionEvent::ClusterRetry => {
                self.retries.cluster = false;
                self.poll_clusters();
            }
            SessionEvent::RadiusSettled(radius) => self.apply_radius(radius),
            SessionEvent::DrillTimeout(request_id) => self.expire_drill(request_id),
        }
    }

    /// Gives up on a drill whose answer never came, so the lock cannot
    /// outlive a lost datagram.
    fn expire_drill(&mut self, request_id: u64) {
        if self.drill.lock().holder() != Some(request_id) {
            return;
        }
        warn!("Drill request #{} timed out", request_id);
        self.finish_progress(request_id);
        let error = self.drill.handle_failure(request_id, "timed out");
        self.notes.error(&error.to_string());
    }

    fn poll_positions(&mut self) {
        if !self.connected {
            if !self.retries.position {
                self.retries.position = true;
                self.schedule_once(SessionEvent::PositionRetry);
            }
            return;
        }

        let request = self.tracking.request(
            &self.config.server,
            now_millis(),
            self.config.tracking_window.as_millis() as u64,
        );
        self.outbox.push(request);
    }

    fn poll_clusters(&mut self) {
        if !self.connected {
            if !self.retries.cluster {
                self.retries.cluster = true;
                self.schedule_once(SessionEvent::ClusterRetry);
            }
            return;
        }

        self.drill
            .poll_root(&mut self.outbox, &self.config.server, self.config.cluster_dimension);
    }

    fn schedule_once(&mut self, event: SessionEvent) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.once(self.config.retry_delay, event);
        }
    }

    /// Changes the radius filter once input has been quiet for the debounce
    /// period. Without running timers the change applies immediately.
    pub fn set_radius(&mut self, radius: f64) {
        let delay = self.config.radius_debounce;
        match self.scheduler.as_mut() {
            Some(scheduler) => {
                scheduler.debounce("radius", delay, SessionEvent::RadiusSettled(radius));
            }
            None => self.apply_radius(radius),
        }
    }

    fn apply_radius(&mut self, radius: f64) {
        self.filter = RadiusFilter::new(radius);
        info!("Max radius set to {}", radius);
        self.poll_clusters();
    }

    pub fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            info!("Feed {}", if connected { "connected" } else { "disconnected" });
        }
        self.connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                self.client_id = Some(client_id);
                self.set_connected(true);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected by feed: {}", reason);
                self.client_id = None;
                self.set_connected(false);
                for request_id in self.drill.abandon() {
                    self.finish_progress(request_id);
                }
            }

            Packet::Tracks { tracks } => {
                self.tracking
                    .apply_batch(&mut self.registry, &self.filter, tracks);
            }

            Packet::Response {
                request_id,
                response,
            } => {
                self.finish_progress(request_id);

                let mut ctx = DrillContext {
                    registry: &mut self.registry,
                    viewport: &mut self.viewport,
                    filter: &self.filter,
                    outbox: &mut self.outbox,
                    server: &self.config.server,
                    now: now_millis(),
                };
                match self.drill.handle_response(request_id, response, &mut ctx) {
                    Ok(outcome) => debug!("Request #{} applied: {:?}", request_id, outcome),
                    Err(RequestError::Unknown(id)) => {
                        debug!("Ignoring response to request #{}", id)
                    }
                    Err(e) => {
                        self.notes.error(&e.to_string());
                    }
                }
            }

            Packet::Failed { request_id, reason } => {
                self.finish_progress(request_id);

                match self.drill.handle_failure(request_id, &reason) {
                    RequestError::Unknown(_) => {
                        self.notes
                            .error(&format!("Request #{} failed: {}", request_id, reason));
                    }
                    e => {
                        self.notes.error(&e.to_string());
                    }
                }
            }

            other => warn!("Unexpected packet from feed: {:?}", other),
        }
    }

    fn finish_progress(&mut self, request_id: u64) {
        if let Some(handle) = self.progress_notes.remove(&request_id) {
            self.notes.remove(handle, Some(self.config.note_linger));
        }
    }

    /// Resolves a click on `index` of `marker_id` and starts the drill it
    /// asks for. Rejections are reported as notes as well as returned.
    pub fn click(&mut self, marker_id: MarkerId, index: usize) -> Result<u64, ClickError> {
        let result = if self.connected {
            self.drill
                .click(&self.registry, &mut self.outbox, marker_id, index)
        } else {
            Err(ClickError::NotConnected)
        };

        match result {
            Ok(drill) => {
                let handle = self.notes.info(&drill.note, true);
                self.progress_notes.insert(drill.request_id, handle);
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.once(
                        self.config.drill_timeout,
                        SessionEvent::DrillTimeout(drill.request_id),
                    );
                }
                Ok(drill.request_id)
            }
            Err(e) => {
                match e {
                    ClickError::Busy => self.notes.warning(&e.to_string()),
                    _ => self.notes.error(&e.to_string()),
                };
                Err(e)
            }
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(width, height);
        self.viewport.rebound_current();
    }

    pub fn report_range(&mut self, x_range: Range, y_range: Range) {
        self.viewport.report_range(x_range, y_range);
    }

    /// Frames every live position, or the initial view when nothing is tracked.
    pub fn recenter(&mut self) {
        let points: Vec<(f64, f64)> = self
            .registry
            .by_type(MarkerType::Dimension)
            .flat_map(|marker| marker.coords())
            .collect();
        if !self.viewport.rebound_to_bounds(points, DRILL_MARGIN) {
            self.viewport.reset();
        }
    }

    /// Outbound packets queued since the last call.
    pub fn drain_packets(&mut self) -> Vec<Packet> {
        self.outbox.drain_packets()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn tracking(&self) -> &TrackingSession {
        &self.tracking
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn drill(&self) -> &DrillDownController {
        &self.drill
    }

    pub fn drill_mut(&mut self) -> &mut DrillDownController {
        &mut self.drill
    }

    pub fn filter(&self) -> RadiusFilter {
        self.filter
    }

    pub fn notes(&self) -> &NotificationCenter {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut NotificationCenter {
        &mut self.notes
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.clear_all();
        }
    }
}
