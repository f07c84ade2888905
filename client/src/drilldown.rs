//! Root cluster display, single deep drill and track history lookups
//!
//! Clicking a live position asks for that track's full history; clicking a
//! root cluster asks for its leaf points. Only one of those two requests may
//! be in flight: the [`DrillLock`] is taken by the request id that issued it
//! and released only by the response or failure carrying the same id, so a
//! stale completion can never unlock a newer drill.
//!
//! Root polls and association lookups are never locked; they are tracked by
//! request id like everything else and applied when they come back.

use crate::marker::{Marker, MarkerId, MarkerOptions, MarkerPoint, MarkerType, Rgb};
use crate::outbox::Outbox;
use crate::registry::MarkerRegistry;
use crate::timefmt::{format_timestamp, from_now, humanize};
use crate::tracking::RadiusFilter;
use crate::viewport::{Viewport, DRILL_MARGIN, HISTORY_MARGIN};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    resolve_dimension, Cluster, Dimension, Hit, Player, PlayerSession, Request, Response,
    TrackHistory, NETHER_SCALE,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Largest random shift applied to a shared coordinate, per axis.
pub const SELECTION_JITTER: i64 = 128;

const NETHER_TRACE: [Rgb; 2] = [Rgb(255, 111, 0), Rgb(245, 197, 54)];
const OVERWORLD_TRACE: [Rgb; 2] = [Rgb(0, 100, 0), Rgb(124, 252, 0)];
const END_TRACE: [Rgb; 2] = [Rgb(25, 25, 112), Rgb(2, 253, 217)];

/// Colors cycled through by consecutive history segments of a dimension.
pub fn trace_palette(dimension: Dimension) -> &'static [Rgb] {
    match dimension {
        Dimension::Nether => &NETHER_TRACE,
        Dimension::Overworld => &OVERWORLD_TRACE,
        Dimension::End => &END_TRACE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillState {
    Idle,
    LoadingRoot,
    LoadingChild { cluster_id: u64 },
    LoadingHistory { track_id: u32 },
}

impl DrillState {
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            DrillState::LoadingChild { .. } | DrillState::LoadingHistory { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillTarget {
    Cluster(u64),
    Track(u32),
}

/// Mutual exclusion between drill requests, owned by a request id.
#[derive(Debug, Default)]
pub struct DrillLock {
    holder: Option<(u64, DrillTarget)>,
}

impl DrillLock {
    pub fn try_acquire(&mut self, request_id: u64, target: DrillTarget) -> bool {
        if self.holder.is_some() {
            return false;
        }
        self.holder = Some((request_id, target));
        true
    }

    /// Releases the lock if `request_id` holds it.
    pub fn release(&mut self, request_id: u64) -> bool {
        match self.holder {
            Some((holder, _)) if holder == request_id => {
                self.holder = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    pub fn holder(&self) -> Option<u64> {
        self.holder.map(|(id, _)| id)
    }

    pub fn target(&self) -> Option<DrillTarget> {
        self.holder.map(|(_, target)| target)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickError {
    Busy,
    NotConnected,
    UnknownMarker(MarkerId),
    IneligibleMarker(MarkerType),
    InvalidIndex(usize),
}

impl fmt::Display for ClickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickError::Busy => write!(f, "Currently handling another request"),
            ClickError::NotConnected => write!(f, "Not connected to the tracking feed"),
            ClickError::UnknownMarker(_) => write!(f, "Clicked marker is no longer on the map"),
            ClickError::IneligibleMarker(_) => write!(
                f,
                "Can only get track history for {}, {} markers",
                MarkerType::Dimension,
                MarkerType::Dbscan
            ),
            ClickError::InvalidIndex(index) => {
                write!(f, "Index {} points to an invalid hit", index)
            }
        }
    }
}

impl Error for ClickError {}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The feed answered with a failure.
    Failed { request: &'static str, reason: String },
    /// The feed answered with the wrong response kind.
    UnexpectedResponse { request: &'static str },
    /// Nothing is waiting for this id any more.
    Unknown(u64),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Failed { request, reason } => {
                write!(f, "Request {} failed: {}", request, reason)
            }
            RequestError::UnexpectedResponse { request } => {
                write!(f, "Unexpected response to {} request", request)
            }
            RequestError::Unknown(id) => write!(f, "No pending request #{}", id),
        }
    }
}

impl Error for RequestError {}

/// Coordinate of the last clicked point, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub x: f64,
    pub z: f64,
    pub nether: bool,
}

impl Selection {
    /// Rescales the coordinate; a scale below one means nether units.
    pub fn scaled(self, scale: f64) -> Self {
        Self {
            x: self.x * scale,
            z: self.z * scale,
            nether: scale < 1.0,
        }
    }

    pub fn to_nether(self) -> Self {
        if self.nether {
            self
        } else {
            self.scaled(1.0 / NETHER_SCALE)
        }
    }

    pub fn to_overworld(self) -> Self {
        if self.nether {
            self.scaled(NETHER_SCALE)
        } else {
            self
        }
    }

    pub fn text(&self) -> String {
        format!("{} {}", self.x as i64, self.z as i64)
    }

    /// The coordinate shifted by up to [`SELECTION_JITTER`] blocks per axis.
    pub fn with_offset<R: Rng>(&self, rng: &mut R) -> (i64, i64) {
        (
            self.x as i64 + rng.gen_range(-SELECTION_JITTER..=SELECTION_JITTER),
            self.z as i64 + rng.gen_range(-SELECTION_JITTER..=SELECTION_JITTER),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStrength {
    Strong,
    Moderate,
    Weak,
    Unlikely,
}

impl AssociationStrength {
    pub fn classify(strength: f32) -> Self {
        if strength >= 3.0 {
            AssociationStrength::Strong
        } else if strength >= 2.0 {
            AssociationStrength::Moderate
        } else if strength >= 1.0 {
            AssociationStrength::Weak
        } else {
            AssociationStrength::Unlikely
        }
    }
}

/// One-line summary of when a player was last around.
pub fn format_player_session(player: &Player, now: u64) -> String {
    let time = match player.leave {
        None => player.join,
        leave => leave,
    };
    let Some(time) = time else {
        return "No join or leave date".to_string();
    };

    let prefix = if player.online == Some(true) {
        "Seen on"
    } else {
        "Last seen on"
    };
    format!(
        "{} {} ({} ago)",
        prefix,
        format_timestamp(time),
        humanize(now.saturating_sub(time))
    )
}

/// A drill request accepted by [`DrillDownController::click`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrillRequest {
    pub request_id: u64,
    /// Progress text to show while the request is in flight.
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrillOutcome {
    RootClusters { plain: usize, timing: usize, framed: bool },
    Children { cluster_id: u64, leafs: usize },
    History { track_id: u32, segments: usize },
    Associations { players: usize },
    Sessions { merged: usize },
}

/// Everything a completion may touch, borrowed from the session.
pub struct DrillContext<'a> {
    pub registry: &'a mut MarkerRegistry,
    pub viewport: &'a mut Viewport,
    pub filter: &'a RadiusFilter,
    pub outbox: &'a mut Outbox,
    pub server: &'a str,
    pub now: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Root,
    Children(u64),
    History(u32),
    Associations(u64),
    Sessions,
}

impl Pending {
    fn name(&self) -> &'static str {
        match self {
            Pending::Root => "root-clusters",
            Pending::Children(_) => "cluster",
            Pending::History(_) => "full-track-history",
            Pending::Associations(_) => "cluster-associations",
            Pending::Sessions => "players-latest-session",
        }
    }
}

pub struct DrillDownController {
    lock: DrillLock,
    pending: HashMap<u64, Pending>,
    root_framed: bool,
    selection: Option<Selection>,
    associations: Vec<Player>,
    history_max: u32,
    aggregation_ms: u64,
}

impl DrillDownController {
    pub fn new(history_max: u32, aggregation_ms: u64) -> Self {
        Self {
            lock: DrillLock::default(),
            pending: HashMap::new(),
            root_framed: false,
            selection: None,
            associations: Vec::new(),
            history_max,
            aggregation_ms,
        }
    }

    pub fn state(&self) -> DrillState {
        match self.lock.target() {
            Some(DrillTarget::Cluster(cluster_id)) => DrillState::LoadingChild { cluster_id },
            Some(DrillTarget::Track(track_id)) => DrillState::LoadingHistory { track_id },
            None if self.pending.values().any(|p| *p == Pending::Root) => DrillState::LoadingRoot,
            None => DrillState::Idle,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn lock(&self) -> &DrillLock {
        &self.lock
    }

    /// Whether a response with this id belongs to the controller.
    pub fn owns(&self, request_id: u64) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn scale_selection(&mut self, scale: f64) {
        if let Some(selection) = self.selection {
            self.selection = Some(selection.scaled(scale));
        }
    }

    pub fn associations(&self) -> &[Player] {
        &self.associations
    }

    /// Queues a root cluster request for one server and dimension.
    pub fn poll_root(&mut self, outbox: &mut Outbox, server: &str, dimension: Dimension) -> u64 {
        let request_id = outbox.push(Request::RootClusters {
            server: server.to_string(),
            dimension,
        });
        self.pending.insert(request_id, Pending::Root);
        request_id
    }

    /// Resolves a clicked point and, if eligible, starts a locked drill.
    pub fn click(
        &mut self,
        registry: &MarkerRegistry,
        outbox: &mut Outbox,
        marker_id: MarkerId,
        index: usize,
    ) -> Result<DrillRequest, ClickError> {
        if self.lock.is_held() {
            return Err(ClickError::Busy);
        }

        let marker = registry
            .get(marker_id)
            .ok_or(ClickError::UnknownMarker(marker_id))?;
        let marker_type = marker.marker_type();
        if !matches!(marker_type, MarkerType::Dimension | MarkerType::Dbscan) {
            return Err(ClickError::IneligibleMarker(marker_type));
        }

        let point = marker
            .point_at(index)
            .ok_or(ClickError::InvalidIndex(index))?;

        let (target, pending, request, note) = match point {
            MarkerPoint::Track(hit) => {
                let track_id = hit.track_id.ok_or(ClickError::InvalidIndex(index))?;
                (
                    DrillTarget::Track(track_id),
                    Pending::History(track_id),
                    Request::TrackHistory {
                        track_id,
                        max: self.history_max,
                        aggregation_ms: self.aggregation_ms,
                    },
                    format!("Looking up track history for track #{}", track_id),
                )
            }
            MarkerPoint::Cluster(cluster) => (
                DrillTarget::Cluster(cluster.id),
                Pending::Children(cluster.id),
                Request::ClusterChildren {
                    cluster_id: cluster.id,
                },
                format!("Looking up child nodes for node #{}", cluster.id),
            ),
            MarkerPoint::Leaf(_) => return Err(ClickError::InvalidIndex(index)),
        };

        let nether = resolve_dimension(point.dimension(), marker.dimension()) == Dimension::Nether;
        let selection = Selection {
            x: point.x(),
            z: point.z(),
            nether,
        };

        let request_id = outbox.reserve();
        if !self.lock.try_acquire(request_id, target) {
            return Err(ClickError::Busy);
        }
        outbox.send(request_id, request);
        self.pending.insert(request_id, pending);

        // a new drill supersedes any association lookup still running
        self.pending
            .retain(|_, p| !matches!(p, Pending::Associations(_) | Pending::Sessions));
        self.associations.clear();
        self.selection = Some(selection);

        info!("Drill request #{} for {:?}", request_id, target);
        Ok(DrillRequest { request_id, note })
    }

    /// Applies a response the controller is waiting for.
    ///
    /// The lock is released first when `request_id` holds it, whatever the
    /// response turns out to be.
    pub fn handle_response(
        &mut self,
        request_id: u64,
        response: Response,
        ctx: &mut DrillContext<'_>,
    ) -> Result<DrillOutcome, RequestError> {
        let pending = self
            .pending
            .remove(&request_id)
            .ok_or(RequestError::Unknown(request_id))?;
        self.lock.release(request_id);

        match (pending, response) {
            (Pending::Root, Response::RootClusters(clusters)) => {
                Ok(self.apply_root_clusters(clusters, ctx))
            }
            (Pending::Children(_), Response::ClusterChildren(cluster)) => {
                Ok(self.apply_children(cluster, ctx))
            }
            (Pending::History(track_id), Response::TrackHistory(history)) => {
                Ok(self.apply_history(track_id, history, ctx))
            }
            (Pending::Associations(_), Response::ClusterAssociations(players)) => {
                Ok(self.apply_associations(players, ctx))
            }
            (Pending::Sessions, Response::PlayersLatestSession(sessions)) => {
                Ok(self.apply_sessions(sessions))
            }
            (pending, _) => Err(RequestError::UnexpectedResponse {
                request: pending.name(),
            }),
        }
    }

    /// Forgets a failed request and releases the lock it held. Nothing on
    /// the map changes.
    pub fn handle_failure(&mut self, request_id: u64, reason: &str) -> RequestError {
        match self.pending.remove(&request_id) {
            Some(pending) => {
                if self.lock.release(request_id) {
                    debug!("Drill lock released by failed request #{}", request_id);
                }
                RequestError::Failed {
                    request: pending.name(),
                    reason: reason.to_string(),
                }
            }
            None => RequestError::Unknown(request_id),
        }
    }

    /// Forgets every request in flight and releases the lock. Used when the
    /// feed goes away and no completion can arrive any more. Returns the
    /// dropped request ids.
    pub fn abandon(&mut self) -> Vec<u64> {
        if let Some(holder) = self.lock.holder() {
            self.lock.release(holder);
            debug!("Drill lock released by abandoned request #{}", holder);
        }
        self.pending.drain().map(|(request_id, _)| request_id).collect()
    }

    fn apply_root_clusters(
        &mut self,
        clusters: Vec<Cluster>,
        ctx: &mut DrillContext<'_>,
    ) -> DrillOutcome {
        ctx.registry.remove_by_type(MarkerType::Dbscan);

        let mut plain = Marker::new(
            MarkerType::Dbscan,
            MarkerOptions {
                color: Some(Rgb::DBSCAN),
                ..Default::default()
            },
        );
        let mut timing = Marker::new(
            MarkerType::Dbscan,
            MarkerOptions {
                color: Some(Rgb::DBSCAN_TIMING),
                ..Default::default()
            },
        );

        for cluster in clusters {
            if ctx.filter.is_outside(cluster.x, cluster.z, Some(cluster.dimension)) {
                continue;
            }
            match cluster.updated_at {
                Some(updated_at) => {
                    let index = timing.put(cluster, false);
                    timing.set_text(
                        index,
                        format!(
                            "{} ({})",
                            format_timestamp(updated_at),
                            from_now(updated_at, ctx.now)
                        ),
                    );
                }
                None => {
                    plain.put(cluster, false);
                }
            }
        }

        let framed = !self.root_framed
            && ctx
                .viewport
                .rebound_to_bounds(plain.coords().chain(timing.coords()), DRILL_MARGIN);
        if framed {
            self.root_framed = true;
        }

        let outcome = DrillOutcome::RootClusters {
            plain: plain.len(),
            timing: timing.len(),
            framed,
        };
        ctx.registry.add(plain);
        ctx.registry.add(timing);
        debug!("Root clusters replaced: {:?}", outcome);
        outcome
    }

    fn apply_children(&mut self, cluster: Cluster, ctx: &mut DrillContext<'_>) -> DrillOutcome {
        let Cluster {
            id, dimension, leafs, ..
        } = cluster;

        ctx.registry.remove_by_type(MarkerType::DbscanTrace);

        let mut marker = Marker::new(
            MarkerType::DbscanTrace,
            MarkerOptions {
                dimension: Some(dimension),
                color: Some(Rgb::DBSCAN_TRACE),
                ..Default::default()
            },
        );
        for leaf in leafs.unwrap_or_default() {
            if ctx.filter.is_outside(leaf.x, leaf.z, Some(dimension)) {
                continue;
            }
            marker.put(leaf, false);
        }

        ctx.viewport.rebound_to_bounds(marker.coords(), DRILL_MARGIN);
        let leafs = marker.len();
        ctx.registry.add(marker);

        let request_id = ctx
            .outbox
            .push(Request::ClusterAssociations { cluster_id: id });
        self.pending.insert(request_id, Pending::Associations(id));

        info!("Cluster #{} drilled: {} leafs", id, leafs);
        DrillOutcome::Children {
            cluster_id: id,
            leafs,
        }
    }

    fn apply_history(
        &mut self,
        track_id: u32,
        history: Vec<TrackHistory>,
        ctx: &mut DrillContext<'_>,
    ) -> DrillOutcome {
        ctx.registry.remove_by_type(MarkerType::Trace);

        let mut traces: Vec<Marker> = Vec::new();
        let mut framing: Vec<(f64, f64)> = Vec::new();
        let mut previous: Option<Hit> = None;

        for (index, segment) in history
            .into_iter()
            .filter(|segment| !segment.hits.is_empty())
            .enumerate()
        {
            let palette = trace_palette(segment.dimension);
            let mut marker = Marker::new(
                MarkerType::Trace,
                MarkerOptions {
                    dimension: Some(segment.dimension),
                    track_id: Some(segment.track_id),
                    color: Some(palette[index % palette.len()]),
                },
            );

            for hit in &segment.hits {
                let created_at = hit.created_at;
                let at = marker.put(hit.clone(), false);
                if let Some(created_at) = created_at {
                    marker.set_text(at, format_timestamp(created_at));
                }
            }
            framing.extend(marker.coords());

            if let Some(link) = previous.take() {
                marker.put(link, true);
            }

            previous = segment.hits.last().map(|hit| Hit {
                dimension: Some(segment.dimension),
                track_id: Some(segment.track_id),
                ..hit.clone()
            });
            traces.push(marker);
        }

        let live = previous
            .as_ref()
            .and_then(|last| last.track_id)
            .and_then(|id| live_hit(ctx.registry, id));
        if let (Some(last), Some(live)) = (traces.last_mut(), live) {
            last.put(live, false);
        }

        let segments = traces.len();
        for marker in traces {
            ctx.registry.add(marker);
        }
        ctx.viewport.rebound_to_bounds(framing, HISTORY_MARGIN);

        info!("Track #{} history: {} segments", track_id, segments);
        DrillOutcome::History { track_id, segments }
    }

    fn apply_associations(
        &mut self,
        players: Vec<Player>,
        ctx: &mut DrillContext<'_>,
    ) -> DrillOutcome {
        let count = players.len();
        if !players.is_empty() {
            let uuids = players.iter().map(|p| p.uuid.clone()).collect();
            let request_id = ctx.outbox.push(Request::PlayersLatestSession {
                uuids,
                server: ctx.server.to_string(),
            });
            self.pending.insert(request_id, Pending::Sessions);
        }
        self.associations = players;
        DrillOutcome::Associations { players: count }
    }

    fn apply_sessions(&mut self, sessions: Vec<PlayerSession>) -> DrillOutcome {
        let mut merged = 0;
        for session in sessions {
            let Some(uuid) = session.uuid.as_deref() else {
                continue;
            };
            match self.associations.iter_mut().find(|p| p.uuid == uuid) {
                Some(player) => {
                    player.online = Some(session.leave.is_none());
                    player.join = session.join;
                    player.leave = session.leave;
                    merged += 1;
                }
                None => warn!("Session for unknown player {}", uuid),
            }
        }
        DrillOutcome::Sessions { merged }
    }
}

/// Current position of `track_id` if it is still reporting.
fn live_hit(registry: &MarkerRegistry, track_id: u32) -> Option<Hit> {
    registry
        .by_type(MarkerType::Dimension)
        .find_map(|marker| match marker.get(track_id) {
            Some(MarkerPoint::Track(hit)) => Some(hit.clone()),
            _ => None,
        })
}
