//! Simulated players wandering the three dimensions
//!
//! Every online player owns exactly one open track. Walking through a portal
//! closes it and opens a new one in the other dimension, linked back through
//! `previous_track_id`, so a full history is a chain of segments.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Dimension, Hit, PlayerSession, Track, TrackHistory, NETHER_SCALE};
use std::collections::HashMap;
use std::time::Duration;

/// Most players a feed simulates; more would not fit one tracks datagram.
pub const MAX_PLAYERS: usize = 500;
/// Blocks per second a player covers in its own dimension.
const WALK_SPEED: f64 = 40.0;
/// Minimum spacing between recorded history points.
const HIT_SPACING_MS: u64 = 1_000;
/// Oldest points are dropped beyond this many per track.
const MAX_TRACK_HITS: usize = 4_000;
/// Longest previous-track chain followed when building a history.
const MAX_CHAIN: usize = 64;
/// Overworld radius players are spread over at start.
const SPAWN_SPREAD: f64 = 25_000.0;
const WORLD_BORDER: f64 = 30_000_000.0;

const PORTAL_CHANCE: f64 = 0.003;
const LEAVE_CHANCE: f64 = 0.001;
const JOIN_CHANCE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct SimPlayer {
    pub username: String,
    pub uuid: String,
    pub dimension: Dimension,
    pub x: f64,
    pub z: f64,
    heading: f64,
    /// Open track, None while offline.
    pub track_id: Option<u32>,
    pub join: Option<u64>,
    pub leave: Option<u64>,
    pub updated_at: u64,
}

impl SimPlayer {
    pub fn is_online(&self) -> bool {
        self.track_id.is_some()
    }
}

#[derive(Debug, Clone)]
struct TrackRecord {
    owner: usize,
    dimension: Dimension,
    previous: Option<(u32, Dimension)>,
    hits: Vec<Hit>,
}

pub struct World {
    server: String,
    players: Vec<SimPlayer>,
    tracks: HashMap<u32, TrackRecord>,
    next_track_id: u32,
    rng: StdRng,
}

impl World {
    pub fn new(server: &str, player_count: usize, seed: u64, now: u64) -> Self {
        let player_count = if player_count > MAX_PLAYERS {
            warn!("Capping simulated players at {}", MAX_PLAYERS);
            MAX_PLAYERS
        } else {
            player_count
        };

        let mut world = Self {
            server: server.to_string(),
            players: Vec::with_capacity(player_count),
            tracks: HashMap::new(),
            next_track_id: 1,
            rng: StdRng::seed_from_u64(seed),
        };

        for index in 0..player_count {
            let dimension = match world.rng.gen_range(0..20) {
                0 => Dimension::End,
                1..=5 => Dimension::Nether,
                _ => Dimension::Overworld,
            };
            let spread = SPAWN_SPREAD / dimension.scale();
            let player = SimPlayer {
                username: format!("player_{:03}", index),
                uuid: format!("00000000-0000-4000-8000-{:012x}", index),
                dimension,
                x: world.rng.gen_range(-spread..spread),
                z: world.rng.gen_range(-spread..spread),
                heading: world.rng.gen_range(0.0..std::f64::consts::TAU),
                track_id: None,
                join: Some(now),
                leave: None,
                updated_at: now,
            };
            world.players.push(player);
            world.open_track(index, None, now);
        }

        info!("Simulating {} players on {}", player_count, server);
        world
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn players(&self) -> &[SimPlayer] {
        &self.players
    }

    pub fn player(&self, index: usize) -> Option<&SimPlayer> {
        self.players.get(index)
    }

    pub fn online_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_online()).count()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn open_track(&mut self, owner: usize, previous: Option<(u32, Dimension)>, now: u64) -> u32 {
        let track_id = self.next_track_id;
        self.next_track_id += 1;

        let player = &mut self.players[owner];
        player.track_id = Some(track_id);
        player.updated_at = now;

        let first = Hit::new(player.x, player.z)
            .with_dimension(player.dimension)
            .with_track(track_id)
            .with_created_at(now);
        self.tracks.insert(
            track_id,
            TrackRecord {
                owner,
                dimension: player.dimension,
                previous,
                hits: vec![first],
            },
        );
        track_id
    }

    /// Advances every player by `dt`.
    pub fn step(&mut self, dt: Duration, now: u64) {
        let distance = WALK_SPEED * dt.as_secs_f64();

        for index in 0..self.players.len() {
            let Some(track_id) = self.players[index].track_id else {
                if self.rng.gen_bool(JOIN_CHANCE) {
                    let player = &mut self.players[index];
                    player.join = Some(now);
                    player.leave = None;
                    self.open_track(index, None, now);
                    debug!("{} joined", self.players[index].username);
                }
                continue;
            };

            if self.rng.gen_bool(LEAVE_CHANCE) {
                let player = &mut self.players[index];
                player.leave = Some(now);
                player.track_id = None;
                debug!("{} left", player.username);
                continue;
            }

            if self.rng.gen_bool(PORTAL_CHANCE) {
                let from = self.players[index].dimension;
                self.travel(index, from);
                self.open_track(index, Some((track_id, from)), now);
                continue;
            }

            let turn = self.rng.gen_range(-0.3..0.3);
            let player = &mut self.players[index];
            player.heading += turn;
            let border = WORLD_BORDER / player.dimension.scale();
            player.x = (player.x + player.heading.cos() * distance).clamp(-border, border);
            player.z = (player.z + player.heading.sin() * distance).clamp(-border, border);
            player.updated_at = now;

            let (x, z, dimension) = (player.x, player.z, player.dimension);
            if let Some(record) = self.tracks.get_mut(&track_id) {
                let due = record
                    .hits
                    .last()
                    .and_then(|hit| hit.created_at)
                    .map_or(true, |last| now.saturating_sub(last) >= HIT_SPACING_MS);
                if due {
                    record.hits.push(
                        Hit::new(x, z)
                            .with_dimension(dimension)
                            .with_track(track_id)
                            .with_created_at(now),
                    );
                    if record.hits.len() > MAX_TRACK_HITS {
                        record.hits.remove(0);
                    }
                }
            }
        }
    }

    /// Moves a player through a portal out of `from`.
    fn travel(&mut self, index: usize, from: Dimension) {
        let to = match from {
            Dimension::Overworld if self.rng.gen_bool(0.05) => Dimension::End,
            Dimension::Overworld => Dimension::Nether,
            Dimension::Nether | Dimension::End => Dimension::Overworld,
        };

        let player = &mut self.players[index];
        match (from, to) {
            (Dimension::Overworld, Dimension::Nether) => {
                player.x /= NETHER_SCALE;
                player.z /= NETHER_SCALE;
            }
            (Dimension::Nether, Dimension::Overworld) => {
                player.x *= NETHER_SCALE;
                player.z *= NETHER_SCALE;
            }
            _ => {
                player.x = 0.0;
                player.z = 0.0;
            }
        }
        player.dimension = to;
        debug!("{} travelled {} -> {}", player.username, from, to);
    }

    /// Current position of every online player whose last update is no
    /// older than `since - duration`.
    pub fn tracks(&self, since: u64, duration: u64) -> Vec<Track> {
        let oldest = since.saturating_sub(duration);
        self.players
            .iter()
            .filter(|player| player.updated_at >= oldest)
            .filter_map(|player| {
                let track_id = player.track_id?;
                let previous = self.tracks.get(&track_id).and_then(|r| r.previous);
                let mut track = Track::new(track_id, player.dimension, player.x, player.z);
                track.hit.created_at = Some(player.updated_at);
                track.server = Some(self.server.clone());
                track.previous_track_id = previous.map(|(id, _)| id);
                track.previous_dimension = previous.map(|(_, dimension)| dimension);
                Some(track)
            })
            .collect()
    }

    /// Full history of the track chain ending at `track_id`, oldest segment
    /// first.
    ///
    /// Points closer than `aggregation_ms` to the previously kept point are
    /// merged away, and at most `max` points are returned, keeping the most
    /// recent ones.
    pub fn track_history(
        &self,
        track_id: u32,
        max: u32,
        aggregation_ms: u64,
    ) -> Option<Vec<TrackHistory>> {
        let mut chain = Vec::new();
        let mut next = Some(track_id);
        while let Some(id) = next {
            if chain.len() >= MAX_CHAIN {
                break;
            }
            let Some(record) = self.tracks.get(&id) else {
                break;
            };
            chain.push((id, record));
            next = record.previous.map(|(id, _)| id);
        }
        if chain.is_empty() {
            return None;
        }
        chain.reverse();

        let mut segments: Vec<TrackHistory> = chain
            .into_iter()
            .map(|(id, record)| TrackHistory {
                track_id: id,
                dimension: record.dimension,
                server: Some(self.server.clone()),
                hits: aggregate(&record.hits, aggregation_ms),
            })
            .collect();

        let mut excess = segments
            .iter()
            .map(|s| s.hits.len())
            .sum::<usize>()
            .saturating_sub(max as usize);
        for segment in segments.iter_mut() {
            if excess == 0 {
                break;
            }
            let drop = excess.min(segment.hits.len());
            segment.hits.drain(..drop);
            excess -= drop;
        }
        segments.retain(|s| !s.hits.is_empty());

        Some(segments)
    }

    /// Latest join and leave of each known uuid; unknown uuids are skipped.
    pub fn sessions(&self, uuids: &[String]) -> Vec<PlayerSession> {
        uuids
            .iter()
            .filter_map(|uuid| self.players.iter().find(|p| &p.uuid == uuid))
            .map(|player| PlayerSession {
                username: Some(player.username.clone()),
                uuid: Some(player.uuid.clone()),
                join: player.join,
                leave: player.leave,
            })
            .collect()
    }

    /// Every recorded point in `dimension`, with the index of the player
    /// that left it.
    pub fn hits(&self, dimension: Dimension) -> impl Iterator<Item = (usize, &Hit)> + '_ {
        self.tracks
            .values()
            .filter(move |record| record.dimension == dimension)
            .flat_map(|record| record.hits.iter().map(move |hit| (record.owner, hit)))
    }
}

/// Keeps the first point, then every point at least `aggregation_ms` after
/// the last kept one, and always the final point.
fn aggregate(hits: &[Hit], aggregation_ms: u64) -> Vec<Hit> {
    let mut kept: Vec<Hit> = Vec::new();
    let mut last_kept: Option<u64> = None;

    for hit in hits {
        let at = hit.created_at.unwrap_or(0);
        if last_kept.map_or(true, |last| at.saturating_sub(last) >= aggregation_ms) {
            kept.push(hit.clone());
            last_kept = Some(at);
        }
    }

    if let (Some(final_hit), Some(kept_last)) = (hits.last(), kept.last()) {
        if final_hit != kept_last {
            kept.push(final_hit.clone());
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u64 = 1_700_000_000_000;

    fn walked(world: &mut World, steps: u64) -> u64 {
        let mut now = START;
        for _ in 0..steps {
            now += 1_000;
            world.step(Duration::from_secs(1), now);
        }
        now
    }

    #[test]
    fn test_new_world_puts_everyone_online() {
        let world = World::new("2b2t.org", 10, 7, START);
        assert_eq!(world.players().len(), 10);
        assert_eq!(world.online_count(), 10);
        assert_eq!(world.track_count(), 10);
        assert_eq!(world.server(), "2b2t.org");
    }

    #[test]
    fn test_player_count_is_capped() {
        let world = World::new("2b2t.org", MAX_PLAYERS + 50, 7, START);
        assert_eq!(world.players().len(), MAX_PLAYERS);
    }

    #[test]
    fn test_tracks_report_online_players() {
        let mut world = World::new("2b2t.org", 20, 3, START);
        let now = walked(&mut world, 5);

        let tracks = world.tracks(now, 15_000);
        assert_eq!(tracks.len(), world.online_count());
        for track in &tracks {
            assert_eq!(track.server.as_deref(), Some("2b2t.org"));
            assert!(track.track_id().is_some());
            assert!(track.hit.dimension.is_some());
        }

        // nothing was updated after the far future window starts
        assert!(world.tracks(now + 60_000, 1_000).is_empty());
    }

    #[test]
    fn test_history_follows_portal_chain() {
        let mut world = World::new("2b2t.org", 1, 11, START);
        let first = world.players()[0].track_id.unwrap();
        let from = world.players()[0].dimension;

        world.travel(0, from);
        let second = world.open_track(0, Some((first, from)), START + 2_000);

        let history = world.track_history(second, 10_000, 0).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].track_id, first);
        assert_eq!(history[0].dimension, from);
        assert_eq!(history[1].track_id, second);
        assert_ne!(history[1].dimension, from);

        let tracks = world.tracks(START + 2_000, 1_000);
        assert_eq!(tracks[0].previous_track_id, Some(first));
        assert_eq!(tracks[0].previous_dimension, Some(from));
    }

    #[test]
    fn test_history_keeps_most_recent_points() {
        let mut world = World::new("2b2t.org", 1, 5, START);
        let track_id = world.players()[0].track_id.unwrap();
        let record = world.tracks.get_mut(&track_id).unwrap();
        for i in 1..30u64 {
            record
                .hits
                .push(Hit::new(i as f64, 0.0).with_created_at(START + i * 1_000));
        }

        let history = world.track_history(track_id, 5, 0).unwrap();
        let times: Vec<u64> = history[0].hits.iter().filter_map(|h| h.created_at).collect();
        assert_eq!(times.len(), 5);
        assert_eq!(times.last(), Some(&(START + 29_000)));
        assert_eq!(times.first(), Some(&(START + 25_000)));
    }

    #[test]
    fn test_unknown_track_has_no_history() {
        let world = World::new("2b2t.org", 1, 5, START);
        assert!(world.track_history(9_999, 100, 0).is_none());
    }

    #[test]
    fn test_aggregate_merges_close_points() {
        let hits: Vec<Hit> = (0..10)
            .map(|i| Hit::new(i as f64, 0.0).with_created_at(START + i * 1_000))
            .collect();

        let kept = aggregate(&hits, 4_000);
        let times: Vec<u64> = kept.iter().filter_map(|h| h.created_at).collect();
        assert_eq!(times, vec![START, START + 4_000, START + 8_000, START + 9_000]);

        assert_eq!(aggregate(&hits, 0).len(), 10);
        assert!(aggregate(&[], 1_000).is_empty());
    }

    #[test]
    fn test_sessions_skip_unknown_uuids() {
        let world = World::new("2b2t.org", 3, 1, START);
        let uuid = world.players()[1].uuid.clone();

        let sessions = world.sessions(&[uuid.clone(), "missing".to_string()]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].uuid.as_deref(), Some(uuid.as_str()));
        assert_eq!(sessions[0].join, Some(START));
        assert_eq!(sessions[0].leave, None);
    }

    #[test]
    fn test_hits_are_grouped_by_dimension() {
        let mut world = World::new("2b2t.org", 30, 9, START);
        walked(&mut world, 3);

        for dimension in Dimension::ALL {
            for (owner, hit) in world.hits(dimension) {
                assert!(owner < world.players().len());
                assert_eq!(hit.dimension, Some(dimension));
            }
        }
    }
}
