pub mod dimension;
pub mod model;

pub use dimension::{normalize, resolve_dimension, Dimension, ParseDimensionError, NETHER_SCALE};
pub use model::{Cluster, ClusterLeaf, Hit, Player, PlayerSession, Track, TrackHistory};

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest UDP payload either side will send or accept.
pub const MAX_PACKET_SIZE: usize = 65_507;
pub const DEFAULT_SERVER_NAME: &str = "2b2t.org";

/// Queries the client issues against the tracker feed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Request {
    /// Ask for every track seen on `server` within `duration` ms before `since`.
    Tracker {
        server: String,
        since: u64,
        duration: u64,
    },
    RootClusters {
        server: String,
        dimension: Dimension,
    },
    ClusterChildren {
        cluster_id: u64,
    },
    TrackHistory {
        track_id: u32,
        max: u32,
        aggregation_ms: u64,
    },
    ClusterAssociations {
        cluster_id: u64,
    },
    PlayersLatestSession {
        uuids: Vec<String>,
        server: String,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Tracker { .. } => "tracker",
            Request::RootClusters { .. } => "root-clusters",
            Request::ClusterChildren { .. } => "cluster",
            Request::TrackHistory { .. } => "full-track-history",
            Request::ClusterAssociations { .. } => "cluster-associations",
            Request::PlayersLatestSession { .. } => "players-latest-session",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Response {
    RootClusters(Vec<Cluster>),
    ClusterChildren(Cluster),
    TrackHistory(Vec<TrackHistory>),
    ClusterAssociations(Vec<Player>),
    PlayersLatestSession(Vec<PlayerSession>),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request {
        request_id: u64,
        request: Request,
    },
    Disconnect,

    Connected {
        client_id: u32,
    },
    Tracks {
        tracks: Vec<Track>,
    },
    Response {
        request_id: u64,
        response: Response,
    },
    Failed {
        request_id: u64,
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect { client_version } => assert_eq!(client_version, 1),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_tracks() {
        let mut track = Track::new(7, Dimension::Nether, -12.0, 40.5);
        track.server = Some(DEFAULT_SERVER_NAME.to_string());
        track.previous_track_id = Some(3);

        let packet = Packet::Tracks {
            tracks: vec![track.clone(), Track::new(8, Dimension::End, 1.0, 2.0)],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Tracks { tracks } => {
                assert_eq!(tracks.len(), 2);
                assert_eq!(tracks[0], track);
                assert_eq!(tracks[1].dimension(), Dimension::End);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_drilled_cluster() {
        let cluster = Cluster {
            id: 11,
            x: 100.0,
            z: -50.0,
            dimension: Dimension::Overworld,
            server: None,
            count: 2,
            core: true,
            parent: None,
            disjoint_rank: 1,
            disjoint_size: 2,
            leafs: Some(vec![
                ClusterLeaf {
                    id: 1,
                    x: 99.0,
                    z: -49.0,
                },
                ClusterLeaf {
                    id: 2,
                    x: 101.0,
                    z: -51.0,
                },
            ]),
            updated_at: Some(1_700_000_000_000),
        };

        let packet = Packet::Response {
            request_id: 5,
            response: Response::ClusterChildren(cluster.clone()),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Response {
                request_id,
                response: Response::ClusterChildren(received),
            } => {
                assert_eq!(request_id, 5);
                assert_eq!(received, cluster);
                assert!(received.is_timing());
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_request_names() {
        let request = Request::TrackHistory {
            track_id: 1,
            max: 10,
            aggregation_ms: 10_000,
        };
        assert_eq!(request.name(), "full-track-history");
        assert_eq!(
            Request::ClusterChildren { cluster_id: 1 }.name(),
            "cluster"
        );
    }

    #[test]
    fn test_track_dimension_defaults_to_overworld() {
        let mut track = Track::new(1, Dimension::End, 0.0, 0.0);
        track.hit.dimension = None;
        assert_eq!(track.dimension(), Dimension::Overworld);
    }

    #[test]
    fn test_now_millis_advances() {
        let first = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(now_millis() > first);
    }
}
