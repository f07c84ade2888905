use crate::dimension::Dimension;
use serde::{Deserialize, Serialize};

/// A single point observation in raw dimension coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub x: f64,
    pub z: f64,
    pub dimension: Option<Dimension>,
    pub track_id: Option<u32>,
    /// Milliseconds since the Unix epoch.
    pub created_at: Option<u64>,
}

impl Hit {
    pub fn new(x: f64, z: f64) -> Self {
        Self {
            x,
            z,
            dimension: None,
            track_id: None,
            created_at: None,
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_track(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// One live position update for one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub hit: Hit,
    pub server: Option<String>,
    pub previous_track_id: Option<u32>,
    pub previous_dimension: Option<Dimension>,
}

impl Track {
    pub fn new(track_id: u32, dimension: Dimension, x: f64, z: f64) -> Self {
        Self {
            hit: Hit::new(x, z)
                .with_dimension(dimension)
                .with_track(track_id),
            server: None,
            previous_track_id: None,
            previous_dimension: None,
        }
    }

    pub fn track_id(&self) -> Option<u32> {
        self.hit.track_id
    }

    pub fn dimension(&self) -> Dimension {
        self.hit.dimension.unwrap_or(Dimension::Overworld)
    }
}

/// Full historical path of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackHistory {
    pub track_id: u32,
    pub dimension: Dimension,
    pub server: Option<String>,
    pub hits: Vec<Hit>,
}

/// Leaf point of a drilled cluster, in the cluster's dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLeaf {
    pub id: u64,
    pub x: f64,
    pub z: f64,
}

/// A node of the upstream density clustering hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub x: f64,
    pub z: f64,
    pub dimension: Dimension,
    pub server: Option<String>,
    pub count: u32,
    pub core: bool,
    pub parent: Option<u64>,
    pub disjoint_rank: u32,
    pub disjoint_size: u32,
    /// Only populated when the cluster was drilled into.
    pub leafs: Option<Vec<ClusterLeaf>>,
    /// Present on timing nodes; milliseconds since the Unix epoch.
    pub updated_at: Option<u64>,
}

impl Cluster {
    pub fn is_timing(&self) -> bool {
        self.updated_at.is_some()
    }
}

/// A player associated with a cluster's members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub username: String,
    pub uuid: String,
    pub strength: Option<f32>,
    pub online: Option<bool>,
    pub join: Option<u64>,
    pub leave: Option<u64>,
}

impl Player {
    pub fn new(username: &str, uuid: &str) -> Self {
        Self {
            username: username.to_string(),
            uuid: uuid.to_string(),
            strength: None,
            online: None,
            join: None,
            leave: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSession {
    pub username: Option<String>,
    pub uuid: Option<String>,
    pub join: Option<u64>,
    pub leave: Option<u64>,
}
