//! Two-level grid clustering of recorded track points
//!
//! Points are bucketed per dimension into coarse root cells and, inside each
//! root, fine child cells. Roots with enough points are published; both
//! levels can be drilled into for their member points. Node ids encode the
//! level, dimension and cell, so they survive rebuilds.

use crate::world::World;
use log::debug;
use shared::{Cluster, ClusterLeaf, Dimension, Hit, Player};
use std::collections::HashMap;

/// Root cell edge, in the dimension's own blocks.
pub const ROOT_CELL: f64 = 2_048.0;
pub const CHILD_CELL: f64 = 256.0;
/// Fewest points a root cell needs to be published.
pub const MIN_ROOT_POINTS: usize = 8;
/// Roots with at least this many points are core nodes.
pub const CORE_POINTS: u32 = 64;
pub const MAX_ROOTS: usize = 400;
pub const MAX_LEAFS: usize = 2_000;
/// Roots touched this recently are published as timing nodes.
pub const RECENT_ACTIVITY_MS: u64 = 10 * 60 * 1_000;

const CELL_BITS: u32 = 29;
const CELL_OFFSET: i64 = 1 << (CELL_BITS - 1);
const CELL_MASK: u64 = (1 << CELL_BITS) - 1;

fn cell_of(x: f64, z: f64, edge: f64) -> (i64, i64) {
    ((x / edge).floor() as i64, (z / edge).floor() as i64)
}

fn node_id(child: bool, dimension: Dimension, cell: (i64, i64)) -> u64 {
    let level = child as u64;
    let dim = (dimension.id() + 1) as u64;
    let cx = ((cell.0 + CELL_OFFSET) as u64) & CELL_MASK;
    let cz = ((cell.1 + CELL_OFFSET) as u64) & CELL_MASK;
    level << 62 | dim << 58 | cx << CELL_BITS | cz
}

#[derive(Debug, Clone)]
struct Node {
    cluster: Cluster,
    /// Member points with the index of the player that left them.
    members: Vec<(usize, ClusterLeaf)>,
}

impl Node {
    fn new(id: u64, dimension: Dimension, server: &str, points: &[(usize, &Hit)]) -> Self {
        let count = points.len().max(1) as f64;
        let (sx, sz) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sz), (_, hit)| (sx + hit.x, sz + hit.z));

        let members = points
            .iter()
            .enumerate()
            .map(|(i, (owner, hit))| {
                (
                    *owner,
                    ClusterLeaf {
                        id: i as u64,
                        x: hit.x,
                        z: hit.z,
                    },
                )
            })
            .collect();

        Self {
            cluster: Cluster {
                id,
                x: sx / count,
                z: sz / count,
                dimension,
                server: Some(server.to_string()),
                count: points.len() as u32,
                core: false,
                parent: None,
                disjoint_rank: 0,
                disjoint_size: 1,
                leafs: None,
                updated_at: None,
            },
            members,
        }
    }
}

#[derive(Default)]
pub struct ClusterIndex {
    nodes: HashMap<u64, Node>,
    roots: HashMap<Dimension, Vec<u64>>,
    built_at: u64,
}

impl ClusterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clusters every point the world has recorded.
    pub fn build(world: &World, now: u64) -> Self {
        let mut index = Self {
            built_at: now,
            ..Self::default()
        };

        for dimension in Dimension::ALL {
            let mut cells: HashMap<(i64, i64), Vec<(usize, &Hit)>> = HashMap::new();
            for (owner, hit) in world.hits(dimension) {
                cells
                    .entry(cell_of(hit.x, hit.z, ROOT_CELL))
                    .or_default()
                    .push((owner, hit));
            }

            let mut roots: Vec<Node> = Vec::new();
            for (cell, points) in cells {
                if points.len() < MIN_ROOT_POINTS {
                    continue;
                }
                let root_id = node_id(false, dimension, cell);

                let mut children: HashMap<(i64, i64), Vec<(usize, &Hit)>> = HashMap::new();
                for &(owner, hit) in &points {
                    children
                        .entry(cell_of(hit.x, hit.z, CHILD_CELL))
                        .or_default()
                        .push((owner, hit));
                }

                let mut root = Node::new(root_id, dimension, world.server(), &points);
                root.cluster.core = root.cluster.count >= CORE_POINTS;
                root.cluster.disjoint_size = children.len() as u32;

                let newest = points.iter().filter_map(|(_, hit)| hit.created_at).max();
                root.cluster.updated_at =
                    newest.filter(|&at| now.saturating_sub(at) <= RECENT_ACTIVITY_MS);

                for (child_cell, child_points) in children {
                    let child_id = node_id(true, dimension, child_cell);
                    let mut child = Node::new(child_id, dimension, world.server(), &child_points);
                    child.cluster.parent = Some(root_id);
                    index.nodes.insert(child_id, child);
                }
                roots.push(root);
            }

            roots.sort_by(|a, b| b.cluster.count.cmp(&a.cluster.count));
            let ids: Vec<u64> = roots.iter().map(|r| r.cluster.id).collect();
            for (rank, mut root) in roots.into_iter().enumerate() {
                root.cluster.disjoint_rank = rank as u32;
                index.nodes.insert(root.cluster.id, root);
            }
            index.roots.insert(dimension, ids);
        }

        debug!("Cluster index rebuilt: {} nodes", index.nodes.len());
        index
    }

    pub fn built_at(&self) -> u64 {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Published roots of one dimension, largest first, without leafs.
    pub fn roots(&self, dimension: Dimension) -> Vec<Cluster> {
        self.roots
            .get(&dimension)
            .map(|ids| {
                ids.iter()
                    .take(MAX_ROOTS)
                    .filter_map(|id| self.nodes.get(id))
                    .map(|node| node.cluster.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The node with its member points as leafs, thinned to [`MAX_LEAFS`].
    pub fn children(&self, cluster_id: u64) -> Option<Cluster> {
        let node = self.nodes.get(&cluster_id)?;
        let stride = node.members.len().div_ceil(MAX_LEAFS).max(1);

        let mut cluster = node.cluster.clone();
        cluster.leafs = Some(
            node.members
                .iter()
                .step_by(stride)
                .map(|(_, leaf)| leaf.clone())
                .collect(),
        );
        Some(cluster)
    }

    /// Players that left points in the node, strongest first.
    ///
    /// Strength grows with the log of the shared point count, so a handful
    /// of points reads as weak and a few dozen as strong.
    pub fn associations(&self, cluster_id: u64, world: &World) -> Option<Vec<Player>> {
        let node = self.nodes.get(&cluster_id)?;

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for (owner, _) in &node.members {
            *counts.entry(*owner).or_default() += 1;
        }

        let mut players: Vec<Player> = counts
            .into_iter()
            .filter_map(|(owner, count)| {
                let sim = world.player(owner)?;
                let mut player = Player::new(&sim.username, &sim.uuid);
                player.strength = Some((1.0 + count as f32).ln());
                player.online = Some(sim.is_online());
                Some(player)
            })
            .collect();

        players.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.username.cmp(&b.username))
        });
        Some(players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn busy_world() -> (World, u64) {
        let mut world = World::new("2b2t.org", 40, 21, START);
        let mut now = START;
        for _ in 0..60 {
            now += 1_000;
            world.step(Duration::from_secs(1), now);
        }
        (world, now)
    }

    #[test]
    fn test_node_ids_are_stable_and_distinct() {
        let root = node_id(false, Dimension::Overworld, (3, -4));
        assert_eq!(root, node_id(false, Dimension::Overworld, (3, -4)));
        assert_ne!(root, node_id(true, Dimension::Overworld, (3, -4)));
        assert_ne!(root, node_id(false, Dimension::Nether, (3, -4)));
        assert_ne!(root, node_id(false, Dimension::Overworld, (-4, 3)));
    }

    #[test]
    fn test_cell_of_floors_negative_coordinates() {
        assert_eq!(cell_of(-1.0, 1.0, 256.0), (-1, 0));
        assert_eq!(cell_of(512.0, -512.0, 256.0), (2, -2));
    }

    #[test]
    fn test_roots_are_ranked_by_size() {
        let (world, now) = busy_world();
        let index = ClusterIndex::build(&world, now);
        assert!(!index.is_empty());
        assert_eq!(index.built_at(), now);

        let roots = index.roots(Dimension::Overworld);
        assert!(!roots.is_empty());
        for (rank, root) in roots.iter().enumerate() {
            assert_eq!(root.disjoint_rank, rank as u32);
            assert!(root.count as usize >= MIN_ROOT_POINTS);
            assert!(root.parent.is_none());
            assert!(root.leafs.is_none());
            // everything was recorded within the last minute
            assert!(root.is_timing());
        }
        for pair in roots.windows(2) {
            assert!(pair[0].count >= pair[1].count);
        }
    }

    #[test]
    fn test_children_carry_member_leafs() {
        let (world, now) = busy_world();
        let index = ClusterIndex::build(&world, now);
        let root = &index.roots(Dimension::Overworld)[0];

        let drilled = index.children(root.id).unwrap();
        let leafs = drilled.leafs.unwrap();
        assert_eq!(leafs.len(), root.count as usize);

        let xs: f64 = leafs.iter().map(|l| l.x).sum::<f64>() / leafs.len() as f64;
        assert_approx_eq!(xs, root.x, 1e-6);

        assert!(index.children(12345).is_none());
    }

    #[test]
    fn test_child_nodes_point_at_their_root() {
        let (world, now) = busy_world();
        let index = ClusterIndex::build(&world, now);
        let root = &index.roots(Dimension::Overworld)[0];

        let children: Vec<&Node> = index
            .nodes
            .values()
            .filter(|n| n.cluster.parent == Some(root.id))
            .collect();
        assert_eq!(children.len() as u32, root.disjoint_size);
        let total: u32 = children.iter().map(|n| n.cluster.count).sum();
        assert_eq!(total, root.count);
    }

    #[test]
    fn test_associations_rank_by_strength() {
        let (world, now) = busy_world();
        let index = ClusterIndex::build(&world, now);
        let root = &index.roots(Dimension::Overworld)[0];

        let players = index.associations(root.id, &world).unwrap();
        assert!(!players.is_empty());
        for pair in players.windows(2) {
            assert!(pair[0].strength >= pair[1].strength);
        }
        assert!(players.iter().all(|p| p.strength.unwrap() > 0.0));
        assert!(index.associations(12345, &world).is_none());
    }

    #[test]
    fn test_stale_roots_are_not_timing_nodes() {
        let (world, now) = busy_world();
        let index = ClusterIndex::build(&world, now + RECENT_ACTIVITY_MS + 60_000);

        for root in index.roots(Dimension::Overworld) {
            assert!(!root.is_timing());
        }
    }
}
