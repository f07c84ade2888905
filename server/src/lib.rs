//! # Tracking Feed Library
//!
//! This library implements a development feed for the track map. It plays
//! the part of the upstream services a map talks to: a position tracker, a
//! density clustering service and a player session store. It simulates the
//! players itself, so a map can be run end to end without any real server.
//!
//! ## Core Responsibilities
//!
//! ### Simulated World
//! A configurable number of players wander the nether, overworld and end,
//! occasionally walking through portals, leaving and rejoining. Every move
//! is recorded as track history, one track per stay in a dimension.
//!
//! ### Clustering
//! Recorded points are grouped on a regular grid into root nodes and their
//! child nodes. Recently active roots are published as timing nodes. This
//! is a stand-in for real density clustering, not an implementation of it.
//!
//! ### Query Answering
//! Every query a map issues is answered from the current world:
//! - Tracker requests get the live positions as a `Tracks` batch
//! - Root cluster, cluster children and association lookups
//! - Full track histories across portal hops, aggregated and capped
//! - Latest join and leave of a set of players
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! The world, the cluster index and query answering live on one loop. Network
//! tasks only move packets in and out through channels, so no query ever sees
//! a half-stepped world.
//!
//! ### UDP-Based Communication
//! Every request and reply is one `bincode` datagram. Replies that would not
//! fit are turned into failures rather than split.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Subscriber ids and address lookup
//! - Capacity limit
//! - Timeout of silent subscribers
//!
//! ### World Module (`world`)
//! - Wandering players and portal travel
//! - Track records and history chains
//! - Player sessions
//!
//! ### Clusters Module (`clusters`)
//! - Two-level grid hierarchy with stable node ids
//! - Leafs and player associations per node
//!
//! ### Network Module (`network`)
//! - UDP socket tasks and the main loop
//! - Request answering
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::world::World;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::new("2b2t.org", 200, 42, shared::now_millis());
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         world,
//!         Duration::from_millis(100),
//!         Duration::from_secs(30),
//!         32,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod clusters;
pub mod network;
pub mod world;
