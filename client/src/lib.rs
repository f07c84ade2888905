//! # Track Map Client Library
//!
//! This library implements the map side of the tracker: it follows every
//! tracked player across the nether, overworld and end, draws them on one
//! overworld-scaled map, and lets the user drill from density clusters down
//! into cluster children, track histories and associated players.
//!
//! ## Architecture Overview
//!
//! A single [`session::MapSession`] owns all map state and is only ever
//! touched from the window thread. Work reaches it three ways:
//!
//! ### Timers
//! The [`scheduler::Scheduler`] runs repeating and one-shot timers on a
//! background tokio runtime. Timers never touch the map; they post a
//! [`session::SessionEvent`] into a channel the frame loop drains.
//!
//! ### Feed Packets
//! The [`network::Transport`] keeps a UDP link to the feed and decodes
//! packets into a channel. Requests go the other way through the session's
//! [`outbox::Outbox`], tagged with an id so responses find their caller.
//!
//! ### User Input
//! Clicks, drags, wheel zooms and key presses arrive from
//! [`input::InputManager`] once per frame.
//!
//! ## Module Organization
//!
//! ### Markers (`marker`, `registry`)
//! - Point collections with stable ids and mark/sweep diffing
//! - Per-type styles and draw order
//! - Track id lookup for live positions
//!
//! ### Live Tracking (`tracking`)
//! - Tracker request windows
//! - Batch application with the max-radius filter
//! - Extending shown track histories with live positions
//!
//! ### Drill-Down (`drilldown`)
//! - Root cluster polling and framing
//! - Cluster children, track history, associations and sessions
//! - A request-keyed lock so one drill runs at a time
//!
//! ### View (`viewport`, `rendering`)
//! - Visible ranges, guide diagonals, world border and tick spacing
//! - Marker drawing, hover picking and the HUD
//!
//! ### Plumbing (`config`, `notify`, `timefmt`, `app`)
//! - Session cadences and limits
//! - On-screen notes with lingering removal
//! - Timestamp and relative-time formatting
//! - The per-frame loop tying it all together

pub mod app;
pub mod config;
pub mod drilldown;
pub mod input;
pub mod marker;
pub mod network;
pub mod notify;
pub mod outbox;
pub mod registry;
pub mod rendering;
pub mod scheduler;
pub mod session;
pub mod timefmt;
pub mod tracking;
pub mod viewport;
