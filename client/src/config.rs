use shared::{Dimension, DEFAULT_SERVER_NAME};
use std::time::Duration;

/// Cadences and limits of one map session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Game server whose players are tracked.
    pub server: String,
    /// Dimension the root cluster poll asks for.
    pub cluster_dimension: Dimension,
    pub tracking_interval: Duration,
    pub cluster_interval: Duration,
    /// Delay before a poll skipped for lack of a connection is retried.
    pub retry_delay: Duration,
    pub radius_debounce: Duration,
    /// How long a progress note lingers after its request completed.
    pub note_linger: Duration,
    pub tracking_window: Duration,
    pub history_max: u32,
    pub history_aggregation: Duration,
    /// Initial radius filter; zero disables it.
    pub max_radius: f64,
    /// A drill still unanswered after this long is given up.
    pub drill_timeout: Duration,
}

impl SessionConfig {
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_max_radius(mut self, max_radius: f64) -> Self {
        self.max_radius = max_radius;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER_NAME.to_string(),
            cluster_dimension: Dimension::Overworld,
            tracking_interval: Duration::from_secs(2),
            cluster_interval: Duration::from_secs(60),
            retry_delay: Duration::from_millis(100),
            radius_debounce: Duration::from_millis(500),
            note_linger: Duration::from_millis(2500),
            tracking_window: Duration::from_secs(15),
            history_max: 10_000,
            history_aggregation: Duration::from_secs(10),
            max_radius: 0.0,
            drill_timeout: Duration::from_secs(15),
        }
    }
}
