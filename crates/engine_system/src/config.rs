//! Scene configuration.

use std::time::Duration;

/// Default capacity of a scene's work mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Configuration for one scene.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Human-readable scene name (e.g. `"lobby"`).
    pub name: String,
    /// Numeric scene id assigned by the host.
    pub scene_id: u64,
    /// How many posted jobs may wait before posters are back-pressured.
    pub mailbox_capacity: usize,
    /// Internal tick interval. `None` means an external driver ticks the
    /// scene through its handle.
    pub tick_rate: Option<Duration>,
}

impl SceneConfig {
    /// Create a config with the given name and default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scene_id: 0,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            tick_rate: None,
        }
    }

    /// Set the scene id.
    #[must_use]
    pub fn with_scene_id(mut self, scene_id: u64) -> Self {
        self.scene_id = scene_id;
        self
    }

    /// Set the mailbox capacity. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Tick the scene internally at a fixed interval.
    #[must_use]
    pub fn with_tick_rate(mut self, interval: Duration) -> Self {
        self.tick_rate = Some(interval);
        self
    }
}
