//! Configuration for sockets and listeners.

use crate::payload::max_base64_len;

/// Default per-message frame limit enforced by the adapter, in bytes.
///
/// 24 bytes of framing headroom on top of a 4 MB payload.
pub const DEFAULT_MAX_FRAME: usize = 24 + 4_000_000;

/// Frame limit handed to the protocol engine, in bytes (14 MiB).
pub const BACKEND_MAX_FRAME: usize = 14 << 20;

/// Advisory write high-water mark, in bytes.
///
/// Queued-but-unflushed output beyond this threshold makes `write`
/// report backpressure.
pub const DEFAULT_WRITE_HIGH_WATER: usize = 16 * 1024;

/// Socket and listener configuration.
///
/// Two frame limits coexist on purpose: [`Config::max_frame`] is the
/// adapter's own per-message cap, checked against every normalized
/// payload, while [`Config::backend_max_frame`] is the hard limit the
/// protocol engine enforces at the framing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum accepted payload size after normalization.
    ///
    /// Default: [`DEFAULT_MAX_FRAME`] (4,000,024 bytes).
    pub max_frame: usize,

    /// Maximum frame size configured on the protocol engine.
    ///
    /// Default: [`BACKEND_MAX_FRAME`] (14 MiB).
    pub backend_max_frame: usize,

    /// Advisory backpressure threshold for queued output.
    ///
    /// Default: [`DEFAULT_WRITE_HIGH_WATER`] (16 KiB).
    pub write_high_water: usize,

    /// Origin header sent on client dials.
    ///
    /// Default: `https://www.example.com/`.
    pub origin: String,

    /// User-Agent header sent on client dials.
    ///
    /// Default: `wsock`.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
            backend_max_frame: BACKEND_MAX_FRAME,
            write_high_water: DEFAULT_WRITE_HIGH_WATER,
            origin: "https://www.example.com/".to_string(),
            user_agent: "wsock".to_string(),
        }
    }
}

impl Config {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the adapter's per-message frame limit.
    #[must_use]
    pub const fn with_max_frame(mut self, size: usize) -> Self {
        self.max_frame = size;
        self
    }

    /// Set the frame limit handed to the protocol engine.
    #[must_use]
    pub const fn with_backend_max_frame(mut self, size: usize) -> Self {
        self.backend_max_frame = size;
        self
    }

    /// Set the advisory write high-water mark.
    #[must_use]
    pub const fn with_write_high_water(mut self, size: usize) -> Self {
        self.write_high_water = size;
        self
    }

    /// Set the Origin header for client dials.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the User-Agent header for client dials.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The maximum base64 text length derived from [`Config::max_frame`].
    #[must_use]
    pub const fn max_base64(&self) -> usize {
        max_base64_len(self.max_frame)
    }
}
