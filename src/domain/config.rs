//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! The infrastructure layer populates it from CLI arguments or environment
//! variables; the domain itself performs no environment reads.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the SysEx gateway.
///
/// Built once at startup and wrapped in an `Arc` so it can be shared cheaply
/// across all connection tasks.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The address and port the WebSocket server binds to.
    ///
    /// `0.0.0.0` accepts connections from any network interface.  Set to
    /// `127.0.0.1` to accept only local connections.
    pub bind_addr: SocketAddr,

    /// Shared secret every inbound request must carry in its `token` field.
    ///
    /// Requests with a non-matching token are dropped silently.
    pub token: String,

    /// Per-session debug verbosity flag.
    ///
    /// Gates the optional logs for dropped requests (invalid token,
    /// malformed message) and per-send payload sizes.
    pub debug: bool,

    /// Retry policy applied when a client requests `resend` on a send.
    pub resend: ResendPolicy,
}

/// Bounded retry policy for unacknowledged SysEx sends.
///
/// The upstream device is expected to echo a receipt message through the
/// input port; until that arrives, the message is re-issued every
/// `interval`, at most `max_attempts` times.  The worst-case wall-clock
/// wait is `max_attempts * interval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendPolicy {
    /// Maximum number of re-transmissions before giving up.
    pub max_attempts: u32,

    /// Wait between re-transmissions.
    pub interval: Duration,
}

impl Default for ResendPolicy {
    /// Returns the stock policy: 10 attempts spaced 150 ms apart
    /// (≈ 1.5 s worst case).
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(150),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resend_policy_is_10_attempts() {
        let policy = ResendPolicy::default();
        assert_eq!(policy.max_attempts, 10);
    }

    #[test]
    fn test_default_resend_policy_interval_is_150ms() {
        let policy = ResendPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(150));
    }

    #[test]
    fn test_config_can_be_cloned() {
        // Cloneability is required so an Arc<GatewayConfig> can be shared
        // across connection tasks.
        let cfg = GatewayConfig {
            bind_addr: "0.0.0.0:9002".parse().unwrap(),
            token: "secret".to_string(),
            debug: false,
            resend: ResendPolicy::default(),
        };
        let cloned = cfg.clone();
        assert_eq!(cfg.bind_addr, cloned.bind_addr);
        assert_eq!(cfg.token, cloned.token);
    }
}
