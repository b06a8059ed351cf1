use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Global settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `global_settings` block: connection fan-out, timeouts, retries and
/// the limits applied to each query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Maximum number of servers being connected at the same time.
    #[serde(default = "d_5")]
    pub concurrent_connections: usize,
    /// Per-attempt bound on launching a server and completing the
    /// handshake (seconds).
    #[serde(default = "d_10")]
    pub connection_timeout: u64,
    /// Total connection attempts per server before it is marked unreachable.
    #[serde(default = "d_3")]
    pub retry_attempts: u32,
    /// Base delay between connection attempts; doubles after each failure.
    #[serde(default = "d_500")]
    pub retry_backoff_ms: u64,
    /// Per-call bound on a single `tools/call` (seconds).
    #[serde(default = "d_30")]
    pub tool_timeout: u64,
    /// Maximum model → tool → model round-trips for one user query.
    #[serde(default = "d_10u")]
    pub max_tool_rounds: u32,
    /// What to do when two servers advertise the same tool name.
    #[serde(default)]
    pub on_tool_conflict: ConflictPolicy,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            concurrent_connections: 5,
            connection_timeout: 10,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            tool_timeout: 30,
            max_tool_rounds: 10,
            on_tool_conflict: ConflictPolicy::FirstWins,
        }
    }
}

impl GlobalSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Tool-name collision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The server listed first in the configuration keeps the name; later
    /// duplicates are reported and ignored.
    #[default]
    FirstWins,
    /// Abort startup on the first duplicate.
    Fail,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_5() -> usize {
    5
}
fn d_10() -> u64 {
    10
}
fn d_3() -> u32 {
    3
}
fn d_500() -> u64 {
    500
}
fn d_30() -> u64 {
    30
}
fn d_10u() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_uses_documented_defaults() {
        let s: GlobalSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, GlobalSettings::default());
        assert_eq!(s.concurrent_connections, 5);
        assert_eq!(s.connection_timeout(), Duration::from_secs(10));
        assert_eq!(s.retry_attempts, 3);
    }

    #[test]
    fn partial_block_keeps_other_defaults() {
        let s: GlobalSettings = serde_json::from_str(
            r#"{ "concurrent_connections": 3, "connection_timeout": 10, "retry_attempts": 2 }"#,
        )
        .unwrap();
        assert_eq!(s.concurrent_connections, 3);
        assert_eq!(s.retry_attempts, 2);
        assert_eq!(s.tool_timeout, 30);
        assert_eq!(s.on_tool_conflict, ConflictPolicy::FirstWins);
    }

    #[test]
    fn conflict_policy_parses_snake_case() {
        let s: GlobalSettings = serde_json::from_str(r#"{ "on_tool_conflict": "fail" }"#).unwrap();
        assert_eq!(s.on_tool_conflict, ConflictPolicy::Fail);
        let s: GlobalSettings =
            serde_json::from_str(r#"{ "on_tool_conflict": "first_wins" }"#).unwrap();
        assert_eq!(s.on_tool_conflict, ConflictPolicy::FirstWins);
    }
}
