//! Connection lifecycle state and statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Lifecycle state of one connection.
///
/// Owned exclusively by the connection's read/write loops; both loops exit on
/// the transition to [`ConnectionState::Closed`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket yet
    Disconnected = 0,
    /// Dialing the socket
    Connecting = 1,
    /// Both loops running
    Connected = 2,
    /// Teardown in progress after an error, local close or cancellation
    Closing = 3,
    /// Both loops have exited; terminal
    Closed = 4,
}

impl ConnectionState {
    /// Converts a `u8` value to a `ConnectionState`.
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Converts the state to its `u8` representation.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` once the connection can no longer carry traffic.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Per-connection traffic counters (lock-free).
#[derive(Debug, Default)]
pub struct ConnectionStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    last_message_time: AtomicI64,
    connected_at: AtomicI64,
}

impl ConnectionStats {
    /// Creates a new counter set with everything at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outbound frame.
    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records one inbound frame.
    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.last_message_time
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records the instant the socket came up.
    pub fn record_connected(&self) {
        self.connected_at
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Creates an immutable snapshot of the counters.
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            last_message_time: self.last_message_time.load(Ordering::Relaxed),
            connected_at: self.connected_at.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of [`ConnectionStats`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatsSnapshot {
    /// Total frames written to the socket
    pub messages_sent: u64,
    /// Total frames read from the socket
    pub messages_received: u64,
    /// Total bytes written
    pub bytes_sent: u64,
    /// Total bytes read
    pub bytes_received: u64,
    /// Timestamp of the last inbound frame, in milliseconds
    pub last_message_time: i64,
    /// Timestamp the socket came up, in milliseconds
    pub connected_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_u8_round_trip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(255), ConnectionState::Closed);
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Closing.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }

    #[test]
    fn stats_snapshot_reflects_counters() {
        let stats = ConnectionStats::new();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_received(100);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.bytes_received, 100);
        assert!(snapshot.last_message_time > 0);
    }
}
