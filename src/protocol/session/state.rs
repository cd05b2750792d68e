use std::{net::SocketAddr, time::Duration};

/// Session lifecycle state.
///
/// Registration is the only handshake: a session moves to `Registered` once
/// the target has issued a non-zero session handle and stays there until the
/// transport drops or the session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// TCP established, no session handle yet.
    Connected,
    /// Session handle issued, CIP traffic allowed.
    Registered,
}

/// EtherNet/IP session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote target address (host:port)
    pub socket_addr: SocketAddr,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Budget for the complete RegisterSession reply
    pub register_timeout: Duration,
    /// Bound on waiting for the first reply bytes of an exchange
    pub request_timeout: Duration,
    /// Settle delay between the first reply bytes and draining the socket
    pub response_wait: Duration,
    /// TCP_NODELAY option. Defaults to true for low-latency small PDUs
    pub tcp_nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_addr: SocketAddr::from(([127, 0, 0, 1], 44818)),
            connect_timeout: Duration::from_millis(10_000),
            register_timeout: Duration::from_millis(1_000),
            request_timeout: Duration::from_millis(5_000),
            response_wait: Duration::from_millis(50),
            tcp_nodelay: true,
        }
    }
}
