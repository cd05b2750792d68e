mod state;
pub use state::{SessionConfig, SessionState};

use super::{
    codec::EipCodec,
    error::{Error, Result},
    frame::{builder, header::EncapCommand, response, EncapPacket},
};
use bytes::{Bytes, BytesMut};
use std::{io, time::Instant};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout},
};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// A registered EtherNet/IP session over TCP.
///
/// The session owns the socket and enforces strict request/response
/// sequencing: one outstanding exchange at a time, each carried as a
/// SendRRData round trip under the session handle issued at registration.
///
/// Two read disciplines are used deliberately. Registration replies are
/// collected with a deadline-bounded read loop because the target answers
/// immediately and the reply length is known. CIP exchanges use a
/// wait-then-drain discipline instead: block until the first reply bytes
/// arrive, allow a short settle window, then drain the socket and decode a
/// single frame from whatever arrived.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    stream: TcpStream,
    codec: EipCodec,
    read_buf: BytesMut,
    state: SessionState,
    session_handle: u32,
    connection_id: u32,
}

impl Session {
    /// Connect the transport. The session still needs [`Session::register`]
    /// before it can carry CIP requests.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let stream = match timeout(
            config.connect_timeout,
            TcpStream::connect(config.socket_addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => return Err(Error::ConnectTimeout),
        };
        let _ = stream.set_nodelay(config.tcp_nodelay);
        debug!(addr = %config.socket_addr, "transport connected");
        Ok(Self {
            config,
            stream,
            codec: EipCodec::default(),
            read_buf: BytesMut::with_capacity(4096),
            state: SessionState::Connected,
            session_handle: 0,
            connection_id: 0,
        })
    }

    /// Register the session and store the handle the target issued.
    ///
    /// The reply must echo the RegisterSession command; the handle is taken
    /// from the echoed header, not the reply payload. A zero handle means
    /// the target refused the session, which leaves the transport connected
    /// but unregistered.
    pub async fn register(&mut self) -> Result<()> {
        self.read_buf.clear();
        self.send_packet(builder::build_register_session()).await?;

        let deadline = Instant::now() + self.config.register_timeout;
        let reply = self.read_packet_until(deadline).await?;
        if reply.header.command != EncapCommand::RegisterSession.raw() {
            return Err(Error::ProtocolViolation {
                context: "register reply echoed a different command",
            });
        }
        let handle = reply.header.session_handle;
        if handle == 0 {
            return Err(Error::ProtocolViolation {
                context: "target issued a zero session handle",
            });
        }
        self.session_handle = handle;
        self.state = SessionState::Registered;
        debug!(session_handle = handle, "session registered");
        Ok(())
    }

    /// Execute one CIP request/response exchange and return the CIP reply
    /// payload, already unwrapped from its SendRRData envelope.
    ///
    /// There is no length-driven re-read after the settle window; a reply
    /// that is still incomplete by then is reported as
    /// [`Error::RequestTimeout`] and invalidates the session.
    pub async fn send_request(&mut self, cip: Bytes) -> Result<Bytes> {
        if self.state != SessionState::Registered {
            return Err(Error::NotRegistered);
        }

        // Stale bytes from an earlier exchange would break request/response
        // pairing; each exchange starts from an empty buffer.
        self.read_buf.clear();
        let packet = builder::wrap_rr_data(self.session_handle, cip)?;
        self.send_packet(packet).await?;

        match timeout(self.config.request_timeout, self.stream.readable()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => return Err(Error::RequestTimeout),
        }
        sleep(self.config.response_wait).await;

        let mut peer_closed = false;
        loop {
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        match self.codec.decode(&mut self.read_buf)? {
            Some(reply) => response::unwrap_rr_data(&reply),
            None if peer_closed => Err(Error::ConnectionClosed),
            None => Err(Error::RequestTimeout),
        }
    }

    /// Release the session: best-effort UnregisterSession, transport
    /// shutdown and state reset. Errors on the way out are ignored; the
    /// target answers unregister by closing the connection anyway.
    pub async fn close(&mut self) {
        if self.state == SessionState::Registered && self.session_handle != 0 {
            let packet = builder::build_unregister_session(self.session_handle);
            let mut wire = BytesMut::with_capacity(packet.total_len());
            if self.codec.encode(packet, &mut wire).is_ok() {
                let _ = self.stream.write_all(&wire).await;
            }
        }
        let _ = self.stream.shutdown().await;
        self.session_handle = 0;
        self.connection_id = 0;
        self.state = SessionState::Disconnected;
        debug!("session closed");
    }

    async fn send_packet(&mut self, packet: EncapPacket) -> Result<()> {
        let mut wire = BytesMut::with_capacity(packet.total_len());
        self.codec.encode(packet, &mut wire)?;
        self.stream.write_all(&wire).await?;
        Ok(())
    }

    /// Read whole frames until one decodes or the deadline passes.
    async fn read_packet_until(&mut self, deadline: Instant) -> Result<EncapPacket> {
        loop {
            if let Some(packet) = self.codec.decode(&mut self.read_buf)? {
                return Ok(packet);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::RequestTimeout);
            }
            match timeout(remaining, self.stream.read_buf(&mut self.read_buf)).await {
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => return Err(Error::RequestTimeout),
            }
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    /// Session handle issued by the target, zero when unregistered.
    #[inline]
    pub fn session_handle(&self) -> u32 {
        self.session_handle
    }

    /// Network connection id from the last successful ForwardOpen.
    #[inline]
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub(crate) fn set_connection_id(&mut self, id: u32) {
        self.connection_id = id;
    }
}
