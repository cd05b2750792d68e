//! Shared fixtures for the integration tests: tracing setup and a scripted
//! in-process device answering on a loopback listener.

use std::{net::SocketAddr, sync::Once};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

const REGISTER_SESSION: u16 = 0x0065;
const UNREGISTER_SESSION: u16 = 0x0066;
const SEND_RR_DATA: u16 = 0x006F;

static INIT_TRACING: Once = Once::new();

/// Install the tracing subscriber once for the whole test binary.
///
/// Defaults to `debug` so reconnects and timeouts are visible; override
/// with `RUST_LOG`. Targets and timestamps are disabled to keep test
/// output compact.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// One scripted answer for a SendRRData exchange.
pub enum DeviceReply {
    /// Wrap this CIP payload in a well-formed SendRRData frame.
    Cip(Vec<u8>),
    /// Send these bytes verbatim, letting tests inject malformed frames.
    Raw(Vec<u8>),
    /// Read the request, then close the socket without answering.
    Close,
}

/// What the device observed before the connection ended.
#[derive(Debug, Default)]
pub struct DeviceLog {
    /// CIP payload of every SendRRData request, in arrival order.
    pub requests: Vec<Vec<u8>>,
    /// Whether an UnregisterSession frame arrived.
    pub unregistered: bool,
}

/// Scripted EtherNet/IP target on an ephemeral loopback port.
///
/// The device accepts one connection, answers RegisterSession with the
/// configured handle and then plays the reply script one entry per
/// SendRRData request. It records everything it saw for assertions.
pub struct MockDevice {
    pub addr: SocketAddr,
    task: JoinHandle<DeviceLog>,
}

impl MockDevice {
    /// Start a well-behaved device issuing `session_handle` at registration.
    pub async fn start(session_handle: u32, replies: Vec<DeviceReply>) -> Self {
        Self::start_with_register_reply(REGISTER_SESSION, session_handle, replies).await
    }

    /// Start a device that answers RegisterSession with an arbitrary
    /// command code, for handshake rejection tests.
    pub async fn start_with_register_reply(
        register_command: u16,
        session_handle: u32,
        replies: Vec<DeviceReply>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock device");
        let addr = listener.local_addr().expect("mock device addr");
        let task = tokio::spawn(serve(listener, register_command, session_handle, replies));
        Self { addr, task }
    }

    /// Wait for the connection to end and return the observation log.
    pub async fn finish(self) -> DeviceLog {
        self.task.await.expect("mock device task")
    }
}

async fn serve(
    listener: TcpListener,
    register_command: u16,
    session_handle: u32,
    replies: Vec<DeviceReply>,
) -> DeviceLog {
    let mut log = DeviceLog::default();
    let (mut stream, _) = match listener.accept().await {
        Ok(conn) => conn,
        Err(_) => return log,
    };
    let mut replies = replies.into_iter();

    loop {
        let frame = match read_frame(&mut stream).await {
            Some(frame) => frame,
            None => return log,
        };
        let command = u16::from_le_bytes([frame[0], frame[1]]);
        match command {
            REGISTER_SESSION => {
                // Echo the protocol version block; the handle travels in
                // the header.
                let reply = encap_frame(register_command, session_handle, &frame[24..]);
                if stream.write_all(&reply).await.is_err() {
                    return log;
                }
            }
            UNREGISTER_SESSION => {
                log.unregistered = true;
                return log;
            }
            SEND_RR_DATA => {
                // 24-byte header plus the 16-byte RR envelope.
                log.requests.push(frame[40..].to_vec());
                match replies.next() {
                    Some(DeviceReply::Cip(cip)) => {
                        let reply = rr_frame(session_handle, &cip);
                        if stream.write_all(&reply).await.is_err() {
                            return log;
                        }
                    }
                    Some(DeviceReply::Raw(bytes)) => {
                        if stream.write_all(&bytes).await.is_err() {
                            return log;
                        }
                    }
                    Some(DeviceReply::Close) | None => return log,
                }
            }
            _ => return log,
        }
    }
}

/// Read one whole encapsulation frame, or `None` once the peer is gone.
async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut header = [0u8; 24];
    stream.read_exact(&mut header).await.ok()?;
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut frame = header.to_vec();
    if length > 0 {
        let mut payload = vec![0u8; length];
        stream.read_exact(&mut payload).await.ok()?;
        frame.extend_from_slice(&payload);
    }
    Some(frame)
}

/// Assemble a 24-byte encapsulation header plus payload.
pub fn encap_frame(command: u16, session_handle: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(24 + payload.len());
    frame.extend_from_slice(&command.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&session_handle.to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes()); // status
    frame.extend_from_slice(&0u64.to_le_bytes()); // sender context
    frame.extend_from_slice(&0u32.to_le_bytes()); // options
    frame.extend_from_slice(payload);
    frame
}

/// Wrap a CIP payload in a SendRRData reply frame.
pub fn rr_frame(session_handle: u32, cip: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16 + cip.len());
    payload.extend_from_slice(&0u32.to_le_bytes()); // interface handle
    payload.extend_from_slice(&0u16.to_le_bytes()); // timeout
    payload.extend_from_slice(&2u16.to_le_bytes()); // item count
    payload.extend_from_slice(&0u16.to_le_bytes()); // null address item
    payload.extend_from_slice(&0u16.to_le_bytes()); // no address data
    payload.extend_from_slice(&0x00B2u16.to_le_bytes()); // unconnected data item
    payload.extend_from_slice(&(cip.len() as u16).to_le_bytes());
    payload.extend_from_slice(cip);
    encap_frame(SEND_RR_DATA, session_handle, &payload)
}
