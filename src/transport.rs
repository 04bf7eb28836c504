//! TCP session with a single device.
//!
//! A session owns one socket for one connection attempt. It reports every
//! outcome through a callback instead of returning errors, so the owning
//! controller can drive its state machine from a single event stream.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::future::{self, AbortHandle, Either};
use futures::{StreamExt, pin_mut};
use log::{debug, warn};

use crate::address::Address;
use crate::errors::Error;
use crate::packet::{FrameDecoder, IncomingPacket};
use crate::runtime::{self, AsyncTcpStream, TcpReader, TcpStream, TcpWriter};

const READ_BUFFER_SIZE: usize = 1024;

/// Everything a session can report to its owner.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// The socket is open; frames sent here are written in order.
    Connected { frames: UnboundedSender<Vec<u8>> },
    ConnectFailed(Error),
    Packet(IncomingPacket),
    /// A frame could not be decoded and was dropped.
    FrameError(Error),
    /// A write failed; the socket stays open.
    WriteFailed(Error),
    /// The read loop ended. `None` means the device closed the connection.
    Lost(Option<Error>),
}

/// Handle to a running session.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    abort: AbortHandle,
    closed: oneshot::Receiver<()>,
}

impl SessionHandle {
    /// Stop the session. The returned receiver resolves once its socket is dropped.
    pub(crate) fn close(self) -> oneshot::Receiver<()> {
        self.abort.abort();
        self.closed
    }
}

/// Start a session to `address`.
///
/// When `previous` is given, the connection attempt waits until it resolves,
/// so a reconnect never overlaps the socket it replaces.
pub(crate) fn open<F>(
    address: &Address,
    previous: Option<oneshot::Receiver<()>>,
    report: F,
) -> SessionHandle
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    let (closed_tx, closed_rx) = oneshot::channel();
    let (task, abort) = future::abortable(run(address.to_string(), previous, report, closed_tx));
    runtime::spawn_detached(async move {
        let _ = task.await;
    });
    SessionHandle {
        abort,
        closed: closed_rx,
    }
}

async fn run<F>(
    addr: String,
    previous: Option<oneshot::Receiver<()>>,
    report: F,
    // Dropped together with the socket, which resolves the handle's receiver.
    _closed: oneshot::Sender<()>,
) where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    debug!("{addr}: connecting");
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            report(SessionEvent::ConnectFailed(Error::socket("connect", e)));
            return;
        }
    };

    let (frames_tx, frames_rx) = mpsc::unbounded();
    report(SessionEvent::Connected { frames: frames_tx });

    let (reader, writer) = stream.into_split();
    let read = read_loop(reader, &report);
    let write = write_loop(writer, frames_rx, &report);
    pin_mut!(read);
    pin_mut!(write);

    match future::select(read, write).await {
        Either::Left((error, _)) => report(SessionEvent::Lost(error)),
        Either::Right(_) => debug!("{addr}: writer released, closing session"),
    }
}

async fn read_loop<R, F>(mut reader: R, report: &F) -> Option<Error>
where
    R: TcpReader,
    F: Fn(SessionEvent),
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => return None,
            Ok(size) => {
                for frame in decoder.decode(&buffer[..size]) {
                    match frame {
                        Ok(packet) => report(SessionEvent::Packet(packet)),
                        Err(e) => report(SessionEvent::FrameError(e)),
                    }
                }
            }
            Err(e) => return Some(Error::socket("read", e)),
        }
    }
}

async fn write_loop<W, F>(mut writer: W, mut frames: UnboundedReceiver<Vec<u8>>, report: &F)
where
    W: TcpWriter,
    F: Fn(SessionEvent),
{
    while let Some(frame) = frames.next().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("write failed: {e}");
            report(SessionEvent::WriteFailed(Error::socket("write", e)));
        }
    }
    let _ = writer.shutdown().await;
}
