//! Tokio runtime implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream as TokioTcpStream, UdpSocket as TokioUdpSocket};

use super::{AsyncTcpStream, AsyncUdpSocket, TcpReader, TcpWriter, TimedOut};

/// Tokio-based UDP socket.
pub struct UdpSocket(TokioUdpSocket);

impl AsyncUdpSocket for UdpSocket {
    async fn bind(addr: &str) -> io::Result<Self> {
        TokioUdpSocket::bind(addr).await.map(UdpSocket)
    }

    async fn send_to(&self, buf: &[u8], addr: &str) -> io::Result<usize> {
        self.0.send_to(buf, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }
}

/// Tokio-based TCP stream.
pub struct TcpStream(TokioTcpStream);

/// Read half of a tokio TCP stream.
pub struct TcpReadHalf(OwnedReadHalf);

/// Write half of a tokio TCP stream.
pub struct TcpWriteHalf(OwnedWriteHalf);

impl AsyncTcpStream for TcpStream {
    type Reader = TcpReadHalf;
    type Writer = TcpWriteHalf;

    async fn connect(addr: &str) -> io::Result<Self> {
        TokioTcpStream::connect(addr).await.map(TcpStream)
    }

    fn into_split(self) -> (TcpReadHalf, TcpWriteHalf) {
        let (reader, writer) = self.0.into_split();
        (TcpReadHalf(reader), TcpWriteHalf(writer))
    }
}

impl TcpReader for TcpReadHalf {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(&mut self.0, buf).await
    }
}

impl TcpWriter for TcpWriteHalf {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.0, buf).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(&mut self.0).await
    }
}

/// Sleep for the specified duration using tokio.
pub async fn sleep_impl(duration: Duration) {
    tokio::time::sleep(duration).await
}

/// Run a future with a timeout using tokio.
pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimedOut)
}

/// Spawn a detached task using tokio.
pub fn spawn_detached_impl<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    // Dropping a tokio JoinHandle detaches the task.
    drop(tokio::spawn(future));
}
