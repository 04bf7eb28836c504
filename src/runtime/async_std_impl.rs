//! async-std runtime implementation.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use async_std::io::{ReadExt, WriteExt};
use async_std::net::{TcpStream as AsyncStdTcpStream, UdpSocket as AsyncStdUdpSocket};

use super::{AsyncTcpStream, AsyncUdpSocket, TcpReader, TcpWriter, TimedOut};

/// async-std-based UDP socket.
pub struct UdpSocket(AsyncStdUdpSocket);

impl AsyncUdpSocket for UdpSocket {
    async fn bind(addr: &str) -> io::Result<Self> {
        AsyncStdUdpSocket::bind(addr).await.map(UdpSocket)
    }

    async fn send_to(&self, buf: &[u8], addr: &str) -> io::Result<usize> {
        self.0.send_to(buf, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }
}

/// async-std-based TCP stream.
pub struct TcpStream(AsyncStdTcpStream);

/// Read half of an async-std TCP stream.
///
/// async-std streams are reference counted, so both halves share one socket.
pub struct TcpReadHalf(AsyncStdTcpStream);

/// Write half of an async-std TCP stream.
pub struct TcpWriteHalf(AsyncStdTcpStream);

impl AsyncTcpStream for TcpStream {
    type Reader = TcpReadHalf;
    type Writer = TcpWriteHalf;

    async fn connect(addr: &str) -> io::Result<Self> {
        AsyncStdTcpStream::connect(addr).await.map(TcpStream)
    }

    fn into_split(self) -> (TcpReadHalf, TcpWriteHalf) {
        (TcpReadHalf(self.0.clone()), TcpWriteHalf(self.0))
    }
}

impl TcpReader for TcpReadHalf {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReadExt::read(&mut self.0, buf).await
    }
}

impl TcpWriter for TcpWriteHalf {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        WriteExt::write_all(&mut self.0, buf).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.0.shutdown(Shutdown::Write)
    }
}

/// Sleep for the specified duration using async-std.
pub async fn sleep_impl(duration: Duration) {
    async_std::task::sleep(duration).await
}

/// Run a future with a timeout using async-std.
pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    async_std::future::timeout(duration, future)
        .await
        .map_err(|_| TimedOut)
}

/// Spawn a detached task using async-std.
pub fn spawn_detached_impl<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    // async-std tasks keep running when their handle is dropped.
    drop(async_std::task::spawn(future));
}
