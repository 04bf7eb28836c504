//! smol runtime implementation.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use async_io::Async;
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::TcpStream as SmolTcpStream;

use super::{AsyncTcpStream, AsyncUdpSocket, TcpReader, TcpWriter, TimedOut};

/// smol-based UDP socket using async-io.
pub struct UdpSocket(Async<std::net::UdpSocket>);

impl AsyncUdpSocket for UdpSocket {
    async fn bind(addr: &str) -> io::Result<Self> {
        let socket = std::net::UdpSocket::bind(addr)?;
        Async::new(socket).map(UdpSocket)
    }

    async fn send_to(&self, buf: &[u8], addr: &str) -> io::Result<usize> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.0.send_to(buf, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }
}

/// smol-based TCP stream.
pub struct TcpStream(SmolTcpStream);

/// Read half of a smol TCP stream.
pub struct TcpReadHalf(SmolTcpStream);

/// Write half of a smol TCP stream.
pub struct TcpWriteHalf(SmolTcpStream);

impl AsyncTcpStream for TcpStream {
    type Reader = TcpReadHalf;
    type Writer = TcpWriteHalf;

    async fn connect(addr: &str) -> io::Result<Self> {
        SmolTcpStream::connect(addr).await.map(TcpStream)
    }

    fn into_split(self) -> (TcpReadHalf, TcpWriteHalf) {
        (TcpReadHalf(self.0.clone()), TcpWriteHalf(self.0))
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
        self.0.shutdown(Shutdown::Write)
    }
}

/// Sleep for the specified duration using smol.
pub async fn sleep_impl(duration: Duration) {
    smol::Timer::after(duration).await;
}

/// Run a future with a timeout using smol.
pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    use futures::future::Either;

    let timeout_future = smol::Timer::after(duration);

    futures::pin_mut!(future);
    futures::pin_mut!(timeout_future);

    match futures::future::select(future, timeout_future).await {
        Either::Left((result, _)) => Ok(result),
        Either::Right((_, _)) => Err(TimedOut),
    }
}

/// Spawn a detached task using smol.
pub fn spawn_detached_impl<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    // smol cancels a task when its handle drops unless it is detached.
    smol::spawn(future).detach();
}
