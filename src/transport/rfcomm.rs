//! Bluetooth RFCOMM transport for EV3 bricks
//!
//! A paired brick exposes the Serial Port Profile on RFCOMM channel 1.
//! Discovery and pairing happen outside this crate; the connector needs the
//! brick's Bluetooth address up front.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::Address;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::info;

use crate::transport::traits::{TransportConnector, TransportStream};

/// RFCOMM channel the brick's SPP service listens on
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    peer_addr: Address,
}

impl RfcommTransportStream {
    pub fn new(stream: RfcommStream, peer_addr: Address) -> Self {
        Self {
            inner: stream,
            peer_addr,
        }
    }

    /// Bluetooth address of the connected brick
    pub fn peer_address(&self) -> Address {
        self.peer_addr
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for RfcommTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// Connector for a paired brick at a known address
pub struct RfcommConnector {
    address: Address,
    channel: u8,
}

impl RfcommConnector {
    /// Connect on the default SPP channel
    pub fn new(address: Address) -> Self {
        Self {
            address,
            channel: DEFAULT_RFCOMM_CHANNEL,
        }
    }

    pub fn with_channel(address: Address, channel: u8) -> Self {
        Self { address, channel }
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    async fn connect(&self) -> Result<Box<dyn TransportStream>> {
        let socket_addr = RfcommAddr::new(self.address, self.channel);
        let stream = RfcommStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow!("RFCOMM connect to {} failed: {e}", self.address))?;

        info!(brick = %self.address, channel = self.channel, "RFCOMM connected");
        Ok(Box::new(RfcommTransportStream::new(stream, self.address)))
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
