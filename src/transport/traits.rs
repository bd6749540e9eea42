//! Transport trait abstraction for pluggable stream backends

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connect to the device, returning a stream on success
    async fn connect(&self) -> Result<Box<dyn TransportStream>>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
