//! Connection core for LEGO Mindstorms EV3 bricks
//!
//! This crate manages a single bidirectional byte-stream link to an EV3
//! brick over Bluetooth RFCOMM (or TCP during development):
//! - length-prefixed framing of commands and reports
//! - a bounded write queue that drops stale commands under backpressure
//! - one serial execution context for every stream operation
//! - fan-out of connection-state and report events to observers
//!
//! Command encoding and device discovery live outside this crate: commands
//! enter as opaque byte payloads and reports leave as raw decoded frames.
//!
//! # Example
//!
//! ```no_run
//! use bluer::Address;
//! use ev3_link::{ConnectionManager, RfcommConnector};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let brick = RfcommConnector::new(Address::new([0x00, 0x16, 0x53, 0x12, 0x34, 0x56]));
//! let conn = ConnectionManager::new(Box::new(brick));
//!
//! conn.add_report_observer(std::sync::Arc::new(|report: bytes::Bytes| {
//!     println!("report: {report:?}");
//! }));
//!
//! conn.open().await?;
//! conn.write_raw(bytes::Bytes::from_static(&[0x01, 0x00, 0x81, 0x9E]));
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod command;
pub mod connection;
pub mod transport;

pub use command::Command;
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionObserver, ReportObserver, WriteQueue,
    DEFAULT_INTER_WRITE_DELAY, DEFAULT_MAX_PENDING_WRITES,
};
pub use transport::{
    RfcommConnector, TcpConnector, TransportConnector, TransportStream, DEFAULT_RFCOMM_CHANNEL,
};
