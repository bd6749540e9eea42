pub mod rfcomm;
pub mod tcp;
pub mod traits;

pub use rfcomm::{RfcommConnector, RfcommTransportStream, DEFAULT_RFCOMM_CHANNEL};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{TransportConnector, TransportStream};
