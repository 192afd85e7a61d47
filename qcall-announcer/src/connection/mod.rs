//! Push-channel connection: transport, backoff and lifecycle

pub mod backoff;
pub mod manager;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use manager::{ConnectionExit, ConnectionManager, ConnectionState};
pub use transport::{PushChannel, PushConnector, WsConnector};
