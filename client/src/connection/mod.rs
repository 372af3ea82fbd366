//! Backend connection
//!
//! Lifecycle state machine, reconnection backoff, outbound queue, inbound
//! frame dispatch and stream reassembly.

pub mod backoff;
pub mod dispatcher;
pub mod manager;
pub mod queue;
pub mod reassembly;
pub mod state;
pub mod transport;

pub use backoff::{ReconnectPolicy, ReconnectState};
pub use dispatcher::FrameDispatcher;
pub use manager::ConnectionManager;
pub use queue::OutboundQueue;
pub use reassembly::{StreamAssembler, StreamBuffer, StreamOrigin};
pub use state::ConnectionState;
pub use transport::{Connector, Socket, TransportError, WsConnector};
