pub mod envelope;
pub mod transport;

pub use envelope::{ClusterEnvelope, StoreId};
pub use transport::{InboundEnvelope, LoopbackTransport, RegisterReplica, SendOutbound};
