pub mod actor;

pub use actor::{
    GetStatus, Replica, ReplicaStatus, SetOutbound, SetTopology, SubmitBatch, SubmitEntry,
};
