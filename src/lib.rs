pub mod config;
pub mod consensus;
pub mod membership;
pub mod network;
pub mod raft;
pub mod storage;
pub mod util;
