use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use actix::prelude::*;

use crate::raft::types::ReplicaId;

/// Sent to actor-backed listeners when the member set may have changed.
/// Carries no payload; receivers re-query `current_topology()`.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct TopologyChanged;

/// The currently known cluster members and their advertised addresses.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    members: HashMap<ReplicaId, String>,
}

impl ClusterTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, id: ReplicaId, address: impl Into<String>) -> Self {
        self.members.insert(id, address.into());
        self
    }

    pub fn members(&self) -> HashSet<ReplicaId> {
        self.members.keys().copied().collect()
    }

    pub fn address_of(&self, id: &ReplicaId) -> Option<&str> {
        self.members.get(id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

/// Returned at registration time; the only way to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// A membership subscriber. Notified without payload; re-query the topology.
pub trait MembershipListener: Send {
    fn on_topology_change(&self);
}

/// Adapter delivering topology notifications into an actor mailbox.
pub struct ActorTopologyListener(pub Recipient<TopologyChanged>);

impl MembershipListener for ActorTopologyListener {
    fn on_topology_change(&self) {
        self.0.do_send(TopologyChanged);
    }
}

/// Who the peers are and how to hear about changes. The consensus core
/// treats changes as informational only; it does not implement a membership
/// reconfiguration protocol.
pub trait CoreTopologyService: Send + Sync {
    fn current_topology(&self) -> ClusterTopology;
    fn add_membership_listener(&self, listener: Box<dyn MembershipListener>) -> ListenerHandle;
    fn remove_membership_listener(&self, handle: ListenerHandle);
}

struct Subscribers {
    topology: ClusterTopology,
    next_handle: u64,
    listeners: HashMap<u64, Box<dyn MembershipListener>>,
}

/// Topology service backed by configuration. Listeners get an initial
/// notification at registration so late subscribers see the current state.
pub struct StaticTopologyService {
    inner: Mutex<Subscribers>,
}

impl StaticTopologyService {
    pub fn new(topology: ClusterTopology) -> Self {
        Self {
            inner: Mutex::new(Subscribers {
                topology,
                next_handle: 0,
                listeners: HashMap::new(),
            }),
        }
    }

    /// Replace the member set and notify every subscriber.
    pub fn set_topology(&self, topology: ClusterTopology) {
        let inner = &mut *self.inner.lock().unwrap();
        inner.topology = topology;
        for listener in inner.listeners.values() {
            listener.on_topology_change();
        }
    }
}

impl CoreTopologyService for StaticTopologyService {
    fn current_topology(&self) -> ClusterTopology {
        self.inner.lock().unwrap().topology.clone()
    }

    fn add_membership_listener(&self, listener: Box<dyn MembershipListener>) -> ListenerHandle {
        let inner = &mut *self.inner.lock().unwrap();
        let handle = ListenerHandle(inner.next_handle);
        inner.next_handle += 1;
        listener.on_topology_change();
        inner.listeners.insert(handle.0, listener);
        handle
    }

    fn remove_membership_listener(&self, handle: ListenerHandle) {
        self.inner.lock().unwrap().listeners.remove(&handle.0);
    }
}
