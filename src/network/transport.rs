use std::collections::HashMap;

use actix::prelude::*;

use super::envelope::{self, ClusterEnvelope, StoreId};
use crate::raft::messages::Directed;
use crate::raft::types::ReplicaId;

/// Outbound envelope handed to the transport. Fire-and-forget: delivery,
/// retry, and connection lifecycle are the transport's problem.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendOutbound(pub Directed);

/// A framed envelope arriving from the transport for one replica.
#[derive(Message)]
#[rtype(result = "()")]
pub struct InboundEnvelope(pub ClusterEnvelope);

/// Register a replica's mailbox with the transport.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RegisterReplica {
    pub id: ReplicaId,
    pub mailbox: Recipient<InboundEnvelope>,
}

/// In-process transport routing between replicas of one store. Every message
/// goes through the wire codec (encode, then decode on the far side) so the
/// demo cluster exercises the same framing a socket transport would.
pub struct LoopbackTransport {
    store_id: StoreId,
    mailboxes: HashMap<ReplicaId, Recipient<InboundEnvelope>>,
}

impl LoopbackTransport {
    pub fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            mailboxes: HashMap::new(),
        }
    }
}

impl Actor for LoopbackTransport {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!("Loopback transport started for store {}", self.store_id);
    }
}

impl Handler<RegisterReplica> for LoopbackTransport {
    type Result = ();

    fn handle(&mut self, msg: RegisterReplica, _ctx: &mut Self::Context) -> Self::Result {
        self.mailboxes.insert(msg.id, msg.mailbox);
    }
}

impl Handler<SendOutbound> for LoopbackTransport {
    type Result = ();

    fn handle(&mut self, msg: SendOutbound, _ctx: &mut Self::Context) -> Self::Result {
        let Directed { to, message } = msg.0;
        let Some(mailbox) = self.mailboxes.get(&to) else {
            // Destination unreachable; the core already assumes messages may
            // never arrive.
            tracing::debug!("Dropping message for unknown replica {}", to);
            return;
        };

        let framed = match envelope::encode(&ClusterEnvelope::new(self.store_id, message)) {
            Ok(framed) => framed,
            Err(e) => {
                tracing::error!("Failed to encode outbound message: {}", e);
                return;
            }
        };
        match envelope::decode(&framed) {
            Ok(decoded) => mailbox.do_send(InboundEnvelope(decoded)),
            Err(e) => tracing::error!("Failed to decode framed message: {}", e),
        }
    }
}
