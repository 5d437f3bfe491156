use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use anyhow::Context as _;

use corelog::config::Config;
use corelog::consensus::{GetStatus, Replica, SetOutbound, SetTopology, SubmitBatch, SubmitEntry};
use corelog::membership::{
    ActorTopologyListener, ClusterTopology, CoreTopologyService, StaticTopologyService,
};
use corelog::network::{LoopbackTransport, RegisterReplica, StoreId};
use corelog::raft::state::Role;
use corelog::raft::types::ReplicaId;

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = load_config()?;
    tracing::info!(
        "Starting a local cluster of {} replicas",
        config.cluster.replica_count
    );

    let store_id = StoreId::random();
    let transport = LoopbackTransport::new(store_id).start();

    let ids: Vec<ReplicaId> = (0..config.cluster.replica_count)
        .map(|_| ReplicaId::random())
        .collect();
    let mut topology = ClusterTopology::new();
    for id in &ids {
        topology = topology.with_member(*id, format!("loopback/{}", id));
    }
    let topology_service = Arc::new(StaticTopologyService::new(topology));

    let mut replicas = Vec::new();
    for id in &ids {
        let mut replica_config = config.replica.clone();
        replica_config.data_dir = config.replica.data_dir.join(id.to_string());

        let addr = Replica::new(*id, store_id, replica_config)
            .with_context(|| format!("starting replica {}", id))?
            .start();

        transport.do_send(RegisterReplica {
            id: *id,
            mailbox: addr.clone().recipient(),
        });
        addr.do_send(SetOutbound(transport.clone().recipient()));
        addr.do_send(SetTopology(topology_service.clone()));
        let _ = topology_service
            .add_membership_listener(Box::new(ActorTopologyListener(addr.clone().recipient())));

        replicas.push((*id, addr));
    }

    let (leader_id, leader) = wait_for_leader(&replicas)
        .await
        .context("no leader elected within the startup window")?;
    let topology = topology_service.current_topology();
    tracing::info!(
        "Leader elected: {} at {}",
        leader_id,
        topology.address_of(&leader_id).unwrap_or("unknown")
    );

    leader
        .send(SubmitEntry {
            content: b"first".to_vec(),
        })
        .await??;
    leader
        .send(SubmitBatch {
            contents: vec![b"second".to_vec(), b"third".to_vec()],
        })
        .await??;

    // Give replication a few heartbeats to settle.
    actix_rt::time::sleep(Duration::from_millis(500)).await;

    for (id, addr) in &replicas {
        let status = addr.send(GetStatus).await?;
        tracing::info!(
            "Replica {}: {} term={} commit={} append={}",
            id,
            status.role,
            status.current_term,
            status.commit_index,
            status.append_index
        );
    }

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    for arg in std::env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return Config::load(path).with_context(|| format!("loading config from {}", path));
        }
    }
    Ok(Config::default())
}

async fn wait_for_leader(
    replicas: &[(ReplicaId, Addr<Replica>)],
) -> Option<(ReplicaId, Addr<Replica>)> {
    for _ in 0..50 {
        actix_rt::time::sleep(Duration::from_millis(100)).await;
        for (id, addr) in replicas {
            if let Ok(status) = addr.send(GetStatus).await {
                if status.role == Role::Leader {
                    return Some((*id, addr.clone()));
                }
            }
        }
    }
    None
}
