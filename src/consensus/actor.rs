use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use rand::Rng;

use crate::config::ReplicaConfig;
use crate::membership::{CoreTopologyService, TopologyChanged};
use crate::network::transport::{InboundEnvelope, SendOutbound};
use crate::network::StoreId;
use crate::raft::log::ReplicatedLog;
use crate::raft::messages::{Directed, NewEntryBatch, NewEntryRequest, RaftMessage};
use crate::raft::outcome::{LogCommand, Outcome};
use crate::raft::state::{ReplicaState, Role};
use crate::raft::types::{LogIndex, ReplicaId, Term};
use crate::storage::{FileLog, FileStateStore, StateStore};
use crate::util::errors::{RaftError, Result};

/// Wire the transport recipient for outbound messages.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SetOutbound(pub Recipient<SendOutbound>);

/// Wire the membership collaborator; the replica re-queries it on every
/// topology change notification.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SetTopology(pub Arc<dyn CoreTopologyService>);

/// Submit one opaque payload for replication. Answered with an error when
/// this replica is not the leader, carrying the leader hint if one is known.
#[derive(Message)]
#[rtype(result = "Result<()>")]
pub struct SubmitEntry {
    pub content: Vec<u8>,
}

/// Submit a pre-batched sequence of payloads.
#[derive(Message)]
#[rtype(result = "Result<()>")]
pub struct SubmitBatch {
    pub contents: Vec<Vec<u8>>,
}

/// Snapshot of a replica's consensus state, for monitoring.
#[derive(Message, Debug, Clone)]
#[rtype(result = "ReplicaStatus")]
pub struct GetStatus;

#[derive(Debug, Clone)]
pub struct ReplicaStatus {
    pub id: ReplicaId,
    pub role: Role,
    pub current_term: Term,
    pub leader: Option<ReplicaId>,
    pub commit_index: LogIndex,
    pub append_index: LogIndex,
}

impl<A, M> actix::dev::MessageResponse<A, M> for ReplicaStatus
where
    A: Actor,
    M: Message<Result = ReplicaStatus>,
{
    fn handle(self, _ctx: &mut A::Context, tx: Option<actix::dev::OneshotSender<M::Result>>) {
        if let Some(tx) = tx {
            let _ = tx.send(self);
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct ElectionTimeoutFired;

#[derive(Message)]
#[rtype(result = "()")]
struct HeartbeatTimeoutFired;

/// The per-replica driver loop. The actor mailbox is the single event queue:
/// messages and timer events are handled one at a time, and each Outcome is
/// fully applied before the next event is dequeued.
pub struct Replica {
    state: ReplicaState,
    log: Box<dyn ReplicatedLog>,
    state_store: Box<dyn StateStore>,
    config: ReplicaConfig,
    store_id: StoreId,
    outbound: Option<Recipient<SendOutbound>>,
    topology: Option<Arc<dyn CoreTopologyService>>,
    election_timer: Option<SpawnHandle>,
    heartbeat_timer: Option<SpawnHandle>,
}

impl Replica {
    /// Build a replica from configuration, recovering durable term, vote and
    /// log from the data directory.
    pub fn new(id: ReplicaId, store_id: StoreId, config: ReplicaConfig) -> Result<Self> {
        config.validate().map_err(RaftError::InvalidConfig)?;

        let log = Box::new(FileLog::new(config.data_dir.join("log"))?);
        let state_store = Box::new(FileStateStore::new(config.data_dir.join("state"))?);
        let durable = state_store.load()?;

        let mut state = ReplicaState::new(id);
        state.current_term = durable.current_term;
        state.voted_for = durable.voted_for;

        Ok(Self {
            state,
            log,
            state_store,
            config,
            store_id,
            outbound: None,
            topology: None,
            election_timer: None,
            heartbeat_timer: None,
        })
    }

    fn process(&mut self, message: RaftMessage, ctx: &mut Context<Self>) {
        let outcome = match crate::raft::handle(&message, &self.state, self.log.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Replica {} failed to handle event: {}", self.state.id, e);
                return;
            }
        };
        if let Err(e) = self.apply(outcome, ctx) {
            tracing::error!("Replica {} failed to apply outcome: {}", self.state.id, e);
        }
    }

    fn apply(&mut self, outcome: Outcome, ctx: &mut Context<Self>) -> Result<()> {
        let was_leader = self.state.is_leader();
        let applied = apply_outcome(
            &mut self.state,
            self.log.as_mut(),
            self.state_store.as_mut(),
            outcome,
        )?;

        match &self.outbound {
            Some(outbound) => {
                for directed in applied.outbound {
                    outbound.do_send(SendOutbound(directed));
                }
            }
            None if !applied.outbound.is_empty() => {
                tracing::warn!(
                    "Replica {} has no transport wired, dropping {} outbound messages",
                    self.state.id,
                    applied.outbound.len()
                );
            }
            None => {}
        }

        if applied.renew_election_timeout {
            self.reset_election_timeout(ctx);
        }
        match (was_leader, self.state.is_leader()) {
            (false, true) => {
                if let Some(handle) = self.election_timer.take() {
                    ctx.cancel_future(handle);
                }
                self.start_heartbeat_timer(ctx);
            }
            (true, false) => {
                if let Some(handle) = self.heartbeat_timer.take() {
                    ctx.cancel_future(handle);
                }
                self.reset_election_timeout(ctx);
            }
            _ => {}
        }

        Ok(())
    }

    /// Single-shot, re-randomized on every reset so split votes stay
    /// improbable.
    fn reset_election_timeout(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.election_timer.take() {
            ctx.cancel_future(handle);
        }

        let timeout_ms = rand::thread_rng().gen_range(
            self.config.election_timeout_min_ms..=self.config.election_timeout_max_ms,
        );
        tracing::trace!(
            "Replica {} reset election timeout to {}ms",
            self.state.id,
            timeout_ms
        );

        let handle = ctx.run_later(Duration::from_millis(timeout_ms), |_act, ctx| {
            ctx.notify(ElectionTimeoutFired);
        });
        self.election_timer = Some(handle);
    }

    fn start_heartbeat_timer(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.heartbeat_timer.take() {
            ctx.cancel_future(handle);
        }
        let handle = ctx.run_interval(self.config.heartbeat_interval(), |_act, ctx| {
            ctx.notify(HeartbeatTimeoutFired);
        });
        self.heartbeat_timer = Some(handle);
    }

    fn refresh_members(&mut self) {
        let Some(topology) = &self.topology else {
            return;
        };
        let mut members = topology.current_topology().members();
        members.remove(&self.state.id);
        if members != self.state.members {
            tracing::info!(
                "Replica {} now knows {} other members",
                self.state.id,
                members.len()
            );
            self.state.members = members;
        }
    }
}

/// Effects of an applied Outcome that the driver still has to act on.
pub(crate) struct AppliedOutcome {
    pub outbound: Vec<Directed>,
    pub renew_election_timeout: bool,
}

/// Commit an Outcome against replica state, durable state and the log.
/// Term and vote reach disk before any message leaves this replica.
pub(crate) fn apply_outcome(
    state: &mut ReplicaState,
    log: &mut dyn ReplicatedLog,
    state_store: &mut dyn StateStore,
    outcome: Outcome,
) -> Result<AppliedOutcome> {
    if outcome.term != state.current_term {
        state_store.save_term(outcome.term)?;
    }
    if outcome.voted_for != state.voted_for {
        state_store.save_vote(outcome.voted_for)?;
    }

    if outcome.role != state.role {
        tracing::info!(
            "Replica {} transitioning {} -> {} (term {})",
            state.id,
            state.role,
            outcome.role,
            outcome.term
        );
    }

    state.current_term = outcome.term;
    state.voted_for = outcome.voted_for;
    state.role = outcome.role;
    state.leader = outcome.leader;
    state.votes_received = outcome.votes_received;
    state.progress = outcome.progress;

    for command in outcome.log_commands {
        match command {
            LogCommand::Append {
                from_index,
                entries,
            } => {
                assert_eq!(
                    from_index,
                    log.append_index() + 1,
                    "append command not at the log tail"
                );
                for entry in entries {
                    log.append(entry)?;
                }
            }
            LogCommand::Truncate { from_index } => {
                assert!(
                    from_index > state.commit_index,
                    "refusing to truncate committed entries (from {}, committed {})",
                    from_index,
                    state.commit_index
                );
                log.truncate(from_index)?;
            }
            LogCommand::AdvanceCommit { to } => {
                assert!(
                    to >= state.commit_index,
                    "commit index would move backwards ({} < {})",
                    to,
                    state.commit_index
                );
                if to > state.commit_index {
                    tracing::debug!("Replica {} commit index -> {}", state.id, to);
                    state.commit_index = to;
                }
            }
        }
    }

    if outcome.needs_state_transfer {
        tracing::warn!(
            "Replica {} needs a state transfer before replication can resume",
            state.id
        );
    }

    Ok(AppliedOutcome {
        outbound: outcome.outbound,
        renew_election_timeout: outcome.renew_election_timeout,
    })
}

impl Actor for Replica {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            "Replica {} started as {} in term {}",
            self.state.id,
            self.state.role,
            self.state.current_term
        );
        self.reset_election_timeout(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Replica {} stopped", self.state.id);
    }
}

impl Handler<SetOutbound> for Replica {
    type Result = ();

    fn handle(&mut self, msg: SetOutbound, _ctx: &mut Self::Context) -> Self::Result {
        self.outbound = Some(msg.0);
    }
}

impl Handler<SetTopology> for Replica {
    type Result = ();

    fn handle(&mut self, msg: SetTopology, _ctx: &mut Self::Context) -> Self::Result {
        self.topology = Some(msg.0);
        self.refresh_members();
    }
}

impl Handler<TopologyChanged> for Replica {
    type Result = ();

    fn handle(&mut self, _msg: TopologyChanged, _ctx: &mut Self::Context) -> Self::Result {
        self.refresh_members();
    }
}

impl Handler<InboundEnvelope> for Replica {
    type Result = ();

    fn handle(&mut self, msg: InboundEnvelope, ctx: &mut Self::Context) -> Self::Result {
        let from_store = msg.0.store_id;
        match msg.0.open(&self.store_id) {
            Ok(message) => self.process(message, ctx),
            Err(e) => {
                tracing::debug!(
                    "Replica {} discarding message from store {}: {}",
                    self.state.id,
                    from_store,
                    e
                );
            }
        }
    }
}

impl Handler<SubmitEntry> for Replica {
    type Result = Result<()>;

    fn handle(&mut self, msg: SubmitEntry, ctx: &mut Self::Context) -> Self::Result {
        if !self.state.is_leader() {
            return Err(RaftError::NotLeader(self.state.leader));
        }
        self.process(
            RaftMessage::NewEntry(NewEntryRequest {
                content: msg.content,
            }),
            ctx,
        );
        Ok(())
    }
}

impl Handler<SubmitBatch> for Replica {
    type Result = Result<()>;

    fn handle(&mut self, msg: SubmitBatch, ctx: &mut Self::Context) -> Self::Result {
        if !self.state.is_leader() {
            return Err(RaftError::NotLeader(self.state.leader));
        }
        self.process(
            RaftMessage::NewEntryBatch(NewEntryBatch {
                contents: msg.contents,
            }),
            ctx,
        );
        Ok(())
    }
}

impl Handler<ElectionTimeoutFired> for Replica {
    type Result = ();

    fn handle(&mut self, _msg: ElectionTimeoutFired, ctx: &mut Self::Context) -> Self::Result {
        if self.state.is_leader() {
            return;
        }
        self.process(RaftMessage::ElectionTimeout, ctx);
    }
}

impl Handler<HeartbeatTimeoutFired> for Replica {
    type Result = ();

    fn handle(&mut self, _msg: HeartbeatTimeoutFired, ctx: &mut Self::Context) -> Self::Result {
        if !self.state.is_leader() {
            return;
        }
        self.process(RaftMessage::HeartbeatTimeout, ctx);
    }
}

impl Handler<GetStatus> for Replica {
    type Result = ReplicaStatus;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        ReplicaStatus {
            id: self.state.id,
            role: self.state.role,
            current_term: self.state.current_term,
            leader: self.state.leader,
            commit_index: self.state.commit_index,
            append_index: self.log.append_index(),
        }
    }
}
