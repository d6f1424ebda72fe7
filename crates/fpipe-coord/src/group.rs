//! Group rendezvous over TCP.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::{CoordError, CoordResult};
use crate::protocol::{JobManifest, NodeOutcome, Phase, WireMessage};

/// Group topology and timing configuration.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// This node's zero-based rank; rank 0 is the coordinator
    pub rank: usize,
    /// Total number of nodes in the group
    pub nodes: usize,
    /// Address the coordinator listens on and workers dial
    pub coordinator_addr: String,
    /// Bound on every collective wait
    pub rendezvous_timeout: Duration,
    /// Delay between worker connect attempts
    pub connect_retry_interval: Duration,
}

impl GroupConfig {
    /// Create a config with default timeouts.
    pub fn new(rank: usize, nodes: usize, coordinator_addr: impl Into<String>) -> Self {
        Self {
            rank,
            nodes,
            coordinator_addr: coordinator_addr.into(),
            rendezvous_timeout: Duration::from_secs(30),
            connect_retry_interval: Duration::from_millis(250),
        }
    }

    /// A group of one: no sockets, collectives are no-ops.
    pub fn single_node() -> Self {
        Self::new(0, 1, "127.0.0.1:0")
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }
}

/// One connected worker, as seen from the coordinator.
struct Peer {
    rank: usize,
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

enum Links {
    /// Single-node group
    Solo,
    /// Coordinator side: one link per worker, indexed by rank order
    Hub { peers: Vec<Peer> },
    /// Worker side: the link to the coordinator
    Spoke {
        reader: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    },
}

enum Recv {
    Message(WireMessage),
    TimedOut,
    Closed,
}

async fn send(writer: &mut OwnedWriteHalf, message: &WireMessage) -> CoordResult<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn recv_within(
    reader: &mut Lines<BufReader<OwnedReadHalf>>,
    wait: Duration,
) -> CoordResult<Recv> {
    match timeout(wait, reader.next_line()).await {
        Err(_) => Ok(Recv::TimedOut),
        Ok(Ok(None)) => Ok(Recv::Closed),
        Ok(Ok(Some(line))) => Ok(Recv::Message(serde_json::from_str(&line)?)),
        Ok(Err(e)) => Err(CoordError::Io(e)),
    }
}

/// One node's handle on the worker group.
///
/// All collectives are symmetric calls: every node invokes the same method
/// and blocks until the group-wide condition holds or the group aborts.
pub struct NodeGroup {
    config: GroupConfig,
    links: Links,
}

impl std::fmt::Debug for NodeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGroup")
            .field("config", &self.config)
            .finish()
    }
}

impl NodeGroup {
    /// Rendezvous the full group.
    ///
    /// The coordinator binds and waits for every worker's hello; workers
    /// dial with bounded retries. Returns once all `nodes` processes are
    /// linked, or fails with [`CoordError::PeerUnreachable`] when the group
    /// cannot form within the rendezvous timeout.
    pub async fn connect(config: GroupConfig) -> CoordResult<Self> {
        if config.nodes == 0 {
            return Err(CoordError::protocol("node count must be positive"));
        }
        if config.rank >= config.nodes {
            return Err(CoordError::protocol(format!(
                "rank {} out of range for {} nodes",
                config.rank, config.nodes
            )));
        }

        if config.nodes == 1 {
            debug!("single-node group, skipping rendezvous");
            return Ok(Self {
                config,
                links: Links::Solo,
            });
        }

        let links = if config.is_coordinator() {
            Self::accept_workers(&config).await?
        } else {
            Self::join_group(&config).await?
        };

        Ok(Self { config, links })
    }

    async fn accept_workers(config: &GroupConfig) -> CoordResult<Links> {
        let listener = TcpListener::bind(&config.coordinator_addr).await?;
        info!(
            addr = %config.coordinator_addr,
            nodes = config.nodes,
            "waiting for workers to join"
        );

        let deadline = Instant::now() + config.rendezvous_timeout;
        let mut slots: Vec<Option<Peer>> = (1..config.nodes).map(|_| None).collect();
        let mut joined = 0usize;

        while joined < config.nodes - 1 {
            let wait = deadline.saturating_duration_since(Instant::now());
            let (stream, addr) = match timeout(wait, listener.accept()).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(CoordError::Io(e)),
                Err(_) => {
                    return Err(CoordError::peer_unreachable(format!(
                        "{} of {} workers never joined the group",
                        config.nodes - 1 - joined,
                        config.nodes - 1
                    )));
                }
            };
            stream.set_nodelay(true).ok();

            let (read_half, write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half).lines();

            let wait = deadline.saturating_duration_since(Instant::now());
            let rank = match recv_within(&mut reader, wait).await? {
                Recv::Message(WireMessage::Hello { rank }) => rank,
                Recv::Message(other) => {
                    return Err(CoordError::protocol(format!(
                        "expected hello from {addr}, got {other:?}"
                    )));
                }
                Recv::TimedOut => {
                    return Err(CoordError::peer_unreachable(format!(
                        "peer at {addr} never said hello"
                    )));
                }
                Recv::Closed => {
                    return Err(CoordError::peer_unreachable(format!(
                        "peer at {addr} disconnected during rendezvous"
                    )));
                }
            };

            if rank == 0 || rank >= config.nodes {
                return Err(CoordError::protocol(format!(
                    "hello with invalid rank {rank} for a group of {}",
                    config.nodes
                )));
            }
            let slot = &mut slots[rank - 1];
            if slot.is_some() {
                return Err(CoordError::protocol(format!(
                    "duplicate hello for rank {rank}"
                )));
            }
            *slot = Some(Peer {
                rank,
                reader,
                writer: write_half,
            });
            joined += 1;
            debug!(rank, peer = %addr, "worker joined");
        }

        let mut peers = Vec::with_capacity(slots.len());
        for slot in slots {
            peers.push(slot.ok_or_else(|| CoordError::protocol("rendezvous bookkeeping mismatch"))?);
        }
        Ok(Links::Hub { peers })
    }

    async fn join_group(config: &GroupConfig) -> CoordResult<Links> {
        let deadline = Instant::now() + config.rendezvous_timeout;

        let stream = loop {
            match TcpStream::connect(&config.coordinator_addr).await {
                Ok(stream) => break stream,
                Err(e) => {
                    if Instant::now() + config.connect_retry_interval >= deadline {
                        return Err(CoordError::peer_unreachable(format!(
                            "cannot reach coordinator at {}: {}",
                            config.coordinator_addr, e
                        )));
                    }
                    tokio::time::sleep(config.connect_retry_interval).await;
                }
            }
        };
        stream.set_nodelay(true).ok();

        let (read_half, mut write_half) = stream.into_split();
        send(&mut write_half, &WireMessage::Hello { rank: config.rank }).await?;
        debug!(rank = config.rank, "joined group");

        Ok(Links::Spoke {
            reader: BufReader::new(read_half).lines(),
            writer: write_half,
        })
    }

    /// Collective manifest broadcast.
    ///
    /// The coordinator passes the canonical manifest; workers pass `None`
    /// and block until it arrives. Every node returns an identical copy, so
    /// frame ranges computed afterwards agree group-wide.
    pub async fn broadcast(&mut self, manifest: Option<JobManifest>) -> CoordResult<JobManifest> {
        match &mut self.links {
            Links::Solo => {
                manifest.ok_or_else(|| CoordError::protocol("coordinator must supply the manifest"))
            }
            Links::Hub { peers } => {
                let manifest = manifest
                    .ok_or_else(|| CoordError::protocol("coordinator must supply the manifest"))?;
                for peer in peers.iter_mut() {
                    send(
                        &mut peer.writer,
                        &WireMessage::Manifest {
                            manifest: manifest.clone(),
                        },
                    )
                    .await
                    .map_err(|e| {
                        CoordError::peer_unreachable(format!(
                            "rank {} lost during broadcast: {e}",
                            peer.rank
                        ))
                    })?;
                }
                debug!(frames = manifest.metadata.total_frames, "manifest broadcast");
                Ok(manifest)
            }
            Links::Spoke { reader, .. } => {
                if manifest.is_some() {
                    return Err(CoordError::protocol("only the coordinator broadcasts"));
                }
                match recv_within(reader, self.config.rendezvous_timeout).await? {
                    Recv::Message(WireMessage::Manifest { manifest }) => Ok(manifest),
                    Recv::Message(WireMessage::Abort { reason }) => {
                        Err(CoordError::group_abort(reason))
                    }
                    Recv::Message(other) => Err(CoordError::protocol(format!(
                        "expected manifest, got {other:?}"
                    ))),
                    Recv::TimedOut => Err(CoordError::BroadcastTimeout),
                    Recv::Closed => {
                        Err(CoordError::peer_unreachable("coordinator connection lost"))
                    }
                }
            }
        }
    }

    /// Rendezvous at a named phase.
    ///
    /// Blocks until every node has reached `phase`. If any participant
    /// arrives with a failed outcome, never arrives within the rendezvous
    /// timeout, or drops its connection, the whole group observes
    /// [`CoordError::GroupAbort`]; a barrier never proceeds with a subset
    /// of nodes.
    pub async fn barrier(&mut self, phase: Phase, outcome: NodeOutcome) -> CoordResult<()> {
        debug!(rank = self.config.rank, phase = phase.name(), "entering barrier");
        match &mut self.links {
            Links::Solo => match outcome {
                NodeOutcome::Ok => Ok(()),
                NodeOutcome::Failed(reason) => Err(CoordError::group_abort(reason)),
            },
            Links::Hub { peers } => {
                let deadline = Instant::now() + self.config.rendezvous_timeout;
                let mut failures: Vec<String> = Vec::new();
                if let NodeOutcome::Failed(reason) = &outcome {
                    failures.push(format!("rank 0: {reason}"));
                }

                for peer in peers.iter_mut() {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match recv_within(&mut peer.reader, wait).await {
                        Ok(Recv::Message(WireMessage::BarrierReached {
                            phase: reached,
                            rank,
                            outcome,
                        })) => {
                            if reached != phase {
                                failures.push(format!(
                                    "rank {rank} reached {} instead of {}",
                                    reached.name(),
                                    phase.name()
                                ));
                            } else if let NodeOutcome::Failed(reason) = outcome {
                                failures.push(format!("rank {rank}: {reason}"));
                            }
                        }
                        Ok(Recv::Message(other)) => {
                            failures.push(format!(
                                "rank {}: unexpected message {other:?}",
                                peer.rank
                            ));
                        }
                        Ok(Recv::TimedOut) => {
                            failures.push(format!(
                                "rank {} never reached barrier {}",
                                peer.rank,
                                phase.name()
                            ));
                        }
                        Ok(Recv::Closed) => {
                            failures.push(format!(
                                "rank {} disconnected before barrier {}",
                                peer.rank,
                                phase.name()
                            ));
                        }
                        Err(e) => {
                            failures.push(format!("rank {}: {e}", peer.rank));
                        }
                    }
                }

                if failures.is_empty() {
                    for peer in peers.iter_mut() {
                        send(&mut peer.writer, &WireMessage::BarrierRelease { phase })
                            .await
                            .map_err(|e| {
                                CoordError::peer_unreachable(format!(
                                    "rank {} lost at barrier release: {e}",
                                    peer.rank
                                ))
                            })?;
                    }
                    debug!(phase = phase.name(), "barrier released");
                    Ok(())
                } else {
                    let reason = failures.join("; ");
                    warn!("aborting group at barrier {}: {}", phase.name(), reason);
                    for peer in peers.iter_mut() {
                        let _ = send(
                            &mut peer.writer,
                            &WireMessage::Abort {
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    }
                    Err(CoordError::group_abort(reason))
                }
            }
            Links::Spoke { reader, writer } => {
                send(
                    writer,
                    &WireMessage::BarrierReached {
                        phase,
                        rank: self.config.rank,
                        outcome,
                    },
                )
                .await
                .map_err(|e| {
                    CoordError::peer_unreachable(format!("coordinator lost entering barrier: {e}"))
                })?;

                match recv_within(reader, self.config.rendezvous_timeout).await? {
                    Recv::Message(WireMessage::BarrierRelease { phase: released })
                        if released == phase =>
                    {
                        Ok(())
                    }
                    Recv::Message(WireMessage::Abort { reason }) => {
                        Err(CoordError::group_abort(reason))
                    }
                    Recv::Message(other) => Err(CoordError::protocol(format!(
                        "expected release of barrier {}, got {other:?}",
                        phase.name()
                    ))),
                    Recv::TimedOut => Err(CoordError::peer_unreachable(format!(
                        "timed out waiting for release of barrier {}",
                        phase.name()
                    ))),
                    Recv::Closed => Err(CoordError::peer_unreachable(
                        "coordinator connection lost at barrier",
                    )),
                }
            }
        }
    }

    /// Coordinator-only: push an abort to every worker so nobody hangs
    /// waiting for a phase that will never come.
    pub async fn abort(&mut self, reason: &str) {
        if let Links::Hub { peers } = &mut self.links {
            warn!("aborting worker group: {}", reason);
            for peer in peers.iter_mut() {
                let _ = send(
                    &mut peer.writer,
                    &WireMessage::Abort {
                        reason: reason.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// This node's rank.
    pub fn rank(&self) -> usize {
        self.config.rank
    }

    /// Total nodes in the group.
    pub fn nodes(&self) -> usize {
        self.config.nodes
    }

    /// Whether this node is the coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.config.is_coordinator()
    }
}
