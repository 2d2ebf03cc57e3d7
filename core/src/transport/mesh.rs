// libp2p mesh — the actual running network node
//
// This builds and drives the libp2p Swarm with:
// - TCP transport, Noise encryption (links are always encrypted), Yamux
// - mDNS advertise/browse scoped by the service token
// - request_response for reliable point-to-point payload delivery
// - identify to exchange display names once a link is up
//
// The swarm runs in its own tokio task; the rest of the crate talks to it
// through command/event channels. Dialing follows the link tracker's
// tie-break, so a discovered pair never dials each other simultaneously.

use super::adapter::{PeerEvent, Transport, TransportError, SERVICE_NAME};
use super::link::LinkTracker;
use crate::identity::PeerIdentity;
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    identify, mdns,
    multiaddr::Protocol,
    request_response::{self, ProtocolSupport},
    swarm::{NetworkBehaviour, SwarmEvent},
    Multiaddr, PeerId, StreamProtocol, Swarm,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One frame of application bytes. The payload is opaque here; the codec
/// above the transport gives it meaning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameRequest {
    pub payload: Vec<u8>,
}

/// Receipt of a frame. Always accepted today.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameResponse {
    pub accepted: bool,
}

/// The PulseLink network behaviour combining all protocols.
#[derive(NetworkBehaviour)]
pub struct PulseLinkBehaviour {
    /// Reliable point-to-point payload delivery
    pub messaging: request_response::cbor::Behaviour<FrameRequest, FrameResponse>,
    /// LAN peer discovery (advertise + browse)
    pub mdns: mdns::tokio::Behaviour,
    /// Peer metadata exchange; carries the display name
    pub identify: identify::Behaviour,
}

impl PulseLinkBehaviour {
    pub fn new(keypair: &libp2p::identity::Keypair, display_name: &str) -> anyhow::Result<Self> {
        let peer_id = keypair.public().to_peer_id();

        let messaging = request_response::cbor::Behaviour::new(
            [(
                StreamProtocol::new("/pulselink-peer/msg/1.0.0"),
                ProtocolSupport::Full,
            )],
            request_response::Config::default().with_request_timeout(Duration::from_secs(30)),
        );

        let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?;

        // agent_version carries the display name so the far side can
        // attribute the link before any application message arrives
        let identify = identify::Behaviour::new(
            identify::Config::new(format!("/{SERVICE_NAME}/1.0.0"), keypair.public())
                .with_agent_version(display_name.to_string())
                .with_interval(Duration::from_secs(60)),
        );

        Ok(Self {
            messaging,
            mdns,
            identify,
        })
    }
}

/// Commands that can be sent to the swarm task
#[derive(Debug)]
enum MeshCommand {
    Send {
        peer_id: PeerId,
        payload: Vec<u8>,
        reply: mpsc::Sender<Result<(), String>>,
    },
    Broadcast {
        payload: Vec<u8>,
    },
    GetPeers {
        reply: mpsc::Sender<Vec<PeerIdentity>>,
    },
    Reset {
        reply: mpsc::Sender<Result<(), String>>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub display_name: String,
    /// Listen address; `None` means any interface, ephemeral port
    pub listen_addr: Option<Multiaddr>,
}

impl MeshConfig {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            listen_addr: None,
        }
    }
}

/// Handle to the running mesh node.
#[derive(Clone)]
pub struct MeshTransport {
    identity: PeerIdentity,
    command_tx: mpsc::Sender<MeshCommand>,
    /// display name -> transport peer id, maintained by the swarm task
    names: Arc<RwLock<HashMap<String, PeerId>>>,
}

impl MeshTransport {
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(MeshCommand::Shutdown).await;
    }
}

#[async_trait]
impl Transport for MeshTransport {
    fn local_identity(&self) -> PeerIdentity {
        self.identity.clone()
    }

    async fn connected_peers(&self) -> Vec<PeerIdentity> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        if self
            .command_tx
            .send(MeshCommand::GetPeers { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.recv().await.unwrap_or_default()
    }

    async fn send(&self, peer: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let peer_id = self
            .names
            .read()
            .get(peer)
            .copied()
            .ok_or_else(|| TransportError::PeerNotFound(peer.to_string()))?;

        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(MeshCommand::Send {
                peer_id,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::NotRunning)?;

        reply_rx
            .recv()
            .await
            .ok_or(TransportError::NotRunning)?
            .map_err(TransportError::SendFailed)
    }

    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.command_tx
            .send(MeshCommand::Broadcast { payload })
            .await
            .map_err(|_| TransportError::NotRunning)
    }

    async fn reset(&self) -> Result<(), TransportError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(MeshCommand::Reset { reply: reply_tx })
            .await
            .map_err(|_| TransportError::NotRunning)?;

        reply_rx
            .recv()
            .await
            .ok_or(TransportError::NotRunning)?
            .map_err(TransportError::StartFailed)
    }
}

fn build_swarm(
    keypair: &libp2p::identity::Keypair,
    display_name: &str,
    listen_addr: &Multiaddr,
) -> anyhow::Result<Swarm<PulseLinkBehaviour>> {
    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair.clone())
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )?
        .with_behaviour(|key| {
            PulseLinkBehaviour::new(key, display_name)
                .expect("failed to create network behaviour")
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(300)))
        .build();

    swarm.listen_on(listen_addr.clone())?;
    Ok(swarm)
}

/// Build and start the mesh node, returning a transport handle plus the
/// peer-event stream.
///
/// A startup failure (no usable interface, mDNS denied) is returned to the
/// caller as `StartFailed`; once running, later discovery failures surface
/// as `PeerEvent::Failed` and `reset()` is the recovery path.
pub async fn start_mesh(
    config: MeshConfig,
) -> Result<(MeshTransport, mpsc::Receiver<PeerEvent>), TransportError> {
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let local_peer_id = keypair.public().to_peer_id();
    let listen_addr: Multiaddr = config
        .listen_addr
        .clone()
        .unwrap_or_else(|| "/ip4/0.0.0.0/tcp/0".parse().expect("static addr parses"));

    let swarm = build_swarm(&keypair, &config.display_name, &listen_addr)
        .map_err(|e| TransportError::StartFailed(e.to_string()))?;

    let identity = PeerIdentity::with_id(local_peer_id.to_base58(), config.display_name.clone());
    let (command_tx, command_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);
    let names = Arc::new(RwLock::new(HashMap::new()));

    let transport = MeshTransport {
        identity: identity.clone(),
        command_tx,
        names: names.clone(),
    };

    tokio::spawn(run_swarm_loop(SwarmLoop {
        swarm,
        keypair,
        listen_addr,
        display_name: config.display_name,
        local_peer_id,
        tracker: LinkTracker::new(local_peer_id.to_base58()),
        joined: HashMap::new(),
        names,
        command_rx,
        event_tx,
    }));

    info!("Mesh node started as {} ({})", identity.name, identity.id);
    Ok((transport, event_rx))
}

struct SwarmLoop {
    swarm: Swarm<PulseLinkBehaviour>,
    keypair: libp2p::identity::Keypair,
    listen_addr: Multiaddr,
    display_name: String,
    local_peer_id: PeerId,
    /// Link state per transport peer id (tie-break lives here)
    tracker: LinkTracker,
    /// Peers with an up link and a known display name
    joined: HashMap<PeerId, PeerIdentity>,
    names: Arc<RwLock<HashMap<String, PeerId>>>,
    command_rx: mpsc::Receiver<MeshCommand>,
    event_tx: mpsc::Sender<PeerEvent>,
}

async fn run_swarm_loop(mut ctx: SwarmLoop) {
    loop {
        tokio::select! {
            event = ctx.swarm.select_next_some() => {
                handle_swarm_event(&mut ctx, event).await;
            }
            maybe_command = ctx.command_rx.recv() => {
                let Some(command) = maybe_command else { break };
                if !handle_command(&mut ctx, command).await {
                    break;
                }
            }
        }
    }
    debug!("Mesh swarm loop stopped");
}

async fn handle_swarm_event(
    ctx: &mut SwarmLoop,
    event: SwarmEvent<PulseLinkBehaviourEvent>,
) {
    match event {
        SwarmEvent::Behaviour(PulseLinkBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
            for (peer_id, addr) in peers {
                if ctx.tracker.on_discovered(&peer_id.to_base58()) {
                    debug!("Inviting {} at {}", peer_id, addr);
                    ctx.tracker.on_connecting(&peer_id.to_base58());
                    let dial_addr = addr.with(Protocol::P2p(peer_id));
                    if let Err(e) = ctx.swarm.dial(dial_addr) {
                        warn!("Dial failed for {}: {}", peer_id, e);
                        ctx.tracker.on_disconnected(&peer_id.to_base58());
                    }
                }
            }
        }
        SwarmEvent::Behaviour(PulseLinkBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
            for (peer_id, _) in peers {
                debug!("mDNS record expired for {}", peer_id);
            }
        }
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            // Joined is deferred until identify supplies the display name
            ctx.tracker.on_connected(&peer_id.to_base58());
            let _ = ctx
                .event_tx
                .send(PeerEvent::Connecting(PeerIdentity::with_id(
                    peer_id.to_base58(),
                    peer_id.to_base58(),
                )))
                .await;
        }
        SwarmEvent::Behaviour(PulseLinkBehaviourEvent::Identify(identify::Event::Received {
            peer_id,
            info,
            ..
        })) => {
            // Different service token: not one of ours, stays invisible
            if info.protocol_version != format!("/{SERVICE_NAME}/1.0.0") {
                debug!("Ignoring foreign node {} ({})", peer_id, info.protocol_version);
                return;
            }
            if !ctx.tracker.is_connected(&peer_id.to_base58()) {
                return;
            }
            let identity = PeerIdentity::with_id(peer_id.to_base58(), info.agent_version);
            let fresh = ctx.joined.insert(peer_id, identity.clone()).is_none();
            if fresh {
                ctx.names.write().insert(identity.name.clone(), peer_id);
                info!("Peer joined: {} ({})", identity.name, peer_id);
                let _ = ctx.event_tx.send(PeerEvent::Joined(identity)).await;
            }
        }
        SwarmEvent::ConnectionClosed {
            peer_id,
            num_established,
            ..
        } => {
            if num_established > 0 {
                return;
            }
            ctx.tracker.on_disconnected(&peer_id.to_base58());
            if let Some(identity) = ctx.joined.remove(&peer_id) {
                ctx.names.write().remove(&identity.name);
                info!("Peer left: {}", identity.name);
                let _ = ctx.event_tx.send(PeerEvent::Left(identity)).await;
            }
        }
        SwarmEvent::Behaviour(PulseLinkBehaviourEvent::Messaging(
            request_response::Event::Message { peer, message, .. },
        )) => match message {
            request_response::Message::Request {
                request, channel, ..
            } => {
                let _ = ctx
                    .swarm
                    .behaviour_mut()
                    .messaging
                    .send_response(channel, FrameResponse { accepted: true });
                if let Some(identity) = ctx.joined.get(&peer) {
                    let _ = ctx
                        .event_tx
                        .send(PeerEvent::Bytes {
                            from: identity.clone(),
                            payload: request.payload,
                        })
                        .await;
                } else {
                    debug!("Dropping frame from unidentified peer {}", peer);
                }
            }
            request_response::Message::Response { .. } => {}
        },
        SwarmEvent::Behaviour(PulseLinkBehaviourEvent::Messaging(
            request_response::Event::OutboundFailure { peer, error, .. },
        )) => {
            // Fire-and-forget from the caller's perspective; log and move on
            warn!("Send to {} failed: {}", peer, error);
        }
        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
            warn!("Outgoing connection failed: {}", error);
            if let Some(peer_id) = peer_id {
                ctx.tracker.on_disconnected(&peer_id.to_base58());
            }
        }
        SwarmEvent::ListenerError { error, .. } => {
            let _ = ctx
                .event_tx
                .send(PeerEvent::Failed {
                    reason: error.to_string(),
                })
                .await;
        }
        SwarmEvent::NewListenAddr { address, .. } => {
            info!("Listening on {}", address);
        }
        _ => {}
    }
}

/// Returns `false` when the loop should stop.
async fn handle_command(ctx: &mut SwarmLoop, command: MeshCommand) -> bool {
    match command {
        MeshCommand::Send {
            peer_id,
            payload,
            reply,
        } => {
            if ctx.joined.contains_key(&peer_id) {
                ctx.swarm
                    .behaviour_mut()
                    .messaging
                    .send_request(&peer_id, FrameRequest { payload });
                let _ = reply.send(Ok(())).await;
            } else {
                let _ = reply.send(Err(format!("peer {peer_id} not connected"))).await;
            }
        }
        MeshCommand::Broadcast { payload } => {
            let peers: Vec<PeerId> = ctx.joined.keys().copied().collect();
            for peer_id in peers {
                ctx.swarm
                    .behaviour_mut()
                    .messaging
                    .send_request(&peer_id, FrameRequest {
                        payload: payload.clone(),
                    });
            }
        }
        MeshCommand::GetPeers { reply } => {
            let peers: Vec<PeerIdentity> = ctx.joined.values().cloned().collect();
            let _ = reply.send(peers).await;
        }
        MeshCommand::Reset { reply } => {
            // Tear down advertiser/browser and every link, then start a
            // fresh swarm from scratch — the one recovery path
            let result = reset_swarm(ctx).await;
            let _ = reply.send(result).await;
        }
        MeshCommand::Shutdown => return false,
    }
    true
}

async fn reset_swarm(ctx: &mut SwarmLoop) -> Result<(), String> {
    info!("Resetting mesh transport");

    for (_, identity) in ctx.joined.drain() {
        let _ = ctx.event_tx.send(PeerEvent::Left(identity)).await;
    }
    ctx.names.write().clear();
    ctx.tracker = LinkTracker::new(ctx.local_peer_id.to_base58());

    match build_swarm(&ctx.keypair, &ctx.display_name, &ctx.listen_addr) {
        Ok(swarm) => {
            ctx.swarm = swarm;
            Ok(())
        }
        Err(e) => {
            let reason = e.to_string();
            let _ = ctx
                .event_tx
                .send(PeerEvent::Failed {
                    reason: reason.clone(),
                })
                .await;
            Err(reason)
        }
    }
}
