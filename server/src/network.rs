//! Feed network layer: UDP subscribers, query answering and the world tick

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::clusters::ClusterIndex;
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{now_millis, Packet, Request, Response, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Live positions answered per tracker request.
pub const MAX_TRACKS_PER_BATCH: usize = 800;
/// Largest history a single response carries.
pub const MAX_HISTORY_POINTS: u32 = 1_200;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum FeedMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Answers one query against the current world and cluster index.
///
/// Tracker requests are answered with a `Tracks` batch; everything else
/// with a `Response` or, for unknown ids, a `Failed`. Queries for another
/// game server get empty answers.
pub fn respond(
    world: &World,
    clusters: &ClusterIndex,
    request_id: u64,
    request: Request,
) -> Packet {
    let same_server = |server: &str| server == world.server();
    let failed = |reason: String| Packet::Failed { request_id, reason };

    let response = match request {
        Request::Tracker {
            server,
            since,
            duration,
        } => {
            let mut tracks = if same_server(&server) {
                world.tracks(since, duration)
            } else {
                Vec::new()
            };
            if tracks.len() > MAX_TRACKS_PER_BATCH {
                warn!("Truncating tracker batch of {} tracks", tracks.len());
                tracks.truncate(MAX_TRACKS_PER_BATCH);
            }
            return Packet::Tracks { tracks };
        }

        Request::RootClusters { server, dimension } => {
            if same_server(&server) {
                Response::RootClusters(clusters.roots(dimension))
            } else {
                Response::RootClusters(Vec::new())
            }
        }

        Request::ClusterChildren { cluster_id } => match clusters.children(cluster_id) {
            Some(cluster) => Response::ClusterChildren(cluster),
            None => return failed(format!("Unknown cluster #{}", cluster_id)),
        },

        Request::TrackHistory {
            track_id,
            max,
            aggregation_ms,
        } => {
            let max = max.min(MAX_HISTORY_POINTS);
            match world.track_history(track_id, max, aggregation_ms) {
                Some(history) => Response::TrackHistory(history),
                None => return failed(format!("Unknown track #{}", track_id)),
            }
        }

        Request::ClusterAssociations { cluster_id } => {
            match clusters.associations(cluster_id, world) {
                Some(players) => Response::ClusterAssociations(players),
                None => return failed(format!("Unknown cluster #{}", cluster_id)),
            }
        }

        Request::PlayersLatestSession { uuids, server } => {
            if same_server(&server) {
                Response::PlayersLatestSession(world.sessions(&uuids))
            } else {
                Response::PlayersLatestSession(Vec::new())
            }
        }
    };

    Packet::Response {
        request_id,
        response,
    }
}

/// Replaces a reply that would not fit one datagram with a failure.
fn fit_datagram(packet: Packet) -> Packet {
    let size = serialize(&packet).map(|data| data.len()).unwrap_or(usize::MAX);
    if size <= MAX_PACKET_SIZE {
        return packet;
    }
    match packet {
        Packet::Response { request_id, .. } => Packet::Failed {
            request_id,
            reason: format!("Response of {} bytes is too large", size),
        },
        other => other,
    }
}

/// The tracking feed: simulates the world and serves every subscriber
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    clusters: ClusterIndex,
    tick_duration: Duration,
    cluster_every: Duration,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    feed_tx: mpsc::UnboundedSender<FeedMessage>,
    feed_rx: mpsc::UnboundedReceiver<FeedMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        world: World,
        tick_duration: Duration,
        cluster_every: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Feed listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let clusters = ClusterIndex::build(&world, now_millis());

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            world,
            clusters,
            tick_duration,
            cluster_every,
            tick: 0,
            server_tx,
            server_rx,
            feed_tx,
            feed_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping a running server from another task.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut feed_rx = std::mem::replace(&mut self.feed_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = feed_rx.recv().await {
                match message {
                    FeedMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    FeedMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to subscriber {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that drops silent subscribers
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.feed_tx.send(FeedMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.feed_tx.send(FeedMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Handles one packet from a subscriber
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Subscriber connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch: expected {}, got {}",
                        PROTOCOL_VERSION, client_version
                    );
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                let mut clients = self.clients.write().await;
                if let Some(existing_id) = clients.find_client_by_addr(addr) {
                    info!("Replacing subscriber {} from {}", existing_id, addr);
                    clients.remove_client(&existing_id);
                }

                let response = match clients.add_client(addr) {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: "Feed full".to_string(),
                    },
                };
                drop(clients);
                self.send_packet(response, addr);
            }

            Packet::Request {
                request_id,
                request,
            } => {
                let known = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .map(|client_id| clients.touch(client_id))
                        .unwrap_or(false)
                };
                if !known {
                    debug!("Request #{} from unknown subscriber {}", request_id, addr);
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Not connected".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                debug!("Request #{} ({}) from {}", request_id, request.name(), addr);
                let reply = fit_datagram(respond(&self.world, &self.clusters, request_id, request));
                self.send_packet(reply, addr);
            }

            Packet::Disconnect => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.remove_client(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from subscriber at {}", addr);
            }
        }
    }

    /// Main feed loop: answers queries, steps the world, reclusters
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        let mut cluster_interval = interval(self.cluster_every);
        let mut last_tick = Instant::now();

        info!("Feed started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            debug!("Subscriber {} timed out", client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Feed shutting down");
                            self.broadcast_packet(Packet::Disconnected {
                                reason: "Feed shutting down".to_string(),
                            });
                            // Give the sender task a moment to flush
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick);
                    last_tick = now;

                    self.world.step(dt, now_millis());
                    self.tick += 1;

                    if self.tick % 300 == 0 {
                        let subscribers = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} subscribers, {} of {} players online",
                            self.tick,
                            subscribers,
                            self.world.online_count(),
                            self.world.players().len()
                        );
                    }
                },

                _ = cluster_interval.tick() => {
                    self.clusters = ClusterIndex::build(&self.world, now_millis());
                },
            }
        }

        Ok(())
    }
}
