use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// How often `Connect` is resent until the feed answers.
const CONNECT_RETRY: Duration = Duration::from_secs(1);

/// UDP link to the tracking feed.
///
/// Two tasks run on the tokio runtime: one decodes incoming datagrams into
/// a channel, the other sends queued packets and keeps retrying the
/// handshake while disconnected. The owner only ever touches channels, so
/// every method here is synchronous apart from construction.
pub struct Transport {
    outgoing: mpsc::UnboundedSender<Packet>,
    incoming: mpsc::UnboundedReceiver<Packet>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transport {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        info!("Connecting to feed at {} from {}", server_addr, socket.local_addr()?);

        let connected = Arc::new(AtomicBool::new(false));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            server_addr,
            Arc::clone(&connected),
            incoming_tx,
        ));
        let sender = tokio::spawn(send_loop(
            socket,
            server_addr,
            Arc::clone(&connected),
            outgoing_rx,
        ));

        Ok(Self {
            outgoing,
            incoming,
            connected,
            tasks: vec![receiver, sender],
        })
    }

    /// Queues a packet; false once the send task is gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.outgoing.send(packet).is_ok()
    }

    pub fn try_recv(&mut self) -> Option<Packet> {
        self.incoming.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<Packet> {
        self.incoming.recv().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Says goodbye to the feed; the send task exits after the packet is out.
    pub fn close(&self) {
        let _ = self.outgoing.send(Packet::Disconnect);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    connected: Arc<AtomicBool>,
    incoming: mpsc::UnboundedSender<Packet>,
) {
    let mut buffer = vec![0u8; MAX_PACKET_SIZE];

    loop {
        let (len, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                error!("Error receiving packet: {}", e);
                continue;
            }
        };

        if from != server_addr {
            debug!("Ignoring datagram from {}", from);
            continue;
        }

        let packet = match deserialize::<Packet>(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed packet from feed: {}", e);
                continue;
            }
        };

        match &packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                connected.store(true, Ordering::Relaxed);
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                connected.store(false, Ordering::Relaxed);
            }
            _ => {}
        }

        if incoming.send(packet).is_err() {
            break;
        }
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    connected: Arc<AtomicBool>,
    mut outgoing: mpsc::UnboundedReceiver<Packet>,
) {
    let mut handshake = interval(CONNECT_RETRY);

    loop {
        tokio::select! {
            packet = outgoing.recv() => {
                let Some(packet) = packet else { break };
                let closing = matches!(packet, Packet::Disconnect);

                if let Err(e) = send_packet(&socket, server_addr, &packet).await {
                    error!("Error sending packet: {}", e);
                }
                if closing {
                    connected.store(false, Ordering::Relaxed);
                    break;
                }
            }

            _ = handshake.tick() => {
                if !connected.load(Ordering::Relaxed) {
                    let hello = Packet::Connect { client_version: PROTOCOL_VERSION };
                    if let Err(e) = send_packet(&socket, server_addr, &hello).await {
                        error!("Error sending handshake: {}", e);
                    }
                }
            }
        }
    }
}

async fn send_packet(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    packet: &Packet,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let data = serialize(packet)?;
    if data.len() > MAX_PACKET_SIZE {
        return Err(format!("packet of {} bytes exceeds datagram limit", data.len()).into());
    }
    socket.send_to(&data, server_addr).await?;
    Ok(())
}
