//! WebSocket Escrow Server
//!
//! Async WebSocket surface over the escrow engine. Handles connection
//! bookkeeping, command dispatch, and event fan-out. Every mutating call
//! takes the engine's write lock for its duration, which is exactly the
//! one-transition-at-a-time ordering the escrow requires.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::amount::Amount;
use crate::core::identity::Address;
use crate::escrow::engine::{EscrowEngine, EscrowStore};
use crate::network::protocol::{
    decode_signature, ClientMessage, ErrorCode, ServerErrorMessage, ServerMessage,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Free balance credited to a newly-introduced, unfunded address.
    /// Zero disables the faucet. Local-testing convenience only: real
    /// deployments fund balances out of band.
    pub faucet: Amount,
    /// Append committed transitions to this journal file, if set.
    pub journal_path: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static bind addr"),
            max_connections: 1000,
            faucet: Amount::units(10),
            journal_path: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("WAGER_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("WAGER_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            faucet: std::env::var("WAGER_FAUCET_UNITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Amount::units)
                .unwrap_or(defaults.faucet),
            journal_path: std::env::var("WAGER_JOURNAL_PATH").ok().map(PathBuf::from),
            version: defaults.version,
        }
    }
}

/// Escrow server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind or open the journal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Introduced address (after Hello).
    address: Option<Address>,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Message sender (for direct messaging to client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerMessage>,
}

/// The escrow server.
pub struct EscrowServer {
    /// Server configuration.
    config: ServerConfig,
    /// The shared engine.
    engine: Arc<RwLock<EscrowEngine>>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<Uuid, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl EscrowServer {
    /// Create a new server, opening the journal file if configured.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let engine = match &config.journal_path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                info!(path = %path.display(), "journaling transitions");
                EscrowEngine::with_journal(EscrowStore::new(), Box::new(file))
            }
            None => EscrowEngine::new(EscrowStore::new()),
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            engine: Arc::new(RwLock::new(engine)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        })
    }

    /// Shared handle to the engine (for embedding and tests).
    pub fn engine(&self) -> Arc<RwLock<EscrowEngine>> {
        self.engine.clone()
    }

    /// Signal every connection to close and the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Escrow server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let client_count = self.clients.read().await.len();
                            if client_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let engine = self.engine.clone();
        let clients = self.clients.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn_id = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(
                    conn_id,
                    ConnectedClient {
                        address: None,
                        connected_at: Instant::now(),
                        sender: msg_tx.clone(),
                    },
                );
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Spawn event forwarder: every lifecycle event goes to every
            // connection; consumers re-read authoritative state themselves.
            let event_task = {
                let mut event_rx = engine.read().await.subscribe();
                let event_tx = msg_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match event_rx.recv().await {
                            Ok(event) => {
                                if event_tx.send(ServerMessage::Event(event)).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                debug!(missed, "event forwarder lagged; consumer must re-read");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            };

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerErrorMessage {
                                            code: ErrorCode::InvalidRequest,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    conn_id,
                                    client_msg,
                                    &engine,
                                    &clients,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(data))) => {
                                if let Ok(client_msg) = ClientMessage::from_bytes(&data) {
                                    Self::handle_client_message(
                                        conn_id,
                                        client_msg,
                                        &engine,
                                        &clients,
                                        &config,
                                        &msg_tx,
                                    ).await;
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // Tungstenite answers pings at the protocol
                                // level; nothing to do.
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            event_task.abort();
            clients.write().await.remove(&conn_id);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        conn_id: Uuid,
        msg: ClientMessage,
        engine: &Arc<RwLock<EscrowEngine>>,
        clients: &Arc<RwLock<BTreeMap<Uuid, ConnectedClient>>>,
        config: &ServerConfig,
        reply: &mpsc::Sender<ServerMessage>,
    ) {
        let response = match msg {
            ClientMessage::Hello { address } => {
                {
                    let mut clients = clients.write().await;
                    if let Some(client) = clients.get_mut(&conn_id) {
                        client.address = Some(address);
                    }
                }

                let mut engine = engine.write().await;
                if !config.faucet.is_zero() && engine.available(&address).is_zero() {
                    engine.deposit(address, config.faucet);
                    info!(%address, amount = %config.faucet, "dev faucet credit");
                }

                ServerMessage::Welcome {
                    address,
                    balance: engine.available(&address),
                    server_version: config.version.clone(),
                }
            }

            ClientMessage::CreateMatch { stake } => {
                match Self::introduced(conn_id, clients).await {
                    Some(address) => {
                        let mut engine = engine.write().await;
                        match engine.create_match(address, stake) {
                            Ok(match_id) => {
                                let snapshot = engine
                                    .read(match_id)
                                    .expect("created match must be readable");
                                ServerMessage::MatchCreated { match_id, snapshot }
                            }
                            Err(err) => ServerMessage::rejection(err),
                        }
                    }
                    None => Self::not_introduced(),
                }
            }

            ClientMessage::JoinMatch { match_id, stake } => {
                match Self::introduced(conn_id, clients).await {
                    Some(address) => {
                        let mut engine = engine.write().await;
                        match engine.join_match(match_id, address, stake) {
                            Ok(()) => {
                                let snapshot = engine
                                    .read(match_id)
                                    .expect("joined match must be readable");
                                ServerMessage::MatchSnapshot { snapshot }
                            }
                            Err(err) => ServerMessage::rejection(err),
                        }
                    }
                    None => Self::not_introduced(),
                }
            }

            // A claim needs no introduction: the loser signature is the
            // entire authorization, no matter who relays it.
            ClientMessage::SubmitClaim {
                match_id,
                claimed_loser,
                signature,
            } => match decode_signature(&signature) {
                Some(raw) => {
                    let mut engine = engine.write().await;
                    match engine.submit_claim(match_id, claimed_loser, &raw) {
                        Ok(winner) => {
                            let amount = engine
                                .read(match_id)
                                .ok()
                                .and_then(|m| m.stake.checked_double())
                                .unwrap_or(Amount::ZERO);
                            ServerMessage::ClaimAccepted {
                                match_id,
                                winner,
                                amount,
                            }
                        }
                        Err(err) => ServerMessage::rejection(err),
                    }
                }
                None => ServerMessage::Error(ServerErrorMessage {
                    code: ErrorCode::InvalidSignature,
                    message: "signature is not valid hex".to_string(),
                }),
            },

            // Server policy: only a participant may abort their match.
            ClientMessage::VoidMatch { match_id } => {
                match Self::introduced(conn_id, clients).await {
                    Some(address) => {
                        let mut engine = engine.write().await;
                        let participant = engine
                            .read(match_id)
                            .map(|m| m.is_participant(&address));
                        match participant {
                            Ok(false) => ServerMessage::rejection(
                                crate::escrow::error::EscrowError::UnknownParty,
                            ),
                            Err(err) => ServerMessage::rejection(err),
                            Ok(true) => match engine.void_match(match_id) {
                                Ok(refunded) => ServerMessage::MatchVoided { match_id, refunded },
                                Err(err) => ServerMessage::rejection(err),
                            },
                        }
                    }
                    None => Self::not_introduced(),
                }
            }

            ClientMessage::GetMatch { match_id } => {
                let engine = engine.read().await;
                match engine.read(match_id) {
                    Ok(snapshot) => ServerMessage::MatchSnapshot { snapshot },
                    Err(err) => ServerMessage::rejection(err),
                }
            }

            ClientMessage::GetBalance => match Self::introduced(conn_id, clients).await {
                Some(address) => {
                    let engine = engine.read().await;
                    ServerMessage::Balance {
                        address,
                        balance: engine.available(&address),
                    }
                }
                None => Self::not_introduced(),
            },

            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis() as u64,
            },
        };

        let _ = reply.send(response).await;
    }

    /// The address bound to a connection, if Hello happened.
    async fn introduced(
        conn_id: Uuid,
        clients: &Arc<RwLock<BTreeMap<Uuid, ConnectedClient>>>,
    ) -> Option<Address> {
        clients.read().await.get(&conn_id).and_then(|c| c.address)
    }

    fn not_introduced() -> ServerMessage {
        ServerMessage::Error(ServerErrorMessage {
            code: ErrorCode::NotIntroduced,
            message: "send hello with your address first".to_string(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::registry::MatchState;
    use crate::settlement::signer::LossSigner;

    fn test_server(faucet: Amount) -> EscrowServer {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            faucet,
            ..Default::default()
        };
        EscrowServer::new(config).unwrap()
    }

    async fn connect(server: &EscrowServer, conn_id: Uuid) {
        let (tx, _rx) = mpsc::channel(8);
        server.clients.write().await.insert(
            conn_id,
            ConnectedClient {
                address: None,
                connected_at: Instant::now(),
                sender: tx,
            },
        );
    }

    async fn dispatch(server: &EscrowServer, conn_id: Uuid, msg: ClientMessage) -> ServerMessage {
        let (tx, mut rx) = mpsc::channel(8);
        EscrowServer::handle_client_message(
            conn_id,
            msg,
            &server.engine,
            &server.clients,
            &server.config,
            &tx,
        )
        .await;
        rx.recv().await.expect("handler always replies")
    }

    #[tokio::test]
    async fn test_hello_faucets_and_welcomes() {
        let server = test_server(Amount::units(10));
        let conn = Uuid::new_v4();
        connect(&server, conn).await;

        let address = Address::new([5; 20]);
        let reply = dispatch(&server, conn, ClientMessage::Hello { address }).await;

        match reply {
            ServerMessage::Welcome { address: a, balance, .. } => {
                assert_eq!(a, address);
                assert_eq!(balance, Amount::units(10));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Faucet is first-introduction only.
        let again = dispatch(&server, conn, ClientMessage::Hello { address }).await;
        match again {
            ServerMessage::Welcome { balance, .. } => assert_eq!(balance, Amount::units(10)),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_operations_require_hello() {
        let server = test_server(Amount::units(10));
        let conn = Uuid::new_v4();
        connect(&server, conn).await;

        let reply = dispatch(
            &server,
            conn,
            ClientMessage::CreateMatch {
                stake: Amount::units(1),
            },
        )
        .await;

        match reply {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::NotIntroduced),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_flow_over_protocol() {
        let server = test_server(Amount::units(10));
        let alice = LossSigner::from_secret_bytes(&[0xa1; 32]).unwrap();
        let bob = LossSigner::from_secret_bytes(&[0xb0; 32]).unwrap();

        let alice_conn = Uuid::new_v4();
        let bob_conn = Uuid::new_v4();
        connect(&server, alice_conn).await;
        connect(&server, bob_conn).await;

        dispatch(&server, alice_conn, ClientMessage::Hello { address: alice.address() }).await;
        dispatch(&server, bob_conn, ClientMessage::Hello { address: bob.address() }).await;

        // Alice creates.
        let created = dispatch(
            &server,
            alice_conn,
            ClientMessage::CreateMatch {
                stake: Amount::units(1),
            },
        )
        .await;
        let match_id = match created {
            ServerMessage::MatchCreated { match_id, snapshot } => {
                assert_eq!(snapshot.state, MatchState::Open);
                match_id
            }
            other => panic!("unexpected reply: {other:?}"),
        };

        // Bob joins.
        let joined = dispatch(
            &server,
            bob_conn,
            ClientMessage::JoinMatch {
                match_id,
                stake: Amount::units(1),
            },
        )
        .await;
        match joined {
            ServerMessage::MatchSnapshot { snapshot } => {
                assert_eq!(snapshot.state, MatchState::Active);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Bob loses and signs; Alice submits the claim.
        let proof = hex::encode(bob.sign_loss(match_id));
        let claimed = dispatch(
            &server,
            alice_conn,
            ClientMessage::SubmitClaim {
                match_id,
                claimed_loser: bob.address(),
                signature: format!("0x{proof}"),
            },
        )
        .await;
        match claimed {
            ServerMessage::ClaimAccepted { winner, amount, .. } => {
                assert_eq!(winner, alice.address());
                assert_eq!(amount, Amount::units(2));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Authoritative read agrees.
        let snapshot = dispatch(&server, bob_conn, ClientMessage::GetMatch { match_id }).await;
        match snapshot {
            ServerMessage::MatchSnapshot { snapshot } => {
                assert_eq!(snapshot.state, MatchState::Settled);
                assert_eq!(snapshot.winner, Some(alice.address()));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_needs_no_introduction() {
        let server = test_server(Amount::units(10));
        let alice = LossSigner::from_secret_bytes(&[0xa1; 32]).unwrap();
        let bob = LossSigner::from_secret_bytes(&[0xb0; 32]).unwrap();

        // Set up an active match directly on the engine.
        let match_id = {
            let engine_handle = server.engine();
            let mut engine = engine_handle.write().await;
            engine.deposit(alice.address(), Amount::units(1));
            engine.deposit(bob.address(), Amount::units(1));
            let id = engine
                .create_match(alice.address(), Amount::units(1))
                .unwrap();
            engine
                .join_match(id, bob.address(), Amount::units(1))
                .unwrap();
            id
        };

        // A connection that never said Hello relays the claim.
        let relay_conn = Uuid::new_v4();
        connect(&server, relay_conn).await;
        let proof = hex::encode(bob.sign_loss(match_id));
        let reply = dispatch(
            &server,
            relay_conn,
            ClientMessage::SubmitClaim {
                match_id,
                claimed_loser: bob.address(),
                signature: proof,
            },
        )
        .await;

        match reply {
            ServerMessage::ClaimAccepted { winner, .. } => assert_eq!(winner, alice.address()),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_hex_signature_is_invalid_signature() {
        let server = test_server(Amount::units(10));
        let conn = Uuid::new_v4();
        connect(&server, conn).await;

        let reply = dispatch(
            &server,
            conn,
            ClientMessage::SubmitClaim {
                match_id: crate::escrow::registry::MatchId::new(1),
                claimed_loser: Address::new([1; 20]),
                signature: "0xnothex".to_string(),
            },
        )
        .await;

        match reply {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::InvalidSignature),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_void_requires_participant() {
        let server = test_server(Amount::units(10));
        let alice = Address::new([0xaa; 20]);
        let outsider = Address::new([0xdd; 20]);

        let match_id = {
            let engine_handle = server.engine();
            let mut engine = engine_handle.write().await;
            engine.deposit(alice, Amount::units(1));
            engine.create_match(alice, Amount::units(1)).unwrap()
        };

        let conn = Uuid::new_v4();
        connect(&server, conn).await;
        dispatch(&server, conn, ClientMessage::Hello { address: outsider }).await;

        let reply = dispatch(&server, conn, ClientMessage::VoidMatch { match_id }).await;
        match reply {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::UnknownParty),
            other => panic!("unexpected reply: {other:?}"),
        }

        // The participant may abort.
        let alice_conn = Uuid::new_v4();
        connect(&server, alice_conn).await;
        dispatch(&server, alice_conn, ClientMessage::Hello { address: alice }).await;
        let reply = dispatch(&server, alice_conn, ClientMessage::VoidMatch { match_id }).await;
        match reply {
            ServerMessage::MatchVoided { refunded, .. } => {
                assert_eq!(refunded, Amount::units(1));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
