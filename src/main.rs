//! Chess Wager Escrow Server
//!
//! Runs the full escrow flow once against two local dev identities, then —
//! if `WAGER_SERVE` is set — serves the WebSocket surface.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chess_wager::escrow::engine::{EscrowEngine, EscrowStore};
use chess_wager::network::server::{EscrowServer, ServerConfig};
use chess_wager::settlement::signer::LossSigner;
use chess_wager::{Amount, EscrowError, VERSION};

// Dev-only secrets, the fixed throwaway accounts every local run shares.
const DEV_SECRET_ONE: [u8; 32] = [0x11; 32];
const DEV_SECRET_TWO: [u8; 32] = [0x22; 32];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Chess Wager Escrow Server v{}", VERSION);

    demo_flow()?;

    if std::env::var("WAGER_SERVE").map(|v| v == "1" || v == "true") == Ok(true) {
        let config = ServerConfig::from_env();
        let server = EscrowServer::new(config).context("failed to start server")?;
        server.run().await.context("server failed")?;
    }

    Ok(())
}

/// Walk one match through its whole life: fund, create, join, sign, claim.
fn demo_flow() -> anyhow::Result<()> {
    info!("=== Demo Settlement Flow ===");

    let alice = LossSigner::from_secret_bytes(&DEV_SECRET_ONE).context("dev key one")?;
    let bob = LossSigner::from_secret_bytes(&DEV_SECRET_TWO).context("dev key two")?;
    info!("Player one: {}", alice.address());
    info!("Player two: {}", bob.address());

    let mut engine = EscrowEngine::new(EscrowStore::new());
    engine.deposit(alice.address(), Amount::units(10));
    engine.deposit(bob.address(), Amount::units(10));

    // Alice stakes 1 unit and waits for an opponent.
    let stake = Amount::units(1);
    let match_id = engine.create_match(alice.address(), stake)?;
    info!("Match {} created, pot {}", match_id, engine.held(match_id));

    // Bob matches the stake.
    engine.join_match(match_id, bob.address(), stake)?;
    info!("Match {} active, pot {}", match_id, engine.held(match_id));

    // The game happens elsewhere; the rules engine reports Bob as the
    // loser, and Bob signs his loss.
    let proof = bob.sign_loss(match_id);
    info!("Loser signed: 0x{}", hex::encode(proof));

    // A replay against a different match would go nowhere.
    let other = engine.create_match(alice.address(), stake)?;
    match engine.submit_claim(other, bob.address(), &proof) {
        Err(EscrowError::NotActive) | Err(EscrowError::InvalidSignature) => {
            info!("Replay against match {} rejected, as it must be", other);
        }
        Ok(_) => anyhow::bail!("replayed proof must never settle another match"),
        Err(err) => return Err(err.into()),
    }

    // Alice claims with Bob's proof.
    let winner = engine.submit_claim(match_id, bob.address(), &proof)?;
    let snapshot = engine.read(match_id)?;
    info!(
        "Match {} settled: winner {} paid {}",
        match_id,
        winner,
        snapshot
            .stake
            .checked_double()
            .unwrap_or(Amount::ZERO)
    );
    info!("Player one balance: {}", engine.available(&alice.address()));
    info!("Player two balance: {}", engine.available(&bob.address()));

    Ok(())
}
