//! # Arena Server Library
//!
//! This library provides the authoritative server for a real-time top-down
//! arena shooter with a shrinking safe zone. It owns the canonical state of
//! every player and bullet, applies client commands, advances the simulation
//! at a fixed tick rate, and broadcasts full-state snapshots to all clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Positions, health, bullets and eliminations are decided here only. Clients
//! send intents (join, move, shoot, leave) and render whatever the server
//! broadcasts.
//!
//! ### Command Ingestion
//! Commands are applied as soon as they arrive, between ticks. Commands that
//! reference an unknown session or a dead player are silently ignored, since
//! they arise naturally when a disconnect races with in-flight packets.
//!
//! ### State Broadcasting
//! After every tick the full arena (players, bullets, zone) is sent to every
//! connected client, split into as many datagrams as it takes to stay under
//! the UDP payload limit. Eliminations, joins and departures are broadcast as they
//! happen.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the `GameState` and handles inbound commands and tick timer
//! events from a single `select!` loop. A tick therefore never observes a
//! half-applied command, and every command received before a tick is visible
//! to it exactly once.
//!
//! ### Fire-and-Forget Output
//! Outbound packets are queued to a dedicated sender task. A slow socket never
//! delays the next tick.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The entity store and command ingestor:
//! - Players keyed by session id, bullets in spawn order, the zone
//! - `join`, `move_player`, `shoot`, `leave`
//! - Full-state snapshots for publishing
//!
//! ### Simulation Module (`simulation`)
//! The fixed-step tick: bullet travel, hit detection, zone shrink and zone
//! damage, returning the tick's eliminations.
//!
//! ### Teams Module (`teams`)
//! Slot allocation that groups duo and squad players by join order.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry: session id allocation, address lookup, timeouts.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch, broadcasting and the main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 30 ticks per second, up to 64 connections
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Runs until a shutdown handle fires
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The simulation can also be driven directly, without any networking:
//!
//! ```rust
//! use server::game::GameState;
//! use shared::GameMode;
//!
//! let mut state = GameState::with_seed(1);
//! state.join(1, "alpha".to_string(), GameMode::Solo);
//! state.move_player(1, 1000.0, 1000.0, 0.0);
//! state.shoot(1);
//!
//! let eliminations = state.tick();
//! assert!(eliminations.is_empty());
//! assert_eq!(state.bullets().len(), 1);
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod simulation;
pub mod teams;
