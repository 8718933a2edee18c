//! Authoritative arena state and the commands that mutate it
//!
//! `GameState` owns every player, bullet and the zone. Commands from
//! connections (join, move, shoot, leave) are applied here; the per-tick
//! simulation lives in the `simulation` module. Commands that name an
//! unknown session or a dead player are silent no-ops.

use crate::teams::TeamAllocator;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Bullet, GameMode, Player, SessionId, WorldSnapshot, Zone, ARENA_SIZE};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    /// Keyed by session id; iteration order is ascending id, which is also
    /// connection order. Hit detection relies on this order.
    pub(crate) players: BTreeMap<SessionId, Player>,
    /// In spawn order
    pub(crate) bullets: Vec<Bullet>,
    pub(crate) zone: Zone,
    teams: TeamAllocator,
    next_bullet_id: u64,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a state whose spawn positions are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            bullets: Vec::new(),
            zone: Zone::new(),
            teams: TeamAllocator::new(),
            next_bullet_id: 1,
            rng,
        }
    }

    pub fn player(&self, id: SessionId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Adds a player for a new session
    ///
    /// Returns the spawned player, or None if the session already has one.
    /// Team assignment happens here, serialized with every other join.
    pub fn join(&mut self, id: SessionId, name: String, mode: GameMode) -> Option<Player> {
        if self.players.contains_key(&id) {
            debug!("Session {} already joined, ignoring", id);
            return None;
        }

        let team = self.teams.assign(id, mode);
        let x = self.rng.gen_range(0.0..=ARENA_SIZE);
        let y = self.rng.gen_range(0.0..=ARENA_SIZE);

        let player = Player::new(id, name, team, x, y);

        info!(
            "Player {} ({}) joined {:?} as {:?} ({}/{}) at ({:.1}, {:.1})",
            id,
            player.name,
            mode,
            team,
            self.teams.members(team),
            mode.party_size(),
            x,
            y
        );
        self.players.insert(id, player.clone());
        Some(player)
    }

    /// Sets a living player's position and facing
    ///
    /// Coordinates are clamped to the arena; the angle is stored verbatim.
    /// Non-finite values cannot be clamped, so a move carrying one is
    /// dropped whole. Returns false if the command was ignored.
    pub fn move_player(&mut self, id: SessionId, x: f32, y: f32, angle: f32) -> bool {
        if !(x.is_finite() && y.is_finite() && angle.is_finite()) {
            debug!("Dropping non-finite move from session {}", id);
            return false;
        }

        match self.players.get_mut(&id) {
            Some(player) if player.alive => {
                player.x = x.clamp(0.0, ARENA_SIZE);
                player.y = y.clamp(0.0, ARENA_SIZE);
                player.angle = angle;
                true
            }
            _ => false,
        }
    }

    /// Fires one bullet from a living player's position and facing
    ///
    /// Returns the new bullet's id, or None if the command was ignored.
    pub fn shoot(&mut self, id: SessionId) -> Option<u64> {
        let player = self.players.get(&id).filter(|p| p.alive)?;

        let bullet_id = self.next_bullet_id;
        self.next_bullet_id += 1;

        self.bullets.push(Bullet::new(bullet_id, player));
        Some(bullet_id)
    }

    /// Removes a session's player
    ///
    /// Bullets the player already fired stay in flight.
    pub fn leave(&mut self, id: SessionId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        self.teams.release(player.team);
        info!("Player {} ({}) left", id, player.name);
        Some(player)
    }

    /// Copies the full state for publishing
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            players: self.players.values().cloned().collect(),
            bullets: self.bullets.clone(),
            zone: self.zone.clone(),
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
