use serde::{Deserialize, Serialize};

pub const ARENA_SIZE: f32 = 2000.0;
pub const ZONE_INITIAL_RADIUS: f32 = 1200.0;
pub const ZONE_MIN_RADIUS: f32 = 50.0;
pub const ZONE_SHRINK_PER_TICK: f32 = 0.1;
pub const ZONE_DAMAGE_PER_TICK: f32 = 0.5;
pub const TICK_RATE: u32 = 30;
pub const BULLET_SPEED: f32 = 15.0;
pub const BULLET_MAX_DISTANCE: f32 = 600.0;
pub const BULLET_HIT_RADIUS: f32 = 20.0;
pub const BULLET_DAMAGE: f32 = 20.0;
pub const PLAYER_MAX_HEALTH: f32 = 100.0;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
/// Serialized size allowed for one snapshot part, leaving room for the
/// packet header around it.
pub const SNAPSHOT_PART_BUDGET: usize = 60_000;

/// Stable identifier tying a connection to its player.
pub type SessionId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Solo,
    Duo,
    Squad,
}

impl GameMode {
    /// Number of players sharing one team in this mode.
    pub fn party_size(self) -> usize {
        match self {
            GameMode::Solo => 1,
            GameMode::Duo => 2,
            GameMode::Squad => 4,
        }
    }
}

/// Opaque grouping key; players sharing it cannot damage each other.
///
/// Duo and squad parties are numbered separately per mode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamId {
    Solo(SessionId),
    Duo(u32),
    Squad(u32),
}

/// Who gets credit for an elimination.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Killer {
    Player(SessionId),
    Zone,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Elimination {
    pub victim: SessionId,
    pub killer: Killer,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: SessionId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Facing in radians, stored verbatim (not normalized).
    pub angle: f32,
    pub health: f32,
    pub team: TeamId,
    pub kills: u32,
    pub alive: bool,
}

impl Player {
    pub fn new(id: SessionId, name: String, team: TeamId, x: f32, y: f32) -> Self {
        Self {
            id,
            name,
            x,
            y,
            angle: 0.0,
            health: PLAYER_MAX_HEALTH,
            team,
            kills: 0,
            alive: true,
        }
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        distance(self.x, self.y, x, y)
    }

    /// Applies damage to a living player.
    ///
    /// Returns true when this damage eliminated the player. Health is
    /// floored at zero, and dead players are left untouched.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.alive {
            return false;
        }

        self.health -= amount;
        if self.health <= 0.0 {
            self.health = 0.0;
            self.alive = false;
            return true;
        }
        false
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Bullet {
    pub id: u64,
    pub owner_id: SessionId,
    /// Owner's team at the moment of firing.
    pub team: TeamId,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub distance: f32,
    pub max_distance: f32,
}

impl Bullet {
    pub fn new(id: u64, owner: &Player) -> Self {
        Self {
            id,
            owner_id: owner.id,
            team: owner.team,
            x: owner.x,
            y: owner.y,
            angle: owner.angle,
            speed: BULLET_SPEED,
            distance: 0.0,
            max_distance: BULLET_MAX_DISTANCE,
        }
    }

    /// Moves the bullet one tick along its heading.
    pub fn advance(&mut self) {
        self.x += self.speed * self.angle.cos();
        self.y += self.speed * self.angle.sin();
        self.distance += self.speed;
    }

    pub fn is_spent(&self) -> bool {
        self.distance > self.max_distance
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Zone {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Carried for clients; the simulation never reads it.
    pub target_radius: f32,
    /// Shrink steps applied so far. Stops counting at the floor.
    pub shrink_steps: u32,
}

impl Zone {
    pub fn new() -> Self {
        Self {
            x: ARENA_SIZE / 2.0,
            y: ARENA_SIZE / 2.0,
            radius: ZONE_INITIAL_RADIUS,
            target_radius: ZONE_MIN_RADIUS,
            shrink_steps: 0,
        }
    }

    /// Shrinks the radius by one tick's worth, never below the floor.
    ///
    /// The radius is derived from the step count so that the floor is
    /// reached on exactly the expected tick.
    pub fn shrink(&mut self) {
        if self.radius <= ZONE_MIN_RADIUS {
            return;
        }

        self.shrink_steps += 1;
        let radius = ZONE_INITIAL_RADIUS - ZONE_SHRINK_PER_TICK * self.shrink_steps as f32;
        self.radius = radius.max(ZONE_MIN_RADIUS).min(self.radius);
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        distance(self.x, self.y, x, y) <= self.radius
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::new()
    }
}

/// Full-state payload sent on join and after every tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub tick: u32,
    pub players: Vec<Player>,
    pub bullets: Vec<Bullet>,
    pub zone: Zone,
}

impl WorldSnapshot {
    fn empty_like(&self) -> Self {
        Self {
            tick: self.tick,
            players: Vec::new(),
            bullets: Vec::new(),
            zone: self.zone.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        self.players.is_empty() && self.bullets.is_empty()
    }

    /// Splits the snapshot into parts that each serialize to at most
    /// `budget` bytes, as long as no single entity is larger than that.
    ///
    /// Every part carries the tick and the zone. Players and then bullets
    /// are spread across parts in their original order, so concatenating
    /// the parts restores the snapshot. Always returns at least one part.
    pub fn split(&self, budget: usize) -> bincode::Result<Vec<WorldSnapshot>> {
        let mut splitter = Splitter::new(self.empty_like(), budget)?;

        for player in &self.players {
            splitter.reserve(bincode::serialized_size(player)?);
            splitter.current.players.push(player.clone());
        }
        for bullet in &self.bullets {
            splitter.reserve(bincode::serialized_size(bullet)?);
            splitter.current.bullets.push(bullet.clone());
        }

        Ok(splitter.finish())
    }

    /// Reassembles parts produced by [`WorldSnapshot::split`].
    ///
    /// Returns None if no parts were given.
    pub fn merge(parts: Vec<WorldSnapshot>) -> Option<WorldSnapshot> {
        let mut parts = parts.into_iter();
        let mut merged = parts.next()?;
        for part in parts {
            merged.players.extend(part.players);
            merged.bullets.extend(part.bullets);
        }
        Some(merged)
    }
}

struct Splitter {
    empty: WorldSnapshot,
    base_size: u64,
    budget: u64,
    size: u64,
    current: WorldSnapshot,
    parts: Vec<WorldSnapshot>,
}

impl Splitter {
    fn new(empty: WorldSnapshot, budget: usize) -> bincode::Result<Self> {
        let base_size = bincode::serialized_size(&empty)?;
        Ok(Self {
            current: empty.clone(),
            empty,
            base_size,
            budget: budget as u64,
            size: base_size,
            parts: Vec::new(),
        })
    }

    /// Starts a new part if `len` more bytes would overflow the current one
    fn reserve(&mut self, len: u64) {
        if self.size + len > self.budget && !self.current.is_empty() {
            let full = std::mem::replace(&mut self.current, self.empty.clone());
            self.parts.push(full);
            self.size = self.base_size;
        }
        self.size += len;
    }

    fn finish(mut self) -> Vec<WorldSnapshot> {
        self.parts.push(self.current);
        self.parts
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Join {
        name: String,
        mode: GameMode,
    },
    Move {
        x: f32,
        y: f32,
        angle: f32,
    },
    Shoot,
    Leave,

    /// One part of the joiner's first snapshot; see `StateUpdate`.
    Init {
        session_id: SessionId,
        state: WorldSnapshot,
        part: u32,
        parts: u32,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        session_id: SessionId,
    },
    PlayerKilled {
        victim: SessionId,
        killer: Killer,
    },
    /// One part of a tick's snapshot. A full arena does not fit in one
    /// datagram, so each tick is sent as `parts` packets sharing a tick
    /// number, numbered from 0.
    StateUpdate {
        state: WorldSnapshot,
        part: u32,
        parts: u32,
    },
    Disconnected {
        reason: String,
    },
}

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}
