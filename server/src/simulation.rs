//! Fixed-step simulation tick
//!
//! One call to [`GameState::tick`] runs every step in a fixed order:
//!
//! 1. Advance each bullet, retiring those past their range
//! 2. Hit-test each surviving bullet against players in ascending session id
//! 3. Shrink the zone toward its floor
//! 4. Damage living players outside the zone
//!
//! The caller publishes the resulting state afterwards. Health reaching zero
//! is the only way a player dies, and a dead player takes no further damage.

use crate::game::GameState;
use log::info;
use shared::{
    Bullet, Elimination, Killer, SessionId, BULLET_DAMAGE, BULLET_HIT_RADIUS,
    ZONE_DAMAGE_PER_TICK,
};

impl GameState {
    /// Advances the arena by one tick and returns the eliminations it caused
    pub fn tick(&mut self) -> Vec<Elimination> {
        let mut eliminations = Vec::new();

        self.update_bullets(&mut eliminations);
        self.zone.shrink();
        self.apply_zone_damage(&mut eliminations);

        self.tick = self.tick.wrapping_add(1);
        eliminations
    }

    fn update_bullets(&mut self, eliminations: &mut Vec<Elimination>) {
        let mut bullets = std::mem::take(&mut self.bullets);

        bullets.retain_mut(|bullet| {
            bullet.advance();
            if bullet.is_spent() {
                return false;
            }

            match self.find_hit_target(bullet) {
                Some(victim_id) => {
                    if let Some(elimination) = self.apply_bullet_hit(victim_id, bullet) {
                        eliminations.push(elimination);
                    }
                    false
                }
                None => true,
            }
        });

        self.bullets = bullets;
    }

    /// First living enemy within hit radius, scanning in session id order
    fn find_hit_target(&self, bullet: &Bullet) -> Option<SessionId> {
        self.players
            .values()
            .find(|player| {
                player.alive
                    && player.id != bullet.owner_id
                    && player.team != bullet.team
                    && player.distance_to(bullet.x, bullet.y) < BULLET_HIT_RADIUS
            })
            .map(|player| player.id)
    }

    fn apply_bullet_hit(&mut self, victim_id: SessionId, bullet: &Bullet) -> Option<Elimination> {
        let victim = self.players.get_mut(&victim_id)?;
        if !victim.take_damage(BULLET_DAMAGE) {
            return None;
        }

        // The shooter may have disconnected; the victim still dies
        if let Some(owner) = self.players.get_mut(&bullet.owner_id) {
            owner.kills += 1;
        }

        info!("Player {} eliminated by player {}", victim_id, bullet.owner_id);
        Some(Elimination {
            victim: victim_id,
            killer: Killer::Player(bullet.owner_id),
        })
    }

    fn apply_zone_damage(&mut self, eliminations: &mut Vec<Elimination>) {
        let zone = &self.zone;

        for player in self.players.values_mut() {
            if !player.alive || zone.contains(player.x, player.y) {
                continue;
            }

            if player.take_damage(ZONE_DAMAGE_PER_TICK) {
                info!("Player {} eliminated by the zone", player.id);
                eliminations.push(Elimination {
                    victim: player.id,
                    killer: Killer::Zone,
                });
            }
        }
    }
}
