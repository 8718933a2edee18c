//! Team slot allocation for duo and squad modes
//!
//! Parties are filled in join order: a new player goes into the
//! lowest-numbered party of their mode that still has room, or opens a
//! new one. Slots are released on leave so later joiners can fill gaps.
//! A player's team never changes after join.

use shared::{GameMode, SessionId, TeamId};

#[derive(Debug, Default, Clone)]
pub struct TeamAllocator {
    /// Member count per duo party, indexed by party number
    duo: Vec<usize>,
    /// Member count per squad party, indexed by party number
    squad: Vec<usize>,
}

impl TeamAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for a joining player and returns their team
    pub fn assign(&mut self, session_id: SessionId, mode: GameMode) -> TeamId {
        match mode {
            GameMode::Solo => TeamId::Solo(session_id),
            GameMode::Duo => TeamId::Duo(Self::take_slot(&mut self.duo, mode.party_size())),
            GameMode::Squad => {
                TeamId::Squad(Self::take_slot(&mut self.squad, mode.party_size()))
            }
        }
    }

    /// Frees the slot held by a departing player
    pub fn release(&mut self, team: TeamId) {
        let (parties, index) = match team {
            TeamId::Solo(_) => return,
            TeamId::Duo(index) => (&mut self.duo, index),
            TeamId::Squad(index) => (&mut self.squad, index),
        };

        if let Some(count) = parties.get_mut(index as usize) {
            *count = count.saturating_sub(1);
        }
    }

    /// Number of players currently holding a slot in the given party
    pub fn members(&self, team: TeamId) -> usize {
        match team {
            TeamId::Solo(_) => 1,
            TeamId::Duo(index) => self.duo.get(index as usize).copied().unwrap_or(0),
            TeamId::Squad(index) => self.squad.get(index as usize).copied().unwrap_or(0),
        }
    }

    fn take_slot(parties: &mut Vec<usize>, party_size: usize) -> u32 {
        let index = match parties.iter().position(|&count| count < party_size) {
            Some(index) => index,
            None => {
                parties.push(0);
                parties.len() - 1
            }
        };

        parties[index] += 1;
        index as u32
    }
}
