//! Player and phase definitions shared by the session and the physics step

use bitvec::vec::BitVec;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::net::PLACEHOLDER_NAME;
use crate::util::vec2::Vec2;

/// Player identifier, the lowest free non-negative integer at connect time
pub type PlayerId = u32;

/// Track sample indices currently within range of a car
pub type ContactSet = SmallVec<[usize; 16]>;

/// Arrow keys currently pressed by a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Stage of the race lifecycle. Cycles forever in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MatchPhase {
    #[default]
    Starting,
    Countdown,
    Race,
    Closing,
    Finished,
}

impl MatchPhase {
    /// The phase that follows this one
    pub fn next(self) -> Self {
        match self {
            MatchPhase::Starting => MatchPhase::Countdown,
            MatchPhase::Countdown => MatchPhase::Race,
            MatchPhase::Race => MatchPhase::Closing,
            MatchPhase::Closing => MatchPhase::Finished,
            MatchPhase::Finished => MatchPhase::Starting,
        }
    }

    /// Whether cars move during this phase
    pub fn is_driving(self) -> bool {
        matches!(self, MatchPhase::Race | MatchPhase::Closing)
    }

    /// Numeric code used by the metrics gauge
    pub fn code(self) -> u64 {
        match self {
            MatchPhase::Starting => 0,
            MatchPhase::Countdown => 1,
            MatchPhase::Race => 2,
            MatchPhase::Closing => 3,
            MatchPhase::Finished => 4,
        }
    }
}

/// The three timed countdowns of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountdownKind {
    /// Before the race starts (COUNTDOWN phase)
    Countdown,
    /// After the first finisher (CLOSING phase)
    Closedown,
    /// Between the standings and the next round (FINISHED phase)
    Rest,
}

impl CountdownKind {
    /// The phase this countdown runs in
    pub fn phase(self) -> MatchPhase {
        match self {
            CountdownKind::Countdown => MatchPhase::Countdown,
            CountdownKind::Closedown => MatchPhase::Closing,
            CountdownKind::Rest => MatchPhase::Finished,
        }
    }
}

/// One connected participant
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec2,
    /// Heading in degrees
    pub rotation: f64,
    pub velocity: Vec2,
    /// 0 to 100, grows while `passed` grows
    pub progress: f64,
    /// Milliseconds since round start, latched the tick progress first hits 100
    pub finish_time_ms: Option<u64>,
    pub input: Input,
    /// One bit per center-line sample, set once the car has been near it
    pub passed: BitVec,
    pub contacts: ContactSet,
}

impl Player {
    /// Create a player at `start`, facing `next`
    pub fn new(id: PlayerId, start: Vec2, next: Vec2, sample_count: usize) -> Self {
        let mut player = Self {
            id,
            name: PLACEHOLDER_NAME.to_string(),
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            progress: 0.0,
            finish_time_ms: None,
            input: Input::default(),
            passed: BitVec::new(),
            contacts: ContactSet::new(),
        };
        player.reset(start, next, sample_count);
        player
    }

    /// Put the car back on the start line for a new round
    pub fn reset(&mut self, start: Vec2, next: Vec2, sample_count: usize) {
        self.position = start;
        self.rotation = Vec2::between(start, next).angle();
        self.velocity = Vec2::ZERO;
        self.progress = 0.0;
        self.finish_time_ms = None;
        self.passed = BitVec::repeat(false, sample_count);
        self.contacts.clear();
    }

    /// Unit vector along the current heading
    pub fn heading(&self) -> Vec2 {
        Vec2::from_angle(self.rotation)
    }

    /// No track sample within range means the car is on sand
    pub fn is_off_track(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn has_finished(&self) -> bool {
        self.finish_time_ms.is_some()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot::from_player(self)
    }
}

/// Point-in-time copy of a player, safe to hand to other tasks and serialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub progress: f64,
    pub finish_time_ms: Option<u64>,
}

impl PlayerSnapshot {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            x: player.position.x,
            y: player.position.y,
            rotation: player.rotation,
            progress: player.progress,
            finish_time_ms: player.finish_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_new() {
        let player = Player::new(3, Vec2::new(10.0, 10.0), Vec2::new(10.0, 20.0), 50);
        assert_eq!(player.id, 3);
        assert_eq!(player.name, PLACEHOLDER_NAME);
        assert_eq!(player.position, Vec2::new(10.0, 10.0));
        assert_eq!(player.rotation, 90.0);
        assert_eq!(player.passed.len(), 50);
        assert!(player.passed.not_any());
        assert!(player.is_off_track());
    }

    #[test]
    fn test_player_reset() {
        let mut player = Player::new(0, Vec2::ZERO, Vec2::RIGHT, 10);
        player.progress = 42.0;
        player.finish_time_ms = Some(1234);
        player.velocity = Vec2::new(3.0, 4.0);
        player.passed.set(4, true);
        player.contacts.push(4);

        player.reset(Vec2::new(5.0, 5.0), Vec2::new(0.0, 5.0), 20);

        assert_eq!(player.progress, 0.0);
        assert_eq!(player.finish_time_ms, None);
        assert_eq!(player.velocity, Vec2::ZERO);
        assert_eq!(player.passed.len(), 20);
        assert!(player.passed.not_any());
        assert!(player.contacts.is_empty());
        assert_eq!(player.rotation, 180.0);
    }

    #[test]
    fn test_phase_cycle() {
        let mut phase = MatchPhase::default();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(phase);
            phase = phase.next();
        }
        assert_eq!(
            seen,
            vec![
                MatchPhase::Starting,
                MatchPhase::Countdown,
                MatchPhase::Race,
                MatchPhase::Closing,
                MatchPhase::Finished,
                MatchPhase::Starting,
            ]
        );
    }

    #[test]
    fn test_driving_phases() {
        assert!(!MatchPhase::Starting.is_driving());
        assert!(!MatchPhase::Countdown.is_driving());
        assert!(MatchPhase::Race.is_driving());
        assert!(MatchPhase::Closing.is_driving());
        assert!(!MatchPhase::Finished.is_driving());
    }

    #[test]
    fn test_countdown_phase() {
        assert_eq!(CountdownKind::Countdown.phase(), MatchPhase::Countdown);
        assert_eq!(CountdownKind::Closedown.phase(), MatchPhase::Closing);
        assert_eq!(CountdownKind::Rest.phase(), MatchPhase::Finished);
    }

    #[test]
    fn test_snapshot() {
        let mut player = Player::new(7, Vec2::new(1.0, 2.0), Vec2::new(2.0, 2.0), 5);
        player.name = "Ayrton".to_string();
        let snapshot = player.snapshot();
        assert_eq!(snapshot.id, 7);
        assert_eq!(snapshot.name, "Ayrton");
        assert_eq!(snapshot.x, 1.0);
        assert_eq!(snapshot.y, 2.0);
        assert_eq!(snapshot.rotation, 0.0);
    }
}
