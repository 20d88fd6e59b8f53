//! The single live race
//!
//! `Session` owns the player registry, the current track and the phase
//! machine. It is synchronous: the engine wraps it in a lock and is the only
//! caller of [`Session::tick`] and [`Session::on_countdown_tick`], so every
//! phase change happens on one logical thread of control.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::config::{ConfigError, GameConfig, VehicleConfig};
use crate::events::{Event, EventBus, Subscription};
use crate::game::constants::net::MAX_NAME_LENGTH;
use crate::game::constants::progress::FINISH;
use crate::game::physics;
use crate::game::standings::{compute_standings, winner, Standing};
use crate::game::state::{CountdownKind, Input, MatchPhase, Player, PlayerId, PlayerSnapshot};
use crate::game::track::{Track, TrackError};

/// Recoverable failures of registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
}

/// A countdown the engine has to drive: `start` ticks, `interval` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub kind: CountdownKind,
    pub round: u64,
    pub start: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ActiveCountdown {
    kind: CountdownKind,
    remaining: u32,
}

pub struct Session {
    config: GameConfig,
    players: HashMap<PlayerId, Player>,
    track: Arc<Track>,
    phase: MatchPhase,
    /// Bumped at every round start and whenever the session empties, so late
    /// countdown ticks from an abandoned round can be told apart
    round: u64,
    countdown: Option<ActiveCountdown>,
    round_start: Option<Instant>,
    events: Arc<EventBus>,
    ticks: u64,
}

impl Session {
    /// Create a session with a freshly generated track
    pub fn new(config: GameConfig, events: Arc<EventBus>) -> Result<Self, TrackError> {
        let track = Track::generate(&config.track)?;
        Ok(Self::with_track(config, events, track))
    }

    /// Create a session around an existing track
    pub fn with_track(config: GameConfig, events: Arc<EventBus>, track: Track) -> Self {
        Self {
            config,
            players: HashMap::new(),
            track: Arc::new(track),
            phase: MatchPhase::Starting,
            round: 0,
            countdown: None,
            round_start: None,
            events,
            ticks: 0,
        }
    }

    /// Register a player under the lowest free id and give it a mailbox
    pub fn connect(&mut self) -> (PlayerId, Subscription) {
        let id = (0..)
            .find(|id| !self.players.contains_key(id))
            .unwrap_or(PlayerId::MAX);

        let (start, next) = self.track.start();
        let player = Player::new(id, start, next, self.track.sample_count());
        self.players.insert(id, player);

        let subscription = self.events.subscribe();
        info!("Player {} connected ({} online)", id, self.players.len());
        (id, subscription)
    }

    /// Remove a player, release its mailbox and tell everyone else
    pub fn disconnect(&mut self, id: PlayerId, subscription: Subscription) {
        self.events.unsubscribe(subscription);
        self.remove_player(id);
    }

    /// Remove a player whose mailbox is already gone
    pub fn remove_player(&mut self, id: PlayerId) {
        if self.players.remove(&id).is_none() {
            debug!("Disconnect for unknown player {}", id);
            return;
        }
        self.events.publish(Event::Leave(id));
        info!("Player {} disconnected ({} online)", id, self.players.len());

        if self.players.is_empty() {
            self.phase = MatchPhase::Starting;
            self.countdown = None;
            self.round_start = None;
            self.round += 1;
            info!("Session empty, waiting for players");
        }
    }

    pub fn set_input(&mut self, id: PlayerId, input: Input) -> Result<(), SessionError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        player.input = input;
        Ok(())
    }

    fn rename(&mut self, id: PlayerId, name: &str) -> Result<PlayerSnapshot, SessionError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;

        let name: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
        if !name.is_empty() {
            info!("Player {} is now '{}'", id, name);
            player.name = name;
        }
        Ok(player.snapshot())
    }

    /// Set the display name and announce the player
    pub fn set_name(&mut self, id: PlayerId, name: &str) -> Result<PlayerSnapshot, SessionError> {
        let snapshot = self.rename(id, name)?;
        self.events.publish(Event::Join(snapshot.clone()));
        Ok(snapshot)
    }

    /// Complete a client's registration and return its INIT event.
    ///
    /// Anything the mailbox collected before the greeting is older than INIT and is
    /// discarded. The JOIN is published afterwards, so it is the first event the
    /// mailbox yields once INIT has been written.
    pub fn greet(
        &mut self,
        id: PlayerId,
        name: &str,
        mailbox: &mut Subscription,
    ) -> Result<Event, SessionError> {
        let snapshot = self.rename(id, name)?;

        let stale = mailbox.drain().len();
        if stale > 0 {
            debug!("Player {} greeted, {} queued event(s) discarded", id, stale);
        }

        let init = self.init_event(id)?;
        self.events.publish(Event::Join(snapshot));
        Ok(init)
    }

    /// Everything a freshly greeted client needs to draw the race
    pub fn init_event(&self, id: PlayerId) -> Result<Event, SessionError> {
        if !self.players.contains_key(&id) {
            return Err(SessionError::UnknownPlayer(id));
        }
        Ok(Event::Init {
            players: self.players(),
            id,
            track: self.track(),
        })
    }

    /// Point-in-time copy of all players, in no particular order
    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.players.values().map(Player::snapshot).collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn track(&self) -> Arc<Track> {
        Arc::clone(&self.track)
    }

    pub fn bestlist(&self) -> Vec<Standing> {
        compute_standings(self.players.values())
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Kind and remaining count of the running countdown
    pub fn countdown(&self) -> Option<(CountdownKind, u32)> {
        self.countdown.map(|c| (c.kind, c.remaining))
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Regenerate the track right away and put everyone back on the start line
    pub fn change_track(&mut self) -> Result<(), TrackError> {
        let track = Track::generate(&self.config.track)?;
        self.install_track(track);
        Ok(())
    }

    /// Replace the vehicle tunables, effective from the next tick
    pub fn reconfigure_vehicle(&mut self, vehicle: VehicleConfig) -> Result<(), ConfigError> {
        vehicle.validate()?;
        self.config.vehicle = vehicle;
        info!("Vehicle reconfigured: {:?}", vehicle);
        Ok(())
    }

    fn install_track(&mut self, track: Track) {
        self.track = Arc::new(track);
        self.reset_players();
        self.events.publish(Event::Track(self.track()));
    }

    fn reset_players(&mut self) {
        let (start, next) = self.track.start();
        let samples = self.track.sample_count();
        for player in self.players.values_mut() {
            player.reset(start, next, samples);
        }
    }

    /// One simulation step. Returns a countdown the caller has to start.
    pub fn tick(&mut self, now: Instant) -> Option<Countdown> {
        if self.players.is_empty() {
            return None;
        }
        self.ticks += 1;

        let mut started = None;
        if self.phase == MatchPhase::Starting {
            started = Some(self.start_round());
        }

        if self.phase.is_driving() {
            if let Some(countdown) = self.step_players(now) {
                started = Some(countdown);
            }
        }

        if self.phase == MatchPhase::Finished {
            self.events.publish(Event::Bestlist(self.bestlist()));
        } else {
            self.events.publish(Event::Update(self.players()));
        }

        started
    }

    fn start_round(&mut self) -> Countdown {
        match Track::generate(&self.config.track) {
            Ok(track) => self.install_track(track),
            Err(e) => {
                error!("Track generation failed, keeping the current track: {}", e);
                self.reset_players();
            }
        }

        self.round += 1;
        self.round_start = None;
        self.phase = MatchPhase::Countdown;
        info!("Round {} starting with {} player(s)", self.round, self.players.len());
        self.begin_countdown(CountdownKind::Countdown)
    }

    fn begin_countdown(&mut self, kind: CountdownKind) -> Countdown {
        let timing = &self.config.timing;
        let (start, interval) = match kind {
            CountdownKind::Countdown => (timing.countdown_start, timing.countdown_interval()),
            CountdownKind::Closedown => (timing.closedown_start, timing.countdown_interval()),
            CountdownKind::Rest => (timing.rest_start, timing.rest_interval()),
        };
        self.countdown = Some(ActiveCountdown {
            kind,
            remaining: start,
        });
        Countdown {
            kind,
            round: self.round,
            start,
            interval,
        }
    }

    /// Integrate every car, latch finish times and detect the first finisher
    fn step_players(&mut self, now: Instant) -> Option<Countdown> {
        let elapsed_ms = self
            .round_start
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0);
        let track = self.track.as_ref();
        let vehicle = &self.config.vehicle;
        let progress = &self.config.progress;

        self.players.par_values_mut().for_each(|player| {
            physics::update(player, track, vehicle, progress);
            if player.progress >= FINISH && player.finish_time_ms.is_none() {
                player.finish_time_ms = Some(elapsed_ms);
            }
        });

        if self.phase == MatchPhase::Race && self.players.values().any(Player::has_finished) {
            self.phase = self.phase.next();
            info!("Round {}: first finisher after {} ms", self.round, elapsed_ms);
            return Some(self.begin_countdown(CountdownKind::Closedown));
        }
        None
    }

    /// Apply one decrement of a running countdown. Ticks from another round or
    /// for a countdown that is no longer running are ignored.
    pub fn on_countdown_tick(
        &mut self,
        kind: CountdownKind,
        round: u64,
        now: Instant,
    ) -> Option<Countdown> {
        if round != self.round {
            debug!("Stale {:?} tick from round {} ignored", kind, round);
            return None;
        }
        let phase = self.phase;
        let active = match self.countdown.as_mut() {
            Some(active) if active.kind == kind && kind.phase() == phase => active,
            _ => return None,
        };

        active.remaining = active.remaining.saturating_sub(1);
        let remaining = active.remaining;

        self.events.publish(match kind {
            CountdownKind::Countdown => Event::Countdown(remaining),
            CountdownKind::Closedown => Event::Closedown(remaining),
            CountdownKind::Rest => Event::Rest(remaining),
        });

        if remaining > 0 {
            return None;
        }
        self.countdown = None;
        self.phase = phase.next();

        match kind {
            CountdownKind::Countdown => {
                self.round_start = Some(now);
                info!("Round {}: race on", self.round);
                None
            }
            CountdownKind::Closedown => {
                let standings = self.bestlist();
                match winner(&standings) {
                    Some(best) => info!(
                        "Round {} finished, won by '{}' in {} ms",
                        self.round,
                        best.name,
                        best.finish_time_ms.unwrap_or_default()
                    ),
                    None => info!("Round {} finished", self.round),
                }
                Some(self.begin_countdown(CountdownKind::Rest))
            }
            CountdownKind::Rest => None,
        }
    }
}
