//! Async driver around the session
//!
//! One run loop owns every phase change. Countdown timers are plain tasks that
//! only send [`CountdownTick`] messages into that loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GameConfig, VehicleConfig};
use crate::events::{Event, EventBus, Subscription};
use crate::game::session::{Countdown, Session, SessionError};
use crate::game::standings::Standing;
use crate::game::state::{CountdownKind, Input, MatchPhase, PlayerId, PlayerSnapshot};
use crate::game::track::{Track, TrackError};
use crate::metrics::Metrics;

/// Stats are logged this often
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// One decrement of a running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub kind: CountdownKind,
    pub round: u64,
}

/// Shared handle used by connections and by the run loop
pub struct GameEngine {
    session: Mutex<Session>,
    events: Arc<EventBus>,
    metrics: Arc<Metrics>,
    tick_interval: Duration,
    countdown_tx: mpsc::UnboundedSender<CountdownTick>,
    countdown_rx: Mutex<Option<mpsc::UnboundedReceiver<CountdownTick>>>,
}

impl GameEngine {
    pub fn new(
        config: GameConfig,
        events: Arc<EventBus>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>, TrackError> {
        let session = Session::new(config, Arc::clone(&events))?;
        Ok(Self::with_session(session, metrics))
    }

    pub fn with_session(session: Session, metrics: Arc<Metrics>) -> Arc<Self> {
        let events = Arc::clone(session.events());
        let tick_interval = session.config().timing.tick_interval();
        let (countdown_tx, countdown_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            session: Mutex::new(session),
            events,
            metrics,
            tick_interval,
            countdown_tx,
            countdown_rx: Mutex::new(Some(countdown_rx)),
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn connect(&self) -> (PlayerId, Subscription) {
        let connected = self.session.lock().connect();
        self.metrics
            .connections_total
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        connected
    }

    pub fn disconnect(&self, id: PlayerId, subscription: Subscription) {
        self.session.lock().disconnect(id, subscription);
    }

    pub fn remove_player(&self, id: PlayerId) {
        self.session.lock().remove_player(id);
    }

    pub fn set_input(&self, id: PlayerId, input: Input) -> Result<(), SessionError> {
        self.session.lock().set_input(id, input)
    }

    pub fn set_name(&self, id: PlayerId, name: &str) -> Result<PlayerSnapshot, SessionError> {
        self.session.lock().set_name(id, name)
    }

    /// Complete a client's registration. See [`Session::greet`].
    pub fn hello(
        &self,
        id: PlayerId,
        name: &str,
        mailbox: &mut Subscription,
    ) -> Result<Event, SessionError> {
        self.session.lock().greet(id, name, mailbox)
    }

    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.session.lock().players()
    }

    pub fn track(&self) -> Arc<Track> {
        self.session.lock().track()
    }

    pub fn bestlist(&self) -> Vec<Standing> {
        self.session.lock().bestlist()
    }

    pub fn phase(&self) -> MatchPhase {
        self.session.lock().phase()
    }

    pub fn round(&self) -> u64 {
        self.session.lock().round()
    }

    /// Debug override: swap in a new track immediately
    pub fn change_track(&self) -> Result<(), TrackError> {
        self.session.lock().change_track()
    }

    pub fn reconfigure_vehicle(&self, vehicle: VehicleConfig) -> Result<(), ConfigError> {
        self.session.lock().reconfigure_vehicle(vehicle)
    }

    /// Spawn the run loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run().await })
    }

    /// Drive the session forever. Only the first call runs; later calls return
    /// immediately.
    pub async fn run(self: Arc<Self>) {
        let Some(mut countdowns) = self.countdown_rx.lock().take() else {
            warn!("Game loop already running");
            return;
        };

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ticks_per_stats = (STATS_INTERVAL.as_millis() / self.tick_interval.as_millis().max(1)) as u64;
        let started = Instant::now();
        let mut loop_ticks: u64 = 0;

        info!("Game loop started, tick every {:?}", self.tick_interval);

        loop {
            // A due countdown tick always lands before a physics tick due at the same time
            tokio::select! {
                biased;

                Some(tick) = countdowns.recv() => {
                    let next = self
                        .session
                        .lock()
                        .on_countdown_tick(tick.kind, tick.round, Instant::now().into_std());
                    if let Some(countdown) = next {
                        self.spawn_countdown(countdown);
                    }
                    self.record();
                }
                _ = ticker.tick() => {
                    let tick_start = std::time::Instant::now();
                    let next = self.session.lock().tick(Instant::now().into_std());
                    if let Some(countdown) = next {
                        self.spawn_countdown(countdown);
                    }
                    self.metrics.record_tick_time(tick_start.elapsed());
                    self.record();

                    loop_ticks += 1;
                    if ticks_per_stats > 0 && loop_ticks % ticks_per_stats == 0 {
                        self.log_stats(started.elapsed());
                    }
                }
            }
        }
    }

    /// Send `start` ticks into the run loop, then stop
    fn spawn_countdown(&self, countdown: Countdown) {
        debug!(
            "Countdown {:?} for round {}: {} x {:?}",
            countdown.kind, countdown.round, countdown.start, countdown.interval
        );
        let tx = self.countdown_tx.clone();
        let tick = CountdownTick {
            kind: countdown.kind,
            round: countdown.round,
        };

        tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + countdown.interval, countdown.interval);
            for _ in 0..countdown.start {
                timer.tick().await;
                if tx.send(tick).is_err() {
                    break;
                }
            }
        });
    }

    fn record(&self) {
        {
            let session = self.session.lock();
            self.metrics
                .record_session(session.phase(), session.round(), session.player_count());
        }
        self.metrics.record_bus(&self.events);
    }

    fn log_stats(&self, elapsed: Duration) {
        let session = self.session.lock();
        info!(
            "Race: {}s, round {}, {:?}, {} players, {} ticks | Events: {} published, {} dropped",
            elapsed.as_secs(),
            session.round(),
            session.phase(),
            session.player_count(),
            session.ticks(),
            self.events.published_count(),
            self.events.dropped_count()
        );
    }
}
