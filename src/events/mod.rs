//! Events broadcast from the session to every connected client

pub mod bus;

pub use bus::{EventBus, Subscription, SubscriptionId};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::standings::Standing;
use crate::game::state::{PlayerId, PlayerSnapshot};
use crate::game::track::Track;

/// Everything a client can be told. Each variant carries its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Sent once to a client after its hello
    Init {
        players: Vec<PlayerSnapshot>,
        id: PlayerId,
        track: Arc<Track>,
    },
    /// Full player list, every active tick
    Update(Vec<PlayerSnapshot>),
    /// A player finished registering
    Join(PlayerSnapshot),
    /// A player disconnected
    Leave(PlayerId),
    /// A new track was generated
    Track(Arc<Track>),
    /// Remaining pre-race count
    Countdown(u32),
    /// Remaining count after the first finisher
    Closedown(u32),
    /// Sorted standings while the round is finished
    Bestlist(Vec<Standing>),
    /// Remaining count until the next round
    Rest(u32),
}

/// Type tag of an [`Event`], without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Init,
    Update,
    Join,
    Leave,
    Track,
    Countdown,
    Closedown,
    Bestlist,
    Rest,
}

impl EventType {
    /// Short wire name understood by clients
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Init => "init",
            EventType::Update => "update",
            EventType::Join => "join",
            EventType::Leave => "leave",
            EventType::Track => "newtrack",
            EventType::Countdown => "count",
            EventType::Closedown => "close",
            EventType::Bestlist => "best",
            EventType::Rest => "rest",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Init { .. } => EventType::Init,
            Event::Update(_) => EventType::Update,
            Event::Join(_) => EventType::Join,
            Event::Leave(_) => EventType::Leave,
            Event::Track(_) => EventType::Track,
            Event::Countdown(_) => EventType::Countdown,
            Event::Closedown(_) => EventType::Closedown,
            Event::Bestlist(_) => EventType::Bestlist,
            Event::Rest(_) => EventType::Rest,
        }
    }
}
