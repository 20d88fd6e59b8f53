//! Round standings
//!
//! Finishers first by finish time, then everyone else by progress.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::game::state::{Player, PlayerId};

/// One line of the bestlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: u32,
    pub id: PlayerId,
    pub name: String,
    /// Milliseconds since the round started, `None` if the player never finished
    pub finish_time_ms: Option<u64>,
    pub progress: f64,
}

impl Standing {
    pub fn has_finished(&self) -> bool {
        self.finish_time_ms.is_some()
    }
}

/// Rank the given players
pub fn compute_standings<'a, I>(players: I) -> Vec<Standing>
where
    I: IntoIterator<Item = &'a Player>,
{
    let mut standings: Vec<Standing> = players
        .into_iter()
        .map(|p| Standing {
            rank: 0,
            id: p.id,
            name: p.name.clone(),
            finish_time_ms: p.finish_time_ms,
            progress: p.progress,
        })
        .collect();

    standings.sort_by(compare);

    for (i, standing) in standings.iter_mut().enumerate() {
        standing.rank = (i + 1) as u32;
    }

    standings
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    match (a.finish_time_ms, b.finish_time_ms) {
        (Some(ta), Some(tb)) => ta.cmp(&tb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b
            .progress
            .partial_cmp(&a.progress)
            .unwrap_or(Ordering::Equal),
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// The winner, if anyone crossed the line
pub fn winner(standings: &[Standing]) -> Option<&Standing> {
    standings.first().filter(|s| s.has_finished())
}
