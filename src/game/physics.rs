//! Per-tick car integrator and track progress
//!
//! Bicycle model after "simple 2D car physics in games": the front and rear
//! wheel are moved separately, the front one along the steered velocity, and the
//! new heading is the axis between them.

use bitvec::slice::BitSlice;

use crate::config::{ProgressConfig, VehicleConfig};
use crate::game::constants::progress::FINISH;
use crate::game::state::{ContactSet, Input, Player};
use crate::game::track::Track;
use crate::util::circle::Circle;
use crate::util::vec2::Vec2;

/// Advance one player by one tick: contact test, integration, progress
pub fn update(player: &mut Player, track: &Track, vehicle: &VehicleConfig, progress: &ProgressConfig) {
    player.contacts = contacts(track, player.position, progress.contact_radius);
    drive(player, vehicle);
    update_progress(player, progress.max_skip);
}

/// Indices of center-line samples within `radius` of `position`
pub fn contacts(track: &Track, position: Vec2, radius: f64) -> ContactSet {
    let range = Circle::new(position, radius);
    track
        .center
        .iter()
        .enumerate()
        .filter(|(_, p)| range.contains(**p))
        .map(|(i, _)| i)
        .collect()
}

/// Steering angle for the front wheel. Left wins when both are pressed.
fn steer_angle(input: &Input, vehicle: &VehicleConfig) -> f64 {
    if input.left {
        -vehicle.turn_rate
    } else if input.right {
        vehicle.turn_rate
    } else {
        0.0
    }
}

/// Engine or brake force along the heading. Brake wins when both are pressed.
fn engine_force(input: &Input, heading: Vec2, vehicle: &VehicleConfig) -> Vec2 {
    if input.down {
        heading * vehicle.brake_power
    } else if input.up {
        heading * vehicle.engine_power
    } else {
        Vec2::ZERO
    }
}

/// Integrate velocity, heading and position from the current input
pub fn drive(player: &mut Player, vehicle: &VehicleConfig) {
    let steer = steer_angle(&player.input, vehicle);
    let heading = player.heading();

    let friction = if player.is_off_track() {
        vehicle.off_track_friction
    } else {
        vehicle.on_track_friction
    };
    let friction_force = player.velocity * friction;
    let drag_force = player.velocity * (player.velocity.length() * vehicle.drag);

    player.velocity += engine_force(&player.input, heading, vehicle) + friction_force + drag_force;

    let half_base = heading * (vehicle.wheelbase / 2.0);
    let rear_wheel = player.position - half_base + player.velocity;
    let front_wheel = player.position + half_base + player.velocity.rotate(steer);

    let speed = player.velocity.length();
    let new_heading = (front_wheel - rear_wheel).normalize() * speed;

    player.velocity = player.velocity.lerp(new_heading, vehicle.traction);

    // No reversing
    if player.velocity.dot(new_heading) < 0.0 {
        player.velocity = Vec2::ZERO;
    }

    if new_heading.length_sq() > 0.0 {
        player.rotation = new_heading.angle();
    }
    player.position += player.velocity;
}

/// Highest passed index reachable from the start without skipping more than
/// `max_skip` samples in a row
pub fn furthest_passed(passed: &BitSlice, max_skip: usize) -> usize {
    let mut furthest = 0;
    let mut skipped = 0;

    for (i, bit) in passed.iter().by_vals().enumerate() {
        if bit {
            furthest = i;
            skipped = 0;
        } else {
            skipped += 1;
            if skipped > max_skip {
                break;
            }
        }
    }

    furthest
}

/// Mark contacted samples as passed and recompute progress
pub fn update_progress(player: &mut Player, max_skip: usize) {
    for &i in &player.contacts {
        if i < player.passed.len() {
            player.passed.set(i, true);
        }
    }

    let last = player.passed.len().saturating_sub(1);
    if last == 0 {
        return;
    }

    let furthest = furthest_passed(&player.passed, max_skip);
    let progress = (furthest as f64 / last as f64 * FINISH).floor().clamp(0.0, FINISH);

    // Guards against a track swap shrinking the passed set mid-round
    if progress > player.progress {
        player.progress = progress;
    }
}
