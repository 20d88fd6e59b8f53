/// Clock constants for the simulation and the three round countdowns
pub mod timing {
    /// Simulation tick interval in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 30;
    /// Interval between COUNTDOWN and CLOSEDOWN decrements
    pub const COUNTDOWN_INTERVAL_MS: u64 = 100;
    /// Interval between REST decrements
    pub const REST_INTERVAL_MS: u64 = 1000;
    /// Start value of the pre-race countdown (3 s at 100 ms)
    pub const COUNTDOWN_START: u32 = 30;
    /// Start value of the closedown after the first finisher (10 s at 100 ms)
    pub const CLOSEDOWN_START: u32 = 100;
    /// Start value of the rest period between rounds (10 s at 1 s)
    pub const REST_START: u32 = 10;
}

/// Procedural track generation constants
pub mod track {
    /// Number of random seed points (has to be >= 3)
    pub const POINT_COUNT: usize = 40;
    /// Canvas width the seed points are scattered over
    pub const MAX_WIDTH: f64 = 8000.0;
    /// Canvas height the seed points are scattered over
    pub const MAX_HEIGHT: f64 = 6000.0;
    /// Minimum distance between hull points after relaxation
    pub const MIN_DISTANCE: f64 = 1500.0;
    /// Number of spacing relaxation passes
    pub const SPACING_PASSES: usize = 3;
    /// Number of corner sharpening passes
    pub const SHARPEN_PASSES: usize = 1;
    /// Exponent applied to the random displacement magnitude
    pub const DIFFICULTY: f64 = 1.0;
    /// Maximum displacement of an inserted midpoint
    pub const MAX_DISPLACEMENT: f64 = 800.0;
    /// Spline parameter step when resampling the center line
    pub const SPLINE_STEP: f64 = 0.005;
    /// Distance from the center line to each boundary
    pub const TRACK_WIDTH: f64 = 400.0;
    /// Slack when deciding whether a boundary point crowds the center line
    pub const INTERFERENCE_TOLERANCE: f64 = 2.0;
    /// Attempts before giving up on a seed set
    pub const MAX_ATTEMPTS: usize = 32;
}

/// Vehicle dynamics constants (per tick, not per second)
pub mod vehicle {
    /// Front wheel steering angle in degrees
    pub const TURN_RATE: f64 = 4.0;
    /// Distance from front to rear wheel
    pub const WHEELBASE: f64 = 40.0;
    /// Acceleration along the heading while accelerating
    pub const ENGINE_POWER: f64 = 7.0;
    /// Acceleration along the heading while braking (negative)
    pub const BRAKE_POWER: f64 = -2.0;
    /// Friction coefficient on asphalt
    pub const ON_TRACK_FRICTION: f64 = -0.06;
    /// Friction coefficient on sand
    pub const OFF_TRACK_FRICTION: f64 = -0.3;
    /// Wind resistance, scaled by speed
    pub const DRAG: f64 = -0.0015;
    /// Blend between old and new heading (1 = on rails)
    pub const TRACTION: f64 = 0.00001;
}

/// Progress tracking constants
pub mod progress {
    /// Consecutive unpassed samples tolerated before the scan stops
    pub const MAX_SKIP: usize = 30;
    /// Radius within which a track sample counts as contacted
    pub const CONTACT_RADIUS: f64 = super::track::TRACK_WIDTH;
    /// Progress value that finishes a round
    pub const FINISH: f64 = 100.0;
}

/// Networking constants
pub mod net {
    /// Default TCP port for client connections
    pub const PORT: u16 = 7999;
    /// Default port of the metrics endpoint
    pub const METRICS_PORT: u16 = 9090;
    /// Events buffered per subscriber before new ones are dropped
    pub const MAILBOX_CAPACITY: usize = 5;
    /// Maximum framed message size
    pub const MAX_MESSAGE_SIZE: usize = 1 << 20;
    /// Longest display name accepted from a client
    pub const MAX_NAME_LENGTH: usize = 24;
    /// Name shown until the client says hello
    pub const PLACEHOLDER_NAME: &str = "<Loading>";
}
