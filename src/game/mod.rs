pub mod constants;
pub mod engine;
pub mod physics;
pub mod session;
pub mod standings;
pub mod state;
pub mod track;
