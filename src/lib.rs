pub mod api;
pub mod bank;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod matchmaker;
pub mod protocol;
pub mod scoring;
pub mod session;
pub mod state;
pub mod types;
pub mod ws;
