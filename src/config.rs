//! Engine and server configuration
//!
//! Every option has a default and can be overridden through environment
//! variables (a `.env` file is loaded by `main` before these are read).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::scoring::DEFAULT_POINTS_PER_CORRECT_ANSWER;

pub const DEFAULT_ASSESSMENT_TIMEOUT_TICKS: u32 = 30;
pub const DEFAULT_BATTLE_TIMEOUT_TICKS: u32 = 10;
pub const DEFAULT_SIMULATED_CORRECT_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown per question in a solo quiz
    pub assessment_timeout_ticks: u32,
    /// Countdown per question in a battle
    pub battle_timeout_ticks: u32,
    pub points_per_correct_answer: u32,
    pub simulated_opponent_correct_probability: f64,
    /// How long a battle may stay in `Matching`
    pub matchmaking_timeout_ticks: u32,
    /// Fall back to a simulated opponent when nobody else is waiting
    pub allow_simulated_opponents: bool,
    /// Wall-clock length of one tick
    pub tick_interval: Duration,
    pub assessment_question_count: usize,
    pub battle_question_count: usize,
    /// Fixed seed for question shuffling and simulated opponents
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assessment_timeout_ticks: DEFAULT_ASSESSMENT_TIMEOUT_TICKS,
            battle_timeout_ticks: DEFAULT_BATTLE_TIMEOUT_TICKS,
            points_per_correct_answer: DEFAULT_POINTS_PER_CORRECT_ANSWER,
            simulated_opponent_correct_probability: DEFAULT_SIMULATED_CORRECT_PROBABILITY,
            matchmaking_timeout_ticks: DEFAULT_BATTLE_TIMEOUT_TICKS * 3,
            allow_simulated_opponents: true,
            tick_interval: Duration::from_secs(1),
            assessment_question_count: 10,
            battle_question_count: 5,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let battle_timeout_ticks =
            env_ticks("BATTLE_TIMEOUT_TICKS").unwrap_or(defaults.battle_timeout_ticks);

        let simulated_opponent_correct_probability =
            match env_parse::<f64>("SIMULATED_OPPONENT_CORRECT_PROBABILITY") {
                Some(p) if (0.0..=1.0).contains(&p) => p,
                Some(p) => {
                    tracing::warn!(
                        "SIMULATED_OPPONENT_CORRECT_PROBABILITY={} is outside [0, 1], using {}",
                        p,
                        defaults.simulated_opponent_correct_probability
                    );
                    defaults.simulated_opponent_correct_probability
                }
                None => defaults.simulated_opponent_correct_probability,
            };

        let tick_interval = env_parse::<u64>("TICK_MILLIS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        Self {
            assessment_timeout_ticks: env_ticks("QUIZ_TIMEOUT_TICKS")
                .unwrap_or(defaults.assessment_timeout_ticks),
            battle_timeout_ticks,
            points_per_correct_answer: env_parse("POINTS_PER_CORRECT_ANSWER")
                .unwrap_or(defaults.points_per_correct_answer),
            simulated_opponent_correct_probability,
            // Follows a custom battle timeout unless set explicitly
            matchmaking_timeout_ticks: env_ticks("MATCHMAKING_TIMEOUT_TICKS")
                .unwrap_or(battle_timeout_ticks.saturating_mul(3)),
            allow_simulated_opponents: std::env::var("ALLOW_SIMULATED_OPPONENTS")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(defaults.allow_simulated_opponents),
            tick_interval,
            assessment_question_count: env_parse::<usize>("QUIZ_QUESTION_COUNT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.assessment_question_count),
            battle_question_count: env_parse::<usize>("BATTLE_QUESTION_COUNT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.battle_question_count),
            seed: env_parse("ENGINE_SEED"),
        }
    }

    /// Wall-clock duration of the matchmaking deadline
    pub fn matchmaking_timeout(&self) -> Duration {
        self.tick_interval
            .saturating_mul(self.matchmaking_timeout_ticks)
    }
}

/// Network and data file settings for the binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub words_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // 6573 is ascii for "AI"
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6573)),
            words_file: "demo/words.json".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("BIND_ADDR").unwrap_or(defaults.bind_addr),
            words_file: std::env::var("WORDS_FILE").unwrap_or(defaults.words_file),
        }
    }
}

/// Parse an env var, warning when it is set but malformed
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

/// Tick counts must be at least 1
fn env_ticks(key: &str) -> Option<u32> {
    match env_parse::<u32>(key) {
        Some(0) => {
            tracing::warn!("{} must be at least 1 tick, using default", key);
            None
        }
        other => other,
    }
}
