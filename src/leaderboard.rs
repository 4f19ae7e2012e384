//! Leaderboard ranking
//!
//! Rankings are derived from participant snapshots on demand and never
//! stored.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::ParticipantId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    TotalScore,
    WordsLearned,
    WinRate,
}

/// Aggregated standing of one participant across completed sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantSnapshot {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub total_score: u32,
    pub words_learned: u32,
    pub battles_played: u32,
    pub battles_won: u32,
    /// Battles won / battles played, 0 with no battles
    pub win_rate: f64,
}

impl ParticipantSnapshot {
    pub fn metric_value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalScore => f64::from(self.total_score),
            Metric::WordsLearned => f64::from(self.words_learned),
            Metric::WinRate => self.win_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub metric_value: f64,
    /// 1-based, no gaps, no shared ranks
    pub rank: u32,
}

/// Order snapshots by `metric` descending, ties by ascending participant id.
/// NaN sorts last.
pub fn rank(entries: &[ParticipantSnapshot], metric: Metric) -> Vec<RankingEntry> {
    let mut ordered: Vec<(&ParticipantSnapshot, f64)> = entries
        .iter()
        .map(|e| (e, e.metric_value(metric)))
        .collect();

    ordered.sort_by(|(a, av), (b, bv)| {
        compare_desc(*av, *bv).then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (entry, value))| RankingEntry {
            participant_id: entry.participant_id.clone(),
            display_name: entry.display_name.clone(),
            metric_value: value,
            rank: i as u32 + 1,
        })
        .collect()
}

fn compare_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // -0.0 and 0.0 compare equal so the id tie-break decides
        (false, false) if a == b => Ordering::Equal,
        (false, false) => b.total_cmp(&a),
    }
}
