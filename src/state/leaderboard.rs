use super::AppState;
use crate::leaderboard::{rank, Metric, ParticipantSnapshot, RankingEntry};
use crate::types::*;
use std::collections::{BTreeMap, HashSet};

#[derive(Default)]
struct Tally<'a> {
    display_name: &'a str,
    total_score: u32,
    words: HashSet<&'a str>,
    battles_played: u32,
    battles_won: u32,
}

impl AppState {
    /// Fold the result log into one snapshot per human participant,
    /// ordered by participant id
    pub async fn participant_stats(&self) -> Vec<ParticipantSnapshot> {
        let results = self.results.read().await;
        let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();

        for result in results.iter() {
            let finished_battle =
                result.kind == SessionKind::Battle && result.status == ResultStatus::Finished;

            for participant in &result.participants {
                if result.is_simulated(&participant.id) {
                    continue;
                }
                let tally = tallies.entry(participant.id.as_str()).or_default();
                tally.display_name = participant.display_name.as_str();
                tally.total_score = tally.total_score.saturating_add(participant.score);
                tally.words.extend(
                    result
                        .correct_question_ids(&participant.id)
                        .into_iter()
                        .map(String::as_str),
                );
                if finished_battle {
                    tally.battles_played += 1;
                    if result.outcome_for(&participant.id) == Some(BattleOutcome::Win) {
                        tally.battles_won += 1;
                    }
                }
            }
        }

        tallies
            .into_iter()
            .map(|(id, tally)| ParticipantSnapshot {
                participant_id: id.to_string(),
                display_name: tally.display_name.to_string(),
                total_score: tally.total_score,
                words_learned: tally.words.len() as u32,
                battles_played: tally.battles_played,
                battles_won: tally.battles_won,
                win_rate: if tally.battles_played == 0 {
                    0.0
                } else {
                    f64::from(tally.battles_won) / f64::from(tally.battles_played)
                },
            })
            .collect()
    }

    pub async fn leaderboard(&self, metric: Metric) -> Vec<RankingEntry> {
        rank(&self.participant_stats().await, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::collections::BTreeMap;

    fn result(
        kind: SessionKind,
        status: ResultStatus,
        seats: &[(&str, u32, Vec<bool>, Option<BattleOutcome>)],
        simulated: &[&str],
    ) -> SessionResult {
        let total = seats.first().map(|s| s.2.len()).unwrap_or(0);
        SessionResult {
            session_id: ulid::Ulid::new().to_string(),
            kind,
            status,
            participants: seats
                .iter()
                .map(|(id, score, _, _)| Participant {
                    id: id.to_string(),
                    display_name: id.to_uppercase(),
                    score: *score,
                })
                .collect(),
            question_ids: (0..total).map(|i| format!("q{}", i)).collect(),
            per_question_correctness: seats
                .iter()
                .map(|(id, _, answers, _)| (id.to_string(), answers.clone()))
                .collect(),
            outcomes: seats
                .iter()
                .filter_map(|(id, _, _, outcome)| outcome.map(|o| (id.to_string(), o)))
                .collect::<BTreeMap<_, _>>(),
            simulated: simulated.iter().map(|s| s.to_string()).collect(),
            total_questions: total,
            completed_at: chrono::Utc::now().to_rfc3339(),
            completed_at_tick: 0,
        }
    }

    #[tokio::test]
    async fn test_participant_stats() {
        let state = state();
        {
            let mut log = state.results.write().await;
            log.push(result(
                SessionKind::Assessment,
                ResultStatus::Finished,
                &[("alice", 10, vec![true, false], None)],
                &[],
            ));
            log.push(result(
                SessionKind::Battle,
                ResultStatus::Finished,
                &[
                    ("alice", 20, vec![true, true], Some(BattleOutcome::Win)),
                    ("bob", 10, vec![false, true], Some(BattleOutcome::Loss)),
                ],
                &[],
            ));
            log.push(result(
                SessionKind::Battle,
                ResultStatus::Finished,
                &[
                    ("bob", 10, vec![true], Some(BattleOutcome::Draw)),
                    ("bot-1", 10, vec![true], Some(BattleOutcome::Draw)),
                ],
                &["bot-1"],
            ));
            // Abandoned battles only count towards score
            log.push(result(
                SessionKind::Battle,
                ResultStatus::Abandoned,
                &[("carol", 10, vec![true], None)],
                &[],
            ));
        }

        let stats = state.participant_stats().await;
        let ids: Vec<_> = stats.iter().map(|s| s.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);

        let alice = &stats[0];
        assert_eq!(alice.total_score, 30);
        // q0 twice, q1 once
        assert_eq!(alice.words_learned, 2);
        assert_eq!(alice.battles_played, 1);
        assert_eq!(alice.battles_won, 1);
        assert_eq!(alice.win_rate, 1.0);

        let bob = &stats[1];
        assert_eq!(bob.total_score, 20);
        assert_eq!(bob.battles_played, 2);
        assert_eq!(bob.battles_won, 0);
        assert_eq!(bob.win_rate, 0.0);

        let carol = &stats[2];
        assert_eq!(carol.total_score, 10);
        assert_eq!(carol.battles_played, 0);
        assert_eq!(carol.win_rate, 0.0);

        let board = state.leaderboard(Metric::TotalScore).await;
        assert_eq!(board[0].participant_id, "alice");
        assert_eq!(board[1].participant_id, "bob");
        assert_eq!(board[2].rank, 3);
    }

    #[tokio::test]
    async fn test_empty_leaderboard() {
        let state = state();
        assert!(state.leaderboard(Metric::WinRate).await.is_empty());
    }
}
