//! Question bank adapter
//!
//! Sessions never see the word store directly. A [`WordSource`] supplies
//! vocabulary records, [`questions_from_words`] turns them into multiple
//! choice questions, and a [`QuestionBank`] hands out fixed, ordered,
//! duplicate-free question sequences. Banks are read-only after construction
//! and can be shared by any number of sessions.

use async_trait::async_trait;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::types::{Question, Word};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;
pub const DEFAULT_OPTIONS_PER_QUESTION: usize = 4;

/// Normalize text for duplicate comparison (trim whitespace, lowercase)
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub trait QuestionBank: Send + Sync {
    /// Number of distinct questions available
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first `count` questions in bank order
    fn load_questions(&self, count: usize) -> EngineResult<Vec<Arc<Question>>>;

    /// `count` distinct questions in an order determined by `seed`
    fn load_shuffled(&self, count: usize, seed: u64) -> EngineResult<Vec<Arc<Question>>> {
        if count > self.len() {
            return Err(EngineError::InsufficientQuestions {
                requested: count,
                available: self.len(),
            });
        }
        let mut all = self.load_questions(self.len())?;
        let mut rng = StdRng::seed_from_u64(seed);
        all.shuffle(&mut rng);
        all.truncate(count);
        Ok(all)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    questions: Vec<Arc<Question>>,
}

impl InMemoryBank {
    /// Build a bank, rejecting malformed questions and dropping duplicates
    /// (same id, or same prompt after normalization)
    pub fn new(questions: Vec<Question>) -> EngineResult<Self> {
        let mut seen_ids = HashSet::new();
        let mut seen_prompts = HashSet::new();
        let mut kept = Vec::with_capacity(questions.len());

        for question in questions {
            validate_question(&question)?;

            if !seen_ids.insert(question.id.clone())
                || !seen_prompts.insert(normalize(&question.prompt))
            {
                tracing::warn!(
                    "Dropping duplicate question {} ({})",
                    question.id,
                    question.prompt
                );
                continue;
            }
            kept.push(Arc::new(question));
        }

        tracing::info!("Question bank ready with {} questions", kept.len());
        Ok(Self { questions: kept })
    }

    pub fn from_words(words: &[Word], options_per_question: usize, seed: u64) -> EngineResult<Self> {
        Self::new(questions_from_words(words, options_per_question, seed))
    }
}

impl QuestionBank for InMemoryBank {
    fn len(&self) -> usize {
        self.questions.len()
    }

    fn load_questions(&self, count: usize) -> EngineResult<Vec<Arc<Question>>> {
        if count > self.questions.len() {
            return Err(EngineError::InsufficientQuestions {
                requested: count,
                available: self.questions.len(),
            });
        }
        Ok(self.questions[..count].to_vec())
    }
}

fn validate_question(question: &Question) -> EngineResult<()> {
    let count = question.options.len();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
        return Err(EngineError::InvalidQuestion(format!(
            "{} has {} options (expected {}-{})",
            question.id, count, MIN_OPTIONS, MAX_OPTIONS
        )));
    }
    if question.correct_option >= count {
        return Err(EngineError::InvalidQuestion(format!(
            "{} marks option {} correct but has {} options",
            question.id, question.correct_option, count
        )));
    }
    let distinct: HashSet<_> = question.options.iter().map(|o| normalize(o)).collect();
    if distinct.len() != count {
        return Err(EngineError::InvalidQuestion(format!(
            "{} has repeated options",
            question.id
        )));
    }
    Ok(())
}

/// Build "pick the meaning" questions from vocabulary records.
///
/// Distractors are meanings of other words. Words without any usable
/// distractor are skipped.
pub fn questions_from_words(words: &[Word], options_per_question: usize, seed: u64) -> Vec<Question> {
    let options_per_question = options_per_question.clamp(MIN_OPTIONS, MAX_OPTIONS);
    let mut rng = StdRng::seed_from_u64(seed);

    // Distinct meanings, first occurrence wins
    let mut seen = HashSet::new();
    let meanings: Vec<&str> = words
        .iter()
        .map(|w| w.meaning.trim())
        .filter(|m| !m.is_empty() && seen.insert(normalize(m)))
        .collect();

    let mut questions = Vec::with_capacity(words.len());
    for word in words {
        let correct = word.meaning.trim();
        if correct.is_empty() {
            tracing::warn!("Skipping word {} without a meaning", word.id);
            continue;
        }

        let mut distractors: Vec<&str> = meanings
            .iter()
            .copied()
            .filter(|m| normalize(m) != normalize(correct))
            .collect();
        if distractors.is_empty() {
            tracing::warn!("Skipping word {}: no distractors available", word.id);
            continue;
        }
        distractors.shuffle(&mut rng);
        distractors.truncate(options_per_question - 1);

        let mut options: Vec<String> = distractors.into_iter().map(str::to_string).collect();
        options.push(correct.to_string());
        options.shuffle(&mut rng);
        let correct_option = options
            .iter()
            .position(|o| o == correct)
            .unwrap_or_default();

        questions.push(Question {
            id: word.id.clone(),
            prompt: word.word.trim().to_string(),
            options,
            correct_option,
        });
    }
    questions
}

/// Supplier of vocabulary records (the word store lives elsewhere)
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn fetch_words(&self) -> EngineResult<Vec<Word>>;
}

/// Reads a JSON array of words from disk
#[derive(Debug, Clone)]
pub struct JsonFileWordSource {
    path: PathBuf,
}

impl JsonFileWordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WordSource for JsonFileWordSource {
    async fn fetch_words(&self) -> EngineResult<Vec<Word>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::WordSource(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let words: Vec<Word> = serde_json::from_str(&raw).map_err(|e| {
            EngineError::WordSource(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        tracing::info!("Loaded {} words from {}", words.len(), self.path.display());
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn word(id: &str, text: &str, meaning: &str) -> Word {
        Word {
            id: id.to_string(),
            word: text.to_string(),
            phonetic: String::new(),
            meaning: meaning.to_string(),
            example: String::new(),
            difficulty: 1,
        }
    }

    fn sample_words() -> Vec<Word> {
        vec![
            word("1", "apple", "苹果"),
            word("2", "beautiful", "美丽的"),
            word("3", "banana", "香蕉"),
            word("4", "orange", "橙子"),
            word("5", "pear", "梨"),
        ]
    }

    fn question(id: &str, prompt: &str) -> Question {
        Question {
            id: id.to_string(),
            prompt: prompt.to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_option: 0,
        }
    }

    #[test]
    fn test_load_more_than_available_fails() {
        let bank = InMemoryBank::new(vec![question("q1", "apple"), question("q2", "pear")]).unwrap();

        let result = bank.load_questions(5);
        assert_eq!(
            result.unwrap_err(),
            EngineError::InsufficientQuestions {
                requested: 5,
                available: 2
            }
        );
        assert!(bank.load_shuffled(5, 7).is_err());
    }

    #[test]
    fn test_duplicates_do_not_count_as_distinct() {
        let bank = InMemoryBank::new(vec![
            question("q1", "apple"),
            question("q2", " Apple "),
            question("q1", "pear"),
            question("q3", "pear"),
        ])
        .unwrap();

        assert_eq!(bank.len(), 2);
        assert!(bank.load_questions(3).is_err());
    }

    #[test]
    fn test_load_preserves_bank_order() {
        let bank = InMemoryBank::new(vec![
            question("q1", "apple"),
            question("q2", "pear"),
            question("q3", "plum"),
        ])
        .unwrap();

        let loaded = bank.load_questions(2).unwrap();
        let ids: Vec<_> = loaded.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[test]
    fn test_shuffled_load_is_seeded_and_distinct() {
        let bank = InMemoryBank::from_words(&sample_words(), 4, 1).unwrap();

        let first = bank.load_shuffled(4, 99).unwrap();
        let again = bank.load_shuffled(4, 99).unwrap();
        assert_eq!(first, again);

        let ids: HashSet<_> = first.iter().map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_rejects_malformed_questions() {
        let mut one_option = question("q1", "apple");
        one_option.options = vec!["a".to_string()];
        assert!(matches!(
            InMemoryBank::new(vec![one_option]),
            Err(EngineError::InvalidQuestion(_))
        ));

        let mut out_of_range = question("q1", "apple");
        out_of_range.correct_option = 2;
        assert!(InMemoryBank::new(vec![out_of_range]).is_err());

        let mut repeated = question("q1", "apple");
        repeated.options = vec!["a".to_string(), "A".to_string()];
        assert!(InMemoryBank::new(vec![repeated]).is_err());
    }

    #[test]
    fn test_questions_from_words() {
        let questions = questions_from_words(&sample_words(), 4, 3);
        assert_eq!(questions.len(), 5);

        for (q, w) in questions.iter().zip(sample_words()) {
            assert_eq!(q.prompt, w.word);
            assert_eq!(q.options.len(), 4);
            assert_eq!(q.options[q.correct_option], w.meaning);
            let distinct: HashSet<_> = q.options.iter().collect();
            assert_eq!(distinct.len(), 4);
        }
    }

    #[test]
    fn test_questions_from_words_limits_options_to_available_meanings() {
        let words = vec![word("1", "apple", "苹果"), word("2", "beautiful", "美丽的")];
        let questions = questions_from_words(&words, 6, 3);
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.options.len() == 2));
    }

    #[test]
    fn test_single_word_yields_no_question() {
        let questions = questions_from_words(&[word("1", "apple", "苹果")], 4, 3);
        assert!(questions.is_empty());
    }

    #[tokio::test]
    async fn test_json_file_word_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&sample_words()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let source = JsonFileWordSource::new(file.path());
        let words = source.fetch_words().await.unwrap();
        assert_eq!(words, sample_words());
    }

    #[tokio::test]
    async fn test_json_file_word_source_defaults_optional_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(r#"[{"id": "1", "word": "apple", "meaning": "苹果"}]"#.as_bytes())
            .unwrap();

        let words = JsonFileWordSource::new(file.path())
            .fetch_words()
            .await
            .unwrap();
        assert_eq!(words[0].difficulty, 1);
        assert!(words[0].phonetic.is_empty());
    }

    #[tokio::test]
    async fn test_json_file_word_source_errors() {
        let missing = JsonFileWordSource::new("/nonexistent/words.json");
        assert!(matches!(
            missing.fetch_words().await,
            Err(EngineError::WordSource(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        let broken = JsonFileWordSource::new(file.path());
        assert!(matches!(
            broken.fetch_words().await,
            Err(EngineError::WordSource(_))
        ));
    }
}
