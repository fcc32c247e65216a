use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::models::{DailyLog, QuizQuestion};

/// Per-question state of the parent quiz flow. Each question walks
/// Idle -> Confirming -> Result; after the last question the session is
/// Complete and the score is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum QuizState {
    Idle,
    Confirming,
    Result { correct: bool },
    Complete,
}

/// One live quiz run over an Adab log's questions.
///
/// Answer order is shuffled exactly once per question transition; re-reading
/// the session between transitions always sees the same order.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    current: usize,
    score: i32,
    options: Vec<String>,
    selected: Option<String>,
    state: QuizState,
    rng: StdRng,
}

/// Serializable snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    pub question_index: usize,
    pub question_count: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub selected: Option<String>,
    #[serde(flatten)]
    pub state: QuizState,
    pub score: i32,
}

impl QuizSession {
    /// Start a quiz over `log`'s questions. Completed quizzes never
    /// re-enter the flow.
    pub fn start(log: &DailyLog, seed: u64) -> Result<QuizSession> {
        if !log.is_adab {
            return Err(anyhow!("log '{}' is not an Adab session", log.id));
        }
        if log.quiz.is_empty() {
            return Err(anyhow!("Adab log '{}' carries no questions", log.id));
        }
        if log.quiz_completed() {
            return Err(anyhow!("quiz for log '{}' is already completed", log.id));
        }

        let mut session = QuizSession {
            questions: log.quiz.clone(),
            current: 0,
            score: 0,
            options: Vec::new(),
            selected: None,
            state: QuizState::Idle,
            rng: StdRng::seed_from_u64(seed),
        };
        session.shuffle_current();
        Ok(session)
    }

    /// Fisher-Yates over one correct + N wrong answers. Invoked once per
    /// question transition, never on re-render.
    fn shuffle_current(&mut self) {
        let question = &self.questions[self.current];
        let mut options = Vec::with_capacity(question.wrong_answers.len() + 1);
        options.push(question.correct_answer.clone());
        options.extend(question.wrong_answers.iter().cloned());
        options.shuffle(&mut self.rng);
        self.options = options;
    }

    pub fn view(&self) -> QuizView {
        QuizView {
            question_index: self.current,
            question_count: self.questions.len(),
            prompt: self.questions[self.current].prompt.clone(),
            options: self.options.clone(),
            selected: self.selected.clone(),
            state: self.state,
            score: self.score,
        }
    }

    /// Pick an answer. Selecting never advances the machine by itself.
    pub fn select(&mut self, answer: &str) -> Result<()> {
        if self.state != QuizState::Idle {
            return Err(anyhow!("an answer can only be selected before submitting"));
        }
        if !self.options.iter().any(|o| o == answer) {
            return Err(anyhow!("'{}' is not one of the offered answers", answer));
        }
        self.selected = Some(answer.to_string());
        Ok(())
    }

    /// Explicit submit: moves the selected answer to the confirmation step.
    pub fn submit(&mut self) -> Result<()> {
        if self.state != QuizState::Idle {
            return Err(anyhow!("nothing to submit in the current state"));
        }
        if self.selected.is_none() {
            return Err(anyhow!("select an answer first"));
        }
        self.state = QuizState::Confirming;
        Ok(())
    }

    /// Second, explicit confirmation. Scores iff the selection matches the
    /// correct answer exactly.
    pub fn confirm(&mut self) -> Result<bool> {
        if self.state != QuizState::Confirming {
            return Err(anyhow!("nothing to confirm in the current state"));
        }
        let selected = self
            .selected
            .as_deref()
            .ok_or_else(|| anyhow!("no selection recorded"))?;
        let correct = selected == self.questions[self.current].correct_answer;
        if correct {
            self.score += 1;
        }
        self.state = QuizState::Result { correct };
        Ok(correct)
    }

    /// Move past the revealed result. Returns `Some((score, max))` when the
    /// session just completed, `None` while questions remain.
    pub fn advance(&mut self) -> Result<Option<(i32, i32)>> {
        match self.state {
            QuizState::Result { .. } => {}
            _ => return Err(anyhow!("no result to advance from")),
        }

        if self.current + 1 < self.questions.len() {
            self.current += 1;
            self.selected = None;
            self.state = QuizState::Idle;
            self.shuffle_current();
            Ok(None)
        } else {
            self.state = QuizState::Complete;
            Ok(Some((self.score, self.questions.len() as i32)))
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == QuizState::Complete
    }

    pub fn score(&self) -> i32 {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn adab_log(questions: Vec<QuizQuestion>) -> DailyLog {
        DailyLog {
            id: Uuid::new_v4(),
            date: Utc::now(),
            teacher_id: Uuid::new_v4(),
            teacher_name: "الشيخ خالد".to_string(),
            is_absent: false,
            is_adab: true,
            jadeed: None,
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
            seen_by_parent: false,
            seen_at: None,
            quiz: questions,
            parent_quiz_score: None,
            parent_quiz_max: None,
        }
    }

    fn question(correct: &str, wrong: &[&str]) -> QuizQuestion {
        QuizQuestion {
            prompt: "ما هو الصدق؟".to_string(),
            correct_answer: correct.to_string(),
            wrong_answers: wrong.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_correct_answer_scores_exactly_one() {
        let log = adab_log(vec![question("A", &["B", "C"])]);
        let mut session = QuizSession::start(&log, 7).unwrap();

        session.select("A").unwrap();
        session.submit().unwrap();
        assert!(session.confirm().unwrap());
        assert_eq!(session.score(), 1);

        let outcome = session.advance().unwrap();
        assert_eq!(outcome, Some((1, 1)));
        assert!(session.is_complete());
    }

    #[test]
    fn test_wrong_answer_leaves_score_unchanged() {
        let log = adab_log(vec![question("A", &["B", "C"])]);
        let mut session = QuizSession::start(&log, 7).unwrap();

        session.select("B").unwrap();
        session.submit().unwrap();
        assert!(!session.confirm().unwrap());
        assert_eq!(session.score(), 0);
        assert_eq!(session.advance().unwrap(), Some((0, 1)));
    }

    #[test]
    fn test_selection_does_not_advance_and_submit_requires_selection() {
        let log = adab_log(vec![question("A", &["B"])]);
        let mut session = QuizSession::start(&log, 1).unwrap();

        assert!(session.submit().is_err());
        session.select("A").unwrap();
        // Still Idle after selecting: re-selection is allowed.
        session.select("B").unwrap();
        session.submit().unwrap();
        // Confirming: no further selection, no double submit.
        assert!(session.select("A").is_err());
        assert!(session.submit().is_err());
    }

    #[test]
    fn test_confirm_requires_confirming_state() {
        let log = adab_log(vec![question("A", &["B"])]);
        let mut session = QuizSession::start(&log, 1).unwrap();
        assert!(session.confirm().is_err());
    }

    #[test]
    fn test_options_stable_within_question_and_reshuffled_between() {
        let log = adab_log(vec![
            question("A", &["B", "C", "D"]),
            question("X", &["Y", "Z", "W"]),
        ]);
        let mut session = QuizSession::start(&log, 42).unwrap();

        let first_view = session.view().options;
        session.select(&first_view[0]).unwrap();
        // Re-render between interactions: same order.
        assert_eq!(session.view().options, first_view);
        session.submit().unwrap();
        session.confirm().unwrap();
        assert_eq!(session.view().options, first_view);

        assert_eq!(session.advance().unwrap(), None);
        let second_view = session.view().options;
        let mut sorted = second_view.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["W", "X", "Y", "Z"]);
    }

    #[test]
    fn test_same_seed_gives_same_order() {
        let log = adab_log(vec![question("A", &["B", "C", "D", "E"])]);
        let a = QuizSession::start(&log, 99).unwrap();
        let b = QuizSession::start(&log, 99).unwrap();
        assert_eq!(a.view().options, b.view().options);
    }

    #[test]
    fn test_completed_quiz_never_restarts() {
        let mut log = adab_log(vec![question("A", &["B"])]);
        log.parent_quiz_score = Some(1);
        assert!(QuizSession::start(&log, 0).is_err());
    }

    #[test]
    fn test_non_adab_log_rejected() {
        let mut log = adab_log(vec![question("A", &["B"])]);
        log.is_adab = false;
        assert!(QuizSession::start(&log, 0).is_err());
    }

    #[test]
    fn test_multi_question_running_score() {
        let log = adab_log(vec![
            question("A", &["B"]),
            question("X", &["Y"]),
            question("M", &["N"]),
        ]);
        let mut session = QuizSession::start(&log, 5).unwrap();

        // Right, wrong, right.
        session.select("A").unwrap();
        session.submit().unwrap();
        session.confirm().unwrap();
        assert_eq!(session.advance().unwrap(), None);

        session.select("Y").unwrap();
        session.submit().unwrap();
        session.confirm().unwrap();
        assert_eq!(session.advance().unwrap(), None);

        session.select("M").unwrap();
        session.submit().unwrap();
        session.confirm().unwrap();
        assert_eq!(session.advance().unwrap(), Some((2, 3)));
    }
}
