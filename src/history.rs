//! In-session conversation history
//!
//! An ordered log of turns owned by the coordinator for the lifetime of the
//! conversation session. Prompt construction sees only a bounded tail; the
//! reset command clears the log entirely. Nothing here persists across
//! process restarts.

use chrono::{DateTime, Utc};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    /// Render the turn as a prompt line, e.g. `User: hi` / `Vynx: hello`
    #[must_use]
    pub fn prompt_line(&self) -> String {
        match self.speaker {
            Speaker::User => format!("User: {}", self.text),
            Speaker::Assistant => format!("{}: {}", crate::persona::NAME, self.text),
        }
    }
}

/// Ordered sequence of turns with a bounded prompt window
#[derive(Debug, Default)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Create an empty history
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a user turn
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::User,
            text: text.into(),
            at: Utc::now(),
        });
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Utc::now(),
        });
    }

    /// Clear the history entirely (the reset command)
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// The most recent turns, bounded to `max_turn_pairs` user/assistant pairs
    #[must_use]
    pub fn recent(&self, max_turn_pairs: usize) -> &[Turn] {
        let max_turns = max_turn_pairs.saturating_mul(2);
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_append_in_order() {
        let mut history = History::new();
        history.push_user("hi");
        history.push_assistant("hello");

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].prompt_line(), "User: hi");
        assert_eq!(history.turns()[1].prompt_line(), "Vynx: hello");
    }

    #[test]
    fn recent_bounds_to_turn_pairs() {
        let mut history = History::new();
        for i in 0..8 {
            history.push_user(format!("question {i}"));
            history.push_assistant(format!("answer {i}"));
        }

        let recent = history.recent(3);
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].prompt_line(), "User: question 5");
        assert_eq!(recent[5].prompt_line(), "Vynx: answer 7");
    }

    #[test]
    fn recent_returns_everything_when_under_bound() {
        let mut history = History::new();
        history.push_user("only one");

        assert_eq!(history.recent(10).len(), 1);
    }

    #[test]
    fn reset_clears_all_turns() {
        let mut history = History::new();
        history.push_user("hi");
        history.push_assistant("hello");

        history.reset();
        assert!(history.is_empty());
        assert!(history.recent(10).is_empty());
    }
}
