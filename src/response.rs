//! Response generation
//!
//! Builds a bounded prompt from the persona, long-term memory context, and
//! recent history, invokes the external model process under a timeout, and
//! post-processes the completion for display and speech. Generation failures
//! are never errors at this boundary: timeouts, a missing binary, and
//! non-zero exits all become the reply text so the user is informed in-band.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::history::{History, Turn};
use crate::persona;
use crate::settings::Settings;

/// Canned acknowledgement returned by the reset command
pub const RESET_ACK: &str = "Okay, clean slate. What's on your mind?";

/// Fallback reply when the model returns nothing usable
const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I didn't catch that. Could you try again?";

/// Produces a reply for a user turn. Seam for the coordinator so turn
/// sequencing is testable without a model process.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, user_text: String, history: Vec<Turn>, memory_context: String)
    -> String;
}

/// Generates replies by invoking an external model process
pub struct ResponseGenerator {
    model_name: String,
    system_prompt: String,
    max_prompt_chars: usize,
    max_reply_words: usize,
    timeout: Duration,
}

impl ResponseGenerator {
    /// Build a generator from the loaded settings
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            model_name: settings.model_name.clone(),
            system_prompt: persona::system_prompt(settings).to_string(),
            max_prompt_chars: settings.max_prompt_chars,
            max_reply_words: settings.max_reply_words,
            timeout: Duration::from_secs(settings.generation_timeout_secs),
        }
    }

    /// Invoke the model process with the assembled prompt
    ///
    /// Errors are folded into the returned string: the caller always gets
    /// something speakable.
    async fn invoke_model(&self, prompt: &str) -> String {
        let invocation = tokio::process::Command::new("ollama")
            .arg("run")
            .arg(&self.model_name)
            .arg(prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, invocation).await {
            Err(_) => {
                tracing::warn!(
                    model = %self.model_name,
                    timeout_secs = self.timeout.as_secs(),
                    "model invocation timed out"
                );
                format!(
                    "Model timed out after {} seconds.",
                    self.timeout.as_secs()
                )
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(model = %self.model_name, "ollama binary not found");
                format!(
                    "Ollama not found. Install Ollama and run: ollama pull {}",
                    self.model_name
                )
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "model invocation failed");
                format!("Model invocation failed: {e}")
            }
            Ok(Ok(output)) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                tracing::error!(status = %output.status, stderr = %stderr, "model process error");
                if stderr.is_empty() {
                    "Model process error.".to_string()
                } else {
                    stderr
                }
            }
            Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout).trim().to_string(),
        }
    }
}

#[async_trait]
impl Responder for ResponseGenerator {
    async fn respond(
        &self,
        user_text: String,
        history: Vec<Turn>,
        memory_context: String,
    ) -> String {
        let history_lines: Vec<String> = history.iter().map(Turn::prompt_line).collect();
        let prompt = build_prompt(
            &self.system_prompt,
            &memory_context,
            &history_lines,
            &user_text,
            self.max_prompt_chars,
        );

        tracing::debug!(prompt_chars = prompt.chars().count(), "invoking model");
        let raw = self.invoke_model(&prompt).await;
        let reply = postprocess(&raw, self.max_reply_words);

        if reply.is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            reply
        }
    }
}

/// Check for the history-reset command (case-insensitive)
#[must_use]
pub fn is_reset_command(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "reset" | "reset chat" | "clear chat"
    )
}

/// Short-circuit the reset command: clears the history and returns the
/// canned acknowledgement, skipping generation entirely.
pub fn handle_reset(user_text: &str, history: &mut History) -> Option<String> {
    if is_reset_command(user_text) {
        history.reset();
        tracing::info!("conversation history reset");
        Some(RESET_ACK.to_string())
    } else {
        None
    }
}

/// Assemble the prompt: persona system text, optional memory context, recent
/// history lines, and the new user line. When the result exceeds
/// `max_chars`, the front is dropped so the retained prompt is a suffix of
/// the full concatenation — the oldest content goes first.
#[must_use]
pub fn build_prompt(
    system_prompt: &str,
    memory_context: &str,
    history_lines: &[String],
    user_text: &str,
    max_chars: usize,
) -> String {
    let mut parts = vec![format!("SYSTEM: {system_prompt}")];
    if !memory_context.is_empty() {
        parts.push(format!("CONTEXT: {memory_context}"));
    }
    parts.extend(history_lines.iter().cloned());
    parts.push(format!("User: {user_text}"));
    parts.push(format!("{}:", persona::NAME));

    let full = parts.join("\n");
    tail_chars(&full, max_chars).to_string()
}

/// Post-process a raw completion: drop reasoning blocks, strip a leading
/// self-name label the model may have echoed, and bound the length.
#[must_use]
pub fn postprocess(raw: &str, max_words: usize) -> String {
    let stripped = strip_think_blocks(raw);
    let unlabeled = strip_self_label(stripped.trim());
    truncate_if_too_long(unlabeled.trim(), max_words)
}

/// Remove `<think>...</think>` reasoning blocks some local models emit
fn strip_think_blocks(text: &str) -> String {
    static THINK_RE: OnceLock<Regex> = OnceLock::new();
    let re = THINK_RE
        .get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"));
    re.replace_all(text, "").into_owned()
}

/// Strip a leading `Vynx:` style label
fn strip_self_label(text: &str) -> &str {
    static LABEL_RE: OnceLock<Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^\s*{}\s*[:,-]\s*", persona::NAME)).expect("static regex")
    });
    re.find(text).map_or(text, |m| &text[m.end()..])
}

/// Bound a reply to `max_words` words, preferring a sentence boundary over a
/// hard cut. Returns the first sentence when one exists; otherwise the first
/// `max_words` words. `max_words == 0` disables the bound.
#[must_use]
pub fn truncate_if_too_long(text: &str, max_words: usize) -> String {
    if max_words == 0 || text.split_whitespace().count() <= max_words {
        return text.to_string();
    }

    if let Some(end) = first_sentence_end(text) {
        return text[..end].trim().to_string();
    }

    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte offset just past the first sentence terminator, if any
fn first_sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            // A terminator followed by end-of-text or whitespace ends the sentence;
            // "1.5" or "v0.2" does not.
            match chars.peek() {
                None => return Some(idx + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => return Some(idx + c.len_utf8()),
                Some(_) => {}
            }
        }
    }
    None
}

/// The trailing `max_chars` characters of `text`, respecting UTF-8 boundaries
fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_command_variants() {
        assert!(is_reset_command("reset"));
        assert!(is_reset_command("Reset Chat"));
        assert!(is_reset_command("  CLEAR CHAT "));
        assert!(!is_reset_command("reset the router"));
        assert!(!is_reset_command("hello"));
    }

    #[test]
    fn reset_clears_history_and_returns_ack() {
        let mut history = History::new();
        history.push_user("hi");
        history.push_assistant("hello");

        let ack = handle_reset("reset chat", &mut history);
        assert_eq!(ack.as_deref(), Some(RESET_ACK));
        assert!(history.is_empty());
    }

    #[test]
    fn non_reset_leaves_history_alone() {
        let mut history = History::new();
        history.push_user("hi");

        assert!(handle_reset("what's up?", &mut history).is_none());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn prompt_contains_all_sections_when_under_budget() {
        let lines = vec!["User: hi".to_string(), "Vynx: hello".to_string()];
        let prompt = build_prompt("persona text", "known facts", &lines, "how are you?", 4000);

        assert!(prompt.starts_with("SYSTEM: persona text"));
        assert!(prompt.contains("CONTEXT: known facts"));
        assert!(prompt.contains("User: hi"));
        assert!(prompt.contains("Vynx: hello"));
        assert!(prompt.contains("User: how are you?"));
        assert!(prompt.ends_with("Vynx:"));
    }

    #[test]
    fn empty_memory_context_is_omitted() {
        let prompt = build_prompt("persona", "", &[], "hi", 4000);
        assert!(!prompt.contains("CONTEXT:"));
    }

    #[test]
    fn prompt_truncation_keeps_a_suffix_within_budget() {
        let lines: Vec<String> = (0..50).map(|i| format!("User: message number {i}")).collect();
        let full = build_prompt("persona", "", &lines, "latest question", usize::MAX);
        let bounded = build_prompt("persona", "", &lines, "latest question", 200);

        assert!(bounded.chars().count() <= 200);
        assert!(full.ends_with(&bounded), "retained prompt must be a suffix");
        // The newest content survives; the oldest is dropped first
        assert!(bounded.contains("latest question"));
        assert!(!bounded.contains("message number 0"));
    }

    #[test]
    fn truncates_to_first_sentence_when_over_word_limit() {
        assert_eq!(truncate_if_too_long("One. Two. Three.", 1), "One.");
    }

    #[test]
    fn short_replies_pass_through() {
        assert_eq!(truncate_if_too_long("Just fine.", 30), "Just fine.");
    }

    #[test]
    fn zero_word_limit_disables_truncation() {
        let long = "word ".repeat(100);
        assert_eq!(truncate_if_too_long(&long, 0), long);
    }

    #[test]
    fn hard_word_cut_when_no_sentence_boundary() {
        let text = "one two three four five six";
        assert_eq!(truncate_if_too_long(text, 3), "one two three");
    }

    #[test]
    fn decimal_points_are_not_sentence_boundaries() {
        let text = "It weighs 1.5 kilograms exactly and nothing more at all";
        // No real sentence boundary exists, so the bound falls back to a word cut
        assert_eq!(truncate_if_too_long(text, 4), "It weighs 1.5 kilograms");
    }

    #[test]
    fn exclamation_and_question_marks_end_sentences() {
        assert_eq!(truncate_if_too_long("Wow! That is amazing stuff.", 1), "Wow!");
        assert_eq!(truncate_if_too_long("Really? I had no idea friend.", 1), "Really?");
    }

    #[test]
    fn self_label_is_stripped() {
        assert_eq!(postprocess("Vynx: hello there", 30), "hello there");
        assert_eq!(postprocess("vynx - hello", 30), "hello");
        assert_eq!(postprocess("  VYNX: hi", 30), "hi");
    }

    #[test]
    fn label_in_the_middle_is_kept() {
        assert_eq!(postprocess("I am Vynx: your friend", 30), "I am Vynx: your friend");
    }

    #[test]
    fn think_blocks_are_removed() {
        let raw = "<think>reason about it\nstep by step</think>The answer is four.";
        assert_eq!(postprocess(raw, 30), "The answer is four.");
    }

    #[test]
    fn postprocess_combines_label_strip_and_truncation() {
        let raw = "Vynx: First sentence here. Second sentence that runs much longer than allowed.";
        assert_eq!(postprocess(raw, 3), "First sentence here.");
    }
}
