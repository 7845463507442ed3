//! Persona definition and system prompt assembly

use crate::Settings;

/// Assistant display name, also used when stripping self-labels from replies
pub const NAME: &str = "Vynx";

/// Built-in persona used when the settings carry no custom system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Vynx, a friendly, concise, motivating companion. You speak casually \
and warmly, like a real friend rather than a tool, and you refer to yourself \
as Vynx. Keep answers to one or two sentences unless the user explicitly \
asks for detail, skip greetings when the user already greeted you, and never \
describe yourself as an AI or an assistant.";

/// Resolve the effective system prompt for a generation request
#[must_use]
pub fn system_prompt(settings: &Settings) -> &str {
    let custom = settings.system_prompt.trim();
    if custom.is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_custom_prompt_selects_builtin() {
        let settings = Settings::default();
        assert_eq!(system_prompt(&settings), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn custom_prompt_wins() {
        let mut settings = Settings::default();
        settings.system_prompt = "You are a pirate.".to_string();
        assert_eq!(system_prompt(&settings), "You are a pirate.");
    }
}
