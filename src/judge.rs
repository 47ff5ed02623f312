//! Judge protocol: elicit a preference between two candidate responses and
//! parse it into a total three-valued verdict.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gateway::ProviderError;
use crate::prompts::{FIRST_LABEL, JUDGE_PROMPT, SECOND_LABEL, TIE_LABEL};
use crate::registry::ModelHandle;

/// Outcome of one judged comparison.
///
/// Total over all judge outputs: anything that is not exactly one recognized
/// label is `Invalid`. The parser never guesses a side from partial text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    FirstPreferred,
    SecondPreferred,
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::FirstPreferred => "first_preferred",
            Verdict::SecondPreferred => "second_preferred",
            Verdict::Invalid => "invalid",
        }
    }
}

/// Normalize judge output for label matching: strip surrounding whitespace,
/// punctuation and quoting, collapse inner whitespace, lowercase.
fn normalize(raw: &str) -> String {
    let stripped = raw.trim_matches(|c: char| !c.is_alphanumeric());
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse free-text judge output into a verdict.
///
/// The normalized output must equal exactly one recognized label. The tie
/// token counts as recognized but carries no preference, so it maps to
/// `Invalid` like everything else that is not a side.
pub fn parse_verdict(raw: &str) -> Verdict {
    let normalized = normalize(raw);

    if normalized == FIRST_LABEL.to_lowercase() {
        Verdict::FirstPreferred
    } else if normalized == SECOND_LABEL.to_lowercase() {
        Verdict::SecondPreferred
    } else {
        if normalized != TIE_LABEL.to_lowercase() {
            warn!(output = raw, "judge output matched no recognized label");
        }
        Verdict::Invalid
    }
}

/// A judge bound to one model handle.
pub struct Judge {
    handle: ModelHandle,
}

impl Judge {
    pub fn new(handle: ModelHandle) -> Self {
        Self { handle }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Ask the judge model which of the two responses better serves the
    /// objective.
    ///
    /// Backend failures propagate; they are a different failure class than
    /// unparseable content and must never be folded into `Invalid`.
    pub async fn choose(
        &self,
        objective: &str,
        prompt: &str,
        response_a: &str,
        response_b: &str,
    ) -> Result<Verdict, ProviderError> {
        let instance = JUDGE_PROMPT.render(objective, prompt, response_a, response_b);
        let response = self
            .handle
            .backend()
            .complete_chat(&instance.to_messages())
            .await?;
        Ok(parse_verdict(&response.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_labels_parse() {
        assert_eq!(parse_verdict("Response 1"), Verdict::FirstPreferred);
        assert_eq!(parse_verdict("Response 2"), Verdict::SecondPreferred);
    }

    #[test]
    fn labels_parse_case_insensitively_with_wrapping() {
        assert_eq!(parse_verdict("  response 1  "), Verdict::FirstPreferred);
        assert_eq!(parse_verdict("RESPONSE 2."), Verdict::SecondPreferred);
        assert_eq!(parse_verdict("\"Response 1\""), Verdict::FirstPreferred);
        assert_eq!(parse_verdict("**Response 2**\n"), Verdict::SecondPreferred);
        assert_eq!(parse_verdict("Response\t1"), Verdict::FirstPreferred);
    }

    #[test]
    fn tie_token_is_invalid_not_a_side() {
        assert_eq!(parse_verdict("Neither"), Verdict::Invalid);
        assert_eq!(parse_verdict("neither."), Verdict::Invalid);
    }

    #[test]
    fn unrelated_text_is_invalid() {
        assert_eq!(parse_verdict("I cannot decide"), Verdict::Invalid);
        assert_eq!(parse_verdict(""), Verdict::Invalid);
        assert_eq!(parse_verdict("Response 3"), Verdict::Invalid);
        // A label embedded in prose is ambiguous, not a preference.
        assert_eq!(
            parse_verdict("I would say Response 1 is better overall"),
            Verdict::Invalid
        );
        // Both labels present: no unambiguous preference.
        assert_eq!(
            parse_verdict("Response 1 and Response 2 are equal"),
            Verdict::Invalid
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        for _ in 0..5 {
            assert_eq!(parse_verdict("Response 1"), Verdict::FirstPreferred);
            assert_eq!(parse_verdict("garbage"), Verdict::Invalid);
        }
    }
}
