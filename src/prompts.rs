//! Prompt template for judge comparisons.
//!
//! Domain logic for rendering the judge conversation. Provider-agnostic.

use crate::gateway::Message;

/// Label the judge must emit to prefer the first response.
pub const FIRST_LABEL: &str = "Response 1";
/// Label the judge must emit to prefer the second response.
pub const SECOND_LABEL: &str = "Response 2";
/// Tie/neither token. Recognized so the judge can decline without the
/// output counting as garbage, but it still maps to an invalid verdict.
pub const TIE_LABEL: &str = "Neither";

/// Rendered prompt ready for the judge backend.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// Escape XML special characters so candidate text cannot break out of its
/// tags or fabricate a label section.
fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// The judge prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

/// Default judge template. The system message states the objective and the
/// answer contract; the user message carries the opener and both candidates
/// under unambiguous tags.
pub const JUDGE_PROMPT: PromptTemplate = PromptTemplate {
    system: "\
You compare two candidate assistant responses against a product objective.

<objective>
{objective}
</objective>

Pick the response that better serves the objective. Answer with only \
\"{first_label}\", \"{second_label}\", or \"{tie_label}\" if you cannot \
prefer either. Do not explain.",
    user: "\
The user opened the conversation with:

<conversation_opener>
{prompt}
</conversation_opener>

<response_1>
{response_1}
</response_1>

<response_2>
{response_2}
</response_2>

Which response better serves the objective? Answer with only \
\"{first_label}\", \"{second_label}\", or \"{tie_label}\".",
};

impl PromptTemplate {
    pub fn render(
        &self,
        objective: &str,
        prompt: &str,
        response_a: &str,
        response_b: &str,
    ) -> PromptInstance {
        // Escape interpolated content; the labels are trusted constants.
        let safe_objective = escape_xml_chars(objective);
        let safe_prompt = escape_xml_chars(prompt);
        let safe_a = escape_xml_chars(response_a.trim());
        let safe_b = escape_xml_chars(response_b.trim());

        let fill = |template: &str| {
            template
                .replace("{objective}", &safe_objective)
                .replace("{prompt}", &safe_prompt)
                .replace("{response_1}", &safe_a)
                .replace("{response_2}", &safe_b)
                .replace("{first_label}", FIRST_LABEL)
                .replace("{second_label}", SECOND_LABEL)
                .replace("{tie_label}", TIE_LABEL)
        };

        PromptInstance {
            system: fill(self.system).trim().to_string(),
            user: fill(self.user).trim().to_string(),
        }
    }
}
