use weft_channels::Message as RoomMessage;
use weft_graph::Subject;
use weft_llm::Message as LlmMessage;

const SYSTEM_PROMPT: &str = "You analyze chat transcripts for a topic-analysis \
engine. Read the conversation and extract: (1) individual keywords worth \
tracking, each a short lowercase term with a confidence in [0,1]; (2) \
subjects, which are clusters of 2 or more related keywords discussed \
together, each with the member keyword terms, a one-sentence description, \
and a confidence in [0,1]. Respond with a single JSON object of the shape \
{\"keywords\":[{\"term\":string,\"confidence\":number}],\"subjects\":\
[{\"memberTerms\":[string],\"description\":string,\"confidence\":number}]}. \
Do not include any text outside the JSON object.";

/// Builds the deterministic extraction prompt: system
/// instructions, the recent message window, and the topic's currently
/// active subjects (so the model can disambiguate recurring discussion
/// instead of re-describing it from scratch).
pub fn build_extraction_prompt(messages: &[RoomMessage], active_subjects: &[Subject]) -> Vec<LlmMessage> {
    let mut out = vec![LlmMessage::system(SYSTEM_PROMPT)];

    if !active_subjects.is_empty() {
        let names: Vec<&str> = active_subjects.iter().map(|s| s.id.as_str()).collect();
        out.push(LlmMessage::system(format!(
            "Subjects already active in this conversation: {}. Prefer recognizing a \
             recurrence of one of these over inventing a near-duplicate.",
            names.join(", ")
        )));
    }

    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.sender_id, m.text))
        .collect::<Vec<_>>()
        .join("\n");
    out.push(LlmMessage::user(transcript));
    out
}
