//! Fenced code-block extraction from model responses.

/// Opening fence carrying the language tag the prompts ask for.
const TAGGED_FENCE: &str = "```python";
/// Bare fence, used both as the opening fallback and the closing marker.
const FENCE: &str = "```";

/// Extract the code span from a model response.
///
/// Finds the opening fence (language-tagged first, bare as a fallback) and
/// the closing fence by searching from the end of the text, so a response
/// containing several blocks yields everything up to the last closing fence.
/// Returns `None` when no opening fence exists or the closing fence does not
/// lie after it — callers treat that as "no code produced", never a crash.
pub fn extract_code(response: &str) -> Option<String> {
    let (start, marker_len) = match response.find(TAGGED_FENCE) {
        Some(idx) => (idx, TAGGED_FENCE.len()),
        None => (response.find(FENCE)?, FENCE.len()),
    };

    let body_start = start + marker_len;
    let end = response.rfind(FENCE)?;
    if end < body_start {
        // Opening fence only, or the closing search landed on the opener.
        return None;
    }

    Some(response[body_start..end].trim().to_string())
}
