use tracing::warn;

use crate::types::RawExtraction;

/// Parses the extractor's structured output. Models sometimes wrap the JSON in prose or a
/// markdown fence despite instructions; this tolerates that by locating the outermost
/// `{...}` span before parsing. A response that still doesn't parse is treated as
/// "nothing extracted" rather than a hard failure — keyword/subject extraction is derived
/// data, and says derived-data failures return empty rather than propagate.
pub fn parse_extraction_response(text: &str) -> RawExtraction {
    let candidate = extract_json_object(text).unwrap_or(text);
    match serde_json::from_str::<RawExtraction>(candidate) {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!(error = %e, "failed to parse extractor output, treating as empty");
            RawExtraction::default()
        }
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let text = r#"{"keywords":[{"term":"rust","confidence":0.9}],"subjects":[]}"#;
        let extraction = parse_extraction_response(text);
        assert_eq!(extraction.keywords.len(), 1);
        assert_eq!(extraction.keywords[0].term, "rust");
    }

    #[test]
    fn unwraps_markdown_fence() {
        let text = "Here you go:\n```json\n{\"keywords\":[],\"subjects\":[]}\n```\nDone.";
        let extraction = parse_extraction_response(text);
        assert!(extraction.keywords.is_empty());
        assert!(extraction.subjects.is_empty());
    }

    #[test]
    fn unparseable_text_yields_empty_extraction() {
        let extraction = parse_extraction_response("I couldn't find anything notable.");
        assert!(extraction.keywords.is_empty());
    }
}
