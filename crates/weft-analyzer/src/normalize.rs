use weft_graph::normalize_term;

const MIN_TERM_LEN: usize = 2;
const MAX_TERM_LEN: usize = 50;
const FUZZY_MAX_DISTANCE: usize = 1;

/// A normalized keyword candidate carrying the store-side frequency used
/// to pick a canonical form during fuzzy-merge.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub term: String,
    pub confidence: f64,
    pub known_frequency: u64,
}

/// Normalizes a raw extractor term and drops it if it falls outside the
/// length bound. `weft_graph::normalize_term` already does the
/// lowercase/trim/charset work shared with `createKeyword`; this layers
/// the analyzer-specific length floor on top (the store only enforces the
/// upper bound).
pub fn normalize_candidate_term(raw: &str) -> Option<String> {
    let normalized = normalize_term(raw).ok()?;
    if normalized.chars().count() < MIN_TERM_LEN || normalized.chars().count() > MAX_TERM_LEN {
        return None;
    }
    Some(normalized)
}

/// Collapses near-duplicate terms (Levenshtein distance <= 1, or one term containing the
/// other) to the more-frequent canonical form. `known_frequency` should be the term's
/// current Keyword frequency in the store (0 if unseen); ties are broken by picking the
/// longer (more specific) term, then lexicographically, so the merge is deterministic for
/// the idempotence property.
pub fn fuzzy_merge(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.term.cmp(&b.term));

    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    'next_candidate: for candidate in candidates {
        for existing in merged.iter_mut() {
            if is_fuzzy_match(&existing.term, &candidate.term) {
                if should_prefer(&candidate, existing) {
                    existing.term = candidate.term;
                }
                existing.confidence = existing.confidence.max(candidate.confidence);
                existing.known_frequency = existing.known_frequency.max(candidate.known_frequency);
                continue 'next_candidate;
            }
        }
        merged.push(candidate);
    }
    merged
}

fn is_fuzzy_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.contains(b) || b.contains(a) {
        return true;
    }
    strsim::levenshtein(a, b) <= FUZZY_MAX_DISTANCE
}

fn should_prefer(candidate: &Candidate, existing: &Candidate) -> bool {
    match candidate.known_frequency.cmp(&existing.known_frequency) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match candidate.term.len().cmp(&existing.term.len()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => candidate.term < existing.term,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(term: &str, freq: u64) -> Candidate {
        Candidate { term: term.to_string(), confidence: 0.8, known_frequency: freq }
    }

    #[test]
    fn drops_too_short_terms() {
        assert_eq!(normalize_candidate_term("a"), None);
    }

    #[test]
    fn collapses_hyphen_distance_one() {
        let merged = fuzzy_merge(vec![c("rustlang", 5), c("rustlan", 0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].term, "rustlang");
    }

    #[test]
    fn collapses_containment() {
        let merged = fuzzy_merge(vec![c("async", 9), c("async-runtime", 1)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].term, "async");
    }

    #[test]
    fn leaves_distinct_terms_apart() {
        let merged = fuzzy_merge(vec![c("rust", 5), c("python", 5)]);
        assert_eq!(merged.len(), 2);
    }
}
