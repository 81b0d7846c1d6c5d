//! Tiny regex-based document-type classifier (§4.5), used to pick the
//! class-specific prompt template before the LLM ever runs.

use once_cell::sync::Lazy;
use pipeline_core::types::DocumentClass;
use regex::RegexSet;

static PATENT_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\bpatent\s+(no\.?|number|application)\b",
        r"(?i)\bclaims?\s+\d+\b",
        r"(?i)\bassignee\b",
        r"(?i)\buspto\b",
    ])
    .unwrap()
});

static RESEARCH_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\babstract\b",
        r"(?i)\bjournal\s+of\b",
        r"(?i)\bdoi:\s*10\.",
        r"(?i)\bpeer.review(ed)?\b",
        r"(?i)\bmethodology\b",
    ])
    .unwrap()
});

static PROJECT_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\bproject\s+(schedule|budget|milestone|status)\b",
        r"(?i)\brequest\s+for\s+proposal\b",
        r"(?i)\bconstruction\s+(phase|contract)\b",
        r"(?i)\bcapital\s+improvement\b",
    ])
    .unwrap()
});

/// Scores each class's keyword hits and returns the best match, or `Other`
/// when nothing clears the bar.
pub fn classify(text: &str) -> DocumentClass {
    let patent_hits = PATENT_PATTERNS.matches(text).iter().count();
    let research_hits = RESEARCH_PATTERNS.matches(text).iter().count();
    let project_hits = PROJECT_PATTERNS.matches(text).iter().count();

    let best = [(DocumentClass::Patent, patent_hits), (DocumentClass::Research, research_hits), (DocumentClass::Project, project_hits)]
        .into_iter()
        .max_by_key(|(_, hits)| *hits);

    match best {
        Some((class, hits)) if hits > 0 => class,
        _ => DocumentClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_patent_language() {
        let text = "Patent No. 10,123,456 assigned to Acme Corp, Assignee: Acme. Claims 1-20 describe...";
        assert_eq!(classify(text), DocumentClass::Patent);
    }

    #[test]
    fn detects_research_language() {
        let text = "Abstract: this paper presents a novel methodology. Journal of Coastal Engineering. DOI: 10.1000/xyz";
        assert_eq!(classify(text), DocumentClass::Research);
    }

    #[test]
    fn detects_project_language() {
        let text = "Project schedule and budget for the capital improvement plan, construction phase two.";
        assert_eq!(classify(text), DocumentClass::Project);
    }

    #[test]
    fn falls_back_to_other_with_no_keyword_hits() {
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(classify(text), DocumentClass::Other);
    }
}
