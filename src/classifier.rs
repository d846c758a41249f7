//! Rule-based paper-type classification (review / conference / journal).
//!
//! Keyword rules over the lowercased concatenation of title, venue and
//! abstract. Known limitation: non-English venues fall through to the
//! journal default.

use crate::paper::PaperType;

const REVIEW_KEYWORDS: &[&str] = &[
    "review",
    "survey",
    "meta-analysis",
    "systematic review",
    "literature review",
    "overview",
    "synthesis",
    "state-of-the-art",
    "comprehensive review",
    "critical review",
    "scoping review",
];

const CONFERENCE_PATTERNS: &[&str] = &[
    "proceedings",
    "conference",
    "workshop",
    "symposium",
    "congress",
    "international conference",
    "acm",
    "ieee conference",
    "workshop on",
    "advances in",
    "annual conference",
    "icml",
    "nips",
    "neurips",
    "aaai",
    "ijcai",
    "cvpr",
    "iccv",
    "eccv",
    "sigkdd",
    "www conference",
];

const JOURNAL_PATTERNS: &[&str] = &[
    "journal of",
    "journal",
    "nature",
    "science",
    "cell",
    "plos",
    "proceedings of the national academy",
    "ieee transactions",
    "acm transactions",
    "quarterly",
    "annual review",
    "elsevier",
    "springer",
    "wiley",
    "oxford",
    "cambridge",
    "taylor & francis",
];

/// Classify a paper from its title, venue and abstract.
///
/// Review vocabulary wins outright on any hit; otherwise conference and
/// journal vocabulary hit counts are compared, with a venue-name fallback.
pub fn classify_paper(title: &str, journal: &str, abstract_text: &str) -> PaperType {
    let text = format!("{} {} {}", title, journal, abstract_text).to_lowercase();

    let review_hits = REVIEW_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count();
    if review_hits >= 1 {
        return PaperType::Review;
    }

    let conference_hits = CONFERENCE_PATTERNS
        .iter()
        .filter(|p| text.contains(*p))
        .count();
    let journal_hits = JOURNAL_PATTERNS.iter().filter(|p| text.contains(*p)).count();

    if conference_hits > journal_hits {
        PaperType::Conference
    } else if journal_hits > 0 {
        PaperType::Journal
    } else {
        let venue = journal.to_lowercase();
        if ["conference", "proceedings", "workshop"]
            .iter()
            .any(|term| venue.contains(term))
        {
            PaperType::Conference
        } else {
            PaperType::Journal
        }
    }
}
