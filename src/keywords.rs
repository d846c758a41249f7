//! Keyword extraction and rule-based category tagging.
//!
//! Adapters run these over title+abstract so downstream ranking, similarity
//! probes and the fallback scorer have term material to work with.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Maximum keywords returned per paper.
const MAX_KEYWORDS: usize = 15;

/// Stop words tuned for academic prose.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "could", "should", "may", "might", "can", "this", "that", "these", "those", "we", "they",
    "them", "their", "our", "your", "his", "her", "its", "study", "research", "paper", "article",
    "analysis", "approach", "method", "results", "conclusion",
];

fn compound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[a-z]+(?:[\s-][a-z]+){1,2}\b").expect("compound term regex")
    })
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-z]{3,}\b").expect("word regex"))
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Extract up to [`MAX_KEYWORDS`] keywords from free text.
///
/// Compound terms (2-3 word n-grams) are preferred over single words;
/// single words fill at most half the budget.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let text = text.to_lowercase();

    let compounds: Vec<&str> = compound_re()
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|term| term.len() > 5 && !term.split([' ', '-']).any(is_stop_word))
        .collect();
    let singles: Vec<&str> = word_re()
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|word| word.len() > 3 && !is_stop_word(word))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for term in compounds.iter().chain(singles.iter()) {
        let entry = counts.entry(term).or_insert(0);
        if *entry == 0 {
            order.push(term);
        }
        *entry += 1;
    }

    let mut ranked: Vec<&str> = order;
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let mut keywords: Vec<String> = Vec::new();
    for term in ranked {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        let is_compound = term.contains(' ') || term.contains('-');
        if is_compound {
            keywords.push(term.to_string());
        } else if keywords.len() < MAX_KEYWORDS / 2 {
            keywords.push(term.to_string());
        }
    }
    keywords
}

/// Research-area vocabularies for rule-based category tagging.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "machine_learning",
        &["machine learning", "neural network", "deep learning", "artificial intelligence", "ai"],
    ),
    (
        "computer_vision",
        &["computer vision", "image processing", "object detection", "image recognition", "visual"],
    ),
    (
        "nlp",
        &["natural language processing", "nlp", "text mining", "language model", "sentiment analysis"],
    ),
    (
        "data_science",
        &["data science", "data mining", "big data", "analytics", "statistical"],
    ),
    ("robotics", &["robot", "robotics", "autonomous", "control system", "sensor"]),
    (
        "cybersecurity",
        &["security", "cybersecurity", "encryption", "privacy", "authentication"],
    ),
    (
        "software_engineering",
        &["software", "programming", "development", "engineering", "architecture"],
    ),
    (
        "algorithms",
        &["algorithm", "optimization", "complexity", "computational", "mathematical"],
    ),
    ("systems", &["system", "distributed", "network", "database", "cloud computing"]),
    ("theory", &["theoretical", "formal", "proof", "mathematical", "logic"]),
];

/// Tag a paper with research categories from title, abstract and venue.
/// Falls back to `general` when nothing matches.
pub fn classify_categories(title: &str, abstract_text: &str, journal: &str) -> Vec<String> {
    let content = format!("{} {} {}", title, abstract_text, journal).to_lowercase();

    let categories: Vec<String> = CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| content.contains(kw)))
        .map(|(name, _)| name.to_string())
        .collect();

    if categories.is_empty() {
        vec!["general".to_string()]
    } else {
        categories
    }
}
