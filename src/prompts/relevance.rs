//! Relevance scoring prompt for academic papers.
//!
//! Deliberately minimal: the model is instructed to answer with a bare
//! number so parsing stays trivial and token spend stays low.

/// Scoring prompt template. Placeholders: {query}, {title}, {abstract}
const SCORING_TEMPLATE: &str = r#"Rate paper relevance to query on scale 0.0-1.0.

Format: Only return a number between 0.0 and 1.0, nothing else.

Examples:
- For perfect match: 0.9
- For good match: 0.7
- For weak match: 0.3
- For no match: 0.1

Query: {query}
Title: {title}
Abstract: {abstract}

Score:"#;

/// Maximum abstract characters forwarded to the model.
const ABSTRACT_LIMIT: usize = 600;

/// Build the scoring prompt for one paper.
pub fn build_scoring_prompt(query: &str, title: &str, abstract_text: &str) -> String {
    let truncated: String = if abstract_text.chars().count() > ABSTRACT_LIMIT {
        let mut head: String = abstract_text.chars().take(ABSTRACT_LIMIT).collect();
        head.push_str("...");
        head
    } else {
        abstract_text.to_string()
    };

    SCORING_TEMPLATE
        .replace("{query}", query)
        .replace("{title}", title)
        .replace("{abstract}", &truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_scoring_prompt() {
        let prompt = build_scoring_prompt("transformers", "Attention Is All You Need", "We propose");
        assert!(prompt.contains("Query: transformers"));
        assert!(prompt.contains("Title: Attention Is All You Need"));
        assert!(prompt.ends_with("Score:"));
    }

    #[test]
    fn test_long_abstract_truncated() {
        let long = "x".repeat(2000);
        let prompt = build_scoring_prompt("q", "t", &long);
        assert!(prompt.contains(&format!("{}...", "x".repeat(ABSTRACT_LIMIT))));
        assert!(!prompt.contains(&"x".repeat(ABSTRACT_LIMIT + 1)));
    }
}
