//! Query refinement prompt for the secondary search round.

/// Refinement prompt template. Placeholders: {query}, {papers}
const REFINE_TEMPLATE: &str = r#"You are a research assistant helping to improve a literature search query.

Original Search Query: "{query}"

Based on these relevant papers that were found:

{papers}

Task: Generate an improved, more specific search query that:
1. Extracts the most important technical keywords and concepts from these papers
2. Identifies specific methodologies, techniques, or domains mentioned
3. Restructures the query to be more precise and academic
4. Focuses on deeper, more specialized aspects of the topic
5. Uses terminology that would appear in related research papers

Requirements:
- Keep the query concise (max 15 words)
- Use technical/academic language
- Include 3-5 key concepts or methodologies from the papers
- Make it suitable for academic database searches
- Do NOT use generic words like "paper", "study", "research", "analysis"

Return ONLY the improved search query, nothing else."#;

/// Build the refinement prompt from the original query and numbered paper
/// summaries (one "Paper N: title\nAbstract: ..." block per line group).
pub fn build_refine_prompt(original_query: &str, paper_summaries: &[String]) -> String {
    REFINE_TEMPLATE
        .replace("{query}", original_query)
        .replace("{papers}", &paper_summaries.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_refine_prompt() {
        let prompt = build_refine_prompt(
            "transformer neural networks",
            &["Paper 1: BERT".to_string(), "Paper 2: GPT".to_string()],
        );
        assert!(prompt.contains("\"transformer neural networks\""));
        assert!(prompt.contains("Paper 1: BERT\nPaper 2: GPT"));
    }
}
