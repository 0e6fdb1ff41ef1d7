//! Citation extraction and answer clean-up.
//!
//! Mapping free-form model output back to sources is best effort: inline
//! markers that can be resolved are honoured, and when none resolve every
//! chunk that was placed in the prompt is cited.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::answer::Citation;
use crate::document::SearchResult;

/// `[1]`, `[2, 3]`, `[Source 4]`, `[Sources: 1, 2]`.
static NUMBERED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?i:sources?:?\s*)?(\d+(?:\s*,\s*\d+)*)\]").expect("valid regex")
});

/// Markdown links such as `(Source: [GST Guide](https://...))`.
static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"));

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*\n?").expect("valid regex"));

/// A digit immediately followed by letters or an opening parenthesis. A
/// closing parenthesis is not separated: `(section 10)` must stay intact.
static GLUED_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)([A-Za-z]+|\()").expect("valid regex"));

/// Resolve the citations of `answer` against the results that were in the prompt.
///
/// `results` must be in prompt order: the `n`-th result is passage `[n]`.
/// Returned citations are deduplicated and ordered by passage number, and
/// every one of them refers to an element of `results`.
pub fn extract_citations(answer: &str, results: &[SearchResult]) -> Vec<Citation> {
    if results.is_empty() {
        return Vec::new();
    }

    let mut cited: BTreeSet<usize> = BTreeSet::new();

    for caps in NUMBERED_MARKER.captures_iter(answer) {
        for number in caps[1].split(',') {
            if let Ok(n) = number.trim().parse::<usize>() {
                if (1..=results.len()).contains(&n) {
                    cited.insert(n);
                }
            }
        }
    }

    for caps in MARKDOWN_LINK.captures_iter(answer) {
        let label = caps[1].trim();
        let url = caps[2].trim();
        // Results are in descending similarity, so the first match is the
        // best-ranked passage of that source.
        let found = results.iter().position(|r| {
            r.chunk.source_uri() == Some(url)
                || r.chunk.title().is_some_and(|t| t.eq_ignore_ascii_case(label))
        });
        if let Some(i) = found {
            cited.insert(i + 1);
        }
    }

    if cited.is_empty() {
        return results.iter().enumerate().map(|(i, r)| Citation::from_result(i + 1, r)).collect();
    }

    cited.into_iter().map(|n| Citation::from_result(n, &results[n - 1])).collect()
}

/// Clean up common formatting problems in model output.
///
/// Code fences and backticks are removed (answers are prose), and a number
/// glued to the following word or parenthesis gets a space, e.g.
/// `$75,000or more` → `$75,000 or more`. URLs, ordinal or plural suffixes
/// (`1st`, `2nd`, `1990s`) and a number closing a parenthesis are left alone.
pub fn sanitize_response(text: &str) -> String {
    let without_fences = CODE_FENCE.replace_all(text, "");
    let without_ticks = without_fences.replace('`', "");

    let mut out = String::with_capacity(without_ticks.len());
    let mut rest = without_ticks.as_str();
    while !rest.is_empty() {
        let ws = rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len());
        out.push_str(&rest[..ws]);
        rest = &rest[ws..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        out.push_str(&separate_glued_digits(&rest[..end]));
        rest = &rest[end..];
    }
    out.trim_end().to_string()
}

fn separate_glued_digits(token: &str) -> String {
    if token.contains("://") || token.contains("](") {
        return token.to_string();
    }
    GLUED_DIGITS
        .replace_all(token, |caps: &Captures| {
            let suffix = &caps[2];
            if matches!(suffix.to_ascii_lowercase().as_str(), "st" | "nd" | "rd" | "th" | "s") {
                caps[0].to_string()
            } else {
                format!("{} {}", &caps[1], suffix)
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{Chunk, SOURCE_URI_KEY, TITLE_KEY};

    fn result(id: &str, title: &str, uri: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.to_string(),
                document_id: id.trim_end_matches(|c: char| c.is_ascii_digit() || c == '_').to_string(),
                ordinal: 0,
                text: String::new(),
                embedding: Vec::new(),
                metadata: HashMap::from([
                    (TITLE_KEY.to_string(), title.to_string()),
                    (SOURCE_URI_KEY.to_string(), uri.to_string()),
                ]),
            },
            score,
        }
    }

    fn results() -> Vec<SearchResult> {
        vec![
            result("gst_0", "GST Guide", "https://ato.example/gst", 0.9),
            result("bas_0", "BAS Basics", "https://ato.example/bas", 0.8),
            result("fbt_0", "FBT Rules", "https://ato.example/fbt", 0.7),
        ]
    }

    fn ids(citations: &[Citation]) -> Vec<&str> {
        citations.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn numbered_markers_are_mapped() {
        let answer = "Register once turnover reaches $75,000 [1]. Lodge quarterly [3, 1].";
        let citations = extract_citations(answer, &results());
        assert_eq!(ids(&citations), ["gst_0", "fbt_0"]);
        assert_eq!(citations[0].index, 1);
        assert_eq!(citations[1].index, 3);
    }

    #[test]
    fn source_prefixed_markers_are_mapped() {
        let citations = extract_citations("See [Source 2] and [sources: 3].", &results());
        assert_eq!(ids(&citations), ["bas_0", "fbt_0"]);
    }

    #[test]
    fn markdown_links_match_by_url_or_title() {
        let answer = "Threshold is $75,000 (Source: [GST Guide](https://ato.example/gst)). \
                      Also (Source: [bas basics](https://elsewhere.example)).";
        let citations = extract_citations(answer, &results());
        assert_eq!(ids(&citations), ["gst_0", "bas_0"]);
    }

    #[test]
    fn out_of_range_markers_fall_back_to_everything() {
        let citations = extract_citations("Nothing resolvable [7] here.", &results());
        assert_eq!(ids(&citations), ["gst_0", "bas_0", "fbt_0"]);
    }

    #[test]
    fn unmarked_answer_cites_all_retrieved() {
        let citations = extract_citations("The threshold is $75,000.", &results());
        assert_eq!(citations.len(), 3);
        assert_eq!(citations[2].title.as_deref(), Some("FBT Rules"));
    }

    #[test]
    fn no_results_means_no_citations() {
        assert!(extract_citations("[1]", &[]).is_empty());
    }

    #[test]
    fn sanitize_strips_code_formatting() {
        let raw = "```text\nTax = 1,000 * 0.1\n```\nUse `GST` here.";
        assert_eq!(sanitize_response(raw), "Tax = 1,000 * 0.1\nUse GST here.");
    }

    #[test]
    fn sanitize_separates_glued_numbers() {
        assert_eq!(sanitize_response("$75,000or more"), "$75,000 or more");
        assert_eq!(sanitize_response("10(a) applies"), "10 (a) applies");
    }

    #[test]
    fn sanitize_keeps_closing_parentheses() {
        let text = "Penalties apply (see section 10) from 1 July (2024).";
        assert_eq!(sanitize_response(text), text);
    }

    #[test]
    fn sanitize_keeps_ordinals_and_urls() {
        let text = "The 1st of July, 1990s rules, see https://ato.example/gst2024a.";
        assert_eq!(sanitize_response(text), text);
    }
}
