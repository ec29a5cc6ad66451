use std::sync::LazyLock;

use regex::Regex;

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static digit pattern"));

/// System prompt instructing the scoring model to judge a candidate answer
/// against the reference under a fixed rubric, parameterized by the test
/// case's maximum score, and to reply with exactly one integer.
pub fn scoring_system_prompt(max_score: u32) -> String {
    format!(
        r#"You are a rigorous, fact-focused evaluation expert. Your task is to judge, based on the reference answer, whether the model's answer accurately and completely resolves the user's question.

Follow these evaluation steps strictly:

**Step 1: Key fact check**
1. Read the reference answer and extract every key fact it contains, especially numbers, prices, locations and proper nouns.
2. Check the model's answer for each of those key facts, one by one.
3. Verify that any numbers or prices in the model's answer match the reference answer exactly. A mismatch is a serious error.

**Step 2: Semantic and intent check**
1. Judge whether the overall meaning of the model's answer matches the core intent of the reference answer, and whether it actually answers the original question.
2. The reference answer is only a baseline and may be incomplete. The model's answer may contain additional correct, relevant information; that must not be penalized and may count in its favor.
3. Ignore immaterial wording differences.

**Step 3: Final score**
1. Combine the analysis above into one final score out of {max_score}.
2. Scoring bands:
    *   **Full score ({max_score})**: the model's answer covers every key fact in the reference answer with all figures exactly right, possibly adding useful correct detail.
    *   **High (7-{high})**: covers essentially all key facts but misses a minor point or phrases something imperfectly.
    *   **Middle (4-6)**: misses an important fact, or contains a numeric error that does not affect the core intent.
    *   **Low (1-3)**: contains a serious factual error (e.g. a wrong price or address), or barely addresses the question.
    *   **0**: an entirely wrong answer, or harmful fabrication.

**Output requirement:**
After completing the steps above, output only a single Arabic numeral as your final score. No explanation, reasoning, headings or any other text."#,
        max_score = max_score,
        high = max_score.saturating_sub(1),
    )
}

/// User message carrying the question, the reference answer and the
/// candidate answer to be judged.
pub fn scoring_user_message(question: &str, reference: &str, candidate: &str) -> String {
    format!(
        r#"
---
**Question:**
{question}

---
**Reference answer (source of facts):**
{reference}

---
**Model's answer (object under evaluation):**
{candidate}
"#
    )
}

/// Parse the first run of decimal digits in the trimmed response as the
/// score. Defaults to 0 when no digits are found or the number overflows.
pub fn parse_score(content: &str) -> u32 {
    DIGITS
        .find(content.trim())
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_integer() {
        assert_eq!(parse_score("9"), 9);
        assert_eq!(parse_score("  10  \n"), 10);
    }

    #[test]
    fn parses_first_digit_run_in_noisy_output() {
        assert_eq!(parse_score("Final score: 7 out of 10"), 7);
        assert_eq!(parse_score("8/10"), 8);
    }

    #[test]
    fn defaults_to_zero_without_digits() {
        assert_eq!(parse_score("no idea"), 0);
        assert_eq!(parse_score(""), 0);
    }

    #[test]
    fn prompt_names_the_max_score_bands() {
        let prompt = scoring_system_prompt(10);
        assert!(prompt.contains("out of 10"));
        assert!(prompt.contains("Full score (10)"));
        assert!(prompt.contains("High (7-9)"));
        assert!(prompt.contains("single Arabic numeral"));
    }

    #[test]
    fn user_message_sections_are_ordered() {
        let msg = scoring_user_message("Q", "R", "C");
        let q = msg.find("**Question:**").unwrap();
        let r = msg.find("**Reference answer").unwrap();
        let c = msg.find("**Model's answer").unwrap();
        assert!(q < r && r < c);
    }
}
