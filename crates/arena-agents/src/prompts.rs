//! Prompt templates for contestants and the judge.

use arena::harness::DEFAULT_ENTRY;

/// System prompt for the judge when the configuration does not provide one.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"You are the head judge of a programming tournament.
You compare candidate Python solutions to the same problem on correctness first,
then measured speed, then readability and complexity.
You are strict, specific and fair. You never reward code that failed its test.
You always answer with exactly one JSON object and nothing else."#;

/// First-round prompt.
pub fn generation_prompt(problem: &str) -> String {
    format!(
        r#"PROBLEM: {problem}

TASK: Write a Python function to solve this.
RULES:
1. Name the function '{entry}'. It takes a single argument.
2. Return ONLY the Python code inside a markdown code block ```python ... ```.
3. Do NOT include usage examples, tests or print statements, just the function."#,
        problem = problem,
        entry = DEFAULT_ENTRY,
    )
}

/// Second-round prompt: beat the leader.
pub fn refinement_prompt(
    problem: &str,
    role: &str,
    own_prior_code: &str,
    reference_code: &str,
    critique: &str,
) -> String {
    let own = if own_prior_code.trim().is_empty() {
        "(you did not produce working code)"
    } else {
        own_prior_code
    };
    format!(
        r#"PROBLEM: {problem}

--- YOUR PREVIOUS ATTEMPT ---
{own}

--- THE WINNING SOLUTION ---
{reference}

--- FEEDBACK ---
{critique}

TASK:
The winning solution beat yours. Analyze it and address the feedback.
Borrow its logic if you have to, but apply your own personality ({role}) to make it EVEN BETTER.

RULES:
1. Name the function '{entry}'. It takes a single argument.
2. Return ONLY the Python code inside a markdown code block.
3. Do NOT add explanations."#,
        problem = problem,
        own = own,
        reference = reference_code,
        critique = critique,
        role = role,
        entry = DEFAULT_ENTRY,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_prompt_names_entry() {
        let prompt = generation_prompt("factorial of n");
        assert!(prompt.starts_with("PROBLEM: factorial of n"));
        assert!(prompt.contains("Name the function 'solution'"));
    }

    #[test]
    fn test_refinement_prompt_sections() {
        let prompt = refinement_prompt(
            "double n",
            "Speed Freak",
            "",
            "def solution(n): return n << 1",
            "JUDGE'S CRITIQUE:\nuse shifts",
        );
        assert!(prompt.contains("(you did not produce working code)"));
        assert!(prompt.contains("--- THE WINNING SOLUTION ---\ndef solution(n): return n << 1"));
        assert!(prompt.contains("use shifts"));
        assert!(prompt.contains("(Speed Freak)"));
    }
}
