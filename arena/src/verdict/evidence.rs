//! Evidence document sent to the judge.

use std::fmt::Write;

use crate::harness::DID_NOT_COMPLETE_SECS;
use crate::submission::Submission;

/// Render round-1 evidence plus the standing rules and the expected reply shape.
pub(crate) fn build(problem: &str, round_one: &[Submission]) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "You are the judge of a code tournament.\n");
    let _ = writeln!(doc, "PROBLEM:\n{}\n", problem.trim());
    let _ = writeln!(doc, "ROUND 1 SUBMISSIONS:");

    for sub in round_one {
        let status = if sub.success { "SUCCESS" } else { "FAILED" };
        let timing = if sub.execution_time >= DID_NOT_COMPLETE_SECS {
            "did not complete".to_string()
        } else {
            format!("{:.6}s", sub.execution_time)
        };
        let _ = writeln!(doc, "\n=== Agent: {} ===", sub.agent);
        let _ = writeln!(doc, "Status: {}", status);
        let _ = writeln!(doc, "Message: {}", sub.message);
        let _ = writeln!(doc, "Execution time: {}", timing);
        let _ = writeln!(doc, "Complexity: {}", sub.complexity);
        let _ = writeln!(doc, "Code:\n```python\n{}\n```", sub.code.trim_end());
    }

    let eligible: Vec<&str> = round_one
        .iter()
        .filter(|s| s.success)
        .map(|s| s.agent.as_str())
        .collect();

    let _ = writeln!(doc, "\nRULES:");
    let _ = writeln!(
        doc,
        "- You cannot pick an agent whose status is FAILED. Eligible winners: {}.",
        eligible.join(", ")
    );
    let _ = writeln!(doc, "- Prefer correct code first, then speed, then simplicity.");
    let _ = writeln!(
        doc,
        "- Write a short, concrete critique for every agent other than the winner."
    );
    let _ = writeln!(doc, "\nReply with ONLY one JSON object of this form:");
    let _ = write!(
        doc,
        "{{\"winner\": \"<agent name>\", \"critiques\": {{\"<agent name>\": \"<critique>\"}}, \"reasoning\": \"<why>\"}}"
    );
    doc
}
