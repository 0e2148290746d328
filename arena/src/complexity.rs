//! Cyclomatic complexity of candidate source.
//!
//! The score is computed over the first defined function (see
//! [`PythonModule::first_function`]) using the classical decision-point rules.
//! Scoring never fails: unparseable source, or source without any function,
//! scores [`COMPLEXITY_PENALTY`].

use tracing::error;
use tree_sitter::Node;

use crate::python::PythonModule;

/// Score assigned when the source cannot be parsed or has no function to score.
pub const COMPLEXITY_PENALTY: u32 = 100;

/// Compute the complexity score of `source`. Lower is simpler.
pub fn score(source: &str) -> u32 {
    let module = match PythonModule::parse(source) {
        Ok(module) => module,
        Err(e) => {
            error!(error = %e, "complexity scoring unavailable");
            return COMPLEXITY_PENALTY;
        }
    };
    if module.has_errors() {
        return COMPLEXITY_PENALTY;
    }
    match module.first_function() {
        Some(function) => {
            let body = function.child_by_field_name("body");
            1 + body.map(decision_points).unwrap_or(0)
        }
        None => COMPLEXITY_PENALTY,
    }
}

fn decision_points(node: Node<'_>) -> u32 {
    let own = match node.kind() {
        "if_statement" | "elif_clause" => 1,
        "for_statement" | "while_statement" => 1,
        "except_clause" | "except_group_clause" => 1,
        "assert_statement" => 1,
        "conditional_expression" | "boolean_operator" => 1,
        "for_in_clause" | "if_clause" => 1,
        "case_clause" => 1,
        // Only loop/try `else` branches add a path; `if` else does not.
        "else_clause" => match node.parent().map(|p| p.kind()) {
            Some("for_statement" | "while_statement" | "try_statement") => 1,
            _ => 0,
        },
        _ => 0,
    };

    let mut cursor = node.walk();
    let nested: u32 = node
        .named_children(&mut cursor)
        .filter(|child| {
            !matches!(
                child.kind(),
                "function_definition" | "class_definition" | "lambda" | "decorated_definition"
            )
        })
        .map(decision_points)
        .sum();

    own + nested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_function_scores_one() {
        assert_eq!(score("def solution(n):\n    return n + 1\n"), 1);
    }

    #[test]
    fn test_branchy_function_scores_higher() {
        let src = "
def solution(n):
    if n > 0:
        for i in range(n):
            if i % 2 == 0:
                print('even')
            else:
                print('odd')
    elif n < 0:
        return -1
    else:
        return 0
";
        // if, for, inner if, elif
        assert_eq!(score(src), 5);
    }

    #[test]
    fn test_broken_source_gets_penalty() {
        assert_eq!(score("def broken(:"), COMPLEXITY_PENALTY);
    }

    #[test]
    fn test_no_function_gets_penalty() {
        assert_eq!(score("x = 1\nprint(x)\n"), COMPLEXITY_PENALTY);
        assert_eq!(score(""), COMPLEXITY_PENALTY);
    }

    #[test]
    fn test_boolean_and_comprehension_points() {
        let src = "def solution(xs):\n    return [x for x in xs if x > 0 and x < 10]\n";
        // for_in_clause, if_clause, boolean_operator
        assert_eq!(score(src), 4);
    }

    #[test]
    fn test_loop_else_and_except_count() {
        let src = "
def solution(xs):
    try:
        for x in xs:
            pass
        else:
            pass
    except ValueError:
        return 0
    return 1
";
        // for, for-else, except
        assert_eq!(score(src), 4);
    }

    #[test]
    fn test_nested_function_not_counted() {
        let src = "
def solution(n):
    def helper(m):
        if m:
            return 1
        return 0
    return helper(n)
";
        assert_eq!(score(src), 1);
    }

    #[test]
    fn test_first_top_level_function_is_scored() {
        let src = "
def simple(n):
    return n

def branchy(n):
    if n:
        return 1
    return 0
";
        assert_eq!(score(src), 1);
    }
}
