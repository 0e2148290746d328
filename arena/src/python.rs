//! Python source analysis with tree-sitter-python.
//!
//! Candidate code is never imported into this process. Everything the core needs
//! to know statically (does it parse, which callable is the entry point, which
//! function is scored) comes from the syntax tree built here.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::{LanguageError, Node, Parser, Tree};

/// Module-level name a candidate may assign to declare its entry point.
pub const ENTRY_DECLARATION: &str = "__entry__";

/// The parser itself could not run. This is a host problem, never a verdict on
/// the candidate.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("python grammar is incompatible with the tree-sitter runtime: {0}")]
    Language(#[from] LanguageError),

    #[error("parser produced no tree")]
    NoTree,
}

/// Location of the first syntax error in a source text (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxErrorLocation {
    pub line: usize,
    pub column: usize,
    /// Token the parser expected but did not find, when known.
    pub missing: Option<String>,
}

impl std::fmt::Display for SyntaxErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.missing {
            Some(token) => write!(
                f,
                "expected '{}' at line {}, column {}",
                token, self.line, self.column
            ),
            None => write!(
                f,
                "invalid syntax at line {}, column {}",
                self.line, self.column
            ),
        }
    }
}

/// Kind of a top-level callable binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Function,
    Class,
    Lambda,
}

/// A module-level name bound to something callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableBinding {
    pub name: String,
    pub kind: BindingKind,
    /// Line of the binding (1-indexed).
    pub line: usize,
}

/// A parsed Python module.
pub struct PythonModule<'a> {
    source: &'a str,
    tree: Tree,
}

impl<'a> PythonModule<'a> {
    /// Parse `source`. Invalid Python still yields a tree (see
    /// [`Self::syntax_error`]); an error means the parser could not run at all.
    pub fn parse(source: &'a str) -> Result<Self, ParserError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        let tree = parser.parse(source, None).ok_or(ParserError::NoTree)?;
        Ok(Self { source, tree })
    }

    fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    /// Whether the tree contains any error or missing node.
    pub fn has_errors(&self) -> bool {
        self.root().has_error()
    }

    /// First syntax error in source order, if any.
    pub fn syntax_error(&self) -> Option<SyntaxErrorLocation> {
        let root = self.root();
        if !root.has_error() {
            return None;
        }
        Some(Self::find_error(root).unwrap_or(SyntaxErrorLocation {
            line: root.start_position().row + 1,
            column: root.start_position().column + 1,
            missing: None,
        }))
    }

    fn find_error(node: Node<'_>) -> Option<SyntaxErrorLocation> {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return Some(SyntaxErrorLocation {
                line: pos.row + 1,
                column: pos.column + 1,
                missing: node.is_missing().then(|| node.kind().to_string()),
            });
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.has_error() {
                if let Some(loc) = Self::find_error(child) {
                    return Some(loc);
                }
            }
        }
        None
    }

    /// Module-level callable bindings in declaration order.
    pub fn top_level_callables(&self) -> Vec<CallableBinding> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter_map(|node| self.binding_of(node))
            .collect()
    }

    fn binding_of(&self, node: Node<'_>) -> Option<CallableBinding> {
        let line = node.start_position().row + 1;
        match node.kind() {
            "function_definition" | "class_definition" => {
                let name = node.child_by_field_name("name")?;
                let kind = if node.kind() == "class_definition" {
                    BindingKind::Class
                } else {
                    BindingKind::Function
                };
                Some(CallableBinding {
                    name: self.text(name).to_string(),
                    kind,
                    line,
                })
            }
            "decorated_definition" => {
                let inner = node.child_by_field_name("definition")?;
                self.binding_of(inner).map(|b| CallableBinding { line, ..b })
            }
            "expression_statement" => {
                let assignment = node.named_child(0)?;
                if assignment.kind() != "assignment" {
                    return None;
                }
                let left = assignment.child_by_field_name("left")?;
                let right = assignment.child_by_field_name("right")?;
                if left.kind() != "identifier" || right.kind() != "lambda" {
                    return None;
                }
                Some(CallableBinding {
                    name: self.text(left).to_string(),
                    kind: BindingKind::Lambda,
                    line,
                })
            }
            _ => None,
        }
    }

    /// Entry symbol declared by a module-level `__entry__ = "name"` assignment.
    pub fn declared_entry(&self) -> Option<String> {
        let root = self.root();
        let mut cursor = root.walk();
        let statements: Vec<Node<'_>> = root.named_children(&mut cursor).collect();
        statements.into_iter().find_map(|node| {
            if node.kind() != "expression_statement" {
                return None;
            }
            let assignment = node.named_child(0).filter(|n| n.kind() == "assignment")?;
            let left = assignment.child_by_field_name("left")?;
            let right = assignment.child_by_field_name("right")?;
            if self.text(left) != ENTRY_DECLARATION || right.kind() != "string" {
                return None;
            }
            let name = self
                .text(right)
                .trim_matches(|c| c == '"' || c == '\'')
                .trim();
            (!name.is_empty()).then(|| name.to_string())
        })
    }

    /// The function that gets scored: the first top-level function, or failing
    /// that the first function anywhere in the tree (e.g. a method).
    pub fn first_function(&self) -> Option<Node<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        let top_level = root.named_children(&mut cursor).find_map(|node| match node.kind() {
            "function_definition" => Some(node),
            "decorated_definition" => node
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition"),
            _ => None,
        });
        top_level.or_else(|| Self::find_kind(root, "function_definition"))
    }

    fn find_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        if node.kind() == kind {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        children
            .into_iter()
            .find_map(|child| Self::find_kind(child, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_loads_into_runtime() {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        assert!(PythonModule::parse("").is_ok());
    }

    #[test]
    fn test_valid_source_has_no_error() {
        let module = PythonModule::parse("def solution(n):\n    return n * 2\n").unwrap();
        assert!(!module.has_errors());
        assert!(module.syntax_error().is_none());
    }

    #[test]
    fn test_missing_colon_is_reported() {
        let src = "def solution(n)  # Missing colon\n    return n\n";
        let module = PythonModule::parse(src).unwrap();
        let err = module.syntax_error().expect("syntax error");
        assert!(err.line <= 2, "unexpected location {err}");
        assert!(err.to_string().contains("at line"));
    }

    #[test]
    fn test_top_level_callables_in_source_order() {
        let src = "\
import math

CONST = 3

class Helper:
    pass

@staticmethod
def decorated(x):
    return x

square = lambda x: x * x

def solution(n):
    return n
";
        let module = PythonModule::parse(src).unwrap();
        let names: Vec<_> = module
            .top_level_callables()
            .into_iter()
            .map(|b| (b.name, b.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Helper".to_string(), BindingKind::Class),
                ("decorated".to_string(), BindingKind::Function),
                ("square".to_string(), BindingKind::Lambda),
                ("solution".to_string(), BindingKind::Function),
            ]
        );
    }

    #[test]
    fn test_nested_defs_are_not_top_level() {
        let src = "def outer(n):\n    def inner(m):\n        return m\n    return inner(n)\n";
        let module = PythonModule::parse(src).unwrap();
        let callables = module.top_level_callables();
        assert_eq!(callables.len(), 1);
        assert_eq!(callables[0].name, "outer");
    }

    #[test]
    fn test_declared_entry() {
        let src = "__entry__ = \"fast_sum\"\n\ndef fast_sum(xs):\n    return sum(xs)\n";
        let module = PythonModule::parse(src).unwrap();
        assert_eq!(module.declared_entry().as_deref(), Some("fast_sum"));

        let module = PythonModule::parse("def solution(n):\n    return n\n").unwrap();
        assert_eq!(module.declared_entry(), None);
    }

    #[test]
    fn test_first_function_falls_back_to_method() {
        let src = "class Solver:\n    def run(self, n):\n        return n\n";
        let module = PythonModule::parse(src).unwrap();
        let func = module.first_function().expect("method found");
        assert_eq!(func.kind(), "function_definition");
    }
}
