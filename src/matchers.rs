//! Declarative AST pattern matching with capture slots.
//!
//! A small combinator set used where a transform's detection logic would
//! otherwise be a wall of nested `match`es:
//!
//! ```ignore
//! let (alphabet, pat) = capture(string_literal());
//! let split = call_expression(
//!     member_expression(pat, Some("split"), Some(false)),
//!     Some(vec![exact_string("|")]),
//! );
//! if split.matches_expression(init) {
//!     let order = alphabet.current_string();
//! }
//! ```
//!
//! Matchers are pure: they never mutate the tree. Capture slots hold owned
//! scalar payloads (names, string/number values), so nothing borrowed from
//! the arena escapes a match.

use std::cell::RefCell;
use std::rc::Rc;

use oxc_ast::ast::*;

/// Scalar payload recorded by a successful capture.
#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    Name(String),
    Str(String),
    Num(f64),
    Bool(bool),
    /// The inner pattern matched but has no scalar payload.
    Matched,
}

#[derive(Clone, Default)]
pub struct CaptureSlot(Rc<RefCell<Option<Captured>>>);

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value recorded by the most recent successful match.
    pub fn current(&self) -> Option<Captured> {
        self.0.borrow().clone()
    }

    pub fn current_string(&self) -> Option<String> {
        match self.current() {
            Some(Captured::Str(s)) | Some(Captured::Name(s)) => Some(s),
            _ => None,
        }
    }

    pub fn current_number(&self) -> Option<f64> {
        match self.current() {
            Some(Captured::Num(n)) => Some(n),
            _ => None,
        }
    }

    fn set(&self, value: Captured) {
        *self.0.borrow_mut() = Some(value);
    }

    fn clear(&self) {
        *self.0.borrow_mut() = None;
    }
}

pub enum Pat {
    Anything,
    Or(Vec<Pat>),
    /// Any string/numeric/boolean/null literal, or one with an exact value.
    Literal(Option<Captured>),
    /// Any string literal.
    StringLiteral,
    /// Any identifier, or one with an exact name.
    Identifier(Option<String>),
    Member {
        object: Box<Pat>,
        /// Static property name to require, if any.
        property: Option<String>,
        /// Require computed (`o[p]`) or static (`o.p`) access; `None` accepts
        /// both.
        computed: Option<bool>,
    },
    Call {
        callee: Box<Pat>,
        /// Exact argument patterns, or `None` for any arguments.
        args: Option<Vec<Pat>>,
    },
    Sequence,
    Capture {
        inner: Box<Pat>,
        slot: CaptureSlot,
    },
}

pub fn anything() -> Pat {
    Pat::Anything
}

pub fn or(alternatives: Vec<Pat>) -> Pat {
    Pat::Or(alternatives)
}

pub fn literal() -> Pat {
    Pat::Literal(None)
}

pub fn exact_string(value: &str) -> Pat {
    Pat::Literal(Some(Captured::Str(value.to_string())))
}

pub fn exact_number(value: f64) -> Pat {
    Pat::Literal(Some(Captured::Num(value)))
}

pub fn string_literal() -> Pat {
    Pat::StringLiteral
}

pub fn identifier(name: Option<&str>) -> Pat {
    Pat::Identifier(name.map(str::to_string))
}

pub fn member_expression(object: Pat, property: Option<&str>, computed: Option<bool>) -> Pat {
    Pat::Member {
        object: Box::new(object),
        property: property.map(str::to_string),
        computed,
    }
}

pub fn call_expression(callee: Pat, args: Option<Vec<Pat>>) -> Pat {
    Pat::Call {
        callee: Box::new(callee),
        args,
    }
}

pub fn sequence_expression() -> Pat {
    Pat::Sequence
}

/// Wrap `inner` so the matched scalar is recorded in the returned slot.
pub fn capture(inner: Pat) -> (CaptureSlot, Pat) {
    let slot = CaptureSlot::new();
    let pat = Pat::Capture {
        inner: Box::new(inner),
        slot: slot.clone(),
    };
    (slot, pat)
}

impl Pat {
    pub fn matches_expression(&self, expr: &Expression<'_>) -> bool {
        // Parenthesization is printer detail, not structure.
        if let Expression::ParenthesizedExpression(paren) = expr {
            return self.matches_expression(&paren.expression);
        }

        match self {
            Pat::Anything => true,
            Pat::Or(alternatives) => alternatives.iter().any(|p| p.matches_expression(expr)),
            Pat::Literal(expected) => match (literal_payload(expr), expected) {
                (Some(found), Some(want)) => found == *want,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Pat::StringLiteral => matches!(expr, Expression::StringLiteral(_)),
            Pat::Identifier(expected) => match expr {
                Expression::Identifier(ident) => expected
                    .as_deref()
                    .map_or(true, |name| ident.name.as_str() == name),
                _ => false,
            },
            Pat::Member {
                object,
                property,
                computed,
            } => match expr {
                Expression::StaticMemberExpression(member) => {
                    if *computed == Some(true) {
                        return false;
                    }
                    if let Some(name) = property {
                        if member.property.name.as_str() != name {
                            return false;
                        }
                    }
                    object.matches_expression(&member.object)
                }
                Expression::ComputedMemberExpression(member) => {
                    if *computed == Some(false) {
                        return false;
                    }
                    if let Some(name) = property {
                        let Expression::StringLiteral(key) = &member.expression else {
                            return false;
                        };
                        if key.value.as_str() != name {
                            return false;
                        }
                    }
                    object.matches_expression(&member.object)
                }
                _ => false,
            },
            Pat::Call { callee, args } => {
                let Expression::CallExpression(call) = expr else {
                    return false;
                };
                if !callee.matches_expression(&call.callee) {
                    return false;
                }
                match args {
                    None => true,
                    Some(patterns) => {
                        patterns.len() == call.arguments.len()
                            && patterns.iter().zip(call.arguments.iter()).all(|(p, a)| {
                                a.as_expression().is_some_and(|e| p.matches_expression(e))
                            })
                    }
                }
            }
            Pat::Sequence => matches!(expr, Expression::SequenceExpression(_)),
            Pat::Capture { inner, slot } => {
                if inner.matches_expression(expr) {
                    slot.set(capture_payload(expr));
                    true
                } else {
                    slot.clear();
                    false
                }
            }
        }
    }

    /// Match a `var`/`let`/`const` declaration; `kind` restricts the keyword,
    /// `declarator` must match at least one declarator.
    pub fn matches_declaration(
        decl: &VariableDeclaration<'_>,
        kind: Option<VariableDeclarationKind>,
        id: Option<&str>,
        init: &Pat,
    ) -> bool {
        if let Some(kind) = kind {
            if decl.kind != kind {
                return false;
            }
        }
        decl.declarations
            .iter()
            .any(|d| Self::matches_declarator(d, id, init))
    }

    pub fn matches_declarator(
        decl: &VariableDeclarator<'_>,
        id: Option<&str>,
        init: &Pat,
    ) -> bool {
        if let Some(name) = id {
            match &decl.id.kind {
                BindingPatternKind::BindingIdentifier(ident) => {
                    if ident.name.as_str() != name {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        match &decl.init {
            Some(expr) => init.matches_expression(expr),
            None => matches!(init, Pat::Anything),
        }
    }

    pub fn matches_for_in(stmt: &ForInStatement<'_>, left: Option<&str>, right: &Pat) -> bool {
        if let Some(name) = left {
            let matches_left = match &stmt.left {
                ForStatementLeft::AssignmentTargetIdentifier(ident) => {
                    ident.name.as_str() == name
                }
                ForStatementLeft::VariableDeclaration(decl) => {
                    decl.declarations.iter().any(|d| match &d.id.kind {
                        BindingPatternKind::BindingIdentifier(ident) => ident.name.as_str() == name,
                        _ => false,
                    })
                }
                _ => false,
            };
            if !matches_left {
                return false;
            }
        }
        right.matches_expression(&stmt.right)
    }
}

fn literal_payload(expr: &Expression<'_>) -> Option<Captured> {
    match expr {
        Expression::StringLiteral(lit) => Some(Captured::Str(lit.value.to_string())),
        Expression::NumericLiteral(lit) => Some(Captured::Num(lit.value)),
        Expression::BooleanLiteral(lit) => Some(Captured::Bool(lit.value)),
        Expression::NullLiteral(_) => Some(Captured::Matched),
        _ => None,
    }
}

fn capture_payload(expr: &Expression<'_>) -> Captured {
    match expr {
        Expression::Identifier(ident) => Captured::Name(ident.name.to_string()),
        Expression::ParenthesizedExpression(paren) => capture_payload(&paren.expression),
        _ => literal_payload(expr).unwrap_or(Captured::Matched),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn parse_expression<'a>(
        allocator: &'a Allocator,
        code: &'a str,
    ) -> oxc_ast::ast::Program<'a> {
        Parser::new(allocator, code, SourceType::mjs()).parse().program
    }

    fn first_expression<'a, 'b>(program: &'b Program<'a>) -> &'b Expression<'a> {
        match &program.body[0] {
            Statement::ExpressionStatement(stmt) => &stmt.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_match() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "foo;");
        let expr = first_expression(&program);

        assert!(identifier(None).matches_expression(expr));
        assert!(identifier(Some("foo")).matches_expression(expr));
        assert!(!identifier(Some("bar")).matches_expression(expr));
    }

    #[test]
    fn test_split_pattern_with_capture() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, r#""a|b|c".split("|");"#);
        let expr = first_expression(&program);

        let (alphabet, inner) = capture(string_literal());
        let pat = call_expression(
            member_expression(inner, Some("split"), Some(false)),
            Some(vec![exact_string("|")]),
        );

        assert!(pat.matches_expression(expr));
        assert_eq!(alphabet.current_string().as_deref(), Some("a|b|c"));
    }

    #[test]
    fn test_capture_cleared_on_mismatch() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "42;");
        let expr = first_expression(&program);

        let (slot, pat) = capture(string_literal());
        assert!(!pat.matches_expression(expr));
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_or_and_anything() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "o[\"k\"];");
        let expr = first_expression(&program);

        let pat = or(vec![
            call_expression(anything(), None),
            member_expression(identifier(Some("o")), Some("k"), Some(true)),
        ]);
        assert!(pat.matches_expression(expr));
    }

    #[test]
    fn test_member_computed_flag() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "o.k;");
        let expr = first_expression(&program);

        assert!(member_expression(anything(), Some("k"), Some(false)).matches_expression(expr));
        assert!(!member_expression(anything(), Some("k"), Some(true)).matches_expression(expr));
        assert!(member_expression(anything(), Some("k"), None).matches_expression(expr));
    }

    #[test]
    fn test_declarator_match() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "var i = 0;");
        let Statement::VariableDeclaration(decl) = &program.body[0] else {
            panic!("expected declaration");
        };

        assert!(Pat::matches_declaration(
            decl,
            Some(VariableDeclarationKind::Var),
            Some("i"),
            &exact_number(0.0),
        ));
        assert!(!Pat::matches_declaration(
            decl,
            Some(VariableDeclarationKind::Let),
            Some("i"),
            &exact_number(0.0),
        ));
    }

    #[test]
    fn test_sequence_match() {
        let allocator = Allocator::default();
        let program = parse_expression(&allocator, "a, b;");
        let expr = first_expression(&program);
        assert!(sequence_expression().matches_expression(expr));
        assert!(!sequence_expression().matches_expression(
            first_expression(&parse_expression(&allocator, "a;"))
        ));
    }
}
