//! Constant folding pass
//!
//! Evaluates expressions whose operands are all literals:
//!
//! ```js
//! 1 + 2          // => 3
//! "a" + "b"      // => "ab"
//! !0             // => true
//! !![]           // => true
//! atob("aGk=")   // => "hi"
//! ```
//!
//! Expressions containing identifiers are never folded.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use oxc_ast::ast::*;
use oxc_span::SPAN;
use oxc_syntax::number::NumberBase;
use oxc_traverse::{Traverse, TraverseCtx};

use crate::transforms::state::EngineState;

pub type Ctx<'a> = TraverseCtx<'a, EngineState>;

#[derive(Default)]
pub struct ConstantFolder {
    changes: usize,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }

    fn try_fold_binary<'a>(
        &mut self,
        expr: &BinaryExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        if let (Expression::StringLiteral(left), Expression::StringLiteral(right)) =
            (&expr.left, &expr.right)
        {
            return self.fold_string_pair(left.value.as_str(), right.value.as_str(), expr.operator, ctx);
        }

        let left = Self::extract_number(&expr.left)?;
        let right = Self::extract_number(&expr.right)?;

        if let Some(result) = Self::eval_arithmetic(left, right, expr.operator) {
            eprintln!("[FOLD] {} {:?} {} = {}", left, expr.operator, right, result);
            self.changes += 1;
            return Some(Self::make_number(result, ctx));
        }

        let result = match expr.operator {
            BinaryOperator::StrictEquality | BinaryOperator::Equality => left == right,
            BinaryOperator::StrictInequality | BinaryOperator::Inequality => left != right,
            BinaryOperator::LessThan => left < right,
            BinaryOperator::LessEqualThan => left <= right,
            BinaryOperator::GreaterThan => left > right,
            BinaryOperator::GreaterEqualThan => left >= right,
            _ => return None,
        };
        eprintln!("[FOLD] {} {:?} {} = {}", left, expr.operator, right, result);
        self.changes += 1;
        Some(Self::make_boolean(result, ctx))
    }

    fn fold_string_pair<'a>(
        &mut self,
        left: &str,
        right: &str,
        operator: BinaryOperator,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let result = match operator {
            BinaryOperator::Addition => {
                let mut joined = String::with_capacity(left.len() + right.len());
                joined.push_str(left);
                joined.push_str(right);
                eprintln!("[FOLD] \"{}\" + \"{}\"", left, right);
                self.changes += 1;
                return Some(Self::make_string(&joined, ctx));
            }
            BinaryOperator::StrictEquality | BinaryOperator::Equality => left == right,
            BinaryOperator::StrictInequality | BinaryOperator::Inequality => left != right,
            // JS compares strings by code unit; lexicographic `str` order
            // agrees for non-surrogate content.
            BinaryOperator::LessThan => left < right,
            BinaryOperator::LessEqualThan => left <= right,
            BinaryOperator::GreaterThan => left > right,
            BinaryOperator::GreaterEqualThan => left >= right,
            _ => return None,
        };
        eprintln!("[FOLD] \"{}\" {:?} \"{}\" = {}", left, operator, right, result);
        self.changes += 1;
        Some(Self::make_boolean(result, ctx))
    }

    fn eval_arithmetic(left: i64, right: i64, operator: BinaryOperator) -> Option<i64> {
        match operator {
            BinaryOperator::Addition => left.checked_add(right),
            BinaryOperator::Subtraction => left.checked_sub(right),
            BinaryOperator::Multiplication => left.checked_mul(right),
            BinaryOperator::Division => {
                // Only exact quotients; JS division is not integral.
                if right == 0 || left % right != 0 {
                    return None;
                }
                left.checked_div(right)
            }
            BinaryOperator::Remainder => {
                if right == 0 {
                    return None;
                }
                left.checked_rem(right)
            }
            BinaryOperator::BitwiseAnd => Some((left as i32 & right as i32) as i64),
            BinaryOperator::BitwiseOR => Some((left as i32 | right as i32) as i64),
            BinaryOperator::BitwiseXOR => Some((left as i32 ^ right as i32) as i64),
            BinaryOperator::ShiftLeft => {
                let shift = (right & 0x1F) as u32;
                Some(((left as i32) << shift) as i64)
            }
            BinaryOperator::ShiftRight => {
                let shift = (right & 0x1F) as u32;
                Some(((left as i32) >> shift) as i64)
            }
            BinaryOperator::ShiftRightZeroFill => {
                let shift = (right & 0x1F) as u32;
                Some(((left as u32) >> shift) as i64)
            }
            _ => None,
        }
    }

    fn try_fold_logical<'a>(
        &mut self,
        expr: &LogicalExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let left = Self::literal_truthiness(&expr.left)?;
        let right = Self::literal_truthiness(&expr.right)?;

        let result = match expr.operator {
            LogicalOperator::And => left && right,
            LogicalOperator::Or => left || right,
            LogicalOperator::Coalesce => return None,
        };
        self.changes += 1;
        Some(Self::make_boolean(result, ctx))
    }

    fn try_fold_unary<'a>(
        &mut self,
        expr: &UnaryExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        match expr.operator {
            UnaryOperator::LogicalNot => {
                let value = Self::literal_truthiness(&expr.argument)?;
                eprintln!("[FOLD] !{} = {}", value, !value);
                self.changes += 1;
                Some(Self::make_boolean(!value, ctx))
            }
            UnaryOperator::UnaryNegation => {
                // Leave negative literals alone; `-1` is already canonical.
                None
            }
            UnaryOperator::BitwiseNot => {
                let value = Self::extract_number(&expr.argument)?;
                self.changes += 1;
                Some(Self::make_number(!(value as i32) as i64, ctx))
            }
            UnaryOperator::UnaryPlus => {
                let value = Self::extract_number(&expr.argument)?;
                self.changes += 1;
                Some(Self::make_number(value, ctx))
            }
            _ => None,
        }
    }

    /// Fold `atob("...")` with a constant argument.
    fn try_fold_atob<'a>(
        &mut self,
        call: &CallExpression<'a>,
        ctx: &mut Ctx<'a>,
    ) -> Option<Expression<'a>> {
        let Expression::Identifier(callee) = &call.callee else {
            return None;
        };
        if callee.name.as_str() != "atob" || call.arguments.len() != 1 {
            return None;
        }
        let Argument::StringLiteral(arg) = &call.arguments[0] else {
            return None;
        };

        let bytes = BASE64_STANDARD.decode(arg.value.as_bytes()).ok()?;
        let decoded = String::from_utf8(bytes).ok()?;
        eprintln!("[FOLD] atob(\"{}\") = \"{}\"", arg.value, decoded);
        self.changes += 1;
        Some(Self::make_string(&decoded, ctx))
    }

    fn extract_number(expr: &Expression<'_>) -> Option<i64> {
        match expr {
            Expression::NumericLiteral(lit) => {
                let value = lit.value;
                if value.fract() != 0.0 || value > i64::MAX as f64 || value < i64::MIN as f64 {
                    return None;
                }
                Some(value as i64)
            }
            Expression::UnaryExpression(unary)
                if unary.operator == UnaryOperator::UnaryNegation =>
            {
                Self::extract_number(&unary.argument)?.checked_neg()
            }
            _ => None,
        }
    }

    /// Truthiness of a literal value. `None` for anything that is not a
    /// side-effect-free literal; identifiers are never folded.
    fn literal_truthiness(expr: &Expression<'_>) -> Option<bool> {
        match expr {
            Expression::BooleanLiteral(lit) => Some(lit.value),
            Expression::NumericLiteral(lit) => Some(lit.value != 0.0 && !lit.value.is_nan()),
            Expression::StringLiteral(lit) => Some(!lit.value.is_empty()),
            Expression::NullLiteral(_) => Some(false),
            // `[]` and `{}` are truthy as values; only side-effect-free
            // literals qualify.
            Expression::ArrayExpression(arr) if arr.elements.is_empty() => Some(true),
            Expression::ObjectExpression(obj) if obj.properties.is_empty() => Some(true),
            _ => None,
        }
    }

    fn make_number<'a>(value: i64, ctx: &mut Ctx<'a>) -> Expression<'a> {
        let raw = Some(ctx.ast.atom(&value.to_string()));
        Expression::NumericLiteral(ctx.ast.alloc(NumericLiteral {
            span: SPAN,
            value: value as f64,
            raw,
            base: NumberBase::Decimal,
        }))
    }

    fn make_boolean<'a>(value: bool, ctx: &mut Ctx<'a>) -> Expression<'a> {
        Expression::BooleanLiteral(ctx.ast.alloc(BooleanLiteral { span: SPAN, value }))
    }

    fn make_string<'a>(value: &str, ctx: &mut Ctx<'a>) -> Expression<'a> {
        Expression::StringLiteral(ctx.ast.alloc(StringLiteral {
            span: SPAN,
            value: ctx.ast.atom(value),
            raw: None,
            lone_surrogates: false,
        }))
    }
}

impl<'a> Traverse<'a, EngineState> for ConstantFolder {
    fn exit_expression(&mut self, expr: &mut Expression<'a>, ctx: &mut Ctx<'a>) {
        let replacement = match expr {
            Expression::BinaryExpression(binary) => self.try_fold_binary(binary, ctx),
            Expression::LogicalExpression(logical) => self.try_fold_logical(logical, ctx),
            Expression::UnaryExpression(unary) => self.try_fold_unary(unary, ctx),
            Expression::CallExpression(call) => self.try_fold_atob(call, ctx),
            _ => None,
        };
        if let Some(new_expr) = replacement {
            *expr = new_expr;
        }
    }
}

pub fn run<'a>(
    program: &mut Program<'a>,
    state: &mut EngineState,
    allocator: &'a oxc_allocator::Allocator,
) -> usize {
    crate::transforms::run_pass(program, state, allocator, |pass: &mut ConstantFolder| {
        pass.changes()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_semantic::SemanticBuilder;
    use oxc_span::SourceType;
    use oxc_traverse::{traverse_mut_with_ctx, ReusableTraverseCtx};

    fn run_fold(code: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let mut program = ret.program;

        let mut folder = ConstantFolder::new();
        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();
        let mut ctx = ReusableTraverseCtx::new(EngineState::new(), scoping, &allocator);
        traverse_mut_with_ctx(&mut folder, &mut program, &mut ctx);

        (Codegen::new().build(&program).code, folder.changes())
    }

    #[test]
    fn test_fold_arithmetic() {
        let (output, _) = run_fold("x(1 + 2 * 3);");
        assert!(output.contains("x(7)"), "got: {}", output);
    }

    #[test]
    fn test_fold_string_concat() {
        let (output, _) = run_fold(r#"x("de" + "bug" + "ger");"#);
        assert!(output.contains(r#"x("debugger")"#), "got: {}", output);
    }

    #[test]
    fn test_fold_not_zero_and_one() {
        let (output, _) = run_fold("x(!0, !1);");
        assert!(output.contains("x(true, false)"), "got: {}", output);
    }

    #[test]
    fn test_fold_bang_array() {
        let (output, _) = run_fold("x(![], !![]);");
        assert!(output.contains("x(false, true)"), "got: {}", output);
    }

    #[test]
    fn test_fold_string_comparisons() {
        let (output, _) = run_fold(r#"x("a" < "b", "b" <= "a", "b" > "a", "a" >= "b");"#);
        assert!(output.contains("x(true, false, true, false)"), "got: {}", output);
    }

    #[test]
    fn test_fold_string_equality() {
        let (output, _) = run_fold(r#"x("k" === "k", "k" !== "k");"#);
        assert!(output.contains("x(true, false)"), "got: {}", output);
    }

    #[test]
    fn test_no_fold_identifiers() {
        let (output, count) = run_fold("x(a + 1);");
        assert_eq!(count, 0, "must not fold identifier operand");
        assert!(output.contains("a + 1"), "got: {}", output);
    }

    #[test]
    fn test_no_fold_inexact_division() {
        let (output, count) = run_fold("x(7 / 2);");
        assert_eq!(count, 0, "7 / 2 is not integral");
        assert!(output.contains("7 / 2"), "got: {}", output);
    }

    #[test]
    fn test_fold_exact_division() {
        let (output, _) = run_fold("x(8 / 2);");
        assert!(output.contains("x(4)"), "got: {}", output);
    }

    #[test]
    fn test_fold_comparison() {
        let (output, _) = run_fold("x(2 < 3, 2 === 3);");
        assert!(output.contains("x(true, false)"), "got: {}", output);
    }

    #[test]
    fn test_fold_atob() {
        let (output, _) = run_fold(r#"x(atob("aGVsbG8="));"#);
        assert!(output.contains(r#"x("hello")"#), "got: {}", output);
    }

    #[test]
    fn test_keep_void() {
        let (output, count) = run_fold("x(void 0);");
        assert_eq!(count, 0, "void stays untouched");
        assert!(output.contains("void 0"), "got: {}", output);
    }
}
