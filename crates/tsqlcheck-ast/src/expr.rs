//! Scalar and boolean expression nodes.

use crate::span::Span;
use crate::stmt::TypeName;

/// An expression producing a scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    /// Integer literal: `42`.
    IntLiteral {
        /// The literal value.
        value: i64,
        /// Source location.
        span: Span,
    },
    /// String literal: `'apples'` or `N'apples'`.
    StringLiteral {
        /// The literal text without quotes.
        value: String,
        /// True for `N'...'` (national character) literals.
        national: bool,
        /// Source location.
        span: Span,
    },
    /// Decimal/money literal kept as written: `1.50`.
    NumericLiteral {
        /// The literal text.
        value: String,
        /// Source location.
        span: Span,
    },
    /// Floating-point literal: `1.5e3`.
    RealLiteral {
        /// The literal text.
        value: String,
        /// Source location.
        span: Span,
    },
    /// The `NULL` keyword used as a value.
    NullLiteral {
        /// Source location.
        span: Span,
    },
    /// A `@variable` or `@@global` reference.
    Variable {
        /// Name including the `@`/`@@` prefix.
        name: String,
        /// Source location.
        span: Span,
    },
    /// A possibly qualified column reference: `name` or `t.name`.
    ColumnRef {
        /// Dotted parts, last one being the column name.
        parts: Vec<String>,
        /// Source location.
        span: Span,
    },
    /// Arithmetic over two scalars.
    BinaryMath {
        /// The operator.
        op: MathOp,
        /// Left operand.
        left: Box<ScalarExpr>,
        /// Right operand.
        right: Box<ScalarExpr>,
        /// Source location.
        span: Span,
    },
    /// A function invocation, built-in or user-defined.
    FunctionCall {
        /// Possibly schema-qualified function name.
        name: String,
        /// Argument expressions in order.
        args: Vec<ScalarExpr>,
        /// Source location.
        span: Span,
    },
    /// `CAST(expr AS type)`.
    Cast {
        /// The expression being converted.
        expr: Box<ScalarExpr>,
        /// Target type.
        ty: TypeName,
        /// Source location.
        span: Span,
    },
    /// `CASE WHEN cond THEN value ... [ELSE value] END`.
    SearchedCase {
        /// The WHEN/THEN pairs in order.
        whens: Vec<(BooleanExpr, ScalarExpr)>,
        /// The ELSE arm, if present.
        else_expr: Option<Box<ScalarExpr>>,
        /// Source location.
        span: Span,
    },
    /// `CASE input WHEN value THEN value ... [ELSE value] END`.
    SimpleCase {
        /// The expression each WHEN is compared against.
        input: Box<ScalarExpr>,
        /// The WHEN/THEN pairs in order.
        whens: Vec<(ScalarExpr, ScalarExpr)>,
        /// The ELSE arm, if present.
        else_expr: Option<Box<ScalarExpr>>,
        /// Source location.
        span: Span,
    },
}

impl ScalarExpr {
    /// Source location of this expression.
    pub fn span(&self) -> Span {
        match self {
            ScalarExpr::IntLiteral { span, .. }
            | ScalarExpr::StringLiteral { span, .. }
            | ScalarExpr::NumericLiteral { span, .. }
            | ScalarExpr::RealLiteral { span, .. }
            | ScalarExpr::NullLiteral { span }
            | ScalarExpr::Variable { span, .. }
            | ScalarExpr::ColumnRef { span, .. }
            | ScalarExpr::BinaryMath { span, .. }
            | ScalarExpr::FunctionCall { span, .. }
            | ScalarExpr::Cast { span, .. }
            | ScalarExpr::SearchedCase { span, .. }
            | ScalarExpr::SimpleCase { span, .. } => *span,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// True for `=`, `<>` and `!=`; false for the ordering operators.
    pub fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// An expression producing a boolean (search condition).
#[derive(Debug, Clone, PartialEq)]
pub enum BooleanExpr {
    /// `left op right`.
    Comparison {
        /// The operator.
        op: CompareOp,
        /// Left operand.
        left: ScalarExpr,
        /// Right operand.
        right: ScalarExpr,
        /// Source location.
        span: Span,
    },
    /// `left AND right`.
    And {
        /// Left conjunct.
        left: Box<BooleanExpr>,
        /// Right conjunct.
        right: Box<BooleanExpr>,
        /// Source location.
        span: Span,
    },
    /// `left OR right`.
    Or {
        /// Left disjunct.
        left: Box<BooleanExpr>,
        /// Right disjunct.
        right: Box<BooleanExpr>,
        /// Source location.
        span: Span,
    },
    /// `NOT inner`.
    Not {
        /// The negated condition.
        inner: Box<BooleanExpr>,
        /// Source location.
        span: Span,
    },
    /// `expr IS [NOT] NULL`.
    IsNull {
        /// The tested expression.
        expr: ScalarExpr,
        /// True for `IS NOT NULL`.
        is_not: bool,
        /// Source location.
        span: Span,
    },
    /// `expr [NOT] IN (v1, ..., vn)`.
    In {
        /// The tested expression.
        expr: ScalarExpr,
        /// The candidate values.
        list: Vec<ScalarExpr>,
        /// True for `NOT IN`.
        is_not: bool,
        /// Source location.
        span: Span,
    },
    /// A parenthesized condition.
    Paren(Box<BooleanExpr>),
}

impl BooleanExpr {
    /// Source location of this condition.
    pub fn span(&self) -> Span {
        match self {
            BooleanExpr::Comparison { span, .. }
            | BooleanExpr::And { span, .. }
            | BooleanExpr::Or { span, .. }
            | BooleanExpr::Not { span, .. }
            | BooleanExpr::IsNull { span, .. }
            | BooleanExpr::In { span, .. } => *span,
            BooleanExpr::Paren(inner) => inner.span(),
        }
    }
}
