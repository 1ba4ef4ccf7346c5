//! Query expression nodes: SELECT, set operations, VALUES, CTEs.

use crate::expr::{BooleanExpr, ScalarExpr};
use crate::span::Span;
use crate::stmt::ObjectName;

/// A SELECT statement: optional CTE list plus the query expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// The `WITH` list, empty when absent.
    pub ctes: Vec<CommonTableExpression>,
    /// The query body.
    pub query: QueryExpr,
    /// Source location.
    pub span: Span,
}

/// One member of a `WITH` list.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpression {
    /// Name the CTE is referenced by.
    pub name: String,
    /// Declared column aliases; empty when none were written.
    pub columns: Vec<String>,
    /// The defining query.
    pub query: QueryExpr,
    /// Source location.
    pub span: Span,
}

/// A query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// A plain query specification.
    Spec(QuerySpecification),
    /// `left UNION|INTERSECT|EXCEPT right`.
    Binary {
        /// The set operator.
        op: BinaryQueryOp,
        /// Left arm.
        left: Box<QueryExpr>,
        /// Right arm.
        right: Box<QueryExpr>,
        /// Source location.
        span: Span,
    },
    /// A `VALUES (..), (..)` table constructor.
    Values {
        /// The value rows.
        rows: Vec<Vec<ScalarExpr>>,
        /// Source location.
        span: Span,
    },
}

impl QueryExpr {
    /// Source location of this query expression.
    pub fn span(&self) -> Span {
        match self {
            QueryExpr::Spec(spec) => spec.span,
            QueryExpr::Binary { span, .. } | QueryExpr::Values { span, .. } => *span,
        }
    }
}

/// Set operators over query expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryQueryOp {
    /// `UNION` / `UNION ALL`
    Union,
    /// `INTERSECT`
    Intersect,
    /// `EXCEPT`
    Except,
}

/// `SELECT list FROM sources WHERE condition`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpecification {
    /// The select list.
    pub select: Vec<SelectElement>,
    /// The FROM sources, empty when absent.
    pub from: Vec<TableReference>,
    /// The WHERE condition, if present.
    pub where_clause: Option<BooleanExpr>,
    /// Source location.
    pub span: Span,
}

/// One element of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectElement {
    /// A scalar expression with an optional alias.
    Expr {
        /// The expression.
        expr: ScalarExpr,
        /// `AS alias`, if written.
        alias: Option<String>,
        /// Source location.
        span: Span,
    },
    /// `@var = expr`, turning the select into an assignment.
    SetVariable {
        /// The target variable, including `@`.
        name: String,
        /// The assigned expression.
        expr: ScalarExpr,
        /// Source location.
        span: Span,
    },
    /// `*` or `qualifier.*`.
    Star {
        /// The qualifier, if written.
        qualifier: Option<String>,
        /// Source location.
        span: Span,
    },
}

impl SelectElement {
    /// Source location of this element.
    pub fn span(&self) -> Span {
        match self {
            SelectElement::Expr { span, .. }
            | SelectElement::SetVariable { span, .. }
            | SelectElement::Star { span, .. } => *span,
        }
    }
}

/// A FROM-clause source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableReference {
    /// A named table (schema table, temp table, table variable, CTE).
    Named {
        /// The table name.
        name: ObjectName,
        /// Binding alias, if written.
        alias: Option<String>,
        /// Source location.
        span: Span,
    },
    /// A derived table `(query) AS alias`.
    Derived {
        /// The subquery.
        query: Box<QueryExpr>,
        /// The required alias.
        alias: String,
        /// Source location.
        span: Span,
    },
    /// `left JOIN right ON condition`.
    Join {
        /// Left source.
        left: Box<TableReference>,
        /// Right source.
        right: Box<TableReference>,
        /// The ON condition; `None` for CROSS JOIN.
        condition: Option<BooleanExpr>,
        /// Source location.
        span: Span,
    },
}

impl TableReference {
    /// Source location of this source.
    pub fn span(&self) -> Span {
        match self {
            TableReference::Named { span, .. }
            | TableReference::Derived { span, .. }
            | TableReference::Join { span, .. } => *span,
        }
    }
}
