//! T-SQL abstract syntax tree.
//!
//! This crate defines the tree shape the checking driver consumes. A front
//! end (lexer/parser) is expected to produce these values; the checker never
//! sees source text, only nodes carrying a [`Span`] for diagnostic
//! attribution.

#![warn(missing_docs)]

pub mod expr;
pub mod query;
pub mod span;
pub mod stmt;

pub use expr::{BooleanExpr, CompareOp, MathOp, ScalarExpr};
pub use query::{
    BinaryQueryOp, CommonTableExpression, QueryExpr, QuerySpecification, SelectElement,
    SelectStatement, TableReference,
};
pub use span::Span;
pub use stmt::{
    ColumnConstraint, ColumnDefinition, ExecuteArg, ObjectName, ParameterDefinition, Script,
    Statement, TypeName, VariableDeclaration,
};
