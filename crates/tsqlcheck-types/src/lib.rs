//! T-SQL type algebra.
//!
//! [`DataType`] is a closed variant set modeling what the checker can prove
//! about a value: its SQL kind, an explicit inclusion or exclusion set of
//! literal values, a nominal key domain, nullability, or a row shape. The
//! operations in [`ops`] are all pure: assignability and comparability return
//! `Result`, the lattice combinators (disjunction, conjunction, subtract)
//! return new types.

#![warn(missing_docs)]

pub mod error;
pub mod ops;
pub mod ty;
pub mod value;

pub use error::TypeError;
pub use ty::{
    ColumnName, ColumnType, DataType, FunctionType, KnownSet, Parameter, ProcedureType, RoutineId,
    RowType, ScalarKind, SizedKind,
};
pub use value::SqlValue;
