//! The `DataType` variant set and its structural helpers.

use std::collections::BTreeSet;
use std::fmt;

use tsqlcheck_ast::Span;

use crate::value::SqlValue;

/// Cardinality used for unbounded scalar kinds.
const WIDE_SCALAR: i64 = 1 << 53;
/// Cardinality of a 32-bit integer.
const INT_WIDTH: i64 = 1 << 32;
/// Per-character value space used to size character types.
const CHAR_SPACE: i64 = 1 << 16;

/// Fixed-width primitive SQL kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// The integer family (`tinyint` through `bigint`).
    Int,
    /// `bit`.
    Bit,
    /// `money` / `smallmoney`.
    Money,
    /// `date`.
    Date,
    /// `time`.
    Time,
    /// The datetime family.
    DateTime,
    /// `real` / `float`.
    Real,
    /// `decimal` / `numeric`.
    Decimal,
}

impl ScalarKind {
    fn width(self) -> i64 {
        match self {
            ScalarKind::Bit => 2,
            ScalarKind::Int => INT_WIDTH,
            _ => WIDE_SCALAR,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Bit => "bit",
            ScalarKind::Money => "money",
            ScalarKind::Date => "date",
            ScalarKind::Time => "time",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Real => "real",
            ScalarKind::Decimal => "decimal",
        }
    }
}

/// Length-carrying character kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizedKind {
    /// `char` / `varchar`.
    VarChar,
    /// `nchar` / `nvarchar`.
    NVarChar,
}

impl SizedKind {
    fn keyword(self) -> &'static str {
        match self {
            SizedKind::VarChar => "varchar",
            SizedKind::NVarChar => "nvarchar",
        }
    }
}

/// How a column is named in a row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnName {
    /// An expression column with no name.
    Anonymous,
    /// A name inherited from a table definition.
    Schema(String),
    /// A name the user assigned with `AS`.
    Aliased(String),
}

impl ColumnName {
    /// The textual name, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ColumnName::Anonymous => None,
            ColumnName::Schema(name) | ColumnName::Aliased(name) => Some(name),
        }
    }

    /// Case-insensitive equality; two anonymous names match each other.
    pub fn matches(&self, other: &ColumnName) -> bool {
        match (self.text(), other.text()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// Case-insensitive match against a bare identifier.
    pub fn matches_text(&self, name: &str) -> bool {
        self.text().is_some_and(|t| t.eq_ignore_ascii_case(name))
    }

    /// True when the name was assigned by the user rather than the schema.
    pub fn is_aliased(&self) -> bool {
        matches!(self, ColumnName::Aliased(_))
    }
}

/// One column of a row shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    /// The column's name.
    pub name: ColumnName,
    /// The column's type.
    pub ty: DataType,
    /// Where the column was defined, for diagnostics on join failures.
    pub defining_span: Option<Span>,
}

impl ColumnType {
    /// Build a column.
    pub fn new(name: ColumnName, ty: DataType) -> Self {
        Self {
            name,
            ty,
            defining_span: None,
        }
    }

    /// Attach a defining site.
    pub fn with_span(mut self, span: Span) -> Self {
        self.defining_span = Some(span);
        self
    }
}

/// The shape of a tuple or result set.
///
/// An empty column list is the "structurally unknown" row: it is assignable
/// to and from any row, and any column looked up in it resolves to
/// [`DataType::Unknown`] without an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowType {
    /// The columns in order.
    pub columns: Vec<ColumnType>,
}

impl RowType {
    /// Build a row from its columns.
    pub fn new(columns: Vec<ColumnType>) -> Self {
        Self { columns }
    }

    /// The structurally unknown row.
    pub fn unknown_shape() -> Self {
        Self::default()
    }

    /// True for the structurally unknown row.
    pub fn is_unknown_shape(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&ColumnType> {
        self.columns.iter().find(|c| c.name.matches_text(name))
    }
}

/// A scalar decorated with an explicit finite set of literal values.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownSet {
    /// The underlying scalar or sized type.
    pub base: Box<DataType>,
    /// True for "provably one of `values`", false for "provably none of".
    pub include: bool,
    /// The literal values.
    pub values: BTreeSet<SqlValue>,
}

impl KnownSet {
    /// Build a set decorator.
    pub fn new(base: DataType, include: bool, values: BTreeSet<SqlValue>) -> Self {
        Self {
            base: Box::new(base),
            include,
            values,
        }
    }

    /// The same values with the inclusion flag flipped.
    pub fn invert(&self) -> KnownSet {
        KnownSet {
            base: self.base.clone(),
            include: !self.include,
            values: self.values.clone(),
        }
    }

    /// True when zero is a member of `values`.
    pub fn mentions_zero(&self) -> bool {
        self.values.iter().any(SqlValue::is_zero)
    }
}

/// An index into the checker's routine arena.
///
/// `DataType` stays plainly comparable and cloneable by carrying a handle to
/// the routine body instead of the body itself; the driver owns the bodies
/// and their compute-once state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutineId(pub u32);

/// A declared routine parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// The parameter name including `@`.
    pub name: String,
    /// The declared type.
    pub ty: DataType,
}

/// A scalar function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    /// The function's full name.
    pub name: String,
    /// Declared parameters in order.
    pub params: Vec<Parameter>,
    /// The declared return type, if written; when absent the return type is
    /// inferred by forcing the body.
    pub declared_return: Option<Box<DataType>>,
    /// Handle to the deferred body.
    pub body: RoutineId,
}

/// A stored procedure signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureType {
    /// The procedure's full name.
    pub name: String,
    /// Declared parameters in order.
    pub params: Vec<Parameter>,
    /// Handle to the deferred body.
    pub body: RoutineId,
}

/// What the checker can prove about a value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Inhabited only by null.
    Null,
    /// The error-recovery sink; assignable to and from anything.
    Unknown,
    /// A statement with no value; not assignable, not comparable.
    Void,
    /// A fixed-width primitive.
    Scalar(ScalarKind),
    /// A character type with a maximum length; `u32::MAX` encodes `max`.
    Sized {
        /// The character kind.
        kind: SizedKind,
        /// Maximum length in characters.
        max_len: u32,
    },
    /// A scalar tagged with a nominal key-space name.
    Domain {
        /// The underlying type.
        base: Box<DataType>,
        /// The domain name, compared case-insensitively.
        name: String,
    },
    /// A scalar with an explicit inclusion or exclusion set of values.
    KnownSet(KnownSet),
    /// `inner` plus the null value.
    Nullable(Box<DataType>),
    /// A tuple/result-set shape.
    Row(RowType),
    /// A single named column.
    Column(Box<ColumnType>),
    /// A scalar function.
    Function(FunctionType),
    /// A stored procedure.
    Procedure(ProcedureType),
}

impl DataType {
    /// Shorthand for the plain integer type.
    pub fn int() -> DataType {
        DataType::Scalar(ScalarKind::Int)
    }

    /// Shorthand for a `varchar(max_len)`.
    pub fn varchar(max_len: u32) -> DataType {
        DataType::Sized {
            kind: SizedKind::VarChar,
            max_len,
        }
    }

    /// Shorthand for an `nvarchar(max_len)`.
    pub fn nvarchar(max_len: u32) -> DataType {
        DataType::Sized {
            kind: SizedKind::NVarChar,
            max_len,
        }
    }

    /// An inclusion set over the integer type.
    pub fn int_values<I: IntoIterator<Item = i64>>(values: I) -> DataType {
        DataType::KnownSet(KnownSet::new(
            DataType::int(),
            true,
            values.into_iter().map(SqlValue::Int).collect(),
        ))
    }

    /// The inclusion set holding one string, based on a varchar sized to fit.
    pub fn varchar_value(value: &str) -> DataType {
        let len = value.chars().count().max(1) as u32;
        DataType::KnownSet(KnownSet::new(
            DataType::varchar(len),
            true,
            std::iter::once(SqlValue::Str(value.to_string())).collect(),
        ))
    }

    /// Wrap in `Nullable` unless the type already admits null or carries no
    /// value at all.
    pub fn to_nullable(self) -> DataType {
        match self {
            DataType::Null
            | DataType::Unknown
            | DataType::Void
            | DataType::Nullable(_)
            | DataType::Row(_) => self,
            other => DataType::Nullable(Box::new(other)),
        }
    }

    /// Remove one wrapping level, if any.
    pub fn unwrapped(&self) -> &DataType {
        match self {
            DataType::Nullable(inner) => inner,
            DataType::Column(col) => &col.ty,
            DataType::Domain { base, .. } => base,
            DataType::KnownSet(set) => &set.base,
            other => other,
        }
    }

    /// Strip all wrapping levels down to the base scalar.
    pub fn unwrap_to_core(&self) -> &DataType {
        let mut current = self;
        loop {
            let next = current.unwrapped();
            if std::ptr::eq(next, current) {
                return current;
            }
            current = next;
        }
    }

    /// True for `Null` and `Nullable`.
    pub fn admits_null(&self) -> bool {
        matches!(self, DataType::Null | DataType::Nullable(_))
    }

    /// The row shape, if this is a row.
    pub fn as_row(&self) -> Option<&RowType> {
        match self {
            DataType::Row(row) => Some(row),
            _ => None,
        }
    }

    /// Cardinality estimate used to order types by specificity.
    pub fn size_of_domain(&self) -> i64 {
        match self {
            DataType::Null => 1,
            DataType::Unknown => i64::MAX,
            DataType::Void => 0,
            DataType::Scalar(kind) => kind.width(),
            DataType::Sized { max_len, .. } => {
                (*max_len as i64).saturating_add(1).saturating_mul(CHAR_SPACE)
            }
            DataType::Domain { .. } => 1,
            DataType::KnownSet(set) => {
                let count = set.values.len() as i64;
                if set.include {
                    count
                } else {
                    set.base.size_of_domain().saturating_sub(count)
                }
            }
            DataType::Nullable(inner) => inner.size_of_domain().saturating_add(1),
            DataType::Row(row) => row
                .columns
                .iter()
                .fold(0i64, |acc, c| acc.saturating_add(c.ty.size_of_domain())),
            DataType::Column(col) => col.ty.size_of_domain(),
            DataType::Function(_) | DataType::Procedure(_) => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Unknown => write!(f, "unknown"),
            DataType::Void => write!(f, "void"),
            DataType::Scalar(kind) => write!(f, "{}", kind.keyword()),
            DataType::Sized { kind, max_len } => {
                if *max_len == u32::MAX {
                    write!(f, "{}(max)", kind.keyword())
                } else {
                    write!(f, "{}({})", kind.keyword(), max_len)
                }
            }
            DataType::Domain { base, name } => write!(f, "{} in domain {}", base, name),
            DataType::KnownSet(set) => {
                let values: Vec<String> = set.values.iter().map(|v| v.to_string()).collect();
                if set.include {
                    write!(f, "{} one of ({})", set.base, values.join(", "))
                } else {
                    write!(f, "{} excluding ({})", set.base, values.join(", "))
                }
            }
            DataType::Nullable(inner) => write!(f, "nullable {}", inner),
            DataType::Row(row) => {
                let columns: Vec<String> = row
                    .columns
                    .iter()
                    .map(|c| match c.name.text() {
                        Some(name) => format!("{} {}", name, c.ty),
                        None => c.ty.to_string(),
                    })
                    .collect();
                write!(f, "row({})", columns.join(", "))
            }
            DataType::Column(col) => match col.name.text() {
                Some(name) => write!(f, "{} {}", name, col.ty),
                None => write!(f, "{}", col.ty),
            },
            DataType::Function(func) => write!(f, "function {}", func.name),
            DataType::Procedure(proc) => write!(f, "procedure {}", proc.name),
        }
    }
}
