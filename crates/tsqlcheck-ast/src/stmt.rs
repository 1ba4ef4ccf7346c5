//! Statement nodes and declaration components.

use crate::expr::{BooleanExpr, ScalarExpr};
use crate::query::SelectStatement;
use crate::span::Span;

/// A whole script: the unit of one checking run.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Top-level statements in order.
    pub statements: Vec<Statement>,
}

/// A possibly schema-qualified object name such as `dbo.Master`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectName {
    /// The dotted parts in order.
    pub parts: Vec<String>,
    /// Source location.
    pub span: Span,
}

impl ObjectName {
    /// Build a name from dotted parts.
    pub fn new(parts: Vec<String>, span: Span) -> Self {
        Self { parts, span }
    }

    /// The full dotted form.
    pub fn full(&self) -> String {
        self.parts.join(".")
    }

    /// The last (unqualified) part.
    pub fn tail(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

/// A written type such as `int` or `varchar(50)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    /// The type keyword as written.
    pub name: String,
    /// Declared length for the character family; `u32::MAX` encodes `max`.
    pub length: Option<u32>,
    /// Source location.
    pub span: Span,
}

/// One `DECLARE @x type [= value]` item.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    /// The variable name including `@`.
    pub name: String,
    /// Declared type.
    pub ty: TypeName,
    /// Initializer, if written.
    pub init: Option<ScalarExpr>,
    /// Source location.
    pub span: Span,
}

/// A column in a table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: TypeName,
    /// Constraints in written order.
    pub constraints: Vec<ColumnConstraint>,
    /// Source location.
    pub span: Span,
}

/// A constraint attached to a single column definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    /// `NOT NULL`.
    NotNull,
    /// Explicit `NULL`.
    Null,
    /// `CHECK (condition)` over this column.
    Check {
        /// Optional constraint name.
        name: Option<String>,
        /// The condition.
        expr: BooleanExpr,
    },
    /// `PRIMARY KEY`.
    PrimaryKey,
    /// `UNIQUE`.
    Unique,
    /// `FOREIGN KEY REFERENCES table(column)`.
    ForeignKey {
        /// The referenced table.
        table: ObjectName,
        /// The referenced column; defaults to this column's name.
        column: Option<String>,
    },
}

/// A routine parameter: `@p type`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    /// Parameter name including `@`.
    pub name: String,
    /// Declared type.
    pub ty: TypeName,
    /// Source location.
    pub span: Span,
}

/// One `EXECUTE` argument, positional or `@name = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteArg {
    /// Parameter name when passed by name.
    pub name: Option<String>,
    /// The argument value.
    pub value: ScalarExpr,
    /// Source location.
    pub span: Span,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `BEGIN ... END`.
    Block {
        /// The contained statements.
        statements: Vec<Statement>,
        /// Source location.
        span: Span,
    },
    /// `DECLARE @x type [= value], ...`.
    DeclareVariable {
        /// The declared variables.
        decls: Vec<VariableDeclaration>,
        /// Source location.
        span: Span,
    },
    /// `DECLARE @t TABLE (...)`.
    DeclareTable {
        /// The table-variable name including `@`.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Source location.
        span: Span,
    },
    /// `CREATE TABLE name (...)`, including temp tables.
    CreateTable {
        /// The table name.
        name: ObjectName,
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Source location.
        span: Span,
    },
    /// `DROP TABLE a, b`.
    Drop {
        /// The dropped names with their individual locations.
        names: Vec<(ObjectName, Span)>,
        /// Source location.
        span: Span,
    },
    /// `SET @x = expr`.
    SetVariable {
        /// Target variable including `@`.
        name: String,
        /// Assigned expression.
        value: ScalarExpr,
        /// Source location.
        span: Span,
    },
    /// A SELECT statement.
    Select(SelectStatement),
    /// `INSERT INTO target source`.
    Insert {
        /// The target table.
        target: ObjectName,
        /// The inserted rows (a query or VALUES).
        source: SelectStatement,
        /// Source location.
        span: Span,
    },
    /// `IF condition then [ELSE else]`.
    If {
        /// The predicate.
        condition: BooleanExpr,
        /// The THEN branch.
        then_branch: Box<Statement>,
        /// The ELSE branch, if present.
        else_branch: Option<Box<Statement>>,
        /// Source location.
        span: Span,
    },
    /// `WHILE condition body`.
    While {
        /// The predicate.
        condition: BooleanExpr,
        /// The loop body.
        body: Box<Statement>,
        /// Source location.
        span: Span,
    },
    /// `CREATE FUNCTION name (params) [RETURNS type] AS body`.
    CreateFunction {
        /// The function name.
        name: ObjectName,
        /// Declared parameters.
        params: Vec<ParameterDefinition>,
        /// Declared return type, if written.
        returns: Option<TypeName>,
        /// The body statements.
        body: Vec<Statement>,
        /// Source location.
        span: Span,
    },
    /// `CREATE [OR ALTER] PROCEDURE name params AS body`.
    CreateProcedure {
        /// The procedure name.
        name: ObjectName,
        /// Declared parameters.
        params: Vec<ParameterDefinition>,
        /// The body statements.
        body: Vec<Statement>,
        /// True for `ALTER PROCEDURE`, which replaces a prior definition.
        is_alter: bool,
        /// Source location.
        span: Span,
    },
    /// `EXECUTE name args`.
    Execute {
        /// The invoked procedure.
        name: ObjectName,
        /// The arguments.
        args: Vec<ExecuteArg>,
        /// Source location.
        span: Span,
    },
    /// `RETURN [expr]`.
    Return {
        /// The returned value, if any.
        value: Option<ScalarExpr>,
        /// Source location.
        span: Span,
    },
    /// `PRINT expr`.
    Print {
        /// The printed expression.
        value: ScalarExpr,
        /// Source location.
        span: Span,
    },
    /// `DECLARE name CURSOR FOR select`.
    DeclareCursor {
        /// The cursor name.
        name: String,
        /// The defining query.
        query: SelectStatement,
        /// Source location.
        span: Span,
    },
    /// `OPEN name`.
    OpenCursor {
        /// The cursor name.
        name: String,
        /// Source location.
        span: Span,
    },
    /// `CLOSE name`.
    CloseCursor {
        /// The cursor name.
        name: String,
        /// Source location.
        span: Span,
    },
    /// `DEALLOCATE name`.
    DeallocateCursor {
        /// The cursor name.
        name: String,
        /// Source location.
        span: Span,
    },
    /// `FETCH NEXT FROM cursor INTO @a, @b`.
    Fetch {
        /// The cursor name.
        cursor: String,
        /// The target variables with their locations.
        into: Vec<(String, Span)>,
        /// Source location.
        span: Span,
    },
}

impl Statement {
    /// Source location of this statement.
    pub fn span(&self) -> Span {
        match self {
            Statement::Block { span, .. }
            | Statement::DeclareVariable { span, .. }
            | Statement::DeclareTable { span, .. }
            | Statement::CreateTable { span, .. }
            | Statement::Drop { span, .. }
            | Statement::SetVariable { span, .. }
            | Statement::Insert { span, .. }
            | Statement::If { span, .. }
            | Statement::While { span, .. }
            | Statement::CreateFunction { span, .. }
            | Statement::CreateProcedure { span, .. }
            | Statement::Execute { span, .. }
            | Statement::Return { span, .. }
            | Statement::Print { span, .. }
            | Statement::DeclareCursor { span, .. }
            | Statement::OpenCursor { span, .. }
            | Statement::CloseCursor { span, .. }
            | Statement::DeallocateCursor { span, .. }
            | Statement::Fetch { span, .. } => *span,
            Statement::Select(select) => select.span,
        }
    }
}
