//! The diagnostic message catalog.
//!
//! Every user-visible message is built here so wording stays in one place.
//! The temp-table classification logic keys on the binding message text, so
//! [`unknown_type_for_binding`] and [`is_temp_table_issue`] must stay in
//! sync.

use std::fmt::Display;

/// A FROM source, INSERT target or star qualifier whose type is not in scope.
pub fn unknown_type_for_binding(type_name: &str, binding: &str) -> String {
    format!("Unknown type {} referenced by {}.", type_name, binding)
}

/// True when a message reports an unresolved temporary-table name.
pub fn is_temp_table_issue(message: &str) -> bool {
    message.to_lowercase().contains("unknown type #")
}

/// A column reference that resolved to nothing.
pub fn unable_to_find_column(name: &str) -> String {
    format!("Unable to find column {}.", name)
}

/// A `@variable` reference that resolved to nothing.
pub fn unknown_variable(name: &str) -> String {
    format!("Unknown variable {}.", name)
}

/// An `EXECUTE` of an undeclared name.
pub fn unknown_procedure(name: &str) -> String {
    format!("Unknown procedure {}.", name)
}

/// An `EXECUTE` of a symbol that is not a procedure.
pub fn not_a_procedure(name: &str) -> String {
    format!("{} is not a procedure.", name)
}

/// A call to an undeclared function.
pub fn unknown_function(name: &str) -> String {
    format!("Unknown function {}.", name)
}

/// A call of a symbol that is not a function.
pub fn not_a_function(name: &str) -> String {
    format!("{} is not a function.", name)
}

/// A second declaration of a name in the same scope.
pub fn already_declared(name: &str) -> String {
    format!("{} has already been declared.", name)
}

/// `DROP`/`DEALLOCATE` of a name that does not exist.
pub fn cannot_drop(name: &str) -> String {
    format!("Cannot drop {} because it has not been declared.", name)
}

/// Wrong number of arguments to a routine.
pub fn arity_mismatch(routine: &str, expected: usize, got: usize) -> String {
    format!(
        "{} expects {} arguments but was given {}.",
        routine, expected, got
    )
}

/// A named argument matching no declared parameter.
pub fn unknown_parameter(routine: &str, param: &str) -> String {
    format!("{} has no parameter named {}.", routine, param)
}

/// A per-parameter assignability failure.
pub fn parameter_issue(param: &str, inner: impl Display) -> String {
    format!("Parameter {}: {}", param, inner)
}

/// The call-context trail wrapped around re-verified procedure issues.
pub fn when_called_from(context: &str, inner: &str) -> String {
    format!("When called from {}: {}", context, inner)
}

/// An arithmetic operand that may be null.
pub fn possible_null_operand() -> &'static str {
    "A binary operation includes a possibly null value."
}

/// A divisor not provably nonzero.
pub fn divide_by_zero() -> &'static str {
    "Possible divide by zero."
}

/// Arithmetic over two different scalar kinds.
pub fn math_kind_mismatch(left: impl Display, right: impl Display) -> String {
    format!("Cannot perform a math operation on {} and {}.", left, right)
}

/// An ordering comparison against a possibly null operand.
pub fn ordered_comparison_with_null() -> &'static str {
    "Cannot use an ordering comparison against a possibly null value."
}

/// UNION/INTERSECT/EXCEPT arms of differing widths.
pub fn set_operation_column_counts() -> &'static str {
    "Queries joined with a set operation must have the same number of columns."
}

/// Two types with no common supertype.
pub fn unable_to_join_types(left: impl Display, right: impl Display) -> String {
    format!("Unable to join the types {} and {}.", left, right)
}

/// A CTE column list of the wrong width.
pub fn cte_column_count(name: &str) -> String {
    format!(
        "The column list of {} does not match the number of columns in its query.",
        name
    )
}

/// A CTE column alias fighting an alias the column already carries.
pub fn cte_column_name_conflict(declared: &str, existing: &str) -> String {
    format!(
        "Declared column name {} conflicts with the alias {}.",
        declared, existing
    )
}

/// A routine whose inferred return type depends on itself.
pub fn inference_cycle(name: &str) -> String {
    format!(
        "Cannot infer the return type of {} because it refers to itself; declare an explicit return type.",
        name
    )
}

/// Rows of a VALUES constructor with differing widths.
pub fn values_row_width() -> &'static str {
    "All rows of a table value constructor must have the same number of columns."
}

/// `FETCH INTO` with the wrong number of variables.
pub fn fetch_arity(expected: usize, got: usize) -> String {
    format!("FETCH INTO expects {} variables but {} were given.", expected, got)
}

/// A cursor operation on an undeclared cursor.
pub fn unknown_cursor(name: &str) -> String {
    format!("{} is not a declared cursor.", name)
}

/// A written type name the checker does not know.
pub fn unknown_type(name: &str) -> String {
    format!("Unknown type {}.", name)
}
