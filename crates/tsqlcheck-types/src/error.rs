//! Failures produced by the type algebra.

use thiserror::Error;

/// Why a type is not assignable or comparable.
///
/// These are carried inside user diagnostics; they never abort checking.
#[derive(Debug, Clone, Error)]
pub enum TypeError {
    /// The general assignability failure.
    #[error("Cannot assign value of type {source_type} to {dest_type}.")]
    NotAssignable {
        /// Rendering of the source type.
        source_type: String,
        /// Rendering of the destination type.
        dest_type: String,
    },

    /// A possibly null source flowing into a non-null destination.
    #[error("Cannot assign the possibly null {source_type} to the non-null {dest_type}.")]
    NullAssignment {
        /// Rendering of the source type.
        source_type: String,
        /// Rendering of the destination type.
        dest_type: String,
    },

    /// Two key domains that do not match.
    #[error("A value of domain {source_domain} cannot be assigned to domain {dest_domain}.")]
    DomainMismatch {
        /// The source domain name.
        source_domain: String,
        /// The destination domain name.
        dest_domain: String,
    },

    /// A character value that may not fit the destination length.
    #[error("A value of type {source_type} may not fit in {dest_type}.")]
    SizeMismatch {
        /// Rendering of the source type.
        source_type: String,
        /// Rendering of the destination type.
        dest_type: String,
    },

    /// A value that may fall outside the destination's known set.
    #[error("The value of type {source_type} may fall outside the values accepted by {dest_type}.")]
    KnownSetViolation {
        /// Rendering of the source type.
        source_type: String,
        /// Rendering of the destination type.
        dest_type: String,
    },

    /// An aliased column feeding a differently named destination column.
    #[error("A column named {source_name} cannot supply the column named {dest_name}.")]
    ColumnNameMismatch {
        /// The source column name.
        source_name: String,
        /// The destination column name.
        dest_name: String,
    },

    /// Rows with differing column counts.
    #[error("A row with {source_count} columns cannot be assigned to a row with {dest_count} columns.")]
    ColumnCountMismatch {
        /// Column count of the source row.
        source_count: usize,
        /// Column count of the destination row.
        dest_count: usize,
    },

    /// A failure localized to one column of a row assignment.
    #[error("Column {position}: {inner}")]
    ColumnError {
        /// One-based column position.
        position: usize,
        /// The underlying failure.
        inner: Box<TypeError>,
    },

    /// Neither direction of assignability holds between comparison operands.
    #[error("Cannot compare {left} and {right} because {cause}")]
    NotComparable {
        /// Rendering of the left type.
        left: String,
        /// Rendering of the right type.
        right: String,
        /// The underlying assignability failure.
        cause: Box<TypeError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render() {
        let err = TypeError::NotAssignable {
            source_type: "varchar(3)".to_string(),
            dest_type: "int".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot assign value of type varchar(3) to int."
        );

        let wrapped = TypeError::NotComparable {
            left: "int".to_string(),
            right: "date".to_string(),
            cause: Box::new(err),
        };
        assert!(wrapped.to_string().starts_with("Cannot compare int and date because"));
    }
}
