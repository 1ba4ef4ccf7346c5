//! Flow-typing checker for T-SQL scripts.
//!
//! The checker walks a parsed [`tsqlcheck_ast::Script`] and proves facts
//! about variables and columns as control flow narrows them: literal
//! assignments become known-value sets, `IS NULL` guards discharge
//! nullability, CHECK constraints become part of a column's type. Procedure
//! and function bodies are verified lazily, and procedures that depend on a
//! caller's temp tables are re-verified at each call site.
//!
//! The entry point is [`check_script`].

#![warn(missing_docs)]

pub mod checker;
pub mod frame;
pub mod issue;
pub mod messages;
pub mod refine;

pub use checker::{check_script, Checker};
pub use frame::{CaseSensitivity, FrameId, Frames, SymbolTyping};
pub use issue::{Issue, IssueLevel, IssueRecord};
pub use refine::{Refinement, RefinementSet, RefinementSetCases, SymbolRef};

use tsqlcheck_types::DataType;

/// Knobs for one checking run.
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// How names compare; SQL Server installs default to insensitive.
    pub case: CaseSensitivity,
    /// Ambient `@@` globals seeded into the root scope.
    pub globals: Vec<(String, DataType)>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            case: CaseSensitivity::Insensitive,
            globals: vec![
                ("@@rowcount".to_string(), DataType::int()),
                ("@@error".to_string(), DataType::int()),
                ("@@identity".to_string(), DataType::int().to_nullable()),
                ("@@trancount".to_string(), DataType::int()),
                ("@@fetch_status".to_string(), DataType::int()),
                ("@@version".to_string(), DataType::varchar(u32::MAX)),
                ("@@servername".to_string(), DataType::nvarchar(128)),
                ("@@spid".to_string(), DataType::int()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_globals_cover_the_common_fetch_loop() {
        let options = CheckerOptions::default();
        assert!(options
            .globals
            .iter()
            .any(|(name, ty)| name == "@@fetch_status" && *ty == DataType::int()));
    }
}
