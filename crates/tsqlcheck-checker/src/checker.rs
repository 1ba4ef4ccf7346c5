//! The checking driver.
//!
//! One [`Checker`] walks a script top to bottom, threading a current scope
//! frame through statements and queries. Boolean expressions yield
//! refinement cases; control-flow constructs check their branches under
//! child frames built from those cases. Routine bodies are not checked at
//! their declaration: they are recorded in an arena and forced on first
//! call or at the end of the run, whichever comes first.

use std::mem;

use rustc_hash::FxHashSet;

use tsqlcheck_ast::{
    BooleanExpr, ColumnConstraint, ColumnDefinition, CommonTableExpression, CompareOp, ExecuteArg,
    MathOp, ObjectName, QueryExpr, QuerySpecification, ScalarExpr, Script, SelectElement,
    SelectStatement, Span, Statement, TableReference, TypeName,
};
use tsqlcheck_types::{
    ColumnName, ColumnType, DataType, FunctionType, KnownSet, Parameter, ProcedureType, RoutineId,
    RowType, ScalarKind, SqlValue,
};

use crate::frame::{FrameId, Frames, SymbolTyping};
use crate::issue::{Issue, IssueLevel};
use crate::messages;
use crate::refine::{Refinement, RefinementSetCases, SymbolRef};
use crate::CheckerOptions;

/// Check a whole script and return its diagnostics in source order, routine
/// diagnostics first.
pub fn check_script(script: &Script, options: &CheckerOptions) -> Vec<Issue> {
    let mut checker = Checker::new(options);
    for statement in &script.statements {
        checker.check_statement(statement);
    }
    checker.finish()
}

/// What checking a scalar expression yields: the proven type and, when the
/// expression is a plain symbol reference, the symbol it names so that
/// comparisons against it can narrow.
struct ExpressionResult {
    ty: DataType,
    symbol: Option<SymbolRef>,
}

impl ExpressionResult {
    fn plain(ty: DataType) -> Self {
        Self { ty, symbol: None }
    }
}

enum RoutineKind {
    Function,
    Procedure,
}

/// Compute-once state of one deferred routine body.
enum RoutineProgress {
    NotStarted,
    /// Currently being forced; hitting this state again is a cycle.
    InProgress,
    Function {
        return_type: DataType,
        issues: Vec<Issue>,
    },
    Procedure {
        references_temp_table: bool,
        issues: Vec<Issue>,
    },
}

struct RoutineState {
    name: String,
    kind: RoutineKind,
    params: Vec<Parameter>,
    declared_return: Option<DataType>,
    body: Vec<Statement>,
    decl_frame: FrameId,
    decl_span: Span,
    progress: RoutineProgress,
}

/// The stateful driver for one checking run.
pub struct Checker {
    frames: Frames,
    current: FrameId,
    issues: Vec<Issue>,
    routines: Vec<RoutineState>,
    /// RETURN collectors, one per routine body currently being forced.
    return_types: Vec<Vec<DataType>>,
    /// Names of procedures currently being re-verified at a call site, used
    /// to cut off recursive re-verification.
    evaluation_context: Vec<String>,
}

impl Checker {
    /// Start a run with the root frame seeded from the options' globals.
    pub fn new(options: &CheckerOptions) -> Self {
        let (mut frames, root) = Frames::new(options.case);
        for (name, ty) in &options.globals {
            frames.replace_symbol(root, name, SymbolTyping::declared(ty.clone()));
        }
        Self {
            frames,
            current: root,
            issues: Vec::new(),
            routines: Vec::new(),
            return_types: Vec::new(),
            evaluation_context: Vec::new(),
        }
    }

    fn report(&mut self, span: Span, level: IssueLevel, message: impl Into<String>) {
        self.issues.push(Issue::new(span, level, message));
    }

    /// Run `f` with a fresh issue list and hand back what it collected.
    fn probe<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, Vec<Issue>) {
        let saved = mem::take(&mut self.issues);
        let value = f(self);
        let collected = mem::replace(&mut self.issues, saved);
        (value, collected)
    }

    fn lookup_object(&self, name: &ObjectName) -> Option<(FrameId, String, SymbolTyping)> {
        self.frames
            .lookup(self.current, &name.full())
            .or_else(|| self.frames.lookup(self.current, name.tail()))
            .map(|(frame, canonical, typing)| (frame, canonical, typing.clone()))
    }

    fn lookup_callable(&self, name: &str) -> Option<(String, SymbolTyping)> {
        let found = self.frames.lookup(self.current, name).or_else(|| {
            name.rsplit_once('.')
                .and_then(|(_, tail)| self.frames.lookup(self.current, tail))
        });
        found.map(|(_, canonical, typing)| (canonical, typing.clone()))
    }

    /// Finish the run: force every still-unforced routine, then assemble
    /// routine diagnostics ahead of the main walk's, deduplicated.
    pub fn finish(mut self) -> Vec<Issue> {
        for index in 0..self.routines.len() {
            let id = RoutineId(index as u32);
            match self.routines[index].kind {
                RoutineKind::Function => {
                    let span = self.routines[index].decl_span;
                    self.force_function(id, span);
                }
                RoutineKind::Procedure => {
                    self.force_procedure(id);
                }
            }
        }
        let mut all = Vec::new();
        for routine in &self.routines {
            match &routine.progress {
                RoutineProgress::Function { issues, .. } => all.extend(issues.iter().cloned()),
                RoutineProgress::Procedure {
                    references_temp_table,
                    issues,
                } if !references_temp_table => all.extend(issues.iter().cloned()),
                _ => {}
            }
        }
        all.append(&mut self.issues);
        let mut seen = FxHashSet::default();
        all.retain(|issue| seen.insert((issue.span, issue.level, issue.message.clone())));
        all
    }

    // ----- statements ------------------------------------------------------

    /// Check one statement under the current frame.
    pub fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block { statements, .. } => {
                for inner in statements {
                    self.check_statement(inner);
                }
            }
            Statement::DeclareVariable { decls, .. } => {
                for decl in decls {
                    if self.frames.lookup_local(self.current, &decl.name).is_some() {
                        self.report(
                            decl.span,
                            IssueLevel::Error,
                            messages::already_declared(&decl.name),
                        );
                        continue;
                    }
                    let declared = self.resolve_type_name(&decl.ty).to_nullable();
                    let typing = match &decl.init {
                        Some(init) => {
                            let result = self.check_scalar(init);
                            if let Err(error) = result.ty.is_assignable_to(&declared) {
                                self.report(init.span(), IssueLevel::Error, error.to_string());
                            }
                            SymbolTyping::narrowed(declared, result.ty)
                        }
                        None => SymbolTyping::declared(declared),
                    };
                    self.frames.with_symbol(self.current, &decl.name, typing);
                }
            }
            Statement::DeclareTable {
                name,
                columns,
                span,
            } => {
                let row = self.column_row(name, columns);
                self.declare_row(name, row, *span);
            }
            Statement::CreateTable {
                name,
                columns,
                span,
            } => {
                let full = name.full();
                let row = self.column_row(&full, columns);
                self.declare_row(&full, row, *span);
            }
            Statement::Drop { names, .. } => {
                for (name, name_span) in names {
                    let removed = self.frames.remove(self.current, &name.full())
                        || self.frames.remove(self.current, name.tail());
                    if !removed {
                        self.report(
                            *name_span,
                            IssueLevel::Error,
                            messages::cannot_drop(&name.full()),
                        );
                    }
                }
            }
            Statement::SetVariable { name, value, span } => {
                let result = self.check_scalar(value);
                self.assign_to_variable(name, result.ty, *span);
            }
            Statement::Select(select) => {
                self.check_select_statement(select);
            }
            Statement::Insert {
                target,
                source,
                span,
            } => {
                let row = self.check_select_statement(source);
                match self.lookup_object(target) {
                    Some((_, _, typing)) => {
                        let dest = typing.expression_type().clone();
                        if let Err(error) = DataType::Row(row).is_assignable_to(&dest) {
                            self.report(*span, IssueLevel::Error, error.to_string());
                        }
                    }
                    None => self.report(
                        target.span,
                        IssueLevel::Warning,
                        messages::unknown_type_for_binding(&target.full(), "insert"),
                    ),
                }
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cases = self.check_boolean(condition);
                let saved = self.current;
                self.current = self
                    .frames
                    .new_frame_from_refinements(saved, &cases.positive);
                self.check_statement(then_branch);
                self.current = saved;
                if let Some(else_branch) = else_branch {
                    self.current = self
                        .frames
                        .new_frame_from_refinements(saved, &cases.negative);
                    self.check_statement(else_branch);
                    self.current = saved;
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                let cases = self.check_boolean(condition);
                let saved = self.current;
                self.current = self
                    .frames
                    .new_frame_from_refinements(saved, &cases.positive);
                self.check_statement(body);
                self.current = saved;
            }
            Statement::CreateFunction {
                name,
                params,
                returns,
                body,
                span,
            } => {
                let full = name.full();
                let params = self.resolve_parameters(params);
                let declared_return = returns.as_ref().map(|t| self.resolve_type_name(t));
                let id = RoutineId(self.routines.len() as u32);
                self.routines.push(RoutineState {
                    name: full.clone(),
                    kind: RoutineKind::Function,
                    params: params.clone(),
                    declared_return: declared_return.clone(),
                    body: body.clone(),
                    decl_frame: self.current,
                    decl_span: *span,
                    progress: RoutineProgress::NotStarted,
                });
                let ty = DataType::Function(FunctionType {
                    name: full.clone(),
                    params,
                    declared_return: declared_return.map(Box::new),
                    body: id,
                });
                self.declare_symbol(&full, ty, *span, false);
            }
            Statement::CreateProcedure {
                name,
                params,
                body,
                is_alter,
                span,
            } => {
                let full = name.full();
                let params = self.resolve_parameters(params);
                let id = RoutineId(self.routines.len() as u32);
                self.routines.push(RoutineState {
                    name: full.clone(),
                    kind: RoutineKind::Procedure,
                    params: params.clone(),
                    declared_return: None,
                    body: body.clone(),
                    decl_frame: self.current,
                    decl_span: *span,
                    progress: RoutineProgress::NotStarted,
                });
                let ty = DataType::Procedure(ProcedureType {
                    name: full.clone(),
                    params,
                    body: id,
                });
                self.declare_symbol(&full, ty, *span, *is_alter);
            }
            Statement::Execute { name, args, span } => self.check_execute(name, args, *span),
            Statement::Return { value, .. } => {
                let ty = match value {
                    Some(value) => self.check_scalar(value).ty,
                    None => DataType::Void,
                };
                if let Some(collector) = self.return_types.last_mut() {
                    collector.push(ty);
                }
            }
            Statement::Print { value, .. } => {
                self.check_scalar(value);
            }
            Statement::DeclareCursor { name, query, span } => {
                let row = self.check_select_statement(query);
                self.declare_row(name, row, *span);
            }
            Statement::OpenCursor { name, span } | Statement::CloseCursor { name, span } => {
                if self.frames.lookup(self.current, name).is_none() {
                    self.report(*span, IssueLevel::Error, messages::unknown_cursor(name));
                }
            }
            Statement::DeallocateCursor { name, span } => {
                if !self.frames.remove(self.current, name) {
                    self.report(*span, IssueLevel::Error, messages::unknown_cursor(name));
                }
            }
            Statement::Fetch { cursor, into, span } => {
                let row = match self.frames.lookup(self.current, cursor) {
                    Some((_, _, typing)) => typing.expression_type().as_row().cloned(),
                    None => {
                        self.report(*span, IssueLevel::Error, messages::unknown_cursor(cursor));
                        return;
                    }
                };
                let Some(row) = row else {
                    self.report(*span, IssueLevel::Error, messages::unknown_cursor(cursor));
                    return;
                };
                if !row.is_unknown_shape() && row.columns.len() != into.len() {
                    self.report(
                        *span,
                        IssueLevel::Error,
                        messages::fetch_arity(row.columns.len(), into.len()),
                    );
                }
                for (index, (variable, variable_span)) in into.iter().enumerate() {
                    // Fetching past the last row leaves the variables null.
                    let fetched = match row.columns.get(index) {
                        Some(column) => column.ty.clone().to_nullable(),
                        None => DataType::Unknown,
                    };
                    self.assign_to_variable(variable, fetched, *variable_span);
                }
            }
        }
    }

    /// Assign `value` to a declared variable, recording the narrowed type in
    /// the current frame on success.
    fn assign_to_variable(&mut self, name: &str, value: DataType, span: Span) {
        let Some((_, canonical, typing)) = self
            .frames
            .lookup(self.current, name)
            .map(|(f, c, t)| (f, c, t.clone()))
        else {
            self.report(span, IssueLevel::Error, messages::unknown_variable(name));
            return;
        };
        if let Err(error) = value.is_assignable_to(&typing.declared) {
            self.report(span, IssueLevel::Error, error.to_string());
            return;
        }
        self.frames.replace_symbol(
            self.current,
            &canonical,
            SymbolTyping::narrowed(typing.declared, value),
        );
    }

    fn declare_symbol(&mut self, name: &str, ty: DataType, span: Span, replace: bool) {
        if !replace && self.frames.lookup_local(self.current, name).is_some() {
            self.report(span, IssueLevel::Error, messages::already_declared(name));
            return;
        }
        self.frames
            .replace_symbol(self.current, name, SymbolTyping::declared(ty));
    }

    fn declare_row(&mut self, name: &str, row: RowType, span: Span) {
        self.declare_symbol(name, DataType::Row(row), span, false);
    }

    fn resolve_parameters(
        &mut self,
        params: &[tsqlcheck_ast::ParameterDefinition],
    ) -> Vec<Parameter> {
        params
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                ty: self.resolve_type_name(&p.ty),
            })
            .collect()
    }

    /// The type a written type name denotes. Unrecognized names produce a
    /// warning and resolve to `Unknown`.
    fn resolve_type_name(&mut self, ty: &TypeName) -> DataType {
        let keyword = ty.name.to_ascii_lowercase();
        match keyword.as_str() {
            "int" | "bigint" | "smallint" | "tinyint" => DataType::int(),
            "bit" => DataType::Scalar(ScalarKind::Bit),
            "money" | "smallmoney" => DataType::Scalar(ScalarKind::Money),
            "date" => DataType::Scalar(ScalarKind::Date),
            "time" => DataType::Scalar(ScalarKind::Time),
            "datetime" | "datetime2" | "smalldatetime" => DataType::Scalar(ScalarKind::DateTime),
            "real" | "float" => DataType::Scalar(ScalarKind::Real),
            "decimal" | "numeric" => DataType::Scalar(ScalarKind::Decimal),
            "varchar" | "char" => DataType::varchar(ty.length.unwrap_or(1)),
            "nvarchar" | "nchar" => DataType::nvarchar(ty.length.unwrap_or(1)),
            "text" => DataType::varchar(u32::MAX),
            "ntext" => DataType::nvarchar(u32::MAX),
            _ => {
                self.report(
                    ty.span,
                    IssueLevel::Warning,
                    messages::unknown_type(&ty.name),
                );
                DataType::Unknown
            }
        }
    }

    // ----- table definitions -----------------------------------------------

    /// The row shape of a table definition, with column constraints folded
    /// into the column types.
    fn column_row(&mut self, table_name: &str, columns: &[ColumnDefinition]) -> RowType {
        let mut out = Vec::new();
        for column in columns {
            let mut ty = self.resolve_type_name(&column.ty);
            let mut nullable = true;
            for constraint in &column.constraints {
                match constraint {
                    ColumnConstraint::NotNull => nullable = false,
                    ColumnConstraint::Null => nullable = true,
                    ColumnConstraint::PrimaryKey => {
                        nullable = false;
                        ty = DataType::Domain {
                            base: Box::new(ty),
                            name: format!("{}.{}", table_name, column.name),
                        };
                    }
                    ColumnConstraint::Unique => {
                        ty = DataType::Domain {
                            base: Box::new(ty),
                            name: format!("{}.{}", table_name, column.name),
                        };
                    }
                    ColumnConstraint::ForeignKey { table, column: referenced } => {
                        ty = DataType::Domain {
                            base: Box::new(ty),
                            name: format!(
                                "{}.{}",
                                table.full(),
                                referenced.as_deref().unwrap_or(&column.name)
                            ),
                        };
                    }
                    ColumnConstraint::Check { expr, .. } => {
                        ty = self.check_constraint_type(table_name, &column.name, ty, expr);
                    }
                }
            }
            if nullable {
                ty = ty.to_nullable();
            }
            out.push(
                ColumnType::new(ColumnName::Schema(column.name.clone()), ty)
                    .with_span(column.span),
            );
        }
        RowType::new(out)
    }

    /// What a CHECK constraint proves about its column: the constraint body
    /// is checked in a scope holding just that column, and whatever the
    /// condition narrows the column to becomes its declared type.
    fn check_constraint_type(
        &mut self,
        table_name: &str,
        column_name: &str,
        ty: DataType,
        expr: &BooleanExpr,
    ) -> DataType {
        let saved = self.current;
        let frame = self.frames.push_child(saved);
        self.frames.with_symbol(
            frame,
            table_name,
            SymbolTyping::declared(DataType::Row(RowType::new(vec![ColumnType::new(
                ColumnName::Schema(column_name.to_string()),
                ty.clone(),
            )]))),
        );
        self.current = frame;
        let cases = self.check_boolean(expr);
        self.current = saved;
        let target = SymbolRef::Column {
            table: table_name.to_string(),
            column: column_name.to_string(),
        };
        match cases.positive.get(&target) {
            Some(fact) => DataType::refine(&fact.ty, &ty),
            None => ty,
        }
    }

    // ----- routines --------------------------------------------------------

    fn routine_parts(&self, id: RoutineId) -> (String, Vec<Parameter>, Vec<Statement>, FrameId) {
        let routine = &self.routines[id.0 as usize];
        (
            routine.name.clone(),
            routine.params.clone(),
            routine.body.clone(),
            routine.decl_frame,
        )
    }

    /// Check a routine body under a child of `parent` with the parameters in
    /// scope, collecting the diagnostics it produces.
    fn check_body_under(
        &mut self,
        parent: FrameId,
        params: &[Parameter],
        body: &[Statement],
    ) -> Vec<Issue> {
        let ((), issues) = self.probe(|checker| {
            let frame = checker.frames.push_child(parent);
            let saved = mem::replace(&mut checker.current, frame);
            for param in params {
                checker
                    .frames
                    .with_symbol(frame, &param.name, SymbolTyping::declared(param.ty.clone()));
            }
            for statement in body {
                checker.check_statement(statement);
            }
            checker.current = saved;
        });
        issues
    }

    /// Force a function body, memoizing the inferred return type. `call_span`
    /// attributes a cycle diagnostic when the body refers to itself.
    fn force_function(&mut self, id: RoutineId, call_span: Span) -> DataType {
        match &self.routines[id.0 as usize].progress {
            RoutineProgress::InProgress => {
                let name = self.routines[id.0 as usize].name.clone();
                self.report(
                    call_span,
                    IssueLevel::Error,
                    messages::inference_cycle(&name),
                );
                return DataType::Unknown;
            }
            RoutineProgress::Function { return_type, .. } => return return_type.clone(),
            RoutineProgress::Procedure { .. } => return DataType::Unknown,
            RoutineProgress::NotStarted => {}
        }
        self.routines[id.0 as usize].progress = RoutineProgress::InProgress;
        let (_, params, body, decl_frame) = self.routine_parts(id);
        let decl_span = self.routines[id.0 as usize].decl_span;
        let declared = self.routines[id.0 as usize].declared_return.clone();

        self.return_types.push(Vec::new());
        let mut issues = self.check_body_under(decl_frame, &params, &body);
        let returns = self.return_types.pop().unwrap_or_default();

        let mut inferred = DataType::Void;
        let mut first = true;
        for ty in returns {
            if first {
                inferred = ty;
                first = false;
                continue;
            }
            match DataType::disjunction(&inferred, &ty) {
                Some(joined) => inferred = joined,
                None => {
                    issues.push(Issue::new(
                        decl_span,
                        IssueLevel::Error,
                        messages::unable_to_join_types(&inferred, &ty),
                    ));
                    inferred = DataType::Unknown;
                    break;
                }
            }
        }
        let return_type = match declared {
            Some(declared) => {
                if let Err(error) = inferred.is_assignable_to(&declared) {
                    issues.push(Issue::new(decl_span, IssueLevel::Error, error.to_string()));
                }
                declared
            }
            None => inferred,
        };
        self.routines[id.0 as usize].progress = RoutineProgress::Function {
            return_type: return_type.clone(),
            issues,
        };
        return_type
    }

    /// Force a procedure body under its declaration scope and classify it:
    /// when every diagnostic reports an unresolved temp-table name the body
    /// is deferred to call sites instead of being reported here.
    fn force_procedure(&mut self, id: RoutineId) -> bool {
        match &self.routines[id.0 as usize].progress {
            RoutineProgress::Procedure {
                references_temp_table,
                ..
            } => return *references_temp_table,
            RoutineProgress::InProgress => return false,
            RoutineProgress::Function { .. } => return false,
            RoutineProgress::NotStarted => {}
        }
        self.routines[id.0 as usize].progress = RoutineProgress::InProgress;
        let (_, params, body, decl_frame) = self.routine_parts(id);
        let issues = self.check_body_under(decl_frame, &params, &body);
        let references_temp_table = !issues.is_empty()
            && issues
                .iter()
                .all(|issue| messages::is_temp_table_issue(&issue.message));
        self.routines[id.0 as usize].progress = RoutineProgress::Procedure {
            references_temp_table,
            issues,
        };
        references_temp_table
    }

    fn check_execute(&mut self, name: &ObjectName, args: &[ExecuteArg], span: Span) {
        let Some((_, _, typing)) = self.lookup_object(name) else {
            self.report(
                span,
                IssueLevel::Error,
                messages::unknown_procedure(&name.full()),
            );
            return;
        };
        let DataType::Procedure(proc) = typing.expression_type().clone() else {
            self.report(
                span,
                IssueLevel::Error,
                messages::not_a_procedure(&name.full()),
            );
            return;
        };
        if args.len() != proc.params.len() {
            self.report(
                span,
                IssueLevel::Error,
                messages::arity_mismatch(&proc.name, proc.params.len(), args.len()),
            );
        }
        let mut positional = 0;
        for arg in args {
            let result = self.check_scalar(&arg.value);
            let param = match &arg.name {
                Some(arg_name) => {
                    let found = proc
                        .params
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(arg_name));
                    if found.is_none() {
                        self.report(
                            arg.span,
                            IssueLevel::Error,
                            messages::unknown_parameter(&proc.name, arg_name),
                        );
                    }
                    found
                }
                None => {
                    let found = proc.params.get(positional);
                    positional += 1;
                    found
                }
            };
            if let Some(param) = param {
                if let Err(error) = result.ty.is_assignable_to(&param.ty) {
                    self.report(
                        arg.span,
                        IssueLevel::Error,
                        messages::parameter_issue(&param.name, error),
                    );
                }
            }
        }
        let deferred = self.force_procedure(proc.body);
        let already_active = self
            .evaluation_context
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&proc.name));
        if deferred && !already_active {
            // The body only makes sense with the caller's temp tables in
            // scope, so re-verify it here and attribute everything it finds
            // to this call site.
            self.evaluation_context.push(proc.name.clone());
            let (_, params, body, _) = self.routine_parts(proc.body);
            let issues = self.check_body_under(self.current, &params, &body);
            self.evaluation_context.pop();
            for issue in issues {
                self.report(
                    span,
                    issue.level,
                    messages::when_called_from(&proc.name, &issue.message),
                );
            }
        }
    }

    // ----- queries ---------------------------------------------------------

    /// Check a SELECT statement and return the shape of its result set.
    pub fn check_select_statement(&mut self, select: &SelectStatement) -> RowType {
        let saved = self.current;
        if !select.ctes.is_empty() {
            self.current = self.frames.push_child(saved);
            for cte in &select.ctes {
                self.register_cte(cte);
            }
        }
        let row = self.check_query_expr(&select.query);
        self.current = saved;
        row
    }

    /// Bind one WITH member. A set-operation body is seeded from its first
    /// arm, with the declared column names already applied, so the remaining
    /// arms may refer to the CTE recursively.
    fn register_cte(&mut self, cte: &CommonTableExpression) {
        let mut row = match &cte.query {
            QueryExpr::Binary {
                left, right, span, ..
            } => {
                let mut left_row = self.check_query_expr(left);
                self.apply_cte_columns(cte, &mut left_row);
                self.frames.replace_symbol(
                    self.current,
                    &cte.name,
                    SymbolTyping::declared(DataType::Row(left_row.clone())),
                );
                let right_row = self.check_query_expr(right);
                self.join_rows(*span, left_row, right_row)
            }
            other => self.check_query_expr(other),
        };
        self.apply_cte_columns(cte, &mut row);
        self.frames.replace_symbol(
            self.current,
            &cte.name,
            SymbolTyping::declared(DataType::Row(row)),
        );
    }

    fn apply_cte_columns(&mut self, cte: &CommonTableExpression, row: &mut RowType) {
        if cte.columns.is_empty() {
            return;
        }
        if cte.columns.len() != row.columns.len() {
            self.report(
                cte.span,
                IssueLevel::Error,
                messages::cte_column_count(&cte.name),
            );
            return;
        }
        for (column, declared) in row.columns.iter_mut().zip(&cte.columns) {
            if let ColumnName::Aliased(existing) = &column.name {
                if !existing.eq_ignore_ascii_case(declared) {
                    self.report(
                        cte.span,
                        IssueLevel::Error,
                        messages::cte_column_name_conflict(declared, existing),
                    );
                }
            }
            column.name = ColumnName::Schema(declared.clone());
        }
    }

    fn check_query_expr(&mut self, query: &QueryExpr) -> RowType {
        match query {
            QueryExpr::Spec(spec) => self.check_query_spec(spec),
            QueryExpr::Binary {
                left, right, span, ..
            } => {
                let left_row = self.check_query_expr(left);
                let right_row = self.check_query_expr(right);
                self.join_rows(*span, left_row, right_row)
            }
            QueryExpr::Values { rows, span } => {
                let mut joined: Option<RowType> = None;
                let mut width = None;
                for row_exprs in rows {
                    if let Some(expected) = width {
                        if row_exprs.len() != expected {
                            self.report(*span, IssueLevel::Error, messages::values_row_width());
                            continue;
                        }
                    } else {
                        width = Some(row_exprs.len());
                    }
                    let columns = row_exprs
                        .iter()
                        .map(|expr| {
                            let result = self.check_scalar(expr);
                            ColumnType::new(ColumnName::Anonymous, result.ty)
                                .with_span(expr.span())
                        })
                        .collect();
                    let row = RowType::new(columns);
                    joined = Some(match joined.take() {
                        Some(acc) => self.join_rows(*span, acc, row),
                        None => row,
                    });
                }
                joined.unwrap_or_default()
            }
        }
    }

    /// Pairwise column join of two set-operation arms.
    fn join_rows(&mut self, span: Span, left: RowType, right: RowType) -> RowType {
        if left.is_unknown_shape() {
            return right;
        }
        if right.is_unknown_shape() {
            return left;
        }
        if left.columns.len() != right.columns.len() {
            self.report(span, IssueLevel::Error, messages::set_operation_column_counts());
            return left;
        }
        let columns = left
            .columns
            .iter()
            .zip(&right.columns)
            .map(|(l, r)| match l.join(r) {
                Some(column) => column,
                None => {
                    self.report(
                        r.defining_span.unwrap_or(span),
                        IssueLevel::Error,
                        messages::unable_to_join_types(&l.ty, &r.ty),
                    );
                    ColumnType::new(ColumnName::Anonymous, DataType::Unknown)
                }
            })
            .collect();
        RowType::new(columns)
    }

    fn check_query_spec(&mut self, spec: &QuerySpecification) -> RowType {
        let saved = self.current;
        let query_frame = self.frames.push_child(saved);
        self.current = query_frame;
        for source in &spec.from {
            self.register_from_source(source);
        }
        if let Some(where_clause) = &spec.where_clause {
            let cases = self.check_boolean(where_clause);
            self.current = self
                .frames
                .new_frame_from_refinements(query_frame, &cases.positive);
        }
        let mut columns = Vec::new();
        for element in &spec.select {
            match element {
                SelectElement::Expr { expr, alias, .. } => {
                    let result = self.check_scalar(expr);
                    let name = match alias {
                        Some(alias) => ColumnName::Aliased(alias.clone()),
                        None => match expr {
                            ScalarExpr::ColumnRef { parts, .. } => parts
                                .last()
                                .map(|tail| ColumnName::Schema(tail.clone()))
                                .unwrap_or(ColumnName::Anonymous),
                            _ => ColumnName::Anonymous,
                        },
                    };
                    columns.push(ColumnType::new(name, result.ty).with_span(expr.span()));
                }
                SelectElement::SetVariable { name, expr, span } => {
                    let result = self.check_scalar(expr);
                    let active = self.current;
                    // The assignment outlives the query scope.
                    self.current = saved;
                    self.assign_to_variable(name, result.ty, *span);
                    self.current = active;
                }
                SelectElement::Star { qualifier, span } => match qualifier {
                    Some(qualifier) => {
                        match self
                            .frames
                            .lookup(self.current, qualifier)
                            .map(|(_, _, typing)| typing.expression_type().clone())
                        {
                            Some(DataType::Row(row)) => columns.extend(row.columns),
                            Some(_) | None => self.report(
                                *span,
                                IssueLevel::Error,
                                messages::unable_to_find_column(&format!("{}.*", qualifier)),
                            ),
                        }
                    }
                    None => {
                        for (_, row) in self.frames.rows_in_scope(self.current, Some(query_frame))
                        {
                            columns.extend(row.columns);
                        }
                    }
                },
            }
        }
        self.current = saved;
        RowType::new(columns)
    }

    /// Bind one FROM source into the current query frame.
    fn register_from_source(&mut self, source: &TableReference) {
        match source {
            TableReference::Named { name, alias, span } => {
                let binding = alias.clone().unwrap_or_else(|| name.tail().to_string());
                let row = match self.lookup_object(name) {
                    Some((_, _, typing)) => match typing.expression_type() {
                        DataType::Row(row) => row.clone(),
                        _ => {
                            self.report(
                                *span,
                                IssueLevel::Warning,
                                messages::unknown_type_for_binding(&name.full(), &binding),
                            );
                            RowType::unknown_shape()
                        }
                    },
                    None => {
                        self.report(
                            *span,
                            IssueLevel::Warning,
                            messages::unknown_type_for_binding(&name.full(), &binding),
                        );
                        RowType::unknown_shape()
                    }
                };
                self.bind_row(&binding, row, *span);
            }
            TableReference::Derived { query, alias, span } => {
                let row = self.check_query_expr(query);
                self.bind_row(alias, row, *span);
            }
            TableReference::Join {
                left,
                right,
                condition,
                ..
            } => {
                self.register_from_source(left);
                self.register_from_source(right);
                if let Some(condition) = condition {
                    let cases = self.check_boolean(condition);
                    self.frames.refine_in_place(self.current, &cases.positive);
                }
            }
        }
    }

    fn bind_row(&mut self, binding: &str, row: RowType, span: Span) {
        if self.frames.lookup_local(self.current, binding).is_some() {
            self.report(span, IssueLevel::Error, messages::already_declared(binding));
            return;
        }
        self.frames
            .with_symbol(self.current, binding, SymbolTyping::declared(DataType::Row(row)));
    }

    // ----- scalar expressions ----------------------------------------------

    fn check_scalar(&mut self, expr: &ScalarExpr) -> ExpressionResult {
        match expr {
            ScalarExpr::IntLiteral { value, .. } => {
                ExpressionResult::plain(DataType::int_values([*value]))
            }
            ScalarExpr::StringLiteral {
                value, national, ..
            } => {
                let len = value.chars().count().max(1) as u32;
                let base = if *national {
                    DataType::nvarchar(len)
                } else {
                    DataType::varchar(len)
                };
                ExpressionResult::plain(DataType::KnownSet(KnownSet::new(
                    base,
                    true,
                    std::iter::once(SqlValue::Str(value.clone())).collect(),
                )))
            }
            ScalarExpr::NumericLiteral { value, .. } => {
                ExpressionResult::plain(DataType::KnownSet(KnownSet::new(
                    DataType::Scalar(ScalarKind::Decimal),
                    true,
                    std::iter::once(SqlValue::Num(value.clone())).collect(),
                )))
            }
            ScalarExpr::RealLiteral { value, .. } => {
                ExpressionResult::plain(DataType::KnownSet(KnownSet::new(
                    DataType::Scalar(ScalarKind::Real),
                    true,
                    std::iter::once(SqlValue::Num(value.clone())).collect(),
                )))
            }
            ScalarExpr::NullLiteral { .. } => ExpressionResult::plain(DataType::Null),
            ScalarExpr::Variable { name, span } => {
                match self.frames.lookup(self.current, name) {
                    Some((_, canonical, typing)) => ExpressionResult {
                        ty: typing.expression_type().clone(),
                        symbol: Some(SymbolRef::Variable { name: canonical }),
                    },
                    None => {
                        self.report(*span, IssueLevel::Error, messages::unknown_variable(name));
                        ExpressionResult::plain(DataType::Unknown)
                    }
                }
            }
            ScalarExpr::ColumnRef { parts, span } => self.check_column_ref(parts, *span),
            ScalarExpr::BinaryMath {
                op,
                left,
                right,
                span,
            } => self.check_binary_math(*op, left, right, *span),
            ScalarExpr::FunctionCall { name, args, span } => {
                self.check_function_call(name, args, *span)
            }
            ScalarExpr::Cast { expr, ty, .. } => {
                let inner = self.check_scalar(expr);
                let target = self.resolve_type_name(ty);
                let ty = if inner.ty.admits_null() {
                    target.to_nullable()
                } else {
                    target
                };
                ExpressionResult::plain(ty)
            }
            ScalarExpr::SearchedCase {
                whens,
                else_expr,
                span,
            } => {
                let saved = self.current;
                let mut flow = saved;
                let mut arms = Vec::new();
                for (condition, then_value) in whens {
                    self.current = flow;
                    let cases = self.check_boolean(condition);
                    self.current = self
                        .frames
                        .new_frame_from_refinements(flow, &cases.positive);
                    arms.push(self.check_scalar(then_value).ty);
                    flow = self
                        .frames
                        .new_frame_from_refinements(flow, &cases.negative);
                }
                self.current = flow;
                arms.push(match else_expr {
                    Some(else_value) => self.check_scalar(else_value).ty,
                    None => DataType::Null,
                });
                self.current = saved;
                ExpressionResult::plain(self.join_branch_types(arms, *span))
            }
            ScalarExpr::SimpleCase {
                input,
                whens,
                else_expr,
                span,
            } => {
                let input_result = self.check_scalar(input);
                let saved = self.current;
                let mut flow = saved;
                let mut arms = Vec::new();
                for (when_value, then_value) in whens {
                    self.current = flow;
                    let when_result = self.check_scalar(when_value);
                    if let Err(error) = input_result.ty.can_compare_with(&when_result.ty) {
                        self.report(when_value.span(), IssueLevel::Error, error.to_string());
                    }
                    let mut cases = RefinementSetCases::empty();
                    narrow_side(&mut cases, &input_result, &when_result);
                    self.current = self
                        .frames
                        .new_frame_from_refinements(flow, &cases.positive);
                    arms.push(self.check_scalar(then_value).ty);
                    flow = self
                        .frames
                        .new_frame_from_refinements(flow, &cases.negative);
                }
                self.current = flow;
                arms.push(match else_expr {
                    Some(else_value) => self.check_scalar(else_value).ty,
                    None => DataType::Null,
                });
                self.current = saved;
                ExpressionResult::plain(self.join_branch_types(arms, *span))
            }
        }
    }

    fn join_branch_types(&mut self, types: Vec<DataType>, span: Span) -> DataType {
        let mut iter = types.into_iter();
        let Some(mut acc) = iter.next() else {
            return DataType::Unknown;
        };
        for ty in iter {
            match DataType::disjunction(&acc, &ty) {
                Some(joined) => acc = joined,
                None => {
                    self.report(
                        span,
                        IssueLevel::Error,
                        messages::unable_to_join_types(&acc, &ty),
                    );
                    return DataType::Unknown;
                }
            }
        }
        acc
    }

    /// Resolve a possibly qualified column reference against the rows in
    /// scope. A structurally unknown row answers for any column without a
    /// diagnostic, so one unresolved table does not fan out into noise.
    fn check_column_ref(&mut self, parts: &[String], span: Span) -> ExpressionResult {
        let joined = parts.join(".");
        if parts.len() >= 2 {
            let qualifier = &parts[parts.len() - 2];
            let column = &parts[parts.len() - 1];
            let Some((_, canonical, typing)) = self
                .frames
                .lookup(self.current, qualifier)
                .map(|(f, c, t)| (f, c, t.clone()))
            else {
                self.report(span, IssueLevel::Error, messages::unable_to_find_column(&joined));
                return ExpressionResult::plain(DataType::Unknown);
            };
            let Some(row) = typing.expression_type().as_row() else {
                self.report(span, IssueLevel::Error, messages::unable_to_find_column(&joined));
                return ExpressionResult::plain(DataType::Unknown);
            };
            if row.is_unknown_shape() {
                return ExpressionResult {
                    ty: DataType::Unknown,
                    symbol: Some(SymbolRef::Column {
                        table: canonical,
                        column: column.clone(),
                    }),
                };
            }
            return match row.find_column(column) {
                Some(found) => ExpressionResult {
                    ty: found.ty.clone(),
                    symbol: Some(SymbolRef::Column {
                        table: canonical,
                        column: column.clone(),
                    }),
                },
                None => {
                    self.report(span, IssueLevel::Error, messages::unable_to_find_column(&joined));
                    ExpressionResult::plain(DataType::Unknown)
                }
            };
        }
        let Some(column) = parts.first() else {
            return ExpressionResult::plain(DataType::Unknown);
        };
        let rows = self.frames.rows_in_scope(self.current, None);
        let mut unknown_shape_owner = None;
        for (table, row) in &rows {
            if row.is_unknown_shape() {
                if unknown_shape_owner.is_none() {
                    unknown_shape_owner = Some(table.clone());
                }
                continue;
            }
            if let Some(found) = row.find_column(column) {
                return ExpressionResult {
                    ty: found.ty.clone(),
                    symbol: Some(SymbolRef::Column {
                        table: table.clone(),
                        column: column.clone(),
                    }),
                };
            }
        }
        if let Some(table) = unknown_shape_owner {
            return ExpressionResult {
                ty: DataType::Unknown,
                symbol: Some(SymbolRef::Column {
                    table,
                    column: column.clone(),
                }),
            };
        }
        self.report(span, IssueLevel::Error, messages::unable_to_find_column(&joined));
        ExpressionResult::plain(DataType::Unknown)
    }

    fn check_binary_math(
        &mut self,
        op: MathOp,
        left: &ScalarExpr,
        right: &ScalarExpr,
        span: Span,
    ) -> ExpressionResult {
        let left_result = self.check_scalar(left);
        let right_result = self.check_scalar(right);
        if left_result.ty.admits_null() || right_result.ty.admits_null() {
            self.report(span, IssueLevel::Warning, messages::possible_null_operand());
        }
        let left_core = left_result.ty.unwrap_to_core().clone();
        let right_core = right_result.ty.unwrap_to_core().clone();
        if matches!(left_core, DataType::Unknown) || matches!(right_core, DataType::Unknown) {
            return ExpressionResult::plain(DataType::Unknown);
        }
        let compatible = match (&left_core, &right_core) {
            (DataType::Scalar(a), DataType::Scalar(b)) => a == b,
            (DataType::Sized { .. }, DataType::Sized { .. }) => op == MathOp::Add,
            _ => false,
        };
        if !compatible {
            self.report(
                span,
                IssueLevel::Error,
                messages::math_kind_mismatch(&left_result.ty, &right_result.ty),
            );
            return ExpressionResult::plain(DataType::Unknown);
        }
        if matches!(op, MathOp::Divide | MathOp::Modulo)
            && !provably_nonzero(&right_result.ty)
        {
            self.report(span, IssueLevel::Warning, messages::divide_by_zero());
        }
        ExpressionResult::plain(left_core)
    }

    fn check_function_call(
        &mut self,
        name: &str,
        args: &[ScalarExpr],
        span: Span,
    ) -> ExpressionResult {
        let lowered = name.to_ascii_lowercase();
        if lowered == "isnull" || lowered == "coalesce" {
            let types: Vec<DataType> = args.iter().map(|a| self.check_scalar(a).ty).collect();
            let any_non_null = types.iter().any(|t| !t.admits_null());
            let joined = self.join_branch_types(types, span);
            let ty = if any_non_null {
                match joined {
                    DataType::Nullable(inner) => *inner,
                    DataType::Null => DataType::Unknown,
                    other => other,
                }
            } else {
                joined
            };
            return ExpressionResult::plain(ty);
        }
        let Some((_, typing)) = self.lookup_callable(name) else {
            self.report(span, IssueLevel::Error, messages::unknown_function(name));
            for arg in args {
                self.check_scalar(arg);
            }
            return ExpressionResult::plain(DataType::Unknown);
        };
        let DataType::Function(function) = typing.expression_type().clone() else {
            self.report(span, IssueLevel::Error, messages::not_a_function(name));
            return ExpressionResult::plain(DataType::Unknown);
        };
        if args.len() != function.params.len() {
            self.report(
                span,
                IssueLevel::Error,
                messages::arity_mismatch(&function.name, function.params.len(), args.len()),
            );
        }
        for (index, arg) in args.iter().enumerate() {
            let result = self.check_scalar(arg);
            if let Some(param) = function.params.get(index) {
                if let Err(error) = result.ty.is_assignable_to(&param.ty) {
                    self.report(
                        arg.span(),
                        IssueLevel::Error,
                        messages::parameter_issue(&param.name, error),
                    );
                }
            }
        }
        let ty = match function.declared_return {
            Some(declared) => *declared,
            None => self.force_function(function.body, span),
        };
        ExpressionResult::plain(ty)
    }

    // ----- boolean expressions ---------------------------------------------

    /// Check a search condition, reporting its problems and returning the
    /// refinements it proves in each outcome.
    fn check_boolean(&mut self, expr: &BooleanExpr) -> RefinementSetCases {
        match expr {
            BooleanExpr::Comparison {
                op,
                left,
                right,
                span,
            } => {
                let left_result = self.check_scalar(left);
                let right_result = self.check_scalar(right);
                if let Err(error) = left_result.ty.can_compare_with(&right_result.ty) {
                    self.report(*span, IssueLevel::Error, error.to_string());
                }
                if !op.is_equality() {
                    let left_is_null = matches!(left_result.ty, DataType::Null);
                    let right_is_null = matches!(right_result.ty, DataType::Null);
                    // Ordering two NULL literals is vacuous rather than
                    // mistyped; everything else that can be null is rejected.
                    let ordered_against_null = (!left_is_null && left_result.ty.admits_null())
                        || (!right_is_null && right_result.ty.admits_null())
                        || (left_is_null != right_is_null);
                    if ordered_against_null {
                        self.report(
                            *span,
                            IssueLevel::Error,
                            messages::ordered_comparison_with_null(),
                        );
                    }
                    return RefinementSetCases::empty();
                }
                let mut cases = RefinementSetCases::empty();
                narrow_side(&mut cases, &left_result, &right_result);
                narrow_side(&mut cases, &right_result, &left_result);
                if *op == CompareOp::Ne {
                    cases = cases.negate();
                }
                cases
            }
            BooleanExpr::And { left, right, .. } => {
                let left_cases = self.check_boolean(left);
                let saved = self.current;
                self.current = self
                    .frames
                    .new_frame_from_refinements(saved, &left_cases.positive);
                let right_cases = self.check_boolean(right);
                self.current = saved;
                RefinementSetCases::conjunction(&left_cases, &right_cases)
            }
            BooleanExpr::Or { left, right, .. } => {
                let left_cases = self.check_boolean(left);
                let saved = self.current;
                self.current = self
                    .frames
                    .new_frame_from_refinements(saved, &left_cases.negative);
                let right_cases = self.check_boolean(right);
                self.current = saved;
                RefinementSetCases::disjunction(&left_cases, &right_cases)
            }
            BooleanExpr::Not { inner, .. } => self.check_boolean(inner).negate(),
            BooleanExpr::IsNull { expr, is_not, .. } => {
                let result = self.check_scalar(expr);
                let mut cases = RefinementSetCases::empty();
                if let Some(symbol) = &result.symbol {
                    cases.positive.add(Refinement {
                        target: symbol.clone(),
                        ty: DataType::Null,
                    });
                    cases.negative.add(Refinement {
                        target: symbol.clone(),
                        ty: DataType::subtract(&result.ty, &DataType::Null),
                    });
                }
                if *is_not {
                    cases.negate()
                } else {
                    cases
                }
            }
            BooleanExpr::In {
                expr,
                list,
                is_not,
                ..
            } => {
                let result = self.check_scalar(expr);
                let mut folded: Option<DataType> = None;
                for item in list {
                    let item_result = self.check_scalar(item);
                    if let Err(error) = result.ty.can_compare_with(&item_result.ty) {
                        self.report(item.span(), IssueLevel::Error, error.to_string());
                    }
                    folded = match folded.take() {
                        Some(acc) => DataType::disjunction(&acc, &item_result.ty),
                        None => Some(item_result.ty),
                    };
                }
                let mut cases = RefinementSetCases::empty();
                if let (Some(symbol), Some(DataType::KnownSet(set))) = (&result.symbol, &folded) {
                    if set.include {
                        cases.positive.add(Refinement {
                            target: symbol.clone(),
                            ty: DataType::KnownSet(set.clone()),
                        });
                        cases.negative.add(Refinement {
                            target: symbol.clone(),
                            ty: DataType::KnownSet(set.invert()),
                        });
                    }
                }
                if *is_not {
                    cases.negate()
                } else {
                    cases
                }
            }
            BooleanExpr::Paren(inner) => self.check_boolean(inner),
        }
    }
}

/// Add the narrowing an equality between `target` and `other` proves about
/// `target`, when `target` names a symbol and the other side is strictly
/// more specific.
fn narrow_side(cases: &mut RefinementSetCases, target: &ExpressionResult, other: &ExpressionResult) {
    let Some(symbol) = &target.symbol else {
        return;
    };
    if other.ty.size_of_domain() >= target.ty.size_of_domain() {
        return;
    }
    cases.positive.add(Refinement {
        target: symbol.clone(),
        ty: other.ty.clone(),
    });
    cases.negative.add(Refinement {
        target: symbol.clone(),
        ty: DataType::subtract(&target.ty, &other.ty),
    });
}

/// True when a divisor's type rules out zero.
fn provably_nonzero(ty: &DataType) -> bool {
    let mut current = ty;
    loop {
        match current {
            DataType::Nullable(inner) => current = inner,
            DataType::Column(col) => current = &col.ty,
            DataType::Domain { base, .. } => current = base,
            DataType::KnownSet(set) => {
                return if set.include {
                    !set.mentions_zero()
                } else {
                    set.mentions_zero()
                };
            }
            _ => return false,
        }
    }
}
