//! End-to-end checks over hand-built scripts.

use tsqlcheck_ast::{
    BinaryQueryOp, BooleanExpr, ColumnConstraint, ColumnDefinition, CommonTableExpression,
    CompareOp, ExecuteArg, MathOp, ObjectName, QueryExpr, QuerySpecification, ScalarExpr, Script,
    SelectElement, SelectStatement, Span, Statement, TableReference, TypeName,
    VariableDeclaration,
};
use tsqlcheck_checker::{check_script, Checker, CheckerOptions, Issue, IssueLevel};
use tsqlcheck_types::{DataType, SqlValue};

fn sp(n: usize) -> Span {
    Span::new(n * 10, n * 10 + 5, 1, n as u32 * 10 + 1)
}

fn int_lit(value: i64, n: usize) -> ScalarExpr {
    ScalarExpr::IntLiteral { value, span: sp(n) }
}

fn str_lit(value: &str, n: usize) -> ScalarExpr {
    ScalarExpr::StringLiteral {
        value: value.to_string(),
        national: false,
        span: sp(n),
    }
}

fn var(name: &str, n: usize) -> ScalarExpr {
    ScalarExpr::Variable {
        name: name.to_string(),
        span: sp(n),
    }
}

fn col(name: &str, n: usize) -> ScalarExpr {
    ScalarExpr::ColumnRef {
        parts: vec![name.to_string()],
        span: sp(n),
    }
}

fn math(op: MathOp, left: ScalarExpr, right: ScalarExpr, n: usize) -> ScalarExpr {
    ScalarExpr::BinaryMath {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span: sp(n),
    }
}

fn type_name(name: &str, n: usize) -> TypeName {
    TypeName {
        name: name.to_string(),
        length: None,
        span: sp(n),
    }
}

fn declare(name: &str, ty: &str, n: usize) -> Statement {
    Statement::DeclareVariable {
        decls: vec![VariableDeclaration {
            name: name.to_string(),
            ty: type_name(ty, n),
            init: None,
            span: sp(n),
        }],
        span: sp(n),
    }
}

fn set_var(name: &str, value: ScalarExpr, n: usize) -> Statement {
    Statement::SetVariable {
        name: name.to_string(),
        value,
        span: sp(n),
    }
}

fn object(name: &str, n: usize) -> ObjectName {
    ObjectName::new(name.split('.').map(String::from).collect(), sp(n))
}

fn select_exprs(exprs: Vec<ScalarExpr>, n: usize) -> QueryExpr {
    QueryExpr::Spec(QuerySpecification {
        select: exprs
            .into_iter()
            .map(|expr| {
                let span = expr.span();
                SelectElement::Expr {
                    expr,
                    alias: None,
                    span,
                }
            })
            .collect(),
        from: vec![],
        where_clause: None,
        span: sp(n),
    })
}

fn select_stmt(query: QueryExpr, n: usize) -> SelectStatement {
    SelectStatement {
        ctes: vec![],
        query,
        span: sp(n),
    }
}

fn int_column(name: &str, constraints: Vec<ColumnConstraint>, n: usize) -> ColumnDefinition {
    ColumnDefinition {
        name: name.to_string(),
        ty: type_name("int", n),
        constraints,
        span: sp(n),
    }
}

fn check(statements: Vec<Statement>) -> Vec<Issue> {
    check_script(&Script { statements }, &CheckerOptions::default())
}

#[test]
fn assigning_a_string_to_an_int_variable_is_a_single_error() {
    let issues = check(vec![
        declare("@x", "int", 1),
        set_var("@x", str_lit("abc", 2), 3),
    ]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].level, IssueLevel::Error);
    assert_eq!(
        issues[0].message,
        "Cannot assign value of type varchar(3) to int."
    );
    assert_eq!(issues[0].span, sp(3));
}

#[test]
fn case_guards_discharge_null_and_zero_before_dividing() {
    let guarded_division = ScalarExpr::SearchedCase {
        whens: vec![
            (
                BooleanExpr::IsNull {
                    expr: var("@x", 2),
                    is_not: false,
                    span: sp(3),
                },
                int_lit(-1, 4),
            ),
            (
                BooleanExpr::Comparison {
                    op: CompareOp::Eq,
                    left: var("@x", 5),
                    right: int_lit(0, 6),
                    span: sp(7),
                },
                int_lit(-2, 8),
            ),
        ],
        else_expr: Some(Box::new(math(
            MathOp::Divide,
            int_lit(50, 9),
            var("@x", 10),
            11,
        ))),
        span: sp(12),
    };
    let issues = check(vec![
        declare("@x", "int", 1),
        Statement::Select(select_stmt(select_exprs(vec![guarded_division], 13), 14)),
    ]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn zero_guard_alone_discharges_both_null_and_zero() {
    // Ruling out the value 0 also rules out null, so the ELSE divisor is
    // both non-null and provably nonzero.
    let guarded_division = ScalarExpr::SearchedCase {
        whens: vec![(
            BooleanExpr::Comparison {
                op: CompareOp::Eq,
                left: var("@x", 2),
                right: int_lit(0, 3),
                span: sp(4),
            },
            int_lit(-1, 5),
        )],
        else_expr: Some(Box::new(math(
            MathOp::Divide,
            int_lit(50, 6),
            var("@x", 7),
            8,
        ))),
        span: sp(9),
    };
    let issues = check(vec![
        declare("@x", "int", 1),
        Statement::Select(select_stmt(select_exprs(vec![guarded_division], 10), 11)),
    ]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn union_of_literal_arms_accumulates_known_sets() {
    let options = CheckerOptions::default();
    let mut checker = Checker::new(&options);
    let union = QueryExpr::Binary {
        op: BinaryQueryOp::Union,
        left: Box::new(select_exprs(vec![int_lit(1, 1), str_lit("apples", 2)], 3)),
        right: Box::new(select_exprs(vec![int_lit(2, 4), str_lit("oranges", 5)], 6)),
        span: sp(7),
    };
    let row = checker.check_select_statement(&select_stmt(union, 8));

    assert_eq!(row.columns.len(), 2);
    assert_eq!(row.columns[0].ty, DataType::int_values([1, 2]));
    match &row.columns[1].ty {
        DataType::KnownSet(set) => {
            assert!(set.include);
            assert!(set.values.contains(&SqlValue::Str("apples".to_string())));
            assert!(set.values.contains(&SqlValue::Str("oranges".to_string())));
            assert_eq!(*set.base, DataType::varchar(7));
        }
        other => panic!("expected a known set, got {}", other),
    }
    assert!(checker.finish().is_empty());
}

#[test]
fn temp_table_procedures_report_at_each_call_site() {
    let body = vec![Statement::Insert {
        target: object("#t", 1),
        source: select_stmt(select_exprs(vec![str_lit("abc", 2)], 3), 4),
        span: sp(5),
    }];
    let issues = check(vec![
        Statement::CreateProcedure {
            name: object("p", 6),
            params: vec![],
            body,
            is_alter: false,
            span: sp(7),
        },
        Statement::Execute {
            name: object("p", 8),
            args: vec![],
            span: sp(9),
        },
        Statement::CreateTable {
            name: object("#t", 10),
            columns: vec![int_column("id", vec![ColumnConstraint::NotNull], 11)],
            span: sp(13),
        },
        Statement::Execute {
            name: object("p", 14),
            args: vec![],
            span: sp(15),
        },
    ]);
    assert_eq!(issues.len(), 2, "{:?}", issues);

    // Before the temp table exists the body still cannot resolve it.
    assert_eq!(issues[0].span, sp(9));
    assert_eq!(issues[0].level, IssueLevel::Warning);
    assert_eq!(
        issues[0].message,
        "When called from p: Unknown type #t referenced by insert."
    );

    // Once it exists, the body is checked against its real shape.
    assert_eq!(issues[1].span, sp(15));
    assert_eq!(issues[1].level, IssueLevel::Error);
    assert_eq!(
        issues[1].message,
        "When called from p: Column 1: Cannot assign value of type varchar(3) to int."
    );
}

#[test]
fn check_constraint_becomes_part_of_the_column_type() {
    let table = Statement::CreateTable {
        name: object("t", 1),
        columns: vec![int_column(
            "id",
            vec![
                ColumnConstraint::NotNull,
                ColumnConstraint::Check {
                    name: None,
                    expr: BooleanExpr::In {
                        expr: col("id", 2),
                        list: vec![int_lit(1, 3), int_lit(2, 4), int_lit(3, 5)],
                        is_not: false,
                        span: sp(6),
                    },
                },
            ],
            7,
        )],
        span: sp(8),
    };
    let in_range = Statement::Insert {
        target: object("t", 9),
        source: select_stmt(select_exprs(vec![int_lit(2, 10)], 11), 12),
        span: sp(13),
    };
    let out_of_range = Statement::Insert {
        target: object("t", 14),
        source: select_stmt(select_exprs(vec![int_lit(4, 15)], 16), 17),
        span: sp(18),
    };
    let issues = check(vec![table, in_range, out_of_range]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].span, sp(18));
    assert_eq!(issues[0].level, IssueLevel::Error);
    assert!(
        issues[0].message.contains("may fall outside"),
        "{}",
        issues[0].message
    );
}

#[test]
fn is_not_null_guard_narrows_only_the_guarded_branch() {
    let issues = check(vec![
        declare("@x", "int", 1),
        declare("@y", "int", 2),
        Statement::If {
            condition: BooleanExpr::IsNull {
                expr: var("@x", 3),
                is_not: true,
                span: sp(4),
            },
            then_branch: Box::new(set_var(
                "@y",
                math(MathOp::Add, var("@x", 5), int_lit(1, 6), 7),
                8,
            )),
            else_branch: None,
            span: sp(9),
        },
        set_var("@y", math(MathOp::Add, var("@x", 10), int_lit(2, 11), 12), 13),
    ]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].span, sp(12));
    assert_eq!(issues[0].level, IssueLevel::Warning);
    assert_eq!(
        issues[0].message,
        "A binary operation includes a possibly null value."
    );
}

#[test]
fn isnull_discharges_nullability_for_later_uses() {
    let isnull = ScalarExpr::FunctionCall {
        name: "isnull".to_string(),
        args: vec![var("@x", 3), int_lit(0, 4)],
        span: sp(5),
    };
    let issues = check(vec![
        declare("@x", "int", 1),
        declare("@y", "int", 2),
        set_var("@y", isnull, 6),
        Statement::Select(select_stmt(
            select_exprs(vec![math(MathOp::Add, var("@y", 7), int_lit(1, 8), 9)], 10),
            11,
        )),
    ]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn unproven_divisors_warn_until_narrowed() {
    let issues = check(vec![
        declare("@x", "int", 1),
        Statement::Select(select_stmt(
            select_exprs(vec![math(MathOp::Divide, int_lit(10, 2), var("@x", 3), 4)], 5),
            6,
        )),
        set_var("@x", int_lit(2, 7), 8),
        Statement::Select(select_stmt(
            select_exprs(vec![math(MathOp::Divide, int_lit(10, 9), var("@x", 10), 11)], 12),
            13,
        )),
    ]);
    assert_eq!(issues.len(), 2, "{:?}", issues);
    assert!(issues.iter().all(|i| i.span == sp(4)));
    assert!(issues.iter().all(|i| i.level == IssueLevel::Warning));
    assert!(issues
        .iter()
        .any(|i| i.message == "A binary operation includes a possibly null value."));
    assert!(issues
        .iter()
        .any(|i| i.message == "Possible divide by zero."));
}

#[test]
fn self_referential_function_needs_a_declared_return_type() {
    let issues = check(vec![Statement::CreateFunction {
        name: object("f", 1),
        params: vec![],
        returns: None,
        body: vec![Statement::Return {
            value: Some(ScalarExpr::FunctionCall {
                name: "f".to_string(),
                args: vec![],
                span: sp(3),
            }),
            span: sp(4),
        }],
        span: sp(2),
    }]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].span, sp(3));
    assert_eq!(issues[0].level, IssueLevel::Error);
    assert!(issues[0].message.contains("refers to itself"));
}

#[test]
fn recursive_cte_resolves_its_own_columns() {
    let seed = select_exprs(vec![int_lit(1, 1)], 2);
    let step = QueryExpr::Spec(QuerySpecification {
        select: vec![SelectElement::Expr {
            expr: math(MathOp::Add, col("n", 3), int_lit(1, 4), 5),
            alias: None,
            span: sp(5),
        }],
        from: vec![TableReference::Named {
            name: object("r", 6),
            alias: None,
            span: sp(7),
        }],
        where_clause: None,
        span: sp(8),
    });
    let statement = Statement::Select(SelectStatement {
        ctes: vec![CommonTableExpression {
            name: "r".to_string(),
            columns: vec!["n".to_string()],
            query: QueryExpr::Binary {
                op: BinaryQueryOp::Union,
                left: Box::new(seed),
                right: Box::new(step),
                span: sp(9),
            },
            span: sp(10),
        }],
        query: QueryExpr::Spec(QuerySpecification {
            select: vec![SelectElement::Expr {
                expr: col("n", 11),
                alias: None,
                span: sp(11),
            }],
            from: vec![TableReference::Named {
                name: object("r", 12),
                alias: None,
                span: sp(13),
            }],
            where_clause: None,
            span: sp(14),
        }),
        span: sp(15),
    });
    let issues = check(vec![statement]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn dropping_an_undeclared_table_errors() {
    let issues = check(vec![Statement::Drop {
        names: vec![(object("nope", 1), sp(2))],
        span: sp(3),
    }]);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].span, sp(2));
    assert_eq!(
        issues[0].message,
        "Cannot drop nope because it has not been declared."
    );
}

#[test]
fn procedure_calls_check_arity_names_and_types() {
    let declaration = Statement::CreateProcedure {
        name: object("q", 1),
        params: vec![tsqlcheck_ast::ParameterDefinition {
            name: "@a".to_string(),
            ty: type_name("int", 2),
            span: sp(2),
        }],
        body: vec![],
        is_alter: false,
        span: sp(3),
    };
    let issues = check(vec![
        declaration,
        Statement::Execute {
            name: object("q", 4),
            args: vec![],
            span: sp(5),
        },
        Statement::Execute {
            name: object("q", 6),
            args: vec![ExecuteArg {
                name: None,
                value: str_lit("x", 7),
                span: sp(8),
            }],
            span: sp(9),
        },
        Statement::Execute {
            name: object("q", 10),
            args: vec![ExecuteArg {
                name: Some("@b".to_string()),
                value: int_lit(1, 11),
                span: sp(12),
            }],
            span: sp(13),
        },
    ]);
    assert_eq!(issues.len(), 3, "{:?}", issues);
    assert_eq!(issues[0].message, "q expects 1 arguments but was given 0.");
    assert_eq!(
        issues[1].message,
        "Parameter @a: Cannot assign value of type varchar(1) to int."
    );
    assert_eq!(issues[2].message, "q has no parameter named @b.");
}

#[test]
fn select_assignment_carries_where_narrowing_out_of_the_query() {
    let table = Statement::CreateTable {
        name: object("t2", 1),
        columns: vec![int_column("id", vec![ColumnConstraint::NotNull], 2)],
        span: sp(3),
    };
    let assigning_select = Statement::Select(SelectStatement {
        ctes: vec![],
        query: QueryExpr::Spec(QuerySpecification {
            select: vec![SelectElement::SetVariable {
                name: "@y".to_string(),
                expr: col("id", 4),
                span: sp(5),
            }],
            from: vec![TableReference::Named {
                name: object("t2", 6),
                alias: None,
                span: sp(7),
            }],
            where_clause: Some(BooleanExpr::Comparison {
                op: CompareOp::Eq,
                left: col("id", 8),
                right: int_lit(1, 9),
                span: sp(10),
            }),
            span: sp(11),
        }),
        span: sp(12),
    });
    let issues = check(vec![
        table,
        declare("@y", "int", 13),
        assigning_select,
        Statement::Select(select_stmt(
            select_exprs(vec![math(MathOp::Add, var("@y", 14), int_lit(1, 15), 16)], 17),
            18,
        )),
    ]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn ordering_comparisons_against_nullables_are_errors() {
    let issues = check(vec![
        declare("@x", "int", 1),
        Statement::If {
            condition: BooleanExpr::Comparison {
                op: CompareOp::Gt,
                left: var("@x", 2),
                right: int_lit(1, 3),
                span: sp(4),
            },
            then_branch: Box::new(Statement::Print {
                value: str_lit("hi", 5),
                span: sp(6),
            }),
            else_branch: None,
            span: sp(7),
        },
    ]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].span, sp(4));
    assert_eq!(issues[0].level, IssueLevel::Error);
    assert_eq!(
        issues[0].message,
        "Cannot use an ordering comparison against a possibly null value."
    );
}

#[test]
fn ordering_two_null_literals_is_not_flagged() {
    let null = |n: usize| ScalarExpr::NullLiteral { span: sp(n) };
    let issues = check(vec![Statement::If {
        condition: BooleanExpr::Comparison {
            op: CompareOp::Gt,
            left: null(1),
            right: null(2),
            span: sp(3),
        },
        then_branch: Box::new(Statement::Print {
            value: str_lit("hi", 4),
            span: sp(5),
        }),
        else_branch: None,
        span: sp(6),
    }]);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn cursor_lifecycle_is_tracked_by_name() {
    let table = Statement::CreateTable {
        name: object("t2", 1),
        columns: vec![int_column("id", vec![ColumnConstraint::NotNull], 2)],
        span: sp(3),
    };
    let cursor_query = SelectStatement {
        ctes: vec![],
        query: QueryExpr::Spec(QuerySpecification {
            select: vec![SelectElement::Expr {
                expr: col("id", 4),
                alias: None,
                span: sp(4),
            }],
            from: vec![TableReference::Named {
                name: object("t2", 5),
                alias: None,
                span: sp(6),
            }],
            where_clause: None,
            span: sp(7),
        }),
        span: sp(8),
    };
    let issues = check(vec![
        table,
        declare("@a", "int", 9),
        Statement::DeclareCursor {
            name: "c".to_string(),
            query: cursor_query,
            span: sp(10),
        },
        Statement::OpenCursor {
            name: "c".to_string(),
            span: sp(11),
        },
        Statement::Fetch {
            cursor: "c".to_string(),
            into: vec![("@a".to_string(), sp(12))],
            span: sp(13),
        },
        Statement::CloseCursor {
            name: "c".to_string(),
            span: sp(14),
        },
        Statement::DeallocateCursor {
            name: "c".to_string(),
            span: sp(15),
        },
        Statement::OpenCursor {
            name: "c".to_string(),
            span: sp(16),
        },
    ]);
    assert_eq!(issues.len(), 1, "{:?}", issues);
    assert_eq!(issues[0].span, sp(16));
    assert_eq!(issues[0].message, "c is not a declared cursor.");
}
