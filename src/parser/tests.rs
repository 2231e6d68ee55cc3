use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::Scanner;
use crate::parser::Parser;

fn parse(source: &str) -> Block {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

fn parse_err(source: &str) -> ParserError {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().unwrap_err()
}

#[test]
fn test_local_declaration() {
    let block = parse("local x = 5");
    assert_eq!(block.statements.len(), 1);
    match &block.statements[0].kind {
        StmtKind::Local { names, values } => {
            assert_eq!(names, &["x".to_string()]);
            assert_eq!(values.len(), 1);
        }
        other => panic!("expected local, got {:?}", other),
    }
}

#[test]
fn test_multi_local() {
    let block = parse("local a, b, c = 1, 2");
    match &block.statements[0].kind {
        StmtKind::Local { names, values } => {
            assert_eq!(names.len(), 3);
            assert_eq!(values.len(), 2);
        }
        other => panic!("expected local, got {:?}", other),
    }
}

#[test]
fn test_missing_local_value_is_error() {
    let err = parse_err("local x = ");
    assert!(matches!(err, ParserError::UnexpectedEof(_)));
}

#[test]
fn test_precedence_mul_over_add() {
    let block = parse("return 1 + 2 * 3");
    match &block.statements[0].kind {
        StmtKind::Return(values) => match &values[0].kind {
            ExprKind::Binary { operator, right, .. } => {
                assert_eq!(*operator, BinaryOp::Add);
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        operator: BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("expected binary, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_power_right_associative() {
    let block = parse("return 2 ^ 3 ^ 2");
    match &block.statements[0].kind {
        StmtKind::Return(values) => match &values[0].kind {
            ExprKind::Binary { operator, right, .. } => {
                assert_eq!(*operator, BinaryOp::Power);
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        operator: BinaryOp::Power,
                        ..
                    }
                ));
            }
            other => panic!("expected binary, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_unary_binds_looser_than_power() {
    // -2^2 parses as -(2^2)
    let block = parse("return -2 ^ 2");
    match &block.statements[0].kind {
        StmtKind::Return(values) => {
            assert!(matches!(
                values[0].kind,
                ExprKind::Unary {
                    operator: UnaryOp::Negate,
                    ..
                }
            ));
        }
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_if_elseif_chain_keeps_every_arm() {
    let block = parse(
        "if a then return 1 elseif b then return 2 elseif c then return 3 else return 4 end",
    );
    match &block.statements[0].kind {
        StmtKind::If { arms, else_body } => {
            assert_eq!(arms.len(), 3);
            assert!(else_body.is_some());
            for arm in arms {
                assert_eq!(arm.body.statements.len(), 1);
            }
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_numeric_for() {
    let block = parse("for i = 1, 10, 2 do end");
    match &block.statements[0].kind {
        StmtKind::NumericFor { variable, step, .. } => {
            assert_eq!(variable, "i");
            assert!(step.is_some());
        }
        other => panic!("expected numeric for, got {:?}", other),
    }
}

#[test]
fn test_generic_for() {
    let block = parse("for k, v in pairs(t) do end");
    match &block.statements[0].kind {
        StmtKind::GenericFor {
            variables, exprs, ..
        } => {
            assert_eq!(variables.len(), 2);
            assert_eq!(exprs.len(), 1);
        }
        other => panic!("expected generic for, got {:?}", other),
    }
}

#[test]
fn test_repeat_until() {
    let block = parse("repeat x = x + 1 until x > 3");
    assert!(matches!(block.statements[0].kind, StmtKind::Repeat { .. }));
}

#[test]
fn test_multi_assignment() {
    let block = parse("a, b = b, a");
    match &block.statements[0].kind {
        StmtKind::Assign { targets, values } => {
            assert_eq!(targets.len(), 2);
            assert_eq!(values.len(), 2);
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_method_call() {
    let block = parse("obj:greet(1, 2)");
    match &block.statements[0].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::MethodCall {
                method, arguments, ..
            } => {
                assert_eq!(method, "greet");
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected method call, got {:?}", other),
        },
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn test_string_call_sugar() {
    let block = parse("print \"hi\"");
    match &block.statements[0].kind {
        StmtKind::Expression(expr) => {
            assert!(matches!(expr.kind, ExprKind::Call { .. }));
        }
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn test_table_constructor_field_forms() {
    let block = parse("local t = { 1, x = 2, [3] = 4; 5 }");
    match &block.statements[0].kind {
        StmtKind::Local { values, .. } => match &values[0].kind {
            ExprKind::Table(fields) => {
                assert_eq!(fields.len(), 4);
                assert!(matches!(fields[0], TableField::Positional(_)));
                assert!(matches!(fields[1], TableField::Named(_, _)));
                assert!(matches!(fields[2], TableField::Computed(_, _)));
                assert!(matches!(fields[3], TableField::Positional(_)));
            }
            other => panic!("expected table, got {:?}", other),
        },
        other => panic!("expected local, got {:?}", other),
    }
}

#[test]
fn test_function_declaration_forms() {
    let block = parse("function f() end function t.a.b() end function t:m() end");
    assert_eq!(block.statements.len(), 3);
    match &block.statements[2].kind {
        StmtKind::Function { target, body } => {
            assert!(target.is_method);
            assert_eq!(body.params, vec!["self".to_string()]);
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn test_vararg_function() {
    let block = parse("local f = function(a, ...) return ... end");
    match &block.statements[0].kind {
        StmtKind::Local { values, .. } => match &values[0].kind {
            ExprKind::Function(body) => {
                assert!(body.is_vararg);
                assert_eq!(body.params.len(), 1);
            }
            other => panic!("expected function literal, got {:?}", other),
        },
        other => panic!("expected local, got {:?}", other),
    }
}

#[test]
fn test_unexpected_token_is_error() {
    let err = parse_err("local = 5");
    assert!(matches!(err, ParserError::UnexpectedToken { .. }));
}

#[test]
fn test_dangling_end_is_error() {
    let err = parse_err("end");
    assert!(matches!(err, ParserError::UnexpectedToken { .. }));
}

#[test]
fn test_invalid_assignment_target() {
    let err = parse_err("1 + 2 = 3");
    assert!(matches!(err, ParserError::UnexpectedToken { .. }));
}

#[test]
fn test_semicolons_are_empty_statements() {
    let block = parse(";; local x = 1 ;;");
    assert_eq!(block.statements.len(), 1);
}
