//! Compile-time integer expression evaluator.
//!
//! Used for enum field numbering and array length comparison. Handles
//! integer literals, the arithmetic and comparison operators, grouping
//! and unary not/negate; anything else is a fatal diagnostic. No
//! runtime side effects are modelled.

use crate::ast::{Ast, BinopKind, ExprId, ExprKind, UnopKind};
use crate::error::{CompileResult, Cursor, Diagnostic};

fn diag_at(cursors: &[Cursor], idx: usize, message: impl Into<String>) -> Diagnostic {
    let cursor = cursors
        .get(idx)
        .copied()
        .or_else(|| cursors.last().copied())
        .unwrap_or_default();
    Diagnostic::new(cursor, message)
}

pub fn eval_expr(ast: &Ast, id: ExprId, cursors: &[Cursor]) -> CompileResult<u64> {
    let expr = ast.expr(id);
    match &expr.kind {
        ExprKind::IntLit(n) => Ok(*n),
        ExprKind::Group(inner) => eval_expr(ast, *inner, cursors),
        ExprKind::Binop { op, left, right } => {
            let lhs = eval_expr(ast, *left, cursors)?;
            let rhs = eval_expr(ast, *right, cursors)?;
            match op {
                BinopKind::Plus => Ok(lhs.wrapping_add(rhs)),
                BinopKind::Minus => Ok(lhs.wrapping_sub(rhs)),
                BinopKind::Multiply => Ok(lhs.wrapping_mul(rhs)),
                BinopKind::Divide => {
                    if rhs == 0 {
                        return Err(diag_at(cursors, expr.cursors_idx, "division by zero"));
                    }
                    Ok(lhs / rhs)
                }
                BinopKind::Mod => {
                    if rhs == 0 {
                        return Err(diag_at(cursors, expr.cursors_idx, "modulo by zero"));
                    }
                    Ok(lhs % rhs)
                }
                BinopKind::Less => Ok((lhs < rhs) as u64),
                BinopKind::LessEqual => Ok((lhs <= rhs) as u64),
                BinopKind::Greater => Ok((lhs > rhs) as u64),
                BinopKind::GreaterEqual => Ok((lhs >= rhs) as u64),
                BinopKind::Equals => Ok((lhs == rhs) as u64),
                BinopKind::Inequals => Ok((lhs != rhs) as u64),
                BinopKind::BitAnd => Ok(lhs & rhs),
                BinopKind::BitOr => Ok(lhs | rhs),
                BinopKind::BitXor => Ok(lhs ^ rhs),
                BinopKind::LeftShift => Ok(lhs.wrapping_shl(rhs as u32)),
                BinopKind::RightShift => Ok(lhs.wrapping_shr(rhs as u32)),
                BinopKind::And | BinopKind::Or => Err(diag_at(
                    cursors,
                    expr.cursors_idx,
                    "cannot evaluate logical operators at compile time",
                )),
            }
        }
        ExprKind::Unop { op, val } => {
            let v = eval_expr(ast, *val, cursors)?;
            match op {
                UnopKind::Not => Ok((v == 0) as u64),
                UnopKind::Negate => Ok(v.wrapping_neg()),
                UnopKind::BitNot => Ok(!v),
                UnopKind::Address => Err(diag_at(
                    cursors,
                    expr.cursors_idx,
                    "cannot take an address at compile time",
                )),
            }
        }
        _ => Err(diag_at(
            cursors,
            expr.cursors_idx,
            "cannot evaluate expression at compile time",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::types::{Type, TypeKind};

    fn lit(ast: &mut Ast, n: u64) -> ExprId {
        ast.push_expr(Expr {
            kind: ExprKind::IntLit(n),
            ty: Type::new(TypeKind::UntypedInt, true, 0),
            cursors_idx: 0,
        })
    }

    #[test]
    fn test_arithmetic() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 10);
        let b = lit(&mut ast, 3);
        let sum = ast.push_expr(Expr {
            kind: ExprKind::Binop {
                op: BinopKind::Plus,
                left: a,
                right: b,
            },
            ty: Type::none(),
            cursors_idx: 0,
        });
        assert_eq!(eval_expr(&ast, sum, &[]).unwrap(), 13);
    }

    #[test]
    fn test_division_by_zero() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 1);
        let b = lit(&mut ast, 0);
        let div = ast.push_expr(Expr {
            kind: ExprKind::Binop {
                op: BinopKind::Divide,
                left: a,
                right: b,
            },
            ty: Type::none(),
            cursors_idx: 0,
        });
        assert!(eval_expr(&ast, div, &[]).is_err());
    }

    #[test]
    fn test_non_constant_rejected() {
        let mut ast = Ast::new();
        let e = ast.push_expr(Expr {
            kind: ExprKind::Ident("x".to_string()),
            ty: Type::none(),
            cursors_idx: 0,
        });
        assert!(eval_expr(&ast, e, &[]).is_err());
    }
}
