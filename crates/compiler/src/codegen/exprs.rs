//! Expression lowering to C text.
//!
//! Expressions flagged `gen_option` during type checking are generated
//! as their bare value and wrapped through the option constructor at
//! this level, so nothing upstream needs to care.

use super::CodeGen;
use crate::ast::{BinopKind, ExprId, ExprKind, Literal, StmntKind, UnopKind};
use crate::error::CompileResult;
use crate::types::{Type, TypeKind};

impl<'a> CodeGen<'a> {
    pub(crate) fn gen_expr(&mut self, id: ExprId) -> CompileResult<String> {
        let expr = self.ast.expr(id).clone();

        if !matches!(expr.kind, ExprKind::Null) {
            if let TypeKind::Option {
                subtype,
                gen_option: true,
                ..
            } = &expr.ty.kind
            {
                // A bare value in option position: generate the value
                // at its subtype and wrap it.
                self.ensure_generic(&expr.ty)?;
                let subtype = (**subtype).clone();
                let tn = self.typename(&subtype)?;
                let value = self.gen_expr_as(id, &subtype)?;
                return Ok(format!("curoption_{}({})", tn, value));
            }
        }

        let ty = expr.ty.clone();
        self.gen_expr_as(id, &ty)
    }

    /// Generate an expression with an explicit target type. The type
    /// matters for numeric literal formatting, compound literals and
    /// `null`.
    fn gen_expr_as(&mut self, id: ExprId, ty: &Type) -> CompileResult<String> {
        let expr = self.ast.expr(id).clone();

        match expr.kind {
            ExprKind::Ident(name) => Ok(name),
            ExprKind::IntLit(v) => Ok(format_int(v, ty)),
            ExprKind::FloatLit(v) => Ok(format_float(v)),
            ExprKind::CharLit(c) => Ok(format!("{}", c)),
            ExprKind::StrLit(s) => Ok(format!("curstr(\"{}\")", s)),
            ExprKind::CstrLit(s) => Ok(format!("\"{}\"", s)),
            ExprKind::True => Ok("true".to_string()),
            ExprKind::False => Ok("false".to_string()),
            ExprKind::Null => {
                let subtype = match &ty.kind {
                    TypeKind::Option { subtype, .. } => (**subtype).clone(),
                    _ => {
                        return Err(self.diag(
                            expr.cursors_idx,
                            "null outside of an option context",
                        ));
                    }
                };
                self.ensure_generic(ty)?;
                let tn = self.typename(&subtype)?;
                Ok(format!("curoptionnull_{}()", tn))
            }
            ExprKind::FieldAccess { base, field, deref } => {
                let base_str = self.gen_expr(base)?;
                if deref {
                    return Ok(format!("*{}", base_str));
                }
                let field = field.expect("non-deref access has a field");
                let field_str = self.gen_expr(field)?;

                let base_ty = self.ast.expr(base).ty.clone();
                match &base_ty.kind {
                    TypeKind::Ptr { .. } => Ok(format!("{}->{}", base_str, field_str)),
                    TypeKind::TypeDef(name) => {
                        let ast = self.ast;
                        let is_enum = matches!(
                            ast.find_decl(name).map(|d| &ast.stmnt(d).kind),
                            Some(StmntKind::EnumDecl(_))
                        );
                        if is_enum {
                            Ok(format!("{}_{}", base_str, field_str))
                        } else {
                            Ok(format!("{}.{}", base_str, field_str))
                        }
                    }
                    _ => Ok(format!("{}.{}", base_str, field_str)),
                }
            }
            ExprKind::ArrayIndex { base, index } => {
                let base_str = self.gen_expr(base)?;
                let index_str = self.gen_expr(index)?;
                Ok(format!("{}.ptr[{}]", base_str, index_str))
            }
            ExprKind::Group(inner) => Ok(format!("({})", self.gen_expr(inner)?)),
            ExprKind::FnCall { name, args } => self.gen_call(&name, &args),
            ExprKind::Literal(literal) => self.gen_literal(&literal, ty, expr.cursors_idx),
            ExprKind::Unop { op, val } => {
                let val = self.gen_expr(val)?;
                let sym = match op {
                    UnopKind::Address => "&",
                    UnopKind::Negate => "-",
                    UnopKind::Not => "!",
                    UnopKind::BitNot => "~",
                };
                Ok(format!("{}{}", sym, val))
            }
            ExprKind::Binop { op, left, right } => {
                let lhs = self.gen_expr(left)?;
                let rhs = self.gen_expr(right)?;
                let sym = match op {
                    BinopKind::And => "&&",
                    BinopKind::Or => "||",
                    other => other.symbol(),
                };
                Ok(format!("{} {} {}", lhs, sym, rhs))
            }
        }
    }

    pub(crate) fn gen_call(&mut self, name: &str, args: &[ExprId]) -> CompileResult<String> {
        let mut rendered = Vec::with_capacity(args.len());
        for &arg in args {
            rendered.push(self.gen_expr(arg)?);
        }
        Ok(format!("{}({})", name, rendered.join(", ")))
    }

    /// Compound literals. Arrays and slices go through their generated
    /// constructor carrying the explicit length; struct literals become
    /// C compound literals, named fields as designated initialisers.
    fn gen_literal(
        &mut self,
        literal: &Literal,
        ty: &Type,
        cursors_idx: usize,
    ) -> CompileResult<String> {
        match &ty.kind {
            TypeKind::Array { .. } => self.gen_array_literal(literal, ty, cursors_idx),
            TypeKind::Slice { .. } => self.gen_slice_literal(literal, ty, cursors_idx),
            _ => {
                let tyname = self.c_type(ty)?;
                let body = match literal {
                    Literal::Positional(values) => {
                        let mut rendered = Vec::with_capacity(values.len());
                        for &value in values {
                            rendered.push(self.gen_expr(value)?);
                        }
                        rendered.join(", ")
                    }
                    Literal::Named(fields) => {
                        let mut rendered = Vec::with_capacity(fields.len());
                        for field in fields {
                            let value = self.gen_expr(field.value)?;
                            rendered.push(format!(".{} = {}", field.name, value));
                        }
                        rendered.join(", ")
                    }
                };
                Ok(format!("({}){{{}}}", tyname, body))
            }
        }
    }

    /// `curarray1d_T N((elem[N]){v, ...}, N)`; empty bodies default-
    /// initialise an uninitialised array variable.
    pub(crate) fn gen_array_literal(
        &mut self,
        literal: &Literal,
        ty: &Type,
        cursors_idx: usize,
    ) -> CompileResult<String> {
        let values = match literal {
            Literal::Positional(values) => values.clone(),
            Literal::Named(_) => {
                return Err(self.diag(cursors_idx, "array literal cannot have named fields"));
            }
        };

        let (of, len) = match &ty.kind {
            TypeKind::Array { of, len } => ((**of).clone(), *len),
            _ => unreachable!("array literal without array type"),
        };
        let len = self.array_len(ty, len)?;

        self.ensure_generic(ty)?;
        let mangled = self.typename(ty)?;
        let ctor = Self::ctor_name(&mangled);

        // Inner arrays are themselves constructed values, so the
        // element spelling is their mangled struct name.
        let elem = if matches!(of.kind, TypeKind::Array { .. }) {
            self.typename(&of)?
        } else {
            self.c_type(&of)?
        };

        let mut rendered = Vec::with_capacity(values.len());
        for &value in &values {
            rendered.push(self.gen_expr(value)?);
        }

        Ok(format!(
            "{}(({}[{}]){{{}}}, {})",
            ctor,
            elem,
            len,
            rendered.join(", "),
            len
        ))
    }

    fn gen_slice_literal(
        &mut self,
        literal: &Literal,
        ty: &Type,
        cursors_idx: usize,
    ) -> CompileResult<String> {
        let values = match literal {
            Literal::Positional(values) => values.clone(),
            Literal::Named(_) => {
                return Err(self.diag(cursors_idx, "slice literal cannot have named fields"));
            }
        };

        let of = match &ty.kind {
            TypeKind::Slice { of } => (**of).clone(),
            _ => unreachable!("slice literal without slice type"),
        };

        self.ensure_generic(ty)?;
        let mangled = self.typename(ty)?;
        let ctor = Self::ctor_name(&mangled);
        let elem = self.c_type(&of)?;

        let mut rendered = Vec::with_capacity(values.len());
        for &value in &values {
            rendered.push(self.gen_expr(value)?);
        }

        Ok(format!(
            "{}(({}[]){{{}}}, {})",
            ctor,
            elem,
            rendered.join(", "),
            values.len()
        ))
    }
}

/// Print an integer literal with its destination width applied.
fn format_int(v: u64, ty: &Type) -> String {
    match ty.kind {
        TypeKind::I8 => (v as i8).to_string(),
        TypeKind::I16 => (v as i16).to_string(),
        TypeKind::I32 => (v as i32).to_string(),
        TypeKind::I64 | TypeKind::Isize => (v as i64).to_string(),
        TypeKind::U8 => (v as u8).to_string(),
        TypeKind::U16 => (v as u16).to_string(),
        TypeKind::U32 => (v as u32).to_string(),
        TypeKind::U64 | TypeKind::Usize => v.to_string(),
        TypeKind::F32 | TypeKind::F64 => format_float(v as f64),
        _ => v.to_string(),
    }
}

/// Shortest-roundtrip float formatting with a guaranteed decimal
/// point so the C literal stays a double.
fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
