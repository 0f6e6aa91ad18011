//! Type checking rules: unification, implicit widening, literal bounds.
//!
//! `tc_equals` is the heart of the checker. It is called with the
//! expected type on the left and the expression's type on the right,
//! and it mutates *both* sides: an untyped literal on the right is
//! narrowed to the sized left-hand type, a bare value in option
//! position is rewritten into a wrapped option (`gen_option`), and an
//! absent array length on the left is filled in from the right.

use crate::ast::{ConstDecl, ExprId, ExprKind, StmntId, UnopKind, VarDecl};
use crate::error::CompileResult;
use crate::sema::Sema;
use crate::types::{Type, TypeKind};

const F32_MAX: f64 = 3.402_823_47e38;

fn signed_rank(kind: &TypeKind) -> Option<u8> {
    match kind {
        TypeKind::I8 => Some(1),
        TypeKind::I16 => Some(2),
        TypeKind::I32 => Some(3),
        TypeKind::I64 => Some(4),
        TypeKind::Isize => Some(5),
        _ => None,
    }
}

fn unsigned_rank(kind: &TypeKind) -> Option<u8> {
    match kind {
        TypeKind::U8 => Some(1),
        TypeKind::U16 => Some(2),
        TypeKind::U32 => Some(3),
        TypeKind::U64 => Some(4),
        TypeKind::Usize => Some(5),
        _ => None,
    }
}

/// Widening among sized scalars; narrows untyped literals into `rhs`.
fn scalar_equals(lhs: &Type, rhs: &mut Type) -> bool {
    match &lhs.kind {
        TypeKind::UntypedInt => rhs.is_integer(),
        TypeKind::UntypedFloat => rhs.is_float(),
        kind if signed_rank(kind).is_some() => {
            if matches!(rhs.kind, TypeKind::UntypedInt) {
                *rhs = lhs.clone();
                return true;
            }
            match signed_rank(&rhs.kind) {
                Some(r) => r <= signed_rank(kind).unwrap(),
                None => false,
            }
        }
        kind if unsigned_rank(kind).is_some() => {
            if matches!(rhs.kind, TypeKind::UntypedInt) {
                *rhs = lhs.clone();
                return true;
            }
            match unsigned_rank(&rhs.kind) {
                Some(r) => r <= unsigned_rank(kind).unwrap(),
                None => false,
            }
        }
        TypeKind::F32 => {
            if matches!(rhs.kind, TypeKind::UntypedFloat) {
                *rhs = lhs.clone();
                return true;
            }
            matches!(rhs.kind, TypeKind::F32)
        }
        TypeKind::F64 => {
            if matches!(rhs.kind, TypeKind::UntypedFloat) {
                *rhs = lhs.clone();
                return true;
            }
            matches!(rhs.kind, TypeKind::F32 | TypeKind::F64)
        }
        _ => std::mem::discriminant(&lhs.kind) == std::mem::discriminant(&rhs.kind),
    }
}

impl<'a> Sema<'a> {
    /// Unify `rhs` against the expected `lhs`. See the module docs for
    /// the mutation contract.
    pub(crate) fn tc_equals(&mut self, lhs: &mut Type, rhs: &mut Type) -> CompileResult<bool> {
        match &lhs.kind {
            TypeKind::Void => Ok(false),
            TypeKind::TypeDef(name) => {
                let name = name.clone();
                self.symtab_find(&name, lhs.cursors_idx)?;
                Ok(matches!(&rhs.kind, TypeKind::TypeDef(r) if *r == name))
            }
            TypeKind::Option { .. } => self.tc_option_equals(lhs, rhs),
            TypeKind::Ptr { .. } => self.tc_ptr_equals(lhs, rhs),
            TypeKind::Array { .. } => self.tc_array_equals(lhs, rhs),
            TypeKind::Slice { .. } => {
                let mut lof = match &lhs.kind {
                    TypeKind::Slice { of } => (**of).clone(),
                    _ => unreachable!(),
                };
                match &mut rhs.kind {
                    TypeKind::Slice { of: rof } => {
                        let res = self.tc_equals(&mut lof, rof)?;
                        if let TypeKind::Slice { of } = &mut lhs.kind {
                            **of = lof;
                        }
                        Ok(res)
                    }
                    _ => Ok(false),
                }
            }
            _ => Ok(scalar_equals(lhs, rhs)),
        }
    }

    fn tc_option_equals(&mut self, lhs: &mut Type, rhs: &mut Type) -> CompileResult<bool> {
        let mut lsub = match &lhs.kind {
            TypeKind::Option { subtype, .. } => (**subtype).clone(),
            _ => unreachable!("tc_option_equals on non-option"),
        };
        if matches!(lsub.kind, TypeKind::Void) {
            return Err(self.diag(
                lhs.cursors_idx,
                "cannot use ?void. maybe use bool instead?",
            ));
        }

        let is_rhs_option = matches!(rhs.kind, TypeKind::Option { .. });
        if is_rhs_option {
            let res = match &mut rhs.kind {
                TypeKind::Option {
                    subtype: rsub,
                    is_null,
                    gen_option,
                } => {
                    if *is_null {
                        **rsub = lsub.clone();
                        *gen_option = true;
                        Ok(true)
                    } else {
                        self.tc_equals(&mut lsub, rsub)
                    }
                }
                _ => unreachable!(),
            };
            if let TypeKind::Option { subtype, .. } = &mut lhs.kind {
                **subtype = lsub;
            }
            return res;
        }

        // A bare value is acceptable where an option is expected; mark
        // it so the generator wraps it.
        let mut bare = rhs.clone();
        if self.tc_equals(&mut lsub, &mut bare)? {
            let cursors_idx = rhs.cursors_idx;
            *rhs = Type::new(
                TypeKind::Option {
                    subtype: Box::new(bare),
                    is_null: false,
                    gen_option: true,
                },
                false,
                cursors_idx,
            );
            if let TypeKind::Option { subtype, .. } = &mut lhs.kind {
                **subtype = lsub;
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Pointers unify through their pointees; a const pointer (`^`)
    /// cannot flow into a mutable slot (`*`).
    fn tc_ptr_equals(&mut self, lhs: &mut Type, rhs: &mut Type) -> CompileResult<bool> {
        let mut lp = match &lhs.kind {
            TypeKind::Ptr { to } => (**to).clone(),
            _ => unreachable!("tc_ptr_equals on non-pointer"),
        };
        let (r_const, mut rp) = match &rhs.kind {
            TypeKind::Ptr { to } => (rhs.constant, (**to).clone()),
            _ => return Ok(false),
        };

        if !lhs.constant && r_const {
            return Ok(false);
        }

        let res = self.tc_equals(&mut lp, &mut rp)?;
        if let TypeKind::Ptr { to } = &mut lhs.kind {
            **to = lp;
        }
        if let TypeKind::Ptr { to } = &mut rhs.kind {
            **to = rp;
        }
        Ok(res)
    }

    /// Arrays unify element-wise; lengths must agree once evaluated,
    /// and an absent left-hand length is absorbed from the right.
    fn tc_array_equals(&mut self, lhs: &mut Type, rhs: &mut Type) -> CompileResult<bool> {
        let (mut lof, l_len) = match &lhs.kind {
            TypeKind::Array { of, len } => ((**of).clone(), *len),
            _ => unreachable!("tc_array_equals on non-array"),
        };
        let (mut rof, r_len, r_idx) = match &rhs.kind {
            TypeKind::Array { of, len } => ((**of).clone(), *len, rhs.cursors_idx),
            _ => return Ok(false),
        };

        match (l_len, r_len) {
            (Some(l), Some(r)) => {
                let l_val = self.eval_checked(l)?;
                let r_val = self.eval_checked(r)?;
                if l_val != r_val {
                    return Ok(false);
                }
            }
            (None, Some(r)) => {
                if let TypeKind::Array { len, .. } = &mut lhs.kind {
                    *len = Some(r);
                }
            }
            (_, None) => {
                return Err(self.diag(r_idx, "cannot infer array length"));
            }
        }

        let res = self.tc_equals(&mut lof, &mut rof)?;
        if let TypeKind::Array { of, .. } = &mut lhs.kind {
            **of = lof;
        }
        if let TypeKind::Array { of, .. } = &mut rhs.kind {
            **of = rof;
        }
        Ok(res)
    }

    /// Whether an expression's resolved type is unsigned. Errors when
    /// the type is not numeric at all.
    pub(crate) fn tc_is_unsigned(&mut self, id: ExprId) -> CompileResult<bool> {
        let ty = self.resolve_expr_type(id)?;
        if ty.is_unsigned_int() {
            return Ok(true);
        }
        if ty.is_signed_int()
            || matches!(ty.kind, TypeKind::UntypedInt)
            || ty.is_float()
        {
            return Ok(false);
        }
        Err(self.diag(
            self.ast.expr(id).cursors_idx,
            format!("expected an integer type, got {}", self.type_str(&ty)),
        ))
    }

    /// Reject literals that cannot be represented in the destination.
    /// Negated literals check their magnitude against the signed max.
    pub(crate) fn tc_number_within_bounds(
        &self,
        ty: &Type,
        expr_id: ExprId,
    ) -> CompileResult<()> {
        let expr = self.ast.expr(expr_id);

        let (value, idx, signed_only) = match &expr.kind {
            ExprKind::IntLit(v) => (*v, expr.cursors_idx, false),
            ExprKind::Unop {
                op: UnopKind::Negate,
                val,
            } => match &self.ast.expr(*val).kind {
                ExprKind::IntLit(v) => (*v, expr.cursors_idx, true),
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };

        let max: Option<(u64, &str)> = match ty.kind {
            TypeKind::U8 if !signed_only => Some((u8::MAX as u64, "u8")),
            TypeKind::U16 if !signed_only => Some((u16::MAX as u64, "u16")),
            TypeKind::U32 if !signed_only => Some((u32::MAX as u64, "u32")),
            TypeKind::I8 => Some((i8::MAX as u64, "i8")),
            TypeKind::I16 => Some((i16::MAX as u64, "i16")),
            TypeKind::I32 => Some((i32::MAX as u64, "i32")),
            TypeKind::I64 => Some((i64::MAX as u64, "i64")),
            TypeKind::Isize => Some((i64::MAX as u64, "isize")),
            TypeKind::F32 if !signed_only => {
                if (value as f64) > F32_MAX {
                    return Err(self.diag(
                        idx,
                        format!("literal \"{}\" cannot be represented in f32", value),
                    ));
                }
                None
            }
            _ => None,
        };

        if let Some((max, name)) = max {
            if value > max {
                return Err(self.diag(
                    idx,
                    format!("literal \"{}\" cannot be represented in {}", value, name),
                ));
            }
        }
        Ok(())
    }

    /// The declared type of an initialiser-only declaration: untyped
    /// literals default to their widest sized type.
    pub(crate) fn tc_infer(&mut self, value: ExprId) -> CompileResult<Type> {
        let ty = self.resolve_expr_type(value)?;
        let idx = self.ast.expr(value).cursors_idx;

        if let TypeKind::TypeDef(name) = &ty.kind {
            self.symtab_find(name, idx)?;
        }

        match &ty.kind {
            TypeKind::UntypedInt => Ok(Type::new(TypeKind::I64, false, idx)),
            TypeKind::UntypedFloat => Ok(Type::new(TypeKind::F64, false, idx)),
            TypeKind::Option {
                subtype, is_null, ..
            } if *is_null && subtype.is_none() => {
                Err(self.diag(idx, "cannot infer type from null"))
            }
            _ => Ok(ty),
        }
    }

    pub(crate) fn tc_var_decl(&mut self, id: StmntId, v: &mut VarDecl) -> CompileResult<()> {
        let idx = self.ast.stmnt(id).cursors_idx;

        match v.value {
            None => {
                if matches!(v.ty.kind, TypeKind::Void) {
                    return Err(self.diag(idx, "variable cannot be of type void"));
                }
                self.validate_type(&v.ty)?;
            }
            Some(value) if v.ty.is_none() => {
                v.ty = self.tc_infer(value)?;
            }
            Some(value) => {
                let mut vt = self.resolve_expr_type(value)?;
                if !self.tc_equals(&mut v.ty, &mut vt)? {
                    return Err(self.diag(
                        idx,
                        format!(
                            "mismatch types, variable \"{}\" type {}, expression type {}",
                            v.name,
                            self.type_str(&v.ty),
                            self.type_str(&vt)
                        ),
                    ));
                }
                self.set_expr_type(value, vt);
            }
        }

        if let TypeKind::Array { len: None, .. } = &v.ty.kind {
            return Err(self.diag(
                idx,
                format!(
                    "cannot infer array length for \"{}\" without compound literal",
                    v.name
                ),
            ));
        }

        if let Some(value) = v.value {
            self.tc_number_within_bounds(&v.ty, value)?;
        }
        Ok(())
    }

    pub(crate) fn tc_const_decl(&mut self, id: StmntId, c: &mut ConstDecl) -> CompileResult<()> {
        let idx = self.ast.stmnt(id).cursors_idx;
        let value = c.value.expect("const declarations carry a value here");

        if c.ty.is_none() {
            c.ty = self.tc_infer(value)?;
        } else {
            let mut vt = self.resolve_expr_type(value)?;
            if !self.tc_equals(&mut c.ty, &mut vt)? {
                return Err(self.diag(
                    idx,
                    format!(
                        "mismatch types, variable \"{}\" type {}, expression type {}",
                        c.name,
                        self.type_str(&c.ty),
                        self.type_str(&vt)
                    ),
                ));
            }
            self.set_expr_type(value, vt);
        }

        if matches!(c.ty.kind, TypeKind::Void) {
            return Err(self.diag(idx, "variable cannot be of type void"));
        }

        tc_make_constant(&mut c.ty);
        self.tc_number_within_bounds(&c.ty, value)
    }

    pub(crate) fn tc_return(
        &mut self,
        id: StmntId,
        value: Option<ExprId>,
        ty: &mut Type,
    ) -> CompileResult<()> {
        let idx = self.ast.stmnt(id).cursors_idx;
        let (_, fn_ty) = self
            .current_fn
            .clone()
            .expect("return checked inside a function");

        if ty.is_none() {
            *ty = fn_ty.clone();
        }

        let value = match value {
            None => {
                if matches!(fn_ty.kind, TypeKind::Void) {
                    return Ok(());
                }
                return Err(self.diag(
                    idx,
                    format!(
                        "mismatch types, {} vs {}",
                        self.type_str(&fn_ty),
                        self.type_str(ty)
                    ),
                ));
            }
            Some(value) => value,
        };

        let mut vt = self.resolve_expr_type(value)?;
        if !self.tc_equals(ty, &mut vt)? {
            return Err(self.diag(
                idx,
                format!(
                    "mismatch types, expected return type {}, got {}",
                    self.type_str(ty),
                    self.type_str(&vt)
                ),
            ));
        }
        self.set_expr_type(value, vt);

        let mut fn_ty = fn_ty;
        if !self.tc_equals(&mut fn_ty, ty)? {
            return Err(self.diag(
                idx,
                format!(
                    "mismatch types, function type {}, got {}",
                    self.type_str(&fn_ty),
                    self.type_str(ty)
                ),
            ));
        }
        Ok(())
    }

    /// Check that every nominal name mentioned in a type resolves.
    fn validate_type(&self, ty: &Type) -> CompileResult<()> {
        match &ty.kind {
            TypeKind::TypeDef(name) => {
                self.symtab_find(name, ty.cursors_idx)?;
                Ok(())
            }
            TypeKind::Array { of, .. } => self.validate_type(of),
            TypeKind::Slice { of } => self.validate_type(of),
            TypeKind::Option { subtype, .. } => self.validate_type(subtype),
            TypeKind::Ptr { to } => self.validate_type(to),
            _ => Ok(()),
        }
    }
}

/// Mark a declared type (and its element types) constant. Pointer
/// constness is left alone: it records `^` vs `*` from the source.
pub(crate) fn tc_make_constant(ty: &mut Type) {
    match &mut ty.kind {
        TypeKind::Array { of, .. } => {
            tc_make_constant(of);
            ty.constant = true;
        }
        TypeKind::Option { subtype, .. } => {
            tc_make_constant(subtype);
            ty.constant = true;
        }
        TypeKind::Slice { of } => {
            tc_make_constant(of);
            ty.constant = true;
        }
        TypeKind::Ptr { .. } => {}
        _ => {
            ty.constant = true;
        }
    }
}

pub(crate) fn tc_can_compare_equality(lhs: &Type, rhs: &Type) -> bool {
    if lhs.is_signed_int() {
        return rhs.is_signed_int() || matches!(rhs.kind, TypeKind::UntypedInt);
    }
    if lhs.is_unsigned_int() {
        return rhs.is_unsigned_int() || matches!(rhs.kind, TypeKind::UntypedInt);
    }
    if matches!(lhs.kind, TypeKind::UntypedInt) {
        return rhs.is_integer();
    }
    if lhs.is_float() {
        return rhs.is_float();
    }
    match (&lhs.kind, &rhs.kind) {
        (TypeKind::Char, TypeKind::Char) => true,
        (TypeKind::Bool, TypeKind::Bool) => true,
        _ => false,
    }
}

pub(crate) fn tc_can_compare_order(lhs: &Type, rhs: &Type) -> bool {
    if lhs.is_signed_int() {
        return rhs.is_signed_int() || matches!(rhs.kind, TypeKind::UntypedInt);
    }
    if lhs.is_unsigned_int() {
        return rhs.is_unsigned_int() || matches!(rhs.kind, TypeKind::UntypedInt);
    }
    if matches!(lhs.kind, TypeKind::UntypedInt) {
        return rhs.is_integer();
    }
    if lhs.is_float() {
        return rhs.is_float();
    }
    matches!((&lhs.kind, &rhs.kind), (TypeKind::Char, TypeKind::Char))
}

pub(crate) fn tc_can_arithmetic(lhs: &Type, rhs: &Type, is_mod: bool) -> bool {
    if lhs.is_integer() && rhs.is_integer() {
        return true;
    }
    if lhs.is_float() && rhs.is_float() {
        return !is_mod;
    }
    false
}

pub(crate) fn tc_can_bitwise(lhs: &Type, rhs: &Type) -> bool {
    lhs.is_integer() && rhs.is_integer()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(kind: TypeKind) -> Type {
        Type::new(kind, false, 0)
    }

    #[test]
    fn test_scalar_widening() {
        // widening within a family
        assert!(scalar_equals(&t(TypeKind::I32), &mut t(TypeKind::I8)));
        assert!(scalar_equals(&t(TypeKind::U64), &mut t(TypeKind::U32)));
        assert!(scalar_equals(&t(TypeKind::F64), &mut t(TypeKind::F32)));
        // narrowing rejected
        assert!(!scalar_equals(&t(TypeKind::I8), &mut t(TypeKind::I32)));
        // signedness crossing rejected
        assert!(!scalar_equals(&t(TypeKind::I32), &mut t(TypeKind::U8)));
        assert!(!scalar_equals(&t(TypeKind::U32), &mut t(TypeKind::I8)));
        // families do not mix
        assert!(!scalar_equals(&t(TypeKind::F32), &mut t(TypeKind::I32)));
    }

    #[test]
    fn test_untyped_narrowing_mutates_rhs() {
        let mut rhs = t(TypeKind::UntypedInt);
        assert!(scalar_equals(&t(TypeKind::I16), &mut rhs));
        assert_eq!(rhs.kind, TypeKind::I16);

        let mut rhs = t(TypeKind::UntypedFloat);
        assert!(scalar_equals(&t(TypeKind::F32), &mut rhs));
        assert_eq!(rhs.kind, TypeKind::F32);
    }

    #[test]
    fn test_untyped_lhs_accepts_sized() {
        assert!(scalar_equals(&t(TypeKind::UntypedInt), &mut t(TypeKind::U64)));
        assert!(scalar_equals(&t(TypeKind::UntypedFloat), &mut t(TypeKind::F32)));
        assert!(!scalar_equals(&t(TypeKind::UntypedInt), &mut t(TypeKind::F32)));
    }

    #[test]
    fn test_simple_kinds_compare_by_kind() {
        assert!(scalar_equals(&t(TypeKind::Bool), &mut t(TypeKind::Bool)));
        assert!(scalar_equals(&t(TypeKind::String), &mut t(TypeKind::String)));
        assert!(!scalar_equals(&t(TypeKind::Bool), &mut t(TypeKind::Char)));
    }

    #[test]
    fn test_make_constant_leaves_pointer_alone() {
        let mut ptr = Type::new(
            TypeKind::Ptr {
                to: Box::new(t(TypeKind::I32)),
            },
            false,
            0,
        );
        tc_make_constant(&mut ptr);
        assert!(!ptr.constant);

        let mut arr = Type::new(
            TypeKind::Array {
                of: Box::new(t(TypeKind::I32)),
                len: None,
            },
            false,
            0,
        );
        tc_make_constant(&mut arr);
        assert!(arr.constant);
    }

    #[test]
    fn test_comparability_tables() {
        assert!(tc_can_compare_equality(&t(TypeKind::I32), &t(TypeKind::I8)));
        assert!(!tc_can_compare_equality(&t(TypeKind::I32), &t(TypeKind::U8)));
        assert!(tc_can_compare_equality(&t(TypeKind::Char), &t(TypeKind::Char)));
        assert!(tc_can_compare_equality(&t(TypeKind::Bool), &t(TypeKind::Bool)));
        assert!(!tc_can_compare_order(&t(TypeKind::Bool), &t(TypeKind::Bool)));
        assert!(tc_can_compare_order(&t(TypeKind::F32), &t(TypeKind::F64)));
    }

    #[test]
    fn test_arithmetic_gates() {
        assert!(tc_can_arithmetic(&t(TypeKind::I32), &t(TypeKind::UntypedInt), false));
        assert!(tc_can_arithmetic(&t(TypeKind::F64), &t(TypeKind::F32), false));
        assert!(!tc_can_arithmetic(&t(TypeKind::F64), &t(TypeKind::F32), true));
        assert!(!tc_can_arithmetic(&t(TypeKind::I32), &t(TypeKind::F32), false));
        assert!(tc_can_bitwise(&t(TypeKind::U8), &t(TypeKind::UntypedInt)));
        assert!(!tc_can_bitwise(&t(TypeKind::F32), &t(TypeKind::F32)));
    }
}
