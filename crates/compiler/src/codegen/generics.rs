//! Generic instantiation: deterministic mangled names for the
//! parametric containers plus the interning that guarantees each
//! `…Def`/`…Imp` pair is emitted exactly once.
//!
//! Mangles follow the element type: `[]i32` becomes `CurSlice_i32`,
//! `[5]i32` becomes `CurArray1d_i325`, `?string` becomes
//! `CurOption_CurString`, pointers append `ptr` and `cstring` is
//! spelled `constcharptr`.

use super::CodeGen;
use crate::ast::StmntKind;
use crate::error::CompileResult;
use crate::eval;
use crate::types::{Type, TypeKind};

impl<'a> CodeGen<'a> {
    /// Identifier-safe mangled name for a type.
    pub(crate) fn typename(&self, ty: &Type) -> CompileResult<String> {
        match &ty.kind {
            TypeKind::Cstring => Ok("constcharptr".to_string()),
            TypeKind::String => Ok("CurString".to_string()),
            TypeKind::Char => Ok("u8".to_string()),
            TypeKind::Ptr { to } => Ok(format!("{}ptr", self.typename(to)?)),
            TypeKind::Slice { of } => Ok(format!("CurSlice_{}", self.typename(of)?)),
            TypeKind::Array { .. } => self.typename_array(ty),
            TypeKind::Option { subtype, .. } => {
                Ok(format!("CurOption_{}", self.typename(subtype)?))
            }
            TypeKind::TypeDef(name) => Ok(name.clone()),
            _ => Ok(ty
                .scalar_name()
                .expect("aggregate kinds handled above")
                .to_string()),
        }
    }

    fn typename_array(&self, ty: &Type) -> CompileResult<String> {
        let (of, len) = match &ty.kind {
            TypeKind::Array { of, len } => (of, len),
            _ => unreachable!("typename_array on non-array"),
        };
        let outer_len = self.array_len(ty, *len)?;

        match &of.kind {
            TypeKind::Array {
                of: inner_of,
                len: inner_len,
            } => {
                let inner_len = self.array_len(of, *inner_len)?;
                if matches!(inner_of.kind, TypeKind::Array { .. }) {
                    return Err(self.diag(
                        ty.cursors_idx,
                        "arrays of more than two dimensions are not supported",
                    ));
                }
                Ok(format!(
                    "CurArray2d_{}{}{}",
                    self.typename(inner_of)?,
                    inner_len,
                    outer_len
                ))
            }
            _ => Ok(format!("CurArray1d_{}{}", self.typename(of)?, outer_len)),
        }
    }

    pub(crate) fn array_len(
        &self,
        ty: &Type,
        len: Option<crate::ast::ExprId>,
    ) -> CompileResult<u64> {
        match len {
            Some(len) => eval::eval_expr(self.ast, len, self.cursors),
            None => Err(self.diag(ty.cursors_idx, "cannot infer array length")),
        }
    }

    /// The C spelling of a type as it appears in declarations. Also
    /// makes sure any generic instantiation or forward typedef the
    /// type needs has been emitted.
    pub(crate) fn c_type(&mut self, ty: &Type) -> CompileResult<String> {
        self.ensure_generic(ty)?;
        match &ty.kind {
            TypeKind::Void => Ok("void".to_string()),
            TypeKind::Bool => Ok("bool".to_string()),
            TypeKind::Char => Ok("u8".to_string()),
            TypeKind::String => Ok("CurString".to_string()),
            TypeKind::Cstring => Ok("const char*".to_string()),
            TypeKind::Ptr { to } => Ok(format!("{}*", self.c_type(to)?)),
            TypeKind::Slice { .. } | TypeKind::Array { .. } | TypeKind::Option { .. } => {
                self.typename(ty)
            }
            TypeKind::TypeDef(name) => Ok(name.clone()),
            _ => Ok(ty
                .scalar_name()
                .expect("unexpected type in C emission")
                .to_string()),
        }
    }

    /// The constructor spelling for a mangled container name:
    /// `CurArray1d_i325` calls `curarray1d_i325`.
    pub(crate) fn ctor_name(mangled: &str) -> String {
        match mangled.split_once('_') {
            Some((head, tail)) => format!("{}_{}", head.to_lowercase(), tail),
            None => mangled.to_lowercase(),
        }
    }

    /// Emit the `…Def` (header) and `…Imp` (translation unit)
    /// expansions for a container type the first time it is seen.
    pub(crate) fn ensure_generic(&mut self, ty: &Type) -> CompileResult<()> {
        match &ty.kind {
            TypeKind::Slice { of } => {
                let of = (**of).clone();
                let elem = self.c_type(&of)?;
                let tn = self.typename(&of)?;
                let key = format!("CurSlice_{}", tn);
                if !self.generated.insert(key) {
                    return Ok(());
                }
                self.insert_def(&format!("CurSliceDef({}, {});\n", elem, tn));
                self.insert_code(&format!("CurSliceImp({}, {});\n", elem, tn));
            }
            TypeKind::Array { of, len } => {
                let outer_len = self.array_len(ty, *len)?;
                let of = (**of).clone();
                match of.kind.clone() {
                    TypeKind::Array {
                        of: inner_of,
                        len: inner_len,
                    } => {
                        // The row type must exist before the 2-d type.
                        self.ensure_generic(&of)?;
                        let inner_len = self.array_len(&of, inner_len)?;
                        let elem = self.c_type(&inner_of)?;
                        let tn = self.typename(&inner_of)?;
                        let key = format!("CurArray2d_{}{}{}", tn, inner_len, outer_len);
                        if !self.generated.insert(key) {
                            return Ok(());
                        }
                        self.insert_def(&format!(
                            "CurArray2dDef({}, {}, {}, {});\n",
                            elem, tn, inner_len, outer_len
                        ));
                        self.insert_code(&format!(
                            "CurArray2dImp({}, {}, {}, {});\n",
                            elem, tn, inner_len, outer_len
                        ));
                    }
                    _ => {
                        let elem = self.c_type(&of)?;
                        let tn = self.typename(&of)?;
                        let key = format!("CurArray1d_{}{}", tn, outer_len);
                        if !self.generated.insert(key) {
                            return Ok(());
                        }
                        self.insert_def(&format!(
                            "CurArray1dDef({}, {}, {});\n",
                            elem, tn, outer_len
                        ));
                        self.insert_code(&format!(
                            "CurArray1dImp({}, {}, {});\n",
                            elem, tn, outer_len
                        ));
                    }
                }
            }
            TypeKind::Option { subtype, .. } => {
                let subtype = (**subtype).clone();
                let elem = self.c_type(&subtype)?;
                let tn = self.typename(&subtype)?;
                let key = format!("CurOption_{}", tn);
                if !self.generated.insert(key) {
                    return Ok(());
                }
                self.insert_def(&format!("CurOptionDef({}, {});\n", elem, tn));
                self.insert_code(&format!("CurOptionImp({}, {});\n", elem, tn));
            }
            TypeKind::Ptr { to } => {
                let to = (**to).clone();
                self.ensure_generic(&to)?;
            }
            TypeKind::TypeDef(name) => {
                let name = name.clone();
                let key = format!("typedef {}", name);
                if self.generated.contains(&key) {
                    return Ok(());
                }
                let ast = self.ast;
                let line = match ast.find_decl(&name) {
                    Some(decl) => match &ast.stmnt(decl).kind {
                        StmntKind::StructDecl(_) => {
                            format!("typedef struct {} {};\n", name, name)
                        }
                        StmntKind::EnumDecl(_) => format!("typedef enum {} {};\n", name, name),
                        _ => return Ok(()),
                    },
                    None => return Ok(()),
                };
                self.generated.insert(key);
                self.insert_def(&line);
            }
            _ => {}
        }
        Ok(())
    }
}
