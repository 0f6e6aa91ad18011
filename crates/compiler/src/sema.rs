//! Semantic analysis.
//!
//! A single top-down walk over the AST that resolves identifiers
//! against a scoped symbol table, type-checks (see `typecheck.rs` for
//! the unification rules), validates directives, rewrites `if` option
//! captures into implicit const bindings, numbers enum fields, and
//! records the dependency graph of nominal types that drives the
//! emission order of struct/enum definitions in the generator.
//!
//! The analyser mutates the AST in place: expression type slots are
//! filled, untyped literals are narrowed, bare values in option
//! position are flagged for wrapping, and inferred array lengths are
//! written back.

use std::collections::HashMap;

use crate::ast::{
    Ast, Capture, ConstDecl, Directive, Expr, ExprId, ExprKind, Literal, Stmnt, StmntId,
    StmntKind, UnopKind,
};
use crate::error::{CompileResult, Cursor, Diagnostic};
use crate::eval;
use crate::types::{Type, TypeKind};

/// A nominal type (struct or enum) and the nominal names its fields
/// reference. Consulted by the generator for definition ordering.
#[derive(Debug, Clone)]
pub struct Dnode {
    pub name: String,
    pub stmnt: StmntId,
    pub children: Vec<String>,
}

/// Dependency graph of nominal types, in declaration order.
#[derive(Debug, Default)]
pub struct Dgraph {
    nodes: Vec<Dnode>,
}

impl Dgraph {
    pub fn push(&mut self, node: Dnode) {
        if !self.contains(&node.name) {
            self.nodes.push(node);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Dnode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dnode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Stack of scope frames, consulted inner-first. Shadowing an outer
/// name is a redeclaration error, so insertion scans the whole stack.
#[derive(Debug)]
struct SymTab {
    scopes: Vec<HashMap<String, StmntId>>,
}

impl SymTab {
    fn new() -> Self {
        SymTab {
            scopes: vec![HashMap::new()],
        }
    }

    fn new_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the global scope");
    }

    fn get(&self, name: &str) -> Option<StmntId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        None
    }

    /// Returns the previously declared statement on collision.
    fn insert(&mut self, name: &str, id: StmntId) -> Result<(), StmntId> {
        if let Some(existing) = self.get(name) {
            return Err(existing);
        }
        self.scopes
            .last_mut()
            .expect("symbol table always has a scope")
            .insert(name.to_string(), id);
        Ok(())
    }
}

pub struct Sema<'a> {
    pub(crate) ast: &'a mut Ast,
    pub(crate) cursors: &'a [Cursor],
    symtab: SymTab,
    dgraph: Dgraph,
    /// Name and return type of the function being analysed.
    pub(crate) current_fn: Option<(String, Type)>,
    in_for_loop: bool,
    seen_output: bool,
    seen_optimise: bool,
}

/// Analyse the whole program, mutating the AST in place. Returns the
/// dependency graph of nominal types for the generator.
pub fn analyse(ast: &mut Ast, cursors: &[Cursor]) -> CompileResult<Dgraph> {
    let mut sema = Sema {
        ast,
        cursors,
        symtab: SymTab::new(),
        dgraph: Dgraph::default(),
        current_fn: None,
        in_for_loop: false,
        seen_output: false,
        seen_optimise: false,
    };

    let top = sema.ast.top.clone();
    for id in top {
        sema.top_stmnt(id)?;
    }

    Ok(sema.dgraph)
}

impl<'a> Sema<'a> {
    pub(crate) fn diag(&self, idx: usize, message: impl Into<String>) -> Diagnostic {
        let cursor = self
            .cursors
            .get(idx)
            .copied()
            .or_else(|| self.cursors.last().copied())
            .unwrap_or_default();
        Diagnostic::new(cursor, message)
    }

    pub(crate) fn type_str(&self, ty: &Type) -> String {
        self.ast.type_to_string(ty)
    }

    // ----- symbol table ----------------------------------------------

    /// Resolve a name against the scope stack, falling back to the
    /// whole top level so forward references work.
    pub(crate) fn symtab_find(&self, name: &str, cursor_idx: usize) -> CompileResult<StmntId> {
        if let Some(id) = self.symtab.get(name) {
            return Ok(id);
        }
        if let Some(id) = self.ast.find_decl(name) {
            return Ok(id);
        }
        Err(self.diag(cursor_idx, format!("use of undefined \"{}\"", name)))
    }

    fn symtab_push(&mut self, name: &str, id: StmntId) -> CompileResult<()> {
        if let Err(existing) = self.symtab.insert(name, id) {
            let at = self.ast.stmnt(existing).cursors_idx;
            let cursor = self.cursors.get(at).copied().unwrap_or_default();
            return Err(self.diag(
                self.ast.stmnt(id).cursors_idx,
                format!(
                    "redeclaration of \"{}\" from {}:{}",
                    name, cursor.row, cursor.col
                ),
            ));
        }
        Ok(())
    }

    // ----- helpers ---------------------------------------------------

    /// The declared type carried by a declaration-like statement.
    pub(crate) fn type_of_decl(&self, id: StmntId) -> CompileResult<Type> {
        let stmnt = self.ast.stmnt(id);
        match &stmnt.kind {
            StmntKind::FnDecl(f) => Ok(f.ty.clone()),
            StmntKind::VarDecl(v) => Ok(v.ty.clone()),
            StmntKind::ConstDecl(c) => Ok(c.ty.clone()),
            StmntKind::VarReassign(r) => Ok(r.ty.clone()),
            StmntKind::Return { ty, .. } => Ok(ty.clone()),
            StmntKind::FnCall { name, .. } => {
                let decl = self.symtab_find(name, stmnt.cursors_idx)?;
                self.type_of_decl(decl)
            }
            other => Err(self.diag(
                stmnt.cursors_idx,
                format!("statement has no type: {:?}", std::mem::discriminant(other)),
            )),
        }
    }

    fn stmnt_is_constant(&self, id: StmntId) -> CompileResult<bool> {
        match &self.ast.stmnt(id).kind {
            StmntKind::VarDecl(_) => Ok(false),
            StmntKind::ConstDecl(_) => Ok(true),
            _ => Err(self.diag(
                self.ast.stmnt(id).cursors_idx,
                "expected a variable or constant declaration",
            )),
        }
    }

    /// Ensure an expression's type slot is filled and return a copy.
    pub(crate) fn resolve_expr_type(&mut self, id: ExprId) -> CompileResult<Type> {
        let expr = self.ast.expr(id);
        if !expr.ty.is_none() {
            return Ok(expr.ty.clone());
        }

        match expr.kind.clone() {
            ExprKind::Ident(name) => {
                let idx = expr.cursors_idx;
                let decl = self.symtab_find(&name, idx)?;
                let ty = match &self.ast.stmnt(decl).kind {
                    StmntKind::VarDecl(v) => v.ty.clone(),
                    StmntKind::ConstDecl(c) => c.ty.clone(),
                    StmntKind::EnumDecl(e) => {
                        Type::new(TypeKind::TypeDef(e.name.clone()), false, idx)
                    }
                    _ => {
                        return Err(self.diag(
                            idx,
                            "expected ident to be a variable or constant".to_string(),
                        ));
                    }
                };
                self.ast.expr_mut(id).ty = ty.clone();
                Ok(ty)
            }
            ExprKind::FnCall { name, .. } => {
                let idx = expr.cursors_idx;
                let decl = self.symtab_find(&name, idx)?;
                match &self.ast.stmnt(decl).kind {
                    StmntKind::FnDecl(f) => {
                        let ty = f.ty.clone();
                        self.ast.expr_mut(id).ty = ty.clone();
                        Ok(ty)
                    }
                    _ => Err(self.diag(idx, format!("expected \"{}\" to be a function", name))),
                }
            }
            _ => Ok(self.ast.expr(id).ty.clone()),
        }
    }

    pub(crate) fn set_expr_type(&mut self, id: ExprId, ty: Type) {
        self.ast.expr_mut(id).ty = ty;
    }

    /// Analyse then constant-evaluate an expression.
    pub(crate) fn eval_checked(&mut self, id: ExprId) -> CompileResult<u64> {
        self.sema_expr(id)?;
        eval::eval_expr(self.ast, id, self.cursors)
    }

    // ----- top level -------------------------------------------------

    fn top_stmnt(&mut self, id: StmntId) -> CompileResult<()> {
        let idx = self.ast.stmnt(id).cursors_idx;
        match &self.ast.stmnt(id).kind {
            StmntKind::Directive(_) => self.sema_directive(id),
            StmntKind::Extern(_) => self.sema_extern(id),
            StmntKind::FnDecl(_) => self.sema_fn_decl(id),
            StmntKind::StructDecl(_) => self.sema_struct_decl(id),
            StmntKind::EnumDecl(_) => self.sema_enum_decl(id),
            StmntKind::VarDecl(_) => self.sema_var_decl(id),
            StmntKind::VarReassign(_) => self.sema_var_reassign(id),
            StmntKind::ConstDecl(_) => self.sema_const_decl(id),
            StmntKind::Block(_) => {
                Err(self.diag(idx, "illegal use of scope block, not inside a function"))
            }
            StmntKind::Return { .. } => {
                Err(self.diag(idx, "illegal use of return, not inside a function"))
            }
            StmntKind::Defer(_) => {
                Err(self.diag(idx, "illegal use of defer, not inside a function"))
            }
            StmntKind::Continue => {
                Err(self.diag(idx, "illegal use of continue, not inside a loop"))
            }
            StmntKind::Break => Err(self.diag(idx, "illegal use of break, not inside a loop")),
            StmntKind::FnCall { .. } => {
                Err(self.diag(idx, "illegal use of function call, not inside a function"))
            }
            StmntKind::If(_) => {
                Err(self.diag(idx, "illegal use of if statement, not inside a function"))
            }
            StmntKind::For(_) => {
                Err(self.diag(idx, "illegal use of for loop, not inside a function"))
            }
        }
    }

    // ----- statements ------------------------------------------------

    pub(crate) fn sema_block(&mut self, body: &[StmntId]) -> CompileResult<()> {
        for &id in body {
            let idx = self.ast.stmnt(id).cursors_idx;
            match &self.ast.stmnt(id).kind {
                StmntKind::Directive(_) => self.sema_directive(id)?,
                StmntKind::Extern(_) => self.sema_extern(id)?,
                StmntKind::Block(inner) => {
                    let inner = inner.clone();
                    self.symtab.new_scope();
                    let res = self.sema_block(&inner);
                    self.symtab.pop_scope();
                    res?
                }
                StmntKind::Defer(_) => self.sema_defer(id)?,
                StmntKind::Return { .. } => {
                    if self.current_fn.is_none() {
                        return Err(
                            self.diag(idx, "illegal use of return, not inside a function")
                        );
                    }
                    self.sema_return(id)?
                }
                StmntKind::Continue => {
                    if !self.in_for_loop {
                        return Err(
                            self.diag(idx, "illegal use of continue, not inside a loop")
                        );
                    }
                }
                StmntKind::Break => {
                    if !self.in_for_loop {
                        return Err(self.diag(idx, "illegal use of break, not inside a loop"));
                    }
                }
                StmntKind::VarDecl(_) => self.sema_var_decl(id)?,
                StmntKind::VarReassign(_) => self.sema_var_reassign(id)?,
                StmntKind::ConstDecl(_) => self.sema_const_decl(id)?,
                StmntKind::FnCall { .. } => {
                    self.sema_fn_call_stmnt(id)?;
                }
                StmntKind::If(_) => self.sema_if(id)?,
                StmntKind::For(_) => self.sema_for(id)?,
                StmntKind::FnDecl(_) => {
                    return Err(self.diag(
                        idx,
                        "illegal function declaration inside another function",
                    ));
                }
                StmntKind::StructDecl(_) => {
                    return Err(
                        self.diag(idx, "illegal struct declaration inside a function")
                    );
                }
                StmntKind::EnumDecl(_) => {
                    return Err(self.diag(idx, "illegal enum declaration inside a function"));
                }
            }
        }
        Ok(())
    }

    fn sema_fn_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let f = match &self.ast.stmnt(id).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => unreachable!("sema_fn_decl on non-fn"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        self.symtab_push(&f.name, id)?;
        self.symtab.new_scope();

        for &arg in &f.args {
            let c = match &self.ast.stmnt(arg).kind {
                StmntKind::ConstDecl(c) => c.clone(),
                _ => unreachable!("fn args are const decls"),
            };
            if let TypeKind::TypeDef(name) = &c.ty.kind {
                self.symtab_find(name, c.ty.cursors_idx)?;
            }
            if matches!(c.ty.kind, TypeKind::Array { len: None, .. }) {
                return Err(self.diag(
                    c.ty.cursors_idx,
                    format!("cannot infer array length for parameter \"{}\"", c.name),
                ));
            }
            self.symtab_push(&c.name, arg)?;
        }

        if matches!(f.ty.kind, TypeKind::Array { len: None, .. }) {
            return Err(self.diag(
                f.ty.cursors_idx,
                "cannot infer array length for a return type",
            ));
        }

        if f.name == "main" {
            if !matches!(f.ty.kind, TypeKind::Void) {
                return Err(self.diag(
                    idx,
                    format!(
                        "illegal main function, expected return type to be void, got {}",
                        self.type_str(&f.ty)
                    ),
                ));
            }
            if f.args.len() > 1 {
                return Err(self.diag(
                    idx,
                    "illegal main function, expected zero arguments or one []string argument",
                ));
            }
            if let Some(&arg) = f.args.first() {
                let arg_ty = self.type_of_decl(arg)?;
                let is_string_slice = matches!(
                    &arg_ty.kind,
                    TypeKind::Slice { of } if matches!(of.kind, TypeKind::String)
                );
                if !is_string_slice {
                    return Err(self.diag(
                        idx,
                        format!(
                            "illegal main function, expected argument of type []string, got {}",
                            self.type_str(&arg_ty)
                        ),
                    ));
                }
            }
        }

        let saved = self.current_fn.take();
        self.current_fn = Some((f.name.clone(), f.ty.clone()));
        let res = self.sema_block(&f.body);
        self.current_fn = saved;
        self.symtab.pop_scope();
        res
    }

    fn sema_struct_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let s = match &self.ast.stmnt(id).kind {
            StmntKind::StructDecl(s) => s.clone(),
            _ => unreachable!("sema_struct_decl on non-struct"),
        };

        self.symtab_push(&s.name, id)?;
        self.symtab.new_scope();

        for &field in &s.fields {
            let fidx = self.ast.stmnt(field).cursors_idx;
            match &self.ast.stmnt(field).kind {
                StmntKind::VarDecl(v) => {
                    if v.value.is_some() {
                        return Err(self.diag(
                            fidx,
                            format!(
                                "cannot have default values in structs, got one for field {}",
                                v.name
                            ),
                        ));
                    }
                }
                StmntKind::ConstDecl(c) => {
                    return Err(self.diag(
                        fidx,
                        format!("cannot have constant fields, got constant field {}", c.name),
                    ));
                }
                _ => {
                    return Err(self.diag(fidx, "illegal statement in struct body"));
                }
            }
        }

        let res = self.sema_block(&s.fields);
        if res.is_err() {
            self.symtab.pop_scope();
            return res;
        }

        let root_idx = self.ast.stmnt(id).cursors_idx;
        let mut visited = Vec::new();
        let cycles = self.struct_decl_deps(id, &mut visited, root_idx);
        self.symtab.pop_scope();
        cycles
    }

    /// Walk a struct's field types: reject cycles through value fields
    /// and record the nominal names it references in the dgraph. Option
    /// and pointer fields contribute ordering edges but are not value
    /// cycles.
    fn struct_decl_deps(
        &mut self,
        id: StmntId,
        visited: &mut Vec<String>,
        root_idx: usize,
    ) -> CompileResult<()> {
        let s = match &self.ast.stmnt(id).kind {
            StmntKind::StructDecl(s) => s.clone(),
            _ => unreachable!("struct deps on non-struct"),
        };

        visited.push(s.name.clone());
        let mut children = Vec::new();

        for &field in &s.fields {
            let (fname, fty) = match &self.ast.stmnt(field).kind {
                StmntKind::VarDecl(v) => (v.name.clone(), v.ty.clone()),
                _ => continue,
            };

            self.field_value_deps(&s.name, &fname, &fty, root_idx, visited, &mut children)?;
        }

        children.sort();
        children.dedup();
        self.dgraph.push(Dnode {
            name: s.name.clone(),
            stmnt: id,
            children,
        });
        Ok(())
    }

    fn field_value_deps(
        &mut self,
        struct_name: &str,
        field_name: &str,
        ty: &Type,
        root_idx: usize,
        visited: &mut Vec<String>,
        children: &mut Vec<String>,
    ) -> CompileResult<()> {
        match &ty.kind {
            TypeKind::TypeDef(name) => {
                let decl = self.ast.find_decl(name).ok_or_else(|| {
                    self.diag(ty.cursors_idx, format!("use of undefined \"{}\"", name))
                })?;
                children.push(name.clone());

                match &self.ast.stmnt(decl).kind {
                    StmntKind::StructDecl(_) => {
                        if visited.iter().any(|v| v == name) {
                            return Err(self.diag(
                                root_idx,
                                format!(
                                    "cyclic dependency between struct \"{}\" and field \"{}\" of type \"{}\"",
                                    struct_name, field_name, name
                                ),
                            ));
                        }
                        if !self.dgraph.contains(name) {
                            let mut branch = visited.clone();
                            self.struct_decl_deps(decl, &mut branch, root_idx)?;
                        }
                    }
                    StmntKind::EnumDecl(e) => {
                        let ename = e.name.clone();
                        self.dgraph.push(Dnode {
                            name: ename,
                            stmnt: decl,
                            children: Vec::new(),
                        });
                    }
                    _ => {
                        return Err(self.diag(
                            ty.cursors_idx,
                            format!("expected \"{}\" to be a struct or enum", name),
                        ));
                    }
                }
            }
            // Arrays hold their elements by value.
            TypeKind::Array { of, .. } => {
                self.field_value_deps(struct_name, field_name, of, root_idx, visited, children)?;
            }
            // Ordering edges only; never a value cycle.
            TypeKind::Option { subtype, .. } => {
                collect_nominal_names(subtype, children);
            }
            TypeKind::Ptr { to } => {
                collect_nominal_names(to, children);
            }
            TypeKind::Slice { of } => {
                collect_nominal_names(of, children);
            }
            _ => {}
        }
        Ok(())
    }

    fn sema_enum_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let e = match &self.ast.stmnt(id).kind {
            StmntKind::EnumDecl(e) => e.clone(),
            _ => unreachable!("sema_enum_decl on non-enum"),
        };

        self.symtab_push(&e.name, id)?;

        let mut counter: u64 = 0;
        for &field in &e.fields {
            let fidx = self.ast.stmnt(field).cursors_idx;
            let mut c = match &self.ast.stmnt(field).kind {
                StmntKind::ConstDecl(c) => c.clone(),
                _ => {
                    return Err(self.diag(fidx, "enum fields must be constants"));
                }
            };

            match c.value {
                None => {
                    let lit = self.ast.push_expr(Expr {
                        kind: ExprKind::IntLit(counter),
                        ty: Type::new(TypeKind::UntypedInt, true, fidx),
                        cursors_idx: fidx,
                    });
                    c.value = Some(lit);
                    counter += 1;
                }
                Some(value) => {
                    c.ty = Type::new(TypeKind::I32, true, fidx);
                    counter = self.eval_checked(value)?;
                    counter = counter.wrapping_add(1);
                }
            }

            self.ast.stmnt_mut(field).kind = StmntKind::ConstDecl(c);
        }

        self.dgraph.push(Dnode {
            name: e.name.clone(),
            stmnt: id,
            children: Vec::new(),
        });
        Ok(())
    }

    fn sema_var_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let mut v = match &self.ast.stmnt(id).kind {
            StmntKind::VarDecl(v) => v.clone(),
            _ => unreachable!("sema_var_decl on non-var"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        // A compound literal takes its type from the declaration (or
        // vice versa) before the literal itself is analysed.
        if let Some(value) = v.value {
            if matches!(self.ast.expr(value).kind, ExprKind::Literal(_)) {
                let mut valty = self.ast.expr(value).ty.clone();
                if valty.is_none() {
                    if v.ty.is_none() {
                        return Err(self.diag(idx, "missing type for literal"));
                    }
                    self.set_expr_type(value, v.ty.clone());
                } else if !v.ty.is_none() {
                    if !self.tc_equals(&mut v.ty, &mut valty)? {
                        return Err(self.diag(
                            idx,
                            format!(
                                "mismatch types, variable \"{}\" type {}, expression type {}",
                                v.name,
                                self.type_str(&v.ty),
                                self.type_str(&valty)
                            ),
                        ));
                    }
                    self.set_expr_type(value, valty);
                } else {
                    v.ty = valty;
                }
            }
            self.sema_expr(value)?;
        }

        self.tc_var_decl(id, &mut v)?;

        self.ast.stmnt_mut(id).kind = StmntKind::VarDecl(v.clone());
        self.symtab_push(&v.name, id)
    }

    fn sema_const_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let mut c = match &self.ast.stmnt(id).kind {
            StmntKind::ConstDecl(c) => c.clone(),
            _ => unreachable!("sema_const_decl on non-const"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        let value = match c.value {
            Some(value) => value,
            None => {
                return Err(self.diag(idx, "constant declaration requires a value"));
            }
        };

        if matches!(self.ast.expr(value).kind, ExprKind::Literal(_)) {
            let mut valty = self.ast.expr(value).ty.clone();
            if valty.is_none() {
                if c.ty.is_none() {
                    return Err(self.diag(idx, "missing type for literal"));
                }
                self.set_expr_type(value, c.ty.clone());
            } else if !c.ty.is_none() {
                if !self.tc_equals(&mut c.ty, &mut valty)? {
                    return Err(self.diag(
                        idx,
                        format!(
                            "mismatch types, variable \"{}\" type {}, expression type {}",
                            c.name,
                            self.type_str(&c.ty),
                            self.type_str(&valty)
                        ),
                    ));
                }
                self.set_expr_type(value, valty);
            } else {
                c.ty = valty;
            }
        }

        self.sema_expr(value)?;
        self.tc_const_decl(id, &mut c)?;

        self.ast.stmnt_mut(id).kind = StmntKind::ConstDecl(c.clone());
        self.symtab_push(&c.name, id)
    }

    fn sema_var_reassign(&mut self, id: StmntId) -> CompileResult<()> {
        let mut re = match &self.ast.stmnt(id).kind {
            StmntKind::VarReassign(r) => r.clone(),
            _ => unreachable!("sema_var_reassign on non-reassign"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        self.sema_expr(re.target)?;
        self.sema_expr(re.value)?;

        if self.ast.expr(re.target).ty.constant {
            return Err(self.diag(idx, "cannot mutate constant variable"));
        }

        let target_kind = self.ast.expr(re.target).kind.clone();
        match target_kind {
            ExprKind::FieldAccess { .. } | ExprKind::ArrayIndex { .. } => {
                re.ty = self.ast.expr(re.target).ty.clone();
                let mut vt = self.resolve_expr_type(re.value)?;
                if !self.tc_equals(&mut re.ty, &mut vt)? {
                    return Err(self.diag(
                        idx,
                        format!(
                            "mismatch types, variable type {}, expression type {}",
                            self.type_str(&re.ty),
                            self.type_str(&vt)
                        ),
                    ));
                }
                self.set_expr_type(re.value, vt);
            }
            ExprKind::Ident(name) => {
                let decl = self.symtab_find(&name, idx)?;
                match &self.ast.stmnt(decl).kind {
                    StmntKind::VarDecl(v) => re.ty = v.ty.clone(),
                    StmntKind::ConstDecl(_) => {
                        return Err(self.diag(
                            idx,
                            format!("cannot mutate constant variable \"{}\"", name),
                        ));
                    }
                    _ => {
                        return Err(
                            self.diag(idx, format!("expected \"{}\" to be a variable", name))
                        );
                    }
                }

                let mut vt = self.resolve_expr_type(re.value)?;
                if !self.tc_equals(&mut re.ty, &mut vt)? {
                    return Err(self.diag(
                        idx,
                        format!(
                            "mismatch types, variable \"{}\" type {}, expression type {}",
                            name,
                            self.type_str(&re.ty),
                            self.type_str(&vt)
                        ),
                    ));
                }
                self.set_expr_type(re.value, vt);
            }
            _ => {
                return Err(self.diag(idx, "invalid assignment target"));
            }
        }

        self.ast.stmnt_mut(id).kind = StmntKind::VarReassign(re);
        Ok(())
    }

    fn sema_if(&mut self, id: StmntId) -> CompileResult<()> {
        let mut iff = match &self.ast.stmnt(id).kind {
            StmntKind::If(i) => i.clone(),
            _ => unreachable!("sema_if on non-if"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        self.sema_expr(iff.cond)?;
        let mut cond_ty = self.resolve_expr_type(iff.cond)?;
        let mut bool_ty = Type::bool(0);
        let is_bool = self.tc_equals(&mut bool_ty, &mut cond_ty)?;
        if !is_bool && !matches!(cond_ty.kind, TypeKind::Option { .. }) {
            return Err(self.diag(
                idx,
                format!(
                    "condition must be bool or option, got {}",
                    self.type_str(&cond_ty)
                ),
            ));
        }

        let mut binding = None;
        if let Capture::Ident { name, cursors_idx } = iff.capture.clone() {
            let subtype = match &cond_ty.kind {
                TypeKind::Option { subtype, .. } => subtype.as_ref().clone(),
                _ => {
                    return Err(self.diag(
                        cursors_idx,
                        "cannot capture from a condition that is not an option",
                    ));
                }
            };

            let decl = self.ast.push_stmnt(Stmnt {
                kind: StmntKind::ConstDecl(ConstDecl {
                    name: name.clone(),
                    ty: subtype,
                    value: None,
                }),
                cursors_idx,
            });
            iff.capture = Capture::Binding(decl);
            binding = Some((name, decl));
        }

        self.symtab.new_scope();
        let body_res = (|| {
            if let Some((name, decl)) = &binding {
                self.symtab_push(name, *decl)?;
            }
            self.sema_block(&iff.body)
        })();
        self.symtab.pop_scope();
        body_res?;

        self.symtab.new_scope();
        let els_res = self.sema_block(&iff.els);
        self.symtab.pop_scope();
        els_res?;

        self.ast.stmnt_mut(id).kind = StmntKind::If(iff);
        Ok(())
    }

    fn sema_for(&mut self, id: StmntId) -> CompileResult<()> {
        let forf = match &self.ast.stmnt(id).kind {
            StmntKind::For(f) => f.clone(),
            _ => unreachable!("sema_for on non-for"),
        };

        self.symtab.new_scope();
        let res = (|| {
            self.sema_var_decl(forf.init)?;
            self.sema_expr(forf.cond)?;

            let mut cond_ty = self.resolve_expr_type(forf.cond)?;
            let mut bool_ty = Type::bool(0);
            if !self.tc_equals(&mut bool_ty, &mut cond_ty)? {
                return Err(self.diag(
                    self.ast.expr(forf.cond).cursors_idx,
                    format!("condition must be bool, got {}", self.type_str(&cond_ty)),
                ));
            }

            if let Some(step) = forf.step {
                self.sema_var_reassign(step)?;
            }

            self.symtab.new_scope();
            let saved = self.in_for_loop;
            self.in_for_loop = true;
            let body_res = self.sema_block(&forf.body);
            self.in_for_loop = saved;
            self.symtab.pop_scope();
            body_res
        })();
        self.symtab.pop_scope();
        res
    }

    fn sema_return(&mut self, id: StmntId) -> CompileResult<()> {
        let (value, mut ty) = match &self.ast.stmnt(id).kind {
            StmntKind::Return { value, ty } => (*value, ty.clone()),
            _ => unreachable!("sema_return on non-return"),
        };

        if let Some(value) = value {
            self.sema_expr(value)?;
        }
        self.tc_return(id, value, &mut ty)?;

        self.ast.stmnt_mut(id).kind = StmntKind::Return { value, ty };
        Ok(())
    }

    fn sema_defer(&mut self, id: StmntId) -> CompileResult<()> {
        let inner = match &self.ast.stmnt(id).kind {
            StmntKind::Defer(inner) => *inner,
            _ => unreachable!("sema_defer on non-defer"),
        };
        let idx = self.ast.stmnt(inner).cursors_idx;

        match &self.ast.stmnt(inner).kind {
            StmntKind::VarReassign(_) => self.sema_var_reassign(inner),
            StmntKind::FnCall { .. } => self.sema_fn_call_stmnt(inner).map(|_| ()),
            StmntKind::If(_) => self.sema_if(inner),
            StmntKind::For(_) => self.sema_for(inner),
            StmntKind::Block(body) => {
                let body = body.clone();
                self.sema_block(&body)
            }
            StmntKind::Return { .. } => {
                Err(self.diag(idx, "cannot defer a return statement"))
            }
            StmntKind::Continue => Err(self.diag(idx, "cannot defer a continue statement")),
            StmntKind::Break => Err(self.diag(idx, "cannot defer a break statement")),
            StmntKind::Defer(_) => Err(self.diag(idx, "cannot defer a defer")),
            StmntKind::Directive(_) => Err(self.diag(idx, "cannot defer a directive")),
            _ => Err(self.diag(idx, "cannot defer a declaration")),
        }
    }

    fn sema_extern(&mut self, id: StmntId) -> CompileResult<()> {
        let inner = match &self.ast.stmnt(id).kind {
            StmntKind::Extern(inner) => *inner,
            _ => unreachable!("sema_extern on non-extern"),
        };
        let idx = self.ast.stmnt(inner).cursors_idx;

        match &self.ast.stmnt(inner).kind {
            StmntKind::FnDecl(_) => self.sema_fn_decl(inner),
            StmntKind::VarDecl(_) => self.sema_var_decl(inner),
            StmntKind::VarReassign(_) => self.sema_var_reassign(inner),
            StmntKind::ConstDecl(_) => self.sema_const_decl(inner),
            StmntKind::StructDecl(_) => {
                Err(self.diag(idx, "illegal struct declaration, cannot be external"))
            }
            StmntKind::EnumDecl(_) => {
                Err(self.diag(idx, "illegal enum declaration, cannot be external"))
            }
            StmntKind::Extern(_) => {
                Err(self.diag(idx, "illegal use of extern, already inside extern"))
            }
            StmntKind::Directive(_) => {
                Err(self.diag(idx, "illegal use of directive, can't be inside extern"))
            }
            _ => Err(self.diag(idx, "illegal statement inside extern")),
        }
    }

    fn sema_directive(&mut self, id: StmntId) -> CompileResult<()> {
        let directive = match &self.ast.stmnt(id).kind {
            StmntKind::Directive(d) => d.clone(),
            _ => unreachable!("sema_directive on non-directive"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        match directive {
            Directive::Link(_) | Directive::Syslink(_) => Ok(()),
            Directive::Output(_) => {
                if self.seen_output {
                    return Err(self.diag(
                        idx,
                        "output already set, cannot have more than one output directive",
                    ));
                }
                self.seen_output = true;
                Ok(())
            }
            Directive::Opt(_) => {
                if self.seen_optimise {
                    return Err(self.diag(
                        idx,
                        "optimisation already set, cannot have more than one optimisation directive",
                    ));
                }
                self.seen_optimise = true;
                Ok(())
            }
        }
    }

    // ----- expressions -----------------------------------------------

    pub(crate) fn sema_expr(&mut self, id: ExprId) -> CompileResult<()> {
        match self.ast.expr(id).kind.clone() {
            ExprKind::FieldAccess { .. } => self.sema_field_access(id),
            ExprKind::ArrayIndex { .. } => self.sema_array_index(id),
            ExprKind::Unop { .. } => self.sema_unop(id),
            ExprKind::Binop { .. } => self.sema_binop(id),
            ExprKind::Literal(_) => self.sema_literal(id),
            ExprKind::FnCall { .. } => self.sema_fn_call(id),
            ExprKind::Ident(name) => {
                if !self.ast.expr(id).ty.is_none() {
                    return Ok(());
                }
                let idx = self.ast.expr(id).cursors_idx;
                let decl = self.symtab_find(&name, idx)?;
                let ty = match &self.ast.stmnt(decl).kind {
                    StmntKind::VarDecl(v) => v.ty.clone(),
                    StmntKind::ConstDecl(c) => c.ty.clone(),
                    StmntKind::EnumDecl(e) => {
                        Type::new(TypeKind::TypeDef(e.name.clone()), false, idx)
                    }
                    _ => {
                        return Err(
                            self.diag(idx, format!("expected \"{}\" to be a variable", name))
                        );
                    }
                };
                self.set_expr_type(id, ty);
                Ok(())
            }
            ExprKind::Group(inner) => {
                self.sema_expr(inner)?;
                let ty = self.resolve_expr_type(inner)?;
                self.set_expr_type(id, ty);
                Ok(())
            }
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::CstrLit(_)
            | ExprKind::True
            | ExprKind::False
            | ExprKind::Null => Ok(()),
        }
    }

    /// Look up a field on a type, returning the field's type. Pointers
    /// auto-deref; strings, arrays and slices expose `len` and `ptr`;
    /// enum "fields" are the variants and carry the enum's own type.
    fn get_field(&mut self, ty: &Type, field: &str, cursor_idx: usize) -> CompileResult<Type> {
        match &ty.kind {
            TypeKind::Ptr { to } => {
                let to = to.as_ref().clone();
                self.get_field(&to, field, cursor_idx)
            }
            TypeKind::String | TypeKind::Array { .. } | TypeKind::Slice { .. } => match field {
                "len" => Ok(Type::new(TypeKind::Usize, true, cursor_idx)),
                "ptr" => Ok(Type::new(TypeKind::Cstring, true, cursor_idx)),
                _ => Err(self.diag(
                    cursor_idx,
                    format!(
                        "{} does not have field \"{}\"",
                        self.type_str(ty),
                        field
                    ),
                )),
            },
            TypeKind::TypeDef(name) => {
                let decl = self.symtab_find(name, cursor_idx)?;
                match self.ast.stmnt(decl).kind.clone() {
                    StmntKind::StructDecl(s) => {
                        for fid in &s.fields {
                            if let StmntKind::VarDecl(v) = &self.ast.stmnt(*fid).kind {
                                if v.name == field {
                                    return Ok(v.ty.clone());
                                }
                            }
                        }
                        Err(self.diag(
                            cursor_idx,
                            format!("{} does not have field \"{}\"", name, field),
                        ))
                    }
                    StmntKind::EnumDecl(e) => {
                        for fid in &e.fields {
                            if let StmntKind::ConstDecl(c) = &self.ast.stmnt(*fid).kind {
                                if c.name == field {
                                    return Ok(ty.clone());
                                }
                            }
                        }
                        Err(self.diag(
                            cursor_idx,
                            format!("{} does not have field \"{}\"", name, field),
                        ))
                    }
                    _ => Err(self.diag(
                        cursor_idx,
                        format!("expected \"{}\" to be a struct or enum", name),
                    )),
                }
            }
            _ => Err(self.diag(
                cursor_idx,
                format!("primitive type does not have field \"{}\"", field),
            )),
        }
    }

    fn sema_field_access(&mut self, id: ExprId) -> CompileResult<()> {
        let (base, field, deref) = match self.ast.expr(id).kind.clone() {
            ExprKind::FieldAccess { base, field, deref } => (base, field, deref),
            _ => unreachable!("sema_field_access on non-field-access"),
        };
        let idx = self.ast.expr(id).cursors_idx;

        self.sema_expr(base)?;
        let base_ty = self.resolve_expr_type(base)?;

        if deref {
            match &base_ty.kind {
                TypeKind::Ptr { to } => {
                    let pointee = to.as_ref().clone();
                    self.set_expr_type(id, pointee);
                    Ok(())
                }
                _ => Err(self.diag(
                    idx,
                    format!(
                        "cannot dereference {}, not a pointer",
                        self.type_str(&base_ty)
                    ),
                )),
            }
        } else {
            let field = field.expect("non-deref field access has a field");
            let name = match &self.ast.expr(field).kind {
                ExprKind::Ident(name) => name.clone(),
                _ => unreachable!("field is an identifier"),
            };
            let fty = self.get_field(&base_ty, &name, idx)?;
            self.set_expr_type(field, fty.clone());
            self.set_expr_type(id, fty);
            Ok(())
        }
    }

    fn sema_array_index(&mut self, id: ExprId) -> CompileResult<()> {
        let (base, index) = match self.ast.expr(id).kind.clone() {
            ExprKind::ArrayIndex { base, index } => (base, index),
            _ => unreachable!("sema_array_index on non-index"),
        };
        let idx = self.ast.expr(id).cursors_idx;

        self.sema_expr(base)?;
        let base_ty = self.resolve_expr_type(base)?;
        match &base_ty.kind {
            TypeKind::Array { of, .. } | TypeKind::Slice { of } => {
                let elem = of.as_ref().clone();
                self.set_expr_type(id, elem);
            }
            _ => {
                return Err(self.diag(
                    idx,
                    format!("cannot index into {}, not an array", self.type_str(&base_ty)),
                ));
            }
        }

        self.sema_expr(index)
    }

    fn sema_literal(&mut self, id: ExprId) -> CompileResult<()> {
        let literal = match self.ast.expr(id).kind.clone() {
            ExprKind::Literal(l) => l,
            _ => unreachable!("sema_literal on non-literal"),
        };

        match &literal {
            Literal::Positional(values) => {
                for &value in values {
                    self.sema_expr(value)?;
                }
            }
            Literal::Named(fields) => {
                for field in fields {
                    self.sema_expr(field.value)?;
                }
            }
        }

        match self.ast.expr(id).ty.kind.clone() {
            TypeKind::Array { .. } => self.sema_array_literal(id, &literal),
            TypeKind::Slice { .. } => self.sema_slice_literal(id, &literal),
            TypeKind::TypeDef(_) => self.sema_typedef_literal(id, &literal),
            _ => Ok(()),
        }
    }

    fn sema_array_literal(&mut self, id: ExprId, literal: &Literal) -> CompileResult<()> {
        let idx = self.ast.expr(id).cursors_idx;
        let values = match literal {
            Literal::Positional(values) => values.clone(),
            Literal::Named(_) => {
                return Err(self.diag(idx, "array literal cannot have named fields"));
            }
        };

        let (of, len) = match self.ast.expr(id).ty.kind.clone() {
            TypeKind::Array { of, len } => (of, len),
            _ => unreachable!("array literal without array type"),
        };

        match len {
            Some(len) => {
                let expected = self.eval_checked(len)?;
                if values.len() as u64 != expected {
                    return Err(self.diag(
                        idx,
                        format!(
                            "array length {}, literal length {}",
                            expected,
                            values.len()
                        ),
                    ));
                }
            }
            None => {
                let lit = self.ast.push_expr(Expr {
                    kind: ExprKind::IntLit(values.len() as u64),
                    ty: Type::new(TypeKind::Usize, true, idx),
                    cursors_idx: idx,
                });
                let mut ty = self.ast.expr(id).ty.clone();
                if let TypeKind::Array { len, .. } = &mut ty.kind {
                    *len = Some(lit);
                }
                self.set_expr_type(id, ty);
            }
        }

        let mut elem_ty = of.as_ref().clone();
        for (i, &value) in values.iter().enumerate() {
            let mut vt = self.resolve_expr_type(value)?;
            if !self.tc_equals(&mut elem_ty, &mut vt)? {
                return Err(self.diag(
                    idx,
                    format!(
                        "array element {} type is {}, but expected {}",
                        i + 1,
                        self.type_str(&vt),
                        self.type_str(&elem_ty)
                    ),
                ));
            }
            self.set_expr_type(value, vt);
            self.tc_number_within_bounds(&elem_ty, value)?;
        }

        Ok(())
    }

    fn sema_slice_literal(&mut self, id: ExprId, literal: &Literal) -> CompileResult<()> {
        let idx = self.ast.expr(id).cursors_idx;
        let values = match literal {
            Literal::Positional(values) => values.clone(),
            Literal::Named(_) => {
                return Err(self.diag(idx, "slice literal cannot have named fields"));
            }
        };

        let of = match self.ast.expr(id).ty.kind.clone() {
            TypeKind::Slice { of } => of,
            _ => unreachable!("slice literal without slice type"),
        };

        let mut elem_ty = of.as_ref().clone();
        for (i, &value) in values.iter().enumerate() {
            let mut vt = self.resolve_expr_type(value)?;
            if !self.tc_equals(&mut elem_ty, &mut vt)? {
                return Err(self.diag(
                    idx,
                    format!(
                        "slice element {} type is {}, but expected {}",
                        i + 1,
                        self.type_str(&vt),
                        self.type_str(&elem_ty)
                    ),
                ));
            }
            self.set_expr_type(value, vt);
            self.tc_number_within_bounds(&elem_ty, value)?;
        }

        Ok(())
    }

    fn sema_typedef_literal(&mut self, id: ExprId, literal: &Literal) -> CompileResult<()> {
        let idx = self.ast.expr(id).cursors_idx;
        let ty = self.ast.expr(id).ty.clone();
        let name = match &ty.kind {
            TypeKind::TypeDef(name) => name.clone(),
            _ => unreachable!("typedef literal without typedef type"),
        };

        let decl = self.symtab_find(&name, idx)?;
        let s = match &self.ast.stmnt(decl).kind {
            StmntKind::StructDecl(s) => s.clone(),
            _ => return Ok(()),
        };

        match literal {
            Literal::Positional(values) => {
                if values.len() != s.fields.len() {
                    return Err(self.diag(
                        idx,
                        format!("expected {} elements, got {}", s.fields.len(), values.len()),
                    ));
                }
                for (i, &value) in values.iter().enumerate() {
                    let mut field_ty = self.type_of_decl(s.fields[i])?;
                    let mut vt = self.resolve_expr_type(value)?;
                    if !self.tc_equals(&mut field_ty, &mut vt)? {
                        return Err(self.diag(
                            self.ast.expr(value).cursors_idx,
                            format!(
                                "field {} type is {}, but expected {}",
                                i + 1,
                                self.type_str(&vt),
                                self.type_str(&field_ty)
                            ),
                        ));
                    }
                    self.set_expr_type(value, vt);
                }
            }
            Literal::Named(fields) => {
                if fields.len() != s.fields.len() {
                    return Err(self.diag(
                        idx,
                        format!("expected {} elements, got {}", s.fields.len(), fields.len()),
                    ));
                }
                for field in fields {
                    let mut field_ty = self.get_field(&ty, &field.name, field.cursors_idx)?;
                    let vt = self.resolve_expr_type(field.value)?;

                    if vt.is_none() {
                        // A nested untyped literal takes the field's type.
                        self.set_expr_type(field.value, field_ty.clone());
                        self.sema_expr(field.value)?;
                        continue;
                    }

                    let mut vt = vt;
                    if !self.tc_equals(&mut field_ty, &mut vt)? {
                        return Err(self.diag(
                            field.cursors_idx,
                            format!(
                                "field {} type is {}, but expected {}",
                                field.name,
                                self.type_str(&vt),
                                self.type_str(&field_ty)
                            ),
                        ));
                    }
                    self.set_expr_type(field.value, vt);
                }
            }
        }

        Ok(())
    }

    fn sema_fn_call(&mut self, id: ExprId) -> CompileResult<()> {
        let (name, args) = match self.ast.expr(id).kind.clone() {
            ExprKind::FnCall { name, args } => (name, args),
            _ => unreachable!("sema_fn_call on non-call"),
        };
        let idx = self.ast.expr(id).cursors_idx;

        let ret = self.check_call(&name, &args, idx)?;
        if self.ast.expr(id).ty.is_none() {
            self.set_expr_type(id, ret);
        }
        Ok(())
    }

    pub(crate) fn sema_fn_call_stmnt(&mut self, id: StmntId) -> CompileResult<Type> {
        let (name, args) = match self.ast.stmnt(id).kind.clone() {
            StmntKind::FnCall { name, args } => (name, args),
            _ => unreachable!("sema_fn_call_stmnt on non-call"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;
        self.check_call(&name, &args, idx)
    }

    fn check_call(&mut self, name: &str, args: &[ExprId], idx: usize) -> CompileResult<Type> {
        let decl = self.symtab_find(name, idx)?;
        let f = match &self.ast.stmnt(decl).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => {
                return Err(self.diag(idx, format!("expected \"{}\" to be a function", name)));
            }
        };

        if f.args.len() != args.len() {
            return Err(self.diag(
                idx,
                format!(
                    "expected {} argument(s) in function call \"{}\", got {}",
                    f.args.len(),
                    name,
                    args.len()
                ),
            ));
        }

        for (i, (&formal, &actual)) in f.args.iter().zip(args.iter()).enumerate() {
            let mut formal_ty = self.type_of_decl(formal)?;
            self.sema_expr(actual)?;
            let mut actual_ty = self.resolve_expr_type(actual)?;

            if !self.tc_equals(&mut formal_ty, &mut actual_ty)? {
                return Err(self.diag(
                    idx,
                    format!(
                        "mismatch types, argument {} is expected to be of type {}, got {}",
                        i + 1,
                        self.type_str(&formal_ty),
                        self.type_str(&actual_ty)
                    ),
                ));
            }
            self.set_expr_type(actual, actual_ty);
            self.tc_number_within_bounds(&formal_ty, actual)?;
        }

        Ok(f.ty)
    }

    fn sema_unop(&mut self, id: ExprId) -> CompileResult<()> {
        let (op, val) = match self.ast.expr(id).kind.clone() {
            ExprKind::Unop { op, val } => (op, val),
            _ => unreachable!("sema_unop on non-unop"),
        };
        let idx = self.ast.expr(id).cursors_idx;

        self.sema_expr(val)?;

        match op {
            UnopKind::Address => {
                let target = match self.ast.expr(val).kind.clone() {
                    ExprKind::Ident(name) => name,
                    _ => {
                        return Err(self.diag(idx, "can only take the address of a variable"));
                    }
                };
                let decl = self.symtab_find(&target, self.ast.expr(val).cursors_idx)?;
                let pointee = self.type_of_decl(decl)?;
                let constant = self.stmnt_is_constant(decl)?;
                self.set_expr_type(
                    id,
                    Type::new(
                        TypeKind::Ptr {
                            to: Box::new(pointee),
                        },
                        constant,
                        idx,
                    ),
                );
            }
            UnopKind::Negate => {
                if self.tc_is_unsigned(val)? {
                    return Err(self.diag(idx, "cannot negate unsigned integers"));
                }
                let ty = self.resolve_expr_type(val)?;
                self.set_expr_type(id, ty);
            }
            UnopKind::Not => {
                let mut vt = self.resolve_expr_type(val)?;
                let mut bool_ty = Type::bool(0);
                if !self.tc_equals(&mut bool_ty, &mut vt)? {
                    return Err(self.diag(
                        idx,
                        format!(
                            "expected a boolean after '!' operator, got {}",
                            self.type_str(&vt)
                        ),
                    ));
                }
                self.set_expr_type(id, vt);
            }
            UnopKind::BitNot => {
                let vt = self.resolve_expr_type(val)?;
                if !crate::typecheck::tc_can_bitwise(&vt, &vt) {
                    return Err(self.diag(
                        idx,
                        format!("cannot do bitwise not (~) on {}", self.type_str(&vt)),
                    ));
                }
                self.set_expr_type(id, vt);
            }
        }

        Ok(())
    }

    fn sema_binop(&mut self, id: ExprId) -> CompileResult<()> {
        use crate::ast::BinopKind::*;
        use crate::typecheck::{
            tc_can_arithmetic, tc_can_bitwise, tc_can_compare_equality, tc_can_compare_order,
        };

        let (op, left, right) = match self.ast.expr(id).kind.clone() {
            ExprKind::Binop { op, left, right } => (op, left, right),
            _ => unreachable!("sema_binop on non-binop"),
        };
        let idx = self.ast.expr(id).cursors_idx;

        self.sema_expr(left)?;
        self.sema_expr(right)?;

        let mut lt = self.resolve_expr_type(left)?;
        let mut rt = self.resolve_expr_type(right)?;

        if !self.tc_equals(&mut lt, &mut rt)? {
            return Err(self.diag(
                idx,
                format!(
                    "mismatch types, {} {} {}",
                    self.type_str(&lt),
                    op.symbol(),
                    self.type_str(&rt)
                ),
            ));
        }
        self.set_expr_type(left, lt.clone());
        self.set_expr_type(right, rt.clone());

        match op {
            Equals | Inequals => {
                if !tc_can_compare_equality(&lt, &rt) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot compare equality of {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
            }
            Less | LessEqual | Greater | GreaterEqual => {
                if !tc_can_compare_order(&lt, &rt) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot compare order of {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
            }
            Plus | Minus | Multiply | Divide => {
                if !tc_can_arithmetic(&lt, &rt, false) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot perform arithmetic operations on {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
                let ty = arith_result_type(&lt, &rt);
                self.set_expr_type(id, ty);
            }
            Mod => {
                if !tc_can_arithmetic(&lt, &rt, true) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot perform modulo on {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
                let ty = arith_result_type(&lt, &rt);
                self.set_expr_type(id, ty);
            }
            And | Or => {
                if !matches!(lt.kind, TypeKind::Bool) && !matches!(rt.kind, TypeKind::Bool) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot use logical operations (and | or) on {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
            }
            BitAnd | BitOr | BitXor | LeftShift | RightShift => {
                if !tc_can_bitwise(&lt, &rt) {
                    return Err(self.diag(
                        idx,
                        format!(
                            "cannot use bitwise operations on {} and {}",
                            self.type_str(&lt),
                            self.type_str(&rt)
                        ),
                    ));
                }
                self.set_expr_type(id, lt);
            }
        }

        Ok(())
    }
}

/// Result type of an arithmetic binop: untyped literals defer to the
/// sized side.
fn arith_result_type(lt: &Type, rt: &Type) -> Type {
    let l_untyped = matches!(lt.kind, TypeKind::UntypedInt | TypeKind::UntypedFloat);
    let r_untyped = matches!(rt.kind, TypeKind::UntypedInt | TypeKind::UntypedFloat);
    if r_untyped || (l_untyped && r_untyped) {
        lt.clone()
    } else {
        rt.clone()
    }
}

/// Collect the nominal names referenced anywhere in a type tree.
fn collect_nominal_names(ty: &Type, out: &mut Vec<String>) {
    match &ty.kind {
        TypeKind::TypeDef(name) => out.push(name.clone()),
        TypeKind::Array { of, .. } => collect_nominal_names(of, out),
        TypeKind::Slice { of } => collect_nominal_names(of, out),
        TypeKind::Option { subtype, .. } => collect_nominal_names(subtype, out),
        TypeKind::Ptr { to } => collect_nominal_names(to, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyse_src(src: &str) -> (Ast, Dgraph) {
        let lexed = lex(src).unwrap();
        let mut ast = parse(&lexed).unwrap();
        let dgraph = analyse(&mut ast, &lexed.cursors).unwrap();
        (ast, dgraph)
    }

    fn analyse_err(src: &str) -> Diagnostic {
        let lexed = lex(src).unwrap();
        let mut ast = parse(&lexed).unwrap();
        analyse(&mut ast, &lexed.cursors).unwrap_err()
    }

    #[test]
    fn test_every_expression_is_typed() {
        let (ast, _) = analyse_src(
            "add :: fn(a: i32, b: i32) i32 { return a + b; }\n\
             main :: fn() void { x: i32 = add(1, 2); y := x + 1; }",
        );
        for expr in ast.exprs() {
            assert!(
                !expr.ty.is_none(),
                "expression left untyped: {:?}",
                expr.kind
            );
        }
    }

    #[test]
    fn test_undefined_name() {
        let err = analyse_err("main :: fn() void { x := missing; }");
        assert!(err.message.contains("use of undefined \"missing\""));
    }

    #[test]
    fn test_redeclaration() {
        let err = analyse_err("main :: fn() void { x := 1; x := 2; }");
        assert!(err.message.contains("redeclaration of \"x\""));
    }

    #[test]
    fn test_forward_reference_resolves() {
        analyse_src("main :: fn() void { helper(); }\nhelper :: fn() void { }");
    }

    #[test]
    fn test_untyped_literal_narrowing() {
        let (ast, _) = analyse_src("main :: fn() void { a: i32 = 42; b := a + 1; }");
        // b's declared type follows a's
        let main = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(main.body[1]).kind {
            StmntKind::VarDecl(v) => assert_eq!(v.ty.kind, TypeKind::I32),
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_untyped_default_is_i64() {
        let (ast, _) = analyse_src("main :: fn() void { x := 42; }");
        let main = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(main.body[0]).kind {
            StmntKind::VarDecl(v) => assert_eq!(v.ty.kind, TypeKind::I64),
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_overflow_rejected() {
        let err = analyse_err("main :: fn() void { x: u8 = 256; }");
        assert!(err.message.contains("cannot be represented in u8"));
    }

    #[test]
    fn test_u8_boundary_accepted() {
        analyse_src("main :: fn() void { x: u8 = 255; }");
    }

    #[test]
    fn test_signed_boundary() {
        analyse_src("main :: fn() void { x: i8 = 127; }");
        let err = analyse_err("main :: fn() void { x: i8 = 128; }");
        assert!(err.message.contains("cannot be represented in i8"));
    }

    #[test]
    fn test_negate_unsigned_rejected() {
        let err = analyse_err("main :: fn() void { x: u32 = 5; y := -x; }");
        assert!(err.message.contains("cannot negate unsigned integers"));
    }

    #[test]
    fn test_signedness_cross_rejected() {
        let err = analyse_err("main :: fn() void { x: u8 = 1; y: i32 = x; }");
        assert!(err.message.contains("mismatch types"));
    }

    #[test]
    fn test_widening_accepted_narrowing_rejected() {
        analyse_src("main :: fn() void { x: i8 = 1; y: i32 = x; }");
        let err = analyse_err("main :: fn() void { x: i32 = 1; y: i8 = x; }");
        assert!(err.message.contains("mismatch types"));
    }

    #[test]
    fn test_option_capture_types_binding() {
        let (ast, _) = analyse_src(
            "f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return -1; } }",
        );
        let f = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(f.body[0]).kind {
            StmntKind::If(iff) => match &iff.capture {
                Capture::Binding(decl) => match &ast.stmnt(*decl).kind {
                    StmntKind::ConstDecl(c) => {
                        assert_eq!(c.name, "v");
                        assert_eq!(c.ty.kind, TypeKind::I32);
                    }
                    other => panic!("expected const binding, got {:?}", other),
                },
                other => panic!("expected rewritten capture, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_not_visible_in_else() {
        let err = analyse_err(
            "f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return v; } }",
        );
        assert!(err.message.contains("use of undefined \"v\""));
    }

    #[test]
    fn test_option_accepts_null_and_bare_value() {
        let (ast, _) = analyse_src("main :: fn() void { x: ?i32 = null; y: ?i32 = 5; }");
        let main = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => panic!("expected fn"),
        };
        // the bare value was flagged for wrapping
        match &ast.stmnt(main.body[1]).kind {
            StmntKind::VarDecl(v) => {
                let vty = &ast.expr(v.value.unwrap()).ty;
                match &vty.kind {
                    TypeKind::Option {
                        gen_option,
                        subtype,
                        ..
                    } => {
                        assert!(*gen_option);
                        assert_eq!(subtype.kind, TypeKind::I32);
                    }
                    other => panic!("expected option, got {:?}", other),
                }
            }
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_option_void_rejected() {
        let err = analyse_err("main :: fn() void { x: ?void = null; }");
        assert!(err.message.contains("?void"));
    }

    #[test]
    fn test_const_ptr_to_mut_rejected() {
        let err = analyse_err(
            "main :: fn() void { x :: 5; p: ^i64 = &x; q: *i64 = p; }",
        );
        assert!(err.message.contains("mismatch types"));
    }

    #[test]
    fn test_mut_ptr_into_const_slot_accepted() {
        analyse_src("main :: fn() void { x := 5; p: *i64 = &x; q: ^i64 = p; }");
    }

    #[test]
    fn test_struct_cycle_rejected() {
        let err = analyse_err("A :: struct { b: B }\nB :: struct { a: A }");
        assert!(err.message.contains("cyclic dependency"));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let err = analyse_err("A :: struct { a: A }");
        assert!(err.message.contains("cyclic dependency"));
    }

    #[test]
    fn test_cycle_through_option_and_ptr_accepted() {
        let (_, dgraph) = analyse_src("A :: struct { next: ?A; prev: *A }");
        let node = dgraph.get("A").unwrap();
        assert_eq!(node.children, vec!["A".to_string()]);
    }

    #[test]
    fn test_dgraph_edges() {
        let (_, dgraph) = analyse_src(
            "Inner :: struct { x: i32 }\nOuter :: struct { inner: Inner }",
        );
        assert!(dgraph.get("Inner").is_some());
        let outer = dgraph.get("Outer").unwrap();
        assert_eq!(outer.children, vec!["Inner".to_string()]);
    }

    #[test]
    fn test_enum_auto_numbering() {
        let (ast, dgraph) = analyse_src("Color :: enum { Red; Green = 10; Blue; }");
        assert!(dgraph.get("Color").is_some());
        let e = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::EnumDecl(e) => e.clone(),
            _ => panic!("expected enum"),
        };
        let values: Vec<u64> = e
            .fields
            .iter()
            .map(|&f| match &ast.stmnt(f).kind {
                StmntKind::ConstDecl(c) => match &ast.expr(c.value.unwrap()).kind {
                    ExprKind::IntLit(n) => *n,
                    other => panic!("expected int value, got {:?}", other),
                },
                other => panic!("expected const field, got {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![0, 10, 11]);
    }

    #[test]
    fn test_main_must_return_void() {
        let err = analyse_err("main :: fn() i32 { return 0; }");
        assert!(err.message.contains("expected return type to be void"));
    }

    #[test]
    fn test_main_slice_argument() {
        analyse_src("main :: fn(args: []string) void { }");
        let err = analyse_err("main :: fn(args: i32) void { }");
        assert!(err.message.contains("[]string"));
    }

    #[test]
    fn test_return_outside_fn() {
        let err = analyse_err("return 5;");
        assert!(err.message.contains("illegal use of return"));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = analyse_err("main :: fn() void { break; }");
        assert!(err.message.contains("illegal use of break"));
    }

    #[test]
    fn test_duplicate_output_directive() {
        let err = analyse_err("#output \"a\";\n#output \"b\";\nmain :: fn() void { }");
        assert!(err.message.contains("output already set"));
    }

    #[test]
    fn test_duplicate_optimise_directive() {
        let err = analyse_err("#O2;\n#Osmall;\nmain :: fn() void { }");
        assert!(err.message.contains("optimisation already set"));
    }

    #[test]
    fn test_defer_rules() {
        analyse_src("f :: fn() void { }\nmain :: fn() void { defer f(); }");
        let err = analyse_err("main :: fn() void { defer return; }");
        assert!(err.message.contains("cannot defer a return"));
        let err = analyse_err("main :: fn() void { defer x := 5; }");
        assert!(err.message.contains("cannot defer a declaration"));
    }

    #[test]
    fn test_mutating_const_rejected() {
        let err = analyse_err("main :: fn() void { x :: 5; x = 6; }");
        assert!(err.message.contains("cannot mutate constant variable"));
    }

    #[test]
    fn test_call_arity_and_types() {
        let err = analyse_err(
            "f :: fn(x: i32) void { }\nmain :: fn() void { f(); }",
        );
        assert!(err.message.contains("expected 1 argument(s)"));

        let err = analyse_err(
            "f :: fn(x: i32) void { }\nmain :: fn() void { f(\"no\"); }",
        );
        assert!(err.message.contains("argument 1"));
    }

    #[test]
    fn test_array_literal_length_checked() {
        analyse_src("main :: fn() void { a: [3]i32 = [3]i32{1, 2, 3}; }");
        let err = analyse_err("main :: fn() void { a: [3]i32 = [3]i32{1, 2}; }");
        assert!(err.message.contains("array length 3, literal length 2"));
    }

    #[test]
    fn test_array_length_inference() {
        let (ast, _) = analyse_src("main :: fn() void { a := [_]i32{1, 2, 3}; }");
        let main = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(main.body[0]).kind {
            StmntKind::VarDecl(v) => match &v.ty.kind {
                TypeKind::Array { len, .. } => {
                    let len = len.expect("length inferred");
                    assert_eq!(ast.expr(len).kind, ExprKind::IntLit(3));
                }
                other => panic!("expected array, got {:?}", other),
            },
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_uninitialised_inferred_array_rejected() {
        let err = analyse_err("main :: fn() void { a: [_]i32; }");
        assert!(err.message.contains("cannot infer array length"));
    }

    #[test]
    fn test_struct_literal_checking() {
        analyse_src(
            "Vec2 :: struct { x: f32; y: f32; }\n\
             main :: fn() void { v := Vec2{.x = 1.0, .y = 2.0}; w := Vec2{1.0, 2.0}; }",
        );
        let err = analyse_err(
            "Vec2 :: struct { x: f32; y: f32; }\n\
             main :: fn() void { v := Vec2{.x = 1.0, .z = 2.0}; }",
        );
        assert!(err.message.contains("does not have field \"z\""));
    }

    #[test]
    fn test_struct_default_values_rejected() {
        let err = analyse_err("S :: struct { x: i32 = 5; }");
        assert!(err.message.contains("cannot have default values"));
    }

    #[test]
    fn test_enum_member_access() {
        analyse_src(
            "Color :: enum { Red; Green; }\n\
             main :: fn() void { c := Color.Red; }",
        );
        let err = analyse_err(
            "Color :: enum { Red; }\nmain :: fn() void { c := Color.Purple; }",
        );
        assert!(err.message.contains("does not have field \"Purple\""));
    }

    #[test]
    fn test_field_access_through_pointer() {
        analyse_src(
            "Vec2 :: struct { x: f32; y: f32; }\n\
             f :: fn(v: *Vec2) f32 { return v.x; }",
        );
    }

    #[test]
    fn test_condition_must_be_bool_or_option() {
        let err = analyse_err("main :: fn() void { if (42) { } }");
        assert!(err.message.contains("condition must be bool or option"));
    }

    #[test]
    fn test_string_and_slice_builtin_fields() {
        analyse_src(
            "main :: fn(args: []string) void { n: usize = args.len; s := args[0]; m: usize = s.len; }",
        );
    }
}
