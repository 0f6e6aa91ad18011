//! Statement lowering.
//!
//! `defer` is never emitted in place: it is pushed with the current
//! block depth and replayed in reverse push order before `return`
//! (all of them), before `break`/`continue` (same depth only), and on
//! falling out of the owning block.

use super::CodeGen;
use crate::ast::{Capture, Directive, Literal, StmntId, StmntKind};
use crate::codegen::state::OptLevel;
use crate::error::CompileResult;
use crate::types::TypeKind;

impl<'a> CodeGen<'a> {
    pub(crate) fn gen_stmnt(&mut self, id: StmntId) -> CompileResult<()> {
        match self.ast.stmnt(id).kind.clone() {
            StmntKind::Directive(d) => {
                self.record_directive(&d);
                Ok(())
            }
            StmntKind::Extern(inner) => self.gen_extern(inner),
            StmntKind::Defer(inner) => {
                self.push_defer(inner);
                Ok(())
            }
            StmntKind::Block(body) => {
                self.write_indent();
                self.gen_block(&body)
            }
            StmntKind::FnDecl(_) => self.gen_fn_decl(id),
            // Definitions are resolved later in dependency order.
            StmntKind::StructDecl(_) | StmntKind::EnumDecl(_) => Ok(()),
            StmntKind::VarDecl(_) => self.gen_var_decl(id),
            StmntKind::ConstDecl(_) => self.gen_const_decl(id),
            StmntKind::VarReassign(_) => self.gen_var_reassign(id),
            StmntKind::Return { .. } => self.gen_return(id),
            StmntKind::Continue => {
                self.replay_scope_defers()?;
                self.write_indent();
                self.writeln("continue;");
                Ok(())
            }
            StmntKind::Break => {
                self.replay_scope_defers()?;
                self.write_indent();
                self.writeln("break;");
                Ok(())
            }
            StmntKind::FnCall { name, args } => {
                let call = self.gen_call(&name, &args)?;
                self.write_indent();
                self.writeln(&format!("{};", call));
                Ok(())
            }
            StmntKind::If(_) => self.gen_if(id),
            StmntKind::For(_) => self.gen_for(id),
        }
    }

    pub(crate) fn gen_block(&mut self, body: &[StmntId]) -> CompileResult<()> {
        self.writeln("{");
        self.indent += 1;

        for &id in body {
            self.gen_stmnt(id)?;
        }

        self.replay_scope_defers()?;
        self.pop_scope_defers();

        self.indent -= 1;
        self.write_indent();
        self.writeln("}");
        Ok(())
    }

    fn replay_scope_defers(&mut self) -> CompileResult<()> {
        for stmnt in self.scope_defers() {
            self.gen_stmnt(stmnt)?;
        }
        Ok(())
    }

    fn replay_all_defers(&mut self) -> CompileResult<()> {
        for stmnt in self.all_defers() {
            self.gen_stmnt(stmnt)?;
        }
        Ok(())
    }

    pub(crate) fn record_directive(&mut self, directive: &Directive) {
        match directive {
            Directive::Link(path) => self.flags.links.push(path.clone()),
            Directive::Syslink(name) => self.flags.links.push(format!("-l{}", name)),
            Directive::Output(name) => self.flags.output = name.clone(),
            Directive::Opt(flag) => self.flags.optimisation = OptLevel::from_flag(*flag),
        }
    }

    pub(crate) fn gen_extern(&mut self, inner: StmntId) -> CompileResult<()> {
        match &self.ast.stmnt(inner).kind {
            StmntKind::FnDecl(_) => self.gen_fn_decl(inner),
            StmntKind::VarDecl(_) => self.gen_var_decl(inner),
            StmntKind::ConstDecl(_) => self.gen_const_decl(inner),
            StmntKind::VarReassign(_) => self.gen_var_reassign(inner),
            _ => Ok(()),
        }
    }

    pub(crate) fn gen_var_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let v = match &self.ast.stmnt(id).kind {
            StmntKind::VarDecl(v) => v.clone(),
            _ => unreachable!("gen_var_decl on non-var"),
        };
        let idx = self.ast.stmnt(id).cursors_idx;

        self.write_indent();
        let ty = self.c_type(&v.ty)?;

        match v.value {
            None => {
                if matches!(v.ty.kind, TypeKind::Array { .. }) {
                    // Arrays are backed by their constructor even when
                    // no initialiser was written.
                    let init =
                        self.gen_array_literal(&Literal::Positional(Vec::new()), &v.ty, idx)?;
                    self.writeln(&format!("{} {} = {};", ty, v.name, init));
                } else {
                    self.writeln(&format!("{} {};", ty, v.name));
                }
            }
            Some(value) => {
                let value = self.gen_expr(value)?;
                self.writeln(&format!("{} {} = {};", ty, v.name, value));
            }
        }
        Ok(())
    }

    pub(crate) fn gen_const_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let c = match &self.ast.stmnt(id).kind {
            StmntKind::ConstDecl(c) => c.clone(),
            _ => unreachable!("gen_const_decl on non-const"),
        };

        self.write_indent();
        let ty = self.c_type(&c.ty)?;
        let value = match c.value {
            Some(value) => self.gen_expr(value)?,
            None => {
                return Err(self.diag(
                    self.ast.stmnt(id).cursors_idx,
                    "constant declaration without a value",
                ));
            }
        };
        self.writeln(&format!("{} {} = {};", ty, c.name, value));
        Ok(())
    }

    pub(crate) fn gen_var_reassign(&mut self, id: StmntId) -> CompileResult<()> {
        let re = match &self.ast.stmnt(id).kind {
            StmntKind::VarReassign(r) => r.clone(),
            _ => unreachable!("gen_var_reassign on non-reassign"),
        };

        let target = self.gen_expr(re.target)?;
        let value = self.gen_expr(re.value)?;
        self.write_indent();
        self.writeln(&format!("{} = {};", target, value));
        Ok(())
    }

    fn gen_return(&mut self, id: StmntId) -> CompileResult<()> {
        let value = match &self.ast.stmnt(id).kind {
            StmntKind::Return { value, .. } => *value,
            _ => unreachable!("gen_return on non-return"),
        };

        self.replay_all_defers()?;

        self.write_indent();
        match value {
            None => self.writeln("return;"),
            Some(value) => {
                let value = self.gen_expr(value)?;
                self.writeln(&format!("return {};", value));
            }
        }
        Ok(())
    }

    fn gen_if(&mut self, id: StmntId) -> CompileResult<()> {
        let iff = match &self.ast.stmnt(id).kind {
            StmntKind::If(i) => i.clone(),
            _ => unreachable!("gen_if on non-if"),
        };

        let cond = self.gen_expr(iff.cond)?;

        match iff.capture {
            Capture::None => {
                // An uncaptured option condition tests presence.
                let is_option = matches!(
                    self.ast.expr(iff.cond).ty.kind,
                    crate::types::TypeKind::Option { .. }
                );
                let cond = if is_option {
                    format!("{}.ok", cond)
                } else {
                    cond
                };

                self.write_indent();
                self.write(&format!("if ({}) ", cond));
                self.gen_block(&iff.body)?;
                self.write_indent();
                self.write("else ");
                self.gen_block(&iff.els)
            }
            Capture::Binding(decl) => {
                // The captured binding lives in a scope of its own,
                // assigned from `.some` and guarded on `.ok`.
                let c = match &self.ast.stmnt(decl).kind {
                    StmntKind::ConstDecl(c) => c.clone(),
                    _ => unreachable!("capture binding is a const decl"),
                };

                self.write_indent();
                self.writeln("{");
                self.indent += 1;

                let ty = self.c_type(&c.ty)?;
                self.write_indent();
                self.writeln(&format!("{} {} = {}.some;", ty, c.name, cond));

                self.write_indent();
                self.write(&format!("if ({}.ok) ", cond));
                self.gen_block(&iff.body)?;
                self.write_indent();
                self.write("else ");
                self.gen_block(&iff.els)?;

                self.indent -= 1;
                self.write_indent();
                self.writeln("}");
                Ok(())
            }
            Capture::Ident { .. } => {
                unreachable!("captures are rewritten during analysis")
            }
        }
    }

    fn gen_for(&mut self, id: StmntId) -> CompileResult<()> {
        let forf = match &self.ast.stmnt(id).kind {
            StmntKind::For(f) => f.clone(),
            _ => unreachable!("gen_for on non-for"),
        };

        // The loop variable lives in a scope wrapping the C for.
        self.write_indent();
        self.writeln("{");
        self.indent += 1;

        self.gen_var_decl(forf.init)?;

        let cond = self.gen_expr(forf.cond)?;
        let step = match forf.step {
            Some(step) => {
                let re = match &self.ast.stmnt(step).kind {
                    StmntKind::VarReassign(r) => r.clone(),
                    _ => unreachable!("for step is a reassignment"),
                };
                let target = self.gen_expr(re.target)?;
                let value = self.gen_expr(re.value)?;
                format!("{} = {}", target, value)
            }
            None => String::new(),
        };

        self.write_indent();
        self.write(&format!("for (; {}; {}) ", cond, step));
        self.gen_block(&forf.body)?;

        self.indent -= 1;
        self.write_indent();
        self.writeln("}");
        Ok(())
    }
}
