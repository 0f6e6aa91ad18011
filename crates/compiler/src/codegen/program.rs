//! Whole-program emission.
//!
//! The top-level walk records directives, prints prototypes into the
//! header and bodies into the translation unit, and defers struct and
//! enum definitions until the end, where they are emitted in
//! dependency post-order so every definition follows the definitions
//! of its value prerequisites.

use std::collections::HashSet;

use super::prelude::PRELUDE;
use super::state::{CodeGen, CompileFlags};
use crate::ast::{Ast, FnDecl, StmntId, StmntKind};
use crate::error::{CompileResult, Cursor};
use crate::sema::Dgraph;

/// The generated translation unit plus collected build flags.
#[derive(Debug, Clone)]
pub struct COutput {
    /// Contents of `output.h`.
    pub defs: String,
    /// Contents of `output.c`.
    pub code: String,
    pub flags: CompileFlags,
}

/// Generate C for an analysed program.
pub fn generate(ast: &Ast, cursors: &[Cursor], dgraph: &Dgraph) -> CompileResult<COutput> {
    let mut cg = CodeGen::new(ast, cursors, dgraph);

    cg.defs.push_str(PRELUDE);
    cg.code.push_str("#include \"output.h\"\n");
    cg.def_loc = cg.defs.len();
    cg.code_loc = cg.code.len();

    for &id in &ast.top {
        match &ast.stmnt(id).kind {
            StmntKind::Directive(d) => cg.record_directive(d),
            StmntKind::Extern(inner) => cg.gen_extern(*inner)?,
            StmntKind::FnDecl(_) => cg.gen_fn_decl(id)?,
            StmntKind::StructDecl(_) | StmntKind::EnumDecl(_) => {}
            StmntKind::VarDecl(_) => cg.gen_var_decl(id)?,
            StmntKind::ConstDecl(_) => cg.gen_const_decl(id)?,
            StmntKind::VarReassign(_) => cg.gen_var_reassign(id)?,
            other => unreachable!("top-level statement survived analysis: {:?}", other),
        }
    }

    cg.resolve_defs()?;
    cg.defs.push_str("#endif // CURRENT_DEFS_H\n");

    Ok(COutput {
        defs: cg.defs,
        code: cg.code,
        flags: cg.flags,
    })
}

impl<'a> CodeGen<'a> {
    /// Prototype into the header, body into the translation unit.
    /// `main` gets the C entry-point treatment.
    pub(crate) fn gen_fn_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let f = match &self.ast.stmnt(id).kind {
            StmntKind::FnDecl(f) => f.clone(),
            _ => unreachable!("gen_fn_decl on non-fn"),
        };

        // Instantiations this declaration needs are inserted right
        // before its prototype and body.
        self.def_loc = self.defs.len();
        self.code_loc = self.code.len();

        if f.name == "main" {
            return self.gen_fn_main_decl(&f);
        }

        let ret = self.c_type(&f.ty)?;
        let mut sig = format!("{} {}(", ret, f.name);
        for (i, &arg) in f.args.iter().enumerate() {
            let (name, ty) = match &self.ast.stmnt(arg).kind {
                StmntKind::ConstDecl(c) => (c.name.clone(), c.ty.clone()),
                StmntKind::VarDecl(v) => (v.name.clone(), v.ty.clone()),
                _ => unreachable!("fn args are declarations"),
            };
            let arg_ty = self.c_type(&ty)?;
            if i > 0 {
                sig.push_str(", ");
            }
            sig.push_str(&format!("{} {}", arg_ty, name));
        }
        sig.push(')');

        self.in_defs = true;
        self.writeln(&format!("{};", sig));
        self.in_defs = false;

        if f.has_body {
            self.write(&format!("{} ", sig));
            self.gen_block(&f.body)?;
        }
        Ok(())
    }

    /// `main` is renamed to the standard C signature; a single slice
    /// parameter receives a stack-backed view over argv.
    fn gen_fn_main_decl(&mut self, f: &FnDecl) -> CompileResult<()> {
        self.writeln("int main(int argc, const char **argv) {");
        self.indent += 1;

        if let Some(&arg) = f.args.first() {
            let c = match &self.ast.stmnt(arg).kind {
                StmntKind::ConstDecl(c) => c.clone(),
                _ => unreachable!("main argument is a const decl"),
            };
            self.ensure_generic(&c.ty)?;

            self.write_indent();
            self.writeln("CurString _CUR_ARGS_[argc];");
            self.write_indent();
            self.writeln("for (int i = 0; i < argc; i++) {");
            self.write_indent();
            self.writeln("    _CUR_ARGS_[i] = curstr(argv[i]);");
            self.write_indent();
            self.writeln("}");
            self.write_indent();
            self.writeln(&format!(
                "CurSlice_CurString {} = curslice_CurString(_CUR_ARGS_, argc);",
                c.name
            ));
        }

        self.write_indent();
        self.gen_block(&f.body)?;

        self.indent -= 1;
        self.writeln("}");
        Ok(())
    }

    /// Emit deferred struct/enum definitions in dependency post-order.
    /// A visited set keeps option/pointer back-edges from recursing.
    pub(crate) fn resolve_defs(&mut self) -> CompileResult<()> {
        let names: Vec<String> = self.dgraph.iter().map(|n| n.name.clone()).collect();
        let mut done = HashSet::new();
        for name in names {
            self.resolve_def(&name, &mut done)?;
        }
        Ok(())
    }

    fn resolve_def(&mut self, name: &str, done: &mut HashSet<String>) -> CompileResult<()> {
        if !done.insert(name.to_string()) {
            return Ok(());
        }
        let node = match self.dgraph.get(name) {
            Some(node) => node.clone(),
            None => return Ok(()),
        };

        for child in &node.children {
            self.resolve_def(child, done)?;
        }

        match &self.ast.stmnt(node.stmnt).kind {
            StmntKind::StructDecl(_) => self.gen_struct_decl(node.stmnt),
            StmntKind::EnumDecl(_) => self.gen_enum_decl(node.stmnt),
            _ => Ok(()),
        }
    }

    fn gen_struct_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let s = match &self.ast.stmnt(id).kind {
            StmntKind::StructDecl(s) => s.clone(),
            _ => unreachable!("gen_struct_decl on non-struct"),
        };

        let key = format!("struct {}", s.name);
        if !self.generated.insert(key) {
            return Ok(());
        }

        self.def_loc = self.defs.len();
        self.in_defs = true;

        self.writeln(&format!("struct {} {{", s.name));
        self.indent += 1;
        for &field in &s.fields {
            let v = match &self.ast.stmnt(field).kind {
                StmntKind::VarDecl(v) => v.clone(),
                _ => unreachable!("struct fields are var decls"),
            };
            let ty = self.c_type(&v.ty)?;
            self.write_indent();
            self.writeln(&format!("{} {};", ty, v.name));
        }
        self.indent -= 1;
        self.writeln("};");

        self.in_defs = false;
        Ok(())
    }

    fn gen_enum_decl(&mut self, id: StmntId) -> CompileResult<()> {
        let e = match &self.ast.stmnt(id).kind {
            StmntKind::EnumDecl(e) => e.clone(),
            _ => unreachable!("gen_enum_decl on non-enum"),
        };

        let key = format!("enum {}", e.name);
        if !self.generated.insert(key) {
            return Ok(());
        }

        self.def_loc = self.defs.len();
        self.in_defs = true;

        self.writeln(&format!("enum {} {{", e.name));
        self.indent += 1;
        for &field in &e.fields {
            let c = match &self.ast.stmnt(field).kind {
                StmntKind::ConstDecl(c) => c.clone(),
                _ => unreachable!("enum fields are const decls"),
            };
            let value = match c.value {
                Some(value) => self.gen_expr(value)?,
                None => unreachable!("enum fields are numbered during analysis"),
            };
            self.write_indent();
            self.writeln(&format!("{}_{} = {},", e.name, c.name, value));
        }
        self.indent -= 1;
        self.writeln("};");

        self.in_defs = false;
        Ok(())
    }
}
