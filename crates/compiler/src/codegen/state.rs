//! Core generator state: output buffers, defer stack, compile flags.

use std::collections::HashSet;

use crate::ast::{Ast, OptFlag, StmntId};
use crate::error::{Cursor, Diagnostic};
use crate::sema::Dgraph;

/// Optimisation level handed to the external C compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
    #[default]
    Debug,
    Fast,
    Small,
}

impl OptLevel {
    pub fn from_flag(flag: OptFlag) -> Self {
        match flag {
            OptFlag::O0 => OptLevel::O0,
            OptFlag::O1 => OptLevel::O1,
            OptFlag::O2 => OptLevel::O2,
            OptFlag::O3 => OptLevel::O3,
            OptFlag::Odebug => OptLevel::Debug,
            OptFlag::Ofast => OptLevel::Fast,
            OptFlag::Osmall => OptLevel::Small,
        }
    }

    /// Arguments for the C compiler command line.
    pub fn cc_args(&self) -> &'static [&'static str] {
        match self {
            OptLevel::O0 => &["-O0"],
            OptLevel::O1 => &["-O1"],
            OptLevel::O2 => &["-O2"],
            OptLevel::O3 => &["-O3"],
            OptLevel::Debug => &["-Og", "-g"],
            // Kept at -O3 rather than -Ofast.
            OptLevel::Fast => &["-O3"],
            OptLevel::Small => &["-Os"],
        }
    }
}

/// Build options collected from source directives during generation.
#[derive(Debug, Clone, Default)]
pub struct CompileFlags {
    pub optimisation: OptLevel,
    /// Extra C compiler arguments from `#link` / `#syslink`.
    pub links: Vec<String>,
    /// Output executable name from `#output`, empty if unset.
    pub output: String,
}

/// Deferred statement tagged with the block depth it was pushed at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Defer {
    pub stmnt: StmntId,
    pub depth: usize,
}

pub struct CodeGen<'a> {
    pub(crate) ast: &'a Ast,
    pub(crate) cursors: &'a [Cursor],
    pub(crate) dgraph: &'a Dgraph,

    /// Header buffer (`output.h`).
    pub(crate) defs: String,
    /// Translation unit buffer (`output.c`).
    pub(crate) code: String,

    pub(crate) indent: usize,
    pub(crate) defers: Vec<Defer>,

    /// When set, the write helpers target `defs` instead of `code`.
    pub(crate) in_defs: bool,
    /// Insertion points for generic instantiations and forward
    /// typedefs, kept just before the declaration being emitted.
    pub(crate) def_loc: usize,
    pub(crate) code_loc: usize,

    /// Interned instantiation keys; each `Def`/`Imp` pair and forward
    /// typedef is emitted at most once.
    pub(crate) generated: HashSet<String>,

    pub(crate) flags: CompileFlags,
}

impl<'a> CodeGen<'a> {
    pub fn new(ast: &'a Ast, cursors: &'a [Cursor], dgraph: &'a Dgraph) -> Self {
        CodeGen {
            ast,
            cursors,
            dgraph,
            defs: String::new(),
            code: String::new(),
            indent: 0,
            defers: Vec::new(),
            in_defs: false,
            def_loc: 0,
            code_loc: 0,
            generated: HashSet::new(),
            flags: CompileFlags::default(),
        }
    }

    pub(crate) fn diag(&self, idx: usize, message: impl Into<String>) -> Diagnostic {
        let cursor = self
            .cursors
            .get(idx)
            .copied()
            .or_else(|| self.cursors.last().copied())
            .unwrap_or_default();
        Diagnostic::new(cursor, message)
    }

    pub(crate) fn write(&mut self, text: &str) {
        if self.in_defs {
            self.defs.push_str(text);
        } else {
            self.code.push_str(text);
        }
    }

    pub(crate) fn writeln(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    pub(crate) fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.write("    ");
        }
    }

    /// Insert into the header at the current insertion point.
    pub(crate) fn insert_def(&mut self, text: &str) {
        self.defs.insert_str(self.def_loc, text);
        self.def_loc += text.len();
    }

    /// Insert into the translation unit at the current insertion point.
    pub(crate) fn insert_code(&mut self, text: &str) {
        self.code.insert_str(self.code_loc, text);
        self.code_loc += text.len();
    }

    pub(crate) fn push_defer(&mut self, stmnt: StmntId) {
        self.defers.push(Defer {
            stmnt,
            depth: self.indent,
        });
    }

    /// Defers owned by the current block depth, innermost first.
    pub(crate) fn scope_defers(&self) -> Vec<StmntId> {
        self.defers
            .iter()
            .rev()
            .filter(|d| d.depth == self.indent)
            .map(|d| d.stmnt)
            .collect()
    }

    /// Every pending defer, innermost first. Used by `return`.
    pub(crate) fn all_defers(&self) -> Vec<StmntId> {
        self.defers.iter().rev().map(|d| d.stmnt).collect()
    }

    pub(crate) fn pop_scope_defers(&mut self) {
        let depth = self.indent;
        self.defers.retain(|d| d.depth != depth);
    }
}
