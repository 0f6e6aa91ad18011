//! Abstract syntax tree for Cur.
//!
//! Nodes live in an arena owned by [`Ast`]; statements and expressions
//! refer to their children through [`StmntId`] / [`ExprId`] indices
//! instead of owning pointers. The parser appends nodes, the semantic
//! pass mutates them in place (type slots, capture rewrites, inferred
//! array lengths) and the code generator reads them back out.

use crate::types::{Type, TypeKind};

/// Index of an expression in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Index of a statement in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmntId(u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Resolved type; `TypeKind::None` until the semantic pass fills it.
    pub ty: Type,
    /// Index into the cursor stream of the token that started this node.
    pub cursors_idx: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(u64),
    FloatLit(f64),
    CharLit(u8),
    /// Body kept verbatim, escapes included, for re-emission into C.
    StrLit(String),
    CstrLit(String),
    True,
    False,
    Null,
    Ident(String),
    /// Compound literal `{..}`, `T{..}` or `[N]T{..}`; the target type
    /// lives in `Expr::ty`.
    Literal(Literal),
    FnCall {
        name: String,
        args: Vec<ExprId>,
    },
    Binop {
        op: BinopKind,
        left: ExprId,
        right: ExprId,
    },
    Unop {
        op: UnopKind,
        val: ExprId,
    },
    Group(ExprId),
    /// `base.field`, enum access, or `base.&` when `deref` is set.
    FieldAccess {
        base: ExprId,
        field: Option<ExprId>,
        deref: bool,
    },
    ArrayIndex {
        base: ExprId,
        index: ExprId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{a, b, c}`
    Positional(Vec<ExprId>),
    /// `{.x = a, .y = b}`
    Named(Vec<NamedField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedField {
    pub name: String,
    pub value: ExprId,
    pub cursors_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinopKind {
    Plus,
    Minus,
    Multiply,
    Divide,
    Mod,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equals,
    Inequals,
    BitAnd,
    BitOr,
    BitXor,
    LeftShift,
    RightShift,
    And,
    Or,
}

impl BinopKind {
    /// The operator's source spelling, for diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinopKind::Plus => "+",
            BinopKind::Minus => "-",
            BinopKind::Multiply => "*",
            BinopKind::Divide => "/",
            BinopKind::Mod => "%",
            BinopKind::Less => "<",
            BinopKind::LessEqual => "<=",
            BinopKind::Greater => ">",
            BinopKind::GreaterEqual => ">=",
            BinopKind::Equals => "==",
            BinopKind::Inequals => "!=",
            BinopKind::BitAnd => "&",
            BinopKind::BitOr => "|",
            BinopKind::BitXor => "^",
            BinopKind::LeftShift => "<<",
            BinopKind::RightShift => ">>",
            BinopKind::And => "and",
            BinopKind::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnopKind {
    Not,
    Negate,
    Address,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmnt {
    pub kind: StmntKind,
    pub cursors_idx: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmntKind {
    FnDecl(FnDecl),
    StructDecl(StructDecl),
    EnumDecl(EnumDecl),
    VarDecl(VarDecl),
    VarReassign(VarReassign),
    ConstDecl(ConstDecl),
    Return {
        value: Option<ExprId>,
        ty: Type,
    },
    Continue,
    Break,
    FnCall {
        name: String,
        args: Vec<ExprId>,
    },
    If(If),
    For(For),
    Block(Vec<StmntId>),
    Extern(StmntId),
    Defer(StmntId),
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    /// Return type.
    pub ty: Type,
    /// Formal parameters, each a `ConstDecl` without a value.
    pub args: Vec<StmntId>,
    pub body: Vec<StmntId>,
    pub has_body: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    /// Each field is a `VarDecl` without a default value.
    pub fields: Vec<StmntId>,
}

/// Enum declarations share the struct shape; fields are `ConstDecl`s.
pub type EnumDecl = StructDecl;

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub value: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Type,
    pub value: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarReassign {
    /// Assignment target: identifier, field access or array index.
    pub target: ExprId,
    /// Declared type of the target, filled by the semantic pass.
    pub ty: Type,
    pub value: ExprId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub cond: ExprId,
    pub capture: Capture,
    pub body: Vec<StmntId>,
    pub els: Vec<StmntId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    None,
    /// `[name]` as parsed.
    Ident { name: String, cursors_idx: usize },
    /// Rewritten by the semantic pass into an implicit const binding.
    Binding(StmntId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub init: StmntId,
    pub cond: ExprId,
    pub step: Option<StmntId>,
    pub body: Vec<StmntId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Link(String),
    Syslink(String),
    Output(String),
    Opt(OptFlag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptFlag {
    O0,
    O1,
    O2,
    O3,
    Odebug,
    Ofast,
    Osmall,
}

/// The node arena plus the ordered list of top-level statements.
#[derive(Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmnts: Vec<Stmnt>,
    pub top: Vec<StmntId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn push_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn push_stmnt(&mut self, stmnt: Stmnt) -> StmntId {
        let id = StmntId(self.stmnts.len() as u32);
        self.stmnts.push(stmnt);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn stmnt(&self, id: StmntId) -> &Stmnt {
        &self.stmnts[id.0 as usize]
    }

    pub fn stmnt_mut(&mut self, id: StmntId) -> &mut Stmnt {
        &mut self.stmnts[id.0 as usize]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.exprs.iter()
    }

    pub fn stmnts(&self) -> impl Iterator<Item = &Stmnt> {
        self.stmnts.iter()
    }

    /// Name introduced by a declaration statement, if it is one.
    pub fn decl_name(&self, id: StmntId) -> Option<&str> {
        match &self.stmnt(id).kind {
            StmntKind::FnDecl(f) => Some(&f.name),
            StmntKind::VarDecl(v) => Some(&v.name),
            StmntKind::ConstDecl(c) => Some(&c.name),
            StmntKind::StructDecl(s) => Some(&s.name),
            StmntKind::EnumDecl(e) => Some(&e.name),
            _ => None,
        }
    }

    /// Search the top-level statements for a declaration of `name`,
    /// looking through `extern` wrappers. Forward references resolve
    /// through this.
    pub fn find_decl(&self, name: &str) -> Option<StmntId> {
        for &id in &self.top {
            let target = match &self.stmnt(id).kind {
                StmntKind::Extern(inner) => *inner,
                _ => id,
            };
            if self.decl_name(target) == Some(name) {
                return Some(target);
            }
        }
        None
    }

    /// Render a type for diagnostics, resolving literal array lengths.
    pub fn type_to_string(&self, ty: &Type) -> String {
        match &ty.kind {
            TypeKind::Array { of, len } => {
                let len_str = match len {
                    Some(id) => match &self.expr(*id).kind {
                        ExprKind::IntLit(n) => n.to_string(),
                        _ => "..".to_string(),
                    },
                    None => "_".to_string(),
                };
                format!("[{}]{}", len_str, self.type_to_string(of))
            }
            TypeKind::Slice { of } => format!("[]{}", self.type_to_string(of)),
            TypeKind::Option { subtype, .. } => format!("?{}", self.type_to_string(subtype)),
            TypeKind::Ptr { to } => {
                let prefix = if ty.constant { "^" } else { "*" };
                format!("{}{}", prefix, self.type_to_string(to))
            }
            TypeKind::TypeDef(name) => name.clone(),
            _ => ty.scalar_name().unwrap_or("<unknown>").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_round_trip() {
        let mut ast = Ast::new();
        let e = ast.push_expr(Expr {
            kind: ExprKind::IntLit(7),
            ty: Type::new(TypeKind::UntypedInt, true, 0),
            cursors_idx: 0,
        });
        assert_eq!(ast.expr(e).kind, ExprKind::IntLit(7));

        ast.expr_mut(e).ty = Type::new(TypeKind::I32, true, 0);
        assert_eq!(ast.expr(e).ty.kind, TypeKind::I32);
    }

    #[test]
    fn test_find_decl_through_extern() {
        let mut ast = Ast::new();
        let decl = ast.push_stmnt(Stmnt {
            kind: StmntKind::FnDecl(FnDecl {
                name: "puts".to_string(),
                ty: Type::new(TypeKind::Void, false, 0),
                args: vec![],
                body: vec![],
                has_body: false,
            }),
            cursors_idx: 0,
        });
        let wrapper = ast.push_stmnt(Stmnt {
            kind: StmntKind::Extern(decl),
            cursors_idx: 0,
        });
        ast.top.push(wrapper);

        assert_eq!(ast.find_decl("puts"), Some(decl));
        assert_eq!(ast.find_decl("missing"), None);
    }

    #[test]
    fn test_type_to_string_shapes() {
        let mut ast = Ast::new();
        let len = ast.push_expr(Expr {
            kind: ExprKind::IntLit(3),
            ty: Type::new(TypeKind::Usize, true, 0),
            cursors_idx: 0,
        });
        let arr = Type::new(
            TypeKind::Array {
                of: Box::new(Type::new(TypeKind::I32, false, 0)),
                len: Some(len),
            },
            false,
            0,
        );
        assert_eq!(ast.type_to_string(&arr), "[3]i32");

        let opt = Type::new(
            TypeKind::Option {
                subtype: Box::new(Type::new(TypeKind::String, false, 0)),
                is_null: false,
                gen_option: false,
            },
            false,
            0,
        );
        assert_eq!(ast.type_to_string(&opt), "?string");

        let cptr = Type::new(
            TypeKind::Ptr {
                to: Box::new(Type::new(TypeKind::U8, false, 0)),
            },
            true,
            0,
        );
        assert_eq!(ast.type_to_string(&cptr), "^u8");
    }
}
