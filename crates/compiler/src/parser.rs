//! Recursive-descent parser for Cur.
//!
//! Consumes the token stream with one- and two-token lookahead and
//! builds nodes into the [`Ast`] arena. Every node records the cursor
//! index of the token that introduced it so later stages can anchor
//! diagnostics.
//!
//! Declarations follow the `name : Type? (: value | = value | ;)` shape:
//! `::` introduces a constant (and functions, structs and enums hang off
//! constant declarations), `:=` a variable, a bare `: Type;` an
//! uninitialised variable. Compound assignments desugar here into plain
//! reassignments with a binary expression value.

use crate::ast::{
    Ast, BinopKind, Capture, ConstDecl, Directive, Expr, ExprId, ExprKind, FnDecl, For, If,
    Literal, NamedField, OptFlag, Stmnt, StmntId, StmntKind, StructDecl, UnopKind, VarDecl,
    VarReassign,
};
use crate::error::{CompileResult, Cursor, Diagnostic};
use crate::keywords::Keyword;
use crate::lexer::{Lexed, Token};
use crate::types::{Type, TypeKind};

/// What an identifier token turns out to be.
enum IdentClass {
    Keyword(Keyword),
    TypeName,
    Plain,
}

fn classify(name: &str) -> IdentClass {
    if let Some(kw) = Keyword::from_str(name) {
        IdentClass::Keyword(kw)
    } else if Type::kind_from_name(name).is_some() {
        IdentClass::TypeName
    } else {
        IdentClass::Plain
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    cursors: &'a [Cursor],
    pos: usize,
    in_fn_decl_args: bool,
    in_enum_decl: bool,
    ast: Ast,
}

/// Parse a lexed token stream into an [`Ast`].
pub fn parse(lexed: &Lexed) -> CompileResult<Ast> {
    assert_eq!(
        lexed.tokens.len(),
        lexed.cursors.len(),
        "token and cursor streams out of step"
    );

    let mut parser = Parser {
        tokens: &lexed.tokens,
        cursors: &lexed.cursors,
        pos: 0,
        in_fn_decl_args: false,
        in_enum_decl: false,
        ast: Ast::new(),
    };

    while parser.peek().is_some() {
        let id = parser.parse_stmnt()?;
        parser.ast.top.push(id);
    }

    Ok(parser.ast)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Cursor index of the most recently consumed token.
    fn cur_idx(&self) -> usize {
        self.pos.saturating_sub(1)
    }

    fn cursor_at(&self, idx: usize) -> Cursor {
        self.cursors
            .get(idx)
            .copied()
            .or_else(|| self.cursors.last().copied())
            .unwrap_or_default()
    }

    fn diag(&self, idx: usize, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.cursor_at(idx), message)
    }

    fn err_here<T>(&self, message: impl Into<String>) -> CompileResult<T> {
        Err(self.diag(self.cur_idx(), message))
    }

    fn expect(&mut self, want: &Token) -> CompileResult<()> {
        match self.next() {
            None => Err(self.diag(
                self.cur_idx(),
                format!(
                    "expected token {} when no more tokens left",
                    want.describe()
                ),
            )),
            Some(tok) if tok == *want => Ok(()),
            Some(tok) => Err(self.diag(
                self.cur_idx(),
                format!("expected token {}, got {}", want.describe(), tok.describe()),
            )),
        }
    }

    /// Consume an identifier token that is not a keyword or a type name.
    fn expect_plain_ident(&mut self) -> CompileResult<(String, usize)> {
        match self.next() {
            Some(Token::Ident(name)) => {
                let idx = self.cur_idx();
                match classify(&name) {
                    IdentClass::Plain => Ok((name, idx)),
                    IdentClass::Keyword(kw) => {
                        Err(self.diag(idx, format!("expected identifier, got keyword {}", kw)))
                    }
                    IdentClass::TypeName => {
                        Err(self.diag(idx, format!("expected identifier, got type {}", name)))
                    }
                }
            }
            Some(tok) => self.err_here(format!("expected Ident, got {}", tok.describe())),
            None => self.err_here("expected Ident when no more tokens left"),
        }
    }

    fn expect_strlit(&mut self) -> CompileResult<String> {
        match self.next() {
            Some(Token::StrLit(s)) => Ok(s),
            Some(tok) => self.err_here(format!("expected StrLit, got {}", tok.describe())),
            None => self.err_here("expected StrLit when no more tokens left"),
        }
    }

    fn push_expr(&mut self, kind: ExprKind, ty: Type, cursors_idx: usize) -> ExprId {
        self.ast.push_expr(Expr {
            kind,
            ty,
            cursors_idx,
        })
    }

    fn push_stmnt(&mut self, kind: StmntKind, cursors_idx: usize) -> StmntId {
        self.ast.push_stmnt(Stmnt { kind, cursors_idx })
    }

    // ----- statements ------------------------------------------------

    fn parse_stmnt(&mut self) -> CompileResult<StmntId> {
        let tok = match self.peek() {
            Some(tok) => tok.clone(),
            None => return self.err_here("unexpected end of input"),
        };

        match tok {
            Token::Ident(name) => {
                self.next();
                let idx = self.cur_idx();
                match classify(&name) {
                    IdentClass::Plain => self.parse_ident_stmnt(name, idx),
                    IdentClass::Keyword(Keyword::Return) => self.parse_return(),
                    IdentClass::Keyword(Keyword::Continue) => {
                        let idx = self.cur_idx();
                        self.expect(&Token::SemiColon)?;
                        Ok(self.push_stmnt(StmntKind::Continue, idx))
                    }
                    IdentClass::Keyword(Keyword::Break) => {
                        let idx = self.cur_idx();
                        self.expect(&Token::SemiColon)?;
                        Ok(self.push_stmnt(StmntKind::Break, idx))
                    }
                    IdentClass::Keyword(Keyword::If) => self.parse_if(),
                    IdentClass::Keyword(Keyword::For) => self.parse_for(),
                    IdentClass::Keyword(Keyword::Extern) => {
                        let idx = self.cur_idx();
                        let inner = self.parse_stmnt()?;
                        Ok(self.push_stmnt(StmntKind::Extern(inner), idx))
                    }
                    IdentClass::Keyword(Keyword::Defer) => {
                        let idx = self.cur_idx();
                        let inner = self.parse_stmnt()?;
                        Ok(self.push_stmnt(StmntKind::Defer(inner), idx))
                    }
                    IdentClass::Keyword(kw) => {
                        Err(self.diag(idx, format!("unexpected keyword {}", kw)))
                    }
                    IdentClass::TypeName => {
                        Err(self.diag(idx, format!("unexpected type {}", name)))
                    }
                }
            }
            Token::LeftCurl => {
                let idx = self.pos;
                let body = self.parse_block_curls()?;
                Ok(self.push_stmnt(StmntKind::Block(body), idx))
            }
            Token::Directive(_) => self.parse_directive(),
            other => {
                self.next();
                self.err_here(format!("unexpected token {}", other.describe()))
            }
        }
    }

    /// A statement opening with a plain identifier: declaration,
    /// assignment, call, or enum field.
    fn parse_ident_stmnt(&mut self, name: String, idx: usize) -> CompileResult<StmntId> {
        if self.in_enum_decl {
            // Red;        auto-numbered field
            // Green = 10; explicitly numbered field
            match self.peek() {
                Some(Token::SemiColon) => {
                    self.next();
                    return Ok(self.push_stmnt(
                        StmntKind::ConstDecl(ConstDecl {
                            name,
                            ty: Type::new(TypeKind::I32, true, idx),
                            value: None,
                        }),
                        idx,
                    ));
                }
                Some(Token::Equal) => {
                    self.next();
                    let value = self.parse_expr()?;
                    self.expect(&Token::SemiColon)?;
                    return Ok(self.push_stmnt(
                        StmntKind::ConstDecl(ConstDecl {
                            name,
                            ty: Type::new(TypeKind::I32, true, idx),
                            value: Some(value),
                        }),
                        idx,
                    ));
                }
                _ => {}
            }
        }

        let ident = self.push_expr(ExprKind::Ident(name.clone()), Type::none(), idx);

        match self.peek() {
            Some(Token::Dot) => {
                self.next();
                let target = self.parse_field_access(ident)?;
                self.require_assignment(target, true)
            }
            Some(Token::LeftSquare) => {
                self.next();
                let target = self.parse_array_index(ident)?;
                self.require_assignment(target, true)
            }
            Some(Token::Colon) => {
                self.next();
                self.parse_decl(name, idx)
            }
            Some(Token::LeftParen) => {
                self.next();
                let call = self.parse_end_fn_call(name, idx)?;
                self.expect(&Token::SemiColon)?;
                match self.ast.expr(call).kind.clone() {
                    ExprKind::FnCall { name, args } => {
                        Ok(self.push_stmnt(StmntKind::FnCall { name, args }, idx))
                    }
                    _ => unreachable!("parse_end_fn_call returns a call"),
                }
            }
            _ => {
                if let Some(stmnt) = self.parse_possible_assignment(ident, true)? {
                    return Ok(stmnt);
                }
                match self.peek() {
                    Some(tok) => {
                        let msg = format!("unexpected token {}", tok.describe());
                        self.next();
                        self.err_here(msg)
                    }
                    None => self.err_here("unexpected end of input after identifier"),
                }
            }
        }
    }

    fn require_assignment(
        &mut self,
        target: ExprId,
        expect_semicolon: bool,
    ) -> CompileResult<StmntId> {
        match self.parse_possible_assignment(target, expect_semicolon)? {
            Some(stmnt) => Ok(stmnt),
            None => match self.peek() {
                Some(tok) => {
                    let msg = format!("expected assignment, got {}", tok.describe());
                    self.next();
                    self.err_here(msg)
                }
                None => self.err_here("expected assignment before end of input"),
            },
        }
    }

    /// `target = expr;` or `target op= expr;`; `None` when the next
    /// token starts neither.
    fn parse_possible_assignment(
        &mut self,
        target: ExprId,
        expect_semicolon: bool,
    ) -> CompileResult<Option<StmntId>> {
        let op = match self.peek() {
            Some(Token::Equal) => None,
            Some(Token::Plus) => Some(BinopKind::Plus),
            Some(Token::Minus) => Some(BinopKind::Minus),
            Some(Token::Star) => Some(BinopKind::Multiply),
            Some(Token::Slash) => Some(BinopKind::Divide),
            _ => return Ok(None),
        };

        match op {
            None => {
                self.next();
                let stmnt = self.parse_var_reassign(target, expect_semicolon)?;
                Ok(Some(stmnt))
            }
            Some(op) => {
                self.next();
                let op_idx = self.cur_idx();
                self.expect(&Token::Equal)?;
                let stmnt = self.parse_compound_assignment(target, op, op_idx, expect_semicolon)?;
                Ok(Some(stmnt))
            }
        }
    }

    fn parse_var_reassign(
        &mut self,
        target: ExprId,
        expect_semicolon: bool,
    ) -> CompileResult<StmntId> {
        let value = self.parse_expr()?;
        if expect_semicolon {
            self.expect(&Token::SemiColon)?;
        }
        let idx = self.ast.expr(target).cursors_idx;
        Ok(self.push_stmnt(
            StmntKind::VarReassign(VarReassign {
                target,
                ty: Type::none(),
                value,
            }),
            idx,
        ))
    }

    /// `lhs op= rhs` desugars to `lhs = lhs op (rhs)`.
    fn parse_compound_assignment(
        &mut self,
        target: ExprId,
        op: BinopKind,
        op_idx: usize,
        expect_semicolon: bool,
    ) -> CompileResult<StmntId> {
        let value = self.parse_expr()?;
        if expect_semicolon {
            self.expect(&Token::SemiColon)?;
        }

        let group = self.push_expr(ExprKind::Group(value), Type::none(), op_idx);
        let binop = self.push_expr(
            ExprKind::Binop {
                op,
                left: target,
                right: group,
            },
            Type::none(),
            op_idx,
        );

        let idx = self.ast.expr(target).cursors_idx;
        Ok(self.push_stmnt(
            StmntKind::VarReassign(VarReassign {
                target,
                ty: Type::none(),
                value: binop,
            }),
            idx,
        ))
    }

    // ----- declarations ----------------------------------------------

    /// `<name> :` consumed; decide between const, var and typed forms.
    fn parse_decl(&mut self, name: String, idx: usize) -> CompileResult<StmntId> {
        match self.peek() {
            Some(Token::Colon) => {
                self.next();
                self.parse_const_decl(name, Type::none(), idx)
            }
            Some(Token::Equal) => {
                self.next();
                self.parse_var_decl(name, Type::none(), true, idx)
            }
            _ => {
                let ty = self.parse_type()?;
                match self.peek() {
                    Some(Token::Colon) => {
                        self.next();
                        self.parse_const_decl(name, ty, idx)
                    }
                    Some(Token::Equal) => {
                        self.next();
                        self.parse_var_decl(name, ty, true, idx)
                    }
                    Some(Token::SemiColon) => {
                        self.next();
                        if ty.is_none() {
                            return Err(self.diag(
                                idx,
                                "expected type for variable declaration since it does not have a value",
                            ));
                        }
                        self.parse_var_decl(name, ty, false, idx)
                    }
                    Some(Token::Comma) => {
                        self.next();
                        if !self.in_fn_decl_args {
                            return self.err_here("unexpected comma during declaration");
                        }
                        Ok(self.push_stmnt(
                            StmntKind::ConstDecl(ConstDecl {
                                name,
                                ty,
                                value: None,
                            }),
                            idx,
                        ))
                    }
                    Some(Token::RightParen) => {
                        if !self.in_fn_decl_args {
                            return self.err_here("unexpected ')' during declaration");
                        }
                        Ok(self.push_stmnt(
                            StmntKind::ConstDecl(ConstDecl {
                                name,
                                ty,
                                value: None,
                            }),
                            idx,
                        ))
                    }
                    Some(tok) => {
                        let msg = format!("unexpected token {}", tok.describe());
                        self.next();
                        self.err_here(msg)
                    }
                    None => self.err_here("unexpected end of input in declaration"),
                }
            }
        }
    }

    /// `<name> : Type? :` consumed; `fn`, `struct`, `enum` or a value.
    fn parse_const_decl(&mut self, name: String, ty: Type, idx: usize) -> CompileResult<StmntId> {
        if let Some(Token::Ident(word)) = self.peek() {
            if let IdentClass::Keyword(kw) = classify(word) {
                match kw {
                    Keyword::Fn => {
                        self.next();
                        return self.parse_fn_decl(name, idx);
                    }
                    Keyword::Struct => {
                        self.next();
                        return self.parse_struct_decl(name, idx);
                    }
                    Keyword::Enum => {
                        self.next();
                        return self.parse_enum_decl(name, idx);
                    }
                    Keyword::True | Keyword::False | Keyword::Null => {}
                    other => {
                        return self
                            .err_here(format!("unexpected keyword {} in declaration", other));
                    }
                }
            }
        }

        if self.in_fn_decl_args {
            return Ok(self.push_stmnt(
                StmntKind::ConstDecl(ConstDecl {
                    name,
                    ty,
                    value: None,
                }),
                idx,
            ));
        }

        let value = self.parse_expr()?;
        self.expect(&Token::SemiColon)?;
        Ok(self.push_stmnt(
            StmntKind::ConstDecl(ConstDecl {
                name,
                ty,
                value: Some(value),
            }),
            idx,
        ))
    }

    fn parse_var_decl(
        &mut self,
        name: String,
        ty: Type,
        has_value: bool,
        idx: usize,
    ) -> CompileResult<StmntId> {
        let value = if has_value {
            let value = self.parse_expr()?;
            self.expect(&Token::SemiColon)?;
            Some(value)
        } else {
            None
        };

        Ok(self.push_stmnt(StmntKind::VarDecl(VarDecl { name, ty, value }), idx))
    }

    fn parse_fn_decl(&mut self, name: String, idx: usize) -> CompileResult<StmntId> {
        self.in_fn_decl_args = true;
        let args = self.parse_block(Some(Token::LeftParen), Token::RightParen);
        self.in_fn_decl_args = false;
        let args = args?;

        let ty = self.parse_type()?;
        if ty.is_none() {
            return self.err_here("expected return type in function declaration");
        }

        let (body, has_body) = match self.peek() {
            Some(Token::LeftCurl) => (self.parse_block_curls()?, true),
            Some(Token::SemiColon) => {
                self.next();
                (Vec::new(), false)
            }
            Some(tok) => {
                return self.err_here(format!("expected ';' or '{{', got {}", tok.describe()));
            }
            None => return self.err_here("expected ';' or '{' before end of input"),
        };

        Ok(self.push_stmnt(
            StmntKind::FnDecl(FnDecl {
                name,
                ty,
                args,
                body,
                has_body,
            }),
            idx,
        ))
    }

    fn parse_struct_decl(&mut self, name: String, idx: usize) -> CompileResult<StmntId> {
        let fields = self.parse_block_curls()?;
        Ok(self.push_stmnt(StmntKind::StructDecl(StructDecl { name, fields }), idx))
    }

    fn parse_enum_decl(&mut self, name: String, idx: usize) -> CompileResult<StmntId> {
        self.in_enum_decl = true;
        let fields = self.parse_block_curls();
        self.in_enum_decl = false;
        Ok(self.push_stmnt(
            StmntKind::EnumDecl(StructDecl {
                name,
                fields: fields?,
            }),
            idx,
        ))
    }

    // ----- control flow ----------------------------------------------

    fn parse_return(&mut self) -> CompileResult<StmntId> {
        let idx = self.cur_idx();
        if self.peek() == Some(&Token::SemiColon) {
            self.next();
            return Ok(self.push_stmnt(
                StmntKind::Return {
                    value: None,
                    ty: Type::none(),
                },
                idx,
            ));
        }

        let value = self.parse_expr()?;
        self.expect(&Token::SemiColon)?;
        Ok(self.push_stmnt(
            StmntKind::Return {
                value: Some(value),
                ty: Type::none(),
            },
            idx,
        ))
    }

    fn parse_if(&mut self) -> CompileResult<StmntId> {
        let idx = self.cur_idx();

        self.expect(&Token::LeftParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RightParen)?;

        let capture = if self.peek() == Some(&Token::LeftSquare) {
            self.next();
            let (name, cidx) = self
                .expect_plain_ident()
                .map_err(|_| self.diag(self.cur_idx(), "capture must be a unique identifier"))?;
            self.expect(&Token::RightSquare)?;
            Capture::Ident {
                name,
                cursors_idx: cidx,
            }
        } else {
            Capture::None
        };

        let body = self.parse_block_curls()?;

        let els = match self.peek() {
            Some(Token::Ident(word)) if Keyword::from_str(word) == Some(Keyword::Else) => {
                self.next();
                match self.peek() {
                    Some(Token::LeftCurl) => self.parse_block_curls()?,
                    _ => vec![self.parse_stmnt()?],
                }
            }
            _ => Vec::new(),
        };

        Ok(self.push_stmnt(
            StmntKind::If(If {
                cond,
                capture,
                body,
                els,
            }),
            idx,
        ))
    }

    fn parse_for(&mut self) -> CompileResult<StmntId> {
        let idx = self.cur_idx();

        self.expect(&Token::LeftParen)?;
        let (name, name_idx) = self.expect_plain_ident()?;

        if self.peek() != Some(&Token::Colon) {
            let got = self
                .peek()
                .map(|t| t.describe())
                .unwrap_or_else(|| "end of input".to_string());
            return self.err_here(format!("expected ':', got {}", got));
        }
        self.next();

        let init = match self.peek() {
            Some(Token::Equal) => {
                self.next();
                self.parse_var_decl(name, Type::none(), true, name_idx)?
            }
            _ => {
                let ty = self.parse_type()?;
                if ty.is_none() {
                    let got = self
                        .peek()
                        .map(|t| t.describe())
                        .unwrap_or_else(|| "end of input".to_string());
                    return self.err_here(format!("unexpected token {} in for loop", got));
                }
                self.expect(&Token::Equal)?;
                self.parse_var_decl(name, ty, true, name_idx)?
            }
        };

        let cond = self.parse_expr()?;
        self.expect(&Token::SemiColon)?;

        let step = match self.peek() {
            Some(Token::RightParen) => None,
            Some(Token::Ident(word)) if matches!(classify(word), IdentClass::Plain) => {
                let (step_name, step_idx) = self.expect_plain_ident()?;
                let target =
                    self.push_expr(ExprKind::Ident(step_name), Type::none(), step_idx);
                match self.parse_possible_assignment(target, false)? {
                    Some(stmnt) => Some(stmnt),
                    None => return self.err_here("expected assignment in for loop step"),
                }
            }
            Some(tok) => {
                let msg = format!("unexpected token {} in for loop", tok.describe());
                return self.err_here(msg);
            }
            None => return self.err_here("unexpected end of input in for loop"),
        };

        self.expect(&Token::RightParen)?;
        let body = self.parse_block_curls()?;

        Ok(self.push_stmnt(
            StmntKind::For(For {
                init,
                cond,
                step,
                body,
            }),
            idx,
        ))
    }

    fn parse_directive(&mut self) -> CompileResult<StmntId> {
        let word = match self.next() {
            Some(Token::Directive(word)) => word,
            _ => unreachable!("parse_directive called off a directive token"),
        };
        let idx = self.cur_idx();

        let directive = match word.as_str() {
            "link" => Directive::Link(self.expect_strlit()?),
            "syslink" => Directive::Syslink(self.expect_strlit()?),
            "output" => Directive::Output(self.expect_strlit()?),
            "O0" => Directive::Opt(OptFlag::O0),
            "O1" => Directive::Opt(OptFlag::O1),
            "O2" => Directive::Opt(OptFlag::O2),
            "O3" => Directive::Opt(OptFlag::O3),
            "Odebug" => Directive::Opt(OptFlag::Odebug),
            "Ofast" => Directive::Opt(OptFlag::Ofast),
            "Osmall" => Directive::Opt(OptFlag::Osmall),
            other => return Err(self.diag(idx, format!("\"#{}\" is not a directive", other))),
        };

        self.expect(&Token::SemiColon)?;
        Ok(self.push_stmnt(StmntKind::Directive(directive), idx))
    }

    // ----- blocks ----------------------------------------------------

    fn parse_block_curls(&mut self) -> CompileResult<Vec<StmntId>> {
        self.parse_block(Some(Token::LeftCurl), Token::RightCurl)
    }

    fn parse_block(&mut self, start: Option<Token>, end: Token) -> CompileResult<Vec<StmntId>> {
        if let Some(start) = start {
            self.expect(&start)?;
        }

        let mut block = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return self.err_here(format!(
                        "expected token {} before end of input",
                        end.describe()
                    ));
                }
                Some(tok) if *tok == end => {
                    self.next();
                    return Ok(block);
                }
                Some(_) => block.push(self.parse_stmnt()?),
            }
        }
    }

    // ----- types -----------------------------------------------------

    /// Parse a type, or return `Type::none()` when the next token
    /// cannot start one (callers decide whether that is an error).
    fn parse_type(&mut self) -> CompileResult<Type> {
        match self.peek() {
            Some(Token::Question) => {
                self.next();
                let idx = self.cur_idx();
                let subtype = self.parse_type()?;
                if subtype.is_none() {
                    return self.err_here("expected a type after '?'");
                }
                if matches!(subtype.kind, TypeKind::Option { .. }) {
                    return Err(self.diag(idx, "nested option types are not supported"));
                }
                Ok(Type::new(
                    TypeKind::Option {
                        subtype: Box::new(subtype),
                        is_null: false,
                        gen_option: false,
                    },
                    false,
                    idx,
                ))
            }
            Some(Token::Star) | Some(Token::Caret) => {
                // Pointer prefixes chain; the leftmost is the outermost.
                let mut prefixes = Vec::new();
                while let Some(tok) = self.peek() {
                    let constant = match tok {
                        Token::Star => false,
                        Token::Caret => true,
                        _ => break,
                    };
                    self.next();
                    prefixes.push((constant, self.cur_idx()));
                }

                let pointee = self.parse_type()?;
                if pointee.is_none() {
                    return self.err_here("expected a type after pointer prefix");
                }

                let mut ty = pointee;
                for (constant, idx) in prefixes.into_iter().rev() {
                    ty = Type::new(TypeKind::Ptr { to: Box::new(ty) }, constant, idx);
                }
                Ok(ty)
            }
            Some(Token::LeftSquare) => {
                enum Dim {
                    Slice,
                    Array(Option<ExprId>),
                }

                let mut dims = Vec::new();
                while self.peek() == Some(&Token::LeftSquare) {
                    self.next();
                    let idx = self.cur_idx();
                    let dim = match self.peek() {
                        Some(Token::RightSquare) => {
                            self.next();
                            Dim::Slice
                        }
                        Some(Token::Underscore) => {
                            self.next();
                            self.expect(&Token::RightSquare)?;
                            Dim::Array(None)
                        }
                        _ => {
                            let len = self.parse_expr()?;
                            self.expect(&Token::RightSquare)?;
                            Dim::Array(Some(len))
                        }
                    };
                    dims.push((dim, idx));
                }

                let elem = self.parse_type()?;
                if elem.is_none() {
                    return self.err_here("expected an element type");
                }

                let mut ty = elem;
                for (dim, idx) in dims.into_iter().rev() {
                    ty = match dim {
                        Dim::Slice => {
                            Type::new(TypeKind::Slice { of: Box::new(ty) }, false, idx)
                        }
                        Dim::Array(len) => Type::new(
                            TypeKind::Array {
                                of: Box::new(ty),
                                len,
                            },
                            false,
                            idx,
                        ),
                    };
                }
                Ok(ty)
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                match classify(&name) {
                    IdentClass::TypeName => {
                        self.next();
                        let kind = Type::kind_from_name(&name).unwrap();
                        Ok(Type::new(kind, false, self.cur_idx()))
                    }
                    IdentClass::Keyword(kw) => {
                        Err(self.diag(self.pos, format!("expected a type, got keyword {}", kw)))
                    }
                    IdentClass::Plain => {
                        self.next();
                        Ok(Type::new(TypeKind::TypeDef(name), false, self.cur_idx()))
                    }
                }
            }
            _ => Ok(Type::none()),
        }
    }

    // ----- expressions -----------------------------------------------

    pub fn parse_expr(&mut self) -> CompileResult<ExprId> {
        self.parse_or()
    }

    fn peek_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if Keyword::from_str(w) == Some(kw))
    }

    fn parse_or(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_and()?;
        while self.peek_keyword(Keyword::Or) {
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_and()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op: BinopKind::Or,
                    left: expr,
                    right,
                },
                Type::bool(idx),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_bitor()?;
        while self.peek_keyword(Keyword::And) {
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_bitor()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op: BinopKind::And,
                    left: expr,
                    right,
                },
                Type::bool(idx),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_bitor(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_bitxor()?;
        while self.peek() == Some(&Token::Bar) {
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_bitxor()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op: BinopKind::BitOr,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_bitxor(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_bitand()?;
        while self.peek() == Some(&Token::Caret) {
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_bitand()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op: BinopKind::BitXor,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_bitand(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_equality()?;
        while self.peek() == Some(&Token::Ampersand) {
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_equality()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op: BinopKind::BitAnd,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match (self.peek(), self.peek2()) {
                (Some(Token::Equal), Some(Token::Equal)) => BinopKind::Equals,
                (Some(Token::Exclaim), Some(Token::Equal)) => BinopKind::Inequals,
                _ => break,
            };
            self.next();
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_comparison()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op,
                    left: expr,
                    right,
                },
                Type::bool(idx),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_shift()?;
        loop {
            let strict = match self.peek() {
                Some(Token::LeftAngle) => BinopKind::Less,
                Some(Token::RightAngle) => BinopKind::Greater,
                _ => break,
            };
            self.next();
            let idx = self.cur_idx();
            let op = if self.peek() == Some(&Token::Equal) {
                self.next();
                match strict {
                    BinopKind::Less => BinopKind::LessEqual,
                    _ => BinopKind::GreaterEqual,
                }
            } else {
                strict
            };
            let right = self.parse_shift()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op,
                    left: expr,
                    right,
                },
                Type::bool(idx),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match (self.peek(), self.peek2()) {
                (Some(Token::LeftAngle), Some(Token::LeftAngle)) => BinopKind::LeftShift,
                (Some(Token::RightAngle), Some(Token::RightAngle)) => BinopKind::RightShift,
                _ => break,
            };
            self.next();
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_term()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinopKind::Plus,
                Some(Token::Minus) => BinopKind::Minus,
                _ => break,
            };
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_factor()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinopKind::Multiply,
                Some(Token::Slash) => BinopKind::Divide,
                Some(Token::Percent) => BinopKind::Mod,
                _ => break,
            };
            self.next();
            let idx = self.cur_idx();
            let right = self.parse_unary()?;
            expr = self.push_expr(
                ExprKind::Binop {
                    op,
                    left: expr,
                    right,
                },
                Type::none(),
                idx,
            );
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> CompileResult<ExprId> {
        let op = match self.peek() {
            Some(Token::Exclaim) => UnopKind::Not,
            Some(Token::Minus) => UnopKind::Negate,
            Some(Token::Ampersand) => UnopKind::Address,
            Some(Token::Tilde) => UnopKind::BitNot,
            _ => return self.parse_postfix(),
        };
        self.next();
        let idx = self.cur_idx();
        let val = self.parse_unary()?;

        let ty = match op {
            UnopKind::Not => Type::bool(idx),
            _ => Type::none(),
        };
        Ok(self.push_expr(ExprKind::Unop { op, val }, ty, idx))
    }

    fn parse_postfix(&mut self) -> CompileResult<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::LeftParen) => {
                    self.next();
                    let (name, idx) = match self.ast.expr(expr).kind.clone() {
                        ExprKind::Ident(name) => (name, self.ast.expr(expr).cursors_idx),
                        _ => {
                            return self
                                .err_here("expected a function name before '('");
                        }
                    };
                    expr = self.parse_end_fn_call(name, idx)?;
                }
                Some(Token::LeftSquare) => {
                    self.next();
                    expr = self.parse_array_index(expr)?;
                }
                Some(Token::Dot) => {
                    self.next();
                    expr = self.parse_field_access(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `name(` consumed; parse arguments through the closing paren.
    fn parse_end_fn_call(&mut self, name: String, idx: usize) -> CompileResult<ExprId> {
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RightParen) {
            args.push(self.parse_expr()?);
            while self.peek() == Some(&Token::Comma) {
                self.next();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RightParen)?;
        Ok(self.push_expr(ExprKind::FnCall { name, args }, Type::none(), idx))
    }

    /// `base[` consumed.
    fn parse_array_index(&mut self, base: ExprId) -> CompileResult<ExprId> {
        let index = self.parse_expr()?;
        self.expect(&Token::RightSquare)?;
        let idx = self.cur_idx();
        Ok(self.push_expr(
            ExprKind::ArrayIndex { base, index },
            Type::none(),
            idx,
        ))
    }

    /// `base.` consumed; either `.&` deref or `.ident`.
    fn parse_field_access(&mut self, base: ExprId) -> CompileResult<ExprId> {
        let idx = self.cur_idx();
        if self.peek() == Some(&Token::Ampersand) {
            self.next();
            return Ok(self.push_expr(
                ExprKind::FieldAccess {
                    base,
                    field: None,
                    deref: true,
                },
                Type::none(),
                idx,
            ));
        }

        let (name, field_idx) = self.expect_plain_ident()?;
        let field = self.push_expr(ExprKind::Ident(name), Type::none(), field_idx);
        Ok(self.push_expr(
            ExprKind::FieldAccess {
                base,
                field: Some(field),
                deref: false,
            },
            Type::none(),
            idx,
        ))
    }

    fn parse_primary(&mut self) -> CompileResult<ExprId> {
        let tok = match self.peek() {
            Some(tok) => tok.clone(),
            None => return self.err_here("expected an expression before end of input"),
        };

        match tok {
            Token::LeftCurl => {
                self.next();
                let idx = self.cur_idx();
                self.parse_literal_body(Type::none(), idx)
            }
            Token::LeftSquare => {
                let ty = self.parse_type()?;
                let idx = self.cur_idx();
                match self.peek() {
                    Some(Token::LeftCurl) => {
                        self.next();
                        self.parse_literal_body(ty, idx)
                    }
                    _ => Err(self.diag(
                        idx,
                        format!("unexpected type {}", self.ast.type_to_string(&ty)),
                    )),
                }
            }
            Token::Ident(name) => match classify(&name) {
                IdentClass::Plain => {
                    self.next();
                    let idx = self.cur_idx();
                    match self.peek() {
                        Some(Token::LeftCurl) => {
                            self.next();
                            let ty = Type::new(TypeKind::TypeDef(name), false, idx);
                            self.parse_literal_body(ty, idx)
                        }
                        Some(Token::StrLit(_)) if name == "c" => {
                            let s = self.expect_strlit()?;
                            Ok(self.push_expr(
                                ExprKind::CstrLit(s),
                                Type::new(TypeKind::Cstring, true, idx),
                                idx,
                            ))
                        }
                        _ => Ok(self.push_expr(ExprKind::Ident(name), Type::none(), idx)),
                    }
                }
                IdentClass::Keyword(kw) => {
                    self.next();
                    let idx = self.cur_idx();
                    match kw {
                        Keyword::True => {
                            Ok(self.push_expr(ExprKind::True, Type::new(TypeKind::Bool, true, idx), idx))
                        }
                        Keyword::False => {
                            Ok(self.push_expr(ExprKind::False, Type::new(TypeKind::Bool, true, idx), idx))
                        }
                        Keyword::Null => {
                            let ty = Type::new(
                                TypeKind::Option {
                                    subtype: Box::new(Type::none()),
                                    is_null: true,
                                    gen_option: false,
                                },
                                true,
                                idx,
                            );
                            Ok(self.push_expr(ExprKind::Null, ty, idx))
                        }
                        other => Err(self.diag(
                            idx,
                            format!("expected an expression, got keyword {}", other),
                        )),
                    }
                }
                IdentClass::TypeName => {
                    let ty = self.parse_type()?;
                    let idx = self.cur_idx();
                    match self.peek() {
                        Some(Token::LeftCurl) => {
                            self.next();
                            self.parse_literal_body(ty, idx)
                        }
                        _ => Err(self.diag(
                            idx,
                            format!("unexpected type {}", self.ast.type_to_string(&ty)),
                        )),
                    }
                }
            },
            Token::IntLit(n) => {
                self.next();
                let idx = self.cur_idx();
                Ok(self.push_expr(
                    ExprKind::IntLit(n),
                    Type::new(TypeKind::UntypedInt, true, idx),
                    idx,
                ))
            }
            Token::FloatLit(f) => {
                self.next();
                let idx = self.cur_idx();
                Ok(self.push_expr(
                    ExprKind::FloatLit(f),
                    Type::new(TypeKind::UntypedFloat, true, idx),
                    idx,
                ))
            }
            Token::CharLit(c) => {
                self.next();
                let idx = self.cur_idx();
                Ok(self.push_expr(
                    ExprKind::CharLit(c),
                    Type::new(TypeKind::Char, true, idx),
                    idx,
                ))
            }
            Token::StrLit(s) => {
                self.next();
                let idx = self.cur_idx();
                Ok(self.push_expr(
                    ExprKind::StrLit(s),
                    Type::new(TypeKind::String, true, idx),
                    idx,
                ))
            }
            Token::LeftParen => {
                self.next();
                let idx = self.cur_idx();
                let inner = self.parse_expr()?;
                self.expect(&Token::RightParen)?;
                Ok(self.push_expr(ExprKind::Group(inner), Type::none(), idx))
            }
            other => {
                self.next();
                self.err_here(format!("unexpected token {}", other.describe()))
            }
        }
    }

    /// `{` consumed; positional `{a, b}` or named `{.x = a, .y = b}`
    /// fields through the closing brace. Mixing the two is an error.
    fn parse_literal_body(&mut self, ty: Type, idx: usize) -> CompileResult<ExprId> {
        if self.peek() == Some(&Token::RightCurl) {
            self.next();
            return Ok(self.push_expr(
                ExprKind::Literal(Literal::Positional(Vec::new())),
                ty,
                idx,
            ));
        }

        let named = self.peek() == Some(&Token::Dot);
        let literal = if named {
            let mut fields = Vec::new();
            loop {
                self.expect(&Token::Dot)?;
                let (name, cidx) = self.expect_plain_ident()?;
                self.expect(&Token::Equal)?;
                let value = self.parse_expr()?;
                fields.push(NamedField {
                    name,
                    value,
                    cursors_idx: cidx,
                });

                match self.peek() {
                    Some(Token::Comma) => {
                        self.next();
                        if self.peek() == Some(&Token::RightCurl) {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            Literal::Named(fields)
        } else {
            let mut values = vec![self.parse_expr()?];
            while self.peek() == Some(&Token::Comma) {
                self.next();
                if self.peek() == Some(&Token::RightCurl) {
                    break;
                }
                values.push(self.parse_expr()?);
            }
            Literal::Positional(values)
        };

        self.expect(&Token::RightCurl)?;
        Ok(self.push_expr(ExprKind::Literal(literal), ty, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Ast {
        parse(&lex(src).unwrap()).unwrap()
    }

    fn parse_err(src: &str) -> Diagnostic {
        parse(&lex(src).unwrap()).unwrap_err()
    }

    #[test]
    fn test_fn_decl_with_body() {
        let ast = parse_src("main :: fn() void { a: i32 = 42; b := a + 1; }");
        assert_eq!(ast.top.len(), 1);
        match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => {
                assert_eq!(f.name, "main");
                assert_eq!(f.ty.kind, TypeKind::Void);
                assert!(f.has_body);
                assert_eq!(f.body.len(), 2);
            }
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_fn_prototype() {
        let ast = parse_src("puts :: fn(s: cstring) i32;");
        match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => {
                assert!(!f.has_body);
                assert_eq!(f.args.len(), 1);
                match &ast.stmnt(f.args[0]).kind {
                    StmntKind::ConstDecl(arg) => {
                        assert_eq!(arg.name, "s");
                        assert_eq!(arg.ty.kind, TypeKind::Cstring);
                        assert!(arg.value.is_none());
                    }
                    other => panic!("expected const decl arg, got {:?}", other),
                }
            }
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_decl_forms() {
        let ast = parse_src("a: i32 = 1; b := 2; c: i32; d :: 3; e: i32 : 4;");
        assert_eq!(ast.top.len(), 5);
        assert!(matches!(
            &ast.stmnt(ast.top[0]).kind,
            StmntKind::VarDecl(v) if v.ty.kind == TypeKind::I32 && v.value.is_some()
        ));
        assert!(matches!(
            &ast.stmnt(ast.top[1]).kind,
            StmntKind::VarDecl(v) if v.ty.is_none() && v.value.is_some()
        ));
        assert!(matches!(
            &ast.stmnt(ast.top[2]).kind,
            StmntKind::VarDecl(v) if v.value.is_none()
        ));
        assert!(matches!(&ast.stmnt(ast.top[3]).kind, StmntKind::ConstDecl(_)));
        assert!(matches!(
            &ast.stmnt(ast.top[4]).kind,
            StmntKind::ConstDecl(c) if c.ty.kind == TypeKind::I32
        ));
    }

    #[test]
    fn test_untyped_uninitialised_is_error() {
        let err = parse_err("x: ;");
        assert!(err.message.contains("expected type"));
    }

    #[test]
    fn test_type_shapes() {
        let ast = parse_src("a: ?i32; b: ^u8; c: *i64; d: [3]i32; e: []string; f: [_]u8; g: **i32;");
        let ty = |i: usize| match &ast.stmnt(ast.top[i]).kind {
            StmntKind::VarDecl(v) => v.ty.clone(),
            _ => panic!("expected var decl"),
        };

        assert!(matches!(ty(0).kind, TypeKind::Option { .. }));

        let b = ty(1);
        assert!(b.constant);
        assert!(matches!(b.kind, TypeKind::Ptr { .. }));

        let c = ty(2);
        assert!(!c.constant);

        match ty(3).kind {
            TypeKind::Array { of, len } => {
                assert_eq!(of.kind, TypeKind::I32);
                assert!(len.is_some());
            }
            other => panic!("expected array, got {:?}", other),
        }

        assert!(matches!(ty(4).kind, TypeKind::Slice { .. }));
        assert!(matches!(ty(5).kind, TypeKind::Array { len: None, .. }));

        match ty(6).kind {
            TypeKind::Ptr { to } => assert!(matches!(to.kind, TypeKind::Ptr { .. })),
            other => panic!("expected ptr of ptr, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_option_rejected() {
        let err = parse_err("x: ??i32;");
        assert!(err.message.contains("nested option"));
    }

    #[test]
    fn test_compound_assignment_divide_emits_division() {
        let ast = parse_src("f :: fn() void { x := 10; x /= 2; }");
        let body = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(body[1]).kind {
            StmntKind::VarReassign(re) => match &ast.expr(re.value).kind {
                ExprKind::Binop { op, .. } => assert_eq!(*op, BinopKind::Divide),
                other => panic!("expected binop, got {:?}", other),
            },
            other => panic!("expected reassign, got {:?}", other),
        }
    }

    #[test]
    fn test_if_with_capture() {
        let ast = parse_src("f :: fn(x: ?i32) i32 { if (x) [v] { return v; } else { return -1; } }");
        let body = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(body[0]).kind {
            StmntKind::If(iff) => {
                assert!(matches!(&iff.capture, Capture::Ident { name, .. } if name == "v"));
                assert_eq!(iff.body.len(), 1);
                assert_eq!(iff.els.len(), 1);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        let ast = parse_src(
            "f :: fn(a: bool, b: bool) void { if (a) { } else if (b) { } else { } }",
        );
        let body = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(body[0]).kind {
            StmntKind::If(iff) => {
                assert_eq!(iff.els.len(), 1);
                assert!(matches!(&ast.stmnt(iff.els[0]).kind, StmntKind::If(_)));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_loop() {
        let ast = parse_src("f :: fn() void { for (i: i32 = 0; i < 10; i = i + 1) { break; } }");
        let body = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };
        match &ast.stmnt(body[0]).kind {
            StmntKind::For(forf) => {
                assert!(matches!(&ast.stmnt(forf.init).kind, StmntKind::VarDecl(_)));
                assert!(forf.step.is_some());
                assert_eq!(forf.body.len(), 1);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_and_enum_decls() {
        let ast = parse_src("Vec2 :: struct { x: f32; y: f32; } Color :: enum { Red; Green = 10; Blue; }");
        match &ast.stmnt(ast.top[0]).kind {
            StmntKind::StructDecl(s) => assert_eq!(s.fields.len(), 2),
            other => panic!("expected struct, got {:?}", other),
        }
        match &ast.stmnt(ast.top[1]).kind {
            StmntKind::EnumDecl(e) => {
                assert_eq!(e.fields.len(), 3);
                assert!(matches!(
                    &ast.stmnt(e.fields[0]).kind,
                    StmntKind::ConstDecl(c) if c.value.is_none()
                ));
                assert!(matches!(
                    &ast.stmnt(e.fields[1]).kind,
                    StmntKind::ConstDecl(c) if c.value.is_some()
                ));
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        let ast = parse_src(
            "f :: fn() void { v := Vec2{.x = 1.5, .y = 2.5}; a := [3]i32{1, 2, 3}; s := \"hi\"; c := c\"raw\"; }",
        );
        let body = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };

        match &ast.stmnt(body[0]).kind {
            StmntKind::VarDecl(v) => {
                let value = v.value.unwrap();
                assert!(matches!(
                    &ast.expr(value).kind,
                    ExprKind::Literal(Literal::Named(fields)) if fields.len() == 2
                ));
                assert!(matches!(&ast.expr(value).ty.kind, TypeKind::TypeDef(n) if n == "Vec2"));
            }
            other => panic!("expected var decl, got {:?}", other),
        }

        match &ast.stmnt(body[1]).kind {
            StmntKind::VarDecl(v) => {
                let value = v.value.unwrap();
                assert!(matches!(
                    &ast.expr(value).kind,
                    ExprKind::Literal(Literal::Positional(vals)) if vals.len() == 3
                ));
            }
            other => panic!("expected var decl, got {:?}", other),
        }

        match &ast.stmnt(body[3]).kind {
            StmntKind::VarDecl(v) => {
                assert!(matches!(&ast.expr(v.value.unwrap()).kind, ExprKind::CstrLit(s) if s == "raw"));
            }
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_ladder() {
        // a + b * c parses as a + (b * c)
        let ast = parse_src("x := a + b * c;");
        let value = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::VarDecl(v) => v.value.unwrap(),
            _ => panic!("expected var decl"),
        };
        match &ast.expr(value).kind {
            ExprKind::Binop { op, right, .. } => {
                assert_eq!(*op, BinopKind::Plus);
                assert!(matches!(
                    &ast.expr(*right).kind,
                    ExprKind::Binop { op: BinopKind::Multiply, .. }
                ));
            }
            other => panic!("expected binop, got {:?}", other),
        }

        // shifts bind tighter than comparison
        let ast = parse_src("y := a << 1 < b;");
        let value = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::VarDecl(v) => v.value.unwrap(),
            _ => panic!("expected var decl"),
        };
        assert!(matches!(
            &ast.expr(value).kind,
            ExprKind::Binop { op: BinopKind::Less, .. }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let ast = parse_src("x := a.b[0].c;");
        let value = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::VarDecl(v) => v.value.unwrap(),
            _ => panic!("expected var decl"),
        };
        match &ast.expr(value).kind {
            ExprKind::FieldAccess { base, deref, .. } => {
                assert!(!deref);
                assert!(matches!(&ast.expr(*base).kind, ExprKind::ArrayIndex { .. }));
            }
            other => panic!("expected field access, got {:?}", other),
        }
    }

    #[test]
    fn test_deref_access() {
        let ast = parse_src("x := p.&;");
        let value = match &ast.stmnt(ast.top[0]).kind {
            StmntKind::VarDecl(v) => v.value.unwrap(),
            _ => panic!("expected var decl"),
        };
        assert!(matches!(
            &ast.expr(value).kind,
            ExprKind::FieldAccess { deref: true, field: None, .. }
        ));
    }

    #[test]
    fn test_directives() {
        let ast = parse_src("#syslink \"m\"; #output \"demo\"; #O2;");
        assert!(matches!(
            &ast.stmnt(ast.top[0]).kind,
            StmntKind::Directive(Directive::Syslink(s)) if s == "m"
        ));
        assert!(matches!(
            &ast.stmnt(ast.top[1]).kind,
            StmntKind::Directive(Directive::Output(s)) if s == "demo"
        ));
        assert!(matches!(
            &ast.stmnt(ast.top[2]).kind,
            StmntKind::Directive(Directive::Opt(OptFlag::O2))
        ));
    }

    #[test]
    fn test_unknown_directive() {
        let err = parse_err("#frobnicate;");
        assert!(err.message.contains("is not a directive"));
    }

    #[test]
    fn test_extern_and_defer() {
        let ast = parse_src("extern malloc :: fn(n: usize) *u8; f :: fn() void { defer done(); }");
        assert!(matches!(&ast.stmnt(ast.top[0]).kind, StmntKind::Extern(_)));
        let body = match &ast.stmnt(ast.top[1]).kind {
            StmntKind::FnDecl(f) => f.body.clone(),
            _ => panic!("expected fn"),
        };
        assert!(matches!(&ast.stmnt(body[0]).kind, StmntKind::Defer(_)));
    }

    #[test]
    fn test_unexpected_token_is_fatal() {
        let err = parse_err("main :: fn() void { a: i32 = ; }");
        assert!(err.message.contains("unexpected token"));
    }

    #[test]
    fn test_every_node_has_valid_cursor() {
        let src = "Vec2 :: struct { x: f32; y: f32; }\nmain :: fn() void { v := Vec2{.x = 1.0, .y = 2.0}; }";
        let lexed = lex(src).unwrap();
        let ast = parse(&lexed).unwrap();
        assert!(ast.expr_count() > 0);
        for expr in ast.exprs() {
            assert!(expr.cursors_idx < lexed.cursors.len());
        }
        for stmnt in ast.stmnts() {
            assert!(stmnt.cursors_idx < lexed.cursors.len());
        }
    }
}
