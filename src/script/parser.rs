use super::ast::*;
use super::error::CompileError;
use super::lexer::{SpannedToken, Token};
use crate::diagnostics::codes;

/// Parse a token stream into a compilation unit.
///
/// Errors inside a statement or member are recovered from locally, so one
/// call can report several syntax errors.
/// Deepest nesting of blocks and expressions accepted. Later passes recurse
/// over the tree, so this also bounds their stack use.
pub const MAX_NESTING: usize = 64;

pub fn parse(tokens: Vec<SpannedToken>) -> Result<CompilationUnit, Vec<CompileError>> {
    let mut parser = Parser::new(tokens);
    parser.parse_unit()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    errors: Vec<CompileError>,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            depth: 0,
        }
    }

    fn parse_unit(&mut self) -> Result<CompilationUnit, Vec<CompileError>> {
        let mut unit = CompilationUnit::default();
        let mut file_namespace: Option<String> = None;

        while !self.at_eof() {
            if matches!(self.peek(), Token::Semicolon) {
                self.advance();
                continue;
            }
            if matches!(self.peek(), Token::Namespace) && self.is_file_scoped_namespace() {
                match self.parse_file_namespace() {
                    Ok(ns) => file_namespace = Some(ns),
                    Err(e) => {
                        self.errors.push(e);
                        self.recover_to_declaration();
                    }
                }
                continue;
            }
            let ns = file_namespace.clone();
            if let Err(e) = self.parse_namespace_item(ns.as_deref(), &mut unit) {
                self.errors.push(e);
                self.recover_to_declaration();
            }
        }

        if self.errors.is_empty() {
            Ok(unit)
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Claims one level of nesting.
    fn deepen(&mut self) -> Result<(), CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::parser(
                codes::TOO_COMPLEX,
                "An expression is too long or complex to compile",
                self.span(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `f` one level deeper; the depth is restored whatever `f` returns.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, CompileError>) -> Result<T, CompileError> {
        let saved = self.depth;
        let result = self.deepen().and_then(|()| f(self));
        self.depth = saved;
        result
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(
            self.tokens.last().map_or(Span::new(0, 0), |t| t.span),
            |t| t.span,
        )
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(Span::new(0, 0), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> CompileError {
        CompileError::parser(
            codes::SYNTAX_UNEXPECTED,
            format!("Unexpected symbol `{}'", self.peek().describe()),
            self.span(),
        )
    }

    fn expect(&mut self, expected: &Token) -> Result<Span, CompileError> {
        if self.peek() == expected {
            let sp = self.span();
            self.advance();
            Ok(sp)
        } else {
            Err(CompileError::parser(
                codes::SYNTAX_EXPECTED,
                format!(
                    "Syntax error, `{}' expected, found `{}'",
                    expected.describe(),
                    self.peek().describe()
                ),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(CompileError::parser(
                codes::SYNTAX_EXPECTED,
                format!("Identifier expected, found `{}'", self.peek().describe()),
                self.span(),
            ))
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), CompileError> {
        self.expect(&Token::Semicolon).map(|_| ())
    }

    /// `A.B.C`
    fn parse_qualified(&mut self) -> Result<(Vec<String>, Span), CompileError> {
        let (first, start) = self.expect_ident()?;
        let mut parts = vec![first];
        let mut end = start;
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            let (part, sp) = self.expect_ident()?;
            parts.push(part);
            end = sp;
        }
        Ok((parts, start.merge(end)))
    }

    /// Skip to the next `;` or the token after the matching `}` of a block
    /// opened during recovery, stopping before an unmatched `}`.
    fn recover_to_semicolon(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to something that can start a top-level declaration.
    fn recover_to_declaration(&mut self) {
        let start = self.pos;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Using
                | Token::Namespace
                | Token::Class
                | Token::Struct
                | Token::Public
                | Token::Internal
                    if self.pos > start =>
                {
                    return
                }
                _ => self.advance(),
            }
        }
    }

    // ── Declarations ──────────────────────────────────────────────

    fn is_file_scoped_namespace(&self) -> bool {
        let mut i = 1;
        loop {
            match self.peek_at(i) {
                Token::Ident(_) | Token::Dot => i += 1,
                Token::Semicolon => return true,
                _ => return false,
            }
        }
    }

    fn parse_file_namespace(&mut self) -> Result<String, CompileError> {
        self.expect(&Token::Namespace)?;
        let (parts, _) = self.parse_qualified()?;
        self.expect_semicolon()?;
        Ok(parts.join("."))
    }

    fn parse_namespace_item(
        &mut self,
        namespace: Option<&str>,
        unit: &mut CompilationUnit,
    ) -> Result<(), CompileError> {
        match self.peek() {
            Token::Using => {
                let start = self.span();
                self.advance();
                let (parts, path_span) = self.parse_qualified()?;
                self.expect_semicolon()?;
                unit.usings.push(UsingDirective {
                    path: parts.join("."),
                    span: start.merge(path_span),
                });
                Ok(())
            }
            Token::Namespace => {
                self.advance();
                let (parts, _) = self.parse_qualified()?;
                let inner = match namespace {
                    Some(outer) => format!("{outer}.{}", parts.join(".")),
                    None => parts.join("."),
                };
                self.nested(|p| {
                    p.expect(&Token::LBrace)?;
                    while !matches!(p.peek(), Token::RBrace | Token::Eof) {
                        if matches!(p.peek(), Token::Semicolon) {
                            p.advance();
                            continue;
                        }
                        if let Err(e) = p.parse_namespace_item(Some(&inner), unit) {
                            p.errors.push(e);
                            p.recover_to_declaration();
                        }
                    }
                    p.expect(&Token::RBrace)?;
                    Ok(())
                })
            }
            _ => {
                let modifiers = self.parse_modifiers();
                let decl = self.parse_type_decl(namespace, modifiers)?;
                unit.types.push(decl);
                Ok(())
            }
        }
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut mods = Modifiers {
            span: self.span(),
            ..Modifiers::default()
        };
        loop {
            let sp = self.span();
            let (access, word) = match self.peek() {
                Token::Public => (Some(Access::Public), "public"),
                Token::Private => (Some(Access::Private), "private"),
                Token::Internal => (Some(Access::Internal), "internal"),
                Token::Static => (None, "static"),
                _ => break,
            };
            self.advance();
            mods.span = mods.span.merge(sp);
            match access {
                Some(a) if mods.access == Some(a) => self.errors.push(CompileError::parser(
                    codes::DUPLICATE_MODIFIER,
                    format!("Duplicate `{word}' modifier"),
                    sp,
                )),
                Some(_) if mods.access.is_some() => self.errors.push(CompileError::parser(
                    codes::MULTIPLE_PROTECTION,
                    "More than one protection modifier",
                    sp,
                )),
                Some(a) => mods.access = Some(a),
                None if mods.is_static => self.errors.push(CompileError::parser(
                    codes::DUPLICATE_MODIFIER,
                    "Duplicate `static' modifier",
                    sp,
                )),
                None => mods.is_static = true,
            }
        }
        mods
    }

    fn parse_type_decl(
        &mut self,
        namespace: Option<&str>,
        modifiers: Modifiers,
    ) -> Result<TypeDecl, CompileError> {
        self.nested(|p| p.parse_type_body(namespace, modifiers))
    }

    fn parse_type_body(
        &mut self,
        namespace: Option<&str>,
        modifiers: Modifiers,
    ) -> Result<TypeDecl, CompileError> {
        let start = self.span();
        let kind = match self.peek() {
            Token::Class => TypeDeclKind::Class,
            Token::Struct => TypeDeclKind::Struct,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        let (name, name_span) = self.expect_ident()?;
        self.expect(&Token::LBrace)?;

        let mut members = Vec::new();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            if matches!(self.peek(), Token::Semicolon) {
                self.advance();
                continue;
            }
            match self.parse_member(namespace) {
                Ok(m) => members.push(m),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_semicolon();
                }
            }
        }
        let end = self.expect(&Token::RBrace)?;

        Ok(TypeDecl {
            kind,
            name,
            namespace: namespace.map(str::to_string),
            modifiers,
            members,
            span: start.merge(end),
            name_span,
        })
    }

    fn parse_member(&mut self, namespace: Option<&str>) -> Result<Member, CompileError> {
        let modifiers = self.parse_modifiers();
        let start = self.span();
        match self.peek() {
            Token::Let => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                let init = if matches!(self.peek(), Token::Eq) {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                let end = self.span();
                self.expect_semicolon()?;
                Ok(Member::Field(FieldDecl {
                    name,
                    ty,
                    init,
                    modifiers,
                    span: start.merge(end),
                }))
            }
            Token::Fn => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                let params = self.parse_params()?;
                let ret = if matches!(self.peek(), Token::Arrow) {
                    self.advance();
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                let span = start.merge(body.span);
                Ok(Member::Method(MethodDecl {
                    name,
                    params,
                    ret,
                    body,
                    modifiers,
                    span,
                }))
            }
            Token::New => {
                self.advance();
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                let span = start.merge(body.span);
                Ok(Member::Constructor(CtorDecl {
                    params,
                    body,
                    modifiers,
                    span,
                }))
            }
            Token::Class | Token::Struct => {
                let nested = self.parse_type_decl(namespace, modifiers)?;
                Ok(Member::Type(nested))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, CompileError> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !matches!(self.peek(), Token::RParen | Token::Eof) {
            let (name, span) = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                name,
                span: span.merge(ty.span),
                ty,
            });
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    fn parse_type(&mut self) -> Result<TypeExpr, CompileError> {
        let span = self.span();
        let kind = match self.peek() {
            Token::IntTy => TypeExprKind::Int,
            Token::FloatTy => TypeExprKind::Float,
            Token::BoolTy => TypeExprKind::Bool,
            Token::StringTy => TypeExprKind::String,
            Token::VoidTy => TypeExprKind::Void,
            Token::ObjectTy => TypeExprKind::Object,
            Token::Ident(_) => {
                let (parts, span) = self.parse_qualified()?;
                return Ok(TypeExpr {
                    kind: TypeExprKind::Named(parts),
                    span,
                });
            }
            _ => {
                return Err(CompileError::parser(
                    codes::SYNTAX_EXPECTED,
                    format!("Type expected, found `{}'", self.peek().describe()),
                    span,
                ))
            }
        };
        self.advance();
        Ok(TypeExpr { kind, span })
    }

    // ── Statements ────────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        self.nested(Self::parse_block_inner)
    }

    fn parse_block_inner(&mut self) -> Result<Block, CompileError> {
        let start = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            if matches!(self.peek(), Token::Semicolon) {
                self.advance();
                continue;
            }
            match self.parse_stmt() {
                Ok(s) => stmts.push(s),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_semicolon();
                }
            }
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(Block {
            stmts,
            span: start.merge(end),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        match self.peek() {
            Token::Let => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                let ty = if matches!(self.peek(), Token::Colon) {
                    self.advance();
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(&Token::Eq)?;
                let value = self.parse_expr()?;
                let span = start.merge(value.span);
                self.expect_semicolon()?;
                Ok(Stmt::Let {
                    name,
                    ty,
                    value,
                    span,
                })
            }
            Token::If => self.parse_if(),
            Token::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                let span = start.merge(body.span);
                Ok(Stmt::While { cond, body, span })
            }
            Token::Break => {
                self.advance();
                self.expect_semicolon()?;
                Ok(Stmt::Break(start))
            }
            Token::Continue => {
                self.advance();
                self.expect_semicolon()?;
                Ok(Stmt::Continue(start))
            }
            Token::Return => {
                self.advance();
                let value = if matches!(self.peek(), Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let span = value.as_ref().map_or(start, |v| start.merge(v.span));
                self.expect_semicolon()?;
                Ok(Stmt::Return { value, span })
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                let span = start.merge(value.span);
                self.expect_semicolon()?;
                Ok(Stmt::Throw { value, span })
            }
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expr()?;
                if matches!(self.peek(), Token::Eq) {
                    self.advance();
                    let value = self.parse_expr()?;
                    let span = expr.span.merge(value.span);
                    self.expect_semicolon()?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                        span,
                    });
                }
                self.expect_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.nested(Self::parse_if_inner)
    }

    fn parse_if_inner(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&Token::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let mut span = start.merge(then_block.span);
        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            let branch = if matches!(self.peek(), Token::If) {
                self.parse_if()?
            } else {
                Stmt::Block(self.parse_block()?)
            };
            span = span.merge(branch.span());
            Some(Box::new(branch))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_branch,
            span,
        })
    }

    // ── Expression parsing (precedence climbing) ──────────────────

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::parse_or)
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            self.deepen()?;
            let right = self.parse_and()?;
            left = Self::binary(BinOp::Or, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_equality()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            self.deepen()?;
            let right = self.parse_equality()?;
            left = Self::binary(BinOp::And, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.span();
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        let span = start.merge(operand.span);
        Ok(Expr {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let saved = self.depth;
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.deepen()?;
                    let (name, name_span) = self.expect_ident()?;
                    if matches!(self.peek(), Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        let span = expr.span.merge(self.prev_span());
                        expr = Expr {
                            kind: ExprKind::MethodCall {
                                object: Box::new(expr),
                                method: name,
                                args,
                            },
                            span,
                        };
                    } else {
                        let span = expr.span.merge(name_span);
                        expr = Expr {
                            kind: ExprKind::Field {
                                object: Box::new(expr),
                                field: name,
                            },
                            span,
                        };
                    }
                }
                Token::LParen if matches!(expr.kind, ExprKind::Ident(_)) => {
                    if let ExprKind::Ident(name) = &expr.kind {
                        let name = name.clone();
                        self.advance();
                        self.deepen()?;
                        let args = self.parse_args()?;
                        let span = expr.span.merge(self.prev_span());
                        expr = Expr {
                            kind: ExprKind::Call { name, args },
                            span,
                        };
                    }
                }
                _ => break,
            }
        }

        self.depth = saved;
        Ok(expr)
    }

    /// Arguments after `(`, consuming the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_expr()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::Int(v) => ExprKind::IntLit(v),
            Token::Float(v) => ExprKind::FloatLit(v),
            Token::Str(s) => ExprKind::StrLit(s),
            Token::True => ExprKind::BoolLit(true),
            Token::False => ExprKind::BoolLit(false),
            Token::Null => ExprKind::Null,
            Token::This => ExprKind::This,
            Token::Ident(name) => ExprKind::Ident(name),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end = self.expect(&Token::RParen)?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: span.merge(end),
                });
            }
            Token::New => return self.parse_new(),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(Expr { kind, span })
    }

    fn parse_new(&mut self) -> Result<Expr, CompileError> {
        let start = self.expect(&Token::New)?;
        let ty = self.parse_type()?;
        let mut end = ty.span;
        let has_args = matches!(self.peek(), Token::LParen);
        let args = if has_args {
            self.advance();
            let args = self.parse_args()?;
            end = self.prev_span();
            args
        } else {
            Vec::new()
        };
        let mut inits = Vec::new();
        if matches!(self.peek(), Token::LBrace) {
            self.advance();
            while !matches!(self.peek(), Token::RBrace | Token::Eof) {
                let (name, name_span) = self.expect_ident()?;
                self.expect(&Token::Eq)?;
                let value = self.parse_expr()?;
                inits.push(FieldInit {
                    span: name_span.merge(value.span),
                    name,
                    value,
                });
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            end = self.expect(&Token::RBrace)?;
        } else if !has_args {
            return Err(CompileError::parser(
                codes::SYNTAX_EXPECTED,
                format!("Syntax error, `(' expected, found `{}'", self.peek().describe()),
                self.span(),
            ));
        }
        Ok(Expr {
            kind: ExprKind::New { ty, args, inits },
            span: start.merge(end),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::script::lexer::lex;

    fn parse_src(src: &str) -> CompilationUnit {
        parse(lex(src, &[]).unwrap()).unwrap()
    }

    fn parse_err(src: &str) -> Vec<CompileError> {
        parse(lex(src, &[]).unwrap()).unwrap_err()
    }

    fn method_body(src: &str) -> Vec<Stmt> {
        let unit = parse_src(&format!("class T {{ fn m() {{ {src} }} }}"));
        match unit.types[0].members[0].clone() {
            Member::Method(m) => m.body.stmts,
            other => unreachable!("expected method, got {other:?}"),
        }
    }

    fn expr(src: &str) -> Expr {
        match method_body(&format!("let x = {src};")).remove(0) {
            Stmt::Let { value, .. } => value,
            other => unreachable!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn usings_namespaces_and_types() {
        let unit = parse_src(
            "using System; using System.Text;
             namespace Demo.App { public class A { } namespace Inner { struct B { } } }
             internal class C { }",
        );
        assert_eq!(unit.usings.len(), 2);
        assert_eq!(unit.usings[1].path, "System.Text");
        let names: Vec<_> = unit
            .types
            .iter()
            .map(|t| (t.name.as_str(), t.namespace.clone()))
            .collect();
        assert_eq!(names, vec![
            ("A", Some("Demo.App".to_string())),
            ("B", Some("Demo.App.Inner".to_string())),
            ("C", None),
        ]);
        assert_eq!(unit.types[0].modifiers.access, Some(Access::Public));
        assert_eq!(unit.types[1].kind, TypeDeclKind::Struct);
    }

    #[test]
    fn file_scoped_namespace() {
        let unit = parse_src("namespace Tools; class Hammer { }");
        assert_eq!(unit.types[0].namespace.as_deref(), Some("Tools"));
    }

    #[test]
    fn members() {
        let unit = parse_src(
            "class G {
                static let count: int = 0;
                let name: string;
                public new(name: string) { this.name = name; }
                public fn Greet(a: int, b: float) -> string { return \"hi\"; }
                class Nested { }
            }",
        );
        let members = &unit.types[0].members;
        assert_eq!(members.len(), 5);
        assert!(matches!(&members[0], Member::Field(f) if f.modifiers.is_static && f.init.is_some()));
        assert!(matches!(&members[2], Member::Constructor(c) if c.params.len() == 1));
        match &members[3] {
            Member::Method(m) => {
                assert_eq!(m.params.len(), 2);
                assert_eq!(m.ret.as_ref().unwrap().kind, TypeExprKind::String);
            }
            other => unreachable!("expected method, got {other:?}"),
        }
        assert!(matches!(&members[4], Member::Type(t) if t.name == "Nested"));
    }

    #[test]
    fn precedence() {
        let e = expr("1 + 2 * 3");
        match e.kind {
            ExprKind::BinOp { op: BinOp::Add, right, .. } => {
                assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => unreachable!("unexpected {other:?}"),
        }
        let e = expr("a || b && c == d");
        assert!(matches!(e.kind, ExprKind::BinOp { op: BinOp::Or, .. }));
    }

    #[test]
    fn member_access_and_calls() {
        let e = expr("System.Console.WriteLine(f(1), this.x)");
        match e.kind {
            ExprKind::MethodCall { object, method, args } => {
                assert_eq!(method, "WriteLine");
                assert_eq!(args.len(), 2);
                assert!(matches!(args[0].kind, ExprKind::Call { .. }));
                assert!(matches!(object.kind, ExprKind::Field { .. }));
            }
            other => unreachable!("unexpected {other:?}"),
        }
    }

    #[test]
    fn new_with_initializer() {
        let e = expr("new Point { x = 1, y = 2 }");
        match e.kind {
            ExprKind::New { args, inits, .. } => {
                assert!(args.is_empty());
                assert_eq!(inits.len(), 2);
            }
            other => unreachable!("unexpected {other:?}"),
        }
        assert!(matches!(expr("new A.B(1)").kind, ExprKind::New { ref args, .. } if args.len() == 1));
    }

    #[test]
    fn statements() {
        let body = method_body(
            "let a: int = 1; a = a + 1;
             if a > 1 { return; } else if a < 0 { throw new Exception(\"x\"); } else { }
             while true { break; continue; }
             { f(); }",
        );
        assert!(matches!(body[0], Stmt::Let { ty: Some(_), .. }));
        assert!(matches!(body[1], Stmt::Assign { .. }));
        assert!(matches!(&body[2], Stmt::If { else_branch: Some(b), .. } if matches!(**b, Stmt::If { .. })));
        assert!(matches!(body[3], Stmt::While { .. }));
        assert!(matches!(body[4], Stmt::Block(_)));
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let errors = parse_err("class A { fn m() { let x = 1 } }");
        assert_eq!(errors[0].code, codes::SYNTAX_EXPECTED);
    }

    #[test]
    fn recovers_and_reports_several_errors() {
        let errors = parse_err(
            "class A { fn m() { let = 1; let y = ; } }
             class B { let z: int }",
        );
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unexpected_member_token() {
        let errors = parse_err("class A { 42; }");
        assert_eq!(errors[0].code, codes::SYNTAX_UNEXPECTED);
    }

    #[test]
    fn duplicate_modifiers() {
        let errors = parse_err("public public class A { }");
        assert_eq!(errors[0].code, codes::DUPLICATE_MODIFIER);
        let errors = parse_err("public private class A { }");
        assert_eq!(errors[0].code, codes::MULTIPLE_PROTECTION);
    }

    #[test]
    fn moderate_nesting_parses() {
        let parens = format!("let a = {}1{};", "(".repeat(40), ")".repeat(40));
        let blocks = format!("{}{}", "{ ".repeat(20), "} ".repeat(20));
        let chain = format!("let b = 1{};", " + 1".repeat(30));
        assert_eq!(method_body(&format!("{parens} {blocks} {chain}")).len(), 3);
    }

    #[test]
    fn deep_expressions_are_rejected() {
        let deep = format!("let x = {}1{};", "(".repeat(10_000), ")".repeat(10_000));
        let errors = parse_err(&format!("class T {{ fn m() {{ {deep} let y = ((1)); }} }}"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, codes::TOO_COMPLEX);

        let negations = format!("let x = {}true;", "!".repeat(10_000));
        assert_eq!(parse_err(&format!("class T {{ fn m() {{ {negations} }} }}"))[0].code, codes::TOO_COMPLEX);

        let chain = format!("let x = 1{};", " + 1".repeat(10_000));
        assert_eq!(parse_err(&format!("class T {{ fn m() {{ {chain} }} }}"))[0].code, codes::TOO_COMPLEX);
    }

    #[test]
    fn deep_blocks_and_types_are_rejected() {
        let blocks = format!("class T {{ fn m() {{ {}{} }} }}", "{".repeat(10_000), "}".repeat(10_000));
        assert!(parse_err(&blocks).iter().any(|e| e.code == codes::TOO_COMPLEX));

        let types = format!("{}{}", "class A { ".repeat(10_000), "} ".repeat(10_000));
        assert!(parse_err(&types).iter().any(|e| e.code == codes::TOO_COMPLEX));
    }
}
