use super::ast::*;
use super::error::CompileError;
use super::symbols::{MethodKind, MethodSymbol, Scope, Symbols, Ty, TypeId, TypeRef};
use crate::diagnostics::codes;
use crate::host::{HostMethod, HostType};
use crate::runtime::image::TypeKind;
use crate::source::SourceId;

/// A checked method body with its local slot count.
#[derive(Debug, Clone, Default)]
pub struct TypedBody {
    pub stmts: Vec<TypedStmt>,
    /// Slots including `this` and parameters.
    pub locals: usize,
}

#[derive(Debug, Clone)]
pub struct TypedStmt {
    pub kind: TypedStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypedStmtKind {
    StoreLocal {
        slot: u16,
        value: TypedExpr,
    },
    StoreField {
        object: TypedExpr,
        slot: u16,
        value: TypedExpr,
    },
    StoreStatic {
        owner: TypeId,
        slot: u16,
        value: TypedExpr,
    },
    Expr(TypedExpr),
    If {
        cond: TypedExpr,
        then_body: Vec<TypedStmt>,
        else_body: Option<Vec<TypedStmt>>,
    },
    While {
        cond: TypedExpr,
        body: Vec<TypedStmt>,
    },
    Break,
    Continue,
    Return(Option<TypedExpr>),
    Throw(TypedExpr),
    Block(Vec<TypedStmt>),
}

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    Null,
    /// Slot 0 is `this` in instance methods.
    LoadLocal(u16),
    LoadField {
        object: Box<TypedExpr>,
        slot: u16,
    },
    LoadStatic {
        owner: TypeId,
        slot: u16,
    },
    HostConst {
        host: HostType,
        name: String,
    },
    /// Operands are already promoted to a common type.
    BinOp {
        op: BinOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    Concat {
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    IntToFloat(Box<TypedExpr>),
    Call {
        owner: TypeId,
        method: u16,
        args: Vec<TypedExpr>,
    },
    CallInstance {
        receiver: Box<TypedExpr>,
        owner: TypeId,
        method: u16,
        args: Vec<TypedExpr>,
    },
    CallHost {
        host: HostType,
        name: String,
        args: Vec<TypedExpr>,
    },
    CallHostInstance {
        receiver: Box<TypedExpr>,
        host: HostType,
        name: String,
        args: Vec<TypedExpr>,
    },
    New {
        owner: TypeId,
        args: Vec<TypedExpr>,
        inits: Vec<(u16, TypedExpr)>,
    },
    NewHost {
        host: HostType,
        args: Vec<TypedExpr>,
        inits: Vec<(u16, TypedExpr)>,
    },
}

/// Check every method body and store the typed result on its symbol.
pub fn resolve(symbols: &mut Symbols) -> Vec<(SourceId, CompileError)> {
    let mut errors = Vec::new();
    let mut bodies = Vec::new();

    for id in symbols.type_ids() {
        let source = symbols.unit_of(id).source;
        for index in 0..symbols.ty(id).methods.len() {
            let mut checker = Checker::new(symbols, id, index);
            let body = checker.check();
            errors.extend(checker.errors.into_iter().map(|e| (source, e)));
            bodies.push((id, index, body));
        }
    }

    for (id, index, body) in bodies {
        if let Some(method) = symbols.ty_mut(id).methods.get_mut(index) {
            method.body = Some(body);
        }
    }
    errors
}

/// Failure to find exactly one entry point, as a code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointError {
    pub code: u32,
    pub message: String,
}

/// Find the single static parameterless `Main`, optionally only inside
/// `main_type`.
pub fn find_entry_point(
    symbols: &Symbols,
    program: &str,
    main_type: Option<&str>,
) -> Result<(TypeId, u16), EntryPointError> {
    if let Some(wanted) = main_type {
        if !symbols.by_full_name.contains_key(wanted) {
            return Err(EntryPointError {
                code: codes::MAIN_TYPE_NOT_FOUND,
                message: format!("Could not find `{wanted}' specified for Main method"),
            });
        }
    }

    let mut found = Vec::new();
    for id in symbols.type_ids() {
        let ty = symbols.ty(id);
        if main_type.is_some_and(|wanted| wanted != ty.full_name) {
            continue;
        }
        if let Some((index, m)) = ty.find_method("Main") {
            if m.is_static && m.params.is_empty() && matches!(m.ret, Ty::Void | Ty::Int) {
                found.push((id, index));
            }
        }
    }

    match found.as_slice() {
        [] => Err(EntryPointError {
            code: codes::ENTRY_POINT_MISSING,
            message: format!("Program `{program}' does not contain a static `Main' method suitable for an entry point"),
        }),
        [single] => Ok(*single),
        many => {
            let names: Vec<_> = many
                .iter()
                .map(|(id, _)| format!("`{}.Main()'", symbols.ty(*id).full_name))
                .collect();
            Err(EntryPointError {
                code: codes::ENTRY_POINT_MULTIPLE,
                message: format!("Program `{program}' has more than one entry point defined: {}", names.join(", ")),
            })
        }
    }
}

struct Local {
    name: String,
    ty: Ty,
    used: bool,
    is_param: bool,
    span: Span,
}

/// What a dotted prefix turned out to be.
enum Target {
    Value(TypedExpr),
    Type(TypeRef),
    Namespace(String),
}

struct Checker<'a> {
    symbols: &'a Symbols,
    current: TypeId,
    method: &'a MethodSymbol,
    scope: Scope,
    is_static: bool,
    locals: Vec<Local>,
    /// Block scopes: names visible in each, innermost last.
    scopes: Vec<Vec<(String, u16)>>,
    /// One entry per enclosing loop: whether it has a `break`.
    loops: Vec<bool>,
    errors: Vec<CompileError>,
}

impl<'a> Checker<'a> {
    #[allow(clippy::indexing_slicing)]
    fn new(symbols: &'a Symbols, current: TypeId, index: usize) -> Self {
        let owner = symbols.ty(current);
        let method = &owner.methods[index];
        Self {
            symbols,
            current,
            method,
            scope: Scope {
                unit: owner.unit,
                ty: Some(current),
            },
            is_static: method.is_static,
            locals: Vec::new(),
            scopes: vec![Vec::new()],
            loops: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn label(&self) -> String {
        let owner = self.symbols.ty(self.current);
        match self.method.kind {
            MethodKind::Normal => format!("{}.{}()", owner.full_name, self.method.name),
            MethodKind::Constructor => format!("{}.{}()", owner.full_name, owner.name),
            MethodKind::StaticInit => format!("{}..cctor()", owner.full_name),
        }
    }

    fn check(&mut self) -> TypedBody {
        let method = self.method;
        if !self.is_static {
            self.locals.push(Local {
                name: "this".into(),
                ty: Ty::Script(self.current),
                used: true,
                is_param: true,
                span: method.span,
            });
        }
        for p in &method.params {
            if let Err(e) = self.declare(&p.name, p.ty.clone(), true, p.span) {
                self.errors.push(e);
            }
        }

        let mut stmts = match method.kind {
            MethodKind::Constructor => self.field_initializers(false),
            MethodKind::StaticInit => self.field_initializers(true),
            MethodKind::Normal => Vec::new(),
        };

        if let Some(decl) = &method.decl {
            let (body, end_reachable) = self.check_stmts(&decl.stmts);
            stmts.extend(body);
            if end_reachable && method.ret != Ty::Void && !method.ret.is_error() {
                self.errors.push(CompileError::type_error(
                    codes::NOT_ALL_PATHS_RETURN,
                    format!("`{}': not all code paths return a value", self.label()),
                    method.span,
                ));
            }
        }

        for local in &self.locals {
            if !local.used && !local.is_param {
                self.errors.push(CompileError::warning(
                    codes::UNUSED_VARIABLE,
                    format!("The variable `{}' is assigned but its value is never used", local.name),
                    local.span,
                ));
            }
        }

        TypedBody {
            stmts,
            locals: self.locals.len(),
        }
    }

    fn field_initializers(&mut self, statics: bool) -> Vec<TypedStmt> {
        let symbols = self.symbols;
        let owner = symbols.ty(self.current);
        let mut out = Vec::new();
        for field in owner.fields.values().filter(|f| f.is_static == statics) {
            let Some(init) = &field.init else { continue };
            let value = match self.check_expr(init).and_then(|v| self.convert(v, &field.ty)) {
                Ok(v) => v,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            let kind = if statics {
                TypedStmtKind::StoreStatic {
                    owner: self.current,
                    slot: field.slot,
                    value,
                }
            } else {
                TypedStmtKind::StoreField {
                    object: self.this_expr(field.span),
                    slot: field.slot,
                    value,
                }
            };
            out.push(TypedStmt { kind, span: field.span });
        }
        out
    }

    // ── Locals ──────────────────────────────────────────────────

    fn declare(&mut self, name: &str, ty: Ty, is_param: bool, span: Span) -> Result<u16, CompileError> {
        let slot = slot_index(self.locals.len(), "local variables", span)?;
        self.locals.push(Local {
            name: name.to_string(),
            ty,
            used: false,
            is_param,
            span,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), slot));
        }
        Ok(slot)
    }

    fn find_local(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| n == name).map(|(_, s)| *s))
    }

    fn local_ty(&self, slot: u16) -> Ty {
        self.locals.get(usize::from(slot)).map_or(Ty::Error, |l| l.ty.clone())
    }

    fn mark_used(&mut self, slot: u16) {
        if let Some(local) = self.locals.get_mut(usize::from(slot)) {
            local.used = true;
        }
    }

    fn this_expr(&self, span: Span) -> TypedExpr {
        TypedExpr {
            kind: TypedExprKind::LoadLocal(0),
            ty: Ty::Script(self.current),
            span,
        }
    }

    // ── Statements ──────────────────────────────────────────────

    /// Check a statement list; the flag says whether its end is reachable.
    fn check_stmts(&mut self, stmts: &[Stmt]) -> (Vec<TypedStmt>, bool) {
        self.scopes.push(Vec::new());
        let mut out = Vec::new();
        let mut reachable = true;
        let mut warned = false;
        for stmt in stmts {
            if !reachable && !warned {
                self.errors.push(CompileError::warning(
                    codes::UNREACHABLE_CODE,
                    "Unreachable code detected",
                    stmt.span(),
                ));
                warned = true;
            }
            match self.check_stmt(stmt) {
                Ok((typed, continues)) => {
                    out.push(typed);
                    reachable &= continues;
                }
                Err(e) => self.errors.push(e),
            }
        }
        self.scopes.pop();
        (out, reachable)
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(TypedStmt, bool), CompileError> {
        let span = stmt.span();
        let (kind, continues) = match stmt {
            Stmt::Let { name, ty, value, span } => return Ok((self.check_let(name, ty.as_ref(), value, *span)?, true)),
            Stmt::Assign { target, value, .. } => (self.check_assign(target, value)?, true),
            Stmt::Expr(expr) => (TypedStmtKind::Expr(self.check_expr(expr)?), true),
            Stmt::If {
                cond,
                then_block,
                else_branch,
                ..
            } => {
                let cond = self.check_condition(cond)?;
                let (then_body, then_end) = self.check_stmts(&then_block.stmts);
                let (else_body, else_end) = match else_branch {
                    Some(branch) => {
                        let (body, end) = self.check_stmts(std::slice::from_ref(branch.as_ref()));
                        (Some(body), end)
                    }
                    None => (None, true),
                };
                (
                    TypedStmtKind::If {
                        cond,
                        then_body,
                        else_body,
                    },
                    then_end || else_end,
                )
            }
            Stmt::While { cond, body, .. } => {
                let infinite = matches!(cond.kind, ExprKind::BoolLit(true));
                let cond = self.check_condition(cond)?;
                self.loops.push(false);
                let (body, _) = self.check_stmts(&body.stmts);
                let broke = self.loops.pop().unwrap_or(false);
                (TypedStmtKind::While { cond, body }, !infinite || broke)
            }
            Stmt::Break(_) | Stmt::Continue(_) => {
                let Some(flag) = self.loops.last_mut() else {
                    return Err(CompileError::type_error(
                        codes::BREAK_OUTSIDE_LOOP,
                        "No enclosing loop out of which to break or continue",
                        span,
                    ));
                };
                if matches!(stmt, Stmt::Break(_)) {
                    *flag = true;
                    (TypedStmtKind::Break, false)
                } else {
                    (TypedStmtKind::Continue, false)
                }
            }
            Stmt::Return { value, .. } => (TypedStmtKind::Return(self.check_return(value.as_ref(), span)?), false),
            Stmt::Throw { value, .. } => {
                let value = self.check_expr(value)?;
                let throwable = match &value.ty {
                    Ty::Script(id) => self.symbols.ty(*id).kind == TypeKind::Class,
                    Ty::Host(h) => h.primitive().is_none(),
                    Ty::Object | Ty::Null | Ty::Error => true,
                    _ => false,
                };
                if !throwable {
                    return Err(CompileError::type_error(
                        codes::THROW_TYPE,
                        format!(
                            "The type `{}' cannot be thrown; an object of a class type is required",
                            self.symbols.ty_name(&value.ty)
                        ),
                        value.span,
                    ));
                }
                (TypedStmtKind::Throw(value), false)
            }
            Stmt::Block(block) => {
                let (body, end) = self.check_stmts(&block.stmts);
                (TypedStmtKind::Block(body), end)
            }
        };
        Ok((TypedStmt { kind, span }, continues))
    }

    fn check_let(
        &mut self,
        name: &str,
        annotation: Option<&TypeExpr>,
        value: &Expr,
        span: Span,
    ) -> Result<TypedStmt, CompileError> {
        if self.find_local(name).is_some() {
            return Err(CompileError::type_error(
                codes::DUPLICATE_LOCAL,
                format!("A local variable named `{name}' is already defined in this scope"),
                span,
            ));
        }

        let declared = match annotation {
            Some(te) => Some(self.symbols.resolve_type_expr(te, self.scope)?),
            None => None,
        };

        let checked = self.check_expr(value).and_then(|v| match &declared {
            Some(ty) => self.convert(v, ty),
            None if v.ty == Ty::Void => Err(CompileError::type_error(
                codes::NO_CONVERSION,
                format!("Cannot assign `void' to an implicitly-typed local variable `{name}'"),
                v.span,
            )),
            None => Ok(v),
        });

        // Declare even on failure so later uses do not cascade into 103s.
        let value = match checked {
            Ok(v) => v,
            Err(e) => {
                if let Ok(slot) = self.declare(name, Ty::Error, false, span) {
                    self.mark_used(slot);
                }
                return Err(e);
            }
        };
        let ty = declared.unwrap_or_else(|| match &value.ty {
            Ty::Null => Ty::Object,
            other => other.clone(),
        });
        let slot = self.declare(name, ty, false, span)?;
        Ok(TypedStmt {
            kind: TypedStmtKind::StoreLocal { slot, value },
            span,
        })
    }

    fn check_condition(&mut self, cond: &Expr) -> Result<TypedExpr, CompileError> {
        let cond = self.check_expr(cond)?;
        self.convert(cond, &Ty::Bool)
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) -> Result<Option<TypedExpr>, CompileError> {
        let method = self.method;
        let ret = &method.ret;
        match value {
            Some(expr) if *ret == Ty::Void => Err(CompileError::type_error(
                codes::RETURN_IN_VOID,
                format!(
                    "`{}': A return keyword must not be followed by any expression when method returns void",
                    self.label()
                ),
                expr.span,
            )),
            Some(expr) => {
                let value = self.check_expr(expr)?;
                Ok(Some(self.convert(value, ret)?))
            }
            None if *ret != Ty::Void && !ret.is_error() => Err(CompileError::type_error(
                codes::RETURN_VALUE_REQUIRED,
                format!(
                    "An object of a type convertible to `{}' is required for the return statement",
                    self.symbols.ty_name(ret)
                ),
                span,
            )),
            None => Ok(None),
        }
    }

    fn check_assign(&mut self, target: &Expr, value: &Expr) -> Result<TypedStmtKind, CompileError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(slot) = self.find_local(name) {
                    let ty = self.local_ty(slot);
                    let value = self.check_expr(value)?;
                    let value = self.convert(value, &ty)?;
                    return Ok(TypedStmtKind::StoreLocal { slot, value });
                }
                let Some((owner, field_ty, slot, is_static)) = self.find_field_in_scope(name) else {
                    return Err(self.unknown_name(name, target.span));
                };
                if !is_static && self.is_static {
                    return Err(self.instance_required(owner, name, target.span));
                }
                let value = self.check_expr(value)?;
                let value = self.convert(value, &field_ty)?;
                if is_static {
                    Ok(TypedStmtKind::StoreStatic { owner, slot, value })
                } else if owner == self.current {
                    Ok(TypedStmtKind::StoreField {
                        object: self.this_expr(target.span),
                        slot,
                        value,
                    })
                } else {
                    Err(self.instance_required(owner, name, target.span))
                }
            }
            ExprKind::Field { object, field } => match self.classify(object)? {
                Target::Type(TypeRef::Script(owner)) => {
                    let f = self.script_field(owner, field, target.span)?;
                    if !f.is_static {
                        return Err(self.instance_required(owner, field, target.span));
                    }
                    let (slot, ty) = (f.slot, f.ty.clone());
                    let value = self.check_expr(value)?;
                    let value = self.convert(value, &ty)?;
                    Ok(TypedStmtKind::StoreStatic { owner, slot, value })
                }
                Target::Value(object) => {
                    let (slot, ty) = match &object.ty {
                        Ty::Script(owner) => {
                            let f = self.script_field(*owner, field, target.span)?;
                            if f.is_static {
                                return Err(self.static_via_instance(*owner, field, target.span));
                            }
                            (f.slot, f.ty.clone())
                        }
                        Ty::Host(h) => match h.field_slot(field) {
                            Some((slot, f)) => (
                                slot_index(slot, "host fields", target.span)?,
                                self.symbols.ty_of_sig(&f.ty),
                            ),
                            None => return Err(self.missing_member(&object.ty, field, target.span)),
                        },
                        _ => return Err(self.missing_member(&object.ty, field, target.span)),
                    };
                    let value = self.check_expr(value)?;
                    let value = self.convert(value, &ty)?;
                    Ok(TypedStmtKind::StoreField { object, slot, value })
                }
                Target::Type(TypeRef::Host(_)) | Target::Namespace(_) => Err(invalid_target(target.span)),
            },
            _ => Err(invalid_target(target.span)),
        }
    }

    // ── Expressions ─────────────────────────────────────────────

    fn check_expr(&mut self, expr: &Expr) -> Result<TypedExpr, CompileError> {
        let span = expr.span;
        let typed = |kind, ty| TypedExpr { kind, ty, span };
        Ok(match &expr.kind {
            ExprKind::IntLit(v) => typed(TypedExprKind::IntLit(*v), Ty::Int),
            ExprKind::FloatLit(v) => typed(TypedExprKind::FloatLit(*v), Ty::Float),
            ExprKind::StrLit(s) => typed(TypedExprKind::StrLit(s.clone()), Ty::Str),
            ExprKind::BoolLit(b) => typed(TypedExprKind::BoolLit(*b), Ty::Bool),
            ExprKind::Null => typed(TypedExprKind::Null, Ty::Null),
            ExprKind::This => {
                if self.is_static {
                    return Err(CompileError::type_error(
                        codes::THIS_IN_STATIC,
                        "Keyword `this' is not valid in a static property, static method, or static field initializer",
                        span,
                    ));
                }
                self.this_expr(span)
            }
            ExprKind::Ident(_) | ExprKind::Field { .. } => match self.classify(expr)? {
                Target::Value(v) => v,
                Target::Type(t) => {
                    return Err(CompileError::type_error(
                        codes::TYPE_AS_VALUE,
                        format!("`{}' is a type but is used like a variable", self.symbols.ref_name(&t)),
                        span,
                    ))
                }
                Target::Namespace(ns) => {
                    return Err(CompileError::type_error(
                        codes::TYPE_AS_VALUE,
                        format!("`{ns}' is a namespace but is used like a variable"),
                        span,
                    ))
                }
            },
            ExprKind::Call { name, args } => self.check_call(name, args, span)?,
            ExprKind::MethodCall { object, method, args } => match self.classify(object)? {
                Target::Type(t) => self.static_call(&t, method, args, span)?,
                Target::Value(receiver) => self.instance_call(receiver, method, args, span)?,
                Target::Namespace(ns) => return Err(namespace_member_missing(&ns, method, span)),
            },
            ExprKind::New { ty, args, inits } => self.check_new(ty, args, inits, span)?,
            ExprKind::BinOp { op, left, right } => {
                let left = self.check_expr(left)?;
                let right = self.check_expr(right)?;
                self.binary(*op, left, right, span)?
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.check_expr(operand)?;
                let ok = match op {
                    UnaryOp::Neg => operand.ty.is_numeric(),
                    UnaryOp::Not => operand.ty == Ty::Bool,
                };
                if !ok && !operand.ty.is_error() {
                    return Err(CompileError::type_error(
                        codes::UNARY_MISMATCH,
                        format!(
                            "Operator `{}' cannot be applied to operand of type `{}'",
                            op.symbol(),
                            self.symbols.ty_name(&operand.ty)
                        ),
                        span,
                    ));
                }
                let ty = operand.ty.clone();
                typed(
                    TypedExprKind::UnaryOp {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }
        })
    }

    /// Classify an identifier or dotted path: a value, a type or a namespace.
    fn classify(&mut self, expr: &Expr) -> Result<Target, CompileError> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if let Some(value) = self.ident_value(name, expr.span)? {
                    return Ok(Target::Value(value));
                }
                if let Some(t) = self.symbols.lookup_type(name, self.scope) {
                    return Ok(Target::Type(t));
                }
                if self.symbols.is_namespace(name) {
                    return Ok(Target::Namespace(name.clone()));
                }
                Err(self.unknown_name(name, expr.span))
            }
            ExprKind::Field { object, field } => match self.classify(object)? {
                Target::Value(v) => Ok(Target::Value(self.instance_member(v, field, expr.span)?)),
                Target::Type(t) => {
                    if let Some(nested) = self.symbols.nested_type(&t, field) {
                        return Ok(Target::Type(nested));
                    }
                    Ok(Target::Value(self.static_member(&t, field, expr.span)?))
                }
                Target::Namespace(ns) => {
                    let full = format!("{ns}.{field}");
                    if let Some(t) = self.symbols.lookup_in_namespace(Some(&ns), field) {
                        return Ok(Target::Type(t));
                    }
                    if self.symbols.is_namespace(&full) {
                        return Ok(Target::Namespace(full));
                    }
                    Err(namespace_member_missing(&ns, field, expr.span))
                }
            },
            _ => Ok(Target::Value(self.check_expr(expr)?)),
        }
    }

    /// A local, a field of the current type or a static field of an
    /// enclosing type.
    fn ident_value(&mut self, name: &str, span: Span) -> Result<Option<TypedExpr>, CompileError> {
        if let Some(slot) = self.find_local(name) {
            self.mark_used(slot);
            return Ok(Some(TypedExpr {
                kind: TypedExprKind::LoadLocal(slot),
                ty: self.local_ty(slot),
                span,
            }));
        }
        let Some((owner, ty, slot, is_static)) = self.find_field_in_scope(name) else {
            return Ok(None);
        };
        if is_static {
            return Ok(Some(TypedExpr {
                kind: TypedExprKind::LoadStatic { owner, slot },
                ty,
                span,
            }));
        }
        if self.is_static || owner != self.current {
            return Err(self.instance_required(owner, name, span));
        }
        Ok(Some(TypedExpr {
            kind: TypedExprKind::LoadField {
                object: Box::new(self.this_expr(span)),
                slot,
            },
            ty,
            span,
        }))
    }

    fn find_field_in_scope(&self, name: &str) -> Option<(TypeId, Ty, u16, bool)> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let ty = self.symbols.ty(id);
            if let Some(f) = ty.fields.get(name) {
                return Some((id, f.ty.clone(), f.slot, f.is_static));
            }
            cursor = ty.parent;
        }
        None
    }

    fn script_field(
        &self,
        owner: TypeId,
        name: &str,
        span: Span,
    ) -> Result<&'a super::symbols::FieldSymbol, CompileError> {
        let symbols = self.symbols;
        let Some(field) = symbols.ty(owner).fields.get(name) else {
            return Err(self.missing_member(&Ty::Script(owner), name, span));
        };
        if !field.public && !symbols.can_access_private(owner, Some(self.current)) {
            return Err(self.inaccessible(&format!("{}.{name}", symbols.ty(owner).full_name), span));
        }
        Ok(field)
    }

    fn static_member(&mut self, t: &TypeRef, name: &str, span: Span) -> Result<TypedExpr, CompileError> {
        match t {
            TypeRef::Script(owner) => {
                let field = self.script_field(*owner, name, span)?;
                if !field.is_static {
                    return Err(self.instance_required(*owner, name, span));
                }
                Ok(TypedExpr {
                    kind: TypedExprKind::LoadStatic {
                        owner: *owner,
                        slot: field.slot,
                    },
                    ty: field.ty.clone(),
                    span,
                })
            }
            TypeRef::Host(host) => match host.constant(name) {
                Some(c) => Ok(TypedExpr {
                    kind: TypedExprKind::HostConst {
                        host: host.clone(),
                        name: name.to_string(),
                    },
                    ty: self.symbols.ty_of_sig(&c.ty),
                    span,
                }),
                None => Err(self.missing_member(&Ty::Host(host.clone()), name, span)),
            },
        }
    }

    fn instance_member(&mut self, object: TypedExpr, name: &str, span: Span) -> Result<TypedExpr, CompileError> {
        let (slot, ty) = match &object.ty {
            Ty::Error => return Ok(object),
            Ty::Script(owner) => {
                let field = self.script_field(*owner, name, span)?;
                if field.is_static {
                    return Err(self.static_via_instance(*owner, name, span));
                }
                (field.slot, field.ty.clone())
            }
            Ty::Host(host) => match host.field_slot(name) {
                Some((slot, f)) => (slot_index(slot, "host fields", span)?, self.symbols.ty_of_sig(&f.ty)),
                None => return Err(self.missing_member(&object.ty, name, span)),
            },
            other => return Err(self.missing_member(other, name, span)),
        };
        Ok(TypedExpr {
            kind: TypedExprKind::LoadField {
                object: Box::new(object),
                slot,
            },
            ty,
            span,
        })
    }

    // ── Calls ───────────────────────────────────────────────────

    fn check_call(&mut self, name: &str, args: &[Expr], span: Span) -> Result<TypedExpr, CompileError> {
        let symbols = self.symbols;
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let owner = symbols.ty(id);
            if let Some((index, method)) = owner.find_method(name) {
                let label = format!("{}.{name}", owner.full_name);
                let params: Vec<Ty> = method.params.iter().map(|p| p.ty.clone()).collect();
                let args = self.check_args(&params, args, &label, codes::ARITY_MISMATCH, span)?;
                let kind = if method.is_static {
                    TypedExprKind::Call {
                        owner: id,
                        method: index,
                        args,
                    }
                } else if !self.is_static && id == self.current {
                    TypedExprKind::CallInstance {
                        receiver: Box::new(self.this_expr(span)),
                        owner: id,
                        method: index,
                        args,
                    }
                } else {
                    return Err(self.instance_required(id, name, span));
                };
                return Ok(TypedExpr {
                    kind,
                    ty: method.ret.clone(),
                    span,
                });
            }
            cursor = owner.parent;
        }
        Err(self.unknown_name(name, span))
    }

    fn static_call(&mut self, t: &TypeRef, name: &str, args: &[Expr], span: Span) -> Result<TypedExpr, CompileError> {
        match t {
            TypeRef::Script(owner) => {
                let symbols = self.symbols;
                let ty = symbols.ty(*owner);
                let label = format!("{}.{name}", ty.full_name);
                let Some((index, method)) = ty.find_method(name) else {
                    return Err(self.missing_member(&Ty::Script(*owner), name, span));
                };
                if !method.is_static {
                    return Err(self.instance_required(*owner, name, span));
                }
                if !method.public && !symbols.can_access_private(*owner, Some(self.current)) {
                    return Err(self.inaccessible(&format!("{label}()"), span));
                }
                let params: Vec<Ty> = method.params.iter().map(|p| p.ty.clone()).collect();
                let args = self.check_args(&params, args, &label, codes::ARITY_MISMATCH, span)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::Call {
                        owner: *owner,
                        method: index,
                        args,
                    },
                    ty: method.ret.clone(),
                    span,
                })
            }
            TypeRef::Host(host) => {
                let label = format!("{}.{name}", host.full_name());
                let Some(method) = host.static_method(name) else {
                    if host.method(name).is_some() {
                        return Err(CompileError::type_error(
                            codes::INSTANCE_REQUIRED,
                            format!("An object reference is required to access non-static member `{label}'"),
                            span,
                        ));
                    }
                    return Err(self.missing_member(&Ty::Host(host.clone()), name, span));
                };
                let (args, ret) = self.check_host_args(method, args, &label, codes::ARITY_MISMATCH, span)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::CallHost {
                        host: host.clone(),
                        name: name.to_string(),
                        args,
                    },
                    ty: ret,
                    span,
                })
            }
        }
    }

    fn instance_call(
        &mut self,
        receiver: TypedExpr,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExpr, CompileError> {
        match receiver.ty.clone() {
            Ty::Error => Ok(receiver),
            Ty::Script(owner) => {
                let symbols = self.symbols;
                let ty = symbols.ty(owner);
                let label = format!("{}.{name}", ty.full_name);
                let Some((index, method)) = ty.find_method(name) else {
                    return Err(self.missing_member(&receiver.ty, name, span));
                };
                if method.is_static {
                    return Err(self.static_via_instance(owner, name, span));
                }
                if !method.public && !symbols.can_access_private(owner, Some(self.current)) {
                    return Err(self.inaccessible(&format!("{label}()"), span));
                }
                let params: Vec<Ty> = method.params.iter().map(|p| p.ty.clone()).collect();
                let args = self.check_args(&params, args, &label, codes::ARITY_MISMATCH, span)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::CallInstance {
                        receiver: Box::new(receiver),
                        owner,
                        method: index,
                        args,
                    },
                    ty: method.ret.clone(),
                    span,
                })
            }
            Ty::Host(host) => {
                let label = format!("{}.{name}", host.full_name());
                let Some(method) = host.method(name) else {
                    if host.static_method(name).is_some() {
                        return Err(CompileError::type_error(
                            codes::STATIC_VIA_INSTANCE,
                            format!("Static member `{label}' cannot be accessed with an instance reference, qualify it with a type name instead"),
                            span,
                        ));
                    }
                    return Err(self.missing_member(&receiver.ty, name, span));
                };
                let (args, ret) = self.check_host_args(method, args, &label, codes::ARITY_MISMATCH, span)?;
                Ok(TypedExpr {
                    kind: TypedExprKind::CallHostInstance {
                        receiver: Box::new(receiver),
                        host,
                        name: name.to_string(),
                        args,
                    },
                    ty: ret,
                    span,
                })
            }
            other => Err(self.missing_member(&other, name, span)),
        }
    }

    fn check_args(
        &mut self,
        params: &[Ty],
        args: &[Expr],
        label: &str,
        arity_code: u32,
        span: Span,
    ) -> Result<Vec<TypedExpr>, CompileError> {
        if params.len() != args.len() {
            let message = if arity_code == codes::CONSTRUCTOR_ARITY {
                format!("The type `{label}' does not contain a constructor that takes `{}' arguments", args.len())
            } else {
                format!("No overload for method `{label}' takes `{}' arguments", args.len())
            };
            return Err(CompileError::type_error(arity_code, message, span));
        }
        let mut out = Vec::with_capacity(args.len());
        for (i, (arg, param)) in args.iter().zip(params).enumerate() {
            let value = self.check_expr(arg)?;
            if !self.symbols.assignable(&value.ty, param) {
                return Err(CompileError::type_error(
                    codes::ARGUMENT_MISMATCH,
                    format!(
                        "Argument `#{}' cannot convert `{}' expression to type `{}'",
                        i + 1,
                        self.symbols.ty_name(&value.ty),
                        self.symbols.ty_name(param)
                    ),
                    value.span,
                ));
            }
            out.push(widen(value, param));
        }
        Ok(out)
    }

    fn check_host_args(
        &mut self,
        method: &HostMethod,
        args: &[Expr],
        label: &str,
        arity_code: u32,
        span: Span,
    ) -> Result<(Vec<TypedExpr>, Ty), CompileError> {
        let params: Vec<Ty> = method.params.iter().map(|p| self.symbols.ty_of_sig(p)).collect();
        let args = self.check_args(&params, args, label, arity_code, span)?;
        Ok((args, self.symbols.ty_of_sig(&method.ret)))
    }

    fn check_new(
        &mut self,
        te: &TypeExpr,
        args: &[Expr],
        inits: &[FieldInit],
        span: Span,
    ) -> Result<TypedExpr, CompileError> {
        let no_ctor = |name: String| {
            CompileError::type_error(
                codes::NO_CONSTRUCTORS,
                format!("The type `{name}' has no constructors defined"),
                te.span,
            )
        };
        let TypeExprKind::Named(parts) = &te.kind else {
            return Err(no_ctor(te.kind.display()));
        };
        let Some(target) = self.symbols.lookup_path(parts, self.scope) else {
            return Err(super::symbols::unknown_type(&te.kind.display(), te.span));
        };

        match target {
            TypeRef::Script(owner) => {
                let symbols = self.symbols;
                let ty = symbols.ty(owner);
                let Some(ctor) = ty.ctor.and_then(|i| ty.methods.get(usize::from(i))) else {
                    return Err(no_ctor(ty.full_name.clone()));
                };
                if !ctor.public && !symbols.can_access_private(owner, Some(self.current)) {
                    return Err(self.inaccessible(&format!("{}.{}()", ty.full_name, ty.name), span));
                }
                let params: Vec<Ty> = ctor.params.iter().map(|p| p.ty.clone()).collect();
                let args = self.check_args(&params, args, &ty.full_name, codes::CONSTRUCTOR_ARITY, span)?;
                let mut typed_inits = Vec::with_capacity(inits.len());
                for init in inits {
                    let field = self.script_field(owner, &init.name, init.span)?;
                    if field.is_static {
                        return Err(self.static_via_instance(owner, &init.name, init.span));
                    }
                    let value = self.check_expr(&init.value)?;
                    typed_inits.push((field.slot, self.convert(value, &field.ty)?));
                }
                Ok(TypedExpr {
                    kind: TypedExprKind::New {
                        owner,
                        args,
                        inits: typed_inits,
                    },
                    ty: Ty::Script(owner),
                    span,
                })
            }
            TypeRef::Host(host) => {
                let Some(ctor) = host.constructor().filter(|_| host.is_constructible()) else {
                    return Err(no_ctor(host.full_name()));
                };
                let (args, _) = self.check_host_args(ctor, args, &host.full_name(), codes::CONSTRUCTOR_ARITY, span)?;
                let mut typed_inits = Vec::with_capacity(inits.len());
                for init in inits {
                    let Some((slot, f)) = host.field_slot(&init.name) else {
                        return Err(self.missing_member(&Ty::Host(host.clone()), &init.name, init.span));
                    };
                    let field_ty = self.symbols.ty_of_sig(&f.ty);
                    let value = self.check_expr(&init.value)?;
                    let slot = slot_index(slot, "host fields", init.span)?;
                    typed_inits.push((slot, self.convert(value, &field_ty)?));
                }
                let ty = self.symbols.ty_of(&TypeRef::Host(host.clone()));
                Ok(TypedExpr {
                    kind: TypedExprKind::NewHost {
                        host,
                        args,
                        inits: typed_inits,
                    },
                    ty,
                    span,
                })
            }
        }
    }

    // ── Operators ───────────────────────────────────────────────

    fn binary(&mut self, op: BinOp, left: TypedExpr, right: TypedExpr, span: Span) -> Result<TypedExpr, CompileError> {
        if left.ty.is_error() || right.ty.is_error() {
            return Ok(TypedExpr {
                kind: TypedExprKind::Null,
                ty: Ty::Error,
                span,
            });
        }

        let numeric = left.ty.is_numeric() && right.ty.is_numeric();
        let operand_ty = if left.ty == Ty::Float || right.ty == Ty::Float {
            Ty::Float
        } else {
            Ty::Int
        };

        let result = match op {
            BinOp::Add if (left.ty == Ty::Str || right.ty == Ty::Str) && left.ty != Ty::Void && right.ty != Ty::Void => {
                return Ok(TypedExpr {
                    kind: TypedExprKind::Concat {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ty: Ty::Str,
                    span,
                });
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod if numeric => Some(operand_ty.clone()),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge if numeric => Some(Ty::Bool),
            BinOp::Eq | BinOp::Ne if numeric || self.comparable(&left.ty, &right.ty) => Some(Ty::Bool),
            BinOp::And | BinOp::Or if left.ty == Ty::Bool && right.ty == Ty::Bool => Some(Ty::Bool),
            _ => None,
        };

        let Some(ty) = result else {
            return Err(CompileError::type_error(
                codes::OPERATOR_MISMATCH,
                format!(
                    "Operator `{}' cannot be applied to operands of type `{}' and `{}'",
                    op.symbol(),
                    self.symbols.ty_name(&left.ty),
                    self.symbols.ty_name(&right.ty)
                ),
                span,
            ));
        };

        let (left, right) = if numeric {
            (widen(left, &operand_ty), widen(right, &operand_ty))
        } else {
            (left, right)
        };
        Ok(TypedExpr {
            kind: TypedExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        })
    }

    /// Operands `==`/`!=` accepts besides numeric pairs.
    fn comparable(&self, a: &Ty, b: &Ty) -> bool {
        if *a == Ty::Void || *b == Ty::Void {
            return false;
        }
        let is_reference = |t: &Ty| match t {
            Ty::Str | Ty::Null | Ty::Object | Ty::Host(_) => true,
            Ty::Script(id) => self.symbols.ty(*id).kind == TypeKind::Class,
            _ => false,
        };
        a == b
            || *a == Ty::Object
            || *b == Ty::Object
            || (*a == Ty::Null && is_reference(b))
            || (*b == Ty::Null && is_reference(a))
    }

    /// Implicit conversion, or error 29.
    fn convert(&self, value: TypedExpr, to: &Ty) -> Result<TypedExpr, CompileError> {
        if self.symbols.assignable(&value.ty, to) {
            return Ok(widen(value, to));
        }
        Err(CompileError::type_error(
            codes::NO_CONVERSION,
            format!(
                "Cannot implicitly convert type `{}' to `{}'",
                self.symbols.ty_name(&value.ty),
                self.symbols.ty_name(to)
            ),
            value.span,
        ))
    }

    // ── Errors ──────────────────────────────────────────────────

    fn unknown_name(&self, name: &str, span: Span) -> CompileError {
        CompileError::type_error(
            codes::UNKNOWN_NAME,
            format!("The name `{name}' does not exist in the current context"),
            span,
        )
    }

    fn missing_member(&self, ty: &Ty, name: &str, span: Span) -> CompileError {
        CompileError::type_error(
            codes::MISSING_MEMBER,
            format!("`{}' does not contain a definition for `{name}'", self.symbols.ty_name(ty)),
            span,
        )
    }

    fn instance_required(&self, owner: TypeId, name: &str, span: Span) -> CompileError {
        CompileError::type_error(
            codes::INSTANCE_REQUIRED,
            format!(
                "An object reference is required to access non-static member `{}.{name}'",
                self.symbols.ty(owner).full_name
            ),
            span,
        )
    }

    fn static_via_instance(&self, owner: TypeId, name: &str, span: Span) -> CompileError {
        CompileError::type_error(
            codes::STATIC_VIA_INSTANCE,
            format!(
                "Static member `{}.{name}' cannot be accessed with an instance reference, qualify it with a type name instead",
                self.symbols.ty(owner).full_name
            ),
            span,
        )
    }

    fn inaccessible(&self, what: &str, span: Span) -> CompileError {
        CompileError::type_error(
            codes::INACCESSIBLE,
            format!("`{what}' is inaccessible due to its protection level"),
            span,
        )
    }
}

fn widen(value: TypedExpr, to: &Ty) -> TypedExpr {
    if value.ty == Ty::Int && *to == Ty::Float {
        let span = value.span;
        return TypedExpr {
            kind: TypedExprKind::IntToFloat(Box::new(value)),
            ty: Ty::Float,
            span,
        };
    }
    value
}

/// Slot numbers are `u16`; the top value is kept free so a slot count
/// always fits as well.
fn slot_index(index: usize, what: &str, span: Span) -> Result<u16, CompileError> {
    u16::try_from(index).ok().filter(|&slot| slot < u16::MAX).ok_or_else(|| {
        CompileError::type_error(
            codes::SLOT_LIMIT,
            format!("Too many {what}; at most {} are supported", u16::MAX),
            span,
        )
    })
}

fn invalid_target(span: Span) -> CompileError {
    CompileError::type_error(
        codes::INVALID_ASSIGN_TARGET,
        "The left-hand side of an assignment must be a variable, a property or an indexer",
        span,
    )
}

fn namespace_member_missing(ns: &str, name: &str, span: Span) -> CompileError {
    CompileError::type_error(
        codes::NAMESPACE_MEMBER_MISSING,
        format!("The type or namespace name `{name}' does not exist in the namespace `{ns}'. Are you missing an assembly reference?"),
        span,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::system;
    use crate::imports::ImportSet;
    use crate::script::symbols::{define, LineIndex, ParsedUnit};
    use crate::script::{lexer, parser};

    fn check(src: &str) -> (Symbols, Vec<CompileError>) {
        let syntax = parser::parse(lexer::lex(src, &[]).unwrap()).unwrap();
        let mut imports = ImportSet::new();
        imports.import_module(&system::module());
        let (mut symbols, define_errors) = define(
            vec![ParsedUnit {
                source: SourceId(1),
                name: "t.hs".into(),
                syntax: Some(syntax),
                lines: LineIndex::new(src),
            }],
            &imports,
        );
        let mut errors: Vec<_> = define_errors.into_iter().map(|(_, e)| e).collect();
        errors.extend(resolve(&mut symbols).into_iter().map(|(_, e)| e));
        (symbols, errors)
    }

    fn codes_of(src: &str) -> Vec<u32> {
        check(src).1.into_iter().map(|e| e.code).collect()
    }

    fn in_main(body: &str) -> Vec<u32> {
        codes_of(&format!("using System; class P {{ static fn Main() {{ {body} }} }}"))
    }

    #[test]
    fn clean_program_checks() {
        let src = "using System;
            namespace Demo {
                public class Greeter {
                    let name: string;
                    static let created: int = 0;
                    public new(name: string) { this.name = name; Greeter.created = Greeter.created + 1; }
                    public fn Greet() -> string { return \"Hello, \" + this.name; }
                    public static fn Main() { Console.WriteLine(new Greeter(\"world\").Greet()); }
                }
                public struct Point { public let x: int; public let y: int; }
            }";
        let (symbols, errors) = check(src);
        assert!(errors.is_empty(), "{errors:?}");
        let greeter = symbols.ty(symbols.by_full_name["Demo.Greeter"]);
        assert!(greeter.methods.iter().all(|m| m.body.is_some()));
    }

    #[test]
    fn unknown_qualifier_is_unknown_name() {
        assert_eq!(in_main("Foo.Bar();"), vec![codes::UNKNOWN_NAME]);
        assert_eq!(in_main("let x = y;"), vec![codes::UNKNOWN_NAME]);
    }

    #[test]
    fn namespace_and_type_misuse() {
        assert_eq!(in_main("System.Nope.Write(1);"), vec![codes::NAMESPACE_MEMBER_MISSING]);
        assert_eq!(in_main("let x = Console; Console.WriteLine(x);"), vec![codes::TYPE_AS_VALUE]);
        assert_eq!(in_main("Console.Shout(1);"), vec![codes::MISSING_MEMBER]);
    }

    #[test]
    fn conversions_and_operators() {
        assert!(in_main("let f: float = 1; Console.WriteLine(f);").is_empty());
        assert_eq!(in_main("let i: int = 1.5; Console.WriteLine(i);"), vec![codes::NO_CONVERSION]);
        assert_eq!(in_main("let b = true + 1; Console.WriteLine(b);"), vec![codes::OPERATOR_MISMATCH]);
        assert_eq!(in_main("let b = -true; Console.WriteLine(b);"), vec![codes::UNARY_MISMATCH]);
        assert!(in_main("let s = \"n=\" + 1; Console.WriteLine(s);").is_empty());
        assert_eq!(in_main("if 1 { }"), vec![codes::NO_CONVERSION]);
    }

    #[test]
    fn locals() {
        assert_eq!(in_main("let a = 1; let a = 2; Console.WriteLine(a);"), vec![codes::DUPLICATE_LOCAL]);
        assert_eq!(in_main("let unused = 1;"), vec![codes::UNUSED_VARIABLE]);
        assert_eq!(in_main("1 = 2;"), vec![codes::INVALID_ASSIGN_TARGET]);
    }

    #[test]
    fn control_flow() {
        assert_eq!(
            codes_of("class A { fn f(x: int) -> int { if x > 0 { return 1; } } }"),
            vec![codes::NOT_ALL_PATHS_RETURN]
        );
        assert!(codes_of("class A { fn f(x: int) -> int { if x > 0 { return 1; } else { return 2; } } }").is_empty());
        assert!(codes_of("class A { fn f() -> int { while true { } } }").is_empty());
        assert_eq!(
            codes_of("class A { fn f() -> int { return 1; Console.WriteLine(2); } }")[0],
            codes::UNREACHABLE_CODE
        );
        assert_eq!(in_main("break;"), vec![codes::BREAK_OUTSIDE_LOOP]);
        assert_eq!(codes_of("class A { fn f() { return 1; } }"), vec![codes::RETURN_IN_VOID]);
        assert_eq!(codes_of("class A { fn f() -> int { return; } }"), vec![codes::RETURN_VALUE_REQUIRED]);
    }

    #[test]
    fn member_rules() {
        let src = "class A {
            let x: int;
            private fn hidden() { }
            static fn s() { x = 1; }
        }
        class B { static fn t() { let a = new A(); a.hidden(); } }";
        assert_eq!(codes_of(src), vec![codes::INSTANCE_REQUIRED, codes::INACCESSIBLE]);
        assert_eq!(
            codes_of("class A { static fn s() { this.s(); } }"),
            vec![codes::THIS_IN_STATIC]
        );
    }

    #[test]
    fn call_arity_and_arguments() {
        let src = "class A { public static fn f(a: int) { } public new(x: int) { }
            static fn g() { f(); f(\"s\"); let a = new A(); } }";
        assert_eq!(
            codes_of(src),
            vec![codes::ARITY_MISMATCH, codes::ARGUMENT_MISMATCH, codes::CONSTRUCTOR_ARITY]
        );
        assert_eq!(in_main("let c = new Console();"), vec![codes::NO_CONSTRUCTORS]);
    }

    #[test]
    fn entry_points() {
        let (symbols, _) = check("class A { static fn Main() { } } class B { static fn Main() { } }");
        let err = find_entry_point(&symbols, "a.exe", None).unwrap_err();
        assert_eq!(err.code, codes::ENTRY_POINT_MULTIPLE);
        let (id, _) = find_entry_point(&symbols, "a.exe", Some("B")).unwrap();
        assert_eq!(symbols.ty(id).name, "B");
        let (symbols, _) = check("class A { }");
        let err = find_entry_point(&symbols, "a.exe", None).unwrap_err();
        assert_eq!(err.code, codes::ENTRY_POINT_MISSING);
    }

    #[test]
    fn throw_requires_class() {
        assert!(in_main("throw new Exception(\"boom\");").is_empty());
        assert_eq!(in_main("throw 1;"), vec![codes::THROW_TYPE]);
    }

    #[test]
    fn slots_past_the_limit_are_errors() {
        let span = Span::new(4, 9);
        assert_eq!(slot_index(3, "local variables", span).unwrap(), 3);
        assert_eq!(slot_index(65_534, "local variables", span).unwrap(), 65_534);
        for index in [65_535, 70_000] {
            let err = slot_index(index, "local variables", span).unwrap_err();
            assert_eq!(err.code, codes::SLOT_LIMIT);
            assert_eq!(err.span, span);
        }
    }
}
