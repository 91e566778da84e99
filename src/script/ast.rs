//! AST node types for the script language.

/// Byte range in one source unit, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Everything declared in one source unit.
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    pub usings: Vec<UsingDirective>,
    pub types: Vec<TypeDecl>,
}

/// `using System.Text;`
#[derive(Debug, Clone)]
pub struct UsingDirective {
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    Class,
    Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
    Internal,
}

/// Modifiers written in front of a declaration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub access: Option<Access>,
    pub is_static: bool,
    pub span: Span,
}

/// `public class Greeter { ... }`
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub kind: TypeDeclKind,
    pub name: String,
    /// Enclosing `namespace` block, dotted.
    pub namespace: Option<String>,
    pub modifiers: Modifiers,
    pub members: Vec<Member>,
    pub span: Span,
    pub name_span: Span,
}

#[derive(Debug, Clone)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Constructor(CtorDecl),
    Type(TypeDecl),
}

/// `static let count: int = 0;`
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
    pub modifiers: Modifiers,
    pub span: Span,
}

/// `public fn Greet(name: string) -> string { ... }`
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Block,
    pub modifiers: Modifiers,
    pub span: Span,
}

/// `public new(name: string) { ... }`
#[derive(Debug, Clone)]
pub struct CtorDecl {
    pub params: Vec<Param>,
    pub body: Block,
    pub modifiers: Modifiers,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// A written type: a keyword or a dotted name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    Int,
    Float,
    Bool,
    String,
    Void,
    Object,
    Named(Vec<String>),
}

impl TypeExprKind {
    pub fn display(&self) -> String {
        match self {
            TypeExprKind::Int => "int".into(),
            TypeExprKind::Float => "float".into(),
            TypeExprKind::Bool => "bool".into(),
            TypeExprKind::String => "string".into(),
            TypeExprKind::Void => "void".into(),
            TypeExprKind::Object => "object".into(),
            TypeExprKind::Named(path) => path.join("."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `let x: int = expr;`
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    /// `target = value;`
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    Block(Block),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Break(span)
            | Stmt::Continue(span) => *span,
            Stmt::Expr(e) => e.span,
            Stmt::Block(b) => b.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    Null,
    This,
    Ident(String),
    /// `object.field`
    Field {
        object: Box<Expr>,
        field: String,
    },
    /// `object.method(args)`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `method(args)` on the enclosing type.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `new T(args) { field = value, ... }`
    New {
        ty: TypeExpr,
        args: Vec<Expr>,
        inits: Vec<FieldInit>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}
