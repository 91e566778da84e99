use indexmap::IndexMap;

use super::ast::{BinOp, UnaryOp};
use super::symbols::{LineIndex, MethodSymbol, Symbols, Ty};
use super::typeck::{TypedExpr, TypedExprKind, TypedStmt, TypedStmtKind};
use crate::engine::{CodeArtifact, EngineError};
use crate::host::{HostType, HostTypeId};
use crate::runtime::image::{
    Constant, FieldImage, HostMember, HostRef, Image, MethodImage, MethodRef, Op, ParamImage, TypeImage,
};

/// Emit the bytecode image for fully resolved symbols.
pub fn compile(symbols: &Symbols, unit_name: &str, debug: bool) -> Result<CodeArtifact, EngineError> {
    let mut pools = Pools::default();
    let mut image = Image::new(unit_name);

    for id in symbols.type_ids() {
        let ty = symbols.ty(id);
        let lines = &symbols.unit_of(id).lines;

        let field_images = |statics: bool| -> Vec<FieldImage> {
            let mut fields: Vec<_> = ty.fields.values().filter(|f| f.is_static == statics).collect();
            fields.sort_by_key(|f| f.slot);
            fields
                .into_iter()
                .map(|f| FieldImage {
                    name: f.name.clone(),
                    public: f.public,
                    ty: symbols.tag_of(&f.ty),
                })
                .collect()
        };

        let mut methods = Vec::with_capacity(ty.methods.len());
        for method in &ty.methods {
            methods.push(compile_method(symbols, method, lines, debug, &mut pools)?);
        }

        image.types.push(TypeImage {
            name: ty.name.clone(),
            full_name: ty.full_name.clone(),
            namespace: ty.namespace.clone(),
            kind: ty.kind,
            public: ty.public,
            parent: ty.parent.map(|p| p.0),
            nested: ty.nested.values().map(|n| n.0).collect(),
            fields: field_images(false),
            static_fields: field_images(true),
            methods,
            ctor: ty.ctor,
            static_init: ty.static_init,
        });
    }

    image.constants = pools.constants;
    image.host_types = pools.host_types.values().map(HostType::full_name).collect();
    image.host_refs = pools.host_refs.into_keys().collect();
    image.entry_point = symbols.entry_point.map(|(id, method)| MethodRef {
        type_index: id.0,
        method,
    });
    if debug {
        image.sources = symbols.units.iter().map(|u| u.name.clone()).collect();
    }

    Ok(CodeArtifact {
        image,
        host_types: pools.host_types.into_values().collect(),
    })
}

/// Tables shared by every method of the image.
#[derive(Default)]
struct Pools {
    constants: Vec<Constant>,
    host_types: IndexMap<HostTypeId, HostType>,
    host_refs: IndexMap<HostRef, u32>,
}

impl Pools {
    fn constant(&mut self, value: Constant) -> Result<u32, EngineError> {
        if let Some(i) = self.constants.iter().position(|c| c.same_as(&value)) {
            return index_u32(i, "constants");
        }
        let idx = index_u32(self.constants.len(), "constants")?;
        self.constants.push(value);
        Ok(idx)
    }

    fn host_ref(&mut self, host: &HostType, member: HostMember) -> Result<u32, EngineError> {
        let entry = self.host_types.entry(host.id());
        let host_type = index_u32(entry.index(), "host types")?;
        entry.or_insert_with(|| host.clone());
        let key = HostRef { host_type, member };
        if let Some(idx) = self.host_refs.get(&key) {
            return Ok(*idx);
        }
        let idx = index_u32(self.host_refs.len(), "host references")?;
        self.host_refs.insert(key, idx);
        Ok(idx)
    }
}

fn index_u32(i: usize, what: &str) -> Result<u32, EngineError> {
    u32::try_from(i).map_err(|_| EngineError::Limit(format!("too many {what}")))
}

fn compile_method(
    symbols: &Symbols,
    method: &MethodSymbol,
    lines: &LineIndex,
    debug: bool,
    pools: &mut Pools,
) -> Result<MethodImage, EngineError> {
    let body = method
        .body
        .as_ref()
        .ok_or_else(|| EngineError::Internal(format!("method `{}' was never resolved", method.name)))?;

    let mut compiler = Compiler {
        ops: Vec::new(),
        lines: Vec::new(),
        line: lines.line_of(method.span.start),
        line_index: lines,
        debug,
        loops: Vec::new(),
        pools,
    };
    compiler.compile_block(&body.stmts)?;
    compiler.emit(Op::ReturnVoid);

    Ok(MethodImage {
        name: method.name.clone(),
        public: method.public,
        is_static: method.is_static,
        params: method
            .params
            .iter()
            .map(|p| ParamImage {
                name: p.name.clone(),
                ty: symbols.tag_of(&p.ty),
            })
            .collect(),
        ret: symbols.tag_of(&method.ret),
        locals: u16::try_from(body.locals)
            .map_err(|_| EngineError::Limit(format!("too many locals in `{}'", method.name)))?,
        code: compiler.ops,
        lines: compiler.lines,
    })
}

struct LoopLabels {
    start: u32,
    breaks: Vec<usize>,
}

struct Compiler<'a> {
    ops: Vec<Op>,
    lines: Vec<u32>,
    line: u32,
    line_index: &'a LineIndex,
    debug: bool,
    loops: Vec<LoopLabels>,
    pools: &'a mut Pools,
}

impl Compiler<'_> {
    fn emit(&mut self, op: Op) {
        self.ops.push(op);
        if self.debug {
            self.lines.push(self.line);
        }
    }

    fn offset(&self) -> Result<u32, EngineError> {
        index_u32(self.ops.len(), "instructions")
    }

    fn emit_const(&mut self, value: Constant) -> Result<(), EngineError> {
        let idx = self.pools.constant(value)?;
        self.emit(Op::PushConst(idx));
        Ok(())
    }

    /// Emit a jump with a placeholder target; returns its index for patching.
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(op);
        self.ops.len() - 1
    }

    fn patch_jump(&mut self, idx: usize) -> Result<(), EngineError> {
        let target = self.offset()?;
        if let Some(Op::JumpIfFalse(dest) | Op::Jump(dest)) = self.ops.get_mut(idx) {
            *dest = target;
        }
        Ok(())
    }

    fn compile_block(&mut self, stmts: &[TypedStmt]) -> Result<(), EngineError> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &TypedStmt) -> Result<(), EngineError> {
        self.line = self.line_index.line_of(stmt.span.start);
        match &stmt.kind {
            TypedStmtKind::StoreLocal { slot, value } => {
                self.compile_expr(value)?;
                self.emit(Op::StoreLocal(*slot));
            }
            TypedStmtKind::StoreField { object, slot, value } => {
                self.compile_expr(object)?;
                self.compile_expr(value)?;
                self.emit(Op::StoreField(*slot));
            }
            TypedStmtKind::StoreStatic { owner, slot, value } => {
                self.compile_expr(value)?;
                self.emit(Op::StoreStatic(owner.0, *slot));
            }
            TypedStmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                if expr.ty != Ty::Void {
                    self.emit(Op::Pop);
                }
            }
            TypedStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.compile_expr(cond)?;
                let to_else = self.emit_jump(Op::JumpIfFalse(0));
                self.compile_block(then_body)?;
                match else_body {
                    Some(else_body) => {
                        let to_end = self.emit_jump(Op::Jump(0));
                        self.patch_jump(to_else)?;
                        self.compile_block(else_body)?;
                        self.patch_jump(to_end)?;
                    }
                    None => self.patch_jump(to_else)?,
                }
            }
            TypedStmtKind::While { cond, body } => {
                let start = self.offset()?;
                self.compile_expr(cond)?;
                let exit = self.emit_jump(Op::JumpIfFalse(0));
                self.loops.push(LoopLabels {
                    start,
                    breaks: Vec::new(),
                });
                self.compile_block(body)?;
                self.emit(Op::Jump(start));
                self.patch_jump(exit)?;
                if let Some(labels) = self.loops.pop() {
                    for b in labels.breaks {
                        self.patch_jump(b)?;
                    }
                }
            }
            TypedStmtKind::Break => {
                let jump = self.emit_jump(Op::Jump(0));
                self.loops
                    .last_mut()
                    .ok_or_else(|| EngineError::Internal("break outside of a loop".into()))?
                    .breaks
                    .push(jump);
            }
            TypedStmtKind::Continue => {
                let start = self
                    .loops
                    .last()
                    .ok_or_else(|| EngineError::Internal("continue outside of a loop".into()))?
                    .start;
                self.emit(Op::Jump(start));
            }
            TypedStmtKind::Return(value) => match value {
                Some(value) => {
                    self.compile_expr(value)?;
                    self.emit(Op::Return);
                }
                None => self.emit(Op::ReturnVoid),
            },
            TypedStmtKind::Throw(value) => {
                self.compile_expr(value)?;
                self.emit(Op::Throw);
            }
            TypedStmtKind::Block(stmts) => self.compile_block(stmts)?,
        }
        Ok(())
    }

    fn compile_args(&mut self, args: &[TypedExpr]) -> Result<u8, EngineError> {
        for arg in args {
            self.compile_expr(arg)?;
        }
        u8::try_from(args.len()).map_err(|_| EngineError::Limit("more than 255 arguments".into()))
    }

    fn compile_inits(&mut self, inits: &[(u16, TypedExpr)]) -> Result<(), EngineError> {
        for (slot, value) in inits {
            self.emit(Op::Dup);
            self.compile_expr(value)?;
            self.emit(Op::StoreField(*slot));
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &TypedExpr) -> Result<(), EngineError> {
        match &expr.kind {
            TypedExprKind::IntLit(v) => self.emit_const(Constant::Int(*v))?,
            TypedExprKind::FloatLit(v) => self.emit_const(Constant::Float(*v))?,
            TypedExprKind::StrLit(s) => self.emit_const(Constant::Str(s.clone()))?,
            TypedExprKind::BoolLit(b) => self.emit_const(Constant::Bool(*b))?,
            TypedExprKind::Null => self.emit(Op::PushNull),
            TypedExprKind::LoadLocal(slot) => self.emit(Op::LoadLocal(*slot)),
            TypedExprKind::LoadField { object, slot } => {
                self.compile_expr(object)?;
                self.emit(Op::LoadField(*slot));
            }
            TypedExprKind::LoadStatic { owner, slot } => self.emit(Op::LoadStatic(owner.0, *slot)),
            TypedExprKind::HostConst { host, name } => {
                let idx = self.pools.host_ref(host, HostMember::Constant(name.clone()))?;
                self.emit(Op::LoadHostConst(idx));
            }
            TypedExprKind::BinOp { op: BinOp::And, left, right } => {
                // a && b  →  a; JumpIfFalse(F); b; Jump(E); F: false; E:
                self.compile_expr(left)?;
                let to_false = self.emit_jump(Op::JumpIfFalse(0));
                self.compile_expr(right)?;
                let to_end = self.emit_jump(Op::Jump(0));
                self.patch_jump(to_false)?;
                self.emit_const(Constant::Bool(false))?;
                self.patch_jump(to_end)?;
            }
            TypedExprKind::BinOp { op: BinOp::Or, left, right } => {
                // a || b  →  a; JumpIfFalse(R); true; Jump(E); R: b; E:
                self.compile_expr(left)?;
                let to_rhs = self.emit_jump(Op::JumpIfFalse(0));
                self.emit_const(Constant::Bool(true))?;
                let to_end = self.emit_jump(Op::Jump(0));
                self.patch_jump(to_rhs)?;
                self.compile_expr(right)?;
                self.patch_jump(to_end)?;
            }
            TypedExprKind::BinOp { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Mod => Op::Mod,
                    BinOp::Lt => Op::Lt,
                    BinOp::Gt => Op::Gt,
                    BinOp::Le => Op::Le,
                    BinOp::Ge => Op::Ge,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                    BinOp::And | BinOp::Or => {
                        return Err(EngineError::Internal("logical operator reached plain emission".into()))
                    }
                });
            }
            TypedExprKind::Concat { left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Op::Concat);
            }
            TypedExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                });
            }
            TypedExprKind::IntToFloat(inner) => {
                self.compile_expr(inner)?;
                self.emit(Op::IntToFloat);
            }
            TypedExprKind::Call { owner, method, args } => {
                let argc = self.compile_args(args)?;
                self.emit(Op::Call(owner.0, *method, argc));
            }
            TypedExprKind::CallInstance {
                receiver,
                owner,
                method,
                args,
            } => {
                self.compile_expr(receiver)?;
                let argc = self.compile_args(args)?;
                self.emit(Op::CallInstance(owner.0, *method, argc));
            }
            TypedExprKind::CallHost { host, name, args } => {
                let idx = self.pools.host_ref(host, HostMember::StaticMethod(name.clone()))?;
                let argc = self.compile_args(args)?;
                self.emit(Op::CallHost(idx, argc));
            }
            TypedExprKind::CallHostInstance {
                receiver,
                host,
                name,
                args,
            } => {
                let idx = self.pools.host_ref(host, HostMember::Method(name.clone()))?;
                self.compile_expr(receiver)?;
                let argc = self.compile_args(args)?;
                self.emit(Op::CallHostInstance(idx, argc));
            }
            TypedExprKind::New { owner, args, inits } => {
                let argc = self.compile_args(args)?;
                self.emit(Op::New(owner.0, argc));
                self.compile_inits(inits)?;
            }
            TypedExprKind::NewHost { host, args, inits } => {
                let idx = self.pools.host_ref(host, HostMember::Constructor)?;
                let argc = self.compile_args(args)?;
                self.emit(Op::NewHost(idx, argc));
                self.compile_inits(inits)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::system;
    use crate::imports::ImportSet;
    use crate::script::symbols::{define, ParsedUnit};
    use crate::script::{lexer, parser, typeck};
    use crate::source::SourceId;

    fn compile_src(src: &str, debug: bool) -> CodeArtifact {
        let syntax = parser::parse(lexer::lex(src, &[]).unwrap()).unwrap();
        let mut imports = ImportSet::new();
        imports.import_module(&system::module());
        let (mut symbols, errors) = define(
            vec![ParsedUnit {
                source: SourceId(1),
                name: "t.hs".into(),
                syntax: Some(syntax),
                lines: LineIndex::new(src),
            }],
            &imports,
        );
        assert!(errors.is_empty());
        assert!(typeck::resolve(&mut symbols).is_empty());
        compile(&symbols, "t", debug).unwrap()
    }

    fn method<'a>(artifact: &'a CodeArtifact, ty: &str, name: &str) -> &'a MethodImage {
        let t = artifact.image.types.iter().find(|t| t.full_name == ty).unwrap();
        t.methods.iter().find(|m| m.name == name).unwrap()
    }

    #[test]
    fn constants_are_pooled() {
        let artifact = compile_src(
            "class A { static fn f() -> int { let a = 7; let b = 7; return a + b + 7; } }",
            false,
        );
        let sevens = artifact
            .image
            .constants
            .iter()
            .filter(|c| matches!(c, Constant::Int(7)))
            .count();
        assert_eq!(sevens, 1);
    }

    #[test]
    fn host_references_are_shared() {
        let artifact = compile_src(
            "using System; class A { static fn f() { Console.WriteLine(1); Console.WriteLine(2); Console.Write(3); } }",
            false,
        );
        assert_eq!(artifact.image.host_types, vec!["System.Console".to_string()]);
        assert_eq!(artifact.host_types.len(), 1);
        assert_eq!(artifact.image.host_refs.len(), 2);
    }

    #[test]
    fn jumps_are_patched() {
        let artifact = compile_src(
            "class A { static fn f(x: int) -> int { while x > 0 { if x == 3 { break; } x = x - 1; } return x; } }",
            false,
        );
        let code = &method(&artifact, "A", "f").code;
        let len = u32::try_from(code.len()).unwrap();
        for op in code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) = op {
                assert!(*t > 0 && *t <= len, "unpatched jump {op:?}");
            }
        }
    }

    #[test]
    fn short_circuit_uses_conditional_jumps() {
        let artifact = compile_src("class A { static fn f(a: bool, b: bool) -> bool { return a && b; } }", false);
        let code = &method(&artifact, "A", "f").code;
        assert!(code.iter().any(|op| matches!(op, Op::JumpIfFalse(_))));
        assert!(!code.iter().any(|op| matches!(op, Op::Eq)));
    }

    #[test]
    fn constructor_runs_field_initializers() {
        let artifact = compile_src("class A { let x: int = 5; static let n: int = 2; }", false);
        let ctor = method(&artifact, "A", MethodImage::CTOR);
        assert!(ctor.code.contains(&Op::StoreField(0)));
        let cctor = method(&artifact, "A", MethodImage::CCTOR);
        assert!(cctor.code.contains(&Op::StoreStatic(0, 0)));
    }

    #[test]
    fn debug_info_records_lines() {
        let artifact = compile_src("class A {\n static fn f() -> int {\n  return 1;\n }\n}", true);
        let f = method(&artifact, "A", "f");
        assert_eq!(f.lines.len(), f.code.len());
        assert_eq!(f.lines[0], 3);
        assert_eq!(artifact.image.sources, vec!["t.hs".to_string()]);

        let plain = compile_src("class A { static fn f() { } }", false);
        assert!(method(&plain, "A", "f").lines.is_empty());
    }
}
