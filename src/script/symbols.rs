//! Declaration-level symbol tables: every script type with its fields,
//! methods and constructor, plus the name lookup shared by later stages.

use indexmap::{IndexMap, IndexSet};

use super::ast::*;
use super::error::CompileError;
use super::typeck::TypedBody;
use crate::diagnostics::codes;
use crate::host::{HostType, Primitive, TypeSig};
use crate::imports::ImportSet;
use crate::runtime::image::{MethodImage, TypeKind, TypeTag};
use crate::source::SourceId;

/// Index of a script type in [`Symbols::types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static type of an expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Void,
    Bool,
    Int,
    Float,
    Str,
    /// Type of the `null` literal.
    Null,
    Object,
    Script(TypeId),
    Host(HostType),
    /// Already reported; suppresses follow-up errors.
    Error,
}

impl Ty {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Ty::Error)
    }
}

/// A named type: what a type path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Script(TypeId),
    Host(HostType),
}

/// Byte offsets of line starts, for debug line tables.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line of `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        u32::try_from(line).unwrap_or(u32::MAX)
    }
}

/// One parsed source file.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub source: SourceId,
    pub name: String,
    /// `None` when the file did not parse.
    pub syntax: Option<CompilationUnit>,
    pub lines: LineIndex,
}

#[derive(Debug, Clone)]
pub struct UnitScope {
    pub source: SourceId,
    pub name: String,
    pub usings: Vec<String>,
    pub lines: LineIndex,
}

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: Ty,
    pub public: bool,
    pub is_static: bool,
    /// Slot in the instance or static field table.
    pub slot: u16,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Normal,
    Constructor,
    StaticInit,
}

#[derive(Debug, Clone)]
pub struct ParamSymbol {
    pub name: String,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: String,
    pub kind: MethodKind,
    pub public: bool,
    pub is_static: bool,
    pub params: Vec<ParamSymbol>,
    pub ret: Ty,
    /// Declared body; `None` for synthesized members.
    pub decl: Option<Block>,
    /// Filled in by the resolve stage.
    pub body: Option<TypedBody>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub name: String,
    pub full_name: String,
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub public: bool,
    pub parent: Option<TypeId>,
    pub nested: IndexMap<String, TypeId>,
    /// Index into [`Symbols::units`] of the declaring file.
    pub unit: usize,
    pub span: Span,
    pub fields: IndexMap<String, FieldSymbol>,
    pub instance_slots: u16,
    pub static_slots: u16,
    pub methods: Vec<MethodSymbol>,
    pub ctor: Option<u16>,
    pub static_init: Option<u16>,
}

impl TypeSymbol {
    pub fn find_method(&self, name: &str) -> Option<(u16, &MethodSymbol)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.kind == MethodKind::Normal && m.name == name)
            .and_then(|(i, m)| Some((u16::try_from(i).ok()?, m)))
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldSymbol> {
        self.fields.values().filter(|f| !f.is_static)
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldSymbol> {
        self.fields.values().filter(|f| f.is_static)
    }
}

/// Where a name is being looked up from.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub unit: usize,
    pub ty: Option<TypeId>,
}

/// Output of the define stage, completed in place by the resolve stage.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    pub units: Vec<UnitScope>,
    pub types: Vec<TypeSymbol>,
    pub by_full_name: IndexMap<String, TypeId>,
    /// Script namespaces, including every dotted prefix.
    pub namespaces: IndexSet<String>,
    pub imports: ImportSet,
    pub entry_point: Option<(TypeId, u16)>,
}

impl Symbols {
    pub fn ty(&self, id: TypeId) -> &TypeSymbol {
        &self.types[id.index()]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut TypeSymbol {
        &mut self.types[id.index()]
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).filter_map(|i| u32::try_from(i).ok().map(TypeId))
    }

    pub fn unit_of(&self, id: TypeId) -> &UnitScope {
        &self.units[self.ty(id).unit]
    }

    /// Display name used in diagnostics.
    pub fn ty_name(&self, ty: &Ty) -> String {
        match ty {
            Ty::Void => "void".into(),
            Ty::Bool => "bool".into(),
            Ty::Int => "int".into(),
            Ty::Float => "float".into(),
            Ty::Str => "string".into(),
            Ty::Null => "null".into(),
            Ty::Object => "object".into(),
            Ty::Script(id) => self.ty(*id).full_name.clone(),
            Ty::Host(h) => h.full_name(),
            Ty::Error => "<error>".into(),
        }
    }

    pub fn ref_name(&self, r: &TypeRef) -> String {
        match r {
            TypeRef::Script(id) => self.ty(*id).full_name.clone(),
            TypeRef::Host(h) => h.full_name(),
        }
    }

    /// The value type a named type denotes. Host primitives map onto the
    /// built-in types.
    pub fn ty_of(&self, r: &TypeRef) -> Ty {
        match r {
            TypeRef::Script(id) => Ty::Script(*id),
            TypeRef::Host(h) => match h.primitive() {
                Some(Primitive::Void) => Ty::Void,
                Some(Primitive::Bool) => Ty::Bool,
                Some(Primitive::Int) => Ty::Int,
                Some(Primitive::Float) => Ty::Float,
                Some(Primitive::String) => Ty::Str,
                Some(Primitive::Object) => Ty::Object,
                None => Ty::Host(h.clone()),
            },
        }
    }

    pub fn ty_of_sig(&self, sig: &TypeSig) -> Ty {
        match sig {
            TypeSig::Void => Ty::Void,
            TypeSig::Bool => Ty::Bool,
            TypeSig::Int => Ty::Int,
            TypeSig::Float => Ty::Float,
            TypeSig::String => Ty::Str,
            TypeSig::Object => Ty::Object,
            TypeSig::Named(full) => self
                .imports
                .lookup_full(full)
                .map_or(Ty::Object, |h| self.ty_of(&TypeRef::Host(h.clone()))),
        }
    }

    pub fn tag_of(&self, ty: &Ty) -> TypeTag {
        match ty {
            Ty::Void => TypeTag::Void,
            Ty::Bool => TypeTag::Bool,
            Ty::Int => TypeTag::Int,
            Ty::Float => TypeTag::Float,
            Ty::Str => TypeTag::String,
            Ty::Null | Ty::Object | Ty::Error => TypeTag::Object,
            Ty::Script(id) => TypeTag::Script(id.0),
            Ty::Host(h) => TypeTag::Host(h.full_name()),
        }
    }

    /// Implicit conversion from `from` to `to`.
    pub fn assignable(&self, from: &Ty, to: &Ty) -> bool {
        if from == to || from.is_error() || to.is_error() {
            return true;
        }
        match (from, to) {
            (Ty::Int, Ty::Float) => true,
            (Ty::Void, _) => false,
            (_, Ty::Object) => true,
            (Ty::Null, Ty::Str | Ty::Host(_)) => true,
            (Ty::Null, Ty::Script(id)) => self.ty(*id).kind == TypeKind::Class,
            _ => false,
        }
    }

    /// Whether a private member of `owner` is visible from code in `from`.
    pub fn can_access_private(&self, owner: TypeId, from: Option<TypeId>) -> bool {
        let mut cursor = from;
        while let Some(id) = cursor {
            if id == owner {
                return true;
            }
            cursor = self.ty(id).parent;
        }
        false
    }

    // ── Name lookup ───────────────────────────────────────────────

    /// Resolve a simple type name from `scope`: enclosing types and their
    /// nested types, then the enclosing namespaces, then `using`s.
    pub fn lookup_type(&self, name: &str, scope: Scope) -> Option<TypeRef> {
        let mut cursor = scope.ty;
        let mut namespace = None;
        while let Some(id) = cursor {
            let ty = self.ty(id);
            if let Some(nested) = ty.nested.get(name) {
                return Some(TypeRef::Script(*nested));
            }
            if ty.name == name {
                return Some(TypeRef::Script(id));
            }
            namespace = ty.namespace.clone();
            cursor = ty.parent;
        }

        let mut ns = namespace;
        loop {
            if let Some(found) = self.lookup_in_namespace(ns.as_deref(), name) {
                return Some(found);
            }
            match ns {
                Some(current) => ns = current.rfind('.').map(|i| current[..i].to_string()),
                None => break,
            }
        }

        let unit = self.units.get(scope.unit)?;
        unit.usings
            .iter()
            .find_map(|u| self.lookup_in_namespace(Some(u), name))
    }

    pub fn lookup_in_namespace(&self, ns: Option<&str>, name: &str) -> Option<TypeRef> {
        let full = match ns {
            Some(ns) => format!("{ns}.{name}"),
            None => name.to_string(),
        };
        if let Some(id) = self.by_full_name.get(&full) {
            if self.ty(*id).parent.is_none() {
                return Some(TypeRef::Script(*id));
            }
        }
        self.imports.lookup_in(ns, name).cloned().map(TypeRef::Host)
    }

    /// A type nested directly in `outer`.
    pub fn nested_type(&self, outer: &TypeRef, name: &str) -> Option<TypeRef> {
        match outer {
            TypeRef::Script(id) => self.ty(*id).nested.get(name).copied().map(TypeRef::Script),
            TypeRef::Host(_) => None,
        }
    }

    pub fn is_namespace(&self, ns: &str) -> bool {
        self.namespaces.contains(ns) || self.imports.is_namespace(ns)
    }

    /// Resolve a dotted type path.
    pub fn lookup_path(&self, parts: &[String], scope: Scope) -> Option<TypeRef> {
        let (first, rest) = parts.split_first()?;
        if let Some(mut current) = self.lookup_type(first, scope) {
            let mut ok = true;
            for part in rest {
                match self.nested_type(&current, part) {
                    Some(next) => current = next,
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                return Some(current);
            }
        }
        // Namespace-qualified: the longest namespace prefix, then nested types.
        for split in (1..parts.len()).rev() {
            let ns = parts[..split].join(".");
            if !self.is_namespace(&ns) {
                continue;
            }
            let Some(mut current) = self.lookup_in_namespace(Some(&ns), &parts[split]) else {
                continue;
            };
            for part in &parts[split + 1..] {
                current = self.nested_type(&current, part)?;
            }
            return Some(current);
        }
        None
    }

    pub fn resolve_type_expr(&self, te: &TypeExpr, scope: Scope) -> Result<Ty, CompileError> {
        Ok(match &te.kind {
            TypeExprKind::Int => Ty::Int,
            TypeExprKind::Float => Ty::Float,
            TypeExprKind::Bool => Ty::Bool,
            TypeExprKind::String => Ty::Str,
            TypeExprKind::Void => Ty::Void,
            TypeExprKind::Object => Ty::Object,
            TypeExprKind::Named(parts) => match self.lookup_path(parts, scope) {
                Some(found) => self.ty_of(&found),
                None => return Err(unknown_type(&te.kind.display(), te.span)),
            },
        })
    }
}

pub fn unknown_type(name: &str, span: Span) -> CompileError {
    CompileError::type_error(
        codes::UNKNOWN_TYPE,
        format!("The type or namespace name `{name}' could not be found. Are you missing a using directive or a reference?"),
        span,
    )
}

// ── Define stage ────────────────────────────────────────────────────

/// Build the symbol tables for every parsed unit. Problems are returned
/// alongside the (possibly partial) tables, tagged with their source.
pub fn define(units: Vec<ParsedUnit>, imports: &ImportSet) -> (Symbols, Vec<(SourceId, CompileError)>) {
    let mut definer = Definer {
        symbols: Symbols {
            imports: imports.clone(),
            ..Symbols::default()
        },
        pending: Vec::new(),
        errors: Vec::new(),
    };

    let mut usings = Vec::new();
    for parsed in units {
        let unit_index = definer.symbols.units.len();
        definer.symbols.units.push(UnitScope {
            source: parsed.source,
            name: parsed.name,
            usings: Vec::new(),
            lines: parsed.lines,
        });
        let Some(syntax) = parsed.syntax else { continue };
        usings.push((unit_index, syntax.usings));
        for decl in syntax.types {
            definer.declare_type(decl, None, unit_index);
        }
    }

    for (unit_index, directives) in usings {
        definer.resolve_usings(unit_index, directives);
    }

    let pending = std::mem::take(&mut definer.pending);
    for (id, members) in pending {
        definer.define_members(id, members);
    }

    (definer.symbols, definer.errors)
}

struct Definer {
    symbols: Symbols,
    /// Non-type members waiting until every type name is known.
    pending: Vec<(TypeId, Vec<Member>)>,
    errors: Vec<(SourceId, CompileError)>,
}

impl Definer {
    fn error(&mut self, unit: usize, err: CompileError) {
        let source = self.symbols.units.get(unit).map_or(SourceId(0), |u| u.source);
        self.errors.push((source, err));
    }

    fn declare_type(&mut self, decl: TypeDecl, parent: Option<TypeId>, unit: usize) {
        if decl.modifiers.is_static {
            self.error(unit, bad_modifier("static", decl.modifiers.span));
        }
        if parent.is_none() && decl.modifiers.access == Some(Access::Private) {
            self.error(unit, bad_modifier("private", decl.modifiers.span));
        }

        let (full_name, namespace) = match parent {
            Some(p) => {
                let outer = self.symbols.ty(p);
                (format!("{}.{}", outer.full_name, decl.name), outer.namespace.clone())
            }
            None => match &decl.namespace {
                Some(ns) => (format!("{ns}.{}", decl.name), Some(ns.clone())),
                None => (decl.name.clone(), None),
            },
        };

        if self.symbols.by_full_name.contains_key(&full_name) {
            let err = match (parent, &namespace) {
                (Some(p), _) => CompileError::type_error(
                    codes::DUPLICATE_MEMBER,
                    format!(
                        "The type `{}' already contains a definition for `{}'",
                        self.symbols.ty(p).full_name,
                        decl.name
                    ),
                    decl.name_span,
                ),
                (None, Some(ns)) => CompileError::type_error(
                    codes::DUPLICATE_TYPE,
                    format!("The namespace `{ns}' already contains a definition for `{}'", decl.name),
                    decl.name_span,
                ),
                (None, None) => CompileError::type_error(
                    codes::DUPLICATE_TYPE,
                    format!("The global namespace already contains a definition for `{}'", decl.name),
                    decl.name_span,
                ),
            };
            self.error(unit, err);
            return;
        }

        if let Some(ns) = &namespace {
            let mut prefix = String::new();
            for part in ns.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                self.symbols.namespaces.insert(prefix.clone());
            }
        }

        let Ok(index) = u32::try_from(self.symbols.types.len()) else {
            return;
        };
        let id = TypeId(index);
        self.symbols.types.push(TypeSymbol {
            name: decl.name.clone(),
            full_name: full_name.clone(),
            namespace,
            kind: match decl.kind {
                TypeDeclKind::Class => TypeKind::Class,
                TypeDeclKind::Struct => TypeKind::Struct,
            },
            public: decl.modifiers.access == Some(Access::Public),
            parent,
            nested: IndexMap::new(),
            unit,
            span: decl.span,
            fields: IndexMap::new(),
            instance_slots: 0,
            static_slots: 0,
            methods: Vec::new(),
            ctor: None,
            static_init: None,
        });
        self.symbols.by_full_name.insert(full_name, id);
        if let Some(p) = parent {
            self.symbols.ty_mut(p).nested.insert(decl.name.clone(), id);
        }

        let mut members = Vec::new();
        for member in decl.members {
            match member {
                Member::Type(nested) => self.declare_type(nested, Some(id), unit),
                other => members.push(other),
            }
        }
        self.pending.push((id, members));
    }

    fn resolve_usings(&mut self, unit: usize, directives: Vec<UsingDirective>) {
        let mut seen = Vec::new();
        for using in directives {
            if seen.contains(&using.path) {
                self.error(
                    unit,
                    CompileError::warning(
                        codes::DUPLICATE_USING,
                        format!("The using directive for `{}' appeared previously in this namespace", using.path),
                        using.span,
                    ),
                );
                continue;
            }
            if !self.symbols.is_namespace(&using.path) {
                self.error(unit, unknown_type(&using.path, using.span));
            }
            seen.push(using.path);
        }
        if let Some(scope) = self.symbols.units.get_mut(unit) {
            scope.usings = seen;
        }
    }

    fn define_members(&mut self, id: TypeId, members: Vec<Member>) {
        let unit = self.symbols.ty(id).unit;
        let scope = Scope { unit, ty: Some(id) };

        for member in members {
            match member {
                Member::Field(field) => self.define_field(id, scope, field),
                Member::Method(method) => self.define_method(id, scope, method),
                Member::Constructor(ctor) => self.define_ctor(id, scope, ctor),
                Member::Type(_) => {}
            }
        }

        let ty = self.symbols.ty(id);
        let needs_ctor = ty.ctor.is_none();
        let needs_cctor = ty.static_fields().any(|f| f.init.is_some());
        let span = ty.span;
        if needs_ctor {
            self.push_method(id, MethodSymbol {
                name: MethodImage::CTOR.into(),
                kind: MethodKind::Constructor,
                public: true,
                is_static: false,
                params: Vec::new(),
                ret: Ty::Void,
                decl: None,
                body: None,
                span,
            });
        }
        if needs_cctor {
            self.push_method(id, MethodSymbol {
                name: MethodImage::CCTOR.into(),
                kind: MethodKind::StaticInit,
                public: false,
                is_static: true,
                params: Vec::new(),
                ret: Ty::Void,
                decl: None,
                body: None,
                span,
            });
        }
    }

    fn member_name_taken(&self, id: TypeId, name: &str) -> bool {
        let ty = self.symbols.ty(id);
        ty.fields.contains_key(name) || ty.nested.contains_key(name) || ty.find_method(name).is_some()
    }

    fn duplicate_member(&mut self, id: TypeId, name: &str, span: Span) {
        let owner = self.symbols.ty(id).full_name.clone();
        let unit = self.symbols.ty(id).unit;
        self.error(
            unit,
            CompileError::type_error(
                codes::DUPLICATE_MEMBER,
                format!("The type `{owner}' already contains a definition for `{name}'"),
                span,
            ),
        );
    }

    fn resolve_or_report(&mut self, te: &TypeExpr, scope: Scope) -> Ty {
        match self.symbols.resolve_type_expr(te, scope) {
            Ok(ty) => ty,
            Err(e) => {
                self.error(scope.unit, e);
                Ty::Error
            }
        }
    }

    fn define_field(&mut self, id: TypeId, scope: Scope, field: FieldDecl) {
        let ty = self.resolve_or_report(&field.ty, scope);
        if ty == Ty::Void {
            self.error(
                scope.unit,
                CompileError::type_error(
                    codes::NO_CONVERSION,
                    format!("Field `{}' cannot have type `void'", field.name),
                    field.ty.span,
                ),
            );
        }
        if self.member_name_taken(id, &field.name) {
            self.duplicate_member(id, &field.name, field.span);
            return;
        }
        let owner = self.symbols.ty_mut(id);
        let counter = if field.modifiers.is_static {
            &mut owner.static_slots
        } else {
            &mut owner.instance_slots
        };
        let slot = *counter;
        *counter = counter.saturating_add(1);
        owner.fields.insert(field.name.clone(), FieldSymbol {
            name: field.name,
            ty,
            public: field.modifiers.access == Some(Access::Public),
            is_static: field.modifiers.is_static,
            slot,
            init: field.init,
            span: field.span,
        });
    }

    fn define_params(&mut self, scope: Scope, params: &[Param]) -> Vec<ParamSymbol> {
        let mut out: Vec<ParamSymbol> = Vec::new();
        for p in params {
            if out.iter().any(|q| q.name == p.name) {
                self.error(
                    scope.unit,
                    CompileError::type_error(
                        codes::DUPLICATE_PARAMETER,
                        format!("The parameter name `{}' is a duplicate", p.name),
                        p.span,
                    ),
                );
            }
            let ty = self.resolve_or_report(&p.ty, scope);
            out.push(ParamSymbol {
                name: p.name.clone(),
                ty,
                span: p.span,
            });
        }
        out
    }

    fn define_method(&mut self, id: TypeId, scope: Scope, method: MethodDecl) {
        let params = self.define_params(scope, &method.params);
        let ret = match &method.ret {
            Some(te) => self.resolve_or_report(te, scope),
            None => Ty::Void,
        };
        if self.member_name_taken(id, &method.name) {
            self.duplicate_member(id, &method.name, method.span);
            return;
        }
        self.push_method(id, MethodSymbol {
            name: method.name,
            kind: MethodKind::Normal,
            public: method.modifiers.access == Some(Access::Public),
            is_static: method.modifiers.is_static,
            params,
            ret,
            decl: Some(method.body),
            body: None,
            span: method.span,
        });
    }

    fn define_ctor(&mut self, id: TypeId, scope: Scope, ctor: CtorDecl) {
        if ctor.modifiers.is_static {
            self.error(scope.unit, bad_modifier("static", ctor.modifiers.span));
        }
        let params = self.define_params(scope, &ctor.params);
        if self.symbols.ty(id).ctor.is_some() {
            let owner = self.symbols.ty(id).full_name.clone();
            self.error(
                scope.unit,
                CompileError::type_error(
                    codes::DUPLICATE_MEMBER,
                    format!("The type `{owner}' already defines a constructor"),
                    ctor.span,
                ),
            );
            return;
        }
        self.push_method(id, MethodSymbol {
            name: MethodImage::CTOR.into(),
            kind: MethodKind::Constructor,
            public: ctor.modifiers.access == Some(Access::Public),
            is_static: false,
            params,
            ret: Ty::Void,
            decl: Some(ctor.body),
            body: None,
            span: ctor.span,
        });
    }

    fn push_method(&mut self, id: TypeId, method: MethodSymbol) {
        let ty = self.symbols.ty_mut(id);
        let Ok(index) = u16::try_from(ty.methods.len()) else {
            return;
        };
        match method.kind {
            MethodKind::Constructor => ty.ctor = Some(index),
            MethodKind::StaticInit => ty.static_init = Some(index),
            MethodKind::Normal => {}
        }
        ty.methods.push(method);
    }
}

fn bad_modifier(word: &str, span: Span) -> CompileError {
    CompileError::type_error(
        codes::BAD_MODIFIER,
        format!("The modifier `{word}' is not valid for this item"),
        span,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::system;
    use crate::script::{lexer, parser};

    fn parsed(name: &str, src: &str) -> ParsedUnit {
        let syntax = parser::parse(lexer::lex(src, &[]).unwrap()).unwrap();
        ParsedUnit {
            source: SourceId(1),
            name: name.into(),
            syntax: Some(syntax),
            lines: LineIndex::new(src),
        }
    }

    fn system_imports() -> ImportSet {
        let mut imports = ImportSet::new();
        imports.import_module(&system::module());
        imports
    }

    fn define_src(src: &str) -> (Symbols, Vec<u32>) {
        let (symbols, errors) = define(vec![parsed("a.hs", src)], &system_imports());
        (symbols, errors.into_iter().map(|(_, e)| e.code).collect())
    }

    #[test]
    fn declares_types_and_members() {
        let (symbols, errors) = define_src(
            "namespace Demo { public class A {
                let x: int; static let n: int = 1; public fn M(a: int) -> string { return \"\"; }
                class Inner { }
             } }",
        );
        assert!(errors.is_empty(), "{errors:?}");
        let a = symbols.ty(symbols.by_full_name["Demo.A"]);
        assert!(a.public);
        assert_eq!(a.instance_slots, 1);
        assert_eq!(a.static_slots, 1);
        assert!(a.ctor.is_some(), "default constructor is synthesized");
        assert!(a.static_init.is_some());
        assert!(symbols.by_full_name.contains_key("Demo.A.Inner"));
        assert!(symbols.is_namespace("Demo"));
        let (_, m) = a.find_method("M").unwrap();
        assert_eq!(m.params[0].ty, Ty::Int);
        assert_eq!(m.ret, Ty::Str);
    }

    #[test]
    fn duplicate_types_and_members() {
        let (_, errors) = define_src("class A { } class A { }");
        assert_eq!(errors, vec![codes::DUPLICATE_TYPE]);
        let (_, errors) = define_src("class A { let x: int; fn x() { } }");
        assert_eq!(errors, vec![codes::DUPLICATE_MEMBER]);
        let (_, errors) = define_src("class A { fn m(a: int, a: int) { } }");
        assert_eq!(errors, vec![codes::DUPLICATE_PARAMETER]);
    }

    #[test]
    fn unknown_types_and_usings() {
        let (_, errors) = define_src("using Nowhere; class A { let x: Missing; }");
        assert_eq!(errors, vec![codes::UNKNOWN_TYPE, codes::UNKNOWN_TYPE]);
        let (_, errors) = define_src("using System; using System; class A { }");
        assert_eq!(errors, vec![codes::DUPLICATE_USING]);
    }

    #[test]
    fn static_type_modifier_is_rejected() {
        let (_, errors) = define_src("static class A { }");
        assert_eq!(errors, vec![codes::BAD_MODIFIER]);
    }

    #[test]
    fn type_lookup_through_usings_and_nesting() {
        let (symbols, errors) = define_src(
            "using System; namespace N { class Outer { class Inner { } let e: Exception; let i: Inner; } }",
        );
        assert!(errors.is_empty(), "{errors:?}");
        let outer = symbols.by_full_name["N.Outer"];
        let scope = Scope { unit: 0, ty: Some(outer) };
        assert!(matches!(symbols.lookup_type("Inner", scope), Some(TypeRef::Script(_))));
        assert!(matches!(symbols.lookup_type("Console", scope), Some(TypeRef::Host(_))));
        let path = vec!["System".to_string(), "Math".to_string()];
        assert!(matches!(symbols.lookup_path(&path, scope), Some(TypeRef::Host(_))));
        let path = vec!["N".to_string(), "Outer".to_string(), "Inner".to_string()];
        assert!(matches!(symbols.lookup_path(&path, scope), Some(TypeRef::Script(_))));
    }

    #[test]
    fn host_primitives_map_to_builtin_types() {
        let (symbols, _) = define_src("class A { }");
        let string = symbols.imports.lookup_full("System.String").cloned().unwrap();
        assert_eq!(symbols.ty_of(&TypeRef::Host(string)), Ty::Str);
    }

    #[test]
    fn assignability() {
        let (symbols, _) = define_src("class C { } struct S { }");
        let c = Ty::Script(symbols.by_full_name["C"]);
        let s = Ty::Script(symbols.by_full_name["S"]);
        assert!(symbols.assignable(&Ty::Int, &Ty::Float));
        assert!(!symbols.assignable(&Ty::Float, &Ty::Int));
        assert!(symbols.assignable(&Ty::Null, &c));
        assert!(!symbols.assignable(&Ty::Null, &s));
        assert!(symbols.assignable(&s, &Ty::Object));
        assert!(!symbols.assignable(&Ty::Void, &Ty::Object));
    }

    #[test]
    fn line_index() {
        let lines = LineIndex::new("a\nbb\nccc");
        assert_eq!(lines.line_of(0), 1);
        assert_eq!(lines.line_of(2), 2);
        assert_eq!(lines.line_of(6), 3);
    }
}
