//! AST-to-IR lowering.
//!
//! `build` turns a type-checked `TranslationUnit` into an `ir::Module`. It
//! does not trust annotations left on the AST by `sema`: re-resolving
//! rather than annotating, every `TypeNode` encountered here
//! is resolved again through `sema::resolve::resolve_type_lowering` and
//! every attribute list through `sema::attrs::apply_attributes`, using the
//! already-validated `AnalysisResult` only for its typedef/tag/enum-constant
//! namespaces and its `clean_functions` gate.
//!
//! Locals are always materialised as `alloca` + `load`/`store`; this is
//! deliberately naive and relies on `opt::mem2reg` to promote
//! them back to SSA values. Struct-typed expressions are represented by
//! their address: the IR's `IrType` vocabulary has no aggregate case, so an
//! rvalue of record type is just the `Ptr` operand of its storage, and
//! assignment between two such operands goes through `copy_aggregate`'s
//! straight-line, compile-time-unrolled byte copy rather than a synthesised
//! SSA value.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    AsmStmt, AssignOp, BinaryOp, BlockItem, Declaration, Designator, Expr, ExprKind,
    ExternalDecl, ForInit, FunctionDef, GenericAssoc, Initializer, SizeofArg, Stmt, StmtKind,
    StorageClassSpec, TranslationUnit, TypeNode, UnaryOp, VarDecl,
};
use crate::diag::DiagnosticBag;
use crate::ir::{
    BinOp, Callee, ConvOp, FcmpPred, FloatBinOp, Function, GlobalVar, IcmpPred,
    InstrKind, Intrinsic, IrType, Module, Operand, TermKind, ValueId,
};
use crate::ir::value::BlockId;
use crate::lexer::token::{FloatSuffix, IntSuffix};
use crate::sema::resolve::{resolve_type_lowering, AnalysisResult, Tag};
use crate::sema::{attrs, builtins::BuiltinKind, constexpr};
use crate::sema::constexpr::ConstEvalCtx;
use crate::symbol::Section;
use crate::types::{FloatKind, IntRank, Member, Qualifiers, Type, TypeId, TypeTable};

/// Lowers a whole translation unit. `analysis` is consumed mutably because
/// lowering interns fresh types (e.g. function-pointer types synthesised for
/// `typeof`/`sizeof` on a bare function name) into the same `TypeTable`
/// `sema` built.
pub fn build(tu: &TranslationUnit, analysis: &mut AnalysisResult) -> Module {
    let mut module = Module::new();

    let functions = collect_function_sigs(tu, analysis);
    let (globals, mut global_vars) = collect_globals(tu, analysis);

    let mut string_counter = 0u32;
    let mut extra_globals: Vec<GlobalVar> = Vec::new();

    for decl in &tu.decls {
        if let ExternalDecl::Function(fd) = decl {
            if fd.body.is_some() && analysis.clean_functions.contains(&fd.name) {
                let f = build_function(fd, analysis, &globals, &functions, &mut string_counter, &mut extra_globals);
                module.functions.push(f);
            }
        }
    }

    global_vars.extend(extra_globals);
    module.globals = global_vars;
    module
}

// ---------------------------------------------------------------------
// Function signatures, used both to type call arguments/returns and to
// decide whether a call target is a known direct callee.
// ---------------------------------------------------------------------

#[derive(Clone)]
struct FnSig {
    ret: TypeId,
    params: Vec<TypeId>,
    variadic: bool,
}

fn collect_function_sigs(tu: &TranslationUnit, analysis: &mut AnalysisResult) -> HashMap<String, FnSig> {
    let mut out = HashMap::new();
    for decl in &tu.decls {
        if let ExternalDecl::Function(fd) = decl {
            let ret = resolve_type_lowering(&mut analysis.types, &analysis.typedefs, &analysis.tags, &analysis.enum_constants, &fd.ret, &|_| TypeId(0));
            let params = fd
                .params
                .iter()
                .map(|p| resolve_type_lowering(&mut analysis.types, &analysis.typedefs, &analysis.tags, &analysis.enum_constants, &p.ty, &|_| TypeId(0)))
                .collect();
            out.insert(fd.name.clone(), FnSig { ret, params, variadic: fd.variadic });
        }
    }
    out
}

// ---------------------------------------------------------------------
// Global variables
// ---------------------------------------------------------------------

fn should_emit_global(vd: &VarDecl) -> bool {
    !(vd.storage == Some(StorageClassSpec::Extern) && vd.init.is_none())
}

fn collect_globals(tu: &TranslationUnit, analysis: &mut AnalysisResult) -> (HashMap<String, TypeId>, Vec<GlobalVar>) {
    let mut chosen: HashMap<String, &VarDecl> = HashMap::new();
    for decl in &tu.decls {
        if let ExternalDecl::Var(vd) = decl {
            if !should_emit_global(vd) {
                continue;
            }
            let existing_has_init = chosen.get(vd.name.as_str()).map(|e| e.init.is_some()).unwrap_or(false);
            if !existing_has_init {
                chosen.insert(vd.name.clone(), vd);
            }
        }
    }

    let mut types_by_name = HashMap::new();
    let mut out = Vec::new();
    for (name, vd) in &chosen {
        let ty = match analysis.symbols.lookup(name) {
            Some(id) => analysis.symbols.get(id).ty,
            None => resolve_type_lowering(&mut analysis.types, &analysis.typedefs, &analysis.tags, &analysis.enum_constants, &vd.ty, &|_| TypeId(0)),
        };
        types_by_name.insert(name.clone(), ty);
        out.push(lower_global(&mut analysis.types, &analysis.enum_constants, vd, ty));
    }
    (types_by_name, out)
}

fn lower_global(types: &mut TypeTable, enum_constants: &HashMap<String, i64>, vd: &VarDecl, ty: TypeId) -> GlobalVar {
    let size = types.size_of(ty).unwrap_or(0);
    let natural_align = types.align_of(ty).unwrap_or(1).max(1);

    let attr_set = {
        let stub = |_: &TypeNode| types.ty_int;
        let ctx = ConstEvalCtx { types, enum_constants, resolve_type: &stub };
        let mut sink = DiagnosticBag::new();
        attrs::apply_attributes(&vd.attrs, &ctx, &mut sink)
    };
    let align = attr_set.aligned.unwrap_or(natural_align);

    let init_bytes = vd.init.as_ref().map(|init| eval_init_bytes(types, enum_constants, ty, init));
    let is_zero = init_bytes.as_ref().map(|b| b.iter().all(|&x| x == 0)).unwrap_or(true);

    let section = if attr_set.section.is_some() {
        Section::Custom
    } else if is_zero {
        Section::Bss
    } else if types.qualifiers_of(ty).contains(Qualifiers::CONST) {
        Section::Rodata
    } else {
        Section::Data
    };

    GlobalVar {
        name: vd.name.clone(),
        size,
        align,
        section,
        init: if is_zero { None } else { init_bytes },
        weak: attr_set.weak,
    }
}

fn is_char_type(types: &TypeTable, t: TypeId) -> bool {
    matches!(types.get(types.unqualified(t)), Type::Int { rank: IntRank::Char, .. })
}

/// Renders a (possibly nested) initializer into a flat byte image sized for
/// `ty`. Pointer-valued initializers that need a relocation (the address of
/// another global, or a string literal assigned to a `char *`) cannot be
/// resolved to bytes here -- `GlobalVar.init` carries no relocation record
/// (see DESIGN.md) -- and are left as zero, matching this subset compiler's
/// documented data-section limitation.
fn eval_init_bytes(types: &TypeTable, enum_constants: &HashMap<String, i64>, ty: TypeId, init: &Initializer) -> Vec<u8> {
    let size = types.size_of(ty).unwrap_or(0) as usize;
    let mut buf = vec![0u8; size];
    write_init(types, enum_constants, ty, init, &mut buf, 0);
    buf
}

fn write_init(types: &TypeTable, enum_constants: &HashMap<String, i64>, ty: TypeId, init: &Initializer, buf: &mut [u8], base: usize) {
    match init {
        Initializer::Expr(e) => {
            if let Type::Array { elem, .. } = types.get(types.unqualified(ty)) {
                if is_char_type(types, *elem) {
                    if let ExprKind::StringLiteral(s) = &e.kind {
                        let bytes = s.as_bytes();
                        let room = buf.len().saturating_sub(base);
                        for (i, b) in bytes.iter().take(room).enumerate() {
                            buf[base + i] = *b;
                        }
                        return;
                    }
                }
            }
            let stub = |_: &TypeNode| types.ty_int;
            let ctx = ConstEvalCtx { types, enum_constants, resolve_type: &stub };
            let mut sink = DiagnosticBag::new();
            if let Some(v) = constexpr::eval(e, &ctx, &mut sink) {
                write_scalar(types, ty, v, buf, base);
            }
        }
        Initializer::List(items) => match types.get(types.unqualified(ty)).clone() {
            Type::Record(rid) => {
                let rec = types.record(rid).clone();
                let mut cursor = 0usize;
                for (designators, sub) in items {
                    if let Some(Designator::Field(name)) = designators.first() {
                        if let Some(idx) = rec.members.iter().position(|m| &m.name == name) {
                            cursor = idx;
                        }
                    }
                    if let Some(m) = rec.members.get(cursor) {
                        write_init(types, enum_constants, m.ty, sub, buf, base + m.offset as usize);
                    }
                    cursor += 1;
                }
            }
            Type::Array { elem, .. } => {
                let stride = types.size_of(elem).unwrap_or(0) as usize;
                let mut idx = 0usize;
                for (designators, sub) in items {
                    if let Some(Designator::Index(ie)) = designators.first() {
                        let stub = |_: &TypeNode| types.ty_int;
                        let ctx = ConstEvalCtx { types, enum_constants, resolve_type: &stub };
                        let mut sink = DiagnosticBag::new();
                        if let Some(v) = constexpr::eval(ie, &ctx, &mut sink) {
                            idx = v.as_i64().max(0) as usize;
                        }
                    }
                    write_init(types, enum_constants, elem, sub, buf, base + idx * stride);
                    idx += 1;
                }
            }
            _ => {
                if let Some((_, inner)) = items.first() {
                    write_init(types, enum_constants, ty, inner, buf, base);
                }
            }
        },
    }
}

fn write_scalar(types: &TypeTable, ty: TypeId, v: constexpr::ConstValue, buf: &mut [u8], offset: usize) {
    let size = types.size_of(ty).unwrap_or(0) as usize;
    match types.get(types.unqualified(ty)) {
        Type::Float(k) => {
            let f = match v {
                constexpr::ConstValue::Float(f) => f,
                constexpr::ConstValue::Int(i) => i as f64,
            };
            let bytes: Vec<u8> = if matches!(k, FloatKind::Float) { (f as f32).to_le_bytes().to_vec() } else { f.to_le_bytes().to_vec() };
            for (i, b) in bytes.iter().enumerate() {
                if offset + i < buf.len() {
                    buf[offset + i] = *b;
                }
            }
        }
        _ => {
            let i = v.as_i64();
            let bytes = (i as u64).to_le_bytes();
            for k in 0..size.min(8) {
                if offset + k < buf.len() {
                    buf[offset + k] = bytes[k];
                }
            }
        }
    }
}

fn zero_operand(ty: IrType) -> Operand {
    if ty.is_float() {
        Operand::ConstFloat { value: 0.0, ty }
    } else {
        Operand::const_int(0, ty)
    }
}

fn ir_type_of(types: &TypeTable, ty: TypeId) -> IrType {
    match types.get(types.unqualified(ty)) {
        Type::Void => IrType::I32,
        Type::Int { rank, .. } => match rank {
            IntRank::Bool | IntRank::Char => IrType::I8,
            IntRank::Short => IrType::I16,
            IntRank::Int | IntRank::Long => IrType::I32,
            IntRank::LongLong => IrType::I64,
        },
        Type::Float(k) => match k {
            FloatKind::Float => IrType::F32,
            FloatKind::Double | FloatKind::LongDouble => IrType::F64,
        },
        Type::Pointer(_) | Type::Array { .. } | Type::Function { .. } | Type::Record(_) => IrType::Ptr,
        Type::Enum(id) => {
            let u = types.enum_def(*id).underlying;
            ir_type_of(types, u)
        }
        Type::Qualified { inner, .. } => ir_type_of(types, *inner),
    }
}

fn icmp_pred(op: BinaryOp, signed: bool) -> IcmpPred {
    use BinaryOp::*;
    match op {
        Eq => IcmpPred::Eq,
        Ne => IcmpPred::Ne,
        Lt => if signed { IcmpPred::Slt } else { IcmpPred::Ult },
        Le => if signed { IcmpPred::Sle } else { IcmpPred::Ule },
        Gt => if signed { IcmpPred::Sgt } else { IcmpPred::Ugt },
        Ge => if signed { IcmpPred::Sge } else { IcmpPred::Uge },
        _ => unreachable!("not a comparison operator"),
    }
}

fn fcmp_pred(op: BinaryOp) -> FcmpPred {
    use BinaryOp::*;
    match op {
        Eq => FcmpPred::Eq,
        Ne => FcmpPred::Ne,
        Lt => FcmpPred::Lt,
        Le => FcmpPred::Le,
        Gt => FcmpPred::Gt,
        Ge => FcmpPred::Ge,
        _ => unreachable!("not a comparison operator"),
    }
}

fn int_binop_of(op: BinaryOp, signed: bool) -> BinOp {
    use BinaryOp::*;
    match op {
        Add => BinOp::Add,
        Sub => BinOp::Sub,
        Mul => BinOp::Mul,
        Div => if signed { BinOp::SDiv } else { BinOp::UDiv },
        Mod => if signed { BinOp::SRem } else { BinOp::URem },
        Shl => BinOp::Shl,
        Shr => if signed { BinOp::Ashr } else { BinOp::Lshr },
        BitAnd => BinOp::And,
        BitOr => BinOp::Or,
        BitXor => BinOp::Xor,
        _ => unreachable!("not an arithmetic/bitwise operator"),
    }
}

fn float_binop_of(op: BinaryOp) -> FloatBinOp {
    use BinaryOp::*;
    match op {
        Add => FloatBinOp::Add,
        Sub => FloatBinOp::Sub,
        Mul => FloatBinOp::Mul,
        Div => FloatBinOp::Div,
        _ => unreachable!("not a floating arithmetic operator"),
    }
}

// ---------------------------------------------------------------------
// Per-function lowering
// ---------------------------------------------------------------------

#[derive(Clone, Copy)]
enum LocalSlot {
    /// An `alloca`'d stack slot.
    Alloca(ValueId),
    /// A function-local `static`, materialised as its own global.
    Static,
}

/// A resolved assignment target, computed once and reused for both the
/// load (compound assignment's "current value") and the store, so an
/// lvalue with side effects (`arr[i++]`) is only ever evaluated once.
enum Target {
    Plain(Operand, TypeId),
    Bitfield { ptr: Operand, unit_ty: TypeId, bit_offset: u32, width: u32, declared_ty: TypeId },
}

struct FunctionBuilder<'a> {
    func: Function,
    types: &'a mut TypeTable,
    typedefs: &'a HashMap<String, TypeId>,
    tags: &'a HashMap<String, Tag>,
    enum_constants: &'a HashMap<String, i64>,
    globals: &'a HashMap<String, TypeId>,
    functions: &'a HashMap<String, FnSig>,
    locals: Vec<HashMap<String, (LocalSlot, TypeId)>>,
    static_labels: HashMap<String, String>,
    cur_block: BlockId,
    break_blocks: Vec<BlockId>,
    continue_blocks: Vec<BlockId>,
    label_blocks: HashMap<String, BlockId>,
    ret_ty: TypeId,
    string_counter: &'a mut u32,
    extra_globals: &'a mut Vec<GlobalVar>,
}

fn build_function(
    fd: &FunctionDef,
    analysis: &mut AnalysisResult,
    globals: &HashMap<String, TypeId>,
    functions: &HashMap<String, FnSig>,
    string_counter: &mut u32,
    extra_globals: &mut Vec<GlobalVar>,
) -> Function {
    let sig = functions.get(&fd.name).cloned().unwrap_or_else(|| FnSig { ret: TypeId(0), params: Vec::new(), variadic: fd.variadic });

    let func = Function::new(fd.name.clone(), fd.variadic);
    let mut fb = FunctionBuilder {
        func,
        types: &mut analysis.types,
        typedefs: &analysis.typedefs,
        tags: &analysis.tags,
        enum_constants: &analysis.enum_constants,
        globals,
        functions,
        locals: vec![HashMap::new()],
        static_labels: HashMap::new(),
        cur_block: BlockId(0),
        break_blocks: Vec::new(),
        continue_blocks: Vec::new(),
        label_blocks: HashMap::new(),
        ret_ty: sig.ret,
        string_counter,
        extra_globals,
    };
    fb.cur_block = fb.func.entry;
    fb.func.ret = if sig.ret == fb.types.ty_void { None } else { Some(ir_type_of(fb.types, sig.ret)) };

    for (p, &ty) in fd.params.iter().zip(sig.params.iter()) {
        let ir_ty = ir_type_of(fb.types, ty);
        let pval = fb.func.add_param(ir_ty);
        if let Some(name) = &p.name {
            let size = fb.types.size_of(ty).unwrap_or(8).max(1);
            let align = fb.types.align_of(ty).unwrap_or(size).max(1);
            let slot = fb.func.push_instr(fb.cur_block, IrType::Ptr, InstrKind::Alloca { size, align, name: name.clone() });
            fb.func.push_void_instr(fb.cur_block, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::Value(pval) });
            fb.locals.last_mut().unwrap().insert(name.clone(), (LocalSlot::Alloca(slot), ty));
        }
    }

    if let Some(body) = &fd.body {
        let mut labels = HashSet::new();
        collect_labels_items(body, &mut labels);
        for l in labels {
            let b = fb.func.new_block(format!("L_{l}"));
            fb.label_blocks.insert(l, b);
        }
        fb.lower_block_items(body);
    }

    if !fb.cur_terminated() {
        if fb.ret_ty == fb.types.ty_void {
            fb.func.set_terminator(fb.cur_block, TermKind::Ret(None));
        } else {
            let ir_ty = ir_type_of(fb.types, fb.ret_ty);
            fb.func.set_terminator(fb.cur_block, TermKind::Ret(Some(zero_operand(ir_ty))));
        }
    }

    fb.func.link_cfg();
    fb.func
}

fn collect_labels_items(items: &[BlockItem], out: &mut HashSet<String>) {
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
        StmtKind::Compound(items) => collect_labels_items(items, out),
        StmtKind::If { then_branch, else_branch, .. } => {
            collect_labels_stmt(then_branch, out);
            if let Some(e) = else_branch {
                collect_labels_stmt(e, out);
            }
        }
        StmtKind::Switch { body, .. } => collect_labels_stmt(body, out),
        StmtKind::Case { stmt, .. } | StmtKind::Default { stmt } => collect_labels_stmt(stmt, out),
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_labels_stmt(body, out),
        StmtKind::For { body, .. } => collect_labels_stmt(body, out),
        _ => {}
    }
}

enum SwitchItem<'a> {
    Label(Option<&'a Expr>),
    Decl(&'a Declaration),
    Stmt(&'a Stmt),
}

fn flatten_switch_body<'a>(body: &'a Stmt, out: &mut Vec<SwitchItem<'a>>) {
    match &body.kind {
        StmtKind::Compound(items) => {
            for item in items {
                match item {
                    BlockItem::Decl(d) => out.push(SwitchItem::Decl(d)),
                    BlockItem::Stmt(s) => flatten_switch_stmt(s, out),
                }
            }
        }
        _ => flatten_switch_stmt(body, out),
    }
}

fn flatten_switch_stmt<'a>(s: &'a Stmt, out: &mut Vec<SwitchItem<'a>>) {
    match &s.kind {
        StmtKind::Case { value, stmt } => {
            out.push(SwitchItem::Label(Some(value.as_ref())));
            flatten_switch_stmt(stmt, out);
        }
        StmtKind::Default { stmt } => {
            out.push(SwitchItem::Label(None));
            flatten_switch_stmt(stmt, out);
        }
        _ => out.push(SwitchItem::Stmt(s)),
    }
}

impl<'a> FunctionBuilder<'a> {
    fn cur_terminated(&self) -> bool {
        self.func.block(self.cur_block).is_terminated()
    }

    fn sink_block(&mut self) {
        self.cur_block = self.func.new_block("unreachable");
    }

    fn push_scope(&mut self) {
        self.locals.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.locals.pop();
    }

    fn lookup_local(&self, name: &str) -> Option<(LocalSlot, TypeId)> {
        for scope in self.locals.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(*v);
            }
        }
        None
    }

    fn ir_ty(&self, t: TypeId) -> IrType {
        ir_type_of(self.types, t)
    }

    fn is_signed(&self, t: TypeId) -> bool {
        match self.types.get(self.types.unqualified(t)) {
            Type::Int { signed, .. } => *signed,
            _ => true,
        }
    }

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
        match self.types.get(self.types.unqualified(t)) {
            Type::Int { rank, signed } => (*rank, *signed),
            Type::Enum(_) => (IntRank::Int, true),
            _ => (IntRank::Int, true),
        }
    }

    /// The usual arithmetic conversions, mirrored from `sema::resolve`
    /// since `ir_builder` re-derives types rather than reading them off
    /// the AST.
    fn common_arith_type(&mut self, a: TypeId, b: TypeId) -> TypeId {
        let a = self.types.unqualified(a);
        let b = self.types.unqualified(b);
        if a == self.types.ty_long_double || b == self.types.ty_long_double {
            return self.types.ty_long_double;
        }
        if self.types.is_float(a) || self.types.is_float(b) {
            let has_double = matches!(self.types.get(a), Type::Float(FloatKind::Double)) || matches!(self.types.get(b), Type::Float(FloatKind::Double));
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

    fn resolve_ty(&mut self, node: &TypeNode) -> TypeId {
        let locals_ref = &self.locals;
        let globals_ref = self.globals;
        let expr_ty = move |e: &Expr| -> TypeId {
            if let ExprKind::Ident(name) = &e.kind {
                for scope in locals_ref.iter().rev() {
                    if let Some((_, ty)) = scope.get(name) {
                        return *ty;
                    }
                }
                if let Some(ty) = globals_ref.get(name) {
                    return *ty;
                }
            }
            TypeId(0)
        };
        resolve_type_lowering(self.types, self.typedefs, self.tags, self.enum_constants, node, &expr_ty)
    }

    fn const_eval(&self, e: &Expr) -> Option<i64> {
        let stub = |_: &TypeNode| TypeId(0);
        let ctx = ConstEvalCtx { types: self.types, enum_constants: self.enum_constants, resolve_type: &stub };
        let mut sink = DiagnosticBag::new();
        constexpr::eval(e, &ctx, &mut sink).map(|v| v.as_i64())
    }

    fn find_member(&self, ty: TypeId, name: &str) -> Option<Member> {
        match self.types.get(self.types.unqualified(ty)) {
            Type::Record(r) => self.types.record(*r).members.iter().find(|m| m.name == name).cloned(),
            _ => None,
        }
    }

    fn is_aggregate(&self, ty: TypeId) -> bool {
        matches!(self.types.get(self.types.unqualified(ty)), Type::Record(_))
    }

    /// A static-type inference pass mirroring `sema::resolve`'s checker
    /// closely enough for `sizeof`/`_Generic`/builtin dispatch, which need
    /// an expression's type without evaluating it: `sizeof` does not
    /// evaluate its operand.
    fn expr_static_type(&mut self, e: &Expr) -> TypeId {
        match &e.kind {
            ExprKind::IntLiteral { suffix, .. } => self.int_literal_type(*suffix),
            ExprKind::FloatLiteral { suffix, .. } => match suffix {
                FloatSuffix::Float => self.types.ty_float,
                FloatSuffix::LongDouble => self.types.ty_long_double,
                FloatSuffix::None => self.types.ty_double,
            },
            ExprKind::CharLiteral { .. } => self.types.ty_int,
            ExprKind::StringLiteral(_) => {
                let c = self.types.ty_char;
                self.types.pointer_to(c)
            }
            ExprKind::Ident(name) => {
                if let Some((_, ty)) = self.lookup_local(name) {
                    return ty;
                }
                if let Some(&ty) = self.globals.get(name) {
                    return ty;
                }
                if self.enum_constants.contains_key(name) {
                    return self.types.ty_int;
                }
                if let Some(sig) = self.functions.get(name).cloned() {
                    let fn_ty = self.types.intern(Type::Function { ret: sig.ret, params: sig.params, variadic: sig.variadic });
                    return self.types.pointer_to(fn_ty);
                }
                self.types.ty_int
            }
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Not => self.types.ty_int,
                _ => self.expr_static_type(expr),
            },
            ExprKind::PostInc(inner) | ExprKind::PostDec(inner) => self.expr_static_type(inner),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::LogAnd | BinaryOp::LogOr => self.types.ty_int,
                _ => {
                    let lt = self.expr_static_type(lhs);
                    let rt = self.expr_static_type(rhs);
                    if self.types.is_pointer(lt) {
                        lt
                    } else if self.types.is_pointer(rt) {
                        rt
                    } else {
                        self.common_arith_type(lt, rt)
                    }
                }
            },
            ExprKind::Ternary { then_expr, else_expr, cond } => match then_expr {
                Some(te) => self.expr_static_type(te),
                None => {
                    let _ = cond;
                    self.expr_static_type(else_expr)
                }
            },
            ExprKind::Assign { target, .. } => self.expr_static_type(target),
            ExprKind::Call { callee, .. } => {
                if let ExprKind::Ident(name) = &callee.kind {
                    if let Some(sig) = self.functions.get(name).cloned() {
                        return sig.ret;
                    }
                }
                let ct = self.expr_static_type(callee);
                match self.types.get(self.types.unqualified(ct)).clone() {
                    Type::Pointer(p) => match self.types.get(self.types.unqualified(p)).clone() {
                        Type::Function { ret, .. } => ret,
                        _ => self.types.ty_int,
                    },
                    Type::Function { ret, .. } => ret,
                    _ => self.types.ty_int,
                }
            }
            ExprKind::Index { base, .. } => {
                let bt = self.expr_static_type(base);
                match self.types.get(self.types.unqualified(bt)).clone() {
                    Type::Pointer(p) => p,
                    Type::Array { elem, .. } => elem,
                    _ => self.types.ty_int,
                }
            }
            ExprKind::Member { base, name, arrow } => {
                let bt = self.expr_static_type(base);
                let rt = if *arrow {
                    match self.types.get(self.types.unqualified(bt)) {
                        Type::Pointer(p) => *p,
                        _ => bt,
                    }
                } else {
                    bt
                };
                self.find_member(rt, name).map(|m| m.ty).unwrap_or(self.types.ty_int)
            }
            ExprKind::AddrOf(inner) => {
                let it = self.expr_static_type(inner);
                self.types.pointer_to(it)
            }
            ExprKind::Deref(inner) => {
                let it = self.expr_static_type(inner);
                match self.types.get(self.types.unqualified(it)) {
                    Type::Pointer(p) => *p,
                    _ => it,
                }
            }
            ExprKind::Cast { ty, .. } => self.resolve_ty(ty),
            ExprKind::Sizeof(_) | ExprKind::Alignof(_) | ExprKind::BuiltinOffsetof { .. } => self.types.ty_ulong,
            ExprKind::BuiltinTypesCompatibleP { .. } | ExprKind::BuiltinConstantP(_) => self.types.ty_int,
            ExprKind::CompoundLiteral { ty, .. } => self.resolve_ty(ty),
            ExprKind::Comma(_, rhs) => self.expr_static_type(rhs),
            ExprKind::StmtExpr(items) => {
                for item in items.iter().rev() {
                    if let BlockItem::Stmt(s) = item {
                        if let StmtKind::Expr(Some(e)) = &s.kind {
                            return self.expr_static_type(e);
                        }
                    }
                }
                self.types.ty_void
            }
            ExprKind::Generic { controlling, assocs } => self.generic_result_type(controlling, assocs),
            ExprKind::BuiltinChooseExpr { cond, a, b } => match self.const_eval(cond) {
                Some(v) if v != 0 => self.expr_static_type(a),
                _ => self.expr_static_type(b),
            },
            ExprKind::BuiltinVaStart { .. } | ExprKind::BuiltinVaEnd(_) => self.types.ty_void,
            ExprKind::BuiltinVaArg { ty, .. } => self.resolve_ty(ty),
            ExprKind::BuiltinCall { .. } => self.types.ty_int,
        }
    }

    fn generic_result_type(&mut self, controlling: &Expr, assocs: &[GenericAssoc]) -> TypeId {
        let ct = self.expr_static_type(controlling);
        for a in assocs {
            if let Some(t) = &a.ty {
                let tid = self.resolve_ty(t);
                if self.types.types_compatible(tid, ct) {
                    return self.expr_static_type(&a.expr);
                }
            }
        }
        for a in assocs {
            if a.ty.is_none() {
                return self.expr_static_type(&a.expr);
            }
        }
        self.types.ty_int
    }

    // -------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------

    fn lower_block_items(&mut self, items: &[BlockItem]) {
        for item in items {
            self.lower_block_item(item);
        }
    }

    fn lower_block_item(&mut self, item: &BlockItem) {
        match item {
            BlockItem::Decl(d) => self.lower_decl(d),
            BlockItem::Stmt(s) => self.lower_stmt(s),
        }
    }

    fn lower_decl(&mut self, d: &Declaration) {
        if let Declaration::Var(vd) = d {
            self.lower_local_var(vd);
        }
    }

    fn lower_local_var(&mut self, vd: &VarDecl) {
        let ty = self.resolve_ty(&vd.ty);
        if vd.storage == Some(StorageClassSpec::Static) {
            let label = format!("{}.{}", self.func.name, vd.name);
            let size = self.types.size_of(ty).unwrap_or(8).max(1);
            let align = self.types.align_of(ty).unwrap_or(size).max(1);
            let init_bytes = vd.init.as_ref().map(|init| eval_init_bytes(self.types, self.enum_constants, ty, init));
            let is_zero = init_bytes.as_ref().map(|b| b.iter().all(|&x| x == 0)).unwrap_or(true);
            self.extra_globals.push(GlobalVar {
                name: label.clone(),
                size,
                align,
                section: if is_zero { Section::Bss } else { Section::Data },
                init: if is_zero { None } else { init_bytes },
                weak: false,
            });
            self.static_labels.insert(vd.name.clone(), label);
            self.locals.last_mut().unwrap().insert(vd.name.clone(), (LocalSlot::Static, ty));
        } else {
            let size = self.types.size_of(ty).unwrap_or(8).max(1);
            let align = self.types.align_of(ty).unwrap_or(size).max(1);
            let slot = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Alloca { size, align, name: vd.name.clone() });
            self.locals.last_mut().unwrap().insert(vd.name.clone(), (LocalSlot::Alloca(slot), ty));
            if let Some(init) = &vd.init {
                self.lower_local_init(Operand::Value(slot), ty, init);
            }
        }
    }

    fn lower_local_init(&mut self, ptr: Operand, ty: TypeId, init: &Initializer) {
        match init {
            Initializer::Expr(e) => {
                let (val, vty) = self.lower_rvalue(e);
                self.store_lvalue(ptr, ty, val, vty);
            }
            Initializer::List(items) => match self.types.get(self.types.unqualified(ty)).clone() {
                Type::Record(rid) => {
                    let rec = self.types.record(rid).clone();
                    let mut cursor = 0usize;
                    for (designators, sub) in items {
                        if let Some(Designator::Field(name)) = designators.first() {
                            if let Some(idx) = rec.members.iter().position(|m| &m.name == name) {
                                cursor = idx;
                            }
                        }
                        if let Some(m) = rec.members.get(cursor).cloned() {
                            let mp = self.gep_const(ptr.clone(), m.offset);
                            self.lower_local_init(mp, m.ty, sub);
                        }
                        cursor += 1;
                    }
                }
                Type::Array { elem, .. } => {
                    let stride = self.types.size_of(elem).unwrap_or(0);
                    let mut idx = 0u32;
                    for (designators, sub) in items {
                        if let Some(Designator::Index(ie)) = designators.first() {
                            if let Some(v) = self.const_eval(ie) {
                                idx = v.max(0) as u32;
                            }
                        }
                        let ep = self.gep_const(ptr.clone(), idx * stride);
                        self.lower_local_init(ep, elem, sub);
                        idx += 1;
                    }
                }
                _ => {
                    if let Some((_, inner)) = items.first() {
                        self.lower_local_init(ptr, ty, inner);
                    }
                }
            },
        }
    }

    fn gep_const(&mut self, base: Operand, byte_offset: u32) -> Operand {
        if byte_offset == 0 {
            return base;
        }
        let v = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Gep { base, index: Operand::const_int(byte_offset as i64, IrType::I64), elem_size: 1 });
        Operand::Value(v)
    }

    fn copy_aggregate(&mut self, dst: Operand, src: Operand, size: u32) {
        let mut off = 0u32;
        while off + 8 <= size {
            let v = {
                let p = self.gep_const(src.clone(), off);
                self.func.push_instr(self.cur_block, IrType::I64, InstrKind::Load { ptr: p })
            };
            let p = self.gep_const(dst.clone(), off);
            self.func.push_void_instr(self.cur_block, InstrKind::Store { ptr: p, value: Operand::Value(v) });
            off += 8;
        }
        while off + 4 <= size {
            let v = {
                let p = self.gep_const(src.clone(), off);
                self.func.push_instr(self.cur_block, IrType::I32, InstrKind::Load { ptr: p })
            };
            let p = self.gep_const(dst.clone(), off);
            self.func.push_void_instr(self.cur_block, InstrKind::Store { ptr: p, value: Operand::Value(v) });
            off += 4;
        }
        while off < size {
            let v = {
                let p = self.gep_const(src.clone(), off);
                self.func.push_instr(self.cur_block, IrType::I8, InstrKind::Load { ptr: p })
            };
            let p = self.gep_const(dst.clone(), off);
            self.func.push_void_instr(self.cur_block, InstrKind::Store { ptr: p, value: Operand::Value(v) });
            off += 1;
        }
    }

    fn store_lvalue(&mut self, ptr: Operand, ty: TypeId, value: Operand, value_ty: TypeId) -> Operand {
        if self.is_aggregate(ty) {
            let size = self.types.size_of(ty).unwrap_or(0);
            self.copy_aggregate(ptr, value.clone(), size);
            value
        } else {
            let converted = self.convert_value(value, value_ty, ty);
            self.func.push_void_instr(self.cur_block, InstrKind::Store { ptr, value: converted.clone() });
            converted
        }
    }

    fn lower_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Compound(items) => {
                self.push_scope();
                self.lower_block_items(items);
                self.pop_scope();
            }
            StmtKind::Expr(e) => {
                if let Some(e) = e {
                    self.lower_rvalue(e);
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let (cv, cty) = self.lower_rvalue(cond);
                let ir = self.ir_ty(cty);
                let cond_i1 = self.truthy(cv, ir);
                let then_b = self.func.new_block("if.then");
                let else_b = self.func.new_block("if.else");
                let merge_b = self.func.new_block("if.end");
                self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: then_b, else_block: else_b });
                self.cur_block = then_b;
                self.lower_stmt(then_branch);
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
                }
                self.cur_block = else_b;
                if let Some(eb) = else_branch {
                    self.lower_stmt(eb);
                }
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
                }
                self.cur_block = merge_b;
            }
            StmtKind::Switch { cond, body } => self.lower_switch(cond, body),
            StmtKind::Case { stmt, .. } | StmtKind::Default { stmt } => self.lower_stmt(stmt),
            StmtKind::While { cond, body } => {
                let head = self.func.new_block("while.cond");
                let body_b = self.func.new_block("while.body");
                let end_b = self.func.new_block("while.end");
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(head));
                }
                self.cur_block = head;
                let (cv, cty) = self.lower_rvalue(cond);
                let ir = self.ir_ty(cty);
                let cond_i1 = self.truthy(cv, ir);
                self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: body_b, else_block: end_b });
                self.cur_block = body_b;
                self.break_blocks.push(end_b);
                self.continue_blocks.push(head);
                self.lower_stmt(body);
                self.break_blocks.pop();
                self.continue_blocks.pop();
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(head));
                }
                self.cur_block = end_b;
            }
            StmtKind::DoWhile { body, cond } => {
                let body_b = self.func.new_block("do.body");
                let cond_b = self.func.new_block("do.cond");
                let end_b = self.func.new_block("do.end");
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(body_b));
                }
                self.cur_block = body_b;
                self.break_blocks.push(end_b);
                self.continue_blocks.push(cond_b);
                self.lower_stmt(body);
                self.break_blocks.pop();
                self.continue_blocks.pop();
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(cond_b));
                }
                self.cur_block = cond_b;
                let (cv, cty) = self.lower_rvalue(cond);
                let ir = self.ir_ty(cty);
                let cond_i1 = self.truthy(cv, ir);
                self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: body_b, else_block: end_b });
                self.cur_block = end_b;
            }
            StmtKind::For { init, cond, step, body } => {
                self.push_scope();
                if let Some(init) = init {
                    match init {
                        ForInit::Decl(decls) => {
                            for vd in decls {
                                self.lower_local_var(vd);
                            }
                        }
                        ForInit::Expr(e) => {
                            self.lower_rvalue(e);
                        }
                    }
                }
                let head = self.func.new_block("for.cond");
                let body_b = self.func.new_block("for.body");
                let step_b = self.func.new_block("for.step");
                let end_b = self.func.new_block("for.end");
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(head));
                }
                self.cur_block = head;
                match cond {
                    Some(c) => {
                        let (cv, cty) = self.lower_rvalue(c);
                        let ir = self.ir_ty(cty);
                        let cond_i1 = self.truthy(cv, ir);
                        self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: body_b, else_block: end_b });
                    }
                    None => self.func.set_terminator(self.cur_block, TermKind::Br(body_b)),
                }
                self.cur_block = body_b;
                self.break_blocks.push(end_b);
                self.continue_blocks.push(step_b);
                self.lower_stmt(body);
                self.break_blocks.pop();
                self.continue_blocks.pop();
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(step_b));
                }
                self.cur_block = step_b;
                if let Some(st) = step {
                    self.lower_rvalue(st);
                }
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(head));
                }
                self.cur_block = end_b;
                self.pop_scope();
            }
            StmtKind::Break => {
                if let Some(&b) = self.break_blocks.last() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(b));
                }
                self.sink_block();
            }
            StmtKind::Continue => {
                if let Some(&b) = self.continue_blocks.last() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(b));
                }
                self.sink_block();
            }
            StmtKind::Return(e) => {
                let ret = match e {
                    Some(ex) => {
                        let (v, vty) = self.lower_rvalue(ex);
                        Some(self.convert_value(v, vty, self.ret_ty))
                    }
                    None => None,
                };
                self.func.set_terminator(self.cur_block, TermKind::Ret(ret));
                self.sink_block();
            }
            StmtKind::Labeled { label, stmt } => {
                let b = *self.label_blocks.get(label).expect("labels are pre-scanned before lowering");
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(b));
                }
                self.cur_block = b;
                self.lower_stmt(stmt);
            }
            StmtKind::Goto(label) => {
                let b = *self.label_blocks.get(label).expect("labels are pre-scanned before lowering");
                self.func.set_terminator(self.cur_block, TermKind::Br(b));
                self.sink_block();
            }
            StmtKind::Null => {}
            StmtKind::Asm(asm) => self.lower_asm(asm),
        }
    }

    fn lower_switch(&mut self, cond: &Expr, body: &Stmt) {
        let (cv, cty) = self.lower_rvalue(cond);
        let cir = self.ir_ty(cty);
        let signed = self.is_signed(cty);
        let cv = self.convert_ir(cv, cir, IrType::I32, signed);
        let dispatch_block = self.cur_block;
        let exit_b = self.func.new_block("switch.end");

        let mut flat = Vec::new();
        flatten_switch_body(body, &mut flat);

        let mut cases: Vec<(i64, BlockId)> = Vec::new();
        let mut default_b: Option<BlockId> = None;

        self.break_blocks.push(exit_b);
        let mut started = false;
        for item in &flat {
            match item {
                SwitchItem::Label(val) => {
                    let b = self.func.new_block("switch.case");
                    if started && !self.cur_terminated() {
                        self.func.set_terminator(self.cur_block, TermKind::Br(b));
                    }
                    match *val {
                        Some(e) => cases.push((self.const_eval(e).unwrap_or(0), b)),
                        None => default_b = Some(b),
                    }
                    self.cur_block = b;
                    started = true;
                }
                SwitchItem::Decl(d) => {
                    if !started {
                        self.cur_block = self.func.new_block("switch.unreachable");
                        started = true;
                    }
                    self.lower_decl(*d);
                }
                SwitchItem::Stmt(st) => {
                    if !started {
                        self.cur_block = self.func.new_block("switch.unreachable");
                        started = true;
                    }
                    self.lower_stmt(*st);
                }
            }
        }
        if !self.cur_terminated() {
            self.func.set_terminator(self.cur_block, TermKind::Br(exit_b));
        }
        self.break_blocks.pop();

        self.func.set_terminator(dispatch_block, TermKind::Switch { value: cv, cases, default: default_b.unwrap_or(exit_b) });
        self.cur_block = exit_b;
    }

    fn lower_asm(&mut self, asm: &AsmStmt) {
        let mut inputs = Vec::new();
        for op in &asm.inputs {
            let (v, _) = self.lower_rvalue(&op.expr);
            inputs.push(v);
        }
        let target = asm.outputs.first().map(|o| self.resolve_target(&o.expr));
        let ty = target.as_ref().map(|t| self.target_type(t)).unwrap_or(self.types.ty_void);
        let ir = if ty == self.types.ty_void { IrType::I32 } else { self.ir_ty(ty) };
        let v = self.func.push_instr(self.cur_block, ir, InstrKind::InlineAsm { template: asm.template.clone(), inputs });
        if let Some(t) = target {
            self.store_target(&t, Operand::Value(v), ty);
        }
    }

    // -------------------------------------------------------------
    // Targets (lvalues), including bit-field-aware load/store
    // -------------------------------------------------------------

    fn member_base_ptr(&mut self, base: &Expr, arrow: bool) -> (Operand, TypeId) {
        if arrow {
            let (v, ty) = self.lower_rvalue(base);
            let pointee = match self.types.get(self.types.unqualified(ty)) {
                Type::Pointer(p) => *p,
                _ => ty,
            };
            (v, pointee)
        } else {
            self.lower_lvalue(base)
        }
    }

    fn resolve_target(&mut self, e: &Expr) -> Target {
        if let ExprKind::Member { base, name, arrow } = &e.kind {
            let (base_ptr, record_ty) = self.member_base_ptr(base, *arrow);
            if let Some(m) = self.find_member(record_ty, name) {
                let field_ptr = self.gep_const(base_ptr, m.offset);
                if let Some(width) = m.bit_width {
                    return Target::Bitfield { ptr: field_ptr, unit_ty: m.ty, bit_offset: m.bit_offset, width, declared_ty: m.ty };
                }
                return Target::Plain(field_ptr, m.ty);
            }
            return Target::Plain(base_ptr, self.types.ty_int);
        }
        let (ptr, ty) = self.lower_lvalue(e);
        Target::Plain(ptr, ty)
    }

    fn target_type(&self, t: &Target) -> TypeId {
        match t {
            Target::Plain(_, ty) => *ty,
            Target::Bitfield { declared_ty, .. } => *declared_ty,
        }
    }

    fn load_target(&mut self, t: &Target) -> (Operand, TypeId) {
        match t {
            Target::Plain(ptr, ty) => self.rvalue_from_lvalue(ptr.clone(), *ty),
            Target::Bitfield { ptr, unit_ty, bit_offset, width, declared_ty } => {
                let ir = self.ir_ty(*unit_ty);
                let raw = self.func.push_instr(self.cur_block, ir, InstrKind::Load { ptr: ptr.clone() });
                let shifted = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Lshr, lhs: Operand::Value(raw), rhs: Operand::const_int(*bit_offset as i64, ir) });
                let mask = (1i64 << *width) - 1;
                let masked = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::And, lhs: Operand::Value(shifted), rhs: Operand::const_int(mask, ir) });
                (Operand::Value(masked), *declared_ty)
            }
        }
    }

    fn store_target(&mut self, t: &Target, value: Operand, value_ty: TypeId) -> Operand {
        match t {
            Target::Plain(ptr, ty) => self.store_lvalue(ptr.clone(), *ty, value, value_ty),
            Target::Bitfield { ptr, unit_ty, bit_offset, width, declared_ty } => {
                let ir = self.ir_ty(*unit_ty);
                let converted = self.convert_value(value, value_ty, *declared_ty);
                let mask = (1i64 << *width) - 1;
                let shifted_mask = mask << *bit_offset;
                let cur = self.func.push_instr(self.cur_block, ir, InstrKind::Load { ptr: ptr.clone() });
                let cleared = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::And, lhs: Operand::Value(cur), rhs: Operand::const_int(!shifted_mask, ir) });
                let masked_val = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::And, lhs: converted.clone(), rhs: Operand::const_int(mask, ir) });
                let shifted_val = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Shl, lhs: Operand::Value(masked_val), rhs: Operand::const_int(*bit_offset as i64, ir) });
                let combined = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Or, lhs: Operand::Value(cleared), rhs: Operand::Value(shifted_val) });
                self.func.push_void_instr(self.cur_block, InstrKind::Store { ptr: ptr.clone(), value: Operand::Value(combined) });
                converted
            }
        }
    }

    fn lower_lvalue(&mut self, e: &Expr) -> (Operand, TypeId) {
        match &e.kind {
            ExprKind::Ident(name) => {
                if let Some((slot, ty)) = self.lookup_local(name) {
                    match slot {
                        LocalSlot::Alloca(v) => (Operand::Value(v), ty),
                        LocalSlot::Static => {
                            let label = self.static_labels.get(name).cloned().unwrap_or_else(|| name.clone());
                            (Operand::GlobalAddr(label), ty)
                        }
                    }
                } else if let Some(&ty) = self.globals.get(name) {
                    (Operand::GlobalAddr(name.clone()), ty)
                } else {
                    (Operand::GlobalAddr(name.clone()), self.types.ty_int)
                }
            }
            ExprKind::Deref(inner) => {
                let (v, ty) = self.lower_rvalue(inner);
                let pointee = match self.types.get(self.types.unqualified(ty)) {
                    Type::Pointer(p) => *p,
                    _ => self.types.ty_int,
                };
                (v, pointee)
            }
            ExprKind::Index { base, index } => {
                let (base_v, base_ty) = self.lower_rvalue(base);
                let pointee = match self.types.get(self.types.unqualified(base_ty)) {
                    Type::Pointer(p) => *p,
                    _ => self.types.ty_int,
                };
                let (idx_v, idx_ty) = self.lower_rvalue(index);
                let idx_ir = self.ir_ty(idx_ty);
                let idx_i64 = self.convert_ir(idx_v, idx_ir, IrType::I64, true);
                let elem_size = self.types.size_of(pointee).unwrap_or(1);
                let ptr = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Gep { base: base_v, index: idx_i64, elem_size });
                (Operand::Value(ptr), pointee)
            }
            ExprKind::Member { base, name, arrow } => {
                let (base_ptr, record_ty) = self.member_base_ptr(base, *arrow);
                match self.find_member(record_ty, name) {
                    Some(m) => {
                        let ptr = self.gep_const(base_ptr, m.offset);
                        (ptr, m.ty)
                    }
                    None => (base_ptr, self.types.ty_int),
                }
            }
            ExprKind::CompoundLiteral { ty, init } => {
                let tid = self.resolve_ty(ty);
                let size = self.types.size_of(tid).unwrap_or(8).max(1);
                let align = self.types.align_of(tid).unwrap_or(size).max(1);
                let slot = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Alloca { size, align, name: "compound_literal".into() });
                self.lower_local_init(Operand::Value(slot), tid, init);
                (Operand::Value(slot), tid)
            }
            ExprKind::StringLiteral(s) => self.pool_string(s),
            _ => self.lower_rvalue(e),
        }
    }

    fn rvalue_from_lvalue(&mut self, ptr: Operand, ty: TypeId) -> (Operand, TypeId) {
        match self.types.get(self.types.unqualified(ty)).clone() {
            Type::Array { elem, .. } => (ptr, self.types.pointer_to(elem)),
            Type::Function { .. } => {
                let p = self.types.pointer_to(ty);
                (ptr, p)
            }
            Type::Record(_) => (ptr, ty),
            _ => {
                let ir = self.ir_ty(ty);
                let v = self.func.push_instr(self.cur_block, ir, InstrKind::Load { ptr });
                (Operand::Value(v), ty)
            }
        }
    }

    fn pool_string(&mut self, s: &str) -> (Operand, TypeId) {
        let idx = *self.string_counter;
        *self.string_counter += 1;
        let label = format!(".L.str.{idx}");
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let size = bytes.len() as u32;
        self.extra_globals.push(GlobalVar { name: label.clone(), size, align: 1, section: Section::Rodata, init: Some(bytes), weak: false });
        let c = self.types.ty_char;
        let ty = self.types.pointer_to(c);
        (Operand::GlobalAddr(label), ty)
    }

    // -------------------------------------------------------------
    // Conversions
    // -------------------------------------------------------------

    fn convert_value(&mut self, v: Operand, from_ty: TypeId, to_ty: TypeId) -> Operand {
        if from_ty == to_ty {
            return v;
        }
        let from_ir = self.ir_ty(from_ty);
        let to_ir = self.ir_ty(to_ty);
        let to_signed = self.is_signed(to_ty);
        self.convert_ir(v, from_ir, to_ir, to_signed)
    }

    fn convert_ir(&mut self, v: Operand, from: IrType, to: IrType, to_signed: bool) -> Operand {
        if from == to {
            return v;
        }
        let op = if from.is_float() && !to.is_float() {
            ConvOp::FpToSi
        } else if !from.is_float() && to.is_float() {
            ConvOp::SiToFp
        } else if from == IrType::Ptr && to != IrType::Ptr {
            ConvOp::PtrToInt
        } else if to == IrType::Ptr && from != IrType::Ptr {
            ConvOp::IntToPtr
        } else if from.is_float() && to.is_float() {
            ConvOp::Bitcast
        } else if to.size() > from.size() {
            if to_signed {
                ConvOp::Sext
            } else {
                ConvOp::Zext
            }
        } else {
            ConvOp::Trunc
        };
        Operand::Value(self.func.push_instr(self.cur_block, to, InstrKind::Convert { op, operand: v }))
    }

    fn truthy(&mut self, v: Operand, ty: IrType) -> Operand {
        if ty.is_float() {
            let r = self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Fcmp { pred: FcmpPred::Ne, lhs: v, rhs: Operand::ConstFloat { value: 0.0, ty } });
            Operand::Value(r)
        } else {
            let r = self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Icmp { pred: IcmpPred::Ne, lhs: v, rhs: Operand::const_int(0, ty) });
            Operand::Value(r)
        }
    }

    // -------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------

    fn lower_rvalue(&mut self, e: &Expr) -> (Operand, TypeId) {
        match &e.kind {
            ExprKind::IntLiteral { value, suffix } => {
                let ty = self.int_literal_type(*suffix);
                let ir = self.ir_ty(ty);
                (Operand::const_int(*value as i64, ir), ty)
            }
            ExprKind::FloatLiteral { text, suffix } => {
                let ty = match suffix {
                    FloatSuffix::Float => self.types.ty_float,
                    FloatSuffix::LongDouble => self.types.ty_long_double,
                    FloatSuffix::None => self.types.ty_double,
                };
                let ir = self.ir_ty(ty);
                let v: f64 = text.parse().unwrap_or(0.0);
                (Operand::ConstFloat { value: v, ty: ir }, ty)
            }
            ExprKind::CharLiteral { value, .. } => (Operand::const_int(*value, IrType::I32), self.types.ty_int),
            ExprKind::StringLiteral(s) => self.pool_string(s),
            ExprKind::Ident(name) => {
                if let Some(&v) = self.enum_constants.get(name) {
                    return (Operand::const_int(v, IrType::I32), self.types.ty_int);
                }
                let (ptr, ty) = self.lower_lvalue(e);
                self.rvalue_from_lvalue(ptr, ty)
            }
            ExprKind::Unary { op, expr } => self.lower_unary(*op, expr),
            ExprKind::PostInc(inner) => self.lower_incdec(inner, true, true),
            ExprKind::PostDec(inner) => self.lower_incdec(inner, false, true),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            ExprKind::Ternary { cond, then_expr, else_expr } => self.lower_ternary(cond, then_expr, else_expr),
            ExprKind::Assign { op, target, value } => self.lower_assign(*op, target, value),
            ExprKind::Call { callee, args } => self.lower_call(callee, args),
            ExprKind::Member { base, name, arrow } => self.lower_member_rvalue(base, name, *arrow),
            ExprKind::Index { .. } | ExprKind::Deref(_) => {
                let (ptr, ty) = self.lower_lvalue(e);
                self.rvalue_from_lvalue(ptr, ty)
            }
            ExprKind::AddrOf(inner) => {
                let (ptr, ty) = self.lower_lvalue(inner);
                let p = self.types.pointer_to(ty);
                (ptr, p)
            }
            ExprKind::Cast { ty, expr } => {
                let target = self.resolve_ty(ty);
                let (v, vty) = self.lower_rvalue(expr);
                (self.convert_value(v, vty, target), target)
            }
            ExprKind::Sizeof(arg) => {
                let size = match arg {
                    SizeofArg::Type(t) => {
                        let tid = self.resolve_ty(t);
                        self.types.size_of(tid).unwrap_or(0)
                    }
                    SizeofArg::Expr(ex) => {
                        let ty = self.expr_static_type(ex);
                        self.types.size_of(ty).unwrap_or(0)
                    }
                };
                (Operand::const_int(size as i64, IrType::I64), self.types.ty_ulong)
            }
            ExprKind::Alignof(t) => {
                let tid = self.resolve_ty(t);
                let a = self.types.align_of(tid).unwrap_or(1);
                (Operand::const_int(a as i64, IrType::I64), self.types.ty_ulong)
            }
            ExprKind::CompoundLiteral { .. } => {
                let (ptr, ty) = self.lower_lvalue(e);
                self.rvalue_from_lvalue(ptr, ty)
            }
            ExprKind::StmtExpr(items) => self.lower_stmt_expr(items),
            ExprKind::Comma(lhs, rhs) => {
                self.lower_rvalue(lhs);
                self.lower_rvalue(rhs)
            }
            ExprKind::Generic { controlling, assocs } => self.lower_generic(controlling, assocs),
            ExprKind::BuiltinOffsetof { ty, member } => {
                let tid = self.resolve_ty(ty);
                let off = match self.types.get(self.types.unqualified(tid)) {
                    Type::Record(r) => crate::types::offset_of(self.types, *r, member).unwrap_or(0),
                    _ => 0,
                };
                (Operand::const_int(off as i64, IrType::I64), self.types.ty_ulong)
            }
            ExprKind::BuiltinChooseExpr { cond, a, b } => match self.const_eval(cond) {
                Some(v) if v != 0 => self.lower_rvalue(a),
                _ => self.lower_rvalue(b),
            },
            ExprKind::BuiltinTypesCompatibleP { a, b } => {
                let ta = self.resolve_ty(a);
                let tb = self.resolve_ty(b);
                let c = self.types.types_compatible(ta, tb) as i64;
                (Operand::const_int(c, IrType::I32), self.types.ty_int)
            }
            ExprKind::BuiltinConstantP(inner) => {
                let c = self.const_eval(inner).is_some() as i64;
                (Operand::const_int(c, IrType::I32), self.types.ty_int)
            }
            ExprKind::BuiltinVaStart { va_list, .. } => {
                let (v, _) = self.lower_rvalue(va_list);
                self.func.push_void_instr(self.cur_block, InstrKind::VaStart { va_list: v });
                (Operand::Undef(IrType::I1), self.types.ty_void)
            }
            ExprKind::BuiltinVaArg { va_list, ty } => {
                let tid = self.resolve_ty(ty);
                let (v, _) = self.lower_rvalue(va_list);
                let ir = self.ir_ty(tid);
                let r = self.func.push_instr(self.cur_block, ir, InstrKind::VaArg { va_list: v });
                (Operand::Value(r), tid)
            }
            ExprKind::BuiltinVaEnd(inner) => {
                let (v, _) = self.lower_rvalue(inner);
                self.func.push_void_instr(self.cur_block, InstrKind::VaEnd { va_list: v });
                (Operand::Undef(IrType::I1), self.types.ty_void)
            }
            ExprKind::BuiltinCall { name, args } => self.lower_builtin_call(name, args),
        }
    }

    fn lower_member_rvalue(&mut self, base: &Expr, name: &str, arrow: bool) -> (Operand, TypeId) {
        let (base_ptr, record_ty) = self.member_base_ptr(base, arrow);
        let Some(m) = self.find_member(record_ty, name) else {
            return (base_ptr, self.types.ty_int);
        };
        let field_ptr = self.gep_const(base_ptr, m.offset);
        if let Some(width) = m.bit_width {
            let ir = self.ir_ty(m.ty);
            let raw = self.func.push_instr(self.cur_block, ir, InstrKind::Load { ptr: field_ptr });
            let shifted = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Lshr, lhs: Operand::Value(raw), rhs: Operand::const_int(m.bit_offset as i64, ir) });
            let mask = (1i64 << width) - 1;
            let masked = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::And, lhs: Operand::Value(shifted), rhs: Operand::const_int(mask, ir) });
            (Operand::Value(masked), m.ty)
        } else {
            self.rvalue_from_lvalue(field_ptr, m.ty)
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, expr: &Expr) -> (Operand, TypeId) {
        match op {
            UnaryOp::Not => {
                let (v, ty) = self.lower_rvalue(expr);
                let ir = self.ir_ty(ty);
                let t = self.truthy(v, ir);
                let notted = self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Icmp { pred: IcmpPred::Eq, lhs: t, rhs: Operand::const_int(0, IrType::I1) });
                let ext = self.func.push_instr(self.cur_block, IrType::I32, InstrKind::Convert { op: ConvOp::Zext, operand: Operand::Value(notted) });
                (Operand::Value(ext), self.types.ty_int)
            }
            UnaryOp::BitNot => {
                let (v, ty) = self.lower_rvalue(expr);
                let ir = self.ir_ty(ty);
                let r = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Xor, lhs: v, rhs: Operand::const_int(-1, ir) });
                (Operand::Value(r), ty)
            }
            UnaryOp::Neg => {
                let (v, ty) = self.lower_rvalue(expr);
                let ir = self.ir_ty(ty);
                if ir.is_float() {
                    let r = self.func.push_instr(self.cur_block, ir, InstrKind::FloatBinary { op: FloatBinOp::Sub, lhs: Operand::ConstFloat { value: 0.0, ty: ir }, rhs: v });
                    (Operand::Value(r), ty)
                } else {
                    let r = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: BinOp::Sub, lhs: Operand::const_int(0, ir), rhs: v });
                    (Operand::Value(r), ty)
                }
            }
            UnaryOp::Plus => self.lower_rvalue(expr),
            UnaryOp::PreInc => self.lower_incdec(expr, true, false),
            UnaryOp::PreDec => self.lower_incdec(expr, false, false),
        }
    }

    fn lower_incdec(&mut self, target: &Expr, is_inc: bool, is_post: bool) -> (Operand, TypeId) {
        let t = self.resolve_target(target);
        let (old, ty) = self.load_target(&t);
        let ir = self.ir_ty(ty);
        let is_ptr = self.types.is_pointer(ty);
        let next = if is_ptr {
            let pointee = match self.types.get(self.types.unqualified(ty)) {
                Type::Pointer(p) => *p,
                _ => ty,
            };
            let elem_size = self.types.size_of(pointee).unwrap_or(1);
            let step = if is_inc { 1 } else { -1 };
            let v = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Gep { base: old.clone(), index: Operand::const_int(step, IrType::I64), elem_size });
            Operand::Value(v)
        } else if ir.is_float() {
            let op = if is_inc { FloatBinOp::Add } else { FloatBinOp::Sub };
            let v = self.func.push_instr(self.cur_block, ir, InstrKind::FloatBinary { op, lhs: old.clone(), rhs: Operand::ConstFloat { value: 1.0, ty: ir } });
            Operand::Value(v)
        } else {
            let op = if is_inc { BinOp::Add } else { BinOp::Sub };
            let v = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op, lhs: old.clone(), rhs: Operand::const_int(1, ir) });
            Operand::Value(v)
        };
        self.store_target(&t, next.clone(), ty);
        if is_post {
            (old, ty)
        } else {
            (next, ty)
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> (Operand, TypeId) {
        if matches!(op, BinaryOp::LogAnd | BinaryOp::LogOr) {
            return self.lower_logical(op, lhs, rhs);
        }
        let (lv, lty) = self.lower_rvalue(lhs);
        let (rv, rty) = self.lower_rvalue(rhs);
        match op {
            BinaryOp::Add | BinaryOp::Sub if self.types.is_pointer(lty) || self.types.is_pointer(rty) => self.lower_additive(op, lv, lty, rv, rty),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => self.lower_compare(op, lv, lty, rv, rty),
            BinaryOp::Shl | BinaryOp::Shr => {
                let ir = self.ir_ty(lty);
                let rir = self.ir_ty(rty);
                let signed = self.is_signed(lty);
                let rv = self.convert_ir(rv, rir, ir, true);
                let bop = int_binop_of(op, signed);
                let r = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: bop, lhs: lv, rhs: rv });
                (Operand::Value(r), lty)
            }
            _ => {
                let common = self.common_arith_type(lty, rty);
                let ir = self.ir_ty(common);
                let lv = self.convert_value(lv, lty, common);
                let rv = self.convert_value(rv, rty, common);
                if ir.is_float() {
                    let fop = float_binop_of(op);
                    let r = self.func.push_instr(self.cur_block, ir, InstrKind::FloatBinary { op: fop, lhs: lv, rhs: rv });
                    (Operand::Value(r), common)
                } else {
                    let signed = self.is_signed(common);
                    let bop = int_binop_of(op, signed);
                    let r = self.func.push_instr(self.cur_block, ir, InstrKind::Binary { op: bop, lhs: lv, rhs: rv });
                    (Operand::Value(r), common)
                }
            }
        }
    }

    fn lower_additive(&mut self, op: BinaryOp, lv: Operand, lty: TypeId, rv: Operand, rty: TypeId) -> (Operand, TypeId) {
        let lp = self.types.is_pointer(lty);
        let rp = self.types.is_pointer(rty);
        if lp && rp {
            let pointee = match self.types.get(self.types.unqualified(lty)) {
                Type::Pointer(p) => *p,
                _ => lty,
            };
            let elem_size = self.types.size_of(pointee).unwrap_or(1).max(1) as i64;
            let li = self.convert_ir(lv, IrType::Ptr, IrType::I64, false);
            let ri = self.convert_ir(rv, IrType::Ptr, IrType::I64, false);
            let diff = self.func.push_instr(self.cur_block, IrType::I64, InstrKind::Binary { op: BinOp::Sub, lhs: li, rhs: ri });
            let scaled = self.func.push_instr(self.cur_block, IrType::I64, InstrKind::Binary { op: BinOp::SDiv, lhs: Operand::Value(diff), rhs: Operand::const_int(elem_size, IrType::I64) });
            return (Operand::Value(scaled), self.types.ty_long);
        }
        let (ptr_val, ptr_ty, idx_val, idx_ty) = if lp { (lv, lty, rv, rty) } else { (rv, rty, lv, lty) };
        let pointee = match self.types.get(self.types.unqualified(ptr_ty)) {
            Type::Pointer(p) => *p,
            _ => ptr_ty,
        };
        let elem_size = self.types.size_of(pointee).unwrap_or(1);
        let idx_ir = self.ir_ty(idx_ty);
        let mut idx = self.convert_ir(idx_val, idx_ir, IrType::I64, true);
        if op == BinaryOp::Sub {
            let neg = self.func.push_instr(self.cur_block, IrType::I64, InstrKind::Binary { op: BinOp::Sub, lhs: Operand::const_int(0, IrType::I64), rhs: idx });
            idx = Operand::Value(neg);
        }
        let ptr = self.func.push_instr(self.cur_block, IrType::Ptr, InstrKind::Gep { base: ptr_val, index: idx, elem_size });
        (Operand::Value(ptr), ptr_ty)
    }

    fn lower_compare(&mut self, op: BinaryOp, lv: Operand, lty: TypeId, rv: Operand, rty: TypeId) -> (Operand, TypeId) {
        let is_ptr = self.types.is_pointer(lty) || self.types.is_pointer(rty);
        let is_float = self.types.is_float(lty) || self.types.is_float(rty);
        let result = if is_ptr {
            let li = self.convert_ir(lv, self.ir_ty(lty), IrType::Ptr, false);
            let ri = self.convert_ir(rv, self.ir_ty(rty), IrType::Ptr, false);
            let pred = icmp_pred(op, false);
            self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Icmp { pred, lhs: li, rhs: ri })
        } else if is_float {
            let common = self.common_arith_type(lty, rty);
            let lv = self.convert_value(lv, lty, common);
            let rv = self.convert_value(rv, rty, common);
            let pred = fcmp_pred(op);
            self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Fcmp { pred, lhs: lv, rhs: rv })
        } else {
            let common = self.common_arith_type(lty, rty);
            let signed = self.is_signed(common);
            let lv = self.convert_value(lv, lty, common);
            let rv = self.convert_value(rv, rty, common);
            let pred = icmp_pred(op, signed);
            self.func.push_instr(self.cur_block, IrType::I1, InstrKind::Icmp { pred, lhs: lv, rhs: rv })
        };
        let ext = self.func.push_instr(self.cur_block, IrType::I32, InstrKind::Convert { op: ConvOp::Zext, operand: Operand::Value(result) });
        (Operand::Value(ext), self.types.ty_int)
    }

    fn lower_logical(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> (Operand, TypeId) {
        let (lv, lty) = self.lower_rvalue(lhs);
        let lir = self.ir_ty(lty);
        let l_truth = self.truthy(lv, lir);
        let rhs_b = self.func.new_block("land.rhs");
        let short_b = self.func.new_block("land.short");
        let merge_b = self.func.new_block("land.end");
        if op == BinaryOp::LogAnd {
            self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: l_truth, then_block: rhs_b, else_block: short_b });
        } else {
            self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: l_truth, then_block: short_b, else_block: rhs_b });
        }
        let short_value = if op == BinaryOp::LogAnd { 0 } else { 1 };
        self.func.set_terminator(short_b, TermKind::Br(merge_b));

        self.cur_block = rhs_b;
        let (rv, rty) = self.lower_rvalue(rhs);
        let rir = self.ir_ty(rty);
        let r_truth = self.truthy(rv, rir);
        let r_truth32 = self.func.push_instr(self.cur_block, IrType::I32, InstrKind::Convert { op: ConvOp::Zext, operand: r_truth });
        if !self.cur_terminated() {
            self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
        }
        let rhs_end = self.cur_block;

        self.cur_block = merge_b;
        let phi = self.func.push_instr(merge_b, IrType::I32, InstrKind::Phi { incomings: vec![(short_b, Operand::const_int(short_value, IrType::I32)), (rhs_end, Operand::Value(r_truth32))] });
        (Operand::Value(phi), self.types.ty_int)
    }

    fn lower_ternary(&mut self, cond: &Expr, then_expr: &Option<Box<Expr>>, else_expr: &Expr) -> (Operand, TypeId) {
        let (cv, cty) = self.lower_rvalue(cond);
        let cir = self.ir_ty(cty);
        match then_expr {
            Some(te) => {
                let cond_i1 = self.truthy(cv, cir);
                let then_b = self.func.new_block("cond.then");
                let else_b = self.func.new_block("cond.else");
                let merge_b = self.func.new_block("cond.end");
                self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: then_b, else_block: else_b });
                self.cur_block = then_b;
                let (tv, tty) = self.lower_rvalue(te);
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
                }
                let then_end = self.cur_block;
                self.cur_block = else_b;
                let (ev, ety) = self.lower_rvalue(else_expr);
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
                }
                let else_end = self.cur_block;

                let common_ty = if self.types.is_arithmetic(tty) && self.types.is_arithmetic(ety) { self.common_arith_type(tty, ety) } else { tty };
                let common_ir = self.ir_ty(common_ty);

                self.cur_block = then_end;
                let tv_c = self.convert_value(tv, tty, common_ty);
                self.cur_block = else_end;
                let ev_c = self.convert_value(ev, ety, common_ty);

                self.cur_block = merge_b;
                let phi = self.func.push_instr(merge_b, common_ir, InstrKind::Phi { incomings: vec![(then_end, tv_c), (else_end, ev_c)] });
                (Operand::Value(phi), common_ty)
            }
            None => {
                let cond_i1 = self.truthy(cv, cir);
                let else_b = self.func.new_block("cond.else");
                let merge_b = self.func.new_block("cond.end");
                let then_end = self.cur_block;
                self.func.set_terminator(self.cur_block, TermKind::Cbr { cond: cond_i1, then_block: merge_b, else_block: else_b });
                self.cur_block = else_b;
                let (ev, ety) = self.lower_rvalue(else_expr);
                if !self.cur_terminated() {
                    self.func.set_terminator(self.cur_block, TermKind::Br(merge_b));
                }
                let else_end = self.cur_block;

                let common_ty = if self.types.is_arithmetic(cty) && self.types.is_arithmetic(ety) { self.common_arith_type(cty, ety) } else { cty };
                let common_ir = self.ir_ty(common_ty);

                self.cur_block = then_end;
                let cv_c = self.convert_value(cv, cty, common_ty);
                self.cur_block = else_end;
                let ev_c = self.convert_value(ev, ety, common_ty);

                self.cur_block = merge_b;
                let phi = self.func.push_instr(merge_b, common_ir, InstrKind::Phi { incomings: vec![(then_end, cv_c), (else_end, ev_c)] });
                (Operand::Value(phi), common_ty)
            }
        }
    }

    fn lower_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> (Operand, TypeId) {
        let t = self.resolve_target(target);
        let ty = self.target_type(&t);
        match op.binary_op() {
            None => {
                let (vv, vty) = self.lower_rvalue(value);
                let stored = self.store_target(&t, vv, vty);
                (stored, ty)
            }
            Some(bop) => {
                let (cur_v, _) = self.load_target(&t);
                let (rv, rty) = self.lower_rvalue(value);
                if self.types.is_pointer(ty) {
                    let (res, _) = self.lower_additive(bop, cur_v, ty, rv, rty);
                    let stored = self.store_target(&t, res, ty);
                    (stored, ty)
                } else if self.types.is_float(ty) || self.types.is_float(rty) {
                    let common = self.common_arith_type(ty, rty);
                    let cir = self.ir_ty(common);
                    let lv = self.convert_value(cur_v, ty, common);
                    let rv = self.convert_value(rv, rty, common);
                    let fop = float_binop_of(bop);
                    let r = self.func.push_instr(self.cur_block, cir, InstrKind::FloatBinary { op: fop, lhs: lv, rhs: rv });
                    let stored = self.store_target(&t, Operand::Value(r), common);
                    (stored, ty)
                } else {
                    let common = self.common_arith_type(ty, rty);
                    let cir = self.ir_ty(common);
                    let signed = self.is_signed(common);
                    let lv = self.convert_value(cur_v, ty, common);
                    let rv = self.convert_value(rv, rty, common);
                    let iop = int_binop_of(bop, signed);
                    let r = self.func.push_instr(self.cur_block, cir, InstrKind::Binary { op: iop, lhs: lv, rhs: rv });
                    let stored = self.store_target(&t, Operand::Value(r), common);
                    (stored, ty)
                }
            }
        }
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr]) -> (Operand, TypeId) {
        if let ExprKind::Ident(name) = &callee.kind {
            if self.lookup_local(name).is_none() && !self.globals.contains_key(name) {
                return self.lower_direct_call(name, args);
            }
        }
        let (callee_op, callee_ty) = self.lower_rvalue(callee);
        self.lower_indirect_call(callee_op, callee_ty, args)
    }

    fn lower_direct_call(&mut self, name: &str, args: &[Expr]) -> (Operand, TypeId) {
        let sig = self.functions.get(name).cloned();
        let (ret_ty, param_tys) = match &sig {
            Some(s) => (s.ret, s.params.clone()),
            None => (self.types.ty_int, Vec::new()),
        };
        let mut arg_ops = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let (v, vty) = self.lower_rvalue(a);
            let v = if i < param_tys.len() { self.convert_value(v, vty, param_tys[i]) } else { v };
            arg_ops.push(v);
        }
        self.emit_call(Callee::Direct(name.to_string()), arg_ops, ret_ty)
    }

    fn lower_indirect_call(&mut self, callee_op: Operand, callee_ty: TypeId, args: &[Expr]) -> (Operand, TypeId) {
        let fn_ty = match self.types.get(self.types.unqualified(callee_ty)) {
            Type::Pointer(p) => *p,
            _ => callee_ty,
        };
        let (ret_ty, param_tys) = match self.types.get(self.types.unqualified(fn_ty)).clone() {
            Type::Function { ret, params, .. } => (ret, params),
            _ => (self.types.ty_int, Vec::new()),
        };
        let mut arg_ops = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let (v, vty) = self.lower_rvalue(a);
            let v = if i < param_tys.len() { self.convert_value(v, vty, param_tys[i]) } else { v };
            arg_ops.push(v);
        }
        self.emit_call(Callee::Indirect(callee_op), arg_ops, ret_ty)
    }

    fn emit_call(&mut self, callee: Callee, args: Vec<Operand>, ret_ty: TypeId) -> (Operand, TypeId) {
        if ret_ty == self.types.ty_void {
            self.func.push_void_instr(self.cur_block, InstrKind::Call { callee, args });
            (Operand::Undef(IrType::I1), self.types.ty_void)
        } else {
            let ir = self.ir_ty(ret_ty);
            let v = self.func.push_instr(self.cur_block, ir, InstrKind::Call { callee, args });
            (Operand::Value(v), ret_ty)
        }
    }

    fn lower_builtin_call(&mut self, name: &str, args: &[Expr]) -> (Operand, TypeId) {
        match crate::sema::builtins::classify(name) {
            Some(BuiltinKind::Expect) => self.lower_rvalue(&args[0]),
            Some(BuiltinKind::Clz) => self.lower_intrinsic(Intrinsic::Clz, &args[0]),
            Some(BuiltinKind::Ctz) => self.lower_intrinsic(Intrinsic::Ctz, &args[0]),
            Some(BuiltinKind::Popcount) => self.lower_intrinsic(Intrinsic::Popcount, &args[0]),
            Some(BuiltinKind::Abs) => self.lower_intrinsic(Intrinsic::Abs, &args[0]),
            None => (Operand::const_int(0, IrType::I32), self.types.ty_int),
        }
    }

    fn lower_intrinsic(&mut self, op: Intrinsic, arg: &Expr) -> (Operand, TypeId) {
        let (v, ty) = self.lower_rvalue(arg);
        let ir = self.ir_ty(ty);
        let r = self.func.push_instr(self.cur_block, ir, InstrKind::Intrinsic { op, operand: v });
        (Operand::Value(r), ty)
    }

    fn lower_stmt_expr(&mut self, items: &[BlockItem]) -> (Operand, TypeId) {
        self.push_scope();
        let mut result = (Operand::Undef(IrType::I1), self.types.ty_void);
        for (i, item) in items.iter().enumerate() {
            match item {
                BlockItem::Decl(d) => self.lower_decl(d),
                BlockItem::Stmt(s) => {
                    if i == items.len() - 1 {
                        if let StmtKind::Expr(Some(e)) = &s.kind {
                            result = self.lower_rvalue(e);
                            continue;
                        }
                    }
                    self.lower_stmt(s);
                }
            }
        }
        self.pop_scope();
        result
    }

    fn lower_generic(&mut self, controlling: &Expr, assocs: &[GenericAssoc]) -> (Operand, TypeId) {
        let ct = self.expr_static_type(controlling);
        for a in assocs {
            if let Some(t) = &a.ty {
                let tid = self.resolve_ty(t);
                if self.types.types_compatible(tid, ct) {
                    return self.lower_rvalue(&a.expr);
                }
            }
        }
        for a in assocs {
            if a.ty.is_none() {
                return self.lower_rvalue(&a.expr);
            }
        }
        (Operand::Undef(IrType::I1), self.types.ty_void)
    }
}
