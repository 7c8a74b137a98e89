//! Lowering of Fortran I/O statements onto the runtime I/O library.
//!
//! Every statement becomes a bracketed call sequence on an opaque cookie:
//! a `Begin` call, `EnableHandlers` when the statement names condition
//! specifiers, specifier setters and item transfers threaded on a success
//! chain, deferred queries, and a final `EndIoStatement` whose result
//! feeds IOSTAT=.

use std::collections::HashMap;

use cranelift_codegen::ir::{self, types, InstBuilder, MemFlags};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, Linkage, Module as _};
use cranelift_object::ObjectModule;

use crate::ast::TypedExpr;
use crate::bridge::{Converter, SourceLoc};
use crate::errors::Result;
use crate::runtime::IoKey;

mod format;
mod items;
mod namelist;
mod stmts;

/// Result of the most recent checked runtime call, threaded through a
/// statement so later calls can be skipped after a failure.
#[derive(Debug, Clone, Copy)]
pub enum ChainState {
    /// No condition specifier requires checking; calls run unconditionally.
    Unchecked,
    /// The success value of the last checked call.
    Checked(ir::Value),
}

impl ChainState {
    pub fn update(&mut self, ok: ir::Value) {
        *self = ChainState::Checked(ok);
    }

    /// Current chain value, materializing `true` when unchecked.
    pub fn value(&self, b: &mut FunctionBuilder) -> ir::Value {
        match *self {
            ChainState::Checked(v) => v,
            ChainState::Unchecked => b.ins().iconst(types::I8, 1),
        }
    }
}

/// Open conditional regions of a statement's call chain.
///
/// Each guard skips the rest of the chain when the previous call failed.
/// Scopes close in reverse order of opening; each close merges the chain
/// value through a block parameter so the statement epilogue sees the
/// outcome whichever way control went.
#[derive(Default)]
pub struct GuardStack {
    merges: Vec<ir::Block>,
}

impl GuardStack {
    pub fn new() -> Self {
        GuardStack::default()
    }

    /// Depth marker for scoped closing inside loop bodies.
    pub fn mark(&self) -> usize {
        self.merges.len()
    }

    /// Branch around the rest of the chain unless the chain value holds.
    /// No-op while the chain is unchecked or checking is off.
    pub fn open(&mut self, b: &mut FunctionBuilder, check: bool, chain: &ChainState) {
        let ChainState::Checked(ok) = *chain else {
            return;
        };
        if !check {
            return;
        }
        let body = b.create_block();
        let merge = b.create_block();
        b.append_block_param(merge, types::I8);
        let failed = b.ins().iconst(types::I8, 0);
        b.ins().brif(ok, body, &[], merge, &[failed]);
        b.switch_to_block(body);
        b.seal_block(body);
        self.merges.push(merge);
    }

    /// Close scopes opened since `mark`, newest first.
    pub fn close_to(
        &mut self,
        mark: usize,
        b: &mut FunctionBuilder,
        chain: &mut ChainState,
    ) {
        while self.merges.len() > mark {
            let Some(merge) = self.merges.pop() else {
                break;
            };
            let ok = chain.value(b);
            b.ins().jump(merge, &[ok]);
            b.switch_to_block(merge);
            b.seal_block(merge);
            chain.update(b.block_params(merge)[0]);
        }
    }

    pub fn close_all(&mut self, b: &mut FunctionBuilder, chain: &mut ChainState) {
        self.close_to(0, b, chain);
    }
}

/// Condition specifiers of one statement and the state their handling
/// accumulates while the statement is lowered.
#[derive(Default)]
pub struct ConditionSpecInfo {
    pub iostat: Option<TypedExpr>,
    pub iomsg_expr: Option<TypedExpr>,
    /// IOMSG address and length, evaluated once per statement.
    pub iomsg: Option<(ir::Value, ir::Value)>,
    pub has_err: bool,
    pub has_end: bool,
    pub has_eor: bool,
    /// Merge block of an open unit-range check, closed at statement end.
    pub big_unit_merge: Option<ir::Block>,
}

/// View of any specifier list reduced to its condition content.
pub enum CondSpec<'a> {
    IoStat(&'a TypedExpr),
    IoMsg(&'a TypedExpr),
    Err,
    End,
    Eor,
    Other,
}

impl ConditionSpecInfo {
    pub fn scan<'a>(specs: impl Iterator<Item = CondSpec<'a>>) -> Self {
        let mut csi = ConditionSpecInfo::default();
        for spec in specs {
            match spec {
                CondSpec::IoStat(e) => csi.iostat = Some(e.clone()),
                CondSpec::IoMsg(e) => csi.iomsg_expr = Some(e.clone()),
                CondSpec::Err => csi.has_err = true,
                CondSpec::End => csi.has_end = true,
                CondSpec::Eor => csi.has_eor = true,
                CondSpec::Other => {}
            }
        }
        csi
    }

    /// IOSTAT= or ERR= is present; specifier calls must be checked.
    pub fn has_error_spec(&self) -> bool {
        self.iostat.is_some() || self.has_err
    }

    /// Any specifier that can redirect control after a transfer.
    pub fn has_transfer_spec(&self) -> bool {
        self.has_error_spec() || self.has_end || self.has_eor
    }

    pub fn has_any_spec(&self) -> bool {
        self.has_transfer_spec() || self.iomsg_expr.is_some()
    }
}

/// Module-level globals created while lowering, memoized by content or by
/// mangled name so repeated statements share one object.
#[derive(Default)]
pub struct GlobalCache {
    strings: HashMap<Vec<u8>, DataId>,
    next_string: u32,
}

impl GlobalCache {
    pub fn new() -> Self {
        GlobalCache::default()
    }

    /// NUL-terminated string constant, deduplicated by content.
    pub fn cstring(&mut self, module: &mut ObjectModule, bytes: &[u8]) -> Result<DataId> {
        if let Some(id) = self.strings.get(bytes) {
            return Ok(*id);
        }
        let name = format!(".io.str.{}", self.next_string);
        self.next_string += 1;
        let id = module.declare_data(&name, Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        let mut raw = bytes.to_vec();
        raw.push(0);
        dd.define(raw.into_boxed_slice());
        module.define_data(id, &dd)?;
        self.strings.insert(bytes.to_vec(), id);
        Ok(id)
    }
}

/// Context for lowering the I/O statements of one function.
pub struct IoLowerer<'a, C: Converter> {
    pub module: &'a mut ObjectModule,
    pub conv: &'a mut C,
    pub cache: &'a mut GlobalCache,
    ptr_ty: ir::Type,
}

impl<'a, C: Converter> IoLowerer<'a, C> {
    pub fn new(module: &'a mut ObjectModule, conv: &'a mut C, cache: &'a mut GlobalCache) -> Self {
        let ptr_ty = module.isa().pointer_type();
        IoLowerer {
            module,
            conv,
            cache,
            ptr_ty,
        }
    }

    pub fn ptr_ty(&self) -> ir::Type {
        self.ptr_ty
    }

    /// Import a runtime entry point into the current function.
    pub(crate) fn io_func(&mut self, b: &mut FunctionBuilder, key: IoKey) -> Result<ir::FuncRef> {
        let cc = self.module.isa().default_call_conv();
        let sig = key.signature(self.ptr_ty, cc);
        let id = self
            .module
            .declare_function(key.entry_name(), Linkage::Import, &sig)?;
        Ok(self.module.declare_func_in_func(id, b.func))
    }

    /// Call a runtime entry point, returning its sole result.
    pub(crate) fn call_io(
        &mut self,
        b: &mut FunctionBuilder,
        key: IoKey,
        args: &[ir::Value],
    ) -> Result<ir::Value> {
        let f = self.io_func(b, key)?;
        let call = b.ins().call(f, args);
        Ok(b.inst_results(call)[0])
    }

    /// Call a runtime entry point that returns nothing.
    pub(crate) fn call_io_void(
        &mut self,
        b: &mut FunctionBuilder,
        key: IoKey,
        args: &[ir::Value],
    ) -> Result<()> {
        let f = self.io_func(b, key)?;
        b.ins().call(f, args);
        Ok(())
    }

    /// Address of a data object in the current function.
    pub(crate) fn data_addr(&mut self, b: &mut FunctionBuilder, id: DataId) -> ir::Value {
        let gv = self.module.declare_data_in_func(id, b.func);
        b.ins().global_value(self.ptr_ty, gv)
    }

    /// Address and byte length of a deduplicated string constant.
    pub(crate) fn string_addr(
        &mut self,
        b: &mut FunctionBuilder,
        bytes: &[u8],
    ) -> Result<(ir::Value, ir::Value)> {
        let id = self.cache.cstring(self.module, bytes)?;
        let addr = self.data_addr(b, id);
        let len = b.ins().iconst(types::I64, bytes.len() as i64);
        Ok((addr, len))
    }

    /// Source file address and line number arguments of a `Begin` call.
    pub(crate) fn location_args(
        &mut self,
        b: &mut FunctionBuilder,
    ) -> Result<(ir::Value, ir::Value)> {
        let SourceLoc { file, line } = self.conv.location();
        let (addr, _) = self.string_addr(b, file.as_bytes())?;
        let line = b.ins().iconst(types::I32, i64::from(line));
        Ok((addr, line))
    }

    pub(crate) fn null_ptr(&self, b: &mut FunctionBuilder) -> ir::Value {
        b.ins().iconst(self.ptr_ty, 0)
    }

    /// `EnableHandlers`, emitted only when the statement names a
    /// condition specifier. Also evaluates IOMSG= once for reuse by both
    /// the unit-range check and `GetIoMsg`.
    pub(crate) fn enable_handlers(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        csi: &mut ConditionSpecInfo,
    ) -> Result<()> {
        if !csi.has_any_spec() {
            return Ok(());
        }
        if csi.iomsg.is_none() {
            if let Some(e) = csi.iomsg_expr.clone() {
                csi.iomsg = Some(self.conv.char_addr_len(b, &e)?);
            }
        }
        let mut args = vec![cookie];
        for on in [
            csi.iostat.is_some(),
            csi.has_err,
            csi.has_end,
            csi.has_eor,
            csi.iomsg_expr.is_some(),
        ] {
            args.push(b.ins().iconst(types::I8, i64::from(on)));
        }
        self.call_io_void(b, IoKey::EnableHandlers, &args)
    }

    /// Statement epilogue: fetch IOMSG, end the statement, merge any open
    /// unit-range check, and store IOSTAT=. Returns the final iostat value
    /// when the statement has transfer condition specifiers, so the caller
    /// can branch on END=/EOR=/ERR=.
    pub(crate) fn end_io(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        csi: &mut ConditionSpecInfo,
    ) -> Result<Option<ir::Value>> {
        if let Some((addr, len)) = csi.iomsg {
            self.call_io_void(b, IoKey::GetIoMsg, &[cookie, addr, len])?;
        }
        let mut iostat = self.call_io(b, IoKey::EndIoStatement, &[cookie])?;
        if let Some(merge) = csi.big_unit_merge.take() {
            b.ins().jump(merge, &[iostat]);
            b.switch_to_block(merge);
            b.seal_block(merge);
            iostat = b.block_params(merge)[0];
        }
        if let Some(var) = csi.iostat.clone() {
            self.store_int_result(b, &var, iostat)?;
        }
        Ok(csi.has_transfer_spec().then_some(iostat))
    }

    /// Store an integer runtime result into a variable of possibly
    /// different width.
    pub(crate) fn store_int_result(
        &mut self,
        b: &mut FunctionBuilder,
        var: &TypedExpr,
        value: ir::Value,
    ) -> Result<()> {
        let addr = self.conv.expr_address(b, var)?;
        let bits = var.ty.kind_bytes().unwrap_or(4) * 8;
        let ty = int_type(bits);
        let v = cast_int(b, value, ty);
        b.ins().store(MemFlags::new(), v, addr, 0);
        Ok(())
    }
}

/// Integer IR type for a bit width, defaulting to the width itself.
pub(crate) fn int_type(bits: u16) -> ir::Type {
    match bits {
        8 => types::I8,
        16 => types::I16,
        64 => types::I64,
        128 => types::I128,
        _ => types::I32,
    }
}

/// Sign-extend or truncate an integer value to a target type.
pub(crate) fn cast_int(b: &mut FunctionBuilder, v: ir::Value, to: ir::Type) -> ir::Value {
    let from = b.func.dfg.value_type(v);
    if from == to {
        v
    } else if from.bits() < to.bits() {
        b.ins().sextend(to, v)
    } else {
        b.ins().ireduce(to, v)
    }
}

/// Re-extend a one-byte truth value the runtime stored into a wider
/// logical variable.
pub(crate) fn widen_stored_bool(b: &mut FunctionBuilder, addr: ir::Value, bits: u16) {
    if bits <= 8 {
        return;
    }
    let v = b.ins().load(types::I8, MemFlags::new(), addr, 0);
    let w = b.ins().uextend(int_type(bits), v);
    b.ins().store(MemFlags::new(), w, addr, 0);
}
