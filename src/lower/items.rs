//! Lowering of data transfer item lists: entry point selection by type,
//! argument marshaling, vector-subscripted designators, and implied-do
//! loops.

use cranelift_codegen::ir::{self, condcodes::IntCC, types, InstBuilder, MemFlags};
use cranelift_frontend::FunctionBuilder;

use crate::ast::{Direction, ImpliedDo, IoItem, IoType, TypeCat, TypedExpr};
use crate::bridge::Converter;
use crate::errors::Result;
use crate::runtime::IoKey;

use super::{cast_int, int_type, widen_stored_bool, ChainState, GuardStack, IoLowerer};

/// Output entry point for an item of the given type.
///
/// Formatted scalars get type-specific entries; everything else falls
/// back to the descriptor entry, and derived types always go through the
/// defined-I/O aware entry.
pub(crate) fn output_key(ty: &IoType, formatted: bool) -> IoKey {
    if ty.is_derived() {
        return IoKey::OutputDerivedType;
    }
    if !formatted || ty.rank > 0 {
        return IoKey::OutputDescriptor;
    }
    match ty.cat {
        TypeCat::Logical { .. } => IoKey::OutputLogical,
        TypeCat::Integer { bits: 8 } => IoKey::OutputInteger8,
        TypeCat::Integer { bits: 16 } => IoKey::OutputInteger16,
        TypeCat::Integer { bits: 32 } => IoKey::OutputInteger32,
        TypeCat::Integer { bits: 64 } => IoKey::OutputInteger64,
        TypeCat::Integer { bits: 128 } => IoKey::OutputInteger128,
        TypeCat::Real { bits: 32 } => IoKey::OutputReal32,
        TypeCat::Real { bits: 64 } => IoKey::OutputReal64,
        TypeCat::Complex { bits: 32 } => IoKey::OutputComplex32,
        TypeCat::Complex { bits: 64 } => IoKey::OutputComplex64,
        TypeCat::Character { kind_bytes: 1 } => IoKey::OutputAscii,
        _ => IoKey::OutputDescriptor,
    }
}

/// Input entry point for an item of the given type. Mirrors
/// [`output_key`], except integers share one entry taking a kind
/// argument and unsigned integers take the descriptor path.
pub(crate) fn input_key(ty: &IoType, formatted: bool) -> IoKey {
    if ty.is_derived() {
        return IoKey::InputDerivedType;
    }
    if !formatted || ty.rank > 0 {
        return IoKey::InputDescriptor;
    }
    match ty.cat {
        TypeCat::Logical { .. } => IoKey::InputLogical,
        TypeCat::Integer { .. } => IoKey::InputInteger,
        TypeCat::Real { bits: 32 } => IoKey::InputReal32,
        TypeCat::Real { bits: 64 } => IoKey::InputReal64,
        TypeCat::Complex { bits: 32 } => IoKey::InputComplex32,
        TypeCat::Complex { bits: 64 } => IoKey::InputComplex64,
        TypeCat::Character { kind_bytes: 1 } => IoKey::InputAscii,
        _ => IoKey::InputDescriptor,
    }
}

fn takes_descriptor(key: IoKey) -> bool {
    matches!(
        key,
        IoKey::OutputDescriptor
            | IoKey::OutputDerivedType
            | IoKey::InputDescriptor
            | IoKey::InputDerivedType
    )
}

impl<C: Converter> IoLowerer<'_, C> {
    /// Lower an item list, threading the success chain through every call.
    pub(crate) fn transfer_items(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        items: &[IoItem],
        dir: Direction,
        formatted: bool,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        for item in items {
            match item {
                IoItem::ImpliedDo(d) => {
                    self.io_loop(b, cookie, d, dir, formatted, check, chain, guards)?
                }
                IoItem::Expr(e) => match dir {
                    Direction::Output => {
                        self.output_item(b, cookie, e, formatted, check, chain, guards)?
                    }
                    Direction::Input => {
                        self.input_item(b, cookie, e, formatted, check, chain, guards)?
                    }
                },
            }
        }
        Ok(())
    }

    fn output_item(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        e: &TypedExpr,
        formatted: bool,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        guards.open(b, check, chain);
        let key = output_key(&e.ty, formatted);
        let mut args = vec![cookie];
        match key {
            IoKey::OutputDerivedType => {
                args.push(self.conv.expr_box(b, e)?);
                args.push(self.nontbp_table_addr(b)?);
            }
            IoKey::OutputDescriptor => args.push(self.conv.expr_box(b, e)?),
            IoKey::OutputAscii => {
                let (addr, len) = self.conv.char_addr_len(b, e)?;
                args.push(addr);
                args.push(cast_int(b, len, types::I64));
            }
            IoKey::OutputComplex32 | IoKey::OutputComplex64 => {
                let (re, im) = self.conv.complex_parts(b, e)?;
                args.push(re);
                args.push(im);
            }
            IoKey::OutputLogical => {
                let v = self.conv.expr_value(b, e)?;
                args.push(b.ins().icmp_imm(IntCC::NotEqual, v, 0));
            }
            IoKey::OutputInteger8
            | IoKey::OutputInteger16
            | IoKey::OutputInteger32
            | IoKey::OutputInteger64
            | IoKey::OutputInteger128 => {
                let bits = e.ty.kind_bytes().unwrap_or(4) * 8;
                let v = self.conv.expr_value(b, e)?;
                args.push(cast_int(b, v, int_type(bits)));
            }
            _ => args.push(self.conv.expr_value(b, e)?),
        }
        let ok = self.call_io(b, key, &args)?;
        if check {
            chain.update(ok);
        }
        Ok(())
    }

    fn input_item(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        e: &TypedExpr,
        formatted: bool,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        guards.open(b, check, chain);
        let key = input_key(&e.ty, formatted);
        if e.has_vector_subscript {
            return self.input_item_elements(b, cookie, e, key, check, chain);
        }
        let logical_bits = match e.ty.cat {
            TypeCat::Logical { bits } => Some(bits),
            _ => None,
        };
        let mut args = vec![cookie];
        let mut stored_addr = None;
        match key {
            IoKey::InputDerivedType => {
                args.push(self.conv.expr_box(b, e)?);
                args.push(self.nontbp_table_addr(b)?);
            }
            IoKey::InputDescriptor => args.push(self.conv.expr_box(b, e)?),
            IoKey::InputAscii => {
                let (addr, len) = self.conv.char_addr_len(b, e)?;
                args.push(addr);
                args.push(cast_int(b, len, types::I64));
            }
            IoKey::InputInteger => {
                let addr = self.conv.expr_address(b, e)?;
                let bytes = i64::from(e.ty.kind_bytes().unwrap_or(4));
                args.push(addr);
                args.push(b.ins().iconst(types::I32, bytes));
            }
            _ => {
                let addr = self.conv.expr_address(b, e)?;
                stored_addr = Some(addr);
                args.push(addr);
            }
        }
        let ok = self.call_io(b, key, &args)?;
        if let (Some(addr), Some(bits)) = (stored_addr, logical_bits) {
            widen_stored_bool(b, addr, bits);
        }
        if check {
            chain.update(ok);
        }
        Ok(())
    }

    /// Input into a vector-subscripted designator: one runtime call per
    /// element, in element order, stopping at the first failure when the
    /// statement checks results.
    fn input_item_elements(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        e: &TypedExpr,
        key: IoKey,
        check: bool,
        chain: &mut ChainState,
    ) -> Result<()> {
        let boxed = takes_descriptor(key);
        let fref = self.io_func(b, key)?;
        let table = match key {
            IoKey::InputDerivedType => Some(self.nontbp_table_addr(b)?),
            _ => None,
        };
        let elem_len = match key {
            IoKey::InputAscii => {
                let len = self.conv.char_len(b, e)?;
                Some(cast_int(b, len, types::I64))
            }
            _ => None,
        };
        let kind = match key {
            IoKey::InputInteger => {
                let bytes = i64::from(e.ty.kind_bytes().unwrap_or(4));
                Some(b.ins().iconst(types::I32, bytes))
            }
            _ => None,
        };
        let logical_bits = match e.ty.cat {
            TypeCat::Logical { bits } => Some(bits),
            _ => None,
        };
        let mut each = |b: &mut FunctionBuilder, elem: ir::Value| -> Result<ir::Value> {
            let mut args = vec![cookie, elem];
            args.extend(table);
            args.extend(elem_len);
            args.extend(kind);
            let call = b.ins().call(fref, &args);
            let ok = b.inst_results(call)[0];
            if let Some(bits) = logical_bits {
                widen_stored_bool(b, elem, bits);
            }
            Ok(ok)
        };
        if check {
            let ok0 = chain.value(b);
            let ok = self
                .conv
                .loop_over_elements_while(b, e, boxed, ok0, &mut each)?;
            chain.update(ok);
        } else {
            self.conv.loop_over_elements(b, e, boxed, &mut each)?;
        }
        Ok(())
    }

    /// Lower an implied-do loop as a counted loop over its item list.
    ///
    /// The induction value is stored into the loop variable at the top of
    /// every iteration, and its final value is stored again at exit as the
    /// loop variable survives the statement. When results are checked, the
    /// chain value is carried through the loop and the induction freezes
    /// on failure so the variable is left at the failing iteration.
    #[allow(clippy::too_many_arguments)]
    fn io_loop(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        d: &ImpliedDo,
        dir: Direction,
        formatted: bool,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        guards.open(b, check, chain);
        let lower = self.conv.expr_value(b, &d.lower)?;
        let lower = cast_int(b, lower, types::I64);
        let upper = self.conv.expr_value(b, &d.upper)?;
        let upper = cast_int(b, upper, types::I64);
        let step = match &d.step {
            Some(s) => {
                let v = self.conv.expr_value(b, s)?;
                cast_int(b, v, types::I64)
            }
            None => b.ins().iconst(types::I64, 1),
        };
        let diff = b.ins().isub(upper, lower);
        let span = b.ins().iadd(diff, step);
        let trip = b.ins().sdiv(span, step);
        let zero = b.ins().iconst(types::I64, 0);
        let negative = b.ins().icmp(IntCC::SignedLessThan, trip, zero);
        let trip = b.ins().select(negative, zero, trip);
        let var_addr = self.conv.expr_address(b, &d.var)?;
        let var_ty = int_type(d.var.ty.kind_bytes().unwrap_or(4) * 8);

        let carried = matches!(chain, ChainState::Checked(_)) || check;
        let header = b.create_block();
        b.append_block_param(header, types::I64); // remaining trips
        b.append_block_param(header, types::I64); // induction value
        let body = b.create_block();
        let exit = b.create_block();
        b.append_block_param(exit, types::I64);
        if carried {
            b.append_block_param(header, types::I8);
            b.append_block_param(exit, types::I8);
        }

        let mut entry_args = vec![trip, lower];
        if carried {
            entry_args.push(chain.value(b));
        }
        b.ins().jump(header, &entry_args);
        b.switch_to_block(header);
        let header_params = b.block_params(header).to_vec();
        let (rem, iv) = (header_params[0], header_params[1]);
        let more = b.ins().icmp_imm(IntCC::SignedGreaterThan, rem, 0);
        let (cont, mut exit_args) = if carried {
            let ok = header_params[2];
            let ok_b = b.ins().icmp_imm(IntCC::NotEqual, ok, 0);
            (b.ins().band(more, ok_b), vec![iv, ok])
        } else {
            (more, vec![iv])
        };
        b.ins().brif(cont, body, &[], exit, &exit_args);
        b.switch_to_block(body);
        b.seal_block(body);

        let cur = cast_int(b, iv, var_ty);
        b.ins().store(MemFlags::new(), cur, var_addr, 0);
        let mark = guards.mark();
        let mut inner = if carried {
            ChainState::Checked(header_params[2])
        } else {
            ChainState::Unchecked
        };
        self.transfer_items(
            b, cookie, &d.items, dir, formatted, check, &mut inner, guards,
        )?;
        guards.close_to(mark, b, &mut inner);

        let stepped = b.ins().iadd(iv, step);
        let rem_next = b.ins().iadd_imm(rem, -1);
        let mut back_args = vec![rem_next, stepped];
        if carried {
            let ok_end = inner.value(b);
            // Freeze the induction on failure: the loop variable keeps
            // the value of the iteration that failed.
            let next = b.ins().select(ok_end, stepped, iv);
            back_args = vec![rem_next, next, ok_end];
        }
        b.ins().jump(header, &back_args);
        b.seal_block(header);

        b.switch_to_block(exit);
        b.seal_block(exit);
        exit_args = b.block_params(exit).to_vec();
        let final_iv = cast_int(b, exit_args[0], var_ty);
        b.ins().store(MemFlags::new(), final_iv, var_addr, 0);
        if carried {
            chain.update(exit_args[1]);
        }
        Ok(())
    }
}
