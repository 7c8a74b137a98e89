//! Resolution of unit numbers, format specifications, and internal-unit
//! buffers into the argument forms the runtime `Begin` entry points take.

use cranelift_codegen::ir::{self, condcodes::IntCC, types, InstBuilder, TrapCode};
use cranelift_frontend::FunctionBuilder;

use crate::ast::{FormatSpec, TypeCat, TypedExpr};
use crate::bridge::Converter;
use crate::errors::{LowerError, Result};
use crate::runtime::IoKey;

use super::{cast_int, ConditionSpecInfo, IoLowerer};

/// A format specification lowered to the argument triple every formatted
/// `Begin` entry takes: text address, text length, and descriptor. The
/// unused side of the pair is null.
pub struct FormatOps {
    pub text: ir::Value,
    pub len: ir::Value,
    pub desc: ir::Value,
}

/// An internal unit lowered to its buffer form.
pub(crate) enum InternalBuffer {
    /// Contiguous default-kind character: address and byte length.
    Chars { addr: ir::Value, len: ir::Value },
    /// Array or non-default kind: a descriptor.
    Desc(ir::Value),
}

impl<C: Converter> IoLowerer<'_, C> {
    /// Lower a unit number expression to the runtime's unit argument type.
    ///
    /// A unit wider than the argument type goes through the runtime range
    /// check first. When the statement has IOSTAT= or ERR=, a failed check
    /// must skip the whole statement: the check's iostat enters an open
    /// conditional region that [`super::IoLowerer::end_io`] merges.
    pub(crate) fn unit_number(
        &mut self,
        b: &mut FunctionBuilder,
        expr: &TypedExpr,
        arg_ty: ir::Type,
        csi: &mut ConditionSpecInfo,
    ) -> Result<ir::Value> {
        let raw = self.conv.expr_value(b, expr)?;
        let raw_ty = b.func.dfg.value_type(raw);
        if raw_ty.bits() <= arg_ty.bits() {
            return Ok(cast_int(b, raw, arg_ty));
        }
        let (key, check_ty) = if raw_ty.bits() <= 64 {
            (IoKey::CheckUnitNumberInRange64, types::I64)
        } else {
            (IoKey::CheckUnitNumberInRange128, types::I128)
        };
        let unit = cast_int(b, raw, check_ty);
        let handle_error = b
            .ins()
            .iconst(types::I8, i64::from(csi.has_error_spec()));
        if csi.iomsg.is_none() {
            if let Some(e) = csi.iomsg_expr.clone() {
                csi.iomsg = Some(self.conv.char_addr_len(b, &e)?);
            }
        }
        let (msg_addr, msg_len) = match csi.iomsg {
            Some(pair) => pair,
            None => (self.null_ptr(b), b.ins().iconst(types::I64, 0)),
        };
        let (file, line) = self.location_args(b)?;
        let iostat = self.call_io(
            b,
            key,
            &[unit, handle_error, msg_addr, msg_len, file, line],
        )?;
        if csi.has_error_spec() {
            let in_range = b.create_block();
            let merge = b.create_block();
            b.append_block_param(merge, types::I32);
            let ok = b.ins().icmp_imm(IntCC::Equal, iostat, 0);
            b.ins().brif(ok, in_range, &[], merge, &[iostat]);
            b.switch_to_block(in_range);
            b.seal_block(in_range);
            csi.big_unit_merge = Some(merge);
        }
        Ok(cast_int(b, raw, arg_ty))
    }

    /// Lower an explicit format specification.
    pub(crate) fn format_ops(
        &mut self,
        b: &mut FunctionBuilder,
        spec: &FormatSpec,
    ) -> Result<FormatOps> {
        match spec {
            FormatSpec::ListDirected => Err(LowerError::fatal(
                "list-directed transfer has no format arguments",
            )),
            FormatSpec::Label(label) => {
                let text = self.format_label_text(*label)?;
                let (addr, len) = self.string_addr(b, text.as_bytes())?;
                let desc = self.null_ptr(b);
                Ok(FormatOps {
                    text: addr,
                    len,
                    desc,
                })
            }
            FormatSpec::Expr(e) if e.ty.is_character() => {
                if e.ty.rank == 0 {
                    let (addr, len) = self.conv.char_addr_len(b, e)?;
                    let len = cast_int(b, len, types::I64);
                    let desc = self.null_ptr(b);
                    Ok(FormatOps {
                        text: addr,
                        len,
                        desc,
                    })
                } else {
                    // A character array format is passed whole, as a
                    // descriptor the runtime walks in element order.
                    let desc = self.conv.expr_box(b, e)?;
                    let text = self.null_ptr(b);
                    let len = b.ins().iconst(types::I64, 0);
                    Ok(FormatOps { text, len, desc })
                }
            }
            FormatSpec::Expr(e)
                if matches!(e.ty.cat, TypeCat::Integer { .. }) && e.ty.rank == 0 =>
            {
                self.assigned_format(b, e)
            }
            FormatSpec::Expr(_) => Err(LowerError::unsupported("format expression")),
        }
    }

    /// Trimmed source text of the FORMAT statement at `label`.
    fn format_label_text(&mut self, label: u32) -> Result<String> {
        let text = self
            .conv
            .format_text(label)
            .ok_or_else(|| LowerError::fatal(format!("label {label} is not a FORMAT")))?;
        let open = text.find('(');
        let close = text.rfind(')');
        match (open, close) {
            (Some(i), Some(j)) if i < j => Ok(text[i..=j].to_string()),
            _ => Err(LowerError::fatal(format!(
                "FORMAT at label {label} has no parenthesized list"
            ))),
        }
    }

    /// Lower a format held in an integer variable via ASSIGN: a multiway
    /// branch over every label assigned to the variable, each arm yielding
    /// that FORMAT's text. The fallthrough arm reports a fatal error at
    /// run time.
    fn assigned_format(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
    ) -> Result<FormatOps> {
        let sym = e
            .symbol
            .clone()
            .ok_or_else(|| LowerError::unsupported("assigned format expression"))?;
        let labels = self.conv.assigned_labels(&sym);
        if labels.is_empty() {
            return Err(LowerError::unsupported("assigned format"));
        }
        let value = self.conv.expr_value(b, e)?;
        let value = cast_int(b, value, types::I64);
        let join = b.create_block();
        b.append_block_param(join, self.ptr_ty());
        b.append_block_param(join, types::I64);
        for label in labels {
            let hit = b.create_block();
            let miss = b.create_block();
            let is_label = b.ins().icmp_imm(IntCC::Equal, value, i64::from(label));
            b.ins().brif(is_label, hit, &[], miss, &[]);
            b.switch_to_block(hit);
            b.seal_block(hit);
            // A label assigned to the variable but not naming a FORMAT
            // yields a null pair; the runtime rejects it.
            let (addr, len) = if self.conv.format_text(label).is_some() {
                let text = self.format_label_text(label)?;
                self.string_addr(b, text.as_bytes())?
            } else {
                (self.null_ptr(b), b.ins().iconst(types::I64, 0))
            };
            b.ins().jump(join, &[addr, len]);
            b.switch_to_block(miss);
            b.seal_block(miss);
        }
        let msg = format!(
            "Assigned format variable '{}' does not hold a FORMAT label",
            sym.name
        );
        let (msg_addr, _) = self.string_addr(b, msg.as_bytes())?;
        let (file, line) = self.location_args(b)?;
        self.call_io_void(b, IoKey::ReportFatalUserError, &[msg_addr, file, line])?;
        b.ins().trap(TrapCode::unwrap_user(1));
        b.switch_to_block(join);
        b.seal_block(join);
        let params = b.block_params(join);
        let (text, len) = (params[0], params[1]);
        let desc = self.null_ptr(b);
        Ok(FormatOps { text, len, desc })
    }

    /// Lower an internal unit to its buffer form.
    pub(crate) fn internal_buffer(
        &mut self,
        b: &mut FunctionBuilder,
        var: &TypedExpr,
    ) -> Result<InternalBuffer> {
        let default_kind = matches!(var.ty.cat, TypeCat::Character { kind_bytes: 1 });
        if var.ty.rank == 0 && default_kind {
            let (addr, len) = self.conv.char_addr_len(b, var)?;
            let len = cast_int(b, len, types::I64);
            Ok(InternalBuffer::Chars { addr, len })
        } else {
            Ok(InternalBuffer::Desc(self.conv.expr_box(b, var)?))
        }
    }
}
