//! Construction of the runtime data structures behind namelist and
//! defined-derived-type I/O: group objects, member descriptors, and the
//! table of non-type-bound defined-I/O subroutines.
//!
//! A group whose members all have static storage becomes one set of
//! module globals, memoized by mangled name so every statement naming the
//! group shares them. A group with local members is rebuilt on the stack
//! at each statement.

use cranelift_codegen::ir::{self, types, InstBuilder, MemFlags, StackSlotData, StackSlotKind};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, FuncOrDataId, Linkage, Module as _};
use target_lexicon::Endianness;

use crate::ast::{NamelistGroup, Symbol, TypeCat};
use crate::bridge::Converter;
use crate::errors::{LowerError, Result};

use super::IoLowerer;

/// Raw descriptor header: base address, element length, version, rank,
/// type code, attribute, extra. Dimensions of `{lower, extent, stride}`
/// triples follow.
const DESC_HEADER: usize = 24;
const DESC_DIM: usize = 24;
const ATTR_POINTER: u8 = 1;

/// Element type code as the runtime's descriptor encoding defines it.
fn type_code(sym: &Symbol) -> u8 {
    match sym.ty.cat {
        TypeCat::Integer { bits: 8 } => 7,
        TypeCat::Integer { bits: 16 } => 8,
        TypeCat::Integer { bits: 64 } => 10,
        TypeCat::Integer { bits: 128 } => 11,
        TypeCat::Integer { .. } | TypeCat::Unsigned { .. } => 9,
        TypeCat::Real { bits: 64 } => 27,
        TypeCat::Real { .. } => 26,
        TypeCat::Complex { bits: 64 } => 30,
        TypeCat::Complex { .. } => 29,
        TypeCat::Logical { .. } => 32,
        TypeCat::Character { .. } => 33,
        TypeCat::Derived(_) => 35,
    }
}

/// Little buffer for laying out target-endian data blobs.
struct Blob {
    bytes: Vec<u8>,
    big: bool,
}

impl Blob {
    fn new(size: usize, end: Endianness) -> Self {
        Blob {
            bytes: vec![0; size],
            big: end == Endianness::Big,
        }
    }

    fn put_u64(&mut self, off: usize, v: u64) {
        let raw = if self.big {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.bytes[off..off + 8].copy_from_slice(&raw);
    }

    fn put_u32(&mut self, off: usize, v: u32) {
        let raw = if self.big {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.bytes[off..off + 4].copy_from_slice(&raw);
    }

    fn put_u8(&mut self, off: usize, v: u8) {
        self.bytes[off] = v;
    }
}

/// Header and dimensions of a pointer descriptor for `sym`, with the base
/// address left for a relocation or a runtime store.
fn descriptor_blob(sym: &Symbol, end: Endianness) -> Blob {
    let rank = sym.shape.len();
    let mut blob = Blob::new(DESC_HEADER + rank * DESC_DIM, end);
    blob.put_u64(8, sym.elem_bytes);
    blob.put_u32(16, 1); // version
    blob.put_u8(20, rank as u8);
    blob.put_u8(21, type_code(sym));
    blob.put_u8(22, ATTR_POINTER);
    let mut stride = sym.elem_bytes;
    for (i, extent) in sym.shape.iter().enumerate() {
        let off = DESC_HEADER + i * DESC_DIM;
        blob.put_u64(off, 1);
        blob.put_u64(off + 8, *extent as u64);
        blob.put_u64(off + 16, stride);
        stride *= *extent as u64;
    }
    blob
}

impl<C: Converter> IoLowerer<'_, C> {
    fn endianness(&self) -> Endianness {
        self.module
            .isa()
            .triple()
            .endianness()
            .unwrap_or(Endianness::Little)
    }

    fn named_data(&self, name: &str) -> Option<DataId> {
        match self.module.get_name(name) {
            Some(FuncOrDataId::Data(id)) => Some(id),
            _ => None,
        }
    }

    /// Address of the group object for a namelist transfer.
    pub(crate) fn namelist_group_addr(
        &mut self,
        b: &mut FunctionBuilder,
        group: &NamelistGroup,
    ) -> Result<ir::Value> {
        let procs = self.conv.defined_io_procs();
        let local = group.members.iter().any(|m| !m.is_global)
            || procs.iter().any(|p| p.is_dummy);
        if local {
            return self.build_local_group(b, group);
        }
        let name = self.conv.mangled_group_name(group);
        let id = match self.named_data(&name) {
            Some(id) => id,
            None => self.build_static_group(group, &name)?,
        };
        Ok(self.data_addr(b, id))
    }

    fn build_static_group(&mut self, group: &NamelistGroup, name: &str) -> Result<DataId> {
        let end = self.endianness();
        let table_id = self.static_table_data()?;
        let mut items = Vec::with_capacity(group.members.len());
        for m in &group.members {
            let name_id = self.cache.cstring(self.module, m.name.as_bytes())?;
            let desc_id = self.member_descriptor_data(m)?;
            items.push((name_id, desc_id));
        }
        let list_id =
            self.module
                .declare_data(&format!("{name}.list"), Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        dd.define(vec![0; 16 * items.len()].into_boxed_slice());
        for (i, (name_id, desc_id)) in items.iter().enumerate() {
            let ngv = self.module.declare_data_in_data(*name_id, &mut dd);
            dd.write_data_addr((16 * i) as u32, ngv, 0);
            let dgv = self.module.declare_data_in_data(*desc_id, &mut dd);
            dd.write_data_addr((16 * i + 8) as u32, dgv, 0);
        }
        self.module.define_data(list_id, &dd)?;

        let group_name_id = self.cache.cstring(self.module, group.name.as_bytes())?;
        let id = self.module.declare_data(name, Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        let mut blob = Blob::new(32, end);
        blob.put_u64(8, group.members.len() as u64);
        dd.define(blob.bytes.into_boxed_slice());
        let gv = self.module.declare_data_in_data(group_name_id, &mut dd);
        dd.write_data_addr(0, gv, 0);
        let gv = self.module.declare_data_in_data(list_id, &mut dd);
        dd.write_data_addr(16, gv, 0);
        let gv = self.module.declare_data_in_data(table_id, &mut dd);
        dd.write_data_addr(24, gv, 0);
        self.module.define_data(id, &dd)?;
        Ok(id)
    }

    /// Descriptor global for a statically stored namelist member.
    fn member_descriptor_data(&mut self, m: &Symbol) -> Result<DataId> {
        let mangled = self.conv.mangled_name(m);
        if m.is_alloc_or_pointer {
            // The variable's global storage is itself a descriptor.
            return self.named_data(&mangled).ok_or_else(|| {
                LowerError::fatal(format!("no global descriptor for '{}'", m.name))
            });
        }
        let desc_name = format!("{mangled}.nml.desc");
        if let Some(id) = self.named_data(&desc_name) {
            return Ok(id);
        }
        let (target, addend) = match &m.common {
            Some(binding) => {
                let id = self.named_data(&binding.block).ok_or_else(|| {
                    LowerError::fatal(format!("no common block '{}'", binding.block))
                })?;
                (id, binding.byte_offset as i64)
            }
            None => {
                let id = self.named_data(&mangled).ok_or_else(|| {
                    LowerError::fatal(format!("no global storage for '{}'", m.name))
                })?;
                (id, 0)
            }
        };
        let id = self
            .module
            .declare_data(&desc_name, Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        let blob = descriptor_blob(m, self.endianness());
        dd.define(blob.bytes.into_boxed_slice());
        let gv = self.module.declare_data_in_data(target, &mut dd);
        dd.write_data_addr(0, gv, addend);
        self.module.define_data(id, &dd)?;
        Ok(id)
    }

    /// Group object built on the stack because a member or a defined-I/O
    /// subroutine is local to the current unit.
    fn build_local_group(
        &mut self,
        b: &mut FunctionBuilder,
        group: &NamelistGroup,
    ) -> Result<ir::Value> {
        let ptr = self.ptr_ty();
        let n = group.members.len();
        let mut entries = Vec::with_capacity(n);
        for m in &group.members {
            let name_id = self.cache.cstring(self.module, m.name.as_bytes())?;
            let name_addr = self.data_addr(b, name_id);
            let desc = if m.is_global {
                let id = self.member_descriptor_data(m)?;
                self.data_addr(b, id)
            } else if m.is_alloc_or_pointer {
                // Local allocatable or pointer storage is a descriptor.
                self.conv.symbol_address(b, m)?
            } else {
                self.stack_descriptor(b, m)?
            };
            entries.push((name_addr, desc));
        }
        let list_slot = b.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            (16 * n.max(1)) as u32,
            3,
        ));
        let list = b.ins().stack_addr(ptr, list_slot, 0);
        for (i, (name_addr, desc)) in entries.into_iter().enumerate() {
            b.ins()
                .store(MemFlags::new(), name_addr, list, (16 * i) as i32);
            b.ins()
                .store(MemFlags::new(), desc, list, (16 * i + 8) as i32);
        }
        let table = self.nontbp_table_addr(b)?;
        let group_name_id = self.cache.cstring(self.module, group.name.as_bytes())?;
        let group_name = self.data_addr(b, group_name_id);
        let slot = b.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            32,
            3,
        ));
        let addr = b.ins().stack_addr(ptr, slot, 0);
        let count = b.ins().iconst(types::I64, n as i64);
        b.ins().store(MemFlags::new(), group_name, addr, 0);
        b.ins().store(MemFlags::new(), count, addr, 8);
        b.ins().store(MemFlags::new(), list, addr, 16);
        b.ins().store(MemFlags::new(), table, addr, 24);
        Ok(addr)
    }

    /// Pointer descriptor for a local member, filled in at run time.
    fn stack_descriptor(&mut self, b: &mut FunctionBuilder, m: &Symbol) -> Result<ir::Value> {
        let ptr = self.ptr_ty();
        let blob = descriptor_blob(m, self.endianness());
        let size = blob.bytes.len();
        let slot = b.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size as u32,
            3,
        ));
        let addr = b.ins().stack_addr(ptr, slot, 0);
        let base = self.conv.symbol_address(b, m)?;
        b.ins().store(MemFlags::new(), base, addr, 0);
        // The constant part of the header and the dimensions are known at
        // compile time; store them in pointer-sized chunks.
        for (i, chunk) in blob.bytes[8..].chunks(8).enumerate() {
            let mut raw = [0u8; 8];
            raw[..chunk.len()].copy_from_slice(chunk);
            let word = if self.endianness() == Endianness::Big {
                u64::from_be_bytes(raw)
            } else {
                u64::from_le_bytes(raw)
            };
            let v = b.ins().iconst(types::I64, word as i64);
            b.ins().store(MemFlags::new(), v, addr, (8 + 8 * i) as i32);
        }
        Ok(addr)
    }

    /// Address of the non-type-bound defined-I/O table for the current
    /// scope. Shared statics are used whenever every referenced
    /// subroutine has static storage; the empty table is one module-wide
    /// object.
    pub(crate) fn nontbp_table_addr(&mut self, b: &mut FunctionBuilder) -> Result<ir::Value> {
        let procs = self.conv.defined_io_procs();
        if procs.iter().any(|p| p.is_pointer) {
            return Err(LowerError::unsupported(
                "procedure pointer in defined input/output",
            ));
        }
        if procs.iter().any(|p| p.is_dummy) {
            return self.build_local_table(b);
        }
        let id = self.static_table_data()?;
        Ok(self.data_addr(b, id))
    }

    fn static_table_data(&mut self) -> Result<DataId> {
        let procs = self.conv.defined_io_procs();
        let end = self.endianness();
        if procs.is_empty() {
            let name = "default.nonTbpDefinedIoTable";
            if let Some(id) = self.named_data(name) {
                return Ok(id);
            }
            let id = self.module.declare_data(name, Linkage::Local, false, false)?;
            let mut dd = DataDescription::new();
            let mut blob = Blob::new(24, end);
            blob.put_u8(16, 1); // ignoreNonTbpEntries
            dd.define(blob.bytes.into_boxed_slice());
            self.module.define_data(id, &dd)?;
            return Ok(id);
        }
        let name = self.conv.defined_io_table_name();
        if let Some(id) = self.named_data(&name) {
            return Ok(id);
        }
        let list_id =
            self.module
                .declare_data(&format!("{name}.list"), Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        let mut blob = Blob::new(24 * procs.len(), end);
        for (i, p) in procs.iter().enumerate() {
            blob.put_u32(24 * i + 16, p.variant.as_i32() as u32);
            blob.put_u8(24 * i + 20, u8::from(p.is_polymorphic));
        }
        dd.define(blob.bytes.into_boxed_slice());
        for (i, p) in procs.iter().enumerate() {
            let info = self.type_info_data(&p.derived)?;
            let gv = self.module.declare_data_in_data(info, &mut dd);
            dd.write_data_addr((24 * i) as u32, gv, 0);
            if let Some(proc) = &p.proc {
                let fid = self.conv.proc_func_id(self.module, proc)?;
                let fref = self.module.declare_func_in_data(fid, &mut dd);
                dd.write_function_addr((24 * i + 8) as u32, fref);
            }
        }
        self.module.define_data(list_id, &dd)?;

        let id = self.module.declare_data(&name, Linkage::Local, false, false)?;
        let mut dd = DataDescription::new();
        let mut blob = Blob::new(24, end);
        blob.put_u64(0, procs.len() as u64);
        blob.put_u8(16, 1); // ignoreNonTbpEntries
        dd.define(blob.bytes.into_boxed_slice());
        let gv = self.module.declare_data_in_data(list_id, &mut dd);
        dd.write_data_addr(8, gv, 0);
        self.module.define_data(id, &dd)?;
        Ok(id)
    }

    /// Table rebuilt on the stack because a subroutine is a dummy
    /// procedure of the enclosing unit.
    fn build_local_table(&mut self, b: &mut FunctionBuilder) -> Result<ir::Value> {
        let ptr = self.ptr_ty();
        let procs = self.conv.defined_io_procs();
        let n = procs.len();
        let list_slot = b.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            (24 * n) as u32,
            3,
        ));
        let list = b.ins().stack_addr(ptr, list_slot, 0);
        for (i, p) in procs.iter().enumerate() {
            let info = self.type_info_data(&p.derived)?;
            let info_addr = self.data_addr(b, info);
            let proc_addr = match &p.proc {
                Some(proc) if p.is_dummy => self.conv.dummy_proc_value(b, proc)?,
                Some(proc) => {
                    let fid = self.conv.proc_func_id(self.module, proc)?;
                    let fref = self.module.declare_func_in_func(fid, b.func);
                    b.ins().func_addr(ptr, fref)
                }
                None => self.null_ptr(b),
            };
            let variant = b.ins().iconst(types::I32, i64::from(p.variant.as_i32()));
            let flags = b
                .ins()
                .iconst(types::I8, i64::from(u8::from(p.is_polymorphic)));
            let off = (24 * i) as i32;
            b.ins().store(MemFlags::new(), info_addr, list, off);
            b.ins().store(MemFlags::new(), proc_addr, list, off + 8);
            b.ins().store(MemFlags::new(), variant, list, off + 16);
            b.ins().store(MemFlags::new(), flags, list, off + 20);
        }
        let slot = b.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            24,
            3,
        ));
        let addr = b.ins().stack_addr(ptr, slot, 0);
        let count = b.ins().iconst(types::I64, n as i64);
        let ignore = b.ins().iconst(types::I8, 1);
        b.ins().store(MemFlags::new(), count, addr, 0);
        b.ins().store(MemFlags::new(), list, addr, 8);
        b.ins().store(MemFlags::new(), ignore, addr, 16);
        Ok(addr)
    }

    /// Description object of a derived type, created by type lowering.
    fn type_info_data(&mut self, ty: &Symbol) -> Result<DataId> {
        let name = self.conv.type_info_name(ty);
        self.named_data(&name)
            .ok_or_else(|| LowerError::fatal(format!("no type description for '{}'", ty.name)))
    }
}
