//! Lowers I/O statements through a stub expression converter and checks
//! the emitted runtime call sequences, argument constants, and control
//! flow shapes.

use std::collections::HashMap;
use std::rc::Rc;

use cranelift_codegen::ir::{self, types, InstBuilder, Signature, StackSlotData, StackSlotKind};
use cranelift_codegen::{isa, settings};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{DataDescription, FuncId, Linkage, Module as _};
use cranelift_object::{ObjectBuilder, ObjectModule};
use target_lexicon::Triple;

use f90lower::ast::*;
use f90lower::bridge::{Converter, ElementCall, SourceLoc};
use f90lower::errors::Result as LowerResult;
use f90lower::runtime::inquiry_keyword_hash;
use f90lower::{GlobalCache, IoLowerer};

#[derive(Clone)]
enum StubVal {
    Int(i64),
    Real(f64),
    Chars(String),
    Var,
}

/// Expression converter stub: every expression handle maps to a constant
/// or a fresh stack slot.
#[derive(Default)]
struct Stub {
    ptr: Option<ir::Type>,
    vals: HashMap<u32, StubVal>,
    next: u32,
    addr_slots: HashMap<u32, ir::StackSlot>,
    sym_slots: HashMap<String, ir::StackSlot>,
    formats: HashMap<u32, String>,
    assigned: HashMap<String, Vec<u32>>,
    procs: Vec<DefinedIoProc>,
}

impl Stub {
    fn add(&mut self, val: StubVal, ty: IoType) -> TypedExpr {
        let id = self.next;
        self.next += 1;
        self.vals.insert(id, val);
        TypedExpr {
            id: ExprId(id),
            ty,
            has_vector_subscript: false,
            symbol: None,
        }
    }

    fn int_expr(&mut self, v: i64, bits: u16) -> TypedExpr {
        self.add(StubVal::Int(v), IoType::scalar(TypeCat::Integer { bits }))
    }

    fn real_expr(&mut self, v: f64, bits: u16) -> TypedExpr {
        self.add(StubVal::Real(v), IoType::scalar(TypeCat::Real { bits }))
    }

    fn var(&mut self, cat: TypeCat, rank: u8) -> TypedExpr {
        self.add(StubVal::Var, IoType::array(cat, rank))
    }

    fn int_var(&mut self, bits: u16) -> TypedExpr {
        self.var(TypeCat::Integer { bits }, 0)
    }

    fn char_var(&mut self, rank: u8) -> TypedExpr {
        self.var(TypeCat::Character { kind_bytes: 1 }, rank)
    }

    fn char_expr(&mut self, s: &str) -> TypedExpr {
        self.add(
            StubVal::Chars(s.to_string()),
            IoType::scalar(TypeCat::Character { kind_bytes: 1 }),
        )
    }

    fn ptr(&self) -> ir::Type {
        self.ptr.unwrap_or(types::I64)
    }

    fn slot(&mut self, b: &mut FunctionBuilder, id: u32, size: u32) -> ir::StackSlot {
        *self.addr_slots.entry(id).or_insert_with(|| {
            b.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, size, 3))
        })
    }
}

fn int_ty(bits: u16) -> ir::Type {
    match bits {
        8 => types::I8,
        16 => types::I16,
        64 => types::I64,
        128 => types::I128,
        _ => types::I32,
    }
}

// iconst cannot make I128 directly.
fn int_const(b: &mut FunctionBuilder, v: i64, bits: u16) -> ir::Value {
    if bits == 128 {
        let half = b.ins().iconst(types::I64, v);
        b.ins().sextend(types::I128, half)
    } else {
        b.ins().iconst(int_ty(bits), v)
    }
}

impl Converter for Stub {
    fn location(&self) -> SourceLoc {
        SourceLoc {
            file: "main.f90".to_string(),
            line: 12,
        }
    }

    fn expr_value(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> LowerResult<ir::Value> {
        let val = self.vals.get(&e.id.0).cloned().unwrap_or(StubVal::Var);
        Ok(match (&e.ty.cat, val) {
            (TypeCat::Real { bits: 32 }, StubVal::Real(v)) => b.ins().f32const(v as f32),
            (TypeCat::Real { .. }, StubVal::Real(v)) => b.ins().f64const(v),
            (TypeCat::Real { bits: 32 }, _) => b.ins().f32const(0.0),
            (TypeCat::Real { .. }, _) => b.ins().f64const(0.0),
            (_, StubVal::Int(v)) => {
                let bits = e.ty.kind_bytes().unwrap_or(4) * 8;
                int_const(b, v, bits)
            }
            _ => {
                let bits = e.ty.kind_bytes().unwrap_or(4) * 8;
                int_const(b, 0, bits)
            }
        })
    }

    fn expr_address(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> LowerResult<ir::Value> {
        let ptr = self.ptr();
        let slot = self.slot(b, e.id.0, 32);
        Ok(b.ins().stack_addr(ptr, slot, 0))
    }

    fn expr_box(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> LowerResult<ir::Value> {
        let ptr = self.ptr();
        let slot = self.slot(b, e.id.0 | 0x8000_0000, 72);
        Ok(b.ins().stack_addr(ptr, slot, 0))
    }

    fn char_addr_len(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
    ) -> LowerResult<(ir::Value, ir::Value)> {
        let len = match self.vals.get(&e.id.0) {
            Some(StubVal::Chars(s)) => s.len() as i64,
            _ => 16,
        };
        let addr = self.expr_address(b, e)?;
        Ok((addr, b.ins().iconst(types::I64, len)))
    }

    fn char_len(&mut self, b: &mut FunctionBuilder, _e: &TypedExpr) -> LowerResult<ir::Value> {
        Ok(b.ins().iconst(types::I64, 16))
    }

    fn complex_parts(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
    ) -> LowerResult<(ir::Value, ir::Value)> {
        Ok(match e.ty.cat {
            TypeCat::Complex { bits: 32 } => (b.ins().f32const(1.0), b.ins().f32const(2.0)),
            _ => (b.ins().f64const(1.0), b.ins().f64const(2.0)),
        })
    }

    fn loop_over_elements(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
        must_box: bool,
        each: ElementCall,
    ) -> LowerResult<()> {
        // Two-element stand-in for the gather/scatter loop.
        for _ in 0..2 {
            let elem = if must_box {
                self.expr_box(b, e)?
            } else {
                self.expr_address(b, e)?
            };
            each(b, elem)?;
        }
        Ok(())
    }

    fn loop_over_elements_while(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
        must_box: bool,
        ok: ir::Value,
        each: ElementCall,
    ) -> LowerResult<ir::Value> {
        let mut acc = ok;
        for _ in 0..2 {
            let elem = if must_box {
                self.expr_box(b, e)?
            } else {
                self.expr_address(b, e)?
            };
            let r = each(b, elem)?;
            acc = b.ins().band(acc, r);
        }
        Ok(acc)
    }

    fn format_text(&self, label: u32) -> Option<String> {
        self.formats.get(&label).cloned()
    }

    fn assigned_labels(&self, sym: &Symbol) -> Vec<u32> {
        self.assigned.get(&sym.name).cloned().unwrap_or_default()
    }

    fn mangled_name(&self, sym: &Symbol) -> String {
        format!("g_{}", sym.name)
    }

    fn mangled_group_name(&self, group: &NamelistGroup) -> String {
        format!("nml_{}", group.name)
    }

    fn defined_io_table_name(&self) -> String {
        "scope.nonTbpDefinedIoTable".to_string()
    }

    fn type_info_name(&self, ty: &Symbol) -> String {
        format!("ti_{}", ty.name)
    }

    fn defined_io_procs(&self) -> Vec<DefinedIoProc> {
        self.procs.clone()
    }

    fn symbol_address(
        &mut self,
        b: &mut FunctionBuilder,
        sym: &Symbol,
    ) -> LowerResult<ir::Value> {
        let ptr = self.ptr();
        let slot = *self.sym_slots.entry(sym.name.clone()).or_insert_with(|| {
            b.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, 64, 3))
        });
        Ok(b.ins().stack_addr(ptr, slot, 0))
    }

    fn proc_func_id(&mut self, module: &mut ObjectModule, proc: &Symbol) -> LowerResult<FuncId> {
        let sig = Signature::new(module.isa().default_call_conv());
        Ok(module.declare_function(&format!("p_{}", proc.name), Linkage::Import, &sig)?)
    }

    fn dummy_proc_value(
        &mut self,
        b: &mut FunctionBuilder,
        _proc: &Symbol,
    ) -> LowerResult<ir::Value> {
        Ok(b.ins().iconst(self.ptr(), 0))
    }
}

struct Lowered {
    module: ObjectModule,
    func: ir::Function,
    /// Whether each statement returned a final iostat value.
    iostats: Vec<bool>,
}

fn lower_with(
    stub: &mut Stub,
    prep: impl FnOnce(&mut ObjectModule),
    stmts: &[IoStmt],
) -> Lowered {
    let _ = env_logger::builder().is_test(true).try_init();
    let flags = settings::Flags::new(settings::builder());
    let isa = isa::lookup(Triple::host())
        .expect("host isa")
        .finish(flags)
        .expect("isa flags");
    let builder = ObjectBuilder::new(isa, "io-test", cranelift_module::default_libcall_names())
        .expect("object builder");
    let mut module = ObjectModule::new(builder);
    prep(&mut module);
    stub.ptr = Some(module.isa().pointer_type());

    let mut ctx = module.make_context();
    ctx.func.signature = Signature::new(module.isa().default_call_conv());
    let mut fbc = FunctionBuilderContext::new();
    let mut b = FunctionBuilder::new(&mut ctx.func, &mut fbc);
    let entry = b.create_block();
    b.switch_to_block(entry);
    b.seal_block(entry);

    let mut cache = GlobalCache::new();
    let mut iostats = Vec::new();
    {
        let mut lowerer = IoLowerer::new(&mut module, stub, &mut cache);
        for s in stmts {
            let r = lowerer.lower_stmt(&mut b, s).expect("lowering failed");
            iostats.push(r.is_some());
        }
    }
    b.ins().return_(&[]);
    b.finalize();
    Lowered {
        module,
        func: ctx.func,
        iostats,
    }
}

fn lower(stub: &mut Stub, stmts: &[IoStmt]) -> Lowered {
    lower_with(stub, |_| {}, stmts)
}

/// Names of called runtime entries, in layout order.
fn io_calls(l: &Lowered) -> Vec<String> {
    let mut out = Vec::new();
    for block in l.func.layout.blocks() {
        for inst in l.func.layout.block_insts(block) {
            if let Some(name) = call_target(l, inst) {
                out.push(name);
            }
        }
    }
    out
}

fn call_target(l: &Lowered, inst: ir::Inst) -> Option<String> {
    let ir::InstructionData::Call { func_ref, .. } = l.func.dfg.insts[inst] else {
        return None;
    };
    let ext = &l.func.dfg.ext_funcs[func_ref];
    let ir::ExternalName::User(nref) = ext.name else {
        return None;
    };
    let uen = &l.func.params.user_named_funcs()[nref];
    if uen.namespace != 0 {
        return None;
    }
    let id = FuncId::from_u32(uen.index);
    l.module.declarations().get_function_decl(id).name.clone()
}

/// First call instruction whose target name ends with `suffix`.
fn find_call(l: &Lowered, suffix: &str) -> Option<ir::Inst> {
    for block in l.func.layout.blocks() {
        for inst in l.func.layout.block_insts(block) {
            if let Some(name) = call_target(l, inst) {
                if name.ends_with(suffix) {
                    return Some(inst);
                }
            }
        }
    }
    None
}

fn entry_suffixes(l: &Lowered) -> Vec<String> {
    io_calls(l)
        .iter()
        .map(|n| n.trim_start_matches("_FortranAio").to_string())
        .collect()
}

/// Integer constant feeding `v`, if its definition is an `iconst`.
fn const_of(l: &Lowered, v: ir::Value) -> Option<i64> {
    match l.func.dfg.value_def(v) {
        ir::ValueDef::Result(inst, 0) => match l.func.dfg.insts[inst] {
            ir::InstructionData::UnaryImm { imm, .. } => Some(imm.bits()),
            _ => None,
        },
        _ => None,
    }
}

fn f64_const_of(l: &Lowered, v: ir::Value) -> Option<f64> {
    match l.func.dfg.value_def(v) {
        ir::ValueDef::Result(inst, 0) => match l.func.dfg.insts[inst] {
            ir::InstructionData::UnaryIeee64 { imm, .. } => Some(f64::from_bits(imm.bits())),
            _ => None,
        },
        _ => None,
    }
}

fn count_opcode(l: &Lowered, op: ir::Opcode) -> usize {
    let mut n = 0;
    for block in l.func.layout.blocks() {
        for inst in l.func.layout.block_insts(block) {
            if l.func.dfg.insts[inst].opcode() == op {
                n += 1;
            }
        }
    }
    n
}

fn block_count(l: &Lowered) -> usize {
    l.func.layout.blocks().count()
}

fn list_write(items: Vec<IoItem>) -> IoStmt {
    IoStmt::Write(TransferStmt {
        unit: None,
        format: Some(FormatSpec::ListDirected),
        namelist: None,
        controls: vec![],
        items,
    })
}

fn sym(name: &str, global: bool) -> Rc<Symbol> {
    Rc::new(Symbol {
        name: name.to_string(),
        ty: IoType::scalar(TypeCat::Integer { bits: 32 }),
        elem_bytes: 4,
        shape: vec![],
        is_global: global,
        is_alloc_or_pointer: false,
        common: None,
    })
}

fn define_global(module: &mut ObjectModule, name: &str, size: usize) {
    let id = module
        .declare_data(name, Linkage::Local, true, false)
        .expect("declare");
    let mut dd = DataDescription::new();
    dd.define(vec![0; size].into_boxed_slice());
    module.define_data(id, &dd).expect("define");
}

#[test]
fn print_list_output_brackets_the_statement() {
    let mut stub = Stub::default();
    let item = stub.int_expr(42, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Print(TransferStmt {
            unit: None,
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginExternalListOutput", "OutputInteger32", "EndIoStatement"]
    );
    let begin = find_call(&l, "BeginExternalListOutput").unwrap();
    let args = l.func.dfg.inst_args(begin);
    assert_eq!(const_of(&l, args[0]), Some(6), "default output unit");
    assert_eq!(l.iostats, [false]);
}

#[test]
fn read_without_unit_uses_default_input_unit() {
    let mut stub = Stub::default();
    let item = stub.int_var(32);
    let l = lower(
        &mut stub,
        &[IoStmt::Read(TransferStmt {
            unit: None,
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginExternalListInput", "InputInteger", "EndIoStatement"]
    );
    let begin = find_call(&l, "BeginExternalListInput").unwrap();
    let args = l.func.dfg.inst_args(begin);
    assert_eq!(const_of(&l, args[0]), Some(5), "default input unit");
    let input = find_call(&l, "InputInteger").unwrap();
    let args = l.func.dfg.inst_args(input);
    assert_eq!(const_of(&l, args[2]), Some(4), "kind argument in bytes");
}

#[test]
fn output_entries_follow_type_and_kind() {
    let mut stub = Stub::default();
    let items = vec![
        IoItem::Expr(stub.int_expr(1, 8)),
        IoItem::Expr(stub.int_expr(2, 16)),
        IoItem::Expr(stub.int_expr(3, 32)),
        IoItem::Expr(stub.int_expr(4, 64)),
        IoItem::Expr(stub.int_expr(5, 128)),
        IoItem::Expr(stub.real_expr(1.5, 32)),
        IoItem::Expr(stub.real_expr(2.5, 64)),
        IoItem::Expr(stub.var(TypeCat::Complex { bits: 64 }, 0)),
        IoItem::Expr(stub.var(TypeCat::Logical { bits: 32 }, 0)),
        IoItem::Expr(stub.char_expr("hello")),
        IoItem::Expr(stub.var(TypeCat::Real { bits: 64 }, 1)),
    ];
    let l = lower(&mut stub, &[list_write(items)]);
    assert_eq!(
        entry_suffixes(&l),
        [
            "BeginExternalListOutput",
            "OutputInteger8",
            "OutputInteger16",
            "OutputInteger32",
            "OutputInteger64",
            "OutputInteger128",
            "OutputReal32",
            "OutputReal64",
            "OutputComplex64",
            "OutputLogical",
            "OutputAscii",
            "OutputDescriptor",
            "EndIoStatement",
        ]
    );
    let complex = find_call(&l, "OutputComplex64").unwrap();
    let args = l.func.dfg.inst_args(complex);
    assert_eq!(args.len(), 3);
    assert_eq!(f64_const_of(&l, args[1]), Some(1.0), "real part first");
    assert_eq!(f64_const_of(&l, args[2]), Some(2.0), "imaginary part second");
}

#[test]
fn guarding_adds_branches_without_changing_calls() {
    let write = |stub: &mut Stub, controls: Vec<IoControlSpec>| {
        let unit = stub.int_expr(9, 32);
        let first = stub.int_expr(1, 32);
        let second = stub.real_expr(1.5, 64);
        IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls,
            items: vec![IoItem::Expr(first), IoItem::Expr(second)],
        })
    };
    let mut plain_stub = Stub::default();
    let stmt = write(&mut plain_stub, vec![]);
    let plain = lower(&mut plain_stub, &[stmt]);

    let mut checked_stub = Stub::default();
    let iostat = checked_stub.int_var(32);
    let stmt = write(&mut checked_stub, vec![IoControlSpec::IoStat(iostat)]);
    let checked = lower(&mut checked_stub, &[stmt]);

    // Guarding only adds branches and the handler call; the success-path
    // call sequence is unchanged.
    let minus_handlers: Vec<String> = entry_suffixes(&checked)
        .into_iter()
        .filter(|n| n != "EnableHandlers")
        .collect();
    assert_eq!(entry_suffixes(&plain), minus_handlers);
    assert_eq!(block_count(&plain), 1);
    assert!(block_count(&checked) > 1);
}

#[test]
fn unformatted_transfer_uses_descriptors() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(10, 32);
    let item = stub.int_expr(7, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: None,
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginUnformattedOutput", "OutputDescriptor", "EndIoStatement"]
    );
}

#[test]
fn format_label_text_is_trimmed_to_parentheses() {
    let mut stub = Stub::default();
    stub.formats.insert(10, "  10 FORMAT (I5)".to_string());
    let unit = stub.int_expr(10, 32);
    let item = stub.int_expr(7, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::Label(10)),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    let begin = find_call(&l, "BeginExternalFormattedOutput").unwrap();
    let args = l.func.dfg.inst_args(begin);
    assert_eq!(args.len(), 6);
    assert_eq!(const_of(&l, args[1]), Some(4), "length of \"(I5)\"");
}

#[test]
fn internal_units_pick_buffer_or_descriptor_begin() {
    let mut stub = Stub::default();
    let scalar = stub.char_var(0);
    let array = stub.char_var(1);
    let item = stub.int_expr(1, 32);
    let item2 = stub.int_expr(2, 32);
    let l = lower(
        &mut stub,
        &[
            IoStmt::Write(TransferStmt {
                unit: Some(IoUnit::Internal(scalar)),
                format: Some(FormatSpec::ListDirected),
                namelist: None,
                controls: vec![],
                items: vec![IoItem::Expr(item)],
            }),
            IoStmt::Write(TransferStmt {
                unit: Some(IoUnit::Internal(array)),
                format: Some(FormatSpec::ListDirected),
                namelist: None,
                controls: vec![],
                items: vec![IoItem::Expr(item2)],
            }),
        ],
    );
    let names = entry_suffixes(&l);
    assert!(names.contains(&"BeginInternalListOutput".to_string()));
    assert!(names.contains(&"BeginInternalArrayListOutput".to_string()));
}

#[test]
fn open_threads_specifiers_on_a_guarded_chain() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(8, 32);
    let iostat = stub.int_var(32);
    let file = stub.char_expr("out.dat");
    let status = stub.char_expr("REPLACE");
    let l = lower(
        &mut stub,
        &[IoStmt::Open(OpenStmt {
            specs: vec![
                ConnectSpec::Unit(unit),
                ConnectSpec::IoStat(iostat),
                ConnectSpec::File(file),
                ConnectSpec::Status(status),
            ],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        [
            "BeginOpenUnit",
            "EnableHandlers",
            "SetFile",
            "SetStatus",
            "EndIoStatement",
        ]
    );
    // The second setter is reached through a guard on the first's result.
    assert!(block_count(&l) > 1);
    assert!(count_opcode(&l, ir::Opcode::Store) >= 1, "IOSTAT= store");
    assert_eq!(l.iostats, [true]);
}

#[test]
fn close_without_error_specs_is_straight_line() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(3, 32);
    let status = stub.char_expr("KEEP");
    let l = lower(
        &mut stub,
        &[IoStmt::Close(CloseStmt {
            unit,
            specs: vec![CloseSpec::Status(status)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginClose", "SetStatus", "EndIoStatement"]
    );
    assert_eq!(block_count(&l), 1);
    assert_eq!(l.iostats, [false]);
}

#[test]
fn open_newunit_queries_the_allocated_unit() {
    let mut stub = Stub::default();
    let var = stub.int_var(32);
    let l = lower(
        &mut stub,
        &[IoStmt::Open(OpenStmt {
            specs: vec![ConnectSpec::NewUnit(var)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginOpenNewUnit", "GetNewUnit", "EndIoStatement"]
    );
}

#[test]
fn wide_unit_numbers_go_through_the_range_check() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(99, 64);
    let iostat = stub.int_var(32);
    let l = lower(
        &mut stub,
        &[IoStmt::Backspace(PositionStmt {
            unit,
            specs: vec![PositionSpec::IoStat(iostat)],
        })],
    );
    let names = entry_suffixes(&l);
    let check = names
        .iter()
        .position(|n| n == "CheckUnitNumberInRange64")
        .expect("range check emitted");
    let begin = names.iter().position(|n| n == "BeginBackspace").unwrap();
    assert!(check < begin);
    // Failed check skips the statement body and merges its iostat.
    assert!(block_count(&l) > 1);
}

#[test]
fn wait_selects_by_id_presence() {
    let mut stub = Stub::default();
    let u1 = stub.int_expr(4, 32);
    let u2 = stub.int_expr(4, 32);
    let id = stub.int_expr(17, 32);
    let l = lower(
        &mut stub,
        &[
            IoStmt::Wait(WaitStmt {
                unit: u1,
                specs: vec![WaitSpec::Id(id)],
            }),
            IoStmt::Wait(WaitStmt {
                unit: u2,
                specs: vec![],
            }),
        ],
    );
    let names = entry_suffixes(&l);
    assert!(names.contains(&"BeginWait".to_string()));
    assert!(names.contains(&"BeginWaitAll".to_string()));
    let wait = find_call(&l, "BeginWait").unwrap();
    assert_eq!(l.func.dfg.inst_args(wait).len(), 4);
}

#[test]
fn size_and_id_are_queried_after_the_transfer() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(9, 32);
    let rec = stub.int_expr(3, 32);
    let size = stub.int_var(64);
    let id = stub.int_var(32);
    let iostat = stub.int_var(32);
    let item = stub.int_var(32);
    let l = lower(
        &mut stub,
        &[IoStmt::Read(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![
                IoControlSpec::Rec(rec),
                IoControlSpec::Size(size),
                IoControlSpec::Id(id),
                IoControlSpec::IoStat(iostat),
            ],
            items: vec![IoItem::Expr(item)],
        })],
    );
    let names = entry_suffixes(&l);
    let input = names.iter().position(|n| n == "InputInteger").unwrap();
    let get_size = names.iter().position(|n| n == "GetSize").unwrap();
    let get_id = names.iter().position(|n| n == "GetAsynchronousId").unwrap();
    let end = names.iter().position(|n| n == "EndIoStatement").unwrap();
    assert!(names.contains(&"SetRec".to_string()));
    assert!(names.contains(&"EnableHandlers".to_string()));
    assert!(input < get_size && get_size < end && get_id < end);
}

#[test]
fn implied_do_loops_store_the_control_variable() {
    let mut stub = Stub::default();
    let var = stub.int_var(32);
    let lo = stub.int_expr(1, 32);
    let hi = stub.int_expr(3, 32);
    let item = stub.int_var(32);
    let l = lower(
        &mut stub,
        &[list_write(vec![IoItem::ImpliedDo(ImpliedDo {
            var,
            lower: lo,
            upper: hi,
            step: None,
            items: vec![IoItem::Expr(item)],
        })])],
    );
    let names = entry_suffixes(&l);
    assert!(names.contains(&"OutputInteger32".to_string()));
    // header, body, exit on top of the entry block
    assert!(block_count(&l) >= 4);
    // stored once per iteration and once at exit
    assert!(count_opcode(&l, ir::Opcode::Store) >= 2);
}

#[test]
fn checked_implied_do_freezes_induction_on_failure() {
    let mut stub = Stub::default();
    let var = stub.int_var(32);
    let lo = stub.int_expr(1, 32);
    let hi = stub.int_expr(10, 32);
    let iostat = stub.int_var(32);
    let item = stub.int_var(32);
    let unit = stub.int_expr(2, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![IoControlSpec::IoStat(iostat)],
            items: vec![IoItem::ImpliedDo(ImpliedDo {
                var,
                lower: lo,
                upper: hi,
                step: None,
                items: vec![IoItem::Expr(item)],
            })],
        })],
    );
    assert!(count_opcode(&l, ir::Opcode::Select) >= 2, "trip clamp and induction freeze");
    assert!(entry_suffixes(&l).contains(&"OutputInteger32".to_string()));
}

#[test]
fn inquire_by_unit_hashes_each_keyword() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(7, 32);
    let name = stub.char_var(0);
    let nextrec = stub.int_var(64);
    let opened = stub.var(TypeCat::Logical { bits: 32 }, 0);
    let l = lower(
        &mut stub,
        &[IoStmt::Inquire(InquireStmt::Specs(vec![
            InquireSpec::Unit(unit),
            InquireSpec::CharVar(InquireCharKind::Name, name),
            InquireSpec::IntVar(InquireIntKind::Nextrec, nextrec),
            InquireSpec::LogVar(InquireLogKind::Opened, opened),
        ]))],
    );
    assert_eq!(
        entry_suffixes(&l),
        [
            "BeginInquireUnit",
            "InquireCharacter",
            "InquireInteger64",
            "InquireLogical",
            "EndIoStatement",
        ]
    );
    let call = find_call(&l, "InquireCharacter").unwrap();
    let args = l.func.dfg.inst_args(call);
    assert_eq!(
        const_of(&l, args[1]),
        Some(i64::from(inquiry_keyword_hash("NAME")))
    );
}

#[test]
fn pending_with_id_uses_the_id_query() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(7, 32);
    let id = stub.int_expr(21, 32);
    let pending = stub.var(TypeCat::Logical { bits: 32 }, 0);
    let l = lower(
        &mut stub,
        &[IoStmt::Inquire(InquireStmt::Specs(vec![
            InquireSpec::Unit(unit),
            InquireSpec::Id(id),
            InquireSpec::LogVar(InquireLogKind::Pending, pending),
        ]))],
    );
    assert_eq!(
        entry_suffixes(&l),
        ["BeginInquireUnit", "InquirePendingId", "EndIoStatement"]
    );
}

#[test]
fn inquire_by_file_passes_the_name() {
    let mut stub = Stub::default();
    let file = stub.char_expr("data.bin");
    let exist = stub.var(TypeCat::Logical { bits: 32 }, 0);
    let l = lower(
        &mut stub,
        &[IoStmt::Inquire(InquireStmt::Specs(vec![
            InquireSpec::File(file),
            InquireSpec::LogVar(InquireLogKind::Exist, exist),
        ]))],
    );
    let begin = find_call(&l, "BeginInquireFile").unwrap();
    let args = l.func.dfg.inst_args(begin);
    assert_eq!(args.len(), 4);
    assert_eq!(const_of(&l, args[1]), Some(8), "length of \"data.bin\"");
}

#[test]
fn iolength_counts_unformatted_item_bytes() {
    let mut stub = Stub::default();
    let var = stub.int_var(64);
    let item = stub.int_expr(5, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Inquire(InquireStmt::IoLength {
            var,
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert_eq!(
        entry_suffixes(&l),
        [
            "BeginInquireIoLength",
            "OutputDescriptor",
            "GetIoLength",
            "EndIoStatement",
        ]
    );
}

#[test]
fn iomsg_is_fetched_before_end_io_statement() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(3, 32);
    let msg = stub.char_var(0);
    let l = lower(
        &mut stub,
        &[IoStmt::Close(CloseStmt {
            unit,
            specs: vec![CloseSpec::IoMsg(msg)],
        })],
    );
    let names = entry_suffixes(&l);
    let get = names.iter().position(|n| n == "GetIoMsg").unwrap();
    let end = names.iter().position(|n| n == "EndIoStatement").unwrap();
    assert!(get < end);
    assert!(names.contains(&"EnableHandlers".to_string()));
}

#[test]
fn logical_input_is_rewidened_after_the_call() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(2, 32);
    let item = stub.var(TypeCat::Logical { bits: 32 }, 0);
    let l = lower(
        &mut stub,
        &[IoStmt::Read(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert!(entry_suffixes(&l).contains(&"InputLogical".to_string()));
    assert!(count_opcode(&l, ir::Opcode::Uextend) >= 1);
}

#[test]
fn vector_subscript_input_calls_once_per_element() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(2, 32);
    let mut item = stub.var(TypeCat::Integer { bits: 32 }, 1);
    item.ty.rank = 0; // element type drives entry selection
    item.has_vector_subscript = true;
    let l = lower(
        &mut stub,
        &[IoStmt::Read(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    let inputs = entry_suffixes(&l)
        .iter()
        .filter(|n| *n == "InputInteger")
        .count();
    assert_eq!(inputs, 2);
}

#[test]
fn assigned_format_branches_over_known_labels() {
    let mut stub = Stub::default();
    stub.formats.insert(10, "10 FORMAT (I4)".to_string());
    stub.formats.insert(20, "20 FORMAT (F8.2)".to_string());
    stub.assigned.insert("fmt".to_string(), vec![10, 20]);
    let mut fmt_var = stub.int_var(32);
    fmt_var.symbol = Some(sym("fmt", false));
    let unit = stub.int_expr(1, 32);
    let item = stub.int_expr(9, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::Expr(fmt_var)),
            namelist: None,
            controls: vec![],
            items: vec![IoItem::Expr(item)],
        })],
    );
    let names = entry_suffixes(&l);
    assert!(names.contains(&"BeginExternalFormattedOutput".to_string()));
    assert!(io_calls(&l)
        .iter()
        .any(|n| n == "_FortranAReportFatalUserError"));
    assert!(count_opcode(&l, ir::Opcode::Trap) >= 1);
    assert!(block_count(&l) >= 5);
}

#[test]
fn err_specifier_returns_the_final_iostat() {
    let mut stub = Stub::default();
    let unit = stub.int_expr(1, 32);
    let item = stub.int_expr(9, 32);
    let l = lower(
        &mut stub,
        &[IoStmt::Write(TransferStmt {
            unit: Some(IoUnit::External(unit)),
            format: Some(FormatSpec::ListDirected),
            namelist: None,
            controls: vec![IoControlSpec::Err(99)],
            items: vec![IoItem::Expr(item)],
        })],
    );
    assert_eq!(l.iostats, [true]);
    assert!(entry_suffixes(&l).contains(&"EnableHandlers".to_string()));
}

#[test]
fn static_namelist_globals_are_shared_between_statements() {
    let mut stub = Stub::default();
    let group = Rc::new(NamelistGroup {
        name: "grp".to_string(),
        members: vec![sym("x", true), sym("y", true)],
    });
    let nml = |group: &Rc<NamelistGroup>| {
        IoStmt::Write(TransferStmt {
            unit: None,
            format: None,
            namelist: Some(group.clone()),
            controls: vec![],
            items: vec![],
        })
    };
    let l = lower_with(
        &mut stub,
        |module| {
            define_global(module, "g_x", 4);
            define_global(module, "g_y", 4);
        },
        &[nml(&group), nml(&group)],
    );
    let outputs = entry_suffixes(&l)
        .iter()
        .filter(|n| *n == "OutputNamelist")
        .count();
    assert_eq!(outputs, 2);
    // A second definition of the group object would have failed; the
    // memoized global is reused.
    assert!(l.module.get_name("nml_grp").is_some());
    assert!(l.module.get_name("nml_grp.list").is_some());
    assert!(l.module.get_name("default.nonTbpDefinedIoTable").is_some());
}

#[test]
fn local_namelist_groups_are_built_on_the_stack() {
    let mut stub = Stub::default();
    let group = Rc::new(NamelistGroup {
        name: "loc".to_string(),
        members: vec![sym("v", false)],
    });
    let l = lower(
        &mut stub,
        &[IoStmt::Read(TransferStmt {
            unit: None,
            format: None,
            namelist: Some(group),
            controls: vec![],
            items: vec![],
        })],
    );
    assert!(entry_suffixes(&l).contains(&"InputNamelist".to_string()));
    assert!(l.module.get_name("nml_loc").is_none());
    assert!(count_opcode(&l, ir::Opcode::StackAddr) >= 2);
}

#[test]
fn derived_type_output_passes_the_defined_io_table() {
    let mut stub = Stub::default();
    let point = sym("point", true);
    let item = stub.add(
        StubVal::Var,
        IoType::scalar(TypeCat::Derived(point.clone())),
    );
    let l = lower_with(
        &mut stub,
        |module| define_global(module, "ti_point", 64),
        &[list_write(vec![IoItem::Expr(item)])],
    );
    let call = find_call(&l, "OutputDerivedType").unwrap();
    assert_eq!(l.func.dfg.inst_args(call).len(), 3);
    assert!(l.module.get_name("default.nonTbpDefinedIoTable").is_some());
}

#[test]
fn static_defined_io_table_lists_each_binding() {
    let mut stub = Stub::default();
    let point = sym("point", true);
    stub.procs.push(DefinedIoProc {
        derived: point.clone(),
        proc: Some(sym("wf_point", true)),
        variant: DefinedIoVariant::WriteFormatted,
        is_dummy: false,
        is_pointer: false,
        is_polymorphic: false,
    });
    let item = stub.add(
        StubVal::Var,
        IoType::scalar(TypeCat::Derived(point.clone())),
    );
    let l = lower_with(
        &mut stub,
        |module| define_global(module, "ti_point", 64),
        &[list_write(vec![IoItem::Expr(item)])],
    );
    assert!(entry_suffixes(&l).contains(&"OutputDerivedType".to_string()));
    assert!(l.module.get_name("scope.nonTbpDefinedIoTable").is_some());
    assert!(l
        .module
        .get_name("scope.nonTbpDefinedIoTable.list")
        .is_some());
    assert!(l.module.get_name("p_wf_point").is_some());
}
