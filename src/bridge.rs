//! Bridge between I/O lowering and the rest of the compiler.
//!
//! Lowering never evaluates Fortran expressions itself; it hands each
//! [`TypedExpr`] back through this trait and receives Cranelift values.
//! The trait also surfaces the few front-end facts lowering needs that are
//! not expression values: FORMAT statement text, ASSIGN targets, mangled
//! global names, and the defined-I/O generics visible at the statement.

use cranelift_codegen::ir;
use cranelift_frontend::FunctionBuilder;
use cranelift_module::FuncId;
use cranelift_object::ObjectModule;

use crate::ast::{DefinedIoProc, NamelistGroup, Symbol, TypedExpr};
use crate::errors::Result;

/// Source position of the statement being lowered, passed to every
/// runtime `Begin` call.
#[derive(Debug, Clone)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

/// Callback lowering one element of a vector-subscripted designator.
/// Receives the element address (or its descriptor when boxed) and
/// returns the runtime call's success value.
pub type ElementCall<'c> =
    &'c mut dyn FnMut(&mut FunctionBuilder, ir::Value) -> Result<ir::Value>;

pub trait Converter {
    /// Position of the current statement.
    fn location(&self) -> SourceLoc;

    /// Evaluate a scalar expression to a value.
    fn expr_value(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> Result<ir::Value>;

    /// Evaluate a designator to the address of its storage.
    fn expr_address(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> Result<ir::Value>;

    /// Evaluate an expression to the address of a descriptor for it.
    fn expr_box(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> Result<ir::Value>;

    /// Address and length of a character expression.
    fn char_addr_len(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
    ) -> Result<(ir::Value, ir::Value)>;

    /// Element length of a character array expression.
    fn char_len(&mut self, b: &mut FunctionBuilder, e: &TypedExpr) -> Result<ir::Value>;

    /// Real and imaginary parts of a complex scalar.
    fn complex_parts(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
    ) -> Result<(ir::Value, ir::Value)>;

    /// Run `each` once per element of a vector-subscripted designator,
    /// in element order. `must_box` requests per-element descriptors.
    fn loop_over_elements(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
        must_box: bool,
        each: ElementCall,
    ) -> Result<()>;

    /// Like [`Converter::loop_over_elements`], but stops early once an
    /// element call reports failure. `ok` is the chain value on entry;
    /// the result is the chain value after the last element attempted.
    fn loop_over_elements_while(
        &mut self,
        b: &mut FunctionBuilder,
        e: &TypedExpr,
        must_box: bool,
        ok: ir::Value,
        each: ElementCall,
    ) -> Result<ir::Value>;

    /// Source text of the FORMAT statement at `label`, if there is one.
    fn format_text(&self, label: u32) -> Option<String>;

    /// Labels ever assigned to `sym` by an ASSIGN statement.
    fn assigned_labels(&self, sym: &Symbol) -> Vec<u32>;

    /// Mangled link name of a symbol's global storage.
    fn mangled_name(&self, sym: &Symbol) -> String;

    /// Mangled link name for a namelist group's descriptor object.
    fn mangled_group_name(&self, group: &NamelistGroup) -> String;

    /// Mangled link name for the defined-I/O table of the current scope.
    fn defined_io_table_name(&self) -> String;

    /// Link name of a derived type's description object.
    fn type_info_name(&self, ty: &Symbol) -> String;

    /// Non-type-bound defined-I/O generics visible at the statement.
    fn defined_io_procs(&self) -> Vec<DefinedIoProc>;

    /// Address of a local symbol's storage.
    fn symbol_address(&mut self, b: &mut FunctionBuilder, sym: &Symbol) -> Result<ir::Value>;

    /// Function id of a statically known subroutine, declared in `module`.
    fn proc_func_id(&mut self, module: &mut ObjectModule, proc: &Symbol) -> Result<FuncId>;

    /// Value of a dummy procedure argument.
    fn dummy_proc_value(
        &mut self,
        b: &mut FunctionBuilder,
        proc: &Symbol,
    ) -> Result<ir::Value>;
}
