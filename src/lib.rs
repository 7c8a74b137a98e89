//! f90lower translates resolved Fortran I/O statements into calls on the
//! Fortran I/O runtime library, emitting Cranelift IR through a
//! [`cranelift_object::ObjectModule`].
//!
//! The front end hands each statement over as a [`ast::IoStmt`] together
//! with a [`bridge::Converter`] that evaluates the statement's
//! expressions. Lowering produces the runtime call bracket for the
//! statement and returns the final iostat value when the statement names
//! condition specifiers.
//!
//! ```no_run
//! # use f90lower::{GlobalCache, IoLowerer};
//! # fn demo<C: f90lower::bridge::Converter>(
//! #     module: &mut cranelift_object::ObjectModule,
//! #     conv: &mut C,
//! #     b: &mut cranelift_frontend::FunctionBuilder,
//! #     stmt: &f90lower::ast::IoStmt,
//! # ) -> f90lower::errors::Result<()> {
//! let mut cache = GlobalCache::new();
//! let mut lowerer = IoLowerer::new(module, conv, &mut cache);
//! let iostat = lowerer.lower_stmt(b, stmt)?;
//! # let _ = iostat;
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod bridge;
pub mod errors;
pub mod lower;
pub mod runtime;

pub use errors::LowerError;
pub use lower::{ChainState, ConditionSpecInfo, GlobalCache, GuardStack, IoLowerer};
pub use runtime::IoKey;
