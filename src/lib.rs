//! # exp-jit
//!
//! A small runtime compiler for scalar floating-point formulas. You bind
//! named program variables, hand over an infix expression, and get back a
//! callable program: a block of x87/x86 machine code in a page that is
//! written, sealed read-execute, and then invoked directly. The generated
//! code reads the current values of the bound variables on every call, so
//! re-evaluating after changing an input costs one indirect call and
//! nothing else.
//!
//! The x87 FPU serves as the expression evaluation stack: leaves push
//! values with `fld`/`fild`, operations are short fixed instruction
//! templates that consume their inputs from the top of the stack and leave
//! their result in place. Everything runs at the FPU's 80-bit internal
//! precision with results rounded to `f64` on the way out.
//!
//! ## Quick start
//!
//! ```
//! use exp_jit::Evaluator;
//! use std::ptr::addr_of;
//!
//! let mut x = 0.0f64;
//! let mut z = 200i32;
//!
//! let mut eval = Evaluator::new()?;
//! unsafe {
//!     eval.bind(addr_of!(x), "x")?;
//!     eval.bind(addr_of!(z), "z")?;
//! }
//!
//! eval.set_expression("0.3 + sin(2.33 + x) / (98 - z)")?;
//!
//! let mut results = Vec::new();
//! for step in 0..4 {
//!     x = 0.1 * step as f64;
//!     z = 200 + step;
//!     results.push(eval.evaluate());
//! }
//! # Ok::<(), exp_jit::ExprError>(())
//! ```
//!
//! ## Expression language
//!
//! Infix arithmetic with `+ - * / ^ <`, parentheses, unary signs, numeric
//! literals (`3`, `3.25`, `.5`), the predefined constants `pi` and `e`,
//! and a catalog of functions: `sin`, `cos`, `tan`, `ln`, `log`, `log2`,
//! `log10`, `exp`, `ylog2`, `pow`, `sqrt`, `abs`, `floor`, `ceil`,
//! `round`, `int`, `min`, `max`, `mod`, `sign`, `signp`, `sfc`, `expn`,
//! `bnd`, `gain`, `bias`. `^` is right-associative; everything else is
//! left-associative. Parse errors carry the byte offset of the offending
//! character:
//!
//! ```
//! use exp_jit::{Evaluator, ExprError};
//!
//! let mut eval = Evaluator::new()?;
//! match eval.set_expression("1 + $") {
//!     Err(ExprError::UnexpectedCharacter { position, found }) => {
//!         assert_eq!((position, found), (4, '$'));
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! // The previous program is still installed and callable.
//! assert_eq!(eval.evaluate(), 0.0);
//! # Ok::<(), exp_jit::ExprError>(())
//! ```
//!
//! ## Compilation pipeline
//!
//! Text goes through a validating tokenizer and a shunting-yard postfix
//! pass, names are resolved against the bindings, the constants and the
//! operation catalog, per-operation peephole rewriters fold memory
//! operands into arithmetic instructions and specialize small integer
//! powers, constant subtrees are precomputed through a throwaway compiled
//! page, and the surviving nodes are emitted into a fresh page that is
//! sealed before the function pointer is published. A failed compilation
//! at any stage leaves the previously installed program untouched.
//!
//! ## Scope and limits
//!
//! This is not a general-purpose compiler: no assignments, no
//! multi-statement programs, no user-defined functions, no control flow.
//! An evaluator is single-threaded and neither `Send` nor `Sync`; use one
//! evaluator per thread. The backend is x86/x86-64 only, on hosts with
//! the Unix `mmap` family.

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("exp-jit emits x87/x86 machine code and only supports x86 and x86_64 targets");

#[cfg(not(unix))]
compile_error!("exp-jit manages executable pages through the Unix mmap family");

pub mod error;
pub mod evaluator;
pub mod memory;
pub mod types;

mod catalog;
mod emitter;
mod engine;
mod lexer;
mod parser;

pub use error::{ExprError, Result};
pub use evaluator::Evaluator;
pub use types::{Bindable, NumericKind};
