//! The evaluator facade: bindings, named constants, and the lifecycle of
//! the compiled program.

use std::cell::UnsafeCell;
use std::collections::BTreeMap;

use crate::catalog;
use crate::engine::{self, Program};
use crate::error::{ExprError, Result};
use crate::types::{Bindable, Binding, NamedConstant};

/// A runtime compiler for scalar floating-point expressions.
///
/// An evaluator owns two predefined constants (`pi` and `e`), any number
/// of caller-registered variable bindings, and exactly one compiled
/// program. Construction installs the constant program `0`, so
/// [`evaluate`](Evaluator::evaluate) is callable from the first moment.
///
/// Compiled code reads the bound addresses on every call, so mutating a
/// bound variable between calls changes the next result without any
/// recompilation.
///
/// ```
/// use exp_jit::Evaluator;
///
/// let mut x = 0.0f64;
/// let mut eval = Evaluator::new()?;
/// unsafe { eval.bind(std::ptr::addr_of!(x), "x")? };
/// eval.set_expression("x * x + 1")?;
///
/// x = 3.0;
/// assert_eq!(eval.evaluate(), 10.0);
/// x = 4.0;
/// assert_eq!(eval.evaluate(), 17.0);
/// # Ok::<(), exp_jit::ExprError>(())
/// ```
///
/// An evaluator is strictly single-threaded: it is neither `Send` nor
/// `Sync`, and the conservative rule is one evaluator per thread.
pub struct Evaluator {
    variables: BTreeMap<String, Binding>,
    constants: BTreeMap<String, NamedConstant>,
    /// Return slot the x86-64 epilogue stores through. Boxed for a stable
    /// address, `UnsafeCell` because generated code writes it during
    /// `evaluate(&self)`.
    scratch: Box<UnsafeCell<f64>>,
    program: Program,
    expression: String,
}

impl Evaluator {
    /// Creates an evaluator with `pi` and `e` defined and the expression
    /// `0` installed.
    ///
    /// Fails only if the host refuses the initial code page.
    pub fn new() -> Result<Evaluator> {
        let variables = BTreeMap::new();
        let mut constants = BTreeMap::new();
        constants.insert("pi".to_string(), NamedConstant::new(core::f64::consts::PI));
        constants.insert("e".to_string(), NamedConstant::new(core::f64::consts::E));

        let scratch = Box::new(UnsafeCell::new(0.0f64));
        let program = engine::compile("0", &variables, &constants, scratch.get())?;

        Ok(Evaluator {
            variables,
            constants,
            scratch,
            program,
            expression: "0".to_string(),
        })
    }

    /// Registers `address` under `name` for use in expressions.
    ///
    /// The kind tag is taken from `T`, selecting the load instruction the
    /// compiler emits for this variable. Fails with [`ExprError::NameInUse`]
    /// when the name collides with an existing binding, a named constant,
    /// or a catalog operation; a failed bind changes nothing.
    ///
    /// # Safety
    ///
    /// `address` must point to a live, properly aligned `T` and stay valid
    /// until the binding is removed with [`unbind`](Evaluator::unbind) or
    /// the evaluator is dropped. The storage may be freely mutated between
    /// [`evaluate`](Evaluator::evaluate) calls, but not during one.
    pub unsafe fn bind<T: Bindable>(&mut self, address: *const T, name: &str) -> Result<()> {
        if self.variables.contains_key(name)
            || self.constants.contains_key(name)
            || catalog::lookup(name).is_some()
        {
            return Err(ExprError::NameInUse {
                name: name.to_string(),
            });
        }
        self.variables.insert(
            name.to_string(),
            Binding {
                address: address as *const u8,
                kind: T::KIND,
                referenced: false,
            },
        );
        Ok(())
    }

    /// Removes the binding `name`.
    ///
    /// If the currently compiled expression references the binding, the
    /// expression is first invalidated by recompiling the constant `0`;
    /// afterwards [`evaluate`](Evaluator::evaluate) returns `0.0`. Fails
    /// with [`ExprError::NotFound`] when no such binding exists.
    pub fn unbind(&mut self, name: &str) -> Result<()> {
        let referenced = match self.variables.get(name) {
            Some(binding) => binding.referenced,
            None => {
                return Err(ExprError::NotFound {
                    name: name.to_string(),
                })
            }
        };
        if referenced {
            self.set_expression("0")?;
        }
        self.variables.remove(name);
        Ok(())
    }

    /// Compiles `text` and installs the result.
    ///
    /// On any error the previously installed program stays untouched and
    /// callable; replacement happens only after the new page is sealed. An
    /// empty `text` compiles the default expression `0`.
    pub fn set_expression(&mut self, text: &str) -> Result<()> {
        let text = if text.is_empty() { "0" } else { text };
        let program = engine::compile(text, &self.variables, &self.constants, self.scratch.get())?;

        for (name, binding) in &mut self.variables {
            binding.referenced = program.referenced.contains(name);
        }
        // The previous page is released here, after its replacement is
        // already sealed and installed.
        self.program = program;
        self.expression = text.to_string();
        Ok(())
    }

    /// Runs the compiled program and returns its result.
    ///
    /// Reads the current values of all referenced bindings; never fails
    /// under the `bind` preconditions.
    pub fn evaluate(&self) -> f64 {
        unsafe { (self.program.entry())() }
    }

    /// The source text of the currently installed expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Size in bytes of the current program's code page.
    pub fn code_size(&self) -> usize {
        self.program.code_size()
    }
}
