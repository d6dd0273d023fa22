//! The operation catalog: an immutable, process-wide table of every named
//! operation the compiler knows, with its arity, its extra FPU stack
//! requirement, its x87 byte template, and an optional peephole rewriter.
//!
//! Templates assume their arguments sit on top of the FPU stack with the
//! last-evaluated argument in `st(0)`, and leave the single result in
//! their place. That convention means the emitter can concatenate
//! templates without any glue code between nodes.

use crate::types::{CallNode, CodeSeq, Node, NumericKind, Optimizer, MAX_FUNCTION_ARGS};

/// One entry of the catalog.
pub(crate) struct Operation {
    pub name: &'static str,
    pub arity: usize,
    /// Maximum FPU slots the template occupies beyond its inputs.
    pub stack_req: u8,
    pub code: &'static [u8],
    pub optimizer: Option<Optimizer>,
}

impl Operation {
    /// Instantiates a call node for this operation. Argument links are
    /// filled in later, when the postfix stream is linked.
    pub fn to_call(&'static self) -> CallNode {
        CallNode {
            arity: self.arity,
            stack_req: self.stack_req,
            code: CodeSeq::Catalog(self.code),
            args: [usize::MAX; MAX_FUNCTION_ARGS],
            var_ref: false,
            optimizer: self.optimizer,
        }
    }
}

/// Case-sensitive catalog lookup.
pub(crate) fn lookup(name: &str) -> Option<&'static Operation> {
    CATALOG.iter().find(|op| op.name == name)
}

/// Maps an operator character to the catalog name it compiles to.
pub(crate) fn operator_name(op: char, unary: bool) -> Option<&'static str> {
    if unary {
        return match op {
            '-' => Some("neg"),
            _ => None,
        };
    }
    match op {
        '+' => Some("add"),
        '-' => Some("sub"),
        '*' => Some("mul"),
        '/' => Some("div"),
        '^' => Some("pow"),
        '<' => Some("less_than"),
        _ => None,
    }
}

pub(crate) static CATALOG: &[Operation] = &[
    // -- arithmetic --------------------------------------------------------
    Operation {
        name: "add",
        arity: 2,
        stack_req: 0,
        code: &[
            0xde, 0xc1, // faddp    st(1), st
        ],
        optimizer: Some(add_rewriter),
    },
    Operation {
        name: "sub",
        arity: 2,
        stack_req: 0,
        code: &[
            0xde, 0xe9, // fsubp    st(1), st
        ],
        optimizer: Some(sub_rewriter),
    },
    Operation {
        name: "mul",
        arity: 2,
        stack_req: 0,
        code: &[
            0xde, 0xc9, // fmulp    st(1), st
        ],
        optimizer: Some(mul_rewriter),
    },
    Operation {
        name: "div",
        arity: 2,
        stack_req: 0,
        code: &[
            0xde, 0xf9, // fdivp    st(1), st
        ],
        optimizer: Some(div_rewriter),
    },
    Operation {
        name: "neg",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xe0, // fchs
        ],
        optimizer: None,
    },
    Operation {
        name: "pow",
        arity: 2,
        stack_req: 1,
        code: &[
            0xd9, 0xc0, // fld      st(0)                    }
            0xd9, 0xfc, // frndint                           }
            0xd8, 0xd1, // fcom     st(1)                    } if the exponent is not an
            0xdf, 0xe0, // fnstsw   ax                       } integer, take the generic path
            0x9e, //       sahf                              }
            0x75, 0x3c, // jne      pop_before_generic_pow   }
            0xd9, 0xe1, // fabs                              }
            0x66, 0xc7, 0x44, 0x24, 0xfe, 0xff, 0xff, // mov word ptr [esp-2], 0ffffh
            0xdf, 0x5c, 0x24, 0xfe, // fistp word ptr [esp-2]
            0x66, 0x8b, 0x44, 0x24, 0xfe, // mov ax, word ptr [esp-2]
            0x66, 0x83, 0xe8, 0x01, // sub  ax, 1            } if |exponent| > 32,
            0x66, 0x83, 0xf8, 0x21, // cmp  ax, 1fh          } take the generic path
            0x77, 0x22, // ja       generic_pow              }
            0xd9, 0xc1, // fld      st(1)
            // loop_start:
            0x66, 0x85, 0xc0, // test ax, ax
            0x74, 0x08, // je       loop_end
            0xdc, 0xca, // fmul     st(2), st
            0x66, 0x83, 0xe8, 0x01, // sub ax, 1
            0xeb, 0xf3, // jmp      loop_start
            // loop_end:
            0xdd, 0xd8, // fstp     st(0)                    }
            0xd9, 0xe4, // ftst                              }
            0xdf, 0xe0, // fnstsw   ax                       } non-negative exponent
            0x9e, //       sahf                              } goes straight out
            0xdd, 0xd8, // fstp     st(0)                    }
            0x77, 0x28, // ja       exit_point               }
            0xd9, 0xe8, // fld1                              }
            0xde, 0xf1, // fdivrp   st(1), st                } reciprocal
            0xeb, 0x22, // jmp      exit_point               }
            // pop_before_generic_pow:
            0xdd, 0xd8, // fstp     st(0)
            // generic_pow:
            0xd9, 0xc9, // fxch                              }
            0xd9, 0xe4, // ftst                              }
            0x9b, //       wait                              } a zero base stays
            0xdf, 0xe0, // fnstsw   ax                       } in st(0) and exits
            0x9e, //       sahf                              }
            0x74, 0x14, // je       store_and_exit           }
            0xd9, 0xe1, // fabs
            0xd9, 0xf1, // fyl2x                             }
            0xd9, 0xe8, // fld1                              }
            0xd9, 0xc1, // fld      st(1)                    }
            0xd9, 0xf8, // fprem                             } b^n = 2^(n*log2(b))
            0xd9, 0xf0, // f2xm1                             }
            0xde, 0xc1, // faddp    st(1), st                }
            0xd9, 0xfd, // fscale                            }
            0x77, 0x02, // ja       store_and_exit
            0xd9, 0xe0, // fchs
            // store_and_exit:
            0xdd, 0xd9, // fstp     st(1)
            // exit_point:
        ],
        optimizer: Some(pow_rewriter),
    },
    // -- trigonometric -----------------------------------------------------
    Operation {
        name: "sin",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xfe, // fsin
        ],
        optimizer: None,
    },
    Operation {
        name: "cos",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xff, // fcos
        ],
        optimizer: None,
    },
    Operation {
        name: "tan",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xf2, // fptan
            0xdd, 0xd8, // fstp     st(0)
        ],
        optimizer: None,
    },
    // -- logarithms and exponentials ---------------------------------------
    Operation {
        name: "ln",
        arity: 1,
        stack_req: 1,
        code: LN_CODE,
        optimizer: None,
    },
    Operation {
        // alias of ln, kept for C math.h compatibility
        name: "log",
        arity: 1,
        stack_req: 1,
        code: LN_CODE,
        optimizer: None,
    },
    Operation {
        name: "log2",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xe8, // fld1
            0xd9, 0xc9, // fxch     st(1)
            0xd9, 0xf1, // fyl2x
        ],
        optimizer: None,
    },
    Operation {
        name: "log10",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xe8, // fld1
            0xd9, 0xc9, // fxch     st(1)
            0xd9, 0xf1, // fyl2x
            0xd9, 0xe9, // fldl2t
            0xde, 0xf9, // fdivp    st(1), st
        ],
        optimizer: None,
    },
    Operation {
        name: "exp",
        arity: 1,
        stack_req: 2,
        code: &[
            0xd9, 0xea, // fldl2e
            0xde, 0xc9, // fmulp    st(1), st
            0xd9, 0xe8, // fld1
            0xd9, 0xc1, // fld      st(1)
            0xd9, 0xf8, // fprem
            0xd9, 0xf0, // f2xm1
            0xde, 0xc1, // faddp    st(1), st
            0xd9, 0xfd, // fscale
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        name: "ylog2",
        arity: 2,
        stack_req: 0,
        code: &[
            0xd9, 0xf1, // fyl2x
        ],
        optimizer: None,
    },
    // -- rounding ----------------------------------------------------------
    Operation {
        name: "floor",
        arity: 1,
        stack_req: 0,
        code: &[
            0x66, 0xc7, 0x44, 0x24, 0xfc, 0x7f, 0x06, // mov word ptr [esp-4], 67fh
            0xd9, 0x7c, 0x24, 0xfe, // fnstcw   word ptr [esp-2]
            0xd9, 0x6c, 0x24, 0xfc, // fldcw    word ptr [esp-4]
            0xd9, 0xfc, // frndint
            0xd9, 0x6c, 0x24, 0xfe, // fldcw    word ptr [esp-2]
        ],
        optimizer: None,
    },
    Operation {
        name: "ceil",
        arity: 1,
        stack_req: 0,
        code: &[
            0x66, 0xc7, 0x44, 0x24, 0xfc, 0x7f, 0x0a, // mov word ptr [esp-4], 0a7fh
            0xd9, 0x7c, 0x24, 0xfe, // fnstcw   word ptr [esp-2]
            0xd9, 0x6c, 0x24, 0xfc, // fldcw    word ptr [esp-4]
            0xd9, 0xfc, // frndint
            0xd9, 0x6c, 0x24, 0xfe, // fldcw    word ptr [esp-2]
        ],
        optimizer: None,
    },
    Operation {
        name: "round",
        arity: 1,
        stack_req: 0,
        code: &[
            0x66, 0xc7, 0x44, 0x24, 0xfc, 0x7f, 0x02, // mov word ptr [esp-4], 27fh
            0xd9, 0x7c, 0x24, 0xfe, // fnstcw   word ptr [esp-2]
            0xd9, 0x6c, 0x24, 0xfc, // fldcw    word ptr [esp-4]
            0xd9, 0xfc, // frndint
            0xd9, 0x6c, 0x24, 0xfe, // fldcw    word ptr [esp-2]
        ],
        optimizer: None,
    },
    Operation {
        // rounds with whatever mode the FPU control word currently holds
        name: "int",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xfc, // frndint
        ],
        optimizer: None,
    },
    // -- comparison --------------------------------------------------------
    Operation {
        name: "less_than",
        arity: 2,
        stack_req: 0,
        code: &[
            0xdf, 0xf1, // fcomip   st, st(1)
            0xdd, 0xd8, // fstp     st(0)
            0xd9, 0xe8, // fld1
            0xd9, 0xee, // fldz
            0xdb, 0xd1, // fcmovnb  st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    // -- utilities ---------------------------------------------------------
    Operation {
        name: "abs",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xe1, // fabs
        ],
        optimizer: None,
    },
    Operation {
        name: "sqrt",
        arity: 1,
        stack_req: 0,
        code: &[
            0xd9, 0xfa, // fsqrt
        ],
        optimizer: None,
    },
    Operation {
        name: "min",
        arity: 2,
        stack_req: 0,
        code: &[
            0xdb, 0xf1, // fcomi    st, st(1)
            0xd9, 0xc9, // fxch     st(1)
            0xda, 0xc1, // fcmovb   st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        name: "max",
        arity: 2,
        stack_req: 0,
        code: &[
            0xdb, 0xf1, // fcomi    st, st(1)
            0xda, 0xc1, // fcmovb   st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        name: "mod",
        arity: 2,
        stack_req: 0,
        code: &[
            0xd9, 0xc9, // fxch     st(1)
            0xd9, 0xf8, // fprem
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        // 1 for positive arguments, -1 otherwise
        name: "sign",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xee, // fldz
            0xdf, 0xf1, // fcomip   st, st(1)
            0xdd, 0xd8, // fstp     st(0)
            0xd9, 0xe8, // fld1
            0xd9, 0xe8, // fld1
            0xd9, 0xe0, // fchs
            0xda, 0xc1, // fcmovb   st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        // 1 for positive arguments, 0 otherwise
        name: "signp",
        arity: 1,
        stack_req: 2,
        code: &[
            0xd9, 0xe8, // fld1
            0xd9, 0xee, // fldz
            0xdb, 0xf2, // fcomi    st, st(2)
            0xdd, 0xda, // fstp     st(2)
            0xdb, 0xc1, // fcmovnb  st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        // significand of the argument
        name: "sfc",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xf4, // fxtract
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        // unbiased exponent of the argument
        name: "expn",
        arity: 1,
        stack_req: 1,
        code: &[
            0xd9, 0xf4, // fxtract
            0xdd, 0xd8, // fstp     st(0)
        ],
        optimizer: None,
    },
    Operation {
        // wraps the first argument into [0, second)
        name: "bnd",
        arity: 2,
        stack_req: 2,
        code: &[
            0xd9, 0xc9, // fxch     st(1)
            0xd9, 0xf8, // fprem
            0xd9, 0xc0, // fld      st(0)
            0xdc, 0xc2, // fadd     st(2), st
            0xd9, 0xee, // fldz
            0xdf, 0xf1, // fcomip   st, st(1)
            0xdd, 0xd8, // fstp     st(0)
            0xdb, 0xc1, // fcmovnb  st, st(1)
            0xdd, 0xd9, // fstp     st(1)
        ],
        optimizer: None,
    },
    Operation {
        //                            x
        //                 ------------------------  if x < 0.5
        //                 (1 / a - 2) (1 - 2x) + 1
        // gain(x, a) =                                          for x, a in [0, 1]
        //                 (1 / a - 2) (1 - 2x) - x
        //                 ------------------------  if x >= 0.5
        //                 (1 / a - 2) (1 - 2x) - 1
        name: "gain",
        arity: 2,
        stack_req: 2,
        code: &[
            //                                        FPU stack
            0xd9, 0xc1, // fld      st(1)           ; x, a, x
            0xd8, 0xc2, // fadd     st, st(2)       ; 2x, a, x
            0xd9, 0xe8, // fld1                     ; 1, 2x, a, x
            0xdf, 0xf1, // fcomip   st, st(1)       ; 2x, a, x
            0xdd, 0xd8, // fstp     st(0)           ; a, x
            0xd9, 0xc0, // fld      st(0)           ; a, a, x
            0xd8, 0xc1, // fadd     st, st(1)       ; 2a, a, x
            0xd9, 0xe8, // fld1                     ; 1, 2a, a, x
            0xde, 0xe9, // fsubp    st(1), st       ; 2a-1, a, x
            0xde, 0xf1, // fdivrp   st(1), st       ; (2a-1)/a, x
            0xd9, 0xc1, // fld      st(1)           ; x, (2a-1)/a, x
            0xdc, 0xc0, // fadd     st(0), st       ; 2x, (2a-1)/a, x
            0xd9, 0xe8, // fld1                     ; 1, 2x, (2a-1)/a, x
            0xde, 0xe9, // fsubp    st(1), st       ; 2x-1, (2a-1)/a, x
            0xde, 0xc9, // fmulp    st(1), st       ; (2x-1)*(2a-1)/a, x
            0xd9, 0xe8, // fld1                     ; 1, (2x-1)*(2a-1)/a, x
            0x72, 0x06, // jb       x_ge_half
            0xde, 0xc1, // faddp    st(1), st       ; (2x-1)*(2a-1)/a+1, x
            0xde, 0xf9, // fdivp    st(1), st       ; result
            0xeb, 0x0a, // jmp      gain_exit
            // x_ge_half:
            0xd9, 0xc1, // fld      st(1)
            0xde, 0xe9, // fsubp    st(1), st
            0xd9, 0xc9, // fxch     st(1)
            0xde, 0xea, // fsubp    st(2), st
            0xde, 0xf9, // fdivp    st(1), st       ; result
            // gain_exit:
        ],
        optimizer: None,
    },
    Operation {
        //                         x
        // bias(x, a) = -----------------------    for x, a in [0, 1]
        //              (1 / a - 2) (1 - x) + 1
        name: "bias",
        arity: 2,
        stack_req: 1,
        code: &[
            0xd9, 0xe8, // fld1
            0xdc, 0xf1, // fdivr    st(1), st
            0xdc, 0xe9, // fsub     st(1), st
            0xdc, 0xe9, // fsub     st(1), st
            0xd8, 0xe2, // fsub     st, st(2)
            0xde, 0xc9, // fmulp    st(1), st
            0xd9, 0xe8, // fld1
            0xde, 0xc1, // faddp    st(1), st
            0xde, 0xf9, // fdivp    st(1), st
        ],
        optimizer: None,
    },
];

static LN_CODE: &[u8] = &[
    0xd9, 0xe8, // fld1
    0xd9, 0xc9, // fxch     st(1)
    0xd9, 0xf1, // fyl2x
    0xd9, 0xea, // fldl2e
    0xde, 0xf9, // fdivp    st(1), st
];

// ---------------------------------------------------------------------------
// Peephole rewriters
// ---------------------------------------------------------------------------

fn add_rewriter(call: &CallNode, nodes: &mut Vec<Node>) -> Option<CallNode> {
    fold_memory_operand(call, nodes, 0x00, 0x00)
}

fn sub_rewriter(call: &CallNode, nodes: &mut Vec<Node>) -> Option<CallNode> {
    fold_memory_operand(call, nodes, 0x20, 0x28)
}

fn mul_rewriter(call: &CallNode, nodes: &mut Vec<Node>) -> Option<CallNode> {
    fold_memory_operand(call, nodes, 0x08, 0x08)
}

fn div_rewriter(call: &CallNode, nodes: &mut Vec<Node>) -> Option<CallNode> {
    fold_memory_operand(call, nodes, 0x30, 0x38)
}

/// When one operand of a two-argument arithmetic op is a leaf, the value
/// can be applied straight from memory, dropping one FPU stack slot. For
/// the non-commutative `sub` and `div` the reversed opcode variant is used
/// when the leaf is the left operand.
///
/// `op_rhs` is the modrm byte applying the memory operand as the right
/// operand, `op_lhs` the reversed form; both address through the scratch
/// register, so only the reg field differs per instruction.
fn fold_memory_operand(
    call: &CallNode,
    nodes: &mut Vec<Node>,
    op_rhs: u8,
    op_lhs: u8,
) -> Option<CallNode> {
    for i in 0..2 {
        let leaf = match nodes[call.args[i]].as_leaf() {
            Some(leaf) => *leaf,
            None => continue,
        };
        // x87 has no 64-bit integer arithmetic memory form; such operands
        // keep the plain load path.
        if leaf.kind == NumericKind::I64 {
            continue;
        }

        let opcode = if i == 0 { op_rhs } else { op_lhs };
        let mut code = Vec::with_capacity(12);
        emit_scratch_address(&mut code, leaf.address);
        match leaf.kind {
            NumericKind::I16 => code.extend_from_slice(&[0xde, opcode]), // (op) word ptr
            NumericKind::I32 => code.extend_from_slice(&[0xda, opcode]), // (op) dword ptr
            NumericKind::F32 => code.extend_from_slice(&[0xd8, opcode]), // (op) dword ptr
            NumericKind::F64 => code.extend_from_slice(&[0xdc, opcode]), // (op) qword ptr
            NumericKind::I64 => unreachable!(),
        }

        let folded = CallNode {
            arity: 1,
            stack_req: 0,
            code: CodeSeq::Synthesized(code),
            args: [call.args[1 - i], usize::MAX],
            var_ref: leaf.constant.is_none(),
            optimizer: None,
        };
        nodes[call.args[i]] = Node::Spliced;
        return Some(folded);
    }
    None
}

/// Specializes `base^n` for small integer `n` into a chain of multiplies,
/// with a final reciprocal for negative exponents. Exponents outside the
/// special-cased set keep the generic template.
fn pow_rewriter(call: &CallNode, nodes: &mut Vec<Node>) -> Option<CallNode> {
    let exponent = nodes[call.args[0]].as_leaf()?.constant?;
    if exponent.round() != exponent || exponent.abs() > 32.0 {
        return None;
    }

    let mut code: Vec<u8> = match exponent.abs() {
        v if v == 0.0 => vec![
            0xdd, 0xd8, // fstp     st(0)
            0xd9, 0xe8, // fld1
        ],
        v if v == 1.0 => vec![],
        v if v == 2.0 => vec![
            0xdc, 0xc8, // fmul     st(0), st
        ],
        v if v == 3.0 => vec![
            0xd9, 0xc0, // fld      st(0)
            0xdc, 0xc8, // fmul     st(0), st
            0xde, 0xc9, // fmulp    st(1), st
        ],
        v if v == 4.0 => vec![0xdc, 0xc8, 0xdc, 0xc8],
        v if v == 5.0 => vec![
            0xd9, 0xc0, // fld      st(0)
            0xdc, 0xc8, 0xdc, 0xc8, // fmul st(0), st (twice)
            0xde, 0xc9, // fmulp    st(1), st
        ],
        v if v == 6.0 => vec![
            0xd9, 0xc0, // fld      st(0)
            0xdc, 0xc8, 0xdc, 0xc8, // fmul st(0), st (twice)
            0xd8, 0xc9, // fmul     st(0), st(1)
            0xde, 0xc9, // fmulp    st(1), st
        ],
        v if v == 7.0 => vec![
            0xd9, 0xc0, // fld      st(0)
            0xdc, 0xc8, 0xdc, 0xc8, // fmul st(0), st (twice)
            0xd8, 0xc9, // fmul     st(0), st(1)
            0xd8, 0xc9, // fmul     st(0), st(1)
            0xde, 0xc9, // fmulp    st(1), st
        ],
        v if v == 8.0 => vec![0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8],
        v if v == 16.0 => vec![0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8],
        v if v == 32.0 => vec![0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8, 0xdc, 0xc8],
        _ => return None,
    };

    if exponent < 0.0 {
        code.extend_from_slice(&[
            0xd9, 0xe8, // fld1
            0xde, 0xf1, // fdivrp   st(1), st
        ]);
    }

    // fld st(0) and fld1 each occupy one slot above the base.
    let pushes = matches!(exponent.abs(), v if v == 3.0 || v == 5.0 || v == 6.0 || v == 7.0)
        || exponent < 0.0;

    let folded = CallNode {
        arity: 1,
        stack_req: u8::from(pushes),
        code: CodeSeq::Synthesized(code),
        args: [call.args[1], usize::MAX],
        var_ref: false,
        optimizer: None,
    };
    nodes[call.args[0]] = Node::Spliced;
    Some(folded)
}

#[cfg(target_arch = "x86_64")]
fn emit_scratch_address(code: &mut Vec<u8>, address: *const u8) {
    code.extend_from_slice(&[0x48, 0xb8]); // mov rax, imm64
    code.extend_from_slice(&(address as u64).to_le_bytes());
}

#[cfg(target_arch = "x86")]
fn emit_scratch_address(code: &mut Vec<u8>, address: *const u8) {
    code.push(0xb8); // mov eax, imm32
    code.extend_from_slice(&(address as u32).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Leaf;

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(lookup("sin").is_some());
        assert!(lookup("Sin").is_none());
        assert!(lookup("frobnicate").is_none());
    }

    #[test]
    fn catalog_names_are_unique() {
        for (i, op) in CATALOG.iter().enumerate() {
            for other in &CATALOG[i + 1..] {
                assert_ne!(op.name, other.name);
            }
        }
    }

    #[test]
    fn arities_are_one_or_two() {
        for op in CATALOG {
            assert!(op.arity == 1 || op.arity == 2, "{}", op.name);
            assert!(op.stack_req <= 2, "{}", op.name);
        }
    }

    #[test]
    fn log_is_an_alias_of_ln() {
        let ln = lookup("ln").unwrap();
        let log = lookup("log").unwrap();
        assert_eq!(ln.code, log.code);
        assert_eq!(ln.arity, log.arity);
    }

    #[test]
    fn operator_names_cover_the_grammar() {
        for (op, name) in [
            ('+', "add"),
            ('-', "sub"),
            ('*', "mul"),
            ('/', "div"),
            ('^', "pow"),
            ('<', "less_than"),
        ] {
            assert_eq!(operator_name(op, false), Some(name));
            assert!(lookup(name).is_some());
        }
        assert_eq!(operator_name('-', true), Some("neg"));
        assert_eq!(operator_name('+', true), None);
    }

    fn leaf_nodes(values: &[f64]) -> (Vec<Box<f64>>, Vec<Node>) {
        let storage: Vec<Box<f64>> = values.iter().copied().map(Box::new).collect();
        let nodes = storage
            .iter()
            .map(|v| Node::Leaf(Leaf::constant_at(&**v as *const f64 as *const u8, **v)))
            .collect();
        (storage, nodes)
    }

    #[test]
    fn memory_fold_consumes_the_leaf() {
        let (_storage, mut nodes) = leaf_nodes(&[2.0, 3.0]);
        let mut call = lookup("add").unwrap().to_call();
        call.args = [1, 0];

        let folded = add_rewriter(&call, &mut nodes).unwrap();
        assert_eq!(folded.arity, 1);
        assert_eq!(folded.args[0], 0);
        assert!(!folded.var_ref);
        assert!(matches!(nodes[1], Node::Spliced));
    }

    #[test]
    fn memory_fold_marks_variable_references() {
        let value = 1.5f64;
        let mut nodes = vec![
            Node::Leaf(Leaf {
                kind: NumericKind::F64,
                address: &value as *const f64 as *const u8,
                constant: None,
            }),
            Node::Leaf(Leaf {
                kind: NumericKind::F64,
                address: &value as *const f64 as *const u8,
                constant: None,
            }),
        ];
        let mut call = lookup("mul").unwrap().to_call();
        call.args = [1, 0];

        let folded = mul_rewriter(&call, &mut nodes).unwrap();
        assert!(folded.var_ref);
    }

    #[test]
    fn i64_operands_are_not_folded() {
        let a = 4i64;
        let b = 5i64;
        let mut nodes = vec![
            Node::Leaf(Leaf {
                kind: NumericKind::I64,
                address: &a as *const i64 as *const u8,
                constant: None,
            }),
            Node::Leaf(Leaf {
                kind: NumericKind::I64,
                address: &b as *const i64 as *const u8,
                constant: None,
            }),
        ];
        let mut call = lookup("add").unwrap().to_call();
        call.args = [1, 0];

        assert!(add_rewriter(&call, &mut nodes).is_none());
        assert!(matches!(nodes[0], Node::Leaf(_)));
        assert!(matches!(nodes[1], Node::Leaf(_)));
    }

    #[test]
    fn pow_specializes_small_integer_exponents() {
        for (exponent, expect) in [
            (2.0, true),
            (7.0, true),
            (16.0, true),
            (-2.0, true),
            (9.0, false),
            (33.0, false),
            (2.5, false),
        ] {
            let (_storage, mut nodes) = leaf_nodes(&[1.5, exponent]);
            let mut call = lookup("pow").unwrap().to_call();
            call.args = [1, 0];
            let folded = pow_rewriter(&call, &mut nodes);
            assert_eq!(folded.is_some(), expect, "exponent {}", exponent);
            if let Some(folded) = folded {
                assert_eq!(folded.arity, 1);
                assert_eq!(folded.args[0], 0);
            }
        }
    }

    #[test]
    fn negative_exponent_appends_the_reciprocal() {
        let (_storage, mut nodes) = leaf_nodes(&[1.5, -2.0]);
        let mut call = lookup("pow").unwrap().to_call();
        call.args = [1, 0];
        let folded = pow_rewriter(&call, &mut nodes).unwrap();
        let bytes = folded.code.bytes();
        assert_eq!(&bytes[bytes.len() - 4..], &[0xd9, 0xe8, 0xde, 0xf1]);
    }

    #[test]
    fn pow_with_variable_exponent_keeps_the_generic_template() {
        let value = 2.0f64;
        let mut nodes = vec![
            Node::Leaf(Leaf::constant_at(&value as *const f64 as *const u8, value)),
            Node::Leaf(Leaf {
                kind: NumericKind::F64,
                address: &value as *const f64 as *const u8,
                constant: None,
            }),
        ];
        let mut call = lookup("pow").unwrap().to_call();
        call.args = [1, 0];
        assert!(pow_rewriter(&call, &mut nodes).is_none());
    }
}
