//! Machine-code emission.
//!
//! The emitter walks the final node list in evaluation order and
//! concatenates per-node byte sequences: a load instruction for each leaf,
//! the template bytes for each call. Templates keep their results where
//! the next template expects its inputs, so nothing else is needed between
//! nodes.
//!
//! The 32-bit and 64-bit backends differ only at the edges. On 32-bit x86
//! a load encodes its absolute address directly and the epilogue is a bare
//! `ret`, since the calling convention already returns doubles in `st(0)`.
//! On x86-64 addresses are staged through `rax` (saved in the prologue),
//! and the epilogue spills `st(0)` to a compiler-owned scratch slot and
//! reloads it into `xmm0`.

use crate::error::{ExprError, Result};
use crate::memory::{ExecutableRegion, WritableRegion};
use crate::types::{Node, NumericKind, FPU_STACK_SLOTS};

/// Signature of a compiled program. The double comes back in `xmm0` on
/// x86-64 and in `st(0)` on 32-bit x86, which is exactly what `extern "C"`
/// expects on each.
pub(crate) type EvalFn = unsafe extern "C" fn() -> f64;

/// A sealed page of generated code plus its entry point. Dropping the
/// block unmaps the page, so the function pointer must not outlive it.
#[derive(Debug)]
pub(crate) struct CompiledBlock {
    entry: EvalFn,
    region: ExecutableRegion,
}

impl CompiledBlock {
    pub fn entry(&self) -> EvalFn {
        self.entry
    }

    pub fn code_size(&self) -> usize {
        self.region.len()
    }
}

/// Compiles the nodes selected by `order` into an executable block.
///
/// `order` must list node indices in evaluation order; spliced nodes must
/// already be filtered out. `scratch` is the 64-bit return slot patched
/// into the x86-64 epilogue (ignored by the 32-bit backend).
pub(crate) fn emit(nodes: &[Node], order: &[usize], scratch: *mut f64) -> Result<CompiledBlock> {
    let mut code: Vec<u8> = Vec::with_capacity(64);
    emit_prologue(&mut code);

    // Static check against the eight x87 registers: each leaf occupies a
    // slot, each call pops arity-1 slots net and may transiently use
    // stack_req more.
    let mut depth: i32 = 0;

    for &index in order {
        match nodes.get(index) {
            Some(Node::Leaf(leaf)) => {
                depth += 1;
                if depth > FPU_STACK_SLOTS {
                    return Err(ExprError::Internal("FPU stack depth exceeded"));
                }
                emit_load(&mut code, leaf.address, leaf.kind);
            }
            Some(Node::Call(call)) => {
                if depth + i32::from(call.stack_req) > FPU_STACK_SLOTS {
                    return Err(ExprError::Internal("FPU stack depth exceeded"));
                }
                depth -= call.arity as i32 - 1;
                if depth < 1 {
                    return Err(ExprError::Internal("operand stack underflow"));
                }
                code.extend_from_slice(call.code.bytes());
            }
            _ => return Err(ExprError::Internal("spliced node in emission order")),
        }
    }

    if depth != 1 {
        return Err(ExprError::Internal("program leaves no single result"));
    }

    emit_epilogue(&mut code, scratch);
    seal(code)
}

fn seal(code: Vec<u8>) -> Result<CompiledBlock> {
    let mut page = WritableRegion::allocate(code.len())?;
    page[..code.len()].copy_from_slice(&code);
    let region = page.into_executable()?;
    let entry: EvalFn = unsafe { core::mem::transmute::<*const u8, EvalFn>(region.addr()) };
    Ok(CompiledBlock { entry, region })
}

#[cfg(target_arch = "x86_64")]
fn emit_prologue(code: &mut Vec<u8>) {
    // rax stages every absolute address the program touches.
    code.push(0x50); // push rax
}

#[cfg(target_arch = "x86")]
fn emit_prologue(_code: &mut Vec<u8>) {}

#[cfg(target_arch = "x86_64")]
fn emit_load(code: &mut Vec<u8>, address: *const u8, kind: NumericKind) {
    code.extend_from_slice(&[0x48, 0xb8]); // mov rax, imm64
    code.extend_from_slice(&(address as u64).to_le_bytes());
    let load: [u8; 2] = match kind {
        NumericKind::F32 => [0xd9, 0x00], // fld  dword ptr [rax]
        NumericKind::F64 => [0xdd, 0x00], // fld  qword ptr [rax]
        NumericKind::I16 => [0xdf, 0x00], // fild word ptr [rax]
        NumericKind::I32 => [0xdb, 0x00], // fild dword ptr [rax]
        NumericKind::I64 => [0xdf, 0x28], // fild qword ptr [rax]
    };
    code.extend_from_slice(&load);
}

#[cfg(target_arch = "x86")]
fn emit_load(code: &mut Vec<u8>, address: *const u8, kind: NumericKind) {
    let load: [u8; 2] = match kind {
        NumericKind::F32 => [0xd9, 0x05], // fld  dword ptr [addr]
        NumericKind::F64 => [0xdd, 0x05], // fld  qword ptr [addr]
        NumericKind::I16 => [0xdf, 0x05], // fild word ptr [addr]
        NumericKind::I32 => [0xdb, 0x05], // fild dword ptr [addr]
        NumericKind::I64 => [0xdf, 0x2d], // fild qword ptr [addr]
    };
    code.extend_from_slice(&load);
    code.extend_from_slice(&(address as u32).to_le_bytes());
}

#[cfg(target_arch = "x86_64")]
fn emit_epilogue(code: &mut Vec<u8>, scratch: *mut f64) {
    code.extend_from_slice(&[0x48, 0xb8]); // mov  rax, imm64
    code.extend_from_slice(&(scratch as u64).to_le_bytes());
    code.extend_from_slice(&[
        0xdd, 0x18, // fstp qword ptr [rax]
        0xf3, 0x0f, 0x7e, 0x00, // movq xmm0, mmword ptr [rax]
        0x58, // pop  rax
        0xc3, // ret
    ]);
}

#[cfg(target_arch = "x86")]
fn emit_epilogue(code: &mut Vec<u8>, _scratch: *mut f64) {
    // The result already sits in st(0), where a returned double belongs.
    code.push(0xc3); // ret
}
