//! The compilation pipeline.
//!
//! `compile` runs the whole front end and back end for one expression:
//! tokenize, convert to postfix, resolve names into a flat node list, link
//! call arguments, run the per-operation peephole rewriters, precompute
//! constant subtrees, and emit the final executable block.
//!
//! Constant folding reuses the emitter: a foldable subtree is compiled
//! into a throwaway page, invoked once, and replaced by a synthetic
//! literal holding the captured result. The throwaway page is released
//! before compilation continues. Folding is transitive because the scan
//! runs in evaluation order, so a folded result immediately qualifies as a
//! constant argument of the call that consumes it.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog;
use crate::emitter::{self, CompiledBlock};
use crate::error::{ExprError, Result};
use crate::lexer::{self, NameClass, ResolveNames, Token, TokenKind};
use crate::parser;
use crate::types::{Binding, Leaf, NamedConstant, Node};

/// A successfully compiled expression: the sealed code block plus the
/// storage its machine code addresses. The boxed doubles (deduplicated
/// literals and folded intermediates) must live exactly as long as the
/// block, so they travel together.
#[derive(Debug)]
pub(crate) struct Program {
    block: CompiledBlock,
    /// Names of the bindings the code reads.
    pub referenced: BTreeSet<String>,
    #[allow(dead_code)]
    constants: Vec<Box<f64>>,
}

impl Program {
    pub fn entry(&self) -> emitter::EvalFn {
        self.block.entry()
    }

    pub fn code_size(&self) -> usize {
        self.block.code_size()
    }
}

/// Name lookup over the evaluator's maps plus the catalog.
struct NameTable<'a> {
    variables: &'a BTreeMap<String, Binding>,
    constants: &'a BTreeMap<String, NamedConstant>,
}

impl ResolveNames for NameTable<'_> {
    fn classify(&self, name: &str) -> Option<NameClass> {
        if self.variables.contains_key(name) {
            return Some(NameClass::Variable);
        }
        if self.constants.contains_key(name) {
            return Some(NameClass::Constant);
        }
        catalog::lookup(name).map(|op| NameClass::Function(op.arity))
    }
}

/// Compiles `text` against the given bindings and named constants.
/// `scratch` is the evaluator's 64-bit return slot.
pub(crate) fn compile(
    text: &str,
    variables: &BTreeMap<String, Binding>,
    constants: &BTreeMap<String, NamedConstant>,
    scratch: *mut f64,
) -> Result<Program> {
    let names = NameTable {
        variables,
        constants,
    };
    let tokens = lexer::tokenize(text, &names)?;
    let postfix = parser::to_postfix(tokens)?;

    let mut referenced = BTreeSet::new();
    let mut pool = LiteralPool::default();
    let mut nodes = resolve(postfix, variables, constants, &mut pool, &mut referenced)?;

    link_arguments(&mut nodes)?;
    run_rewriters(&mut nodes);
    fold_constants(&mut nodes, &mut pool, scratch)?;

    let order = live_order(&nodes);
    let block = emitter::emit(&nodes, &order, scratch)?;

    Ok(Program {
        block,
        referenced,
        constants: pool.storage,
    })
}

/// Owns every compile-time double the generated code addresses: parsed
/// literals (deduplicated by source text) and folded intermediates.
#[derive(Default)]
struct LiteralPool {
    texts: Vec<(String, usize)>,
    storage: Vec<Box<f64>>,
}

impl LiteralPool {
    /// Returns a leaf for the literal `text`, reusing storage when the
    /// same spelling already occurred in this compilation.
    fn literal(&mut self, text: &str) -> Result<Leaf> {
        if let Some(&(_, slot)) = self.texts.iter().find(|(t, _)| t == text) {
            let value = &self.storage[slot];
            return Ok(Leaf::constant_at(&**value as *const f64 as *const u8, **value));
        }
        let value: f64 = text
            .parse()
            .map_err(|_| ExprError::Internal("unparseable numeric literal"))?;
        self.texts.push((text.to_string(), self.storage.len()));
        Ok(self.intern(value))
    }

    /// Stores a folded result and returns a leaf addressing it.
    fn intern(&mut self, value: f64) -> Leaf {
        self.storage.push(Box::new(value));
        let boxed = self.storage.last().expect("just pushed");
        Leaf::constant_at(&**boxed as *const f64 as *const u8, value)
    }
}

/// Binds each postfix token to a node: literals and names become leaves,
/// operators and function names become calls.
fn resolve(
    postfix: Vec<Token>,
    variables: &BTreeMap<String, Binding>,
    constants: &BTreeMap<String, NamedConstant>,
    pool: &mut LiteralPool,
    referenced: &mut BTreeSet<String>,
) -> Result<Vec<Node>> {
    let mut nodes = Vec::with_capacity(postfix.len());

    for token in postfix {
        match token.kind {
            TokenKind::Literal => {
                nodes.push(Node::Leaf(pool.literal(&token.text)?));
            }
            TokenKind::ConstantName => {
                let constant = constants
                    .get(&token.text)
                    .ok_or(ExprError::Internal("constant vanished after tokenizing"))?;
                nodes.push(Node::Leaf(Leaf::constant_at(
                    constant.address(),
                    *constant.value,
                )));
            }
            TokenKind::VariableName => {
                let binding = variables
                    .get(&token.text)
                    .ok_or(ExprError::Internal("binding vanished after tokenizing"))?;
                referenced.insert(token.text.clone());
                nodes.push(Node::Leaf(Leaf {
                    kind: binding.kind,
                    address: binding.address,
                    constant: None,
                }));
            }
            TokenKind::FunctionName => {
                let op = catalog::lookup(&token.text)
                    .ok_or(ExprError::Internal("operation vanished after tokenizing"))?;
                nodes.push(Node::Call(op.to_call()));
            }
            TokenKind::Infix(_) | TokenKind::Unary => {
                let mut chars = token.text.chars();
                let (c, unary) = (chars.next().unwrap_or(' '), token.kind == TokenKind::Unary);
                // Unary plus participates in precedence but emits nothing.
                if unary && c == '+' {
                    continue;
                }
                let name = catalog::operator_name(c, unary)
                    .ok_or(ExprError::Internal("unmapped operator token"))?;
                let op = catalog::lookup(name)
                    .ok_or(ExprError::Internal("operator missing from catalog"))?;
                nodes.push(Node::Call(op.to_call()));
            }
            _ => return Err(ExprError::Internal("structural token in postfix stream")),
        }
    }

    Ok(nodes)
}

/// Connects each call to its arguments by position, mirroring a stack
/// evaluation of the postfix stream. `args[0]` receives the top of the
/// stack, i.e. the last-evaluated argument.
fn link_arguments(nodes: &mut [Node]) -> Result<()> {
    let mut stack: Vec<usize> = Vec::new();

    for index in 0..nodes.len() {
        if let Node::Call(call) = &mut nodes[index] {
            for slot in 0..call.arity {
                call.args[slot] = stack
                    .pop()
                    .ok_or(ExprError::Internal("call without enough arguments"))?;
            }
        }
        stack.push(index);
    }

    if stack.len() == 1 {
        Ok(())
    } else {
        Err(ExprError::Internal("postfix stream leaves no single root"))
    }
}

/// Gives every call with a registered rewriter one chance to replace
/// itself. Replacements are not revisited.
fn run_rewriters(nodes: &mut Vec<Node>) {
    for index in 0..nodes.len() {
        let call = match &nodes[index] {
            Node::Call(call) if call.optimizer.is_some() => call.clone(),
            _ => continue,
        };
        if let Some(rewriter) = call.optimizer {
            if let Some(replacement) = rewriter(&call, nodes) {
                nodes[index] = Node::Call(replacement);
            }
        }
    }
}

/// Precomputes every call whose arguments are all compile-time constants
/// and whose code embeds no binding address. The subtree is compiled in
/// isolation, invoked once, and replaced with the captured value.
fn fold_constants(nodes: &mut Vec<Node>, pool: &mut LiteralPool, scratch: *mut f64) -> Result<()> {
    for index in 0..nodes.len() {
        let call = match &nodes[index] {
            Node::Call(call) if !call.var_ref => call,
            _ => continue,
        };

        let args = &call.args[..call.arity];
        let all_constant = args
            .iter()
            .all(|&arg| matches!(nodes[arg].as_leaf(), Some(leaf) if leaf.constant.is_some()));
        if !all_constant {
            continue;
        }

        let mut order: Vec<usize> = args.to_vec();
        order.sort_unstable();
        order.push(index);

        let block = emitter::emit(nodes, &order, scratch)?;
        let value = unsafe { (block.entry())() };
        drop(block);

        for &arg in &order[..order.len() - 1] {
            nodes[arg] = Node::Spliced;
        }
        nodes[index] = Node::Leaf(pool.intern(value));
    }
    Ok(())
}

/// Indices of the surviving nodes, in evaluation order.
fn live_order(nodes: &[Node]) -> Vec<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| !matches!(node, Node::Spliced))
        .map(|(index, _)| index)
        .collect()
}
