//! Basic blocks for one checked unit (function, method, closure or top-level code).
//!
//! Instructions and terminators borrow their expressions from the AST; a CFG never outlives
//! the program it was built from.

pub mod builder;

use crate::ast::Expression;
use crate::visitors::narrowing::ConditionCheck;

pub type BlockId = usize;

#[derive(Debug, Clone)]
pub enum Instruction<'a> {
    /// Evaluate for type, effects and checks
    Eval(&'a Expression),
    /// `return`, or falling off the end of the unit (`None`)
    Return(Option<&'a Expression>),
    /// Bind the loop variables of a `foreach` at the start of each iteration
    ForeachBind {
        subject: &'a Expression,
        key: Option<&'a Expression>,
        value: &'a Expression,
        by_ref: bool,
    },
    /// End of a by-reference `foreach` iteration: the loop variable may have been written
    /// through, so its type flows back into the subject's elements.
    WriteBack {
        subject: &'a Expression,
        value: &'a Expression,
    },
    /// Entry of a `catch` clause
    BindCatch {
        var: Option<&'a str>,
        classes: &'a [String],
    },
}

#[derive(Debug, Clone)]
pub enum Terminator<'a> {
    Goto(BlockId),
    /// Two-way branch; `checks` lists the narrowing checks recognized in `condition`.
    Branch {
        condition: &'a Expression,
        checks: Vec<ConditionCheck>,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// `foreach` header: run another iteration or leave the loop
    Iterate { body: BlockId, exit: BlockId },
    /// Exception dispatch to the catch clauses
    Switch(Vec<BlockId>),
    Return,
    Throw,
}

#[derive(Debug, Clone)]
pub struct BasicBlock<'a> {
    pub id: BlockId,
    pub instructions: Vec<Instruction<'a>>,
    pub terminator: Terminator<'a>,
    /// Where an exception raised inside this block goes
    pub handler: Option<BlockId>,
}

impl<'a> BasicBlock<'a> {
    /// Normal-flow successors; the handler edge is not included.
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.terminator {
            Terminator::Goto(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Iterate { body, exit } => vec![*body, *exit],
            Terminator::Switch(targets) => targets.clone(),
            Terminator::Return | Terminator::Throw => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cfg<'a> {
    pub blocks: Vec<BasicBlock<'a>>,
    pub entry: BlockId,
}

impl<'a> Cfg<'a> {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock<'a>> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks reachable from the entry along any edge, ignoring conditions
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            let Some(block) = self.blocks.get(id) else {
                continue;
            };
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            stack.extend(block.successors());
            stack.extend(block.handler);
        }
        seen
    }
}
