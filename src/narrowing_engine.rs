//! Forward flow analysis over one unit's CFG.
//!
//! `run` computes the fact at the entry of every block with a worklist until nothing changes;
//! `replay` then walks each reachable block once from its fixed entry fact, which is where
//! violations are collected.

use crate::cfg::{BasicBlock, BlockId, Cfg, Terminator};
use crate::core::context::CheckContext;
use crate::diagnostics::TypeMismatch;
use crate::types::Type;
use crate::utils::symbol_table::Scope;
use crate::visitors::inference::ExpressionEvaluator;
use crate::visitors::narrowing::{narrow_from_condition, FlowFact};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Fixed-point result: `entry[b]` is `None` for blocks no feasible path reaches.
#[derive(Debug, Clone)]
pub struct FlowAnalysis {
    pub entry: Vec<Option<FlowFact>>,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Default)]
pub struct UnitOutcome {
    pub mismatches: Vec<TypeMismatch>,
    /// Types of every reachable `return`, falling off the end included
    pub returns: Vec<Type>,
}

pub struct NarrowingEngine<'c, 'a> {
    ctx: &'c CheckContext<'a>,
    scope: &'c Scope,
}

impl<'c, 'a> NarrowingEngine<'c, 'a> {
    pub fn new(ctx: &'c CheckContext<'a>, scope: &'c Scope) -> Self {
        Self { ctx, scope }
    }

    pub fn run(&self, cfg: &Cfg<'_>) -> FlowAnalysis {
        let initial = FlowFact::seeded(self.scope);
        let mut entry: Vec<Option<FlowFact>> = vec![None; cfg.len()];
        if cfg.is_empty() {
            return FlowAnalysis {
                entry,
                iterations: 0,
                converged: true,
            };
        }
        entry[cfg.entry] = Some(initial.clone());

        let mut worklist = VecDeque::from([cfg.entry]);
        let mut queued = FxHashSet::default();
        queued.insert(cfg.entry);

        let limit = self.ctx.options.max_fixpoint_iterations;
        let mut evaluator = ExpressionEvaluator::new(self.ctx, self.scope, false);
        let mut iterations = 0;

        while let Some(id) = worklist.pop_front() {
            queued.remove(&id);
            iterations += 1;
            if iterations > limit {
                warn!(
                    iterations = limit,
                    blocks = cfg.len(),
                    "flow analysis did not converge, falling back to declared types"
                );
                let reachable = cfg.reachable();
                for (id, slot) in entry.iter_mut().enumerate() {
                    if reachable[id] {
                        *slot = Some(initial.clone());
                    }
                }
                return FlowAnalysis {
                    entry,
                    iterations: limit,
                    converged: false,
                };
            }

            let (Some(fact), Some(block)) = (entry[id].clone(), cfg.block(id)) else {
                continue;
            };
            for (target, out) in self.transfer(&mut evaluator, block, fact, &initial) {
                if merge_into(&mut entry[target], out) && queued.insert(target) {
                    worklist.push_back(target);
                }
            }
        }

        trace!(iterations, "flow analysis converged");
        FlowAnalysis {
            entry,
            iterations,
            converged: true,
        }
    }

    /// Walks every reachable block once from its entry fact.
    pub fn replay(&self, cfg: &Cfg<'_>, analysis: &FlowAnalysis, checking: bool) -> UnitOutcome {
        let initial = FlowFact::seeded(self.scope);
        let mut evaluator = ExpressionEvaluator::new(self.ctx, self.scope, checking);

        for block in &cfg.blocks {
            let Some(Some(fact)) = analysis.entry.get(block.id) else {
                continue;
            };
            if let Terminator::Branch { checks, .. } = &block.terminator {
                if checking && !checks.is_empty() {
                    if let Some(metrics) = self.ctx.metrics() {
                        metrics.record_narrowing_branch();
                    }
                    debug!(
                        block = block.id,
                        checks = ?checks.iter().map(|c| c.expr.to_string()).collect::<Vec<_>>(),
                        "narrowing branch"
                    );
                }
            }
            self.transfer(&mut evaluator, block, fact.clone(), &initial);
        }

        let (mismatches, returns) = evaluator.finish();
        UnitOutcome {
            mismatches,
            returns,
        }
    }

    /// Facts leaving `block` along each edge
    fn transfer(
        &self,
        evaluator: &mut ExpressionEvaluator<'_, '_>,
        block: &BasicBlock<'_>,
        mut fact: FlowFact,
        initial: &FlowFact,
    ) -> Vec<(BlockId, FlowFact)> {
        let mut edges = Vec::new();
        // Anything in the block may throw before its effects are known
        if let Some(handler) = block.handler {
            edges.push((handler, initial.clone()));
        }

        for instruction in &block.instructions {
            evaluator.execute(instruction, &mut fact);
        }

        match &block.terminator {
            Terminator::Goto(target) => edges.push((*target, fact)),
            Terminator::Branch {
                condition,
                then_block,
                else_block,
                ..
            } => {
                let (then_fact, else_fact) = narrow_from_condition(evaluator, condition, fact, 0);
                edges.extend(then_fact.map(|f| (*then_block, f)));
                edges.extend(else_fact.map(|f| (*else_block, f)));
            }
            Terminator::Iterate { body, exit } => {
                edges.push((*body, fact.clone()));
                edges.push((*exit, fact));
            }
            Terminator::Switch(targets) => {
                edges.extend(targets.iter().map(|t| (*t, fact.clone())));
            }
            Terminator::Return | Terminator::Throw => {}
        }
        edges
    }
}

/// Joins `incoming` into a block's entry fact; true when the entry changed.
fn merge_into(slot: &mut Option<FlowFact>, incoming: FlowFact) -> bool {
    match slot {
        None => {
            *slot = Some(incoming);
            true
        }
        Some(existing) => {
            let joined = existing.join(&incoming);
            if joined == *existing {
                false
            } else {
                *existing = joined;
                true
            }
        }
    }
}
