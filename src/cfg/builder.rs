use super::{BasicBlock, BlockId, Cfg, Instruction, Terminator};
use crate::ast::{CatchClause, Statement, StatementKind};
use crate::visitors::narrowing::recognized_checks;
use tracing::debug;

struct PendingBlock<'a> {
    instructions: Vec<Instruction<'a>>,
    terminator: Option<Terminator<'a>>,
    handler: Option<BlockId>,
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    break_to: BlockId,
    continue_to: BlockId,
}

/// Lowers a statement list into basic blocks.
///
/// Closure bodies are separate units and are not descended into.
pub struct CfgBuilder<'a> {
    blocks: Vec<PendingBlock<'a>>,
    current: BlockId,
    loops: Vec<LoopTargets>,
    handler: Option<BlockId>,
}

impl<'a> Default for CfgBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CfgBuilder<'a> {
    pub fn new() -> Self {
        Self {
            blocks: vec![PendingBlock {
                instructions: Vec::new(),
                terminator: None,
                handler: None,
            }],
            current: 0,
            loops: Vec::new(),
            handler: None,
        }
    }

    pub fn build(mut self, body: &'a [Statement]) -> Cfg<'a> {
        self.lower_block(body);
        self.emit(Instruction::Return(None));
        self.terminate(Terminator::Return);

        let blocks: Vec<BasicBlock<'a>> = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(id, pending)| BasicBlock {
                id,
                instructions: pending.instructions,
                terminator: pending.terminator.unwrap_or(Terminator::Return),
                handler: pending.handler,
            })
            .collect();
        debug!(blocks = blocks.len(), "built control flow graph");
        Cfg { blocks, entry: 0 }
    }

    fn new_block_with(&mut self, handler: Option<BlockId>) -> BlockId {
        self.blocks.push(PendingBlock {
            instructions: Vec::new(),
            terminator: None,
            handler,
        });
        self.blocks.len() - 1
    }

    fn new_block(&mut self) -> BlockId {
        self.new_block_with(self.handler)
    }

    fn emit(&mut self, instruction: Instruction<'a>) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_none() {
            block.instructions.push(instruction);
        }
    }

    /// Closes the current block unless it already ended.
    fn terminate(&mut self, terminator: Terminator<'a>) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Ends the current block and continues in a fresh one with no predecessors.
    fn terminate_and_detach(&mut self, terminator: Terminator<'a>) {
        self.terminate(terminator);
        let dead = self.new_block();
        self.switch_to(dead);
    }

    fn lower_block(&mut self, statements: &'a [Statement]) {
        for statement in statements {
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &'a Statement) {
        match &statement.kind {
            StatementKind::Expression(expr) => self.emit(Instruction::Eval(expr)),
            StatementKind::Echo(exprs) => {
                for expr in exprs {
                    self.emit(Instruction::Eval(expr));
                }
            }
            StatementKind::Block(statements) => self.lower_block(statements),

            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let then_id = self.new_block();
                let else_id = self.new_block();
                let join = self.new_block();
                self.terminate(Terminator::Branch {
                    condition,
                    checks: recognized_checks(condition),
                    then_block: then_id,
                    else_block: else_id,
                });

                self.switch_to(then_id);
                self.lower_block(then_block);
                self.terminate(Terminator::Goto(join));

                self.switch_to(else_id);
                if let Some(else_block) = else_block {
                    self.lower_block(else_block);
                }
                self.terminate(Terminator::Goto(join));
                self.switch_to(join);
            }

            StatementKind::While { condition, body } => {
                let header = self.new_block();
                let body_id = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Goto(header));

                self.switch_to(header);
                self.terminate(Terminator::Branch {
                    condition,
                    checks: recognized_checks(condition),
                    then_block: body_id,
                    else_block: exit,
                });

                self.switch_to(body_id);
                self.lower_loop_body(body, exit, header);
                self.terminate(Terminator::Goto(header));
                self.switch_to(exit);
            }

            StatementKind::DoWhile { body, condition } => {
                let body_id = self.new_block();
                let test = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Goto(body_id));

                self.switch_to(body_id);
                self.lower_loop_body(body, exit, test);
                self.terminate(Terminator::Goto(test));

                self.switch_to(test);
                self.terminate(Terminator::Branch {
                    condition,
                    checks: recognized_checks(condition),
                    then_block: body_id,
                    else_block: exit,
                });
                self.switch_to(exit);
            }

            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                for expr in init {
                    self.emit(Instruction::Eval(expr));
                }
                let header = self.new_block();
                let body_id = self.new_block();
                let update_id = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Goto(header));

                self.switch_to(header);
                match condition {
                    Some(condition) => self.terminate(Terminator::Branch {
                        condition,
                        checks: recognized_checks(condition),
                        then_block: body_id,
                        else_block: exit,
                    }),
                    // `for (;;)` only leaves through break
                    None => self.terminate(Terminator::Goto(body_id)),
                }

                self.switch_to(body_id);
                self.lower_loop_body(body, exit, update_id);
                self.terminate(Terminator::Goto(update_id));

                self.switch_to(update_id);
                for expr in update {
                    self.emit(Instruction::Eval(expr));
                }
                self.terminate(Terminator::Goto(header));
                self.switch_to(exit);
            }

            StatementKind::Foreach {
                subject,
                key,
                value,
                by_ref,
                body,
            } => {
                self.emit(Instruction::Eval(subject));
                let header = self.new_block();
                let body_id = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Goto(header));

                self.switch_to(header);
                self.terminate(Terminator::Iterate {
                    body: body_id,
                    exit,
                });

                self.switch_to(body_id);
                self.emit(Instruction::ForeachBind {
                    subject,
                    key: key.as_ref(),
                    value,
                    by_ref: *by_ref,
                });
                if *by_ref {
                    // Every way out of an iteration passes a write-back block.
                    let latch = self.new_block();
                    let leave = self.new_block();
                    self.lower_loop_body(body, leave, latch);
                    self.terminate(Terminator::Goto(latch));

                    self.switch_to(latch);
                    self.emit(Instruction::WriteBack { subject, value });
                    self.terminate(Terminator::Goto(header));

                    self.switch_to(leave);
                    self.emit(Instruction::WriteBack { subject, value });
                    self.terminate(Terminator::Goto(exit));
                } else {
                    self.lower_loop_body(body, exit, header);
                    self.terminate(Terminator::Goto(header));
                }
                self.switch_to(exit);
            }

            StatementKind::Return(value) => {
                self.emit(Instruction::Return(value.as_ref()));
                self.terminate_and_detach(Terminator::Return);
            }

            StatementKind::Throw(expr) => {
                self.emit(Instruction::Eval(expr));
                self.terminate_and_detach(Terminator::Throw);
            }

            StatementKind::Break => {
                if let Some(targets) = self.loops.last().copied() {
                    self.terminate_and_detach(Terminator::Goto(targets.break_to));
                }
            }

            StatementKind::Continue => {
                if let Some(targets) = self.loops.last().copied() {
                    self.terminate_and_detach(Terminator::Goto(targets.continue_to));
                }
            }

            StatementKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_deref()),
        }
    }

    fn lower_loop_body(&mut self, body: &'a [Statement], break_to: BlockId, continue_to: BlockId) {
        self.loops.push(LoopTargets {
            break_to,
            continue_to,
        });
        self.lower_block(body);
        self.loops.pop();
    }

    /// `finally` is lowered twice: once on the normal path and once ending in a rethrow.
    /// `return`, `break` and `continue` inside the protected region leave without it.
    fn lower_try(
        &mut self,
        body: &'a [Statement],
        catches: &'a [CatchClause],
        finally: Option<&'a [Statement]>,
    ) {
        let outer = self.handler;

        let finally_on_throw = finally.map(|_| self.new_block_with(outer));
        let catch_handler = finally_on_throw.or(outer);
        let dispatch = self.new_block_with(catch_handler);
        let normal_finally = finally.map(|_| self.new_block_with(outer));
        let after = self.new_block_with(outer);
        let normal_exit = normal_finally.unwrap_or(after);

        self.handler = Some(dispatch);
        let body_id = self.new_block();
        self.terminate(Terminator::Goto(body_id));
        self.switch_to(body_id);
        self.lower_block(body);
        self.terminate(Terminator::Goto(normal_exit));

        self.handler = catch_handler;
        let mut targets = Vec::with_capacity(catches.len() + 1);
        for clause in catches {
            let clause_id = self.new_block();
            targets.push(clause_id);
            self.switch_to(clause_id);
            self.emit(Instruction::BindCatch {
                var: clause.var.as_deref(),
                classes: &clause.classes,
            });
            self.lower_block(&clause.body);
            self.terminate(Terminator::Goto(normal_exit));
        }

        self.handler = outer;
        // Exceptions no clause matches
        let uncaught = match finally_on_throw {
            Some(id) => id,
            None => {
                let rethrow = self.new_block();
                self.switch_to(rethrow);
                self.terminate(Terminator::Throw);
                rethrow
            }
        };
        targets.push(uncaught);
        self.switch_to(dispatch);
        self.terminate(Terminator::Switch(targets));

        if let (Some(finally), Some(on_throw), Some(normal)) =
            (finally, finally_on_throw, normal_finally)
        {
            self.switch_to(on_throw);
            self.lower_block(finally);
            self.terminate(Terminator::Throw);

            self.switch_to(normal);
            self.lower_block(finally);
            self.terminate(Terminator::Goto(after));
        }

        self.switch_to(after);
    }
}
