//! The generation handle keyword compilers emit into.
//!
//! `CodeGen` keeps an explicit stack of open scopes. A block closes every conditional that
//! was opened inside it, so guards left open by the control-flow primitives never leak past
//! the block that owns them. A branch marked unreachable silently drops further emission.

use super::instruction::{Expr, Op, OpPool, OpRef, Procedure};
use super::names::Name;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

#[derive(Debug)]
enum ScopeKind {
    Root,
    Block,
    If {
        cond: Expr,
        /// Ops of the then-branch once the scope switched to its else-branch.
        then_ops: Option<Vec<OpRef>>,
    },
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    ops: Vec<OpRef>,
    unreachable: bool,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            ops: Vec::new(),
            unreachable: false,
        }
    }
}

#[derive(Debug)]
pub struct CodeGen {
    pool: OpPool,
    scopes: Vec<Scope>,
    counters: FxHashMap<SmolStr, u32>,
    constants: FxHashSet<Name>,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        Self {
            pool: OpPool::new(),
            scopes: vec![Scope::new(ScopeKind::Root)],
            counters: FxHashMap::default(),
            constants: FxHashSet::default(),
        }
    }

    /// Synthesizes an identifier unique within the procedure, e.g. `valid0`, `valid1`.
    pub fn name(&mut self, hint: &str) -> Name {
        let counter = self.counters.entry(SmolStr::new(hint)).or_insert(0);
        let name = Name::new(format!("{hint}{counter}"));
        *counter += 1;
        name
    }

    /// Appends an instruction to the innermost open branch.
    pub fn emit(&mut self, op: Op) {
        let scope = self.current_mut();
        if scope.unreachable {
            tracing::trace!(?op, "dropping instruction emitted into an unreachable branch");
            return;
        }

        let op_ref = self.pool.alloc(op);
        self.current_mut().ops.push(op_ref);
    }

    pub fn declare_const(&mut self, hint: &str, init: Expr) -> Name {
        let name = self.name(hint);
        self.constants.insert(name.clone());
        self.emit(Op::Declare {
            name: name.clone(),
            init,
            mutable: false,
        });
        name
    }

    pub fn declare_let(&mut self, hint: &str, init: Expr) -> Name {
        let name = self.name(hint);
        self.emit(Op::Declare {
            name: name.clone(),
            init,
            mutable: true,
        });
        name
    }

    /// Declares a mutable binding under a name obtained from [`CodeGen::name`].
    pub fn declare_named(&mut self, name: &Name, init: Expr) {
        self.emit(Op::Declare {
            name: name.clone(),
            init,
            mutable: true,
        });
    }

    pub fn assign(&mut self, name: &Name, value: Expr) {
        debug_assert!(
            !self.constants.contains(name),
            "assignment to constant binding {name}"
        );
        self.emit(Op::Assign {
            name: name.clone(),
            value,
        });
    }

    pub fn if_(&mut self, cond: Expr) {
        self.scopes.push(Scope::new(ScopeKind::If {
            cond,
            then_ops: None,
        }));
    }

    /// Switches the innermost conditional to its else-branch.
    ///
    /// # Panics
    ///
    /// Panics if the innermost scope is not a conditional still in its then-branch.
    pub fn else_(&mut self) {
        let scope = self.current_mut();
        match &mut scope.kind {
            ScopeKind::If { then_ops, .. } if then_ops.is_none() => {
                *then_ops = Some(std::mem::take(&mut scope.ops));
                scope.unreachable = false;
            }
            kind => panic!("else without open if: {kind:?}"),
        }
    }

    /// Closes the innermost conditional.
    ///
    /// # Panics
    ///
    /// Panics if the innermost scope is not a conditional.
    pub fn end_if(&mut self) {
        assert!(
            matches!(self.current().kind, ScopeKind::If { .. }),
            "end_if without open if"
        );
        self.close_scope();
    }

    pub fn open_block(&mut self) {
        self.scopes.push(Scope::new(ScopeKind::Block));
    }

    /// Closes the innermost block together with every conditional still open inside it.
    ///
    /// # Panics
    ///
    /// Panics if no block is open.
    pub fn close_block(&mut self) {
        loop {
            match self.current().kind {
                ScopeKind::If { .. } => self.close_scope(),
                ScopeKind::Block => {
                    self.close_scope();
                    return;
                }
                ScopeKind::Root => panic!("close_block without open block"),
            }
        }
    }

    /// Emits a block and closes it after `f` ran, whatever `f` left open.
    pub fn block<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.open_block();
        let result = f(self);
        self.close_block();
        result
    }

    /// Returns from the procedure; nothing after this point in the branch executes.
    pub fn return_(&mut self, valid: bool) {
        self.emit(Op::Return(valid));
        self.mark_unreachable();
    }

    /// Marks the rest of the innermost branch as unreachable.
    pub fn mark_unreachable(&mut self) {
        self.current_mut().unreachable = true;
    }

    pub fn is_unreachable(&self) -> bool {
        self.current().unreachable
    }

    /// Number of scopes currently open, the root included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Closes every open conditional at the root and returns the finished procedure.
    ///
    /// # Panics
    ///
    /// Panics if a block is still open.
    pub fn finish(mut self) -> Procedure {
        while self.scopes.len() > 1 {
            assert!(
                matches!(self.current().kind, ScopeKind::If { .. }),
                "finish with an open block"
            );
            self.close_scope();
        }

        let root = self.scopes.pop().map(|scope| scope.ops).unwrap_or_default();
        Procedure {
            pool: self.pool,
            body: root,
        }
    }

    fn close_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        let op = match scope.kind {
            ScopeKind::If { cond, then_ops } => match then_ops {
                Some(then_branch) => Op::If {
                    cond,
                    then_branch,
                    else_branch: scope.ops,
                },
                None => Op::If {
                    cond,
                    then_branch: scope.ops,
                    else_branch: Vec::new(),
                },
            },
            ScopeKind::Block if scope.ops.is_empty() => return,
            ScopeKind::Block => Op::Block(scope.ops),
            ScopeKind::Root => unreachable!("root scope is never closed"),
        };

        self.emit(op);
    }

    #[inline]
    fn current(&self) -> &Scope {
        self.scopes.last().expect("root scope is always open")
    }

    #[inline]
    fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("root scope is always open")
    }
}
