use super::{PreconditionerKind, PreconditionerOp};
use std::cell::Cell;
use std::fmt;

thread_local! {
    static ACQUIRED: Cell<usize> = const { Cell::new(0) };
    static RELEASED: Cell<usize> = const { Cell::new(0) };
}

/// Handles acquired and released on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleCounts {
    pub acquired: usize,
    pub released: usize,
}

impl HandleCounts {
    pub fn outstanding(&self) -> usize {
        self.acquired - self.released
    }
}

pub fn handle_counts() -> HandleCounts {
    HandleCounts {
        acquired: ACQUIRED.with(Cell::get),
        released: RELEASED.with(Cell::get),
    }
}

/// Preconditioner state for one solve.
///
/// Released exactly once: either explicitly through [`release`](Self::release)
/// or when dropped, on every exit path of the solve.
pub struct PreconditionerHandle<'a> {
    kind: PreconditionerKind,
    op: Option<Box<dyn PreconditionerOp + 'a>>,
}

impl<'a> PreconditionerHandle<'a> {
    pub(crate) fn new(
        kind: PreconditionerKind,
        op: Option<Box<dyn PreconditionerOp + 'a>>,
    ) -> Self {
        ACQUIRED.with(|c| c.set(c.get() + 1));
        log::trace!("Acquired {} preconditioner", kind.name());
        Self { kind, op }
    }

    pub fn kind(&self) -> PreconditionerKind {
        self.kind
    }

    /// `None` for the identity.
    pub fn op(&self) -> Option<&(dyn PreconditionerOp + 'a)> {
        self.op.as_deref()
    }

    pub fn release(self) {
        drop(self)
    }
}

impl Drop for PreconditionerHandle<'_> {
    fn drop(&mut self) {
        self.op = None;
        RELEASED.with(|c| c.set(c.get() + 1));
        log::trace!("Released {} preconditioner", self.kind.name());
    }
}

impl fmt::Debug for PreconditionerHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreconditionerHandle")
            .field("kind", &self.kind)
            .field("op", &self.op)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::acquire;
    use fvm_core::SparseMatrix;

    #[test]
    fn test_release_and_drop_count_once() {
        let a = SparseMatrix::identity(3);
        let before = handle_counts();
        let handle = acquire(PreconditionerKind::Jacobi, &a).unwrap();
        assert_eq!(handle_counts().outstanding(), before.outstanding() + 1);
        handle.release();
        {
            let _scoped = acquire(PreconditionerKind::ssor(), &a).unwrap();
        }
        let after = handle_counts();
        assert_eq!(after.acquired, before.acquired + 2);
        assert_eq!(after.released, before.released + 2);
        assert_eq!(after.outstanding(), before.outstanding());
    }
}
