/// A change applied to local state before the server confirmed it
///
/// The state is snapshotted before the change. Resolving the guard either keeps
/// the change (`commit`) or restores the snapshot (`rollback`). A guard dropped
/// without being resolved, eg. because the request future was cancelled, rolls
/// back.
pub struct Optimistic<'a, T: Clone> {
    state: &'a mut T,
    snapshot: Option<T>,
}

impl<'a, T: Clone> Optimistic<'a, T> {
    pub fn apply<F, R>(state: &'a mut T, change: F) -> (Optimistic<'a, T>, R)
    where
        F: FnOnce(&mut T) -> R,
    {
        let snapshot = state.clone();
        let res = change(&mut *state);
        (
            Optimistic {
                state,
                snapshot: Some(snapshot),
            },
            res,
        )
    }

    pub fn state(&self) -> &T {
        &*self.state
    }

    pub fn commit(mut self) {
        self.snapshot = None;
    }

    /// Keeps the change, merging in the server's answer with `reconcile`
    pub fn commit_with<F>(mut self, reconcile: F)
    where
        F: FnOnce(&mut T),
    {
        self.snapshot = None;
        reconcile(&mut *self.state);
    }

    pub fn rollback(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

impl<'a, T: Clone> Drop for Optimistic<'a, T> {
    fn drop(&mut self) {
        self.restore();
    }
}
