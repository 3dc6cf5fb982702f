use std::sync::Arc;

use crate::host::host::Host;

/// A shared reference to the callback payload of an event.
///
/// The callback runs on the worker currently driving the destination host,
/// with that host borrowed for the duration of the call. Whatever state the
/// closure captured is dropped when the last `TaskRef` clone goes away.
#[derive(Clone)]
pub struct TaskRef {
    inner: Arc<dyn Fn(&Host) + Send + Sync>,
}

impl TaskRef {
    pub fn new(callback: impl Fn(&Host) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(callback),
        }
    }

    pub fn execute(&self, host: &Host) {
        (self.inner)(host)
    }
}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRef")
            .field("inner", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl PartialEq for TaskRef {
    /// Two `TaskRef`s are equal if they point to the same callback object.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }
}

impl Eq for TaskRef {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_eq() {
        let a = TaskRef::new(|_| {});
        let b = TaskRef::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
