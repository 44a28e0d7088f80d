//! Run-once release handles shared by mounts, sessions and snapshots.

use strata_common::StrataResult;

/// Boxed teardown closure.
type ReleaseFn = Box<dyn FnOnce() -> StrataResult<()> + Send>;

/// Owns a teardown closure and guarantees it runs exactly once: either
/// through [`Release::run`] or, failing that, on drop.
pub(crate) struct Release {
    what: String,
    release: Option<ReleaseFn>,
}

impl Release {
    pub(crate) fn new(
        what: impl Into<String>,
        release: impl FnOnce() -> StrataResult<()> + Send + 'static,
    ) -> Self {
        Self {
            what: what.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Run the teardown if it has not run yet.
    pub(crate) fn run(&mut self) -> StrataResult<()> {
        match self.release.take() {
            Some(release) => {
                tracing::debug!(resource = %self.what, "Releasing");
                release()
            }
            None => Ok(()),
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        // Release failures are reported, never raised over the primary result.
        if let Err(err) = self.run() {
            tracing::warn!(resource = %self.what, error = %err, "Failed to release resource");
        }
    }
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Release")
            .field("what", &self.what)
            .field("pending", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>) -> Release {
        let count = Arc::clone(count);
        Release::new("test", move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn runs_once_when_explicit() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut release = counting(&count);
        release.run().unwrap();
        release.run().unwrap();
        drop(release);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runs_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_swallows_failure() {
        let release = Release::new("broken", || {
            Err(strata_common::StrataError::config("still mounted"))
        });
        drop(release);
    }
}
