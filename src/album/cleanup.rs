// Scoped file cleanup
//
// Paths registered here are removed when the list is dropped, unless the
// owner dismissed them first. An album transaction registers every blob it
// newly created, then dismisses the list right after the database commit;
// any earlier return removes them again.

use std::path::PathBuf;

use crate::store::remove_file_if_exists;

#[derive(Debug, Default)]
pub struct CleanupList {
    paths: Vec<PathBuf>,
}

impl CleanupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Forget every registered path without touching the files.
    pub fn dismiss(&mut self) {
        self.paths.clear();
    }

    /// Remove every registered path now. Failures are logged, not returned.
    /// Returns how many files were removed.
    pub fn run(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            match remove_file_if_exists(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Cleanup could not remove {}: {}", path.display(), e),
            }
        }
        removed
    }
}

impl Drop for CleanupList {
    fn drop(&mut self) {
        if self.paths.is_empty() {
            return;
        }
        let pending = self.paths.len();
        let removed = self.run();
        log::info!("Rolled back {} of {} new files", removed, pending);
    }
}
