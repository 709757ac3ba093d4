// Test renderer for worker and coordinator tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{GalleryError, Result};
use crate::preview::render::{PreviewRenderer, RenderTarget};

/// Blocks renders until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            let (guard, _) = self.cond.wait_timeout(open, Duration::from_secs(10)).unwrap();
            open = guard;
        }
    }
}

/// Writes placeholder bytes instead of decoding anything.
pub struct StubRenderer {
    calls: AtomicUsize,
    bounds: Mutex<Vec<u32>>,
    sources: Mutex<Vec<PathBuf>>,
    fail: bool,
    gate: Option<Arc<Gate>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            bounds: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
            fail: false,
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self::new().with_failure()
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self { gate: Some(gate), ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_bounds(&self) -> Vec<u32> {
        self.bounds.lock().unwrap().clone()
    }

    /// Sources in the order renders started
    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources.lock().unwrap().clone()
    }
}

impl PreviewRenderer for StubRenderer {
    fn render(&self, source: &Path, targets: &[RenderTarget]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(source.to_path_buf());
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if self.fail {
            return Err(GalleryError::Other("stub decode failure".to_string()));
        }
        *self.bounds.lock().unwrap() = targets.iter().map(|t| t.max_dimension).collect();
        for target in targets {
            std::fs::write(&target.output, target.size.as_str())?;
        }
        Ok(())
    }
}
