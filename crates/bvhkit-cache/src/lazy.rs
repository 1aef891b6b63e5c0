//! A value built at most once on first use.

use std::sync::OnceLock;

use crate::gate::BuildGate;

/// Lazily built subtree root.
///
/// The first thread to ask builds the value while concurrent callers spin on
/// the gate; once published the value is returned without synchronization
/// beyond an acquire load. If the builder panics the claim is released and a
/// waiting thread takes over.
#[derive(Debug)]
pub struct LazySubtree<T> {
    gate: BuildGate,
    value: OnceLock<T>,
}

impl<T> LazySubtree<T> {
    /// An unbuilt subtree.
    pub const fn new() -> Self {
        Self {
            gate: BuildGate::new(),
            value: OnceLock::new(),
        }
    }

    /// The value, if it has been published.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Return the value, running `build` on this thread if nobody has yet.
    pub fn get_or_build<F>(&self, build: F) -> &T
    where
        F: FnOnce() -> T,
    {
        let _guard = loop {
            if let Some(value) = self.value.get() {
                return value;
            }
            match self.gate.try_claim() {
                Some(guard) => break guard,
                None => self.gate.wait(),
            }
        };
        // Published between our miss and our claim.
        if let Some(value) = self.value.get() {
            return value;
        }
        let value = build();
        self.value.get_or_init(|| value)
    }
}

impl<T> Default for LazySubtree<T> {
    fn default() -> Self {
        Self::new()
    }
}
