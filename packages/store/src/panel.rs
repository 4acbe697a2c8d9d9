//! Host layer panel integration.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of offering a layer to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The layer was not listed before and now is.
    Added,
    /// The layer was already listed; nothing changed.
    AlreadyPresent,
}

/// A host display that lists container layers.
///
/// Implementations must be idempotent: registering a name twice yields
/// [`Registration::AlreadyPresent`] the second time.
pub trait LayerPanel: Send {
    /// Lists `layer` (stored in `container`) on the panel.
    fn register(&mut self, container: &str, layer: &str) -> Registration;
}

impl<P: LayerPanel + ?Sized> LayerPanel for Box<P> {
    fn register(&mut self, container: &str, layer: &str) -> Registration {
        (**self).register(container, layer)
    }
}

/// Panel that lists nothing; used by headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPanel;

impl LayerPanel for NullPanel {
    fn register(&mut self, _container: &str, _layer: &str) -> Registration {
        Registration::AlreadyPresent
    }
}

/// Panel that remembers registered names. Clones share the same list.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPanel {
    names: Arc<Mutex<BTreeSet<String>>>,
}

impl InMemoryPanel {
    /// Creates an empty panel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered layer names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl LayerPanel for InMemoryPanel {
    fn register(&mut self, _container: &str, layer: &str) -> Registration {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if names.insert(layer.to_string()) {
            Registration::Added
        } else {
            Registration::AlreadyPresent
        }
    }
}
