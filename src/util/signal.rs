//! Ordered, single-threaded notification lists.
//!
//! A [`Signal`] is the crate's stand-in for a GUI toolkit signal: listeners are
//! plain closures, invoked synchronously and in connection order on the thread
//! that emits. Emission snapshots the listener list first, so a listener may
//! connect further listeners (they see the next emission, not the current one).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Slot<T> = Rc<dyn Fn(&T)>;

/// Ordered list of listeners for values of type `T`.
pub struct Signal<T> {
    slots: RefCell<Vec<Slot<T>>>,
}

impl<T> Signal<T> {
    /// Create a signal with no listeners.
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }

    /// Append a listener.
    pub fn connect<F>(&self, slot: F)
    where
        F: Fn(&T) + 'static,
    {
        self.slots.borrow_mut().push(Rc::new(slot));
    }

    /// Invoke every listener with `value`, in connection order.
    pub fn emit(&self, value: &T) {
        let slots: Vec<Slot<T>> = self.slots.borrow().clone();
        for slot in slots {
            slot(value);
        }
    }

    /// Remove every listener.
    pub fn disconnect_all(&self) {
        self.slots.borrow_mut().clear();
    }

    /// Number of connected listeners.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Whether no listener is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("listeners", &self.len()).finish()
    }
}
