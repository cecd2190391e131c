//! Synchronous notifications
//!
//! A [`Notifier`] delivers a value to every connected listener immediately,
//! in connection order. Emission works on a snapshot of the listener list so
//! listeners may connect, disconnect, or emit again while being called.

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Identifies a connected listener for later disconnection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Rc<dyn Fn(&T)>;

/// A list of listeners for one kind of notification
pub struct Notifier<T> {
    listeners: RefCell<Vec<(ListenerId, Listener<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Notifier<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn connect<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Remove a listener; returns `false` if it was not connected
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn emit(&self, value: &T) {
        let snapshot: SmallVec<[Listener<T>; 4]> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_connection_order() {
        let notifier = Notifier::<i32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = log.clone();
            notifier.connect(move |value| log.borrow_mut().push(format!("{tag}:{value}")));
        }

        notifier.emit(&7);
        assert_eq!(*log.borrow(), vec!["first:7", "second:7"]);
    }

    #[test]
    fn test_disconnect() {
        let notifier = Notifier::<()>::new();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let id = notifier.connect(move |_| counter.set(counter.get() + 1));

        notifier.emit(&());
        assert!(notifier.disconnect(id));
        assert!(!notifier.disconnect(id));
        notifier.emit(&());

        assert_eq!(count.get(), 1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_disconnect_during_emit() {
        let notifier = Rc::new(Notifier::<()>::new());
        let calls = Rc::new(Cell::new(0));

        let own_id = Rc::new(Cell::new(None));
        let weak = Rc::downgrade(&notifier);
        let id_slot = own_id.clone();
        let counter = calls.clone();
        let id = notifier.connect(move |_| {
            counter.set(counter.get() + 1);
            if let (Some(notifier), Some(id)) = (weak.upgrade(), id_slot.get()) {
                notifier.disconnect(id);
            }
        });
        own_id.set(Some(id));

        notifier.emit(&());
        notifier.emit(&());
        assert_eq!(calls.get(), 1);
    }
}
