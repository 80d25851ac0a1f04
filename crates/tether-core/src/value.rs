//! Seam to the reactive-value collaborator.
//!
//! The engine only needs to read a value, subscribe to its changes and tell a
//! plain value apart from a reactive one. [`MutableValue`] is a small
//! implementation of that contract.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Change handler. Two handlers are the same handler when they are the same
/// `Rc` allocation.
pub type ValueHandler<T> = Rc<dyn Fn(&T)>;

pub(crate) fn same_handler<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The value could not produce its current state.
    Unavailable(String),
    /// The value has been torn down.
    Disposed,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::Unavailable(reason) => write!(f, "value unavailable: {reason}"),
            ValueError::Disposed => f.write_str("value has been disposed"),
        }
    }
}

impl std::error::Error for ValueError {}

pub trait Observable<T> {
    fn get(&self) -> Result<T, ValueError>;

    /// Registers `handler`. Registering the same handler twice is a no-op.
    fn subscribe(&self, handler: &ValueHandler<T>);

    fn unsubscribe(&self, handler: &ValueHandler<T>);
}

/// Either a constant or something that can change over time.
pub enum MaybeReactive<T> {
    Plain(T),
    Reactive(Rc<dyn Observable<T>>),
}

impl<T> MaybeReactive<T> {
    pub fn is_reactive(&self) -> bool {
        matches!(self, MaybeReactive::Reactive(_))
    }
}

impl<T> Clone for MaybeReactive<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            MaybeReactive::Plain(value) => MaybeReactive::Plain(value.clone()),
            MaybeReactive::Reactive(value) => MaybeReactive::Reactive(value.clone()),
        }
    }
}

struct MutableValueInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<ValueHandler<T>>>,
}

/// Shared mutable cell that notifies subscribers when its value changes.
pub struct MutableValue<T> {
    inner: Rc<MutableValueInner<T>>,
}

impl<T> Clone for MutableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> MutableValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(MutableValueInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn get_value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Stores `value` and notifies subscribers if it differs from the
    /// current one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value.clone();
        }
        let subscribers = self.inner.subscribers.borrow().clone();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn observable(&self) -> Rc<dyn Observable<T>> {
        Rc::new(self.clone())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> for MutableValue<T> {
    fn get(&self) -> Result<T, ValueError> {
        Ok(self.get_value())
    }

    fn subscribe(&self, handler: &ValueHandler<T>) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        if !subscribers.iter().any(|existing| same_handler(existing, handler)) {
            subscribers.push(handler.clone());
        }
    }

    fn unsubscribe(&self, handler: &ValueHandler<T>) {
        self.inner
            .subscribers
            .borrow_mut()
            .retain(|existing| !same_handler(existing, handler));
    }
}

impl<T: Clone + PartialEq + 'static> From<MutableValue<T>> for MaybeReactive<T> {
    fn from(value: MutableValue<T>) -> Self {
        MaybeReactive::Reactive(value.observable())
    }
}

impl<T: Clone + PartialEq + 'static> From<&MutableValue<T>> for MaybeReactive<T> {
    fn from(value: &MutableValue<T>) -> Self {
        MaybeReactive::Reactive(value.observable())
    }
}

impl<T: fmt::Debug + Clone + PartialEq + 'static> fmt::Debug for MutableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableValue")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
