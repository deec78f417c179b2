//! Reference-count lifecycle events.
//!
//! [`Tracked`] is a shared-ownership handle: creating one reports an
//! `ObjectAlloc`, cloning reports a `Retain` and dropping reports a `Release`.
//! Workloads that want lifecycle metrics use it in place of `Arc`.

use super::{Counting, EventSink, EventSource};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub struct Tracked<T, S: EventSink = Counting> {
    inner: Arc<T>,
    sink: S,
}

impl<T> Tracked<T, Counting> {
    pub fn new(value: T) -> Self {
        Self::with_sink(value, Counting)
    }
}

impl<T, S: EventSink> Tracked<T, S> {
    pub fn with_sink(value: T, sink: S) -> Self {
        sink.record(EventSource::ObjectAlloc, 0);
        Self {
            inner: Arc::new(value),
            sink,
        }
    }

    /// Number of live handles to the value.
    pub fn handle_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T, S: EventSink + Clone> Clone for Tracked<T, S> {
    fn clone(&self) -> Self {
        self.sink.record(EventSource::Retain, 0);
        Self {
            inner: Arc::clone(&self.inner),
            sink: self.sink.clone(),
        }
    }
}

impl<T, S: EventSink> Drop for Tracked<T, S> {
    fn drop(&mut self) {
        self.sink.record(EventSource::Release, 0);
    }
}

impl<T, S: EventSink> Deref for Tracked<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug, S: EventSink> fmt::Debug for Tracked<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&*self.inner).finish()
    }
}
