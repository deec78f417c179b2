//! Allocator shim.
//!
//! ```ignore
//! use benchmeter_core::hooks::CountingAllocator;
//!
//! #[global_allocator]
//! static ALLOC: CountingAllocator = CountingAllocator::counting();
//! ```

use super::{Counting, EventSink, EventSource, Passthrough};
use std::alloc::{GlobalAlloc, Layout, System};

/// `GlobalAlloc` that delegates to `A` and reports every successful
/// allocation and deallocation to `S`.
#[derive(Debug, Default)]
pub struct InterposingAllocator<A = System, S = Counting> {
    inner: A,
    sink: S,
}

/// Counts into the global hook registry.
pub type CountingAllocator = InterposingAllocator<System, Counting>;

/// Same shape, no counting.
pub type PassthroughAllocator = InterposingAllocator<System, Passthrough>;

impl CountingAllocator {
    pub const fn counting() -> Self {
        Self::new(System, Counting)
    }
}

impl PassthroughAllocator {
    pub const fn passthrough() -> Self {
        Self::new(System, Passthrough)
    }
}

impl<A, S> InterposingAllocator<A, S> {
    pub const fn new(inner: A, sink: S) -> Self {
        Self { inner, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

unsafe impl<A: GlobalAlloc, S: EventSink + Sync> GlobalAlloc for InterposingAllocator<A, S> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            self.sink.record(EventSource::Allocation, layout.size() as u64);
        }
        ptr
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.sink.record(EventSource::Allocation, layout.size() as u64);
        }
        ptr
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        self.sink.record(EventSource::Deallocation, layout.size() as u64);
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        // A failed realloc leaves the old block in place
        if !new_ptr.is_null() {
            self.sink.record(EventSource::Allocation, new_size as u64);
            self.sink.record(EventSource::Deallocation, layout.size() as u64);
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;

    static REGISTRY: HookRegistry = HookRegistry::new();

    fn local_allocator() -> InterposingAllocator<System, &'static HookRegistry> {
        InterposingAllocator::new(System, &REGISTRY)
    }

    #[test]
    fn allocator_reports_alloc_realloc_and_dealloc() {
        let allocator = local_allocator();
        REGISTRY.install(EventSource::Allocation).unwrap();
        REGISTRY.install(EventSource::Deallocation).unwrap();

        let layout = Layout::from_size_align(32, 8).unwrap();
        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            let grown = allocator.realloc(ptr, layout, 128);
            assert!(!grown.is_null());
            let grown_layout = Layout::from_size_align(128, 8).unwrap();
            allocator.dealloc(grown, grown_layout);

            let zeroed = allocator.alloc_zeroed(layout);
            assert!(!zeroed.is_null());
            assert_eq!(*zeroed, 0);
            allocator.dealloc(zeroed, layout);
        }

        REGISTRY.uninstall(EventSource::Allocation);
        REGISTRY.uninstall(EventSource::Deallocation);

        assert_eq!(REGISTRY.read(EventSource::Allocation), 3);
        assert_eq!(REGISTRY.read_amount(EventSource::Allocation), 32 + 128 + 32);
        assert_eq!(REGISTRY.read(EventSource::Deallocation), 3);
        assert_eq!(REGISTRY.read_amount(EventSource::Deallocation), 32 + 128 + 32);
    }

    #[test]
    fn passthrough_allocator_behaves_like_system() {
        let allocator = PassthroughAllocator::passthrough();
        let layout = Layout::from_size_align(16, 4).unwrap();
        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            ptr.write_bytes(0xAB, 16);
            assert_eq!(*ptr.add(15), 0xAB);
            allocator.dealloc(ptr, layout);
        }
    }
}
