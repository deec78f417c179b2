//! Interposition layer.
//!
//! Allocation and object lifecycle events are process-wide, so they are
//! counted by a [`HookRegistry`] holding one [`HookState`] per
//! [`EventSource`]. Events reach a registry through an [`EventSink`]: the
//! global allocator shim in [`alloc`] and the [`Tracked`] handle in
//! [`lifecycle`] are generic over their sink, and a binary picks
//! [`Counting`] or [`Passthrough`] at startup.
//!
//! Counters are plain atomics updated with relaxed ordering. Only the final
//! totals matter, the order of two increments never does. The only stronger
//! ordering is the in-flight gate that lets [`HookState::uninstall`] wait for
//! increments already past the `active` check.

pub mod alloc;
pub mod lifecycle;

pub use alloc::{CountingAllocator, InterposingAllocator, PassthroughAllocator};
pub use lifecycle::Tracked;

use crate::error::{BenchResult, BenchmarkError};
use crate::metric::MetricKind;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// A class of interposed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    Allocation,
    Deallocation,
    ObjectAlloc,
    Retain,
    Release,
}

impl EventSource {
    pub const COUNT: usize = 5;

    pub const ALL: [EventSource; EventSource::COUNT] = [
        EventSource::Allocation,
        EventSource::Deallocation,
        EventSource::ObjectAlloc,
        EventSource::Retain,
        EventSource::Release,
    ];

    #[inline(always)]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventSource::Allocation => "allocation",
            EventSource::Deallocation => "deallocation",
            EventSource::ObjectAlloc => "object allocation",
            EventSource::Retain => "retain",
            EventSource::Release => "release",
        };
        f.write_str(name)
    }
}

/// Counters and activation flag for one event source.
#[derive(Debug)]
pub struct HookState {
    active: AtomicBool,
    in_flight: AtomicUsize,
    events: AtomicU64,
    amount: AtomicU64,
}

impl HookState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            events: AtomicU64::new(0),
            amount: AtomicU64::new(0),
        }
    }

    /// Count one event carrying `amount` (bytes for allocations, 0 otherwise).
    ///
    /// Never allocates, never blocks, never logs.
    #[inline]
    pub fn record(&self, amount: u64) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.active.load(Ordering::SeqCst) {
            self.events.fetch_add(1, Ordering::Relaxed);
            self.amount.fetch_add(amount, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Release);
    }

    /// Activate the hook with zeroed counters.
    ///
    /// Returns `false` when the hook was already active; counters are left
    /// untouched in that case.
    pub fn install(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.reset();
        true
    }

    /// Deactivate the hook and wait until no increment is in flight.
    ///
    /// No-op when the hook is not active.
    pub fn uninstall(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }
    }

    pub fn reset(&self) {
        self.events.store(0, Ordering::Relaxed);
        self.amount.store(0, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of events counted since the last install or reset.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Sum of event amounts since the last install or reset.
    pub fn amount(&self) -> u64 {
        self.amount.load(Ordering::Relaxed)
    }
}

impl Default for HookState {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`HookState`] per [`EventSource`].
#[derive(Debug)]
pub struct HookRegistry {
    states: [HookState; EventSource::COUNT],
}

static GLOBAL_REGISTRY: HookRegistry = HookRegistry::new();

impl HookRegistry {
    pub const fn new() -> Self {
        Self {
            states: [const { HookState::new() }; EventSource::COUNT],
        }
    }

    /// The registry fed by [`Counting`] and therefore by [`CountingAllocator`].
    pub fn global() -> &'static HookRegistry {
        &GLOBAL_REGISTRY
    }

    #[inline(always)]
    pub fn state(&self, source: EventSource) -> &HookState {
        &self.states[source.index()]
    }

    #[inline(always)]
    pub fn record(&self, source: EventSource, amount: u64) {
        self.state(source).record(amount);
    }

    pub fn install(&self, source: EventSource) -> BenchResult<()> {
        if self.state(source).install() {
            Ok(())
        } else {
            Err(BenchmarkError::AlreadyInstalled(source))
        }
    }

    pub fn uninstall(&self, source: EventSource) {
        self.state(source).uninstall();
    }

    pub fn reset(&self, source: EventSource) {
        self.state(source).reset();
    }

    pub fn read(&self, source: EventSource) -> u64 {
        self.state(source).events()
    }

    pub fn read_amount(&self, source: EventSource) -> u64 {
        self.state(source).amount()
    }

    pub fn is_installed(&self, source: EventSource) -> bool {
        self.state(source).is_active()
    }

    /// Install every source `metric` is computed from.
    ///
    /// All or nothing: if one source is already active, the sources installed
    /// by this call are rolled back before the error is returned.
    pub fn install_metric(&self, metric: MetricKind) -> BenchResult<()> {
        let sources = metric.event_sources();
        for (i, source) in sources.iter().enumerate() {
            if let Err(err) = self.install(*source) {
                for installed in &sources[..i] {
                    self.uninstall(*installed);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn uninstall_metric(&self, metric: MetricKind) {
        for source in metric.event_sources() {
            self.uninstall(*source);
        }
    }

    pub fn reset_metric(&self, metric: MetricKind) {
        for source in metric.event_sources() {
            self.reset(*source);
        }
    }

    /// Current value of a hook backed metric; 0 for clock and OS metrics.
    pub fn read_metric(&self, metric: MetricKind) -> u64 {
        HookReadings::capture(self).value(metric).unwrap_or(0)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter of a registry.
///
/// Fixed-size so that taking it inside a measurement window does not allocate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReadings {
    events: [u64; EventSource::COUNT],
    amount: [u64; EventSource::COUNT],
}

impl HookReadings {
    pub fn capture(registry: &HookRegistry) -> Self {
        let mut readings = Self::default();
        for source in EventSource::ALL {
            readings.events[source.index()] = registry.read(source);
            readings.amount[source.index()] = registry.read_amount(source);
        }
        readings
    }

    pub fn events(&self, source: EventSource) -> u64 {
        self.events[source.index()]
    }

    pub fn amount(&self, source: EventSource) -> u64 {
        self.amount[source.index()]
    }

    /// Counter growth since `start`.
    pub fn since(&self, start: &HookReadings) -> HookReadings {
        let mut delta = HookReadings::default();
        for i in 0..EventSource::COUNT {
            delta.events[i] = self.events[i].saturating_sub(start.events[i]);
            delta.amount[i] = self.amount[i].saturating_sub(start.amount[i]);
        }
        delta
    }

    /// Value of a hook backed metric, `None` for clock and OS metrics.
    pub fn value(&self, metric: MetricKind) -> Option<u64> {
        use EventSource::*;
        let value = match metric {
            MetricKind::MallocCountTotal => self.events(Allocation),
            MetricKind::AllocatedBytes => self.amount(Allocation),
            MetricKind::FreeCountTotal => self.events(Deallocation),
            MetricKind::MemoryLeaked => self
                .events(Allocation)
                .saturating_sub(self.events(Deallocation)),
            MetricKind::ObjectAllocCount => self.events(ObjectAlloc),
            MetricKind::RetainCount => self.events(Retain),
            MetricKind::ReleaseCount => self.events(Release),
            MetricKind::RetainReleaseDelta => {
                let acquired = self.events(ObjectAlloc) + self.events(Retain);
                acquired.abs_diff(self.events(Release))
            }
            _ => return None,
        };
        Some(value)
    }
}

/// Install the sources of `metric` on the global registry.
pub fn install(metric: MetricKind) -> BenchResult<()> {
    HookRegistry::global().install_metric(metric)
}

/// Uninstall the sources of `metric` on the global registry. Never fails.
pub fn uninstall(metric: MetricKind) {
    HookRegistry::global().uninstall_metric(metric);
}

pub fn reset(metric: MetricKind) {
    HookRegistry::global().reset_metric(metric);
}

pub fn read(metric: MetricKind) -> u64 {
    HookRegistry::global().read_metric(metric)
}

/// Destination of interposed events.
pub trait EventSink {
    fn record(&self, source: EventSource, amount: u64);
}

/// Drops every event. Lets a binary keep the shim types with zero cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl EventSink for Passthrough {
    #[inline(always)]
    fn record(&self, _source: EventSource, _amount: u64) {}
}

/// Forwards every event to [`HookRegistry::global`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Counting;

impl EventSink for Counting {
    #[inline(always)]
    fn record(&self, source: EventSource, amount: u64) {
        GLOBAL_REGISTRY.record(source, amount);
    }
}

impl EventSink for HookRegistry {
    #[inline(always)]
    fn record(&self, source: EventSource, amount: u64) {
        HookRegistry::record(self, source, amount);
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    #[inline(always)]
    fn record(&self, source: EventSource, amount: u64) {
        (**self).record(source, amount);
    }
}
