//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph for the current thread, runs
//! effects inside tracking brackets, and propagates writes.
//!
//! # How It Works
//!
//! 1. Reading a source inside a running effect calls [`Runtime::track`],
//!    which confirms the effect in the source's dependency set.
//!
//! 2. Writing a source calls [`Runtime::trigger`], which walks the
//!    dependency set and raises each subscriber's dirty level:
//!    a. Direct subscribers of a signal become `Dirty`
//!    b. A computed's internal effect forwards a `MaybeDirty` to its own
//!       subscribers instead of recomputing
//!    c. User effects get their scheduler queued
//!
//! 3. The queue drains when the outermost notification finishes. The
//!    default job re-validates the effect and re-runs it only if one of its
//!    inputs really changed.
//!
//! # Borrowing
//!
//! The graph sits behind a `RefCell`. Every entry point borrows it for a
//! single bookkeeping step and releases it before calling user code, so
//! effects, computeds and schedulers may freely re-enter the runtime.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::{ReactiveContext, TrackingGuard};
use super::debug::{DebugOp, DebuggerEvent};
use super::subscriber::{ScheduledJob, Subscriber};
use crate::graph::{
    DependencyGraph, DirtyLevel, EffectId, EffectNode, GraphStats, SourceId, SourceNode,
};

/// Per-thread engine state.
struct RuntimeState {
    graph: RefCell<DependencyGraph>,

    /// Callbacks for every live effect, keyed like the graph's effect nodes.
    subscribers: RefCell<HashMap<EffectId, Rc<Subscriber>>>,

    /// Depth of nested scheduling pauses. Jobs drain when it returns to 0.
    pause_depth: Cell<u32>,

    queue: RefCell<VecDeque<ScheduledJob>>,
    queued: RefCell<HashSet<EffectId>>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: RefCell::new(DependencyGraph::new()),
            subscribers: RefCell::new(HashMap::new()),
            pause_depth: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
            queued: RefCell::new(HashSet::new()),
        }
    }

    fn subscriber(&self, id: EffectId) -> Option<Rc<Subscriber>> {
        self.subscribers.borrow().get(&id).cloned()
    }
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::new();
}

/// Outcome of the first step of validation.
enum Validation {
    Settled(bool),
    Scan {
        deps: Vec<SourceId>,
        before: DirtyLevel,
    },
}

/// The thread-local reactive runtime.
///
/// All methods are associated functions operating on the current thread's
/// graph; reactive values are not shared across threads.
pub struct Runtime;

impl Runtime {
    fn with<R>(f: impl FnOnce(&RuntimeState) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but tolerates thread teardown. Used from
    /// `Drop` impls.
    fn try_with<R>(f: impl FnOnce(&RuntimeState) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub(crate) fn add_source(id: SourceId, node: SourceNode) {
        Self::with(|rt| rt.graph.borrow_mut().add_source(id, node));
    }

    pub(crate) fn remove_source(id: SourceId) {
        Self::try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                graph.remove_source(id);
            }
        });
    }

    pub(crate) fn add_effect(id: EffectId, node: EffectNode, subscriber: Subscriber) {
        Self::with(|rt| {
            rt.graph.borrow_mut().add_effect(id, node);
            rt.subscribers.borrow_mut().insert(id, Rc::new(subscriber));
        });
    }

    /// Whether the effect exists and has not been stopped.
    pub fn is_active(id: EffectId) -> bool {
        Self::with(|rt| rt.graph.borrow().effect(id).is_some())
    }

    /// Raw dirty level of an effect, `None` once it is stopped.
    pub fn dirty_level(id: EffectId) -> Option<DirtyLevel> {
        Self::with(|rt| rt.graph.borrow().level(id))
    }

    pub(crate) fn set_dirty_level(id: EffectId, level: DirtyLevel) {
        Self::with(|rt| rt.graph.borrow_mut().set_level(id, level));
    }

    /// Number of sources the effect read during its last run.
    pub fn dependency_count(id: EffectId) -> usize {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .effect(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    /// Sources the effect read during its last run, in read order.
    pub fn dependencies(id: EffectId) -> Vec<SourceId> {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .effect(id)
                .map(|node| node.dependencies().to_vec())
                .unwrap_or_default()
        })
    }

    /// Number of entries in a source's dependency set.
    pub fn subscriber_count(source: SourceId) -> usize {
        Self::with(|rt| rt.graph.borrow().subscriber_count(source))
    }

    /// Whether the effect is a confirmed subscriber of the source.
    pub fn is_subscribed(effect: EffectId, source: SourceId) -> bool {
        Self::with(|rt| rt.graph.borrow().is_tracking(effect, source))
    }

    /// Graph-wide counters for the current thread.
    pub fn stats() -> GraphStats {
        Self::with(|rt| rt.graph.borrow().stats())
    }

    // ------------------------------------------------------------------
    // Track / Notify
    // ------------------------------------------------------------------

    /// Record that the running effect (if any) read `source`.
    pub fn track(source: SourceId) {
        let Some(effect) = ReactiveContext::tracking_target() else {
            return;
        };

        let on_track = Self::with(|rt| {
            if !rt.graph.borrow_mut().track(effect, source) {
                return None;
            }
            rt.subscriber(effect)
                .and_then(|sub| sub.debug.on_track.clone())
        });

        if let Some(hook) = on_track {
            hook(&DebuggerEvent {
                effect,
                source,
                op: DebugOp::Get,
                level: None,
            });
        }
    }

    /// Propagate a change of `source` to its subscribers at `level`.
    pub fn trigger(source: SourceId, level: DirtyLevel, op: DebugOp) {
        let subscribers = Self::with(|rt| rt.graph.borrow().subscribers(source));
        if subscribers.is_empty() {
            return;
        }
        trace!(source = ?source, level = ?level, fan_out = subscribers.len(), "notify");

        let _paused = SchedulingGuard::pause();
        for (effect, _) in subscribers {
            let subscriber = Self::with(|rt| {
                if rt.graph.borrow_mut().escalate(effect, source, level) {
                    rt.subscriber(effect)
                } else {
                    None
                }
            });
            let Some(subscriber) = subscriber else {
                continue;
            };

            if let Some(hook) = &subscriber.debug.on_trigger {
                hook(&DebuggerEvent {
                    effect,
                    source,
                    op,
                    level: Some(level),
                });
            }
            Self::fire_trigger(effect, &subscriber);

            if Self::with(|rt| rt.graph.borrow_mut().settle_schedule(effect)) {
                if let Some(job) = subscriber.job() {
                    Self::enqueue(job);
                }
            }
        }
    }

    /// Invoke an effect's trigger. A computed's internal effect forwards the
    /// notification to the computed's own subscribers as a "maybe".
    fn fire_trigger(effect: EffectId, subscriber: &Subscriber) {
        let forward = Self::with(|rt| {
            rt.graph
                .borrow()
                .effect(effect)
                .and_then(|node| node.publishes.map(|source| (source, node.level)))
        });

        if let Some((source, level)) = forward {
            let next = if level == DirtyLevel::MaybeDirtySideEffect {
                DirtyLevel::MaybeDirtySideEffect
            } else {
                DirtyLevel::MaybeDirty
            };
            Self::trigger(source, next, DebugOp::Invalidate);
        }

        if let Some(trigger) = &subscriber.trigger {
            trigger();
        }
    }

    // ------------------------------------------------------------------
    // Running and validation
    // ------------------------------------------------------------------

    /// Run `f` as effect `id`'s computation.
    ///
    /// Reads made by `f` become the effect's dependencies, replacing those
    /// of the previous run. A stopped effect runs `f` with no tracking.
    pub(crate) fn run_effect<R>(id: EffectId, f: impl FnOnce() -> R) -> R {
        let active = Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            match graph.effect_mut(id) {
                Some(node) => {
                    node.level = DirtyLevel::Clean;
                    node.runnings += 1;
                    true
                }
                None => false,
            }
        });
        if !active {
            return f();
        }

        let _run = RunGuard::begin(id);
        f()
    }

    /// Decide whether an effect really needs to re-run.
    ///
    /// `Dirty` answers yes immediately. For the "maybe" levels, every
    /// computed among the effect's dependencies is brought up to date in
    /// read order; a computed whose value changed escalates this effect to
    /// `Dirty` and stops the scan. If nothing escalated it, the effect is
    /// `Clean` again.
    ///
    /// An effect already being validated (`Querying`) answers no, which
    /// breaks cycles.
    pub fn is_dirty(id: EffectId) -> bool {
        let validation = Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            let Some(node) = graph.effect_mut(id) else {
                return Validation::Settled(false);
            };
            match node.level {
                level if level.is_maybe() => {
                    node.level = DirtyLevel::Querying;
                    Validation::Scan {
                        deps: node.dependencies().to_vec(),
                        before: level,
                    }
                }
                DirtyLevel::Querying => {
                    #[cfg(debug_assertions)]
                    debug!(effect = ?id, "validation re-entered itself; treating as clean");
                    Validation::Settled(false)
                }
                level => Validation::Settled(level >= DirtyLevel::Dirty),
            }
        });

        let (deps, before) = match validation {
            Validation::Settled(dirty) => return dirty,
            Validation::Scan { deps, before } => (deps, before),
        };

        let _restore = ValidationGuard { id, before };
        let _untracked = TrackingGuard::paused();
        for source in deps {
            let computed = Self::with(|rt| {
                rt.graph
                    .borrow()
                    .source(source)
                    .and_then(|node| node.computed.clone())
            });
            let Some(computed) = computed.and_then(|weak| weak.upgrade()) else {
                continue;
            };

            computed.evaluate();
            if Self::dirty_level(id) >= Some(DirtyLevel::Dirty) {
                break;
            }
        }

        // Only an untouched level is settled. A "maybe" raised mid-scan
        // belongs to a computed that was invalidated after it was checked.
        Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            if graph.level(id) == Some(DirtyLevel::Querying) {
                graph.set_level(id, DirtyLevel::Clean);
            }
            graph
                .level(id)
                .is_some_and(|level| level >= DirtyLevel::Dirty)
        })
    }

    /// Stop an effect: drop all of its dependencies, forget its callbacks
    /// and fire its `on_stop` hook. Stopping twice is a no-op.
    pub fn stop_effect(id: EffectId) {
        let subscriber = Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            graph.effect(id)?;
            graph.detach(id);
            graph.remove_effect(id);
            drop(graph);
            rt.subscribers.borrow_mut().remove(&id)
        });
        let Some(subscriber) = subscriber else {
            return;
        };

        debug!(effect = ?id, "effect stopped");
        if let Some(on_stop) = subscriber.take_on_stop() {
            on_stop();
        }
    }

    /// Remove an effect from the graph without firing hooks. Used by
    /// destructors, so it tolerates thread teardown.
    pub(crate) fn discard_effect(id: EffectId) {
        let subscriber = Self::try_with(|rt| {
            let mut graph = rt.graph.try_borrow_mut().ok()?;
            graph.detach(id);
            graph.remove_effect(id);
            drop(graph);
            rt.subscribers.try_borrow_mut().ok()?.remove(&id)
        })
        .flatten();
        drop(subscriber);
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    fn enqueue(job: ScheduledJob) {
        Self::with(|rt| {
            if rt.queued.borrow_mut().insert(job.effect_id()) {
                rt.queue.borrow_mut().push_back(job);
            }
        });
    }

    /// Defer queued scheduler jobs until the matching
    /// [`Runtime::reset_scheduling`].
    pub fn pause_scheduling() {
        Self::with(|rt| rt.pause_depth.set(rt.pause_depth.get() + 1));
    }

    /// Leave one scheduling pause. When the outermost pause ends, queued
    /// jobs run in FIFO order, including jobs queued while draining.
    pub fn reset_scheduling() {
        let depth = Self::with(|rt| {
            let depth = rt.pause_depth.get().saturating_sub(1);
            rt.pause_depth.set(depth);
            depth
        });
        if depth == 0 {
            Self::drain();
        }
    }

    fn drain() {
        loop {
            let job = Self::with(|rt| {
                if rt.pause_depth.get() != 0 {
                    return None;
                }
                let job = rt.queue.borrow_mut().pop_front()?;
                rt.queued.borrow_mut().remove(&job.effect_id());
                Some(job)
            });
            let Some(job) = job else {
                break;
            };

            if Self::is_active(job.effect_id()) {
                trace!(effect = ?job.effect_id(), "running scheduled job");
                job.fire();
            }
        }
    }

    /// Number of jobs waiting for the scheduling pause to end.
    pub fn pending_jobs() -> usize {
        Self::with(|rt| rt.queue.borrow().len())
    }
}

/// Runs the pre-run half of cleanup and enters the reactive context; the
/// post-run half runs on drop, including when the computation panics.
struct RunGuard {
    id: EffectId,
    _context: ReactiveContext,
}

impl RunGuard {
    fn begin(id: EffectId) -> Self {
        Runtime::with(|rt| rt.graph.borrow_mut().pre_cleanup(id));
        Self {
            id,
            _context: ReactiveContext::enter(id),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let id = self.id;
        Runtime::try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                graph.post_cleanup(id);
                if let Some(node) = graph.effect_mut(id) {
                    node.runnings = node.runnings.saturating_sub(1);
                }
            }
        });
    }
}

/// Puts the pre-validation level back if a computed panics mid-scan, so
/// the next read retries validation instead of seeing `Querying`.
struct ValidationGuard {
    id: EffectId,
    before: DirtyLevel,
}

impl Drop for ValidationGuard {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let (id, before) = (self.id, self.before);
        Runtime::try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                if graph.level(id) == Some(DirtyLevel::Querying) {
                    graph.set_level(id, before);
                }
            }
        });
    }
}

/// Scheduling pause that ends on drop. Queued jobs are not drained while
/// unwinding.
pub(crate) struct SchedulingGuard(());

impl SchedulingGuard {
    pub(crate) fn pause() -> Self {
        Runtime::pause_scheduling();
        Self(())
    }
}

impl Drop for SchedulingGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            Runtime::try_with(|rt| rt.pause_depth.set(rt.pause_depth.get().saturating_sub(1)));
        } else {
            Runtime::reset_scheduling();
        }
    }
}

/// Defer scheduler jobs until the matching [`reset_scheduling`].
pub fn pause_scheduling() {
    Runtime::pause_scheduling();
}

/// End one scheduling pause, draining the queue if it was the outermost.
pub fn reset_scheduling() {
    Runtime::reset_scheduling();
}

/// Run `f` with scheduling paused: effects notified by writes inside `f`
/// run once, after `f` returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _paused = SchedulingGuard::pause();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::EffectRef;
    use crate::reactive::subscriber::Runnable;

    struct CountingRunner {
        id: EffectId,
        runs: Cell<u32>,
    }

    impl Runnable for CountingRunner {
        fn id(&self) -> EffectId {
            self.id
        }

        fn run_erased(&self) {
            Runtime::run_effect(self.id, || self.runs.set(self.runs.get() + 1));
        }
    }

    fn register_runner() -> Rc<CountingRunner> {
        let id = EffectId::new();
        let runner = Rc::new(CountingRunner {
            id,
            runs: Cell::new(0),
        });
        Runtime::add_effect(
            id,
            EffectNode::new(false, None),
            Subscriber {
                runner: Some(EffectRef::new(runner.clone())),
                ..Subscriber::default()
            },
        );
        runner
    }

    #[test]
    fn track_outside_effect_is_noop() {
        let source = SourceId::new();
        Runtime::add_source(source, SourceNode::signal());

        Runtime::track(source);
        assert_eq!(Runtime::subscriber_count(source), 0);
    }

    #[test]
    fn run_effect_records_reads() {
        let source = SourceId::new();
        Runtime::add_source(source, SourceNode::signal());
        let runner = register_runner();

        Runtime::run_effect(runner.id, || {
            Runtime::track(source);
            Runtime::track(source);
        });

        assert_eq!(Runtime::subscriber_count(source), 1);
        assert_eq!(Runtime::dependencies(runner.id), vec![source]);
        assert_eq!(Runtime::dirty_level(runner.id), Some(DirtyLevel::Clean));
    }

    #[test]
    fn trigger_queues_and_runs_dirty_effect() {
        let source = SourceId::new();
        Runtime::add_source(source, SourceNode::signal());
        let runner = register_runner();

        Runtime::run_effect(runner.id, || Runtime::track(source));
        assert_eq!(runner.runs.get(), 0);
        Runtime::trigger(source, DirtyLevel::Dirty, DebugOp::Set);

        // The default job validates, finds Dirty, and re-runs.
        assert_eq!(runner.runs.get(), 1);
        assert_eq!(Runtime::dependency_count(runner.id), 0);
        assert_eq!(Runtime::pending_jobs(), 0);
    }

    #[test]
    fn paused_scheduling_defers_jobs() {
        let source = SourceId::new();
        Runtime::add_source(source, SourceNode::signal());
        let runner = register_runner();
        Runtime::run_effect(runner.id, || Runtime::track(source));

        pause_scheduling();
        Runtime::trigger(source, DirtyLevel::Dirty, DebugOp::Set);
        Runtime::trigger(source, DirtyLevel::Dirty, DebugOp::Set);
        assert_eq!(Runtime::pending_jobs(), 1);

        reset_scheduling();
        assert_eq!(Runtime::pending_jobs(), 0);
    }

    #[test]
    fn stopped_effect_is_forgotten() {
        let source = SourceId::new();
        Runtime::add_source(source, SourceNode::signal());
        let runner = register_runner();
        Runtime::run_effect(runner.id, || Runtime::track(source));

        Runtime::stop_effect(runner.id);
        Runtime::stop_effect(runner.id);

        assert!(!Runtime::is_active(runner.id));
        assert_eq!(Runtime::subscriber_count(source), 0);
        assert!(!Runtime::is_dirty(runner.id));
    }
}
