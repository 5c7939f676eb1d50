//! Single-threaded cooperative scheduler.
//!
//! Every asynchronous step in this system - lifecycle reaction drains,
//! coalesced renders, engine batch completion, serialization retries - is a
//! task on one logical event loop. "Suspending" means registering a
//! continuation here; nothing ever blocks.
//!
//! Timers run on virtual time: when the ready queue drains, the clock jumps
//! to the earliest deadline. That keeps retry-delay behavior fully
//! deterministic under test.

use std::cell::RefCell;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

type Task = Box<dyn FnOnce()>;

struct TimerEntry {
    due: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; invert so the earliest deadline wins,
        // with insertion order as the tie-breaker.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopState {
    ready: VecDeque<Task>,
    timers: BinaryHeap<TimerEntry>,
    now: Duration,
    seq: u64,
}

/// Cloneable handle to the event loop.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<LoopState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(LoopState {
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                now: Duration::ZERO,
                seq: 0,
            })),
        }
    }

    /// Run `task` on the next tick.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.borrow_mut().ready.push_back(Box::new(task));
    }

    /// Run `task` once `delay` of virtual time has passed.
    pub fn defer_after(&self, delay: Duration, task: impl FnOnce() + 'static) {
        let mut state = self.inner.borrow_mut();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.timers.push(TimerEntry {
            due,
            seq,
            task: Box::new(task),
        });
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.borrow();
        state.ready.is_empty() && state.timers.is_empty()
    }

    /// Drain ready tasks, advancing virtual time into timers as the ready
    /// queue empties, until nothing is left to run.
    pub fn run_until_idle(&self) {
        loop {
            let task = {
                let mut state = self.inner.borrow_mut();
                if let Some(task) = state.ready.pop_front() {
                    Some(task)
                } else if let Some(entry) = state.timers.pop() {
                    state.now = state.now.max(entry.due);
                    Some(entry.task)
                } else {
                    None
                }
            };
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn ready_tasks_run_in_fifo_order() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            sched.defer(move || log.borrow_mut().push(i));
        }
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_scheduled_from_tasks_run_in_the_same_drain() {
        let sched = Scheduler::new();
        let hit = Rc::new(std::cell::Cell::new(false));
        {
            let sched2 = sched.clone();
            let hit = Rc::clone(&hit);
            sched.defer(move || {
                let hit = Rc::clone(&hit);
                sched2.defer(move || hit.set(true));
            });
        }
        sched.run_until_idle();
        assert!(hit.get());
    }

    #[test]
    fn timers_fire_in_deadline_order_on_virtual_time() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            sched.defer_after(Duration::from_millis(20), move || {
                log.borrow_mut().push("late")
            });
        }
        {
            let log = Rc::clone(&log);
            sched.defer_after(Duration::from_millis(5), move || {
                log.borrow_mut().push("early")
            });
        }
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert_eq!(sched.now(), Duration::from_millis(20));
    }

    #[test]
    fn ready_tasks_run_before_due_timers() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            sched.defer_after(Duration::ZERO, move || log.borrow_mut().push("timer"));
        }
        {
            let log = Rc::clone(&log);
            sched.defer(move || log.borrow_mut().push("tick"));
        }
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["tick", "timer"]);
    }
}
