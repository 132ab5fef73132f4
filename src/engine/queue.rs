// src/engine/queue.rs

//! Ready queue shared by the worker threads.
//!
//! Only tasks whose dependencies are satisfied are ever pushed here. Workers
//! block in [`BuildQueue::get`] until there is something they may run. The
//! build is over when every worker is waiting at the same time, or when
//! somebody called [`BuildQueue::stop`].
//!
//! Ordering:
//! - greedy tasks form a separate lane that is served first, with at most
//!   one greedy task in flight;
//! - everything else is ordered by priority path (lexicographically, highest
//!   first), ties broken by insertion order;
//! - an entry whose exclusive group is busy is passed over until the group
//!   is released.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::task::Task;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub task: Arc<Task>,
    /// Priorities of the request chain from the top-level target down to
    /// this task.
    pub priority: Vec<i64>,
    seq: u64,
}

impl QueueEntry {
    pub fn id(&self) -> &str {
        &self.task.id
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the earlier insertion.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    ready: BinaryHeap<QueueEntry>,
    greedy: VecDeque<QueueEntry>,
    busy_groups: HashSet<String>,
    greedy_running: bool,
    waiting: usize,
    finished: bool,
    rc: i32,
    seq: u64,
}

impl QueueState {
    fn group_free(&self, entry: &QueueEntry) -> bool {
        entry
            .task
            .exclusive_group
            .as_ref()
            .is_none_or(|g| !self.busy_groups.contains(g))
    }

    fn claim(&mut self, entry: &QueueEntry) {
        if let Some(group) = &entry.task.exclusive_group {
            self.busy_groups.insert(group.clone());
        }
        if entry.task.greedy {
            self.greedy_running = true;
        }
    }

    fn take_runnable(&mut self) -> Option<QueueEntry> {
        if !self.greedy_running {
            if let Some(pos) = self.greedy.iter().position(|e| self.group_free(e)) {
                let entry = self.greedy.remove(pos)?;
                self.claim(&entry);
                return Some(entry);
            }
        }

        let mut passed_over = Vec::new();
        let mut found = None;
        while let Some(entry) = self.ready.pop() {
            if self.group_free(&entry) {
                found = Some(entry);
                break;
            }
            passed_over.push(entry);
        }
        self.ready.extend(passed_over);

        if let Some(entry) = &found {
            self.claim(entry);
        }
        found
    }
}

/// Blocking multi-producer, multi-consumer ready queue.
#[derive(Debug)]
pub struct BuildQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    workers: usize,
}

impl BuildQueue {
    pub fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            cond: Condvar::new(),
            workers: workers.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a ready task.
    pub fn add(&self, task: Arc<Task>, priority: Vec<i64>) {
        let mut st = self.lock();
        if st.finished {
            trace!(task = %task.id, "queue already finished; dropping entry");
            return;
        }
        st.seq += 1;
        let entry = QueueEntry {
            task,
            priority,
            seq: st.seq,
        };
        debug!(task = %entry.id(), priority = ?entry.priority, greedy = entry.task.greedy, "task queued");
        if entry.task.greedy {
            st.greedy.push_back(entry);
        } else {
            st.ready.push(entry);
        }
        self.cond.notify_one();
    }

    /// Next task to run, or `None` once the build is over.
    ///
    /// Every entry returned must be handed back through
    /// [`done`](Self::done) after it ran.
    pub fn get(&self) -> Option<QueueEntry> {
        let mut st = self.lock();
        loop {
            if st.finished {
                return None;
            }
            if let Some(entry) = st.take_runnable() {
                return Some(entry);
            }
            st.waiting += 1;
            if st.waiting == self.workers {
                debug!("all workers idle; build queue drained");
                st.finished = true;
                st.waiting -= 1;
                self.cond.notify_all();
                return None;
            }
            st = self
                .cond
                .wait(st)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            st.waiting -= 1;
        }
    }

    /// Release the exclusive group and greedy slot held by `entry`.
    pub fn done(&self, entry: &QueueEntry) {
        let mut st = self.lock();
        if let Some(group) = &entry.task.exclusive_group {
            st.busy_groups.remove(group);
        }
        if entry.task.greedy {
            st.greedy_running = false;
        }
        self.cond.notify_all();
    }

    /// Finish the build early. The first non-zero code sticks.
    pub fn stop(&self, rc: i32) {
        let mut st = self.lock();
        if st.rc == 0 {
            st.rc = rc;
        }
        st.finished = true;
        self.cond.notify_all();
    }

    pub fn rc(&self) -> i32 {
        self.lock().rc
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Entries still queued; only meaningful once the build is over.
    pub fn pending(&self) -> usize {
        let st = self.lock();
        st.ready.len() + st.greedy.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;

    fn task(spec: TaskSpec) -> Arc<Task> {
        Arc::new(Task::from_spec(spec, None).unwrap())
    }

    #[test]
    fn higher_priority_first_then_fifo() {
        let q = BuildQueue::new(2);
        q.add(task(TaskSpec::named("low")), vec![0, 1]);
        q.add(task(TaskSpec::named("high-a")), vec![0, 5]);
        q.add(task(TaskSpec::named("high-b")), vec![0, 5]);
        q.add(task(TaskSpec::named("top")), vec![1]);

        let order: Vec<String> = (0..4)
            .map(|_| {
                let e = q.get().unwrap();
                q.done(&e);
                e.id().to_string()
            })
            .collect();
        assert_eq!(order, ["top", "high-a", "high-b", "low"]);
    }

    #[test]
    fn greedy_lane_is_served_first_one_at_a_time() {
        let q = BuildQueue::new(3);
        q.add(task(TaskSpec::named("normal")), vec![10]);
        q.add(task(TaskSpec::named("g1").greedy(true)), vec![0]);
        q.add(task(TaskSpec::named("g2").greedy(true)), vec![0]);

        let first = q.get().unwrap();
        assert_eq!(first.id(), "g1");
        let second = q.get().unwrap();
        assert_eq!(second.id(), "normal", "second greedy waits for the first");
        q.done(&first);
        assert_eq!(q.get().unwrap().id(), "g2");
    }

    #[test]
    fn busy_exclusive_group_is_skipped() {
        let q = BuildQueue::new(3);
        q.add(task(TaskSpec::named("a").exclusive("db")), vec![3]);
        q.add(task(TaskSpec::named("b").exclusive("db")), vec![2]);
        q.add(task(TaskSpec::named("c")), vec![1]);

        let a = q.get().unwrap();
        assert_eq!(a.id(), "a");
        assert_eq!(q.get().unwrap().id(), "c");
        q.done(&a);
        assert_eq!(q.get().unwrap().id(), "b");
    }

    #[test]
    fn last_idle_worker_finishes_the_queue() {
        let q = BuildQueue::new(1);
        assert!(q.get().is_none());
        assert!(q.is_finished());
        assert_eq!(q.rc(), 0);
    }

    #[test]
    fn stop_keeps_first_code_and_wakes_everyone() {
        let q = Arc::new(BuildQueue::new(3));
        let waiter = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || q.get().is_none())
        };
        q.stop(4);
        q.stop(9);
        assert!(waiter.join().unwrap());
        assert_eq!(q.rc(), 4);
        q.add(task(TaskSpec::named("late")), vec![]);
        assert_eq!(q.pending(), 0);
    }
}
