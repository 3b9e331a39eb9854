//! Module `scheduler` implement a worker pool with interference
//! classes.
//!
//! Work items are closures tagged with a monotonically increasing
//! workload id. Independent items go through a plain FIFO; classed
//! items queue up behind other items of the same class, inside a
//! red-black tree of per-class FIFO queues keyed by class id. Class
//! queues are synthesised on first use.
//!
//! Ordering: within a class, strict FIFO and never two items in
//! flight at once; a class's queue is withheld from the dispatch tree
//! while one of its items runs. Across classes there is no ordering,
//! items of different classes run in parallel freely.
//!
//! Worker shutdown is cooperative: a worker whose `run` flag is
//! cleared finishes its in-flight item and exits; nothing is ever
//! killed mid-run.

use log::{debug, info};

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;

use crate::rbt::{Tree, TreeItem};
use crate::{Error, Result};

/// Work item: boxed closure plus its workload id.
struct Workload {
    id: u64,
    func: Box<dyn FnOnce() + Send + 'static>,
}

// Per-class FIFO. Lives in the dispatch tree while runnable, moves to
// the busy map while one of its items is in flight.
struct ClassQueue {
    class_id: u64,
    items: VecDeque<Workload>,
}

impl TreeItem for ClassQueue {
    fn addr(&self) -> u64 {
        self.class_id
    }
}

fn class_cmp(a: &ClassQueue, b: &ClassQueue) -> CmpOrdering {
    a.class_id.cmp(&b.class_id)
}

struct Dispatch {
    indep: VecDeque<Workload>,
    classed: Tree<ClassQueue>,
    busy: HashMap<u64, ClassQueue>,
    work_counter: u64,
    n_queued: usize,
    n_active: usize,
    closed: bool,
}

impl Dispatch {
    fn is_idle(&self) -> bool {
        self.n_queued == 0 && self.n_active == 0
    }

    // Pop the next runnable item: independent work first, then the
    // lowest class with pending work. Popping a class parks its queue
    // in the busy map until the item completes.
    fn take_work(&mut self) -> Option<(Workload, Option<u64>)> {
        if let Some(w) = self.indep.pop_front() {
            self.n_queued -= 1;
            return Some((w, None));
        }

        let mut queue = self.classed.pop_first()?;
        let w = queue.items.pop_front().unwrap();
        debug_assert!(queue.items.front().map_or(true, |next| next.id > w.id));
        self.n_queued -= 1;
        let class_id = queue.class_id;
        self.busy.insert(class_id, queue);
        Some((w, Some(class_id)))
    }
}

struct Inner {
    name: String,
    dispatch: Mutex<Dispatch>,
    work_cond: Condvar,
    done_cond: Condvar,
    n_complete: AtomicU64,
}

struct Worker {
    handle: thread::JoinHandle<()>,
    run: Arc<AtomicBool>,
}

/// Worker pool dispatching independent and interference-class-grouped
/// work across threads.
///
/// `num_cpus::get()` is the usual thread count for callers without a
/// better number.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<Worker>>,
    worker_serial: AtomicU64,
}

impl Scheduler {
    /// Spawn a scheduler with `num_threads` workers.
    pub fn new(name: &str, num_threads: usize) -> Scheduler {
        let inner = Arc::new(Inner {
            name: name.to_string(),
            dispatch: Mutex::new(Dispatch {
                indep: VecDeque::default(),
                classed: Tree::new(true /*drop_duplicates*/),
                busy: HashMap::default(),
                work_counter: 0,
                n_queued: 0,
                n_active: 0,
                closed: false,
            }),
            work_cond: Condvar::new(),
            done_cond: Condvar::new(),
            n_complete: AtomicU64::new(0),
        });

        let scheduler = Scheduler {
            inner,
            workers: Mutex::new(Vec::default()),
            worker_serial: AtomicU64::new(0),
        };
        scheduler.update_num_threads(num_threads);
        scheduler
    }

    /// Spawn a scheduler with one worker per hardware thread.
    pub fn new_default(name: &str) -> Scheduler {
        Scheduler::new(name, num_cpus::get())
    }

    /// Enqueue an independent work item, returning its workload id.
    pub fn add_work<F>(&self, func: F) -> Result<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut d = self.inner.dispatch.lock().unwrap();
        if d.closed {
            return err_at!(Closed, msg: "scheduler {:?}", self.inner.name);
        }

        let id = d.work_counter;
        d.work_counter += 1;
        d.indep.push_back(Workload {
            id,
            func: Box::new(func),
        });
        d.n_queued += 1;

        self.inner.work_cond.notify_one();
        Ok(id)
    }

    /// Enqueue an independent work item whose result is wanted back.
    /// The value arrives on the returned channel when the item
    /// completes.
    pub fn add_work_ret<F, T>(&self, func: F) -> Result<(u64, mpsc::Receiver<T>)>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let id = self.add_work(move || {
            tx.send(func()).ok();
        })?;
        Ok((id, rx))
    }

    /// Enqueue a work item behind every earlier item of the same
    /// class, returning its workload id.
    pub fn add_work_class<F>(&self, class_id: u64, func: F) -> Result<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut d = self.inner.dispatch.lock().unwrap();
        if d.closed {
            return err_at!(Closed, msg: "scheduler {:?}", self.inner.name);
        }

        let id = d.work_counter;
        d.work_counter += 1;
        let work = Workload {
            id,
            func: Box::new(func),
        };

        if let Some(queue) = d.busy.get_mut(&class_id) {
            // The class has an item in flight, queue up behind it.
            queue.items.push_back(work);
        } else {
            let probe = |q: &ClassQueue| class_id.cmp(&q.class_id);
            let mut queue = match d.classed.remove(&probe, None) {
                Some(queue) => queue,
                None => ClassQueue {
                    class_id,
                    items: VecDeque::default(),
                },
            };
            queue.items.push_back(work);
            d.classed.insert(queue, &class_cmp, None);
        }
        d.n_queued += 1;

        self.inner.work_cond.notify_one();
        Ok(id)
    }

    /// Grow by spawning, shrink by clearing worker run-flags, waking
    /// every waiter and joining the stopped workers. Blocks until the
    /// requested count is reached, and returns it.
    pub fn update_num_threads(&self, num_threads: usize) -> usize {
        let mut workers = self.workers.lock().unwrap();

        while workers.len() < num_threads {
            let serial = self.worker_serial.fetch_add(1, SeqCst);
            let run = Arc::new(AtomicBool::new(true));
            let inner = Arc::clone(&self.inner);
            let flag = Arc::clone(&run);
            let name = format!("{}-worker-{}", self.inner.name, serial);
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(inner, flag))
                .expect("spawn worker");
            workers.push(Worker { handle, run });
        }

        if workers.len() > num_threads {
            let stopped: Vec<Worker> = workers.drain(num_threads..).collect();
            for w in stopped.iter() {
                w.run.store(false, SeqCst);
            }
            // Wake everyone so the stopping workers notice their flag;
            // the rest go straight back to waiting.
            self.inner.work_cond.notify_all();
            for w in stopped {
                w.handle.join().ok();
            }
        }

        debug!(
            target: "odb",
            "scheduler {:?} running {} threads", self.inner.name, workers.len()
        );

        workers.len()
    }

    /// Block until the queues are drained and every worker is idle.
    pub fn block_until_done(&self) {
        let mut d = self.inner.dispatch.lock().unwrap();
        while !d.is_idle() {
            d = self.inner.done_cond.wait(d).unwrap();
        }
    }

    /// Number of work items completed over this scheduler's lifetime.
    pub fn num_complete(&self) -> u64 {
        self.inner.n_complete.load(SeqCst)
    }

    /// Number of work items waiting to run.
    pub fn len_queued(&self) -> usize {
        self.inner.dispatch.lock().unwrap().n_queued
    }

    pub fn num_threads(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Reject further work, drain what is queued and stop every
    /// worker.
    pub fn close(&self) {
        {
            let mut d = self.inner.dispatch.lock().unwrap();
            if d.closed {
                return;
            }
            d.closed = true;
        }
        if self.num_threads() > 0 {
            self.block_until_done();
        }
        self.update_num_threads(0);
        info!(
            target: "odb",
            "scheduler {:?} closed after {} items", self.inner.name, self.num_complete()
        );
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(inner: Arc<Inner>, run: Arc<AtomicBool>) {
    loop {
        let mut d = inner.dispatch.lock().unwrap();
        let (work, class) = loop {
            if !run.load(SeqCst) {
                return;
            }
            match d.take_work() {
                Some(wc) => break wc,
                None => d = inner.work_cond.wait(d).unwrap(),
            }
        };
        d.n_active += 1;
        drop(d);

        (work.func)();
        inner.n_complete.fetch_add(1, SeqCst);

        let mut d = inner.dispatch.lock().unwrap();
        d.n_active -= 1;
        if let Some(class_id) = class {
            if let Some(queue) = d.busy.remove(&class_id) {
                if !queue.items.is_empty() {
                    d.classed.insert(queue, &class_cmp, None);
                    inner.work_cond.notify_one();
                }
            }
        }
        if d.is_idle() {
            inner.done_cond.notify_all();
        }
    }
}
