//! Module `store` implement the datastore, owner of record bytes.
//!
//! A datastore hands out stable [Rec] handles, keeps every attached
//! index consistent on add, and reclaims storage through a two phase
//! mark-and-compact sweep: [DataStore::remove_sweep] collects the
//! records to prune and the relocations that will fill their slots,
//! [DataStore::remove_cleanup] compacts, archives the pruned records
//! and notifies every attached index.

use log::{debug, info};

use std::mem;
use std::sync::{mpsc, Arc, Mutex, Weak};
use std::time;

use crate::archive::AppendOnlyFile;
use crate::db::{Addr, Comparator, Condition, Merger, Rec};
use crate::index::{Index, ListIndex, RbtIndex};
use crate::scheduler::Scheduler;
use crate::util::{thread, Spinlock, Thread};
use crate::{Error, Result};

mod config;

pub use config::{Config, Mode};

/// Length function for variable-length stores, called exactly once per
/// add to size the retained record.
pub type LenFn = Box<dyn Fn(&[u8]) -> usize + Send + Sync>;

/// Output of [DataStore::remove_sweep]: the records the sweep decided
/// to prune, the tail records that will relocate into the freed slots
/// during [DataStore::remove_cleanup], and the records removed through
/// [DataStore::remove_addr] since the last sweep, whose index entries
/// are dropped alongside the pruned ones.
pub struct Markset {
    /// Pruned records, in ascending address order.
    pub pruned: Vec<Rec>,
    /// `(old-handle, new-address)` relocation pairs, banked stores only.
    pub moved: Vec<(Rec, Addr)>,
    /// Handles removed ahead of this sweep; their storage is already
    /// reclaimed, only indexes still hold them.
    pub removed: Vec<Rec>,
}

impl Markset {
    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty() && self.moved.is_empty() && self.removed.is_empty()
    }
}

enum Slots {
    Bank {
        banks: Vec<Vec<Option<Rec>>>,
        pos_a: usize, // current bank
        pos_b: usize, // next slot within the current bank
        free: Vec<Addr>,
    },
    List {
        nodes: Vec<Option<Rec>>,
        deleted: Vec<bool>,
    },
}

struct Inner {
    slots: Slots,
    data_count: usize,
    // handles removed through remove_addr, awaiting index removal at
    // the next sweep
    pending: Vec<Rec>,
}

impl Inner {
    fn new(mode: Mode) -> Inner {
        let slots = if mode.is_banked() {
            Slots::Bank {
                banks: Vec::default(),
                pos_a: 0,
                pos_b: 0,
                free: Vec::default(),
            }
        } else {
            Slots::List {
                nodes: Vec::default(),
                deleted: Vec::default(),
            }
        };
        Inner {
            slots,
            data_count: 0,
            pending: Vec::default(),
        }
    }

    fn alloc_slot(&mut self, cap: usize) -> Addr {
        match &mut self.slots {
            Slots::Bank {
                banks,
                pos_a,
                pos_b,
                free,
            } => {
                if let Some(addr) = free.pop() {
                    return addr;
                }
                if *pos_a == banks.len() {
                    banks.push(vec![None; cap]);
                }
                let addr = Addr::new((*pos_a * cap + *pos_b) as u64);
                *pos_b += 1;
                if *pos_b == cap {
                    *pos_b = 0;
                    *pos_a += 1;
                }
                addr
            }
            Slots::List { nodes, deleted } => {
                nodes.push(None);
                deleted.push(false);
                Addr::new((nodes.len() - 1) as u64)
            }
        }
    }

    fn put(&mut self, addr: Addr, rec: Rec, cap: usize) {
        match &mut self.slots {
            Slots::Bank { banks, .. } => {
                let (b, s) = addr.to_bank(cap as u64);
                banks[b][s] = Some(rec);
            }
            Slots::List { nodes, .. } => {
                nodes[addr.to_u64() as usize] = Some(rec);
            }
        }
    }

    fn get(&self, addr: Addr, cap: usize) -> Option<&Rec> {
        match &self.slots {
            Slots::Bank { banks, .. } => {
                let (b, s) = addr.to_bank(cap as u64);
                banks.get(b)?.get(s)?.as_ref()
            }
            Slots::List { nodes, deleted } => {
                let i = addr.to_u64() as usize;
                if *deleted.get(i)? {
                    None
                } else {
                    nodes.get(i)?.as_ref()
                }
            }
        }
    }

    fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(&Rec),
    {
        match &self.slots {
            Slots::Bank { banks, .. } => {
                for bank in banks.iter() {
                    for slot in bank.iter() {
                        if let Some(rec) = slot {
                            f(rec)
                        }
                    }
                }
            }
            Slots::List { nodes, deleted } => {
                for (i, slot) in nodes.iter().enumerate() {
                    if let Some(rec) = slot {
                        if !deleted[i] {
                            f(rec)
                        }
                    }
                }
            }
        }
    }
}

/// Process-local, in-memory datastore.
///
/// Concurrency: the store owns a reader-writer latch independent from
/// every index latch; locks are acquired store first, index second.
/// Once `add` returns the new handle is visible in every attached
/// index.
pub struct DataStore {
    name: String,
    mode: Mode,
    datalen: usize,
    cap: usize,
    max_records: Option<usize>,
    max_age: Option<u64>,
    prune: Option<Box<dyn Condition>>,
    len_fn: Option<LenFn>,
    epoch: time::Instant,
    archive: Option<Mutex<AppendOnlyFile>>,
    inner: Spinlock<Inner>,
    indexes: Spinlock<Registry>,
    sweeper: Mutex<Option<Thread<()>>>,
    parent: Option<Arc<DataStore>>,
}

struct Registry {
    list: Vec<Arc<dyn Index>>,
    next_ident: i64,
}

impl DataStore {
    /// Open a datastore with default collaborators. Refer to
    /// [DataStore::open_with] for the full set.
    pub fn open(name: &str, config: Config) -> Result<Arc<DataStore>> {
        DataStore::open_with(name, config, None, None, None)
    }

    /// Open a datastore.
    ///
    /// * `prune`, records satisfying the condition are removed by the
    ///   sweep, alongside any record older than `config.max_age`.
    /// * `len_fn`, sizes each add for [Mode::ListVariable] stores.
    /// * `archive`, pruned records are appended here before their
    ///   storage is reclaimed.
    ///
    /// A non-zero `config.sleep_ms` spawns a background thread driving
    /// [DataStore::sweep] at that period; it exits when the store is
    /// dropped.
    pub fn open_with(
        name: &str,
        config: Config,
        prune: Option<Box<dyn Condition>>,
        len_fn: Option<LenFn>,
        archive: Option<AppendOnlyFile>,
    ) -> Result<Arc<DataStore>> {
        if config.datalen == 0 && !matches!(config.mode, Mode::ListVariable) {
            return err_at!(InvalidInput, msg: "fixed-length store needs datalen");
        }
        if config.cap == 0 {
            return err_at!(InvalidInput, msg: "bank capacity can't be zero");
        }

        let store = Arc::new(DataStore {
            name: name.to_string(),
            mode: config.mode,
            datalen: config.datalen,
            cap: config.cap,
            max_records: config.max_records,
            max_age: config.max_age,
            prune,
            len_fn,
            epoch: time::Instant::now(),
            archive: archive.map(Mutex::new),
            inner: Spinlock::new(Inner::new(config.mode)),
            indexes: Spinlock::new(Registry {
                list: Vec::default(),
                next_ident: 0,
            }),
            sweeper: Mutex::new(None),
            parent: None,
        });

        match config.sleep_ms {
            Some(ms) if ms > 0 => {
                let th = DataStore::spawn_sweeper(&store, ms);
                *store.sweeper.lock().unwrap() = Some(th);
            }
            _ => (),
        }

        info!(target: "odb", "store {:?} opened in {:?} mode", name, config.mode);

        Ok(store)
    }

    fn spawn_sweeper(store: &Arc<DataStore>, ms: u64) -> Thread<()> {
        let w = Arc::downgrade(store);
        let name = format!("{}-sweeper", store.name);
        Thread::new(&name, move |rx: thread::Rx<()>| {
            move || sweeper_loop(w, rx, time::Duration::from_millis(ms))
        })
    }

    /// Derive an indirect child store sharing this store's payloads,
    /// typically used as a query sink. The child keeps its parent
    /// alive.
    pub fn clone_indirect(self: &Arc<DataStore>, name: &str) -> Arc<DataStore> {
        let mode = if self.mode.is_banked() {
            Mode::BankIndirect
        } else {
            Mode::ListIndirect
        };

        Arc::new(DataStore {
            name: name.to_string(),
            mode,
            datalen: self.datalen,
            cap: self.cap,
            max_records: None,
            max_age: None,
            prune: None,
            len_fn: None,
            epoch: time::Instant::now(),
            archive: None,
            inner: Spinlock::new(Inner::new(mode)),
            indexes: Spinlock::new(Registry {
                list: Vec::default(),
                next_ident: 0,
            }),
            sweeper: Mutex::new(None),
            parent: Some(Arc::clone(self)),
        })
    }

    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.read().data_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_parent(&self) -> Option<&Arc<DataStore>> {
        self.parent.as_ref()
    }
}

impl DataStore {
    /// Add a record, copying `data` into store-owned storage. The
    /// handle is published to every attached index before returning.
    ///
    /// Fails only on slot exhaustion, leaving the store unchanged.
    pub fn add(&self, data: &[u8]) -> Result<Rec> {
        let payload: Arc<[u8]> = match self.mode {
            Mode::ListVariable => {
                let n = match self.len_fn.as_ref() {
                    Some(f) => usize::min(f(data), data.len()),
                    None => data.len(),
                };
                Arc::from(&data[..n])
            }
            _ => {
                if data.len() != self.datalen {
                    return err_at!(
                        InvalidInput, msg: "record len {} != {}", data.len(), self.datalen
                    );
                }
                Arc::from(data)
            }
        };
        let ts = self.epoch.elapsed().as_secs();
        self.do_add(payload, ts)
    }

    /// Add a caller-owned payload without copying, for indirect modes.
    pub fn add_shared(&self, data: Arc<[u8]>) -> Result<Rec> {
        let ts = self.epoch.elapsed().as_secs();
        self.do_add(data, ts)
    }

    /// Sink another store's record into this one, sharing the payload
    /// and preserving its timestamp. This is the query-sink path.
    pub fn add_rec(&self, rec: &Rec) -> Result<Rec> {
        self.do_add(rec.to_payload(), rec.to_seconds())
    }

    fn do_add(&self, payload: Arc<[u8]>, ts: u64) -> Result<Rec> {
        let rec = {
            let mut inner = self.inner.write();
            if let Some(max) = self.max_records {
                if inner.data_count >= max {
                    return err_at!(StoreFull, msg: "store {:?} at {} records", self.name, max);
                }
            }
            let addr = inner.alloc_slot(self.cap);
            let rec = Rec::new(addr, payload, ts);
            inner.put(addr, rec.clone(), self.cap);
            inner.data_count += 1;
            rec
        };

        for idx in self.to_indexes() {
            idx.add(&rec);
        }

        Ok(rec)
    }

    /// Positional access by slot ordinal; `None` for holes and out of
    /// range ordinals.
    pub fn get_at(&self, n: u64) -> Option<Rec> {
        self.inner.read().get(Addr::new(n), self.cap).cloned()
    }

    /// Positional flavour of [DataStore::remove_addr]. Return false
    /// when the ordinal is a hole or out of range.
    pub fn remove_at(&self, n: u64) -> bool {
        match self.get_at(n) {
            Some(rec) => self.remove_addr(&rec),
            None => false,
        }
    }

    /// Logical removal: the slot goes on the free list, or is marked in
    /// the deletion bitmap. Indexes are not updated here, that is
    /// deferred to the sweep; the handle is queued and folded into the
    /// next sweep's markset.
    pub fn remove_addr(&self, rec: &Rec) -> bool {
        let mut inner = self.inner.write();
        let addr = rec.to_addr();

        let held = match inner.get(addr, self.cap) {
            Some(r) if r.to_addr() == addr => r.clone(),
            _ => return false,
        };

        match &mut inner.slots {
            Slots::Bank { banks, free, .. } => {
                let (b, s) = addr.to_bank(self.cap as u64);
                banks[b][s] = None;
                free.push(addr);
            }
            Slots::List { deleted, .. } => {
                deleted[addr.to_u64() as usize] = true;
            }
        }
        inner.pending.push(held);
        inner.data_count -= 1;
        true
    }

    /// Attach and synchronously populate a red-black tree index keyed
    /// by `cmp`.
    pub fn new_rbt_index(
        &self,
        name: &str,
        cmp: Arc<dyn Comparator>,
        merge: Option<Arc<dyn Merger>>,
        drop_duplicates: bool,
    ) -> Arc<RbtIndex> {
        let ident = self.next_ident();
        let idx = Arc::new(RbtIndex::new(name, ident, cmp, merge, drop_duplicates));
        self.install(Arc::clone(&idx) as Arc<dyn Index>);
        idx
    }

    /// Attach and synchronously populate a sorted linked-list index.
    pub fn new_list_index(
        &self,
        name: &str,
        cmp: Arc<dyn Comparator>,
        merge: Option<Arc<dyn Merger>>,
        drop_duplicates: bool,
    ) -> Arc<ListIndex> {
        let ident = self.next_ident();
        let idx = Arc::new(ListIndex::new(name, ident, cmp, merge, drop_duplicates));
        self.install(Arc::clone(&idx) as Arc<dyn Index>);
        idx
    }

    fn next_ident(&self) -> i64 {
        let mut reg = self.indexes.write();
        let ident = reg.next_ident;
        reg.next_ident += 1;
        ident
    }

    fn install(&self, idx: Arc<dyn Index>) {
        // Hold the store latch so adds racing with the initial
        // population cannot slip past both paths.
        let inner = self.inner.write();
        inner.for_each_live(|rec| idx.add_fast(rec));
        self.indexes.write().list.push(idx);
    }

    /// Stream every live handle into `index`'s fast-path add.
    pub fn populate(&self, index: &dyn Index) {
        let inner = self.inner.read();
        inner.for_each_live(|rec| index.add_fast(rec));
    }

    fn to_indexes(&self) -> Vec<Arc<dyn Index>> {
        self.indexes.read().list.clone()
    }
}

impl DataStore {
    fn should_prune(&self, rec: &Rec, now: u64) -> bool {
        if let Some(age) = self.max_age {
            if now.saturating_sub(rec.to_seconds()) > age {
                return true;
            }
        }
        match self.prune.as_ref() {
            Some(cond) => cond.eval(rec.as_bytes()),
            None => false,
        }
    }

    /// Mark phase: scan storage and work out which records to prune
    /// and which tail records will back-fill the freed slots; handles
    /// queued by [DataStore::remove_addr] drain into the markset here.
    /// Running it twice with no intervening mutation yields an empty
    /// markset the second time.
    pub fn remove_sweep(&self) -> Markset {
        let now = self.epoch.elapsed().as_secs();
        let mut inner = self.inner.write();

        let removed = mem::take(&mut inner.pending);

        let mut pruned: Vec<Rec> = Vec::default();
        inner.for_each_live(|rec| {
            if self.should_prune(rec, now) {
                pruned.push(rec.clone());
            }
        });

        let mut moved: Vec<(Rec, Addr)> = Vec::default();
        if let Slots::Bank { .. } = inner.slots {
            // Replacements come off the tail, skipping slots that are
            // themselves pruned.
            let addrs: Vec<u64> = pruned.iter().map(|r| r.to_addr().to_u64()).collect();
            let mut tail: Vec<Rec> = Vec::default();
            inner.for_each_live(|rec| tail.push(rec.clone()));

            let mut t = tail.len();
            for rec in pruned.iter() {
                let hole = rec.to_addr().to_u64();
                let cand = loop {
                    if t == 0 {
                        break None;
                    }
                    let cand = &tail[t - 1];
                    if addrs.binary_search(&cand.to_addr().to_u64()).is_ok() {
                        t -= 1;
                        continue;
                    }
                    break Some(cand.clone());
                };
                match cand {
                    Some(cand) if cand.to_addr().to_u64() > hole => {
                        moved.push((cand, Addr::new(hole)));
                        t -= 1;
                    }
                    _ => break,
                }
            }
        }

        Markset {
            pruned,
            moved,
            removed,
        }
    }

    /// Compact phase: drop pruned slots, relocate the tail records the
    /// markset paired with them, shrink cursors, archive the pruned
    /// records and notify every attached index, which drops both the
    /// pruned and the removed handles.
    ///
    /// The markset must come from the immediately preceding
    /// [DataStore::remove_sweep]; [DataStore::sweep] packages the two
    /// phases.
    pub fn remove_cleanup(&self, marks: &Markset) -> Result<()> {
        {
            let mut inner = self.inner.write();
            match &mut inner.slots {
                Slots::Bank {
                    banks,
                    pos_a,
                    pos_b,
                    free,
                } => {
                    let cap = self.cap as u64;
                    for rec in marks.pruned.iter() {
                        let (b, s) = rec.to_addr().to_bank(cap);
                        banks[b][s] = None;
                    }
                    for (old, new) in marks.moved.iter() {
                        let (b, s) = new.to_bank(cap);
                        banks[b][s] = Some(old.rebind(*new));
                        let (b, s) = old.to_addr().to_bank(cap);
                        banks[b][s] = None;
                    }

                    // Walk the cursor back over the freed tail.
                    let mut cursor = (*pos_a * self.cap + *pos_b) as u64;
                    while cursor > 0 {
                        let (b, s) = Addr::new(cursor - 1).to_bank(cap);
                        if banks[b][s].is_some() {
                            break;
                        }
                        cursor -= 1;
                    }
                    *pos_a = (cursor / cap) as usize;
                    *pos_b = (cursor % cap) as usize;
                    banks.truncate(if *pos_b == 0 { *pos_a } else { *pos_a + 1 });

                    let kept: Vec<Addr> = free
                        .drain(..)
                        .filter(|a| {
                            if a.to_u64() >= cursor {
                                return false;
                            }
                            let (b, s) = a.to_bank(cap);
                            banks[b][s].is_none()
                        })
                        .collect();
                    *free = kept;
                }
                Slots::List { nodes, deleted } => {
                    for rec in marks.pruned.iter() {
                        let i = rec.to_addr().to_u64() as usize;
                        nodes[i] = None;
                        deleted[i] = true;
                    }
                    // Reclaim payloads that were logically removed
                    // through the deletion bitmap.
                    for (i, del) in deleted.iter().enumerate() {
                        if *del {
                            nodes[i] = None;
                        }
                    }
                }
            }
            inner.data_count = inner.data_count.saturating_sub(marks.pruned.len());
        }

        if let Some(archive) = self.archive.as_ref() {
            let mut archive = archive.lock().unwrap();
            for rec in marks.pruned.iter() {
                archive.write(rec.as_bytes())?;
            }
            archive.flush()?;
        }

        for idx in self.to_indexes() {
            idx.remove_sweep(marks);
            idx.update(marks);
        }

        Ok(())
    }

    /// Queue a sweep of this store onto `scheduler`. Sweeps are classed
    /// by store identity, so sweeps of one store never overlap while
    /// different stores sweep in parallel.
    pub fn sweep_on(self: &Arc<DataStore>, scheduler: &Scheduler) -> Result<u64> {
        let w = Arc::downgrade(self);
        let class_id = Arc::as_ptr(self) as u64;
        scheduler.add_work_class(class_id, move || {
            if let Some(store) = w.upgrade() {
                store.sweep().ok();
            }
        })
    }

    /// Mark and compact in one call. Returns the number of records
    /// pruned.
    pub fn sweep(&self) -> Result<usize> {
        let marks = self.remove_sweep();
        let n = marks.pruned.len();
        if !marks.is_empty() {
            self.remove_cleanup(&marks)?;
            debug!(
                target: "odb",
                "store {:?} sweep pruned {} moved {} removed {}",
                self.name, n, marks.moved.len(), marks.removed.len()
            );
        }
        Ok(n)
    }
}

fn sweeper_loop(w: Weak<DataStore>, rx: thread::Rx<()>, period: time::Duration) {
    loop {
        match rx.recv_timeout(period) {
            Err(mpsc::RecvTimeoutError::Timeout) => match w.upgrade() {
                Some(store) => {
                    store.sweep().ok();
                }
                None => break,
            },
            _ => break,
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
