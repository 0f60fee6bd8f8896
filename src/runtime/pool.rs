//! The pool: the scheduler that owns every chain and advances them one
//! tick at a time.
//!
//! Strictly single-threaded and cooperative. The host drives the pool
//! by calling [`Pool::tick`] (or the timed wrappers over it) from one
//! thread of control; suspension happens only at explicit points inside
//! task bodies, never by preemption.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::errors::TaskFault;
use super::frame::{Frame, Resumed};

/// Unique pool identifier.
///
/// Frames hold it as their non-owning back reference to the pool that
/// owns them; the pool itself is always owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

impl PoolId {
    /// Generate the next unique id.
    fn next() -> Self {
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

/// A stack of frames forming one logical thread of control.
///
/// Top = last. Every frame above the bottom was pushed as a sub-task of
/// the frame beneath it, so resumption order within a chain is strictly
/// LIFO. Non-empty except transiently during pop cascades.
#[derive(Debug)]
struct Chain {
    frames: SmallVec<[Frame; 4]>,
}

impl Chain {
    /// Chain holding a single root frame.
    fn root(frame: Frame) -> Self {
        let mut frames = SmallVec::new();
        frames.push(frame);
        Self { frames }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    fn top(&self) -> &Frame {
        self.frames.last().expect("chain has no top frame")
    }

    #[inline]
    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("chain has no top frame")
    }

    #[inline]
    fn push(
        &mut self,
        frame: Frame,
    ) {
        self.frames.push(frame);
    }

    #[inline]
    fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }
}

/// The scheduler: a pool of independently advancing chains.
///
/// Registering a root frame creates a new chain; every [`tick`] resumes
/// each chain's top frame at least one step. A frame that awaits a
/// sub-task has the sub-task pushed ahead of it on the same chain and is
/// not resumed again until the whole pushed sub-chain has unwound.
///
/// [`tick`]: Pool::tick
#[derive(Debug)]
pub struct Pool {
    id: PoolId,
    chains: Vec<Chain>,
}

impl Pool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            id: PoolId::next(),
            chains: Vec::new(),
        }
    }

    /// Pool id.
    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// True iff no chains remain: every registered task has finished.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Number of live chains.
    #[inline]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Register a root task: the frame becomes the sole element of a new
    /// chain. Chainable.
    ///
    /// # Panics
    ///
    /// Panics if the frame is already attached to a pool; only fresh
    /// frames can be spawned.
    pub fn spawn(
        &mut self,
        mut frame: Frame,
    ) -> &mut Self {
        assert!(
            frame.pool().is_none(),
            "{} is already attached to a pool; only fresh frames can be spawned",
            frame.id()
        );
        let index = self.chains.len();
        frame.attach(self.id);
        frame.set_chain_slot(Some(index));
        debug!("spawned {} as chain {}", frame.id(), index);
        self.chains.push(Chain::root(frame));
        self
    }

    /// Advance every live chain.
    ///
    /// Each chain's top frame is resumed one step; while the resume
    /// changes the chain's top — a sub-task cutting in, or completed
    /// frames popping off — the new top is resumed again within the same
    /// call, so stacked completions drain without consuming extra ticks.
    ///
    /// A fault captured during any of those resumes propagates out
    /// immediately with scheduler bookkeeping untouched: the faulted
    /// frame stays on top of its chain and chains not yet visited stay
    /// un-advanced until the next call. The host decides whether to call
    /// `tick` again (the faulted step is retried verbatim), abandon, or
    /// [`clear`](Pool::clear).
    ///
    /// Chains are serviced in index order, but index order is not stable
    /// across ticks; callers must not rely on cross-chain ordering.
    pub fn tick(&mut self) -> Result<(), TaskFault> {
        self.assert_chain_slots();

        let mut i = 0;
        while i < self.chains.len() {
            self.service(i)?;
            if self.chains[i].is_empty() {
                // A different chain occupies this index after the
                // swap-remove; revisit it before advancing.
                self.retire(i);
            } else {
                i += 1;
            }
        }

        self.assert_chain_slots();
        Ok(())
    }

    /// Keep ticking until `deadline` passes on the monotonic clock.
    ///
    /// Pure convenience over [`tick`](Pool::tick): no rate limiting and
    /// no early exit on an empty pool. Pairing tick frequency with a
    /// frame-rate limiter is the host's job.
    pub fn run_until(
        &mut self,
        deadline: Instant,
    ) -> Result<(), TaskFault> {
        while Instant::now() < deadline {
            self.tick()?;
        }
        Ok(())
    }

    /// Keep ticking for `duration` from now.
    pub fn run_for(
        &mut self,
        duration: Duration,
    ) -> Result<(), TaskFault> {
        self.run_until(Instant::now() + duration)
    }

    /// Destroy every outstanding frame without resuming any of them,
    /// top of each chain first (sub-task before parent), and empty the
    /// pool.
    ///
    /// Bodies never reach their own cleanup points, so the host must
    /// treat cleared work as potentially leaving partial side effects.
    pub fn clear(&mut self) {
        let retired = self.chains.len();
        for chain in &mut self.chains {
            while let Some(frame) = chain.pop() {
                trace!("{} discarded", frame.id());
            }
        }
        self.chains.clear();
        if retired > 0 {
            debug!("pool cleared, {} chains discarded", retired);
        }
    }

    /// Resume chain `i` until it yields, faults, or empties.
    fn service(
        &mut self,
        i: usize,
    ) -> Result<(), TaskFault> {
        loop {
            match self.chains[i].top_mut().resume() {
                Resumed::Suspended => return Ok(()),
                Resumed::Awaited(sub) => {
                    // The sub-task takes its first step this tick, on
                    // the next loop turn.
                    self.subtask(i, sub);
                }
                Resumed::Completed => {
                    let done = self
                        .chains[i]
                        .pop()
                        .expect("completed frame missing from its chain");
                    trace!("{} completed", done.id());
                    if self.chains[i].is_empty() {
                        return Ok(());
                    }
                    // Cascade: the newly exposed top becomes the chain's
                    // recognized top and resumes on the next loop turn.
                    self.chains[i].top_mut().set_chain_slot(Some(i));
                }
                Resumed::Faulted => {
                    let top = self.chains[i].top_mut();
                    let id = top.id();
                    let fault = top
                        .take_fault()
                        .expect("faulted resume left no fault");
                    debug!("{} faulted, surfacing from tick", id);
                    return Err(fault);
                }
            }
        }
    }

    /// Push an awaited sub-task ahead of its parent on the same chain.
    ///
    /// The parent must be the recognized live top of chain `i`; anything
    /// else means scheduler state is corrupt, which is fatal by design.
    fn subtask(
        &mut self,
        i: usize,
        mut sub: Frame,
    ) {
        let parent = self.chains[i].top_mut();
        let recorded = parent.chain_slot();
        assert!(
            recorded == Some(i),
            "scheduler invariant violated: {} awaits a sub-task but is not the \
             recognized top of chain {} (recorded slot {:?})",
            parent.id(),
            i,
            recorded,
        );
        parent.set_chain_slot(None);
        sub.set_chain_slot(Some(i));
        trace!(
            "{} cuts in ahead of {} on chain {} (depth {})",
            sub.id(),
            self.chains[i].top().id(),
            i,
            self.chains[i].depth() + 1,
        );
        self.chains[i].push(sub);
    }

    /// Remove the now-empty chain at `i`, swapping in the last chain.
    fn retire(
        &mut self,
        i: usize,
    ) {
        self.chains.swap_remove(i);
        trace!("chain {} retired, {} remaining", i, self.chains.len());
        if let Some(moved) = self.chains.get_mut(i) {
            // The moved chain's top now lives at a new index.
            moved.top_mut().set_chain_slot(Some(i));
        }
    }

    /// Between-tick invariant: every live chain's top records its own
    /// index and only tops carry a slot.
    #[cfg(debug_assertions)]
    fn assert_chain_slots(&self) {
        for (i, chain) in self.chains.iter().enumerate() {
            debug_assert_eq!(
                chain.top().chain_slot(),
                Some(i),
                "top of chain {} does not record its index",
                i,
            );
            for frame in &chain.frames[..chain.depth() - 1] {
                debug_assert_eq!(
                    frame.chain_slot(),
                    None,
                    "non-top {} still carries a chain slot",
                    frame.id(),
                );
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn assert_chain_slots(&self) {}
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.clear();
    }
}
