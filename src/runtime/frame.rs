//! Frames: suspended units of cooperative execution.
//!
//! A frame wraps an explicit task state machine. Invoking a
//! task-producing function builds the frame without running any body
//! code; the body starts suspended at entry and every resume advances it
//! exactly one step.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::errors::TaskFault;
use super::pool::PoolId;

/// Unique frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

impl FrameId {
    /// Generate the next unique id.
    fn next() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

/// What one step of a task body reported.
#[derive(Debug)]
pub enum Step {
    /// Suspended; resume again on the next tick.
    Yield,
    /// Suspended awaiting a sub-task; the awaiting frame is not resumed
    /// until the sub-task's whole chain has completed.
    Await(Frame),
    /// The body ran to completion.
    Complete,
}

/// Result of advancing a task body one step.
pub type StepResult = Result<Step, TaskFault>;

/// An explicit task state machine: saved locals plus whatever step
/// discriminator the body needs, advanced one step per call.
///
/// Any `FnMut` closure returning [`StepResult`] is a task body, so a
/// task-producing function is an ordinary function whose captured state
/// becomes the task's locals.
pub trait TaskBody {
    /// Advance the body one step.
    fn step(&mut self) -> StepResult;
}

impl<F> TaskBody for F
where
    F: FnMut() -> StepResult,
{
    fn step(&mut self) -> StepResult {
        self()
    }
}

/// Outcome of resuming a frame one step.
#[derive(Debug)]
pub enum Resumed {
    /// The body yielded; the frame stays suspended where it is.
    Suspended,
    /// The body awaited a sub-task that must cut in ahead of this frame
    /// on its chain. Only produced for pool-attached frames; outside a
    /// pool the sub-task is driven to completion in place.
    Awaited(Frame),
    /// The body ran to completion; the frame can be destroyed.
    Completed,
    /// The body raised a fault, now captured in the frame's fault slot.
    Faulted,
}

/// One suspended unit of cooperative execution.
///
/// Exclusively owned: by the host until spawned, by exactly one pool
/// chain afterwards.
pub struct Frame {
    /// Unique id, used for invariant checks and logging.
    id: FrameId,
    /// The suspended state machine.
    body: Box<dyn TaskBody>,
    /// Captured fault, re-raised on the next resume unless taken.
    fault: Option<TaskFault>,
    /// Owning pool, set once at attachment. None outside any pool.
    pool: Option<PoolId>,
    /// Index of the owning chain while this frame is its top.
    chain: Option<usize>,
    /// Set when the body reports [`Step::Complete`].
    done: bool,
}

impl fmt::Debug for Frame {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("chain", &self.chain)
            .field("done", &self.done)
            .field("faulted", &self.fault.is_some())
            .finish()
    }
}

impl Frame {
    /// Wrap a task body into a frame suspended at entry.
    ///
    /// No body code runs here; the first step runs on the first resume.
    pub fn new<B>(body: B) -> Self
    where
        B: TaskBody + 'static,
    {
        Self {
            id: FrameId::next(),
            body: Box::new(body),
            fault: None,
            pool: None,
            chain: None,
            done: false,
        }
    }

    /// Frame id.
    #[inline]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Whether the body has run to completion.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether a fault is captured on this frame.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Owning pool, if attached.
    #[inline]
    pub fn pool(&self) -> Option<PoolId> {
        self.pool
    }

    /// Take the captured fault, leaving the frame where it failed.
    #[inline]
    pub fn take_fault(&mut self) -> Option<TaskFault> {
        self.fault.take()
    }

    /// Record the owning pool. Set once at attachment time.
    pub(crate) fn attach(
        &mut self,
        pool: PoolId,
    ) {
        self.pool = Some(pool);
    }

    /// Chain index slot; `Some` only while this frame is a chain top.
    #[inline]
    pub(crate) fn chain_slot(&self) -> Option<usize> {
        self.chain
    }

    /// Update the chain index slot.
    #[inline]
    pub(crate) fn set_chain_slot(
        &mut self,
        slot: Option<usize>,
    ) {
        self.chain = slot;
    }

    /// Resume the frame exactly one step.
    ///
    /// An untaken captured fault is re-raised without advancing the
    /// body. Otherwise the body runs one step; a fault it raises is
    /// captured into the frame's fault slot rather than escaping the
    /// call.
    ///
    /// Awaits follow the sub-task attachment protocol: the sub-task
    /// inherits this frame's pool reference, then either cuts in ahead
    /// of this frame on its chain (reported as [`Resumed::Awaited`] for
    /// the owning pool to push) or, when no pool is known, runs to
    /// completion right here, wholly outside scheduler bookkeeping.
    pub fn resume(&mut self) -> Resumed {
        debug_assert!(!self.done, "resumed a completed frame");
        if self.fault.is_some() {
            return Resumed::Faulted;
        }

        match self.body.step() {
            Ok(Step::Yield) => Resumed::Suspended,
            Ok(Step::Complete) => {
                self.done = true;
                Resumed::Completed
            }
            Ok(Step::Await(mut sub)) => {
                sub.pool = self.pool;
                match self.pool {
                    Some(_) => Resumed::Awaited(sub),
                    None => self.drive_detached(sub),
                }
            }
            Err(fault) => {
                self.fault = Some(fault);
                Resumed::Faulted
            }
        }
    }

    /// Run an awaited frame to completion outside any pool.
    ///
    /// Nested awaits recurse through the same path, so the whole
    /// sub-tree drains before this frame's await counts as its one
    /// suspension step. A fault inside the sub-task is captured on this
    /// frame and the sub-task is discarded.
    fn drive_detached(
        &mut self,
        mut sub: Frame,
    ) -> Resumed {
        trace!("{} drives detached sub-task {}", self.id, sub.id);
        loop {
            match sub.resume() {
                Resumed::Suspended => continue,
                Resumed::Completed => return Resumed::Suspended,
                Resumed::Faulted => {
                    self.fault = sub.take_fault();
                    return Resumed::Faulted;
                }
                Resumed::Awaited(_) => {
                    unreachable!("detached frames never report Awaited")
                }
            }
        }
    }
}
