use core::ffi::c_void;
use core::mem;
use core::ptr;

use crate::ports::{Context, ContextEntry, Port, PortTrait};
use crate::scheduler::preemptive;
use crate::scheduler::queue::QueueIndex;

/// Type of user-thread identifiers. Positive, monotonically increasing,
/// never reused within one scheduler instance.
pub type ThreadIdType = u64;

/// Type of the entry function of a user thread. It receives the argument
/// passed to `schedule_thread` when the thread first runs.
pub type ThreadEntryType = extern "C" fn(*mut c_void);

/// Execution state of a user thread.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ThreadStatusType {
    /// Linked into a ready queue, waiting for its turn.
    Ready,
    /// Currently executing. At most one thread per scheduler instance.
    Running,
    /// Reserved for future blocking primitives; never entered today.
    Blocked,
}

/// Scheduling priority of a user thread. Selection is strictly `High`
/// over `Medium` over `Low`, with no aging: a steady supply of runnable
/// high-priority threads starves the lower queues.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ThreadPriority {
    Low,
    Medium,
    High,
}

/// Snapshot of one thread's bookkeeping, taken under the signal mask.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ThreadInfo {
    pub id: ThreadIdType,
    pub status: ThreadStatusType,
    /// Ready queue the thread is linked into.
    pub queue: QueueIndex,
    /// Direct descendants created so far. Reserved for a future join
    /// primitive; never decremented.
    pub number_of_children: u32,
    /// Id of the creating thread, if a user thread was running at creation
    /// time. Held by id, so it stays harmless after the parent terminates.
    pub parent: Option<ThreadIdType>,
}

/// Per-thread record: identity, lifecycle state, family bookkeeping, the
/// owned executions, and the intrusive links of the ready queue ring the
/// block is a member of. A block belongs to at most one queue at a time.
pub(crate) struct ThreadBlock {
    pub(crate) id: ThreadIdType,
    pub(crate) status: ThreadStatusType,
    pub(crate) number_of_children: u32,
    pub(crate) parent: Option<ThreadIdType>,
    /// Suspended execution of the entry function. Its linked continuation
    /// runs the thread-exit routine, so a plain return terminates the
    /// thread; the continuation's storage rides inside this context.
    pub(crate) context: Context,
    pub(crate) next: *mut ThreadBlock,
    pub(crate) previous: *mut ThreadBlock,
}

impl ThreadBlock {
    /// Builds the block and both of its executions: the entry context and
    /// the exit continuation it is linked to. Called before the caller
    /// masks the preemption signal, so the captured masks leave preemption
    /// deliverable once the thread runs.
    pub(crate) fn new(
        id: ThreadIdType,
        entry: ThreadEntryType,
        argument: *mut c_void,
        stack_size: usize,
    ) -> Box<ThreadBlock> {
        let exit_context =
            Port::create_context(preemptive::exit_thread_entry, None, stack_size, None);
        let entry: ContextEntry = unsafe { mem::transmute::<ThreadEntryType, ContextEntry>(entry) };
        let context = Port::create_context(entry, Some(exit_context), stack_size, Some(argument));
        Box::new(ThreadBlock {
            id,
            status: ThreadStatusType::Ready,
            number_of_children: 0,
            parent: None,
            context,
            next: ptr::null_mut(),
            previous: ptr::null_mut(),
        })
    }
}
