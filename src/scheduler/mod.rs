//! # Preemptive User-Thread Scheduler
//!
//! This module multiplexes lightweight user threads onto the kernel thread
//! that initialized it. Each user thread owns a stack and a saved machine
//! context; a virtual CPU-time timer signal preempts the running thread
//! every quantum and rotates its priority queue one step.
//!
//! ## Scheduling policy
//!
//! Three ready queues (`Low`, `Medium`, `High`) hold the runnable threads
//! as circular rings. Selection is strict priority with no aging: the
//! highest non-empty queue always wins, and within that queue the ring
//! head advances one position per quantum, giving round-robin among equal
//! priorities. The head of the current running queue is, by definition,
//! the running thread.
//!
//! ## Critical sections
//!
//! The queues and the running-queue marker are edited both by the public
//! API and by the timer signal handler. The API masks the timer signal
//! around every edit; the handler runs with its own signal masked. Under
//! that discipline no edit can overlap a handler invocation and no two
//! handler invocations can overlap, which is the entire synchronization
//! story of this single-kernel-thread design.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::ffi::c_void;
//! use std::ptr;
//!
//! use uthread::scheduler::{ThreadPriority, UThread, UThreadOptions};
//!
//! extern "C" fn worker(_argument: *mut c_void) {
//!     println!("running as thread {:?}", UThread::current_thread_id());
//!     // returning terminates the thread
//! }
//!
//! UThread::init(UThreadOptions::default()).unwrap();
//! let id = UThread::schedule_thread(worker, ptr::null_mut(), ThreadPriority::Medium, 0).unwrap();
//! println!("thread {} finished", id);
//! ```
//!
//! `init` and the scheduler state are per kernel thread: a process may run
//! several independent scheduler instances, one per kernel thread that
//! called `init`.

pub(crate) mod preemptive;
mod queue;
mod thread;

pub use queue::QueueIndex;
pub use thread::{
    ThreadEntryType, ThreadIdType, ThreadInfo, ThreadPriority, ThreadStatusType,
};

use core::cell::Cell;
use core::ffi::c_void;
use core::fmt;
use core::ptr;
use core::time::Duration;

use crate::ports::{Context, Port, PortTrait, TimerHandle};
use queue::{RunQueueSet, SELECTION_ORDER};
use thread::ThreadBlock;

/// Configuration for one scheduler instance.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct UThreadOptions {
    /// Stack size in bytes for threads scheduled with `stack_size == 0`.
    pub stack_size: usize,
    /// Preemption quantum, measured on the kernel thread's CPU-time clock.
    pub time_slice: Duration,
}

impl Default for UThreadOptions {
    fn default() -> UThreadOptions {
        UThreadOptions {
            stack_size: 64 * 1024,
            time_slice: Duration::from_millis(10),
        }
    }
}

/// Errors surfaced by the public API.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum UThreadError {
    /// `schedule_thread` was called before `init` on this kernel thread.
    NotInitialized,
    /// Installing the preemption signal handler failed; carries the OS errno.
    SignalSetup(i32),
    /// Creating or arming the preemption timer failed; carries the OS errno.
    TimerSetup(i32),
}

impl fmt::Display for UThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UThreadError::NotInitialized => {
                write!(f, "scheduler is not initialized on this kernel thread")
            }
            UThreadError::SignalSetup(errno) => {
                write!(f, "installing the preemption signal handler failed (errno {})", errno)
            }
            UThreadError::TimerSetup(errno) => {
                write!(f, "arming the preemption timer failed (errno {})", errno)
            }
        }
    }
}

impl std::error::Error for UThreadError {}

/// Scheduler state of one kernel thread: the ready queues, the running
/// marker, the id counter, the saved host context, the preemption timer,
/// and terminated blocks awaiting reclamation.
pub(crate) struct UThreadContext {
    pub(crate) options: UThreadOptions,
    pub(crate) queues: RunQueueSet,
    /// Queue whose head is the running thread; `Undefined` when none runs.
    pub(crate) current_running_queue: QueueIndex,
    pub(crate) next_id: ThreadIdType,
    /// Host execution to resume once every queue is empty.
    pub(crate) main_context: Context,
    pub(crate) timer: Option<TimerHandle>,
    /// Terminated blocks whose switch away has completed or is completing.
    /// Freed only from API frames, never from the handler frame.
    pub(crate) zombies: Vec<*mut ThreadBlock>,
}

impl UThreadContext {
    fn new(options: UThreadOptions) -> UThreadContext {
        UThreadContext {
            options,
            queues: RunQueueSet::new(),
            current_running_queue: QueueIndex::Undefined,
            next_id: 1,
            main_context: Port::main_context(),
            timer: None,
            zombies: Vec::new(),
        }
    }

    pub(crate) fn reclaim_zombies(&mut self) {
        for block in self.zombies.drain(..) {
            drop(unsafe { Box::from_raw(block) });
        }
    }
}

impl Drop for UThreadContext {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            Port::disarm_preempt_timer(&timer);
        }
        self.reclaim_zombies();
        // Blocks still queued may have live stacks; they are leaked rather
        // than freed out from under a suspended execution.
    }
}

thread_local! {
    /// Scheduler handle of this kernel thread. Const-initialized so the
    /// signal handler's access performs no lazy setup.
    static UTHREAD_CONTEXT: Cell<*mut UThreadContext> = const { Cell::new(ptr::null_mut()) };
}

pub(crate) fn context_ptr() -> *mut UThreadContext {
    UTHREAD_CONTEXT.with(|context| context.get())
}

/// Records the parent-child relation. Only a running user thread can be a
/// parent; a thread scheduled from the host context stays parentless.
unsafe fn register_parent(context: *mut UThreadContext, block: *mut ThreadBlock) {
    let parent = preemptive::current_running_thread(context);
    if parent.is_null() {
        return;
    }
    (*parent).number_of_children += 1;
    (*block).parent = Some((*parent).id);
}

/// The preemptive user-thread scheduler of the calling kernel thread.
///
/// All associated functions operate on the instance created by [`init`]
/// on the current kernel thread.
///
/// [`init`]: UThread::init
pub struct UThread;

impl UThread {
    /// Initializes the scheduler for the calling kernel thread: installs
    /// the preemption signal handler, arms the quantum timer, and unblocks
    /// the timer signal.
    ///
    /// Calling `init` again replaces the existing instance. The previous
    /// timer is deleted before the previous state is dropped; threads
    /// still queued in the previous instance are abandoned.
    pub fn init(options: UThreadOptions) -> Result<(), UThreadError> {
        Port::block_preempt_signal();
        let previous = context_ptr();
        if !previous.is_null() {
            UTHREAD_CONTEXT.with(|context| context.set(ptr::null_mut()));
            drop(unsafe { Box::from_raw(previous) });
            log::debug!("previous scheduler instance discarded");
        }

        if let Err(error) = Port::install_preempt_handler() {
            Port::unblock_preempt_signal();
            return Err(error);
        }
        let mut context = Box::new(UThreadContext::new(options));
        match Port::arm_preempt_timer(options.time_slice) {
            Ok(timer) => context.timer = Some(timer),
            Err(error) => {
                Port::unblock_preempt_signal();
                return Err(error);
            }
        }
        UTHREAD_CONTEXT.with(|cell| cell.set(Box::into_raw(context)));
        Port::unblock_preempt_signal();
        log::debug!(
            "scheduler initialized: default stack {} bytes, time slice {:?}",
            options.stack_size,
            options.time_slice
        );
        Ok(())
    }

    /// Creates a user thread that will run `entry` with `argument` and
    /// links it at the tail of the queue for `priority`. A `stack_size` of
    /// zero selects the configured default.
    ///
    /// Scheduling runs a rescheduling pass before returning, so the call
    /// may switch to the new thread immediately: a higher-priority thread
    /// preempts its creator, and an equal-priority thread takes over the
    /// creator's quantum. Returns the new thread's id.
    pub fn schedule_thread(
        entry: ThreadEntryType,
        argument: *mut c_void,
        priority: ThreadPriority,
        stack_size: usize,
    ) -> Result<ThreadIdType, UThreadError> {
        let context = context_ptr();
        if context.is_null() {
            return Err(UThreadError::NotInitialized);
        }
        unsafe {
            let stack_size = if stack_size == 0 {
                (*context).options.stack_size
            } else {
                stack_size
            };
            let id = (*context).next_id;
            (*context).next_id += 1;
            let block = ThreadBlock::new(id, entry, argument, stack_size);

            Port::block_preempt_signal();
            (*context).reclaim_zombies();
            let block = Box::into_raw(block);
            register_parent(context, block);
            log::trace!("thread {} scheduled at {:?} priority", id, priority);
            (*context)
                .queues
                .queue_mut(QueueIndex::from_priority(priority))
                .add_tail(block);
            preemptive::reschedule(context, false, true);
            Port::unblock_preempt_signal();
            Ok(id)
        }
    }

    /// Terminates the calling thread: unlinks it from its queue, schedules
    /// the next runnable thread, and queues the block for reclamation.
    /// Does not return when called from a running user thread. A thread
    /// whose entry function returns normally arrives here through its
    /// linked exit continuation.
    pub fn exit_thread() {
        let context = context_ptr();
        if context.is_null() {
            panic!("Error: exit_thread: scheduler is not initialized on this kernel thread.");
        }
        Port::block_preempt_signal();
        unsafe {
            preemptive::reschedule(context, true, false);
        }
    }

    /// Whether `init` has run on the calling kernel thread.
    pub fn is_initialized() -> bool {
        !context_ptr().is_null()
    }

    /// Queue of the running thread, `Undefined` when no thread is running.
    pub fn current_queue() -> QueueIndex {
        let context = context_ptr();
        if context.is_null() {
            return QueueIndex::Undefined;
        }
        unsafe { (*context).current_running_queue }
    }

    /// Id of the running thread, if any.
    pub fn current_thread_id() -> Option<ThreadIdType> {
        let context = context_ptr();
        if context.is_null() {
            return None;
        }
        Port::block_preempt_signal();
        let id = unsafe {
            let running = preemptive::current_running_thread(context);
            if running.is_null() {
                None
            } else {
                Some((*running).id)
            }
        };
        Port::unblock_preempt_signal();
        id
    }

    /// Number of threads linked into `queue`.
    pub fn queue_len(queue: QueueIndex) -> usize {
        let context = context_ptr();
        if context.is_null() || queue == QueueIndex::Undefined {
            return 0;
        }
        Port::block_preempt_signal();
        let length = unsafe { (*context).queues.queue(queue).len() };
        Port::unblock_preempt_signal();
        length
    }

    /// Whether a thread with `id` is linked into `queue`.
    pub fn find_thread(queue: QueueIndex, id: ThreadIdType) -> bool {
        let context = context_ptr();
        if context.is_null() || queue == QueueIndex::Undefined {
            return false;
        }
        Port::block_preempt_signal();
        let found = unsafe { (*context).queues.queue(queue).find(id).is_some() };
        Port::unblock_preempt_signal();
        found
    }

    /// Snapshot of the thread with `id`, searching all queues. `None` once
    /// the thread has terminated (or never existed).
    pub fn thread_info(id: ThreadIdType) -> Option<ThreadInfo> {
        let context = context_ptr();
        if context.is_null() {
            return None;
        }
        Port::block_preempt_signal();
        let mut info = None;
        unsafe {
            for queue in SELECTION_ORDER {
                if let Some(block) = (*context).queues.queue(queue).find(id) {
                    info = Some(ThreadInfo {
                        id: (*block).id,
                        status: (*block).status,
                        queue,
                        number_of_children: (*block).number_of_children,
                        parent: (*block).parent,
                    });
                    break;
                }
            }
        }
        Port::unblock_preempt_signal();
        info
    }

    /// Verifies the structural invariants of the scheduler state and
    /// panics on any violation: every queue is a well-formed ring, at most
    /// one thread is running and it is the head of the current running
    /// queue, ids were issued by this instance and appear once, and empty
    /// queues imply no running queue. A no-op before `init`.
    pub fn check_invariants() {
        let context = context_ptr();
        if context.is_null() {
            return;
        }
        Port::block_preempt_signal();
        unsafe {
            check_invariants_masked(context);
        }
        Port::unblock_preempt_signal();
    }
}

unsafe fn check_invariants_masked(context: *mut UThreadContext) {
    let mut running = 0usize;
    let mut total = 0usize;
    let mut seen: Vec<ThreadIdType> = Vec::new();
    for queue in SELECTION_ORDER {
        let head = (*context).queues.queue(queue).head();
        if head.is_null() {
            continue;
        }
        let mut pointer = head;
        loop {
            let next = (*pointer).next;
            let previous = (*pointer).previous;
            if (*next).previous != pointer || (*previous).next != pointer {
                panic!(
                    "Error: check_invariants: queue {:?} ring is broken at thread {}.",
                    queue,
                    (*pointer).id
                );
            }
            if (*pointer).id >= (*context).next_id {
                panic!(
                    "Error: check_invariants: thread id {} was never issued.",
                    (*pointer).id
                );
            }
            if seen.contains(&(*pointer).id) {
                panic!(
                    "Error: check_invariants: thread id {} appears twice.",
                    (*pointer).id
                );
            }
            seen.push((*pointer).id);
            if (*pointer).status == ThreadStatusType::Running {
                running += 1;
                if queue != (*context).current_running_queue || pointer != head {
                    panic!(
                        "Error: check_invariants: running thread {} is not the head of the current running queue.",
                        (*pointer).id
                    );
                }
            }
            total += 1;
            pointer = next;
            if pointer == head {
                break;
            }
        }
    }
    if running > 1 {
        panic!(
            "Error: check_invariants: {} threads are marked running.",
            running
        );
    }
    if total == 0 && (*context).current_running_queue != QueueIndex::Undefined {
        panic!(
            "Error: check_invariants: queues are empty but queue {:?} is marked running.",
            (*context).current_running_queue
        );
    }
}
