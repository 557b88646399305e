//! The rescheduling core.
//!
//! Both the public API and the timer signal handler funnel into
//! [`reschedule`], which makes one scheduling decision and drives the
//! context switch that realizes it. Selection is strict priority across
//! the three queues; within the chosen queue the head pointer is rotated
//! one step, which is what produces round-robin behavior over consecutive
//! quanta.
//!
//! A context switch suspends the calling stack frame mid-function. When
//! the suspended thread is later resumed, execution continues right after
//! the `swap_context` call in whatever frame performed the switch away,
//! including a signal-handler frame. State is therefore manipulated
//! through a raw handle and no reference is held across a switch.

use core::ptr;

use crate::ports::{Context, Port, PortTrait};
use crate::scheduler::queue::{QueueIndex, SELECTION_ORDER};
use crate::scheduler::thread::{ThreadBlock, ThreadStatusType};
use crate::scheduler::{context_ptr, UThread, UThreadContext};

/// Entry of every thread's linked exit continuation. A normal return from
/// a user entry function lands here and terminates the thread.
pub(crate) extern "C" fn exit_thread_entry() {
    UThread::exit_thread();
}

/// Timer-signal entry. Returns immediately on a kernel thread without an
/// initialized scheduler or without a running thread.
pub(crate) fn preempt_tick() {
    let context = context_ptr();
    if context.is_null() {
        return;
    }
    unsafe {
        if (*context).current_running_queue == QueueIndex::Undefined {
            return;
        }
        reschedule(context, false, false);
    }
}

/// The currently running thread: the head of the current running queue,
/// or null when no queue is marked running.
pub(crate) unsafe fn current_running_thread(context: *mut UThreadContext) -> *mut ThreadBlock {
    let queue = (*context).current_running_queue;
    if queue == QueueIndex::Undefined {
        return ptr::null_mut();
    }
    (*context).queues.queue(queue).head()
}

/// Picks the next thread by strict priority: the first non-empty queue
/// scanning high to low. Within the current running queue the ring
/// advances one step past the head; in any other queue the head itself is
/// taken.
unsafe fn next_ready_thread(context: *mut UThreadContext) -> (*mut ThreadBlock, QueueIndex) {
    for queue in SELECTION_ORDER {
        if (*context).queues.queue(queue).is_empty() {
            continue;
        }
        let head = (*context).queues.queue(queue).head();
        let next = if (*context).current_running_queue == queue {
            (*head).next
        } else {
            head
        };
        return (next, queue);
    }
    (ptr::null_mut(), QueueIndex::Undefined)
}

/// Makes one scheduling decision and performs the context switch.
///
/// With `remove_running` the current thread is unlinked first (it is
/// terminating); its block stays reachable until the switch away has
/// completed and is reclaimed later from an API frame. `reclaim_on_resume`
/// must be false when the caller is the signal handler: the handler frame
/// may sit above an interrupted allocator, so nothing is freed there.
pub(crate) unsafe fn reschedule(
    context: *mut UThreadContext,
    remove_running: bool,
    reclaim_on_resume: bool,
) {
    let running_queue = (*context).current_running_queue;
    let current = current_running_thread(context);

    if remove_running && !current.is_null() {
        (*context).queues.queue_mut(running_queue).remove(current);
        (*context).zombies.push(current);
    }

    let (next, queue) = next_ready_thread(context);

    // Nothing left to run: hand control back to the host context.
    if next.is_null() {
        (*context).current_running_queue = QueueIndex::Undefined;
        Port::set_context(&(*context).main_context);
        return;
    }

    // A thread alone in its queue keeps running.
    if next == current {
        return;
    }

    if running_queue == QueueIndex::Undefined {
        // First dispatch on this kernel thread: the host context is
        // captured and left in the same step that resumes the thread.
        (*context).current_running_queue = queue;
        (*context).queues.queue_mut(queue).set_head(next);
        (*next).status = ThreadStatusType::Running;
        let main = &mut (*context).main_context as *mut Context;
        Port::swap_context(main, &(*next).context);
    } else {
        (*context).current_running_queue = queue;
        (*context).queues.queue_mut(queue).set_head(next);
        (*next).status = ThreadStatusType::Running;
        (*current).status = ThreadStatusType::Ready;
        Port::swap_context(&mut (*current).context, &(*next).context);
    }

    // Resumed. The handle is re-read: the instance may have been replaced
    // while this frame was suspended.
    if reclaim_on_resume {
        let context = context_ptr();
        if !context.is_null() {
            (*context).reclaim_zombies();
        }
    }
}
