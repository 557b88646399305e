pub(crate) mod context;
pub(crate) mod preempt;

use core::ffi::c_void;
use core::time::Duration;

use crate::ports::{ContextEntry, PortTrait};
use crate::scheduler::UThreadError;
use context::Context;
use preempt::TimerHandle;

/// PortTrait implementation for hosted Linux.
pub(crate) struct Linux;

impl PortTrait for Linux {
    fn create_context(
        entry: ContextEntry,
        link: Option<Context>,
        stack_size: usize,
        argument: Option<*mut c_void>,
    ) -> Context {
        context::create_context(entry, link, stack_size, argument)
    }

    fn main_context() -> Context {
        context::main_context()
    }

    unsafe fn swap_context(from: *mut Context, to: *const Context) {
        context::swap(from, to)
    }

    unsafe fn set_context(to: *const Context) {
        context::set(to)
    }

    fn block_preempt_signal() {
        preempt::block_preempt_signal();
    }

    fn unblock_preempt_signal() {
        preempt::unblock_preempt_signal();
    }

    fn install_preempt_handler() -> Result<(), UThreadError> {
        preempt::install_preempt_handler()
    }

    fn arm_preempt_timer(time_slice: Duration) -> Result<TimerHandle, UThreadError> {
        preempt::arm_preempt_timer(time_slice)
    }

    fn disarm_preempt_timer(timer: &TimerHandle) {
        preempt::disarm_preempt_timer(timer);
    }
}
