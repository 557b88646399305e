use core::ffi::c_void;
use core::time::Duration;

use crate::ports::{ContextEntry, PortTrait};
use crate::scheduler::UThreadError;

/// Inert context for targets without the required OS facilities.
pub(crate) struct Context;

pub(crate) struct TimerHandle;

/// PortTrait implementation for the Mok platform.
pub(crate) struct Mok;

impl PortTrait for Mok {
    fn create_context(
        _entry: ContextEntry,
        _link: Option<Context>,
        _stack_size: usize,
        _argument: Option<*mut c_void>,
    ) -> Context {
        Context
    }

    fn main_context() -> Context {
        Context
    }

    unsafe fn swap_context(_from: *mut Context, _to: *const Context) {}

    unsafe fn set_context(_to: *const Context) {}

    fn block_preempt_signal() {}

    fn unblock_preempt_signal() {}

    fn install_preempt_handler() -> Result<(), UThreadError> {
        Ok(())
    }

    fn arm_preempt_timer(_time_slice: Duration) -> Result<TimerHandle, UThreadError> {
        Ok(TimerHandle)
    }

    fn disarm_preempt_timer(_timer: &TimerHandle) {}
}
