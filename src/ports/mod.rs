//! Platform support for the scheduler.
//!
//! A port supplies the machine-context primitives (save, make, swap, set),
//! the preemption signal plumbing, and the per-kernel-thread interval timer
//! for one target OS. The `linux` port is the real implementation; the
//! `mok` port keeps the crate building on targets without these facilities.

use core::ffi::c_void;
use core::time::Duration;

use crate::scheduler::UThreadError;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub(crate) mod linux;
        pub(crate) use linux::Linux as Port;
        pub(crate) use linux::context::Context;
        pub(crate) use linux::preempt::TimerHandle;
    } else {
        pub(crate) mod mok;
        pub(crate) use mok::Mok as Port;
        pub(crate) use mok::{Context, TimerHandle};
    }
}

/// Entry signature the context facility hands to the OS. A one-pointer
/// entry is smuggled through the variadic argument slot by the port.
pub(crate) type ContextEntry = extern "C" fn();

/// Operations every port provides.
pub(crate) trait PortTrait {
    /// Build a suspended execution on a freshly allocated stack. On first
    /// resume it begins at `entry` (receiving `argument` if given); when
    /// `entry` returns, control transfers to `link`, whose storage the new
    /// context takes ownership of.
    ///
    /// Must be called with the preemption signal deliverable. The captured
    /// mask becomes the new thread's initial mask.
    fn create_context(
        entry: ContextEntry,
        link: Option<Context>,
        stack_size: usize,
        argument: Option<*mut c_void>,
    ) -> Context;

    /// Empty context storage, filled by the first `swap_context` away from it.
    fn main_context() -> Context;

    /// Save the current state into `from` and resume `to`. A later resume
    /// of `from` continues after this call.
    unsafe fn swap_context(from: *mut Context, to: *const Context);

    /// Resume `to`, discarding the caller's state.
    unsafe fn set_context(to: *const Context);

    fn block_preempt_signal();
    fn unblock_preempt_signal();

    fn install_preempt_handler() -> Result<(), UThreadError>;
    fn arm_preempt_timer(time_slice: Duration) -> Result<TimerHandle, UThreadError>;
    fn disarm_preempt_timer(timer: &TimerHandle);
}
