//! Preemption driver: timer signal, handler, and mask manipulation.
//!
//! The quantum timer lives on the per-kernel-thread CPU-time clock and
//! delivers its signal to the kernel thread that armed it, so independent
//! scheduler instances on different kernel threads never preempt each
//! other.

use core::ffi::c_void;
use core::mem;
use core::ptr;
use core::time::Duration;

use crate::scheduler::UThreadError;

/// Signal used for time-slice preemption.
pub(crate) const PREEMPT_SIGNAL: libc::c_int = libc::SIGVTALRM;

const PREEMPT_CLOCK: libc::clockid_t = libc::CLOCK_THREAD_CPUTIME_ID;

/// POSIX timer owned by one scheduler instance.
pub(crate) struct TimerHandle {
    id: libc::timer_t,
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn preempt_sigset() -> libc::sigset_t {
    let mut mask: libc::sigset_t = unsafe { mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut mask);
        libc::sigaddset(&mut mask, PREEMPT_SIGNAL);
    }
    mask
}

pub(crate) fn block_preempt_signal() {
    let mask = preempt_sigset();
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, &mask, ptr::null_mut());
    }
}

pub(crate) fn unblock_preempt_signal() {
    let mask = preempt_sigset();
    unsafe {
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &mask, ptr::null_mut());
    }
}

/// Timer signal handler. Runs with the preemption signal masked. Everything
/// reachable from here must be safe to execute mid-instruction: no
/// allocation, no locks, no I/O.
extern "C" fn preempt_handler(
    _signo: libc::c_int,
    _info: *mut libc::siginfo_t,
    _ucontext: *mut c_void,
) {
    crate::scheduler::preemptive::preempt_tick();
}

pub(crate) fn install_preempt_handler() -> Result<(), UThreadError> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_flags = libc::SA_ONSTACK | libc::SA_SIGINFO;
    let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void) = preempt_handler;
    action.sa_sigaction = handler as usize;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(PREEMPT_SIGNAL, &action, ptr::null_mut()) != 0 {
            return Err(UThreadError::SignalSetup(last_errno()));
        }
    }
    Ok(())
}

/// Creates and arms a timer that fires every `time_slice` of this kernel
/// thread's CPU time, starting one slice from now.
pub(crate) fn arm_preempt_timer(time_slice: Duration) -> Result<TimerHandle, UThreadError> {
    let mut event: libc::sigevent = unsafe { mem::zeroed() };
    event.sigev_notify = libc::SIGEV_THREAD_ID;
    event.sigev_signo = PREEMPT_SIGNAL;
    event.sigev_notify_thread_id = unsafe { libc::syscall(libc::SYS_gettid) as libc::c_int };

    let mut id: libc::timer_t = ptr::null_mut();
    unsafe {
        if libc::timer_create(PREEMPT_CLOCK, &mut event, &mut id) != 0 {
            return Err(UThreadError::TimerSetup(last_errno()));
        }
    }

    let slice = timespec_from(time_slice);
    let timer_spec = libc::itimerspec {
        it_interval: slice,
        it_value: slice,
    };
    unsafe {
        if libc::timer_settime(id, 0, &timer_spec, ptr::null_mut()) != 0 {
            let errno = last_errno();
            libc::timer_delete(id);
            return Err(UThreadError::TimerSetup(errno));
        }
    }
    Ok(TimerHandle { id })
}

pub(crate) fn disarm_preempt_timer(timer: &TimerHandle) {
    unsafe {
        libc::timer_delete(timer.id);
    }
}

fn timespec_from(interval: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_nsec: interval.subsec_nanos() as libc::c_long,
    }
}
