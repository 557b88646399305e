//! Machine contexts over the `ucontext` family.

use core::ffi::c_void;
use core::mem;
use core::ptr;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};

use crate::ports::ContextEntry;

pub(crate) const STACK_ALIGN: usize = 16;

/// Owned stack buffer for one context.
pub(crate) struct Stack {
    base: *mut u8,
    layout: Layout,
}

impl Stack {
    fn allocate(size: usize) -> Stack {
        if size == 0 {
            panic!("Error: create_context: stack size must be non-zero.");
        }
        let layout = Layout::from_size_align(size, STACK_ALIGN)
            .unwrap_or_else(|_| panic!("Error: create_context: stack size {} is invalid.", size));
        let base = unsafe { alloc(layout) };
        if base.is_null() {
            handle_alloc_error(layout);
        }
        Stack { base, layout }
    }

    fn base(&self) -> *mut u8 {
        self.base
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) }
    }
}

/// A saved machine context together with the stack it executes on and the
/// continuation it is linked to.
///
/// The `ucontext_t` is boxed and never moved after capture: on glibc the
/// saved state contains pointers into its own storage.
pub(crate) struct Context {
    ucp: Box<libc::ucontext_t>,
    stack: Option<Stack>,
    link: Option<Box<Context>>,
}

impl Context {
    pub(crate) fn as_ptr(&self) -> *const libc::ucontext_t {
        &*self.ucp
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::ucontext_t {
        &mut *self.ucp
    }
}

/// Builds a suspended execution that starts at `entry` on its own stack.
/// When `entry` returns, the OS resumes `link`; the new context owns the
/// linked continuation so both are released together.
pub(crate) fn create_context(
    entry: ContextEntry,
    link: Option<Context>,
    stack_size: usize,
    argument: Option<*mut c_void>,
) -> Context {
    let mut ucp: Box<libc::ucontext_t> = Box::new(unsafe { mem::zeroed() });
    let stack = Stack::allocate(stack_size);
    let link = link.map(Box::new);
    unsafe {
        libc::getcontext(&mut *ucp);
        ucp.uc_stack.ss_sp = stack.base() as *mut c_void;
        ucp.uc_stack.ss_size = stack_size;
        ucp.uc_link = match link.as_ref() {
            Some(linked) => linked.as_ptr() as *mut libc::ucontext_t,
            None => ptr::null_mut(),
        };
        match argument {
            Some(argument) => libc::makecontext(&mut *ucp, entry, 1, argument),
            None => libc::makecontext(&mut *ucp, entry, 0),
        }
    }
    Context {
        ucp,
        stack: Some(stack),
        link,
    }
}

/// Empty storage for the host context; the first swap away from it fills it.
pub(crate) fn main_context() -> Context {
    Context {
        ucp: Box::new(unsafe { mem::zeroed() }),
        stack: None,
        link: None,
    }
}

pub(crate) unsafe fn swap(from: *mut Context, to: *const Context) {
    libc::swapcontext((*from).as_mut_ptr(), (*to).as_ptr());
}

pub(crate) unsafe fn set(to: *const Context) {
    libc::setcontext((*to).as_ptr());
}
