use crate::objects::object_closure::ObjectClosure;

/// One activation record. `slots_base` is an index into the VM's flat value stack: slot
/// zero of a frame holds the callee closure (for a plain function call) or the receiver
/// (for a method/initializer call), and user locals begin at `slots_base + 1`. `ip` is
/// the byte offset into `closure.function.chunk.code` of the next instruction to fetch;
/// the dispatch loop keeps the active frame's `ip` in a local for speed and writes it
/// back here before leaving the frame (on call, return, or runtime error) so line lookups
/// stay accurate.
pub struct CallFrame {
    pub closure: *mut ObjectClosure,
    pub ip: usize,
    pub slots_base: usize,
}

impl CallFrame {
    pub fn new(closure: *mut ObjectClosure, slots_base: usize) -> Self {
        CallFrame { closure, ip: 0, slots_base }
    }

    #[inline(always)]
    pub fn function(&self) -> &crate::objects::object_function::ObjectFunction {
        unsafe { &*(*self.closure).function }
    }
}
