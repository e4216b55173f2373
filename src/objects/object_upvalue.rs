use crate::{
    objects::object::{GcSize, Object, ObjectType},
    value,
    value::Value,
};

/// Captures a variable that outlives the call frame that declared it.
///
/// Open: `location` points into a live stack slot and `next` threads this upvalue into
/// the VM's `open_upvalues` list, kept sorted by strictly descending `location`.
/// Closed: the value has been copied into `closed` and `location` now points at it;
/// closed upvalues are unlinked from `open_upvalues` and `next` is left dangling/unused.
#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub location: *mut Value,
    pub closed: Value,
    pub next: *mut ObjectUpvalue,
}

impl ObjectUpvalue {
    pub fn new(location: *mut Value) -> Box<ObjectUpvalue> {
        Box::new(ObjectUpvalue {
            object: Object::new(ObjectType::Upvalue),
            location,
            closed: value::nil(),
            next: std::ptr::null_mut(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.location != &self.closed as *const Value as *mut Value
    }

    /// Copy the live value into `closed` and repoint `location` at it.
    pub fn close(&mut self) {
        self.closed = unsafe { *self.location };
        self.location = &mut self.closed as *mut Value;
        self.next = std::ptr::null_mut();
    }
}

impl GcSize for ObjectUpvalue {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectUpvalue>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectUpvalue {
    fn drop(&mut self) {
        super::object::trace_drop("upvalue", if self.is_open() { "open" } else { "closed" });
    }
}
