use crate::{
    objects::object::{GcSize, Object, ObjectType},
    value::Value,
};

/// A native function's ABI: argument count plus a pointer to the first argument slot on
/// the VM stack (mirrors the call-site layout, so natives never copy arguments out of
/// place). Natives must not retain the pointer past the call, since the VM reclaims
/// those stack slots immediately afterward.
pub type NativeFn = fn(arg_count: usize, args: *const Value) -> Value;

#[repr(C)]
pub struct ObjectNative {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub function: NativeFn,
}

impl ObjectNative {
    pub fn new(name: String, arity: u8, function: NativeFn) -> Box<ObjectNative> {
        Box::new(ObjectNative {
            object: Object::new(ObjectType::Native),
            name,
            arity,
            function,
        })
    }

    /// Safety: `args` must point to `arg_count` live `Value`s on the VM stack.
    pub unsafe fn invoke(&self, arg_count: usize, args: *const Value) -> Value {
        (self.function)(arg_count, args)
    }
}

impl GcSize for ObjectNative {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectNative>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.name.capacity()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectNative {
    fn drop(&mut self) {
        super::object::trace_drop("native", &self.name);
    }
}
