use crate::objects::{
    object::{GcSize, Object, ObjectType},
    object_function::ObjectFunction,
    object_upvalue::ObjectUpvalue,
};

/// Wraps a raw function with the upvalues it closed over. Closures, not functions, are
/// what `CALL`/`INVOKE` actually dispatch to. Two closures built from the same `CLOSURE`
/// site share upvalue objects by identity (see `Vm::capture_upvalue`), never the whole
/// `ObjectClosure`.
#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction) -> Box<ObjectClosure> {
        let upvalue_count = unsafe { (*function).upvalue_count };
        Box::new(ObjectClosure {
            object: Object::new(ObjectType::Closure),
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        })
    }
}

impl GcSize for ObjectClosure {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectClosure>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.upvalues.capacity() * std::mem::size_of::<*mut ObjectUpvalue>()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectClosure {
    fn drop(&mut self) {
        super::object::trace_drop("closure", unsafe { (*self.function).display_name() });
    }
}
