use crate::{
    objects::{
        object::{GcSize, Object, ObjectType},
        object_closure::ObjectClosure,
    },
    value::Value,
};

/// The result of evaluating `instance.method` without calling it: the receiver is kept
/// alongside the method's closure so that a later `this` lookup inside the method body
/// still resolves, even though the bound method can be passed around and called far from
/// the property-access expression that produced it.
#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: *mut ObjectClosure,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: *mut ObjectClosure) -> Box<ObjectBoundMethod> {
        Box::new(ObjectBoundMethod {
            object: Object::new(ObjectType::BoundMethod),
            receiver,
            method,
        })
    }
}

impl GcSize for ObjectBoundMethod {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectBoundMethod>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectBoundMethod {
    fn drop(&mut self) {
        super::object::trace_drop("bound_method", unsafe {
            (*(*self.method).function).display_name()
        });
    }
}
