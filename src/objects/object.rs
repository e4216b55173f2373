use std::mem::size_of;

use super::{
    object_bound_method::ObjectBoundMethod,
    object_class::ObjectClass,
    object_closure::ObjectClosure,
    object_function::ObjectFunction,
    object_instance::ObjectInstance,
    object_native::ObjectNative,
    object_string::ObjectString,
    object_upvalue::ObjectUpvalue,
};

/// Discriminant stored in every object header. Mirrors the `{string, upvalue, function,
/// native, closure, class, instance, bound_method}` tag set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Upvalue,
    Function,
    Native,
    Closure,
    Class,
    Instance,
    BoundMethod,
}

/// Every heap object begins with this header: a type tag and the GC mark bit.
/// Concrete object structs embed this as their first field (`#[repr(C)]`) so a
/// `*mut Object` can always be reinterpreted as a `*mut Concrete` once the tag is known.
#[repr(C)]
pub struct Object {
    pub obj_type: ObjectType,
    pub marked: bool,
}

impl Object {
    pub fn new(obj_type: ObjectType) -> Self {
        Object { obj_type, marked: false }
    }

    pub fn shallow_size(&self) -> usize {
        size_of::<Object>()
    }

    /// Dispatch to the concrete type's `deep_size`. Safety: `self` must be the header of
    /// an object actually allocated as the type named by `obj_type`.
    pub unsafe fn deep_size(&self) -> usize {
        match self.obj_type {
            ObjectType::String => (*(self as *const _ as *const ObjectString)).deep_size(),
            ObjectType::Upvalue => (*(self as *const _ as *const ObjectUpvalue)).deep_size(),
            ObjectType::Function => (*(self as *const _ as *const ObjectFunction)).deep_size(),
            ObjectType::Native => (*(self as *const _ as *const ObjectNative)).deep_size(),
            ObjectType::Closure => (*(self as *const _ as *const ObjectClosure)).deep_size(),
            ObjectType::Class => (*(self as *const _ as *const ObjectClass)).deep_size(),
            ObjectType::Instance => (*(self as *const _ as *const ObjectInstance)).deep_size(),
            ObjectType::BoundMethod => (*(self as *const _ as *const ObjectBoundMethod)).deep_size(),
        }
    }

    #[inline]
    pub unsafe fn as_string(&self) -> &ObjectString {
        debug_assert!(matches!(self.obj_type, ObjectType::String));
        &*(self as *const _ as *const ObjectString)
    }
    #[inline]
    pub unsafe fn as_upvalue(&self) -> &ObjectUpvalue {
        debug_assert!(matches!(self.obj_type, ObjectType::Upvalue));
        &*(self as *const _ as *const ObjectUpvalue)
    }
    #[inline]
    pub unsafe fn as_function(&self) -> &ObjectFunction {
        debug_assert!(matches!(self.obj_type, ObjectType::Function));
        &*(self as *const _ as *const ObjectFunction)
    }
    #[inline]
    pub unsafe fn as_native(&self) -> &ObjectNative {
        debug_assert!(matches!(self.obj_type, ObjectType::Native));
        &*(self as *const _ as *const ObjectNative)
    }
    #[inline]
    pub unsafe fn as_closure(&self) -> &ObjectClosure {
        debug_assert!(matches!(self.obj_type, ObjectType::Closure));
        &*(self as *const _ as *const ObjectClosure)
    }
    #[inline]
    pub unsafe fn as_class(&self) -> &ObjectClass {
        debug_assert!(matches!(self.obj_type, ObjectType::Class));
        &*(self as *const _ as *const ObjectClass)
    }
    #[inline]
    pub unsafe fn as_instance(&self) -> &ObjectInstance {
        debug_assert!(matches!(self.obj_type, ObjectType::Instance));
        &*(self as *const _ as *const ObjectInstance)
    }
    #[inline]
    pub unsafe fn as_bound_method(&self) -> &ObjectBoundMethod {
        debug_assert!(matches!(self.obj_type, ObjectType::BoundMethod));
        &*(self as *const _ as *const ObjectBoundMethod)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Object) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for Object {}

/// Bytes owned by a GC object, for `bytesAllocated` accounting.
pub trait GcSize {
    fn shallow_size(&self) -> usize;
    fn deep_size(&self) -> usize;
}

#[cfg(feature = "debug_trace_object")]
pub(crate) fn trace_drop(kind: &str, detail: &str) {
    eprintln!("[object] drop {kind} {detail}");
}
