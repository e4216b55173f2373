use crate::{
    objects::{
        object::{GcSize, Object, ObjectType},
        object_class::ObjectClass,
    },
    table::Table,
};

/// An instance of a class: the class it was made from, plus its own field table. Field
/// access (`GET_PROPERTY`) checks `fields` first and only falls through to the class's
/// `methods` table (producing a bound method) when no field with that name exists.
#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: *mut ObjectClass,
    pub fields: Table,
}

impl ObjectInstance {
    pub fn new(class: *mut ObjectClass) -> Box<ObjectInstance> {
        Box::new(ObjectInstance {
            object: Object::new(ObjectType::Instance),
            class,
            fields: Table::new(),
        })
    }
}

impl GcSize for ObjectInstance {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectInstance>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectInstance {
    fn drop(&mut self) {
        super::object::trace_drop("instance", unsafe { &(*self.class).name });
    }
}
