use crate::{
    objects::object::{GcSize, Object, ObjectType},
    table::Table,
};

/// A class's runtime identity: its name (for printing and error messages) and its own
/// method table. Inherited methods are copied into this table at `INHERIT` time (see
/// `Vm::run`'s `OpCode::Inherit` arm), so method lookup never has to walk a superclass
/// chain at call time.
#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: String,
    pub methods: Table,
}

impl ObjectClass {
    pub fn new(name: String) -> Box<ObjectClass> {
        Box::new(ObjectClass {
            object: Object::new(ObjectType::Class),
            name,
            methods: Table::new(),
        })
    }
}

impl GcSize for ObjectClass {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectClass>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.name.capacity()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectClass {
    fn drop(&mut self) {
        super::object::trace_drop("class", &self.name);
    }
}
