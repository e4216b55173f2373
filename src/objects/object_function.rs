use crate::{
    chunk::Chunk,
    objects::object::{GcSize, Object, ObjectType},
};

/// A compiled function body. Immutable once the compiler finishes with it. `name` is
/// empty for the implicit top-level script function.
#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    pub name: String,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: String) -> Box<ObjectFunction> {
        Box::new(ObjectFunction {
            object: Object::new(ObjectType::Function),
            arity,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        })
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "script"
        } else {
            self.name.as_str()
        }
    }
}

impl GcSize for ObjectFunction {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectFunction>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.name.capacity() + self.chunk.deep_size()
    }
}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectFunction {
    fn drop(&mut self) {
        super::object::trace_drop("function", self.display_name());
    }
}
