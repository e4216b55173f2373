use crate::objects::object::{GcSize, Object, ObjectType};

/// FNV-1a 32-bit, computed once at construction and reused for every table probe.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Immutable interned byte sequence. Two `ObjectString`s with equal bytes are always the
/// same object once they have passed through `ObjectManager::intern_string` — identity
/// comparison (`std::ptr::eq`) is therefore a valid equality check between interned
/// strings, but `content`/`hash` comparison is kept too since nothing prevents a caller
/// from allocating an un-interned `ObjectString` directly.
#[repr(C)]
pub struct ObjectString {
    pub object: Object,
    pub content: String,
    pub hash: u32,
}

impl ObjectString {
    pub fn new(content: &str) -> Box<ObjectString> {
        Box::new(ObjectString {
            object: Object::new(ObjectType::String),
            hash: fnv1a_hash(content.as_bytes()),
            content: content.to_string(),
        })
    }
}

impl GcSize for ObjectString {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectString>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.content.capacity()
    }
}

impl PartialEq for ObjectString {
    fn eq(&self, other: &ObjectString) -> bool {
        self.hash == other.hash && self.content == other.content
    }
}
impl Eq for ObjectString {}

#[cfg(feature = "debug_trace_object")]
impl Drop for ObjectString {
    fn drop(&mut self) {
        super::object::trace_drop("string", &self.content);
    }
}
