use crate::{
    objects::{
        object::Object,
        object_bound_method::ObjectBoundMethod,
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_function::ObjectFunction,
        object_instance::ObjectInstance,
        object_native::{NativeFn, ObjectNative},
        object_string::{fnv1a_hash, ObjectString},
        object_upvalue::ObjectUpvalue,
    },
    table::Table,
    value::{self, Value},
};

/// Owns every heap object's allocation and the string intern table. Every `alloc_*`
/// method leaks a `Box` into a raw pointer (the GC, not Rust's ownership system, decides
/// when an object dies) and folds its `deep_size()` into `bytes_allocated`, which the VM
/// reads to decide when to run a collection.
pub struct ObjectManager {
    objects: Vec<*mut Object>,
    strings: Table,
    bytes_allocated: usize,
}

impl ObjectManager {
    pub fn new() -> Self {
        ObjectManager { objects: Vec::new(), strings: Table::new(), bytes_allocated: 0 }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    fn track<T>(&mut self, obj: Box<T>, obj_type_size: usize) -> *mut T {
        let ptr = Box::into_raw(obj);
        self.bytes_allocated += obj_type_size;
        self.objects.push(ptr as *mut Object);
        ptr
    }

    fn deep_size_of(ptr: *const Object) -> usize {
        unsafe { (*ptr).deep_size() }
    }

    /// Interns `text`: returns the existing `ObjectString` if one with equal bytes has
    /// already been allocated, otherwise allocates a new one and registers it so future
    /// calls with equal bytes return the same pointer.
    pub fn intern_string(&mut self, text: &str) -> *mut ObjectString {
        let hash = fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.strings.find_string(text, hash) {
            return existing;
        }
        let boxed = ObjectString::new(text);
        let size = boxed.object.shallow_size() + boxed.content.capacity();
        let ptr = self.track(boxed, size);
        // The intern table is really a set; the mapped value is never read back.
        self.strings.set(ptr, value::nil());
        ptr
    }

    pub fn alloc_function(&mut self, arity: u8, name: String) -> *mut ObjectFunction {
        let boxed = ObjectFunction::new(arity, name);
        let size = Self::deep_size_of(&boxed.object as *const Object);
        self.track(boxed, size)
    }

    pub fn alloc_native(&mut self, name: String, arity: u8, function: NativeFn) -> *mut ObjectNative {
        let boxed = ObjectNative::new(name, arity, function);
        let size = Self::deep_size_of(&boxed.object as *const Object);
        self.track(boxed, size)
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> *mut ObjectClosure {
        let boxed = ObjectClosure::new(function);
        let size = Self::deep_size_of(&boxed.object as *const Object);
        self.track(boxed, size)
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> *mut ObjectUpvalue {
        let boxed = ObjectUpvalue::new(location);
        let size = boxed.object.shallow_size();
        self.track(boxed, size)
    }

    pub fn alloc_class(&mut self, name: String) -> *mut ObjectClass {
        let boxed = ObjectClass::new(name);
        let size = Self::deep_size_of(&boxed.object as *const Object);
        self.track(boxed, size)
    }

    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> *mut ObjectInstance {
        let boxed = ObjectInstance::new(class);
        let size = boxed.object.shallow_size();
        self.track(boxed, size)
    }

    pub fn alloc_bound_method(&mut self, receiver: Value, method: *mut ObjectClosure) -> *mut ObjectBoundMethod {
        let boxed = ObjectBoundMethod::new(receiver, method);
        let size = boxed.object.shallow_size();
        self.track(boxed, size)
    }

    pub fn iter(&self) -> impl Iterator<Item = &*mut Object> {
        self.objects.iter()
    }

    pub fn strings_mut(&mut self) -> &mut Table {
        &mut self.strings
    }

    /// Frees every object whose mark bit is clear, returning the bytes reclaimed. The
    /// caller (the GC's sweep step) is responsible for having already marked everything
    /// reachable and for having run the weak pass over `strings` first.
    pub unsafe fn sweep(&mut self) -> usize {
        let mut freed = 0;
        let mut survivors = Vec::with_capacity(self.objects.len());
        for &ptr in self.objects.iter() {
            if (*ptr).marked {
                (*ptr).marked = false;
                survivors.push(ptr);
            } else {
                freed += (*ptr).deep_size();
                Self::free(ptr);
            }
        }
        self.objects = survivors;
        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
        freed
    }

    unsafe fn free(ptr: *mut Object) {
        use crate::objects::object::ObjectType;
        match (*ptr).obj_type {
            ObjectType::String => drop(Box::from_raw(ptr as *mut ObjectString)),
            ObjectType::Upvalue => drop(Box::from_raw(ptr as *mut ObjectUpvalue)),
            ObjectType::Function => drop(Box::from_raw(ptr as *mut ObjectFunction)),
            ObjectType::Native => drop(Box::from_raw(ptr as *mut ObjectNative)),
            ObjectType::Closure => drop(Box::from_raw(ptr as *mut ObjectClosure)),
            ObjectType::Class => drop(Box::from_raw(ptr as *mut ObjectClass)),
            ObjectType::Instance => drop(Box::from_raw(ptr as *mut ObjectInstance)),
            ObjectType::BoundMethod => drop(Box::from_raw(ptr as *mut ObjectBoundMethod)),
        }
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        for &ptr in &self.objects {
            unsafe { Self::free(ptr) };
        }
    }
}
