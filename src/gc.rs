//! Tri-color mark-sweep over the object graph. Roots are handed in by the VM (stack,
//! call frames, open upvalues, globals, the cached `init` string, and any
//! function-under-compilation the compiler chain is holding onto); tracing and sweeping
//! are owned entirely by `GarbageCollector`/`ObjectManager`.

use std::collections::HashSet;

use crate::{
    call_frame::CallFrame,
    objects::{
        object::{Object, ObjectType},
        object_manager::ObjectManager,
        object_upvalue::ObjectUpvalue,
    },
    table::Table,
    value::Value,
};

pub struct GarbageCollector {
    gray_stack: Vec<*mut Object>,
    white: HashSet<*mut Object>,
    stats: GcStats,
}

#[derive(Default, Debug, Clone)]
pub struct GcStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
    pub last_before_bytes: usize,
    pub last_after_bytes: usize,
    pub last_next_gc_bytes: usize,
}

#[cfg(feature = "gc_debug")]
macro_rules! gc_trace { ($($arg:tt)*) => { eprintln!("[gc] {}", format_args!($($arg)*)); } }
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace { ($($arg:tt)*) => {} }

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl GarbageCollector {
    pub fn new() -> Self {
        GarbageCollector { gray_stack: Vec::new(), white: HashSet::new(), stats: GcStats::default() }
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    fn mark_object(&mut self, ptr: *mut Object) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            if (*ptr).marked {
                return;
            }
            (*ptr).marked = true;
        }
        self.white.remove(&ptr);
        gc_trace!("mark {:p}", ptr);
        self.gray_stack.push(ptr);
    }

    fn mark_value(&mut self, value: &Value) {
        if value.is_object() {
            self.mark_object(value.as_object());
        }
    }

    fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key as *mut Object);
            self.mark_value(&value);
        }
    }

    /// Runs one full cycle: mark every root, trace until the gray stack is drained, weak
    /// pass over the intern set, sweep, and grow the next threshold. Returns the number
    /// of bytes reclaimed.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        &mut self,
        object_manager: &mut ObjectManager,
        stack: &[Value],
        stack_top: usize,
        frames: &[CallFrame],
        open_upvalues: &[*mut ObjectUpvalue],
        globals: &Table,
        init_string: *mut crate::objects::object_string::ObjectString,
        before_bytes: usize,
    ) -> usize {
        self.white.clear();
        for &ptr in object_manager.iter() {
            unsafe {
                (*ptr).marked = false;
            }
            self.white.insert(ptr);
        }

        for value in &stack[0..stack_top] {
            self.mark_value(value);
        }
        for frame in frames {
            self.mark_object(frame.closure as *mut Object);
        }
        for &upvalue in open_upvalues {
            self.mark_object(upvalue as *mut Object);
        }
        self.mark_table(globals);
        self.mark_object(init_string as *mut Object);

        self.trace_references();

        // Weak pass: the intern set never roots a string by itself.
        object_manager.strings_mut().remove_white();

        let freed = unsafe { object_manager.sweep() };
        let after_bytes = before_bytes.saturating_sub(freed);
        let next_gc = after_bytes.max(1) * 2;
        self.stats.cycles += 1;
        self.stats.total_freed_bytes += freed;
        self.stats.last_freed_bytes = freed;
        self.stats.last_before_bytes = before_bytes;
        self.stats.last_after_bytes = after_bytes;
        self.stats.last_next_gc_bytes = next_gc;
        gc_trace!(
            "cycle {} before={} freed={} after={} next_gc={}",
            self.stats.cycles,
            before_bytes,
            freed,
            after_bytes,
            next_gc
        );
        freed
    }

    fn trace_references(&mut self) {
        while let Some(ptr) = self.gray_stack.pop() {
            unsafe { self.blacken(ptr) };
        }
    }

    unsafe fn blacken(&mut self, ptr: *mut Object) {
        match (*ptr).obj_type {
            ObjectType::String => {}
            ObjectType::Native => {}
            ObjectType::Upvalue => {
                let upvalue = (*ptr).as_upvalue();
                self.mark_value(&*upvalue.location);
            }
            ObjectType::Function => {
                let function = (*ptr).as_function();
                for constant in function.chunk.iter_constants() {
                    self.mark_value(constant);
                }
            }
            ObjectType::Closure => {
                let closure = (*ptr).as_closure();
                self.mark_object(closure.function as *mut Object);
                for &upvalue in &closure.upvalues {
                    self.mark_object(upvalue as *mut Object);
                }
            }
            ObjectType::Class => {
                let class = (*ptr).as_class();
                self.mark_table(&class.methods);
            }
            ObjectType::Instance => {
                let instance = (*ptr).as_instance();
                self.mark_object(instance.class as *mut Object);
                self.mark_table(&instance.fields);
            }
            ObjectType::BoundMethod => {
                let bound = (*ptr).as_bound_method();
                self.mark_value(&bound.receiver);
                self.mark_object(bound.method as *mut Object);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_frame::CallFrame;
    use crate::value;

    #[test]
    fn collects_unreachable_strings() {
        let mut manager = ObjectManager::new();
        let keep = manager.intern_string("keep");
        manager.intern_string("drop1");
        manager.intern_string("drop2");

        let mut gc = GarbageCollector::new();
        let mut stack = [value::nil(); 8];
        stack[0] = value::object(keep as *mut Object);
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        let before = manager.bytes_allocated();
        gc.collect(&mut manager, &stack, 1, &frames, &open_upvalues, &globals, std::ptr::null_mut(), before);

        assert_eq!(manager.iter().count(), 1);
    }

    #[test]
    fn preserves_closure_and_function_graph() {
        let mut manager = ObjectManager::new();
        let function = manager.alloc_function(0, "f".to_string());
        let closure = manager.alloc_closure(function);
        manager.alloc_function(0, "unreachable".to_string());

        let mut gc = GarbageCollector::new();
        let mut stack = [value::nil(); 8];
        stack[0] = value::object(closure as *mut Object);
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        let before = manager.bytes_allocated();
        gc.collect(&mut manager, &stack, 1, &frames, &open_upvalues, &globals, std::ptr::null_mut(), before);

        assert_eq!(manager.iter().count(), 2);
    }

    #[test]
    fn marks_through_open_upvalue() {
        let mut manager = ObjectManager::new();
        let string = manager.intern_string("captured");
        let mut stack = [value::nil(); 8];
        stack[0] = value::object(string as *mut Object);
        let upvalue = manager.alloc_upvalue(&mut stack[0] as *mut Value);

        let mut gc = GarbageCollector::new();
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues = vec![upvalue];

        let before = manager.bytes_allocated();
        gc.collect(&mut manager, &stack, 0, &frames, &open_upvalues, &globals, std::ptr::null_mut(), before);

        assert_eq!(manager.iter().count(), 2);
    }
}
