use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    call_frame::CallFrame,
    chunk::OpCode,
    compiler::Parser,
    gc::GarbageCollector,
    objects::{
        object::{Object, ObjectType},
        object_bound_method::ObjectBoundMethod,
        object_class::ObjectClass,
        object_closure::ObjectClosure,
        object_manager::ObjectManager,
        object_string::ObjectString,
        object_upvalue::ObjectUpvalue,
    },
    table::Table,
    value::{self, Value},
};

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;
const GC_HEAP_GROW_FACTOR: usize = 2;
const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    InterpretOk,
    InterpretCompileError,
    InterpretRuntimeError,
}

/// The tree-walk-free bytecode interpreter: a flat value stack, a bounded call-frame
/// stack, the globals table, and the heap (`ObjectManager`) it shares with the garbage
/// collector. One `Vm` can run several top-level `interpret` calls in a row (the REPL
/// does this), reusing globals and interned strings across calls.
pub struct Vm {
    object_manager: ObjectManager,
    gc: GarbageCollector,
    next_gc: usize,

    stack: Box<[Value; STACK_MAX]>,
    stack_top: usize,

    frames: Vec<CallFrame>,
    open_upvalues: Vec<*mut ObjectUpvalue>,

    globals: Table,
    init_string: *mut ObjectString,
}

impl Vm {
    pub fn new() -> Self {
        let mut object_manager = ObjectManager::new();
        let init_string = object_manager.intern_string("init");

        let mut vm = Vm {
            object_manager,
            gc: GarbageCollector::new(),
            next_gc: INITIAL_GC_THRESHOLD,
            stack: Box::new([value::nil(); STACK_MAX]),
            stack_top: 0,
            frames: Vec::with_capacity(FRAMES_MAX),
            open_upvalues: Vec::new(),
            globals: Table::new(),
            init_string,
        };
        vm.define_native("clock", 0, native_clock);
        vm
    }

    fn define_native(&mut self, name: &str, arity: u8, function: crate::objects::object_native::NativeFn) {
        let name_ptr = self.object_manager.intern_string(name);
        self.push(value::object(name_ptr as *mut Object));
        let native_ptr = self.object_manager.alloc_native(name.to_string(), arity, function);
        self.push(value::object(native_ptr as *mut Object));
        self.globals.set(name_ptr, self.stack[self.stack_top - 1]);
        self.pop();
        self.pop();
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = {
            let mut parser = Parser::new(&mut self.object_manager);
            parser.compile(source)
        };

        let function = match function {
            Some(function) => function,
            None => return InterpretResult::InterpretCompileError,
        };

        self.push(value::object(function as *mut Object));
        let closure = self.object_manager.alloc_closure(function);
        self.pop();
        self.push(value::object(closure as *mut Object));

        if !self.call(closure, 0) {
            return InterpretResult::InterpretRuntimeError;
        }

        self.run()
    }

    fn push(&mut self, value: Value) {
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    fn pop(&mut self) -> Value {
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack_top - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack_top = 0;
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn runtime_error(&mut self, message: &str) {
        eprintln!("{}", message);

        for frame in self.frames.iter().rev() {
            let function = unsafe { &*(*frame.closure).function };
            let instruction = frame.ip - 1;
            let line = function.chunk.line_at(instruction);
            eprintln!("[line {}] in {}", line, function.display_name());
        }

        self.reset_stack();
    }

    fn maybe_collect_garbage(&mut self) {
        if !cfg!(feature = "stress_gc") && self.object_manager.bytes_allocated() <= self.next_gc {
            return;
        }
        let before = self.object_manager.bytes_allocated();
        let freed = self.gc.collect(
            &mut self.object_manager,
            &self.stack[..],
            self.stack_top,
            &self.frames,
            &self.open_upvalues,
            &self.globals,
            self.init_string,
            before,
        );
        let after = before.saturating_sub(freed);
        self.next_gc = after.max(1) * GC_HEAP_GROW_FACTOR;
    }

    fn call(&mut self, closure: *mut ObjectClosure, arg_count: u8) -> bool {
        let function = unsafe { &*(*closure).function };
        if arg_count as usize != function.arity as usize {
            self.runtime_error(&format!("Expected {} arguments but got {}.", function.arity, arg_count));
            return false;
        }

        if self.frames.len() == FRAMES_MAX {
            self.runtime_error("Stack overflow.");
            return false;
        }

        let slots_base = self.stack_top - arg_count as usize - 1;
        self.frames.push(CallFrame::new(closure, slots_base));
        true
    }

    fn call_value(&mut self, callee: Value, arg_count: u8) -> bool {
        if callee.is_object() {
            unsafe {
                match (*callee.as_object()).obj_type {
                    ObjectType::Closure => {
                        return self.call(callee.as_object() as *mut ObjectClosure, arg_count);
                    }
                    ObjectType::Native => {
                        let native = callee.as_native();
                        if arg_count != native.arity {
                            self.runtime_error(&format!(
                                "Expected {} arguments but got {}.",
                                native.arity, arg_count
                            ));
                            return false;
                        }
                        let args_start = self.stack_top - arg_count as usize;
                        let result = native.invoke(arg_count as usize, self.stack[args_start..].as_ptr());
                        self.stack_top -= arg_count as usize + 1;
                        self.push(result);
                        return true;
                    }
                    ObjectType::Class => {
                        let class = callee.as_object() as *mut ObjectClass;
                        let instance = self.object_manager.alloc_instance(class);
                        let slot = self.stack_top - arg_count as usize - 1;
                        self.stack[slot] = value::object(instance as *mut Object);

                        if let Some(initializer) = (*class).methods.get(self.init_string) {
                            return self.call(initializer.as_object() as *mut ObjectClosure, arg_count);
                        } else if arg_count != 0 {
                            self.runtime_error(&format!("Expected 0 arguments but got {}.", arg_count));
                            return false;
                        }
                        return true;
                    }
                    ObjectType::BoundMethod => {
                        let bound = callee.as_object() as *mut ObjectBoundMethod;
                        let slot = self.stack_top - arg_count as usize - 1;
                        self.stack[slot] = (*bound).receiver;
                        return self.call((*bound).method, arg_count);
                    }
                    _ => {}
                }
            }
        }
        self.runtime_error("Can only call functions and classes.");
        false
    }

    unsafe fn invoke_from_class(&mut self, class: *mut ObjectClass, name: *mut ObjectString, arg_count: u8) -> bool {
        match (*class).methods.get(name) {
            Some(method) => self.call(method.as_object() as *mut ObjectClosure, arg_count),
            None => {
                self.runtime_error(&format!("Undefined property '{}'.", (*name).content));
                false
            }
        }
    }

    unsafe fn invoke(&mut self, name: *mut ObjectString, arg_count: u8) -> bool {
        let receiver = self.peek(arg_count as usize);
        if !receiver.is_instance() {
            self.runtime_error("Only instances have methods.");
            return false;
        }

        let instance = receiver.as_object() as *mut crate::objects::object_instance::ObjectInstance;
        if let Some(field) = (*instance).fields.get(name) {
            let slot = self.stack_top - arg_count as usize - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }

        self.invoke_from_class((*instance).class, name, arg_count)
    }

    unsafe fn bind_method(&mut self, class: *mut ObjectClass, name: *mut ObjectString) -> bool {
        let method = match (*class).methods.get(name) {
            Some(method) => method,
            None => {
                self.runtime_error(&format!("Undefined property '{}'.", (*name).content));
                return false;
            }
        };

        let receiver = self.peek(0);
        let bound = self.object_manager.alloc_bound_method(receiver, method.as_object() as *mut ObjectClosure);
        self.pop();
        self.push(value::object(bound as *mut Object));
        true
    }

    fn capture_upvalue(&mut self, local_slot: usize) -> *mut ObjectUpvalue {
        let location = &mut self.stack[local_slot] as *mut Value;

        let mut insert_at = self.open_upvalues.len();
        for (index, &upvalue) in self.open_upvalues.iter().enumerate() {
            let existing_location = unsafe { (*upvalue).location };
            if existing_location == location {
                return upvalue;
            }
            if existing_location < location {
                insert_at = index;
                break;
            }
        }

        let upvalue = self.object_manager.alloc_upvalue(location);
        self.open_upvalues.insert(insert_at, upvalue);
        upvalue
    }

    fn close_upvalues(&mut self, from_slot: usize) {
        let from_location = &mut self.stack[from_slot] as *mut Value;
        while let Some(&upvalue) = self.open_upvalues.first() {
            if unsafe { (*upvalue).location } < from_location {
                break;
            }
            unsafe { (*upvalue).close() };
            self.open_upvalues.remove(0);
        }
    }

    unsafe fn define_method(&mut self, name: *mut ObjectString) {
        let method = self.peek(0);
        let class = self.peek(1).as_object() as *mut ObjectClass;
        (*class).methods.set(name, method);
        self.pop();
    }

    fn is_falsey(value: Value) -> bool {
        value.is_falsey()
    }

    fn concatenate(&mut self) {
        let b = self.peek(0);
        let a = self.peek(1);
        let joined = unsafe { format!("{}{}", a.as_string().content, b.as_string().content) };
        let ptr = self.object_manager.intern_string(&joined);
        self.pop();
        self.pop();
        self.push(value::object(ptr as *mut Object));
    }

    fn run(&mut self) -> InterpretResult {
        loop {
            #[cfg(feature = "debug_trace_execution")]
            debug_feature::trace(self);

            let instruction = self.read_byte();
            let op = OpCode::from_byte(instruction);

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(value::nil()),
                OpCode::True => self.push(value::boolean(true)),
                OpCode::False => self.push(value::boolean(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().slots_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().slots_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            let message = format!("Undefined variable '{}'.", unsafe { &(*name).content });
                            self.runtime_error(&message);
                            return InterpretResult::InterpretRuntimeError;
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0);
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    if self.globals.set(name, self.peek(0)) {
                        self.globals.delete(name);
                        let message = format!("Undefined variable '{}'.", unsafe { &(*name).content });
                        self.runtime_error(&message);
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = unsafe { (*self.current_frame().closure).upvalues[slot] };
                    self.push(unsafe { *(*upvalue).location });
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = unsafe { (*self.current_frame().closure).upvalues[slot] };
                    unsafe { *(*upvalue).location = self.peek(0) };
                }
                OpCode::GetProperty => {
                    if !self.peek(0).is_instance() {
                        self.runtime_error("Only instances have properties.");
                        return InterpretResult::InterpretRuntimeError;
                    }

                    let instance =
                        self.peek(0).as_object() as *mut crate::objects::object_instance::ObjectInstance;
                    let name = self.read_string();

                    unsafe {
                        if let Some(value) = (*instance).fields.get(name) {
                            self.pop();
                            self.push(value);
                        } else if !self.bind_method((*instance).class, name) {
                            return InterpretResult::InterpretRuntimeError;
                        }
                    }
                }
                OpCode::SetProperty => {
                    if !self.peek(1).is_instance() {
                        self.runtime_error("Only instances have fields.");
                        return InterpretResult::InterpretRuntimeError;
                    }

                    let instance =
                        self.peek(1).as_object() as *mut crate::objects::object_instance::ObjectInstance;
                    let name = self.read_string();
                    let value = self.peek(0);
                    unsafe { (*instance).fields.set(name, value) };

                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = self.pop().as_object() as *mut ObjectClass;
                    if !unsafe { self.bind_method(superclass, name) } {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(value::boolean(a == b));
                }
                OpCode::Greater => {
                    if let Err(result) = self.binary_compare(|a, b| a > b) {
                        return result;
                    }
                }
                OpCode::Less => {
                    if let Err(result) = self.binary_compare(|a, b| a < b) {
                        return result;
                    }
                }
                OpCode::Add => {
                    if self.peek(0).is_string() && self.peek(1).is_string() {
                        self.concatenate();
                    } else if self.peek(0).is_number() && self.peek(1).is_number() {
                        let b = self.pop().as_number();
                        let a = self.pop().as_number();
                        self.push(value::number(a + b));
                    } else {
                        self.runtime_error("Operands must be two numbers or two strings.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Subtract => {
                    if let Err(result) = self.binary_number(|a, b| a - b) {
                        return result;
                    }
                }
                OpCode::Multiply => {
                    if let Err(result) = self.binary_number(|a, b| a * b) {
                        return result;
                    }
                }
                OpCode::Divide => {
                    if let Err(result) = self.binary_number(|a, b| a / b) {
                        return result;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(value::boolean(Self::is_falsey(value)));
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        self.runtime_error("Operand must be a number.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                    let value = self.pop().as_number();
                    self.push(value::number(-value));
                }
                OpCode::Print => {
                    let value = self.pop();
                    value::print_value(&value);
                    println!();
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if Self::is_falsey(self.peek(0)) {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = self.read_short();
                    if !Self::is_falsey(self.peek(0)) {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    if !self.call_value(callee, arg_count) {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    if !unsafe { self.invoke(name, arg_count) } {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    let superclass = self.pop().as_object() as *mut ObjectClass;
                    if !unsafe { self.invoke_from_class(superclass, name, arg_count) } {
                        return InterpretResult::InterpretRuntimeError;
                    }
                }
                OpCode::Closure => {
                    let function_value = self.read_constant();
                    let function = function_value.as_object() as *mut crate::objects::object_function::ObjectFunction;
                    let closure_ptr = self.object_manager.alloc_closure(function);
                    self.push(value::object(closure_ptr as *mut Object));

                    let upvalue_count = unsafe { (*function).upvalue_count };
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let base = self.current_frame().slots_base;
                            self.capture_upvalue(base + index)
                        } else {
                            unsafe { (*self.current_frame().closure).upvalues[index] }
                        };
                        unsafe { (*closure_ptr).upvalues.push(upvalue) };
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack_top - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let slots_base = self.current_frame().slots_base;
                    self.close_upvalues(slots_base);

                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.pop();
                        return InterpretResult::InterpretOk;
                    }

                    self.stack_top = slots_base;
                    self.push(result);
                }
                OpCode::Class => {
                    let name = self.read_string();
                    let class_name = unsafe { (*name).content.clone() };
                    let class_ptr = self.object_manager.alloc_class(class_name);
                    self.push(value::object(class_ptr as *mut Object));
                }
                OpCode::Inherit => {
                    let superclass_value = self.peek(1);
                    if !superclass_value.is_class() {
                        self.runtime_error("Superclass must be a class.");
                        return InterpretResult::InterpretRuntimeError;
                    }
                    let superclass = superclass_value.as_object() as *mut ObjectClass;
                    let subclass = self.peek(0).as_object() as *mut ObjectClass;
                    unsafe { (*superclass).methods.copy_all_into(&mut (*subclass).methods) };
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string();
                    unsafe { self.define_method(name) };
                }
                OpCode::Unknown(byte) => {
                    self.runtime_error(&format!("Unknown opcode {byte}."));
                    return InterpretResult::InterpretRuntimeError;
                }
            }

            self.maybe_collect_garbage();
        }
    }

    fn binary_number(&mut self, op: fn(f64, f64) -> f64) -> Result<(), InterpretResult> {
        if !self.peek(0).is_number() || !self.peek(1).is_number() {
            self.runtime_error("Operands must be numbers.");
            return Err(InterpretResult::InterpretRuntimeError);
        }
        let b = self.pop().as_number();
        let a = self.pop().as_number();
        self.push(value::number(op(a, b)));
        Ok(())
    }

    fn binary_compare(&mut self, op: fn(f64, f64) -> bool) -> Result<(), InterpretResult> {
        if !self.peek(0).is_number() || !self.peek(1).is_number() {
            self.runtime_error("Operands must be numbers.");
            return Err(InterpretResult::InterpretRuntimeError);
        }
        let b = self.pop().as_number();
        let a = self.pop().as_number();
        self.push(value::boolean(op(a, b)));
        Ok(())
    }

    #[inline(always)]
    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("call frame stack is empty")
    }

    #[inline(always)]
    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("call frame stack is empty")
    }

    #[inline(always)]
    fn read_byte(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let function = unsafe { (*frame.closure).function };
        let byte = unsafe { (*function).chunk.read(frame.ip) };
        frame.ip += 1;
        byte
    }

    #[inline(always)]
    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let function = unsafe { &*(*self.current_frame().closure).function };
        function.chunk.get_constant(index)
    }

    fn read_string(&mut self) -> *mut ObjectString {
        unsafe { self.read_constant().as_object() as *mut ObjectString }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn native_clock(_arg_count: usize, _args: *const Value) -> Value {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    value::number(millis)
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::Vm;
    use crate::{debug, value};

    pub fn trace(vm: &Vm) {
        print!("          ");
        for slot in 0..vm.stack_top {
            print!("[ ");
            value::print_value(&vm.stack[slot]);
            print!(" ]");
        }
        println!();

        let frame = vm.current_frame();
        let function = unsafe { &*(*frame.closure).function };
        debug::disassemble_instruction(&function.chunk, frame.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_expression() {
        let mut vm = Vm::new();
        let result = vm.interpret("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_comparison_expression() {
        let mut vm = Vm::new();
        let result = vm.interpret("print !(5 - 4 > 3 * 2 == !nil);");
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_string_concatenate() {
        let mut vm = Vm::new();
        let result = vm.interpret("print \"foo\" + \"bar\";");
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_global_and_local_variables() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "var a = 1;
             {
                var b = 2;
                a = a + b;
             }
             print a;",
        );
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_closure_captures_by_reference() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "fun makeCounter() {
                var count = 0;
                fun counter() {
                    count = count + 1;
                    return count;
                }
                return counter;
             }
             var counter = makeCounter();
             print counter();
             print counter();",
        );
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_classes_and_inheritance() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "class A {
                greet() {
                    print \"A\";
                }
             }
             class B < A {
                greet() {
                    super.greet();
                    print \"B\";
                }
             }
             B().greet();",
        );
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_initializer_returns_instance() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "class Point {
                init(x) {
                    this.x = x;
                }
             }
             print Point(7).x;",
        );
        assert_eq!(result, InterpretResult::InterpretOk);
    }

    #[test]
    fn test_runtime_error_on_undefined_property() {
        let mut vm = Vm::new();
        let result = vm.interpret("nil.x;");
        assert_eq!(result, InterpretResult::InterpretRuntimeError);
    }

    #[test]
    fn test_stress_gc_does_not_crash() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "fun makeString(n) {
                var s = \"x\";
                var i = 0;
                while (i < n) {
                    s = s + \"x\";
                    i = i + 1;
                }
                return s;
             }
             print makeString(50);",
        );
        assert_eq!(result, InterpretResult::InterpretOk);
    }
}
