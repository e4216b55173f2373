use crate::chunk::{Chunk, OpCode};
use crate::value;

#[allow(dead_code)]
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.line_at(offset));
    }

    let op = OpCode::from_byte(chunk.read(offset));
    match op {
        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal
        | OpCode::Class | OpCode::GetProperty | OpCode::SetProperty | OpCode::Method
        | OpCode::GetSuper => constant_instruction(op.name(), chunk, offset),

        OpCode::Nil | OpCode::True | OpCode::False | OpCode::Equal | OpCode::Greater
        | OpCode::Less | OpCode::Negate | OpCode::Add | OpCode::Subtract
        | OpCode::Multiply | OpCode::Divide | OpCode::Not | OpCode::Print | OpCode::Pop
        | OpCode::CloseUpvalue | OpCode::Return | OpCode::Inherit => {
            simple_instruction(op.name(), offset)
        }

        OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpvalue | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(op.name(), chunk, offset),

        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(op.name(), chunk, offset),

        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
            jump_instruction(op.name(), 1, chunk, offset)
        }
        OpCode::Loop => jump_instruction(op.name(), -1, chunk, offset),

        OpCode::Closure => closure_instruction(chunk, offset),

        OpCode::Unknown(byte) => {
            println!("Unknown opcode {byte}");
            offset + 1
        }
    }
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let mut jump = (chunk.read(offset + 1) as u16) << 8;
    jump |= chunk.read(offset + 2) as u16;
    let target = (offset as isize + 3 + sign as isize * jump as isize) as usize;
    println!("{:<16} {:>4} -> {}", name, offset, target);
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read(offset + 1);
    print!("{:<16} {:>4} '", name, constant);
    value::print_value(&chunk.get_constant(constant as usize));
    println!("'");
    offset + 2
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.read(offset + 1);
    println!("{:<16} {:>4}", name, slot);
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read(offset + 1);
    let arg_count = chunk.read(offset + 2);
    print!("{:<16} ({} args) {:>4} '", name, arg_count, constant);
    value::print_value(&chunk.get_constant(constant as usize));
    println!("'");
    offset + 3
}

fn closure_instruction(chunk: &Chunk, mut offset: usize) -> usize {
    let constant = chunk.read(offset + 1);
    offset += 2;
    print!("{:<16} {:>4} '", "OP_CLOSURE", constant);
    let function_value = chunk.get_constant(constant as usize);
    value::print_value(&function_value);
    println!("'");

    let upvalue_count = unsafe { function_value.as_function().upvalue_count };
    for _ in 0..upvalue_count {
        let is_local = chunk.read(offset);
        let index = chunk.read(offset + 1);
        println!(
            "{:04}      |                     {} {}",
            offset,
            if is_local == 1 { "local" } else { "upvalue" },
            index
        );
        offset += 2;
    }
    offset
}
