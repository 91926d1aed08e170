use std::rc::Rc;

use hashbrown::HashMap;
use rill_core::{value_eq, Closure, CompiledFunction, RillError, Value};

use crate::code::read_u16;
use crate::compiler::Bytecode;
use crate::opcodes::op;

/// Value stack capacity, in slots.
pub const STACK_SIZE: usize = 2048;
/// Globals array capacity; `SetGlobal`/`GetGlobal` operands index into it.
pub const GLOBALS_SIZE: usize = 65536;
/// Call depth limit.
pub const MAX_FRAMES: usize = 1024;

/// A call activation: the closure being executed, an instruction pointer,
/// and the stack slot its locals start at.
struct Frame {
    closure: Rc<Closure>,
    /// Starts at -1; the dispatch loop pre-increments.
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Frame {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    fn instructions(&self) -> &[u8] {
        &self.closure.function.instructions
    }
}

/// The stack-based bytecode interpreter.
///
/// The compiler guarantees a known stack delta at every opcode boundary;
/// the dispatch loop relies on that and performs no balance checking of
/// its own.
pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Next free slot; `stack[sp - 1]` is the top.
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl VM {
    pub fn new(bytecode: Bytecode) -> VM {
        VM::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Reuse a globals array from a previous run, so a REPL keeps its
    /// bindings across lines.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> VM {
        // The main program runs as a synthetic zero-argument closure.
        let main_function = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
            name: None,
        };
        let main_closure = Rc::new(Closure::new(Rc::new(main_function), Vec::new()));

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        VM {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Surrender the globals array for the next REPL line.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped off the stack: the program's result.
    pub fn last_popped(&self) -> Value {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), RillError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as isize - 1 {
            let ip = {
                let frame = self.current_frame_mut();
                frame.ip += 1;
                frame.ip as usize
            };
            let op_byte = self.current_frame().instructions()[ip];

            match op_byte {
                op::CONSTANT => {
                    let index = self.read_u16_operand(ip + 1);
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                op::POP => {
                    self.pop();
                }
                op::NULL => self.push(Value::Null)?,
                op::TRUE => self.push(Value::Bool(true))?,
                op::FALSE => self.push(Value::Bool(false))?,

                op::ADD
                | op::SUB
                | op::MUL
                | op::DIV
                | op::MOD
                | op::EQUAL
                | op::NOT_EQUAL
                | op::GREATER_THAN
                | op::AND
                | op::OR => self.execute_binary_operation(op_byte)?,

                op::MINUS => self.execute_minus_operator()?,
                op::NOT => {
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }

                op::ARRAY => {
                    let count = self.read_u16_operand(ip + 1);
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::array(elements))?;
                }
                op::HASH => {
                    let count = self.read_u16_operand(ip + 1);
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                op::INDEX => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                op::JUMP => {
                    let target = read_u16(self.current_frame().instructions(), ip + 1);
                    self.current_frame_mut().ip = target as isize - 1;
                }
                op::JUMP_FALSE => {
                    let target = self.read_u16_operand(ip + 1);
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as isize - 1;
                    }
                }

                op::SET_GLOBAL => {
                    let index = self.read_u16_operand(ip + 1);
                    self.globals[index] = self.pop();
                }
                op::GET_GLOBAL => {
                    let index = self.read_u16_operand(ip + 1);
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                op::SET_LOCAL => {
                    let slot = self.read_u8_operand(ip + 1);
                    let base = self.current_frame().base_pointer;
                    self.stack[base + slot] = self.pop();
                }
                op::GET_LOCAL => {
                    let slot = self.read_u8_operand(ip + 1);
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }
                op::SET_FREE => {
                    let slot = self.read_u8_operand(ip + 1);
                    let value = self.pop();
                    self.current_frame().closure.free.borrow_mut()[slot] = value;
                }
                op::GET_FREE => {
                    let slot = self.read_u8_operand(ip + 1);
                    let value = self.current_frame().closure.free.borrow()[slot].clone();
                    self.push(value)?;
                }
                op::GET_BUILTIN => {
                    let index = self.read_u8_operand(ip + 1);
                    self.push(Value::Builtin(&rill_stdlib::BUILTINS[index]))?;
                }

                op::CLOSURE => {
                    let const_index = self.read_u16_operand(ip + 1);
                    let num_free = self.read_u8_operand(ip + 3);
                    self.push_closure(const_index, num_free)?;
                }
                op::CURRENT_CLOSURE => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(closure))?;
                }

                op::CALL => {
                    let num_args = self.read_u8_operand(ip + 1);
                    self.execute_call(num_args)?;
                }
                op::RETURN_VALUE => {
                    let return_value = self.pop();
                    let frame = self.frames.pop().expect("a frame to return from");
                    if self.frames.is_empty() {
                        // Top-level return: the program ends here, with
                        // the value as its result.
                        self.stack[self.sp] = return_value;
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                op::RETURN => {
                    let frame = self.frames.pop().expect("a frame to return from");
                    if self.frames.is_empty() {
                        self.stack[self.sp] = Value::Null;
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                other => {
                    return Err(RillError::runtime(format!("opcode {other} undefined")));
                }
            }
        }

        Ok(())
    }

    // ── Frame and stack plumbing ─────────────────────────────────

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("at least the main frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least the main frame")
    }

    fn read_u16_operand(&mut self, at: usize) -> usize {
        let frame = self.frames.last_mut().expect("at least the main frame");
        let value = read_u16(&frame.closure.function.instructions, at);
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self, at: usize) -> usize {
        let frame = self.frames.last_mut().expect("at least the main frame");
        let value = frame.closure.function.instructions[at] as usize;
        frame.ip += 1;
        value
    }

    fn push(&mut self, value: Value) -> Result<(), RillError> {
        if self.sp >= STACK_SIZE {
            return Err(RillError::runtime("stack overflow"));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    // ── Operators ────────────────────────────────────────────────

    fn execute_binary_operation(&mut self, op_byte: u8) -> Result<(), RillError> {
        let right = self.pop();
        let left = self.pop();

        // `and`/`or` act on truthiness of any two values.
        match op_byte {
            op::AND => return self.push(Value::Bool(left.is_truthy() && right.is_truthy())),
            op::OR => return self.push(Value::Bool(left.is_truthy() || right.is_truthy())),
            _ => {}
        }

        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => self.execute_integer_operation(op_byte, *a, *b),
            (Value::Float(a), Value::Float(b)) => self.execute_float_operation(op_byte, *a, *b),
            (Value::Str(a), Value::Str(b)) => {
                let a = Rc::clone(a);
                let b = Rc::clone(b);
                self.execute_string_operation(op_byte, &a, &b)
            }
            _ => match op_byte {
                op::EQUAL => self.push(Value::Bool(value_eq(&left, &right))),
                op::NOT_EQUAL => self.push(Value::Bool(!value_eq(&left, &right))),
                _ => Err(RillError::runtime(format!(
                    "unsupported types for binary operation: {} {}",
                    left.type_name(),
                    right.type_name()
                ))),
            },
        }
    }

    fn execute_integer_operation(&mut self, op_byte: u8, a: i64, b: i64) -> Result<(), RillError> {
        let result = match op_byte {
            op::ADD => Value::Int(a.wrapping_add(b)),
            op::SUB => Value::Int(a.wrapping_sub(b)),
            op::MUL => Value::Int(a.wrapping_mul(b)),
            op::DIV => {
                if b == 0 {
                    return Err(RillError::runtime("division by zero"));
                }
                Value::Int(a.wrapping_div(b))
            }
            op::MOD => {
                if b == 0 {
                    return Err(RillError::runtime("division by zero"));
                }
                Value::Int(a.wrapping_rem(b))
            }
            op::EQUAL => Value::Bool(a == b),
            op::NOT_EQUAL => Value::Bool(a != b),
            op::GREATER_THAN => Value::Bool(a > b),
            _ => {
                return Err(RillError::runtime(format!(
                    "unknown integer operator: {op_byte}"
                )));
            }
        };
        self.push(result)
    }

    fn execute_float_operation(&mut self, op_byte: u8, a: f64, b: f64) -> Result<(), RillError> {
        let result = match op_byte {
            op::ADD => Value::Float(a + b),
            op::SUB => Value::Float(a - b),
            op::MUL => Value::Float(a * b),
            op::DIV => Value::Float(a / b),
            // Remainder keeps the dividend's sign.
            op::MOD => Value::Float(a % b),
            op::EQUAL => Value::Bool(a == b),
            op::NOT_EQUAL => Value::Bool(a != b),
            op::GREATER_THAN => Value::Bool(a > b),
            _ => {
                return Err(RillError::runtime(format!(
                    "unknown float operator: {op_byte}"
                )));
            }
        };
        self.push(result)
    }

    fn execute_string_operation(&mut self, op_byte: u8, a: &str, b: &str) -> Result<(), RillError> {
        let result = match op_byte {
            op::ADD => Value::string(format!("{a}{b}")),
            op::EQUAL => Value::Bool(a == b),
            op::NOT_EQUAL => Value::Bool(a != b),
            _ => {
                return Err(RillError::runtime(format!(
                    "unknown string operator: {op_byte}"
                )));
            }
        };
        self.push(result)
    }

    fn execute_minus_operator(&mut self) -> Result<(), RillError> {
        let operand = self.pop();
        match operand {
            Value::Int(value) => self.push(Value::Int(value.wrapping_neg())),
            Value::Float(value) => self.push(Value::Float(-value)),
            other => Err(RillError::runtime(format!(
                "unsupported type for negation: {}",
                other.type_name()
            ))),
        }
    }

    // ── Containers ───────────────────────────────────────────────

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, RillError> {
        let mut pairs = HashMap::with_capacity((end - start) / 2);
        for slot in (start..end).step_by(2) {
            let key = self.stack[slot].clone();
            let value = self.stack[slot + 1].clone();
            let Some(hash_key) = key.hash_key() else {
                return Err(RillError::runtime(format!(
                    "unusable as hash key: {}",
                    key.type_name()
                )));
            };
            pairs.insert(hash_key, (key, value));
        }
        Ok(Value::hash(pairs))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<(), RillError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Int(i)) => {
                let elements = elements.borrow();
                let value = if *i < 0 || *i as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[*i as usize].clone()
                };
                drop(elements);
                self.push(value)
            }
            (Value::Str(value), Value::Int(i)) => {
                let element = if *i < 0 {
                    Value::Null
                } else {
                    value
                        .chars()
                        .nth(*i as usize)
                        .map(|ch| Value::string(ch.to_string()))
                        .unwrap_or(Value::Null)
                };
                self.push(element)
            }
            (Value::Hash(pairs), _) => {
                let Some(key) = index.hash_key() else {
                    return Err(RillError::runtime(format!(
                        "unusable as hash key: {}",
                        index.type_name()
                    )));
                };
                let value = pairs
                    .borrow()
                    .get(&key)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RillError::runtime(format!(
                "index operator not supported: {}",
                left.type_name()
            ))),
        }
    }

    // ── Calls and closures ───────────────────────────────────────

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RillError> {
        let constant = self.constants[const_index].clone();
        let Value::Compiled(function) = constant else {
            return Err(RillError::runtime(format!("not a function: {constant}")));
        };

        // Free variables sit on the stack in the order the compiler pushed
        // them; that order fixes the GetFree indices inside the function.
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure::new(function, free))))
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RillError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RillError::runtime("calling non-closure and non-builtin")),
        }
    }

    /// The arguments already sit above the callee slot; they become the
    /// first locals of the new frame, and the stack pointer jumps past the
    /// remaining local slots.
    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RillError> {
        if num_args != closure.function.num_parameters {
            return Err(RillError::runtime(format!(
                "wrong number of arguments: want={}, got={}",
                closure.function.num_parameters, num_args
            )));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RillError::runtime("frame stack overflow"));
        }

        let base_pointer = self.sp - num_args;
        if base_pointer + closure.function.num_locals > STACK_SIZE {
            return Err(RillError::runtime("stack overflow"));
        }

        let num_locals = closure.function.num_locals;
        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(
        &mut self,
        builtin: &'static rill_core::BuiltinDef,
        num_args: usize,
    ) -> Result<(), RillError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args);
        // Drop the arguments and the callee slot, then push the result.
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }
}
