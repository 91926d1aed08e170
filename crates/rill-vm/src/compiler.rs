use std::rc::Rc;

use rill_core::{CompiledFunction, RillError, Value};
use rill_parser::ast::{
    Block, Expression, FunctionLit, InfixOp, PrefixOp, Program, Statement, SwitchCase,
};

use crate::code::{make, Instructions};
use crate::opcodes::Op;
use crate::symbols::{Symbol, SymbolScope, SymbolTable};

/// What the compiler hands to the VM: the main instruction stream plus the
/// constant pool it references.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// Per-function working buffer. Entering a function literal pushes one of
/// these; leaving pops it and packages the buffer into a
/// `CompiledFunction`. The last two emitted instructions are tracked for
/// the strip-trailing-`Pop` rewrites.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// Single-pass AST → bytecode compiler with backpatched jumps.
///
/// Invariant: every compiled expression leaves exactly one value on the
/// stack; every compiled statement leaves zero.
pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Compiler {
        let mut symbols = SymbolTable::new();
        for (index, def) in rill_stdlib::BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, def.name);
        }
        Compiler {
            constants: Vec::new(),
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume with the symbol table and constants of a previous compile,
    /// so a REPL can carry bindings across lines.
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Compiler {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Surrender the symbol table and constants for the next REPL line.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbols, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), RillError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    // ── Statements ───────────────────────────────────────────────

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), RillError> {
        match statement {
            Statement::Let { name, value } => {
                // Reserve the symbol before compiling the value so that a
                // recursive function resolves its own name.
                let symbol = self.symbols.define(name);
                self.compile_expression(value)?;
                self.emit_set(&symbol);
            }
            Statement::Assign { name, value } => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| RillError::compile(format!("undefined variable {name}")))?;
                match symbol.scope {
                    SymbolScope::Builtin => {
                        return Err(RillError::compile(format!(
                            "cannot assign to builtin {name}"
                        )));
                    }
                    SymbolScope::Function => {
                        return Err(RillError::compile(format!(
                            "cannot assign to function {name}"
                        )));
                    }
                    _ => {}
                }
                self.compile_expression(value)?;
                self.emit_set(&symbol);
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Op::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), RillError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), RillError> {
        match expression {
            Expression::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| RillError::compile(format!("undefined variable {name}")))?;
                self.load_symbol(&symbol);
            }
            Expression::Integer(value) => {
                let index = self.add_constant(Value::Int(*value));
                self.emit(Op::Constant, &[index]);
            }
            Expression::Float(value) => {
                let index = self.add_constant(Value::Float(*value));
                self.emit(Op::Constant, &[index]);
            }
            Expression::Str(value) => {
                let index = self.add_constant(Value::string(value.clone()));
                self.emit(Op::Constant, &[index]);
            }
            Expression::Boolean(true) => {
                self.emit(Op::True, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(Op::False, &[]);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Minus => self.emit(Op::Minus, &[]),
                    PrefixOp::Not => self.emit(Op::Not, &[]),
                };
            }
            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(*operator, left, right)?,
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expression::Hash(pairs) => self.compile_hash(pairs)?,
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expression::While { condition, body } => self.compile_while(condition, body)?,
            Expression::Switch { value, cases } => self.compile_switch(value, cases)?,
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
            Expression::Function(literal) => self.compile_function_literal(literal)?,
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: InfixOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), RillError> {
        // There is no less-than opcode: swap the operands instead.
        if operator == InfixOp::Lt {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(Op::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        let op = match operator {
            InfixOp::Add => Op::Add,
            InfixOp::Sub => Op::Sub,
            InfixOp::Mul => Op::Mul,
            InfixOp::Div => Op::Div,
            InfixOp::Mod => Op::Mod,
            InfixOp::Gt => Op::GreaterThan,
            InfixOp::Eq => Op::Equal,
            InfixOp::NotEq => Op::NotEqual,
            InfixOp::And => Op::And,
            InfixOp::Or => Op::Or,
            InfixOp::Lt => unreachable!("handled above"),
        };
        self.emit(op, &[]);
        Ok(())
    }

    /// Hash keys are emitted in lexicographic order of their printed form,
    /// so the same literal compiles to the same bytes regardless of how
    /// the source ordered its pairs.
    fn compile_hash(&mut self, pairs: &[(Expression, Expression)]) -> Result<(), RillError> {
        let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
        sorted.sort_by_key(|pair| pair.0.to_string());

        for (key, value) in sorted {
            self.compile_expression(key)?;
            self.compile_expression(value)?;
        }
        self.emit(Op::Hash, &[pairs.len() * 2]);
        Ok(())
    }

    /// An if-expression produces a value on every path: a branch ending in
    /// `Pop` has the pop stripped, any other branch gets a trailing
    /// `Null`, and a missing alternative compiles to `Null`.
    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), RillError> {
        self.compile_expression(condition)?;
        let jump_false = self.emit(Op::JumpFalse, &[9999]);

        self.compile_block(consequence)?;
        if self.last_is(Op::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(Op::Null, &[]);
        }
        let jump_end = self.emit(Op::Jump, &[9999]);

        let after_consequence = self.current_position();
        self.change_operand(jump_false, after_consequence);

        match alternative {
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_is(Op::Pop) {
                    self.remove_last_pop();
                } else {
                    self.emit(Op::Null, &[]);
                }
            }
            None => {
                self.emit(Op::Null, &[]);
            }
        }

        let after_alternative = self.current_position();
        self.change_operand(jump_end, after_alternative);
        Ok(())
    }

    /// A while-expression loops until the condition is falsy and then
    /// yields null.
    fn compile_while(&mut self, condition: &Expression, body: &Block) -> Result<(), RillError> {
        let head = self.current_position();
        self.compile_expression(condition)?;
        let exit = self.emit(Op::JumpFalse, &[9999]);

        self.compile_block(body)?;
        self.emit(Op::Jump, &[head]);

        let after_body = self.current_position();
        self.change_operand(exit, after_body);
        self.emit(Op::Null, &[]);
        Ok(())
    }

    /// Each case compares the scrutinee against its value with `Equal` and
    /// falls through to the next case on mismatch. Case bodies are
    /// value-producing under the same strip-pop-or-null rule as `if`.
    fn compile_switch(
        &mut self,
        value: &Expression,
        cases: &[SwitchCase],
    ) -> Result<(), RillError> {
        let mut end_jumps = Vec::new();
        let mut default_body = None;

        for case in cases {
            let Some(case_value) = &case.value else {
                default_body = Some(&case.body);
                continue;
            };

            self.compile_expression(value)?;
            self.compile_expression(case_value)?;
            self.emit(Op::Equal, &[]);
            let skip = self.emit(Op::JumpFalse, &[9999]);

            self.compile_block(&case.body)?;
            if self.last_is(Op::Pop) {
                self.remove_last_pop();
            } else {
                self.emit(Op::Null, &[]);
            }
            end_jumps.push(self.emit(Op::Jump, &[9999]));

            let next_case = self.current_position();
            self.change_operand(skip, next_case);
        }

        match default_body {
            Some(body) => {
                self.compile_block(body)?;
                if self.last_is(Op::Pop) {
                    self.remove_last_pop();
                } else {
                    self.emit(Op::Null, &[]);
                }
            }
            None => {
                self.emit(Op::Null, &[]);
            }
        }

        let end = self.current_position();
        for jump in end_jumps {
            self.change_operand(jump, end);
        }
        Ok(())
    }

    fn compile_function_literal(&mut self, literal: &FunctionLit) -> Result<(), RillError> {
        self.enter_scope();

        if let Some(name) = &literal.name {
            self.symbols.define_function_name(name);
        }
        for parameter in &literal.parameters {
            self.symbols.define(parameter);
        }

        self.compile_block(&literal.body)?;

        // An implicit final expression becomes the return value; a body
        // with no trailing value returns null.
        if self.last_is(Op::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_is(Op::ReturnValue) {
            self.emit(Op::Return, &[]);
        }

        let (instructions, free_symbols, num_locals) = self.leave_scope();

        // Push the captured values in free-list order; their stack
        // positions become the GetFree indices inside the function.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: literal.parameters.len(),
            name: literal.name.clone(),
        };
        let index = self.add_constant(Value::Compiled(Rc::new(function)));
        self.emit(Op::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    // ── Emission helpers ─────────────────────────────────────────

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = self.current_scope();
        let position = scope.instructions.len();
        scope.instructions.extend(instruction);
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn emit_set(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::SetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::SetFree, &[symbol.index]),
            SymbolScope::Builtin | SymbolScope::Function => {
                unreachable!("assignment targets are rejected before emission")
            }
        };
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn current_scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("at least the root scope")
    }

    fn current_position(&self) -> usize {
        self.scopes.last().expect("at least the root scope").instructions.len()
    }

    fn last_is(&self, op: Op) -> bool {
        self.scopes
            .last()
            .and_then(|scope| scope.last)
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope();
        let last = scope.last.take().expect("a Pop was just emitted");
        scope.instructions.truncate(last.position);
        scope.last = scope.previous;
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: Vec<u8>) {
        let scope = self.current_scope();
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
    }

    /// Rewrite the operand of the jump at `position` once its target is
    /// known.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Op::from_u8(self.scopes.last().unwrap().instructions[position])
            .expect("backpatch target is an instruction boundary");
        self.replace_instruction(position, make(op, &[operand]));
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = {
            let scope = self.current_scope();
            let last = scope.last.as_mut().expect("a Pop was just emitted");
            last.opcode = Op::ReturnValue;
            last.position
        };
        self.replace_instruction(position, make(Op::ReturnValue, &[]));
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbols);
        self.symbols = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> (Instructions, Vec<Symbol>, usize) {
        let scope = self.scopes.pop().expect("scope underflow");
        let table = std::mem::take(&mut self.symbols);
        let num_locals = table.num_definitions();
        let (outer, free_symbols) = table.into_parts();
        self.symbols = outer.expect("never leaves the global scope");
        (scope.instructions, free_symbols, num_locals)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and compile `input` in one step.
pub fn compile_source(input: &str) -> Result<Bytecode, RillError> {
    let (program, errors) = rill_parser::parse(input);
    if !errors.is_empty() {
        return Err(RillError::Parse(errors.join("\n")));
    }
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}
