use std::fmt;

/// A parsed program: an ordered sequence of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A braced sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;`
    Let { name: String, value: Expression },
    /// `name = value;` — reassignment of an existing binding.
    Assign { name: String, value: Expression },
    /// `return value;`
    Return(Expression),
    /// A bare expression, terminated by an optional semicolon.
    Expression(Expression),
}

/// A prefix (unary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Minus,
    Not,
}

/// An infix (binary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Eq,
    NotEq,
    And,
    Or,
}

/// One arm of a switch expression. `value` is `None` for the default arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Option<Expression>,
    pub body: Block,
}

/// A function literal. `name` is filled in when the literal is the direct
/// value of a let statement, enabling self-recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLit {
    pub name: Option<String>,
    pub parameters: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Str(String),
    Array(Vec<Expression>),
    /// Key-value pairs in source order; the compiler sorts them.
    Hash(Vec<(Expression, Expression)>),
    Prefix {
        operator: PrefixOp,
        right: Box<Expression>,
    },
    Infix {
        operator: InfixOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        condition: Box<Expression>,
        body: Block,
    },
    Switch {
        value: Box<Expression>,
        cases: Vec<SwitchCase>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Function(FunctionLit),
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Minus => f.write_str("-"),
            PrefixOp::Not => f.write_str("!"),
        }
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::And => "and",
            InfixOp::Or => "or",
        };
        f.write_str(op)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {name} = {value};"),
            Statement::Assign { name, value } => write!(f, "{name} = {value};"),
            Statement::Return(value) => write!(f, "return {value};"),
            Statement::Expression(expression) => write!(f, "{expression}"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => f.write_str(name),
            Expression::Integer(value) => write!(f, "{value}"),
            Expression::Float(value) => write!(f, "{value:?}"),
            Expression::Boolean(value) => write!(f, "{value}"),
            Expression::Str(value) => f.write_str(value),
            Expression::Array(elements) => {
                write!(f, "[{}]", join(elements))
            }
            Expression::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Expression::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expression::Index { left, index } => write!(f, "({left}[{index}])"),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {condition} {consequence}")?;
                if let Some(alternative) = alternative {
                    write!(f, " else {alternative}")?;
                }
                Ok(())
            }
            Expression::While { condition, body } => write!(f, "while {condition} {body}"),
            Expression::Switch { value, cases } => {
                write!(f, "switch ({value}) {{")?;
                for case in cases {
                    match &case.value {
                        Some(value) => write!(f, " case {value} {{ {} }}", case.body)?,
                        None => write!(f, " default {{ {} }}", case.body)?,
                    }
                }
                write!(f, " }}")
            }
            Expression::Call {
                function,
                arguments,
            } => write!(f, "{function}({})", join(arguments)),
            Expression::Function(function) => {
                write!(f, "func")?;
                if let Some(name) = &function.name {
                    write!(f, "<{name}>")?;
                }
                write!(f, "({}) {}", function.parameters.join(", "), function.body)
            }
        }
    }
}

fn join(expressions: &[Expression]) -> String {
    expressions
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
