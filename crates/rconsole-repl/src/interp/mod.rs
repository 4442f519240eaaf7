//! A small expression language so the console is usable out of the box.
//!
//! Integers, floats, strings (`"..."`, `'...'`, backtick raw strings that may
//! span lines), booleans and `nil`; variables via `name = expr`; arithmetic,
//! comparison and logical operators; `{ ... }` blocks and `if`/`else`
//! expressions. The host can export values and functions under a module name,
//! reachable as `module.name`.

mod lexer;
mod parser;
mod value;

use std::collections::HashMap;
use std::io::{self, Write};

use thiserror::Error;

use crate::evaluator::Evaluator;
use parser::{BinaryOp, Expr, LogicalOp, Stmt, UnaryOp};

pub use value::{Builtin, NativeFn, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("undefined name '{0}'")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("{0}")]
    Runtime(String),
}

pub struct Interpreter {
    globals: HashMap<String, Value>,
    modules: HashMap<String, HashMap<String, Value>>,
    out: Box<dyn Write + Send>,
}

impl Interpreter {
    /// Interpreter whose `print` writes to stdout
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write + Send>) -> Self {
        let globals = Builtin::ALL
            .iter()
            .map(|b| (b.name().to_string(), Value::Builtin(*b)))
            .collect();
        Self {
            globals,
            modules: HashMap::new(),
            out,
        }
    }

    pub fn set_output(&mut self, out: Box<dyn Write + Send>) {
        self.out = out;
    }

    /// Make `value` reachable as `module.name`
    pub fn export(&mut self, module: &str, name: &str, value: impl Into<Value>) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
    }

    pub fn export_fn<F>(&mut self, module: &str, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.export(module, name, Value::native(f));
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Run `source`; the value of the last statement is the result
    pub fn run(&mut self, source: &str) -> Result<Option<Value>, EvalError> {
        let program = parser::parse(lexer::tokenize(source)?)?;
        let mut last = None;
        for stmt in &program {
            last = self.exec(stmt)?;
        }
        Ok(last.filter(|v| *v != Value::Nil))
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>, EvalError> {
        match stmt {
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.globals.insert(name.clone(), value);
                Ok(None)
            }
            Stmt::Expr(expr) => self.eval(expr).map(Some),
        }
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Value, EvalError> {
        let mut last = None;
        for stmt in body {
            last = self.exec(stmt)?;
        }
        Ok(last.unwrap_or(Value::Nil))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self.lookup(name),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::Logical(left, op, right) => {
                let left = expect_bool(self.eval(left)?, "logical operand")?;
                match (op, left) {
                    (LogicalOp::And, false) => Ok(Value::Bool(false)),
                    (LogicalOp::Or, true) => Ok(Value::Bool(true)),
                    _ => Ok(Value::Bool(expect_bool(self.eval(right)?, "logical operand")?)),
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, &args)
            }
            Expr::Member(base, name) => match self.eval(base)? {
                Value::Module(module) => self
                    .modules
                    .get(&module)
                    .and_then(|members| members.get(name))
                    .cloned()
                    .ok_or_else(|| EvalError::Undefined(format!("{}.{}", module, name))),
                other => Err(EvalError::Type(format!(
                    "{} has no member '{}'",
                    other.type_name(),
                    name
                ))),
            },
            Expr::Block(body) => self.exec_block(body),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if expect_bool(self.eval(cond)?, "if condition")? {
                    self.exec_block(then)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise)
                } else {
                    Ok(Value::Nil)
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if self.modules.contains_key(name) {
            return Ok(Value::Module(name.to_string()));
        }
        Err(EvalError::Undefined(name.to_string()))
    }

    fn call(&mut self, callee: Value, args: &[Value]) -> Result<Value, EvalError> {
        match callee {
            Value::Native(f) => f(args),
            Value::Builtin(builtin) => self.call_builtin(builtin, args),
            other => Err(EvalError::Type(format!("{} is not callable", other.type_name()))),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
        match builtin {
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(self.out, "{}", line)
                    .and_then(|_| self.out.flush())
                    .map_err(|e| EvalError::Runtime(format!("print failed: {}", e)))?;
                Ok(Value::Nil)
            }
            Builtin::Len => match single_arg(builtin, args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(EvalError::Type(format!("len of {}", other.type_name()))),
            },
            Builtin::Str => Ok(Value::Str(single_arg(builtin, args)?.to_string())),
            Builtin::Type => Ok(Value::Str(single_arg(builtin, args)?.type_name().to_string())),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for Interpreter {
    type Value = Value;
    type Error = EvalError;

    fn evaluate(&mut self, source: &str) -> Result<Option<Value>, EvalError> {
        self.run(source)
    }
}

fn single_arg(builtin: Builtin, args: &[Value]) -> Result<&Value, EvalError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(EvalError::Runtime(format!(
            "{}() takes 1 argument, got {}",
            builtin.name(),
            args.len()
        ))),
    }
}

fn expect_bool(value: Value, what: &str) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::Type(format!(
            "{} must be bool, got {}",
            what,
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(EvalError::Type(format!("cannot negate {}", other.type_name()))),
        (UnaryOp::Not, other) => Err(EvalError::Type(format!("cannot apply ! to {}", other.type_name()))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::Ne => return Ok(Value::Bool(left != right)),
        _ => {}
    }

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, a, b),
        (Value::Int(a), Value::Float(b)) => float_op(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float_op(op, a, b as f64),
        (Value::Float(a), Value::Float(b)) => float_op(op, a, b),
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Ok(Value::Str(a + &b)),
            BinaryOp::Lt => Ok(Value::Bool(a < b)),
            BinaryOp::Le => Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => Ok(Value::Bool(a > b)),
            BinaryOp::Ge => Ok(Value::Bool(a >= b)),
            _ => Err(EvalError::Type(format!("unsupported operator {:?} for strings", op))),
        },
        (left, right) => Err(EvalError::Type(format!(
            "unsupported operands for {:?}: {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let arithmetic = |result: Option<i64>| result.map(Value::Int).ok_or(EvalError::Overflow);
    match op {
        BinaryOp::Add => arithmetic(a.checked_add(b)),
        BinaryOp::Sub => arithmetic(a.checked_sub(b)),
        BinaryOp::Mul => arithmetic(a.checked_mul(b)),
        BinaryOp::Div if b == 0 => Err(EvalError::DivisionByZero),
        BinaryOp::Div => arithmetic(a.checked_div(b)),
        BinaryOp::Rem if b == 0 => Err(EvalError::DivisionByZero),
        BinaryOp::Rem => arithmetic(a.checked_rem(b)),
        BinaryOp::Lt => Ok(Value::Bool(a < b)),
        BinaryOp::Le => Ok(Value::Bool(a <= b)),
        BinaryOp::Gt => Ok(Value::Bool(a > b)),
        BinaryOp::Ge => Ok(Value::Bool(a >= b)),
        BinaryOp::Eq | BinaryOp::Ne => Ok(Value::Bool((a == b) == (op == BinaryOp::Eq))),
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    Ok(match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        BinaryOp::Div => Value::Float(a / b),
        BinaryOp::Rem => Value::Float(a % b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
    })
}
