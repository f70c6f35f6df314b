//! Tree-walking evaluator for the restricted scripting subset.
//!
//! The execution namespace exposes only the safe builtins listed in
//! `BUILTINS`; there is no import, file, process, attribute, or reflection
//! capability anywhere in the evaluator. Output goes to bounded buffers.

use std::collections::HashMap;

use tierbox_core::types::TRUNCATION_MARKER;

use super::parser::{BinOp, Expr, Stmt, UnOp};

/// Builtin names available inside the restricted namespace.
pub const BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "abs", "min", "max", "sum", "sorted", "range",
    "list", "tuple", "dict", "enumerate",
];

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Dict(v) => !v.is_empty(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `str()`-style rendering: strings are unquoted.
fn display(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => repr(other),
    }
}

/// `repr()`-style rendering: strings are quoted.
fn repr(v: &Value) -> String {
    match v {
        Value::None => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Str(s) => format!("'{}'", s),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(repr).collect();
            if items.len() == 1 {
                format!("({},)", inner[0])
            } else {
                format!("({})", inner.join(", "))
            }
        }
        Value::Dict(pairs) => {
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

// =============================================================================
// Bounded output buffer
// =============================================================================

/// Character-capped capture buffer for stdout/stderr.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: String,
    cap: usize,
    chars: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
            chars: 0,
            truncated: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        for c in text.chars() {
            if self.chars >= self.cap {
                self.truncated = true;
                self.buf.push_str(TRUNCATION_MARKER);
                return;
            }
            self.buf.push(c);
            self.chars += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

// =============================================================================
// Interpreter
// =============================================================================

enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Interp {
    env: HashMap<String, Value>,
    pub stdout: OutputBuffer,
}

type EvalResult<T> = Result<T, String>;

impl Interp {
    pub fn new(output_cap: usize) -> Self {
        Self {
            env: HashMap::new(),
            stdout: OutputBuffer::new(output_cap),
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> EvalResult<()> {
        for stmt in program {
            if !matches!(self.exec(stmt)?, Flow::Normal) {
                return Err("'break' or 'continue' outside loop".to_string());
            }
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { name, op, value } => {
                let rhs = self.eval(value)?;
                let result = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self.lookup(name)?;
                        binary(*op, &current, &rhs)?
                    }
                };
                self.env.insert(name.clone(), result);
                Ok(Flow::Normal)
            }
            Stmt::IndexAssign { name, index, value } => {
                let index = self.eval(index)?;
                let value = self.eval(value)?;
                let target = self
                    .env
                    .get_mut(name)
                    .ok_or_else(|| format!("name '{}' is not defined", name))?;
                match target {
                    Value::List(items) => {
                        let i = list_index(&index, items.len())?;
                        items[i] = value;
                    }
                    Value::Dict(pairs) => {
                        if let Some(slot) = pairs.iter_mut().find(|(k, _)| *k == index) {
                            slot.1 = value;
                        } else {
                            pairs.push((index, value));
                        }
                    }
                    other => {
                        return Err(format!(
                            "'{}' does not support item assignment",
                            other.type_name()
                        ))
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                branches,
                else_body,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(else_body)
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { var, iter, body } => {
                let iterable = self.eval(iter)?;
                let items = self.iterate(&iterable)?;
                for item in items {
                    self.env.insert(var.clone(), item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn exec_block(&mut self, body: &[Stmt]) -> EvalResult<Flow> {
        for stmt in body {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("name '{}' is not defined", name))
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit => Ok(Value::None),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values: EvalResult<Vec<Value>> =
                    items.iter().map(|e| self.eval(e)).collect();
                Ok(Value::List(values?))
            }
            Expr::Tuple(items) => {
                let values: EvalResult<Vec<Value>> =
                    items.iter().map(|e| self.eval(e)).collect();
                Ok(Value::Tuple(values?))
            }
            Expr::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.eval(k)?, self.eval(v)?));
                }
                Ok(Value::Dict(out))
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnOp::Neg => match v {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(format!("bad operand type for unary -: '{}'", other.type_name())),
                    },
                    UnOp::Pos => match v {
                        Value::Int(_) | Value::Float(_) => Ok(v),
                        other => Err(format!("bad operand type for unary +: '{}'", other.type_name())),
                    },
                }
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if !l.truthy() {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, &l, &r)
            }
            Expr::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                match &obj {
                    Value::List(items) | Value::Tuple(items) => {
                        let i = list_index(&index, items.len())?;
                        Ok(items[i].clone())
                    }
                    Value::Str(s) => {
                        let chars: Vec<char> = s.chars().collect();
                        let i = list_index(&index, chars.len())?;
                        Ok(Value::Str(chars[i].to_string()))
                    }
                    Value::Dict(pairs) => pairs
                        .iter()
                        .find(|(k, _)| *k == index)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| format!("KeyError: {}", repr(&index))),
                    other => Err(format!("'{}' is not subscriptable", other.type_name())),
                }
            }
            Expr::Call(name, args) => {
                let values: EvalResult<Vec<Value>> = args.iter().map(|e| self.eval(e)).collect();
                self.call_builtin(name, values?)
            }
        }
    }

    fn iterate(&self, v: &Value) -> EvalResult<Vec<Value>> {
        match v {
            Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Dict(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
            other => Err(format!("'{}' is not iterable", other.type_name())),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        match name {
            "print" => {
                let rendered: Vec<String> = args.iter().map(display).collect();
                self.stdout.push(&rendered.join(" "));
                self.stdout.push("\n");
                Ok(Value::None)
            }
            "len" => {
                let [v] = one(name, args)?;
                let n = match &v {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) | Value::Tuple(items) => items.len(),
                    Value::Dict(pairs) => pairs.len(),
                    other => return Err(format!("object of type '{}' has no len()", other.type_name())),
                };
                Ok(Value::Int(n as i64))
            }
            "str" => {
                let [v] = one(name, args)?;
                Ok(Value::Str(display(&v)))
            }
            "int" => {
                let [v] = one(name, args)?;
                match v {
                    Value::Int(n) => Ok(Value::Int(n)),
                    Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                    Value::Bool(b) => Ok(Value::Int(b as i64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| format!("invalid literal for int(): '{}'", s)),
                    other => Err(format!("int() argument must not be '{}'", other.type_name())),
                }
            }
            "float" => {
                let [v] = one(name, args)?;
                match v {
                    Value::Int(n) => Ok(Value::Float(n as f64)),
                    Value::Float(f) => Ok(Value::Float(f)),
                    Value::Bool(b) => Ok(Value::Float(b as i64 as f64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| format!("could not convert string to float: '{}'", s)),
                    other => Err(format!("float() argument must not be '{}'", other.type_name())),
                }
            }
            "bool" => {
                let [v] = one(name, args)?;
                Ok(Value::Bool(v.truthy()))
            }
            "abs" => {
                let [v] = one(name, args)?;
                match v {
                    Value::Int(n) => Ok(Value::Int(n.abs())),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(format!("bad operand type for abs(): '{}'", other.type_name())),
                }
            }
            "min" | "max" => {
                let items = if args.len() == 1 {
                    self.iterate(&args[0])?
                } else {
                    args
                };
                if items.is_empty() {
                    return Err(format!("{}() arg is an empty sequence", name));
                }
                let mut best = items[0].clone();
                for item in &items[1..] {
                    let take = if name == "min" {
                        compare(item, &best)? < 0
                    } else {
                        compare(item, &best)? > 0
                    };
                    if take {
                        best = item.clone();
                    }
                }
                Ok(best)
            }
            "sum" => {
                let [v] = one(name, args)?;
                let mut acc = Value::Int(0);
                for item in self.iterate(&v)? {
                    acc = binary(BinOp::Add, &acc, &item)?;
                }
                Ok(acc)
            }
            "sorted" => {
                let [v] = one(name, args)?;
                let mut items = self.iterate(&v)?;
                let mut err = None;
                items.sort_by(|a, b| match compare(a, b) {
                    Ok(ord) => ord.cmp(&0),
                    Err(e) => {
                        err.get_or_insert(e);
                        std::cmp::Ordering::Equal
                    }
                });
                match err {
                    Some(e) => Err(e),
                    None => Ok(Value::List(items)),
                }
            }
            "range" => {
                let (start, stop, step) = match args.len() {
                    1 => (0, int_arg(name, &args[0])?, 1),
                    2 => (int_arg(name, &args[0])?, int_arg(name, &args[1])?, 1),
                    3 => (
                        int_arg(name, &args[0])?,
                        int_arg(name, &args[1])?,
                        int_arg(name, &args[2])?,
                    ),
                    n => return Err(format!("range() takes 1 to 3 arguments, got {}", n)),
                };
                if step == 0 {
                    return Err("range() step must not be zero".to_string());
                }
                let mut items = Vec::new();
                let mut i = start;
                while (step > 0 && i < stop) || (step < 0 && i > stop) {
                    items.push(Value::Int(i));
                    i += step;
                }
                Ok(Value::List(items))
            }
            "list" => match args.len() {
                0 => Ok(Value::List(Vec::new())),
                1 => Ok(Value::List(self.iterate(&args[0])?)),
                n => Err(format!("list() takes at most 1 argument, got {}", n)),
            },
            "tuple" => match args.len() {
                0 => Ok(Value::Tuple(Vec::new())),
                1 => Ok(Value::Tuple(self.iterate(&args[0])?)),
                n => Err(format!("tuple() takes at most 1 argument, got {}", n)),
            },
            "dict" => match args.len() {
                0 => Ok(Value::Dict(Vec::new())),
                n => Err(format!("dict() takes no arguments here, got {}", n)),
            },
            "enumerate" => {
                let [v] = one(name, args)?;
                let items = self.iterate(&v)?;
                Ok(Value::List(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| Value::Tuple(vec![Value::Int(i as i64), item]))
                        .collect(),
                ))
            }
            other => Err(format!("name '{}' is not defined", other)),
        }
    }
}

fn one(name: &str, args: Vec<Value>) -> EvalResult<[Value; 1]> {
    match <[Value; 1]>::try_from(args) {
        Ok(arr) => Ok(arr),
        Err(args) => Err(format!(
            "{}() takes exactly 1 argument, got {}",
            name,
            args.len()
        )),
    }
}

fn int_arg(name: &str, v: &Value) -> EvalResult<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(format!(
            "{}() argument must be an integer, not '{}'",
            name,
            other.type_name()
        )),
    }
}

fn list_index(index: &Value, len: usize) -> EvalResult<usize> {
    let Value::Int(i) = index else {
        return Err(format!("indices must be integers, not '{}'", index.type_name()));
    };
    let idx = if *i < 0 { *i + len as i64 } else { *i };
    if idx < 0 || idx as usize >= len {
        return Err("index out of range".to_string());
    }
    Ok(idx as usize)
}

/// Three-way comparison for orderable values (-1, 0, 1).
fn compare(a: &Value, b: &Value) -> EvalResult<i32> {
    let ord = match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => x.partial_cmp(y),
        _ => None,
    };
    match ord {
        Some(std::cmp::Ordering::Less) => Ok(-1),
        Some(std::cmp::Ordering::Equal) => Ok(0),
        Some(std::cmp::Ordering::Greater) => Ok(1),
        None => Err(format!(
            "'{}' and '{}' are not orderable",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> EvalResult<Value> {
    use BinOp::*;
    match op {
        Eq => Ok(Value::Bool(values_equal(l, r))),
        Ne => Ok(Value::Bool(!values_equal(l, r))),
        Lt => Ok(Value::Bool(compare(l, r)? < 0)),
        Le => Ok(Value::Bool(compare(l, r)? <= 0)),
        Gt => Ok(Value::Bool(compare(l, r)? > 0)),
        Ge => Ok(Value::Bool(compare(l, r)? >= 0)),
        In | NotIn => {
            let found = match r {
                Value::List(items) | Value::Tuple(items) => items.iter().any(|v| values_equal(v, l)),
                Value::Dict(pairs) => pairs.iter().any(|(k, _)| values_equal(k, l)),
                Value::Str(hay) => match l {
                    Value::Str(needle) => hay.contains(needle.as_str()),
                    other => {
                        return Err(format!(
                            "'in <string>' requires string, not '{}'",
                            other.type_name()
                        ))
                    }
                },
                other => return Err(format!("'{}' is not a container", other.type_name())),
            };
            Ok(Value::Bool(if op == In { found } else { !found }))
        }
        Add => match (l, r) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
            (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{}{}", x, y))),
            (Value::List(x), Value::List(y)) => {
                let mut out = x.clone();
                out.extend(y.iter().cloned());
                Ok(Value::List(out))
            }
            _ => numeric(op, l, r, |x, y| x + y),
        },
        Sub => match (l, r) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_sub(*y))),
            _ => numeric(op, l, r, |x, y| x - y),
        },
        Mul => match (l, r) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_mul(*y))),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(s.repeat((*n).max(0) as usize)))
            }
            _ => numeric(op, l, r, |x, y| x * y),
        },
        Div => {
            let (x, y) = as_floats(op, l, r)?;
            if y == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(x / y))
        }
        FloorDiv => match (l, r) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err("division by zero".to_string());
                }
                Ok(Value::Int(x.div_euclid(*y)))
            }
            _ => {
                let (x, y) = as_floats(op, l, r)?;
                if y == 0.0 {
                    return Err("division by zero".to_string());
                }
                Ok(Value::Float((x / y).floor()))
            }
        },
        Mod => match (l, r) {
            (Value::Int(x), Value::Int(y)) => {
                if *y == 0 {
                    return Err("division by zero".to_string());
                }
                Ok(Value::Int(x.rem_euclid(*y)))
            }
            _ => {
                let (x, y) = as_floats(op, l, r)?;
                if y == 0.0 {
                    return Err("division by zero".to_string());
                }
                Ok(Value::Float(x.rem_euclid(y)))
            }
        },
        Pow => match (l, r) {
            (Value::Int(x), Value::Int(y)) if *y >= 0 => {
                Ok(Value::Int(x.wrapping_pow((*y).min(u32::MAX as i64) as u32)))
            }
            _ => {
                let (x, y) = as_floats(op, l, r)?;
                Ok(Value::Float(x.powf(y)))
            }
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        _ => a == b,
    }
}

fn as_floats(op: BinOp, l: &Value, r: &Value) -> EvalResult<(f64, f64)> {
    let to_f = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(*b as i64 as f64),
        _ => None,
    };
    match (to_f(l), to_f(r)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            l.type_name(),
            r.type_name()
        )),
    }
}

fn numeric(op: BinOp, l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> EvalResult<Value> {
    let (x, y) = as_floats(op, l, r)?;
    Ok(Value::Float(f(x, y)))
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::super::parser::Parser;
    use super::*;

    fn run(source: &str) -> Result<String, String> {
        let program = Parser::new(tokenize(source)?).parse_program()?;
        let mut interp = Interp::new(10_000);
        interp.run(&program)?;
        Ok(interp.stdout.into_string())
    }

    #[test]
    fn test_print_arithmetic() {
        assert_eq!(run("print(2+2)").unwrap(), "4\n");
    }

    #[test]
    fn test_float_division_renders_python_style() {
        assert_eq!(run("print(8/2)").unwrap(), "4.0\n");
    }

    #[test]
    fn test_variables_and_augmented_assign() {
        assert_eq!(run("x = 10\nx += 5\nprint(x)").unwrap(), "15\n");
    }

    #[test]
    fn test_if_else() {
        let src = "x = 3\nif x > 5:\n    print('big')\nelse:\n    print('small')";
        assert_eq!(run(src).unwrap(), "small\n");
    }

    #[test]
    fn test_for_loop_with_range() {
        assert_eq!(run("for i in range(3):\n    print(i)").unwrap(), "0\n1\n2\n");
    }

    #[test]
    fn test_while_with_break() {
        let src = "i = 0\nwhile True:\n    i += 1\n    if i == 3:\n        break\nprint(i)";
        assert_eq!(run(src).unwrap(), "3\n");
    }

    #[test]
    fn test_collections() {
        assert_eq!(run("xs = [3, 1, 2]\nprint(sorted(xs))").unwrap(), "[1, 2, 3]\n");
        assert_eq!(run("d = {'a': 1}\nd['b'] = 2\nprint(d['b'])").unwrap(), "2\n");
        assert_eq!(run("print(len('hello'))").unwrap(), "5\n");
        assert_eq!(run("print(sum([1, 2, 3]))").unwrap(), "6\n");
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(run("print('ab' + 'cd')").unwrap(), "abcd\n");
        assert_eq!(run("print('ha' * 3)").unwrap(), "hahaha\n");
        assert_eq!(run("print('ell' in 'hello')").unwrap(), "True\n");
    }

    #[test]
    fn test_enumerate_and_membership() {
        assert_eq!(
            run("for pair in enumerate(['a', 'b']):\n    print(pair[0], pair[1])").unwrap(),
            "0 a\n1 b\n"
        );
        assert_eq!(run("print(2 not in [1, 3])").unwrap(), "True\n");
    }

    #[test]
    fn test_undefined_name_is_runtime_error() {
        let err = run("print(nope)").unwrap_err();
        assert!(err.contains("'nope'"));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(run("print(1/0)").unwrap_err().contains("zero"));
    }

    #[test]
    fn test_no_import_capability_exists() {
        // "open" and friends simply do not exist in the namespace
        let err = run("open('/etc/passwd')").unwrap_err();
        assert!(err.contains("'open'"));
    }

    #[test]
    fn test_output_truncation() {
        let program = Parser::new(tokenize("for i in range(100):\n    print('xxxxxxxxxx')").unwrap())
            .parse_program()
            .unwrap();
        let mut interp = Interp::new(50);
        interp.run(&program).unwrap();
        let out = interp.stdout.into_string();
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.chars().count() < 50 + TRUNCATION_MARKER.len() + 1);
    }
}
