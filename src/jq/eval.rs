//! Lazy expression evaluator.
//!
//! Every filter evaluates to a [`ValueIter`]: a boxed iterator that produces
//! one `Result` per output and does no work until it is pulled. Consumers
//! that stop early (`first`, `limit`, a caller reading one result) never
//! evaluate the outputs they skip.
//!
//! Errors are ordinary items of the stream, so `try`, `?` and `//` can
//! intercept them and everything else passes them along.

use std::rc::Rc;

use super::builtins::eval_builtin;
use super::expr::{ArithOp, CompareOp, Expr, ObjectKey, StringPart};
use super::value::{Map, Value};

/// Stream of outputs produced by a filter.
pub type ValueIter<'a> = Box<dyn Iterator<Item = Result<Value, EvalError>> + 'a>;

/// Error raised while running a filter.
///
/// jq errors carry an arbitrary JSON payload (`error({code: 1})`); the
/// message is the payload itself when it is a string.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    value: Value,
}

impl EvalError {
    /// Error with a plain text message.
    pub fn new(message: impl Into<String>) -> Self {
        EvalError {
            value: Value::String(message.into()),
        }
    }

    /// Error carrying an arbitrary payload, as raised by `error(v)`.
    pub fn from_value(value: Value) -> Self {
        EvalError { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Human-readable message. Non-string payloads are rendered as JSON.
    pub fn message(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => format!("{} (not a string)", other),
        }
    }
}

impl core::fmt::Display for EvalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for EvalError {}

/// Variable scope.
///
/// A chain of single bindings ending in the caller-supplied globals.
/// Cloning is a reference-count bump, so closures capture scopes freely.
#[derive(Clone)]
pub struct Env<'a> {
    scope: Rc<Scope<'a>>,
}

enum Scope<'a> {
    Global(&'a Map),
    Local {
        name: String,
        value: Value,
        parent: Rc<Scope<'a>>,
    },
}

impl<'a> Env<'a> {
    /// Scope whose only variables are `globals`.
    pub fn new(globals: &'a Map) -> Self {
        Env {
            scope: Rc::new(Scope::Global(globals)),
        }
    }

    /// A child scope with `$name` bound to `value`.
    pub fn bind(&self, name: &str, value: Value) -> Env<'a> {
        Env {
            scope: Rc::new(Scope::Local {
                name: name.to_string(),
                value,
                parent: Rc::clone(&self.scope),
            }),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut scope = &*self.scope;
        loop {
            match scope {
                Scope::Global(globals) => return globals.get(name),
                Scope::Local {
                    name: bound,
                    value,
                    parent,
                } => {
                    if bound == name {
                        return Some(value);
                    }
                    scope = parent;
                }
            }
        }
    }
}

pub(crate) fn once<'a>(value: Value) -> ValueIter<'a> {
    Box::new(core::iter::once(Ok(value)))
}

pub(crate) fn fail<'a>(error: EvalError) -> ValueIter<'a> {
    Box::new(core::iter::once(Err(error)))
}

pub(crate) fn empty<'a>() -> ValueIter<'a> {
    Box::new(core::iter::empty())
}

pub(crate) fn from_result<'a>(result: Result<Value, EvalError>) -> ValueIter<'a> {
    Box::new(core::iter::once(result))
}

/// Short JSON rendering of a value for error messages, truncated like jq's.
pub(crate) fn describe(value: &Value) -> String {
    const MAX_CHARS: usize = 11;
    let text = value.to_json();
    if text.chars().count() > MAX_CHARS + 3 {
        let mut short: String = text.chars().take(MAX_CHARS).collect();
        short.push_str("...");
        short
    } else {
        text
    }
}

/// `type (json)` as used in jq error messages, e.g. `number (1)`.
pub(crate) fn type_desc(value: &Value) -> String {
    format!("{} ({})", value.type_name(), describe(value))
}

/// Evaluate `expr` against `input`.
pub fn eval<'a>(expr: &'a Expr, input: Value, env: &Env<'a>) -> ValueIter<'a> {
    match expr {
        Expr::Identity => once(input),

        Expr::RecursiveDescent => Box::new(Descend::new(input)),

        Expr::Literal(lit) => once(lit.into()),

        Expr::Format(parts) => eval_format(parts, input, env),

        Expr::Var(name) => match env.lookup(name) {
            Some(value) => once(value.clone()),
            None => fail(EvalError::new(format!("${} is not defined", name))),
        },

        Expr::Index { target, index } => {
            let env = env.clone();
            let keys = eval(index, input.clone(), &env);
            Box::new(keys.flat_map(move |key| -> ValueIter<'a> {
                match key {
                    Ok(key) => {
                        let targets = eval(target, input.clone(), &env);
                        Box::new(targets.map(move |t| t.and_then(|t| index_value(t, &key))))
                    }
                    Err(e) => fail(e),
                }
            }))
        }

        Expr::Slice { target, start, end } => eval_slice(target, start, end, input, env),

        Expr::Iterate(target) => {
            let targets = eval(target, input, env);
            Box::new(targets.flat_map(|t| -> ValueIter<'a> {
                match t.and_then(iterate) {
                    Ok(values) => Box::new(values.into_iter().map(Ok)),
                    Err(e) => fail(e),
                }
            }))
        }

        Expr::Pipe(stages) => {
            let mut outputs = once(input);
            for stage in stages {
                outputs = then(outputs, stage, env);
            }
            outputs
        }

        Expr::Comma(exprs) => {
            let env = env.clone();
            Box::new(
                exprs
                    .iter()
                    .flat_map(move |e| eval(e, input.clone(), &env)),
            )
        }

        Expr::Array(inner) => match eval(inner, input, env).collect::<Result<Vec<_>, _>>() {
            Ok(items) => once(Value::Array(items)),
            Err(e) => fail(e),
        },

        Expr::Object(entries) => match build_objects(entries, &input, env) {
            Ok(objects) => Box::new(objects.into_iter().map(|m| Ok(Value::Object(m)))),
            Err(e) => fail(e),
        },

        Expr::Neg(inner) => Box::new(eval(inner, input, env).map(|v| {
            v.and_then(|v| match v {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(EvalError::new(format!(
                    "{} cannot be negated",
                    type_desc(&other)
                ))),
            })
        })),

        Expr::Arithmetic { op, left, right } => {
            let op = *op;
            binary(left, right, input, env, move |l, r| arith(op, l, r))
        }

        Expr::Compare { op, left, right } => {
            let op = *op;
            binary(left, right, input, env, move |l, r| {
                Ok(Value::Bool(compare(op, &l, &r)))
            })
        }

        Expr::And(left, right) => {
            let env = env.clone();
            let lefts = eval(left, input.clone(), &env);
            Box::new(lefts.flat_map(move |l| -> ValueIter<'a> {
                match l {
                    Ok(l) if !l.is_truthy() => once(Value::Bool(false)),
                    Ok(_) => truthiness(eval(right, input.clone(), &env)),
                    Err(e) => fail(e),
                }
            }))
        }

        Expr::Or(left, right) => {
            let env = env.clone();
            let lefts = eval(left, input.clone(), &env);
            Box::new(lefts.flat_map(move |l| -> ValueIter<'a> {
                match l {
                    Ok(l) if l.is_truthy() => once(Value::Bool(true)),
                    Ok(_) => truthiness(eval(right, input.clone(), &env)),
                    Err(e) => fail(e),
                }
            }))
        }

        Expr::Alternative(left, right) => Box::new(AlternativeIter {
            left: Some(eval(left, input.clone(), env)),
            right: None,
            yielded: false,
            right_expr: right,
            input,
            env: env.clone(),
        }),

        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let env = env.clone();
            let conds = eval(cond, input.clone(), &env);
            Box::new(conds.flat_map(move |c| match c {
                Ok(c) if c.is_truthy() => eval(then_branch, input.clone(), &env),
                Ok(_) => eval(else_branch, input.clone(), &env),
                Err(e) => fail(e),
            }))
        }

        Expr::Try { body, catch } => Box::new(TryIter {
            body: Some(eval(body, input, env)),
            handler: None,
            catch: catch.as_deref(),
            env: env.clone(),
        }),

        Expr::Bind { source, name, body } => {
            let env = env.clone();
            let sources = eval(source, input.clone(), &env);
            Box::new(sources.flat_map(move |v| match v {
                Ok(v) => eval(body, input.clone(), &env.bind(name, v)),
                Err(e) => fail(e),
            }))
        }

        Expr::Reduce {
            source,
            name,
            init,
            update,
        } => {
            let env = env.clone();
            let inits = eval(init, input.clone(), &env);
            Box::new(inits.map(move |acc| {
                let mut acc = acc?;
                for item in eval(source, input.clone(), &env) {
                    let scope = env.bind(name, item?);
                    let mut next = Value::Null;
                    for out in eval(update, acc, &scope) {
                        next = out?;
                    }
                    acc = next;
                }
                Ok(acc)
            }))
        }

        Expr::Foreach {
            source,
            name,
            init,
            update,
            extract,
        } => {
            let env = env.clone();
            let inits = eval(init, input.clone(), &env);
            Box::new(inits.flat_map(move |state| -> ValueIter<'a> {
                match state {
                    Ok(state) => Box::new(ForeachIter {
                        source: eval(source, input.clone(), &env),
                        state,
                        name,
                        update,
                        extract: extract.as_deref(),
                        env: env.clone(),
                        pending: Vec::new(),
                    }),
                    Err(e) => fail(e),
                }
            }))
        }

        Expr::Builtin(builtin) => eval_builtin(builtin, input, env),
    }
}

/// Feed every output of `outputs` through `expr`.
pub(crate) fn then<'a>(outputs: ValueIter<'a>, expr: &'a Expr, env: &Env<'a>) -> ValueIter<'a> {
    let env = env.clone();
    Box::new(outputs.flat_map(move |v| match v {
        Ok(v) => eval(expr, v, &env),
        Err(e) => fail(e),
    }))
}

/// Evaluate `expr` and gather all outputs, stopping at the first error.
pub(crate) fn collect<'a>(
    expr: &'a Expr,
    input: Value,
    env: &Env<'a>,
) -> Result<Vec<Value>, EvalError> {
    eval(expr, input, env).collect()
}

fn truthiness<'a>(outputs: ValueIter<'a>) -> ValueIter<'a> {
    Box::new(outputs.map(|v| v.map(|v| Value::Bool(v.is_truthy()))))
}

/// Cartesian product of two operands. The right side is the outer loop,
/// as in jq: `(1,2) + (10,20)` yields 11, 12, 21, 22.
fn binary<'a, F>(left: &'a Expr, right: &'a Expr, input: Value, env: &Env<'a>, f: F) -> ValueIter<'a>
where
    F: Fn(Value, Value) -> Result<Value, EvalError> + Clone + 'a,
{
    let env = env.clone();
    let rights = eval(right, input.clone(), &env);
    Box::new(rights.flat_map(move |r| -> ValueIter<'a> {
        match r {
            Ok(r) => {
                let f = f.clone();
                let lefts = eval(left, input.clone(), &env);
                Box::new(lefts.map(move |l| l.and_then(|l| f(l, r.clone()))))
            }
            Err(e) => fail(e),
        }
    }))
}

/// Values of an array or object.
pub(crate) fn iterate(value: Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_values().collect()),
        other => Err(not_iterable(&other)),
    }
}

pub(crate) fn not_iterable(value: &Value) -> EvalError {
    match value {
        Value::Null => EvalError::new("Cannot iterate over null"),
        other => EvalError::new(format!("Cannot iterate over {}", type_desc(other))),
    }
}

/// `target[key]`.
pub(crate) fn index_value(target: Value, key: &Value) -> Result<Value, EvalError> {
    match (target, key) {
        (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(Value::Null),
        (Value::Object(mut map), Value::String(k)) => Ok(map.swap_remove(k).unwrap_or(Value::Null)),
        (Value::Array(mut items), Value::Number(n)) => {
            if n.is_nan() {
                return Ok(Value::Null);
            }
            let len = items.len() as f64;
            let idx = n.floor();
            let idx = if idx < 0.0 { idx + len } else { idx };
            if idx < 0.0 || idx >= len {
                Ok(Value::Null)
            } else {
                Ok(items.swap_remove(idx as usize))
            }
        }
        (target, Value::String(k)) => Err(EvalError::new(format!(
            "Cannot index {} with \"{}\"",
            target.type_name(),
            k
        ))),
        (target, key) => Err(EvalError::new(format!(
            "Cannot index {} with {}",
            target.type_name(),
            key.type_name()
        ))),
    }
}

fn eval_slice<'a>(
    target: &'a Expr,
    start: &'a Option<Box<Expr>>,
    end: &'a Option<Box<Expr>>,
    input: Value,
    env: &Env<'a>,
) -> ValueIter<'a> {
    let bound = |e: &'a Option<Box<Expr>>| match e {
        Some(e) => collect(e, input.clone(), env),
        None => Ok(vec![Value::Null]),
    };
    let (starts, ends) = match (bound(start), bound(end)) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };
    let targets = match collect(target, input.clone(), env) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    let mut results = Vec::new();
    for e in &ends {
        for s in &starts {
            for t in &targets {
                results.push(slice_value(t.clone(), s, e));
            }
        }
    }
    Box::new(results.into_iter())
}

/// Resolve slice bounds against a length: negative counts from the end,
/// start rounds down, end rounds up.
fn slice_bounds(len: usize, start: &Value, end: &Value) -> Result<(usize, usize), EvalError> {
    let len_f = len as f64;
    let resolve = |v: &Value, default: f64, round: fn(f64) -> f64| match v {
        Value::Null => Ok(default),
        Value::Number(n) => {
            let n = round(*n);
            let n = if n < 0.0 { n + len_f } else { n };
            Ok(n.clamp(0.0, len_f))
        }
        _ => Err(EvalError::new(
            "Start and end indices of an array slice must be numbers",
        )),
    };
    let s = resolve(start, 0.0, f64::floor)? as usize;
    let e = resolve(end, len_f, f64::ceil)? as usize;
    Ok((s, e.max(s)))
}

pub(crate) fn slice_value(target: Value, start: &Value, end: &Value) -> Result<Value, EvalError> {
    match target {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let (s, e) = slice_bounds(items.len(), start, end)?;
            Ok(Value::Array(items[s..e].to_vec()))
        }
        Value::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = slice_bounds(chars.len(), start, end)?;
            Ok(Value::String(chars[s..e].iter().collect()))
        }
        other => Err(EvalError::new(format!(
            "Cannot index {} with object",
            other.type_name()
        ))),
    }
}

/// String interpolation. Each embedded filter contributes every output;
/// the first part varies fastest.
fn eval_format<'a>(parts: &'a [StringPart], input: Value, env: &Env<'a>) -> ValueIter<'a> {
    let Some((last, prefix)) = parts.split_last() else {
        return once(Value::String(String::new()));
    };
    let env = env.clone();
    let tails: ValueIter<'a> = match last {
        StringPart::Literal(s) => once(Value::String(s.clone())),
        StringPart::Expr(e) => eval(e, input.clone(), &env),
    };
    Box::new(tails.flat_map(move |tail| -> ValueIter<'a> {
        match tail {
            Ok(tail) => {
                let tail = match tail {
                    Value::String(s) => s,
                    other => other.to_json(),
                };
                Box::new(eval_format(prefix, input.clone(), &env).map(move |head| {
                    head.map(|head| match head {
                        Value::String(mut s) => {
                            s.push_str(&tail);
                            Value::String(s)
                        }
                        other => other,
                    })
                }))
            }
            Err(e) => fail(e),
        }
    }))
}

/// Build every object an object-construction expression produces.
/// Multiple outputs for a key or value multiply the results.
fn build_objects<'a>(
    entries: &'a [super::expr::ObjectEntry],
    input: &Value,
    env: &Env<'a>,
) -> Result<Vec<Map>, EvalError> {
    let mut partials = vec![Map::new()];

    for entry in entries {
        let keys = match &entry.key {
            ObjectKey::Literal(k) => vec![k.clone()],
            ObjectKey::Expr(e) => collect(e, input.clone(), env)?
                .into_iter()
                .map(|k| match k {
                    Value::String(s) => Ok(s),
                    other => Err(EvalError::new(format!(
                        "Object keys must be strings, not {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        let values = collect(&entry.value, input.clone(), env)?;

        let mut next = Vec::with_capacity(partials.len() * keys.len() * values.len());
        for partial in &partials {
            for key in &keys {
                for value in &values {
                    let mut obj = partial.clone();
                    obj.insert(key.clone(), value.clone());
                    next.push(obj);
                }
            }
        }
        partials = next;
    }

    Ok(partials)
}

/// Apply an arithmetic operator.
pub(crate) fn arith(op: ArithOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        ArithOp::Add => add(left, right),
        ArithOp::Sub => sub(left, right),
        ArithOp::Mul => mul(left, right),
        ArithOp::Div => div(left, right),
        ArithOp::Mod => modulo(left, right),
    }
}

fn arith_error(left: &Value, right: &Value, verb: &str) -> EvalError {
    EvalError::new(format!(
        "{} and {} cannot be {}",
        type_desc(left),
        type_desc(right),
        verb
    ))
}

pub(crate) fn add(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Null, v) | (v, Value::Null) => Ok(v),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Object(mut a), Value::Object(b)) => {
            a.extend(b);
            Ok(Value::Object(a))
        }
        (l, r) => Err(arith_error(&l, &r, "added")),
    }
}

fn sub(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array(
            a.into_iter().filter(|x| !b.contains(x)).collect(),
        )),
        (l, r) => Err(arith_error(&l, &r, "subtracted")),
    }
}

/// Longest string `"s" * n` may build, in bytes.
const MAX_REPEAT_BYTES: usize = 1 << 28;

fn repeat(s: &str, n: f64) -> Result<Value, EvalError> {
    if n <= 0.0 || n.is_nan() {
        return Ok(Value::Null);
    }
    let count = n.ceil();
    let len = if count >= usize::MAX as f64 {
        None
    } else {
        s.len().checked_mul(count as usize)
    };
    match len {
        Some(len) if len <= MAX_REPEAT_BYTES => Ok(Value::String(s.repeat(count as usize))),
        _ => Err(EvalError::new("Repeat string result too long")),
    }
}

/// Recursive object merge: nested objects combine, anything else is
/// replaced by the right side.
fn deep_merge(mut left: Map, right: Map) -> Map {
    for (k, rv) in right {
        let existing = left.get_mut(&k).map(|v| core::mem::replace(v, Value::Null));
        let merged = match (existing, rv) {
            (Some(Value::Object(lo)), Value::Object(ro)) => Value::Object(deep_merge(lo, ro)),
            (_, rv) => rv,
        };
        left.insert(k, merged);
    }
    left
}

fn mul(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            repeat(&s, n)
        }
        (Value::Object(a), Value::Object(b)) => Ok(Value::Object(deep_merge(a, b))),
        (l, r) => Err(arith_error(&l, &r, "multiplied")),
    }
}

fn div(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if b == 0.0 {
                Err(arith_error(
                    &Value::Number(a),
                    &Value::Number(b),
                    "divided because the divisor is zero",
                ))
            } else {
                Ok(Value::Number(a / b))
            }
        }
        (Value::String(a), Value::String(b)) => Ok(split_string(&a, &b)),
        (l, r) => Err(arith_error(&l, &r, "divided")),
    }
}

fn modulo(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (ai, bi) = (a as i64, b as i64);
            if bi == 0 {
                Err(arith_error(
                    &Value::Number(a),
                    &Value::Number(b),
                    "divided because the divisor is zero",
                ))
            } else {
                Ok(Value::Number(ai.wrapping_rem(bi.wrapping_abs()) as f64))
            }
        }
        (l, r) => Err(arith_error(&l, &r, "divided")),
    }
}

/// `"a,b" / ","`
pub(crate) fn split_string(text: &str, sep: &str) -> Value {
    if text.is_empty() {
        return Value::Array(Vec::new());
    }
    let parts: Vec<Value> = if sep.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(sep).map(Value::string).collect()
    };
    Value::Array(parts)
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    use core::cmp::Ordering::*;
    let ord = left.jq_cmp(right);
    match op {
        CompareOp::Eq => ord == Equal,
        CompareOp::Ne => ord != Equal,
        CompareOp::Lt => ord == Less,
        CompareOp::Le => ord != Greater,
        CompareOp::Gt => ord == Greater,
        CompareOp::Ge => ord != Less,
    }
}

/// Pre-order walk over a value and everything nested in it (`..`).
pub(crate) struct Descend {
    stack: Vec<Value>,
}

impl Descend {
    pub(crate) fn new(root: Value) -> Self {
        Descend { stack: vec![root] }
    }
}

impl Iterator for Descend {
    type Item = Result<Value, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.stack.pop()?;
        match &value {
            Value::Array(items) => self.stack.extend(items.iter().rev().cloned()),
            Value::Object(map) => self.stack.extend(map.values().rev().cloned()),
            _ => {}
        }
        Some(Ok(value))
    }
}

/// `try body catch handler`: forwards outputs of the body until its first
/// error, then switches to the handler (or stops when there is none).
/// `left // right`: truthy outputs of `left` as they are pulled, or every
/// output of `right` when `left` runs out without one. Errors on the left
/// are swallowed, like `(left)?`.
struct AlternativeIter<'a> {
    left: Option<ValueIter<'a>>,
    right: Option<ValueIter<'a>>,
    yielded: bool,
    right_expr: &'a Expr,
    input: Value,
    env: Env<'a>,
}

impl<'a> Iterator for AlternativeIter<'a> {
    type Item = Result<Value, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(right) = &mut self.right {
            return right.next();
        }
        let left = self.left.as_mut()?;
        for out in left.by_ref() {
            match out {
                Ok(v) if v.is_truthy() => {
                    self.yielded = true;
                    return Some(Ok(v));
                }
                _ => {}
            }
        }
        self.left = None;
        if self.yielded {
            return None;
        }
        let input = core::mem::replace(&mut self.input, Value::Null);
        self.right
            .insert(eval(self.right_expr, input, &self.env))
            .next()
    }
}

struct TryIter<'a> {
    body: Option<ValueIter<'a>>,
    handler: Option<ValueIter<'a>>,
    catch: Option<&'a Expr>,
    env: Env<'a>,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = Result<Value, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(handler) = &mut self.handler {
            return handler.next();
        }
        match self.body.as_mut()?.next() {
            Some(Ok(v)) => Some(Ok(v)),
            Some(Err(e)) => {
                self.body = None;
                let catch = self.catch?;
                log::trace!("caught error: {}", e);
                self.handler
                    .insert(eval(catch, e.into_value(), &self.env))
                    .next()
            }
            None => {
                self.body = None;
                None
            }
        }
    }
}

/// `foreach source as $name (init; update; extract)`
struct ForeachIter<'a> {
    source: ValueIter<'a>,
    state: Value,
    name: &'a str,
    update: &'a Expr,
    extract: Option<&'a Expr>,
    env: Env<'a>,
    /// Outputs computed for the current item, reversed for popping.
    pending: Vec<Result<Value, EvalError>>,
}

impl<'a> ForeachIter<'a> {
    fn step(&mut self, item: Value) -> Result<(), EvalError> {
        let scope = self.env.bind(self.name, item);
        let mut outputs = Vec::new();
        for next in collect(self.update, self.state.clone(), &scope)? {
            self.state = next.clone();
            match self.extract {
                Some(extract) => outputs.extend(collect(extract, next, &scope)?),
                None => outputs.push(next),
            }
        }
        self.pending = outputs.into_iter().rev().map(Ok).collect();
        Ok(())
    }
}

impl<'a> Iterator for ForeachIter<'a> {
    type Item = Result<Value, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(out) = self.pending.pop() {
                return Some(out);
            }
            let item = match self.source.next()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            if let Err(e) = self.step(item) {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn run(filter: &str, input: &str) -> Result<Vec<Value>, EvalError> {
        let expr = parse(filter).unwrap();
        let globals = Map::new();
        let env = Env::new(&globals);
        let input = Value::from_json_str(input).unwrap();
        let result = eval(&expr, input, &env).collect();
        result
    }

    fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }

    fn ok(filter: &str, input: &str) -> Vec<String> {
        run(filter, input)
            .unwrap()
            .iter()
            .map(Value::to_json)
            .collect()
    }

    fn err(filter: &str, input: &str) -> String {
        run(filter, input).unwrap_err().message()
    }

    #[test]
    fn test_identity_and_fields() {
        assert_eq!(ok(".", "[1,2]"), vec!["[1,2]"]);
        assert_eq!(ok(".a.b", r#"{"a":{"b":3}}"#), vec!["3"]);
        assert_eq!(ok(".missing", "{}"), vec!["null"]);
        assert_eq!(ok(".a", "null"), vec!["null"]);
    }

    #[test]
    fn test_array_index_and_slice() {
        assert_eq!(ok(".[0]", "[1,2,3]"), vec!["1"]);
        assert_eq!(ok(".[-1]", "[1,2,3]"), vec!["3"]);
        assert_eq!(ok(".[10]", "[1,2,3]"), vec!["null"]);
        assert_eq!(ok(".[1:]", "[1,2,3]"), vec!["[2,3]"]);
        assert_eq!(ok(".[:-1]", "[1,2,3]"), vec!["[1,2]"]);
        assert_eq!(ok(".[1:2]", r#""abc""#), vec![r#""b""#]);
        assert_eq!(ok(".[2:1]", "[1,2,3]"), vec!["[]"]);
    }

    #[test]
    fn test_iterate() {
        assert_eq!(ok(".[]", "[1,2]"), vec!["1", "2"]);
        assert_eq!(ok(".[]", r#"{"a":1,"b":2}"#), vec!["1", "2"]);
        assert_eq!(ok(".[]?", "3"), Vec::<String>::new());
        assert_eq!(err(".[]", "null"), "Cannot iterate over null");
        assert_eq!(err(".[]", "5"), "Cannot iterate over number (5)");
    }

    #[test]
    fn test_index_errors() {
        assert_eq!(err(".foo", "5"), r#"Cannot index number with "foo""#);
        assert_eq!(err(".[0]", "{}"), "Cannot index object with number");
    }

    #[test]
    fn test_pipe_and_comma() {
        assert_eq!(ok(".[] | . * 2", "[1,2,3]"), vec!["2", "4", "6"]);
        assert_eq!(ok(".a, .b", r#"{"a":1,"b":2}"#), vec!["1", "2"]);
    }

    #[test]
    fn test_cartesian_order() {
        assert_eq!(ok("(1,2) + (10,20)", "null"), vec!["11", "12", "21", "22"]);
        assert_eq!(
            ok(r#""\(1,2)-\(3,4)""#, "null"),
            vec![r#""1-3""#, r#""2-3""#, r#""1-4""#, r#""2-4""#]
        );
    }

    #[test]
    fn test_construction() {
        assert_eq!(ok("[.[] | . + 1]", "[1,2]"), vec!["[2,3]"]);
        assert_eq!(
            ok("{a: .x, b: (1,2)}", r#"{"x":0}"#),
            vec![r#"{"a":0,"b":1}"#, r#"{"a":0,"b":2}"#]
        );
        assert_eq!(ok("{(.k): 1}", r#"{"k":"z"}"#), vec![r#"{"z":1}"#]);
        assert_eq!(
            err("{(.k): 1}", r#"{"k":1}"#),
            "Object keys must be strings, not number"
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(ok(".a + .b", r#"{"a":1,"b":2}"#), vec!["3"]);
        assert_eq!(ok(r#". + "x""#, r#""a""#), vec![r#""ax""#]);
        assert_eq!(ok(". + null", "1"), vec!["1"]);
        assert_eq!(ok(". - [2]", "[1,2,3,2]"), vec!["[1,3]"]);
        assert_eq!(ok(". * 2", r#""ab""#), vec![r#""abab""#]);
        assert_eq!(ok(". / \",\"", r#""a,b""#), vec![r#"["a","b"]"#]);
        assert_eq!(ok(". % 3", "7"), vec!["1"]);
        assert_eq!(ok("-.", "3"), vec!["-3"]);
        assert_eq!(
            ok(". * {a: {c: 3}}", r#"{"a":{"b":1}}"#),
            vec![r#"{"a":{"b":1,"c":3}}"#]
        );
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(
            err(". + 1", r#""a""#),
            r#"string ("a") and number (1) cannot be added"#
        );
        assert_eq!(
            err(". / 0", "1"),
            "number (1) and number (0) cannot be divided because the divisor is zero"
        );
        assert_eq!(
            err(". + 1", r#""a long string value""#),
            r#"string ("a long str...) and number (1) cannot be added"#
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(ok(". == 1", "1"), vec!["true"]);
        assert_eq!(ok(". < \"a\"", "1"), vec!["true"]);
        assert_eq!(ok("[1,2] < [1,3]", "null"), vec!["true"]);
        assert_eq!(ok(".a and .b", r#"{"a":true,"b":false}"#), vec!["false"]);
        assert_eq!(ok("false or (true, false)", "null"), vec!["true", "false"]);
        assert_eq!(ok("not", "null"), vec!["true"]);
    }

    #[test]
    fn test_alternative() {
        assert_eq!(ok(".a // 5", "{}"), vec!["5"]);
        assert_eq!(ok(".a // 5", r#"{"a":false}"#), vec!["5"]);
        assert_eq!(ok(".a // 5", r#"{"a":1}"#), vec!["1"]);
        assert_eq!(ok(".[] // 0", "3"), vec!["0"]);
        assert_eq!(ok("(null, 1, false, 2) // 3", "null"), vec!["1", "2"]);
        assert_eq!(ok("(error(\"x\"), 1) // 3", "null"), vec!["1"]);
        assert_eq!(ok("empty // (false, null)", "null"), vec!["false", "null"]);
        assert_eq!(err("null // error(\"right\")", "null"), "right");
    }

    #[test]
    fn test_alternative_is_lazy() {
        assert_eq!(ok("first(recurse(. + 1) // 0)", "null"), vec!["1"]);
        assert_eq!(ok("[limit(3; range(1; 1e18) // 0)]", "null"), vec!["[1,2,3]"]);
    }

    #[test]
    fn test_repeat_limits() {
        assert_eq!(ok(". * 0", r#""ab""#), vec!["null"]);
        assert_eq!(ok(". * 1.5", r#""ab""#), vec![r#""abab""#]);
        assert_eq!(err(". * 1e19", r#""ab""#), "Repeat string result too long");
        assert_eq!(err(". * 1e18", r#""a""#), "Repeat string result too long");
        assert_eq!(err(". * 1e1000", r#""a""#), "Repeat string result too long");
    }

    #[test]
    fn test_if() {
        assert_eq!(
            ok("if . then \"yes\" else \"no\" end", "true"),
            vec![r#""yes""#]
        );
        assert_eq!(
            ok("if . == 1 then 1 elif . == 2 then 2 else 3 end", "2"),
            vec!["2"]
        );
        assert_eq!(ok("if false then 1 end", "7"), vec!["7"]);
    }

    #[test]
    fn test_try_catch() {
        assert_eq!(ok("try error(\"x\") catch .", "null"), vec![r#""x""#]);
        assert_eq!(ok("try (1, error(\"x\"), 3) catch .", "null"), vec!["1", r#""x""#]);
        assert_eq!(ok("[.[] | .a?]", r#"[1, {"a": 2}]"#), vec!["[2]"]);
        assert_eq!(ok("try error({a: 1}) catch .a", "null"), vec!["1"]);
    }

    #[test]
    fn test_error_payloads() {
        let e = run("error({code: 1})", "null").unwrap_err();
        assert_eq!(e.value(), &json(r#"{"code":1}"#));
        assert_eq!(e.message(), r#"{"code":1} (not a string)"#);
        assert_eq!(err("error", r#""boom""#), "boom");
    }

    #[test]
    fn test_variables() {
        assert_eq!(ok(". as $x | [$x, $x]", "1"), vec!["[1,1]"]);
        assert_eq!(ok(".[] as $x | $x * 10", "[1,2]"), vec!["10", "20"]);
        assert_eq!(err("$nope", "null"), "$nope is not defined");

        let expr = parse("$a + .").unwrap();
        let mut globals = Map::new();
        globals.insert("a".into(), Value::Number(1.0));
        let env = Env::new(&globals);
        let out: Vec<_> = eval(&expr, Value::Number(2.0), &env).collect();
        assert_eq!(out, vec![Ok(Value::Number(3.0))]);
    }

    #[test]
    fn test_shadowing() {
        assert_eq!(ok("1 as $x | 2 as $x | $x", "null"), vec!["2"]);
        assert_eq!(ok("1 as $x | [2 as $x | $x, $x]", "null"), vec!["[2,2]"]);
        assert_eq!(ok("1 as $x | [(2 as $x | $x), $x]", "null"), vec!["[2,1]"]);
    }

    #[test]
    fn test_reduce_and_foreach() {
        assert_eq!(ok("reduce .[] as $x (0; . + $x)", "[1,2,3]"), vec!["6"]);
        assert_eq!(ok("reduce .[] as $x (0; empty)", "[1]"), vec!["null"]);
        assert_eq!(
            ok("foreach .[] as $x (0; . + $x)", "[1,2,3]"),
            vec!["1", "3", "6"]
        );
        assert_eq!(
            ok("foreach .[] as $x (0; . + $x; [$x, .])", "[1,2]"),
            vec!["[1,1]", "[2,3]"]
        );
    }

    #[test]
    fn test_recursive_descent() {
        assert_eq!(
            ok("[..]", r#"[1,[2]]"#),
            vec!["[[1,[2]],1,[2],2]"]
        );
    }

    #[test]
    fn test_laziness() {
        // Only the first output is pulled; the error after it is never reached.
        let expr = parse("1, error(\"late\")").unwrap();
        let globals = Map::new();
        let env = Env::new(&globals);
        let mut outputs = eval(&expr, Value::Null, &env);
        assert_eq!(outputs.next(), Some(Ok(Value::Number(1.0))));
    }

    #[test]
    fn test_describe_truncates() {
        assert_eq!(describe(&json("1")), "1");
        assert_eq!(describe(&json(r#""abcdefghijklmnop""#)), r#""abcdefghij..."#);
    }
}
