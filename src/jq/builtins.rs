//! Builtin function implementations.
//!
//! Argument expressions are evaluated against the same input as the call.
//! Builtins that take a value argument (`has(k)`, `split(s)`, ...) produce
//! one output per output of the argument.

use std::cmp::Ordering;

use super::eval::{
    add, collect, describe, empty, eval, fail, from_result, index_value, iterate, not_iterable,
    once, split_string, type_desc, Descend, Env, EvalError, ValueIter,
};
use super::expr::{Builtin, Expr};
use super::value::{Map, Value};

pub(crate) fn eval_builtin<'a>(builtin: &'a Builtin, input: Value, env: &Env<'a>) -> ValueIter<'a> {
    match builtin {
        Builtin::Empty => empty(),

        Builtin::Error(None) => fail(EvalError::from_value(input)),
        Builtin::Error(Some(msg)) => Box::new(eval(msg, input, env).map(
            |m| -> Result<Value, EvalError> { Err(m.map_or_else(|e| e, EvalError::from_value)) },
        )),

        Builtin::Not => once(Value::Bool(!input.is_truthy())),

        Builtin::Type => once(Value::string(input.type_name())),

        Builtin::Select(cond) => {
            let conds = eval(cond, input.clone(), env);
            Box::new(conds.filter_map(move |c| match c {
                Ok(c) if c.is_truthy() => Some(Ok(input.clone())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }))
        }

        Builtin::Values => {
            if input.is_null() {
                empty()
            } else {
                once(input)
            }
        }

        Builtin::TypeFilter(filter) => {
            if filter.accepts(&input) {
                once(input)
            } else {
                empty()
            }
        }

        Builtin::Length => from_result(length(input)),

        Builtin::Utf8ByteLength => from_result(match input {
            Value::String(s) => Ok(Value::Number(s.len() as f64)),
            other => Err(EvalError::new(format!(
                "{} only strings have UTF-8 byte length",
                type_desc(&other)
            ))),
        }),

        Builtin::Keys => from_result(keys(input, true)),
        Builtin::KeysUnsorted => from_result(keys(input, false)),

        Builtin::Has(key) => with_arg(key, input, env, |input, key| has(input, &key)),

        Builtin::In(container) => {
            with_arg(container, input, env, |input, container| has(&container, input))
        }

        Builtin::Contains(other) => with_arg(other, input, env, |input, other| {
            if core::mem::discriminant(input) != core::mem::discriminant(&other) {
                return Err(EvalError::new(format!(
                    "{} and {} cannot have their containment checked",
                    type_desc(input),
                    type_desc(&other)
                )));
            }
            Ok(Value::Bool(contains(input, &other)))
        }),

        Builtin::Map(f) => from_result(map_values_of(f, input, env)),

        Builtin::MapValues(f) => from_result(map_values(f, input, env)),

        Builtin::Add => from_result(match input {
            Value::Null => Ok(Value::Null),
            other => iterate(other).and_then(|items| {
                items
                    .into_iter()
                    .try_fold(Value::Null, |acc, item| add(acc, item))
            }),
        }),

        Builtin::Any => from_result(
            iterate(input).map(|items| Value::Bool(items.iter().any(Value::is_truthy))),
        ),
        Builtin::All => from_result(
            iterate(input).map(|items| Value::Bool(items.iter().all(Value::is_truthy))),
        ),
        Builtin::AnyWith(cond) => from_result(
            iterate(input).and_then(|items| quantify(elements(items), cond, env, true)),
        ),
        Builtin::AllWith(cond) => from_result(
            iterate(input).and_then(|items| quantify(elements(items), cond, env, false)),
        ),
        Builtin::AnyOf(generator, cond) => {
            from_result(quantify(eval(generator, input, env), cond, env, true))
        }
        Builtin::AllOf(generator, cond) => {
            from_result(quantify(eval(generator, input, env), cond, env, false))
        }

        Builtin::Min => from_result(extreme_by(None, input, env, Ordering::Less)),
        Builtin::Max => from_result(extreme_by(None, input, env, Ordering::Greater)),
        Builtin::MinBy(f) => from_result(extreme_by(Some(&**f), input, env, Ordering::Less)),
        Builtin::MaxBy(f) => from_result(extreme_by(Some(&**f), input, env, Ordering::Greater)),

        Builtin::Sort => from_result(sort_by_keys(None, input, env).map(|pairs| {
            Value::Array(pairs.into_iter().map(|(_, v)| v).collect())
        })),
        Builtin::SortBy(f) => from_result(sort_by_keys(Some(&**f), input, env).map(|pairs| {
            Value::Array(pairs.into_iter().map(|(_, v)| v).collect())
        })),

        Builtin::GroupBy(f) => from_result(
            group(Some(&**f), input, env)
                .map(|groups| Value::Array(groups.into_iter().map(Value::Array).collect())),
        ),

        Builtin::Unique => from_result(group(None, input, env).map(first_of_each)),
        Builtin::UniqueBy(f) => from_result(group(Some(&**f), input, env).map(first_of_each)),

        Builtin::Reverse => from_result(match input {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(mut items) => {
                items.reverse();
                Ok(Value::Array(items))
            }
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            other => Err(EvalError::new(format!(
                "Cannot reverse {}",
                type_desc(&other)
            ))),
        }),

        Builtin::First => from_result(index_value(input, &Value::Number(0.0))),
        Builtin::Last => from_result(index_value(input, &Value::Number(-1.0))),
        Builtin::FirstOf(f) => Box::new(eval(f, input, env).take(1)),
        Builtin::LastOf(f) => {
            let mut last = None;
            for out in eval(f, input, env) {
                match out {
                    Ok(v) => last = Some(v),
                    Err(e) => return fail(e),
                }
            }
            match last {
                Some(v) => once(v),
                None => empty(),
            }
        }

        Builtin::Limit(n, f) => {
            let env = env.clone();
            let counts = eval(n, input.clone(), &env);
            Box::new(counts.flat_map(move |count| -> ValueIter<'a> {
                match count {
                    Ok(Value::Number(count)) if count < 0.0 => eval(f, input.clone(), &env),
                    Ok(Value::Number(count)) if count == 0.0 => empty(),
                    Ok(Value::Number(count)) => {
                        Box::new(eval(f, input.clone(), &env).take(count.ceil() as usize))
                    }
                    Ok(other) => fail(EvalError::new(format!(
                        "Invalid limit {}: must be a number",
                        describe(&other)
                    ))),
                    Err(e) => fail(e),
                }
            }))
        }

        Builtin::Range(upto) => {
            let ends = eval(upto, input, env);
            Box::new(ends.flat_map(|end| match end {
                Ok(end) => range(Value::Number(0.0), end),
                Err(e) => fail(e),
            }))
        }

        Builtin::RangeFrom(from, upto) => {
            let env = env.clone();
            let starts = eval(from, input.clone(), &env);
            Box::new(starts.flat_map(move |start| -> ValueIter<'a> {
                match start {
                    Ok(start) => Box::new(eval(upto, input.clone(), &env).flat_map(
                        move |end| match end {
                            Ok(end) => range(start.clone(), end),
                            Err(e) => fail(e),
                        },
                    )),
                    Err(e) => fail(e),
                }
            }))
        }

        Builtin::RangeBy(from, upto, by) => {
            let env = env.clone();
            let starts = eval(from, input.clone(), &env);
            Box::new(starts.flat_map(move |start| -> ValueIter<'a> {
                let start = match start {
                    Ok(start) => start,
                    Err(e) => return fail(e),
                };
                let env = env.clone();
                let input = input.clone();
                let ends = eval(upto, input.clone(), &env);
                Box::new(ends.flat_map(move |end| -> ValueIter<'a> {
                    let end = match end {
                        Ok(end) => end,
                        Err(e) => return fail(e),
                    };
                    let start = start.clone();
                    Box::new(eval(by, input.clone(), &env).flat_map(move |step| match step {
                        Ok(step) => range_by(start.clone(), end.clone(), step),
                        Err(e) => fail(e),
                    }))
                }))
            }))
        }

        Builtin::ToEntries => from_result(to_entries(input)),
        Builtin::FromEntries => from_result(from_entries(input)),
        Builtin::WithEntries(f) => from_result(
            to_entries(input)
                .and_then(|entries| map_values_of(f, entries, env))
                .and_then(from_entries),
        ),

        Builtin::Recurse => Box::new(Descend::new(input)),
        Builtin::RecurseWith(f) => Box::new(RecurseIter {
            stack: vec![once(input)],
            step: f,
            env: env.clone(),
        }),

        Builtin::Floor => from_result(math(input, f64::floor)),
        Builtin::Sqrt => from_result(math(input, f64::sqrt)),

        Builtin::ToString => once(match input {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_json()),
        }),

        Builtin::ToNumber => from_result(match input {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Number)
                .ok_or_else(|| EvalError::new(format!("Cannot parse '{}' as JSON", s))),
            other => Err(EvalError::new(format!(
                "{} cannot be parsed as a number",
                type_desc(&other)
            ))),
        }),

        Builtin::ToJson => once(Value::String(input.to_json())),

        Builtin::FromJson => from_result(match input {
            Value::String(s) => Value::from_json_str(&s)
                .map_err(|e| EvalError::new(format!("{} (while parsing '{}')", e, s))),
            other => Err(EvalError::new(format!(
                "{} only strings can be parsed",
                type_desc(&other)
            ))),
        }),

        Builtin::AsciiDowncase => from_result(string_op(input, "ascii_downcase", |s| {
            s.to_ascii_lowercase()
        })),
        Builtin::AsciiUpcase => from_result(string_op(input, "ascii_upcase", |s| {
            s.to_ascii_uppercase()
        })),

        Builtin::StartsWith(prefix) => with_arg(prefix, input, env, |input, prefix| {
            match (input, &prefix) {
                (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.starts_with(p.as_str()))),
                _ => Err(EvalError::new("startswith() requires string inputs")),
            }
        }),
        Builtin::EndsWith(suffix) => with_arg(suffix, input, env, |input, suffix| {
            match (input, &suffix) {
                (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.ends_with(p.as_str()))),
                _ => Err(EvalError::new("endswith() requires string inputs")),
            }
        }),

        Builtin::LtrimStr(prefix) => with_arg(prefix, input, env, |input, prefix| {
            Ok(match (input, &prefix) {
                (Value::String(s), Value::String(p)) => match s.strip_prefix(p.as_str()) {
                    Some(rest) => Value::string(rest),
                    None => input.clone(),
                },
                _ => input.clone(),
            })
        }),
        Builtin::RtrimStr(suffix) => with_arg(suffix, input, env, |input, suffix| {
            Ok(match (input, &suffix) {
                (Value::String(s), Value::String(p)) => match s.strip_suffix(p.as_str()) {
                    Some(rest) => Value::string(rest),
                    None => input.clone(),
                },
                _ => input.clone(),
            })
        }),

        Builtin::Split(sep) => with_arg(sep, input, env, |input, sep| match (input, &sep) {
            (Value::String(s), Value::String(p)) => Ok(split_string(s, p)),
            _ => Err(EvalError::new("split input and separator must be strings")),
        }),

        Builtin::Join(sep) => with_arg(sep, input, env, |input, sep| join(input, &sep)),
    }
}

/// Evaluate `arg` against `input` and apply `f` to each of its outputs.
fn with_arg<'a, F>(arg: &'a Expr, input: Value, env: &Env<'a>, f: F) -> ValueIter<'a>
where
    F: Fn(&Value, Value) -> Result<Value, EvalError> + 'a,
{
    let args = eval(arg, input.clone(), env);
    Box::new(args.map(move |a| a.and_then(|a| f(&input, a))))
}

fn length(input: Value) -> Result<Value, EvalError> {
    let n = match &input {
        Value::Null => 0.0,
        Value::Number(n) => n.abs(),
        Value::String(s) => s.chars().count() as f64,
        Value::Array(items) => items.len() as f64,
        Value::Object(map) => map.len() as f64,
        Value::Bool(_) => {
            return Err(EvalError::new(format!(
                "{} has no length",
                type_desc(&input)
            )))
        }
    };
    Ok(Value::Number(n))
}

fn keys(input: Value, sorted: bool) -> Result<Value, EvalError> {
    match input {
        Value::Object(map) => {
            let mut names: Vec<String> = map.into_keys().collect();
            if sorted {
                names.sort();
            }
            Ok(Value::Array(names.into_iter().map(Value::String).collect()))
        }
        Value::Array(items) => Ok(Value::Array(
            (0..items.len()).map(|i| Value::Number(i as f64)).collect(),
        )),
        other => Err(EvalError::new(format!("{} has no keys", type_desc(&other)))),
    }
}

fn has(container: &Value, key: &Value) -> Result<Value, EvalError> {
    match (container, key) {
        (Value::Object(map), Value::String(k)) => Ok(Value::Bool(map.contains_key(k))),
        (Value::Array(items), Value::Number(n)) => {
            Ok(Value::Bool(*n >= 0.0 && *n < items.len() as f64))
        }
        _ => Err(EvalError::new(format!(
            "Cannot check whether {} has a {} key",
            container.type_name(),
            key.type_name()
        ))),
    }
}

/// Structural containment: substrings, subsets of arrays, sub-objects.
fn contains(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => b
            .iter()
            .all(|(k, bv)| a.get(k).is_some_and(|av| contains(av, bv))),
        (Value::Array(a), Value::Array(b)) => {
            b.iter().all(|bv| a.iter().any(|av| contains(av, bv)))
        }
        (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
        (Value::Bool(_), Value::Bool(_)) | (Value::Number(_), Value::Number(_)) | (Value::Null, Value::Null) => {
            a == b
        }
        _ => false,
    }
}

/// `[.[] | f]`
fn map_values_of<'a>(f: &'a Expr, input: Value, env: &Env<'a>) -> Result<Value, EvalError> {
    let mut out = Vec::new();
    for item in iterate(input)? {
        out.extend(collect(f, item, env)?);
    }
    Ok(Value::Array(out))
}

/// `.[] |= f`: each value is replaced by the first output of `f`, or
/// dropped when `f` produces nothing.
fn map_values<'a>(f: &'a Expr, input: Value, env: &Env<'a>) -> Result<Value, EvalError> {
    let first = |v: Value| eval(f, v, env).next().transpose();
    match input {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = first(item)? {
                    out.push(v);
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, item) in map {
                if let Some(v) = first(item)? {
                    out.insert(k, v);
                }
            }
            Ok(Value::Object(out))
        }
        other => Err(not_iterable(&other)),
    }
}

fn require_array(input: Value, what: &str) -> Result<Vec<Value>, EvalError> {
    match input {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::new(format!(
            "{} cannot be {}, as it is not an array",
            type_desc(&other),
            what
        ))),
    }
}

/// Pair every element with its sort key (`[f]`, or the element itself),
/// stably sorted by key.
fn sort_by_keys<'a>(
    f: Option<&'a Expr>,
    input: Value,
    env: &Env<'a>,
) -> Result<Vec<(Value, Value)>, EvalError> {
    let items = require_array(input, "sorted")?;
    let mut pairs = items
        .into_iter()
        .map(|item| {
            let key = match f {
                Some(f) => Value::Array(collect(f, item.clone(), env)?),
                None => item.clone(),
            };
            Ok((key, item))
        })
        .collect::<Result<Vec<_>, EvalError>>()?;
    pairs.sort_by(|a, b| a.0.jq_cmp(&b.0));
    Ok(pairs)
}

/// Sorted runs of elements with equal keys.
fn group<'a>(f: Option<&'a Expr>, input: Value, env: &Env<'a>) -> Result<Vec<Vec<Value>>, EvalError> {
    let mut groups: Vec<Vec<Value>> = Vec::new();
    let mut last_key: Option<Value> = None;
    for (key, item) in sort_by_keys(f, input, env)? {
        let same = last_key
            .as_ref()
            .is_some_and(|prev| prev.jq_cmp(&key) == Ordering::Equal);
        match groups.last_mut() {
            Some(current) if same => current.push(item),
            _ => {
                groups.push(vec![item]);
                last_key = Some(key);
            }
        }
    }
    Ok(groups)
}

fn first_of_each(groups: Vec<Vec<Value>>) -> Value {
    Value::Array(groups.into_iter().filter_map(|g| g.into_iter().next()).collect())
}

/// `min`/`max` (and their `_by` forms). Ties keep the last element for
/// `max` and the first for `min`, like jq.
fn extreme_by<'a>(
    f: Option<&'a Expr>,
    input: Value,
    env: &Env<'a>,
    want: Ordering,
) -> Result<Value, EvalError> {
    let what = if want == Ordering::Less { "min" } else { "max" };
    let items = match input {
        Value::Array(items) => items,
        other => {
            return Err(EvalError::new(format!(
                "Cannot find {} of {}, as it is not an array",
                what,
                type_desc(&other)
            )))
        }
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let key = match f {
            Some(f) => Value::Array(collect(f, item.clone(), env)?),
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => {
                let ord = key.jq_cmp(best_key);
                ord == want || (want == Ordering::Greater && ord == Ordering::Equal)
            }
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map(|(_, v)| v).unwrap_or(Value::Null))
}

fn range<'a>(start: Value, end: Value) -> ValueIter<'a> {
    match (start, end) {
        (Value::Number(start), Value::Number(end)) => Box::new(
            core::iter::successors(Some(start), |n| Some(n + 1.0))
                .take_while(move |n| *n < end)
                .map(|n| Ok(Value::Number(n))),
        ),
        _ => fail(EvalError::new("Range bounds must be numeric")),
    }
}

/// `range(from; upto; by)`: counts down when `by` is negative, and yields
/// nothing for a zero step.
fn range_by<'a>(start: Value, end: Value, step: Value) -> ValueIter<'a> {
    match (start, end, step) {
        (Value::Number(start), Value::Number(end), Value::Number(step)) => {
            if step == 0.0 || step.is_nan() {
                return empty();
            }
            Box::new(
                core::iter::successors(Some(start), move |n| Some(n + step))
                    .take_while(move |n| if step > 0.0 { *n < end } else { *n > end })
                    .map(|n| Ok(Value::Number(n))),
            )
        }
        _ => fail(EvalError::new("Range bounds must be numeric")),
    }
}

fn elements<'a>(items: Vec<Value>) -> ValueIter<'a> {
    Box::new(items.into_iter().map(Ok))
}

/// Shared body of `any` and `all` with a condition: stops at the first
/// condition output whose truthiness equals `decisive`.
fn quantify<'a>(
    outputs: ValueIter<'a>,
    cond: &'a Expr,
    env: &Env<'a>,
    decisive: bool,
) -> Result<Value, EvalError> {
    for item in outputs {
        for c in eval(cond, item?, env) {
            if c?.is_truthy() == decisive {
                return Ok(Value::Bool(decisive));
            }
        }
    }
    Ok(Value::Bool(!decisive))
}

fn to_entries(input: Value) -> Result<Value, EvalError> {
    let entry = |key: Value, value: Value| {
        let mut obj = Map::with_capacity(2);
        obj.insert("key".to_string(), key);
        obj.insert("value".to_string(), value);
        Value::Object(obj)
    };
    match input {
        Value::Object(map) => Ok(Value::Array(
            map.into_iter()
                .map(|(k, v)| entry(Value::String(k), v))
                .collect(),
        )),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| entry(Value::Number(i as f64), v))
                .collect(),
        )),
        other => Err(EvalError::new(format!("{} has no keys", type_desc(&other)))),
    }
}

fn from_entries(input: Value) -> Result<Value, EvalError> {
    const KEY_NAMES: [&str; 6] = ["key", "k", "name", "Name", "Key", "K"];
    const VALUE_NAMES: [&str; 3] = ["value", "v", "Value"];

    let mut out = Map::new();
    for entry in iterate(input)? {
        let mut fields = match entry {
            Value::Object(fields) => fields,
            other => {
                return Err(EvalError::new(format!(
                    "Cannot index {} with \"key\"",
                    other.type_name()
                )))
            }
        };
        let key = KEY_NAMES
            .iter()
            .find_map(|name| fields.get(*name).filter(|k| k.is_truthy()).cloned())
            .unwrap_or(Value::Null);
        let key = match key {
            Value::String(s) => s,
            other => other.to_json(),
        };
        let value = VALUE_NAMES
            .iter()
            .find_map(|name| fields.swap_remove(*name))
            .unwrap_or(Value::Null);
        out.insert(key, value);
    }
    Ok(Value::Object(out))
}

fn math(input: Value, f: fn(f64) -> f64) -> Result<Value, EvalError> {
    match input {
        Value::Number(n) => Ok(Value::Number(f(n))),
        other => Err(EvalError::new(format!(
            "{} number required",
            type_desc(&other)
        ))),
    }
}

fn string_op(input: Value, name: &str, f: fn(&str) -> String) -> Result<Value, EvalError> {
    match input {
        Value::String(s) => Ok(Value::String(f(&s))),
        _ => Err(EvalError::new(format!("{} input must be a string", name))),
    }
}

fn join(input: &Value, sep: &Value) -> Result<Value, EvalError> {
    let Value::String(sep) = sep else {
        return Err(EvalError::new(format!(
            "{} is not a valid separator",
            type_desc(sep)
        )));
    };
    let items = iterate(input.clone())?;
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        match item {
            Value::Null => {}
            Value::String(s) => out.push_str(s),
            Value::Number(_) | Value::Bool(_) => out.push_str(&item.to_json()),
            other => {
                return Err(EvalError::new(format!(
                    "Cannot join with {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::String(out))
}

/// `recurse(f)`: depth-first, each value before the values `f` derives
/// from it.
struct RecurseIter<'a> {
    stack: Vec<ValueIter<'a>>,
    step: &'a Expr,
    env: Env<'a>,
}

impl<'a> Iterator for RecurseIter<'a> {
    type Item = Result<Value, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(Ok(v)) => {
                    self.stack.push(eval(self.step, v.clone(), &self.env));
                    return Some(Ok(v));
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
