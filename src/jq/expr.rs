//! Expression AST for jq filters.

use super::value::Value;

/// A parsed jq filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Identity: `.`
    Identity,

    /// Recursive descent: `..`
    RecursiveDescent,

    /// Literal value: `null`, `true`, `1.5`, `"text"`
    Literal(Literal),

    /// String with interpolations: `"a\(.b)c"`
    Format(Vec<StringPart>),

    /// Variable reference: `$name`
    Var(String),

    /// Index access: `.foo`, `.[0]`, `.[.key]`, `$x.foo`
    /// The index expression is evaluated against the original input, not the target.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    /// Slice: `.[2:5]`, `.[:3]`, `.[1:]`
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },

    /// Iterate all values: `.[]`
    Iterate(Box<Expr>),

    /// Pipe: `a | b | c`. Each stage runs on every output of the previous one.
    Pipe(Vec<Expr>),

    /// Comma: `a, b` - outputs of `a` followed by outputs of `b`
    Comma(Vec<Expr>),

    /// Array construction: `[f]` collects every output of `f`
    Array(Box<Expr>),

    /// Object construction: `{a: .b, (.k): .v, $x}`
    Object(Vec<ObjectEntry>),

    /// Unary minus: `-.a`
    Neg(Box<Expr>),

    /// Arithmetic: `+ - * / %`
    Arithmetic {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Comparison: `== != < <= > >=`
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Boolean AND: `a and b`
    And(Box<Expr>, Box<Expr>),

    /// Boolean OR: `a or b`
    Or(Box<Expr>, Box<Expr>),

    /// Alternative: `a // b`
    Alternative(Box<Expr>, Box<Expr>),

    /// `if c then a elif d then b else e end`; elif is desugared to nested If.
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// `try a catch b`, and the postfix form `a?` (no catch).
    Try {
        body: Box<Expr>,
        catch: Option<Box<Expr>>,
    },

    /// Variable binding: `source as $name | body`
    Bind {
        source: Box<Expr>,
        name: String,
        body: Box<Expr>,
    },

    /// `reduce source as $name (init; update)`
    Reduce {
        source: Box<Expr>,
        name: String,
        init: Box<Expr>,
        update: Box<Expr>,
    },

    /// `foreach source as $name (init; update; extract)`
    Foreach {
        source: Box<Expr>,
        name: String,
        init: Box<Expr>,
        update: Box<Expr>,
        extract: Option<Box<Expr>>,
    },

    /// Builtin function call, resolved by name and arity at parse time.
    Builtin(Builtin),
}

/// Builtin functions.
///
/// Argument expressions are closures over the call's input, as in jq:
/// `has(.k)` evaluates `.k` against the same input `has` receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    // Control
    Empty,
    /// `error` (raise the input) or `error(msg)`
    Error(Option<Box<Expr>>),
    Not,

    // Types and selection
    Type,
    Select(Box<Expr>),
    Values,
    /// `nulls`, `booleans`, `numbers`, `strings`, `arrays`, `objects`, `iterables`, `scalars`
    TypeFilter(TypeFilter),

    // Length, keys and membership
    Length,
    Utf8ByteLength,
    Keys,
    KeysUnsorted,
    Has(Box<Expr>),
    In(Box<Expr>),
    Contains(Box<Expr>),

    // Mapping and reduction
    Map(Box<Expr>),
    MapValues(Box<Expr>),
    Add,
    Any,
    All,
    AnyWith(Box<Expr>),
    AllWith(Box<Expr>),
    AnyOf(Box<Expr>, Box<Expr>),
    AllOf(Box<Expr>, Box<Expr>),
    Min,
    Max,
    MinBy(Box<Expr>),
    MaxBy(Box<Expr>),

    // Arrays
    Sort,
    SortBy(Box<Expr>),
    GroupBy(Box<Expr>),
    Unique,
    UniqueBy(Box<Expr>),
    Reverse,
    First,
    Last,
    FirstOf(Box<Expr>),
    LastOf(Box<Expr>),
    Limit(Box<Expr>, Box<Expr>),
    Range(Box<Expr>),
    RangeFrom(Box<Expr>, Box<Expr>),
    RangeBy(Box<Expr>, Box<Expr>, Box<Expr>),

    // Objects
    ToEntries,
    FromEntries,
    WithEntries(Box<Expr>),

    // Recursion
    Recurse,
    RecurseWith(Box<Expr>),

    // Numbers
    Floor,
    Sqrt,

    // Strings and conversion
    ToString,
    ToNumber,
    ToJson,
    FromJson,
    AsciiDowncase,
    AsciiUpcase,
    StartsWith(Box<Expr>),
    EndsWith(Box<Expr>),
    LtrimStr(Box<Expr>),
    RtrimStr(Box<Expr>),
    Split(Box<Expr>),
    Join(Box<Expr>),
}

/// Type-selecting builtins like `numbers` or `iterables`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Nulls,
    Booleans,
    Numbers,
    Strings,
    Arrays,
    Objects,
    Iterables,
    Scalars,
}

impl TypeFilter {
    /// Whether `value` passes this filter.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            TypeFilter::Nulls => matches!(value, Value::Null),
            TypeFilter::Booleans => matches!(value, Value::Bool(_)),
            TypeFilter::Numbers => matches!(value, Value::Number(_)),
            TypeFilter::Strings => matches!(value, Value::String(_)),
            TypeFilter::Arrays => matches!(value, Value::Array(_)),
            TypeFilter::Objects => matches!(value, Value::Object(_)),
            TypeFilter::Iterables => matches!(value, Value::Array(_) | Value::Object(_)),
            TypeFilter::Scalars => !matches!(value, Value::Array(_) | Value::Object(_)),
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An entry in an object construction expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub value: Expr,
}

/// Object key in construction - either literal or computed.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// `{foo: ...}` or `{"foo": ...}`
    Literal(String),
    /// `{(.name): ...}` or `{"\(.k)": ...}`
    Expr(Box<Expr>),
}

/// A segment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Expr(Expr),
}

/// Literal values that can appear in jq expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

impl Expr {
    /// Chain stages together, collapsing a single stage to itself.
    pub fn pipe(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            Expr::Pipe(exprs)
        }
    }

    /// Comma of several expressions, collapsing a single one to itself.
    pub fn comma(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            Expr::Comma(exprs)
        }
    }

    /// `.name` applied to `target`.
    pub fn field(target: Expr, name: impl Into<String>) -> Self {
        Expr::Index {
            target: Box::new(target),
            index: Box::new(Expr::Literal(Literal::String(name.into()))),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Expr::Identity)
    }

    /// Variables referenced by this expression that no enclosing
    /// `as`/`reduce`/`foreach` binds, in first-use order.
    pub fn free_variables(&self) -> Vec<String> {
        let mut bound = Vec::new();
        let mut free = Vec::new();
        self.collect_free_vars(&mut bound, &mut free);
        free
    }

    fn collect_free_vars(&self, bound: &mut Vec<String>, free: &mut Vec<String>) {
        match self {
            Expr::Identity | Expr::RecursiveDescent | Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !bound.iter().any(|b| b == name) && !free.iter().any(|f| f == name) {
                    free.push(name.clone());
                }
            }
            Expr::Format(parts) => {
                for part in parts {
                    if let StringPart::Expr(e) = part {
                        e.collect_free_vars(bound, free);
                    }
                }
            }
            Expr::Index { target, index } => {
                target.collect_free_vars(bound, free);
                index.collect_free_vars(bound, free);
            }
            Expr::Slice { target, start, end } => {
                target.collect_free_vars(bound, free);
                for e in [start, end].into_iter().flatten() {
                    e.collect_free_vars(bound, free);
                }
            }
            Expr::Iterate(e) | Expr::Array(e) | Expr::Neg(e) => e.collect_free_vars(bound, free),
            Expr::Pipe(exprs) | Expr::Comma(exprs) => {
                for e in exprs {
                    e.collect_free_vars(bound, free);
                }
            }
            Expr::Object(entries) => {
                for entry in entries {
                    if let ObjectKey::Expr(k) = &entry.key {
                        k.collect_free_vars(bound, free);
                    }
                    entry.value.collect_free_vars(bound, free);
                }
            }
            Expr::Arithmetic { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.collect_free_vars(bound, free);
                right.collect_free_vars(bound, free);
            }
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Alternative(l, r) => {
                l.collect_free_vars(bound, free);
                r.collect_free_vars(bound, free);
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.collect_free_vars(bound, free);
                then_branch.collect_free_vars(bound, free);
                else_branch.collect_free_vars(bound, free);
            }
            Expr::Try { body, catch } => {
                body.collect_free_vars(bound, free);
                if let Some(c) = catch {
                    c.collect_free_vars(bound, free);
                }
            }
            Expr::Bind { source, name, body } => {
                source.collect_free_vars(bound, free);
                bound.push(name.clone());
                body.collect_free_vars(bound, free);
                bound.pop();
            }
            Expr::Reduce {
                source,
                name,
                init,
                update,
            } => {
                source.collect_free_vars(bound, free);
                init.collect_free_vars(bound, free);
                bound.push(name.clone());
                update.collect_free_vars(bound, free);
                bound.pop();
            }
            Expr::Foreach {
                source,
                name,
                init,
                update,
                extract,
            } => {
                source.collect_free_vars(bound, free);
                init.collect_free_vars(bound, free);
                bound.push(name.clone());
                update.collect_free_vars(bound, free);
                if let Some(x) = extract {
                    x.collect_free_vars(bound, free);
                }
                bound.pop();
            }
            Expr::Builtin(b) => {
                for arg in b.args() {
                    arg.collect_free_vars(bound, free);
                }
            }
        }
    }
}

impl Builtin {
    /// The argument expressions of this call, in order.
    pub fn args(&self) -> Vec<&Expr> {
        match self {
            Builtin::Error(Some(a))
            | Builtin::Select(a)
            | Builtin::Has(a)
            | Builtin::In(a)
            | Builtin::Contains(a)
            | Builtin::Map(a)
            | Builtin::MapValues(a)
            | Builtin::MinBy(a)
            | Builtin::MaxBy(a)
            | Builtin::SortBy(a)
            | Builtin::GroupBy(a)
            | Builtin::UniqueBy(a)
            | Builtin::FirstOf(a)
            | Builtin::LastOf(a)
            | Builtin::Range(a)
            | Builtin::WithEntries(a)
            | Builtin::RecurseWith(a)
            | Builtin::StartsWith(a)
            | Builtin::EndsWith(a)
            | Builtin::LtrimStr(a)
            | Builtin::RtrimStr(a)
            | Builtin::Split(a)
            | Builtin::Join(a)
            | Builtin::AnyWith(a)
            | Builtin::AllWith(a) => vec![&**a],
            Builtin::Limit(a, b)
            | Builtin::RangeFrom(a, b)
            | Builtin::AnyOf(a, b)
            | Builtin::AllOf(a, b) => vec![&**a, &**b],
            Builtin::RangeBy(a, b, c) => vec![&**a, &**b, &**c],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_simplification() {
        let single = Expr::pipe(vec![Expr::Identity]);
        assert_eq!(single, Expr::Identity);

        let multi = Expr::pipe(vec![Expr::Identity, Expr::Iterate(Box::new(Expr::Identity))]);
        assert!(matches!(multi, Expr::Pipe(_)));
    }

    #[test]
    fn test_comma_simplification() {
        let single = Expr::comma(vec![Expr::Var("a".into())]);
        assert_eq!(single, Expr::Var("a".into()));
        assert!(matches!(
            Expr::comma(vec![Expr::Identity, Expr::Identity]),
            Expr::Comma(_)
        ));
    }

    #[test]
    fn test_free_variables() {
        // $x is bound by `as`, $y is free
        let expr = Expr::Bind {
            source: Box::new(Expr::Identity),
            name: "x".into(),
            body: Box::new(Expr::Comma(vec![Expr::Var("x".into()), Expr::Var("y".into())])),
        };
        assert_eq!(expr.free_variables(), vec!["y".to_string()]);

        // Binding does not leak into the source
        let expr = Expr::Bind {
            source: Box::new(Expr::Var("x".into())),
            name: "x".into(),
            body: Box::new(Expr::Var("x".into())),
        };
        assert_eq!(expr.free_variables(), vec!["x".to_string()]);
    }

    #[test]
    fn test_type_filter() {
        assert!(TypeFilter::Iterables.accepts(&Value::Array(vec![])));
        assert!(!TypeFilter::Scalars.accepts(&Value::Array(vec![])));
        assert!(TypeFilter::Scalars.accepts(&Value::Null));
        assert!(TypeFilter::Numbers.accepts(&Value::Number(1.0)));
    }
}
