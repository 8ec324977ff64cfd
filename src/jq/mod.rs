//! The jq language: values, parser and lazy evaluator.
//!
//! This module is the engine underneath [`Program`](crate::Program). It can
//! be used directly when a caller wants the AST or the raw output stream.
//!
//! # Supported Syntax
//!
//! | Expression | Meaning |
//! |------------|---------|
//! | `.` | Identity |
//! | `.foo`, `."foo"`, `.[e]` | Field or element access |
//! | `.[-1]` | Last element of an array |
//! | `.[2:5]`, `.[:3]`, `.[1:]` | Array or string slice |
//! | `.[]` | Iterate all elements of an array/object |
//! | `..` | Recursive descent |
//! | `f?`, `try f catch g` | Suppress or handle errors |
//! | `a \| b`, `a, b` | Pipe and comma |
//! | `[f]`, `{a: f, (k): v, $x}` | Array and object construction |
//! | `"a\(f)b"` | String interpolation |
//! | `+ - * / %` | Arithmetic |
//! | `== != < <= > >=` | Comparison |
//! | `and`, `or`, `not` | Boolean logic |
//! | `a // b` | Alternative (default if falsy or error) |
//! | `if c then a elif d then b else e end` | Conditional |
//! | `f as $x \| g` | Variable binding |
//! | `reduce`, `foreach` | Folding over a stream |
//! | `$name` | Variable supplied by the caller |
//!
//! Builtins: `empty`, `error`, `not`, `type`, `select`, `values`,
//! `nulls`/`booleans`/`numbers`/`strings`/`arrays`/`objects`/`iterables`/`scalars`,
//! `length`, `utf8bytelength`, `keys`, `keys_unsorted`, `has`, `in`,
//! `contains`, `map`, `map_values`, `add`, `any`, `all` (with zero, one or
//! two arguments), `min`, `max`,
//! `min_by`, `max_by`, `sort`, `sort_by`, `group_by`, `unique`, `unique_by`,
//! `reverse`, `first`, `last`, `limit`, `range` (up to three arguments), `to_entries`,
//! `from_entries`, `with_entries`, `recurse`, `floor`, `sqrt`, `tostring`,
//! `tonumber`, `tojson`, `fromjson`, `ascii_downcase`, `ascii_upcase`,
//! `startswith`, `endswith`, `ltrimstr`, `rtrimstr`, `split`, `join`.
//!
//! Behaviour follows jq 1.7 where versions differ:
//!
//! - `limit(n; f)` with a negative `n` produces every output of `f`.
//! - Numbers past the `f64` range, in scripts or parsed JSON, saturate to
//!   `±1.7976931348623157e+308`.
//! - Output uses the shortest digits that read back exactly, switching to
//!   exponent form (`1e+17`, `1e-05`) far from the decimal point, and keeps
//!   the sign of `-0`.
//! - `"s" * n` fails with `Repeat string result too long` past 256 MiB.
//!
//! # Example
//!
//! ```
//! use jqhost::jq::{eval, parse, Env, Map, Value};
//!
//! let expr = parse(".users[] | select(.age > 30) | .name").unwrap();
//! let input = Value::from_json_str(
//!     r#"{"users": [{"name": "Alice", "age": 31}, {"name": "Bob", "age": 25}]}"#,
//! )
//! .unwrap();
//!
//! let globals = Map::new();
//! let names: Vec<Value> = eval(&expr, input, &Env::new(&globals))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(names, vec![Value::string("Alice")]);
//! ```

mod builtins;
mod eval;
mod expr;
mod parser;
mod value;

pub use eval::{eval, Env, EvalError, ValueIter};
pub use expr::{
    ArithOp, Builtin, CompareOp, Expr, Literal, ObjectEntry, ObjectKey, StringPart, TypeFilter,
};
pub use parser::{parse, ParseError};
pub use value::{Map, Value};

pub(crate) use value::integral_i64;
