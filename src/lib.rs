//! # jqhost
//!
//! Run jq scripts over native Rust values.
//!
//! Host values go in through serde, run through an embedded jq engine, and
//! come back out as whatever `Deserialize` type the caller asks for.
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//!
//! // One-shot: compile, run, collect.
//! let names: Vec<String> = jqhost::all(".[].name", &json!([{"name": "a"}, {"name": "b"}])).unwrap();
//! assert_eq!(names, vec!["a", "b"]);
//!
//! // Exactly one result, with a variable.
//! let greeting: String = jqhost::Query::new("\"\\(.) \\($who)\"")
//!     .input("hello")
//!     .var("who", "world")
//!     .one()
//!     .unwrap();
//! assert_eq!(greeting, "hello world");
//!
//! // Compile once, reuse.
//! let program = jqhost::compile(".count + 1").unwrap();
//! for n in 0..3 {
//!     let next: i64 = program.query().input(&json!({"count": n})).one().unwrap();
//!     assert_eq!(next, n + 1);
//! }
//! ```
//!
//! ## Cardinality
//!
//! - [`all`] collects every output.
//! - [`first`] returns the first output, or [`Error::NoResult`].
//! - [`one`] returns the only output, or [`Error::NoResult`] /
//!   [`Error::Multiplicity`].
//!
//! A script error aborts the call; no partial results are returned.
//!
//! ## Features
//!
//! - `http` (default) - fetch URL inputs with a blocking reqwest client.
//!   Without it, URL inputs need a caller-supplied [`Opener`](input::Opener).

mod bindings;
mod collect;
mod error;
mod exec;
pub mod input;
pub mod jq;
mod marshal;
mod program;
mod query;

pub use bindings::Bindings;
pub use error::{Error, Result};
pub use exec::{ExecutionFault, Outputs, QueryOutputs};
pub use jq::Value;
pub use marshal::{from_value, to_value, MarshalError};
pub use program::{Compiler, Diagnostic, Location, Program};
pub use query::{all, compile, first, one, PreparedQuery, Query};
