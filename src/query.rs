//! One-call entry points and the [`Query`] builder behind them.

use std::borrow::Cow;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bindings::Bindings;
use crate::collect;
use crate::error::{Error, Result};
use crate::exec::QueryOutputs;
use crate::input::{FetchConfig, Opener, Source};
use crate::jq::Value;
use crate::marshal::to_value;
use crate::program::{Diagnostic, Program};

enum Script<'s> {
    Text(String),
    Compiled(&'s Program),
}

/// Builds a run of one script over literal inputs or a fetched document.
///
/// Setters never fail; the first problem (an unconvertible input or
/// variable) is kept and reported by whichever terminal method runs.
///
/// ```
/// use jqhost::Query;
///
/// let names: Vec<String> = Query::new(".[] | .name + $suffix")
///     .input(&serde_json::json!([{"name": "a"}, {"name": "b"}]))
///     .var("suffix", "!")
///     .all()
///     .unwrap();
/// assert_eq!(names, vec!["a!", "b!"]);
/// ```
pub struct Query<'s> {
    script: Script<'s>,
    inputs: Option<Vec<Value>>,
    url: Option<String>,
    opener: Option<Box<dyn Opener + 's>>,
    bindings: Bindings,
    config: FetchConfig,
    error: Option<Error>,
}

impl<'s> Query<'s> {
    /// Query that compiles `script` when run.
    pub fn new(script: impl Into<String>) -> Self {
        Query::from_script(Script::Text(script.into()))
    }

    /// Query that runs an already compiled program.
    pub fn with_program(program: &'s Program) -> Self {
        Query::from_script(Script::Compiled(program))
    }

    fn from_script(script: Script<'s>) -> Self {
        Query {
            script,
            inputs: None,
            url: None,
            opener: None,
            bindings: Bindings::new(),
            config: FetchConfig::default(),
            error: None,
        }
    }

    fn fail(&mut self, err: impl Into<Error>) {
        self.error.get_or_insert(err.into());
    }

    /// Add one input. Each input is run separately, in the order added.
    pub fn input<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match to_value(value) {
            Ok(value) => self.inputs.get_or_insert_with(Vec::new).push(value),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Add several inputs.
    pub fn inputs<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let inputs = self.inputs.get_or_insert_with(Vec::new);
        for value in values {
            match to_value(&value) {
                Ok(value) => inputs.push(value),
                Err(err) => {
                    self.error.get_or_insert(err.into());
                    break;
                }
            }
        }
        self
    }

    /// Add an already converted input.
    pub fn input_value(mut self, value: Value) -> Self {
        self.inputs.get_or_insert_with(Vec::new).push(value);
        self
    }

    /// Fetch the single input from `url` instead of taking literal inputs.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replace the default HTTP fetch. Only consulted when a URL is set.
    pub fn opener(mut self, opener: impl Opener + 's) -> Self {
        self.opener = Some(Box::new(opener));
        self
    }

    /// Bind `$name`.
    pub fn var<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        if let Err(err) = self.bindings.insert(name, value) {
            self.fail(err);
        }
        self
    }

    /// Bind every variable in `bindings`, replacing clashes.
    pub fn vars(mut self, bindings: Bindings) -> Self {
        self.bindings.extend(bindings);
        self
    }

    /// Settings for the default HTTP opener.
    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    /// Check arguments, compile and resolve inputs, without running anything.
    pub fn prepare(self) -> Result<PreparedQuery<'s>> {
        let source = match (self.inputs, self.url) {
            (Some(_), Some(_)) => {
                return Err(Error::usage("give input values or a url, not both"))
            }
            (None, None) => return Err(Error::usage("no input: give input values or a url")),
            (Some(values), None) => Source::Literal(values),
            (None, Some(url)) => Source::Remote {
                url,
                opener: self.opener,
            },
        };
        if let Some(err) = self.error {
            return Err(err);
        }

        let program = match self.script {
            Script::Text(text) => Cow::Owned(Program::compile(&text)?),
            Script::Compiled(program) => Cow::Borrowed(program),
        };
        let inputs = source.resolve(&self.config)?;
        debug!(
            "query ready: {} input(s), {} variable(s)",
            inputs.len(),
            self.bindings.len()
        );

        Ok(PreparedQuery {
            program,
            bindings: self.bindings,
            inputs,
        })
    }

    /// Every output of every input.
    pub fn all<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let prepared = self.prepare()?;
        collect::all(prepared.outputs())
    }

    /// The first output; [`Error::NoResult`] if there is none.
    pub fn first<T: DeserializeOwned>(self) -> Result<T> {
        let prepared = self.prepare()?;
        collect::first(prepared.outputs())
    }

    /// The only output; [`Error::NoResult`] for none,
    /// [`Error::Multiplicity`] for more than one.
    pub fn one<T: DeserializeOwned>(self) -> Result<T> {
        let prepared = self.prepare()?;
        collect::one(prepared.outputs())
    }
}

/// A query whose script is compiled and whose inputs are resolved.
pub struct PreparedQuery<'s> {
    program: Cow<'s, Program>,
    bindings: Bindings,
    inputs: Vec<Value>,
}

impl PreparedQuery<'_> {
    /// The raw output stream across all inputs. Can be called again to
    /// rerun the query.
    pub fn outputs(&self) -> QueryOutputs<'_> {
        QueryOutputs::new(&self.program, &self.bindings, &self.inputs)
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }
}

/// Compile `script` for repeated use.
pub fn compile(script: &str) -> core::result::Result<Program, Diagnostic> {
    Program::compile(script)
}

/// Run `script` on `input` and collect every output.
///
/// ```
/// let doubled: Vec<i64> = jqhost::all(".[] * 2", &[1, 2, 3]).unwrap();
/// assert_eq!(doubled, vec![2, 4, 6]);
/// ```
pub fn all<T, I>(script: &str, input: &I) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: Serialize + ?Sized,
{
    Query::new(script).input(input).all()
}

/// Run `script` on `input` and return its first output.
pub fn first<T, I>(script: &str, input: &I) -> Result<T>
where
    T: DeserializeOwned,
    I: Serialize + ?Sized,
{
    Query::new(script).input(input).first()
}

/// Run `script` on `input` and return its only output.
pub fn one<T, I>(script: &str, input: &I) -> Result<T>
where
    T: DeserializeOwned,
    I: Serialize + ?Sized,
{
    Query::new(script).input(input).one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_usage_errors() {
        let both = Query::new(".").input(&1).url("http://example.com").all::<i32>();
        assert!(matches!(both, Err(Error::Usage(_))));

        let neither = Query::new(".").all::<i32>();
        assert!(matches!(neither, Err(Error::Usage(_))));
    }

    #[test]
    fn test_usage_checked_before_compile() {
        let err = Query::new("**").all::<i32>().unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_first_builder_error_wins() {
        let mut bad = HashMap::new();
        bad.insert(1, 2);
        let err = Query::new(".")
            .input(&1)
            .var("a", &bad)
            .var("b", &bad)
            .all::<i32>()
            .unwrap_err();
        match err {
            Error::Marshal(err) => assert!(err.to_string().ends_with("at $a")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_multiple_inputs_in_order() {
        let got: Vec<String> = Query::new(". + $s")
            .inputs(["a", "b"])
            .input("c")
            .var("s", "!")
            .all()
            .unwrap();
        assert_eq!(got, vec!["a!", "b!", "c!"]);
    }

    #[test]
    fn test_first_spans_inputs() {
        let got: i32 = Query::new(".[]")
            .inputs([json!([]), json!([4, 5])])
            .first()
            .unwrap();
        assert_eq!(got, 4);
    }

    #[test]
    fn test_one_counts_across_inputs() {
        let err = Query::new(".")
            .inputs([1, 2])
            .one::<i32>()
            .unwrap_err();
        assert!(matches!(err, Error::Multiplicity { count: 2 }));
    }

    #[test]
    fn test_prepared_outputs_rerun() {
        let prepared = Query::new(".[]").input(&[1, 2]).prepare().unwrap();
        assert_eq!(prepared.outputs().count(), 2);
        assert_eq!(prepared.outputs().count(), 2);
        assert_eq!(prepared.inputs().len(), 1);
    }

    #[test]
    fn test_with_program() {
        let program = compile(".a").unwrap();
        let a: String = program.query().input(&json!({"a": "x"})).one().unwrap();
        assert_eq!(a, "x");
    }

    #[test]
    fn test_opener_used_for_url() {
        let got: Vec<i32> = Query::new(".[] | . + .")
            .url("http://example.com")
            .opener(|_: &str| Ok::<_, std::io::Error>("[1, 2, 3]".to_string()))
            .all()
            .unwrap();
        assert_eq!(got, vec![2, 4, 6]);
    }
}
