//! Output streams of a running program.

use core::iter::FusedIterator;

use log::{debug, trace};

use crate::bindings::Bindings;
use crate::jq::{EvalError, Value, ValueIter};
use crate::program::Program;

/// An error raised by a script while it runs, e.g. `error("boom")` or
/// `Cannot index number with "foo"`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionFault {
    message: String,
    value: Value,
}

impl ExecutionFault {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raised payload. Scripts may raise any value, not just strings.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl From<EvalError> for ExecutionFault {
    fn from(err: EvalError) -> Self {
        ExecutionFault {
            message: err.message(),
            value: err.into_value(),
        }
    }
}

/// Lazy outputs of one evaluation.
///
/// Yields nothing further once a fault has been yielded.
pub struct Outputs<'p> {
    inner: Option<ValueIter<'p>>,
}

impl<'p> Outputs<'p> {
    pub(crate) fn new(inner: ValueIter<'p>) -> Self {
        Outputs { inner: Some(inner) }
    }
}

impl Iterator for Outputs<'_> {
    type Item = Result<Value, ExecutionFault>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.as_mut()?.next() {
            Some(Ok(value)) => {
                trace!("output: {}", value);
                Some(Ok(value))
            }
            Some(Err(err)) => {
                self.inner = None;
                debug!("execution fault: {}", err);
                Some(Err(err.into()))
            }
            None => {
                self.inner = None;
                None
            }
        }
    }
}

impl FusedIterator for Outputs<'_> {}

/// Outputs of one program over several inputs, in input order.
///
/// A fault from any input ends the whole stream.
pub struct QueryOutputs<'q> {
    program: &'q Program,
    bindings: &'q Bindings,
    inputs: core::slice::Iter<'q, Value>,
    current: Option<Outputs<'q>>,
    failed: bool,
}

impl<'q> QueryOutputs<'q> {
    pub(crate) fn new(program: &'q Program, bindings: &'q Bindings, inputs: &'q [Value]) -> Self {
        QueryOutputs {
            program,
            bindings,
            inputs: inputs.iter(),
            current: None,
            failed: false,
        }
    }
}

impl Iterator for QueryOutputs<'_> {
    type Item = Result<Value, ExecutionFault>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(outputs) = self.current.as_mut() {
                match outputs.next() {
                    Some(Ok(value)) => return Some(Ok(value)),
                    Some(Err(fault)) => {
                        self.failed = true;
                        self.current = None;
                        return Some(Err(fault));
                    }
                    None => self.current = None,
                }
            }
            let input = self.inputs.next()?;
            debug!("evaluating input {}", input.type_name());
            self.current = Some(self.program.evaluate(input.clone(), self.bindings));
        }
    }
}

impl FusedIterator for QueryOutputs<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(script: &str, input: &str) -> Vec<Result<String, String>> {
        let program = Program::compile(script).unwrap();
        let bindings = Bindings::new();
        let input = Value::from_json_str(input).unwrap();
        program
            .evaluate(input, &bindings)
            .map(|r| r.map(|v| v.to_json()).map_err(|f| f.message().to_string()))
            .collect()
    }

    #[test]
    fn test_fused_after_fault() {
        let results = run(r#".[] | if . == 2 then error("two") else . end"#, "[1, 2, 3]");
        assert_eq!(
            results,
            vec![Ok("1".to_string()), Err("two".to_string())]
        );
    }

    #[test]
    fn test_fault_carries_payload() {
        let program = Program::compile(r#"error({"code": 7})"#).unwrap();
        let bindings = Bindings::new();
        let fault = program
            .evaluate(Value::Null, &bindings)
            .next()
            .unwrap()
            .unwrap_err();
        assert_eq!(fault.value().to_json(), r#"{"code":7}"#);
        assert_eq!(fault.message(), r#"{"code":7} (not a string)"#);
    }

    #[test]
    fn test_unbound_variable_is_a_fault() {
        assert_eq!(
            run("$nope", "null"),
            vec![Err("$nope is not defined".to_string())]
        );
    }

    #[test]
    fn test_lazy_over_infinite_stream() {
        let program = Program::compile("range(1e18)").unwrap();
        let bindings = Bindings::new();
        let taken: Vec<_> = program
            .evaluate(Value::Null, &bindings)
            .take(3)
            .map(|r| r.unwrap().to_json())
            .collect();
        assert_eq!(taken, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_query_outputs_span_inputs() {
        let program = Program::compile(".[]").unwrap();
        let bindings = Bindings::new();
        let inputs = vec![
            Value::from_json_str("[1, 2]").unwrap(),
            Value::from_json_str("[]").unwrap(),
            Value::from_json_str("[3]").unwrap(),
        ];
        let all: Vec<_> = QueryOutputs::new(&program, &bindings, &inputs)
            .map(|r| r.unwrap().to_json())
            .collect();
        assert_eq!(all, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_query_outputs_stop_at_first_fault() {
        let program = Program::compile(".[]").unwrap();
        let bindings = Bindings::new();
        let inputs = vec![
            Value::from_json_str("[1]").unwrap(),
            Value::Number(5.0),
            Value::from_json_str("[2]").unwrap(),
        ];
        let mut outputs = QueryOutputs::new(&program, &bindings, &inputs);
        assert!(outputs.next().unwrap().is_ok());
        let fault = outputs.next().unwrap().unwrap_err();
        assert_eq!(fault.message(), "Cannot iterate over number (5)");
        assert!(outputs.next().is_none());
    }
}
