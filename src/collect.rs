//! Cardinality policies over an output stream.
//!
//! Every policy aborts on the first fault and returns no partial results.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::exec::ExecutionFault;
use crate::jq::Value;
use crate::marshal::from_value;

/// Every output, in order.
pub(crate) fn all<T, I>(outputs: I) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: Iterator<Item = core::result::Result<Value, ExecutionFault>>,
{
    outputs.map(|output| Ok(from_value(output?)?)).collect()
}

/// The first output. Stops pulling once it has one.
pub(crate) fn first<T, I>(mut outputs: I) -> Result<T>
where
    T: DeserializeOwned,
    I: Iterator<Item = core::result::Result<Value, ExecutionFault>>,
{
    match outputs.next() {
        Some(output) => Ok(from_value(output?)?),
        None => Err(Error::NoResult),
    }
}

/// The only output. Pulls one past the first to prove there is no second.
pub(crate) fn one<T, I>(mut outputs: I) -> Result<T>
where
    T: DeserializeOwned,
    I: Iterator<Item = core::result::Result<Value, ExecutionFault>>,
{
    let only = outputs.next().ok_or(Error::NoResult)??;
    if let Some(second) = outputs.next() {
        second?;
        return Err(Error::Multiplicity { count: 2 });
    }
    Ok(from_value(only)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jq::EvalError;

    type Output = core::result::Result<Value, ExecutionFault>;

    fn stream(items: Vec<core::result::Result<f64, &'static str>>) -> impl Iterator<Item = Output> {
        items.into_iter().map(|item| {
            item.map(Value::Number)
                .map_err(|msg| ExecutionFault::from(EvalError::new(msg)))
        })
    }

    #[test]
    fn test_all() {
        let got: Vec<i32> = all(stream(vec![Ok(1.0), Ok(2.0)])).unwrap();
        assert_eq!(got, vec![1, 2]);
        let got: Vec<i32> = all(stream(vec![])).unwrap();
        assert!(got.is_empty());
        assert!(matches!(
            all::<i32, _>(stream(vec![Ok(1.0), Err("boom")])),
            Err(Error::Execution(_))
        ));
    }

    #[test]
    fn test_first_ignores_later_faults() {
        let got: i32 = first(stream(vec![Ok(7.0), Err("never pulled")])).unwrap();
        assert_eq!(got, 7);
        assert!(matches!(first::<i32, _>(stream(vec![])), Err(Error::NoResult)));
    }

    #[test]
    fn test_one() {
        assert_eq!(one::<i32, _>(stream(vec![Ok(3.0)])).unwrap(), 3);
        assert!(matches!(one::<i32, _>(stream(vec![])), Err(Error::NoResult)));
        assert!(matches!(
            one::<i32, _>(stream(vec![Ok(1.0), Ok(2.0), Ok(3.0)])),
            Err(Error::Multiplicity { count: 2 })
        ));
        assert!(matches!(
            one::<i32, _>(stream(vec![Ok(1.0), Err("late")])),
            Err(Error::Execution(_))
        ));
    }

    #[test]
    fn test_result_type_mismatch() {
        assert!(matches!(
            first::<String, _>(stream(vec![Ok(1.0)])),
            Err(Error::Marshal(_))
        ));
    }
}
