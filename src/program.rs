//! Compiled scripts.

use core::str::FromStr;

use log::debug;

use crate::bindings::Bindings;
use crate::exec::Outputs;
use crate::jq::{self, Env, Expr, ParseError, Value};
use crate::query::Query;

/// Where in the script a compile error was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Byte offset into the script.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Location {
    fn from_offset(script: &str, offset: usize) -> Self {
        let offset = offset.min(script.len());
        let before = script.get(..offset).unwrap_or(script);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Location {
            offset,
            line,
            column,
        }
    }
}

/// A script that failed to compile.
///
/// The message is laid out the way jq reports compile errors:
///
/// ```text
/// error: syntax error, unexpected '*', expecting $end
/// **
/// 1 compile error
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Diagnostic {
    message: String,
    reason: String,
    location: Option<Location>,
}

impl Diagnostic {
    fn new(script: &str, reason: String, location: Option<Location>) -> Self {
        let echoed = match location {
            Some(loc) => script.lines().nth(loc.line - 1).unwrap_or(script),
            None => script,
        };
        Diagnostic {
            message: format!("error: {}\n{}\n1 compile error", reason, echoed),
            reason,
            location,
        }
    }

    fn from_parse_error(script: &str, err: ParseError) -> Self {
        let location = Location::from_offset(script, err.position);
        Diagnostic::new(script, err.message, Some(location))
    }

    /// The full multi-line report.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Just the engine's reason, e.g. `syntax error, unexpected '*', expecting $end`.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }
}

/// Compiles scripts, optionally checking variable references against a
/// declared set of names.
///
/// ```
/// use jqhost::Compiler;
///
/// let compiler = Compiler::new().declare("limit");
/// assert!(compiler.compile(".[:$limit]").is_ok());
///
/// let err = compiler.compile("$missing").unwrap_err();
/// assert_eq!(err.reason(), "$missing is not defined");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    declared: Option<Vec<String>>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::default()
    }

    /// Declare a variable the script may reference. Once any name is
    /// declared, references to undeclared names fail to compile.
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.declared.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Declare every name bound in `bindings`.
    pub fn declare_bindings(mut self, bindings: &Bindings) -> Self {
        let declared = self.declared.get_or_insert_with(Vec::new);
        declared.extend(bindings.names().map(str::to_string));
        self
    }

    pub fn compile(&self, script: &str) -> Result<Program, Diagnostic> {
        let expr = jq::parse(script).map_err(|err| {
            debug!("compile failed: {}", err);
            Diagnostic::from_parse_error(script, err)
        })?;

        if let Some(declared) = &self.declared {
            if let Some(name) = expr
                .free_variables()
                .into_iter()
                .find(|name| !declared.contains(name))
            {
                debug!("compile failed: ${} is not defined", name);
                return Err(Diagnostic::new(
                    script,
                    format!("${} is not defined", name),
                    None,
                ));
            }
        }

        debug!("compiled script ({} bytes)", script.len());
        Ok(Program {
            source: script.to_string(),
            expr,
        })
    }
}

/// A compiled script.
///
/// Immutable once built; evaluate it any number of times, from any number
/// of threads.
///
/// ```
/// use jqhost::{Bindings, Program};
///
/// let program = Program::compile(".[] | . * 2").unwrap();
/// let input = jqhost::to_value(&[1, 2, 3]).unwrap();
/// let doubled: Vec<f64> = program
///     .evaluate(input, &Bindings::new())
///     .map(|v| v.unwrap().as_f64().unwrap())
///     .collect();
/// assert_eq!(doubled, vec![2.0, 4.0, 6.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    /// Compile without variable checking; unbound variables surface as
    /// execution faults.
    pub fn compile(script: &str) -> Result<Program, Diagnostic> {
        Compiler::new().compile(script)
    }

    /// The script text this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the program against one input. Outputs are produced as the
    /// iterator is pulled.
    pub fn evaluate<'p>(&'p self, input: Value, bindings: &'p Bindings) -> Outputs<'p> {
        let env = Env::new(bindings.as_map());
        Outputs::new(jq::eval(&self.expr, input, &env))
    }

    /// Start a [`Query`] that runs this program.
    pub fn query(&self) -> Query<'_> {
        Query::with_program(self)
    }
}

impl FromStr for Program {
    type Err = Diagnostic;

    fn from_str(script: &str) -> Result<Self, Diagnostic> {
        Program::compile(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_format() {
        let err = Program::compile("**").unwrap_err();
        assert_eq!(
            err.message(),
            "error: syntax error, unexpected '*', expecting $end\n**\n1 compile error"
        );
        assert_eq!(
            err.location(),
            Some(Location {
                offset: 0,
                line: 1,
                column: 1
            })
        );
    }

    #[test]
    fn test_diagnostic_echoes_failing_line() {
        let err = Program::compile(".a |\n  .b )").unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!((loc.line, loc.column), (2, 6));
        assert!(err.message().contains("\n  .b )\n"));
    }

    #[test]
    fn test_declared_variables() {
        let compiler = Compiler::new().declare("x");
        assert!(compiler.compile("$x + 1").is_ok());
        assert!(compiler.compile(". as $y | $y + $x").is_ok());
        let err = compiler.compile("$y").unwrap_err();
        assert_eq!(err.reason(), "$y is not defined");
        assert_eq!(err.location(), None);

        // Without declarations, free variables are left to run time.
        assert!(Program::compile("$anything").is_ok());
    }

    #[test]
    fn test_program_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Program>();
    }

    #[test]
    fn test_from_str() {
        let program: Program = ".a".parse().unwrap();
        assert_eq!(program.source(), ".a");
        assert!("{".parse::<Program>().is_err());
    }
}
