//! Parser for jq filters.
//!
//! Hand-written recursive descent over the script text. Precedence, lowest
//! first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | pipe | `\|`, `E as $x \| ...` |
//! | comma | `,` |
//! | alternative | `//` (right associative) |
//! | or / and | `or`, `and` |
//! | comparison | `== != < <= > >=` (non-associative) |
//! | additive | `+ -` |
//! | multiplicative | `* / %` |
//! | unary | `-` |
//! | postfix | `.foo`, `[e]`, `[a:b]`, `[]`, `?` |
//!
//! Syntax errors are worded like jq's own (`syntax error, unexpected '*',
//! expecting $end`) so callers can show them unchanged.

use super::expr::{
    ArithOp, Builtin, CompareOp, Expr, Literal, ObjectEntry, ObjectKey, StringPart, TypeFilter,
};

/// Nesting limit for parenthesised/bracketed sub-expressions.
const MAX_DEPTH: usize = 128;

/// Words that cannot be used as function names.
const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "end", "as", "reduce", "foreach", "try", "catch", "and", "or",
    "def", "import", "include", "label", "__loc__",
];

/// Error that occurs during parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the script.
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parser state.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    /// Whether the innermost pipe may contain top-level commas.
    /// Object values may not: `{a: 1, b: 2}`.
    comma_allowed: Vec<bool>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            depth: 0,
            comma_allowed: vec![true],
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    /// Peek at the next n bytes (clamped to a char boundary).
    fn peek_str(&self, n: usize) -> &str {
        let mut end = (self.pos + n).min(self.input.len());
        while !self.input.is_char_boundary(end) {
            end -= 1;
        }
        &self.input[self.pos..end]
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace and `#` comments.
    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.next();
            } else if c == '#' {
                while let Some(c) = self.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new("expression nested too deeply", self.pos));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// The word starting at the current position, if any.
    fn peek_word(&self) -> Option<&'a str> {
        let rest = &self.input[self.pos..];
        let first = rest.chars().next()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let len = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        Some(&rest[..len])
    }

    /// Describe the upcoming token the way jq's grammar names it.
    fn describe_next(&self) -> String {
        match self.peek() {
            None => "$end".to_string(),
            Some(c) if c.is_alphabetic() || c == '_' => match self.peek_word() {
                Some(word) if KEYWORDS.contains(&word) => word.to_string(),
                _ => "IDENT".to_string(),
            },
            Some(c) if c.is_ascii_digit() => "LITERAL".to_string(),
            Some('"') => "QQSTRING_START".to_string(),
            Some(c) => format!("'{}'", c),
        }
    }

    fn unexpected(&self, expecting: Option<&str>) -> ParseError {
        let found = self.describe_next();
        let message = match expecting {
            Some(what) => format!("syntax error, unexpected {}, expecting {}", found, what),
            None => format!("syntax error, unexpected {}", found),
        };
        ParseError::new(message, self.pos)
    }

    /// Consume a specific character or fail.
    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.next();
            Ok(())
        } else {
            Err(self.unexpected(Some(&format!("'{}'", expected))))
        }
    }

    /// Check if the current position holds `keyword` as a whole word.
    fn matches_keyword(&self, keyword: &str) -> bool {
        self.peek_word() == Some(keyword)
    }

    fn consume_keyword(&mut self, keyword: &str) {
        self.pos += keyword.len();
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        self.skip_ws();
        if self.matches_keyword(keyword) {
            self.consume_keyword(keyword);
            Ok(())
        } else {
            Err(self.unexpected(Some(keyword)))
        }
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_word() {
            Some(word) => {
                self.pos += word.len();
                Ok(word.to_string())
            }
            None => Err(self.unexpected(Some("IDENT"))),
        }
    }

    /// Parse `$name`.
    fn parse_variable(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if self.peek() != Some('$') {
            return Err(self.unexpected(Some("'$'")));
        }
        self.next();
        self.parse_ident()
    }

    /// Whether the next character can begin a term.
    fn starts_term(&self) -> bool {
        match self.peek() {
            Some('.' | '[' | '{' | '(' | '"' | '$' | '-') => true,
            Some(c) if c.is_ascii_digit() => true,
            Some(c) if c.is_alphabetic() || c == '_' => {
                !matches!(self.peek_word(), Some(w) if KEYWORDS.contains(&w)
                    && !matches!(w, "if" | "try" | "reduce" | "foreach"))
            }
            _ => false,
        }
    }

    /// Parse a number literal (integer, fraction, exponent).
    fn parse_number_literal(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.next();
        }

        if self.peek() == Some('.') && matches!(self.peek_nth(1), Some(c) if c.is_ascii_digit()) {
            self.next();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.next();
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.next();
            if matches!(self.peek(), Some('+' | '-')) {
                self.next();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.next();
                }
            } else {
                self.pos = save;
            }
        }

        // Overflowing literals saturate to the largest double, as in jq.
        self.input[start..self.pos]
            .parse::<f64>()
            .map(|n| Literal::Number(if n.is_infinite() { f64::MAX } else { n }))
            .map_err(|_| ParseError::new("invalid numeric literal", start))
    }

    /// Parse four hex digits of a `\u` escape.
    fn parse_hex4(&mut self) -> Result<u32, ParseError> {
        let start = self.pos;
        for _ in 0..4 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.next();
                }
                _ => return Err(ParseError::new("invalid \\u escape", self.pos)),
            }
        }
        u32::from_str_radix(&self.input[start..self.pos], 16)
            .map_err(|_| ParseError::new("invalid \\u escape", start))
    }

    /// Parse a string literal, with `\(...)` interpolation.
    fn parse_string(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.expect('"')?;
        let mut parts = Vec::new();
        let mut buf = String::new();

        loop {
            match self.next() {
                None => return Err(ParseError::new("unterminated string literal", start)),
                Some('"') => break,
                Some('\\') => match self.next() {
                    Some('"') => buf.push('"'),
                    Some('\\') => buf.push('\\'),
                    Some('/') => buf.push('/'),
                    Some('n') => buf.push('\n'),
                    Some('r') => buf.push('\r'),
                    Some('t') => buf.push('\t'),
                    Some('b') => buf.push('\x08'),
                    Some('f') => buf.push('\x0C'),
                    Some('u') => {
                        let mut code = self.parse_hex4()?;
                        // Surrogate pair
                        if (0xD800..0xDC00).contains(&code) && self.peek_str(2) == "\\u" {
                            self.pos += 2;
                            let low = self.parse_hex4()?;
                            code = 0x10000 + ((code - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                        }
                        let c = char::from_u32(code).ok_or_else(|| {
                            ParseError::new("invalid unicode code point", self.pos)
                        })?;
                        buf.push(c);
                    }
                    Some('(') => {
                        if !buf.is_empty() {
                            parts.push(StringPart::Literal(core::mem::take(&mut buf)));
                        }
                        self.comma_allowed.push(true);
                        let inner = self.parse_pipe();
                        self.comma_allowed.pop();
                        parts.push(StringPart::Expr(inner?));
                        self.expect(')')?;
                    }
                    Some(c) => {
                        return Err(ParseError::new(
                            format!("invalid escape sequence '\\{}'", c),
                            self.pos,
                        ));
                    }
                    None => return Err(ParseError::new("unterminated string literal", start)),
                },
                Some(c) => buf.push(c),
            }
        }

        if parts.is_empty() {
            return Ok(Expr::Literal(Literal::String(buf)));
        }
        if !buf.is_empty() {
            parts.push(StringPart::Literal(buf));
        }
        Ok(Expr::Format(parts))
    }

    /// Parse the bracket suffix after a term: `[]`, `[e]`, `[a:b]`, `[:b]`, `[a:]`.
    fn parse_bracket_suffix(&mut self, target: Expr) -> Result<Expr, ParseError> {
        self.expect('[')?;
        self.skip_ws();
        let target = Box::new(target);

        if self.peek() == Some(']') {
            self.next();
            return Ok(Expr::Iterate(target));
        }

        if self.peek() == Some(':') {
            self.next();
            let end = self.parse_pipe()?;
            self.expect(']')?;
            return Ok(Expr::Slice {
                target,
                start: None,
                end: Some(Box::new(end)),
            });
        }

        let first = self.parse_pipe()?;
        self.skip_ws();

        if self.peek() == Some(':') {
            self.next();
            self.skip_ws();
            if self.peek() == Some(']') {
                self.next();
                return Ok(Expr::Slice {
                    target,
                    start: Some(Box::new(first)),
                    end: None,
                });
            }
            let end = self.parse_pipe()?;
            self.expect(']')?;
            return Ok(Expr::Slice {
                target,
                start: Some(Box::new(first)),
                end: Some(Box::new(end)),
            });
        }

        self.expect(']')?;
        Ok(Expr::Index {
            target,
            index: Box::new(first),
        })
    }

    /// Parse array construction: `[]` or `[f]`.
    fn parse_array_construction(&mut self) -> Result<Expr, ParseError> {
        self.expect('[')?;
        self.skip_ws();

        if self.peek() == Some(']') {
            self.next();
            return Ok(Expr::Array(Box::new(Expr::Comma(vec![]))));
        }

        self.comma_allowed.push(true);
        let inner = self.parse_pipe();
        self.comma_allowed.pop();
        let inner = inner?;
        self.expect(']')?;
        Ok(Expr::Array(Box::new(inner)))
    }

    /// Parse object construction: `{key: value, ...}`.
    fn parse_object_construction(&mut self) -> Result<Expr, ParseError> {
        self.expect('{')?;
        self.skip_ws();

        let mut entries = Vec::new();

        if self.peek() == Some('}') {
            self.next();
            return Ok(Expr::Object(entries));
        }

        loop {
            self.skip_ws();

            // `{$x}` is shorthand for `{x: $x}`
            if self.peek() == Some('$') {
                let name = self.parse_variable()?;
                entries.push(ObjectEntry {
                    key: ObjectKey::Literal(name.clone()),
                    value: Expr::Var(name),
                });
            } else {
                let key = match self.peek() {
                    Some('(') => {
                        self.next();
                        self.comma_allowed.push(true);
                        let key_expr = self.parse_pipe();
                        self.comma_allowed.pop();
                        let key_expr = key_expr?;
                        self.expect(')')?;
                        ObjectKey::Expr(Box::new(key_expr))
                    }
                    Some('"') => match self.parse_string()? {
                        Expr::Literal(Literal::String(s)) => ObjectKey::Literal(s),
                        other => ObjectKey::Expr(Box::new(other)),
                    },
                    Some(c) if c.is_alphabetic() || c == '_' => {
                        ObjectKey::Literal(self.parse_ident()?)
                    }
                    _ => return Err(self.unexpected(None)),
                };

                self.skip_ws();
                let value = if self.peek() == Some(':') {
                    self.next();
                    self.parse_object_value()?
                } else {
                    // Shorthand: `{foo}` means `{foo: .foo}`
                    match &key {
                        ObjectKey::Literal(name) => Expr::field(Expr::Identity, name.clone()),
                        ObjectKey::Expr(e) if matches!(**e, Expr::Format(_)) => Expr::Index {
                            target: Box::new(Expr::Identity),
                            index: e.clone(),
                        },
                        ObjectKey::Expr(_) => return Err(self.unexpected(Some("':'"))),
                    }
                };
                entries.push(ObjectEntry { key, value });
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.next();
                }
                Some('}') => {
                    self.next();
                    break;
                }
                _ => return Err(self.unexpected(Some("'}'"))),
            }
        }

        Ok(Expr::Object(entries))
    }

    /// Object values are pipes without top-level commas.
    fn parse_object_value(&mut self) -> Result<Expr, ParseError> {
        self.comma_allowed.push(false);
        let value = self.parse_pipe();
        self.comma_allowed.pop();
        value
    }

    /// Parse a primary term.
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();

        match self.peek() {
            Some('(') => {
                self.next();
                self.comma_allowed.push(true);
                let inner = self.parse_pipe();
                self.comma_allowed.pop();
                let inner = inner?;
                self.expect(')')?;
                Ok(inner)
            }

            Some('[') => self.parse_array_construction(),

            Some('{') => self.parse_object_construction(),

            Some('"') => self.parse_string(),

            Some(c) if c.is_ascii_digit() => Ok(Expr::Literal(self.parse_number_literal()?)),

            Some('$') => {
                self.next();
                if self.matches_keyword("__loc__") {
                    return Err(ParseError::new("$__loc__ is not supported", self.pos));
                }
                Ok(Expr::Var(self.parse_ident()?))
            }

            Some('.') => {
                self.next();
                match self.peek() {
                    Some('.') => {
                        self.next();
                        Ok(Expr::RecursiveDescent)
                    }
                    Some('[') => self.parse_bracket_suffix(Expr::Identity),
                    Some('"') => {
                        let key = self.parse_string()?;
                        Ok(Expr::Index {
                            target: Box::new(Expr::Identity),
                            index: Box::new(key),
                        })
                    }
                    Some(c) if c.is_alphabetic() || c == '_' => {
                        let name = self.parse_ident()?;
                        Ok(Expr::field(Expr::Identity, name))
                    }
                    _ => Ok(Expr::Identity),
                }
            }

            Some(c) if c.is_alphabetic() || c == '_' => {
                if self.matches_keyword("null") {
                    self.consume_keyword("null");
                    Ok(Expr::Literal(Literal::Null))
                } else if self.matches_keyword("true") {
                    self.consume_keyword("true");
                    Ok(Expr::Literal(Literal::Bool(true)))
                } else if self.matches_keyword("false") {
                    self.consume_keyword("false");
                    Ok(Expr::Literal(Literal::Bool(false)))
                } else if self.matches_keyword("if") {
                    self.consume_keyword("if");
                    self.parse_if_rest()
                } else if self.matches_keyword("try") {
                    self.parse_try()
                } else if self.matches_keyword("reduce") {
                    self.parse_reduce()
                } else if self.matches_keyword("foreach") {
                    self.parse_foreach()
                } else if matches!(self.peek_word(), Some(w) if KEYWORDS.contains(&w)) {
                    Err(self.unexpected(None))
                } else {
                    self.parse_call()
                }
            }

            _ => Err(self.unexpected(None)),
        }
    }

    /// Parse a function call: `name` or `name(arg; arg)`.
    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let name = self.parse_ident()?;
        let mut args = Vec::new();

        self.skip_ws();
        if self.peek() == Some('(') {
            self.next();
            loop {
                self.comma_allowed.push(true);
                let arg = self.parse_pipe();
                self.comma_allowed.pop();
                args.push(arg?);
                self.skip_ws();
                match self.peek() {
                    Some(';') => {
                        self.next();
                    }
                    Some(')') => {
                        self.next();
                        break;
                    }
                    _ => return Err(self.unexpected(Some("')'"))),
                }
            }
        }

        let arity = args.len();
        resolve_builtin(&name, args)
            .map(Expr::Builtin)
            .ok_or_else(|| ParseError::new(format!("{}/{} is not defined", name, arity), start))
    }

    /// Parse after `if`/`elif`: `COND then A (elif ...)* (else B)? end`.
    fn parse_if_rest(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_pipe()?;
        self.expect_keyword("then")?;
        let then_branch = self.parse_pipe()?;
        self.skip_ws();

        let else_branch = if self.matches_keyword("elif") {
            self.consume_keyword("elif");
            self.parse_if_rest()?
        } else if self.matches_keyword("else") {
            self.consume_keyword("else");
            let e = self.parse_pipe()?;
            self.expect_keyword("end")?;
            e
        } else {
            // jq 1.7: missing else acts as identity
            self.expect_keyword("end")?;
            Expr::Identity
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// Parse `try BODY (catch HANDLER)?`.
    fn parse_try(&mut self) -> Result<Expr, ParseError> {
        self.consume_keyword("try");
        let body = self.parse_postfix_term(false)?;
        self.skip_ws();
        let catch = if self.matches_keyword("catch") {
            self.consume_keyword("catch");
            Some(Box::new(self.parse_postfix_term(false)?))
        } else {
            None
        };
        Ok(Expr::Try {
            body: Box::new(body),
            catch,
        })
    }

    /// Parse `reduce SOURCE as $x (INIT; UPDATE)`.
    fn parse_reduce(&mut self) -> Result<Expr, ParseError> {
        self.consume_keyword("reduce");
        let source = self.parse_postfix_term(false)?;
        self.expect_keyword("as")?;
        let name = self.parse_variable()?;
        self.expect('(')?;
        let init = self.parse_nested_pipe()?;
        self.expect(';')?;
        let update = self.parse_nested_pipe()?;
        self.expect(')')?;
        Ok(Expr::Reduce {
            source: Box::new(source),
            name,
            init: Box::new(init),
            update: Box::new(update),
        })
    }

    /// Parse `foreach SOURCE as $x (INIT; UPDATE; EXTRACT?)`.
    fn parse_foreach(&mut self) -> Result<Expr, ParseError> {
        self.consume_keyword("foreach");
        let source = self.parse_postfix_term(false)?;
        self.expect_keyword("as")?;
        let name = self.parse_variable()?;
        self.expect('(')?;
        let init = self.parse_nested_pipe()?;
        self.expect(';')?;
        let update = self.parse_nested_pipe()?;
        self.skip_ws();
        let extract = if self.peek() == Some(';') {
            self.next();
            Some(Box::new(self.parse_nested_pipe()?))
        } else {
            None
        };
        self.expect(')')?;
        Ok(Expr::Foreach {
            source: Box::new(source),
            name,
            init: Box::new(init),
            update: Box::new(update),
            extract,
        })
    }

    /// A full pipe inside delimiters, where commas are allowed again.
    fn parse_nested_pipe(&mut self) -> Result<Expr, ParseError> {
        self.comma_allowed.push(true);
        let e = self.parse_pipe();
        self.comma_allowed.pop();
        e
    }

    /// Parse a term followed by postfix suffixes.
    ///
    /// With `allow_bind`, a trailing `as $x | body` turns the term into a
    /// binding whose body extends to the end of the enclosing pipe.
    fn parse_postfix_term(&mut self, allow_bind: bool) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            self.skip_ws();
            match self.peek() {
                Some('.')
                    if matches!(self.peek_nth(1), Some(c) if c.is_alphabetic() || c == '_' || c == '"' || c == '[') =>
                {
                    self.next();
                    if self.peek() == Some('[') {
                        expr = self.parse_bracket_suffix(expr)?;
                    } else if self.peek() == Some('"') {
                        let key = self.parse_string()?;
                        expr = Expr::Index {
                            target: Box::new(expr),
                            index: Box::new(key),
                        };
                    } else {
                        let name = self.parse_ident()?;
                        expr = Expr::field(expr, name);
                    }
                }
                Some('[') => {
                    expr = self.parse_bracket_suffix(expr)?;
                }
                Some('?') => {
                    self.next();
                    expr = Expr::Try {
                        body: Box::new(expr),
                        catch: None,
                    };
                }
                _ => break,
            }
        }

        self.skip_ws();
        if allow_bind && self.matches_keyword("as") {
            self.consume_keyword("as");
            let name = self.parse_variable()?;
            self.expect('|')?;
            let body = self.parse_pipe()?;
            return Ok(Expr::Bind {
                source: Box::new(expr),
                name,
                body: Box::new(body),
            });
        }

        Ok(expr)
    }

    /// Parse unary minus.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        if self.peek() == Some('-') {
            self.next();
            self.enter()?;
            let operand = self.parse_unary();
            self.leave();
            return Ok(match operand? {
                Expr::Literal(Literal::Number(n)) => Expr::Literal(Literal::Number(-n)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.parse_postfix_term(true)
    }

    /// Parse `* / %`.
    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('*') => ArithOp::Mul,
                Some('/') if self.peek_str(2) != "//" => ArithOp::Div,
                Some('%') => ArithOp::Mod,
                _ => break,
            };
            self.next();
            let right = self.parse_unary()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse `+ -`.
    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('+') => ArithOp::Add,
                Some('-') => ArithOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_multiplicative()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse `== != < <= > >=` (non-associative).
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        self.skip_ws();

        let (op, width) = match self.peek_str(2) {
            "==" => (CompareOp::Eq, 2),
            "!=" => (CompareOp::Ne, 2),
            "<=" => (CompareOp::Le, 2),
            ">=" => (CompareOp::Ge, 2),
            s if s.starts_with('<') => (CompareOp::Lt, 1),
            s if s.starts_with('>') => (CompareOp::Gt, 1),
            _ => return Ok(left),
        };
        self.pos += width;

        let right = self.parse_additive()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;

        loop {
            self.skip_ws();
            if !self.matches_keyword("and") {
                break;
            }
            self.consume_keyword("and");
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;

        loop {
            self.skip_ws();
            if !self.matches_keyword("or") {
                break;
            }
            self.consume_keyword("or");
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// Parse `a // b` (right associative).
    fn parse_alternative(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_or()?;
        self.skip_ws();
        if self.peek_str(2) != "//" {
            return Ok(left);
        }
        self.pos += 2;
        let right = self.parse_alternative()?;
        Ok(Expr::Alternative(Box::new(left), Box::new(right)))
    }

    /// Parse `a, b, ...`.
    fn parse_comma(&mut self) -> Result<Expr, ParseError> {
        let mut exprs = vec![self.parse_alternative()?];
        self.skip_ws();

        while self.peek() == Some(',') {
            self.next();
            exprs.push(self.parse_alternative()?);
            self.skip_ws();
        }

        Ok(Expr::comma(exprs))
    }

    /// Parse `a | b | ...`, the lowest precedence level.
    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.parse_pipe_stages();
        self.leave();
        result
    }

    fn parse_pipe_stages(&mut self) -> Result<Expr, ParseError> {
        let comma_allowed = self.comma_allowed.last().copied().unwrap_or(true);
        let mut stages = Vec::new();

        loop {
            let stage = if comma_allowed {
                self.parse_comma()?
            } else {
                self.parse_alternative()?
            };
            // A binding already consumed the rest of the pipe.
            let is_bind = matches!(stage, Expr::Bind { .. });
            stages.push(stage);
            self.skip_ws();
            if is_bind || self.peek() != Some('|') {
                break;
            }
            self.next();
        }

        Ok(Expr::pipe(stages))
    }

    /// Parse a whole program.
    fn parse_program(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        if self.is_eof() {
            // The empty program is the identity filter.
            return Ok(Expr::Identity);
        }
        if !self.starts_term() {
            return Err(self.unexpected(Some("$end")));
        }

        let expr = self.parse_pipe()?;

        self.skip_ws();
        if !self.is_eof() {
            return Err(self.unexpected(Some("$end")));
        }
        Ok(expr)
    }
}

/// Map a function name and its arguments onto a builtin.
fn resolve_builtin(name: &str, mut args: Vec<Expr>) -> Option<Builtin> {
    let arity = args.len();
    let mut arg = || -> Box<Expr> { Box::new(args.remove(0)) };

    let builtin = match (name, arity) {
        ("empty", 0) => Builtin::Empty,
        ("error", 0) => Builtin::Error(None),
        ("error", 1) => Builtin::Error(Some(arg())),
        ("not", 0) => Builtin::Not,
        ("type", 0) => Builtin::Type,
        ("select", 1) => Builtin::Select(arg()),
        ("values", 0) => Builtin::Values,
        ("nulls", 0) => Builtin::TypeFilter(TypeFilter::Nulls),
        ("booleans", 0) => Builtin::TypeFilter(TypeFilter::Booleans),
        ("numbers", 0) => Builtin::TypeFilter(TypeFilter::Numbers),
        ("strings", 0) => Builtin::TypeFilter(TypeFilter::Strings),
        ("arrays", 0) => Builtin::TypeFilter(TypeFilter::Arrays),
        ("objects", 0) => Builtin::TypeFilter(TypeFilter::Objects),
        ("iterables", 0) => Builtin::TypeFilter(TypeFilter::Iterables),
        ("scalars", 0) => Builtin::TypeFilter(TypeFilter::Scalars),
        ("length", 0) => Builtin::Length,
        ("utf8bytelength", 0) => Builtin::Utf8ByteLength,
        ("keys", 0) => Builtin::Keys,
        ("keys_unsorted", 0) => Builtin::KeysUnsorted,
        ("has", 1) => Builtin::Has(arg()),
        ("in", 1) => Builtin::In(arg()),
        ("contains", 1) => Builtin::Contains(arg()),
        ("map", 1) => Builtin::Map(arg()),
        ("map_values", 1) => Builtin::MapValues(arg()),
        ("add", 0) => Builtin::Add,
        ("any", 0) => Builtin::Any,
        ("all", 0) => Builtin::All,
        ("any", 1) => Builtin::AnyWith(arg()),
        ("all", 1) => Builtin::AllWith(arg()),
        ("any", 2) => {
            let generator = arg();
            Builtin::AnyOf(generator, arg())
        }
        ("all", 2) => {
            let generator = arg();
            Builtin::AllOf(generator, arg())
        }
        ("min", 0) => Builtin::Min,
        ("max", 0) => Builtin::Max,
        ("min_by", 1) => Builtin::MinBy(arg()),
        ("max_by", 1) => Builtin::MaxBy(arg()),
        ("sort", 0) => Builtin::Sort,
        ("sort_by", 1) => Builtin::SortBy(arg()),
        ("group_by", 1) => Builtin::GroupBy(arg()),
        ("unique", 0) => Builtin::Unique,
        ("unique_by", 1) => Builtin::UniqueBy(arg()),
        ("reverse", 0) => Builtin::Reverse,
        ("first", 0) => Builtin::First,
        ("last", 0) => Builtin::Last,
        ("first", 1) => Builtin::FirstOf(arg()),
        ("last", 1) => Builtin::LastOf(arg()),
        ("limit", 2) => {
            let n = arg();
            Builtin::Limit(n, arg())
        }
        ("range", 1) => Builtin::Range(arg()),
        ("range", 2) => {
            let from = arg();
            Builtin::RangeFrom(from, arg())
        }
        ("range", 3) => {
            let from = arg();
            let upto = arg();
            Builtin::RangeBy(from, upto, arg())
        }
        ("to_entries", 0) => Builtin::ToEntries,
        ("from_entries", 0) => Builtin::FromEntries,
        ("with_entries", 1) => Builtin::WithEntries(arg()),
        ("recurse", 0) => Builtin::Recurse,
        ("recurse", 1) => Builtin::RecurseWith(arg()),
        ("floor", 0) => Builtin::Floor,
        ("sqrt", 0) => Builtin::Sqrt,
        ("tostring", 0) => Builtin::ToString,
        ("tonumber", 0) => Builtin::ToNumber,
        ("tojson", 0) => Builtin::ToJson,
        ("fromjson", 0) => Builtin::FromJson,
        ("ascii_downcase", 0) => Builtin::AsciiDowncase,
        ("ascii_upcase", 0) => Builtin::AsciiUpcase,
        ("startswith", 1) => Builtin::StartsWith(arg()),
        ("endswith", 1) => Builtin::EndsWith(arg()),
        ("ltrimstr", 1) => Builtin::LtrimStr(arg()),
        ("rtrimstr", 1) => Builtin::RtrimStr(arg()),
        ("split", 1) => Builtin::Split(arg()),
        ("join", 1) => Builtin::Join(arg()),
        _ => return None,
    };
    Some(builtin)
}

/// Parse a jq filter into an AST.
///
/// # Examples
///
/// ```
/// use jqhost::jq::{parse, Expr};
///
/// assert_eq!(parse(".").unwrap(), Expr::Identity);
/// assert!(parse(".[] | . + $suffix").is_ok());
///
/// let err = parse("**").unwrap_err();
/// assert_eq!(err.message, "syntax error, unexpected '*', expecting $end");
/// ```
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    Parser::new(input).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Expr {
        Expr::field(Expr::Identity, name)
    }

    #[test]
    fn test_identity() {
        assert_eq!(parse(".").unwrap(), Expr::Identity);
        assert_eq!(parse("  .  ").unwrap(), Expr::Identity);
        assert_eq!(parse("").unwrap(), Expr::Identity);
    }

    #[test]
    fn test_field_access() {
        assert_eq!(parse(".foo").unwrap(), field("foo"));
        assert_eq!(parse(".\"foo bar\"").unwrap(), field("foo bar"));
        assert_eq!(
            parse(".foo.bar").unwrap(),
            Expr::field(field("foo"), "bar")
        );
    }

    #[test]
    fn test_index_and_slice() {
        assert!(matches!(parse(".[0]").unwrap(), Expr::Index { .. }));
        assert!(matches!(parse(".[-1]").unwrap(), Expr::Index { .. }));
        assert!(matches!(
            parse(".[2:5]").unwrap(),
            Expr::Slice {
                start: Some(_),
                end: Some(_),
                ..
            }
        ));
        assert!(matches!(
            parse(".[:5]").unwrap(),
            Expr::Slice { start: None, .. }
        ));
        assert!(matches!(parse(".[2:]").unwrap(), Expr::Slice { end: None, .. }));
        assert!(matches!(parse(".[]").unwrap(), Expr::Iterate(_)));
        assert!(matches!(parse(".foo[]").unwrap(), Expr::Iterate(_)));
    }

    #[test]
    fn test_optional() {
        assert!(matches!(
            parse(".foo?").unwrap(),
            Expr::Try { catch: None, .. }
        ));
        assert!(matches!(
            parse(".[]?").unwrap(),
            Expr::Try { catch: None, .. }
        ));
    }

    #[test]
    fn test_pipe_binds_looser_than_comma() {
        // `.a, .b | f` is `(.a, .b) | f`
        match parse(".a, .b | length").unwrap() {
            Expr::Pipe(stages) => {
                assert_eq!(stages.len(), 2);
                assert!(matches!(stages[0], Expr::Comma(_)));
            }
            other => panic!("expected pipe, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        match parse("1 + 2 * 3").unwrap() {
            Expr::Arithmetic {
                op: ArithOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Arithmetic {
                    op: ArithOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parse("-1").unwrap(), Expr::Literal(Literal::Number(-1.0)));
        assert_eq!(
            parse("1e1000").unwrap(),
            Expr::Literal(Literal::Number(f64::MAX))
        );
        assert!(matches!(parse("-.a").unwrap(), Expr::Neg(_)));
        assert!(matches!(
            parse(".a // .b // 1").unwrap(),
            Expr::Alternative(_, ref rhs) if matches!(**rhs, Expr::Alternative(_, _))
        ));
    }

    #[test]
    fn test_variables_and_binding() {
        assert_eq!(parse("$foo").unwrap(), Expr::Var("foo".into()));
        match parse(". as $x | $x, 1").unwrap() {
            Expr::Bind { name, body, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(*body, Expr::Comma(_)));
            }
            other => panic!("expected binding, got {:?}", other),
        }
        // A binding in a later pipe stage
        assert!(matches!(
            parse(".[] | . as $x | $x").unwrap(),
            Expr::Pipe(ref stages) if matches!(stages[1], Expr::Bind { .. })
        ));
    }

    #[test]
    fn test_reduce_and_foreach() {
        assert!(matches!(
            parse("reduce .[] as $x (0; . + $x)").unwrap(),
            Expr::Reduce { .. }
        ));
        assert!(matches!(
            parse("foreach .[] as $x (0; . + $x; [$x, .])").unwrap(),
            Expr::Foreach {
                extract: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_construction() {
        assert!(matches!(parse("[]").unwrap(), Expr::Array(_)));
        assert!(matches!(parse("[.a, .b]").unwrap(), Expr::Array(_)));
        match parse("{a: 1, \"b\": .x | length, (.k): 2, $v, c}").unwrap() {
            Expr::Object(entries) => {
                assert_eq!(entries.len(), 5);
                assert_eq!(entries[3].value, Expr::Var("v".into()));
                assert_eq!(entries[4].value, field("c"));
                assert!(matches!(entries[2].key, ObjectKey::Expr(_)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_string_interpolation() {
        match parse(r#""a\(.b)c""#).unwrap() {
            Expr::Format(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], StringPart::Literal("a".into()));
                assert_eq!(parts[1], StringPart::Expr(field("b")));
            }
            other => panic!("expected format, got {:?}", other),
        }
        assert_eq!(
            parse(r#""é😀""#).unwrap(),
            Expr::Literal(Literal::String("é😀".into()))
        );
    }

    #[test]
    fn test_control_flow() {
        assert!(matches!(parse("if . then 1 else 2 end").unwrap(), Expr::If { .. }));
        assert!(matches!(
            parse("if . then 1 elif .a then 2 else 3 end").unwrap(),
            Expr::If { ref else_branch, .. } if matches!(**else_branch, Expr::If { .. })
        ));
        assert!(matches!(
            parse("if . then 1 end").unwrap(),
            Expr::If { ref else_branch, .. } if else_branch.is_identity()
        ));
        assert!(matches!(
            parse("try error(\"x\") catch .").unwrap(),
            Expr::Try { catch: Some(_), .. }
        ));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(parse("length").unwrap(), Expr::Builtin(Builtin::Length));
        assert!(matches!(
            parse("limit(2; .[])").unwrap(),
            Expr::Builtin(Builtin::Limit(_, _))
        ));
        assert!(matches!(
            parse("map(. + 1)").unwrap(),
            Expr::Builtin(Builtin::Map(_))
        ));
    }

    #[test]
    fn test_comments() {
        assert_eq!(parse(". # the input\n").unwrap(), Expr::Identity);
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("**").unwrap_err();
        assert_eq!(err.message, "syntax error, unexpected '*', expecting $end");
        assert_eq!(err.position, 0);

        let err = parse(". *").unwrap_err();
        assert_eq!(err.message, "syntax error, unexpected $end");

        let err = parse(".a )").unwrap_err();
        assert_eq!(err.message, "syntax error, unexpected ')', expecting $end");
        assert_eq!(err.position, 3);

        let err = parse("if . then 1").unwrap_err();
        assert_eq!(err.message, "syntax error, unexpected $end, expecting end");

        assert!(parse(".[").is_err());
        assert!(parse("{").is_err());
        assert!(parse("\"unterminated").is_err());
        assert!(parse("then").is_err());
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("frobnicate(1)").unwrap_err();
        assert_eq!(err.message, "frobnicate/1 is not defined");
        assert_eq!(parse("map").unwrap_err().message, "map/0 is not defined");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}.{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
        let err = parse(&deep).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");
    }
}
