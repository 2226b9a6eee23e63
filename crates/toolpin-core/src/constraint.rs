//! Boolean constraint expressions.
//!
//! Registries guard version overrides and platform support with small
//! expressions such as
//!
//! ```text
//! semver(">= 2.0.0") && Version != "v2.1.0"
//! GOOS == "darwin" || (GOOS == "linux" && GOARCH == "amd64")
//! ```
//!
//! Supported syntax: string literals (`"..."` or `'...'`), `true`, `false`,
//! the variables `Version`, `GOOS` and `GOARCH`, `==`, `!=`, `&&`/`and`,
//! `||`/`or`, `!`/`not`, parentheses, and the functions `semver(range)`,
//! `semverWithVersion(range, version)`, `trimPrefix(s, prefix)` and
//! `startsWith(s, prefix)`.
//!
//! Each distinct expression text is compiled once and cached for the life of
//! the process. A result that is not a boolean is an error, never `false`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use thiserror::Error;
use toolpin_schema::Runtime;

use crate::version_range;

/// Errors raised while compiling or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// The expression text does not parse.
    #[error("failed to compile expression {expr:?}: {reason}")]
    Compile {
        /// Expression text.
        expr: String,
        /// What went wrong.
        reason: String,
    },

    /// The expression evaluated to a string.
    #[error("expression {expr:?} evaluated to {value:?}, not a boolean")]
    NotBoolean {
        /// Expression text.
        expr: String,
        /// The non-boolean result.
        value: String,
    },

    /// Evaluation failed (unknown variable, type mismatch, bad call).
    #[error("failed to evaluate expression {expr:?}: {reason}")]
    Eval {
        /// Expression text.
        expr: String,
        /// What went wrong.
        reason: String,
    },

    /// A version string passed to a semver predicate does not parse.
    #[error("invalid version {0:?}")]
    InvalidVersion(String),

    /// A range passed to a semver predicate does not parse.
    #[error("invalid version range {0:?}")]
    InvalidRange(String),
}

/// Variables visible to an expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Env<'a> {
    /// Bound to `Version`.
    pub version: Option<&'a str>,
    /// Bound to `GOOS`.
    pub goos: Option<&'a str>,
    /// Bound to `GOARCH`.
    pub goarch: Option<&'a str>,
}

impl<'a> Env<'a> {
    /// An environment with only `Version` bound.
    pub fn version(version: &'a str) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }

    /// An environment with `GOOS` and `GOARCH` bound.
    pub fn runtime(runtime: &'a Runtime) -> Self {
        Self {
            version: None,
            goos: Some(&runtime.goos),
            goarch: Some(&runtime.goarch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Lit(Value),
    Var(String),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    root: Expr,
}

static PROGRAMS: LazyLock<Mutex<HashMap<String, Arc<Program>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Compile `expr`, reusing a cached program for text seen before.
///
/// # Errors
///
/// Returns [`ConstraintError::Compile`] if the text does not parse.
pub fn compile(expr: &str) -> Result<Arc<Program>, ConstraintError> {
    if let Some(program) = PROGRAMS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(expr)
    {
        return Ok(Arc::clone(program));
    }
    let program = Arc::new(Program::compile(expr)?);
    PROGRAMS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(expr.to_string(), Arc::clone(&program));
    Ok(program)
}

/// Evaluate `expr` in `env`. An empty expression is `true`.
///
/// # Errors
///
/// Returns a [`ConstraintError`] if the expression does not compile, fails
/// to evaluate, or does not produce a boolean.
pub fn evaluate(expr: &str, env: &Env<'_>) -> Result<bool, ConstraintError> {
    if expr.trim().is_empty() {
        return Ok(true);
    }
    compile(expr)?.eval(env)
}

/// Evaluate a version constraint against `version`.
///
/// # Errors
///
/// See [`evaluate`].
pub fn resolve(expr: &str, version: &str) -> Result<bool, ConstraintError> {
    evaluate(expr, &Env::version(version))
}

impl Program {
    /// Parse expression text.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::Compile`] if the text does not parse.
    pub fn compile(expr: &str) -> Result<Self, ConstraintError> {
        let fail = |reason: String| ConstraintError::Compile {
            expr: expr.to_string(),
            reason,
        };
        let tokens = lex(expr).map_err(fail)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.or().map_err(fail)?;
        if let Some(tok) = parser.peek() {
            return Err(fail(format!("unexpected {tok:?}")));
        }
        Ok(Self {
            source: expr.to_string(),
            root,
        })
    }

    /// Run the program and require a boolean result.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::NotBoolean`] for string results and
    /// [`ConstraintError::Eval`] for evaluation failures.
    pub fn eval(&self, env: &Env<'_>) -> Result<bool, ConstraintError> {
        match self.eval_expr(&self.root, env)? {
            Value::Bool(b) => Ok(b),
            Value::Str(s) => Err(ConstraintError::NotBoolean {
                expr: self.source.clone(),
                value: s,
            }),
        }
    }

    fn fail(&self, reason: impl Into<String>) -> ConstraintError {
        ConstraintError::Eval {
            expr: self.source.clone(),
            reason: reason.into(),
        }
    }

    fn eval_bool(&self, expr: &Expr, env: &Env<'_>) -> Result<bool, ConstraintError> {
        match self.eval_expr(expr, env)? {
            Value::Bool(b) => Ok(b),
            Value::Str(s) => Err(self.fail(format!("expected a boolean, got {s:?}"))),
        }
    }

    fn eval_str(&self, expr: &Expr, env: &Env<'_>) -> Result<String, ConstraintError> {
        match self.eval_expr(expr, env)? {
            Value::Str(s) => Ok(s),
            Value::Bool(b) => Err(self.fail(format!("expected a string, got {b}"))),
        }
    }

    fn eval_expr(&self, expr: &Expr, env: &Env<'_>) -> Result<Value, ConstraintError> {
        Ok(match expr {
            Expr::Lit(v) => v.clone(),
            Expr::Var(name) => {
                let value = match name.as_str() {
                    "Version" => env.version,
                    "GOOS" => env.goos,
                    "GOARCH" => env.goarch,
                    _ => return Err(self.fail(format!("unknown variable {name}"))),
                };
                Value::Str(
                    value
                        .ok_or_else(|| self.fail(format!("variable {name} is not bound")))?
                        .to_string(),
                )
            }
            Expr::Not(inner) => Value::Bool(!self.eval_bool(inner, env)?),
            Expr::And(l, r) => Value::Bool(self.eval_bool(l, env)? && self.eval_bool(r, env)?),
            Expr::Or(l, r) => Value::Bool(self.eval_bool(l, env)? || self.eval_bool(r, env)?),
            Expr::Eq(l, r) | Expr::Ne(l, r) => {
                let (l, r) = (self.eval_expr(l, env)?, self.eval_expr(r, env)?);
                let equal = match (&l, &r) {
                    (Value::Str(a), Value::Str(b)) => a == b,
                    (Value::Bool(a), Value::Bool(b)) => a == b,
                    _ => return Err(self.fail(format!("cannot compare {l:?} with {r:?}"))),
                };
                Value::Bool(if matches!(expr, Expr::Eq(..)) { equal } else { !equal })
            }
            Expr::Call(func, args) => self.call(func, args, env)?,
        })
    }

    fn call(&self, func: &str, args: &[Expr], env: &Env<'_>) -> Result<Value, ConstraintError> {
        let want = |n: usize| {
            if args.len() == n {
                Ok(())
            } else {
                Err(self.fail(format!("{func} takes {n} argument(s), got {}", args.len())))
            }
        };
        match func {
            "semver" => {
                want(1)?;
                let range = self.eval_str(&args[0], env)?;
                let version = env
                    .version
                    .ok_or_else(|| self.fail("variable Version is not bound"))?;
                Ok(Value::Bool(version_range::matches(&range, version)?))
            }
            "semverWithVersion" => {
                want(2)?;
                let range = self.eval_str(&args[0], env)?;
                let version = self.eval_str(&args[1], env)?;
                Ok(Value::Bool(version_range::matches(&range, &version)?))
            }
            "trimPrefix" => {
                want(2)?;
                let s = self.eval_str(&args[0], env)?;
                let prefix = self.eval_str(&args[1], env)?;
                Ok(Value::Str(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()))
            }
            "startsWith" => {
                want(2)?;
                let s = self.eval_str(&args[0], env)?;
                let prefix = self.eval_str(&args[1], env)?;
                Ok(Value::Bool(s.starts_with(prefix.as_str())))
            }
            other => Err(self.fail(format!("unknown function {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Eq,
    Ne,
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '"' | '\'' => {
                let mut lit = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => lit.push(escaped),
                            None => return Err("unterminated string literal".to_string()),
                        },
                        Some(other) => lit.push(other),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(lit));
            }
            '&' if chars.next_if_eq(&'&').is_some() => tokens.push(Token::And),
            '|' if chars.next_if_eq(&'|').is_some() => tokens.push(Token::Or),
            '=' if chars.next_if_eq(&'=').is_some() => tokens.push(Token::Eq),
            '!' if chars.next_if_eq(&'=').is_some() => tokens.push(Token::Ne),
            '!' => tokens.push(Token::Not),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(n) = chars.next_if(|n| n.is_ascii_alphanumeric() || *n == '_') {
                    ident.push(n);
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(ident),
                });
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.primary()?;
        if self.eat(&Token::Eq) {
            return Ok(Expr::Eq(Box::new(lhs), Box::new(self.primary()?)));
        }
        if self.eat(&Token::Ne) {
            return Ok(Expr::Ne(Box::new(lhs), Box::new(self.primary()?)));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.or()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing )".to_string());
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                _ if self.eat(&Token::LParen) => {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.or()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            if !self.eat(&Token::Comma) {
                                return Err(format!("expected , or ) in call to {name}"));
                            }
                        }
                    }
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(tok) => Err(format!("unexpected {tok:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "v1.0.0", true)]
    #[case("true", "v1.0.0", true)]
    #[case("false", "v1.0.0", false)]
    #[case(r#"Version == "v1.0.0""#, "v1.0.0", true)]
    #[case(r#"Version != "v1.0.0""#, "v1.0.0", false)]
    #[case(r#"semver(">= 2.0.0")"#, "v2.17.0", true)]
    #[case(r#"semver("< 2.0.0")"#, "v2.17.0", false)]
    #[case(r#"semver(">= 1.0.0") && Version != "v1.5.0""#, "v1.5.0", false)]
    #[case(r#"semver("< 1.0.0") || Version == "v1.5.0""#, "v1.5.0", true)]
    #[case(r#"!semver("< 1.0.0")"#, "v1.5.0", true)]
    #[case(r#"not (Version == 'a' or Version == 'b')"#, "c", true)]
    #[case(r#"trimPrefix(Version, "cli-") == "1.0""#, "cli-1.0", true)]
    #[case(r#"startsWith(Version, "jq-")"#, "jq-1.6", true)]
    #[case(r#"semverWithVersion(">= 1.6", trimPrefix(Version, "jq-"))"#, "jq-1.6", true)]
    fn test_resolve(#[case] expr: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(resolve(expr, version).unwrap(), expected, "{expr}");
    }

    #[test]
    fn test_non_boolean_is_an_error() {
        assert_eq!(
            resolve("Version", "v1.0.0"),
            Err(ConstraintError::NotBoolean {
                expr: "Version".to_string(),
                value: "v1.0.0".to_string(),
            })
        );
    }

    #[rstest]
    #[case("Version ==")]
    #[case("(true")]
    #[case(r#""unterminated"#)]
    #[case("true true")]
    #[case("Version # 1")]
    fn test_compile_errors(#[case] expr: &str) {
        assert!(matches!(
            resolve(expr, "v1.0.0"),
            Err(ConstraintError::Compile { .. })
        ));
    }

    #[test]
    fn test_eval_errors() {
        assert!(matches!(
            resolve("Nope == 'x'", "v1"),
            Err(ConstraintError::Eval { .. })
        ));
        assert!(matches!(
            resolve("Version == true", "v1"),
            Err(ConstraintError::Eval { .. })
        ));
        assert!(matches!(
            resolve(r#"semver(">= 1.0.0")"#, "latest"),
            Err(ConstraintError::InvalidVersion(_))
        ));
        assert!(matches!(
            evaluate(r#"semver(">= 1.0.0")"#, &Env::default()),
            Err(ConstraintError::Eval { .. })
        ));
    }

    #[test]
    fn test_runtime_env() {
        let rt = Runtime::new("linux", "arm64");
        let env = Env::runtime(&rt);
        assert!(evaluate(r#"GOOS == "linux" && GOARCH != "amd64""#, &env).unwrap());
        assert!(!evaluate(r#"GOOS == "darwin""#, &env).unwrap());
    }

    #[test]
    fn test_compile_is_cached() {
        let a = compile(r#"Version == "cache-hit""#).unwrap();
        let b = compile(r#"Version == "cache-hit""#).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
