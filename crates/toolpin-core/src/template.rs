//! Asset, path and URL templates.
//!
//! Registries use a small subset of Go's `text/template` syntax:
//!
//! - fields: `{{.Version}}`, `{{.OS}}`, `{{.Arch}}`, `{{.GOOS}}`, `{{.GOARCH}}`,
//!   `{{.Format}}`, and `{{.FileName}}` when rendering a file source
//! - calls: `{{trimV .Version}}`, `{{trimPrefix "v" .Version}}`
//! - pipelines: `{{.Version | trimV}}`, where the piped value becomes the last argument
//! - trim markers: `{{-` and `-}}` remove adjacent whitespace
//!
//! Rendering is a pure function of the template text and [`Vars`].

use thiserror::Error;
use toolpin_schema::{Replacements, Runtime};

/// Errors raised while rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{` without a matching `}}`.
    #[error("unterminated action in template {0:?}")]
    Unterminated(String),

    /// A `.Field` the variable set does not define.
    #[error("unknown template field .{0}")]
    UnknownField(String),

    /// A call to a function that does not exist.
    #[error("unknown template function {0}")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("template function {name} takes {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Declared arity.
        expected: usize,
        /// Arguments supplied (including a piped value).
        got: usize,
    },

    /// The action could not be parsed.
    #[error("malformed template action {0:?}")]
    Syntax(String),
}

/// Variables available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    /// Version as declared in the manifest.
    pub version: String,
    /// Raw `GOOS`.
    pub goos: String,
    /// Raw `GOARCH`.
    pub goarch: String,
    /// `GOOS` after replacement lookup.
    pub os: String,
    /// `GOARCH` after replacement lookup (and the Rosetta 2 substitution).
    pub arch: String,
    /// Effective archive format.
    pub format: String,
    /// Command name, only set while rendering a file source.
    pub file_name: Option<String>,
    /// Rendered asset name, only set while rendering a checksum file location.
    pub asset: Option<String>,
}

impl Vars {
    /// Build the variable set for one package on one runtime.
    ///
    /// With `rosetta2` on an Apple Silicon runtime, `amd64` is looked up in
    /// place of `arm64` so the x86 artifact is selected.
    pub fn new(
        version: &str,
        runtime: &Runtime,
        replacements: Option<&Replacements>,
        rosetta2: bool,
        format: &str,
    ) -> Self {
        let arch_key = if rosetta2 && runtime.is_apple_silicon() {
            "amd64"
        } else {
            runtime.goarch.as_str()
        };
        Self {
            version: version.to_string(),
            goos: runtime.goos.clone(),
            goarch: runtime.goarch.clone(),
            os: replace(&runtime.goos, replacements).to_string(),
            arch: replace(arch_key, replacements).to_string(),
            format: format.to_string(),
            file_name: None,
            asset: None,
        }
    }

    /// Add the `FileName` variable.
    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Add the `Asset` variable.
    pub fn with_asset(mut self, asset: &str) -> Self {
        self.asset = Some(asset.to_string());
        self
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "Version" => Some(&self.version),
            "GOOS" => Some(&self.goos),
            "GOARCH" => Some(&self.goarch),
            "OS" => Some(&self.os),
            "Arch" => Some(&self.arch),
            "Format" => Some(&self.format),
            "FileName" => self.file_name.as_deref(),
            "Asset" => self.asset.as_deref(),
            _ => None,
        }
    }
}

/// Look a key up in a replacement table.
///
/// Missing and empty entries leave the key unchanged.
pub fn replace<'a>(key: &'a str, replacements: Option<&'a Replacements>) -> &'a str {
    replacements
        .and_then(|r| r.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(key)
}

/// Strip one leading `v`.
pub fn trim_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}

/// Render `template` against `vars`.
///
/// # Errors
///
/// Returns a [`TemplateError`] for unterminated or malformed actions, unknown
/// fields or functions, and arity mismatches.
pub fn render(template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let text = &rest[..start];
        let text = if trim_next { text.trim_start() } else { text };
        out.push_str(text);

        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let mut action = &after[..end];

        if let Some(a) = action.strip_prefix('-') {
            let trimmed = out.trim_end().len();
            out.truncate(trimmed);
            action = a;
        }
        trim_next = false;
        if let Some(a) = action.strip_suffix('-') {
            trim_next = true;
            action = a;
        }

        out.push_str(&eval_action(action, vars)?);
        rest = &after[end + 2..];
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    out.push_str(tail);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(String),
    Ident(String),
    Literal(String),
    Pipe,
}

fn tokenize(action: &str) -> Result<Vec<Token>, TemplateError> {
    let syntax = || TemplateError::Syntax(action.to_string());
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut lit = String::new();
                loop {
                    match chars.next().ok_or_else(syntax)? {
                        '"' => break,
                        '\\' => lit.push(chars.next().ok_or_else(syntax)?),
                        other => lit.push(other),
                    }
                }
                tokens.push(Token::Literal(lit));
            }
            '`' => {
                chars.next();
                let mut lit = String::new();
                loop {
                    match chars.next().ok_or_else(syntax)? {
                        '`' => break,
                        other => lit.push(other),
                    }
                }
                tokens.push(Token::Literal(lit));
            }
            '.' => {
                chars.next();
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(syntax());
                }
                tokens.push(Token::Field(name));
            }
            c if c.is_ascii_alphabetic() => {
                tokens.push(Token::Ident(take_ident(&mut chars)));
            }
            _ => return Err(syntax()),
        }
    }
    Ok(tokens)
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

fn eval_action(action: &str, vars: &Vars) -> Result<String, TemplateError> {
    let tokens = tokenize(action)?;
    let commands: Vec<&[Token]> = tokens.split(|t| *t == Token::Pipe).collect();
    let mut piped: Option<String> = None;

    for command in commands {
        let Some((head, args)) = command.split_first() else {
            return Err(TemplateError::Syntax(action.to_string()));
        };
        piped = Some(match head {
            Token::Ident(func) => {
                let mut values = args
                    .iter()
                    .map(|a| eval_arg(a, vars, action))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped.take());
                call(func, &values)?
            }
            arg if args.is_empty() && piped.is_none() => eval_arg(arg, vars, action)?,
            _ => return Err(TemplateError::Syntax(action.to_string())),
        });
    }

    piped.ok_or_else(|| TemplateError::Syntax(action.to_string()))
}

fn eval_arg(token: &Token, vars: &Vars, action: &str) -> Result<String, TemplateError> {
    match token {
        Token::Field(name) => vars
            .field(name)
            .map(str::to_string)
            .ok_or_else(|| TemplateError::UnknownField(name.clone())),
        Token::Literal(lit) => Ok(lit.clone()),
        Token::Ident(_) | Token::Pipe => Err(TemplateError::Syntax(action.to_string())),
    }
}

fn call(func: &str, args: &[String]) -> Result<String, TemplateError> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(TemplateError::Arity {
                name: func.to_string(),
                expected,
                got: args.len(),
            })
        }
    };
    match func {
        "trimV" => {
            arity(1)?;
            Ok(trim_v(&args[0]).to_string())
        }
        "trimPrefix" => {
            arity(2)?;
            Ok(args[1].strip_prefix(args[0].as_str()).unwrap_or(&args[1]).to_string())
        }
        "trimSuffix" => {
            arity(2)?;
            Ok(args[1].strip_suffix(args[0].as_str()).unwrap_or(&args[1]).to_string())
        }
        "title" => {
            arity(1)?;
            let mut chars = args[0].chars();
            Ok(chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default())
        }
        "lower" => {
            arity(1)?;
            Ok(args[0].to_lowercase())
        }
        "upper" => {
            arity(1)?;
            Ok(args[0].to_uppercase())
        }
        "replace" => {
            arity(3)?;
            Ok(args[2].replace(args[0].as_str(), &args[1]))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}
