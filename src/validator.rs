//! Command validation: the gate between model-produced CLI strings and real
//! AWS mutation.
//!
//! A candidate command passes through `Parse -> SchemaCheck -> PolicyCheck`
//! and comes out as a [`ValidationVerdict`]. The whole pipeline is a pure
//! function of (command string, corpus, access mode, denylist); rejections
//! are terminal for the request and never retried here.

use serde::Serialize;

use crate::config::{AccessMode, READ_ONLY_KEY};
use crate::corpus::{CorpusIndex, ParamType};

/// (service, operation) pairs that spawn subprocesses or open interactive
/// sessions. Never executed, regardless of access mode.
const DENYLISTED_OPS: &[(&str, &str)] = &[
    ("codecommit", "credential-helper"),
    ("deploy", "install"),
    ("deploy", "push"),
    ("deploy", "uninstall"),
    ("ecs", "execute-command"),
    ("eks", "update-kubeconfig"),
    ("emr", "get"),
    ("emr", "put"),
    ("emr", "sock"),
    ("emr", "ssh"),
    ("opsworks", "register"),
    ("ssm", "start-session"),
];

pub fn is_denylisted(service: &str, operation: &str) -> bool {
    DENYLISTED_OPS
        .iter()
        .any(|(s, o)| *s == service && *o == operation)
}

/// Global CLI flags that carry a value. Recognized on any command and kept
/// out of the operation's parameter list.
const GLOBAL_VALUE_FLAGS: &[&str] = &[
    "--region",
    "--profile",
    "--output",
    "--query",
    "--endpoint-url",
    "--color",
    "--cli-read-timeout",
    "--cli-connect-timeout",
    "--max-items",
    "--page-size",
    "--starting-token",
];

/// Global CLI switches without a value.
const GLOBAL_SWITCH_FLAGS: &[&str] = &[
    "--debug",
    "--no-cli-pager",
    "--no-cli-auto-prompt",
    "--no-paginate",
    "--no-sign-request",
    "--no-verify-ssl",
];

/// A candidate command after the parse stage.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedCommand {
    pub service: String,
    pub operation: String,
    /// Operation flags as given on the command line, e.g.
    /// `("--instance-ids", Some("i-0abc"))`. Switches carry `None`.
    pub parameters: Vec<(String, Option<String>)>,
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Recognized global flags other than region/profile, forwarded to the
    /// CLI unchanged (e.g. `--output json`, `--max-items 10`).
    pub global_args: Vec<(String, String)>,
}

/// Outcome of validating one candidate command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Allowed { command: ParsedCommand },
    DeniedMalformed { reason: String },
    DeniedDenylisted { reason: String },
    DeniedReadOnly { reason: String },
}

impl ValidationVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ValidationVerdict::Allowed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationVerdict::Allowed { .. } => None,
            ValidationVerdict::DeniedMalformed { reason }
            | ValidationVerdict::DeniedDenylisted { reason }
            | ValidationVerdict::DeniedReadOnly { reason } => Some(reason),
        }
    }
}

/// Validates candidate commands against a corpus snapshot and the process
/// access mode. Holds no mutable state.
pub struct Validator<'a> {
    corpus: &'a CorpusIndex,
    access_mode: AccessMode,
}

impl<'a> Validator<'a> {
    pub fn new(corpus: &'a CorpusIndex, access_mode: AccessMode) -> Self {
        Self { corpus, access_mode }
    }

    pub fn validate(&self, raw: &str) -> ValidationVerdict {
        let malformed = |reason: String| ValidationVerdict::DeniedMalformed { reason };

        // Parse
        let tokens = match split_cli_command(raw) {
            Ok(tokens) => tokens,
            Err(reason) => return malformed(reason),
        };
        let parsed = match parse_tokens(tokens) {
            Ok(parsed) => parsed,
            Err(reason) => return malformed(reason),
        };

        // SchemaCheck: only commands matching a real corpus entry proceed.
        let spec = match self.corpus.lookup(&parsed.service, &parsed.operation) {
            Some(spec) => spec,
            None => {
                return malformed(format!(
                    "unknown command 'aws {} {}'",
                    parsed.service, parsed.operation
                ))
            }
        };
        for (flag, value) in &parsed.parameters {
            match spec.find_parameter(flag) {
                None => {
                    return malformed(format!(
                        "unknown parameter '{}' for 'aws {} {}'",
                        flag, parsed.service, parsed.operation
                    ))
                }
                Some(param) if param.param_type != ParamType::Boolean && value.is_none() => {
                    return malformed(format!("parameter '{flag}' expects a value"))
                }
                Some(_) => {}
            }
        }
        for required in spec.required_parameters() {
            if !parsed.parameters.iter().any(|(flag, _)| *flag == required) {
                return malformed(format!("missing required parameter '{required}'"));
            }
        }

        // PolicyCheck: denylist gate first, access-mode gate second.
        if is_denylisted(&parsed.service, &parsed.operation) {
            return ValidationVerdict::DeniedDenylisted {
                reason: format!(
                    "'aws {} {}' spawns a subprocess or interactive session and is never executed",
                    parsed.service, parsed.operation
                ),
            };
        }
        if self.access_mode.is_read_only() && spec.access.is_mutating() {
            return ValidationVerdict::DeniedReadOnly {
                reason: format!(
                    "'aws {} {}' mutates resources and read-only mode is enabled; \
                     set {READ_ONLY_KEY}=false to allow it",
                    parsed.service, parsed.operation
                ),
            };
        }

        ValidationVerdict::Allowed { command: parsed }
    }
}

/// Splits a command line into tokens, honoring single and double quotes.
fn split_cli_command(raw: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err("unbalanced quote in command".to_string());
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_tokens(tokens: Vec<String>) -> Result<ParsedCommand, String> {
    let mut iter = tokens.into_iter().peekable();

    match iter.next() {
        Some(program) if program == "aws" => {}
        Some(program) => return Err(format!("command must start with 'aws', got '{program}'")),
        None => return Err("empty command".to_string()),
    }
    let service = match iter.next() {
        Some(t) if !t.starts_with("--") => t,
        _ => return Err("missing service name".to_string()),
    };
    let operation = match iter.next() {
        Some(t) if !t.starts_with("--") => t,
        _ => return Err(format!("missing operation name after '{service}'")),
    };

    let mut parameters: Vec<(String, Option<String>)> = Vec::new();
    let mut global_args: Vec<(String, String)> = Vec::new();
    let mut region = None;
    let mut profile = None;

    while let Some(token) = iter.next() {
        if token.starts_with("--") {
            // --flag=value and --flag value are both accepted.
            let (flag, inline) = match token.split_once('=') {
                Some((f, v)) => (f.to_string(), Some(v.to_string())),
                None => (token.clone(), None),
            };
            if GLOBAL_SWITCH_FLAGS.contains(&flag.as_str()) {
                continue;
            }
            let value = match inline {
                Some(v) => Some(v),
                None => match iter.peek() {
                    Some(next) if !next.starts_with("--") => iter.next(),
                    _ => None,
                },
            };
            if GLOBAL_VALUE_FLAGS.contains(&flag.as_str()) {
                let value =
                    value.ok_or_else(|| format!("global flag '{flag}' expects a value"))?;
                match flag.as_str() {
                    "--region" => region = Some(value),
                    "--profile" => profile = Some(value),
                    _ => global_args.push((flag, value)),
                }
                continue;
            }
            parameters.push((flag, value));
        } else {
            // Bare tokens continue the previous flag's value (list and
            // shorthand-syntax arguments); leading positionals are rejected.
            match parameters.last_mut() {
                Some((_, Some(value))) => {
                    value.push(' ');
                    value.push_str(&token);
                }
                _ => return Err(format!("unexpected positional argument '{token}'")),
            }
        }
    }

    Ok(ParsedCommand {
        service,
        operation,
        parameters,
        region,
        profile,
        global_args,
    })
}
