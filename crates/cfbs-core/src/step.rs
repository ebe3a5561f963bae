use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Copy,
    Run,
    Delete,
    Json,
    Append,
    Directory,
    Input,
    PolicyFiles,
    Bundles,
    ReplaceVersion,
}

/// How many arguments an operation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "{n}+"),
        }
    }
}

impl StepKind {
    pub const ALL: [StepKind; 10] = [
        Self::Copy,
        Self::Run,
        Self::Delete,
        Self::Json,
        Self::Append,
        Self::Directory,
        Self::Input,
        Self::PolicyFiles,
        Self::Bundles,
        Self::ReplaceVersion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Run => "run",
            Self::Delete => "delete",
            Self::Json => "json",
            Self::Append => "append",
            Self::Directory => "directory",
            Self::Input => "input",
            Self::PolicyFiles => "policy_files",
            Self::Bundles => "bundles",
            Self::ReplaceVersion => "replace_version",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Self::Copy
            | Self::Json
            | Self::Append
            | Self::Directory
            | Self::Input
            | Self::ReplaceVersion => Arity::Exactly(2),
            Self::Run | Self::Delete | Self::PolicyFiles | Self::Bundles => Arity::AtLeast(1),
        }
    }
}

/// A parsed build step such as `copy policy.cf services/cfbs/policy.cf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub kind: StepKind,
    pub args: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepParseError {
    #[error("build step is empty")]
    Empty,
    #[error("Unknown build step operation: '{0}'")]
    UnknownOperation(String),
    #[error("The '{operation}' build step expects {expected} arguments, {actual} were given")]
    WrongArgumentCount {
        operation: &'static str,
        expected: Arity,
        actual: usize,
    },
    #[error("Extra whitespace in build step '{0}'")]
    ExtraWhitespace(String),
}

impl FromStr for BuildStep {
    type Err = StepParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split_whitespace();
        let operation = parts.next().ok_or(StepParseError::Empty)?;
        let args: Vec<String> = parts.map(ToOwned::to_owned).collect();

        let canonical = std::iter::once(operation)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if canonical != value {
            return Err(StepParseError::ExtraWhitespace(value.to_string()));
        }

        let kind = StepKind::ALL
            .into_iter()
            .find(|k| k.as_str() == operation)
            .ok_or_else(|| StepParseError::UnknownOperation(operation.to_string()))?;

        if !kind.arity().accepts(args.len()) {
            return Err(StepParseError::WrongArgumentCount {
                operation: kind.as_str(),
                expected: kind.arity(),
                actual: args.len(),
            });
        }

        Ok(Self { kind, args })
    }
}

impl Display for BuildStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
