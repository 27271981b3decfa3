//! Simulation model: a formula plus per-variable distributions.

use crate::distribution::DistributionSpec;
use crate::error::ParseError;
use crate::message::ModelMessage;
use indexmap::IndexMap;
use std::path::Path;

/// Key used by scenario messages for the scenario id. Variables may not use it.
const RESERVED_VARIABLE: &str = "id";

/// A Monte Carlo model.
///
/// Immutable once published. Variables keep their definition order so that
/// sampling order (and therefore a seeded run) is reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub function: String,
    pub distributions: IndexMap<String, DistributionSpec>,
}

impl Model {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            distributions: IndexMap::new(),
        }
    }

    /// Add a variable definition (builder style).
    pub fn with_variable(mut self, name: impl Into<String>, spec: DistributionSpec) -> Self {
        self.distributions.insert(name.into(), spec);
        self
    }

    /// Read and parse a model file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse the line-oriented model format.
    ///
    /// ```text
    /// # comment
    /// FUNCTION: x + y
    /// x: uniform(min=0,max=1)
    /// y: normal(mu=0,sigma=1)
    /// ```
    ///
    /// Every distribution spec is parsed eagerly; a malformed spec fails the
    /// whole model with the offending line number.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut function: Option<String> = None;
        let mut distributions = IndexMap::new();

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            if let Some(expr) = text.strip_prefix("FUNCTION:") {
                if function.is_some() {
                    return Err(ParseError::DuplicateFunction { line });
                }
                let expr = expr.trim();
                if expr.is_empty() {
                    return Err(ParseError::EmptyFunction { line });
                }
                function = Some(expr.to_string());
                continue;
            }

            let (name, spec) = text.split_once(':').ok_or_else(|| ParseError::MalformedLine {
                line,
                content: text.to_string(),
            })?;
            let name = name.trim();
            if !is_identifier(name) {
                return Err(ParseError::InvalidVariableName {
                    line,
                    name: name.to_string(),
                });
            }
            if name == RESERVED_VARIABLE {
                return Err(ParseError::ReservedVariableName {
                    line,
                    name: name.to_string(),
                });
            }
            if distributions.contains_key(name) {
                return Err(ParseError::DuplicateVariable {
                    line,
                    name: name.to_string(),
                });
            }

            let spec = spec
                .parse::<DistributionSpec>()
                .map_err(|source| ParseError::Distribution {
                    line,
                    variable: name.to_string(),
                    source,
                })?;
            distributions.insert(name.to_string(), spec);
        }

        Ok(Self {
            function: function.ok_or(ParseError::MissingFunction)?,
            distributions,
        })
    }

    /// Rebuild a model from its wire form.
    ///
    /// Spec strings that do not parse are kept as
    /// [`DistributionSpec::Unknown`] so that a foreign or newer producer's
    /// model still loads; sampling those variables yields absent values.
    pub fn from_message(message: ModelMessage) -> Self {
        let distributions = message
            .distributions
            .into_iter()
            .map(|(name, raw)| {
                let spec = raw
                    .parse::<DistributionSpec>()
                    .unwrap_or(DistributionSpec::Unknown { raw });
                (name, spec)
            })
            .collect();
        Self {
            function: message.function,
            distributions,
        }
    }

    /// Convert to the wire form, rendering each spec canonically.
    pub fn to_message(&self) -> ModelMessage {
        ModelMessage {
            function: self.function.clone(),
            distributions: self
                .distributions
                .iter()
                .map(|(name, spec)| (name.clone(), spec.to_string()))
                .collect(),
        }
    }

    /// Variable names in definition order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.distributions.keys().map(String::as_str)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
