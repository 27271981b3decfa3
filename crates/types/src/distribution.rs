//! Typed distribution specs.

use crate::error::DistributionError;
use std::fmt;
use std::str::FromStr;

/// A per-variable sampling distribution.
///
/// Parsed once from the spec string forms `uniform(min=a,max=b)`,
/// `normal(mu=a,sigma=b)` and `poisson(lambda=a)`. Parameter invariants
/// (`min <= max`, `sigma >= 0`, `lambda >= 0`) are checked at parse time.
///
/// `Unknown` holds a spec string that could not be understood. It only
/// arises when decoding a model received off the wire (see
/// [`Model::from_message`](crate::Model::from_message)); sampling it fails.
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionSpec {
    Uniform { min: f64, max: f64 },
    Normal { mu: f64, sigma: f64 },
    Poisson { lambda: f64 },
    Unknown { raw: String },
}

impl DistributionSpec {
    /// Build a uniform spec, checking `min <= max` and that the width is
    /// representable.
    pub fn uniform(min: f64, max: f64) -> Result<Self, DistributionError> {
        check_finite("min", min)?;
        check_finite("max", max)?;
        if min > max {
            return Err(DistributionError::InvalidParameters {
                kind: "uniform",
                reason: format!("min ({}) is greater than max ({})", min, max),
            });
        }
        if !((max - min) * 2.0).is_finite() {
            return Err(DistributionError::InvalidParameters {
                kind: "uniform",
                reason: format!("range [{}, {}] is too wide to sample", min, max),
            });
        }
        Ok(Self::Uniform { min, max })
    }

    /// Build a normal spec, checking `sigma >= 0`.
    pub fn normal(mu: f64, sigma: f64) -> Result<Self, DistributionError> {
        check_finite("mu", mu)?;
        check_finite("sigma", sigma)?;
        if sigma < 0.0 {
            return Err(DistributionError::InvalidParameters {
                kind: "normal",
                reason: format!("sigma ({}) is negative", sigma),
            });
        }
        Ok(Self::Normal { mu, sigma })
    }

    /// Build a poisson spec, checking `lambda >= 0`.
    pub fn poisson(lambda: f64) -> Result<Self, DistributionError> {
        check_finite("lambda", lambda)?;
        if lambda < 0.0 {
            return Err(DistributionError::InvalidParameters {
                kind: "poisson",
                reason: format!("lambda ({}) is negative", lambda),
            });
        }
        Ok(Self::Poisson { lambda })
    }

    /// The distribution kind tag as it appears in spec strings.
    pub fn kind(&self) -> &str {
        match self {
            Self::Uniform { .. } => "uniform",
            Self::Normal { .. } => "normal",
            Self::Poisson { .. } => "poisson",
            Self::Unknown { raw } => raw.split('(').next().unwrap_or(raw).trim(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}

fn check_finite(param: &str, value: f64) -> Result<(), DistributionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DistributionError::InvalidNumber {
            param: param.to_string(),
            value: value.to_string(),
        })
    }
}

/// Named parameters of one spec, checked against the expected key set.
struct Params<'a> {
    kind: &'static str,
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Params<'a> {
    fn parse(kind: &'static str, body: &'a str) -> Result<Self, DistributionError> {
        let mut entries: Vec<(&str, &str)> = Vec::new();
        for part in body.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| DistributionError::Malformed(format!("{}({})", kind, body)))?;
            let key = key.trim();
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(DistributionError::DuplicateParameter {
                    kind,
                    param: key.to_string(),
                });
            }
            entries.push((key, value.trim()));
        }
        Ok(Self { kind, entries })
    }

    fn expect_only(&self, allowed: &[&str]) -> Result<(), DistributionError> {
        match self.entries.iter().find(|(k, _)| !allowed.contains(k)) {
            Some((k, _)) => Err(DistributionError::UnexpectedParameter {
                kind: self.kind,
                param: k.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn number(&self, param: &'static str) -> Result<f64, DistributionError> {
        let (_, raw) = self
            .entries
            .iter()
            .find(|(k, _)| *k == param)
            .ok_or(DistributionError::MissingParameter {
                kind: self.kind,
                param,
            })?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DistributionError::InvalidNumber {
                param: param.to_string(),
                value: raw.to_string(),
            })
    }
}

impl FromStr for DistributionSpec {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let (kind, rest) = spec
            .split_once('(')
            .ok_or_else(|| DistributionError::Malformed(spec.to_string()))?;
        let body = rest
            .strip_suffix(')')
            .ok_or_else(|| DistributionError::Malformed(spec.to_string()))?;

        match kind.trim() {
            "uniform" => {
                let params = Params::parse("uniform", body)?;
                params.expect_only(&["min", "max"])?;
                Self::uniform(params.number("min")?, params.number("max")?)
            }
            "normal" => {
                let params = Params::parse("normal", body)?;
                params.expect_only(&["mu", "sigma"])?;
                Self::normal(params.number("mu")?, params.number("sigma")?)
            }
            "poisson" => {
                let params = Params::parse("poisson", body)?;
                params.expect_only(&["lambda"])?;
                Self::poisson(params.number("lambda")?)
            }
            other => Err(DistributionError::UnknownKind(other.to_string())),
        }
    }
}

/// Canonical spec string. Parsing the output yields an equal spec.
impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform { min, max } => write!(f, "uniform(min={:?},max={:?})", min, max),
            Self::Normal { mu, sigma } => write!(f, "normal(mu={:?},sigma={:?})", mu, sigma),
            Self::Poisson { lambda } => write!(f, "poisson(lambda={:?})", lambda),
            Self::Unknown { raw } => f.write_str(raw),
        }
    }
}
