//! Host settings store.
//!
//! Every actuator exposes a flat tree of named parameters: its own (for the
//! monochromator `tau` and `grating`) followed by the common axis parameters
//! the host reads for bounds, scaling, and convergence. Each parameter keeps its
//! value in a `tokio::sync::watch` channel so a GUI or logger can subscribe to
//! changes without polling.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut tree = SettingsTree::new(vec![
//!     Parameter::float("tau", "Tau (ms)", 1234.0).with_suffix("ms"),
//!     Parameter::list("grating", "Grating", vec!["a".into(), "b".into()], "a"),
//! ]);
//!
//! let mut rx = tree.child("tau")?.subscribe();
//! tree.set_value("tau", 250.0.into())?;
//! assert_eq!(rx.borrow_and_update().as_f64(), Some(250.0));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use crate::config::AxisConfig;
use crate::error::{AppResult, DaqError};

/// Names of the host-owned parameters appended to every actuator's settings.
pub mod names {
    /// Convergence tolerance in axis units.
    pub const EPSILON: &str = "epsilon";
    /// Move timeout in seconds.
    pub const TIMEOUT: &str = "timeout";
    /// Whether `min_bound`/`max_bound` are applied.
    pub const BOUNDS_ENABLED: &str = "bounds_enabled";
    /// Lower bound in axis units.
    pub const MIN_BOUND: &str = "min_bound";
    /// Upper bound in axis units.
    pub const MAX_BOUND: &str = "max_bound";
    /// Whether `scaling`/`offset` are applied.
    pub const SCALING_ENABLED: &str = "scaling_enabled";
    /// Linear scaling factor.
    pub const SCALING: &str = "scaling";
    /// Linear offset in axis units.
    pub const OFFSET: &str = "offset";
    /// Axis unit string (read-only).
    pub const UNITS: &str = "units";
}

// =============================================================================
// ParameterValue
// =============================================================================

/// Dynamically typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text or list selection.
    String(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Int(i) => write!(f, "{}", i),
            ParameterValue::Float(fl) => write!(f, "{}", fl),
            ParameterValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl ParameterValue {
    /// Extract value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(f) => Some(*f),
            ParameterValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extract value as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the value as a string slice (only for `String` values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::String(value)
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// Widget type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// On/off flag.
    Bool,
    /// Floating point number.
    Float,
    /// Selection from `limits`.
    List,
    /// Free text.
    String,
}

/// A single named, observable setting.
#[derive(Debug)]
pub struct Parameter {
    name: String,
    title: String,
    kind: ParameterKind,
    suffix: Option<String>,
    limits: Vec<String>,
    read_only: bool,
    value: watch::Sender<ParameterValue>,
}

impl Parameter {
    fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        kind: ParameterKind,
        initial: ParameterValue,
    ) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            name: name.into(),
            title: title.into(),
            kind,
            suffix: None,
            limits: Vec::new(),
            read_only: false,
            value,
        }
    }

    /// Floating point parameter.
    pub fn float(name: impl Into<String>, title: impl Into<String>, initial: f64) -> Self {
        Self::new(name, title, ParameterKind::Float, ParameterValue::Float(initial))
    }

    /// Boolean parameter.
    pub fn bool(name: impl Into<String>, title: impl Into<String>, initial: bool) -> Self {
        Self::new(name, title, ParameterKind::Bool, ParameterValue::Bool(initial))
    }

    /// Free text parameter.
    pub fn string(
        name: impl Into<String>,
        title: impl Into<String>,
        initial: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            title,
            ParameterKind::String,
            ParameterValue::String(initial.into()),
        )
    }

    /// List parameter restricted to `limits`.
    ///
    /// An `initial` value outside `limits` is replaced by the first option.
    pub fn list(
        name: impl Into<String>,
        title: impl Into<String>,
        limits: Vec<String>,
        initial: impl Into<String>,
    ) -> Self {
        let initial = initial.into();
        let initial = if limits.contains(&initial) {
            initial
        } else {
            limits.first().cloned().unwrap_or_default()
        };
        let mut param = Self::new(
            name,
            title,
            ParameterKind::List,
            ParameterValue::String(initial),
        );
        param.limits = limits;
        param
    }

    /// Unit suffix shown next to the value.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Reject user writes.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allowed options of a list parameter.
    pub fn limits(&self) -> &[String] {
        &self.limits
    }

    /// Whether user writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Current value.
    pub fn value(&self) -> ParameterValue {
        self.value.borrow().clone()
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<ParameterValue> {
        self.value.subscribe()
    }

    /// Coerce `value` to this parameter's type and check list limits.
    fn coerce(&self, value: ParameterValue) -> AppResult<ParameterValue> {
        let type_error = |expected| DaqError::ParameterType {
            name: self.name.clone(),
            expected,
        };

        match self.kind {
            ParameterKind::Float => value
                .as_f64()
                .map(ParameterValue::Float)
                .ok_or_else(|| type_error("float")),
            ParameterKind::Bool => value
                .as_bool()
                .map(ParameterValue::Bool)
                .ok_or_else(|| type_error("bool")),
            ParameterKind::String => match value {
                ParameterValue::String(s) => Ok(ParameterValue::String(s)),
                _ => Err(type_error("string")),
            },
            ParameterKind::List => match value {
                ParameterValue::String(s) if self.limits.contains(&s) => {
                    Ok(ParameterValue::String(s))
                }
                ParameterValue::String(s) => Err(DaqError::ParameterInvalidChoice {
                    name: self.name.clone(),
                    value: s,
                }),
                _ => Err(type_error("string")),
            },
        }
    }

    /// User write: rejected on read-only parameters.
    pub fn set(&self, value: ParameterValue) -> AppResult<ParameterValue> {
        if self.read_only {
            return Err(DaqError::ParameterReadOnly(self.name.clone()));
        }
        self.update(value)
    }

    /// Programmatic write (from the plugin or host), ignores the read-only flag.
    pub fn update(&self, value: ParameterValue) -> AppResult<ParameterValue> {
        let value = self.coerce(value)?;
        self.value.send_replace(value.clone());
        Ok(value)
    }

    /// Replace the options of a list parameter.
    ///
    /// When the current selection is no longer allowed it moves to the first
    /// new option. An empty list is rejected and leaves the parameter as is.
    pub fn set_limits(&mut self, limits: Vec<String>) -> AppResult<()> {
        let Some(first) = limits.first() else {
            return Err(DaqError::ParameterNoChoices(self.name.clone()));
        };
        let current = self.value();
        let still_valid = current
            .as_str()
            .map(|s| limits.iter().any(|l| l == s))
            .unwrap_or(false);
        if !still_valid {
            self.value.send_replace(ParameterValue::String(first.clone()));
        }
        self.limits = limits;
        Ok(())
    }
}

// =============================================================================
// SettingsTree
// =============================================================================

/// Ordered collection of an actuator's parameters.
#[derive(Debug, Default)]
pub struct SettingsTree {
    params: Vec<Parameter>,
}

impl SettingsTree {
    /// Build a tree from parameters, in display order.
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    /// Append more parameters (e.g. the host-common ones).
    pub fn extend(&mut self, params: impl IntoIterator<Item = Parameter>) {
        self.params.extend(params);
    }

    /// Look up a parameter by name.
    pub fn child(&self, name: &str) -> AppResult<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DaqError::UnknownParameter(name.to_string()))
    }

    /// Mutable lookup by name.
    pub fn child_mut(&mut self, name: &str) -> AppResult<&mut Parameter> {
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| DaqError::UnknownParameter(name.to_string()))
    }

    /// User write. Returns the stored (coerced) value.
    pub fn set_value(&self, name: &str, value: ParameterValue) -> AppResult<ParameterValue> {
        self.child(name)?.set(value)
    }

    /// Replace the options of a list parameter.
    pub fn set_limits(&mut self, name: &str, limits: Vec<String>) -> AppResult<()> {
        self.child_mut(name)?.set_limits(limits)
    }

    /// Float value of a parameter.
    pub fn f64_value(&self, name: &str) -> AppResult<f64> {
        self.child(name)?
            .value()
            .as_f64()
            .ok_or_else(|| DaqError::ParameterType {
                name: name.to_string(),
                expected: "float",
            })
    }

    /// Bool value of a parameter.
    pub fn bool_value(&self, name: &str) -> AppResult<bool> {
        self.child(name)?
            .value()
            .as_bool()
            .ok_or_else(|| DaqError::ParameterType {
                name: name.to_string(),
                expected: "bool",
            })
    }

    /// String value of a parameter.
    pub fn string_value(&self, name: &str) -> AppResult<String> {
        match self.child(name)?.value() {
            ParameterValue::String(s) => Ok(s),
            _ => Err(DaqError::ParameterType {
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    /// JSON snapshot of all parameters.
    pub fn to_json(&self) -> serde_json::Value {
        let params: Vec<serde_json::Value> = self
            .params
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "title": p.title,
                    "type": p.kind,
                    "value": p.value(),
                    "suffix": p.suffix,
                    "limits": p.limits,
                    "readonly": p.read_only,
                })
            })
            .collect();
        serde_json::Value::Array(params)
    }
}

/// Host parameters common to every actuator axis.
pub fn common_parameters(axis: &AxisConfig) -> Vec<Parameter> {
    vec![
        Parameter::string(names::UNITS, "Units", axis.units.clone()).read_only(),
        Parameter::float(names::EPSILON, "Epsilon", axis.epsilon),
        Parameter::float(names::TIMEOUT, "Timeout (s)", axis.timeout_s).with_suffix("s"),
        Parameter::bool(names::BOUNDS_ENABLED, "Set Bounds", axis.bounds.enabled),
        Parameter::float(names::MIN_BOUND, "Min", axis.bounds.min),
        Parameter::float(names::MAX_BOUND, "Max", axis.bounds.max),
        Parameter::bool(names::SCALING_ENABLED, "Use scaling", axis.scaling.enabled),
        Parameter::float(names::SCALING, "Scaling factor", axis.scaling.scaling),
        Parameter::float(names::OFFSET, "Offset factor", axis.scaling.offset),
    ]
}
