//! Length units understood by [`DataActuator`](crate::actuator::DataActuator).
//!
//! Wavelength stages report in nanometres, but the host may display or scan in
//! any length unit. Values are carried through a `uom` [`Length`] so the
//! conversion factors come from the SI definitions.

use uom::si::f64::Length;
use uom::si::length::{angstrom, meter, micrometer, millimeter, nanometer, picometer};

use crate::error::{AppResult, DaqError};

/// A length unit accepted on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    /// `m`
    Meter,
    /// `mm`
    Millimeter,
    /// `um`, `µm`
    Micrometer,
    /// `nm`
    Nanometer,
    /// `pm`
    Picometer,
    /// `Å`, `angstrom`
    Angstrom,
}

impl LengthUnit {
    /// Parse a unit symbol, `None` when it is not a known length.
    pub fn parse(unit: &str) -> Option<Self> {
        let unit = match unit.trim() {
            "m" => Self::Meter,
            "mm" => Self::Millimeter,
            "um" | "µm" | "μm" => Self::Micrometer,
            "nm" => Self::Nanometer,
            "pm" => Self::Picometer,
            "Å" | "angstrom" => Self::Angstrom,
            _ => return None,
        };
        Some(unit)
    }

    /// `value` in this unit as a length.
    pub fn length(self, value: f64) -> Length {
        match self {
            Self::Meter => Length::new::<meter>(value),
            Self::Millimeter => Length::new::<millimeter>(value),
            Self::Micrometer => Length::new::<micrometer>(value),
            Self::Nanometer => Length::new::<nanometer>(value),
            Self::Picometer => Length::new::<picometer>(value),
            Self::Angstrom => Length::new::<angstrom>(value),
        }
    }

    /// `length` expressed in this unit.
    pub fn value_of(self, length: Length) -> f64 {
        match self {
            Self::Meter => length.get::<meter>(),
            Self::Millimeter => length.get::<millimeter>(),
            Self::Micrometer => length.get::<micrometer>(),
            Self::Nanometer => length.get::<nanometer>(),
            Self::Picometer => length.get::<picometer>(),
            Self::Angstrom => length.get::<angstrom>(),
        }
    }
}

/// Returns true when `unit` is a supported length unit.
pub fn is_length_unit(unit: &str) -> bool {
    LengthUnit::parse(unit).is_some()
}

/// Convert `value` expressed in `from` into `to`.
///
/// Identical unit strings short-circuit, so unitless axes ("") still work.
pub fn convert(value: f64, from: &str, to: &str) -> AppResult<f64> {
    if from == to {
        return Ok(value);
    }

    match (LengthUnit::parse(from), LengthUnit::parse(to)) {
        (Some(src), Some(dst)) => Ok(dst.value_of(src.length(value))),
        _ => Err(DaqError::UnitMismatch {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}
