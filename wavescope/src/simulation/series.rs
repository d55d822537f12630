use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column names the simulator uses for sweep axes.
const SWEEP_NAMES: [&str; 7] = [
    "Index",
    "time",
    "frequency",
    "v-sweep",
    "res-sweep",
    "temp-sweep",
    "i-sweep",
];

/// The physical magnitude of a simulated column, guessed from its name.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Quantity {
    Index,
    Time,
    Frequency,
    Voltage,
    Current,
    Resistance,
    Temperature,
    Phase,
    Power,
    Capacitance,
    Transconductance,
    Unknown,
}

impl Quantity {
    /// Display label for axis titles; empty for [`Quantity::Unknown`].
    pub fn label(&self) -> &'static str {
        match self {
            Quantity::Index => "Index",
            Quantity::Time => "Time",
            Quantity::Frequency => "Frequency",
            Quantity::Voltage => "Voltage",
            Quantity::Current => "Current",
            Quantity::Resistance => "Resistance",
            Quantity::Temperature => "Temperature",
            Quantity::Phase => "Phase",
            Quantity::Power => "Power",
            Quantity::Capacitance => "Capacitance",
            Quantity::Transconductance => "Transconductance",
            Quantity::Unknown => "",
        }
    }
}

/// Guesses the magnitude and unit of a column from the simulator's naming
/// conventions.
///
/// Total over all inputs; unrecognized names yield `(Quantity::Unknown, "")`.
pub fn infer_magnitude(name: &str) -> (Quantity, &'static str) {
    match name {
        "Index" => return (Quantity::Index, ""),
        "time" => return (Quantity::Time, "s"),
        "frequency" => return (Quantity::Frequency, "Hz"),
        "v-sweep" => return (Quantity::Voltage, "V"),
        "res-sweep" => return (Quantity::Resistance, "Ω"),
        "temp-sweep" => return (Quantity::Temperature, "°C"),
        "i-sweep" => return (Quantity::Current, "A"),
        _ => {}
    }

    if name.ends_with("#branch") {
        return (Quantity::Current, "A");
    }
    if name.starts_with('v') {
        if name.starts_with("vdb(") {
            return (Quantity::Voltage, "dB");
        }
        if name.starts_with("vp(") {
            return (Quantity::Phase, "rad");
        }
        // vr(, vi( and vm( are all plain volts, like v( itself.
        return (Quantity::Voltage, "V");
    }
    if name.starts_with('i') {
        return (Quantity::Current, "A");
    }
    if name.starts_with('@') {
        // Device-internal parameter, e.g. `@m1[gm]`.
        if let Some(open) = name.find('[') {
            if name.ends_with(']') {
                let param = &name[open + 1..name.len() - 1];
                if param.starts_with('i') {
                    return (Quantity::Current, "A");
                }
                if param.starts_with('p') {
                    return (Quantity::Power, "W");
                }
                if param.starts_with('c') {
                    return (Quantity::Capacitance, "F");
                }
                if param == "gm" {
                    return (Quantity::Transconductance, "A/V");
                }
            }
        }
    }
    (Quantity::Unknown, "")
}

/// One simulated value: numeric where the output token parses as a float,
/// raw text otherwise (e.g. the `re, im` pairs of a complex AC result).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Real(f64),
    Text(String),
}

impl Datum {
    pub fn from_token(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(value) => Datum::Real(value),
            Err(_) => Datum::Text(token.to_string()),
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Datum::Real(value) => Some(*value),
            Datum::Text(_) => None,
        }
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Real(value)
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Real(value) => write!(f, "{value}"),
            Datum::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SeriesError {
    #[error("cannot merge series `{other}` into `{name}`: names differ")]
    NameMismatch { name: String, other: String },

    #[error("cannot merge series `{name}`: magnitudes differ ({expected:?} vs {found:?})")]
    QuantityMismatch {
        name: String,
        expected: Quantity,
        found: Quantity,
    },
}

/// One named column of simulated values.
///
/// The independence flag marks the sweep axis (time, frequency, `v-sweep`,
/// ...) against which the remaining columns are plotted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSeries {
    name: String,
    values: Vec<Datum>,
    independent: bool,
}

impl DataSeries {
    pub fn new(name: impl Into<String>, values: Vec<Datum>) -> Self {
        let name = name.into();
        let independent = SWEEP_NAMES.contains(&name.as_str());
        Self {
            name,
            values,
            independent,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    #[inline]
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn quantity(&self) -> Quantity {
        infer_magnitude(&self.name).0
    }

    pub fn unit(&self) -> &'static str {
        infer_magnitude(&self.name).1
    }

    /// `("Voltage", "V")`-style pair for axis labelling; both parts empty
    /// when the name is unrecognized.
    pub fn magnitude_and_unit(&self) -> (&'static str, &'static str) {
        let (quantity, unit) = infer_magnitude(&self.name);
        (quantity.label(), unit)
    }

    /// Numeric view of the values, skipping tokens that did not parse.
    pub fn real_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(Datum::as_real).collect()
    }

    /// Appends the values of `other`, which must be a continuation of this
    /// series: same name and same derived magnitude. Fails without mutating
    /// `self` otherwise.
    pub fn extend(&mut self, other: DataSeries) -> Result<(), SeriesError> {
        if other.name != self.name {
            return Err(SeriesError::NameMismatch {
                name: self.name.clone(),
                other: other.name,
            });
        }
        let expected = self.quantity();
        let found = other.quantity();
        if expected != found {
            return Err(SeriesError::QuantityMismatch {
                name: self.name.clone(),
                expected,
                found,
            });
        }
        self.values.extend(other.values);
        Ok(())
    }
}
