use crate::core::{ControlDesign, RequirementSpec, TopologyDesign};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

/// Inductor winding resistance (ohm).
const R_INDUCTOR: f64 = 0.01;
/// Output capacitor ESR (ohm).
const R_CAPACITOR: f64 = 0.005;
/// Switch on-resistance (ohm).
const R_SWITCH_ON: f64 = 0.01;
/// Lower bound for the simulated stop time (s).
const MIN_STOP_TIME_S: f64 = 0.02;

/// How a symbol received its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Table,
    Convention,
    Defaulted,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResolvedParameters {
    pub values: IndexMap<String, f64>,
    pub sources: IndexMap<String, ParameterSource>,
    pub unresolved: Vec<String>,
}

impl ResolvedParameters {
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.values.get(symbol).copied()
    }

    pub fn is_defaulted(&self, symbol: &str) -> bool {
        self.sources.get(symbol) == Some(&ParameterSource::Defaulted)
    }
}

/// Quantity a symbol can be bound to.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Quantity {
    SourceVoltage,
    ReferenceVoltage,
    Inductance,
    Capacitance,
    LoadResistance,
    InductorResistance,
    CapacitorResistance,
    SwitchResistance,
    SampleTime,
    StopTime,
    SwitchingFrequency,
}

impl Quantity {
    fn value(
        self,
        req: &RequirementSpec,
        topology: &TopologyDesign,
        control: &ControlDesign,
    ) -> f64 {
        match self {
            Self::SourceVoltage => req.vin_nominal_v,
            Self::ReferenceVoltage => req.vout_target_v,
            Self::Inductance => topology.inductor_uh / 1e6,
            Self::Capacitance => topology.capacitor_uf / 1e6,
            Self::LoadResistance => req.load_resistance(),
            Self::InductorResistance => R_INDUCTOR,
            Self::CapacitorResistance => R_CAPACITOR,
            Self::SwitchResistance => R_SWITCH_ON,
            Self::SampleTime => control.sample_time_s,
            Self::StopTime => MIN_STOP_TIME_S.max(5.0 * req.settling_time_ms_max / 1000.0),
            Self::SwitchingFrequency => req.fsw_hz,
        }
    }
}

/// Exact, case-sensitive well-known symbols.
fn lookup_table(symbol: &str) -> Option<Quantity> {
    let q = match symbol {
        "Vin" | "Vdc" | "V_in" | "Vsrc" => Quantity::SourceVoltage,
        "Vref" | "Vout_ref" => Quantity::ReferenceVoltage,
        "L" | "L1" | "Lf" => Quantity::Inductance,
        "C" | "C1" | "Cf" | "Cout" => Quantity::Capacitance,
        "R" | "Rload" | "R_load" => Quantity::LoadResistance,
        "RL" | "R_L" => Quantity::InductorResistance,
        "RC" | "R_C" | "ESR" => Quantity::CapacitorResistance,
        "Ron" => Quantity::SwitchResistance,
        "Ts" | "Tsample" => Quantity::SampleTime,
        "Tstop" | "StopTime" | "t_stop" => Quantity::StopTime,
        "fsw" | "Fsw" => Quantity::SwitchingFrequency,
        _ => return None,
    };
    Some(q)
}

/// Naming-convention fallback on the lower-cased symbol.
fn lookup_convention(symbol: &str) -> Option<Quantity> {
    let s = symbol.to_lowercase();
    if s == "ts" || s == "sample_time" {
        Some(Quantity::SampleTime)
    } else if s.starts_with('r') && s.contains("load") {
        Some(Quantity::LoadResistance)
    } else if s.starts_with('v') {
        Some(Quantity::SourceVoltage)
    } else if s.starts_with('l') {
        Some(Quantity::Inductance)
    } else if s.starts_with('c') {
        Some(Quantity::Capacitance)
    } else {
        None
    }
}

/// Bind every symbol to a numeric value.
///
/// Every input symbol appears in the output. Symbols matched by neither the
/// table nor the naming convention are set to 0.0 and listed in `unresolved`.
pub fn resolve_parameters<'a, I>(
    req: &RequirementSpec,
    topology: &TopologyDesign,
    control: &ControlDesign,
    symbols: I,
) -> ResolvedParameters
where
    I: IntoIterator<Item = &'a String>,
{
    let mut resolved = ResolvedParameters::default();

    for symbol in symbols {
        if resolved.values.contains_key(symbol) {
            continue;
        }
        let (value, source) = if let Some(q) = lookup_table(symbol) {
            (q.value(req, topology, control), ParameterSource::Table)
        } else if let Some(q) = lookup_convention(symbol) {
            (q.value(req, topology, control), ParameterSource::Convention)
        } else {
            warn!(symbol = %symbol, "unresolved template parameter, defaulting to 0.0");
            resolved.unresolved.push(symbol.clone());
            (0.0, ParameterSource::Defaulted)
        };
        resolved.values.insert(symbol.clone(), value);
        resolved.sources.insert(symbol.clone(), source);
    }

    resolved
}
