use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

// ===== ENUMS =====

/// Power-stage circuit class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    #[serde(rename = "buck")]
    Buck,
    #[serde(rename = "boost")]
    Boost,
    #[serde(rename = "buck_boost", alias = "buck-boost")]
    BuckBoost,
    #[serde(rename = "inverter_3ph", alias = "three_phase_inverter")]
    Inverter3Ph,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buck => "buck",
            Self::Boost => "boost",
            Self::BuckBoost => "buck_boost",
            Self::Inverter3Ph => "inverter_3ph",
        }
    }

    /// Parse a loosely formatted topology tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().replace('-', "_").as_str() {
            "buck" => Some(Self::Buck),
            "boost" => Some(Self::Boost),
            "buck_boost" => Some(Self::BuckBoost),
            "inverter_3ph" | "three_phase_inverter" | "inverter" => Some(Self::Inverter3Ph),
            _ => None,
        }
    }

    pub fn is_three_phase(&self) -> bool {
        matches!(self, Self::Inverter3Ph)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control-law family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Pi,
    Dq,
    Droop,
    Voc,
    Vsg,
    Cascaded,
    PfcCurrentMode,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pi => "pi",
            Self::Dq => "dq",
            Self::Droop => "droop",
            Self::Voc => "voc",
            Self::Vsg => "vsg",
            Self::Cascaded => "cascaded",
            Self::PfcCurrentMode => "pfc_current_mode",
        }
    }

    /// Unknown tags fall back to plain PI.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "dq" => Self::Dq,
            "droop" => Self::Droop,
            "voc" => Self::Voc,
            "vsg" => Self::Vsg,
            "cascaded" => Self::Cascaded,
            "pfc_current_mode" => Self::PfcCurrentMode,
            _ => Self::Pi,
        }
    }

    pub fn is_grid_forming(&self) -> bool {
        matches!(self, Self::Dq | Self::Droop | Self::Voc | Self::Vsg)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InrushMode {
    #[default]
    None,
    ActiveCurrentLimit,
    SoftStartRamp,
}

impl InrushMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ActiveCurrentLimit => "active_current_limit",
            Self::SoftStartRamp => "soft_start_ramp",
        }
    }

    /// Truthy strings enable active limiting, unknown values disable it.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "enable" | "enabled" | "active_current_limit" => {
                Self::ActiveCurrentLimit
            }
            "soft_start_ramp" => Self::SoftStartRamp,
            _ => Self::None,
        }
    }
}

/// Shape of the synthesized controller outputs for three-phase laws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    GatePulses,
    DutyCycles,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatePulses => "gate_pulses",
            Self::DutyCycles => "duty_cycles",
        }
    }

    pub fn from_hint(hint: Option<&str>) -> Self {
        let Some(hint) = hint else {
            return Self::GatePulses;
        };
        let hint = hint.trim().to_lowercase();
        if hint.contains("duty") {
            Self::DutyCycles
        } else {
            Self::GatePulses
        }
    }
}

/// Trust level of a simulation result, read from its diagnostic payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Trusted,
    Untrusted,
    Fallback,
}

impl ValidationMode {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_lowercase();
        match tag.as_str() {
            "trusted" | "backend" | "validated" | "simulink" => Self::Trusted,
            t if t.contains("fallback") || t.contains("synthetic") => Self::Fallback,
            _ => Self::Untrusted,
        }
    }
}

// ===== REQUIREMENTS =====

fn default_max_iterations() -> u32 {
    8
}

/// Immutable per-run requirement document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub name: String,
    pub vin_nominal_v: f64,
    pub vout_target_v: f64,
    pub pout_w: f64,
    pub fsw_hz: f64,
    pub ripple_v_pp_max: f64,
    pub settling_time_ms_max: f64,
    pub overshoot_pct_max: f64,
    pub efficiency_min_pct: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub grid_connected: bool,
    #[serde(default)]
    pub weak_grid_mode: bool,
    #[serde(default)]
    pub inrush_limit_a: Option<f64>,
    #[serde(default)]
    pub preferred_topology: Option<String>,
    #[serde(default)]
    pub output_signal_mode: Option<String>,
    #[serde(default)]
    pub control_design_notes: Option<String>,
    #[serde(default)]
    pub design_prompt: Option<String>,
    #[serde(default)]
    pub load_step_pct: Option<f64>,
}

impl RequirementSpec {
    pub fn conversion_ratio(&self) -> f64 {
        self.vout_target_v / self.vin_nominal_v.max(1e-9)
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_hint(self.output_signal_mode.as_deref())
    }

    /// Load resistance implied by the output targets, `V² / P`.
    pub fn load_resistance(&self) -> f64 {
        self.vout_target_v.powi(2) / self.pout_w.max(1e-9)
    }

    /// Default current limit when inrush limiting is enabled without an explicit limit.
    pub fn current_limit_a(&self) -> f64 {
        self.inrush_limit_a
            .unwrap_or_else(|| (self.pout_w / self.vout_target_v.abs().max(1.0)).max(10.0))
    }
}

// ===== DESIGN STATE =====

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopologyDesign {
    pub topology: Topology,
    #[serde(rename = "inductor_uH")]
    pub inductor_uh: f64,
    #[serde(rename = "capacitor_uF")]
    pub capacitor_uf: f64,
    pub switches: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorDesign {
    pub sensors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlDesign {
    pub controller: String,
    pub kp: f64,
    pub ki: f64,
    pub sample_time_s: f64,
    pub architecture: Architecture,
    pub current_loop_enabled: bool,
    pub inrush_control: InrushMode,
    pub inrush_limit_a: f64,
    pub secondary_controller: String,
    pub rationale: Vec<String>,
}

impl ControlDesign {
    /// Set the inrush mode; the limit is forced to zero when limiting is off.
    pub fn set_inrush(&mut self, mode: InrushMode, limit_a: f64) {
        self.inrush_control = mode;
        self.inrush_limit_a = match mode {
            InrushMode::None => 0.0,
            _ if limit_a.is_finite() && limit_a > 0.0 => limit_a,
            _ => 0.0,
        };
    }
}

// ===== TEMPLATE =====

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SFunctionSpec {
    pub function_name: String,
    pub module_name: String,
    pub input_width: usize,
    pub output_width: usize,
}

impl Default for SFunctionSpec {
    fn default() -> Self {
        Self {
            function_name: "control_sfunc".to_string(),
            module_name: "control_sfunc_wrapper.c".to_string(),
            input_width: 1,
            output_width: 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlxTemplateInfo {
    pub parameter_symbols: BTreeSet<String>,
    pub sfunction: SFunctionSpec,
}

// ===== SIMULATION & EVALUATION =====

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub overshoot_pct: f64,
    pub settling_time_ms: f64,
    pub ripple_v_pp: f64,
    pub efficiency_pct: f64,
    #[serde(flatten)]
    pub extra: IndexMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub metrics: Metrics,
    pub waveform_files: Vec<String>,
    pub code_files: Vec<String>,
    pub raw: Value,
}

impl SimulationResult {
    pub fn validation_mode(&self) -> ValidationMode {
        let tag = self
            .raw
            .get("validation")
            .or_else(|| self.raw.get("mode"))
            .and_then(Value::as_str)
            .unwrap_or("");
        ValidationMode::from_tag(tag)
    }

    /// Diagnostic warnings carried by the raw payload.
    pub fn warnings(&self) -> Vec<String> {
        let top = self.raw.get("warnings");
        let nested = self.raw.get("diagnostics").and_then(|d| d.get("warnings"));
        [top, nested]
            .into_iter()
            .flatten()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    pub violations: Vec<String>,
    pub score: f64,
}

/// Snapshot of one iteration. Owns its copies; later revisions never alias it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub topology: TopologyDesign,
    pub sensors: SensorDesign,
    pub control: ControlDesign,
    pub simulation: SimulationResult,
    pub evaluation: EvaluationResult,
}

impl IterationRecord {
    pub fn capture(
        iteration: u32,
        topology: &TopologyDesign,
        sensors: &SensorDesign,
        control: &ControlDesign,
        simulation: SimulationResult,
        evaluation: EvaluationResult,
    ) -> Self {
        Self {
            iteration,
            topology: topology.clone(),
            sensors: sensors.clone(),
            control: control.clone(),
            simulation,
            evaluation,
        }
    }
}
