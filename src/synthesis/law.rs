//! Control-law selection and the generation-time constants shared by the
//! emitted C core and its host-side model.

use crate::core::{
    Architecture, ControlDesign, InrushMode, OutputMode, RequirementSpec, SFunctionSpec,
};
use serde::Serialize;

/// Modulation index bound for three-phase laws.
pub const M_MAX: f64 = 0.98;
/// Nominal grid frequency of the internal phase reference (Hz).
pub const F_GRID_HZ: f64 = 50.0;
/// Voltage droop at rated power, as a fraction of the reference.
pub const DROOP_FRACTION: f64 = 0.05;
/// Amplitude of the virtual-oscillator perturbation term.
pub const VOC_PERTURBATION: f64 = 0.02;
/// Virtual inertia constant H (s).
pub const VSG_INERTIA_H: f64 = 0.5;
/// Virtual damping (per unit).
pub const VSG_DAMPING: f64 = 20.0;
/// Per-unit frequency deviation bound of the swing state.
pub const VSG_MAX_DEVIATION: f64 = 0.05;
/// Reference ramp duration for soft start (s).
pub const SOFT_START_S: f64 = 0.02;
/// Cascaded current limit when none is configured, in multiples of rated current.
pub const CASCADE_OVERCURRENT: f64 = 2.0;
/// Inner current-loop gain, per unit of the current limit.
pub const CASCADE_INNER_GAIN: f64 = 0.5;

/// Three-phase law variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GridLaw {
    Dq,
    Droop,
    Voc,
    Vsg,
}

/// Closed set of code-emission strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLaw {
    /// Single voltage loop, duty output.
    Pi,
    /// Voltage loop with inner current limiting, duty output.
    Cascaded,
    ThreePhase(GridLaw),
}

impl ControlLaw {
    pub fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::Pi => Self::Pi,
            Architecture::Cascaded | Architecture::PfcCurrentMode => Self::Cascaded,
            Architecture::Dq => Self::ThreePhase(GridLaw::Dq),
            Architecture::Droop => Self::ThreePhase(GridLaw::Droop),
            Architecture::Voc => Self::ThreePhase(GridLaw::Voc),
            Architecture::Vsg => Self::ThreePhase(GridLaw::Vsg),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pi => "pi",
            Self::Cascaded => "cascaded",
            Self::ThreePhase(GridLaw::Dq) => "dq",
            Self::ThreePhase(GridLaw::Droop) => "droop",
            Self::ThreePhase(GridLaw::Voc) => "voc",
            Self::ThreePhase(GridLaw::Vsg) => "vsg",
        }
    }

    /// Input channels the law can use: vout and inductor current for duty
    /// laws, three voltages and three currents for three-phase laws.
    pub fn inputs_used(&self) -> usize {
        match self {
            Self::Pi | Self::Cascaded => 2,
            Self::ThreePhase(_) => 6,
        }
    }

    /// Output channels the law produces before zero-fill.
    pub fn outputs_produced(&self, mode: OutputMode) -> usize {
        match (self, mode) {
            (Self::Pi | Self::Cascaded, _) => 2,
            (Self::ThreePhase(_), OutputMode::GatePulses) => 6,
            (Self::ThreePhase(_), OutputMode::DutyCycles) => 3,
        }
    }
}

/// Everything the emitters and the model need, fixed at generation time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerSpec {
    pub law: ControlLaw,
    pub architecture: Architecture,
    pub kp: f64,
    pub ki: f64,
    pub sample_time_s: f64,
    pub vref: f64,
    pub fsw_hz: f64,
    pub rated_power_w: f64,
    pub rated_current_a: f64,
    pub inrush: InrushMode,
    pub current_limit_a: f64,
    pub output_mode: OutputMode,
    pub input_width: usize,
    pub output_width: usize,
    pub function_name: String,
    pub module_name: String,
}

impl ControllerSpec {
    pub fn from_design(req: &RequirementSpec, control: &ControlDesign, sfunction: &SFunctionSpec) -> Self {
        let law = ControlLaw::for_architecture(control.architecture);
        let fsw_hz = finite_or(req.fsw_hz, 0.0).max(0.0);
        let sample_time_s = if control.sample_time_s.is_finite() && control.sample_time_s > 0.0 {
            control.sample_time_s
        } else if fsw_hz > 0.0 {
            1.0 / (10.0 * fsw_hz)
        } else {
            1e-5
        };
        let rated_power_w = finite_or(req.pout_w, 1.0).max(1.0);
        let rated_current_a = rated_power_w / req.vout_target_v.abs().max(1.0);

        let current_limit_a = match (control.inrush_control, law) {
            (InrushMode::ActiveCurrentLimit, _) if control.inrush_limit_a > 0.0 => control.inrush_limit_a,
            (InrushMode::ActiveCurrentLimit, _) => req.current_limit_a(),
            _ => 0.0,
        };
        let current_limit_a = match law {
            ControlLaw::Cascaded if !(current_limit_a > 0.0) => CASCADE_OVERCURRENT * rated_current_a,
            _ => finite_or(current_limit_a, 0.0).max(0.0),
        };

        Self {
            law,
            architecture: control.architecture,
            kp: finite_or(control.kp, 0.0),
            ki: finite_or(control.ki, 0.0),
            sample_time_s,
            vref: finite_or(req.vout_target_v, 0.0),
            fsw_hz,
            rated_power_w,
            rated_current_a,
            inrush: control.inrush_control,
            current_limit_a,
            output_mode: req.output_mode(),
            input_width: sfunction.input_width,
            output_width: sfunction.output_width,
            function_name: sfunction.function_name.clone(),
            module_name: sfunction.module_name.clone(),
        }
    }

    /// Input indices actually read: `min(input_width, inputs_used)`.
    pub fn inputs_read(&self) -> usize {
        self.input_width.min(self.law.inputs_used())
    }

    /// Output indices carrying a computed value; the rest are zero-filled.
    pub fn outputs_written(&self) -> usize {
        self.output_width.min(self.law.outputs_produced(self.output_mode))
    }

    pub fn soft_start(&self) -> bool {
        self.inrush == InrushMode::SoftStartRamp
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}
