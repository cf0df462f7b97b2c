use super::law::*;
use crate::core::{InrushMode, OutputMode};
use std::f64::consts::TAU;

#[derive(Clone, Debug, Default, PartialEq)]
struct ModelState {
    integ: f64,
    t: f64,
    theta: f64,
    dw: f64,
    carrier: f64,
}

/// Host-side executable model of the generated controller core.
///
/// Same laws, clamps and state as `ctrl_step`, including the port-width
/// handling: inputs at or beyond the declared width read as zero and outputs
/// beyond what the law produces are zero-filled.
#[derive(Clone, Debug)]
pub struct ControllerModel {
    spec: ControllerSpec,
    state: ModelState,
    last_modulation: f64,
}

impl ControllerModel {
    pub fn new(spec: ControllerSpec) -> Self {
        Self {
            spec,
            state: ModelState::default(),
            last_modulation: 0.0,
        }
    }

    pub fn spec(&self) -> &ControllerSpec {
        &self.spec
    }

    pub fn reset(&mut self) {
        self.state = ModelState::default();
        self.last_modulation = 0.0;
    }

    /// Integrator state after the last step.
    pub fn integrator(&self) -> f64 {
        self.state.integ
    }

    /// Duty (DC-DC) or modulation index (three-phase) after the last step.
    pub fn last_modulation(&self) -> f64 {
        self.last_modulation
    }

    /// One control period; `u.len()` and `y.len()` play the role of `nu`/`ny`.
    pub fn step(&mut self, u: &[f64], y: &mut [f64]) {
        let read = self.spec.inputs_read();
        let input = |k: usize| if k < read { u.get(k).copied().unwrap_or(0.0) } else { 0.0 };

        let mut vref = self.spec.vref;
        if self.spec.soft_start() {
            vref *= clamp(self.state.t / SOFT_START_S, 0.0, 1.0);
        }

        let out = match self.spec.law {
            ControlLaw::Pi | ControlLaw::Cascaded => self.duty_law(vref, input(0), input(1)),
            ControlLaw::ThreePhase(variant) => {
                let v = [input(0), input(1), input(2)];
                let i = [input(3), input(4), input(5)];
                self.three_phase_law(variant, vref, v, i)
            }
        };

        self.state.t += self.spec.sample_time_s;

        let written = self.spec.outputs_written();
        for (j, slot) in y.iter_mut().enumerate().take(self.spec.output_width) {
            *slot = if j < written { out[j] } else { 0.0 };
        }
    }

    fn duty_law(&mut self, vref: f64, vout: f64, il: f64) -> Vec<f64> {
        let s = &self.spec;
        let st = &mut self.state;
        let current_sensed = s.inputs_read() >= 2;

        let e = vref - vout;
        st.integ = clamp(st.integ + s.ki * e * s.sample_time_s, 0.0, 1.0);
        let mut duty = if s.law == ControlLaw::Cascaded {
            let iref_pu = clamp(s.kp * e + st.integ, 0.0, 1.0);
            if current_sensed {
                let ilim = if s.current_limit_a > 0.0 { s.current_limit_a } else { 1.0 };
                let iref = iref_pu * ilim;
                clamp(iref_pu + CASCADE_INNER_GAIN * (iref - il) / ilim, 0.0, 1.0)
            } else {
                iref_pu
            }
        } else {
            clamp(s.kp * e + st.integ, 0.0, 1.0)
        };
        if s.inrush == InrushMode::ActiveCurrentLimit
            && current_sensed
            && s.current_limit_a > 0.0
            && il.abs() > s.current_limit_a
        {
            duty = clamp(duty * s.current_limit_a / il.abs(), 0.0, 1.0);
        }

        self.last_modulation = duty;
        vec![duty, 1.0 - duty]
    }

    fn three_phase_law(&mut self, variant: GridLaw, mut vref: f64, v: [f64; 3], i: [f64; 3]) -> Vec<f64> {
        let s = &self.spec;
        let st = &mut self.state;
        let read = s.inputs_read();
        let nv = read.clamp(1, 3) as f64;
        let ni = read.saturating_sub(3).max(1) as f64;

        let vmag = (v.iter().map(|x| x * x).sum::<f64>() / nv).sqrt();
        let imag = (i.iter().map(|x| x * x).sum::<f64>() / ni).sqrt();
        let pest = 3.0 * vmag * imag;
        if variant == GridLaw::Droop {
            vref -= DROOP_FRACTION * s.vref * (pest / s.rated_power_w);
        }
        let vnorm = s.vref.abs().max(1.0);
        let e = (vref - vmag) / vnorm;
        st.integ = clamp(st.integ + s.ki * e * s.sample_time_s, -M_MAX, M_MAX);
        let mut m = s.kp * e + st.integ;

        let mut omega = TAU * F_GRID_HZ;
        if variant == GridLaw::Vsg {
            let swing = 1.0 - pest / s.rated_power_w - VSG_DAMPING * st.dw;
            st.dw = clamp(
                st.dw + s.sample_time_s * swing / (2.0 * VSG_INERTIA_H),
                -VSG_MAX_DEVIATION,
                VSG_MAX_DEVIATION,
            );
            omega *= 1.0 + st.dw;
        }
        st.theta = (st.theta + omega * s.sample_time_s) % TAU;
        if variant == GridLaw::Voc {
            m += VOC_PERTURBATION * st.theta.sin();
        }
        if s.inrush == InrushMode::ActiveCurrentLimit && s.current_limit_a > 0.0 && imag > s.current_limit_a {
            m *= s.current_limit_a / imag;
        }
        let m = clamp(m, -M_MAX, M_MAX);
        self.last_modulation = m;

        let refs = [
            m * st.theta.sin(),
            m * (st.theta - TAU / 3.0).sin(),
            m * (st.theta - 2.0 * TAU / 3.0).sin(),
        ];
        match s.output_mode {
            OutputMode::GatePulses => {
                st.carrier += s.fsw_hz * s.sample_time_s;
                st.carrier -= st.carrier.floor();
                let tri = 1.0 - 4.0 * (st.carrier - 0.5).abs();
                refs.iter()
                    .flat_map(|r| {
                        let upper = if *r >= tri { 1.0 } else { 0.0 };
                        [upper, 1.0 - upper]
                    })
                    .collect()
            }
            OutputMode::DutyCycles => refs.iter().map(|r| 0.5 * (1.0 + r)).collect(),
        }
    }
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Architecture;
    use proptest::prelude::*;

    fn spec(law: ControlLaw, mode: OutputMode) -> ControllerSpec {
        ControllerSpec {
            law,
            architecture: Architecture::Pi,
            kp: 0.03,
            ki: 6.0,
            sample_time_s: 5e-6,
            vref: 200.0,
            fsw_hz: 20_000.0,
            rated_power_w: 1000.0,
            rated_current_a: 5.0,
            inrush: InrushMode::None,
            current_limit_a: 10.0,
            output_mode: mode,
            input_width: 6,
            output_width: 8,
            function_name: "control_sfunc".into(),
            module_name: "control_sfunc_wrapper.c".into(),
        }
    }

    #[test]
    fn pi_saturates_at_full_duty_from_rest() {
        let mut model = ControllerModel::new(spec(ControlLaw::Pi, OutputMode::GatePulses));
        let mut y = [9.0; 8];
        model.step(&[0.0, 0.0], &mut y);
        assert_eq!(y[0], 1.0);
        assert_eq!(y[1], 0.0);
        assert!(y[2..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn soft_start_begins_at_zero_reference() {
        let mut s = spec(ControlLaw::Pi, OutputMode::GatePulses);
        s.inrush = InrushMode::SoftStartRamp;
        let mut model = ControllerModel::new(s);
        let mut y = [0.0; 2];
        model.step(&[0.0, 0.0], &mut y);
        assert_eq!(y[0], 0.0);
    }

    #[test]
    fn active_limit_scales_duty() {
        let mut s = spec(ControlLaw::Pi, OutputMode::GatePulses);
        s.inrush = InrushMode::ActiveCurrentLimit;
        let mut model = ControllerModel::new(s);
        let mut y = [0.0; 2];
        model.step(&[0.0, 40.0], &mut y);
        assert!((y[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn narrow_input_ignores_current() {
        let mut s = spec(ControlLaw::Pi, OutputMode::GatePulses);
        s.inrush = InrushMode::ActiveCurrentLimit;
        s.input_width = 1;
        let mut model = ControllerModel::new(s);
        let mut y = [0.0; 2];
        model.step(&[0.0, 40.0], &mut y);
        assert_eq!(y[0], 1.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut model = ControllerModel::new(spec(ControlLaw::Pi, OutputMode::GatePulses));
        let mut y = [0.0; 2];
        model.step(&[150.0, 0.0], &mut y);
        assert!(model.integrator() > 0.0);
        model.reset();
        assert_eq!(model.integrator(), 0.0);
    }

    fn any_law() -> impl Strategy<Value = ControlLaw> {
        prop_oneof![
            Just(ControlLaw::Pi),
            Just(ControlLaw::Cascaded),
            Just(ControlLaw::ThreePhase(GridLaw::Dq)),
            Just(ControlLaw::ThreePhase(GridLaw::Droop)),
            Just(ControlLaw::ThreePhase(GridLaw::Voc)),
            Just(ControlLaw::ThreePhase(GridLaw::Vsg)),
        ]
    }

    proptest! {
        #[test]
        fn outputs_respect_clamps(
            law in any_law(),
            duty_mode in any::<bool>(),
            active in any::<bool>(),
            kp in 0.0f64..5.0,
            ki in 0.0f64..5000.0,
            inputs in prop::collection::vec(prop::collection::vec(-1e4f64..1e4, 6), 1..40),
        ) {
            let mode = if duty_mode { OutputMode::DutyCycles } else { OutputMode::GatePulses };
            let mut s = spec(law, mode);
            s.kp = kp;
            s.ki = ki;
            if active {
                s.inrush = InrushMode::ActiveCurrentLimit;
            }
            let mut model = ControllerModel::new(s);
            let mut y = [0.0; 8];
            for u in &inputs {
                model.step(u, &mut y);
                match law {
                    ControlLaw::Pi | ControlLaw::Cascaded => {
                        prop_assert!((0.0..=1.0).contains(&y[0]));
                        prop_assert!((y[0] + y[1] - 1.0).abs() < 1e-12);
                        prop_assert!((0.0..=1.0).contains(&model.integrator()));
                    }
                    ControlLaw::ThreePhase(_) => {
                        prop_assert!(model.last_modulation().abs() <= M_MAX);
                        prop_assert!(model.integrator().abs() <= M_MAX);
                        if duty_mode {
                            for d in &y[..3] {
                                prop_assert!((0.5 * (1.0 - M_MAX) - 1e-12..=0.5 * (1.0 + M_MAX) + 1e-12).contains(d));
                            }
                        } else {
                            for pair in y[..6].chunks(2) {
                                prop_assert!(pair[0] == 0.0 || pair[0] == 1.0);
                                prop_assert_eq!(pair[0] + pair[1], 1.0);
                            }
                        }
                    }
                }
                prop_assert!(y.iter().all(|v| v.is_finite()));
            }
        }
    }
}
