use crate::core::{RequirementSpec, SensorDesign, Topology, TopologyDesign};

/// Output power from which switch temperature is monitored (W).
const THERMAL_SENSING_MIN_W: f64 = 300.0;

/// Sensor set for a design; order is stable across iterations.
pub fn design_sensors(req: &RequirementSpec, topology: &TopologyDesign) -> SensorDesign {
    let mut sensors: Vec<String> = ["vout", "inductor_current", "vin"].map(String::from).into();
    if req.pout_w >= THERMAL_SENSING_MIN_W {
        sensors.push("switch_temperature".into());
    }
    match topology.topology {
        Topology::Boost | Topology::BuckBoost => sensors.push("input_current".into()),
        Topology::Inverter3Ph => {
            sensors.push("grid_voltage_abc".into());
            sensors.push("phase_current_abc".into());
        }
        Topology::Buck => {}
    }
    SensorDesign { sensors }
}
