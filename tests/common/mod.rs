#![allow(dead_code)]

use flate2::Compression;
use flate2::write::DeflateEncoder;
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SYSTEM_ROOT: &str = "simulink/systems/system_root.xml";

/// Deflate-compressed zip container built in memory.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entries.push((name.to_string(), data.as_ref().to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for (name, data) in &self.entries {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            let compressed = encoder.finish().unwrap();
            let offset = out.len() as u32;

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&8u16.to_le_bytes());
            out.extend_from_slice(&[0; 4]);
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&compressed);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&8u16.to_le_bytes());
            central.extend_from_slice(&[0; 4]);
            central.extend_from_slice(&0u32.to_le_bytes());
            central.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// Circuit description with one S-Function block referencing its metadata blob.
pub fn system_root_with_sfunction(function_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<System>
  <Block BlockType="DCVoltageSource" Name="Vdc" SID="1">
    <P Name="Amplitude">par.Vin</P>
  </Block>
  <Block BlockType="Inductor" Name="L1" SID="2">
    <P Name="L">par.L</P>
  </Block>
  <Block BlockType="Capacitor" Name="C1" SID="3">
    <P Name="C">par.C</P>
  </Block>
  <Block BlockType="Resistor" Name="Load" SID="4">
    <P Name="R">par.Rload * par.Kmystery</P>
  </Block>
  <Block BlockType="S-Function" Name="Controller" SID="5">
    <P Name="FunctionName">{function_name}</P>
    <P Name="SFunctionModules">{function_name}_wrapper.c</P>
    <P Name="WizardData" Ref="bdmxdata:B5_WizardData"/>
  </Block>
</System>"#
    )
}

/// Circuit description without any native-control block.
pub fn system_root_without_sfunction() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<System>
  <Block BlockType="DCVoltageSource" Name="Vdc" SID="1">
    <P Name="Amplitude">par.Vin</P>
  </Block>
</System>"#
}

/// Metadata blob with NUL padding around the width vectors.
pub fn wizard_blob(function_name: &str, inputs: usize, outputs: usize) -> Vec<u8> {
    let mut blob = vec![0u8, 1, 2, 0];
    for b in function_name.bytes() {
        blob.push(b);
        blob.push(0);
    }
    blob.extend_from_slice(format!("\0InPorts\0[{}, 1]\0\0OutPorts\0[{}, 1]\0", inputs, outputs).as_bytes());
    blob
}

pub fn template_with_widths(path: &Path, function_name: &str, inputs: usize, outputs: usize) -> PathBuf {
    ZipBuilder::new()
        .entry(SYSTEM_ROOT, system_root_with_sfunction(function_name))
        .entry(
            "simulink/bdmxdata/B5_WizardData.mxarray",
            wizard_blob(function_name, inputs, outputs),
        )
        .write_to(path)
}

/// 400 V to 200 V, 1 kW at 20 kHz with loose thresholds.
pub fn buck_requirement() -> Value {
    json!({
        "name": "buck_400_200",
        "vin_nominal_v": 400.0,
        "vout_target_v": 200.0,
        "pout_w": 1000.0,
        "fsw_hz": 20000.0,
        "ripple_v_pp_max": 5.0,
        "settling_time_ms_max": 50.0,
        "overshoot_pct_max": 50.0,
        "efficiency_min_pct": 50.0,
        "max_iterations": 8
    })
}

pub fn with_fields(mut doc: Value, fields: Value) -> Value {
    if let (Some(doc), Some(fields)) = (doc.as_object_mut(), fields.as_object()) {
        for (k, v) in fields {
            doc.insert(k.clone(), v.clone());
        }
    }
    doc
}

pub fn write_requirement(dir: &Path, doc: &Value) -> PathBuf {
    let path = dir.join("requirements.json");
    std::fs::write(&path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
    path
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
