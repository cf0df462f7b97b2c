use super::types::RequirementSpec;
use crate::error::{DesignError, Result};
use std::path::Path;

impl RequirementSpec {
    /// Load and validate a requirement document.
    ///
    /// Any failure here is fatal for the run: nothing has been written yet.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DesignError::RequirementIo {
            path: path.to_path_buf(),
            source,
        })?;
        let spec: RequirementSpec =
            serde_json::from_str(&text).map_err(|source| DesignError::RequirementParse {
                path: path.to_path_buf(),
                source,
            })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check field invariants.
    ///
    /// Thresholds must be finite and non-negative, the electrical targets must
    /// describe a physical operating point and the iteration budget must allow
    /// at least one pass.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DesignError::InvalidRequirement("name must not be empty".into()));
        }

        let thresholds = [
            ("ripple_v_pp_max", self.ripple_v_pp_max),
            ("settling_time_ms_max", self.settling_time_ms_max),
            ("overshoot_pct_max", self.overshoot_pct_max),
            ("efficiency_min_pct", self.efficiency_min_pct),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(DesignError::InvalidRequirement(format!(
                    "{} must be finite and non-negative, got {}",
                    field, value
                )));
            }
        }

        let positives = [
            ("vin_nominal_v", self.vin_nominal_v),
            ("pout_w", self.pout_w),
            ("fsw_hz", self.fsw_hz),
        ];
        for (field, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(DesignError::InvalidRequirement(format!(
                    "{} must be finite and positive, got {}",
                    field, value
                )));
            }
        }

        if !self.vout_target_v.is_finite() || self.vout_target_v == 0.0 {
            return Err(DesignError::InvalidRequirement(format!(
                "vout_target_v must be finite and non-zero, got {}",
                self.vout_target_v
            )));
        }

        if self.max_iterations < 1 {
            return Err(DesignError::InvalidRequirement(
                "max_iterations must be >= 1".into(),
            ));
        }

        if let Some(limit) = self.inrush_limit_a {
            if !limit.is_finite() || limit < 0.0 {
                return Err(DesignError::InvalidRequirement(format!(
                    "inrush_limit_a must be finite and non-negative, got {}",
                    limit
                )));
            }
        }

        Ok(())
    }
}
