use super::RunOutcome;
use crate::core::IterationRecord;
use std::time::Instant;
use tracing::info;

/// Receives every iteration as it completes.
pub trait IterationObserver {
    fn on_iteration(&mut self, record: &IterationRecord);

    fn on_finish(&mut self, _outcome: &RunOutcome) {}
}

#[derive(Clone, Debug)]
struct HistoryEntry {
    iteration: u32,
    score: f64,
    passed: bool,
    violations: usize,
}

/// Logs progress with elapsed time and optionally prints a closing summary.
pub struct ProgressLog {
    started: Instant,
    print_summary: bool,
    history: Vec<HistoryEntry>,
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            print_summary: false,
            history: Vec::new(),
        }
    }

    pub fn with_summary(mut self, print: bool) -> Self {
        self.print_summary = print;
        self
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    pub fn summary(&self, outcome: &RunOutcome) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            "DESIGN RUN SUMMARY".to_string(),
            rule.clone(),
            format!(
                "Status: {}",
                if outcome.final_passed() { "✓ PASSED" } else { "✗ EXHAUSTED" }
            ),
            format!("Run directory: {}", outcome.run_dir.display()),
            format!("Total iterations: {}", outcome.records.len()),
            format!("Final score: {:.2}", outcome.final_score()),
        ];
        match outcome.published_from {
            Some(iteration) => lines.push(format!("Published from iteration {}", iteration)),
            None => lines.push("Nothing published".to_string()),
        }
        lines.push(String::new());
        lines.push(format!("{:<8} {:<8} {:<8} {}", "Iter", "Score", "Passed", "Violations"));
        lines.push("-".repeat(40));
        for entry in &self.history {
            lines.push(format!(
                "{:<8} {:<8.2} {:<8} {}",
                entry.iteration,
                entry.score,
                if entry.passed { "yes" } else { "no" },
                entry.violations
            ));
        }
        lines.push(format!("Elapsed: {}", format_duration(self.started.elapsed().as_secs_f64())));
        lines.push(rule);
        lines.join("\n")
    }
}

impl IterationObserver for ProgressLog {
    fn on_iteration(&mut self, record: &IterationRecord) {
        let elapsed = format_duration(self.started.elapsed().as_secs_f64());
        info!(
            iteration = record.iteration,
            score = record.evaluation.score,
            passed = record.evaluation.passed,
            violations = record.evaluation.violations.len(),
            elapsed = %elapsed,
            "iteration complete"
        );
        for violation in &record.evaluation.violations {
            info!(iteration = record.iteration, "  {}", violation);
        }
        self.history.push(HistoryEntry {
            iteration: record.iteration,
            score: record.evaluation.score,
            passed: record.evaluation.passed,
            violations: record.evaluation.violations.len(),
        });
    }

    fn on_finish(&mut self, outcome: &RunOutcome) {
        if self.print_summary {
            println!("\n{}\n", self.summary(outcome));
        }
    }
}

pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let secs_remaining = secs % 60.0;
        format!("{}m {:.0}s", mins, secs_remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins_remaining = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, mins_remaining)
    }
}
