// src/utils/logging.rs - Phase logging helpers for the batch jobs
use log::{error, info, warn};
use std::time::Instant;

/// Which batch job a [`MatchingLogger`] speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Dedup,
    Match,
    Geocode,
}

#[derive(Clone)]
pub struct MatchingLogger {
    job_name: &'static str,
    job_emoji: &'static str,
    start_time: Instant,
}

impl MatchingLogger {
    pub fn new(kind: JobKind) -> Self {
        let (job_name, job_emoji) = match kind {
            JobKind::Dedup => ("DEDUP", "🏘️"),
            JobKind::Match => ("MATCH", "🤝"),
            JobKind::Geocode => ("GEOCODE", "📍"),
        };
        Self {
            job_name,
            job_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, detail: &str) {
        info!(
            "[{}] {} 🚀 Starting (run ID: {}) {}",
            self.job_name, self.job_emoji, run_id, detail
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.job_name,
                self.job_emoji,
                phase,
                details,
                elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.job_name,
                self.job_emoji,
                phase,
                elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Loaded {} {}",
            self.job_name, self.job_emoji, count, data_type
        );
    }

    pub fn log_completion(&self, summary: &str) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {}",
            self.job_name,
            self.job_emoji,
            self.start_time.elapsed(),
            summary
        );
    }

    pub fn log_progress_update(&self, current: usize, total: usize) {
        let should_log = current == total || (total >= 10 && current % (total / 10) == 0);
        if should_log && current > 0 {
            let percent = (current as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 📊 Progress: {}/{} ({:.1}%)",
                self.job_name, self.job_emoji, current, total, percent
            );
        }
    }

    pub fn log_data_quality_issue(&self, issue_type: &str, count: usize) {
        if count > 0 {
            warn!(
                "[{}] {} ⚠️  Data quality: {} instances of {}",
                self.job_name, self.job_emoji, count, issue_type
            );
        }
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.job_name, self.job_emoji, message);
    }

    pub fn log_error(&self, message: &str) {
        error!("[{}] {} ❌ {}", self.job_name, self.job_emoji, message);
    }
}
