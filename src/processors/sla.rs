use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{ProcessorError, ProcessorOutcome, StageProcessor};
use crate::ticket::{RiskLevel, TicketFields};

/// Maps the time left before the SLA deadline to a risk level
#[derive(Debug, Clone)]
pub struct SlaPrioritizer {
    high_risk_days: i64,
    medium_risk_days: i64,
    reference_time: Option<DateTime<Utc>>,
}

impl SlaPrioritizer {
    pub fn new(high_risk_days: i64, medium_risk_days: i64) -> Self {
        Self {
            high_risk_days,
            medium_risk_days,
            reference_time: None,
        }
    }

    /// Evaluate deadlines against a fixed instant instead of the wall clock
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }

    pub fn classify(&self, sla_deadline: Option<&str>) -> RiskLevel {
        let Some(due) = sla_deadline.and_then(parse_deadline) else {
            return RiskLevel::Unknown;
        };
        let now = self.reference_time.unwrap_or_else(Utc::now);
        let days_left = due.signed_duration_since(now).num_days();

        if days_left <= self.high_risk_days {
            RiskLevel::High
        } else if days_left <= self.medium_risk_days {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl StageProcessor for SlaPrioritizer {
    fn name(&self) -> &str {
        "sla_prioritizer"
    }

    async fn process(&self, mut fields: TicketFields) -> Result<ProcessorOutcome, ProcessorError> {
        let risk = self.classify(fields.sla_deadline.as_deref());
        fields.risk_level = Some(risk);
        let summary = format!(
            "Risk: {} | SLA: {}",
            risk,
            fields.sla_deadline.as_deref().unwrap_or("N/A")
        );
        Ok(ProcessorOutcome::processed(fields, summary))
    }
}
