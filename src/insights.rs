use chrono::NaiveDate;

use crate::dates;
use crate::models::{CycleRecord, Insight, InsightKind};
use crate::prediction::{self, IrregularityPolicy};

/// Build the insight list shown alongside the cycle history.
///
/// Order is stable: irregularity pattern (if any), the phases primer, then the
/// next-period prediction once there are at least two cycles. With no cycles
/// only the getting-started primer is returned.
pub fn generate_insights(
    cycles: &[CycleRecord],
    avg_cycle_length: u32,
    policy: &IrregularityPolicy,
    today: NaiveDate,
) -> Vec<Insight> {
    let Some(latest) = prediction::most_recent_cycle(cycles) else {
        return vec![Insight {
            kind: InsightKind::Educational,
            title: "Getting Started".to_string(),
            description: "Track your cycle by logging your period days. This will help us provide personalized insights.".to_string(),
            timestamp: today,
        }];
    };

    let mut insights = Vec::with_capacity(3);

    let lengths = prediction::chronological_lengths(cycles);
    let irregularity = prediction::detect_irregularity_with(&lengths, avg_cycle_length, policy);
    if let Some(reason) = irregularity.reason.filter(|_| irregularity.irregular) {
        insights.push(Insight {
            kind: InsightKind::Pattern,
            title: "Cycle Irregularity Detected".to_string(),
            description: reason,
            timestamp: today,
        });
    }

    insights.push(Insight {
        kind: InsightKind::Educational,
        title: "Cycle Phases".to_string(),
        description: "Your menstrual cycle has four phases: menstrual, follicular, ovulation, and luteal. Each phase affects your body differently.".to_string(),
        timestamp: today,
    });

    if cycles.len() >= 2 {
        let predicted = prediction::predict_next(latest.start_date, avg_cycle_length);
        insights.push(Insight {
            kind: InsightKind::Prediction,
            title: "Next Period Prediction".to_string(),
            description: format!(
                "Based on your cycle history, your next period is predicted to start around {}.",
                dates::format_long(predicted)
            ),
            timestamp: today,
        });
    }

    insights
}
