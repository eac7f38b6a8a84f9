use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    agent::storage::entities::ActivityRecord, platform::MachineIdentity,
    utils::time::date_to_record_name,
};

/// The only per-application figure that leaves the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppKeyStats {
    pub total_key_strokes: u64,
}

/// Summary sent to the collection service. Raw keys and browser activity are never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub uuid: String,
    pub date: String,
    pub app_details: BTreeMap<String, AppKeyStats>,
    pub idle_time: f64,
}

impl MetricsPayload {
    /// Builds the payload for a day. Days without application activity have nothing to report.
    pub fn from_record(
        identity: &MachineIdentity,
        date: NaiveDate,
        record: &ActivityRecord,
    ) -> Option<Self> {
        if record.application_activity.is_empty() {
            return None;
        }
        let app_details = record
            .application_activity
            .iter()
            .map(|(app, stats)| {
                (
                    app.clone(),
                    AppKeyStats {
                        total_key_strokes: stats.total_key_strokes,
                    },
                )
            })
            .collect();
        Some(Self {
            uuid: identity.as_str().to_owned(),
            date: date_to_record_name(date),
            app_details,
            idle_time: record.idle_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::{
        agent::storage::entities::{ActivityRecord, ContextStats},
        platform::MachineIdentity,
    };

    use super::MetricsPayload;

    #[test]
    fn test_payload_contains_only_key_totals() -> anyhow::Result<()> {
        let mut record = ActivityRecord {
            idle_time: 42.,
            ..Default::default()
        };
        record.application_activity.insert(
            "Terminal".into(),
            ContextStats {
                time_spent: 8,
                keys: vec!["s".into(), "u".into(), "d".into(), "o".into()],
                total_key_strokes: 3,
                ..ContextStats::application()
            },
        );
        record.browser_activity.insert(
            "github.com".into(),
            ContextStats {
                keys: vec!["q".into()],
                ..ContextStats::browser(1, 1)
            },
        );

        let payload = MetricsPayload::from_record(
            &MachineIdentity::new("machine-1")?,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            &record,
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&payload)?,
            json!({
                "uuid": "machine-1",
                "date": "2024-03-01",
                "app_details": {"Terminal": {"total_key_strokes": 3}},
                "idle_time": 42.0,
            })
        );
        Ok(())
    }

    #[test]
    fn test_no_application_activity_no_payload() -> anyhow::Result<()> {
        let mut record = ActivityRecord::default();
        record
            .browser_activity
            .insert("github.com".into(), ContextStats::browser(1, 1));

        assert!(MetricsPayload::from_record(
            &MachineIdentity::new("machine-1")?,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            &record,
        )
        .is_none());
        Ok(())
    }
}
