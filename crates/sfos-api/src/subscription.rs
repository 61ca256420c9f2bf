use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

const ONE_DAY: i64 = 24 * 60 * 60;
const ONE_WEEK: i64 = ONE_DAY * 7;
const ONE_YEAR: i64 = ONE_DAY * 365;

/// One licensed module as reported by the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub name: String,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_bundle: bool,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub deactivation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Status")]
    status: Option<Value>,
    #[serde(rename = "Type")]
    kind: Option<Value>,
    #[serde(default)]
    is_bundle: Value,
    #[serde(rename = "Start Date")]
    start_date: Option<String>,
    #[serde(rename = "Expiry Date")]
    expiry_date: Option<String>,
    deactivation_reason: Option<Value>,
}

fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

fn date(raw: Option<String>) -> Option<NaiveDate> {
    let raw = raw?;
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return None;
    }
    match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(value = raw, error = %e, "ignoring unparseable subscription date");
            None
        }
    }
}

impl Subscription {
    /// Seconds from `now` until the expiry date, if there is one.
    pub fn expiry_seconds(&self, now: NaiveDateTime) -> Option<i64> {
        let expiry = self.expiry_date?.and_hms_opt(0, 0, 0)?;
        Some((expiry - now).num_seconds())
    }

    /// Human description of the time left before expiry.
    pub fn expiry_timeframe(&self, now: NaiveDateTime) -> String {
        self.expiry_seconds(now).map(span_desc).unwrap_or_default()
    }
}

/// `PAST`, `Today`, `Tomorrow`, `N days`, `N weeks`, `Over a year` or `N years`.
pub fn span_desc(seconds: i64) -> String {
    match seconds {
        s if s < 0 => "PAST".into(),
        s if s < ONE_DAY => "Today".into(),
        s if s < ONE_DAY * 2 => "Tomorrow".into(),
        s if s < ONE_WEEK * 2 => format!("{} days", s / ONE_DAY),
        s if s < ONE_YEAR => format!("{} weeks", s / ONE_WEEK),
        s if s < ONE_YEAR * 2 => "Over a year".into(),
        s => format!("{} years", s / ONE_YEAR),
    }
}

/// Decode the landing page's subscription array.
///
/// Decoding stops at the first entry without a name. Bundles are listed
/// before a-la-carte modules; relative order is otherwise kept. Malformed
/// JSON is logged and yields an empty list.
pub fn decode_subscriptions(raw: &str) -> Vec<Subscription> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "unable to decode subscription list");
            return Vec::new();
        }
    };

    let mut bundles = Vec::new();
    let mut modules = Vec::new();
    for entry in entries {
        let Ok(raw) = serde_json::from_value::<RawSubscription>(entry) else {
            break;
        };
        let Some(name) = raw.name.filter(|n| !n.is_empty()) else {
            break;
        };
        let subscription = Subscription {
            name,
            status: text(raw.status),
            kind: text(raw.kind),
            is_bundle: truthy(&raw.is_bundle),
            start_date: date(raw.start_date),
            expiry_date: date(raw.expiry_date),
            deactivation_reason: text(raw.deactivation_reason),
        };
        if subscription.is_bundle {
            bundles.push(subscription);
        } else {
            modules.push(subscription);
        }
    }
    bundles.extend(modules);
    bundles
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"Name": "Web Protection", "Status": "Subscribed", "Type": "Module",
         "is_bundle": 0, "Start Date": "2024-01-01", "Expiry Date": "2026-01-01",
         "deactivation_reason": ""},
        {"Name": "Xstream Protection", "Status": "Subscribed", "Type": "Bundle",
         "is_bundle": true, "Start Date": "2024-01-01", "Expiry Date": "null"},
        {"Status": "Unsubscribed"},
        {"Name": "Never reached"}
    ]"#;

    #[test]
    fn bundles_first_and_stop_at_nameless_entry() {
        let subs = decode_subscriptions(SAMPLE);
        let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Xstream Protection", "Web Protection"]);
        assert!(subs[0].is_bundle);
        assert_eq!(subs[0].expiry_date, None);
        assert_eq!(
            subs[1].expiry_date,
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
        );
    }

    #[test]
    fn malformed_json_is_empty() {
        assert!(decode_subscriptions("[{").is_empty());
        assert!(decode_subscriptions("[]").is_empty());
    }

    #[test]
    fn span_thresholds() {
        assert_eq!(span_desc(-1), "PAST");
        assert_eq!(span_desc(3_600), "Today");
        assert_eq!(span_desc(ONE_DAY + 1), "Tomorrow");
        assert_eq!(span_desc(ONE_DAY * 5), "5 days");
        assert_eq!(span_desc(ONE_WEEK * 3), "3 weeks");
        assert_eq!(span_desc(ONE_YEAR + ONE_DAY), "Over a year");
        assert_eq!(span_desc(ONE_YEAR * 3), "3 years");
    }

    #[test]
    fn expiry_timeframe_is_relative_to_now() {
        let sub = decode_subscriptions(SAMPLE).pop().unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 12, 22)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(sub.expiry_timeframe(now), "10 days");
        let later = NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(sub.expiry_timeframe(later), "PAST");
    }
}
