//! Licensed subscriptions.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::Tabled;

use sfos_api::{SfosResponse, Subscription};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::{Context, fan_out, outcome};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct LicenseRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Subscription")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Bundle")]
    bundle: String,
    #[tabled(rename = "Expires")]
    expiry: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

/// One target's subscriptions, or why there are none.
#[derive(Serialize)]
struct TargetLicenses {
    target: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    subscriptions: Vec<Subscription>,
}

impl From<&SfosResponse> for TargetLicenses {
    fn from(response: &SfosResponse) -> Self {
        Self {
            target: response.target().to_owned(),
            success: response.success(),
            error: response.error().map(ToString::to_string),
            subscriptions: response
                .device_info()
                .map(sfos_api::DeviceInfo::subscriptions)
                .unwrap_or_default(),
        }
    }
}

fn date_cell(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn rows(licenses: &[TargetLicenses], color: bool) -> Vec<LicenseRow> {
    let now = Local::now().naive_local();
    let mut rows = Vec::new();
    for entry in licenses {
        if !entry.success {
            rows.push(LicenseRow {
                target: entry.target.clone(),
                name: entry.error.clone().unwrap_or_default(),
                kind: String::new(),
                status: output::status_cell(false, color),
                bundle: String::new(),
                expiry: String::new(),
                remaining: String::new(),
            });
            continue;
        }
        rows.extend(entry.subscriptions.iter().map(|sub| LicenseRow {
            target: entry.target.clone(),
            name: sub.name.clone(),
            kind: sub.kind.clone().unwrap_or_default(),
            status: sub.status.clone().unwrap_or_default(),
            bundle: if sub.is_bundle { "yes".into() } else { String::new() },
            expiry: date_cell(sub.expiry_date),
            remaining: sub.expiry_timeframe(now),
        }));
    }
    rows
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let targets = config::resolve_targets(&ctx.config, global)?;
    let runs = fan_out(ctx, targets, |mut fw| async move { vec![fw.get_info().await] }).await;

    let licenses: Vec<TargetLicenses> = runs
        .iter()
        .flat_map(|r| &r.responses)
        .map(TargetLicenses::from)
        .collect();
    let out = output::render_single(ctx.output, licenses.as_slice(), |l| {
        output::render_table(&rows(l, ctx.color))
    });
    output::print_output(&out, ctx.quiet);

    if ctx.output == OutputFormat::Table && !ctx.quiet {
        let total: usize = licenses.iter().map(|l| l.subscriptions.len()).sum();
        eprintln!("{total} subscriptions across {} firewalls", licenses.len());
    }
    outcome(&runs)
}
