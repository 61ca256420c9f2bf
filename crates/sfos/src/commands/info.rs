//! Device identity.

use serde::Serialize;
use tabled::Tabled;

use sfos_api::{DeviceSummary, SfosResponse};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

use super::{Context, fan_out, outcome};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct InfoRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Version")]
    display_version: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Company")]
    company: String,
    #[tabled(rename = "User")]
    username: String,
}

/// One target's identity, or why there is none.
#[derive(Serialize)]
struct TargetInfo {
    target: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<DeviceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&SfosResponse> for TargetInfo {
    fn from(response: &SfosResponse) -> Self {
        Self {
            target: response.target().to_owned(),
            success: response.success(),
            info: response.device_info().map(sfos_api::DeviceInfo::summary),
            error: response.error().map(ToString::to_string),
        }
    }
}

impl InfoRow {
    fn new(info: &TargetInfo, color: bool) -> Self {
        let summary = info.info.clone();
        Self {
            target: info.target.clone(),
            status: output::status_cell(info.success, color),
            model: summary
                .as_ref()
                .map(|s| s.model.clone())
                .or_else(|| info.error.clone())
                .unwrap_or_default(),
            display_version: summary
                .as_ref()
                .map(|s| s.display_version.clone())
                .unwrap_or_default(),
            serial: summary
                .as_ref()
                .map(|s| s.serial_number.clone())
                .unwrap_or_default(),
            company: summary
                .as_ref()
                .map(|s| s.company_name.clone())
                .unwrap_or_default(),
            username: summary.map(|s| s.username).unwrap_or_default(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let targets = config::resolve_targets(&ctx.config, global)?;
    let runs = fan_out(ctx, targets, |mut fw| async move { vec![fw.get_info().await] }).await;

    let infos: Vec<TargetInfo> = runs
        .iter()
        .flat_map(|r| &r.responses)
        .map(TargetInfo::from)
        .collect();
    let out = output::render_list(ctx.output, &infos, |i| InfoRow::new(i, ctx.color));
    output::print_output(&out, ctx.quiet);

    outcome(&runs)
}
