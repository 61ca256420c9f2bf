//! Shared helpers for command handlers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tabled::Tabled;

use sfos_api::{ResponseData, Script, ScriptEngine, SfosResponse, Variables, trace};

use crate::cli::SaveArgs;
use crate::error::CliError;
use crate::output;

use super::{Context, TargetRun};

const RESULT_WIDTH: usize = 60;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct ResponseRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "HTTP")]
    http: String,
    #[tabled(rename = "ms")]
    elapsed: String,
    #[tabled(rename = "Trace")]
    trace: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl ResponseRow {
    pub fn new(response: &SfosResponse, color: bool) -> Self {
        let result = match (response.error(), response.data()) {
            (Some(error), _) => error.to_string(),
            (None, Some(ResponseData::Saved { path, bytes })) => {
                format!("{bytes} bytes -> {}", path.display())
            }
            _ => response.text().unwrap_or_default().to_owned(),
        };
        Self {
            target: response.target().to_owned(),
            status: output::status_cell(response.success(), color),
            http: response
                .status_code()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            elapsed: response.elapsed().as_millis().to_string(),
            trace: response.trace().to_owned(),
            result: truncate(&result, RESULT_WIDTH),
        }
    }
}

/// One line, at most `width` characters.
pub fn truncate(text: &str, width: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= width {
        return line;
    }
    let mut cut: String = line.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Print every response of every target.
pub fn print_responses(ctx: &Context, runs: &[TargetRun]) {
    let responses: Vec<&SfosResponse> = runs.iter().flat_map(|r| &r.responses).collect();
    let out = output::render_list(ctx.output, &responses, |r| ResponseRow::new(r, ctx.color));
    output::print_output(&out, ctx.quiet);
}

/// Write every response as a pretty JSON array to `--out`, if given.
pub fn save_responses(runs: &[TargetRun], save: &SaveArgs) -> Result<(), CliError> {
    let Some(ref path) = save.out else {
        return Ok(());
    };
    let responses: Vec<&SfosResponse> = runs.iter().flat_map(|r| &r.responses).collect();
    let mut text = serde_json::to_string_pretty(&responses)?;
    text.push('\n');
    write_results(path, &text, save.append).map_err(|source| CliError::WriteFailed {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!(path = %path.display(), count = responses.len(), "responses saved");
    Ok(())
}

fn write_results(path: &Path, text: &str, append: bool) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(text.as_bytes())
}

/// Run `script` on every target selected by the flags.
pub async fn run_script(
    ctx: &Context,
    targets: Vec<crate::config::TargetSpec>,
    script: Script,
    variables: Variables,
) -> Vec<TargetRun> {
    let engine = ScriptEngine::with_variables(variables);
    super::fan_out(ctx, targets, move |mut fw| {
        let engine = engine.clone();
        let script = script.clone();
        async move {
            match engine.execute(&mut fw, &script).await {
                Ok(responses) => responses,
                Err(error) => vec![SfosResponse::failure(
                    &fw.address().authority(),
                    trace::SCRIPT_UNRESOLVED,
                    error,
                    Duration::ZERO,
                )],
            }
        }
    })
    .await
}
