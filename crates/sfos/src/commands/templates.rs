//! Available command templates.

use serde::Serialize;
use tabled::Tabled;

use crate::output;

use super::Context;

#[derive(Serialize, Tabled)]
struct TemplateRow {
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Steps")]
    steps: usize,
    #[tabled(rename = "Requests")]
    requests: String,
}

pub fn handle(ctx: &Context) {
    let rows: Vec<TemplateRow> = ctx
        .templates
        .commands()
        .into_iter()
        .map(|command| match ctx.templates.load(&command) {
            Ok(set) => TemplateRow {
                steps: set.len(),
                requests: set
                    .definitions()
                    .iter()
                    .map(|d| format!("{} {}/{}", d.method, d.mode, d.operation))
                    .collect::<Vec<_>>()
                    .join(", "),
                command,
            },
            Err(e) => TemplateRow {
                command,
                steps: 0,
                requests: e.to_string(),
            },
        })
        .collect();

    let out = output::render_rows(ctx.output, &rows);
    output::print_output(&out, ctx.quiet);
}
