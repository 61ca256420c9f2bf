//! One named command against every target.

use serde_json::Value;

use sfos_api::{Script, ScriptEngine, ScriptItem, Variables};

use crate::cli::{GlobalOpts, SendArgs};
use crate::config;
use crate::error::CliError;

use super::util::{print_responses, run_script, save_responses};
use super::{Context, outcome};

/// The one-item script `send` runs.
fn build_script(args: &SendArgs) -> Result<Script, CliError> {
    let mut item = ScriptItem::new(args.command.trim_end_matches(".json"));
    if let Some(ref object) = args.object {
        item = item.with_request_object(object.clone());
    }
    if let Some(ref data) = args.data {
        let value: Value = serde_json::from_str(data)?;
        item = item.with_data(value);
    }
    Ok(Script::from(vec![item]))
}

pub async fn handle(ctx: &Context, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let script = build_script(&args)?;
    let variables: Variables = args.vars.into_iter().collect();

    // Unknown commands or objects fail here, before any login
    ScriptEngine::with_variables(variables.clone()).resolve(&ctx.templates, &script)?;

    let targets = config::resolve_targets(&ctx.config, global)?;
    let runs = run_script(ctx, targets, script, variables).await;

    print_responses(ctx, &runs);
    save_responses(&runs, &args.save)?;
    outcome(&runs)
}
