//! Script files.

use sfos_api::{Script, ScriptEngine, Variables};

use crate::cli::{GlobalOpts, RunArgs};
use crate::config;
use crate::error::CliError;

use super::util::{print_responses, run_script, save_responses};
use super::{Context, outcome};

pub async fn handle(ctx: &Context, args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let script = Script::from_path(&args.script)?;
    if script.is_empty() {
        return Err(CliError::Validation {
            field: "script".into(),
            reason: format!("{} contains no commands", args.script.display()),
        });
    }
    let variables: Variables = args.vars.into_iter().collect();

    ScriptEngine::with_variables(variables.clone()).resolve(&ctx.templates, &script)?;

    let targets = config::resolve_targets(&ctx.config, global)?;
    let runs = run_script(ctx, targets, script, variables).await;

    print_responses(ctx, &runs);
    save_responses(&runs, &args.save)?;
    outcome(&runs)
}
