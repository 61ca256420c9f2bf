//! Streamed downloads.
//!
//! Every step of the command but the last is sent normally on the session;
//! the last step's body is streamed to `<dest>/<host>_<COMMAND>_<time>.bin`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use sfos_api::request::build;
use sfos_api::{Address, Definition};

use crate::cli::{DownloadArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;

use super::util::print_responses;
use super::{Context, fan_out, outcome};

fn file_name(address: &Address, command: &str) -> String {
    let stamp = Local::now().format("%Y%m%dT%H%M%S");
    let host: String = address
        .hostname()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{host}_{command}_{stamp}.bin")
}

fn destination(dest: &Path, address: &Address, command: &str) -> PathBuf {
    dest.join(file_name(address, command))
}

pub async fn handle(ctx: &Context, args: DownloadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = args.command.trim_end_matches(".json").to_owned();
    let definitions: Arc<Vec<Definition>> =
        Arc::new(ctx.templates.load(&command)?.definitions().to_vec());
    let dest = Arc::new(args.dest);

    let targets = config::resolve_targets(&ctx.config, global)?;
    let runs = fan_out(ctx, targets, move |mut fw| {
        let definitions = Arc::clone(&definitions);
        let dest = Arc::clone(&dest);
        let command = command.clone();
        async move {
            let mut responses = Vec::with_capacity(definitions.len());
            let Some((last, leading)) = definitions.split_last() else {
                return responses;
            };
            for definition in leading {
                let request = build(definition, fw.address(), None);
                let response = fw.send_request(&request).await;
                let failed = !response.success();
                responses.push(response);
                if failed {
                    return responses;
                }
            }
            let request = build(last, fw.address(), None);
            let path = destination(&dest, fw.address(), &command);
            responses.push(fw.download(&request, &path).await);
            responses
        }
    })
    .await;

    print_responses(ctx, &runs);
    outcome(&runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_filesystem_safe() {
        let name = file_name(&Address::new("fe80::1"), "DOWNLOAD_BACKUP");
        assert!(name.starts_with("fe80__1_DOWNLOAD_BACKUP_"));
        assert!(name.ends_with(".bin"));
        assert!(!name.contains(':'));
    }
}
