//! `hublink resolve`: the endpoint the active transport resolves to.

use serde::Serialize;

use crate::cli::GlobalOpts;
use crate::commands::Ctx;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Resolution {
    mode: String,
    base_url: String,
    websocket_url: String,
    /// Always redacted.
    token: &'static str,
}

pub async fn handle(ctx: &Ctx, global: &GlobalOpts) -> Result<(), CliError> {
    let descriptor = ctx.descriptor().await?;
    let websocket_url = descriptor
        .websocket_url()
        .map(|u| u.to_string())
        .map_err(|e| CliError::from(hublink_core::CoreError::from(e)))?;

    let resolution = Resolution {
        mode: ctx.mode.to_string(),
        base_url: descriptor.base_url().to_string(),
        websocket_url,
        token: "****",
    };

    let out = output::render_single(
        &global.output,
        &resolution,
        |r| {
            format!(
                "Mode:       {}\nBase URL:   {}\nWebSocket:  {}\nToken:      {}",
                r.mode, r.base_url, r.websocket_url, r.token
            )
        },
        |r| r.base_url.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
