//! `hublink probe`: reachability of each transport.

use serde::Serialize;
use tabled::Tabled;

use hublink_core::TransportMode;

use crate::cli::GlobalOpts;
use crate::commands::Ctx;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ProbeResult {
    mode: TransportMode,
    reachable: bool,
    preferred: bool,
}

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
    #[tabled(rename = "Preferred")]
    preferred: String,
}

pub async fn handle(ctx: &Ctx, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    let mut results = Vec::with_capacity(2);
    for mode in [ctx.preferred, ctx.preferred.other()] {
        let reachable = ctx.engine.probe_reachability(mode).await;
        results.push(ProbeResult {
            mode,
            reachable,
            preferred: mode == ctx.preferred,
        });
    }

    let out = output::render_list(
        &global.output,
        &results,
        |r| ProbeRow {
            mode: r.mode.to_string(),
            reachable: output::yes_no(r.reachable, color),
            preferred: if r.preferred { "*".into() } else { String::new() },
        },
        |r| format!("{}\t{}", r.mode, r.reachable),
    )?;
    output::print_output(&out, global.quiet);

    if results.iter().any(|r| r.reachable) {
        Ok(())
    } else {
        Err(CliError::ConnectionFailed {
            reason: "hub did not answer over local or relay transport".into(),
            help: None,
        })
    }
}
