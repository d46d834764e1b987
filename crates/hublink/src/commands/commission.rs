//! `hublink commission`: drive a config flow and report the session.

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use hublink_core::{CommissioningRequest, CommissioningSession, CommissioningStatus, FlowStep};

use crate::cli::{CommissionArgs, GlobalOpts, OutputFormat};
use crate::commands::{Ctx, util};
use crate::error::CliError;
use crate::output;

pub async fn handle(ctx: &Ctx, args: CommissionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let request = build_request(&args)?;
    let mut session = ctx.engine.start_commissioning(ctx.mode, request).await?;

    if !args.no_wait && session.status == CommissioningStatus::InProgress {
        wait(ctx, &mut session, args.max_wait, global).await?;
    }

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &session,
        |s| detail(s, color),
        |s| s.status.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    match session.status {
        CommissioningStatus::NeedsInput | CommissioningStatus::InProgress if args.no_wait => Ok(()),
        CommissioningStatus::NeedsInput => Err(needs_input(&session)),
        _ => Ok(session.check()?),
    }
}

fn build_request(args: &CommissionArgs) -> Result<CommissioningRequest, CliError> {
    let input = match args.input_json.as_deref() {
        Some(raw) => util::parse_json_object("input-json", raw)?,
        None => util::parse_key_values(&args.inputs)?,
    };

    let mut request = CommissioningRequest::new(&args.handler).with_input(input);
    if let Some(ref area) = args.area {
        request = request.with_area(area);
    }
    if let Some(ref name) = args.name {
        request = request.with_name(name);
    }
    if let Some(ref device_type) = args.device_type {
        request = request.with_type_override(device_type);
    }
    if let Some(ref label) = args.label {
        request = request.with_label(label);
    }
    Ok(request)
}

/// Poll until the flow settles, Ctrl-C fires, or `max_wait` elapses.
async fn wait(
    ctx: &Ctx,
    session: &mut CommissioningSession,
    max_wait: Duration,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let spinner = spinner(global, &session.request.handler);
    let outcome = tokio::time::timeout(
        max_wait,
        ctx.engine.run_commissioning(ctx.mode, session, cancel),
    )
    .await;
    spinner.finish_and_clear();
    interrupt.abort();

    match outcome {
        Ok(result) => Ok(result?),
        Err(_) if session.is_final => {
            tracing::warn!(session = %session.id, ?max_wait, "max wait elapsed during finalization, metadata may be incomplete");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(session = %session.id, ?max_wait, "commissioning did not finish, aborting flow");
            ctx.engine.cancel_commissioning(ctx.mode, session).await;
            Err(CliError::Timeout {
                timeout_ms: u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

fn spinner(global: &GlobalOpts, handler: &str) -> ProgressBar {
    let interactive = matches!(global.output, OutputFormat::Table) && std::io::stderr().is_terminal();
    if global.quiet || !interactive {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(format!("Commissioning via {handler}"));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn needs_input(session: &CommissioningSession) -> CliError {
    let fields = match session.last_step {
        Some(FlowStep::Form {
            ref data_schema, ..
        }) => util::schema_field_names(data_schema),
        _ => Vec::new(),
    };
    CliError::NeedsInput {
        fields: if fields.is_empty() {
            "(see the flow's form)".into()
        } else {
            fields.join(", ")
        },
    }
}

fn detail(s: &CommissioningSession, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session:   {}", s.id);
    let _ = writeln!(out, "Handler:   {}", s.request.handler);
    let _ = writeln!(out, "Status:    {}", output::status_label(s.status, color));
    if let Some(ref flow_id) = s.flow_id {
        let _ = writeln!(out, "Flow:      {flow_id}");
    }
    if let Some(form_errors) = s.last_step.as_ref().and_then(FlowStep::error_summary) {
        let _ = writeln!(out, "Input:     {form_errors}");
    }
    if !s.new_device_ids.is_empty() {
        let _ = writeln!(out, "Devices:   {}", s.new_device_ids.join(", "));
    }
    if !s.new_entity_ids.is_empty() {
        let _ = writeln!(out, "Entities:  {}", s.new_entity_ids.join(", "));
    }
    if let Some(ref error) = s.error {
        let _ = writeln!(out, "Error:     {error}");
    }
    if !s.warnings.is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in &s.warnings {
            let _ = writeln!(out, "  - {warning}");
        }
    }
    out.trim_end().to_owned()
}
