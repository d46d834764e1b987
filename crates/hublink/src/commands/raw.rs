//! `hublink rest` / `hublink ws`: raw calls through the engine.

use serde_json::Value;

use hublink_core::{Method, RestRequest};

use crate::cli::{GlobalOpts, HttpMethod, RestArgs, WsArgs};
use crate::commands::{Ctx, util};
use crate::error::CliError;
use crate::output;

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

pub async fn handle_rest(ctx: &Ctx, args: RestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let body = match (args.data.as_deref(), args.data_file.as_deref()) {
        (Some(raw), _) => Some(util::parse_json_arg("data", raw)?),
        (None, Some(path)) => Some(util::read_json_file(path)?),
        (None, None) => None,
    };

    let mut request = RestRequest::new(args.method.into());
    if let Some(body) = body {
        request = request.with_body(body);
    }

    let path = if args.path.starts_with('/') {
        args.path
    } else {
        format!("/{}", args.path)
    };

    let response = ctx.engine.call_rest(ctx.mode, &path, &request).await?;
    tracing::debug!(status = %response.status(), "rest call complete");

    // Non-JSON bodies (templates, plain errors) print as-is
    let out = match serde_json::from_str::<Value>(response.body()) {
        Ok(value) => output::render_value(&global.output, &value)?,
        Err(_) => response.body().to_owned(),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle_ws(ctx: &Ctx, args: WsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = match args.data.as_deref() {
        Some(raw) => Value::Object(util::parse_json_object("data", raw)?),
        None => Value::Null,
    };

    let result = ctx.engine.call_ws(ctx.mode, &args.command_type, payload).await?;
    let out = output::render_value(&global.output, &result)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
