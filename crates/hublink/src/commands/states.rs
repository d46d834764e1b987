//! `hublink states`: entity states over REST.

use tabled::Tabled;

use hublink_core::{CoreError, HubState};

use crate::cli::{GlobalOpts, StatesArgs};
use crate::commands::Ctx;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Last Changed")]
    last_changed: String,
}

impl From<&HubState> for StateRow {
    fn from(s: &HubState) -> Self {
        Self {
            entity_id: s.entity_id.clone(),
            state: s.state.clone(),
            name: s.friendly_name().unwrap_or_default().to_owned(),
            last_changed: s.last_changed.clone().unwrap_or_default(),
        }
    }
}

fn detail(s: &HubState) -> String {
    let mut lines = vec![
        format!("Entity:        {}", s.entity_id),
        format!("State:         {}", s.state),
    ];
    if let Some(name) = s.friendly_name() {
        lines.push(format!("Name:          {name}"));
    }
    if let Some(ref changed) = s.last_changed {
        lines.push(format!("Last Changed:  {changed}"));
    }
    if !s.attributes.is_empty() {
        lines.push("Attributes:".into());
        for (key, value) in &s.attributes {
            lines.push(format!("  {key}: {value}"));
        }
    }
    lines.join("\n")
}

pub async fn handle(ctx: &Ctx, args: StatesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let descriptor = ctx.descriptor().await?;
    let timeout = ctx.engine.config().timeout;

    let out = match args.entity_id {
        Some(entity_id) => {
            let state = ctx
                .engine
                .rest()
                .get_state(&descriptor, &entity_id, timeout)
                .await
                .map_err(CoreError::from)
                .map_err(|e| match e {
                    CoreError::HttpFailure { status: 404, .. } => CliError::NotFound {
                        resource: "entity".into(),
                        identifier: entity_id.clone(),
                        list_command: "states".into(),
                    },
                    other => other.into(),
                })?;
            output::render_single(&global.output, &state, detail, |s| s.state.clone())?
        }
        None => {
            let mut states = ctx
                .engine
                .rest()
                .get_states(&descriptor, timeout)
                .await
                .map_err(CoreError::from)?;
            if let Some(ref domain) = args.domain {
                let prefix = format!("{domain}.");
                states.retain(|s| s.entity_id.starts_with(&prefix));
            }
            states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
            output::render_list(&global.output, &states, |s| StateRow::from(s), |s| {
                s.entity_id.clone()
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
