//! `hublink config`: inspect configuration and store secrets.

use std::fmt::Write as _;

use secrecy::SecretString;
use serde::Serialize;
use tabled::Tabled;

use hublink_config::{SecretKind, store_secret};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            output::print_output(&format_config_redacted(&cfg), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let summaries = profile_summaries(&cfg);
            let out = output::render_list(
                &global.output,
                &summaries,
                |p| ProfileRow {
                    name: if p.default {
                        format!("{} *", p.name)
                    } else {
                        p.name.clone()
                    },
                    hub: p.hub_url.clone().unwrap_or_else(|| "-".into()),
                    mode: p.mode.clone(),
                },
                |p| p.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken { kiosk } => {
            let cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let kind = if kiosk {
                SecretKind::KioskSecret
            } else {
                SecretKind::HubToken
            };

            let secret = match (kind, global.token.as_deref()) {
                (SecretKind::HubToken, Some(token)) => token.to_owned(),
                _ => {
                    let prompt = if kiosk { "Kiosk secret: " } else { "Hub token: " };
                    rpassword::prompt_password(prompt)?
                }
            };
            let secret = secret.trim().to_owned();
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: if kiosk { "kiosk-secret" } else { "token" }.into(),
                    reason: "value is empty".into(),
                });
            }

            store_secret(&profile_name, kind, &SecretString::from(secret))?;
            if !global.quiet {
                eprintln!("Stored in the system keyring for profile '{profile_name}'.");
            }
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileSummary {
    name: String,
    hub_url: Option<String>,
    mode: String,
    default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Hub")]
    hub: String,
    #[tabled(rename = "Mode")]
    mode: String,
}

fn profile_summaries(cfg: &Config) -> Vec<ProfileSummary> {
    let default = cfg.default_profile.as_deref().unwrap_or("default");
    cfg.profiles
        .iter()
        .map(|(name, p)| ProfileSummary {
            name: name.clone(),
            hub_url: p
                .hub_url
                .clone()
                .or_else(|| p.platform_url.as_ref().map(|u| format!("{u} (kiosk)"))),
            mode: p.mode.clone().unwrap_or_else(|| cfg.defaults.mode.clone()),
            default: name == default,
        })
        .collect()
}

/// Render the config as TOML with secrets replaced by `****`.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "mode = \"{}\"", cfg.defaults.mode);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        if let Some(ref hub) = p.hub_url {
            let _ = writeln!(out, "hub_url = \"{hub}\"");
        }
        if let Some(ref relay) = p.relay_url {
            let _ = writeln!(out, "relay_url = \"{relay}\"");
            let _ = writeln!(out, "relay_enabled = {}", p.relay_enabled);
        }
        if let Some(ref mode) = p.mode {
            let _ = writeln!(out, "mode = \"{mode}\"");
        }
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref platform) = p.platform_url {
            let _ = writeln!(out, "platform_url = \"{platform}\"");
        }
        if let Some(ref kiosk) = p.kiosk_id {
            let _ = writeln!(out, "kiosk_id = \"{kiosk}\"");
        }
        if p.kiosk_secret.is_some() {
            let _ = writeln!(out, "kiosk_secret = \"****\"");
        }
        if let Some(ref env) = p.kiosk_secret_env {
            let _ = writeln!(out, "kiosk_secret_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if p.persist_credentials {
            let _ = writeln!(out, "persist_credentials = true");
        }
    }
    out.trim_end().to_owned()
}
