//! Config subcommand handlers.

use std::io::{self, BufRead, IsTerminal};

use serde::Serialize;
use tabled::Tabled;

use hcbridge_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Base URL")]
    base_url: String,
    #[tabled(rename = "Appliances")]
    appliances: usize,
    #[tabled(rename = "Default")]
    default: String,
}

/// Copy of a profile that is safe to print.
fn redacted(profile: &Profile) -> Profile {
    let mut profile = profile.clone();
    if profile.access_token.is_some() {
        profile.access_token = Some("********".into());
    }
    profile
}

fn read_token(from_stdin: bool) -> Result<String, CliError> {
    let token = if from_stdin || !io::stdin().is_terminal() {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line
    } else {
        rpassword::prompt_password("Access token: ")?
    };
    let token = token.trim().to_owned();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "access_token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&hcbridge_config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Init {
            name,
            ca_cert,
            force,
        } => {
            let path = hcbridge_config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut cfg = Config::default();
            cfg.default_profile = Some(name.clone());
            cfg.profiles.insert(
                name.clone(),
                Profile {
                    base_url: global.base_url.clone(),
                    ca_cert,
                    ..Profile::default()
                },
            );
            hcbridge_config::save_config_to(&cfg, &path)?;

            if let Some(ref token) = global.token {
                hcbridge_config::store_token(&name, token)?;
            }
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
                if global.token.is_none() {
                    eprintln!("Store a token with: hcbridge config set-token --profile {name}");
                }
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = hcbridge_config::load_config()?;
            let name = active_profile_name(global, &cfg);
            let profile = cfg.profile(Some(&name))?.1;
            let view = redacted(profile);
            let rendered = output::render_record(global.output, &view, |p| {
                let mut text = format!("# profile: {name}\n");
                text.push_str(&toml::to_string_pretty(p).unwrap_or_default());
                text
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = hcbridge_config::load_config_or_default();
            let default = cfg.default_profile.clone().unwrap_or_default();
            let mut rows: Vec<ProfileRow> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name: name.clone(),
                    base_url: p
                        .base_url
                        .clone()
                        .unwrap_or_else(|| hcbridge_api::DEFAULT_BASE_URL.into()),
                    appliances: p.appliances.len(),
                    default: if *name == default { "*" } else { "" }.into(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            let rendered = output::render_list(
                global.output,
                &rows,
                ProfileRow::clone,
                |r| r.name.clone(),
            )?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = hcbridge_config::load_config()?;
            cfg.profile(Some(&name))?;
            cfg.default_profile = Some(name);
            hcbridge_config::save_config(&cfg)?;
            Ok(())
        }

        ConfigCommand::SetToken { stdin } => {
            let cfg = hcbridge_config::load_config_or_default();
            let name = active_profile_name(global, &cfg);
            let token = match global.token {
                Some(ref token) => token.clone(),
                None => read_token(stdin)?,
            };
            hcbridge_config::store_token(&name, &token)?;
            if !global.quiet {
                eprintln!("Token for profile '{name}' stored in the system keyring");
            }
            Ok(())
        }
    }
}
