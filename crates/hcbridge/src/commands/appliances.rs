//! `hcbridge appliances`: read-only views of the account.

use serde::Serialize;
use tabled::Tabled;

use hcbridge_api::{Appliance, HomeConnectClient, ValueItem};
use hcbridge_core::ApplianceType;
use hcbridge_core::capability::catalog;

use crate::cli::{AppliancesArgs, AppliancesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ApplianceRow {
    #[tabled(rename = "ID")]
    ha_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Brand")]
    brand: String,
    #[tabled(rename = "Connected")]
    connected: String,
}

impl From<&Appliance> for ApplianceRow {
    fn from(a: &Appliance) -> Self {
        Self {
            ha_id: a.ha_id.clone(),
            name: a.name.clone(),
            kind: a.appliance_type.clone(),
            brand: a.brand.clone().unwrap_or_default(),
            connected: if a.connected { "yes" } else { "no" }.into(),
        }
    }
}

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

impl From<&ValueItem> for ValueRow {
    fn from(item: &ValueItem) -> Self {
        Self {
            key: item.key.clone(),
            value: match item.value {
                serde_json::Value::String(ref s) => s.clone(),
                ref other => other.to_string(),
            },
            unit: item.unit.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Serialize, Tabled)]
struct ModuleRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Module")]
    module: String,
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    client: &HomeConnectClient,
    args: AppliancesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let rendered = match args.command {
        AppliancesCommand::List => {
            let appliances = client.list_appliances().await?;
            output::render_list(
                global.output,
                &appliances,
                |a| ApplianceRow::from(a),
                |a| a.ha_id.clone(),
            )?
        }
        AppliancesCommand::Status { ha_id } => {
            let items = client.status(&ha_id).await?;
            render_values(global, &items)?
        }
        AppliancesCommand::Settings { ha_id } => {
            let items = client.settings(&ha_id).await?;
            render_values(global, &items)?
        }
        AppliancesCommand::Modules { ha_id } => {
            let appliance = find(client, &ha_id).await?;
            let kind = appliance
                .appliance_type
                .parse::<ApplianceType>()
                .unwrap_or(ApplianceType::Other(appliance.appliance_type.clone()));
            let modules: Vec<ModuleRow> = catalog::modules_for(&kind)
                .module_names()
                .into_iter()
                .enumerate()
                .map(|(i, module)| ModuleRow {
                    position: i + 1,
                    module,
                })
                .collect();
            output::render_list(
                global.output,
                &modules,
                ModuleRow::clone,
                |m| m.module.clone(),
            )?
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn render_values(global: &GlobalOpts, items: &[ValueItem]) -> Result<String, CliError> {
    output::render_list(
        global.output,
        items,
        |i| ValueRow::from(i),
        |i| i.key.clone(),
    )
}

async fn find(client: &HomeConnectClient, ha_id: &str) -> Result<Appliance, CliError> {
    client
        .list_appliances()
        .await?
        .into_iter()
        .find(|a| a.ha_id == ha_id)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "appliance".into(),
            identifier: ha_id.into(),
        })
}
