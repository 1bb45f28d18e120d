//! Model Routing Setup
//!
//! Resolves the closed role table from settings once, at startup.

use tracing::{info, warn};

use query_cascade_core::ModelRole;
use query_cascade_llm::{create_provider, ModelRouter, RoleBinding, RoleTable};

use crate::models::settings::Settings;

/// Build the router for every role the settings can serve.
///
/// Roles whose provider lacks a credential, or whose provider cannot be
/// constructed, stay unbound and surface as `Unavailable` when called.
pub fn router_from_settings(settings: &Settings) -> ModelRouter {
    let mut table = RoleTable::default();

    for role in ModelRole::ALL {
        let config = settings.provider_config(role);
        let provider_type = config.provider;

        if provider_type.requires_credential() && config.api_key.is_none() {
            warn!(role = %role, provider = %provider_type, "no credential configured, role unavailable");
            continue;
        }

        match create_provider(config) {
            Ok(provider) => {
                info!(
                    role = %role,
                    provider = %provider_type,
                    model = provider.model(),
                    "role bound"
                );
                table.set(role, RoleBinding::new(provider, settings.temperatures.get(role)));
            }
            Err(e) => {
                warn!(role = %role, provider = %provider_type, error = %e, "provider construction failed");
            }
        }
    }

    ModelRouter::new(table)
}
