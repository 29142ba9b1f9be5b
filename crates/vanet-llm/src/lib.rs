pub mod http;
pub mod mock;
pub mod reliable;
pub mod template;

pub use http::{HttpBackend, HttpBackendConfig};
pub use mock::{MockBackend, MockResponse};
pub use reliable::{ReliableBackend, ReliableConfig};
pub use template::{template_instruction, TemplateBackend};

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::{info, warn};

use vanet_core::backend::InstructionBackend;
use vanet_core::errors::BackendError;
use vanet_settings::{BackendKind, BackendSettings};

/// Build the backend named by the settings. HTTP backends come wrapped in
/// retry and circuit breaking.
pub fn backend_from_settings(
    settings: &BackendSettings,
) -> Result<Arc<dyn InstructionBackend>, BackendError> {
    match settings.kind {
        BackendKind::Template => Ok(Arc::new(TemplateBackend)),
        BackendKind::Http => {
            let endpoint = settings
                .endpoint
                .clone()
                .ok_or_else(|| BackendError::NotConfigured("backend.endpoint is not set".into()))?;
            let api_key = std::env::var(&settings.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from);
            if api_key.is_none() {
                warn!(env = %settings.api_key_env, "no API key found, sending unauthenticated requests");
            }
            let http = HttpBackend::new(HttpBackendConfig {
                endpoint,
                model: settings.model.clone(),
                api_key,
                timeout: Duration::from_millis(settings.timeout_ms),
            })?;
            info!(endpoint = ?settings.endpoint, model = %settings.model, "http instruction backend configured");
            Ok(Arc::new(ReliableBackend::new(
                http,
                ReliableConfig::from(settings),
            )))
        }
    }
}
