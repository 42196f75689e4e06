pub mod azure_devops;
pub mod completion;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::config::AppConfig;
use crate::http::ReqwestTransport;
use azure_devops::AzureDevOpsExtractor;
use completion::CompletionClient;


fn open_transport(config: &AppConfig) -> Result<Arc<ReqwestTransport>> {
    let transport = ReqwestTransport::new(Duration::from_secs(config.http.timeout_secs))
        .context("Failed to open HTTP transport")?;
    Ok(Arc::new(transport))
}

/// Each extractor gets its own connection pool, released when its run ends.
pub fn create_extractor(config: &AppConfig) -> Result<AzureDevOpsExtractor> {
    let ado = &config.azure_devops;
    for (value, name) in [
        (&ado.organization_url, "ADO_ORGANIZATION_URL"),
        (&ado.project, "ADO_TEAM_PROJECT"),
        (&ado.personal_access_token, "ADO_PERSONAL_ACCESS_TOKEN"),
    ] {
        if value.trim().is_empty() {
            bail!("Azure DevOps is not configured: set {name} or fill in [azure_devops]");
        }
    }
    Ok(AzureDevOpsExtractor::new(
        &config.azure_devops,
        open_transport(config)?,
        config.retry.policy(),
        config.fan_out.fan_out(),
    ))
}

pub fn create_completion_client(config: &AppConfig) -> Result<CompletionClient> {
    let completion = config
        .completion
        .as_ref()
        .context("No completion endpoint configured. Set AOAI_URL and AOAI_KEY or add a [completion] section")?;
    Ok(CompletionClient::new(
        completion,
        open_transport(config)?,
        config.retry.policy(),
    ))
}
