use crate::app::backends::collector::HEALTH_CHECK_PATH;
use crate::domain::ports::HttpTransport;
use crate::utils::error::Result;

/// One GET against the collector health-check extension.
///
/// Any status other than 200 reports unhealthy; only transport failures are errors.
pub async fn probe_collector(transport: &dyn HttpTransport, base_url: &str) -> Result<bool> {
    let endpoint = format!("{}{}", base_url.trim_end_matches('/'), HEALTH_CHECK_PATH);
    let response = transport.get(&endpoint).await?;
    tracing::debug!("Collector health on {}: {}", endpoint, response.status);
    Ok(response.status == 200)
}
