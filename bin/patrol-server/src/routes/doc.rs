use utoipa::OpenApi;

use crate::routes::{config_api, devices, exports, health, logs, patrol, reports, whitelist};

#[derive(OpenApi)]
#[openapi(info(
    title = "patrol-server",
    description = "Anti-piracy patrol orchestration API",
    version = env!("CARGO_PKG_VERSION"),
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(patrol::PatrolApi::openapi());
    root.merge(whitelist::WhitelistApi::openapi());
    root.merge(devices::DevicesApi::openapi());
    root.merge(reports::ReportsApi::openapi());
    root.merge(exports::ExportsApi::openapi());
    root.merge(logs::LogsApi::openapi());
    root.merge(config_api::ConfigApi::openapi());
    root
}
