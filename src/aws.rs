use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_sdk_s3::config::Credentials;
use aws_types::region::Region;
use log::debug;

use crate::config::StorageSettings;

/// Build an S3 client config from storage settings.
///
/// Explicit keys win; otherwise credentials come from the default AWS chain
/// (environment, profile, instance metadata).
pub async fn s3_config(settings: &StorageSettings) -> aws_sdk_s3::Config {
    let region_provider = RegionProviderChain::first_try(Some(settings.region.clone()).map(Region::new))
        .or_default_provider()
        .or_else(Region::new("us-east-1"));

    let shared_config = aws_config::defaults(BehaviorVersion::v2024_03_28())
        .region(region_provider)
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

    if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
        debug!("Using storage credentials from configuration");
        builder = builder.credentials_provider(Credentials::new(
            key_id.expose(),
            secret.expose(),
            None,
            None,
            "pipeline-config",
        ));
    }

    if let Some(ep) = &settings.endpoint {
        debug!("Using storage endpoint override {}", ep);
        builder = builder.endpoint_url(ep).force_path_style(true);
    }

    builder.build()
}
