//! Endpoints and credentials for the Google Cloud APIs the workflow calls.
use std::time::Duration;

/// How the Dataflow template was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DataflowTemplateType {
    /// Classic template staged with `--templateLocation`.
    #[default]
    Classic,

    /// Flex template spec file.
    Flex,
}

/// CLI config for the Google Cloud API clients.
#[derive(Debug, Clone, clap::Parser)]
pub struct GoogleApiConfig {
    /// Bigtable Admin API endpoint.
    #[clap(
        long = "bigtable-admin-endpoint",
        env = "CACHE_IMPORT_BIGTABLE_ADMIN_ENDPOINT",
        default_value = "https://bigtableadmin.googleapis.com",
        action
    )]
    pub bigtable_admin_endpoint: String,

    /// Dataflow API endpoint.
    #[clap(
        long = "dataflow-endpoint",
        env = "CACHE_IMPORT_DATAFLOW_ENDPOINT",
        default_value = "https://dataflow.googleapis.com",
        action
    )]
    pub dataflow_endpoint: String,

    /// Pub/Sub API endpoint.
    #[clap(
        long = "pubsub-endpoint",
        env = "CACHE_IMPORT_PUBSUB_ENDPOINT",
        default_value = "https://pubsub.googleapis.com",
        action
    )]
    pub pubsub_endpoint: String,

    /// Region Dataflow jobs run in.
    #[clap(
        long = "dataflow-region",
        env = "CACHE_IMPORT_DATAFLOW_REGION",
        default_value = "us-central1",
        action
    )]
    pub dataflow_region: String,

    /// Kind of template `dataflowTemplate` points at.
    #[clap(
        value_enum,
        long = "dataflow-template-type",
        env = "CACHE_IMPORT_DATAFLOW_TEMPLATE_TYPE",
        ignore_case = true,
        default_value_t = DataflowTemplateType::default(),
        action
    )]
    pub dataflow_template_type: DataflowTemplateType,

    /// A fixed OAuth2 access token. If unset, application default credentials are used.
    ///
    /// Prefer the environment variable over the command line flag in shared
    /// environments.
    #[clap(long = "google-access-token", env = "GOOGLE_ACCESS_TOKEN", action)]
    pub access_token: Option<String>,

    /// Send API requests without credentials, e.g. to local emulators.
    #[clap(
        long = "google-anonymous",
        env = "CACHE_IMPORT_GOOGLE_ANONYMOUS",
        conflicts_with = "access_token",
        action
    )]
    pub anonymous: bool,

    /// Timeout for a single API request.
    #[clap(
        long = "google-request-timeout",
        env = "CACHE_IMPORT_GOOGLE_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration,
        action
    )]
    pub request_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults() {
        let config = GoogleApiConfig::try_parse_from(["cache_import"]).unwrap();
        assert_eq!(config.dataflow_region, "us-central1");
        assert_eq!(config.dataflow_template_type, DataflowTemplateType::Classic);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn flex_template_and_emulators() {
        let config = GoogleApiConfig::try_parse_from([
            "cache_import",
            "--dataflow-template-type",
            "FLEX",
            "--pubsub-endpoint",
            "http://localhost:8085",
            "--google-anonymous",
        ])
        .unwrap();
        assert_eq!(config.dataflow_template_type, DataflowTemplateType::Flex);
        assert_eq!(config.pubsub_endpoint, "http://localhost:8085");
        assert!(config.anonymous);
    }

    #[test]
    fn token_and_anonymous_conflict() {
        assert!(
            GoogleApiConfig::try_parse_from([
                "cache_import",
                "--google-access-token",
                "t",
                "--google-anonymous",
            ])
            .is_err()
        );
    }
}
