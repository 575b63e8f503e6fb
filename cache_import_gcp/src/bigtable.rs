//! Bigtable Admin API v2.
use async_trait::async_trait;
use cache_import_workflow::{
    ClientError,
    table_admin::{TableAdminClient, TableIdentity},
};
use reqwest::Method;
use serde::Serialize;
use serde_json::json;

use crate::{GoogleApiClient, Result};

pub const DEFAULT_ENDPOINT: &str = "https://bigtableadmin.googleapis.com";

#[derive(Debug, Clone)]
pub struct BigtableAdminClient {
    api: GoogleApiClient,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTableRequest<'a> {
    table_id: &'a str,
    table: serde_json::Value,
}

impl BigtableAdminClient {
    pub fn new(api: GoogleApiClient) -> Self {
        Self { api }
    }

    async fn create(&self, table: &TableIdentity) -> Result<()> {
        let url = self
            .api
            .url(&format!("/v2/{}/tables", table.instance_name()))?;
        let body = CreateTableRequest {
            table_id: &table.table_id,
            table: json!({}),
        };
        self.api.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn modify_column_families(&self, table: &TableIdentity, family: &str) -> Result<()> {
        let url = self
            .api
            .url(&format!("/v2/{table}:modifyColumnFamilies"))?;
        let body = json!({
            "modifications": [{ "id": family, "create": {} }],
        });
        self.api.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn delete(&self, table: &TableIdentity) -> Result<()> {
        let url = self.api.url(&format!("/v2/{table}"))?;
        self.api.send(Method::DELETE, url, None::<&()>).await?;
        Ok(())
    }
}

#[async_trait]
impl TableAdminClient for BigtableAdminClient {
    async fn create_table(&self, table: &TableIdentity) -> Result<(), ClientError> {
        Ok(self.create(table).await?)
    }

    async fn create_column_family(
        &self,
        table: &TableIdentity,
        family: &str,
    ) -> Result<(), ClientError> {
        Ok(self.modify_column_families(table, family).await?)
    }

    async fn delete_table(&self, table: &TableIdentity) -> Result<(), ClientError> {
        Ok(self.delete(table).await?)
    }
}
