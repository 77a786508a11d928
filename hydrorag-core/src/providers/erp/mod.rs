//! Product catalog lookups against a Business Central OData endpoint

mod types;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

pub use types::*;

/// Source of pricing and inventory for recommended products
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Details for item number `no`, or `None` when the catalog has no
    /// such item or the lookup failed
    async fn get_product_details(&self, no: &str) -> Option<ProductDetails>;
}

/// Catalog used when no ERP endpoint is configured; knows no items
pub struct EmptyCatalog;

#[async_trait]
impl ProductCatalog for EmptyCatalog {
    async fn get_product_details(&self, _no: &str) -> Option<ProductDetails> {
        None
    }
}

/// OData client for the items page, authenticated with HTTP basic auth
pub struct BusinessCentralClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl BusinessCentralClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        })
    }

    async fn fetch(&self, no: &str) -> Result<Option<ProductDetails>, reqwest::Error> {
        // OData string literals escape quotes by doubling them
        let filter = format!("No eq '{}'", no.replace('\'', "''"));

        let items: ODataItems = self
            .client
            .get(&self.base_url)
            .query(&[("$filter", filter.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(items.value.into_iter().next().map(ProductDetails::from))
    }
}

#[async_trait]
impl ProductCatalog for BusinessCentralClient {
    async fn get_product_details(&self, no: &str) -> Option<ProductDetails> {
        match self.fetch(no).await {
            Ok(Some(details)) => Some(details),
            Ok(None) => {
                debug!(no, "no catalog item");
                None
            }
            Err(e) => {
                error!(no, error = %e, "error fetching product details");
                None
            }
        }
    }
}
