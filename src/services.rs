//! # External collaborators
//!
//! The engine reaches the outside world through three seams:
//!
//! - [`InspectService`](crate::services::InspectService) – remote upload/inspect of a product,
//!   answering with a cache handle, a file format and a JSON analysis report.
//! - [`DatalinkFetcher`](crate::services::DatalinkFetcher) – retrieval of a datalink table.
//! - [`RowAccess`](crate::services::RowAccess) – proprietary data policy, consulted before any
//!   network call.
//!
//! With the `http` feature, [`HttpInspectService`] and [`HttpDatalinkFetcher`] implement the two
//! remote seams on top of `reqwest`.
//!
//! ## See also
//! ------------
//! * [`DataProdEnv`](crate::env_state::DataProdEnv) – Holds one instance of each collaborator.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    analysis::report::InspectResponse,
    dataprod_errors::DataProdError,
    request::ProductRequest,
    table::{row_access::has_row_access, TableModel},
};

#[async_trait]
pub trait InspectService: Send + Sync {
    /// Upload (or fetch server side) and analyze one product.
    ///
    /// Arguments
    /// -----------------
    /// * `request`: The product request; its signature identifies the product.
    /// * `analyzer_params`: `analyzerId` and analyzer parameters taken from the source table.
    async fn inspect(
        &self,
        request: &ProductRequest,
        analyzer_params: &BTreeMap<String, String>,
    ) -> Result<InspectResponse, DataProdError>;
}

#[async_trait]
pub trait DatalinkFetcher: Send + Sync {
    /// Fetch and parse the datalink table at `url`, naming it `tbl_id`.
    async fn fetch_datalink(&self, url: &str, tbl_id: &str) -> Result<TableModel, DataProdError>;
}

pub trait RowAccess: Send + Sync {
    fn has_row_access(&self, table: &TableModel, row: usize) -> bool;
}

/// Default access policy reading the `datarights_col` / `release_date_col` metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProprietaryMetaAccess;

impl RowAccess for ProprietaryMetaAccess {
    fn has_row_access(&self, table: &TableModel, row: usize) -> bool {
        has_row_access(table, row)
    }
}

#[cfg(feature = "http")]
pub use http::{HttpDatalinkFetcher, HttpInspectService};

#[cfg(feature = "http")]
mod http {
    use std::{collections::BTreeMap, time::Duration};

    use async_trait::async_trait;
    use reqwest::Client;
    use serde::Serialize;
    use tracing::debug;
    use url::Url;

    use super::{DatalinkFetcher, InspectService};
    use crate::{
        analysis::report::InspectResponse,
        dataprod_errors::DataProdError,
        request::ProductRequest,
        table::{votable::parse_votable, TableModel},
    };

    fn client(timeout: Duration) -> Result<Client, DataProdError> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct InspectBody<'a> {
        request: &'a ProductRequest,
        signature: String,
        report_type: &'static str,
        #[serde(flatten)]
        analyzer_params: &'a BTreeMap<String, String>,
    }

    /// Inspect service reached with a JSON `POST`.
    #[derive(Debug, Clone)]
    pub struct HttpInspectService {
        client: Client,
        endpoint: Url,
    }

    impl HttpInspectService {
        pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DataProdError> {
            Ok(HttpInspectService {
                client: client(timeout)?,
                endpoint: Url::parse(endpoint)?,
            })
        }
    }

    #[async_trait]
    impl InspectService for HttpInspectService {
        async fn inspect(
            &self,
            request: &ProductRequest,
            analyzer_params: &BTreeMap<String, String>,
        ) -> Result<InspectResponse, DataProdError> {
            debug!(endpoint = %self.endpoint, request = %request, "inspect call");
            let body = InspectBody {
                request,
                signature: request.to_string(),
                report_type: "Details",
                analyzer_params,
            };
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(DataProdError::InspectFailed(format!("{status}: {text}")));
            }
            Ok(response.json::<InspectResponse>().await?)
        }
    }

    /// Datalink fetcher reading `TABLEDATA` VOTables over `GET`.
    #[derive(Debug, Clone)]
    pub struct HttpDatalinkFetcher {
        client: Client,
    }

    impl HttpDatalinkFetcher {
        pub fn new(timeout: Duration) -> Result<Self, DataProdError> {
            Ok(HttpDatalinkFetcher {
                client: client(timeout)?,
            })
        }
    }

    #[async_trait]
    impl DatalinkFetcher for HttpDatalinkFetcher {
        async fn fetch_datalink(&self, url: &str, tbl_id: &str) -> Result<TableModel, DataProdError> {
            debug!(url, "datalink fetch");
            let response = self.client.get(Url::parse(url)?).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DataProdError::DatalinkFetchFailed {
                    url: url.to_string(),
                    reason: format!("status {status}"),
                });
            }
            let xml = response.text().await?;
            parse_votable(tbl_id, &xml)
        }
    }
}

#[cfg(test)]
mod services_test {
    use super::*;

    #[test]
    fn test_default_access_policy() {
        let open = TableModel::new("t", &["a"], vec![vec!["1".into()]]);
        assert!(ProprietaryMetaAccess.has_row_access(&open, 0));

        let closed = TableModel::new("t", &["a", "rights"], vec![vec!["1".into(), "private".into()]])
            .with_meta("datarights_col", "rights");
        assert!(!ProprietaryMetaAccess.has_row_access(&closed, 0));
    }
}
