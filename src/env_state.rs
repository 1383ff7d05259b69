//! # Data product environment state
//!
//! This module defines [`crate::env_state::DataProdEnv`], the **collaborator bundle** used by the
//! resolution engine. It provides access to:
//!
//! - The remote **inspect service** classifying product files.
//! - The **datalink fetcher** retrieving indirection tables.
//! - The **row access policy** gating every network call.
//!
//! The object is cheaply cloneable (every collaborator sits behind an `Arc`) and is owned by the
//! [`DataProd`](crate::dataprod::DataProd) context.
//!
//! ## Structure
//!
//! ```text
//! DataProdEnv
//! ├── inspect     (Arc<dyn InspectService>)
//! ├── datalink    (Arc<dyn DatalinkFetcher>)
//! └── row_access  (Arc<dyn RowAccess>)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dataprod::env_state::DataProdEnv;
//!
//! // HTTP collaborators (feature `http`)
//! let env = DataProdEnv::http("https://archive.org/inspect", std::time::Duration::from_secs(30))?;
//! ```
//!
//! ## See also
//!
//! - [`InspectService`](crate::services::InspectService), [`DatalinkFetcher`](crate::services::DatalinkFetcher),
//!   [`RowAccess`](crate::services::RowAccess) – the collaborator traits.

use std::{fmt, sync::Arc};

use crate::services::{DatalinkFetcher, InspectService, ProprietaryMetaAccess, RowAccess};

#[derive(Clone)]
pub struct DataProdEnv {
    pub inspect: Arc<dyn InspectService>,
    pub datalink: Arc<dyn DatalinkFetcher>,
    pub row_access: Arc<dyn RowAccess>,
}

impl DataProdEnv {
    /// Build an environment with the default proprietary-metadata access policy.
    ///
    /// Arguments
    /// -----------------
    /// * `inspect`: Remote inspect collaborator.
    /// * `datalink`: Datalink table fetcher.
    ///
    /// Return
    /// ----------
    /// * A new [`DataProdEnv`].
    pub fn new(inspect: Arc<dyn InspectService>, datalink: Arc<dyn DatalinkFetcher>) -> Self {
        DataProdEnv {
            inspect,
            datalink,
            row_access: Arc::new(ProprietaryMetaAccess),
        }
    }

    pub fn with_row_access(mut self, row_access: Arc<dyn RowAccess>) -> Self {
        self.row_access = row_access;
        self
    }

    /// Environment talking to a remote inspect endpoint and fetching datalink tables over HTTP.
    #[cfg(feature = "http")]
    pub fn http(
        inspect_endpoint: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, crate::dataprod_errors::DataProdError> {
        use crate::services::{HttpDatalinkFetcher, HttpInspectService};
        Ok(DataProdEnv::new(
            Arc::new(HttpInspectService::new(inspect_endpoint, timeout)?),
            Arc::new(HttpDatalinkFetcher::new(timeout)?),
        ))
    }
}

impl fmt::Debug for DataProdEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProdEnv").finish_non_exhaustive()
    }
}
