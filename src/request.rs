//! # Product requests
//!
//! A [`ProductRequest`](crate::request::ProductRequest) identifies one retrievable product: a URL
//! or a server-side file, plus display attributes (title, plot id) and free-form parameters.
//!
//! Its [`Display`](std::fmt::Display) form is the request *signature*: a deterministic string in
//! which parameters appear in key order. Fingerprints used by the analysis cache are computed
//! from this signature, so two requests with the same fields always share a cache slot.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dataprod_errors::DataProdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestType {
    #[default]
    Url,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductRequest {
    pub request_type: RequestType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub plot_id: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ProductRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        ProductRequest {
            request_type: RequestType::Url,
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_file(file_name: impl Into<String>) -> Self {
        ProductRequest {
            request_type: RequestType::File,
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_plot_id(mut self, plot_id: impl Into<String>) -> Self {
        self.plot_id = Some(plot_id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// URL or file name, whichever locates the product.
    pub fn source(&self) -> Option<&str> {
        match self.request_type {
            RequestType::Url => self.url.as_deref().or(self.file_name.as_deref()),
            RequestType::File => self.file_name.as_deref().or(self.url.as_deref()),
        }
    }

    /// Copy of this request pointing at a server-side file (e.g. an analysis cache handle).
    pub fn to_file_request(&self, file_name: &str) -> Self {
        ProductRequest {
            request_type: RequestType::File,
            file_name: Some(file_name.to_string()),
            ..self.clone()
        }
    }

    /// Lower-cased extension of the URL path, without the query string.
    ///
    /// Return
    /// ----------
    /// * `None` when the request has no URL or the last path segment has no extension.
    pub fn url_extension(&self) -> Option<String> {
        let raw = self.url.as_deref()?;
        let path = match Url::parse(raw) {
            Ok(u) => u.path().to_string(),
            Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
        };
        let last = path.rsplit('/').next().unwrap_or_default();
        let dot = last.rfind('.')?;
        (dot > 0 && dot < last.len() - 1).then(|| last[dot + 1..].to_lowercase())
    }

    /// Last path segment of the source, used in download labels.
    pub fn display_file_name(&self) -> String {
        let source = self.source().unwrap_or_default();
        let path = Url::parse(source)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| source.to_string());
        path.rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(source)
            .to_string()
    }

    /// Copy of this request with query parameters appended to its URL.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: `(name, value)` pairs, appended in order; duplicate names are kept.
    ///
    /// Return
    /// ----------
    /// * The new request, or [`DataProdError::MissingSource`] if the request has no URL, or
    ///   [`DataProdError::InvalidUrl`] if the URL cannot be parsed.
    pub fn with_query_params(&self, params: &[(String, String)]) -> Result<Self, DataProdError> {
        let raw = self.url.as_deref().ok_or(DataProdError::MissingSource)?;
        let mut url = Url::parse(raw)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(ProductRequest {
            url: Some(url.to_string()),
            ..self.clone()
        })
    }
}

impl fmt::Display for ProductRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.request_type {
            RequestType::Url => "URL",
            RequestType::File => "FILE",
        };
        write!(f, "Type={kind}")?;
        if let Some(u) = &self.url {
            write!(f, "&URL={u}")?;
        }
        if let Some(file) = &self.file_name {
            write!(f, "&File={file}")?;
        }
        if let Some(t) = &self.title {
            write!(f, "&Title={t}")?;
        }
        if let Some(p) = &self.plot_id {
            write!(f, "&PlotId={p}")?;
        }
        for (k, v) in &self.params {
            write!(f, "&{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod request_test {
    use super::*;

    #[test]
    fn test_signature_is_key_ordered() {
        let a = ProductRequest::from_url("https://x.org/a.fits")
            .with_param("b", "2")
            .with_param("a", "1");
        let b = ProductRequest::from_url("https://x.org/a.fits")
            .with_param("a", "1")
            .with_param("b", "2");
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "Type=URL&URL=https://x.org/a.fits&a=1&b=2");
    }

    #[test]
    fn test_url_extension() {
        let r = ProductRequest::from_url("https://x.org/data/img.PNG?size=3");
        assert_eq!(r.url_extension().as_deref(), Some("png"));
        let r = ProductRequest::from_url("https://x.org/data/");
        assert_eq!(r.url_extension(), None);
        let r = ProductRequest::from_url("https://x.org/archive.tar.gz");
        assert_eq!(r.url_extension().as_deref(), Some("gz"));
        assert_eq!(ProductRequest::from_file("/tmp/x.fits").url_extension(), None);
    }

    #[test]
    fn test_with_query_params() {
        let r = ProductRequest::from_url("https://x.org/soda?ID=1");
        let r2 = r
            .with_query_params(&[("CIRCLE".into(), "10 20 0.1".into())])
            .unwrap();
        assert_eq!(
            r2.url(),
            Some("https://x.org/soda?ID=1&CIRCLE=10+20+0.1")
        );
        assert_eq!(
            ProductRequest::from_file("f").with_query_params(&[]),
            Err(DataProdError::MissingSource)
        );
    }

    #[test]
    fn test_display_file_name() {
        let r = ProductRequest::from_url("https://x.org/data/img.fits?x=1");
        assert_eq!(r.display_file_name(), "img.fits");
    }
}
