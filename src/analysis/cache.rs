//! # Analysis cache
//!
//! Process-wide memo of completed file analyses, keyed by request
//! [`Fingerprint`](crate::analysis::cache::Fingerprint).
//!
//! Entries are written once, on the first successful inspection, and never evicted. Failed
//! inspections and error responses are never stored, so a later identical request retries the
//! remote call.
//!
//! When single-flight is enabled, concurrent identical requests arriving before the first one
//! completes share its inspect call instead of issuing their own.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tracing::debug;

use crate::{
    analysis::report::{FileAnalysisReport, FileFormat},
    constants::FastMap,
    dataprod_errors::DataProdError,
    request::ProductRequest,
};

/// 32-bit string hash (`h = h * 33 ^ c`, seeded with 5381, characters read from the end).
pub fn hash_code(s: &str) -> u32 {
    let units: Vec<u16> = s.encode_utf16().collect();
    units
        .iter()
        .rev()
        .fold(5381u32, |hash, &c| hash.wrapping_mul(33) ^ u32::from(c))
}

/// Deterministic identity of a product request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    /// Fingerprint of a request signature, optionally extended with user supplied parameters.
    ///
    /// Arguments
    /// -----------------
    /// * `request`: The request, hashed through its signature (`Display` form).
    /// * `user_input`: Parameters typed by the user for a service descriptor, if any.
    ///
    /// Return
    /// ----------
    /// * The fingerprint.
    pub fn of(request: &ProductRequest, user_input: Option<&BTreeMap<String, String>>) -> Self {
        let mut signature = request.to_string();
        if let Some(input) = user_input {
            signature.push_str(&serde_json::to_string(input).unwrap_or_default());
        }
        Fingerprint(hash_code(&signature))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A completed inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub cache_handle: String,
    pub file_format: FileFormat,
    pub report: Arc<FileAnalysisReport>,
}

impl CachedAnalysis {
    /// Only usable reports are memoized.
    pub fn is_cacheable(&self) -> bool {
        self.report.parts.is_some() && !self.report.is_error_response()
    }
}

pub type InspectOutcome = Result<Arc<CachedAnalysis>, Arc<DataProdError>>;

type InFlight = Shared<BoxFuture<'static, InspectOutcome>>;

#[derive(Default)]
pub struct AnalysisCache {
    entries: Mutex<FastMap<Fingerprint, Arc<CachedAnalysis>>>,
    in_flight: Mutex<FastMap<Fingerprint, InFlight>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fp: Fingerprint) -> Option<Arc<CachedAnalysis>> {
        lock(&self.entries).get(&fp).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn store(&self, fp: Fingerprint, analysis: &Arc<CachedAnalysis>) {
        if analysis.is_cacheable() {
            lock(&self.entries)
                .entry(fp)
                .or_insert_with(|| analysis.clone());
        }
    }

    /// Return the cached analysis for `fp`, or run `inspect` and memoize its result.
    ///
    /// Arguments
    /// -----------------
    /// * `fp`: Fingerprint of the request.
    /// * `single_flight`: Share an outstanding inspection of the same fingerprint.
    /// * `inspect`: Produces the inspection future; only called on a miss.
    ///
    /// Return
    /// ----------
    /// * The analysis (cached or fresh), or the inspection error. Errors are never cached.
    pub async fn get_or_inspect<F, Fut>(
        &self,
        fp: Fingerprint,
        single_flight: bool,
        inspect: F,
    ) -> InspectOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedAnalysis, DataProdError>> + Send + 'static,
    {
        if let Some(hit) = self.get(fp) {
            debug!(fingerprint = %fp, "analysis cache hit");
            return Ok(hit);
        }

        if !single_flight {
            debug!(fingerprint = %fp, "analysis cache miss");
            let outcome = inspect().await.map(Arc::new).map_err(Arc::new);
            if let Ok(analysis) = &outcome {
                self.store(fp, analysis);
            }
            return outcome;
        }

        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&fp) {
                Some(existing) => {
                    debug!(fingerprint = %fp, "joining in-flight inspection");
                    existing.clone()
                }
                None => {
                    debug!(fingerprint = %fp, "analysis cache miss");
                    let fut: InFlight = inspect()
                        .map(|r| r.map(Arc::new).map_err(Arc::new))
                        .boxed()
                        .shared();
                    in_flight.insert(fp, fut.clone());
                    fut
                }
            }
        };

        let outcome = shared.clone().await;
        if let Ok(analysis) = &outcome {
            self.store(fp, analysis);
        }
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(&fp).is_some_and(|f| f.ptr_eq(&shared)) {
                in_flight.remove(&fp);
            }
        }
        outcome
    }
}

impl fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("entries", &self.len())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

#[cfg(test)]
mod cache_test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::analysis::report::{FilePart, PartType};

    fn analysis(parts: Option<Vec<FilePart>>) -> CachedAnalysis {
        CachedAnalysis {
            cache_handle: "${upload}/f.fits".into(),
            file_format: FileFormat::Fits,
            report: Arc::new(FileAnalysisReport {
                parts,
                ..Default::default()
            }),
        }
    }

    fn image_part() -> FilePart {
        FilePart {
            part_type: PartType::Image,
            naxis: vec![10, 10],
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_code() {
        assert_eq!(hash_code(""), 5381);
        // 5381 * 33 ^ 'a'
        assert_eq!(hash_code("a"), (5381u32 * 33) ^ 97);
        assert_ne!(hash_code("ab"), hash_code("ba"));
    }

    #[test]
    fn test_fingerprint_user_input() {
        let r = ProductRequest::from_url("https://x.org/a.fits");
        let mut input = BTreeMap::new();
        input.insert("BAND".to_string(), "g".to_string());
        assert_eq!(Fingerprint::of(&r, None), Fingerprint::of(&r.clone(), None));
        assert_ne!(Fingerprint::of(&r, None), Fingerprint::of(&r, Some(&input)));
    }

    #[tokio::test]
    async fn test_write_once_on_success() {
        let cache = AnalysisCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let out = cache
                .get_or_inspect(Fingerprint(1), true, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(analysis(Some(vec![image_part()])))
                })
                .await;
            assert!(out.is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cache = AnalysisCache::new();
        let out = cache
            .get_or_inspect(Fingerprint(2), false, || async {
                Err(DataProdError::InspectFailed("boom".into()))
            })
            .await;
        assert_eq!(
            out.unwrap_err().as_ref(),
            &DataProdError::InspectFailed("boom".into())
        );
        let out = cache
            .get_or_inspect(Fingerprint(3), false, || async { Ok(analysis(None)) })
            .await;
        assert!(out.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_single_flight_shares_inflight_call() {
        let cache = Arc::new(AnalysisCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = rx.shared();

        let make = |calls: Arc<AtomicUsize>, rx: Shared<tokio::sync::oneshot::Receiver<()>>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = rx.await;
                Ok(analysis(Some(vec![image_part()])))
            }
        };

        let c1 = cache.clone();
        let f1 = make(calls.clone(), rx.clone());
        let t1 = tokio::spawn(async move { c1.get_or_inspect(Fingerprint(9), true, f1).await });
        tokio::task::yield_now().await;
        let c2 = cache.clone();
        let f2 = make(calls.clone(), rx.clone());
        let t2 = tokio::spawn(async move { c2.get_or_inspect(Fingerprint(9), true, f2).await });
        tokio::task::yield_now().await;

        tx.send(()).unwrap();
        let (a, b) = (t1.await.unwrap().unwrap(), t2.await.unwrap().unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
