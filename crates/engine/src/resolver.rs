//! Resource resolution
//!
//! Turns a [`FileReference`] into something a renderer can load: a signed URL
//! for documents embedded by the document engine, or a local memory-backed
//! handle for everything consumed through player and image elements.
//!
//! The resolver owns one logical slot. A new resolution supersedes the
//! previous one: the older request is cancelled, any handle it already holds
//! is released, and its late completion is discarded by generation check.
//! Handle release happens under the slot lock, so a completion racing with a
//! supersede releases its handle exactly once.

use crate::backend::{SignedUrl, StorageBackend};
use crate::config::PreviewConfig;
use docket_preview_cache::{LocalHandle, LocalHandleRegistry};
use docket_preview_core::{FileReference, PreviewError, RenderCategory};
use docket_preview_scheduler::{CancellationToken, Generation, GenerationCounter, RetryError, RetryPolicy};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A loadable resource; exactly one is held per open file
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedResource {
    /// Remote, time-limited address
    SignedUrl(SignedUrl),
    /// Locally owned bytes, released by the resolver
    Local(LocalHandle),
}

impl ResolvedResource {
    /// Address a rendering element loads from
    pub fn source(&self) -> String {
        match self {
            ResolvedResource::SignedUrl(signed) => signed.url.clone(),
            ResolvedResource::Local(handle) => handle.address(),
        }
    }

    pub fn local_handle(&self) -> Option<&LocalHandle> {
        match self {
            ResolvedResource::Local(handle) => Some(handle),
            ResolvedResource::SignedUrl(_) => None,
        }
    }
}

/// How a file is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Ask the backend for a signed URL
    SignedUrl,
    /// Fetch bytes and wrap them in a local handle
    LocalBytes,
}

impl ResolveStrategy {
    /// Documents are embedded by address; everything else is fetched so
    /// players can read it without cross-origin restrictions. Unclassified
    /// files are fetched too, so their leading bytes can be sniffed.
    pub fn for_category(category: RenderCategory) -> Self {
        match category {
            RenderCategory::Document => ResolveStrategy::SignedUrl,
            _ => ResolveStrategy::LocalBytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Preview(#[from] PreviewError),

    /// A newer request took the slot; the result was discarded
    #[error("resolution superseded by a newer request")]
    Superseded,
}

enum Payload {
    Url(SignedUrl),
    Bytes(Vec<u8>),
}

#[derive(Default)]
struct Slot {
    token: Option<CancellationToken>,
    held: Option<LocalHandle>,
    current: Option<ResolvedResource>,
}

/// Single-slot resolver with supersession
pub struct ResourceResolver {
    backend: Arc<dyn StorageBackend>,
    registry: Arc<LocalHandleRegistry>,
    policy: RetryPolicy,
    url_ttl: Duration,
    generation: GenerationCounter,
    slot: Mutex<Slot>,
}

impl ResourceResolver {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        registry: Arc<LocalHandleRegistry>,
        policy: RetryPolicy,
        url_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            policy,
            url_ttl,
            generation: GenerationCounter::new(),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn from_config(
        backend: Arc<dyn StorageBackend>,
        registry: Arc<LocalHandleRegistry>,
        config: &PreviewConfig,
    ) -> Self {
        Self::new(backend, registry, config.retry_policy(), config.signed_url_ttl())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<LocalHandleRegistry> {
        &self.registry
    }

    /// Generation of the most recent request
    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    /// Resource held by the slot, if the latest request succeeded
    pub fn current(&self) -> Option<ResolvedResource> {
        self.lock().current.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel in-flight work, release any held handle and invalidate the
    /// slot. Returns whether a handle was released.
    pub fn supersede(&self) -> bool {
        let mut slot = self.lock();
        self.generation.advance();
        self.clear_slot(&mut slot)
    }

    /// Teardown; identical to [`Self::supersede`]
    pub fn release(&self) -> bool {
        self.supersede()
    }

    fn clear_slot(&self, slot: &mut Slot) -> bool {
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        slot.current = None;
        match slot.held.take() {
            Some(handle) => {
                self.release_handle(&handle);
                true
            }
            None => false,
        }
    }

    fn release_handle(&self, handle: &LocalHandle) {
        if let Err(error) = self.registry.release(handle) {
            tracing::error!(%error, "failed to release local handle");
        }
    }

    /// Resolve `file`, superseding any earlier request on this slot
    pub async fn resolve(&self, file: &FileReference, strategy: ResolveStrategy) -> Result<ResolvedResource, ResolveError> {
        self.resolve_inner(file, strategy, None).await
    }

    /// Resolve `file` on behalf of a caller whose own request is tagged by
    /// `owner`
    ///
    /// If `owner` is stale when the request starts or settles, the slot is
    /// left untouched and `Superseded` is returned. A late caller can
    /// therefore never release the resource of a newer request.
    pub async fn resolve_for(
        &self,
        owner: &Generation,
        file: &FileReference,
        strategy: ResolveStrategy,
    ) -> Result<ResolvedResource, ResolveError> {
        self.resolve_inner(file, strategy, Some(owner)).await
    }

    async fn resolve_inner(
        &self,
        file: &FileReference,
        strategy: ResolveStrategy,
        owner: Option<&Generation>,
    ) -> Result<ResolvedResource, ResolveError> {
        let (generation, token) = {
            let mut slot = self.lock();
            if owner.is_some_and(Generation::is_stale) {
                tracing::debug!(path = %file.path, "refusing to resolve for a superseded owner");
                return Err(ResolveError::Superseded);
            }
            let generation = self.generation.advance();
            self.clear_slot(&mut slot);
            let token = CancellationToken::new();
            slot.token = Some(token.clone());
            (generation, token)
        };
        let guard = Guard { generation, owner };

        tracing::debug!(path = %file.path, ?strategy, generation = guard.generation.value(), "resolving");

        let backend = self.backend.as_ref();
        let path = file.path.as_str();
        let ttl = self.url_ttl;
        let outcome = self
            .policy
            .run(&token, move |_attempt| async move {
                match strategy {
                    ResolveStrategy::SignedUrl => backend.resolve_storage_url(path, ttl).await.map(Payload::Url),
                    ResolveStrategy::LocalBytes => backend.fetch_bytes(path).await.map(Payload::Bytes),
                }
            })
            .await;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(RetryError::Cancelled) => {
                tracing::debug!(path = %file.path, "resolution cancelled");
                return Err(ResolveError::Superseded);
            }
            Err(RetryError::Failed(error)) => return Err(self.fail(&guard, file, PreviewError::from(error))),
        };

        let resource = match payload {
            Payload::Url(signed) => ResolvedResource::SignedUrl(signed),
            Payload::Bytes(bytes) => match self.registry.create(bytes) {
                Ok(handle) => ResolvedResource::Local(handle),
                Err(error) => {
                    tracing::error!(path = %file.path, %error, "could not hold file bytes");
                    return Err(self.fail(&guard, file, PreviewError::DecodeFailure(error.to_string())));
                }
            },
        };

        self.commit(&guard, file, resource)
    }

    fn commit(&self, guard: &Guard<'_>, file: &FileReference, resource: ResolvedResource) -> Result<ResolvedResource, ResolveError> {
        let mut slot = self.lock();

        if guard.is_stale() {
            tracing::warn!(path = %file.path, "discarding superseded resolution");
            if let Some(handle) = resource.local_handle() {
                self.release_handle(handle);
            }
            return Err(ResolveError::Superseded);
        }

        slot.token = None;
        slot.held = resource.local_handle().cloned();
        slot.current = Some(resource.clone());
        tracing::info!(path = %file.path, source = %resource.source(), "resolved");
        Ok(resource)
    }

    fn fail(&self, guard: &Guard<'_>, file: &FileReference, error: PreviewError) -> ResolveError {
        let mut slot = self.lock();
        if guard.is_stale() {
            return ResolveError::Superseded;
        }
        slot.token = None;
        tracing::error!(path = %file.path, kind = error.kind(), "resolution failed: {}", error);
        ResolveError::Preview(error)
    }
}

/// Tags a running request: the slot generation plus the caller's own
struct Guard<'a> {
    generation: Generation,
    owner: Option<&'a Generation>,
}

impl Guard<'_> {
    fn is_stale(&self) -> bool {
        self.generation.is_stale() || self.owner.is_some_and(Generation::is_stale)
    }
}

impl Drop for ResourceResolver {
    fn drop(&mut self) {
        self.supersede();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::BackendError;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted backend: per-path content, delays and queued failures
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        files: Mutex<HashMap<String, Vec<u8>>>,
        delays: Mutex<HashMap<String, Duration>>,
        failures: Mutex<HashMap<String, VecDeque<BackendError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        pub(crate) fn with_file(self, path: &str, bytes: &[u8]) -> Self {
            self.files.lock().unwrap().insert(path.to_string(), bytes.to_vec());
            self
        }

        pub(crate) fn with_delay(self, path: &str, delay: Duration) -> Self {
            self.delays.lock().unwrap().insert(path.to_string(), delay);
            self
        }

        pub(crate) fn with_failures(self, path: &str, failures: Vec<BackendError>) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(path.to_string(), failures.into_iter().collect());
            self
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        async fn settle(&self, path: &str) -> Result<Vec<u8>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().unwrap().get(path).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self
                .failures
                .lock()
                .unwrap()
                .get_mut(path)
                .and_then(|queue| queue.pop_front());
            if let Some(error) = failure {
                return Err(error);
            }
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(path.to_string()))
        }
    }

    #[async_trait]
    impl StorageBackend for ScriptedBackend {
        async fn resolve_storage_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, BackendError> {
            self.settle(path).await?;
            Ok(SignedUrl::new(format!("https://files.example/{path}"), chrono::Utc::now(), ttl))
        }

        async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, BackendError> {
            self.settle(path).await
        }
    }

    fn resolver(backend: Arc<ScriptedBackend>) -> ResourceResolver {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_timeout(Duration::from_secs(5));
        ResourceResolver::new(
            backend,
            Arc::new(LocalHandleRegistry::with_limit_mb(16)),
            policy,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_strategy_by_category() {
        assert_eq!(ResolveStrategy::for_category(RenderCategory::Document), ResolveStrategy::SignedUrl);
        assert_eq!(ResolveStrategy::for_category(RenderCategory::Video), ResolveStrategy::LocalBytes);
        assert_eq!(ResolveStrategy::for_category(RenderCategory::PlainText), ResolveStrategy::LocalBytes);
        assert_eq!(ResolveStrategy::for_category(RenderCategory::Unsupported), ResolveStrategy::LocalBytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_resolves_to_signed_url() {
        let backend = Arc::new(ScriptedBackend::default().with_file("a.pdf", b"%PDF-1.7"));
        let resolver = resolver(backend);

        let resource = resolver
            .resolve(&FileReference::new("a.pdf", "a.pdf"), ResolveStrategy::SignedUrl)
            .await
            .unwrap();

        assert!(matches!(resource, ResolvedResource::SignedUrl(_)));
        assert_eq!(resource.source(), "https://files.example/a.pdf");
        assert_eq!(resolver.registry().stats().live, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_resolves_to_local_handle() {
        let backend = Arc::new(ScriptedBackend::default().with_file("clip.mp4", b"media"));
        let resolver = resolver(backend);

        let resource = resolver
            .resolve(&FileReference::new("clip.mp4", "clip.mp4"), ResolveStrategy::LocalBytes)
            .await
            .unwrap();

        let handle = resource.local_handle().unwrap();
        assert!(resource.source().starts_with("blob:docket-preview/"));
        assert!(resolver.registry().is_live(handle));
        assert_eq!(resolver.current(), Some(resource.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_are_retried() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.png", b"png")
                .with_failures("a.png", vec![BackendError::Network("reset".into())]),
        );
        let resolver = resolver(backend.clone());

        let resource = resolver
            .resolve(&FileReference::new("a.png", "a.png"), ResolveStrategy::LocalBytes)
            .await;

        assert!(resource.is_ok());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_surface_terminal_failure() {
        let failures = vec![BackendError::Timeout; 3];
        let backend = Arc::new(ScriptedBackend::default().with_failures("a.png", failures));
        let resolver = resolver(backend.clone());

        let err = resolver
            .resolve(&FileReference::new("a.png", "a.png"), ResolveStrategy::LocalBytes)
            .await
            .unwrap_err();

        assert_eq!(err, ResolveError::Preview(PreviewError::Timeout));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver(backend.clone());

        let err = resolver
            .resolve(&FileReference::new("gone.pdf", "gone.pdf"), ResolveStrategy::SignedUrl)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResolveError::Preview(PreviewError::NotFound { path: "gone.pdf".into() })
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_request_wins_and_older_handle_is_released() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.mp3", b"older")
                .with_delay("a.mp3", Duration::from_secs(5))
                .with_file("b.mp3", b"newer"),
        );
        let resolver = resolver(backend);

        let file_a = FileReference::new("a.mp3", "a.mp3");
        let file_b = FileReference::new("b.mp3", "b.mp3");

        let (a, b) = tokio::join!(resolver.resolve(&file_a, ResolveStrategy::LocalBytes), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(&file_b, ResolveStrategy::LocalBytes).await
        });

        assert_eq!(a.unwrap_err(), ResolveError::Superseded);
        let b = b.unwrap();
        assert_eq!(resolver.current(), Some(b.clone()));

        let stats = resolver.registry().stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.rejected_releases, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_handle_released_when_superseded() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.wav", b"first")
                .with_file("b.wav", b"second"),
        );
        let resolver = resolver(backend);

        let first = resolver
            .resolve(&FileReference::new("a.wav", "a.wav"), ResolveStrategy::LocalBytes)
            .await
            .unwrap();
        resolver
            .resolve(&FileReference::new("b.wav", "b.wav"), ResolveStrategy::LocalBytes)
            .await
            .unwrap();

        assert!(!resolver.registry().is_live(first.local_handle().unwrap()));
        let stats = resolver.registry().stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_exactly_once() {
        let backend = Arc::new(ScriptedBackend::default().with_file("a.ogg", b"ogg"));
        let resolver = resolver(backend);

        resolver
            .resolve(&FileReference::new("a.ogg", "a.ogg"), ResolveStrategy::LocalBytes)
            .await
            .unwrap();

        assert!(resolver.release());
        assert!(!resolver.release());

        let stats = resolver.registry().stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.rejected_releases, 0);
        assert_eq!(resolver.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exceeded_is_decode_failure() {
        let backend = Arc::new(ScriptedBackend::default().with_file("huge.mp4", &vec![0u8; 2 * 1024 * 1024]));
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let resolver = ResourceResolver::new(
            backend,
            Arc::new(LocalHandleRegistry::with_limit_mb(1)),
            policy,
            Duration::from_secs(60),
        );

        let err = resolver
            .resolve(&FileReference::new("huge.mp4", "huge.mp4"), ResolveStrategy::LocalBytes)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Preview(PreviewError::DecodeFailure(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_during_retry_delay() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.png", b"png")
                .with_failures("a.png", vec![BackendError::Network("reset".into())]),
        );
        let resolver = resolver(backend.clone());
        let file = FileReference::new("a.png", "a.png");

        let (result, released) = tokio::join!(resolver.resolve(&file, ResolveStrategy::LocalBytes), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            resolver.supersede()
        });

        assert_eq!(result.unwrap_err(), ResolveError::Superseded);
        assert!(!released);
        assert_eq!(backend.calls(), 1);
        assert_eq!(resolver.registry().stats().created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_owner_leaves_slot_untouched() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.ogg", b"first")
                .with_file("b.ogg", b"second"),
        );
        let resolver = resolver(backend.clone());
        let owners = GenerationCounter::new();

        let owner_a = owners.advance();
        let owner_b = owners.advance();
        let b = resolver
            .resolve_for(&owner_b, &FileReference::new("b.ogg", "b.ogg"), ResolveStrategy::LocalBytes)
            .await
            .unwrap();

        let late = resolver
            .resolve_for(&owner_a, &FileReference::new("a.ogg", "a.ogg"), ResolveStrategy::LocalBytes)
            .await;

        assert_eq!(late.unwrap_err(), ResolveError::Superseded);
        assert_eq!(resolver.current(), Some(b.clone()));
        assert!(resolver.registry().is_live(b.local_handle().unwrap()));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_superseded_mid_flight_discards_result() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .with_file("a.ogg", b"first")
                .with_delay("a.ogg", Duration::from_secs(1)),
        );
        let resolver = resolver(backend);
        let owners = GenerationCounter::new();
        let owner = owners.advance();

        let reference = FileReference::new("a.ogg", "a.ogg");
        let (result, ()) = tokio::join!(
            resolver.resolve_for(&owner, &reference, ResolveStrategy::LocalBytes),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                owners.advance();
            }
        );

        assert_eq!(result.unwrap_err(), ResolveError::Superseded);
        assert_eq!(resolver.current(), None);
        let stats = resolver.registry().stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.released, 1);
    }
}
