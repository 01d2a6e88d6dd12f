//! Preview dispatcher
//!
//! Single entry point for the embedding UI: mount a [`FileReference`], get
//! lifecycle events back, act on the mounted renderer.
//!
//! Mounting is split into [`PreviewDispatcher::begin_mount`] (synchronous
//! teardown of the previous file, generation bump, `loading` event),
//! [`MountTicket::resolve`] (the only suspension point) and
//! [`PreviewDispatcher::complete_mount`]. A ticket whose generation was
//! superseded while it resolved is discarded on completion.

use crate::backend::{SignedUrl, StorageBackend};
use crate::config::PreviewConfig;
use crate::renderer::RendererSession;
use crate::resolver::{ResolveError, ResolveStrategy, ResolvedResource, ResourceResolver};
use docket_preview_cache::LocalHandleRegistry;
use docket_preview_core::{ClassifyRequest, FileReference, PreviewError, RenderCategory};
use docket_preview_scheduler::{CancellationToken, Generation, GenerationCounter, RetryError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Leading bytes handed to content sniffing
const SNIFF_LEN: usize = 16;

/// Event emitted to the embedding UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Loading {
        generation: u64,
        name: String,
    },
    Ready {
        generation: u64,
        category: RenderCategory,
        source: String,
    },
    /// Terminal failure; the UI offers retry and download
    Error {
        generation: u64,
        kind: String,
        message: String,
        retryable: bool,
    },
    /// No renderer matches; the UI offers download only
    Unsupported {
        generation: u64,
        name: String,
    },
}

impl LifecycleEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LifecycleEvent::Loading { generation, .. }
            | LifecycleEvent::Ready { generation, .. }
            | LifecycleEvent::Error { generation, .. }
            | LifecycleEvent::Unsupported { generation, .. } => *generation,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LifecycleEvent::Error { .. })
    }
}

/// What the dispatcher is showing
#[derive(Debug, Default)]
pub enum DispatchState {
    #[default]
    Empty,
    Loading {
        file: FileReference,
    },
    Ready {
        file: FileReference,
        session: RendererSession,
    },
    Failed {
        file: FileReference,
        error: PreviewError,
    },
    Unsupported {
        file: FileReference,
    },
}

impl DispatchState {
    pub fn file(&self) -> Option<&FileReference> {
        match self {
            DispatchState::Empty => None,
            DispatchState::Loading { file }
            | DispatchState::Ready { file, .. }
            | DispatchState::Failed { file, .. }
            | DispatchState::Unsupported { file } => Some(file),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchState::Empty => "empty",
            DispatchState::Loading { .. } => "loading",
            DispatchState::Ready { .. } => "ready",
            DispatchState::Failed { .. } => "failed",
            DispatchState::Unsupported { .. } => "unsupported",
        }
    }
}

/// An in-flight mount
pub struct MountTicket {
    file: FileReference,
    generation: Generation,
    strategy: ResolveStrategy,
    resolver: Arc<ResourceResolver>,
}

impl MountTicket {
    pub fn file(&self) -> &FileReference {
        &self.file
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Resolve the ticket's file; may suspend
    ///
    /// A ticket superseded by a newer mount resolves to `Superseded` without
    /// touching the resolver slot, which belongs to the newer mount.
    pub async fn resolve(&self) -> Result<ResolvedResource, ResolveError> {
        self.resolver
            .resolve_for(&self.generation, &self.file, self.strategy)
            .await
    }
}

pub struct PreviewDispatcher {
    config: PreviewConfig,
    backend: Arc<dyn StorageBackend>,
    registry: Arc<LocalHandleRegistry>,
    resolver: Arc<ResourceResolver>,
    generation: GenerationCounter,
    state: DispatchState,
    events: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl PreviewDispatcher {
    pub fn new(backend: Arc<dyn StorageBackend>, config: PreviewConfig) -> Self {
        let registry = Arc::new(LocalHandleRegistry::with_limit_mb(config.handle_budget_mb));
        let resolver = Arc::new(ResourceResolver::from_config(backend.clone(), registry.clone(), &config));

        Self {
            config,
            backend,
            registry,
            resolver,
            generation: GenerationCounter::new(),
            state: DispatchState::Empty,
            events: None,
        }
    }

    /// Receive lifecycle events; replaces any earlier subscriber
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.events = Some(sender);
        receiver
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LocalHandleRegistry> {
        &self.registry
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    /// Mounted renderer, when ready
    pub fn session(&self) -> Option<&RendererSession> {
        match &self.state {
            DispatchState::Ready { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut RendererSession> {
        match &mut self.state {
            DispatchState::Ready { session, .. } => Some(session),
            _ => None,
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(event);
        }
    }

    /// Tear down the current file and start mounting `file`
    pub fn begin_mount(&mut self, file: FileReference) -> MountTicket {
        let generation = self.generation.advance();
        self.teardown();

        let preliminary = ClassifyRequest::for_file(&file).classify().category;
        let strategy = ResolveStrategy::for_category(preliminary);
        tracing::debug!(name = %file.name, ?preliminary, ?strategy, generation = generation.value(), "mounting");

        self.emit(LifecycleEvent::Loading {
            generation: generation.value(),
            name: file.name.clone(),
        });
        self.state = DispatchState::Loading { file: file.clone() };

        MountTicket {
            file,
            generation,
            strategy,
            resolver: self.resolver.clone(),
        }
    }

    /// Apply a resolution outcome; returns false if the ticket was stale
    pub fn complete_mount(&mut self, ticket: MountTicket, outcome: Result<ResolvedResource, ResolveError>) -> bool {
        let MountTicket { file, generation, .. } = ticket;
        if generation.is_stale() {
            tracing::debug!(name = %file.name, generation = generation.value(), "discarding stale mount");
            return false;
        }

        let resource = match outcome {
            Ok(resource) => resource,
            // The slot was taken over outside this mount; surface it so the UI can retry
            Err(ResolveError::Superseded) => {
                let error = PreviewError::NetworkFailure("resolution was interrupted".to_string());
                self.fail(file, &generation, error);
                return true;
            }
            Err(ResolveError::Preview(error)) => {
                self.fail(file, &generation, error);
                return true;
            }
        };

        let prefix = resource
            .local_handle()
            .and_then(|handle| self.registry.bytes(handle))
            .map(|bytes| bytes[..bytes.len().min(SNIFF_LEN)].to_vec());
        let classification = ClassifyRequest::for_file(&file)
            .url(match &resource {
                ResolvedResource::SignedUrl(signed) => Some(signed.url.as_str()),
                ResolvedResource::Local(_) => None,
            })
            .sniffed(prefix.as_deref())
            .classify();
        let category = classification.category;

        if category == RenderCategory::Unsupported {
            self.resolver.release();
            tracing::info!(name = %file.name, "no renderer for file");
            self.emit(LifecycleEvent::Unsupported {
                generation: generation.value(),
                name: file.name.clone(),
            });
            self.state = DispatchState::Unsupported { file };
            return true;
        }

        match RendererSession::open(category, &file, &resource, &self.registry, &self.config, generation.clone()) {
            Ok(session) => {
                tracing::info!(name = %file.name, category = %category, stage = ?classification.stage, "renderer mounted");
                self.emit(LifecycleEvent::Ready {
                    generation: generation.value(),
                    category,
                    source: resource.source(),
                });
                self.state = DispatchState::Ready { file, session };
            }
            Err(error) => {
                self.resolver.release();
                self.fail(file, &generation, error);
            }
        }
        true
    }

    fn fail(&mut self, file: FileReference, generation: &Generation, error: PreviewError) {
        tracing::error!(name = %file.name, kind = error.kind(), "preview failed: {}", error);
        self.emit(LifecycleEvent::Error {
            generation: generation.value(),
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        });
        self.state = DispatchState::Failed { file, error };
    }

    /// Mount `file` and wait for it to settle
    pub async fn mount(&mut self, file: FileReference) -> &DispatchState {
        let ticket = self.begin_mount(file);
        let outcome = ticket.resolve().await;
        self.complete_mount(ticket, outcome);
        &self.state
    }

    /// Re-run resolution from scratch for the current file
    ///
    /// Returns `None` when nothing is mounted.
    pub async fn retry(&mut self) -> Option<&DispatchState> {
        let file = self.state.file()?.clone();
        tracing::info!(name = %file.name, "retrying preview");
        Some(self.mount(file).await)
    }

    /// Fresh signed URL for downloading the current file as-is
    ///
    /// Works in every state, including failed and unsupported. `Ok(None)`
    /// when nothing is mounted.
    pub async fn download_link(&self) -> Result<Option<SignedUrl>, PreviewError> {
        let Some(file) = self.state.file() else {
            return Ok(None);
        };

        let token = CancellationToken::new();
        let backend = self.backend.as_ref();
        let path = file.path.as_str();
        let ttl = self.config.signed_url_ttl();
        self.config
            .retry_policy()
            .run(&token, move |_attempt| async move { backend.resolve_storage_url(path, ttl).await })
            .await
            .map(Some)
            .map_err(|error| match error {
                RetryError::Failed(error) => PreviewError::from(error),
                RetryError::Cancelled => PreviewError::Timeout,
            })
    }

    /// Release everything held for the current file and invalidate it
    pub fn unmount(&mut self) {
        self.generation.advance();
        self.teardown();
        self.state = DispatchState::Empty;
    }

    fn teardown(&mut self) {
        if let DispatchState::Ready { session, .. } = &mut self.state {
            session.teardown();
        }
        self.resolver.supersede();
    }
}

impl Drop for PreviewDispatcher {
    fn drop(&mut self) {
        self.teardown();
    }
}
