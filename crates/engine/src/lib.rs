//! Docket Preview
//!
//! Multi-format file preview engine. A [`PreviewDispatcher`] takes an opaque
//! [`FileReference`], resolves it through a [`StorageBackend`], classifies it
//! and mounts the matching renderer session, emitting lifecycle events as it
//! goes.
//!
//! # Example
//!
//! ```no_run
//! use docket_preview::{FileReference, FsBackend, PreviewConfig, PreviewDispatcher};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let backend = Arc::new(FsBackend::new("/srv/case-files"));
//! let mut dispatcher = PreviewDispatcher::new(backend, PreviewConfig::default());
//! let mut events = dispatcher.subscribe();
//!
//! dispatcher.mount(FileReference::new("1042/exhibit-a.pdf", "Exhibit A.pdf")).await;
//! while let Ok(event) = events.try_recv() {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod renderer;
pub mod resolver;

pub use backend::{BackendError, FsBackend, SignedUrl, StorageBackend};
pub use config::{ConfigError, PreviewConfig};
pub use dispatcher::{DispatchState, LifecycleEvent, MountTicket, PreviewDispatcher};
pub use renderer::{
    DocumentSession, ImageSession, MediaSession, PagedView, RendererSession, TextPages, TextSession, FORM_FEED,
};
pub use resolver::{ResolveError, ResolveStrategy, ResolvedResource, ResourceResolver};

pub use docket_preview_core::{FileReference, PreviewError, RenderCategory};
