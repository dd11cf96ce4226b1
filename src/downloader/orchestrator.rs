// Engine - session-aware facade over catalog building, selection and
// acquisition
//
// Inbound operations are keyed by identity. The session store lock is only
// taken for short synchronous updates; catalog builds and downloads run
// outside it and report back with the generation they started under, so a
// cancel (or a new URL) in the meantime turns their result into
// `SessionExpired`.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::catalog::CatalogBuilder;
use super::config::EngineConfig;
use super::errors::{EngineError, SelectionError};
use super::executor::AcquisitionExecutor;
use super::extractors::ExtractionCapability;
use super::models::{AcquisitionTarget, DownloadResult};
use super::selection::{self, categories_view, MenuAction, MenuSettings, MenuView};
use super::session::{Completion, Identity, SessionStore};
use super::utils::safe_diagnostic;

/// Result of a menu token
#[derive(Debug)]
pub enum MenuOutcome {
    /// Navigation step; show the view
    View(MenuView),
    /// Acquisition finished; the session is gone
    Delivered {
        target: AcquisitionTarget,
        result: DownloadResult,
    },
    /// Session destroyed on request
    Cancelled,
}

fn log_failure(identity: Identity, operation: &str, error: &EngineError) {
    if error.is_caller_error() {
        debug!(%identity, operation, %error, "rejected");
    } else {
        warn!(%identity, operation, %error, "failed");
    }
}

pub struct Engine {
    sessions: SessionStore,
    catalogs: CatalogBuilder,
    executor: AcquisitionExecutor,
    menu: MenuSettings,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(capability: Arc<dyn ExtractionCapability>, config: EngineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            sessions: SessionStore::new(),
            catalogs: CatalogBuilder::new(capability.clone(), config.clone()),
            executor: AcquisitionExecutor::new(capability, config.clone()),
            menu: MenuSettings {
                page_size: config.page_size,
                merge_container: config.merge_container.clone(),
            },
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a negotiation for `url`, replacing any session `identity` had.
    /// Returns the category menu.
    pub async fn submit_url(&self, identity: Identity, url: &str) -> Result<MenuView, EngineError> {
        let generation = self.sessions.begin(identity).await;
        info!(%identity, url, generation, "url submitted");

        let catalog = match self.catalogs.build_catalog(url).await {
            Ok(catalog) => catalog,
            Err(e) => {
                self.sessions.abandon(identity, generation).await;
                let error = EngineError::from(e);
                log_failure(identity, "submit_url", &error);
                return Err(error);
            }
        };

        let view = categories_view(&catalog);
        if let Err(error) = self.sessions.install(identity, generation, catalog).await {
            debug!(%identity, generation, "catalog arrived after cancel, discarded");
            return Err(error);
        }
        Ok(view)
    }

    /// Apply one menu token. A token that resolves a target runs the
    /// acquisition before returning.
    pub async fn select_menu_option(
        &self,
        identity: Identity,
        token: &str,
    ) -> Result<MenuOutcome, EngineError> {
        let result = self.select(identity, token).await;
        if let Err(error) = &result {
            log_failure(identity, "select_menu_option", error);
        }
        result
    }

    async fn select(&self, identity: Identity, token: &str) -> Result<MenuOutcome, EngineError> {
        let action = token.parse::<MenuAction>();
        if action == Ok(MenuAction::Cancel) {
            return if self.cancel(identity).await {
                Ok(MenuOutcome::Cancelled)
            } else {
                Err(EngineError::SessionExpired)
            };
        }

        let menu = &self.menu;
        let step = self
            .sessions
            .with_session(identity, move |session| {
                let view = selection::apply(session, action?, menu)?;
                Ok::<_, SelectionError>((
                    view,
                    session.generation(),
                    session.catalog.source_url.clone(),
                    session.catalog.title.clone(),
                ))
            })
            .await?;
        let (view, generation, source_url, title) = step?;

        let target = match view {
            MenuView::Resolved { target, .. } => target,
            other => return Ok(MenuOutcome::View(other)),
        };

        info!(%identity, target = %target.display_id(), mode = ?target.mode(), "acquisition started");
        let acquired = self.executor.acquire(&target, &source_url, &title).await;
        let completion = if acquired.is_ok() {
            Completion::Delivered
        } else {
            Completion::Failed
        };

        if !self.sessions.complete(identity, generation, completion).await {
            debug!(%identity, generation, "acquisition outlived its session, discarded");
            if let Ok(stale) = acquired {
                if let Err(e) = stale.cleanup() {
                    warn!(%identity, error = %e, "failed to remove stale download");
                }
            }
            return Err(EngineError::SessionExpired);
        }

        let result = acquired?;
        info!(%identity, size = result.size_bytes, "delivered");
        Ok(MenuOutcome::Delivered { target, result })
    }

    /// Destroy the session for `identity`. Returns false if there was none.
    pub async fn cancel(&self, identity: Identity) -> bool {
        let existed = self.sessions.cancel(identity).await;
        debug!(%identity, existed, "cancel");
        existed
    }

    /// Whether `identity` has a session ready for menu tokens
    pub async fn has_session(&self, identity: Identity) -> bool {
        self.sessions.contains(identity).await
    }

    /// [`Engine::submit_url`] as a background task
    pub fn spawn_submit_url(
        self: &Arc<Self>,
        identity: Identity,
        url: String,
    ) -> JoinHandle<Result<MenuView, EngineError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.submit_url(identity, &url).await })
    }

    /// [`Engine::select_menu_option`] as a background task
    pub fn spawn_select_menu_option(
        self: &Arc<Self>,
        identity: Identity,
        token: String,
    ) -> JoinHandle<Result<MenuOutcome, EngineError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.select_menu_option(identity, &token).await })
    }
}

/// Await a spawned engine task; a panicked or aborted task becomes
/// `EngineError::Internal`.
pub async fn join_task<T>(handle: JoinHandle<Result<T, EngineError>>) -> Result<T, EngineError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "engine task failed");
            Err(EngineError::Internal {
                detail: safe_diagnostic(&e.to_string()),
            })
        }
    }
}
