use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::content::SectionContentCache;
use crate::cache::structure::TopicStructureCache;
use crate::config::{Config, RoleTemplates};
use crate::llm_client::GenerativeClient;
use crate::retrieval::Retriever;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Every collaborator is an explicitly constructed, injected dependency —
/// no process-wide singletons — so handlers and the pipeline can be driven
/// with test doubles.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: Arc<dyn GenerativeClient>,
    pub retriever: Arc<dyn Retriever>,
    pub structure_cache: Arc<TopicStructureCache>,
    pub content_cache: Arc<SectionContentCache>,
    pub role_templates: Arc<RoleTemplates>,
    pub config: Config,
}
