//! Reference Cache - memoized reference lists per institution scope
//!
//! Remote kinds (programs, semesters, regulations) are fetched once per key across
//! every remote id of the scope; local kinds (courses, sessions, offerings,
//! students) come from the CRUD backend. A key is only ever filled, never evicted, for the lifetime of the cache.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::logs::{log_info_indent, log_warning, log_warning_indent};
use crate::models::{Institution, InstitutionScope, ReferenceEntity, ReferenceKind};
use crate::reference::{normalize_entity, normalize_institution, ReferenceService};
use crate::store::CrudBackend;

/// What a cached list was fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: ReferenceKind,
    scope: InstitutionScope,
    program_id: Option<String>,
}

/// Shared, read-mostly reference lookup for one run context.
pub struct ReferenceCache {
    remote: Arc<dyn ReferenceService>,
    local: Arc<dyn CrudBackend>,
    institutions: RwLock<Option<Arc<Vec<Institution>>>>,
    entries: RwLock<HashMap<CacheKey, Arc<Vec<ReferenceEntity>>>>,
}

impl ReferenceCache {
    pub fn new(remote: Arc<dyn ReferenceService>, local: Arc<dyn CrudBackend>) -> Self {
        Self {
            remote,
            local,
            institutions: RwLock::new(None),
            entries: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Institutions
    // =========================================================================

    /// All local institutions, loaded once.
    ///
    /// A failed load is not cached so the next run can retry.
    pub async fn get_institutions(&self) -> Arc<Vec<Institution>> {
        if let Some(cached) = self.institutions.read().await.as_ref() {
            return Arc::clone(cached);
        }

        let records = match self.local.list_institutions().await {
            Ok(records) => records,
            Err(e) => {
                log_warning(format!("Failed to load institutions: {}", e));
                return Arc::new(Vec::new());
            }
        };

        let list: Arc<Vec<Institution>> =
            Arc::new(records.iter().filter_map(normalize_institution).collect());
        *self.institutions.write().await = Some(Arc::clone(&list));
        list
    }

    // =========================================================================
    // Remote kinds
    // =========================================================================

    pub async fn get_programs(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.remote_list(ReferenceKind::Program, scope, None).await
    }

    /// Semesters of one program, queried by the program's id.
    pub async fn get_semesters(
        &self,
        scope: &InstitutionScope,
        program_id: &str,
    ) -> Arc<Vec<ReferenceEntity>> {
        self.remote_list(ReferenceKind::Semester, scope, Some(program_id))
            .await
    }

    pub async fn get_regulations(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.remote_list(ReferenceKind::Regulation, scope, None).await
    }

    async fn remote_list(
        &self,
        kind: ReferenceKind,
        scope: &InstitutionScope,
        program_id: Option<&str>,
    ) -> Arc<Vec<ReferenceEntity>> {
        let key = CacheKey {
            kind,
            scope: scope.clone(),
            program_id: program_id.map(String::from),
        };
        if let Some(hit) = self.lookup(&key).await {
            return hit;
        }

        // No remote ids means nothing may be returned; never widen the query.
        if scope.remote_ids.is_empty() {
            return self.store(key, Vec::new()).await;
        }

        let fetches = scope.remote_ids.iter().map(|rid| async move {
            (rid, self.remote.fetch(kind, rid, program_id).await)
        });

        let mut entities = Vec::new();
        for (rid, result) in join_all(fetches).await {
            match result {
                Ok(records) => {
                    let before = entities.len();
                    entities.extend(
                        records
                            .iter()
                            .filter_map(|r| normalize_entity(kind, r, rid))
                            .filter(|e| e.institution_id.as_deref() == Some(rid.as_str())),
                    );
                    log_info_indent(
                        format!(
                            "{} {} from {}",
                            entities.len() - before,
                            kind.plural(),
                            rid
                        ),
                        1,
                    );
                }
                Err(e) => log_warning_indent(
                    format!("Failed to fetch {} for {}: {}", kind.plural(), rid, e),
                    1,
                ),
            }
        }

        self.store(key, finalize(entities)).await
    }

    // =========================================================================
    // Local kinds
    // =========================================================================

    pub async fn get_courses(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.local_list(ReferenceKind::Course, scope).await
    }

    pub async fn get_sessions(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.local_list(ReferenceKind::Session, scope).await
    }

    pub async fn get_offerings(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.local_list(ReferenceKind::Offering, scope).await
    }

    pub async fn get_students(&self, scope: &InstitutionScope) -> Arc<Vec<ReferenceEntity>> {
        self.local_list(ReferenceKind::Student, scope).await
    }

    async fn local_list(
        &self,
        kind: ReferenceKind,
        scope: &InstitutionScope,
    ) -> Arc<Vec<ReferenceEntity>> {
        let key = CacheKey {
            kind,
            scope: scope.clone(),
            program_id: None,
        };
        if let Some(hit) = self.lookup(&key).await {
            return hit;
        }

        let entities = match self.local.list(kind, scope).await {
            Ok(records) => records
                .iter()
                .filter_map(|r| normalize_entity(kind, r, &scope.institution_id))
                .collect(),
            Err(e) => {
                log_warning(format!(
                    "Failed to fetch {} for {}: {}",
                    kind.plural(),
                    scope.institution_code,
                    e
                ));
                Vec::new()
            }
        };

        self.store(key, finalize(entities)).await
    }

    // =========================================================================
    // Storage
    // =========================================================================

    async fn lookup(&self, key: &CacheKey) -> Option<Arc<Vec<ReferenceEntity>>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Last writer for a key wins.
    async fn store(&self, key: CacheKey, entities: Vec<ReferenceEntity>) -> Arc<Vec<ReferenceEntity>> {
        let list = Arc::new(entities);
        self.entries.write().await.insert(key, Arc::clone(&list));
        list
    }
}

/// Dedup by code (first seen wins), then stable sort by ordinal with
/// unnumbered entries last.
fn finalize(entities: Vec<ReferenceEntity>) -> Vec<ReferenceEntity> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ReferenceEntity> = entities
        .into_iter()
        .filter(|e| {
            let key = if e.code.is_empty() { &e.name } else { &e.code };
            seen.insert(key.to_lowercase())
        })
        .collect();
    unique.sort_by_key(|e| (e.ordinal.is_none(), e.ordinal.unwrap_or(0)));
    unique
}
