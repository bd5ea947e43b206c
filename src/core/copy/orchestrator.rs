//! Copy orchestrator - drives a copy pass end to end
//!
//! For each root: resolve its dependencies, then walk them in order. Mapped
//! entities are skipped; the others are locked, re-checked, rewritten,
//! created at the destination and recorded in the mapping store.
//!
//! A dashboard the destination created without its cards is recorded and
//! failed. The next pass finds it mapped with no card placements and
//! attaches them.

use super::report::{
    AbandonedEntity, CopyReport, CreatedEntity, FailedEntity, PlannedEntity, SkippedEntity,
    Warning,
};
use super::state::{EntityProgress, EntityState};
use crate::adapters::{FileMappingStorage, InstanceClient, MetabaseClient};
use crate::config::{DashcloneConfig, DatabaseMappingConfig};
use crate::core::mapping::{MappingStore, PutOutcome};
use crate::core::resolve::{DependencyResolver, ResolvedEntity};
use crate::core::rewrite::{card_placeholder, FieldMatcher, QueryRemap, ReferenceRewriter};
use crate::domain::{
    CopyError, Dashboard, DashcloneError, Entity, EntityId, EntityRef, InstanceError,
    InstancePairKey, Result,
};
use crate::{log_entity_created, log_entity_failed};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Options of a copy pass
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Resolve and report only; create nothing and record nothing
    pub dry_run: bool,

    /// Roots processed concurrently
    pub parallel_roots: usize,

    /// Warn when an equivalent entity already exists at the destination
    pub warn_on_existing: bool,

    /// Flush the mapping store after every recorded entity
    pub checkpoint_each_entry: bool,

    /// Warehouse databases to remap
    pub databases: Vec<DatabaseMappingConfig>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallel_roots: 1,
            warn_on_existing: true,
            checkpoint_each_entry: true,
            databases: Vec::new(),
        }
    }
}

impl CopyOptions {
    pub fn from_config(config: &DashcloneConfig) -> Self {
        Self {
            dry_run: config.application.dry_run,
            parallel_roots: config.copy.parallel_roots,
            warn_on_existing: config.copy.warn_on_existing,
            checkpoint_each_entry: config.cache.checkpoint_each_entry,
            databases: config.copy.databases.clone(),
        }
    }
}

/// How an entity step ended
enum Step {
    Continue,
    Stop,
}

/// Copy orchestrator
pub struct CopyOrchestrator {
    source: Arc<dyn InstanceClient>,
    destination: Arc<dyn InstanceClient>,
    store: Arc<MappingStore>,
    options: CopyOptions,
    shutdown: Option<watch::Receiver<bool>>,
    /// Set once a pass-level failure stops the current pass
    halted: AtomicBool,
}

impl CopyOrchestrator {
    pub fn new(
        source: Arc<dyn InstanceClient>,
        destination: Arc<dyn InstanceClient>,
        store: Arc<MappingStore>,
        options: CopyOptions,
    ) -> Self {
        Self {
            source,
            destination,
            store,
            options,
            shutdown: None,
            halted: AtomicBool::new(false),
        }
    }

    /// Stop between entities once the signal turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build an orchestrator for the configured Metabase instances
    ///
    /// Logs in to both instances and opens the file-backed mapping store of
    /// the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if a login fails or the mapping cache cannot be opened.
    pub async fn from_config(config: &DashcloneConfig) -> Result<Self> {
        let source = MetabaseClient::new(&config.source)?;
        source.login().await?;
        let destination = MetabaseClient::new(&config.destination)?;
        destination.login().await?;

        let pair = InstancePairKey::new(source.base_url(), destination.base_url())
            .map_err(DashcloneError::Configuration)?;
        let storage = Arc::new(FileMappingStorage::new(&config.cache.folder));
        let store = Arc::new(MappingStore::open(pair, storage).await?);

        tracing::info!(
            source = %config.source.base_url,
            destination = %config.destination.base_url,
            mappings = store.len(),
            cache = %store.location(),
            "Copy orchestrator ready"
        );

        Ok(Self::new(
            Arc::new(source),
            Arc::new(destination),
            store,
            CopyOptions::from_config(config),
        ))
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn InstanceClient> {
        &self.source
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.as_ref().map_or(false, |rx| *rx.borrow())
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Copy the roots in order
    ///
    /// Failures are recorded in the report and never abort unrelated roots.
    /// A failure of the pass itself, such as the mapping store not being
    /// persisted, stops the pass and lands in [`CopyReport::fatal`] next to
    /// everything done before it.
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse metadata of a configured database
    /// remap cannot be fetched. Nothing has been created at that point.
    pub async fn copy(&self, roots: &[EntityRef]) -> Result<CopyReport> {
        let start = Instant::now();
        tracing::info!(
            roots = roots.len(),
            dry_run = self.options.dry_run,
            parallel_roots = self.options.parallel_roots,
            "Starting copy"
        );

        let mut report = CopyReport::new();
        report.dry_run = self.options.dry_run;

        let remap = self.build_remap(&mut report).await?;
        let resolver = DependencyResolver::new(self.source.clone(), self.store.clone());
        self.halted.store(false, Ordering::SeqCst);

        let parallel = self.options.parallel_roots.max(1);
        let outcomes: Vec<CopyReport> = stream::iter(roots.iter().copied())
            .map(|root| self.copy_root(&resolver, &remap, root))
            .buffered(parallel)
            .collect()
            .await;

        for outcome in outcomes {
            report.merge(outcome);
        }

        if self.options.dry_run {
            let mut seen = HashSet::new();
            report.planned.retain(|p| seen.insert(p.entity));
        } else if self.store.is_dirty() {
            if let Err(error) = self.checkpoint(&mut report).await {
                tracing::error!(error = %error, "Mapping cache could not be saved");
                report.fatal.get_or_insert_with(|| error.to_string());
            }
        }

        let report = report.with_duration(start.elapsed());
        report.log_summary();
        Ok(report)
    }

    async fn build_remap(&self, report: &mut CopyReport) -> Result<QueryRemap> {
        let mut remap = QueryRemap::new();
        for database in &self.options.databases {
            if !database.match_fields {
                remap.merge(QueryRemap::database_only(
                    database.source_id,
                    database.destination_id,
                ));
                continue;
            }

            let source = self.source.database_metadata(database.source_id).await?;
            let destination = self
                .destination
                .database_metadata(database.destination_id)
                .await?;
            let matched = FieldMatcher::new(&source, &destination).build(true);

            tracing::info!(
                source_database = database.source_id,
                destination_database = database.destination_id,
                unmatched_tables = matched.unmatched_tables.len(),
                unmatched_fields = matched.unmatched_fields.len(),
                "Warehouse database matched"
            );
            for name in matched
                .unmatched_tables
                .into_iter()
                .chain(matched.unmatched_fields)
            {
                report.warnings.push(Warning::UnmatchedWarehouseName {
                    database: database.source_id,
                    name,
                });
            }
            remap.merge(matched.remap);
        }
        Ok(remap)
    }

    async fn copy_root(
        &self,
        resolver: &DependencyResolver,
        remap: &QueryRemap,
        root: EntityRef,
    ) -> CopyReport {
        let mut report = CopyReport::new();
        if self.is_shutdown() {
            report.interrupted = true;
            report.abandoned.push(AbandonedEntity { entity: root, root });
            return report;
        }
        if self.is_halted() {
            report.abandoned.push(AbandonedEntity { entity: root, root });
            return report;
        }

        let resolution = match resolver.resolve(root).await {
            Ok(resolution) => resolution,
            Err(error) => {
                let entity = error.entity().unwrap_or(root);
                log_entity_failed!(entity, root, error);
                report.failed.push(FailedEntity {
                    entity,
                    root,
                    error,
                });
                return report;
            }
        };

        tracing::info!(
            root = %root,
            entities = resolution.len(),
            pending = resolution.pending().count(),
            "Copying root"
        );

        for (index, resolved) in resolution.entities.iter().enumerate() {
            if self.is_shutdown() {
                tracing::warn!(root = %root, "Shutdown requested, stopping before {}", resolved.reference);
                report.interrupted = true;
                abandon(&mut report, &resolution.entities[index..], root);
                break;
            }
            if self.is_halted() {
                abandon(&mut report, &resolution.entities[index..], root);
                break;
            }

            let step = if self.options.dry_run {
                self.plan_entity(resolved, root, &mut report);
                Step::Continue
            } else {
                match self.copy_entity(resolved, root, remap, &mut report).await {
                    Ok(step) => step,
                    Err(error) => {
                        tracing::error!(
                            root = %root,
                            entity = %resolved.reference,
                            error = %error,
                            "Copy pass stopped"
                        );
                        self.halted.store(true, Ordering::SeqCst);
                        report.fatal = Some(error.to_string());
                        Step::Stop
                    }
                }
            };

            if let Step::Stop = step {
                abandon(&mut report, &resolution.entities[index + 1..], root);
                break;
            }
        }

        report
    }

    fn plan_entity(&self, resolved: &ResolvedEntity, root: EntityRef, report: &mut CopyReport) {
        match self.store.get(resolved.reference) {
            Some(destination) => report.skipped.push(SkippedEntity {
                entity: resolved.reference,
                destination,
                root,
            }),
            None => report.planned.push(PlannedEntity {
                entity: resolved.reference,
                name: resolved.entity.name().to_string(),
                root,
            }),
        }
    }

    async fn copy_entity(
        &self,
        resolved: &ResolvedEntity,
        root: EntityRef,
        remap: &QueryRemap,
        report: &mut CopyReport,
    ) -> Result<Step> {
        let reference = resolved.reference;
        let mut progress = EntityProgress::new(reference);
        progress.advance(EntityState::Resolving).map_err(illegal)?;

        if let Some(destination) = self.store.get(reference) {
            if !self.cards_missing(&resolved.entity) {
                progress
                    .advance(EntityState::AlreadyMapped(destination))
                    .map_err(illegal)?;
                report.skipped.push(SkippedEntity {
                    entity: reference,
                    destination,
                    root,
                });
                return Ok(Step::Continue);
            }
        }

        let _guard = self.store.lock(reference).await;
        // Another root may have created it while we waited
        if let Some(destination) = self.store.get(reference) {
            if self.cards_missing(&resolved.entity) {
                return self
                    .complete_dashboard(resolved, destination, root, remap, &mut progress, report)
                    .await;
            }
            progress
                .advance(EntityState::AlreadyMapped(destination))
                .map_err(illegal)?;
            report.skipped.push(SkippedEntity {
                entity: reference,
                destination,
                root,
            });
            return Ok(Step::Continue);
        }

        progress.advance(EntityState::Rewriting).map_err(illegal)?;
        let Some(rewritten) = self.rewrite(resolved, root, remap, &mut progress, report)? else {
            return Ok(Step::Stop);
        };

        if self.options.warn_on_existing {
            match self.destination.find_existing(&rewritten).await {
                Ok(Some(existing)) => {
                    tracing::warn!(entity = %reference, existing = %existing, "Equivalent entity already exists at destination");
                    report.warnings.push(Warning::ExistingDestinationEntity {
                        entity: reference,
                        existing,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(entity = %reference, error = %e, "Could not check destination for existing entity");
                }
            }
        }

        progress.advance(EntityState::Creating).map_err(illegal)?;
        let created = match self.destination.create_entity(&rewritten).await {
            Ok(created) => created,
            Err(InstanceError::PartiallyCreated { id, message }) => {
                // The entity exists at the destination; record it so it is never created again
                self.record(reference, id, report);
                progress.advance(EntityState::Failed).map_err(illegal)?;
                let error = CopyError::InstanceClient {
                    entity: reference,
                    source: InstanceError::PartiallyCreated { id, message },
                };
                log_entity_failed!(reference, root, error);
                report.failed.push(FailedEntity {
                    entity: reference,
                    root,
                    error,
                });
                self.checkpoint_entry(report).await?;
                return Ok(Step::Stop);
            }
            Err(source) => {
                progress.advance(EntityState::Failed).map_err(illegal)?;
                let error = CopyError::InstanceClient {
                    entity: reference,
                    source,
                };
                log_entity_failed!(reference, root, error);
                report.failed.push(FailedEntity {
                    entity: reference,
                    root,
                    error,
                });
                return Ok(Step::Stop);
            }
        };

        progress
            .advance(EntityState::Mapped(created.id))
            .map_err(illegal)?;
        self.record(reference, created.id, report);
        log_entity_created!(reference, created.id);
        report.created.push(CreatedEntity {
            entity: reference,
            name: resolved.entity.name().to_string(),
            destination: created.id,
            root,
        });

        if let Entity::Dashboard(dashboard) = &resolved.entity {
            self.record_cards(dashboard, &created.children, root, report);
        }

        self.checkpoint_entry(report).await?;
        Ok(Step::Continue)
    }

    /// Rewrite a resolved entity; `None` once the failure is reported
    fn rewrite(
        &self,
        resolved: &ResolvedEntity,
        root: EntityRef,
        remap: &QueryRemap,
        progress: &mut EntityProgress,
        report: &mut CopyReport,
    ) -> Result<Option<Entity>> {
        let reference = resolved.reference;
        let rewritten = match ReferenceRewriter::new(&self.store)
            .with_remap(remap)
            .rewrite(&resolved.entity)
        {
            Ok(rewritten) => rewritten,
            Err(error) => {
                progress.advance(EntityState::Failed).map_err(illegal)?;
                log_entity_failed!(reference, root, error);
                report.failed.push(FailedEntity {
                    entity: reference,
                    root,
                    error,
                });
                return Ok(None);
            }
        };
        report
            .warnings
            .extend(rewritten.unmatched.iter().map(|item| Warning::UnmatchedWarehouseId {
                entity: reference,
                item: *item,
            }));
        Ok(Some(rewritten.entity))
    }

    /// Whether a mapped dashboard is missing every one of its card placements
    fn cards_missing(&self, entity: &Entity) -> bool {
        let Entity::Dashboard(dashboard) = entity else {
            return false;
        };
        let mut cards = source_cards(dashboard).peekable();
        cards.peek().is_some() && cards.all(|card| self.store.get(card).is_none())
    }

    /// Attach the cards of a dashboard recorded without them
    async fn complete_dashboard(
        &self,
        resolved: &ResolvedEntity,
        destination: EntityId,
        root: EntityRef,
        remap: &QueryRemap,
        progress: &mut EntityProgress,
        report: &mut CopyReport,
    ) -> Result<Step> {
        let reference = resolved.reference;
        let Entity::Dashboard(source_dashboard) = &resolved.entity else {
            return Ok(Step::Continue);
        };
        tracing::info!(dashboard = %reference, destination = %destination, "Dashboard is mapped without its cards, attaching them");

        progress.advance(EntityState::Rewriting).map_err(illegal)?;
        let Some(rewritten) = self.rewrite(resolved, root, remap, progress, report)? else {
            return Ok(Step::Stop);
        };
        let Entity::Dashboard(content) = &rewritten else {
            return Ok(Step::Continue);
        };

        progress.advance(EntityState::Creating).map_err(illegal)?;
        match self.destination.attach_cards(destination, content).await {
            Ok(children) => {
                progress
                    .advance(EntityState::Mapped(destination))
                    .map_err(illegal)?;
                self.record_cards(source_dashboard, &children, root, report);
                report.skipped.push(SkippedEntity {
                    entity: reference,
                    destination,
                    root,
                });
                self.checkpoint_entry(report).await?;
                Ok(Step::Continue)
            }
            Err(source) => {
                progress.advance(EntityState::Failed).map_err(illegal)?;
                let error = CopyError::InstanceClient {
                    entity: reference,
                    source,
                };
                log_entity_failed!(reference, root, error);
                report.failed.push(FailedEntity {
                    entity: reference,
                    root,
                    error,
                });
                Ok(Step::Stop)
            }
        }
    }

    /// Record the destination placements of a dashboard's cards
    fn record_cards(
        &self,
        dashboard: &Dashboard,
        children: &[(i64, EntityId)],
        root: EntityRef,
        report: &mut CopyReport,
    ) {
        let reference = EntityRef::dashboard(dashboard.id);
        for (placeholder, destination) in children {
            let Some(source_card) = dashboard
                .cards
                .iter()
                .enumerate()
                .find(|(index, _)| card_placeholder(*index) == *placeholder)
                .and_then(|(_, card)| u64::try_from(card.id).ok())
                .and_then(|id| EntityId::new(id).ok())
            else {
                tracing::warn!(dashboard = %reference, placeholder = placeholder, "Created card has no source placement");
                continue;
            };
            let card = EntityRef::card(source_card);
            self.record(card, *destination, report);
            report.created.push(CreatedEntity {
                entity: card,
                name: format!("{} card", dashboard.name),
                destination: *destination,
                root,
            });
        }
    }

    async fn checkpoint_entry(&self, report: &mut CopyReport) -> Result<()> {
        if self.options.checkpoint_each_entry {
            self.checkpoint(report).await?;
        }
        Ok(())
    }

    /// Flush the store, reporting entries another run recorded differently
    async fn checkpoint(&self, report: &mut CopyReport) -> Result<()> {
        let conflicts = self.store.flush().await?;
        report
            .warnings
            .extend(conflicts.into_iter().map(Warning::MappingConflict));
        Ok(())
    }

    fn record(&self, reference: EntityRef, destination: EntityId, report: &mut CopyReport) {
        if let PutOutcome::Conflict(conflict) = self.store.put(reference, destination) {
            tracing::warn!(conflict = %conflict, "Mapping conflict");
            report.warnings.push(Warning::MappingConflict(conflict));
        }
    }
}

/// Source placements of a dashboard as card references
fn source_cards(dashboard: &Dashboard) -> impl Iterator<Item = EntityRef> + '_ {
    dashboard
        .cards
        .iter()
        .filter_map(|card| u64::try_from(card.id).ok())
        .filter_map(|id| EntityId::new(id).ok())
        .map(EntityRef::card)
}

fn abandon(report: &mut CopyReport, remaining: &[ResolvedEntity], root: EntityRef) {
    report
        .abandoned
        .extend(remaining.iter().map(|resolved| AbandonedEntity {
            entity: resolved.reference,
            root,
        }));
}

fn illegal(error: super::state::IllegalTransition) -> DashcloneError {
    DashcloneError::Other(error.to_string())
}
