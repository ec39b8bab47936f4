//! The engine: an explicitly owned store plus its persistence gateway.
//!
//! Every mutating call runs against a draft of the store. The draft replaces
//! the store only after the gateway accepted it. Rejected calls flush the
//! unchanged store. Read-only calls never flush.

use bidrec_analytics::{
    compute, compute_aggregates, compute_time_series, portfolio, project_totals, Aggregates,
    BidStats, PackageFilter, Portfolio, ProjectTotals, TimeSeries,
};
use bidrec_core::{
    Basis, BidEventId, BidId, BidderId, Config, PackageId, PersistenceGateway, Project, ProjectId,
    Result, SnapshotId, Store, ValidationSnapshot,
};
use bidrec_ingestion::{
    BidderDecision, BidderListing, BidderReview, IdentityResolver, ImportReport, MergeReport,
    NewPackage, NewProject, PackageView, ProjectUpdate, SimilarityScorer, TokenSetScorer,
    UploadRow,
};
use bidrec_ledger::ValidationReport;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Owns the store for the lifetime of the process.
pub struct Engine<G: PersistenceGateway> {
    store: Store,
    gateway: G,
    config: Config,
    scorer: Box<dyn SimilarityScorer>,
}

impl<G: PersistenceGateway> Engine<G> {
    /// Load the store through `gateway`, or start empty when nothing was flushed yet.
    pub fn open(mut gateway: G, config: Config) -> Result<Self> {
        config.validate()?;
        let store = match gateway.load()? {
            Some(store) => {
                info!(
                    projects = store.projects.len(),
                    bidders = store.bidders.len(),
                    packages = store.packages.len(),
                    "loaded store"
                );
                store
            }
            None => {
                info!("starting with an empty store");
                Store::new()
            }
        };
        Ok(Self {
            store,
            gateway,
            config,
            scorer: Box::new(TokenSetScorer),
        })
    }

    /// Replace the name similarity policy.
    pub fn with_scorer(mut self, scorer: impl SimilarityScorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Current committed store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The persistence gateway, for inspecting what was flushed.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Final flush; hands the gateway back.
    pub fn shutdown(mut self) -> Result<G> {
        self.gateway.flush(&self.store)?;
        info!("engine shut down");
        Ok(self.gateway)
    }

    /// Run one mutation on a draft, flush the draft, and only then commit it.
    ///
    /// A rejected operation still flushes the unchanged store. A failed flush
    /// discards the draft, so memory never holds state the gateway refused.
    fn mutate<T>(
        &mut self,
        operation: &str,
        op: impl FnOnce(&mut Store, &Config, &dyn SimilarityScorer) -> Result<T>,
    ) -> Result<T> {
        let mut draft = self.store.clone();

        match op(&mut draft, &self.config, &*self.scorer) {
            Ok(value) => match self.gateway.flush(&draft) {
                Ok(()) => {
                    self.store = draft;
                    debug!(operation, "committed and flushed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(operation, error = %e, "flush failed; mutation discarded");
                    Err(e)
                }
            },
            Err(e) => {
                if let Err(flush_error) = self.gateway.flush(&self.store) {
                    warn!(operation, error = %flush_error, "flush failed");
                }
                warn!(operation, error = %e, "operation rejected");
                Err(e)
            }
        }
    }

    fn basis_or_default(&self, basis: Option<Basis>) -> Basis {
        basis.unwrap_or(self.config.aggregation.default_basis)
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Create a project; its name must not be blank.
    pub fn create_project(&mut self, project: NewProject) -> Result<ProjectId> {
        self.mutate("create_project", |store, _, _| {
            bidrec_ingestion::create_project(store, project)
        })
    }

    /// Apply a partial update. A square footage change refreshes cost per SF.
    pub fn update_project(&mut self, id: ProjectId, update: ProjectUpdate) -> Result<()> {
        self.mutate("update_project", |store, _, _| {
            bidrec_ingestion::update_project(store, id, update)
        })
    }

    /// Delete a project with its packages, bids, bid events and snapshots.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<Project> {
        self.mutate("delete_project", |store, _, _| {
            bidrec_ingestion::delete_project(store, id)
        })
    }

    /// Totals over every package of a project.
    pub fn project_totals(&self, id: ProjectId) -> Result<ProjectTotals> {
        project_totals(&self.store, id)
    }

    /// Per-project totals and pooled figures over the filtered packages.
    pub fn portfolio(&self, filter: &PackageFilter) -> Portfolio {
        portfolio(&self.store, filter)
    }

    // ------------------------------------------------------------------
    // Upload and bidder review
    // ------------------------------------------------------------------

    /// Import one upload as a new bid event.
    pub fn import_bid_event(
        &mut self,
        project_id: ProjectId,
        source: &str,
        rows: &[UploadRow],
    ) -> Result<ImportReport> {
        self.mutate("import_bid_event", |store, config, scorer| {
            let resolver = IdentityResolver::new(scorer, &config.matching);
            bidrec_ingestion::import_bid_event(
                store,
                &resolver,
                project_id,
                source,
                rows,
                Utc::now(),
            )
        })
    }

    /// Review view of a bid event.
    pub fn resolve_bidder_review(&self, event_id: BidEventId) -> Result<BidderReview> {
        bidrec_ingestion::bidder_review(&self.store, event_id)
    }

    /// Apply a decision batch and return the updated review view.
    pub fn apply_bidder_decisions(
        &mut self,
        event_id: BidEventId,
        decisions: &[BidderDecision],
    ) -> Result<BidderReview> {
        self.mutate("apply_bidder_decisions", |store, _, _| {
            bidrec_ingestion::apply_decisions(store, event_id, decisions)?;
            bidrec_ingestion::bidder_review(store, event_id)
        })
    }

    // ------------------------------------------------------------------
    // Bidder directory
    // ------------------------------------------------------------------

    /// Fold `merge_id` into `keep_id`, moving every reference and name.
    pub fn merge_bidders(&mut self, keep_id: BidderId, merge_id: BidderId) -> Result<MergeReport> {
        self.mutate("merge_bidders", |store, _, _| {
            bidrec_ingestion::merge_bidders(store, keep_id, merge_id)
        })
    }

    /// Every bidder with its usage counts.
    pub fn list_bidders(&self) -> Vec<BidderListing> {
        bidrec_ingestion::list_bidders(&self.store)
    }

    /// Create a bidder. A taken canonical key is a conflict.
    pub fn create_bidder(&mut self, name: &str) -> Result<BidderId> {
        self.mutate("create_bidder", |store, _, _| {
            bidrec_ingestion::create_bidder(store, name)
        })
    }

    /// Rename a bidder; the old name is kept as an alias.
    pub fn rename_bidder(&mut self, id: BidderId, name: &str) -> Result<()> {
        self.mutate("rename_bidder", |store, _, _| {
            bidrec_ingestion::rename_bidder(store, id, name)
        })
    }

    /// Record another spelling. Returns `false` if the bidder already answers to it.
    pub fn add_alias(&mut self, id: BidderId, alias: &str) -> Result<bool> {
        self.mutate("add_alias", |store, _, _| {
            bidrec_ingestion::add_alias(store, id, alias)
        })
    }

    /// Delete an unreferenced bidder.
    pub fn delete_bidder(&mut self, id: BidderId) -> Result<()> {
        self.mutate("delete_bidder", |store, _, _| {
            bidrec_ingestion::delete_bidder(store, id).map(|_| ())
        })
    }

    // ------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------

    /// Add an estimated package to a project.
    pub fn add_package(&mut self, project_id: ProjectId, package: NewPackage) -> Result<PackageId> {
        self.mutate("add_package", |store, _, _| {
            bidrec_ingestion::add_package(store, project_id, package)
        })
    }

    /// Make one of a package's bids the selected one.
    pub fn select_bid(&mut self, package_id: PackageId, bid_id: BidId) -> Result<()> {
        self.mutate("select_bid", |store, _, _| {
            bidrec_ingestion::select_bid(store, package_id, bid_id)
        })
    }

    /// Set a package amount by hand.
    pub fn override_package(
        &mut self,
        package_id: PackageId,
        amount: f64,
        notes: Option<String>,
    ) -> Result<()> {
        self.mutate("override_package", |store, _, _| {
            bidrec_ingestion::override_package(store, package_id, amount, notes)
        })
    }

    /// Return a package to its bid-derived amount. Fails for a package without bids.
    pub fn clear_override(&mut self, package_id: PackageId) -> Result<()> {
        self.mutate("clear_override", |store, _, _| {
            bidrec_ingestion::clear_override(store, package_id)
        })
    }

    /// Delete a package and its bids.
    pub fn delete_package(&mut self, package_id: PackageId) -> Result<()> {
        self.mutate("delete_package", |store, _, _| {
            bidrec_ingestion::delete_package(store, package_id).map(|_| ())
        })
    }

    /// A package with its bids, statistics and GMP delta.
    pub fn package_view(&self, package_id: PackageId) -> Result<PackageView> {
        bidrec_ingestion::package_view(&self.store, package_id)
    }

    // ------------------------------------------------------------------
    // Statistics and aggregation
    // ------------------------------------------------------------------

    /// Statistics of an arbitrary amount set.
    pub fn compute_package_stats(&self, amounts: &[f64]) -> BidStats {
        compute(amounts)
    }

    /// Division aggregates; `None` uses the configured default basis.
    pub fn compute_aggregates(&self, filter: &PackageFilter, basis: Option<Basis>) -> Aggregates {
        compute_aggregates(&self.store, filter, self.basis_or_default(basis))
    }

    /// Month-bucketed series; `None` uses the configured default basis.
    pub fn compute_time_series(&self, filter: &PackageFilter, basis: Option<Basis>) -> TimeSeries {
        compute_time_series(&self.store, filter, self.basis_or_default(basis))
    }

    // ------------------------------------------------------------------
    // Validation ledger
    // ------------------------------------------------------------------

    /// Freeze the project's current figures as a validation snapshot.
    pub fn create_validation_snapshot(
        &mut self,
        project_id: ProjectId,
        validated_by: &str,
        notes: Option<String>,
    ) -> Result<ValidationSnapshot> {
        self.mutate("create_validation_snapshot", |store, _, _| {
            let id =
                bidrec_ledger::create_snapshot(store, project_id, validated_by, notes, Utc::now())?;
            store.snapshot(id).cloned()
        })
    }

    /// Whether the latest snapshot still matches the live figures within tolerance.
    pub fn is_project_current(&self, project_id: ProjectId) -> Result<bool> {
        bidrec_ledger::is_project_current(&self.store, project_id, self.config.validation.tolerance)
    }

    /// Latest snapshot, live figures and per-field drift.
    pub fn validation_report(&self, project_id: ProjectId) -> Result<ValidationReport> {
        bidrec_ledger::validation_report(&self.store, project_id, self.config.validation.tolerance)
    }

    /// Snapshots of a project, newest first.
    pub fn snapshot_history(&self, project_id: ProjectId) -> Result<Vec<ValidationSnapshot>> {
        self.store.project(project_id)?;
        Ok(bidrec_ledger::history(&self.store, project_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Delete one validation snapshot.
    pub fn delete_snapshot(&mut self, id: SnapshotId) -> Result<()> {
        self.mutate("delete_snapshot", |store, _, _| {
            bidrec_ledger::delete_snapshot(store, id).map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidrec_core::{Error, MemoryGateway};

    fn engine() -> Engine<MemoryGateway> {
        Engine::open(MemoryGateway::new(), Config::default()).unwrap()
    }

    #[test]
    fn test_open_empty_and_existing() {
        let engine = engine();
        assert!(engine.store().projects.is_empty());

        let mut seeded = Store::new();
        seeded.allocate_id();
        let engine =
            Engine::open(MemoryGateway::with_store(seeded.clone()), Config::default()).unwrap();
        assert_eq!(engine.store(), &seeded);
    }

    #[test]
    fn test_open_rejects_bad_config() {
        let mut config = Config::default();
        config.matching.suggestion_limit = 0;
        let err = Engine::open(MemoryGateway::new(), config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_every_mutation_flushes() {
        let mut engine = engine();
        let id = engine
            .create_project(NewProject {
                name: "Annex".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(engine.gateway().flush_count(), 1);

        assert!(engine.delete_project(id + 100).is_err());
        assert_eq!(engine.gateway().flush_count(), 2);
        assert_eq!(engine.gateway().stored(), Some(engine.store()));

        engine.project_totals(id).unwrap();
        assert_eq!(engine.gateway().flush_count(), 2);
    }

    /// Loads nothing and refuses every flush.
    struct FullDisk;

    impl PersistenceGateway for FullDisk {
        fn load(&mut self) -> Result<Option<Store>> {
            Ok(None)
        }

        fn flush(&mut self, _store: &Store) -> Result<()> {
            Err(Error::storage("disk full"))
        }
    }

    #[test]
    fn test_failed_flush_discards_mutation() {
        let mut engine = Engine::open(FullDisk, Config::default()).unwrap();

        let err = engine
            .create_project(NewProject {
                name: "Annex".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(engine.store().projects.is_empty());

        // A retry starts from the same state instead of stacking a second copy.
        assert!(engine.create_bidder("Acme").is_err());
        assert!(engine.store().bidders.is_empty());
        assert_eq!(engine.store(), &Store::new());
    }

    #[test]
    fn test_shutdown_returns_gateway() {
        let mut engine = engine();
        engine.create_bidder("Acme").unwrap();
        let gateway = engine.shutdown().unwrap();
        assert_eq!(gateway.flush_count(), 2);
        assert_eq!(gateway.stored().unwrap().bidders.len(), 1);
    }

    #[test]
    fn test_custom_scorer_changes_matching() {
        let exact = |a: &str, b: &str| if a == b { 1.0 } else { 0.0 };
        let mut engine = engine().with_scorer(exact);
        let project = engine
            .create_project(NewProject {
                name: "Gym".to_string(),
                ..Default::default()
            })
            .unwrap();
        engine.create_bidder("Electrical ABC").unwrap();

        let rows: Vec<UploadRow> = serde_json::from_str(
            r#"[{"package_code": "26", "bids": [{"raw_bidder_name": "ABC Electrical", "amount": 10}]}]"#,
        )
        .unwrap();
        let report = engine.import_bid_event(project, "x", &rows).unwrap();
        assert_eq!(report.needs_review, 1);
    }

    #[test]
    fn test_default_basis_from_config() {
        let mut config = Config::default();
        config.aggregation.default_basis = Basis::SelectedAmount;
        let engine = Engine::open(MemoryGateway::new(), config).unwrap();
        let aggregates = engine.compute_aggregates(&PackageFilter::default(), None);
        assert_eq!(aggregates.basis, Basis::SelectedAmount);
    }
}
