//! Operator session: working set, field selection, and row states.
//!
//! The session is the only owner of mutable state. Detection and repair
//! workers operate on snapshots of records while a batch is in flight; their
//! results are applied here once the batch run returns, so no record is ever
//! mutated concurrently.

use crate::batch::{BatchProgress, BatchScheduler, ItemFailure};
use crate::config::{CollectionType, EngineConfig};
use crate::detect::{BatchPeers, ConflictDetector, ConflictOutcome};
use crate::error::{MetafixError, Result};
use crate::merge::ResultMerger;
use crate::model::{ConflictRecord, FieldSelection, MetadataObject, PatchOperation};
use crate::network::{retry_async, RetryConfig};
use crate::remediate::{plan, RepairOutcome, Remediator};
use crate::state::{RowEvent, RowState, Transition};
use crate::store::{RemoteStore, ScanQuery};
use crate::working_set::{Collection, WorkingSet};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

/// Callback notified after every batch chunk.
pub type ProgressObserver = Box<dyn Fn(&BatchProgress) + Send + Sync>;

/// Outcome of building the working set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub requests: usize,
    pub failed_requests: usize,
    pub collections: usize,
    pub objects: usize,
    pub duplicates: usize,
}

/// Outcome of a multi-record check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub checked: usize,
    pub ready: usize,
    /// Distinct records with at least one conflict.
    pub conflicted: usize,
    pub failures: Vec<ItemFailure>,
    pub conflicts: Vec<ConflictRecord>,
}

impl CheckSummary {
    pub fn message(&self) -> String {
        if self.conflicted == 0 {
            format!("{} rows did not have any conflicts.", self.ready)
        } else {
            format!(
                "{} rows did not have any conflicts, {} rows had one or more conflicts.",
                self.ready, self.conflicted
            )
        }
    }
}

/// How a single repair ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RepairStatus {
    /// Fully clean; the record left the working set.
    Fixed,
    /// Patched, but some field still needs cleaning.
    PartiallyFixed,
    /// Nothing selected needed cleaning; no request was sent.
    Skipped,
    /// The store rejected the patch; the row is now in `Error`.
    Failed { message: String },
}

/// Report for one repaired record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub id: String,
    pub name: String,
    pub status: RepairStatus,
    pub operations: Vec<PatchOperation>,
}

/// Outcome of a multi-record repair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixSummary {
    pub fixed: usize,
    pub partially_fixed: usize,
    /// Ready rows that needed no patch under the current selection.
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
}

impl FixSummary {
    /// Rows that were handled without error, patched or not.
    pub fn succeeded(&self) -> usize {
        self.fixed + self.partially_fixed + self.skipped
    }

    pub fn message(&self) -> String {
        format!(
            "{} objects fixed, {} objects failed.",
            self.succeeded(),
            self.failed
        )
    }
}

/// Explicit context for one remediation session.
pub struct Session {
    store: Arc<dyn RemoteStore>,
    config: EngineConfig,
    selection: FieldSelection,
    working_set: WorkingSet,
    states: HashMap<(CollectionType, String), RowState>,
    observer: Option<ProgressObserver>,
}

impl Session {
    pub fn new(store: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            selection: FieldSelection::default(),
            working_set: WorkingSet::new(),
            states: HashMap::new(),
            observer: None,
        }
    }

    /// Start from an already-built working set; all rows are `Unchecked`.
    pub fn with_working_set(mut self, working_set: WorkingSet) -> Self {
        self.working_set = working_set;
        self.states.clear();
        self
    }

    pub fn with_selection(mut self, selection: FieldSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn is_empty(&self) -> bool {
        self.working_set.is_empty()
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.working_set.collections()
    }

    pub fn collection(&self, kind: CollectionType) -> Option<&Collection> {
        self.working_set.collection(kind)
    }

    pub fn selection(&self) -> FieldSelection {
        self.selection
    }

    /// Change the field selection.
    ///
    /// Rows that were `Ready` under the old selection go back to `Unchecked`
    /// so that no repair runs with fields the detection did not cover.
    pub fn set_selection(&mut self, selection: FieldSelection) {
        if selection == self.selection {
            return;
        }
        self.selection = selection;

        let mut demoted = 0;
        for state in self.states.values_mut() {
            if let Ok(Transition::Row(next)) = state.apply(RowEvent::SelectionChanged) {
                if next != *state {
                    demoted += 1;
                }
                *state = next;
            }
        }
        info!("Field selection updated, {} ready rows need a re-check", demoted);
    }

    /// Current state of a row, or `None` if the record is not in the working set.
    pub fn state(&self, kind: CollectionType, id: &str) -> Option<RowState> {
        self.working_set.get(kind, id)?;
        Some(
            self.states
                .get(&(kind, id.to_string()))
                .copied()
                .unwrap_or_default(),
        )
    }

    /// Whether a repair of this row is currently allowed.
    pub fn can_repair(&self, kind: CollectionType, id: &str) -> bool {
        self.state(kind, id).is_some_and(|state| state.can_repair())
    }

    /// Ids of every record currently in `kind`, in working-set order.
    pub fn ids(&self, kind: CollectionType) -> Vec<String> {
        self.working_set
            .collection(kind)
            .map(|collection| collection.ids())
            .unwrap_or_default()
    }

    /// Fetch all candidates from the store and rebuild the working set.
    ///
    /// Individual scan requests that still fail after retrying contribute
    /// nothing. Only when every request fails is an error returned.
    pub async fn scan(&mut self) -> Result<ScanReport> {
        let queries = ScanQuery::all();
        let retry = RetryConfig::new().with_max_attempts(self.config.scan_attempts);
        let store = self.store.as_ref();

        let fetches = queries.iter().map(|query| {
            let retry = &retry;
            async move {
                let (result, _attempts) =
                    retry_async(retry, || store.scan(query), MetafixError::is_retryable).await;
                (query, result)
            }
        });
        let responses = join_all(fetches).await;

        let mut merger = ResultMerger::new();
        let mut failed_requests = 0;
        let mut last_error = None;
        for (query, result) in responses {
            match result {
                Ok(response) => merger.add_response(&response),
                Err(e) => {
                    warn!("Scan request {} failed: {}", query, e);
                    failed_requests += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed_requests == queries.len() {
            return Err(last_error
                .unwrap_or_else(|| MetafixError::Other("Scan issued no requests".to_string())));
        }

        let (working_set, stats) = merger.finish();
        self.working_set = working_set;
        self.states.clear();

        let report = ScanReport {
            requests: queries.len(),
            failed_requests,
            collections: self.working_set.kinds().len(),
            objects: self.working_set.total_objects(),
            duplicates: stats.duplicates,
        };
        info!(
            "Scan found {} objects in {} collections ({} of {} requests failed)",
            report.objects, report.collections, report.failed_requests, report.requests
        );
        Ok(report)
    }

    /// Check one record against the store only.
    pub async fn check_one(&mut self, kind: CollectionType, id: &str) -> Result<ConflictOutcome> {
        let object = self.object(kind, id)?.clone();
        let detector = ConflictDetector::new(self.store.as_ref(), kind, self.selection);
        let outcome = detector.detect(&object, &BatchPeers::empty()).await;

        self.apply_event(
            kind,
            id,
            RowEvent::Detected {
                collisions: outcome.collisions.len(),
            },
        )?;
        Ok(outcome)
    }

    /// Check several records of one collection, including against each other.
    pub async fn check_many(&mut self, kind: CollectionType, ids: &[String]) -> CheckSummary {
        let (objects, mut failures) = self.snapshot(kind, ids);
        let checked = objects.len() + failures.len();
        let peers = BatchPeers::from_objects(&objects, &self.selection);
        let scheduler = self.scheduler();

        let result = {
            let detector = ConflictDetector::new(self.store.as_ref(), kind, self.selection);
            let detector = &detector;
            let peers = &peers;
            let observer = self.observer.as_ref();
            scheduler
                .run_with_progress(
                    objects,
                    |object: MetadataObject| async move {
                        Ok::<_, Infallible>(detector.detect(&object, peers).await)
                    },
                    |progress| notify(observer, progress),
                )
                .await
        };

        let mut summary = CheckSummary {
            checked,
            ..CheckSummary::default()
        };
        for failure in &result.failures {
            if let Err(e) = self.apply_event(kind, &failure.id, RowEvent::DetectionFailed) {
                warn!("Could not flag {} as failed: {}", failure.id, e);
            }
        }
        failures.extend(result.failures);

        let mut conflicted_ids = BTreeSet::new();
        for outcome in result.outputs {
            let event = RowEvent::Detected {
                collisions: outcome.collisions.len(),
            };
            if let Err(e) = self.apply_event(kind, &outcome.object_id, event) {
                warn!("Dropping detection result for {}: {}", outcome.object_id, e);
                continue;
            }
            if outcome.has_conflicts() {
                conflicted_ids.insert(outcome.object_id.clone());
                summary.conflicts.extend(outcome.collisions);
            } else {
                summary.ready += 1;
            }
        }

        summary.conflicted = conflicted_ids.len();
        summary.failures = failures;
        info!("Checked {} {}: {}", summary.checked, kind, summary.message());
        summary
    }

    /// Patches that repairing these records would send, without sending them.
    pub fn plan(&self, kind: CollectionType, ids: &[String]) -> Vec<(String, Vec<PatchOperation>)> {
        ids.iter()
            .filter_map(|id| self.working_set.get(kind, id))
            .map(|object| (object.id.clone(), plan(object, &self.selection)))
            .filter(|(_, operations)| !operations.is_empty())
            .collect()
    }

    /// Repair one `Ready` record.
    ///
    /// Missing records and rows that are not `Ready` are rejected without any
    /// remote call. A store failure moves the row to `Error` and is reported
    /// in the returned status.
    pub async fn fix_one(&mut self, kind: CollectionType, id: &str) -> Result<RepairReport> {
        let object = self.object(kind, id)?.clone();
        let state = self.state(kind, id).unwrap_or_default();

        let outcome = {
            let remediator = Remediator::new(self.store.as_ref(), kind, self.selection);
            remediator.repair(&object, state).await
        };

        match outcome {
            Ok(outcome) => self.apply_repair(kind, outcome),
            Err(e) if e.is_precondition() => Err(e),
            Err(e) => {
                self.apply_event(kind, id, RowEvent::RepairFailed)?;
                Ok(RepairReport {
                    id: object.id.clone(),
                    name: object.display_name(),
                    status: RepairStatus::Failed {
                        message: e.to_string(),
                    },
                    operations: plan(&object, &self.selection),
                })
            }
        }
    }

    /// Repair every `Ready` record among `ids`.
    ///
    /// Ids that are missing or not `Ready` are reported as failures and left
    /// untouched.
    pub async fn fix_many(&mut self, kind: CollectionType, ids: &[String]) -> FixSummary {
        let (objects, mut failures) = self.snapshot(kind, ids);
        let (ready, blocked): (Vec<MetadataObject>, Vec<MetadataObject>) = objects
            .into_iter()
            .partition(|object| self.can_repair(kind, &object.id));

        for object in blocked {
            let state = self.state(kind, &object.id).unwrap_or_default();
            failures.push(ItemFailure {
                id: object.id.clone(),
                name: object.display_name(),
                message: format!("not ready for repair (state: {})", state),
            });
        }

        let scheduler = self.scheduler();
        let result = {
            let remediator = Remediator::new(self.store.as_ref(), kind, self.selection);
            let remediator = &remediator;
            let observer = self.observer.as_ref();
            scheduler
                .run_with_progress(
                    ready,
                    |object: MetadataObject| async move {
                        remediator.repair(&object, RowState::Ready).await
                    },
                    |progress| notify(observer, progress),
                )
                .await
        };

        let mut summary = FixSummary {
            failures,
            ..FixSummary::default()
        };
        for outcome in result.outputs {
            self.tally_repair(kind, outcome, &mut summary);
        }

        for failure in &result.failures {
            if let Err(e) = self.apply_event(kind, &failure.id, RowEvent::RepairFailed) {
                warn!("Could not flag {} as failed: {}", failure.id, e);
            }
        }
        summary.failures.extend(result.failures);
        summary.failed = summary.failures.len();
        info!("Repaired {}: {}", kind, summary.message());
        summary
    }

    /// Apply one successful repair and count it in `summary`.
    fn tally_repair(&mut self, kind: CollectionType, outcome: RepairOutcome, summary: &mut FixSummary) {
        let id = outcome.object.id.clone();
        let name = outcome.object.display_name();

        let message = match self.apply_repair(kind, outcome) {
            Ok(report) => match report.status {
                RepairStatus::Fixed => {
                    summary.fixed += 1;
                    return;
                }
                RepairStatus::PartiallyFixed => {
                    summary.partially_fixed += 1;
                    return;
                }
                RepairStatus::Skipped => {
                    summary.skipped += 1;
                    return;
                }
                RepairStatus::Failed { message } => message,
            },
            Err(e) => {
                warn!("Could not apply repair of {}: {}", id, e);
                e.to_string()
            }
        };
        summary.failures.push(ItemFailure { id, name, message });
    }

    fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::new(self.config.batch_size).with_item_timeout(self.config.item_timeout)
    }

    fn object(&self, kind: CollectionType, id: &str) -> Result<&MetadataObject> {
        self.working_set
            .get(kind, id)
            .ok_or_else(|| MetafixError::RecordNotFound {
                collection: kind.to_string(),
                id: id.to_string(),
            })
    }

    /// Clone the requested records, reporting ids that are not in the working set.
    fn snapshot(&self, kind: CollectionType, ids: &[String]) -> (Vec<MetadataObject>, Vec<ItemFailure>) {
        let mut objects = Vec::with_capacity(ids.len());
        let mut failures = Vec::new();
        let mut seen = BTreeSet::new();

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.object(kind, id) {
                Ok(object) => objects.push(object.clone()),
                Err(e) => failures.push(ItemFailure {
                    id: id.clone(),
                    name: id.clone(),
                    message: e.to_string(),
                }),
            }
        }
        (objects, failures)
    }

    fn apply_event(&mut self, kind: CollectionType, id: &str, event: RowEvent) -> Result<Transition> {
        let current = self.state(kind, id).ok_or_else(|| MetafixError::RecordNotFound {
            collection: kind.to_string(),
            id: id.to_string(),
        })?;

        let transition = current.apply(event)?;
        match transition {
            Transition::Row(next) => {
                self.states.insert((kind, id.to_string()), next);
            }
            Transition::Fixed => {
                self.states.remove(&(kind, id.to_string()));
                self.working_set.remove(kind, id);
                if self.working_set.collection(kind).is_none() {
                    info!("All {} records are clean", kind);
                }
            }
        }
        Ok(transition)
    }

    fn apply_repair(&mut self, kind: CollectionType, outcome: RepairOutcome) -> Result<RepairReport> {
        let id = outcome.object.id.clone();
        let name = outcome.object.display_name();
        let transition = self.apply_event(kind, &id, outcome.event())?;

        let status = match transition {
            _ if !outcome.patched => RepairStatus::Skipped,
            Transition::Fixed => RepairStatus::Fixed,
            Transition::Row(_) => {
                if let Some(object) = self
                    .working_set
                    .collection_mut(kind)
                    .and_then(|collection| collection.get_mut(&id))
                {
                    *object = outcome.object;
                }
                RepairStatus::PartiallyFixed
            }
        };

        Ok(RepairReport {
            id,
            name,
            status,
            operations: outcome.operations,
        })
    }
}

fn notify(observer: Option<&ProgressObserver>, progress: &BatchProgress) {
    if let Some(observer) = observer {
        observer(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use crate::store::mock::{Call, MockStore};
    use crate::store::ScanAnchor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn session_with(store: MockStore, kind: CollectionType, objects: Vec<MetadataObject>) -> (Session, Arc<MockStore>) {
        let store = Arc::new(store);
        let mut collection = Collection::new(kind);
        for object in objects {
            collection.insert(object);
        }
        let session = Session::new(store.clone(), EngineConfig::default())
            .with_working_set(WorkingSet::from_collections([collection]));
        (session, store)
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_acme_is_fixed_and_removed() {
        let acme = MetadataObject::new("A1")
            .with_field(Field::Name, "  Acme  ")
            .with_field(Field::Code, "AC1");
        let (session, store) = session_with(MockStore::new(), CollectionType::DataElements, vec![acme]);
        let mut session = session.with_selection(FieldSelection::only(Field::Name));

        let outcome = session.check_one(CollectionType::DataElements, "A1").await.unwrap();
        assert_eq!(outcome.new_state, RowState::Ready);
        assert_eq!(session.state(CollectionType::DataElements, "A1"), Some(RowState::Ready));

        let report = session.fix_one(CollectionType::DataElements, "A1").await.unwrap();
        assert_eq!(report.status, RepairStatus::Fixed);
        assert_eq!(report.operations, vec![PatchOperation::set(Field::Name, "Acme")]);
        assert_eq!(session.state(CollectionType::DataElements, "A1"), None);
        assert!(session.is_empty());
        assert_eq!(store.patch_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_foo_pair_conflicts_and_cannot_be_fixed() {
        let (session, store) = session_with(
            MockStore::new(),
            CollectionType::Indicators,
            vec![
                MetadataObject::new("B1").with_field(Field::Name, "Foo "),
                MetadataObject::new("B2").with_field(Field::Name, "Foo"),
            ],
        );
        let mut session = session.with_selection(FieldSelection::only(Field::Name));

        let summary = session
            .check_many(CollectionType::Indicators, &ids(&["B1", "B2"]))
            .await;
        assert_eq!(summary.conflicted, 2);
        assert_eq!(summary.ready, 0);
        assert!(summary
            .conflicts
            .iter()
            .any(|c| c.object_id == "B1" && c.conflicting_object_id == "B2"));

        let err = session.fix_one(CollectionType::Indicators, "B1").await.unwrap_err();
        assert!(matches!(err, MetafixError::RepairNotPermitted { .. }));

        let summary = session.fix_many(CollectionType::Indicators, &ids(&["B1", "B2"])).await;
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.fixed, 0);
        assert!(store.patch_calls().is_empty());
        assert_eq!(session.state(CollectionType::Indicators, "B1"), Some(RowState::Conflict));
    }

    #[tokio::test]
    async fn test_selection_change_requires_recheck() {
        let (session, store) = session_with(
            MockStore::new(),
            CollectionType::Options,
            vec![MetadataObject::new("o1").with_field(Field::Name, "Yes ")],
        );
        let mut session = session;

        session.check_one(CollectionType::Options, "o1").await.unwrap();
        assert!(session.can_repair(CollectionType::Options, "o1"));

        session.set_selection(FieldSelection::only(Field::Code));
        assert_eq!(session.state(CollectionType::Options, "o1"), Some(RowState::Unchecked));
        assert!(session.fix_one(CollectionType::Options, "o1").await.is_err());
        assert!(store.patch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_partial_fix_keeps_row_with_cleaned_fields() {
        let object = MetadataObject::new("p1")
            .with_field(Field::Name, "Half  done")
            .with_field(Field::Description, " still dirty");
        let (session, _store) = session_with(MockStore::new(), CollectionType::DataSets, vec![object]);
        let mut session = session.with_selection(FieldSelection::only(Field::Name));

        session.check_one(CollectionType::DataSets, "p1").await.unwrap();
        let report = session.fix_one(CollectionType::DataSets, "p1").await.unwrap();

        assert_eq!(report.status, RepairStatus::PartiallyFixed);
        assert_eq!(
            session.state(CollectionType::DataSets, "p1"),
            Some(RowState::PartiallyFixed)
        );
        let stored = session.working_set().get(CollectionType::DataSets, "p1").unwrap();
        assert_eq!(stored.get(Field::Name), Some("Half done"));
        assert_eq!(stored.get(Field::Description), Some(" still dirty"));

        // Re-entering detection is allowed from PartiallyFixed.
        let outcome = session.check_one(CollectionType::DataSets, "p1").await.unwrap();
        assert_eq!(outcome.new_state, RowState::Ready);
    }

    #[tokio::test]
    async fn test_nothing_selected_to_clean_sends_no_patch() {
        let object = MetadataObject::new("s1")
            .with_field(Field::Name, "Clean")
            .with_field(Field::Code, " S1");
        let (session, store) = session_with(MockStore::new(), CollectionType::Options, vec![object]);
        let mut session = session.with_selection(FieldSelection::only(Field::Name));

        session.check_one(CollectionType::Options, "s1").await.unwrap();
        let report = session.fix_one(CollectionType::Options, "s1").await.unwrap();

        assert_eq!(report.status, RepairStatus::Skipped);
        assert!(report.operations.is_empty());
        assert!(store.patch_calls().is_empty());
        assert_eq!(
            session.state(CollectionType::Options, "s1"),
            Some(RowState::PartiallyFixed)
        );
    }

    #[tokio::test]
    async fn test_fix_many_counts_rows_without_patches() {
        let (session, store) = session_with(
            MockStore::new(),
            CollectionType::Options,
            vec![
                MetadataObject::new("s1")
                    .with_field(Field::Name, "Clean")
                    .with_field(Field::Code, " S1"),
                MetadataObject::new("s2").with_field(Field::Name, "Dirty  name"),
            ],
        );
        let mut session = session.with_selection(FieldSelection::only(Field::Name));
        let all = ids(&["s1", "s2"]);

        session.check_many(CollectionType::Options, &all).await;
        let summary = session.fix_many(CollectionType::Options, &all).await;

        assert_eq!(summary.fixed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.message(), "2 objects fixed, 0 objects failed.");
        assert_eq!(store.patch_calls().len(), 1);
        assert_eq!(
            session.state(CollectionType::Options, "s1"),
            Some(RowState::PartiallyFixed)
        );
    }

    #[tokio::test]
    async fn test_failed_patch_moves_row_to_error_only() {
        let (session, store) = session_with(
            MockStore::new().failing_patch("bad"),
            CollectionType::Programs,
            vec![
                MetadataObject::new("bad").with_field(Field::Name, "Bad  one"),
                MetadataObject::new("good").with_field(Field::Name, "Good  one"),
            ],
        );
        let mut session = session;
        let all = ids(&["bad", "good"]);

        let summary = session.check_many(CollectionType::Programs, &all).await;
        assert_eq!(summary.ready, 2);

        let summary = session.fix_many(CollectionType::Programs, &all).await;
        assert_eq!(summary.fixed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].id, "bad");
        assert_eq!(summary.message(), "1 objects fixed, 1 objects failed.");

        assert_eq!(session.state(CollectionType::Programs, "bad"), Some(RowState::Error));
        assert_eq!(session.state(CollectionType::Programs, "good"), None);
        let bad = session.working_set().get(CollectionType::Programs, "bad").unwrap();
        assert_eq!(bad.get(Field::Name), Some("Bad  one"));
        assert_eq!(store.patch_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fix_one_reports_store_failure() {
        let (mut session, _store) = session_with(
            MockStore::new().failing_patch("x"),
            CollectionType::Options,
            vec![MetadataObject::new("x").with_field(Field::Name, " x")],
        );

        session.check_one(CollectionType::Options, "x").await.unwrap();
        let report = session.fix_one(CollectionType::Options, "x").await.unwrap();
        assert!(matches!(report.status, RepairStatus::Failed { .. }));
        assert_eq!(session.state(CollectionType::Options, "x"), Some(RowState::Error));
    }

    #[tokio::test]
    async fn test_missing_records_are_local_failures() {
        let (mut session, _store) = session_with(
            MockStore::new(),
            CollectionType::Options,
            vec![MetadataObject::new("here").with_field(Field::Name, "A  B")],
        );

        assert!(matches!(
            session.check_one(CollectionType::Options, "gone").await,
            Err(MetafixError::RecordNotFound { .. })
        ));

        let summary = session
            .check_many(CollectionType::Options, &ids(&["here", "gone"]))
            .await;
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].id, "gone");
    }

    #[tokio::test]
    async fn test_progress_observer_sees_every_chunk() {
        let objects: Vec<MetadataObject> = (0..45)
            .map(|i| MetadataObject::new(format!("id{}", i)).with_field(Field::Name, format!("Item  {}", i)))
            .collect();
        let all: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
        let (session, _store) = session_with(MockStore::new(), CollectionType::Constants, objects);

        let chunks = Arc::new(AtomicUsize::new(0));
        let counter = chunks.clone();
        let mut session = session.with_progress_observer(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let summary = session.check_many(CollectionType::Constants, &all).await;
        assert_eq!(summary.ready, 45);
        assert_eq!(chunks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_scan_merges_and_tolerates_failures() {
        let name_double = ScanQuery {
            field: Field::Name,
            anchor: ScanAnchor::DoubleSpace,
        };
        let name_trailing = ScanQuery {
            field: Field::Name,
            anchor: ScanAnchor::Trailing,
        };
        let store = MockStore::new()
            .with_scan_response(
                name_double,
                json!({"dataElements": [{"id": "de1", "name": "A  B "}], "system": {}}),
            )
            .with_scan_response(
                name_trailing,
                json!({"dataElements": [{"id": "de1", "name": "A  B "}, {"id": "de2", "name": "C "}]}),
            );
        let store = Arc::new(store);
        let mut session = Session::new(
            store.clone(),
            EngineConfig::default().with_scan_attempts(1),
        );

        let report = session.scan().await.unwrap();
        assert_eq!(report.requests, 9);
        assert_eq!(report.failed_requests, 7);
        assert_eq!(report.objects, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(session.ids(CollectionType::DataElements), vec!["de1", "de2"]);
        assert_eq!(
            session.state(CollectionType::DataElements, "de2"),
            Some(RowState::Unchecked)
        );
        let scans = store
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Scan(_)))
            .count();
        assert_eq!(scans, 9);
    }

    #[tokio::test]
    async fn test_scan_fails_when_every_request_fails() {
        let mut session = Session::new(
            Arc::new(MockStore::new()),
            EngineConfig::default().with_scan_attempts(1),
        );
        assert!(session.scan().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_timeout_moves_row_to_error() {
        let (session, _store) = session_with(
            MockStore::new().with_delay("slow", Duration::from_secs(60)),
            CollectionType::DataElements,
            vec![
                MetadataObject::new("slow").with_field(Field::Name, "Slow  one"),
                MetadataObject::new("quick").with_field(Field::Name, "Quick  one"),
            ],
        );
        let mut session = Session {
            config: EngineConfig::default().with_item_timeout(Some(Duration::from_secs(5))),
            ..session
        };

        let summary = session
            .check_many(CollectionType::DataElements, &ids(&["slow", "quick"]))
            .await;
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].message.starts_with("Timed out"));
        assert_eq!(
            session.state(CollectionType::DataElements, "slow"),
            Some(RowState::Error)
        );
        assert!(!session.can_repair(CollectionType::DataElements, "slow"));
    }

    #[test]
    fn test_unapplied_repair_keeps_record_name() {
        let (mut session, _store) = session_with(
            MockStore::new(),
            CollectionType::Options,
            vec![MetadataObject::new("here").with_field(Field::Name, "Here  now")],
        );
        let outcome = RepairOutcome {
            patched: true,
            still_dirty: false,
            object: MetadataObject::new("ghost").with_field(Field::Name, "Ghost  row"),
            operations: vec![PatchOperation::set(Field::Name, "Ghost row")],
        };

        let mut summary = FixSummary::default();
        session.tally_repair(CollectionType::Options, outcome, &mut summary);

        assert_eq!(summary.succeeded(), 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].id, "ghost");
        assert_eq!(summary.failures[0].name, "Ghost row");
        assert!(summary.failures[0].message.contains("not found"));
    }

    #[test]
    fn test_plan_is_a_dry_run() {
        let (session, store) = session_with(
            MockStore::new(),
            CollectionType::Options,
            vec![
                MetadataObject::new("o1").with_field(Field::Code, " O1"),
                MetadataObject::new("o2").with_field(Field::Code, "O2"),
            ],
        );

        let planned = session.plan(CollectionType::Options, &ids(&["o1", "o2"]));
        assert_eq!(
            planned,
            vec![("o1".to_string(), vec![PatchOperation::set(Field::Code, "O1")])]
        );
        assert!(store.calls().is_empty());
    }
}
