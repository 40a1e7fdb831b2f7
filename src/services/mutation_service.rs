use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::gateway::RemoteGateway;
use crate::error::AppError;
use crate::models::item::{ItemField, Table};
use crate::models::row::Row;
use crate::models::session::Session;
use crate::state::{ListState, Reconcile};

/// What "permanently delete" does to the backend. Rows are never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Drop the item from view only; the soft-deleted row stays as it is.
    #[default]
    NeverPurge,
    /// Also mark the row `permanently_deleted`, still without removing it.
    FlagPurged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The backend accepted the change; local state already reflects it.
    Applied,
    /// The backend rejected the change and the local field was rolled back.
    Reverted { error: String },
    /// The backend rejected the change but a newer mutation on the same
    /// field owns the local value now.
    Superseded { error: String },
    /// The screen was torn down before the response arrived.
    Discarded,
    /// Permanent delete under `NeverPurge`: nothing was sent.
    Retained,
    /// A non-revertible request failed (purge flag on an item no longer shown).
    Failed { error: String },
}

pub(crate) fn lock(state: &Mutex<ListState>) -> MutexGuard<'_, ListState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Optimistic writes against one screen's list.
#[derive(Clone)]
pub struct MutationProtocol {
    state: Arc<Mutex<ListState>>,
    gateway: Arc<dyn RemoteGateway>,
    retention: RetentionPolicy,
}

impl MutationProtocol {
    pub fn new(
        state: Arc<Mutex<ListState>>,
        gateway: Arc<dyn RemoteGateway>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            state,
            gateway,
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Writes `value` into the local list right away and returns the remote
    /// half of the mutation. `None` when the item is not held locally.
    pub fn apply(
        &self,
        session: &Session,
        item_id: &str,
        field: ItemField,
        value: bool,
    ) -> Option<PendingMutation> {
        self.begin(session, item_id, field, |_| value)
    }

    pub fn toggle(&self, session: &Session, item_id: &str, field: ItemField) -> Option<PendingMutation> {
        self.begin(session, item_id, field, |current| !current)
    }

    pub fn delete(&self, session: &Session, item_id: &str) -> Option<PendingMutation> {
        self.apply(session, item_id, ItemField::Deleted, true)
    }

    pub fn restore(&self, session: &Session, item_id: &str) -> Option<PendingMutation> {
        self.apply(session, item_id, ItemField::Deleted, false)
    }

    fn begin<F>(
        &self,
        session: &Session,
        item_id: &str,
        field: ItemField,
        next: F,
    ) -> Option<PendingMutation>
    where
        F: FnOnce(bool) -> bool,
    {
        let issued_at = Utc::now();
        let mut state = lock(&self.state);
        let Some((write, value)) = state.write_field(item_id, field, next, issued_at) else {
            tracing::debug!(item_id, %field, "mutation target not held locally; ignoring");
            return None;
        };
        let table = state.find(item_id).map(|item| item.table())?;
        drop(state);

        tracing::debug!(item_id, %field, from = write.previous, to = value, "applied locally");
        Some(PendingMutation {
            state: self.state.clone(),
            gateway: self.gateway.clone(),
            session: session.clone(),
            table,
            item_id: item_id.to_string(),
            field,
            value,
            previous: write.previous,
            token: write.token,
            issued_at,
        })
    }

    /// Removes the item from this screen. The backing row is retained under
    /// every policy; `None` when the item is not held locally.
    pub async fn permanently_delete(
        &self,
        session: &Session,
        item_id: &str,
    ) -> Option<MutationOutcome> {
        let removed = lock(&self.state).forget(item_id);
        let Some(item) = removed else {
            tracing::debug!(item_id, "permanent delete target not held locally; ignoring");
            return None;
        };

        match self.retention {
            RetentionPolicy::NeverPurge => {
                tracing::info!(item_id, table = %item.table(), "removed from view; row retained");
                Some(MutationOutcome::Retained)
            }
            RetentionPolicy::FlagPurged => {
                let mut fields = Row::new();
                fields.insert("permanently_deleted".to_string(), true.into());
                let result = self
                    .gateway
                    .update(session, item.table(), &item.id, &fields)
                    .await;
                Some(match result {
                    Ok(()) => MutationOutcome::Applied,
                    Err(e) => {
                        tracing::warn!(item_id, error = %e, "failed to flag row as purged");
                        let mut state = lock(&self.state);
                        if state.is_closed() {
                            MutationOutcome::Discarded
                        } else {
                            state.record_error(format!("Failed to delete {}: {e}", item.name));
                            MutationOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    }
                })
            }
        }
    }
}

/// The remote half of an optimistic mutation. Dropping it without settling
/// leaves the optimistic value in place.
#[must_use = "the backend is only updated when the mutation is settled"]
pub struct PendingMutation {
    state: Arc<Mutex<ListState>>,
    gateway: Arc<dyn RemoteGateway>,
    session: Session,
    table: Table,
    item_id: String,
    field: ItemField,
    value: bool,
    previous: bool,
    token: u64,
    issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMutation")
            .field("table", &self.table)
            .field("item_id", &self.item_id)
            .field("field", &self.field)
            .field("value", &self.value)
            .field("previous", &self.previous)
            .field("token", &self.token)
            .finish()
    }
}

impl PendingMutation {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn field(&self) -> ItemField {
        self.field
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn previous(&self) -> bool {
        self.previous
    }

    /// Sends the update and reconciles the local list with the answer.
    /// Failures are reported through the outcome, never as an error.
    pub async fn settle(self) -> MutationOutcome {
        let payload = self.field.update_payload(self.value, self.issued_at);
        let result = self
            .gateway
            .update(&self.session, self.table, &self.item_id, &payload)
            .await;
        self.reconcile(result)
    }

    fn reconcile(self, result: Result<(), AppError>) -> MutationOutcome {
        let mut state = lock(&self.state);
        if state.is_closed() {
            tracing::debug!(item_id = %self.item_id, field = %self.field, "late response after teardown");
            return MutationOutcome::Discarded;
        }

        let ok = result.is_ok();
        let verdict = state.reconcile(&self.item_id, self.field, self.token, self.value, ok);
        let Err(e) = result else {
            return MutationOutcome::Applied;
        };

        let error = e.to_string();
        match verdict {
            Reconcile::Reverted => {
                tracing::warn!(
                    item_id = %self.item_id,
                    field = %self.field,
                    error = %error,
                    "update failed; reverted local value"
                );
                state.record_error(format!("Failed to update {}: {error}", self.field));
                MutationOutcome::Reverted { error }
            }
            Reconcile::Superseded | Reconcile::Confirmed => {
                tracing::warn!(
                    item_id = %self.item_id,
                    field = %self.field,
                    error = %error,
                    "update failed but a newer change is pending; keeping local value"
                );
                MutationOutcome::Superseded { error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::gateway::{ListQuery, PutOptions};
    use crate::models::item::{Item, ItemKind};
    use crate::models::view::ListingView;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Answers updates from a script; records every payload it sees.
    #[derive(Default)]
    struct ScriptedGateway {
        answers: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<(Table, String, Row)>>,
    }

    impl ScriptedGateway {
        fn answering(answers: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Table, String, Row)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteGateway for ScriptedGateway {
        async fn list(&self, _: &Session, _: Table, _: &ListQuery) -> crate::error::Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn update(&self, _: &Session, table: Table, id: &str, fields: &Row) -> crate::error::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((table, id.to_string(), fields.clone()));
            let ok = self.answers.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(AppError::General("network down".to_string()))
            }
        }

        async fn insert(&self, _: &Session, _: Table, fields: &Row) -> crate::error::Result<Row> {
            Ok(fields.clone())
        }

        async fn put_object(&self, _: &Session, _: &str, _: Vec<u8>, _: &PutOptions) -> crate::error::Result<()> {
            Ok(())
        }

        async fn get_object(&self, _: &Session, _: &str) -> crate::error::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn public_url(&self, path: &str) -> String {
            path.to_string()
        }
    }

    fn file(id: &str) -> Item {
        Item {
            id: id.to_string(),
            name: format!("{id}.txt"),
            kind: ItemKind::File {
                size_bytes: 10,
                mime_type: None,
                storage_path: None,
            },
            created_at: "2025-01-01T00:00:00Z".parse().unwrap(),
            updated_at: None,
            deleted_at: None,
            starred: false,
            shared: false,
            deleted: false,
            parent_path: String::new(),
        }
    }

    fn setup(
        view: ListingView,
        items: Vec<Item>,
        gateway: Arc<ScriptedGateway>,
        retention: RetentionPolicy,
    ) -> (Arc<Mutex<ListState>>, MutationProtocol) {
        let mut state = ListState::new(view);
        let generation = state.begin_fetch();
        state.replace(generation, items, Vec::new());
        let state = Arc::new(Mutex::new(state));
        let protocol = MutationProtocol::new(state.clone(), gateway, retention);
        (state, protocol)
    }

    fn starred(state: &Arc<Mutex<ListState>>, id: &str) -> Option<bool> {
        lock(state).find(id).map(|item| item.starred)
    }

    #[tokio::test]
    async fn optimistic_value_is_visible_before_settling() {
        let gateway = ScriptedGateway::answering(&[true]);
        let (state, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway.clone(), RetentionPolicy::default());
        let session = Session::new("u1");

        let pending = protocol.toggle(&session, "f1", ItemField::Starred).unwrap();
        assert_eq!(starred(&state, "f1"), Some(true));
        assert!(gateway.calls().is_empty());

        assert_eq!(pending.settle().await, MutationOutcome::Applied);
        assert_eq!(starred(&state, "f1"), Some(true));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Table::Files);
        assert_eq!(calls[0].1, "f1");
        assert_eq!(calls[0].2["is_starred"], true);
    }

    #[tokio::test]
    async fn failed_star_reverts_to_false() {
        let gateway = ScriptedGateway::answering(&[false]);
        let (state, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway, RetentionPolicy::default());

        let pending = protocol
            .apply(&Session::new("u1"), "f1", ItemField::Starred, true)
            .unwrap();
        assert!(!pending.previous());

        let outcome = pending.settle().await;
        assert!(matches!(outcome, MutationOutcome::Reverted { .. }));
        assert_eq!(starred(&state, "f1"), Some(false));
        assert!(lock(&state).take_error().is_some());
    }

    #[tokio::test]
    async fn missing_item_is_a_no_op() {
        let gateway = ScriptedGateway::answering(&[]);
        let (_, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway.clone(), RetentionPolicy::default());

        assert!(protocol.toggle(&Session::new("u1"), "nope", ItemField::Shared).is_none());
        assert!(protocol.permanently_delete(&Session::new("u1"), "nope").await.is_none());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn last_issued_value_wins_when_all_succeed() {
        let gateway = ScriptedGateway::answering(&[true, true, true]);
        let (state, protocol) = setup(
            ListingView::all(""),
            vec![file("f1"), file("f2")],
            gateway,
            RetentionPolicy::default(),
        );
        let session = Session::new("u1");

        protocol.apply(&session, "f1", ItemField::Starred, true).unwrap().settle().await;
        protocol.apply(&session, "f2", ItemField::Shared, true).unwrap().settle().await;
        protocol.apply(&session, "f1", ItemField::Starred, false).unwrap().settle().await;

        let state = lock(&state);
        assert!(!state.find("f1").unwrap().starred);
        assert!(state.find("f2").unwrap().shared);
    }

    #[tokio::test]
    async fn stale_failure_does_not_clobber_newer_value() {
        let gateway = ScriptedGateway::answering(&[false, true]);
        let (state, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway, RetentionPolicy::default());
        let session = Session::new("u1");

        let first = protocol.apply(&session, "f1", ItemField::Starred, true).unwrap();
        let second = protocol.apply(&session, "f1", ItemField::Starred, false).unwrap();
        let third = protocol.apply(&session, "f1", ItemField::Starred, true).unwrap();
        drop(second);

        assert!(matches!(first.settle().await, MutationOutcome::Superseded { .. }));
        assert_eq!(starred(&state, "f1"), Some(true));
        assert_eq!(third.settle().await, MutationOutcome::Applied);
        assert_eq!(starred(&state, "f1"), Some(true));
    }

    #[tokio::test]
    async fn newer_failure_then_older_success_matches_backend() {
        let gateway = ScriptedGateway::answering(&[false, true]);
        let (state, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway, RetentionPolicy::default());
        let session = Session::new("u1");

        let first = protocol.apply(&session, "f1", ItemField::Starred, true).unwrap();
        let second = protocol.apply(&session, "f1", ItemField::Starred, false).unwrap();

        assert!(matches!(second.settle().await, MutationOutcome::Reverted { .. }));
        assert_eq!(starred(&state, "f1"), Some(true));
        assert_eq!(first.settle().await, MutationOutcome::Applied);
        assert_eq!(starred(&state, "f1"), Some(true));
    }

    #[tokio::test]
    async fn delete_removes_item_and_sends_timestamp() {
        let gateway = ScriptedGateway::answering(&[true]);
        let (state, protocol) = setup(
            ListingView::all(""),
            vec![file("f1"), file("f2")],
            gateway.clone(),
            RetentionPolicy::default(),
        );

        let pending = protocol.delete(&Session::new("u1"), "f1").unwrap();
        let visible: Vec<String> = lock(&state).items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(visible, vec!["f2".to_string()]);

        assert_eq!(pending.settle().await, MutationOutcome::Applied);
        let calls = gateway.calls();
        assert_eq!(calls[0].2["is_deleted"], true);
        assert!(calls[0].2["deleted_at"].is_string());
    }

    #[tokio::test]
    async fn failed_delete_puts_item_back_in_place() {
        let gateway = ScriptedGateway::answering(&[false]);
        let (state, protocol) = setup(
            ListingView::all(""),
            vec![file("f1"), file("f2"), file("f3")],
            gateway,
            RetentionPolicy::default(),
        );

        let pending = protocol.delete(&Session::new("u1"), "f2").unwrap();
        assert_eq!(lock(&state).items().len(), 2);

        pending.settle().await;
        let state = lock(&state);
        let ids: Vec<&str> = state.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);
        assert!(state.find("f2").unwrap().deleted_at.is_none());
    }

    #[tokio::test]
    async fn restore_in_trash_clears_timestamp() {
        let gateway = ScriptedGateway::answering(&[true]);
        let mut trashed = file("f1");
        trashed.deleted = true;
        trashed.deleted_at = Some(Utc::now());
        let (state, protocol) = setup(ListingView::Trash, vec![trashed], gateway.clone(), RetentionPolicy::default());

        let pending = protocol.restore(&Session::new("u1"), "f1").unwrap();
        assert!(lock(&state).items().is_empty());
        pending.settle().await;

        let calls = gateway.calls();
        assert_eq!(calls[0].2["is_deleted"], false);
        assert!(calls[0].2["deleted_at"].is_null());
    }

    #[tokio::test]
    async fn permanent_delete_never_purges_by_default() {
        let gateway = ScriptedGateway::answering(&[]);
        let mut trashed = file("f1");
        trashed.deleted = true;
        let (state, protocol) = setup(ListingView::Trash, vec![trashed], gateway.clone(), RetentionPolicy::NeverPurge);

        let outcome = protocol.permanently_delete(&Session::new("u1"), "f1").await;
        assert_eq!(outcome, Some(MutationOutcome::Retained));
        assert!(lock(&state).items().is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn flag_purged_policy_sends_non_destructive_update() {
        let gateway = ScriptedGateway::answering(&[true]);
        let mut trashed = file("f1");
        trashed.deleted = true;
        let (_, protocol) = setup(ListingView::Trash, vec![trashed], gateway.clone(), RetentionPolicy::FlagPurged);

        let outcome = protocol.permanently_delete(&Session::new("u1"), "f1").await;
        assert_eq!(outcome, Some(MutationOutcome::Applied));
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2["permanently_deleted"], true);
    }

    #[tokio::test]
    async fn late_response_after_teardown_is_discarded() {
        let gateway = ScriptedGateway::answering(&[false]);
        let (state, protocol) = setup(ListingView::all(""), vec![file("f1")], gateway, RetentionPolicy::default());

        let pending = protocol.toggle(&Session::new("u1"), "f1", ItemField::Starred).unwrap();
        lock(&state).close();

        assert_eq!(pending.settle().await, MutationOutcome::Discarded);
        assert_eq!(starred(&state, "f1"), Some(true));
    }
}
