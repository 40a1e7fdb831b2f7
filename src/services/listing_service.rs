use std::sync::{Arc, Mutex};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::data::gateway::RemoteGateway;
use crate::models::item::{Item, ItemField};
use crate::models::session::Session;
use crate::models::view::ListingView;
use crate::services::mapper::{fetch_items, FetchNotice};
use crate::services::mutation_service::{
    lock, MutationOutcome, MutationProtocol, PendingMutation, RetentionPolicy,
};
use crate::state::ListState;

/// Broadcast "something changed, refetch" to every listening screen, e.g.
/// after an upload finishes.
#[derive(Debug, Clone)]
pub struct RefreshSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|count| *count = count.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// One listing screen. Owns its list; nothing is shared with other
/// controllers, so a change on one screen shows up elsewhere after their
/// next refresh.
pub struct ListingController {
    gateway: Arc<dyn RemoteGateway>,
    session: Mutex<Session>,
    state: Arc<Mutex<ListState>>,
    protocol: MutationProtocol,
}

impl ListingController {
    pub fn new(gateway: Arc<dyn RemoteGateway>, session: Session, view: ListingView) -> Self {
        Self::with_retention(gateway, session, view, RetentionPolicy::default())
    }

    pub fn with_retention(
        gateway: Arc<dyn RemoteGateway>,
        session: Session,
        view: ListingView,
        retention: RetentionPolicy,
    ) -> Self {
        let state = Arc::new(Mutex::new(ListState::new(view)));
        let protocol = MutationProtocol::new(state.clone(), gateway.clone(), retention);
        Self {
            gateway,
            session: Mutex::new(session),
            state,
            protocol,
        }
    }

    pub fn session(&self) -> Session {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn view(&self) -> ListingView {
        lock(&self.state).view().clone()
    }

    /// Snapshot of the visible list.
    pub fn items(&self) -> Vec<Item> {
        lock(&self.state).items().to_vec()
    }

    pub fn notices(&self) -> Vec<FetchNotice> {
        lock(&self.state).notices().to_vec()
    }

    /// Last user-facing failure message, cleared on read.
    pub fn take_error(&self) -> Option<String> {
        lock(&self.state).take_error()
    }

    pub fn is_torn_down(&self) -> bool {
        lock(&self.state).is_closed()
    }

    /// Refetches and replaces the list. Returns `false` when the result was
    /// dropped because a newer refresh started or the screen was torn down.
    pub async fn refresh(&self) -> bool {
        let (generation, view) = {
            let mut state = lock(&self.state);
            if state.is_closed() {
                return false;
            }
            (state.begin_fetch(), state.view().clone())
        };
        let session = self.session();

        let mut report = fetch_items(self.gateway.as_ref(), &session, &view.query()).await;
        view.arrange(&mut report.items);
        let count = report.items.len();

        let installed = lock(&self.state).replace(generation, report.items, report.notices);
        if installed {
            tracing::debug!(%view, count, "listing refreshed");
        } else {
            tracing::debug!(%view, generation, "dropping stale listing result");
        }
        installed
    }

    /// Swaps the session. A different owner invalidates the list, so it is
    /// refetched; returns whether that happened.
    pub async fn set_session(&self, session: Session) -> bool {
        let owner_changed = {
            let mut current = self
                .session
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let changed = current.owner_id != session.owner_id;
            *current = session;
            changed
        };
        if owner_changed {
            self.refresh().await;
        }
        owner_changed
    }

    /// Switches the screen's predicate (e.g. opening a sub-folder) and loads it.
    pub async fn navigate(&self, view: ListingView) -> bool {
        lock(&self.state).set_view(view);
        self.refresh().await
    }

    /// Fuzzy name filter over the local list, best match first. A blank
    /// query returns the list unchanged.
    pub fn search(&self, query: &str) -> Vec<Item> {
        let query = query.trim();
        let items = self.items();
        if query.is_empty() {
            return items;
        }

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, Item)> = items
            .into_iter()
            .filter_map(|item| {
                matcher
                    .fuzzy_match(&item.name, query)
                    .map(|score| (score, item))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, item)| item).collect()
    }

    pub fn toggle_star(&self, item_id: &str) -> Option<PendingMutation> {
        self.protocol.toggle(&self.session(), item_id, ItemField::Starred)
    }

    pub fn toggle_share(&self, item_id: &str) -> Option<PendingMutation> {
        self.protocol.toggle(&self.session(), item_id, ItemField::Shared)
    }

    pub fn delete(&self, item_id: &str) -> Option<PendingMutation> {
        self.protocol.delete(&self.session(), item_id)
    }

    pub fn restore(&self, item_id: &str) -> Option<PendingMutation> {
        self.protocol.restore(&self.session(), item_id)
    }

    pub async fn permanently_delete(&self, item_id: &str) -> Option<MutationOutcome> {
        self.protocol
            .permanently_delete(&self.session(), item_id)
            .await
    }

    fn trashed_ids(&self) -> Vec<String> {
        lock(&self.state)
            .items()
            .iter()
            .filter(|item| item.deleted)
            .map(|item| item.id.clone())
            .collect()
    }

    /// Restores every trashed item in view. All items leave the trash at
    /// once; the updates are settled concurrently.
    pub async fn restore_all(&self) -> Vec<MutationOutcome> {
        let ids = self.trashed_ids();
        self.restore_trashed(ids).await
    }

    /// Restores the chosen trashed items. Ids not in the trash view are
    /// skipped.
    pub async fn restore_selected(&self, item_ids: &[&str]) -> Vec<MutationOutcome> {
        let ids = self.selected_trashed_ids(item_ids);
        self.restore_trashed(ids).await
    }

    /// Permanently deletes every trashed item in view under the controller's
    /// retention policy.
    pub async fn empty_trash(&self) -> Vec<MutationOutcome> {
        let ids = self.trashed_ids();
        self.purge_trashed(ids).await
    }

    /// Permanently deletes the chosen trashed items. Ids not in the trash
    /// view are skipped.
    pub async fn permanently_delete_selected(&self, item_ids: &[&str]) -> Vec<MutationOutcome> {
        let ids = self.selected_trashed_ids(item_ids);
        self.purge_trashed(ids).await
    }

    fn selected_trashed_ids(&self, item_ids: &[&str]) -> Vec<String> {
        let trashed = self.trashed_ids();
        let (known, unknown): (Vec<&str>, Vec<&str>) = item_ids
            .iter()
            .copied()
            .partition(|id| trashed.iter().any(|t| t.as_str() == *id));
        if !unknown.is_empty() {
            tracing::debug!(?unknown, "selected items not in trash; skipping");
        }
        known.into_iter().map(str::to_string).collect()
    }

    async fn restore_trashed(&self, ids: Vec<String>) -> Vec<MutationOutcome> {
        let session = self.session();
        let mut join_set = JoinSet::new();
        for id in ids {
            if let Some(pending) = self.protocol.restore(&session, &id) {
                join_set.spawn(pending.settle());
            }
        }
        collect(join_set).await
    }

    async fn purge_trashed(&self, ids: Vec<String>) -> Vec<MutationOutcome> {
        let session = self.session();
        let mut join_set = JoinSet::new();
        for id in ids {
            let protocol = self.protocol.clone();
            let session = session.clone();
            join_set.spawn(async move { protocol.permanently_delete(&session, &id).await });
        }
        collect(join_set)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Marks the screen gone. Pending responses that arrive later are
    /// discarded without touching the list.
    pub fn teardown(&self) {
        lock(&self.state).close();
        tracing::debug!("listing controller torn down");
    }

    /// Refreshes whenever `signal` fires, until the controller is torn down
    /// or the signal is dropped.
    pub fn follow(self: &Arc<Self>, signal: &RefreshSignal) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut rx = signal.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if controller.is_torn_down() {
                    break;
                }
                controller.refresh().await;
            }
        })
    }
}

async fn collect<T: 'static>(mut join_set: JoinSet<T>) -> Vec<T> {
    let mut results = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(error = %e, "mutation task failed"),
        }
    }
    results
}
