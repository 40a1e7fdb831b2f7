use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::item::{Item, ItemField};
use crate::models::view::ListingView;
use crate::services::mapper::FetchNotice;

type FieldKey = (String, ItemField);

/// An item that left the visible list because of a local write, kept so a
/// later write (restore, revert) can put it back where it was.
#[derive(Debug, Clone)]
struct Detached {
    index: usize,
    item: Item,
}

/// One issued mutation on a pair that has not been answered yet.
#[derive(Debug, Clone)]
struct Outstanding {
    token: u64,
    value: bool,
    deleted_at: Option<DateTime<Utc>>,
}

/// Bookkeeping for one `(item, field)` pair while mutations are in flight.
#[derive(Debug, Clone)]
struct InFlight {
    /// Last value the backend is known to hold for this field.
    confirmed: bool,
    confirmed_deleted_at: Option<DateTime<Utc>>,
    /// Token of the newest mutation that succeeded; older successes are stale.
    applied: u64,
    /// Unanswered mutations in issue order.
    outstanding: Vec<Outstanding>,
}

/// Local state of one listing screen. Never shared between screens.
#[derive(Debug)]
pub struct ListState {
    view: ListingView,
    items: Vec<Item>,
    detached: HashMap<String, Detached>,
    in_flight: HashMap<FieldKey, InFlight>,
    next_token: u64,
    generation: u64,
    closed: bool,
    notices: Vec<FetchNotice>,
    last_error: Option<String>,
}

/// Result of writing a field locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWrite {
    pub token: u64,
    pub previous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    Confirmed,
    Reverted,
    Superseded,
}

impl ListState {
    pub fn new(view: ListingView) -> Self {
        Self {
            view,
            items: Vec::new(),
            detached: HashMap::new(),
            in_flight: HashMap::new(),
            next_token: 0,
            generation: 0,
            closed: false,
            notices: Vec::new(),
            last_error: None,
        }
    }

    pub fn view(&self) -> &ListingView {
        &self.view
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.in_flight.clear();
    }

    pub fn notices(&self) -> &[FetchNotice] {
        &self.notices
    }

    pub fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Starts a fetch; only the newest one may install its result.
    pub fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Installs fetched items unless a newer fetch started or the screen was
    /// torn down. Returns whether the items were installed.
    pub fn replace(
        &mut self,
        generation: u64,
        items: Vec<Item>,
        notices: Vec<FetchNotice>,
    ) -> bool {
        if self.closed || generation != self.generation {
            return false;
        }
        self.items = items;
        self.notices = notices;
        self.detached.clear();
        true
    }

    /// Changes the screen's predicate (e.g. navigating into a folder). The
    /// list is emptied until the next fetch.
    pub fn set_view(&mut self, view: ListingView) {
        self.view = view;
        self.items.clear();
        self.detached.clear();
        self.generation += 1;
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Item> {
        if let Some(pos) = self.items.iter().position(|item| item.id == id) {
            return self.items.get_mut(pos);
        }
        self.detached.get_mut(id).map(|entry| &mut entry.item)
    }

    pub fn find(&self, id: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .or_else(|| self.detached.get(id).map(|entry| &entry.item))
    }

    /// Writes `field` on the item, computing the new value from the current
    /// one, and registers a token for the pair. `None` when the item is not
    /// held locally.
    pub fn write_field<F>(
        &mut self,
        id: &str,
        field: ItemField,
        next: F,
        now: DateTime<Utc>,
    ) -> Option<(LocalWrite, bool)>
    where
        F: FnOnce(bool) -> bool,
    {
        if self.closed {
            return None;
        }
        let item = self.find_mut(id)?;
        let previous = item.field(field);
        let previous_deleted_at = item.deleted_at;
        let value = next(previous);
        item.set_field(field, value, now);
        let deleted_at = item.deleted_at;

        self.next_token += 1;
        let token = self.next_token;
        self.in_flight
            .entry((id.to_string(), field))
            .or_insert(InFlight {
                confirmed: previous,
                confirmed_deleted_at: previous_deleted_at,
                applied: 0,
                outstanding: Vec::new(),
            })
            .outstanding
            .push(Outstanding {
                token,
                value,
                deleted_at,
            });
        self.settle_membership(id);

        Some((LocalWrite { token, previous }, value))
    }

    /// Applies the backend's answer for mutation `token`. A failure only
    /// moves the local value when no newer mutation on the pair is still
    /// unanswered and none newer has succeeded; it then falls back to the
    /// newest older mutation in flight, or to the confirmed value. A success
    /// older than an applied one is stale.
    pub fn reconcile(
        &mut self,
        id: &str,
        field: ItemField,
        token: u64,
        value: bool,
        ok: bool,
    ) -> Reconcile {
        let key = (id.to_string(), field);
        let Some(entry) = self.in_flight.get_mut(&key) else {
            return Reconcile::Superseded;
        };
        let Some(pos) = entry.outstanding.iter().position(|m| m.token == token) else {
            return Reconcile::Superseded;
        };
        let resolved = entry.outstanding.remove(pos);
        let newer_pending = pos < entry.outstanding.len();

        let (verdict, shown) = if ok {
            if token > entry.applied {
                entry.applied = token;
                entry.confirmed = value;
                entry.confirmed_deleted_at = resolved.deleted_at;
            }
            let shown = (!newer_pending).then_some((entry.confirmed, entry.confirmed_deleted_at));
            (Reconcile::Confirmed, shown)
        } else if newer_pending || token < entry.applied {
            (Reconcile::Superseded, None)
        } else {
            let applied = entry.applied;
            let shown = entry
                .outstanding
                .iter()
                .rev()
                .find(|m| m.token > applied)
                .map(|m| (m.value, m.deleted_at))
                .unwrap_or((entry.confirmed, entry.confirmed_deleted_at));
            (Reconcile::Reverted, Some(shown))
        };

        if entry.outstanding.is_empty() {
            self.in_flight.remove(&key);
        }

        if let Some((shown, shown_deleted_at)) = shown {
            if let Some(item) = self.find_mut(id) {
                match field {
                    ItemField::Starred => item.starred = shown,
                    ItemField::Shared => item.shared = shown,
                    ItemField::Deleted => {
                        item.deleted = shown;
                        item.deleted_at = shown_deleted_at;
                    }
                }
                self.settle_membership(id);
            }
        }
        verdict
    }

    /// Drops the item from view and memory without touching the backend.
    pub fn forget(&mut self, id: &str) -> Option<Item> {
        self.in_flight.retain(|(key_id, _), _| key_id != id);
        if let Some(pos) = self.items.iter().position(|item| item.id == id) {
            return Some(self.items.remove(pos));
        }
        self.detached.remove(id).map(|entry| entry.item)
    }

    /// Moves an item between the visible list and the detached set so the
    /// visible list always matches the view.
    fn settle_membership(&mut self, id: &str) {
        if let Some(pos) = self.items.iter().position(|item| item.id == id) {
            if !self.view.matches(&self.items[pos]) {
                let item = self.items.remove(pos);
                self.detached.insert(id.to_string(), Detached { index: pos, item });
            }
            return;
        }

        let rejoins = self
            .detached
            .get(id)
            .is_some_and(|entry| self.view.matches(&entry.item));
        if rejoins {
            if let Some(entry) = self.detached.remove(id) {
                let index = entry.index.min(self.items.len());
                self.items.insert(index, entry.item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemKind;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            name: id.to_string(),
            kind: ItemKind::File {
                size_bytes: 1,
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

    fn loaded(view: ListingView, ids: &[&str]) -> ListState {
        let mut state = ListState::new(view);
        let generation = state.begin_fetch();
        state.replace(generation, ids.iter().map(|id| item(id)).collect(), Vec::new());
        state
    }

    fn ids(state: &ListState) -> Vec<&str> {
        state.items().iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn deleted_item_leaves_and_rejoins_at_its_position() {
        let mut state = loaded(ListingView::all(""), &["a", "b", "c"]);
        let now = Utc::now();

        state.write_field("b", ItemField::Deleted, |_| true, now).unwrap();
        assert_eq!(ids(&state), vec!["a", "c"]);
        assert!(state.find("b").is_some());

        state.write_field("b", ItemField::Deleted, |_| false, now).unwrap();
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn failed_latest_mutation_reverts_to_confirmed_value() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let (write, value) = state
            .write_field("a", ItemField::Starred, |v| !v, Utc::now())
            .unwrap();
        assert!(value);
        assert!(!write.previous);

        let outcome = state.reconcile("a", ItemField::Starred, write.token, value, false);
        assert_eq!(outcome, Reconcile::Reverted);
        assert!(!state.find("a").unwrap().starred);
    }

    #[test]
    fn superseded_failure_keeps_newer_value() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let now = Utc::now();
        let (first, _) = state.write_field("a", ItemField::Shared, |_| true, now).unwrap();
        let (second, _) = state.write_field("a", ItemField::Shared, |_| false, now).unwrap();

        assert_eq!(
            state.reconcile("a", ItemField::Shared, first.token, true, false),
            Reconcile::Superseded
        );
        assert!(!state.find("a").unwrap().shared);

        assert_eq!(
            state.reconcile("a", ItemField::Shared, second.token, false, true),
            Reconcile::Confirmed
        );
        assert!(!state.find("a").unwrap().shared);
    }

    #[test]
    fn revert_after_confirmed_older_mutation_uses_confirmed_value() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let now = Utc::now();
        let (first, _) = state.write_field("a", ItemField::Starred, |_| true, now).unwrap();
        let (second, _) = state.write_field("a", ItemField::Starred, |_| false, now).unwrap();

        state.reconcile("a", ItemField::Starred, first.token, true, true);
        state.reconcile("a", ItemField::Starred, second.token, false, false);
        assert!(state.find("a").unwrap().starred);
    }

    #[test]
    fn newest_failure_before_older_success_ends_on_backend_value() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let now = Utc::now();
        let (first, _) = state.write_field("a", ItemField::Starred, |_| true, now).unwrap();
        let (second, _) = state.write_field("a", ItemField::Starred, |_| false, now).unwrap();

        assert_eq!(
            state.reconcile("a", ItemField::Starred, second.token, false, false),
            Reconcile::Reverted
        );
        assert!(state.find("a").unwrap().starred);

        assert_eq!(
            state.reconcile("a", ItemField::Starred, first.token, true, true),
            Reconcile::Confirmed
        );
        assert!(state.find("a").unwrap().starred);
        assert!(state.in_flight.is_empty());
    }

    #[test]
    fn both_failing_in_reverse_order_restores_original() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let now = Utc::now();
        let (first, _) = state.write_field("a", ItemField::Starred, |_| true, now).unwrap();
        let (second, _) = state.write_field("a", ItemField::Starred, |_| false, now).unwrap();

        state.reconcile("a", ItemField::Starred, second.token, false, false);
        assert_eq!(
            state.reconcile("a", ItemField::Starred, first.token, true, false),
            Reconcile::Reverted
        );
        assert!(!state.find("a").unwrap().starred);
    }

    #[test]
    fn stale_older_success_does_not_override_newer_success() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        let now = Utc::now();
        let (first, _) = state.write_field("a", ItemField::Starred, |_| true, now).unwrap();
        let (second, _) = state.write_field("a", ItemField::Starred, |_| false, now).unwrap();

        state.reconcile("a", ItemField::Starred, second.token, false, true);
        state.reconcile("a", ItemField::Starred, first.token, true, true);
        assert!(!state.find("a").unwrap().starred);
    }

    #[test]
    fn delete_failing_after_restore_succeeds_keeps_item_visible() {
        let mut state = loaded(ListingView::all(""), &["a", "b"]);
        let now = Utc::now();
        let (delete, _) = state.write_field("a", ItemField::Deleted, |_| true, now).unwrap();
        let (restore, _) = state.write_field("a", ItemField::Deleted, |_| false, now).unwrap();

        state.reconcile("a", ItemField::Deleted, restore.token, false, true);
        assert_eq!(
            state.reconcile("a", ItemField::Deleted, delete.token, true, false),
            Reconcile::Superseded
        );
        assert_eq!(ids(&state), vec!["a", "b"]);
        assert!(state.find("a").unwrap().deleted_at.is_none());
    }

    #[test]
    fn stale_fetch_is_not_installed() {
        let mut state = ListState::new(ListingView::Trash);
        let old = state.begin_fetch();
        let new = state.begin_fetch();

        assert!(!state.replace(old, vec![item("stale")], Vec::new()));
        assert!(state.replace(new, vec![item("fresh")], Vec::new()));
        assert_eq!(ids(&state), vec!["fresh"]);
    }

    #[test]
    fn closed_state_ignores_writes() {
        let mut state = loaded(ListingView::all(""), &["a"]);
        state.close();
        assert!(state
            .write_field("a", ItemField::Starred, |v| !v, Utc::now())
            .is_none());
    }

    #[test]
    fn forget_removes_from_view_and_detached() {
        let mut state = loaded(ListingView::Trash, &["a"]);
        let mut gone = item("b");
        gone.deleted = true;
        state.items.push(gone);

        assert!(state.forget("a").is_some());
        assert!(state.forget("a").is_none());
        assert_eq!(ids(&state), vec!["b"]);
    }
}
