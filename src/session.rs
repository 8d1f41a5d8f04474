use std::time::Instant;

use log::warn;

use crate::autosave::{AutosaveScheduler, FlushOutcome, flush_if_dirty};
use crate::config::Config;
use crate::gateway::TreeGateway;
use crate::interaction::{AppState, Effect, UiEvent};
use crate::model::TreeSummary;
use crate::viewport::Viewport;

pub const STATUS_LOADED: &str = "Loaded";
pub const STATUS_TREE_CREATED: &str = "Tree created";
pub const STATUS_TREE_DELETED: &str = "Tree deleted";

pub struct Session<G: TreeGateway> {
    state: AppState,
    gateway: G,
    scheduler: AutosaveScheduler,
}

impl<G: TreeGateway> Session<G> {
    pub fn new(gateway: G, config: &Config, now: Instant) -> Self {
        let viewport = Viewport::new(config.canvas.width, config.canvas.height);
        Self {
            state: AppState::new(config.theme.clone(), viewport),
            gateway,
            scheduler: AutosaveScheduler::new(config.autosave.debounce(), config.autosave.periodic(), now),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn scheduler(&self) -> &AutosaveScheduler {
        &self.scheduler
    }

    /// Stored trees, most recent first. A failure is posted to the status
    /// line and yields an empty list.
    pub fn list_trees(&mut self) -> Vec<TreeSummary> {
        match self.gateway.list_trees() {
            Ok(trees) => trees,
            Err(err) => {
                warn!("event=list_trees module=session status=failed error={err}");
                self.state.set_status(format!("Failed to load trees: {err}"));
                Vec::new()
            }
        }
    }

    /// Saves pending edits of the current tree, then opens `id`.
    pub fn open_tree(&mut self, id: &str, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects);
        match self.gateway.fetch_tree(id) {
            Ok(tree) => {
                self.state.open(tree);
                self.rearm(now);
                effects.push(Effect::ClosePanel);
                effects.push(self.state.set_status(STATUS_LOADED));
                effects.push(Effect::Redraw);
            }
            Err(err) => {
                warn!("event=open_tree module=session status=failed id={id} error={err}");
                effects.push(self.state.set_status(format!("Failed to load tree: {err}")));
            }
        }
        effects
    }

    /// Creates a tree (default name when `None`) and opens it.
    pub fn create_tree(&mut self, name: Option<&str>, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects);
        match self.gateway.create_tree(name) {
            Ok(tree) => {
                self.state.open(tree);
                self.rearm(now);
                effects.push(Effect::ClosePanel);
                effects.push(self.state.set_status(STATUS_TREE_CREATED));
                effects.push(Effect::Redraw);
            }
            Err(err) => {
                warn!("event=create_tree module=session status=failed error={err}");
                effects.push(self.state.set_status(format!("Failed to create tree: {err}")));
            }
        }
        effects
    }

    pub fn rename_tree(&mut self, name: &str, now: Instant) -> Vec<Effect> {
        if !self.state.rename(name) {
            return Vec::new();
        }
        self.scheduler.observe(self.state.revision(), now);
        vec![self.state.set_status(crate::interaction::STATUS_UNSAVED)]
    }

    /// Deletes the open tree from storage and closes it. On failure the tree
    /// stays open.
    pub fn delete_current_tree(&mut self) -> Vec<Effect> {
        let Some(id) = self.state.tree().map(|tree| tree.id.clone()) else {
            return vec![self.state.set_status(crate::interaction::STATUS_NO_TREE)];
        };
        match self.gateway.delete_tree(&id) {
            Ok(()) => {
                self.state.close();
                self.scheduler.cancel_debounce();
                vec![
                    Effect::ClosePanel,
                    self.state.set_status(STATUS_TREE_DELETED),
                    Effect::Redraw,
                ]
            }
            Err(err) => {
                warn!("event=delete_tree module=session status=failed id={id} error={err}");
                vec![self.state.set_status(format!("Failed to delete tree: {err}"))]
            }
        }
    }

    /// Uploads a photo for `person` and stores the returned url on the card.
    pub fn upload_photo(&mut self, person: &str, file_name: &str, bytes: &[u8], now: Instant) -> Vec<Effect> {
        let Some(tree_id) = self.state.tree().map(|tree| tree.id.clone()) else {
            return vec![self.state.set_status(crate::interaction::STATUS_NO_TREE)];
        };
        match self.gateway.upload_photo(&tree_id, file_name, bytes) {
            Ok(url) => self.handle(
                UiEvent::PhotoUploaded {
                    person: person.to_string(),
                    url,
                },
                now,
            ),
            Err(err) => {
                warn!("event=upload_photo module=session status=failed tree={tree_id} error={err}");
                vec![self.state.set_status(format!("Failed to upload photo: {err}"))]
            }
        }
    }

    /// Dispatches one UI event and restarts the debounce timer if it edited the tree.
    pub fn handle(&mut self, event: UiEvent, now: Instant) -> Vec<Effect> {
        let effects = self.state.dispatch(event);
        self.scheduler.observe(self.state.revision(), now);
        effects
    }

    /// Advances the save timers; flushes when either fired.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut fired = false;
        while self.scheduler.poll(now).is_some() {
            fired = true;
        }
        let mut effects = Vec::new();
        if fired {
            flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects);
        }
        effects
    }

    /// Saves immediately, regardless of timers.
    pub fn save_now(&mut self) -> (FlushOutcome, Vec<Effect>) {
        self.scheduler.cancel_debounce();
        let mut effects = Vec::new();
        let outcome = flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects);
        (outcome, effects)
    }

    /// Saves pending edits and hands back the gateway.
    pub fn into_gateway(mut self) -> G {
        let mut effects = Vec::new();
        flush_if_dirty(&mut self.state, &mut self.gateway, &mut effects);
        self.gateway
    }

    fn rearm(&mut self, now: Instant) {
        self.scheduler.observe(self.state.revision(), now);
        self.scheduler.cancel_debounce();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::interaction::STATUS_NO_TREE;

    fn session(now: Instant) -> Session<MemoryGateway> {
        Session::new(MemoryGateway::new(), &Config::default(), now)
    }

    #[test]
    fn edits_are_saved_after_debounce() {
        let start = Instant::now();
        let mut session = session(start);
        session.create_tree(Some("Family"), start);
        let id = session.state().tree().unwrap().id.clone();

        session.handle(UiEvent::AddPerson, start);
        assert!(session.tick(start + Duration::from_secs(1)).is_empty());
        let effects = session.tick(start + Duration::from_secs(2));
        assert!(effects.contains(&Effect::Status {
            message: crate::autosave::STATUS_SAVED.to_string()
        }));
        assert!(!session.state().is_dirty());
        assert_eq!(session.gateway().fetch_tree(&id).unwrap().data.nodes.len(), 1);
    }

    #[test]
    fn failed_save_retries_on_periodic_sweep() {
        let start = Instant::now();
        let mut session = session(start);
        session.create_tree(None, start);
        session.handle(UiEvent::AddNote, start);
        session.gateway_mut().set_offline(true);
        session.tick(start + Duration::from_secs(2));
        assert!(session.state().is_dirty());

        session.gateway_mut().set_offline(false);
        assert!(session.tick(start + Duration::from_secs(10)).is_empty());
        session.tick(start + Duration::from_secs(15));
        assert!(!session.state().is_dirty());
    }

    #[test]
    fn switching_trees_flushes_pending_edits() {
        let start = Instant::now();
        let mut session = session(start);
        session.create_tree(Some("one"), start);
        let first = session.state().tree().unwrap().id.clone();
        session.handle(UiEvent::AddPerson, start);
        session.create_tree(Some("two"), start);
        assert_eq!(session.gateway().fetch_tree(&first).unwrap().data.nodes.len(), 1);

        let effects = session.open_tree(&first, start);
        assert!(effects.contains(&Effect::Status {
            message: STATUS_LOADED.to_string()
        }));
        assert_eq!(session.state().data().unwrap().nodes.len(), 1);
        let names: Vec<_> = session.list_trees().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn photo_upload_sets_photo_ref() {
        let start = Instant::now();
        let mut session = session(start);
        assert_eq!(
            session.upload_photo("p", "a.png", b"x", start),
            vec![Effect::Status {
                message: STATUS_NO_TREE.to_string()
            }]
        );
        session.create_tree(None, start);
        session.handle(UiEvent::AddPerson, start);
        let person = session.state().data().unwrap().nodes[0].id.clone();
        session.upload_photo(&person, "a.png", b"x", start);
        let url = session.state().data().unwrap().nodes[0].photo_ref.clone().unwrap();
        assert_eq!(session.gateway().photo(&url), Some(&b"x"[..]));

        let effects = session.upload_photo(&person, "a.exe", b"x", start);
        assert!(matches!(&effects[..], [Effect::Status { message }] if message.starts_with("Failed to upload photo")));
    }

    #[test]
    fn delete_closes_the_tree() {
        let start = Instant::now();
        let mut session = session(start);
        session.create_tree(None, start);
        session.delete_current_tree();
        assert!(session.state().tree().is_none());
        assert!(session.list_trees().is_empty());
        assert_eq!(session.state().status(), STATUS_TREE_DELETED);
    }

    #[test]
    fn missing_tree_reports_status() {
        let start = Instant::now();
        let mut session = session(start);
        let effects = session.open_tree("nope", start);
        assert!(matches!(&effects[..], [Effect::Status { message }] if message.starts_with("Failed to load tree")));
        assert!(session.state().tree().is_none());
    }
}
