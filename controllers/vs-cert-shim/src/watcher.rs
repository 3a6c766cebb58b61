//! Kubernetes resource watchers.
//!
//! This module watches VirtualServers and Certificates, keeps them in
//! `kube-runtime` reflector stores, and hands the changes to the correlator
//! handlers. Watch streams only deliver "this object now looks like X" and,
//! after a relist, the full set of objects; [`Informer`] looks up the state a
//! handler last saw in the store before applying each event, so it can report
//! add/update/delete with the old object.

use crate::correlator::ResourceEventHandler;
use crate::error::ControllerError;
use futures::TryStreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Objects known before a relist started, and those the relist delivered
struct Relist<K: Resource<DynamicType = ()> + 'static> {
    previous: HashMap<ObjectRef<K>, Arc<K>>,
    listed: Vec<K>,
}

/// Applies watch events to a reflector store and notifies a handler
pub struct Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: &'static str,
    writer: Writer<K>,
    cache: Store<K>,
    handler: Arc<dyn ResourceEventHandler<K>>,
    relist: Option<Relist<K>>,
    synced: bool,
}

impl<K> Debug for Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("kind", &self.kind)
            .field("synced", &self.synced)
            .finish_non_exhaustive()
    }
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    /// Feed `writer`'s store and report changes to `handler`
    pub fn new(kind: &'static str, writer: Writer<K>, handler: Arc<dyn ResourceEventHandler<K>>) -> Self {
        let cache = writer.as_reader();
        Self {
            kind,
            writer,
            cache,
            handler,
            relist: None,
            synced: false,
        }
    }

    /// Applies one watch event. Returns true when it completed the first list.
    pub fn apply(&mut self, event: watcher::Event<K>) -> bool {
        match &event {
            watcher::Event::Apply(obj) => {
                debug!(kind = self.kind, name = %obj.name_any(), "Applied");
                let previous = self.cache.get(&ObjectRef::from_obj(obj));
                self.writer.apply_watcher_event(&event);
                match previous {
                    Some(old) => self.handler.on_update(&old, obj),
                    None => self.handler.on_add(obj),
                }
                false
            }
            watcher::Event::Delete(obj) => {
                debug!(kind = self.kind, name = %obj.name_any(), "Deleted");
                let previous = self.cache.get(&ObjectRef::from_obj(obj));
                self.writer.apply_watcher_event(&event);
                // Prefer the cached copy: it is the state the handlers last saw
                self.handler.on_delete(previous.as_deref().unwrap_or(obj));
                false
            }
            watcher::Event::Init => {
                debug!(kind = self.kind, "Relist started");
                let previous = self
                    .cache
                    .state()
                    .into_iter()
                    .map(|obj| (ObjectRef::from_obj(&*obj), obj))
                    .collect();
                self.relist = Some(Relist {
                    previous,
                    listed: Vec::new(),
                });
                self.writer.apply_watcher_event(&event);
                false
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.listed.push(obj.clone());
                }
                self.writer.apply_watcher_event(&event);
                false
            }
            watcher::Event::InitDone => {
                // The store swaps in the listed objects here; notify afterwards
                // so handlers never queue work against the pre-relist state
                self.writer.apply_watcher_event(&event);
                let Relist { mut previous, listed } = self.relist.take().unwrap_or_else(|| Relist {
                    previous: HashMap::new(),
                    listed: Vec::new(),
                });
                info!(kind = self.kind, count = listed.len(), "Relist complete");
                for obj in &listed {
                    match previous.remove(&ObjectRef::from_obj(obj)) {
                        Some(old) => self.handler.on_update(&old, obj),
                        None => self.handler.on_add(obj),
                    }
                }
                for old in previous.values() {
                    self.handler.on_delete(old);
                }
                let first = !self.synced;
                self.synced = true;
                first
            }
        }
    }
}

/// Watches `api` until `cancel` fires, keeping `writer`'s store current and
/// feeding every change to `handler`.
///
/// `on_synced` runs once, after the first full list.
pub async fn watch_resource<K>(
    kind: &'static str,
    api: Api<K>,
    writer: Writer<K>,
    handler: Arc<dyn ResourceEventHandler<K>>,
    on_synced: impl Fn() + Send,
    cancel: CancellationToken,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    info!("Starting {} watcher", kind);

    let mut informer = Informer::new(kind, writer, handler);
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("{} watcher stopped", kind);
                return Ok(());
            }
            next = stream.try_next() => match next {
                Ok(Some(event)) => {
                    if informer.apply(event) {
                        info!("{} watcher initialization complete", kind);
                        on_synced();
                    }
                }
                Ok(None) => {
                    return Err(ControllerError::Watch(format!("{kind} watch stream ended")));
                }
                Err(e) => {
                    // default_backoff delays the next attempt
                    warn!("{} watcher stream error: {}", kind, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::VirtualServer;
    use kube_runtime::reflector;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl ResourceEventHandler<VirtualServer> for RecordingHandler {
        fn on_add(&self, obj: &VirtualServer) {
            self.calls.lock().unwrap().push(format!("add {}", obj.name_any()));
        }

        fn on_update(&self, old: &VirtualServer, new: &VirtualServer) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update {} {}->{}", new.name_any(), old.spec.host, new.spec.host));
        }

        fn on_delete(&self, obj: &VirtualServer) {
            self.calls.lock().unwrap().push(format!("delete {}", obj.name_any()));
        }
    }

    fn vs(name: &str, host: &str) -> VirtualServer {
        create_test_virtual_server("default", name, host, Some("tls"), None)
    }

    fn informer() -> (Informer<VirtualServer>, Store<VirtualServer>, Arc<RecordingHandler>) {
        let (store, writer) = reflector::store();
        let handler = Arc::new(RecordingHandler::default());
        (Informer::new("VirtualServer", writer, handler.clone()), store, handler)
    }

    fn initial_list(informer: &mut Informer<VirtualServer>, objects: Vec<VirtualServer>) -> bool {
        informer.apply(watcher::Event::Init);
        for obj in objects {
            informer.apply(watcher::Event::InitApply(obj));
        }
        informer.apply(watcher::Event::InitDone)
    }

    fn cached_host(store: &Store<VirtualServer>, name: &str) -> Option<String> {
        store
            .get(&ObjectRef::new(name).within("default"))
            .map(|vs| vs.spec.host.clone())
    }

    #[tokio::test]
    async fn test_initial_list_adds_everything() {
        let (mut informer, store, handler) = informer();
        assert!(initial_list(&mut informer, vec![vs("a", "a.com"), vs("b", "b.com")]));
        store.wait_until_ready().await.unwrap();

        let mut calls = handler.take();
        calls.sort();
        assert_eq!(calls, vec!["add a", "add b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_apply_distinguishes_add_and_update() {
        let (mut informer, store, handler) = informer();
        initial_list(&mut informer, vec![]);

        informer.apply(watcher::Event::Apply(vs("a", "a.com")));
        informer.apply(watcher::Event::Apply(vs("a", "new.a.com")));
        assert_eq!(cached_host(&store, "a").as_deref(), Some("new.a.com"));
        informer.apply(watcher::Event::Delete(vs("a", "ignored.com")));

        assert_eq!(
            handler.take(),
            vec!["add a", "update a a.com->new.a.com", "delete a"]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_relist_reports_differences() {
        let (mut informer, store, handler) = informer();
        initial_list(&mut informer, vec![vs("a", "a.com"), vs("b", "b.com")]);
        handler.take();

        // b was deleted and c created while the watch was down
        informer.apply(watcher::Event::Init);
        informer.apply(watcher::Event::InitApply(vs("a", "a2.com")));
        informer.apply(watcher::Event::InitApply(vs("c", "c.com")));
        assert!(handler.take().is_empty(), "changes are reported once the relist is complete");
        assert_eq!(cached_host(&store, "b").as_deref(), Some("b.com"));

        let first = informer.apply(watcher::Event::InitDone);
        assert!(!first, "only the first list reports sync");

        let mut calls = handler.take();
        calls.sort();
        assert_eq!(calls, vec!["add c", "delete b", "update a a.com->a2.com"]);
        assert_eq!(store.len(), 2);
        assert_eq!(cached_host(&store, "a").as_deref(), Some("a2.com"));
        assert_eq!(cached_host(&store, "b"), None);
    }

    #[test]
    fn test_delete_of_unknown_object_still_notifies() {
        let (mut informer, _store, handler) = informer();
        informer.apply(watcher::Event::Delete(vs("ghost", "ghost.com")));
        assert_eq!(handler.take(), vec!["delete ghost"]);
    }
}
