use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;

// =============================================================================
// 1. THE ABSTRACTION
// =============================================================================

/// A row type managed by a [`ResourceActor`]. One actor plays one table.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Eq + Ord + Hash + Clone + Send + Sync + Display + Debug;
    type CreatePayload: Send + Sync + Debug;
    type Patch: Send + Sync + Debug;
    type Action: Send + Sync + Debug;
    type ActionResult: Send + Sync + Debug;

    /// Table name used in logs and not-found messages.
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;

    fn from_create(id: Self::Id, payload: Self::CreatePayload) -> Result<Self, StoreError>;

    fn on_update(&mut self, patch: Self::Patch) -> Result<(), StoreError>;

    /// Domain-specific mutation. An `Err` must leave `self` untouched.
    fn handle_action(&mut self, action: Self::Action) -> Result<Self::ActionResult, StoreError>;
}

// =============================================================================
// 2. THE GENERIC MESSAGES
// =============================================================================

pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;
pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

pub enum ResourceRequest<T: Entity> {
    Create {
        payload: T::CreatePayload,
        respond_to: Response<T>,
    },
    Get {
        id: T::Id,
        respond_to: Response<Option<T>>,
    },
    GetMany {
        ids: Vec<T::Id>,
        respond_to: Response<Vec<T>>,
    },
    Update {
        id: T::Id,
        patch: T::Patch,
        respond_to: Response<T>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<()>,
    },
    Action {
        id: T::Id,
        action: T::Action,
        respond_to: Response<T::ActionResult>,
    },
    /// Applies every action or none of them.
    BatchAction {
        actions: Vec<(T::Id, T::Action)>,
        respond_to: Response<Vec<T::ActionResult>>,
    },
    Query {
        filter: Predicate<T>,
        respond_to: Response<Vec<T>>,
    },
    DeleteWhere {
        filter: Predicate<T>,
        respond_to: Response<Vec<T>>,
    },
}

// =============================================================================
// 3. THE GENERIC ACTOR SERVER
// =============================================================================

pub struct ResourceActor<T: Entity> {
    receiver: mpsc::Receiver<ResourceRequest<T>>,
    store: BTreeMap<T::Id, T>,
    next_id_fn: Box<dyn Fn() -> T::Id + Send + Sync>,
}

impl<T: Entity> ResourceActor<T> {
    pub fn new(
        buffer_size: usize,
        next_id_fn: impl Fn() -> T::Id + Send + Sync + 'static,
    ) -> (Self, ResourceClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: BTreeMap::new(),
            next_id_fn: Box::new(next_id_fn),
        };
        let client = ResourceClient { sender };
        (actor, client)
    }

    #[instrument(name = "resource_actor", fields(kind = T::KIND), skip(self))]
    pub async fn run(mut self) {
        info!("Resource actor starting");
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ResourceRequest::Create { payload, respond_to } => {
                    let _ = respond_to.send(self.handle_create(payload));
                }
                ResourceRequest::Get { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.store.get(&id).cloned()));
                }
                ResourceRequest::GetMany { ids, respond_to } => {
                    let items = ids.iter().filter_map(|id| self.store.get(id).cloned()).collect();
                    let _ = respond_to.send(Ok(items));
                }
                ResourceRequest::Update { id, patch, respond_to } => {
                    let _ = respond_to.send(self.handle_update(id, patch));
                }
                ResourceRequest::Delete { id, respond_to } => {
                    let result = match self.store.remove(&id) {
                        Some(_) => Ok(()),
                        None => Err(not_found::<T>(&id)),
                    };
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Action { id, action, respond_to } => {
                    let _ = respond_to.send(self.handle_action(id, action));
                }
                ResourceRequest::BatchAction { actions, respond_to } => {
                    let _ = respond_to.send(self.handle_batch(actions));
                }
                ResourceRequest::Query { filter, respond_to } => {
                    let items = self.store.values().filter(|item| filter(item)).cloned().collect();
                    let _ = respond_to.send(Ok(items));
                }
                ResourceRequest::DeleteWhere { filter, respond_to } => {
                    let doomed: Vec<T::Id> = self
                        .store
                        .values()
                        .filter(|item| filter(item))
                        .map(|item| item.id().clone())
                        .collect();
                    let removed: Vec<T> = doomed.iter().filter_map(|id| self.store.remove(id)).collect();
                    if !removed.is_empty() {
                        debug!(count = removed.len(), "Deleted matching records");
                    }
                    let _ = respond_to.send(Ok(removed));
                }
            }
        }
        info!("Resource actor stopped");
    }

    fn handle_create(&mut self, payload: T::CreatePayload) -> Result<T, StoreError> {
        let id = (self.next_id_fn)();
        let item = T::from_create(id.clone(), payload)?;
        self.store.insert(id, item.clone());
        Ok(item)
    }

    fn handle_update(&mut self, id: T::Id, patch: T::Patch) -> Result<T, StoreError> {
        let item = self.store.get_mut(&id).ok_or_else(|| not_found::<T>(&id))?;
        let mut staged = item.clone();
        staged.on_update(patch)?;
        *item = staged.clone();
        Ok(staged)
    }

    fn handle_action(&mut self, id: T::Id, action: T::Action) -> Result<T::ActionResult, StoreError> {
        let item = self.store.get_mut(&id).ok_or_else(|| not_found::<T>(&id))?;
        item.handle_action(action)
    }

    fn handle_batch(
        &mut self,
        actions: Vec<(T::Id, T::Action)>,
    ) -> Result<Vec<T::ActionResult>, StoreError> {
        // Work on copies so a failure half-way leaves the table untouched.
        let mut staged: HashMap<T::Id, T> = HashMap::new();
        let mut results = Vec::with_capacity(actions.len());

        for (id, action) in actions {
            if !staged.contains_key(&id) {
                let current = self.store.get(&id).ok_or_else(|| not_found::<T>(&id))?;
                staged.insert(id.clone(), current.clone());
            }
            let item = staged.get_mut(&id).ok_or_else(|| not_found::<T>(&id))?;
            match item.handle_action(action) {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(id = %id, error = %e, "Batch aborted, nothing applied");
                    return Err(e);
                }
            }
        }

        self.store.extend(staged);
        Ok(results)
    }
}

fn not_found<T: Entity>(id: &T::Id) -> StoreError {
    StoreError::NotFound(format!("{} {}", T::KIND, id))
}

// =============================================================================
// 4. THE GENERIC CLIENT
// =============================================================================

#[derive(Clone)]
pub struct ResourceClient<T: Entity> {
    sender: mpsc::Sender<ResourceRequest<T>>,
}

impl<T: Entity> ResourceClient<T> {
    pub(crate) fn new(sender: mpsc::Sender<ResourceRequest<T>>) -> Self {
        Self { sender }
    }

    async fn call<R>(
        &self,
        build: impl FnOnce(Response<R>) -> ResourceRequest<T>,
    ) -> Result<R, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    pub async fn create(&self, payload: T::CreatePayload) -> Result<T, StoreError> {
        self.call(|respond_to| ResourceRequest::Create { payload, respond_to }).await
    }

    pub async fn get(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        self.call(|respond_to| ResourceRequest::Get { id, respond_to }).await
    }

    /// Like [`get`](Self::get) but a missing row is an error.
    pub async fn fetch(&self, id: T::Id) -> Result<T, StoreError> {
        let missing = not_found::<T>(&id);
        self.get(id).await?.ok_or(missing)
    }

    pub async fn get_many(&self, ids: Vec<T::Id>) -> Result<Vec<T>, StoreError> {
        self.call(|respond_to| ResourceRequest::GetMany { ids, respond_to }).await
    }

    pub async fn update(&self, id: T::Id, patch: T::Patch) -> Result<T, StoreError> {
        self.call(|respond_to| ResourceRequest::Update { id, patch, respond_to }).await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), StoreError> {
        self.call(|respond_to| ResourceRequest::Delete { id, respond_to }).await
    }

    pub async fn perform_action(&self, id: T::Id, action: T::Action) -> Result<T::ActionResult, StoreError> {
        self.call(|respond_to| ResourceRequest::Action { id, action, respond_to }).await
    }

    pub async fn perform_batch(
        &self,
        actions: Vec<(T::Id, T::Action)>,
    ) -> Result<Vec<T::ActionResult>, StoreError> {
        self.call(|respond_to| ResourceRequest::BatchAction { actions, respond_to }).await
    }

    pub async fn query(
        &self,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Result<Vec<T>, StoreError> {
        let filter: Predicate<T> = Box::new(filter);
        self.call(|respond_to| ResourceRequest::Query { filter, respond_to }).await
    }

    /// Removes and returns every row matching `filter`.
    pub async fn delete_where(
        &self,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Result<Vec<T>, StoreError> {
        let filter: Predicate<T> = Box::new(filter);
        self.call(|respond_to| ResourceRequest::DeleteWhere { filter, respond_to }).await
    }
}

// =============================================================================
// 5. TESTS
// =============================================================================
