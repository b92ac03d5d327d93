//! Deferred structural mutation: commands queued against a [`Database`] and
//! applied in FIFO order by [`Transaction::execute`].
//!
//! Reads pass through to the underlying database immediately, so queued
//! mutations stay invisible until `execute` runs. Entity creation reserves
//! its id synchronously, letting callers wire up references to an entity
//! that does not exist in storage yet.

use tracing::{debug, warn};

use crate::component::{ComponentBundle, ComponentId};
use crate::database::Database;
use crate::entity::{Entity, EntityId};
use crate::query::{GroupByResult, QueryResult};
use crate::resources::Resources;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single queued structural mutation.
///
/// Commands own their payloads. Executing a transaction drains the queue and
/// dropping an unexecuted transaction drops it, so every payload is released
/// exactly once on both paths.
#[derive(Debug)]
pub enum Command {
    /// Insert a new entity under a pre-reserved id.
    CreateEntity {
        /// Id reserved when the command was queued.
        id: EntityId,
        /// The entity's initial components.
        components: ComponentBundle,
    },
    /// Remove an entity and all its components.
    RemoveEntity {
        /// The entity to remove.
        id: EntityId,
    },
    /// Add or overwrite components on an entity.
    AddComponents {
        /// The entity to change.
        id: EntityId,
        /// The components to add or overwrite.
        components: ComponentBundle,
    },
    /// Remove component types from an entity.
    RemoveComponents {
        /// The entity to change.
        id: EntityId,
        /// The component types to remove.
        component_ids: Vec<ComponentId>,
    },
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A queued batch of structural mutations against one [`Database`].
///
/// Commands execute strictly in insertion order. The first failing command
/// aborts execution with its error; already-applied commands stay applied
/// and the rest of the queue is discarded. A transaction can execute only
/// once.
pub struct Transaction<'a> {
    db: &'a mut Database,
    queue: Vec<Command>,
    executed: bool,
}

impl<'a> Transaction<'a> {
    /// Open a transaction on the database.
    pub fn new(db: &'a mut Database) -> Self {
        Self {
            db,
            queue: Vec::new(),
            executed: false,
        }
    }

    // -- queued mutations ---------------------------------------------------

    /// Queue entity creation. The id is reserved and returned immediately;
    /// storage insertion happens on [`execute`](Self::execute).
    pub fn create_entity(&mut self, components: ComponentBundle) -> EntityId {
        let id = self.db.reserve_entity_id();
        self.queue.push(Command::CreateEntity { id, components });
        id
    }

    /// Queue entity removal.
    pub fn remove_entity(&mut self, id: EntityId) {
        self.queue.push(Command::RemoveEntity { id });
    }

    /// Queue adding (or overwriting) components on an entity.
    pub fn add_components(&mut self, id: EntityId, components: ComponentBundle) {
        self.queue.push(Command::AddComponents { id, components });
    }

    /// Queue removing component types from an entity.
    pub fn remove_components(&mut self, id: EntityId, component_ids: Vec<ComponentId>) {
        self.queue
            .push(Command::RemoveComponents { id, component_ids });
    }

    // -- passthrough reads --------------------------------------------------
    //
    // These run against the underlying database immediately; queued
    // mutations are not visible to them until `execute`.

    /// Look up an entity in the underlying database.
    pub fn get_entity(&self, id: EntityId) -> Option<Entity<'_>> {
        self.db.get_entity(id)
    }

    /// Query the underlying database.
    pub fn query(&self, required: &[ComponentId]) -> QueryResult<'_> {
        self.db.query(required)
    }

    /// Query the underlying database with forbidden components.
    pub fn query_filtered(
        &self,
        required: &[ComponentId],
        forbidden: &[ComponentId],
    ) -> QueryResult<'_> {
        self.db.query_filtered(required, forbidden)
    }

    /// Group the underlying database's archetypes by a trait id.
    pub fn group_by(&self, trait_id: ComponentId) -> GroupByResult<'_> {
        self.db.group_by(trait_id)
    }

    /// The underlying database's resource registry.
    pub fn resources(&self) -> &Resources {
        self.db.resources()
    }

    /// Mutable access to the underlying database's resource registry.
    pub fn resources_mut(&mut self) -> &mut Resources {
        self.db.resources_mut()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no commands are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether [`execute`](Self::execute) has already run.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Run every queued command in FIFO order.
    ///
    /// # Errors
    ///
    /// [`EcsError::TransactionAlreadyExecuted`] on a second call. Otherwise
    /// the first failing command's error: execution stops there, commands
    /// applied so far stay applied, and the remaining queue is discarded.
    pub fn execute(&mut self) -> Result<(), EcsError> {
        if self.executed {
            return Err(EcsError::TransactionAlreadyExecuted);
        }
        self.executed = true;
        let queue = std::mem::take(&mut self.queue);
        debug!(commands = queue.len(), "executing transaction");
        for command in queue {
            if let Err(err) = Self::apply(self.db, command) {
                warn!(error = %err, "transaction aborted on failed command");
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply(db: &mut Database, command: Command) -> Result<(), EcsError> {
        match command {
            Command::CreateEntity { id, components } => db.create_entity_with_id(id, components),
            Command::RemoveEntity { id } => db.remove_entity(id),
            Command::AddComponents { id, components } => db.add_components(id, components),
            Command::RemoveComponents { id, component_ids } => {
                db.remove_components(id, &component_ids)
            }
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("queued", &self.queue.len())
            .field("executed", &self.executed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
