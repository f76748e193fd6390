//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use store::{Store, Version};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::unit_of_work::UnitOfWork;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The row version of the aggregate after the command.
    pub new_version: Version,
}

/// Handler for executing single-aggregate commands.
///
/// The handler is responsible for:
/// 1. Loading the aggregate record from the store
/// 2. Executing the command to produce events
/// 3. Committing the new state and the events in one unit of work
///
/// Commands that touch several aggregates build their own [`UnitOfWork`]
/// and use the handler only for loading.
pub struct CommandHandler<S, A>
where
    S: Store,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: Store,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning a default instance if it doesn't exist.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        Ok(self.load_existing(aggregate_id).await?.unwrap_or_default())
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    ///
    /// A record of another aggregate type under the same id counts as absent.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        match self.store.load(aggregate_id).await? {
            Some(record) if record.aggregate_type == A::aggregate_type() => {
                Ok(Some(A::from_record(record)?))
            }
            _ => Ok(None),
        }
    }

    /// Loads an aggregate, failing with `NotFound` if it doesn't exist.
    pub async fn load_required(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::aggregate_type(), aggregate_id))
    }

    /// Executes a command and persists the resulting state and events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error. An empty list persists
    /// nothing.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        self.execute_on(aggregate, command_fn).await
    }

    /// Like [`execute`](Self::execute), but against an aggregate the caller
    /// already loaded.
    pub async fn execute_on<F>(
        &self,
        mut aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            let new_version = aggregate.version();
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version,
            });
        }

        let mut uow = UnitOfWork::new(&self.store);
        uow.stage(&mut aggregate, events.clone())?;
        uow.save_changes().await?;

        Ok(CommandResult {
            new_version: aggregate.version(),
            aggregate,
            events,
        })
    }
}
