//! Per-table lifecycle hooks: ordered, awaited, persistent and one-shot subscribers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::EventError;

/// Immutable snapshot handed to subscribers.
#[derive(Debug)]
pub enum EventArgs<T> {
    None,
    Row(Arc<T>),
    Rows(Arc<Vec<Option<T>>>),
}

impl<T> Clone for EventArgs<T> {
    fn clone(&self) -> Self {
        match self {
            EventArgs::None => EventArgs::None,
            EventArgs::Row(row) => EventArgs::Row(Arc::clone(row)),
            EventArgs::Rows(rows) => EventArgs::Rows(Arc::clone(rows)),
        }
    }
}

impl<T> EventArgs<T> {
    pub fn row(&self) -> Option<&T> {
        match self {
            EventArgs::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<&[Option<T>]> {
        match self {
            EventArgs::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

pub type EventFuture = Pin<Box<dyn Future<Output = Result<(), EventError>> + Send>>;

type Handler<T> = Arc<dyn Fn(EventArgs<T>) -> EventFuture + Send + Sync>;
type OnceHandler<T> = Box<dyn FnOnce(EventArgs<T>) -> EventFuture + Send>;

/// Subscribers of one phase.
pub struct EventHolder<T> {
    on: Mutex<Vec<Handler<T>>>,
    once: Mutex<Vec<OnceHandler<T>>>,
}

impl<T> Default for EventHolder<T> {
    fn default() -> Self {
        EventHolder {
            on: Mutex::new(Vec::new()),
            once: Mutex::new(Vec::new()),
        }
    }
}

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Send + Sync + 'static> EventHolder<T> {
    /// Subscribes for every future emission.
    pub fn on<F, Fut>(&self, handler: F)
    where
        F: Fn(EventArgs<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EventError>> + Send + 'static,
    {
        let handler: Handler<T> = Arc::new(move |args| Box::pin(handler(args)));
        lock(&self.on).push(handler);
    }

    /// Subscribes for the next emission only.
    pub fn once<F, Fut>(&self, handler: F)
    where
        F: FnOnce(EventArgs<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EventError>> + Send + 'static,
    {
        let handler: OnceHandler<T> = Box::new(move |args| Box::pin(handler(args)));
        lock(&self.once).push(handler);
    }

    pub fn len(&self) -> usize {
        lock(&self.on).len() + lock(&self.once).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs persistent then one-shot subscribers in registration order, awaiting each.
    /// The one-shot list is emptied even when a subscriber fails; the first failure stops the run.
    pub async fn emit(&self, args: EventArgs<T>) -> Result<(), EventError> {
        let persistent: Vec<Handler<T>> = lock(&self.on).clone();
        let one_shot: Vec<OnceHandler<T>> = std::mem::take(&mut *lock(&self.once));

        for handler in persistent {
            handler(args.clone()).await?;
        }
        for handler in one_shot {
            handler(args.clone()).await?;
        }
        Ok(())
    }
}

/// The ten lifecycle phases of a table. `*_create` phases are reserved and never emitted.
pub struct Events<T> {
    pub before_create: EventHolder<T>,
    pub after_create: EventHolder<T>,
    pub before_select: EventHolder<T>,
    pub after_select: EventHolder<T>,
    pub before_insert: EventHolder<T>,
    pub after_insert: EventHolder<T>,
    pub before_update: EventHolder<T>,
    pub after_update: EventHolder<T>,
    pub before_delete: EventHolder<T>,
    pub after_delete: EventHolder<T>,
}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Events {
            before_create: EventHolder::default(),
            after_create: EventHolder::default(),
            before_select: EventHolder::default(),
            after_select: EventHolder::default(),
            before_insert: EventHolder::default(),
            after_insert: EventHolder::default(),
            before_update: EventHolder::default(),
            after_update: EventHolder::default(),
            before_delete: EventHolder::default(),
            after_delete: EventHolder::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl Fn(EventArgs<u32>) -> EventFuture {
        let log = Arc::clone(log);
        move |_| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                lock(&log).push(tag);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn persistent_then_once_in_order_and_once_cleared() {
        let holder: EventHolder<u32> = EventHolder::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        holder.on(recorder(&log, "on1"));
        holder.once(recorder(&log, "once1"));
        holder.on(recorder(&log, "on2"));

        holder.emit(EventArgs::None).await.unwrap();
        holder.emit(EventArgs::None).await.unwrap();

        assert_eq!(*lock(&log), vec!["on1", "on2", "once1", "on1", "on2"]);
    }

    #[tokio::test]
    async fn failure_stops_emission_and_still_clears_once() {
        let holder: EventHolder<u32> = EventHolder::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        holder.on(|_| async { Err(EventError::new("boom")) });
        holder.once(recorder(&log, "once"));

        let err = holder.emit(EventArgs::None).await.unwrap_err();
        assert_eq!(err, EventError::new("boom"));
        assert!(lock(&log).is_empty());
        assert_eq!(holder.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_the_snapshot() {
        let holder: EventHolder<u32> = EventHolder::default();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        holder.on(move |args: EventArgs<u32>| {
            let sink = Arc::clone(&sink);
            async move {
                *lock(&sink) = args.rows().map(|rows| rows.to_vec());
                Ok(())
            }
        });

        holder
            .emit(EventArgs::Rows(Arc::new(vec![Some(7), None])))
            .await
            .unwrap();
        assert_eq!(*lock(&seen), Some(vec![Some(7), None]));
    }
}
