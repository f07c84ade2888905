//! Timers that feed events into the session loop
//!
//! Timer tasks run on the tokio runtime but never touch session state: when
//! they fire they send an event value over a channel and the owner of the
//! session applies it. Every spawned task is tracked so that a session
//! teardown cancels all of them at once.

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

pub struct Scheduler<E> {
    runtime: Handle,
    events: UnboundedSender<E>,
    tasks: HashMap<TaskId, JoinHandle<()>>,
    debounced: HashMap<&'static str, TaskId>,
    next_id: u64,
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(runtime: Handle, events: UnboundedSender<E>) -> Self {
        Self {
            runtime,
            events,
            tasks: HashMap::new(),
            debounced: HashMap::new(),
            next_id: 1,
        }
    }

    fn track(&mut self, task: JoinHandle<()>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.retain(|_, t| !t.is_finished());
        self.tasks.insert(id, task);
        id
    }

    /// Emits `event` every `every`, first after one full period.
    pub fn repeating(&mut self, every: Duration, event: E) -> TaskId
    where
        E: Clone,
    {
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(event.clone()).is_err() {
                    break;
                }
            }
        });
        self.track(task)
    }

    pub fn once(&mut self, delay: Duration, event: E) -> TaskId {
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            sleep(delay).await;
            let _ = events.send(event);
        });
        self.track(task)
    }

    /// Like [`Scheduler::once`], but a newer call with the same key replaces
    /// a still pending one, so bursts collapse into one event after the quiet period.
    pub fn debounce(&mut self, key: &'static str, delay: Duration, event: E) -> TaskId {
        if let Some(previous) = self.debounced.remove(key) {
            self.cancel(previous);
        }
        let id = self.once(delay, event);
        self.debounced.insert(key, id);
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every scheduled task.
    pub fn clear_all(&mut self) {
        if !self.tasks.is_empty() {
            debug!("Cancelling {} scheduled tasks", self.tasks.len());
        }
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        self.debounced.clear();
    }

    pub fn active(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
