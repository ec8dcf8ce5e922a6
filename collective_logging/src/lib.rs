//! Common logging infrastructure shared by the collective engine.
//!
//! A [`Logger`] buffers typed events behind an `Rc`, so that many owners
//! (an endpoint, its operations, its planners) can log to the same
//! destination without taking a lock. The rest of the engine is
//! single-threaded and cooperative, so a shared `RefCell` is all the
//! synchronization a logger ever needs.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A registry of named, typed loggers.
///
/// Each name is bound to at most one type; inserting a logger under a
/// name already bound to a different event type just occupies a
/// separate `Any` slot — `get` returns `None` on the type mismatch
/// rather than panicking.
pub struct Registry {
    time: Instant,
    map: HashMap<String, Box<dyn Any>>,
}

impl Registry {
    /// Creates a new registry, with a shared time origin for its loggers.
    pub fn new(time: Instant) -> Self {
        Registry { time, map: HashMap::new() }
    }

    /// Binds a name to an action invoked on each flushed batch of events.
    ///
    /// Returns any logger previously bound to `name`. Existing clones of
    /// that logger keep writing to their old destination; only new
    /// lookups of `name` see the new action.
    pub fn insert<T: 'static>(
        &mut self,
        name: impl Into<String>,
        action: impl Fn(&Duration, &[(Duration, T)]) + 'static,
    ) -> Option<Box<dyn Any>> {
        let logger = Logger::new(self.time, Box::new(action));
        self.map.insert(name.into(), Box::new(logger))
    }

    /// Removes a bound logger, signalling end-of-stream to its readers.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.map.remove(name)
    }

    /// Retrieves a clone of a bound logger, if one exists under `name`.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map.get(name).and_then(|entry| entry.downcast_ref::<Logger<T>>()).cloned()
    }
}

const DEFAULT_CAPACITY: usize = 256;

/// A cheaply cloneable, buffering logger for events of type `T`.
pub struct Logger<T> {
    time: Instant,
    action: Rc<dyn Fn(&Duration, &[(Duration, T)])>,
    buffer: Rc<RefCell<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger { time: self.time, action: Rc::clone(&self.action), buffer: Rc::clone(&self.buffer) }
    }
}

impl<T> fmt::Debug for Logger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("pending", &self.buffer.borrow().len()).finish()
    }
}

impl<T> Logger<T> {
    /// Allocates a new logger bound to a write destination.
    pub fn new(time: Instant, action: Box<dyn Fn(&Duration, &[(Duration, T)])>) -> Self {
        Logger {
            time,
            action: Rc::from(action),
            buffer: Rc::new(RefCell::new(Vec::with_capacity(DEFAULT_CAPACITY))),
        }
    }

    /// Logs an event, timestamped at the moment of the call.
    ///
    /// The event may sit in the buffer until it fills or [`Logger::flush`]
    /// is called explicitly.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes any buffered events through the bound action.
    pub fn flush(&self) {
        let mut buffer = self.buffer.borrow_mut();
        if !buffer.is_empty() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn registry_round_trips_events() {
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let mut registry = Registry::new(Instant::now());
        let captured = Rc::clone(&seen);
        registry.insert::<u32>("test", move |_now, batch| {
            captured.borrow_mut().extend(batch.iter().map(|(_, v)| *v));
        });

        let logger = registry.get::<u32>("test").expect("logger registered");
        logger.log(1);
        logger.log(2);
        logger.flush();

        assert_eq!(&*seen.borrow(), &[1, 2]);
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let mut registry = Registry::new(Instant::now());
        registry.insert::<u32>("test", |_, _| {});
        assert!(registry.get::<u64>("test").is_none());
    }
}
