//! Shared fixtures for the integration tests

#![allow(dead_code)]

use ipc::{Callbacks, Endpoint, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Every callback a session fired, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Read(Vec<u8>),
    Accept(Option<&'static str>),
    Error(&'static str),
    Close(Option<&'static str>),
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(Endpoint, Event)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> Callbacks {
        let (read, accept, error, close) = (
            self.events.clone(),
            self.events.clone(),
            self.events.clone(),
            self.events.clone(),
        );
        Callbacks::new()
            .on_read(move |ep, payload| read.lock().push((*ep, Event::Read(payload.to_vec()))))
            .on_accept(move |ep, result| {
                accept
                    .lock()
                    .push((*ep, Event::Accept(result.map(TransportError::category))))
            })
            .on_error(move |ep, err| error.lock().push((*ep, Event::Error(err.category()))))
            .on_close(move |ep, reason| {
                close
                    .lock()
                    .push((*ep, Event::Close(reason.map(TransportError::category))))
            })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn events_for(&self, endpoint: Endpoint) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|(ep, _)| *ep == endpoint)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn reads(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Read(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|(_, e)| pred(e)).count()
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }
}

/// Poll `condition` every 10ms for up to five seconds
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
