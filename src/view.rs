//! Shared view-state primitives: sort selection and the load state machine.
//!
//! Load lifecycle: `idle -> loading -> success | error`. Each fetch is tagged with a
//! ticket; only the completion carrying the latest ticket is applied, so a slow
//! response for superseded parameters can never overwrite newer state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: Copy + PartialEq> SortState<F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Same field flips direction; a different field starts descending.
    pub fn toggle(&mut self, field: F) {
        if self.field == field {
            self.direction = self.direction.flipped();
        } else {
            self.field = field;
            self.direction = SortDirection::Desc;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct ViewState<T> {
    phase: LoadPhase,
    data: Option<Arc<T>>,
    error: Option<String>,
    latest_ticket: u64,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Idle,
            data: None,
            error: None,
            latest_ticket: 0,
        }
    }
}

impl<T> ViewState<T> {
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Starts a new fetch and supersedes any fetch still in flight.
    pub fn begin(&mut self) -> RequestTicket {
        self.latest_ticket = self.latest_ticket.wrapping_add(1);
        self.phase = LoadPhase::Loading;
        RequestTicket(self.latest_ticket)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.latest_ticket
    }

    /// Returns `false` and leaves the state untouched when `ticket` was superseded.
    pub fn complete(&mut self, ticket: RequestTicket, result: Result<T, String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        match result {
            Ok(data) => {
                self.data = Some(Arc::new(data));
                self.error = None;
                self.phase = LoadPhase::Success;
            }
            Err(message) => {
                self.error = Some(message);
                self.phase = LoadPhase::Error;
            }
        }
        true
    }

    /// Placeholder only while nothing has ever been loaded.
    pub fn show_skeleton(&self) -> bool {
        self.phase == LoadPhase::Loading && self.data.is_none()
    }

    pub fn snapshot(&self) -> ViewSnapshot<Arc<T>> {
        ViewSnapshot {
            status: self.phase,
            skeleton: self.show_skeleton(),
            error: self.error.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot<D> {
    pub status: LoadPhase,
    pub skeleton: bool,
    pub error: Option<String>,
    pub data: Option<D>,
}

impl<D> ViewSnapshot<D> {
    pub fn map<E>(self, f: impl FnOnce(D) -> E) -> ViewSnapshot<E> {
        ViewSnapshot {
            status: self.status,
            skeleton: self.skeleton,
            error: self.error,
            data: self.data.map(f),
        }
    }
}
