use crate::{error::MessengerError, types::StreamState};

/// Lifecycle of one event stream: `Initializing -> Streaming -> Closed`.
///
/// A failed handshake goes straight from `Initializing` to `Closed`; the
/// failure is recorded by the owner, not represented as a state.
#[derive(Debug, Clone)]
pub struct StreamStateMachine {
    state: StreamState,
}

impl Default for StreamStateMachine {
    fn default() -> Self {
        Self {
            state: StreamState::Initializing,
        }
    }
}

impl StreamStateMachine {
    /// A machine that starts closed, for streams that never run.
    pub fn closed() -> Self {
        Self {
            state: StreamState::Closed,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Handshake finished; the poll loop may start.
    pub fn begin_streaming(&mut self) -> Result<StreamState, MessengerError> {
        if self.state != StreamState::Initializing {
            return Err(MessengerError::invalid_state(self.state, "begin_streaming"));
        }
        self.state = StreamState::Streaming;
        Ok(self.state)
    }

    /// Handshake failed; only valid before streaming started.
    pub fn fail_initialization(&mut self) -> Result<StreamState, MessengerError> {
        if self.state != StreamState::Initializing {
            return Err(MessengerError::invalid_state(self.state, "fail_initialization"));
        }
        self.state = StreamState::Closed;
        Ok(self.state)
    }

    /// Close from any state. Returns `true` if this call did the transition.
    pub fn close(&mut self) -> bool {
        if self.state == StreamState::Closed {
            return false;
        }
        self.state = StreamState::Closed;
        true
    }
}
