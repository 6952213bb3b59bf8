//! System state machine module
//!
//! Tracks bring-up of the access point and network services. The supervisor
//! task feeds it events and executes the actions it returns; LED output is
//! not part of it, the strip belongs to the animation and color commands.

use esp_println::println;

/// System states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    // Initialization
    SystemInit,

    // Network bring-up
    AccessPointStarting,
    ServicesStarting,

    // Running
    Operational,

    // Errors
    AccessPointError,

    // Recovery
    Recovering,
}

/// System events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    SystemStarted,

    // Access point events
    AccessPointStarted,
    AccessPointFailed,
    AccessPointStopped,

    // Service events
    ServicesStarted,

    // Recovery
    RecoveryRequested,
    RecoveryCompleted,
}

/// Result of feeding an event to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(SystemState),
    /// Move to a new state and reset the retry counter
    TransitionWithReset(SystemState),
}

/// Work the supervisor has to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Configure and start the access point
    StartAccessPoint,
    /// Wait for the network interface and service tasks
    StartNetworkServices,
    /// Check that the access point is still up
    MonitorAccessPoint,
    /// Stop the radio so the access point can be restarted
    SystemRecover,
    /// Record an error state
    LogError(SystemState),
    /// Give up; too many recoveries failed
    Halt,
}

/// System state machine
pub struct SystemStateMachine {
    current_state: SystemState,
    previous_state: Option<SystemState>,
    retry_count: u32,
    max_retries: u32,
    recovery_count: u32,
    max_recoveries: u32,
}

impl SystemStateMachine {
    /// Create a new state machine instance
    pub fn new() -> Self {
        Self {
            current_state: SystemState::SystemInit,
            previous_state: None,
            retry_count: 0,
            max_retries: 3,
            recovery_count: 0,
            max_recoveries: 5,
        }
    }

    /// Get the current state
    pub fn get_current_state(&self) -> SystemState {
        self.current_state
    }

    /// Get the previous state
    pub fn get_previous_state(&self) -> Option<SystemState> {
        self.previous_state
    }

    /// Get the retry count
    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Get the number of recoveries performed so far
    pub fn get_recovery_count(&self) -> u32 {
        self.recovery_count
    }

    /// Handle a system event
    pub fn handle_event(&mut self, event: SystemEvent) -> StateTransition {
        let transition = self.get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => {
                self.transition_to_state(new_state);
            }
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {
                if event == SystemEvent::AccessPointFailed {
                    self.retry_count += 1;
                }
            }
        }

        transition
    }

    /// Actions required by the current state
    pub fn update(&self) -> heapless::Vec<Action, 4> {
        let mut actions = heapless::Vec::new();

        // Capacity is never exceeded: at most two actions per state
        let _ = match self.current_state {
            SystemState::SystemInit => Ok(()),
            SystemState::AccessPointStarting => actions.push(Action::StartAccessPoint),
            SystemState::ServicesStarting => actions.push(Action::StartNetworkServices),
            SystemState::Operational => actions.push(Action::MonitorAccessPoint),
            SystemState::AccessPointError => {
                let _ = actions.push(Action::LogError(self.current_state));
                if self.recovery_count < self.max_recoveries {
                    actions.push(Action::SystemRecover)
                } else {
                    actions.push(Action::Halt)
                }
            }
            SystemState::Recovering => actions.push(Action::SystemRecover),
        };

        actions
    }

    /// Internal state transition
    fn transition_to_state(&mut self, new_state: SystemState) {
        if new_state != self.current_state {
            // Only print critical state changes
            match new_state {
                SystemState::Operational => println!("[STATE] System operational"),
                SystemState::AccessPointError => {
                    println!("[STATE] Error state: {:?}", new_state);
                }
                SystemState::Recovering => {
                    self.recovery_count += 1;
                    println!("[STATE] Recovery attempt {}", self.recovery_count);
                }
                _ => {} // Silent for normal transitions
            }

            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    /// State transition rules
    fn get_state_transition(
        &self,
        current_state: SystemState,
        event: SystemEvent,
    ) -> StateTransition {
        match (current_state, event) {
            (SystemState::SystemInit, SystemEvent::SystemStarted) => {
                StateTransition::Transition(SystemState::AccessPointStarting)
            }

            (SystemState::AccessPointStarting, SystemEvent::AccessPointStarted) => {
                StateTransition::TransitionWithReset(SystemState::ServicesStarting)
            }
            (SystemState::AccessPointStarting, SystemEvent::AccessPointFailed) => {
                if self.retry_count + 1 < self.max_retries {
                    StateTransition::Stay // retry
                } else {
                    StateTransition::Transition(SystemState::AccessPointError)
                }
            }

            (SystemState::ServicesStarting, SystemEvent::ServicesStarted) => {
                StateTransition::TransitionWithReset(SystemState::Operational)
            }

            (SystemState::Operational, SystemEvent::AccessPointStopped)
            | (SystemState::ServicesStarting, SystemEvent::AccessPointStopped) => {
                StateTransition::Transition(SystemState::Recovering)
            }

            (SystemState::AccessPointError, SystemEvent::RecoveryRequested) => {
                StateTransition::Transition(SystemState::Recovering)
            }
            (SystemState::Recovering, SystemEvent::RecoveryCompleted) => {
                StateTransition::TransitionWithReset(SystemState::AccessPointStarting)
            }

            // Default: keep the current state
            _ => StateTransition::Stay,
        }
    }

    /// Check whether another attempt is allowed
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Check if in an error state
    pub fn is_error_state(&self) -> bool {
        matches!(self.current_state, SystemState::AccessPointError)
    }

    /// Check if operational
    pub fn is_operational(&self) -> bool {
        matches!(self.current_state, SystemState::Operational)
    }
}

impl Default for SystemStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
