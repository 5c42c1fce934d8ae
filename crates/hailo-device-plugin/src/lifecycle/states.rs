use std::fmt;

/// Phase of the plugin lifecycle; exactly one is current at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    WaitingForControlSocket,
    InitializingServer,
    Registering,
    Running,
    Cleanup,
    Shutdown,
}

impl LifecycleState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Shutdown
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::WaitingForControlSocket => "WAITING_FOR_CONTROL_SOCKET",
            LifecycleState::InitializingServer => "INITIALIZING_SERVER",
            LifecycleState::Registering => "REGISTERING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Cleanup => "CLEANUP",
            LifecycleState::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}
