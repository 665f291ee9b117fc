//! Presentation seam
//!
//! The coordinator drives panel lifecycle through [`Presentation`]. Calls are
//! made while a registry is locked, so implementations must not block and must
//! not call back into the coordinator. [`PresentationDispatcher`] satisfies
//! that by queueing [`PanelCommand`]s for whatever context owns the UI.

use crate::control::ControlHandle;
use async_channel::{Receiver, Sender};
use tracing::warn;

/// Presentation layer consumed by the coordinator
pub trait Presentation: Send + Sync {
    /// Shows a control panel for a category that just became controllable
    fn attach_panel(&self, display_name: &str, control: ControlHandle);

    /// Removes the panel previously attached with `control`
    fn detach_panel(&self, control: &ControlHandle);

    /// Offers another instance as a selectable choice on an attached panel
    fn register_choice(&self, display_name: &str, instance_name: &str);

    /// Withdraws an instance that went away from an attached panel
    fn unregister_choice(&self, display_name: &str, instance_name: &str);
}

/// Queued presentation call
#[derive(Debug, Clone, PartialEq)]
pub enum PanelCommand {
    Attach {
        display_name: String,
        control: ControlHandle,
    },
    Detach {
        control: ControlHandle,
    },
    RegisterChoice {
        display_name: String,
        instance_name: String,
    },
    UnregisterChoice {
        display_name: String,
        instance_name: String,
    },
}

/// Hands presentation calls to another execution context
///
/// Backed by an unbounded channel so the caller never waits on the UI.
#[derive(Clone)]
pub struct PresentationDispatcher {
    tx: Sender<PanelCommand>,
}

impl PresentationDispatcher {
    /// Creates a dispatcher and the receiver the UI context drains
    pub fn new() -> (Self, Receiver<PanelCommand>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }

    fn dispatch(&self, command: PanelCommand) {
        if let Err(e) = self.tx.try_send(command) {
            warn!(error = %e, "Presentation context gone, dropping panel command");
        }
    }
}

impl Presentation for PresentationDispatcher {
    fn attach_panel(&self, display_name: &str, control: ControlHandle) {
        self.dispatch(PanelCommand::Attach {
            display_name: display_name.to_string(),
            control,
        });
    }

    fn detach_panel(&self, control: &ControlHandle) {
        self.dispatch(PanelCommand::Detach {
            control: control.clone(),
        });
    }

    fn register_choice(&self, display_name: &str, instance_name: &str) {
        self.dispatch(PanelCommand::RegisterChoice {
            display_name: display_name.to_string(),
            instance_name: instance_name.to_string(),
        });
    }

    fn unregister_choice(&self, display_name: &str, instance_name: &str) {
        self.dispatch(PanelCommand::UnregisterChoice {
            display_name: display_name.to_string(),
            instance_name: instance_name.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_preserves_order() {
        let (dispatcher, rx) = PresentationDispatcher::new();
        let control = ControlHandle::new("_bed._tcp.local.");

        dispatcher.attach_panel("Bed", control.clone());
        dispatcher.register_choice("Bed", "bed-2");
        dispatcher.unregister_choice("Bed", "bed-2");
        dispatcher.detach_panel(&control);

        assert!(matches!(rx.try_recv(), Ok(PanelCommand::Attach { .. })));
        assert_eq!(
            rx.try_recv().unwrap(),
            PanelCommand::RegisterChoice {
                display_name: "Bed".to_string(),
                instance_name: "bed-2".to_string(),
            }
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(PanelCommand::UnregisterChoice { .. })
        ));
        assert_eq!(rx.try_recv().unwrap(), PanelCommand::Detach { control });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_after_receiver_dropped_does_not_panic() {
        let (dispatcher, rx) = PresentationDispatcher::new();
        drop(rx);
        dispatcher.register_choice("Bed", "bed-2");
    }
}
