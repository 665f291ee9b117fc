//! Per-category instance registry
//!
//! Tracks every known instance of one category and which of them is the
//! current control target. Each mutation returns a [`Transition`] telling the
//! coordinator what, if anything, the presentation layer has to hear about.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --first resolve--> Active(X)
//! Active(X) --remove non-current--> Active(X)
//! Active(X) --select Y--> Active(Y)
//! Active(X) --remove X, others resolved--> Active(Y)
//! Active(X) --remove X, none resolved--> Uninitialized
//! any --reset--> Uninitialized
//! ```

use crate::control::ControlHandle;
use crate::error::{DiscoveryError, Result};
use roomctl_core::{CategoryDescriptor, DeviceInstance};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{debug, error};

/// Outcome of a registry mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing for the presentation layer to do
    Unchanged,

    /// First controllable instance; a panel must be attached
    Attach { instance: String },

    /// Another instance became selectable on the existing panel
    AddChoice { instance: String },

    /// A non-current instance went away and must no longer be offered
    RemoveChoice { instance: String },

    /// The current instance went away; control traffic now goes to `to`
    Failover { from: String, to: String },

    /// Control traffic now goes to `to` (same name when only the endpoint moved)
    Redirect { from: String, to: String },

    /// No controllable instance left; the panel must be detached
    Detach { instance: String },
}

/// Point-in-time view of a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub service_type: String,
    pub display_name: String,
    pub initialized: bool,
    pub current: Option<String>,
    /// Known instances, ordered by name
    pub instances: Vec<DeviceInstance>,
}

/// Instance set and current-instance state for one category
#[derive(Debug)]
pub struct CategoryRegistry {
    descriptor: CategoryDescriptor,

    /// True while a panel is attached
    initialized: bool,

    /// Known instances keyed by advertisement name
    instances: HashMap<String, DeviceInstance>,

    /// Name of the current control target; always a key of `instances`
    current: Option<String>,

    control: ControlHandle,

    /// Monotonic counter stamped on instances as they are seen
    next_seq: u64,
}

impl CategoryRegistry {
    /// Creates an empty, uninitialized registry
    pub fn new(descriptor: CategoryDescriptor) -> Self {
        let control = ControlHandle::new(descriptor.service_type());
        Self {
            descriptor,
            initialized: false,
            instances: HashMap::new(),
            current: None,
            control,
            next_seq: 0,
        }
    }

    pub fn descriptor(&self) -> &CategoryDescriptor {
        &self.descriptor
    }

    /// Handle shared with the presentation layer
    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Name of the current instance
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The current instance itself
    pub fn current_instance(&self) -> Option<&DeviceInstance> {
        self.current.as_ref().and_then(|name| self.instances.get(name))
    }

    pub fn instance(&self, name: &str) -> Option<&DeviceInstance> {
        self.instances.get(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.current.as_deref() == Some(name)
    }

    /// True iff more than one instance is known
    pub fn has_multiple(&self) -> bool {
        self.instances.len() > 1
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Records a placeholder for an announced but unresolved instance
    ///
    /// Placeholders are not controllable, so this never has a presentation
    /// effect.
    pub fn on_instance_added(&mut self, name: &str) -> Transition {
        let seq = self.bump_seq();
        match self.instances.get_mut(name) {
            Some(instance) => instance.mark_seen(seq),
            None => {
                debug!(
                    service_type = self.descriptor.service_type(),
                    instance = name,
                    "Tracking unresolved instance"
                );
                self.instances
                    .insert(name.to_string(), DeviceInstance::placeholder(name, seq));
            }
        }
        Transition::Unchanged
    }

    /// Upserts an instance with its resolved endpoint
    ///
    /// A resolution without a prior add is an implicit add.
    pub fn on_instance_resolved(&mut self, name: &str, endpoint: SocketAddr) -> Transition {
        let seq = self.bump_seq();
        let (newly_resolved, endpoint_changed) = match self.instances.get_mut(name) {
            Some(instance) => {
                let was_resolved = instance.is_resolved();
                let changed = instance.resolve(endpoint, seq);
                (!was_resolved, changed)
            }
            None => {
                self.instances.insert(
                    name.to_string(),
                    DeviceInstance::resolved(name, endpoint, seq),
                );
                (true, true)
            }
        };

        if !self.initialized {
            self.current = Some(name.to_string());
            self.initialized = true;
            self.control.redirect(name, endpoint);
            return Transition::Attach {
                instance: name.to_string(),
            };
        }

        if newly_resolved {
            return Transition::AddChoice {
                instance: name.to_string(),
            };
        }

        if self.is_current(name) && endpoint_changed {
            self.control.redirect(name, endpoint);
            return Transition::Redirect {
                from: name.to_string(),
                to: name.to_string(),
            };
        }

        Transition::Unchanged
    }

    /// Removes an instance, failing over or detaching if it was current
    ///
    /// Returns `StaleRemoval` for a name that is not tracked.
    pub fn on_instance_removed(&mut self, name: &str) -> Result<Transition> {
        let Some(removed) = self.instances.remove(name) else {
            return Err(DiscoveryError::StaleRemoval {
                service_type: self.descriptor.service_type().to_string(),
                name: name.to_string(),
            });
        };

        if !self.is_current(name) {
            // Placeholders were never offered on the panel
            if self.initialized && removed.is_resolved() {
                return Ok(Transition::RemoveChoice {
                    instance: name.to_string(),
                });
            }
            return Ok(Transition::Unchanged);
        }

        match self.failover_candidate() {
            Some((next, endpoint)) => {
                self.current = Some(next.clone());
                self.control.redirect(next.clone(), endpoint);
                Ok(Transition::Failover {
                    from: name.to_string(),
                    to: next,
                })
            }
            None => {
                self.current = None;
                self.initialized = false;
                self.control.disable();
                Ok(Transition::Detach {
                    instance: name.to_string(),
                })
            }
        }
    }

    /// Makes a resolved instance the current control target
    ///
    /// Used when the panel picks one of its registered choices.
    pub fn select(&mut self, name: &str) -> Result<Transition> {
        let endpoint = self
            .instances
            .get(name)
            .and_then(|instance| instance.endpoint())
            .ok_or_else(|| DiscoveryError::InstanceUnavailable {
                service_type: self.descriptor.service_type().to_string(),
                name: name.to_string(),
            })?;

        if self.is_current(name) {
            return Ok(Transition::Unchanged);
        }

        let previous = self.current.replace(name.to_string());
        self.control.redirect(name, endpoint);

        if !std::mem::replace(&mut self.initialized, true) {
            return Ok(Transition::Attach {
                instance: name.to_string(),
            });
        }

        Ok(Transition::Redirect {
            from: previous.unwrap_or_default(),
            to: name.to_string(),
        })
    }

    /// Forgets every instance, returning to uninitialized
    pub fn reset(&mut self) -> Transition {
        self.instances.clear();
        self.control.disable();

        let previous = self.current.take();
        let was_initialized = std::mem::replace(&mut self.initialized, false);

        match previous {
            Some(instance) if was_initialized => Transition::Detach { instance },
            _ => Transition::Unchanged,
        }
    }

    /// Most recently seen resolved instance
    fn failover_candidate(&self) -> Option<(String, SocketAddr)> {
        self.instances
            .values()
            .filter_map(|instance| instance.endpoint().map(|ep| (instance, ep)))
            .max_by_key(|(instance, _)| instance.seen_seq)
            .map(|(instance, ep)| (instance.name.clone(), ep))
    }

    /// Checks the registry's structural invariants
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |details: String| DiscoveryError::InvariantViolation {
            service_type: self.descriptor.service_type().to_string(),
            details,
        };

        if let Some(current) = &self.current {
            match self.instances.get(current) {
                None => {
                    return Err(violation(format!("current '{}' is not a known instance", current)))
                }
                Some(instance) if !instance.is_resolved() => {
                    return Err(violation(format!("current '{}' is not resolved", current)))
                }
                Some(_) => {}
            }
        }

        if self.initialized != self.current.is_some() {
            return Err(violation(format!(
                "initialized={} but current={:?}",
                self.initialized, self.current
            )));
        }

        Ok(())
    }

    /// Repairs a broken registry by dropping the current instance
    ///
    /// Panics in debug builds. In release builds the category falls back to
    /// uninitialized and a `Detach` is returned if a panel was attached.
    pub fn enforce_invariants(&mut self) -> Option<Transition> {
        let err = self.check_invariants().err()?;

        if cfg!(debug_assertions) {
            panic!("{}", err);
        }

        error!(error = %err, "Registry invariant violated, dropping current instance");
        let was_initialized = self.initialized;
        let previous = self.current.take();
        self.initialized = false;
        self.control.disable();

        was_initialized.then(|| Transition::Detach {
            instance: previous.unwrap_or_default(),
        })
    }

    /// Captures the registry state
    pub fn snapshot(&self) -> CategorySnapshot {
        let mut instances: Vec<DeviceInstance> = self.instances.values().cloned().collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));

        CategorySnapshot {
            service_type: self.descriptor.service_type().to_string(),
            display_name: self.descriptor.display_name().to_string(),
            initialized: self.initialized,
            current: self.current.clone(),
            instances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CategoryRegistry {
        CategoryRegistry::new(CategoryDescriptor::new("bed._ctrl._tcp", "Bed"))
    }

    fn ep(last: u8) -> SocketAddr {
        format!("10.0.0.{}:9000", last).parse().unwrap()
    }

    #[test]
    fn test_first_resolve_attaches() {
        let mut reg = registry();
        assert_eq!(reg.on_instance_added("bed-1"), Transition::Unchanged);
        assert!(!reg.is_initialized());
        assert_eq!(reg.current(), None);

        let t = reg.on_instance_resolved("bed-1", ep(5));
        assert_eq!(
            t,
            Transition::Attach {
                instance: "bed-1".to_string()
            }
        );
        assert!(reg.is_initialized());
        assert!(reg.is_current("bed-1"));
        assert_eq!(reg.control().endpoint(), Some(ep(5)));
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_resolve_without_add_is_implicit_add() {
        let mut reg = registry();
        let t = reg.on_instance_resolved("bed-1", ep(5));
        assert!(matches!(t, Transition::Attach { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_second_resolve_adds_choice() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));

        let t = reg.on_instance_resolved("bed-2", ep(6));
        assert_eq!(
            t,
            Transition::AddChoice {
                instance: "bed-2".to_string()
            }
        );
        assert!(reg.is_current("bed-1"));
        assert!(reg.has_multiple());
    }

    #[test]
    fn test_re_resolve_current_with_new_endpoint_redirects() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));

        assert_eq!(reg.on_instance_resolved("bed-1", ep(5)), Transition::Unchanged);

        let t = reg.on_instance_resolved("bed-1", ep(7));
        assert!(matches!(t, Transition::Redirect { .. }));
        assert_eq!(reg.control().endpoint(), Some(ep(7)));
    }

    #[test]
    fn test_re_resolve_other_is_unchanged() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_resolved("bed-2", ep(6));

        assert_eq!(reg.on_instance_resolved("bed-2", ep(8)), Transition::Unchanged);
        assert_eq!(reg.instance("bed-2").unwrap().endpoint(), Some(ep(8)));
    }

    #[test]
    fn test_remove_non_current() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_resolved("bed-2", ep(6));

        assert_eq!(
            reg.on_instance_removed("bed-2").unwrap(),
            Transition::RemoveChoice {
                instance: "bed-2".to_string()
            }
        );
        assert!(reg.is_current("bed-1"));
        assert!(reg.instance("bed-2").is_none());
        assert!(!reg.has_multiple());
    }

    #[test]
    fn test_remove_current_fails_over() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_resolved("bed-2", ep(6));

        let t = reg.on_instance_removed("bed-1").unwrap();
        assert_eq!(
            t,
            Transition::Failover {
                from: "bed-1".to_string(),
                to: "bed-2".to_string()
            }
        );
        assert!(reg.is_initialized());
        assert!(reg.is_current("bed-2"));
        assert_eq!(reg.control().endpoint(), Some(ep(6)));
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_failover_prefers_most_recently_seen() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_resolved("bed-2", ep(6));
        reg.on_instance_resolved("bed-3", ep(7));
        // bed-2 refreshed last
        reg.on_instance_resolved("bed-2", ep(6));

        let t = reg.on_instance_removed("bed-1").unwrap();
        assert_eq!(
            t,
            Transition::Failover {
                from: "bed-1".to_string(),
                to: "bed-2".to_string()
            }
        );
    }

    #[test]
    fn test_failover_skips_placeholders() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_added("bed-2");

        let t = reg.on_instance_removed("bed-1").unwrap();
        assert_eq!(
            t,
            Transition::Detach {
                instance: "bed-1".to_string()
            }
        );
        assert!(!reg.is_initialized());
        assert_eq!(reg.current(), None);
        assert_eq!(reg.len(), 1);

        // The placeholder resolving brings the category back
        let t = reg.on_instance_resolved("bed-2", ep(6));
        assert!(matches!(t, Transition::Attach { .. }));
    }

    #[test]
    fn test_remove_last_detaches() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));

        let t = reg.on_instance_removed("bed-1").unwrap();
        assert!(matches!(t, Transition::Detach { .. }));
        assert!(!reg.is_initialized());
        assert_eq!(reg.current(), None);
        assert!(reg.is_empty());
        assert!(!reg.control().is_enabled());
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_remove_unknown_is_stale() {
        let mut reg = registry();
        assert!(matches!(
            reg.on_instance_removed("ghost"),
            Err(DiscoveryError::StaleRemoval { .. })
        ));

        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_removed("bed-1").unwrap();
        assert!(reg.on_instance_removed("bed-1").is_err());
    }

    #[test]
    fn test_category_cycles() {
        let mut reg = registry();
        for _ in 0..3 {
            assert!(matches!(
                reg.on_instance_resolved("bed-1", ep(5)),
                Transition::Attach { .. }
            ));
            assert!(matches!(
                reg.on_instance_removed("bed-1").unwrap(),
                Transition::Detach { .. }
            ));
        }
    }

    #[test]
    fn test_snapshot_sorted() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-2", ep(6));
        reg.on_instance_resolved("bed-1", ep(5));

        let snapshot = reg.snapshot();
        assert_eq!(snapshot.display_name, "Bed");
        assert_eq!(snapshot.current.as_deref(), Some("bed-2"));
        let names: Vec<_> = snapshot.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["bed-1", "bed-2"]);
    }

    #[test]
    fn test_remove_placeholder_is_silent() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_added("bed-2");

        assert_eq!(reg.on_instance_removed("bed-2").unwrap(), Transition::Unchanged);
        assert!(reg.is_current("bed-1"));
    }

    #[test]
    fn test_select_moves_current_and_handle() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_resolved("bed-2", ep(6));
        let panel_handle = reg.control().clone();

        let t = reg.select("bed-2").unwrap();
        assert_eq!(
            t,
            Transition::Redirect {
                from: "bed-1".to_string(),
                to: "bed-2".to_string()
            }
        );
        assert!(reg.is_current("bed-2"));
        assert_eq!(panel_handle.endpoint(), Some(ep(6)));
        assert_eq!(reg.select("bed-2").unwrap(), Transition::Unchanged);

        // Removing the selected instance fails back over, never leaving the
        // handle on a dead endpoint
        let t = reg.on_instance_removed("bed-2").unwrap();
        assert!(matches!(t, Transition::Failover { .. }));
        assert_eq!(panel_handle.endpoint(), Some(ep(5)));
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_select_rejects_unknown_and_unresolved() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_added("bed-2");

        assert!(matches!(
            reg.select("bed-2"),
            Err(DiscoveryError::InstanceUnavailable { .. })
        ));
        assert!(matches!(
            reg.select("ghost"),
            Err(DiscoveryError::InstanceUnavailable { .. })
        ));
        assert!(reg.is_current("bed-1"));
    }

    #[test]
    fn test_reset() {
        let mut reg = registry();
        assert_eq!(reg.reset(), Transition::Unchanged);

        reg.on_instance_resolved("bed-1", ep(5));
        reg.on_instance_added("bed-2");
        assert_eq!(
            reg.reset(),
            Transition::Detach {
                instance: "bed-1".to_string()
            }
        );
        assert!(reg.is_empty());
        assert!(!reg.is_initialized());
        assert!(!reg.control().is_enabled());
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_enforce_invariants_noop_when_healthy() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        assert_eq!(reg.enforce_invariants(), None);
    }

    #[test]
    fn test_check_invariants_detects_dangling_current() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.current = Some("ghost".to_string());

        assert!(matches!(
            reg.check_invariants(),
            Err(DiscoveryError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_check_invariants_detects_unresolved_current() {
        let mut reg = registry();
        reg.on_instance_added("bed-1");
        reg.current = Some("bed-1".to_string());
        reg.initialized = true;

        assert!(matches!(
            reg.check_invariants(),
            Err(DiscoveryError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_check_invariants_detects_initialized_without_current() {
        let mut reg = registry();
        reg.initialized = true;

        assert!(matches!(
            reg.check_invariants(),
            Err(DiscoveryError::InvariantViolation { .. })
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invariant violated")]
    fn test_enforce_invariants_panics_in_debug() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.current = Some("ghost".to_string());

        reg.enforce_invariants();
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_enforce_invariants_degrades_in_release() {
        let mut reg = registry();
        reg.on_instance_resolved("bed-1", ep(5));
        reg.current = Some("ghost".to_string());

        assert_eq!(
            reg.enforce_invariants(),
            Some(Transition::Detach {
                instance: "ghost".to_string()
            })
        );
        assert_eq!(reg.current(), None);
        assert!(!reg.control().is_enabled());
        assert!(reg.check_invariants().is_ok());
    }
}
