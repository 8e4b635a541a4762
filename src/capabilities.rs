//! # Capabilities
//!
//! Optional features are represented as an explicit capability set instead of
//! runtime type discovery. The set is probed once from compile-time state when
//! an assembly is created; the test harness can mask individual capabilities
//! on a per-assembly basis to exercise the wiring that reacts to their
//! absence.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Optional capabilities available to a server assembly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapabilitySet: u32 {
        /// The observation interceptor stack is compiled in.
        const OBSERVATION = 1 << 0;
        /// The in-process transport is available.
        const IN_PROCESS = 1 << 1;
    }
}

impl CapabilitySet {
    /// Probe the capabilities of this build.
    ///
    /// The result reflects cargo features only, so it is stable for the
    /// lifetime of the process. Masking for tests happens per assembly, never
    /// here.
    pub fn probe() -> Self {
        let mut capabilities = CapabilitySet::IN_PROCESS;
        if cfg!(feature = "observation") {
            capabilities |= CapabilitySet::OBSERVATION;
        }
        capabilities
    }

    /// Stable lowercase names of the contained capabilities.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(CapabilitySet::OBSERVATION) {
            names.push("observation");
        }
        if self.contains(CapabilitySet::IN_PROCESS) {
            names.push("in-process");
        }
        names
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join(", "))
    }
}

impl From<&str> for CapabilitySet {
    fn from(name: &str) -> Self {
        match name {
            "observation" => CapabilitySet::OBSERVATION,
            "in-process" | "inprocess" => CapabilitySet::IN_PROCESS,
            _ => CapabilitySet::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_includes_in_process() {
        assert!(CapabilitySet::probe().contains(CapabilitySet::IN_PROCESS));
    }

    #[test]
    fn test_probe_tracks_observation_feature() {
        let probed = CapabilitySet::probe();
        assert_eq!(
            probed.contains(CapabilitySet::OBSERVATION),
            cfg!(feature = "observation")
        );
    }

    #[test]
    fn test_masking_removes_capability() {
        let mut capabilities = CapabilitySet::all();
        capabilities.remove(CapabilitySet::OBSERVATION);
        assert!(!capabilities.contains(CapabilitySet::OBSERVATION));
        assert!(capabilities.contains(CapabilitySet::IN_PROCESS));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(CapabilitySet::empty().to_string(), "none");
        assert_eq!(
            CapabilitySet::all().to_string(),
            "observation, in-process"
        );
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            CapabilitySet::from("observation"),
            CapabilitySet::OBSERVATION
        );
        assert_eq!(CapabilitySet::from("inprocess"), CapabilitySet::IN_PROCESS);
        assert_eq!(CapabilitySet::from("unknown"), CapabilitySet::empty());
    }
}
