//! Environment variable configuration
//!
//! Overrides for the e2e cluster policy, read only when a config opts in.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "E2E_CLUSTER";

/// Overrides read from the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Cleanup policy from E2E_CLUSTER_CLEANUP
    pub cleanup: Option<bool>,
    /// Reuse policy from E2E_CLUSTER_REUSE
    pub reuse: Option<bool>,
    /// Cluster name from E2E_CLUSTER_NAME
    pub name: Option<String>,
    /// Ingress host port from E2E_CLUSTER_INGRESS_PORT
    pub ingress_port: Option<u16>,
}

impl EnvConfig {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            cleanup: get_env_bool("CLEANUP"),
            reuse: get_env_bool("REUSE"),
            name: get_env("NAME").filter(|n| !n.is_empty()),
            ingress_port: get_env_parse("INGRESS_PORT"),
        }
    }

    /// Check if any override is set
    pub fn has_any(&self) -> bool {
        self.cleanup.is_some()
            || self.reuse.is_some()
            || self.name.is_some()
            || self.ingress_port.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean, unknown spellings are ignored
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).and_then(|v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    })
}

/// Builder for setting environment variables (useful for testing)
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_CLEANUP"), cleanup.to_string()));
        self
    }

    pub fn reuse(mut self, reuse: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_REUSE"), reuse.to_string()));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_NAME"), name.into()));
        self
    }

    pub fn ingress_port(mut self, port: u16) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_INGRESS_PORT"), port.to_string()));
        self
    }

    /// Set a raw value, e.g. an unparseable one
    pub fn raw(mut self, suffix: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{suffix}"), value.into()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // restore in reverse so repeated keys end at their original value
        for (key, value) in self.previous.iter().rev() {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all E2E_CLUSTER environment variables
pub fn print_env_help() {
    println!("Environment Variables (honoured when env overrides are enabled):");
    println!();
    println!("  {ENV_PREFIX}_CLEANUP        Delete the cluster on cleanup (true/false)");
    println!("  {ENV_PREFIX}_REUSE          Reuse an existing cluster with the same name (true/false)");
    println!("  {ENV_PREFIX}_NAME           Cluster name");
    println!("  {ENV_PREFIX}_INGRESS_PORT   Host port mapped to the ingress controller");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_REUSE=true");
    println!("  export {ENV_PREFIX}_CLEANUP=false");
    println!("  e2e-cluster up --ingress");
}

/// Serialises tests that touch process environment
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
