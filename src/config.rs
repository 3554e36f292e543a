//! Session configuration, with overrides read from the environment.

use std::{env, thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{channel::DEFAULT_RECV_TIMEOUT, error::ConfigError};

/// Which source of multiplication triples a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeaverKind {
    /// Rank 0 acts as trusted first party and derives all triples from seeds.
    #[default]
    TrustedDealer,
    /// Triples are generated interactively from oblivious transfers, without a dealer.
    Ot,
}

/// Which kernel the name `B2A` resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum B2aVariant {
    /// Consumes random bits precomputed with [`crate::mpc::state::Semi2kState::precompute_b2a`].
    Precomputed,
    /// Opens a freshly masked value.
    #[default]
    Randbit,
}

/// Configuration shared by all parties of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The maximum number of kernels evaluated concurrently.
    pub num_threads: usize,
    /// How long a party waits for a message before the session fails.
    pub recv_timeout: Duration,
    /// The source of correlated randomness.
    pub beaver: BeaverKind,
    /// The kernel registered under the name `B2A`.
    pub b2a: B2aVariant,
    /// The maximum number of correlations (per element) the Beaver source hands out.
    pub triple_budget: Option<usize>,
    /// Seeds the party's randomness, for reproducible runs. Fresh entropy is used if `None`.
    pub seed: Option<[u8; 32]>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            beaver: BeaverKind::default(),
            b2a: B2aVariant::default(),
            triple_budget: None,
            seed: None,
        }
    }
}

const NUM_THREADS_VAR: &str = "RINGMPC_NUM_THREADS";
const RECV_TIMEOUT_VAR: &str = "RINGMPC_RECV_TIMEOUT_SECS";
const BEAVER_VAR: &str = "RINGMPC_BEAVER";
const B2A_VAR: &str = "RINGMPC_B2A";

fn default_num_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn parse_var<T>(
    var: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => match parse(value.trim()) {
            Some(v) => Ok(Some(v)),
            None => Err(ConfigError::InvalidEnvVar { var, value }),
        },
        Err(_) => Ok(None),
    }
}

impl SessionConfig {
    /// The default configuration, overridden by `RINGMPC_NUM_THREADS`,
    /// `RINGMPC_RECV_TIMEOUT_SECS`, `RINGMPC_BEAVER` (`dealer` or `ot`) and `RINGMPC_B2A`
    /// (`precomputed` or `randbit`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(n) = parse_var(NUM_THREADS_VAR, |v| v.parse().ok())? {
            config.num_threads = n;
        }
        if let Some(secs) = parse_var(RECV_TIMEOUT_VAR, |v| v.parse().ok())? {
            config.recv_timeout = Duration::from_secs(secs);
        }
        if let Some(beaver) = parse_var(BEAVER_VAR, |v| match v {
            "dealer" => Some(BeaverKind::TrustedDealer),
            "ot" => Some(BeaverKind::Ot),
            _ => None,
        })? {
            config.beaver = beaver;
        }
        if let Some(b2a) = parse_var(B2A_VAR, |v| match v {
            "precomputed" => Some(B2aVariant::Precomputed),
            "randbit" => Some(B2aVariant::Randbit),
            _ => None,
        })? {
            config.b2a = b2a;
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations no session can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: [u8; 32]) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the Beaver source.
    pub fn with_beaver(mut self, beaver: BeaverKind) -> Self {
        self.beaver = beaver;
        self
    }

    /// Sets the `B2A` variant.
    pub fn with_b2a(mut self, b2a: B2aVariant) -> Self {
        self.b2a = b2a;
        self
    }

    /// Limits the number of correlations the Beaver source hands out.
    pub fn with_triple_budget(mut self, budget: usize) -> Self {
        self.triple_budget = Some(budget);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.num_threads >= 1);
        assert_eq!(config.recv_timeout, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threads_are_rejected() {
        let config = SessionConfig {
            num_threads: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_overrides() {
        // the variables are only touched by this test
        unsafe {
            env::set_var(NUM_THREADS_VAR, "3");
            env::set_var(BEAVER_VAR, "ot");
            env::set_var(B2A_VAR, "precomputed");
        }
        let config = SessionConfig::from_env().unwrap();
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.beaver, BeaverKind::Ot);
        assert_eq!(config.b2a, B2aVariant::Precomputed);

        unsafe { env::set_var(BEAVER_VAR, "dealr") };
        assert!(matches!(
            SessionConfig::from_env(),
            Err(ConfigError::InvalidEnvVar { var: BEAVER_VAR, .. })
        ));
        unsafe {
            env::remove_var(NUM_THREADS_VAR);
            env::remove_var(BEAVER_VAR);
            env::remove_var(B2A_VAR);
        }
    }
}
