//! Crate-wide constants: fixed on-machine paths and naming.

/// Application name, used for XDG directories.
pub const APP_NAME: &str = "converge";

/// Length of the truncated SHA-256 prefix used for record fingerprints.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Environment variable overriding the store directory.
pub const STORE_ENV: &str = "CONVERGE_STORE";

/// Environment variable supplying the default config file path.
pub const CONFIG_ENV: &str = "CONVERGE_CONFIG";

/// Fixed locations on the provisioned machine, relative to the target root.
pub mod machine {
  pub const BOSH_DIR: &str = "var/vcap/bosh";
  pub const BIN_DIR: &str = "var/vcap/bosh/bin";
  pub const DATA_DIR: &str = "var/vcap/data";
  pub const SYS_LINK: &str = "var/vcap/sys";
  pub const SYS_LINK_TARGET: &str = "data/sys";
  pub const PLATFORM_FILE: &str = "var/vcap/bosh/etc/platform";
  pub const AGENT_CONFIG_FILE: &str = "var/vcap/bosh/agent.json";
  pub const INFRASTRUCTURE_SETTINGS_FILE: &str = "var/vcap/bosh/warden-cpi-agent-env.json";
}

/// Supervised service names.
pub mod services {
  pub const AGENT: &str = "agent";
  pub const MONIT: &str = "monit";
}
