//! Settings loading and the static node inventory.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   probe_interval_secs: 30
//!   max_load_pct: 90.0
//!   reserve_delta_pct: 20.0
//! nodes:
//!   render-01:
//!     addr: "http://10.0.0.7:7071"
//!     cpu_cores: 8
//!     memory_mb: 16384
//!     gpu_count: 1
//! ```
//!
//! Every scheduler field is optional; missing values fall back to the
//! defaults below.  The `nodes` section feeds the static
//! [`NodeProvider`](crate::provider::NodeProvider) used by development and
//! bench deployments; marketplace provisioners implement the same trait
//! externally and ignore this section.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::node::{NodeCapacity, NodeDescriptor};

// ── Scheduler tunables ────────────────────────────────────────────────────────

/// All scheduler tunables, with the documented defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between health sweeps.
    pub probe_interval_secs: u64,
    /// Per-probe timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Scheduling grace window, in probe cycles.
    pub grace_probe_cycles: u32,
    /// Eviction window for persistently unreachable nodes, in probe cycles.
    pub evict_probe_cycles: u32,
    /// Upper bound of reserved plus measured load on any node.
    pub max_load_pct: f64,
    /// Advisory load increment held per partition dispatch.
    pub reserve_delta_pct: f64,
    /// Whole-task deadline in seconds (also the per-partition deadline).
    pub task_deadline_secs: u64,
    /// Retention window for terminal tasks, in seconds.
    pub retention_secs: u64,
    /// Seconds between task-store eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Default compute chunk size when the request does not specify one.
    pub default_chunk_size: usize,
    /// Ceiling on partitions per task.
    pub max_fan_out: usize,
    /// Request one node from the provider when bootstrap finds none.
    pub bootstrap_node_on_empty: bool,
    /// Control API request body limit in bytes.
    pub request_body_limit_bytes: usize,
    /// Control API request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
            grace_probe_cycles: 5,
            evict_probe_cycles: 20,
            max_load_pct: 90.0,
            reserve_delta_pct: 20.0,
            task_deadline_secs: 300,
            retention_secs: 3600,
            sweep_interval_secs: 60,
            default_chunk_size: 1000,
            max_fan_out: 32,
            bootstrap_node_on_empty: false,
            request_body_limit_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 330,
        }
    }
}

impl SchedulerConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Elapsed time since the last successful probe after which a node no
    /// longer counts as recently seen.
    pub fn grace_window(&self) -> Duration {
        self.probe_interval() * self.grace_probe_cycles
    }

    /// Elapsed time since the last successful probe after which a
    /// persistently unreachable node is dropped from the registry.
    pub fn evict_window(&self) -> Duration {
        self.probe_interval() * self.evict_probe_cycles
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── YAML file layout ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
    /// BTreeMap keeps the inventory in name order, so bootstrap logs and
    /// node listings are deterministic.
    #[serde(default)]
    nodes: BTreeMap<String, NodeEntry>,
}

/// Per-node fields as they appear in the YAML file.  Only `addr` is
/// required.
#[derive(Debug, Deserialize)]
struct NodeEntry {
    addr: String,
    label: Option<String>,
    #[serde(default = "default_cpu_cores")]
    cpu_cores: u32,
    #[serde(default)]
    memory_mb: u64,
    #[serde(default)]
    gpu_count: u32,
}

fn default_cpu_cores() -> u32 {
    1
}

// ── Public configuration ──────────────────────────────────────────────────────

/// Parsed configuration: scheduler tunables plus the static node inventory.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub static_nodes: Vec<NodeDescriptor>,
}

impl Config {
    /// Parses `path` into a [`Config`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the YAML is
    /// structurally invalid.  Per-node oddities (zero CPU count) are
    /// corrected with a warning rather than rejected.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML file: {}", path.display()))?;

        let mut static_nodes = Vec::with_capacity(file.nodes.len());
        for (name, entry) in file.nodes {
            let cpu_cores = if entry.cpu_cores == 0 {
                warn!(node = %name, "cpu_cores 0 is invalid, using 1");
                1
            } else {
                entry.cpu_cores
            };
            static_nodes.push(NodeDescriptor {
                label: entry.label.unwrap_or_else(|| name.clone()),
                id: name,
                addr: entry.addr,
                capacity: NodeCapacity {
                    cpu_cores,
                    memory_mb: entry.memory_mb,
                    gpu_count: entry.gpu_count,
                },
                confirmed: true,
            });
        }

        info!(
            nodes = static_nodes.len(),
            "configuration loaded ({} static node(s))",
            static_nodes.len()
        );
        for node in &static_nodes {
            info!(
                node = %node.id,
                addr = %node.addr,
                cpu = node.capacity.cpu_cores,
                memory_mb = node.capacity.memory_mb,
                gpu = node.capacity.gpu_count,
                "inventory node"
            );
        }

        Ok(Self {
            scheduler: file.scheduler,
            static_nodes,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.probe_interval_secs, 30);
        assert_eq!(cfg.probe_timeout_secs, 5);
        assert_eq!(cfg.max_load_pct, 90.0);
        assert_eq!(cfg.reserve_delta_pct, 20.0);
        assert_eq!(cfg.task_deadline_secs, 300);
        assert_eq!(cfg.retention_secs, 3600);
        assert_eq!(cfg.default_chunk_size, 1000);
        assert_eq!(cfg.max_fan_out, 32);
    }

    #[test]
    fn grace_window_is_five_probe_cycles() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.grace_window(), Duration::from_secs(150));
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn full_file_parses_scheduler_and_inventory() {
        let yaml = r#"
scheduler:
  probe_interval_secs: 10
  max_load_pct: 80.0
nodes:
  render-01:
    addr: "http://10.0.0.7:7071"
    cpu_cores: 8
    memory_mb: 16384
    gpu_count: 1
  worker-02:
    addr: "http://10.0.0.8:7071"
    label: "spot worker"
    cpu_cores: 4
"#;
        let f = yaml_tempfile(yaml);
        let cfg = Config::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.scheduler.probe_interval_secs, 10);
        assert_eq!(cfg.scheduler.max_load_pct, 80.0);
        // unspecified fields keep their defaults
        assert_eq!(cfg.scheduler.task_deadline_secs, 300);

        assert_eq!(cfg.static_nodes.len(), 2);
        let render = &cfg.static_nodes[0];
        assert_eq!(render.id, "render-01");
        assert_eq!(render.label, "render-01");
        assert_eq!(render.capacity.gpu_count, 1);
        let worker = &cfg.static_nodes[1];
        assert_eq!(worker.label, "spot worker");
        assert_eq!(worker.capacity.memory_mb, 0);
    }

    #[test]
    fn empty_file_yields_defaults_and_no_nodes() {
        let f = yaml_tempfile("{}\n");
        let cfg = Config::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.scheduler.max_load_pct, 90.0);
        assert!(cfg.static_nodes.is_empty());
    }

    #[test]
    fn zero_cpu_cores_is_floored_to_one() {
        let yaml = r#"
nodes:
  odd:
    addr: "http://h:1"
    cpu_cores: 0
"#;
        let f = yaml_tempfile(yaml);
        let cfg = Config::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.static_nodes[0].capacity.cpu_cores, 1);
    }

    #[test]
    fn missing_file_returns_error() {
        let result = Config::load_from_file(Path::new("/nonexistent/supervm.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("scheduler: [not, a, map]\n");
        assert!(Config::load_from_file(f.path()).is_err());
    }

    #[test]
    fn node_without_addr_is_rejected() {
        let yaml = "nodes:\n  broken:\n    cpu_cores: 2\n";
        let f = yaml_tempfile(yaml);
        assert!(Config::load_from_file(f.path()).is_err());
    }
}
