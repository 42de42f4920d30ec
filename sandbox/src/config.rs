use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);
pub const DEFAULT_STEP_BUDGET: u64 = 50_000_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_PROCESSES: u64 = 64;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 8;

/// Standard modules a python run may import.
pub const DEFAULT_PYTHON_MODULES: [&str; 21] = [
    "math",
    "random",
    "string",
    "re",
    "json",
    "itertools",
    "functools",
    "collections",
    "heapq",
    "bisect",
    "datetime",
    "decimal",
    "fractions",
    "statistics",
    "operator",
    "typing",
    "dataclasses",
    "enum",
    "copy",
    "textwrap",
    "time",
];

/// Budgets applied to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub step_budget: u64,
    /// Per stream.
    pub max_output_bytes: usize,
    /// Address space ceiling for interpreters that tolerate one.
    pub memory_bytes: u64,
    /// Ceiling on processes owned by the run's user.
    pub max_processes: u64,
    /// Interpreter processes alive at once across the whole dispatcher.
    pub max_concurrent_runs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            step_budget: DEFAULT_STEP_BUDGET,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            memory_bytes: DEFAULT_MEMORY_BYTES,
            max_processes: DEFAULT_MAX_PROCESSES,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub limits: Limits,
    pub node_bin: String,
    pub python_bin: String,
    pub python_modules: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            node_bin: "node".to_owned(),
            python_bin: "python3".to_owned(),
            python_modules: DEFAULT_PYTHON_MODULES
                .iter()
                .map(|module| (*module).to_owned())
                .collect(),
        }
    }
}
