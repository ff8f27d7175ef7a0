pub mod config;
pub mod coordinator;
pub mod copy_tree;
pub mod error;
pub mod generate;
pub mod mutants;
pub mod output;
pub mod process;
pub mod results;
pub mod runner;
pub mod select;
pub mod workspace;

/// Process exit statuses of the `run` flow.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// Configuration, I/O, or baseline build failure.
    pub const ERROR: i32 = 1;
    /// A mutant failed to build: the mutant set is stale.
    pub const STALE_MUTANTS: i32 = 2;
    /// The unmutated test suite failed or timed out.
    pub const PREFLIGHT_FAILED: i32 = 3;
    pub const INTERRUPTED: i32 = 130;
}
