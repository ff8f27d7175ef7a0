use std::io::Write;
use std::path::Path;
use std::time::Duration;

use console::{Style, Term};

use crate::coordinator::{CampaignResult, Progress, StaleMutant};
use crate::mutants::Mutation;
use crate::process::{Captured, Exit};
use crate::runner::{PhaseFailure, PreflightFailure};

pub const PROGRESS_BAR_WIDTH: usize = 30;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_info(msg: &str) {
    let style = Style::new().dim();
    eprintln!("{} {}", style.apply_to("·"), msg);
}

pub fn make_progress_bar(current: usize, total: usize, width: usize) -> String {
    let filled = if total > 0 { (width * current / total).min(width) } else { 0 };
    format!("[{}{}] {}/{}", "#".repeat(filled), "-".repeat(width - filled), current, total)
}

/// Renders campaign progress, redrawing in place when stdout is a terminal.
pub struct ProgressLine {
    in_place: bool,
}

impl ProgressLine {
    pub fn new() -> Self {
        Self {
            in_place: Term::stdout().is_term(),
        }
    }

    pub fn update(&self, p: Progress) {
        let line = format!(
            "{}  Uncaught mutations: {}",
            make_progress_bar(p.completed, p.total, PROGRESS_BAR_WIDTH),
            p.undetected
        );
        if self.in_place {
            let mut out = std::io::stdout();
            let _ = write!(out, "\r{}{}", line, " ".repeat(10));
            let _ = out.flush();
        } else {
            println!("{}", line);
        }
    }

    pub fn finish(&self) {
        if self.in_place {
            println!();
        }
    }
}

impl Default for ProgressLine {
    fn default() -> Self {
        Self::new()
    }
}

fn dump_streams(label: &str, stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        eprintln!("  --- {} STDOUT ---", label);
        eprintln!("{}", stdout);
    }
    if !stderr.is_empty() {
        eprintln!("  --- {} STDERR ---", label);
        eprintln!("{}", stderr);
    }
}

fn dump_captured(label: &str, captured: &Captured) {
    dump_streams(label, &captured.stdout_text(), &captured.stderr_text());
}

pub fn print_preflight_failure(
    failure: &PreflightFailure,
    build_cmd: &str,
    test_cmd: &str,
    build_timeout: Duration,
    test_timeout: Duration,
) {
    match failure {
        PreflightFailure::Interrupted => {
            print_info("Interrupted during the baseline run.");
        }
        PreflightFailure::Build(phase) => {
            match phase {
                PhaseFailure::Spawn(e) => print_error(&format!("Exception during build: {}. Aborting.", e)),
                PhaseFailure::Unsuccessful(c) if c.exit == Exit::TimedOut => {
                    print_error(&format!(
                        "Build command timed out after {} seconds. Aborting.",
                        build_timeout.as_secs_f64()
                    ));
                    dump_captured("BUILD", c);
                }
                PhaseFailure::Unsuccessful(c) => {
                    print_error("Build failed. Aborting.");
                    dump_captured("BUILD", c);
                }
            }
            eprintln!("  Build command: {}", build_cmd);
            print_info("No results have been written to disk.");
        }
        PreflightFailure::Test(phase) => {
            match phase {
                PhaseFailure::Spawn(e) => print_error(&format!(
                    "Exception while running test suite in main project context: {}. Aborting mutation testing.",
                    e
                )),
                PhaseFailure::Unsuccessful(c) if c.exit == Exit::TimedOut => print_error(&format!(
                    "Test suite timed out after {} seconds in main project context. Aborting mutation testing.",
                    test_timeout.as_secs_f64()
                )),
                PhaseFailure::Unsuccessful(_) => print_error(
                    "Test suite failed in main project context. Aborting mutation testing.",
                ),
            }
            eprintln!("  Test command: {}", test_cmd);
            if let PhaseFailure::Unsuccessful(c) = phase {
                dump_captured("TEST", c);
            }
            eprintln!();
            eprintln!("[ABORTED] The test suite must pass on the unmutated code before running mutation testing.");
            eprintln!("[SUGGESTION] Please fix your tests or code so that the test suite passes, then re-run mutation testing.");
            print_info("No results have been written to disk.");
        }
    }
}

pub fn print_stale_mutant(stale: &StaleMutant, mutant_path: &Path, build_cmd: &str, build_timeout: Duration) {
    eprintln!();
    print_error(&format!("Build failed for mutant {}:", stale.position));
    eprintln!("  Mutant name: {}", stale.mutation.name);
    eprintln!("  Mutant file: {}", mutant_path.display());
    eprintln!("  Original rel path: {}", stale.mutation.original);
    eprintln!("  Build command: {}", build_cmd);
    if stale.failure.timed_out {
        eprintln!(
            "  [TIMEOUT] Build command timed out after {} seconds.",
            build_timeout.as_secs_f64()
        );
    }
    dump_streams("BUILD", &stale.failure.stdout, &stale.failure.stderr);
    eprintln!();
    eprintln!(
        "[ABORTED] The build failed for this mutant. This usually means your source code has changed since the mutants were generated, and the mutants are now out of date."
    );
    eprintln!("[SUGGESTION] Please re-run 'gambit mutate' to regenerate mutants for the current codebase.");
    print_info("No results have been written to disk.");
}

pub fn print_interrupted() {
    eprintln!();
    print_info("Interrupt received. Killed running subprocesses; exiting without writing results.");
}

/// Pretty-print a list of mutation records with their diffs.
pub fn print_mutations(mutations: &[Mutation]) {
    let heading = Style::new().bold();
    let dim = Style::new().dim();
    println!();
    println!("{}", heading.apply_to("=== Mutations to be tested ==="));
    println!();
    for (i, m) in mutations.iter().enumerate() {
        println!("Mutation {}/{}:", i + 1, mutations.len());
        if let Some(desc) = m.description.as_deref().filter(|d| !d.is_empty()) {
            println!("  Description: {}", desc);
        }
        println!("  Name: {}", m.name);
        if let Some(diff) = m.diff.as_deref().filter(|d| !d.is_empty()) {
            println!("  Diff (truncated):");
            for line in diff.lines() {
                let style = if line.starts_with('-') {
                    Style::new().red()
                } else if line.starts_with('+') {
                    Style::new().green()
                } else {
                    Style::new()
                };
                println!("    {}", style.apply_to(line));
            }
        }
        println!("  {}", dim.apply_to("-".repeat(40)));
    }
    println!("Total mutations: {}", mutations.len());
    println!();
}

pub fn print_campaign_summary(result: &CampaignResult, output: &Path, elapsed: Duration) {
    let line = format!(
        "Done. {} out of {} mutations were NOT detected by the test suite (mutation test failures).",
        result.escaped.len(),
        result.total
    );
    if result.escaped.is_empty() {
        print_success(&line);
    } else {
        let style = Style::new().yellow().bold();
        println!("{} {}", style.apply_to("!"), line);
    }

    let dim = Style::new().dim();
    let c = &result.counts;
    println!(
        "  {} {} caught, {} uncaught, {} timed out, {} skipped, {} errors",
        dim.apply_to("·"),
        c.detected,
        c.undetected,
        c.timed_out,
        c.skipped,
        c.errors
    );

    print_mutations(&result.escaped);
    println!("Results written to {}", output.display());
    println!("Elapsed time: {:.2} seconds", elapsed.as_secs_f64());
}
