//! Rule Validation Harness
//!
//! Loads rule files from the command line (or the default rule directory),
//! reports parse/compile failures with line numbers, and prints rule set
//! statistics.

use sigsift::rules::RuleSet;
use std::path::PathBuf;
use std::time::Instant;

fn main() {
    let args: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    let paths = if args.is_empty() {
        vec![PathBuf::from("rules/web-dvwa.rules")]
    } else {
        args
    };

    println!("Rule Validation Harness");
    println!("=======================");
    println!();

    let mut set = RuleSet::new();
    let mut failed_files = 0usize;
    let mut total_loaded = 0usize;
    let mut total_skipped = Vec::new();
    let start = Instant::now();

    for path in &paths {
        if !path.exists() {
            println!("x {}: file not found", path.display());
            failed_files += 1;
            continue;
        }
        match set.load_from_file(path) {
            Ok(report) => {
                println!(
                    "+ {}: {} loaded, {} skipped",
                    path.display(),
                    report.loaded,
                    report.skipped.len()
                );
                total_loaded += report.loaded;
                total_skipped.extend(report.skipped);
            }
            Err(e) => {
                println!("x {}: {}", path.display(), e);
                failed_files += 1;
            }
        }
    }

    let duration = start.elapsed();
    println!();

    if !total_skipped.is_empty() {
        println!("Skipped rules:");
        for skipped in &total_skipped {
            println!("  line {}: {}", skipped.line, skipped.error);
        }
        println!();
    }

    println!("{}", set.stats());
    println!();
    println!(
        "Summary: {} rules loaded, {} skipped, {} file errors in {:.2?}",
        total_loaded,
        total_skipped.len(),
        failed_files,
        duration
    );

    if failed_files > 0 || !total_skipped.is_empty() {
        std::process::exit(1);
    }
}
