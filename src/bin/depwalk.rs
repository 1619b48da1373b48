use anyhow::Context;
use clap::Parser;
use fs_err as fs;
use std::path::{Path, PathBuf};

use depwalk::{
    decanonicalize, is_beneath, path_to_string, readable_canonical_path, Resolution, SystemPaths,
    WalkQuery,
};

/// ldd-style report of where the loader resolves a binary's DLL dependencies
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Target file (.exe or .dll)
    input: PathBuf,

    /// Omit dependencies that resolve beneath the system directory
    #[arg(short = 'u', long)]
    ignore_system_libs: bool,

    /// Windows System32 directory to use instead of the detected one
    #[arg(short, long, value_name = "SYSDIR")]
    sysdir: Option<PathBuf>,

    /// Directory to resolve against instead of the directory containing INPUT
    #[arg(short = 'k', long, value_name = "WORKDIR")]
    workdir: Option<PathBuf>,

    /// Extra directories (;-separated) appended to the emulated search path
    #[cfg(not(windows))]
    #[arg(short = 'a', long, value_name = "PATH")]
    userpath: Option<String>,

    /// Path for output in JSON format
    #[arg(short = 'j', long, value_name = "OUTPUT_JSON_PATH")]
    output_json_path: Option<PathBuf>,

    /// Print the deduced search context before the report
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !cli.input.exists() {
        eprintln!(
            "Specified file not found at {}\nCurrent working directory: {}",
            cli.input.display(),
            std::env::current_dir()?.display(),
        );
        std::process::exit(1);
    }

    if cli.input.is_dir() {
        eprintln!(
            "The specified path is a directory, not a PE executable file: {}",
            cli.input.display(),
        );
        std::process::exit(1);
    }

    let mut query = WalkQuery::from_image_path(&cli.input)?;

    if let Some(sysdir) = &cli.sysdir {
        let sys_dir = fs::canonicalize(sysdir)?;
        let win_dir = sys_dir
            .parent()
            .map(Path::to_owned)
            .unwrap_or_else(|| sys_dir.clone());
        query.system = Some(SystemPaths { win_dir, sys_dir });
    } else if cli.verbose {
        match &query.system {
            Some(system) => println!(
                "System directory not specified, assumed {}",
                decanonicalize(&path_to_string(&system.sys_dir))
            ),
            None => println!(
                "System directory not specified and none found; system libraries will not resolve"
            ),
        }
    }

    if let Some(workdir) = &cli.workdir {
        query.context_dir = Some(fs::canonicalize(workdir)?);
    }

    #[cfg(not(windows))]
    if let Some(userpath) = &cli.userpath {
        for entry in userpath.split(';').filter(|s| !s.is_empty()) {
            let p = Path::new(entry);
            if p.exists() {
                query.user_path.push(fs::canonicalize(p)?);
            } else {
                eprintln!("Skipping non-existing path entry {}", entry);
            }
        }
    }

    if cli.verbose {
        println!(
            "Looking for dependencies of binary {}",
            readable_canonical_path(&query.target_image)?
        );
        if let Some(workdir) = &query.context_dir {
            println!(
                "Resolution context: {}",
                decanonicalize(&path_to_string(workdir))
            );
        }
    }

    let report = depwalk::walk(&query)?;

    let sys_dir = query.system.as_ref().map(|s| s.sys_dir.clone());
    let sorted = report.sorted_by_resolved_path();

    for record in &sorted {
        if cli.ignore_system_libs {
            if let (Some(sys_dir), Some(path)) = (&sys_dir, record.resolved_path()) {
                if is_beneath(path, sys_dir) {
                    continue;
                }
            }
        }
        match &record.resolution {
            Resolution::Resolved(path) => println!(
                "{} => {}",
                record.dependency_name,
                decanonicalize(&path_to_string(path))
            ),
            Resolution::Unresolved(code) => {
                println!("{} => UNRESOLVED ({})", record.dependency_name, code)
            }
        }
    }

    if let Some(json_path) = &cli.output_json_path {
        let js = serde_json::to_string(&sorted).context("Error serializing")?;
        fs::write(json_path, js)
            .with_context(|| format!("couldn't write to {}", json_path.display()))?;
        if cli.verbose {
            println!("successfully wrote to {}", json_path.display());
        }
    }

    Ok(())
}
