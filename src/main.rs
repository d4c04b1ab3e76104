//! Thin CLI layer: parse args, styled output, and call into bindle-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bindle_core::{parse_external, parse_resource, BundleConfig, BundlePipeline};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

/// Run a long-running task; in quiet mode show a spinner until done.
fn run_with_spinner<T, F>(message: &str, quiet: bool, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    if !quiet {
        return f();
    }
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}").unwrap(),
    );
    spinner.set_message(message.to_string());
    let mut elapsed = Duration::ZERO;
    let timeout = Duration::from_secs(600);
    let tick = Duration::from_millis(80);
    loop {
        match rx.try_recv() {
            Ok(res) => {
                spinner.finish_and_clear();
                return res;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                spinner.finish_and_clear();
                return Err("Operation failed.".to_string());
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }
        if elapsed >= timeout {
            spinner.finish_and_clear();
            return Err("Operation timed out.".to_string());
        }
        spinner.tick();
        thread::sleep(tick);
        elapsed += tick;
    }
}

fn build_cli() -> Command {
    Command::new("bindle")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prepare a publishable npm package: bundle dependencies, attribute licenses, validate, pack")
        .after_help(
            "Examples:\n  bindle validate\n  bindle validate --fix\n  bindle --external aws-sdk:runtime write\n  bindle pack --destination dist",
        )
        .subcommand_required(true)
        .arg(
            Arg::new("package-dir")
                .long("package-dir")
                .default_value(".")
                .help("Root of the package to bundle"),
        )
        .arg(
            Arg::new("entrypoint")
                .long("entrypoint")
                .action(ArgAction::Append)
                .help("Entry point relative to the package dir (repeatable; default: the manifest's entry point)"),
        )
        .arg(
            Arg::new("external")
                .long("external")
                .action(ArgAction::Append)
                .help("Dependency kept external, as name:runtime or name:optional (repeatable)"),
        )
        .arg(
            Arg::new("allowed-license")
                .long("allowed-license")
                .action(ArgAction::Append)
                .help("Allowed SPDX license identifier, case-insensitive (repeatable; replaces the default list)"),
        )
        .arg(
            Arg::new("resource")
                .long("resource")
                .action(ArgAction::Append)
                .help("Required resource as name:relpath (repeatable)"),
        )
        .arg(
            Arg::new("dont-attribute")
                .long("dont-attribute")
                .help("Regex of dependency names to exclude from attributions"),
        )
        .arg(
            Arg::new("test")
                .long("test")
                .help("Shell command to run inside the written bundle as a smoke test"),
        )
        .arg(
            Arg::new("minify-whitespace")
                .long("minify-whitespace")
                .action(ArgAction::SetTrue)
                .help("Ask the bundler to minify whitespace"),
        )
        .arg(
            Arg::new("metafile")
                .long("metafile")
                .help("Write the bundler's build metafile to this path"),
        )
        .arg(
            Arg::new("sourcemap")
                .long("sourcemap")
                .action(ArgAction::SetTrue)
                .help("Ask the bundler to emit sourcemaps"),
        )
        .arg(
            Arg::new("licenses-file")
                .long("licenses-file")
                .default_value("THIRD_PARTY_LICENSES")
                .help("Name of the attributions document, relative to the package dir"),
        )
        .arg(
            Arg::new("versions-file")
                .long("versions-file")
                .help("Emit the versions index to this separate file; attribution titles then omit versions"),
        )
        .arg(
            Arg::new("versions-sidecar")
                .long("versions-sidecar")
                .action(ArgAction::SetTrue)
                .help("With no versions file, also write <licenses-file>.versions.json on flush"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Minimal output; show spinner when busy"),
        )
        .subcommand(
            Command::new("validate")
                .about("Check policy invariants; report violations")
                .arg(
                    Arg::new("fix")
                        .short('f')
                        .long("fix")
                        .action(ArgAction::SetTrue)
                        .help("Rewrite stale or missing attribution artifacts"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the machine-readable report"),
                ),
        )
        .subcommand(
            Command::new("write").about("Materialize the bundle directory and print its path"),
        )
        .subcommand(
            Command::new("pack")
                .about("Write the bundle and pack it into <name>-<version>.tgz")
                .arg(
                    Arg::new("destination")
                        .long("destination")
                        .help("Directory for the tarball (default: the package dir)"),
                ),
        )
}

fn config_from_matches(matches: &clap::ArgMatches) -> Result<BundleConfig, String> {
    let package_dir = matches.get_one::<String>("package-dir").unwrap();
    let mut config = BundleConfig::new(package_dir);

    if let Some(entries) = matches.get_many::<String>("entrypoint") {
        config.entry_points = entries.cloned().collect();
    }
    if let Some(specs) = matches.get_many::<String>("external") {
        for spec in specs {
            let (name, kind) = parse_external(spec).map_err(|e| e.to_string())?;
            config.externals.push(name, kind);
        }
        config.externals.validate().map_err(|e| e.to_string())?;
    }
    if let Some(licenses) = matches.get_many::<String>("allowed-license") {
        config.allowed_licenses = licenses.cloned().collect();
    }
    if let Some(specs) = matches.get_many::<String>("resource") {
        for spec in specs {
            let (name, path) = parse_resource(spec).map_err(|e| e.to_string())?;
            config.resources.insert(name, path);
        }
    }
    config.dont_attribute = matches.get_one::<String>("dont-attribute").cloned();
    config.test = matches.get_one::<String>("test").cloned();
    config.minify_whitespace = matches.get_flag("minify-whitespace");
    config.metafile = matches.get_one::<String>("metafile").cloned();
    config.sourcemap = matches.get_flag("sourcemap");
    config.licenses_file = matches.get_one::<String>("licenses-file").unwrap().clone();
    config.versions_file = matches.get_one::<String>("versions-file").cloned();
    config.versions_sidecar = matches.get_flag("versions-sidecar");
    Ok(config)
}

fn run() -> Result<(), String> {
    let matches = build_cli().get_matches();
    let quiet = matches.get_flag("quiet");
    if quiet {
        env::set_var("BINDLE_QUIET", "1");
    }
    let config = config_from_matches(&matches)?;

    match matches.subcommand() {
        Some(("validate", sub_m)) => {
            let fix = sub_m.get_flag("fix");
            let json_out = sub_m.get_flag("json");
            let report = BundlePipeline::new(config)
                .validate(fix)
                .map_err(|e| e.to_string())?;
            if json_out {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report.to_json())
                        .unwrap_or_else(|_| "{}".to_string())
                );
                if !report.success {
                    std::process::exit(1);
                }
                return Ok(());
            }
            if !report.success {
                return Err(format!("Validation failed:\n{}", report.summary()));
            }
            if report.violations.is_empty() {
                success("No violations found.");
            } else {
                success(&format!("Fixed {} violation(s).", report.violations.len()));
            }
        }
        Some(("write", _)) => {
            let bundle = BundlePipeline::new(config)
                .write()
                .map_err(|e| e.to_string())?;
            if !quiet {
                info("Bundle written.");
            }
            println!("{}", bundle.display());
        }
        Some(("pack", sub_m)) => {
            let destination = sub_m.get_one::<String>("destination").map(PathBuf::from);
            let tarball = run_with_spinner("Packing bundle…", quiet, move || {
                BundlePipeline::new(config)
                    .pack(destination.as_deref())
                    .map_err(|e| e.to_string())
            })?;
            println!("{}", tarball.display());
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
