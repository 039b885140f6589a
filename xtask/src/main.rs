use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, Command, Stdio};

const PRESETS_DIR: &str = "presets";
const SNAPSHOT_DIR: &str = "target/snapshots";
const DEFAULT_TICKS: u32 = 120;
const SNAPSHOT_SIZE: (u32, u32) = (640, 360);

fn main() {
    if let Err(error) = run() {
        eprintln!("xtask: {error}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "snapshots" => {
            let mut ticks = DEFAULT_TICKS;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--ticks" => {
                        let value = args
                            .next()
                            .ok_or_else(|| "--ticks needs a value".to_owned())?;
                        ticks = value
                            .parse()
                            .map_err(|_| format!("--ticks expects an integer, got '{value}'"))?;
                    }
                    "--help" | "-h" => {
                        print_snapshots_help();
                        return Ok(());
                    }
                    other => {
                        return Err(format!(
                            "unknown argument '{other}' for 'snapshots' (try: cargo xtask snapshots --help)"
                        ));
                    }
                }
            }
            snapshots(ticks)
        }
        "check-presets" => check_presets(),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(format!(
            "unknown xtask command '{other}' (try: cargo xtask --help)"
        )),
    }
}

/// Render every preset with a pinned seed into `target/snapshots/<name>.png`.
fn snapshots(ticks: u32) -> Result<(), String> {
    ensure_cargo_available()?;
    let repo_root = repo_root()?;
    let out_dir = repo_root.join(SNAPSHOT_DIR);
    fs::create_dir_all(&out_dir).map_err(|error| {
        format!(
            "failed to create snapshot directory {}: {error}",
            out_dir.display()
        )
    })?;

    for preset in preset_files(&repo_root)? {
        let name = preset
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| format!("preset has no usable file name: {}", preset.display()))?;
        let output = out_dir.join(format!("{name}.png"));
        run_glyphrain(
            &repo_root,
            &[
                "render".to_owned(),
                preset.display().to_string(),
                "--ticks".to_owned(),
                ticks.to_string(),
                "--width".to_owned(),
                SNAPSHOT_SIZE.0.to_string(),
                "--height".to_owned(),
                SNAPSHOT_SIZE.1.to_string(),
                "--seed".to_owned(),
                "1".to_owned(),
                "--output".to_owned(),
                output.display().to_string(),
            ],
        )?;
    }

    println!("Snapshots written to {}", out_dir.display());
    Ok(())
}

fn check_presets() -> Result<(), String> {
    ensure_cargo_available()?;
    let repo_root = repo_root()?;
    for preset in preset_files(&repo_root)? {
        run_glyphrain(&repo_root, &["check".to_owned(), preset.display().to_string()])?;
    }
    Ok(())
}

fn preset_files(repo_root: &Path) -> Result<Vec<PathBuf>, String> {
    let dir = repo_root.join(PRESETS_DIR);
    let entries = fs::read_dir(&dir)
        .map_err(|error| format!("failed to read presets in {}: {error}", dir.display()))?;

    let mut presets = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect::<Vec<_>>();
    presets.sort();

    if presets.is_empty() {
        return Err(format!("no presets found in {}", dir.display()));
    }
    Ok(presets)
}

fn run_glyphrain(repo_root: &Path, args: &[String]) -> Result<(), String> {
    let status = Command::new("cargo")
        .current_dir(repo_root)
        .args(["run", "--quiet", "--release", "--bin", "glyphrain", "--"])
        .args(args)
        .status()
        .map_err(|error| format!("failed to run cargo: {error}"))?;

    if !status.success() {
        return Err(format!(
            "glyphrain {} failed (exit status {:?})",
            args.join(" "),
            status.code()
        ));
    }
    Ok(())
}

fn repo_root() -> Result<PathBuf, String> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().map(Path::to_path_buf).ok_or_else(|| {
        format!(
            "failed to resolve repository root from {}",
            manifest_dir.display()
        )
    })
}

fn ensure_cargo_available() -> Result<(), String> {
    let status = Command::new("cargo")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!(
            "'cargo --version' exited with {:?}",
            status.code()
        )),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            Err("cargo not found on PATH".to_owned())
        }
        Err(error) => Err(format!("failed to run 'cargo --version': {error}")),
    }
}

fn print_usage() {
    println!("Usage:");
    println!("  cargo xtask snapshots [--ticks N]");
    println!("  cargo xtask check-presets");
}

fn print_snapshots_help() {
    println!("Render every preset in presets/ to target/snapshots/<name>.png.");
    println!();
    print_usage();
    println!();
    println!("Options:");
    println!("  --ticks N   Ticks to run before the snapshot (default {DEFAULT_TICKS})");
}
