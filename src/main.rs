use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use flow_css::{FlowConfig, FlowPlugin, FsFileService};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: flow-css --root <dir> [--config <file>] [--out <file>] <stylesheet>";

#[derive(Debug, Default)]
struct CliArgs {
    root: Option<String>,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    stylesheet: Option<PathBuf>,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("[flow-css] {err:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLOW_CSS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = parse_args(env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => FlowConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => FlowConfig::default(),
    };
    if let Some(root) = args.root {
        config.root = root;
    }

    let stylesheet = args
        .stylesheet
        .ok_or_else(|| anyhow!("required argument missing: <stylesheet>. {USAGE}"))?;
    let code = fs::read_to_string(&stylesheet)
        .with_context(|| format!("failed to read stylesheet '{}'", stylesheet.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let plugin = FlowPlugin::new(config, FsFileService::new())?;
    let summary = runtime
        .block_on(plugin.build_start())
        .context("scan failed")?;
    info!(
        files = summary.files_scanned,
        styles = summary.styles,
        "scanned {}",
        plugin.config().root
    );

    let file = stylesheet.to_string_lossy().replace('\\', "/");
    let output = plugin
        .transformer()
        .transform_stylesheet(&code, &file)
        .with_context(|| format!("failed to generate '{file}'"))?;

    match args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output dir '{}'", parent.display())
                })?;
            }
            fs::write(&path, output.code)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
        }
        None => print!("{}", output.code),
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --root"))?;
                parsed.root = Some(value);
            }
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config"))?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--out" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --out"))?;
                parsed.out = Some(PathBuf::from(value));
            }
            "-h" | "--help" => return Err(anyhow!(USAGE)),
            flag if flag.starts_with("--") => {
                return Err(anyhow!("unknown argument '{flag}'. {USAGE}"));
            }
            _ => {
                if parsed.stylesheet.is_some() {
                    return Err(anyhow!("only one stylesheet may be given. {USAGE}"));
                }
                parsed.stylesheet = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_all_flags() {
        let parsed = parse_args(args(&[
            "--root", "web", "--config", "flow.json", "--out", "dist/app.css", "src/index.css",
        ]))
        .unwrap();
        assert_eq!(parsed.root.as_deref(), Some("web"));
        assert_eq!(parsed.config, Some(PathBuf::from("flow.json")));
        assert_eq!(parsed.out, Some(PathBuf::from("dist/app.css")));
        assert_eq!(parsed.stylesheet, Some(PathBuf::from("src/index.css")));
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(parse_args(args(&["--watch"])).is_err());
        assert!(parse_args(args(&["--root"])).is_err());
        assert!(parse_args(args(&["a.css", "b.css"])).is_err());
    }
}
