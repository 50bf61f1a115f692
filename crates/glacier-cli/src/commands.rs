use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use glacier_evict::{DiskMonitor, EvictionLoop, FsDiskProbe, PassReport, RetentionObserver};
use glacier_server::{GlacierConfig, GlacierServer};
use glacier_store::{parse_disk_usage_allowed, ContainerStore, StoreConfig};
use glacier_types::generate_identifier;
use serde::Serialize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args, &format),
        Command::Put(args) => cmd_put(config, args, &format),
        Command::Get(args) => cmd_get(config, args),
        Command::Uuid(args) => cmd_uuid(config, args, &format),
        Command::Resolve(args) => cmd_resolve(config, args, &format),
        Command::Inspect(args) => cmd_inspect(config, args, &format),
        Command::Evict(args) => cmd_evict(config, args, &format),
        Command::Status(args) => cmd_status(config, args, &format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GlacierConfig> {
    match path {
        Some(path) => GlacierConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(GlacierConfig::default()),
    }
}

/// Accepts the spellings of a boolean environment value.
fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim(), "1" | "t" | "T" | "true" | "TRUE" | "True" | "yes")
}

fn apply_store_args(mut config: StoreConfig, args: &StoreArgs) -> StoreConfig {
    if let Some(folder) = &args.data_folder {
        config.data_folder = folder.clone();
    }
    if let Some(raw) = &args.disk_usage_allowed {
        config.disk_usage_allowed = parse_disk_usage_allowed(raw);
    }
    if let Some(raw) = &args.extend_life_support {
        config.extend_life_support = parse_flag(raw);
    }
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    config.validated()
}

fn open_store(config: GlacierConfig, args: &StoreArgs) -> StoreConfig {
    apply_store_args(config.store, args)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_serve(mut config: GlacierConfig, args: ServeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    config.store = apply_store_args(config.store, &args.store);
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if args.read_token.is_some() {
        config.server.read_token = args.read_token;
    }
    if args.write_token.is_some() {
        config.server.write_token = args.write_token;
    }
    if let Some(limit) = args.max_upload_size {
        config.server.max_upload_size = limit;
    }

    match format {
        OutputFormat::Json => {
            let mut shown = config.clone();
            shown.server.read_token = shown.server.read_token.map(|_| "<set>".into());
            shown.server.write_token = shown.server.write_token.map(|_| "<set>".into());
            print_json(&shown)?;
        }
        OutputFormat::Text => print_settings(&config),
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(GlacierServer::new(config).serve())?;
    println!("{} Server stopped.", "✓".green());
    Ok(())
}

fn print_settings(config: &GlacierConfig) {
    let token = |t: &Option<String>| if t.is_some() { "set".green() } else { "unset".dimmed() };
    println!("{}", "Glacier settings".bold());
    println!("  {:<22}{}", "DATA_FOLDER", config.store.data_folder.display());
    println!("  {:<22}{}%", "DISK_USAGE_ALLOWED", config.store.disk_usage_allowed);
    println!("  {:<22}{}", "EXTEND_LIFE_SUPPORT", config.store.extend_life_support);
    println!("  {:<22}{}", "CODEC", config.store.codec);
    println!("  {:<22}{}", "BIND", config.server.bind_addr);
    println!("  {:<22}{}", "READ_TOKEN", token(&config.server.read_token));
    println!("  {:<22}{}", "WRITE_TOKEN", token(&config.server.write_token));
}

fn cmd_put(config: GlacierConfig, args: PutArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = ContainerStore::new(&open_store(config, &args.store));
    let data = match args.input.as_deref() {
        None => read_stdin()?,
        Some(path) if path == Path::new("-") => read_stdin()?,
        Some(path) => fs::read(path).with_context(|| format!("reading {}", path.display()))?,
    };
    let id = args.id.unwrap_or_else(generate_identifier);
    let receipt = store.append(&id, &data)?;

    match format {
        OutputFormat::Json => print_json(&receipt)?,
        OutputFormat::Text => {
            println!("{} Stored {}", "✓".green().bold(), receipt.id.yellow());
            println!("  Container: {}", receipt.container.display());
            println!("  Type: {}", receipt.content_type.cyan());
            if receipt.compressed {
                println!(
                    "  Size: {} -> {} bytes ({})",
                    receipt.original_size,
                    receipt.stored_size,
                    "compressed".green()
                );
            } else {
                println!("  Size: {} bytes", receipt.stored_size);
            }
        }
    }
    Ok(())
}

fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    io::stdin().lock().read_to_end(&mut data).context("reading stdin")?;
    Ok(data)
}

fn cmd_get(config: GlacierConfig, args: GetArgs) -> anyhow::Result<()> {
    let store = ContainerStore::new(&open_store(config, &args.store));
    match &args.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
            let meta = store.read_to(&args.id, &mut out)?;
            out.flush()?;
            eprintln!(
                "{} Wrote {} to {}",
                "✓".green(),
                meta.name.yellow(),
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            store.read_to(&args.id, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_uuid(config: GlacierConfig, args: UuidArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = ContainerStore::new(&open_store(config, &args.store));
    let mut generated = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        let resolved = store.resolve(&generate_identifier())?;
        let container = store.container_path(&resolved);
        generated.push((resolved.normalized, container));
    }
    match format {
        OutputFormat::Json => {
            let items: Vec<_> = generated
                .iter()
                .map(|(id, container)| json!({ "Uuid": id, "ContainerFile": container }))
                .collect();
            print_json(&items)?;
        }
        OutputFormat::Text => {
            for (id, container) in &generated {
                println!("{}  {}", id.yellow(), container.display().to_string().dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_resolve(config: GlacierConfig, args: ResolveArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = ContainerStore::new(&open_store(config, &args.store));
    let resolved = store.resolve(&args.id)?;
    let container = store.container_path(&resolved);
    match format {
        OutputFormat::Json => print_json(&json!({
            "id": resolved.normalized,
            "scheme": resolved.scheme.to_string(),
            "bucket": resolved.bucket,
            "extended_months": resolved.extended_months,
            "container": container,
        }))?,
        OutputFormat::Text => {
            println!("Identifier {}", resolved.normalized.yellow().bold());
            println!("  Scheme: {}", resolved.scheme.to_string().cyan());
            println!("  Bucket: {}", resolved.bucket);
            if let Some(months) = resolved.extended_months {
                println!("  Retention extended by {} months", months.to_string().green());
            }
            println!("  Container: {}", container.display());
            if !container.exists() {
                println!("  {}", "(container does not exist yet)".dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_inspect(config: GlacierConfig, args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = ContainerStore::new(&open_store(config, &args.store));
    let entries = store.list(&args.container)?;
    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            println!("{} ({} entries)", args.container.display().to_string().bold(), entries.len());
            for entry in &entries {
                let ratio = entry
                    .ratio()
                    .map(|r| format!("{:.0}%", r * 100.0))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "  {}  {:>10}  {:>5}  {}",
                    entry.name.yellow(),
                    entry.stored_size,
                    ratio,
                    entry.content_type.as_deref().unwrap_or("-").dimmed()
                );
            }
        }
    }
    Ok(())
}

fn cmd_evict(config: GlacierConfig, args: EvictArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let interval = config.eviction.interval();
    let store_config = open_store(config, &args.store);
    let store = ContainerStore::new(&store_config);
    let cycle = EvictionLoop::for_store(&store, store_config.disk_usage_allowed, Arc::new(FsDiskProbe));

    if args.once {
        let report = cycle.run_once()?;
        return print_report(&report, store_config.disk_usage_allowed, format);
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(async {
        let task = Arc::new(cycle).spawn(interval);
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        task.stop().await;
        anyhow::Ok(())
    })?;
    println!("{} Eviction stopped.", "✓".green());
    Ok(())
}

fn print_report(report: &PassReport, threshold: u8, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Text if !report.triggered() => {
            println!(
                "{} Disk usage {:.1}% is within the {}% threshold; nothing to evict.",
                "✓".green(),
                report.initial_used_percent,
                threshold
            );
        }
        OutputFormat::Text => {
            println!(
                "Evicted {} containers ({} bytes); usage {:.1}% -> {:.1}%",
                report.deleted.len().to_string().bold(),
                report.bytes_freed,
                report.initial_used_percent,
                report.final_used_percent
            );
            for path in &report.deleted {
                println!("  {} {}", "deleted:".red(), path.display());
            }
            for path in &report.lock_skips {
                println!("  {} {}", "busy:".yellow(), path.display());
            }
            for error in &report.errors {
                println!("  {} {}", "error:".red().bold(), error);
            }
        }
    }
    Ok(())
}

fn cmd_status(config: GlacierConfig, args: StatusArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store_config = open_store(config, &args.store);
    let store = ContainerStore::new(&store_config);
    let root: PathBuf = store.root().to_path_buf();
    let monitor = DiskMonitor::new(&root, Arc::new(FsDiskProbe), store.metrics());
    let disk = monitor
        .sample()
        .with_context(|| format!("inspecting {}", root.display()))?;
    let window = RetentionObserver::new(&root, store.metrics()).current_retention_window()?;
    let threshold = store_config.disk_usage_allowed;

    match format {
        OutputFormat::Json => print_json(&json!({
            "data_folder": root,
            "disk": disk,
            "disk_usage_allowed": threshold,
            "over_threshold": disk.exceeds(threshold),
            "retention": window,
        }))?,
        OutputFormat::Text => {
            println!("Data folder: {}", root.display().to_string().bold());
            let used = format!("{:.1}%", disk.used_percent);
            let used = if disk.exceeds(threshold) { used.red() } else { used.green() };
            println!("  Disk used: {} (threshold {}%)", used, threshold);
            println!("  Free: {} bytes", disk.free);
            match window {
                Some(window) => println!(
                    "  Retention: {:.1} hours (oldest {})",
                    window.hours,
                    window.oldest.display()
                ),
                None => println!("  Retention: {}", "no containers".dimmed()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const ID: &str = "20240315-1000-4abc-8def-0123456789ab";

    fn store_args(root: &Path) -> StoreArgs {
        StoreArgs {
            data_folder: Some(root.to_path_buf()),
            ..StoreArgs::default()
        }
    }

    #[test]
    fn flags() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn store_overrides() {
        let args = StoreArgs {
            data_folder: Some("/data".into()),
            disk_usage_allowed: Some("banana".into()),
            extend_life_support: Some("true".into()),
            codec: Some(glacier_store::CompressionCodec::Zstd),
        };
        let mut base = StoreConfig::default();
        base.disk_usage_allowed = 60;
        let config = apply_store_args(base, &args);
        assert_eq!(config.data_folder, PathBuf::from("/data"));
        assert_eq!(config.disk_usage_allowed, 75);
        assert!(config.extend_life_support);
        assert_eq!(config.codec, glacier_store::CompressionCodec::Zstd);

        let untouched = apply_store_args(StoreConfig::default(), &StoreArgs::default());
        assert_eq!(untouched, StoreConfig::default());
    }

    #[test]
    fn put_get_and_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "hello glacier").unwrap();
        let root = dir.path().join("files");

        cmd_put(
            GlacierConfig::default(),
            PutArgs {
                store: store_args(&root),
                id: Some(ID.into()),
                input: Some(input),
            },
            &OutputFormat::Text,
        )
        .unwrap();
        assert!(root.join("2024/03/15/10/ab.tar").is_file());

        let output = dir.path().join("out.txt");
        cmd_get(
            GlacierConfig::default(),
            GetArgs {
                store: store_args(&root),
                id: ID.into(),
                output: Some(output.clone()),
            },
        )
        .unwrap();
        assert_eq!(fs::read(&output).unwrap(), b"hello glacier");

        cmd_inspect(
            GlacierConfig::default(),
            InspectArgs {
                store: store_args(&root),
                container: "2024/03/15/10/ab.tar".into(),
            },
            &OutputFormat::Json,
        )
        .unwrap();
    }

    #[test]
    fn get_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_get(
            GlacierConfig::default(),
            GetArgs {
                store: store_args(dir.path()),
                id: ID.into(),
                output: Some(dir.path().join("out")),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    #[test]
    fn resolve_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let result = cmd_resolve(
            GlacierConfig::default(),
            ResolveArgs {
                store: store_args(dir.path()),
                id: "garbage".into(),
            },
            &OutputFormat::Text,
        );
        assert!(result.is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glacier.toml");
        fs::write(&path, "[store]\ndisk_usage_allowed = 90\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.store.disk_usage_allowed, 90);
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn status_runs_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "glacier",
            "--format",
            "json",
            "status",
            "--data-folder",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        run_command(cli).unwrap();
    }
}
