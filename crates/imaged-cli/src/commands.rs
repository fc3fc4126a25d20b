use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use imaged_image::ImageMeta;
use imaged_protocol::EntryInfo;
use imaged_server::dispatch::entry_info;
use imaged_server::{ImagedServer, ServerConfig, TlsConfig};
use imaged_store::Store;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli { command, root, format, .. } = cli;
    match command {
        Command::Serve(args) => cmd_serve(root, args),
        command => {
            let root = root.unwrap_or_else(|| PathBuf::from("."));
            let store = Store::open(&root).with_context(|| format!("opening store at {}", root.display()))?;
            run_store_command(&store, command, format)
        }
    }
}

fn run_store_command(store: &Store, command: Command, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Command::List => cmd_list(store, format),
        Command::Get(args) => cmd_get(store, &args.key, format),
        Command::Set(args) => cmd_set(store, args),
        Command::Remove(args) => {
            store.remove(&args.key)?;
            println!("{} Removed {}", "✓".green(), args.key.yellow());
            Ok(())
        }
        Command::Import(args) => cmd_import(store, args),
        Command::Export(args) => cmd_export(store, args),
        Command::ResetLocks => {
            let removed = store.reset_locks()?;
            println!("{} Removed {} stale lock file(s)", "✓".green(), removed.to_string().bold());
            Ok(())
        }
        Command::Destroy => {
            store.destroy()?;
            println!("{} Destroyed store at {}", "✓".green().bold(), store.root().display());
            Ok(())
        }
        Command::Serve(_) => anyhow::bail!("serve does not run against an open store"),
    }
}

fn cmd_list(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let mut entries: Vec<EntryInfo> = Vec::new();
    let mut it = store.iter()?;
    while it.next() {
        if let (Some((key, _)), Some(meta)) = (it.current(), it.current_meta()) {
            entries.push(entry_info(key, meta));
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text if entries.is_empty() => println!("No entries."),
        OutputFormat::Text => {
            for e in &entries {
                println!("{}  {}x{} {} {}", e.key.yellow(), e.width, e.height, e.color, e.ty.cyan());
            }
        }
    }
    Ok(())
}

fn cmd_get(store: &Store, key: &str, format: OutputFormat) -> anyhow::Result<()> {
    let handle = store.get(key, false)?;
    let meta = handle.meta();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry_info(key, meta))?),
        OutputFormat::Text => {
            println!("{}", key.yellow().bold());
            println!("  Size:     {}x{}", meta.width, meta.height);
            println!("  Color:    {} ({} channels)", meta.color, meta.channels);
            println!("  Type:     {}", meta.ty.name().cyan());
            println!("  Bytes:    {}", meta.num_bytes());
        }
    }
    Ok(())
}

fn cmd_set(store: &Store, args: SetArgs) -> anyhow::Result<()> {
    let meta = ImageMeta::with_color(args.width, args.height, args.color, args.ty);
    store.create(&args.key, meta, None)?.release()?;
    println!("{} Created {} ({})", "✓".green().bold(), args.key.yellow(), meta);
    Ok(())
}

fn cmd_import(store: &Store, args: ImportArgs) -> anyhow::Result<()> {
    let meta = store
        .import(&args.key, &args.path, args.color, args.ty)
        .with_context(|| format!("importing {}", args.path.display()))?;
    println!("{} Imported {} as {} ({})", "✓".green().bold(), args.path.display(), args.key.yellow(), meta);
    Ok(())
}

fn cmd_export(store: &Store, args: ExportArgs) -> anyhow::Result<()> {
    store
        .get(&args.key, false)?
        .export(&args.path)
        .with_context(|| format!("exporting {}", args.key))?;
    println!("{} Exported {} to {}", "✓".green().bold(), args.key.yellow(), args.path.display());
    Ok(())
}

/// Merge the config file, if any, with command-line overrides.
pub fn serve_config(root: Option<PathBuf>, args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = root {
        config.root = root;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let (Some(cert_path), Some(key_path)) = (&args.cert, &args.key) {
        config.tls = Some(TlsConfig { cert_path: cert_path.clone(), key_path: key_path.clone() });
    }
    if args.gen {
        config.tls = None;
        config.generate_self_signed = true;
    }
    Ok(config)
}

fn cmd_serve(root: Option<PathBuf>, args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(root, &args)?;
    let scheme = if config.uses_tls() { "https" } else { "http" };
    println!(
        "imaged serving {} on {}://{}",
        config.root.display().to_string().bold(),
        scheme,
        config.bind_addr
    );
    let server = ImagedServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}
