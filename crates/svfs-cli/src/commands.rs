//! Subcommands. Each mounts the configured volumes, does its work through the
//! dispatcher, and unmounts everything again.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use futures::TryStreamExt;
use svfs_core::{
    ProviderRegistry, VfsConfig, VfsEvent, VirtualFileSystem, VirtualPath,
};

pub async fn run(command: &str, args: &[String], config: VfsConfig) -> Result<ExitCode> {
    let vfs = VirtualFileSystem::new();
    let registry = ProviderRegistry::with_defaults();
    vfs.mount_all(&registry, &config)
        .await
        .context("Failed to mount configured volumes")?;

    let result = match command {
        "mounts" => mounts(&vfs, args),
        "ls" => ls(&vfs, uri_arg(args)?).await,
        "tree" => tree(&vfs, uri_arg(args)?).await,
        "cat" => cat(&vfs, uri_arg(args)?).await,
        "watch" => watch(&vfs).await,
        other => bail!("unknown command: {other}"),
    };

    vfs.unmount_all();
    result.map(|()| ExitCode::SUCCESS)
}

fn uri_arg(args: &[String]) -> Result<VirtualPath> {
    let uri = args.first().context("missing <uri> argument")?;
    VirtualPath::parse(uri).with_context(|| format!("Invalid uri: {uri}"))
}

/// Interpret `path` as a directory if that is what it names.
async fn as_listing_target(vfs: &VirtualFileSystem, path: VirtualPath) -> Result<VirtualPath> {
    if path.is_directory() {
        return Ok(path);
    }
    let meta = vfs
        .metadata(&path)
        .await
        .with_context(|| format!("Cannot stat {path}"))?;
    if meta.is_dir() {
        Ok(path.to_directory())
    } else {
        bail!("{path} is not a directory")
    }
}

fn mounts(vfs: &VirtualFileSystem, args: &[String]) -> Result<()> {
    let records = vfs.mount_records();

    if args.iter().any(|arg| arg == "--json") {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("(no volumes configured)");
        return Ok(());
    }

    for record in records {
        let access = vfs
            .get_volume(&record.scheme)
            .map(|volume| volume.access().to_string())
            .unwrap_or_default();
        println!(
            "{:<12} {:<10} {:<24} {}",
            format!("{}://", record.scheme),
            record.provider,
            access,
            record.root
        );
    }
    Ok(())
}

async fn ls(vfs: &VirtualFileSystem, path: VirtualPath) -> Result<()> {
    let dir = as_listing_target(vfs, path).await?;
    let entries = vfs
        .entries(&dir)
        .await
        .with_context(|| format!("Cannot list {dir}"))?;

    for entry in entries {
        if entry.is_directory() {
            println!("{:>10}  {}/", "-", entry.name());
        } else {
            let size = entry.metadata().await.map(|meta| meta.size).unwrap_or(0);
            println!("{size:>10}  {}", entry.name());
        }
    }
    Ok(())
}

async fn tree(vfs: &VirtualFileSystem, path: VirtualPath) -> Result<()> {
    let dir = as_listing_target(vfs, path).await?;
    let base = dir.segments().count();
    println!("{dir}");

    let mut stream = vfs.entries_recursive(&dir)?;
    while let Some(entry) = stream.try_next().await? {
        let depth = entry.path().segments().count() - base;
        let suffix = if entry.is_directory() { "/" } else { "" };
        println!("{}{}{suffix}", "  ".repeat(depth), entry.name());
    }
    Ok(())
}

async fn cat(vfs: &VirtualFileSystem, path: VirtualPath) -> Result<()> {
    let data = vfs
        .read_bytes(&path)
        .await
        .with_context(|| format!("Cannot read {path}"))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

async fn watch(vfs: &VirtualFileSystem) -> Result<()> {
    let watched: Vec<String> = vfs
        .volumes()
        .iter()
        .filter(|volume| volume.has_access(svfs_core::VolumeAccess::WATCH))
        .map(|volume| format!("{}://", volume.scheme()))
        .collect();
    if watched.is_empty() {
        bail!("no mounted volume supports watching");
    }

    let (_subscription, mut rx) = vfs.channel();
    eprintln!("Watching {} (press Ctrl+C to stop)", watched.join(", "));

    while let Some(event) = rx.recv().await {
        match event {
            VfsEvent::Changed(change) => println!("{change}  [{}]", change.entry),
            VfsEvent::VolumeMounted { scheme, .. } => println!("mounted {scheme}://"),
            VfsEvent::VolumeUnmounted { scheme, .. } => println!("unmounted {scheme}://"),
        }
    }
    Ok(())
}
