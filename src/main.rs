use anyhow::{Context, Result};
use clap::Parser;
use html2rss::config::Config;
use html2rss::feed::SourceParams;
use html2rss::fetch::{self, FetchError, Source, SourceResult};
use html2rss::intercept::Html2RssProcessor;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "html2rss", version, about = "Turn HTML pages into RSS feeds")]
struct Args {
    /// Page to convert; settings come from --set
    #[arg(value_name = "URL", conflicts_with_all = ["config", "source"])]
    url: Option<String>,

    /// Source setting, e.g. -s item=//article -s "item.title=./h2/text()"
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    settings: Vec<(String, String)>,

    /// TOML file listing sources
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only process the source with this name (with --config)
    #[arg(long, value_name = "NAME", requires = "config")]
    source: Option<String>,

    /// Write each feed to DIR/<name>.xml instead of stdout
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Per-request timeout in seconds (overrides the config file)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{s}`"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

/// SEC-008: Source names become file names; refuse anything that could
/// escape the output directory.
fn feed_file_name(name: &str) -> Result<String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        anyhow::bail!("Source name `{name}` cannot be used as a file name");
    }
    Ok(format!("{name}.xml"))
}

/// Atomically write a file using write-to-temp-then-rename pattern.
/// This ensures a reader never sees a half-written feed.
fn atomic_write(dst: &Path, content: &[u8]) -> Result<()> {
    // SEC-009: Use randomized temp filename to prevent TOCTOU race conditions.
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails atomically if file exists (prevents symlink race)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temporary file '{}'", temp_path.display()))?;

    temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all())
        .with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to write '{}': disk may be full", temp_path.display())
        })?;
    drop(temp_file);

    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to remove existing '{}'", dst.display())
        })?;
    }

    std::fs::rename(&temp_path, dst).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}': check permissions",
            temp_path.display(),
            dst.display()
        )
    })
}

fn emit(name: &str, feed: Vec<u8>, out_dir: Option<&Path>) -> Result<()> {
    match out_dir {
        Some(dir) => {
            let path = dir.join(feed_file_name(name)?);
            atomic_write(&path, &feed)?;
            tracing::info!(source = %name, path = %path.display(), "Wrote feed");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&feed).context("Failed to write feed to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn run_single(
    args: &Args,
    url: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<()> {
    let params: SourceParams = args.settings.iter().cloned().collect();
    let processor = Html2RssProcessor::new(&params).context("Invalid source settings")?;

    let feed = fetch::fetch_source(client, url, &processor, timeout)
        .await
        .with_context(|| format!("Failed to convert {url}"))?;
    emit("feed", feed.into_body(), args.out_dir.as_deref())
}

async fn run_config(
    args: &Args,
    path: &Path,
    client: &reqwest::Client,
    timeout: Duration,
    config: &Config,
) -> Result<()> {
    let mut sources: Vec<Source> = config
        .to_sources()
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if let Some(only) = &args.source {
        sources.retain(|s| &s.name == only);
        if sources.is_empty() {
            anyhow::bail!("No source named `{only}` in {}", path.display());
        }
    }
    if sources.is_empty() {
        anyhow::bail!("No sources configured in {}", path.display());
    }
    if sources.len() > 1 && args.out_dir.is_none() {
        anyhow::bail!("Several sources need --out-dir (or pick one with --source)");
    }
    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let total = sources.len();
    let results = fetch::fetch_all(client, sources, config.concurrency, timeout).await;

    let mut failed: Vec<(String, FetchError)> = Vec::new();
    for SourceResult { name, result } in results {
        match result {
            Ok(feed) => emit(&name, feed.into_body(), args.out_dir.as_deref())?,
            Err(e) => failed.push((name, e)),
        }
    }

    for (name, error) in &failed {
        eprintln!("{name}: {error}");
    }
    if !failed.is_empty() {
        anyhow::bail!("{} of {} sources failed", failed.len(), total);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays a clean feed
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match (&args.url, &args.config) {
        (Some(url), _) => {
            let timeout = args
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(fetch::DEFAULT_TIMEOUT);
            let client = fetch::build_client(timeout)?;
            run_single(&args, url, &client, timeout).await
        }
        (None, Some(path)) => {
            if !args.settings.is_empty() {
                tracing::warn!("--set is ignored with --config");
            }
            let config = Config::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            let timeout = args
                .timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.timeout());
            let client = fetch::build_client(timeout)?;
            run_config(&args, path, &client, timeout, &config).await
        }
        (None, None) => {
            anyhow::bail!("Give a URL to convert or a --config file (see --help)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("item.title=./h2/text()").unwrap(),
            ("item.title".to_owned(), "./h2/text()".to_owned())
        );
        assert_eq!(
            parse_key_value("item=//div[@a='b=c']").unwrap(),
            ("item".to_owned(), "//div[@a='b=c']".to_owned())
        );
        assert_eq!(
            parse_key_value("channel.description=").unwrap(),
            ("channel.description".to_owned(), String::new())
        );
        assert!(parse_key_value("item").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_feed_file_name() {
        assert_eq!(feed_file_name("news").unwrap(), "news.xml");
        for bad in ["", ".", "..", "../etc/passwd", "a\\b", "tab\there"] {
            assert!(feed_file_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.xml");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "html2rss",
            "https://example.com/",
            "-s",
            "item=//li",
            "--set",
            "item.title=./a",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("https://example.com/"));
        assert_eq!(args.settings.len(), 2);

        assert!(Args::try_parse_from(["html2rss", "--source", "x"]).is_err());
        assert!(
            Args::try_parse_from(["html2rss", "https://example.com/", "--config", "f.toml"])
                .is_err()
        );
    }
}
