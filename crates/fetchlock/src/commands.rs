use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use console::style;
use fetchlock_fetch::{CacheToken, ClientConfig, Fetcher, ProgressFn, ReqwestClient};
use fetchlock_fs::FileMode;
use fetchlock_lock::{Context, DownloadOptions, ExistingFilePolicy, NewResource, ops};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::{
    AddArg, App, Commands, DEFAULT_LOCK_FILE, DeleteArg, DownloadArg, Selection, UpdateArg, VerifyArg,
};
use crate::ui::progress::StatusBar;
use crate::ui::table;

pub async fn run(app: App) -> Result<ExitCode> {
    let runner = Runner::new(&app)?;
    match app.cmd {
        Commands::Add(arg) => runner.add(arg).await,
        Commands::Download(arg) => runner.download(arg).await,
        Commands::Delete(arg) => runner.delete(arg).await,
        Commands::Update(arg) => runner.update(arg).await,
        Commands::Verify(arg) => runner.verify(arg).await,
        Commands::List => runner.list(),
        Commands::Version => {
            println!("fetchlock {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

struct Runner {
    lock_path: PathBuf,
    client:    ClientConfig,
}

impl Runner {
    fn new(app: &App) -> Result<Self> {
        let lock_path = match &app.lock_file {
            Some(path) => path.clone(),
            None => std::env::current_dir()
                .context("cannot determine the current directory")?
                .join(DEFAULT_LOCK_FILE),
        };

        let mut client = ClientConfig::default();
        if let Some(secs) = app.timeout {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = app.connect_timeout {
            client = client.with_connect_timeout(Duration::from_secs(secs));
        }
        for proxy in &app.proxies {
            client = client.with_proxy(proxy.clone());
        }

        debug!(lock_file = %lock_path.display(), "resolved lock file");
        Ok(Self { lock_path, client })
    }

    fn context(&self, on_bytes: Option<ProgressFn>) -> Result<Arc<Context<ReqwestClient>>> {
        let mut fetcher = Fetcher::new(self.client.clone().build()?);
        if let Some(callback) = on_bytes {
            fetcher = fetcher.with_progress(callback);
        }
        Ok(Arc::new(Context::new(fetcher, CacheToken::from_env())))
    }

    async fn add(&self, arg: AddArg) -> Result<ExitCode> {
        let mut new = NewResource::new(arg.urls)
            .with_algorithm(arg.algo)
            .with_tags(arg.tags)
            .dynamic(arg.dynamic);
        if let Some(filename) = arg.filename {
            new = new.with_filename(filename);
        }
        if let Some(cache_url) = arg.cache_url {
            new = new.with_cache_uri(cache_url);
        }

        let integrity = ops::add(self.context(None)?, &self.lock_path, new).await?;
        println!("{} locked {}", style("✓").green(), integrity);
        Ok(ExitCode::SUCCESS)
    }

    async fn download(&self, arg: DownloadArg) -> Result<ExitCode> {
        FileMode::parse_optional(&arg.perm)?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling downloads");
                on_interrupt.cancel();
            }
        });

        let mut options = DownloadOptions::default()
            .with_required_tags(arg.selection.tags)
            .with_excluded_tags(arg.selection.notags)
            .with_cancel(cancel);
        if arg.replace_corrupt {
            options = options.with_existing(ExistingFilePolicy::Replace);
        }
        if let Some(jobs) = arg.jobs {
            options = options.with_max_concurrent(jobs);
        }

        let bar = if arg.status { Some(self.status_bar(&options).await?) } else { None };
        let ctx = self.context(bar.as_ref().map(StatusBar::on_bytes))?;
        if let Some(bar) = &bar {
            options = options.with_observer(bar.observer());
        }

        let result = ops::download(ctx, &self.lock_path, &arg.dir, &arg.perm, options).await;
        if let Some(bar) = &bar {
            bar.finish();
        }

        let report = result?;
        println!(
            "{} {} resource(s) in {}",
            style("✓").green(),
            report.placements.len(),
            arg.dir.display()
        );
        Ok(ExitCode::SUCCESS)
    }

    /// Sizes come from HEAD requests; unknown sizes only make the bar less precise.
    async fn status_bar(&self, options: &DownloadOptions) -> Result<StatusBar> {
        let ctx = self.context(None)?;
        let mut sizes = HashMap::new();
        for resource in ops::list(ctx.clone(), &self.lock_path)? {
            if !resource.matches(&options.required_tags, &options.excluded_tags) {
                continue;
            }
            match ctx.fetcher().content_length(resource.id()).await {
                Ok(Some(len)) => {
                    sizes.insert(resource.id().to_string(), len);
                }
                Ok(None) => {}
                Err(err) => debug!(url = resource.id(), %err, "size unknown"),
            }
        }
        Ok(StatusBar::new(sizes))
    }

    async fn delete(&self, arg: DeleteArg) -> Result<ExitCode> {
        let removed = ops::delete(self.context(None)?, &self.lock_path, &arg.urls).await?;
        println!("{} removed {removed} resource(s)", style("✓").green());
        Ok(ExitCode::SUCCESS)
    }

    async fn update(&self, arg: UpdateArg) -> Result<ExitCode> {
        ops::update(self.context(None)?, &self.lock_path, &arg.url).await?;
        println!("{} updated {}", style("✓").green(), arg.url);
        Ok(ExitCode::SUCCESS)
    }

    async fn verify(&self, arg: VerifyArg) -> Result<ExitCode> {
        let Selection { tags, notags } = arg.selection;
        let report = ops::verify(self.context(None)?, &self.lock_path, &arg.dir, &tags, &notags).await?;
        println!("{}", table::checks(&report.checks));

        if report.is_clean() {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    }

    fn list(&self) -> Result<ExitCode> {
        let resources = ops::list(self.context(None)?, &self.lock_path)?;
        if resources.is_empty() {
            println!("no resources in {}", self.lock_path.display());
        } else {
            println!("{}", table::resources(&resources));
        }
        Ok(ExitCode::SUCCESS)
    }
}
