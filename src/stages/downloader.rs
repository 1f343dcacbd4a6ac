use super::{Context, Stage, StageOutput};
use crate::definition::PatchDefinition;
use crate::fetch::FetchError;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Attempts per URL before the download counts as failed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fetches remote sources into the download cache and points the
/// definition's path at the cached file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloaderStage;

impl DownloaderStage {
    fn download(&self, url: &str, ctx: &Context<'_>) -> Result<PathBuf, FetchError> {
        if ctx.config.secure_http && url.starts_with("http://") {
            return Err(FetchError::Insecure {
                url: url.to_string(),
            });
        }
        if let Some(path) = ctx.cache.get(url) {
            debug!(url, path = %path.display(), "download cache hit");
            return Ok(path);
        }

        let mut attempt = 1;
        let contents = loop {
            match ctx.fetcher.fetch(url) {
                Ok(contents) => break contents,
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!(url, attempt, error = %err, "download failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let path = ctx.cache.store(url, &contents)?;
        info!(url, bytes = contents.len(), "downloaded patch");
        Ok(path)
    }
}

impl Stage for DownloaderStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for mut definition in patches {
            if !definition.is_remote() {
                output.keep(definition);
                continue;
            }
            match self.download(&definition.source, ctx) {
                Ok(path) => {
                    definition.path = Some(path);
                    output.keep(definition);
                }
                Err(err) => output.fail(definition, err.to_string()),
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DownloadCache;
    use crate::config::EffectiveConfig;
    use crate::fetch::Fetcher;
    use crate::package::{Package, Platform, VendorLayout};
    use crate::stages::testing::{def, Fixture};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a transport error until `failures` calls have been made.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Fetcher for Flaky {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            Ok(b"--- a/x\n+++ b/x\n".to_vec())
        }
    }

    /// Answers every request with HTTP 404.
    struct NotFound {
        calls: AtomicU32,
    }

    impl Fetcher for NotFound {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn run(fetcher: &dyn Fetcher, patches: Vec<PatchDefinition>) -> (StageOutput, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = Package::new("acme/app", "1.0.0");
        let layout = VendorLayout::new(dir.path(), "vendor", "acme/app");
        let platform = Platform::default();
        let config = EffectiveConfig::defaults();
        let cache = DownloadCache::new(dir.path().join("cache"));
        let ctx = Context::new(&root, &[], &layout, fetcher, &platform, &config, &cache);
        (DownloaderStage.process(patches, &ctx), dir)
    }

    #[test]
    fn test_retries_transient_errors() {
        let fetcher = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let (output, _dir) = run(&fetcher, vec![def("https://x/a.patch", &["acme/lib"], "acme/app")]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(output.patches.len(), 1);
        assert!(output.patches[0].path.as_ref().unwrap().is_file());
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let fetcher = Flaky {
            failures: MAX_ATTEMPTS,
            calls: AtomicU32::new(0),
        };
        let (output, _dir) = run(&fetcher, vec![def("https://x/a.patch", &["acme/lib"], "acme/app")]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert!(output.patches.is_empty());
        assert_eq!(output.failures.len(), 1);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let fetcher = NotFound {
            calls: AtomicU32::new(0),
        };
        let (output, _dir) = run(&fetcher, vec![def("https://x/a.patch", &["acme/lib"], "acme/app")]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.failures.len(), 1);
        assert!(output.failures[0].1.contains("404"));
    }

    #[test]
    fn test_secure_http_refuses_plain_http() {
        let fetcher = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let (output, _dir) = run(
            &fetcher,
            vec![
                def("http://x/a.patch", &["acme/lib"], "acme/app"),
                def("patches/local.patch", &["acme/lib"], "acme/app"),
            ],
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(output.patches.len(), 1);
        assert!(output.failures[0].1.contains("insecure"));
    }

    #[test]
    fn test_cache_hit_skips_fetch() {
        let fixture = Fixture::new(Vec::new());
        fixture.cache.store("file:///nowhere/a.patch", b"cached").unwrap();
        let output = DownloaderStage.process(
            vec![def("file:///nowhere/a.patch", &["acme/lib"], "acme/app")],
            &fixture.context(),
        );
        assert_eq!(output.patches.len(), 1);
        assert_eq!(
            std::fs::read(output.patches[0].path.as_ref().unwrap()).unwrap(),
            b"cached"
        );
    }
}
