use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, trace};

use crate::command::CommandRunner;

use super::{guess_vcs, ImportPathLookup, LookupError, RepoRoot, ResolveError, VcsKind};

/// Turns package import paths into repositories.
///
/// Results are memoised for the lifetime of the resolver, keyed by package and
/// URL override, so one install run never resolves (or probes) the same
/// dependency twice.
pub struct Resolver {
    lookup: Box<dyn ImportPathLookup>,
    runner: Arc<dyn CommandRunner>,
    probe_overrides: bool,
    memo: DashMap<(String, String), RepoRoot>,
}

impl Resolver {
    pub fn new(lookup: Box<dyn ImportPathLookup>, runner: Arc<dyn CommandRunner>) -> Self {
        Resolver {
            lookup,
            runner,
            probe_overrides: false,
            memo: DashMap::new(),
        }
    }

    /// Probe override URLs whose backend cannot be guessed instead of
    /// rejecting them.
    pub fn probe_overrides(mut self, probe: bool) -> Self {
        self.probe_overrides = probe;
        self
    }

    pub fn resolve(&self, pkg: &str, url_override: Option<&str>) -> Result<RepoRoot, ResolveError> {
        let key = (pkg.to_owned(), url_override.unwrap_or_default().to_owned());
        if let Some(hit) = self.memo.get(&key) {
            trace!("{pkg} already resolved to {}", hit.root);
            return Ok(hit.clone());
        }

        let repo_root = match url_override {
            Some(url) => self.resolve_override(pkg, url)?,
            None => self.resolve_lookup(pkg)?,
        };
        debug!(
            "Resolved {pkg} to {} ({}) at {}",
            repo_root.root, repo_root.vcs, repo_root.repo_url
        );
        self.memo.insert(key, repo_root.clone());
        Ok(repo_root)
    }

    fn resolve_override(&self, pkg: &str, url: &str) -> Result<RepoRoot, ResolveError> {
        let metadata = self
            .lookup
            .lookup_static(pkg)
            .map_err(|source| lookup_failed(pkg, source))?;
        let vcs = match guess_vcs(url) {
            Some(vcs) => vcs,
            None if self.probe_overrides => self
                .identify_vcs(url)
                .ok_or_else(|| unsupported("", url))?,
            None => return Err(unsupported("", url)),
        };
        Ok(RepoRoot {
            root: metadata.root,
            vcs,
            repo_url: url.to_owned(),
        })
    }

    fn resolve_lookup(&self, pkg: &str) -> Result<RepoRoot, ResolveError> {
        let metadata = self
            .lookup
            .lookup(pkg)
            .map_err(|source| lookup_failed(pkg, source))?;
        let vcs = match &metadata.vcs {
            Some(name) => name
                .parse::<VcsKind>()
                .map_err(|_| unsupported(name, &metadata.repo))?,
            None => self
                .identify_vcs(&metadata.repo)
                .ok_or_else(|| unsupported("", &metadata.repo))?,
        };
        Ok(RepoRoot {
            root: metadata.root,
            vcs,
            repo_url: metadata.repo,
        })
    }

    /// Asks every backend, the guessed one first, whether `url` is one of its
    /// repositories.
    pub fn identify_vcs(&self, url: &str) -> Option<VcsKind> {
        let guessed = guess_vcs(url);
        guessed
            .into_iter()
            .chain(VcsKind::ALL.into_iter().filter(|kind| Some(*kind) != guessed))
            .find(|kind| {
                debug!("Probing {url} with {kind}");
                self.runner.run(&kind.ping(url)).is_ok()
            })
    }
}

fn lookup_failed(pkg: &str, source: LookupError) -> ResolveError {
    ResolveError::LookupFailed {
        import_path: pkg.to_owned(),
        source,
    }
}

fn unsupported(vcs: &str, location: &str) -> ResolveError {
    ResolveError::UnsupportedVcs {
        vcs: vcs.to_owned(),
        location: location.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{command::fake::FakeRunner, vcs::HostingLookup};

    fn resolver(runner: &Arc<FakeRunner>) -> Resolver {
        Resolver::new(Box::new(HostingLookup::offline()), runner.clone())
    }

    #[test]
    fn github_needs_no_probe() {
        let runner = Arc::new(FakeRunner::new());
        let repo_root = resolver(&runner)
            .resolve("github.com/gorilla/mux/sub", None)
            .unwrap();
        assert_eq!(
            repo_root,
            RepoRoot {
                root: "github.com/gorilla/mux".to_owned(),
                vcs: VcsKind::Git,
                repo_url: "https://github.com/gorilla/mux".to_owned(),
            }
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn override_url_decides_backend() {
        let runner = Arc::new(FakeRunner::new());
        let repo_root = resolver(&runner)
            .resolve(
                "github.com/mattn/go-sqlite3",
                Some("git+ssh://git@github.com/mattn/go-sqlite3.git"),
            )
            .unwrap();
        assert_eq!(repo_root.root, "github.com/mattn/go-sqlite3");
        assert_eq!(repo_root.vcs, VcsKind::Git);
        assert_eq!(repo_root.repo_url, "git+ssh://git@github.com/mattn/go-sqlite3.git");
    }

    #[test]
    fn unguessable_override_is_rejected() {
        let runner = Arc::new(FakeRunner::new());
        let result = resolver(&runner).resolve(
            "bitbucket.org/kardianos/osext",
            Some("https://bitbucket.org/kardianos/osext"),
        );
        assert!(matches!(
            result,
            Err(ResolveError::UnsupportedVcs { vcs, location })
                if vcs.is_empty() && location == "https://bitbucket.org/kardianos/osext"
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn unguessable_override_is_probed_when_enabled() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_on("git ls-remote");
        let repo_root = resolver(&runner)
            .probe_overrides(true)
            .resolve(
                "bitbucket.org/kardianos/osext",
                Some("https://bitbucket.org/kardianos/osext"),
            )
            .unwrap();
        assert_eq!(repo_root.vcs, VcsKind::Hg);
    }

    #[test]
    fn override_for_unknown_host_fails_lookup() {
        let runner = Arc::new(FakeRunner::new());
        let result = resolver(&runner).resolve("example.com/foo", Some("git://example.com/foo.git"));
        assert!(matches!(
            result,
            Err(ResolveError::LookupFailed { import_path, .. }) if import_path == "example.com/foo"
        ));
    }

    #[test]
    fn probes_hosts_serving_several_backends() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_on("git ls-remote");
        let repo_root = resolver(&runner)
            .resolve("code.google.com/p/go.tools/go/vcs", None)
            .unwrap();
        assert_eq!(repo_root.root, "code.google.com/p/go.tools");
        assert_eq!(repo_root.vcs, VcsKind::Hg);
        assert_eq!(
            runner.calls(),
            vec![
                "git ls-remote https://code.google.com/p/go.tools",
                "hg identify https://code.google.com/p/go.tools",
            ]
        );
    }

    #[test]
    fn probe_without_answer() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_on("ls-remote");
        runner.fail_on("identify");
        let result = resolver(&runner).resolve("bitbucket.org/a/b", None);
        assert!(matches!(result, Err(ResolveError::UnsupportedVcs { .. })));
    }

    #[test]
    fn guessed_backend_is_probed_first() {
        let runner = Arc::new(FakeRunner::new());
        let vcs = resolver(&runner).identify_vcs("ssh://hg@bitbucket.org/a/b");
        assert_eq!(vcs, Some(VcsKind::Hg));
        assert_eq!(runner.calls(), vec!["hg identify ssh://hg@bitbucket.org/a/b"]);
    }

    #[test]
    fn unsupported_backend_from_lookup() {
        let runner = Arc::new(FakeRunner::new());
        let result = resolver(&runner).resolve("launchpad.net/goyaml", None);
        assert!(matches!(
            result,
            Err(ResolveError::UnsupportedVcs { vcs, .. }) if vcs == "bzr"
        ));
    }

    #[test]
    fn results_are_memoised() {
        let runner = Arc::new(FakeRunner::new());
        let resolver = resolver(&runner);
        let first = resolver.resolve("bitbucket.org/a/b", None).unwrap();
        let second = resolver.resolve("bitbucket.org/a/b", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(runner.count("git ls-remote"), 1);
    }

    #[test]
    fn unknown_host_fails_lookup() {
        let runner = Arc::new(FakeRunner::new());
        assert!(matches!(
            resolver(&runner).resolve("example.com/foo/bar", None),
            Err(ResolveError::LookupFailed { .. })
        ));
    }
}
