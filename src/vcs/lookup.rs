//! Maps Go import paths to repositories.
//!
//! Well-known hosting sites are recognised from the shape of the path alone.
//! Anything else is looked up through the `<meta name="go-import">` tag served
//! at `https://<import path>?go-get=1`, if remote lookups are enabled.

use std::{sync::OnceLock, time::Duration};

use log::{debug, trace};
use regex_lite::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("unrecognized import path {0:?}")]
    UnknownHost(String),
    #[error("invalid {host} import path {import_path:?}")]
    InvalidPath { host: String, import_path: String },
    #[error("no go-import meta tag for {0:?}")]
    NoMetaTag(String),
    #[error("{import_path:?} matches more than one go-import meta tag")]
    AmbiguousMetaTag { import_path: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// What the hosting conventions say about an import path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    pub root: String,
    /// `None` when the host serves more than one VCS and the path does not tell
    /// which one; the repository has to be probed.
    pub vcs: Option<String>,
    pub repo: String,
}

pub trait ImportPathLookup: Send + Sync {
    /// Uses only the static hosting table, never the network.
    fn lookup_static(&self, import_path: &str) -> Result<RepoMetadata, LookupError>;

    fn lookup(&self, import_path: &str) -> Result<RepoMetadata, LookupError>;
}

struct HostRule {
    prefix: &'static str,
    pattern: Regex,
    vcs: Option<&'static str>,
}

const ELEMENT: &str = r"[A-Za-z0-9_.\-]+";

fn host_rules() -> &'static [HostRule] {
    static RULES: OnceLock<Vec<HostRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |prefix, pattern: String, vcs| HostRule {
            prefix,
            pattern: Regex::new(&pattern).unwrap(),
            vcs,
        };
        let tail = format!("(/{ELEMENT})*$");
        vec![
            rule(
                "github.com/",
                format!(r"^(?P<root>github\.com/{ELEMENT}/{ELEMENT}){tail}"),
                Some("git"),
            ),
            rule(
                "bitbucket.org/",
                format!(r"^(?P<root>bitbucket\.org/{ELEMENT}/{ELEMENT}){tail}"),
                None,
            ),
            rule(
                "launchpad.net/",
                format!(r"^(?P<root>launchpad\.net/{ELEMENT}){tail}"),
                Some("bzr"),
            ),
            rule(
                "hub.jazz.net/",
                format!(r"^(?P<root>hub\.jazz\.net/git/[a-z0-9]+/{ELEMENT}){tail}"),
                Some("git"),
            ),
            rule(
                "git.apache.org/",
                format!(r"^(?P<root>git\.apache\.org/[a-z0-9_.\-]+\.git){tail}"),
                Some("git"),
            ),
            rule(
                "code.google.com/",
                format!(r"^(?P<root>code\.google\.com/p/[a-z0-9\-]+(\.[a-z0-9\-]+)?){tail}"),
                None,
            ),
            rule(
                "gopkg.in/",
                format!(r"^(?P<root>gopkg\.in/([A-Za-z0-9_\-]+/)?[A-Za-z0-9_.\-]+\.v[0-9]+){tail}"),
                Some("git"),
            ),
            rule(
                "",
                format!(
                    r"^(?P<root>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?/[A-Za-z0-9_.\-/]*?\.(?P<vcs>bzr|git|hg|svn)){tail}"
                ),
                None,
            ),
        ]
    })
}

/// Resolves import paths through the static hosting table and, optionally, the
/// `go-get=1` discovery protocol.
pub struct HostingLookup {
    client: Option<reqwest::blocking::Client>,
}

impl HostingLookup {
    pub fn offline() -> Self {
        HostingLookup { client: None }
    }

    pub fn with_remote() -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(HostingLookup {
            client: Some(client),
        })
    }

    fn lookup_remote(
        &self,
        client: &reqwest::blocking::Client,
        import_path: &str,
    ) -> Result<RepoMetadata, LookupError> {
        let url = format!("https://{import_path}?go-get=1");
        debug!("Fetching {url}");
        let body = client.get(&url).send()?.error_for_status()?.text()?;
        select_meta_import(&parse_meta_imports(&body), import_path)
    }
}

impl ImportPathLookup for HostingLookup {
    fn lookup_static(&self, import_path: &str) -> Result<RepoMetadata, LookupError> {
        for rule in host_rules() {
            if !import_path.starts_with(rule.prefix) {
                continue;
            }
            let Some(captures) = rule.pattern.captures(import_path) else {
                if rule.prefix.is_empty() {
                    continue;
                }
                return Err(LookupError::InvalidPath {
                    host: rule.prefix.trim_end_matches('/').to_owned(),
                    import_path: import_path.to_owned(),
                });
            };
            let root = captures["root"].to_owned();
            let vcs = rule
                .vcs
                .map(str::to_owned)
                .or_else(|| captures.name("vcs").map(|m| m.as_str().to_owned()));
            trace!("{import_path} matched static rule {:?}: {root}", rule.prefix);
            return Ok(RepoMetadata {
                repo: format!("https://{root}"),
                root,
                vcs,
            });
        }
        Err(LookupError::UnknownHost(import_path.to_owned()))
    }

    fn lookup(&self, import_path: &str) -> Result<RepoMetadata, LookupError> {
        match (self.lookup_static(import_path), &self.client) {
            (Err(LookupError::UnknownHost(_)), Some(client)) => {
                self.lookup_remote(client, import_path)
            }
            (result, _) => result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MetaImport {
    prefix: String,
    vcs: String,
    repo: String,
}

fn parse_meta_imports(html: &str) -> Vec<MetaImport> {
    static META: OnceLock<Regex> = OnceLock::new();
    static ATTR: OnceLock<Regex> = OnceLock::new();
    let meta = META.get_or_init(|| Regex::new(r"(?is)<meta\s+([^>]*)>").unwrap());
    let attr = ATTR.get_or_init(|| {
        Regex::new(r#"(?i)([a-z\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    });

    let mut imports = Vec::new();
    for tag in meta.captures_iter(html) {
        let mut name = None;
        let mut content = None;
        for a in attr.captures_iter(&tag[1]) {
            let value = a.get(2).or_else(|| a.get(3)).map(|m| m.as_str());
            match a[1].to_ascii_lowercase().as_str() {
                "name" => name = value,
                "content" => content = value,
                _ => {}
            }
        }
        if name != Some("go-import") {
            continue;
        }
        let fields: Vec<&str> = content.unwrap_or_default().split_whitespace().collect();
        if let [prefix, vcs, repo] = fields.as_slice() {
            imports.push(MetaImport {
                prefix: prefix.to_string(),
                vcs: vcs.to_string(),
                repo: repo.to_string(),
            });
        }
    }
    imports
}

fn select_meta_import(
    imports: &[MetaImport],
    import_path: &str,
) -> Result<RepoMetadata, LookupError> {
    let mut matching = imports.iter().filter(|meta| {
        import_path == meta.prefix
            || import_path
                .strip_prefix(meta.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    });
    match (matching.next(), matching.next()) {
        (Some(meta), None) => Ok(RepoMetadata {
            root: meta.prefix.clone(),
            vcs: Some(meta.vcs.clone()),
            repo: meta.repo.clone(),
        }),
        (Some(_), Some(_)) => Err(LookupError::AmbiguousMetaTag {
            import_path: import_path.to_owned(),
        }),
        (None, _) => Err(LookupError::NoMetaTag(import_path.to_owned())),
    }
}
