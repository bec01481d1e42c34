use std::{
    fmt::{self, Display},
    io::BufRead,
    path::Path,
};

use log::{debug, error};

use super::{LineError, ParseError};

const REVISION_MARKER: char = '#';
const URL_MARKER: char = '!';
const COMMENT_MARKER: &str = "//";

/// One entry of a Goopfile or Goopfile.lock.
///
/// An empty `rev` means "whatever is checked out", an empty `url` means the
/// repository is found through the regular import path lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    pub pkg: String,
    pub rev: String,
    pub url: String,
}

impl Dependency {
    pub fn new(pkg: impl Into<String>) -> Self {
        Dependency {
            pkg: pkg.into(),
            ..Default::default()
        }
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = rev.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn url_override(&self) -> Option<&str> {
        Some(self.url.as_str()).filter(|url| !url.is_empty())
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pkg)?;
        if !self.rev.is_empty() {
            write!(f, " {}{}", REVISION_MARKER, self.rev)?;
        }
        if !self.url.is_empty() {
            write!(f, " {}{}", URL_MARKER, self.url)?;
        }
        Ok(())
    }
}

/// Reads a Goopfile (or a lock file, the grammar is the same) from disk.
pub fn from_file(path: &Path) -> Result<Vec<Dependency>, ParseError> {
    debug!("Reading dependencies from {}", path.display());
    let file = std::fs::File::open(path)?;
    let dependencies = parse(std::io::BufReader::new(file));
    if let Err(err) = &dependencies {
        error!("Could not parse {}: {err}", path.display())
    }
    dependencies
}

pub fn from_str(data: &str) -> Result<Vec<Dependency>, ParseError> {
    parse(data.as_bytes())
}

pub fn parse(reader: impl BufRead) -> Result<Vec<Dependency>, ParseError> {
    let mut dependencies = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        match parse_line(text) {
            Ok(Some(dependency)) => dependencies.push(dependency),
            Ok(None) => {}
            Err(reason) => {
                return Err(ParseError::Line {
                    line: index + 1,
                    text: text.to_owned(),
                    reason,
                })
            }
        }
    }
    Ok(dependencies)
}

fn parse_line(line: &str) -> Result<Option<Dependency>, LineError> {
    let mut tokens = line.split_whitespace();
    let pkg = match tokens.next() {
        None => return Ok(None),
        Some(token) if token.starts_with(COMMENT_MARKER) => return Ok(None),
        Some(token) => token,
    };

    let mut dependency = Dependency::new(pkg);
    for token in tokens {
        if token.starts_with(COMMENT_MARKER) {
            break;
        } else if let Some(rev) = token.strip_prefix(REVISION_MARKER) {
            if !dependency.rev.is_empty() {
                return Err(LineError::MultipleRevisions);
            }
            if rev.is_empty() {
                return Err(LineError::EmptyRevision);
            }
            dependency.rev = rev.to_owned();
        } else if let Some(url) = token.strip_prefix(URL_MARKER) {
            if !dependency.url.is_empty() {
                return Err(LineError::MultipleUrls);
            }
            if url.is_empty() {
                return Err(LineError::EmptyUrl);
            }
            dependency.url = url.to_owned();
        } else {
            return Err(LineError::UnrecognizedToken(token.to_owned()));
        }
    }
    Ok(Some(dependency))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn line_error(data: &str) -> (usize, String, LineError) {
        match from_str(data) {
            Err(ParseError::Line { line, text, reason }) => (line, text, reason),
            other => panic!("expected a line error, got {other:?}"),
        }
    }

    #[test]
    fn empty_file() {
        assert_eq!(from_str("").unwrap(), vec![]);
        assert_eq!(from_str("\n   \n\t\n").unwrap(), vec![]);
    }

    #[test]
    fn single_entry_without_revision() {
        let deps = from_str("\n    github.com/nitrous-io/goop\n").unwrap();
        assert_eq!(deps, vec![Dependency::new("github.com/nitrous-io/goop")]);
    }

    #[test]
    fn single_entry_with_revision() {
        let deps = from_str("github.com/nitrous-io/goop #09f0feb1b103933bd9985f0a85e01eeaad8d75c8")
            .unwrap();
        assert_eq!(
            deps,
            vec![Dependency::new("github.com/nitrous-io/goop")
                .with_rev("09f0feb1b103933bd9985f0a85e01eeaad8d75c8")]
        );
    }

    #[test]
    fn single_entry_with_url() {
        let deps = from_str("github.com/nitrous-io/goop !git@github.com:foo/goop").unwrap();
        assert_eq!(
            deps,
            vec![Dependency::new("github.com/nitrous-io/goop").with_url("git@github.com:foo/goop")]
        );
    }

    #[test]
    fn trailing_comment_is_ignored() {
        let deps = from_str("github.com/nitrous-io/goop // hello #world !again").unwrap();
        assert_eq!(deps, vec![Dependency::new("github.com/nitrous-io/goop")]);
    }

    #[test]
    fn comment_lines_are_skipped() {
        assert_eq!(from_str("//This is a comment.").unwrap(), vec![]);
        assert_eq!(from_str("   // github.com/a/b #rev").unwrap(), vec![]);
    }

    #[test]
    fn multiple_entries() {
        let data = r#"
            // pinned
            github.com/nitrous-io/goop #09f0feb1b103933bd9985f0a85e01eeaad8d75c8

            github.com/gorilla/mux
              github.com/gorilla/context #14f550f51af52180c2eefed15e5fd18d63c0a64a // future versions don't work
            github.com/foo/bar #ffffffffffffffffffffffffffffffffffffffff !git@github.com:baz/bar

            // don't upgrade this to 1.0.4
            github.com/hello/world !git@github.com:bye/world #v1.0.3 // I REPEAT, DON'T!
        "#;
        let deps = from_str(data).unwrap();
        assert_eq!(
            deps,
            vec![
                Dependency::new("github.com/nitrous-io/goop")
                    .with_rev("09f0feb1b103933bd9985f0a85e01eeaad8d75c8"),
                Dependency::new("github.com/gorilla/mux"),
                Dependency::new("github.com/gorilla/context")
                    .with_rev("14f550f51af52180c2eefed15e5fd18d63c0a64a"),
                Dependency::new("github.com/foo/bar")
                    .with_rev("ffffffffffffffffffffffffffffffffffffffff")
                    .with_url("git@github.com:baz/bar"),
                Dependency::new("github.com/hello/world")
                    .with_rev("v1.0.3")
                    .with_url("git@github.com:bye/world"),
            ]
        );
    }

    #[test]
    fn multiple_revisions() {
        let (line, text, reason) = line_error("pkg #rev1 #rev2");
        assert_eq!(line, 1);
        assert_eq!(text, "pkg #rev1 #rev2");
        assert_eq!(reason, LineError::MultipleRevisions);

        let err = from_str("pkg #rev1 #rev2").unwrap_err();
        assert!(err.to_string().contains("multiple revisions"));
    }

    #[test]
    fn multiple_urls() {
        let (_, _, reason) = line_error("pkg !a !b");
        assert_eq!(reason, LineError::MultipleUrls);
    }

    #[test]
    fn empty_markers() {
        assert_eq!(line_error("pkg #").2, LineError::EmptyRevision);
        assert_eq!(line_error("pkg !").2, LineError::EmptyUrl);
    }

    #[test]
    fn unrecognized_token_reports_line_number() {
        let (line, text, reason) = line_error("github.com/a/b\n\n  pkg $bad  \n");
        assert_eq!(line, 3);
        assert_eq!(text, "pkg $bad");
        assert_eq!(reason, LineError::UnrecognizedToken("$bad".to_owned()));

        let err = from_str("pkg $bad").unwrap_err();
        assert!(err.to_string().contains("unrecognized token"));
    }

    #[test]
    fn garbage() {
        let err = from_str("github.com/nitrous-io/goop (*@#&!@(*#)@$F@sdgu8$!");
        assert!(err.is_err());
    }

    #[test]
    fn display_is_parseable() {
        let dependency = Dependency::new("github.com/foo/bar")
            .with_rev("v1.0.3")
            .with_url("git@github.com:baz/bar");
        assert_eq!(
            dependency.to_string(),
            "github.com/foo/bar #v1.0.3 !git@github.com:baz/bar"
        );
        assert_eq!(from_str(&dependency.to_string()).unwrap(), vec![dependency]);
    }

    #[test]
    fn read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Goopfile");
        std::fs::write(&path, "github.com/a/b #1\ngithub.com/c/d\n").unwrap();
        let deps = from_file(&path).unwrap();
        assert_eq!(
            deps,
            vec![
                Dependency::new("github.com/a/b").with_rev("1"),
                Dependency::new("github.com/c/d")
            ]
        );
        assert!(matches!(
            from_file(&dir.path().join("missing")),
            Err(ParseError::IO(_))
        ));
    }
}
