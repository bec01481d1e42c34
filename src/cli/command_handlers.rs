use std::{
    collections::BTreeSet,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::bail;
use log::{debug, info};

use crate::{
    command::{CommandRunner, Invocation},
    env::{EnvPatcher, GopathMode},
    flock::VendorLock,
    install::Installer,
    model::LockFile,
    vcs::ImportPathLookup,
};

/// One line per package: its import path followed by everything it imports.
const GO_LIST_TEMPLATE: &str = "{{.ImportPath}}{{range .Imports}} {{.}}{{end}}";

/// Handler to install command
/// Installs from the lock file when there is one, without touching it.
/// Otherwise installs from the manifest and writes the lock file.
pub fn do_install(
    installer: &Installer,
    root: &Path,
    manifest_file_name: &Path,
    lock_file_name: &Path,
) -> anyhow::Result<LockFile> {
    let lock_file_path = root.join(lock_file_name);
    if lock_file_path.exists() {
        info!("Using {}...", lock_file_name.display());
        install_locked(installer, &lock_file_path, None)
    } else {
        let manifest_path = manifest_path(root, manifest_file_name)?;
        install_locked(installer, &manifest_path, Some(&lock_file_path))
    }
}

/// Handler to update command
pub fn do_update(
    installer: &Installer,
    root: &Path,
    manifest_file_name: &Path,
    lock_file_name: &Path,
) -> anyhow::Result<LockFile> {
    let manifest_path = manifest_path(root, manifest_file_name)?;
    install_locked(installer, &manifest_path, Some(&root.join(lock_file_name)))
}

/// Handler to exec and go commands
pub fn do_exec(
    runner: &dyn CommandRunner,
    env: &EnvPatcher,
    name: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let vendored = env.bin_dir().join(name);
    let program = if vendored.is_file() {
        vendored.to_string_lossy().into_owned()
    } else {
        name.to_owned()
    };
    runner.run(
        &Invocation::new(program)
            .args(args.iter().cloned())
            .env(env.patched(GopathMode::Prepend)),
    )?;
    Ok(())
}

/// Handler to env command
pub fn do_print_env(env: &EnvPatcher, out: &mut dyn Write) -> anyhow::Result<()> {
    let patched = env.patched(GopathMode::Prepend);
    for key in ["GOPATH", "PATH"] {
        let value = patched.get_os(key).unwrap_or_default();
        writeln!(out, "{key}={}", value.to_string_lossy())?;
    }
    Ok(())
}

/// Handler to init command
/// Lists the project's packages with `go list` and writes every import that is
/// neither part of the standard library nor of the project itself.
pub fn do_init(
    runner: &dyn CommandRunner,
    lookup: &dyn ImportPathLookup,
    env: &EnvPatcher,
    root: &Path,
    manifest_file_name: &Path,
) -> anyhow::Result<()> {
    let manifest_path = root.join(manifest_file_name);
    if manifest_path.exists() {
        bail!("Goopfile {} already exists", manifest_path.display());
    }
    info!("Generating {}...", manifest_file_name.display());

    let env = env.patched(GopathMode::Prepend);
    let listing = runner.output(
        &Invocation::new("go")
            .args(["list", "-f", GO_LIST_TEMPLATE, "./..."])
            .current_dir(root)
            .env(env.clone()),
    )?;
    let standard = runner.output(
        &Invocation::new("go")
            .args(["list", "std"])
            .current_dir(root)
            .env(env),
    )?;

    std::fs::write(&manifest_path, generate_manifest(&listing, &standard, lookup))?;
    info!("Wrote {}", manifest_path.display());
    Ok(())
}

fn install_locked(
    installer: &Installer,
    source: &Path,
    lock_file_path: Option<&Path>,
) -> anyhow::Result<LockFile> {
    let _lock = VendorLock::acquire(installer.vendor_dir())?;
    Ok(installer.install_from(source, lock_file_path)?)
}

fn manifest_path(root: &Path, manifest_file_name: &Path) -> anyhow::Result<PathBuf> {
    let path = root.join(manifest_file_name);
    if !path.exists() {
        bail!("{} not found", path.display());
    }
    Ok(path)
}

fn generate_manifest(listing: &str, standard: &str, lookup: &dyn ImportPathLookup) -> String {
    let standard: BTreeSet<&str> = standard.lines().map(str::trim).collect();
    let mut packages = BTreeSet::new();
    let mut imports = BTreeSet::new();
    for line in listing.lines() {
        let mut fields = line.split_whitespace();
        let Some(package) = fields.next() else {
            continue;
        };
        packages.insert(package);
        imports.extend(fields);
    }

    imports
        .into_iter()
        .filter(|import| !standard.contains(import) && !packages.contains(import))
        .filter(|import| match lookup.lookup(import) {
            Ok(_) => true,
            Err(err) => {
                debug!("Leaving out {import}: {err}");
                false
            }
        })
        .map(|import| format!("{import}\n"))
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        command::{fake::FakeRunner, CommandError},
        env::Env,
        vcs::{HostingLookup, Resolver},
        workspace::Workspace,
    };

    fn installer(root: &Path, runner: &Arc<FakeRunner>) -> Installer {
        let runner: Arc<dyn CommandRunner> = runner.clone();
        let resolver = Resolver::new(Box::new(HostingLookup::offline()), runner.clone());
        Installer::new(runner, resolver, Workspace::new(root.join(".vendor")), Env::default())
    }

    fn patcher() -> EnvPatcher {
        EnvPatcher::new(
            Env::from_iter([("GOPATH", "/home/me/go"), ("PATH", "/usr/bin")]),
            "/project/.vendor",
        )
    }

    #[test]
    fn install_prefers_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        std::fs::write(dir.path().join("Goopfile"), "github.com/a/b\n").unwrap();
        std::fs::write(dir.path().join("Goopfile.lock"), "github.com/a/b #v1\n").unwrap();

        do_install(
            &installer(dir.path(), &runner),
            dir.path(),
            Path::new("Goopfile"),
            Path::new("Goopfile.lock"),
        )
        .unwrap();

        assert_eq!(runner.count("git checkout v1"), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Goopfile.lock")).unwrap(),
            "github.com/a/b #v1\n"
        );
    }

    #[test]
    fn install_without_lock_file_writes_it() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        std::fs::write(dir.path().join("Goopfile"), "github.com/a/b\n").unwrap();

        do_install(
            &installer(dir.path(), &runner),
            dir.path(),
            Path::new("Goopfile"),
            Path::new("Goopfile.lock"),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("Goopfile.lock")).unwrap(),
            "github.com/a/b #rev-b\n"
        );
    }

    #[test]
    fn update_ignores_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        std::fs::write(dir.path().join("Goopfile"), "github.com/a/b #v2\n").unwrap();
        std::fs::write(dir.path().join("Goopfile.lock"), "github.com/a/b #v1\n").unwrap();

        do_update(
            &installer(dir.path(), &runner),
            dir.path(),
            Path::new("Goopfile"),
            Path::new("Goopfile.lock"),
        )
        .unwrap();

        assert_eq!(runner.count("git checkout v1"), 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Goopfile.lock")).unwrap(),
            "github.com/a/b #v2\n"
        );
    }

    #[test]
    fn missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let result = do_update(
            &installer(dir.path(), &runner),
            dir.path(),
            Path::new("Goopfile"),
            Path::new("Goopfile.lock"),
        );
        assert!(result.is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn print_env() {
        let mut out = Vec::new();
        do_print_env(&patcher(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "GOPATH=/project/.vendor:/home/me/go\nPATH=/project/.vendor/bin:/usr/bin\n"
        );
    }

    #[test]
    fn exec_prefers_vendored_binary() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join(".vendor");
        std::fs::create_dir_all(vendor_dir.join("bin")).unwrap();
        std::fs::write(vendor_dir.join("bin").join("tool"), "").unwrap();
        let env = EnvPatcher::new(Env::default(), &vendor_dir);
        let runner = FakeRunner::new();

        do_exec(&runner, &env, "tool", &["-v".to_owned()]).unwrap();
        do_exec(&runner, &env, "make", &[]).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                format!("{} -v", vendor_dir.join("bin").join("tool").display()),
                "make".to_owned(),
            ]
        );
        let invocation = &runner.invocations()[1];
        assert_eq!(
            invocation.env.as_ref().and_then(|env| env.get("GOPATH")),
            Some(&*vendor_dir.to_string_lossy())
        );
    }

    #[test]
    fn exec_failure_keeps_exit_code() {
        let runner = FakeRunner::new();
        runner.fail_on("false");

        let err = do_exec(&runner, &patcher(), "false", &[]).unwrap_err();

        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<CommandError>())
            .and_then(CommandError::exit_code);
        assert_eq!(code, Some(1));
    }

    #[test]
    fn manifest_lists_external_imports() {
        let listing = "example.com/me/app github.com/gorilla/mux fmt example.com/me/app/util C\n\
                       example.com/me/app/util strings github.com/a/b/sub github.com/gorilla/mux\n";
        let standard = "fmt\nstrings\nnet/http\n";

        let manifest = generate_manifest(listing, standard, &HostingLookup::offline());

        assert_eq!(manifest, "github.com/a/b/sub\ngithub.com/gorilla/mux\n");
    }

    #[test]
    fn init_writes_goopfile() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.respond(
            &format!("go list -f {GO_LIST_TEMPLATE} ./..."),
            "example.com/me/app github.com/gorilla/mux os",
        );
        runner.respond("go list std", "os");

        do_init(
            &runner,
            &HostingLookup::offline(),
            &patcher(),
            dir.path(),
            Path::new("Goopfile"),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("Goopfile")).unwrap(),
            "github.com/gorilla/mux\n"
        );
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Goopfile"), "github.com/a/b\n").unwrap();
        let runner = FakeRunner::new();

        let result = do_init(
            &runner,
            &HostingLookup::offline(),
            &patcher(),
            dir.path(),
            Path::new("Goopfile"),
        );

        assert!(result.is_err());
        assert!(runner.calls().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Goopfile")).unwrap(),
            "github.com/a/b\n"
        );
    }
}
